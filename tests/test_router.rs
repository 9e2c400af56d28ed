mod common;

use beacon::http::request::{Method, RequestBuilder};
use beacon::http::response::{Response, StatusCode};
use beacon::http::router::{PatternError, Router};
use beacon::Server;

fn get(path: &str) -> beacon::Request {
    RequestBuilder::new().method(Method::GET).path(path).build().unwrap()
}

fn tagged(tag: &'static str) -> impl Fn(&beacon::ServerRequest) -> beacon::HandlerResult {
    move |_| Ok(Response::ok(tag))
}

#[test]
fn test_first_registered_route_wins() {
    let mut router = Router::new();
    router.add(Method::GET, "/users/me", tagged("me")).unwrap();
    router.add(Method::GET, "/users/:id", tagged("by-id")).unwrap();

    let (route, params) = router.find_route(&get("/users/me")).unwrap();
    assert_eq!(route.pattern.as_str(), "/users/me");
    assert!(params.is_empty());

    let (route, params) = router.find_route(&get("/users/7")).unwrap();
    assert_eq!(route.pattern.as_str(), "/users/:id");
    assert_eq!(params, vec![("id".to_string(), "7".to_string())]);
}

#[test]
fn test_multiple_params_bind_in_order() {
    let mut router = Router::new();
    router
        .add(Method::GET, "/orgs/:org/repos/:repo", tagged("repo"))
        .unwrap();

    let (_, params) = router.find_route(&get("/orgs/acme/repos/beacon?tab=code")).unwrap();
    assert_eq!(
        params,
        vec![
            ("org".to_string(), "acme".to_string()),
            ("repo".to_string(), "beacon".to_string()),
        ]
    );
}

#[test]
fn test_methods_for_path_distinguish_404_from_405() {
    let mut router = Router::new();
    router.add(Method::GET, "/items", tagged("list")).unwrap();
    router.add(Method::POST, "/items", tagged("create")).unwrap();
    router.add(Method::GET, "/items/:id", tagged("one")).unwrap();

    assert_eq!(
        router.find_methods_for_path("/items"),
        vec![Method::GET, Method::POST]
    );
    assert!(router.find_methods_for_path("/nothing").is_empty());

    let delete = RequestBuilder::new()
        .method(Method::DELETE)
        .path("/items")
        .build()
        .unwrap();
    assert!(router.find_route(&delete).is_none());
}

#[test]
fn test_invalid_patterns_are_rejected() {
    let mut router = Router::new();
    assert!(matches!(
        router.add(Method::GET, "/a/:", tagged("x")),
        Err(PatternError::EmptyParam(_))
    ));
    assert!(router.is_empty());
}

#[tokio::test]
async fn test_unknown_path_is_404_and_wrong_method_is_405() {
    let mut server = Server::new(common::config());
    server.get("/only-get", |_| Ok(Response::ok("hi"))).unwrap();
    let srv = common::spawn(server).await;

    let mut client = srv.client().await;
    client.send("GET /missing HTTP/1.1\r\n\r\n").await;
    let res = client.read_response().await;
    assert_eq!(res.status, 404);

    client.send("POST /only-get HTTP/1.1\r\nContent-Length: 0\r\n\r\n").await;
    let res = client.read_response().await;
    assert_eq!(res.status, 405);
    assert_eq!(res.header("Allow"), Some("GET"));

    // Both misses left the connection open.
    client.send("GET /only-get HTTP/1.1\r\n\r\n").await;
    let res = client.read_response().await;
    assert_eq!(res.status, 200);
    assert_eq!(res.text(), "hi");
}

#[tokio::test]
async fn test_params_and_query_reach_the_handler() {
    let mut server = Server::new(common::config());
    server
        .get("/greet/:name", |req| {
            let name = req.param("name").unwrap_or("nobody");
            let greeting = req.query("greeting").unwrap_or_else(|| "hello".to_string());
            Ok(Response::text(StatusCode::Ok, format!("{greeting} {name}")))
        })
        .unwrap();
    let srv = common::spawn(server).await;

    let mut client = srv.client().await;
    client
        .send("GET /greet/ada?greeting=good%20morning HTTP/1.1\r\n\r\n")
        .await;
    let res = client.read_response().await;
    assert_eq!(res.status, 200);
    assert_eq!(res.text(), "good morning ada");
}
