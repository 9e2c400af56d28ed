use std::time::Duration;

use beacon::http::form::FormData;
use beacon::{RequestLogger, Response, Server, ServerConfig, SseEvent, StatusCode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = ServerConfig::load()?;
    let mut server = Server::new(cfg);

    server.middleware(RequestLogger);
    server
        .get("/", |_req| Ok(Response::ok("beacon is running\n")))?
        .get("/users/:id", |req| {
            let id = req.param("id").unwrap_or_default();
            Ok(Response::builder(StatusCode::Ok)
                .json(&serde_json::json!({ "id": id }))?
                .build())
        })?
        .post("/echo", |req| {
            let form: &FormData = req.form();
            if form.is_empty() {
                return Ok(Response::ok(req.body().to_vec()));
            }
            let fields: Vec<String> = form.fields().iter().map(|(k, v)| format!("{k}={v}")).collect();
            Ok(Response::text(StatusCode::Ok, fields.join("\n")))
        })?;
    server.sse("/events", "news")?;
    server.sse("/events/:topic", "news")?;

    let registry = server.registry();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(5));
        let mut seq: u64 = 0;
        loop {
            ticker.tick().await;
            seq += 1;
            let event = SseEvent::new(format!("tick {seq}")).event("tick").id(seq.to_string());
            let delivered = registry.broadcast("news", &event);
            tracing::debug!(delivered, "Broadcast tick");
        }
    });

    let bound = server.bind().await?;
    let handle = bound.shutdown_handle();

    tokio::select! {
        res = bound.run() => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            handle.shutdown();
        }
    }

    Ok(())
}
