use std::sync::OnceLock;

use crate::http::cookie::parse_cookie_header;
use crate::http::form::FormData;
use crate::http::query::{parse_query, split_target};
use crate::http::request::{Method, Request};

/// A request as seen by handlers: the parsed request plus the path
/// parameters its route extracted.
///
/// Query parameters, cookies and form data are derived views; the form is
/// parsed on first access and cached for the rest of the request.
#[derive(Debug)]
pub struct ServerRequest {
    request: Request,
    params: Vec<(String, String)>,
    form: OnceLock<FormData>,
}

impl ServerRequest {
    pub fn new(request: Request, params: Vec<(String, String)>) -> Self {
        Self {
            request,
            params,
            form: OnceLock::new(),
        }
    }

    pub fn method(&self) -> Method {
        self.request.method
    }

    pub fn version(&self) -> &str {
        &self.request.version
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        split_target(&self.request.path).0
    }

    /// Raw query string, without the leading `?`.
    pub fn query_string(&self) -> Option<&str> {
        split_target(&self.request.path).1
    }

    /// Decoded query parameters in order; repeated names are all kept.
    pub fn query_params(&self) -> Vec<(String, String)> {
        self.query_string().map(parse_query).unwrap_or_default()
    }

    /// First query parameter with this name.
    pub fn query(&self, name: &str) -> Option<String> {
        self.query_params()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Value bound to a `:name` segment of the matched route.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.request.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.request.body
    }

    /// Cookies from the `Cookie` header, in order.
    pub fn cookies(&self) -> Vec<(String, String)> {
        self.request
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("Cookie"))
            .flat_map(|(_, v)| parse_cookie_header(v))
            .collect()
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Form fields and files, parsed from the body by `Content-Type`.
    pub fn form(&self) -> &FormData {
        self.form.get_or_init(|| {
            FormData::parse(self.request.header("Content-Type"), &self.request.body)
        })
    }

    pub fn keep_alive(&self) -> bool {
        self.request.keep_alive()
    }

    pub fn inner(&self) -> &Request {
        &self.request
    }

    pub fn into_inner(self) -> Request {
        self.request
    }
}
