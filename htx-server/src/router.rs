//! Router (C9): `:name`/`:name(regex)` patterns compiled once to an
//! anchored [`regex::Regex`] at registration time, grounded in
//! `routing/route.{hpp,cpp}`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::request::ServerRequest;
use crate::response::ServerResponse;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum AuthLevel {
    Public,
    User,
    Admin,
}

pub trait Handler<S>: Send + Sync {
    fn call(&self, req: ServerRequest<S>, res: ServerResponse<S>) -> BoxFuture<'static, ()>;
}

impl<S, F, Fut> Handler<S> for F
where
    F: Fn(ServerRequest<S>, ServerResponse<S>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, req: ServerRequest<S>, res: ServerResponse<S>) -> BoxFuture<'static, ()> {
        Box::pin(self(req, res))
    }
}

struct Route<S> {
    pattern: String,
    regex: Regex,
    param_names: Vec<String>,
    auth_level: AuthLevel,
    handler: Arc<dyn Handler<S>>,
}

/// Splits a `:name` / `:name(regex)` route pattern into an anchored regex
/// plus the parameter names in left-to-right order. Unlike the original's
/// two-pass scan (all custom-regex params, then all simple params not
/// already seen), this walks the pattern once so mixed patterns report
/// parameters in their actual positional order — a correctness fix noted
/// in DESIGN.md.
fn compile_pattern(pattern: &str) -> (Regex, Vec<String>) {
    let bytes = pattern.as_bytes();
    let mut out = String::from("^");
    let mut names = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b':' {
            let start = i + 1;
            let mut j = start;
            while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
                j += 1;
            }
            if j > start {
                let name = pattern[start..j].to_string();
                if j < bytes.len() && bytes[j] == b'(' {
                    let depth_start = j + 1;
                    let mut k = depth_start;
                    let mut depth = 1;
                    while k < bytes.len() && depth > 0 {
                        match bytes[k] {
                            b'(' => depth += 1,
                            b')' => depth -= 1,
                            _ => {}
                        }
                        if depth > 0 {
                            k += 1;
                        }
                    }
                    out.push('(');
                    out.push_str(&pattern[depth_start..k]);
                    out.push(')');
                    names.push(name);
                    i = k + 1;
                    continue;
                }
                out.push_str("([^/]+)");
                names.push(name);
                i = j;
                continue;
            }
        }
        out.push_str(&regex::escape(&(bytes[i] as char).to_string()));
        i += 1;
    }
    out.push('$');
    (Regex::new(&out).expect("compiled route pattern is valid regex"), names)
}

/// The method + pattern table. `S` is threaded through so handlers can be
/// typed against the concrete transport stream without the router itself
/// depending on any one stream type.
pub struct Router<S> {
    routes: HashMap<htx_proto::Method, Vec<Route<S>>>,
    fallback: Option<Arc<dyn Handler<S>>>,
    cors_enabled: bool,
}

impl<S> Default for Router<S> {
    fn default() -> Self {
        Router { routes: HashMap::new(), fallback: None, cors_enabled: false }
    }
}

impl<S> Router<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route<H, Fut>(&mut self, method: htx_proto::Method, pattern: &str, handler: H) -> &mut Self
    where
        H: Fn(ServerRequest<S>, ServerResponse<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.route_with_auth(method, pattern, AuthLevel::Public, handler)
    }

    pub fn route_with_auth<H, Fut>(
        &mut self,
        method: htx_proto::Method,
        pattern: &str,
        auth_level: AuthLevel,
        handler: H,
    ) -> &mut Self
    where
        H: Fn(ServerRequest<S>, ServerResponse<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (regex, param_names) = compile_pattern(pattern);
        self.routes.entry(method).or_default().push(Route {
            pattern: pattern.to_string(),
            regex,
            param_names,
            auth_level,
            handler: Arc::new(handler),
        });
        self
    }

    pub fn fallback<H, Fut>(&mut self, handler: H) -> &mut Self
    where
        H: Fn(ServerRequest<S>, ServerResponse<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.fallback = Some(Arc::new(handler));
        self
    }

    /// Registers a blanket `OPTIONS .*` responder with CORS headers,
    /// matching `route_handler::enable_cors`. Unlike the original, the
    /// wildcard regex is compiled directly rather than routed through
    /// `compile_pattern`'s character-escaping pass — escaping there would
    /// turn `.*` into the literal two-character string `.*`, matching
    /// nothing but that exact path (a dead catch-all in the C++ source).
    pub fn enable_cors(&mut self) -> &mut Self {
        self.cors_enabled = true;
        self.routes.entry(htx_proto::Method::Options).or_default().push(Route {
            pattern: ".*".to_string(),
            regex: Regex::new("^.*$").expect("wildcard regex is valid"),
            param_names: Vec::new(),
            auth_level: AuthLevel::Public,
            handler: Arc::new(|_req: ServerRequest<S>, res: ServerResponse<S>| async move {
                if let Err(e) = res.no_content_cors_preflight() {
                    debug!(error = %e, "failed to send CORS preflight response");
                }
            }),
        });
        self
    }

    pub fn cors_enabled(&self) -> bool {
        self.cors_enabled
    }

    /// Finds the first matching route for `method`/`path`, returning the
    /// handler, its auth level, and the extracted `:name` → value pairs.
    pub fn find(
        &self,
        method: &htx_proto::Method,
        path: &str,
    ) -> Option<(Arc<dyn Handler<S>>, AuthLevel, Vec<(String, String)>)> {
        let candidates = self.routes.get(method)?;
        for route in candidates {
            if let Some(captures) = route.regex.captures(path) {
                debug!(pattern = %route.pattern, path, "matched route");
                let params = route
                    .param_names
                    .iter()
                    .enumerate()
                    .filter_map(|(i, name)| {
                        captures.get(i + 1).map(|m| (name.clone(), m.as_str().to_string()))
                    })
                    .collect();
                return Some((route.handler.clone(), route.auth_level, params));
            }
        }
        None
    }

    pub fn has_routes_for(&self, method: &htx_proto::Method) -> bool {
        self.routes.contains_key(method)
    }

    pub fn fallback_handler(&self) -> Option<Arc<dyn Handler<S>>> {
        self.fallback.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_param_matches_non_slash_segment() {
        let (re, names) = compile_pattern("/api/v1/users/:user/devices/:device");
        assert_eq!(names, vec!["user", "device"]);
        let caps = re.captures("/api/v1/users/alice/devices/42").unwrap();
        assert_eq!(&caps[1], "alice");
        assert_eq!(&caps[2], "42");
    }

    #[test]
    fn custom_regex_param_restricts_match() {
        let (re, names) = compile_pattern("/api/v1/users/:id([0-9]+)");
        assert_eq!(names, vec!["id"]);
        assert!(re.is_match("/api/v1/users/123"));
        assert!(!re.is_match("/api/v1/users/abc"));
    }

    #[test]
    fn mixed_params_report_positional_order() {
        let (_re, names) = compile_pattern("/:category([a-z]+)/items/:id");
        assert_eq!(names, vec!["category", "id"]);
    }
}
