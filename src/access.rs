use async_trait::async_trait;
use serde_json::Value;

use crate::http::{Context, HttpMethod, Response};

/// A reusable request template: a capability set over method, path, headers,
/// params, body, and before/after hooks, with per-field defaults.
///
/// Implementations are constructed fresh for each invocation, so hook state
/// never leaks between calls. `perform` is the composition point; overriding
/// it is almost never needed.
#[async_trait]
pub trait Access: Send {
    fn method(&self) -> HttpMethod;

    fn path(&self) -> String;

    /// Metric label passed to the context in place of the raw path.
    fn metric_name(&self) -> Option<String> {
        None
    }

    fn default_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    async fn before(&mut self, _ctx: &mut Context) {}

    async fn after(&mut self, _ctx: &mut Context, _response: &Response) {}

    /// Request path, possibly derived from context state (ids, tokens).
    fn build_path(&self, _ctx: &Context) -> String {
        self.path()
    }

    fn request_headers(&self, _ctx: &Context) -> Vec<(String, String)> {
        Vec::new()
    }

    fn request_params(&self, _ctx: &Context) -> Vec<(String, String)> {
        Vec::new()
    }

    fn request_json(&self, _ctx: &Context) -> Option<Value> {
        None
    }

    fn request_body(&self, _ctx: &Context) -> Option<String> {
        None
    }

    /// Applies `before`, composes the request through the context, invokes
    /// `after` with the response, and returns it. Total like the context
    /// methods it dispatches through.
    async fn perform(&mut self, ctx: &mut Context) -> Response {
        self.before(ctx).await;

        let path = self.build_path(ctx);
        let mut headers = self.default_headers();
        headers.extend(self.request_headers(ctx));
        let params = self.request_params(ctx);
        let json = self.request_json(ctx);
        let body = self.request_body(ctx);
        let metric_name = self.metric_name();

        let mut spec = ctx.request(self.method(), path);
        for (name, value) in headers {
            spec = spec.header(name, value);
        }
        for (key, value) in params {
            spec = spec.query(key, value);
        }
        if let Some(value) = json {
            spec = spec.json(value);
        } else if let Some(raw) = body {
            spec = spec.body(raw);
        }
        if let Some(name) = metric_name {
            spec = spec.name(name);
        }

        let response = spec.send().await;
        self.after(ctx, &response).await;
        response
    }
}
