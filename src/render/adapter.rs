//! Pluggable rendering backends.

use crate::error::Result;
use async_trait::async_trait;

/// Output of rendering a document body to a display format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedOutput {
    pub html: String,
    /// Set when this output came from a fallback path rather than the
    /// configured primary renderer.
    pub degraded: bool,
    /// Set on the single call where the render circuit's state actually
    /// changed: `"degraded_mode"` the call that trips the circuit open,
    /// `"degraded_mode_recovered"` the first successful probe afterward.
    /// `None` on every other call, including ones that stay degraded or
    /// stay healthy without a transition.
    pub circuit_transition: Option<&'static str>,
}

/// Pluggable rendering hook, the same seam as [`crate::frontmatter::FrontmatterAdapter`]
/// and [`crate::schema::SchemaAdapter`]: one default implementation shipped,
/// callers free to substitute their own.
#[async_trait]
pub trait RendererAdapter: Send + Sync {
    async fn render(&self, body: &str) -> Result<String>;
}

/// Renders by POSTing the body to an HTTP rendering service and reading back
/// the response body as HTML. Network/timeout failures map to
/// `renderer_transient` via `FolioError`'s `From<reqwest::Error>`, making
/// them eligible for [`crate::reliability::RetryPolicy`].
pub struct HttpRendererAdapter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRendererAdapter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl RendererAdapter for HttpRendererAdapter {
    async fn render(&self, body: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("content-type", "text/markdown")
            .body(body.to_string())
            .send()
            .await?;
        let html = response.error_for_status()?.text().await?;
        Ok(html)
    }
}

/// Infallible fallback renderer: HTML-escapes the raw body and wraps it in a
/// `<pre>` block. Used when the primary renderer's circuit is open.
pub struct PlainTextFallbackAdapter;

#[async_trait]
impl RendererAdapter for PlainTextFallbackAdapter {
    async fn render(&self, body: &str) -> Result<String> {
        Ok(format!("<pre>{}</pre>", escape_html(body)))
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plain_text_fallback_escapes_html() {
        let adapter = PlainTextFallbackAdapter;
        let html = adapter.render("<script>alert(1)</script>").await.unwrap();
        assert_eq!(html, "<pre>&lt;script&gt;alert(1)&lt;/script&gt;</pre>");
    }
}
