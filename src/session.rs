//! A single HTML to PDF conversion
//!
//! A [`RenderSession`] is built from validated input, borrows the shared
//! engine just long enough to open its own browsing context, and releases that
//! context on every exit path. The engine itself is never touched beyond
//! `open_context`.

use crate::engine::{
    BrowsingContext, ContextOptions, Engine, PdfParams, RequestAction, RequestHandler, RequestInfo,
};
use crate::gate::{GateDecision, RequestGate};
use crate::options::RenderOptions;
use crate::{Error, Result};
use log::{debug, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Document URL used when no base URL is configured. `.invalid` never
/// resolves, so relative references cannot reach a real host.
pub const PLACEHOLDER_DOCUMENT_URL: &str = "http://rfpdf.invalid/";

/// One validated conversion, ready to run against an engine
#[derive(Debug)]
pub struct RenderSession {
    html: Arc<str>,
    document_url: String,
    // None when remote resources are allowed (gating bypassed)
    gate: Option<RequestGate>,
    context: ContextOptions,
    pdf: PdfParams,
    timeout: Option<Duration>,
}

impl RenderSession {
    /// Validate `html` and `options`.
    ///
    /// Every failure here is [`Error::InvalidInput`] and happens before any
    /// engine interaction.
    pub fn new(html: &str, options: &RenderOptions) -> Result<Self> {
        options.check_content(html)?;
        let base = options.base()?;
        let pdf = options.pdf_params()?;

        let (document_url, origin) = match base {
            Some((url, origin)) => (url.to_string(), Some(origin)),
            None => (PLACEHOLDER_DOCUMENT_URL.to_string(), None),
        };

        Ok(Self {
            html: Arc::from(html),
            document_url,
            gate: (!options.allow_remote_resources).then(|| RequestGate::new(origin)),
            context: ContextOptions {
                javascript_enabled: !options.disable_scripting,
            },
            pdf,
            timeout: options.timeout(),
        })
    }

    /// URL the document is loaded at
    pub fn document_url(&self) -> &str {
        &self.document_url
    }

    /// Whether outbound requests go through a [`RequestGate`]
    pub fn is_gated(&self) -> bool {
        self.gate.is_some()
    }

    /// Render the document to PDF bytes.
    ///
    /// Load and print are each bounded by the configured timeout
    /// ([`Error::Timeout`]); `cancel` aborts the session with
    /// [`Error::Cancelled`]. Neither affects the shared engine.
    pub async fn run(self, engine: Arc<dyn Engine>, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let context_options = self.context;
        // Guarded inside the blocking call so a context opened after the
        // caller gave up is still closed.
        let ctx = step(cancel, None, move || {
            engine
                .open_context(&context_options)
                .map(|opened| Arc::new(ContextGuard(opened)))
        })
        .await?;

        let result = self.render(&ctx, cancel).await;

        // A step abandoned on timeout or cancellation still holds a clone and
        // releases the context when it returns.
        if let Err(e) = tokio::task::spawn_blocking(move || drop(ctx)).await {
            warn!("Browsing context release task failed: {}", e);
        }
        result
    }

    async fn render(&self, ctx: &Arc<ContextGuard>, cancel: &CancellationToken) -> Result<Vec<u8>> {
        if let Some(gate) = self.gate.clone() {
            let handler: RequestHandler = Arc::new(move |req: &RequestInfo| match gate.decide(&req.url) {
                GateDecision::Allow => RequestAction::Continue,
                GateDecision::Deny => {
                    debug!("Blocked {} request to {}", req.method, req.url);
                    RequestAction::Abort
                }
            });
            let c = Arc::clone(ctx);
            step(cancel, None, move || c.0.intercept_requests(handler)).await?;
        }

        let c = Arc::clone(ctx);
        let html = Arc::clone(&self.html);
        let url = self.document_url.clone();
        let timeout = self.timeout;
        step(cancel, timeout, move || c.0.load_html(&html, &url, timeout)).await?;

        let c = Arc::clone(ctx);
        let params = self.pdf.clone();
        let pdf = step(cancel, self.timeout, move || c.0.print_to_pdf(&params)).await?;
        debug!("Rendered {} bytes of PDF", pdf.len());
        Ok(pdf)
    }
}

/// Closes the browsing context when the last reference goes away
struct ContextGuard(Box<dyn BrowsingContext>);

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.close() {
            warn!("Failed to release browsing context: {}", e);
        }
    }
}

/// Run a blocking engine call, racing it against `cancel` and `timeout`.
async fn step<T, F>(cancel: &CancellationToken, timeout: Option<Duration>, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let task = tokio::task::spawn_blocking(f);
    let work = async move {
        match task.await {
            Ok(res) => res,
            Err(e) => Err(Error::RenderingFailure(format!("engine task failed: {}", e))),
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = bounded(timeout, work) => res,
    }
}

async fn bounded<T>(timeout: Option<Duration>, work: impl Future<Output = Result<T>>) -> Result<T> {
    match timeout {
        None => work.await,
        Some(limit) => match tokio::time::timeout(limit, work).await {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout(limit.as_millis() as u64)),
        },
    }
}
