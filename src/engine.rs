//! Browser engine boundary
//!
//! The renderer itself is an external collaborator. These traits are the
//! whole surface the conversion core relies on; the `cdp` module implements
//! them over headless Chrome and tests implement them with in-memory fakes.
//!
//! All calls are blocking. The async layers (`manager`, `session`) run them
//! on tokio's blocking pool.

use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// Launches engine instances. Held by an [`crate::EngineManager`] for its
/// whole lifetime and invoked at most once per successful acquisition.
pub trait EngineLauncher: Send + Sync {
    /// Start a new engine instance.
    fn launch(&self) -> Result<Box<dyn Engine>>;
}

/// A running engine instance shared by many conversions
pub trait Engine: Send + Sync {
    /// Readiness check run once right after launch. A failure here makes the
    /// manager shut the instance down again before reporting the error.
    fn verify(&self) -> Result<()> {
        Ok(())
    }

    /// Open an isolated browsing context (own cookies, cache and storage).
    fn open_context(&self, options: &ContextOptions) -> Result<Box<dyn BrowsingContext>>;

    /// Tear the instance down. Called exactly once, by the manager.
    fn shutdown(&self) -> Result<()>;
}

/// One isolated page used for a single conversion
pub trait BrowsingContext: Send + Sync {
    /// Route every outbound request through `handler` from now on.
    fn intercept_requests(&self, handler: RequestHandler) -> Result<()>;

    /// Load `html` as the document located at `document_url` and block until
    /// the network is idle. `None` waits without a limit.
    fn load_html(&self, html: &str, document_url: &str, timeout: Option<Duration>) -> Result<()>;

    /// Render the loaded document.
    fn print_to_pdf(&self, params: &PdfParams) -> Result<Vec<u8>>;

    /// Release the context. Must be safe to call more than once.
    fn close(&self) -> Result<()>;
}

/// Settings applied when a browsing context is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextOptions {
    pub javascript_enabled: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self { javascript_enabled: false }
    }
}

/// Information about an outgoing network request
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Unique request identifier (backend-specific)
    pub request_id: String,
    /// Request URL
    pub url: String,
    /// HTTP method
    pub method: String,
}

/// What to do with an intercepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestAction {
    /// Let the request proceed normally
    Continue,
    /// Abort the request before it leaves the engine
    Abort,
}

pub type RequestHandler = Arc<dyn Fn(&RequestInfo) -> RequestAction + Send + Sync>;

/// Page margins in inches
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PdfMargins {
    pub top: Option<f64>,
    pub right: Option<f64>,
    pub bottom: Option<f64>,
    pub left: Option<f64>,
}

/// Fully resolved print parameters, in the units Chrome's `Page.printToPDF`
/// takes (inches)
#[derive(Debug, Clone, PartialEq)]
pub struct PdfParams {
    pub paper_width: f64,
    pub paper_height: f64,
    pub landscape: bool,
    pub scale: f64,
    pub print_background: bool,
    /// `None` leaves margins to the engine's defaults
    pub margins: Option<PdfMargins>,
}
