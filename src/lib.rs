//! RFox PDF
//!
//! HTML to PDF conversion on top of a headless browser engine, with a
//! request gate that keeps rendered content from reaching hosts it should not.
//!
//! # Features
//!
//! - **CDP Backend** (default): Uses Chrome DevTools Protocol via headless Chrome
//! - **Shared Engine**: One lazily launched browser serves many conversions,
//!   each in its own isolated browsing context
//! - **Safe Defaults**: Scripting off, and outbound requests limited to the
//!   document's base origin (none at all without a base URL)
//!
//! # Example
//!
//! ```no_run
//! use rfpdf::{Converter, LaunchConfig, RenderOptions};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let converter = Converter::chrome(LaunchConfig::default());
//!
//! let options = RenderOptions {
//!     base_url: Some("https://example.com/invoices/".to_string()),
//!     paper_format: "Letter".to_string(),
//!     ..Default::default()
//! };
//! let pdf = converter
//!     .convert("<html><body><h1>Hi</h1></body></html>", Some(&options), None)
//!     .await?;
//! std::fs::write("hi.pdf", pdf)?;
//!
//! converter.close().await?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

pub mod error;
pub use error::{Error, Result};

pub mod engine;
pub mod gate;
pub mod manager;
pub mod options;
pub mod session;

// Public entry points (reusable converter + one-shot helpers)
pub mod converter;

#[cfg(feature = "cdp")]
pub mod cdp;

pub use converter::{convert_html_to_pdf_with, Converter};
#[cfg(feature = "cdp")]
pub use converter::convert_html_to_pdf;
pub use engine::{BrowsingContext, Engine, EngineLauncher};
pub use gate::{BaseOrigin, GateDecision, RequestGate};
pub use manager::{EngineManager, LifecycleState};
pub use options::{Margins, RenderOptions};
pub use session::RenderSession;
pub use tokio_util::sync::CancellationToken;

/// Settings used when launching the browser engine
///
/// # Examples
///
/// ```
/// let cfg = rfpdf::LaunchConfig::default();
/// assert!(cfg.sandbox);
/// assert!(cfg.chrome_path.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Browser executable; `None` lets the backend locate one
    pub chrome_path: Option<PathBuf>,
    /// Run the browser with its OS sandbox enabled
    pub sandbox: bool,
    /// Window dimensions
    pub viewport: Viewport,
    /// How long the browser may sit idle before the connection is dropped,
    /// in milliseconds. Long-lived converters want this large.
    pub idle_browser_timeout_ms: u64,
    /// Extra command-line switches passed to the browser
    pub args: Vec<String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            sandbox: true,
            viewport: Viewport::default(),
            idle_browser_timeout_ms: 24 * 60 * 60 * 1000,
            args: Vec::new(),
        }
    }
}

impl LaunchConfig {
    /// Defaults overridden from the environment.
    ///
    /// | Variable | Effect |
    /// |----------|--------|
    /// | `CHROME_PATH` | browser executable |
    /// | `RFPDF_NO_SANDBOX` | `1`/`true` disables the sandbox (containers) |
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(path) = std::env::var_os("CHROME_PATH").filter(|p| !p.is_empty()) {
            cfg.chrome_path = Some(PathBuf::from(path));
        }
        if let Ok(v) = std::env::var("RFPDF_NO_SANDBOX") {
            cfg.sandbox = !matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        cfg
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}
