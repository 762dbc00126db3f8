//! Public conversion entry points
//!
//! [`Converter`] keeps one engine alive across many conversions;
//! [`convert_html_to_pdf`] is the stateless one-shot form that launches and
//! tears down its own engine per call.

use crate::engine::EngineLauncher;
use crate::manager::{EngineManager, LifecycleState};
use crate::options::RenderOptions;
use crate::session::RenderSession;
use crate::Result;
use log::warn;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A reusable HTML to PDF converter backed by one shared engine instance.
///
/// The engine is launched on the first conversion and kept until
/// [`close`](Converter::close). Conversions may run concurrently from many
/// tasks (share the converter behind an `Arc`); each gets its own isolated
/// browsing context.
///
/// ```no_run
/// # async fn demo() -> rfpdf::Result<()> {
/// let converter = rfpdf::Converter::chrome(rfpdf::LaunchConfig::default());
/// let pdf = converter.convert("<h1>Invoice</h1>", None, None).await?;
/// assert!(pdf.starts_with(b"%PDF-"));
/// converter.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Converter {
    manager: EngineManager,
}

impl Converter {
    /// Create a converter over any engine backend.
    pub fn new<L>(launcher: L) -> Self
    where
        L: EngineLauncher + 'static,
    {
        Self::with_launcher(Arc::new(launcher))
    }

    pub fn with_launcher(launcher: Arc<dyn EngineLauncher>) -> Self {
        Self {
            manager: EngineManager::new(launcher),
        }
    }

    /// Create a converter backed by headless Chrome.
    #[cfg(feature = "cdp")]
    pub fn chrome(config: crate::LaunchConfig) -> Self {
        Self::new(crate::cdp::ChromeLauncher::new(config))
    }

    /// Convert `html` to PDF bytes.
    ///
    /// `options` defaults to [`RenderOptions::default`]. Input is validated
    /// before the engine is launched or touched. After [`close`](Self::close)
    /// this fails with [`crate::Error::UseAfterDispose`].
    pub async fn convert(
        &self,
        html: &str,
        options: Option<&RenderOptions>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<u8>> {
        let defaults;
        let options = match options {
            Some(o) => o,
            None => {
                defaults = RenderOptions::default();
                &defaults
            }
        };
        let session = RenderSession::new(html, options)?;

        let never = CancellationToken::new();
        let cancel = cancel.unwrap_or(&never);

        let engine = self.manager.acquire(cancel).await?;
        session.run(engine, cancel).await
    }

    /// Shut the engine down. Idempotent; conversions afterwards fail with
    /// [`crate::Error::UseAfterDispose`].
    pub async fn close(&self) -> Result<()> {
        self.manager.shutdown().await
    }

    pub fn state(&self) -> LifecycleState {
        self.manager.state()
    }

    /// The underlying lifecycle manager
    pub fn manager(&self) -> &EngineManager {
        &self.manager
    }
}

impl Drop for Converter {
    fn drop(&mut self) {
        if self.manager.state() == LifecycleState::Ready {
            warn!("Converter dropped without close(); engine is released when its last handle drops");
        }
    }
}

/// One-shot conversion over a caller-supplied engine backend.
///
/// Launches a fresh engine, converts, and shuts it down again whatever the
/// outcome. A teardown failure is logged rather than returned.
pub async fn convert_html_to_pdf_with<L>(
    launcher: L,
    html: &str,
    options: Option<&RenderOptions>,
    cancel: Option<&CancellationToken>,
) -> Result<Vec<u8>>
where
    L: EngineLauncher + 'static,
{
    let converter = Converter::new(launcher);
    let result = converter.convert(html, options, cancel).await;
    if let Err(e) = converter.close().await {
        warn!("One-shot engine teardown failed: {}", e);
    }
    result
}

/// One-shot conversion with a default headless Chrome.
///
/// Inefficient for repeated use: every call launches and tears down a
/// browser. Prefer a long-lived [`Converter`].
#[cfg(feature = "cdp")]
pub async fn convert_html_to_pdf(
    html: &str,
    options: Option<&RenderOptions>,
    cancel: Option<&CancellationToken>,
) -> Result<Vec<u8>> {
    convert_html_to_pdf_with(
        crate::cdp::ChromeLauncher::new(crate::LaunchConfig::from_env()),
        html,
        options,
        cancel,
    )
    .await
}

