//! Chrome DevTools Protocol backend
//!
//! Implements the engine boundary over the `headless_chrome` crate: one
//! launched Chrome process is the [`Engine`], and every conversion gets its
//! own browser context (separate cookies, cache and storage) with a single
//! tab as the [`BrowsingContext`].
//!
//! HTML is loaded by navigating the tab to the document URL and fulfilling
//! that one request from memory through the Fetch domain, so relative
//! resources resolve against the base URL without the document ever being
//! fetched from the network.

use crate::engine::{
    BrowsingContext, ContextOptions, Engine, EngineLauncher, PdfParams, RequestAction,
    RequestHandler, RequestInfo,
};
use crate::{Error, LaunchConfig, Result};
use base64::Engine as Base64Engine;
use headless_chrome::browser::tab::{RequestInterceptor, RequestPausedDecision, Tab};
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::protocol::cdp::Fetch::{FailRequest, FulfillRequest, HeaderEntry};
use headless_chrome::protocol::cdp::Network::ErrorReason;
use headless_chrome::protocol::cdp::{Emulation, Page, Target};
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};
use std::ffi::OsStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::time::Duration;

// Headroom so our own step timeout fires before a CDP call gives up.
const CDP_TIMEOUT_GRACE: Duration = Duration::from_secs(5);
const CDP_UNBOUNDED_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

type SharedHandler = Arc<Mutex<Option<RequestHandler>>>;
type SharedDocument = Arc<Mutex<Option<Document>>>;

/// Launches headless Chrome processes
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    config: LaunchConfig,
}

impl ChromeLauncher {
    pub fn new(config: LaunchConfig) -> Self {
        Self { config }
    }
}

impl EngineLauncher for ChromeLauncher {
    fn launch(&self) -> Result<Box<dyn Engine>> {
        let config = &self.config;
        let args: Vec<&OsStr> = config.args.iter().map(OsStr::new).collect();

        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(config.sandbox)
            .path(config.chrome_path.clone())
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .idle_browser_timeout(Duration::from_millis(config.idle_browser_timeout_ms))
            .args(args)
            .build()
            .map_err(|e| {
                Error::InitializationFailure(anyhow::anyhow!("Failed to build launch options: {}", e))
            })?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationFailure(e.context("Failed to launch browser")))?;

        // Browser-level commands go through a tab in the default context.
        let control = browser
            .new_tab()
            .map_err(|e| Error::InitializationFailure(e.context("Failed to open control tab")))?;

        debug!("Launched headless Chrome");
        Ok(Box::new(ChromeEngine {
            running: Mutex::new(Some(Running { browser, control })),
        }))
    }
}

#[derive(Clone)]
struct Running {
    browser: Browser,
    control: Arc<Tab>,
}

/// A running Chrome process
pub struct ChromeEngine {
    // Taken on shutdown; contexts keep their own clone until released.
    running: Mutex<Option<Running>>,
}

impl ChromeEngine {
    fn running(&self) -> Result<Running> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Error::RenderingFailure("Browser has been shut down".into()))
    }
}

impl Engine for ChromeEngine {
    fn verify(&self) -> Result<()> {
        let Running { browser, .. } = self.running().map_err(|e| Error::InitializationFailure(e.into()))?;
        let version = browser
            .get_version()
            .map_err(|e| Error::InitializationFailure(e.context("Browser did not answer version request")))?;
        debug!("Connected to {}", version.product);
        Ok(())
    }

    fn open_context(&self, options: &ContextOptions) -> Result<Box<dyn BrowsingContext>> {
        let Running { browser, control } = self.running()?;

        let (context_id, tab) = {
            let context = browser
                .new_context()
                .map_err(|e| Error::RenderingFailure(format!("Failed to create browser context: {}", e)))?;
            let tab = context
                .new_tab()
                .map_err(|e| Error::RenderingFailure(format!("Failed to create tab: {}", e)))?;
            (context.get_id().to_string(), tab)
        };

        let ctx = ChromeContext {
            _browser: browser,
            control,
            context_id,
            tab,
            handler: Arc::new(Mutex::new(None)),
            document: Arc::new(Mutex::new(None)),
            closed: AtomicBool::new(false),
        };
        // On failure `ctx` drops here and disposes the half-built context.
        ctx.prepare(options)?;
        Ok(Box::new(ctx))
    }

    fn shutdown(&self) -> Result<()> {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(Running { browser, control }) = running else {
            return Ok(());
        };
        let closed = control
            .close(false)
            .map(|_| ())
            .map_err(|e| Error::ShutdownFailure(format!("Failed to close control tab: {}", e)));
        if let Some(pid) = browser.get_process_id() {
            debug!("Shutting down Chrome process {}", pid);
        }
        // The last handle sends Browser.close and kills the child process.
        drop(control);
        drop(browser);
        closed
    }
}

/// The in-memory document served for the navigation request
struct Document {
    url: String,
    html: String,
}

/// One browser context with a single tab
pub struct ChromeContext {
    // Keeps the process alive while this context is in use.
    _browser: Browser,
    control: Arc<Tab>,
    context_id: String,
    tab: Arc<Tab>,
    handler: SharedHandler,
    document: SharedDocument,
    closed: AtomicBool,
}

impl ChromeContext {
    fn prepare(&self, options: &ContextOptions) -> Result<()> {
        if !options.javascript_enabled {
            self.tab
                .call_method(Emulation::SetScriptExecutionDisabled { value: true })
                .map_err(|e| Error::RenderingFailure(format!("Failed to disable scripting: {}", e)))?;
        }

        // Fetch interception is always on: it serves the document itself.
        self.tab
            .enable_fetch(None, Some(false))
            .map_err(|e| Error::RenderingFailure(format!("Failed to enable fetch domain: {}", e)))?;

        let handler = Arc::clone(&self.handler);
        let document = Arc::clone(&self.document);
        let interceptor: Arc<dyn RequestInterceptor + Send + Sync> = Arc::new(
            move |_transport, _session_id, event: RequestPausedEvent| {
                intercept(&handler, &document, event)
            },
        );

        self.tab
            .enable_request_interception(interceptor)
            .map_err(|e| Error::RenderingFailure(format!("Failed to enable request interception: {}", e)))?;
        Ok(())
    }
}

fn intercept(handler: &SharedHandler, document: &SharedDocument, event: RequestPausedEvent) -> RequestPausedDecision {
    let req = &event.params.request;
    let request_id = event.params.request_id.clone();

    {
        let doc = document.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(doc) = doc.as_ref().filter(|d| same_document(&d.url, &req.url)) {
            let body = base64::engine::general_purpose::STANDARD.encode(doc.html.as_bytes());
            return RequestPausedDecision::Fulfill(FulfillRequest {
                request_id,
                response_code: 200,
                response_headers: Some(vec![HeaderEntry {
                    name: "Content-Type".to_string(),
                    value: "text/html; charset=utf-8".to_string(),
                }]),
                binary_response_headers: None,
                body: Some(body),
                response_phrase: None,
            });
        }
    }

    let handler = handler.lock().unwrap_or_else(PoisonError::into_inner).clone();
    let action = match handler {
        Some(cb) => cb(&RequestInfo {
            request_id: request_id.clone(),
            url: req.url.clone(),
            method: req.method.clone(),
        }),
        None => RequestAction::Continue,
    };

    match action {
        RequestAction::Continue => RequestPausedDecision::Continue(None),
        RequestAction::Abort => RequestPausedDecision::Fail(FailRequest {
            request_id,
            error_reason: ErrorReason::BlockedByClient,
        }),
    }
}

fn same_document(document_url: &str, request_url: &str) -> bool {
    let strip = |u: &str| u.split('#').next().unwrap_or(u).to_string();
    strip(document_url) == strip(request_url)
}

impl BrowsingContext for ChromeContext {
    fn intercept_requests(&self, handler: RequestHandler) -> Result<()> {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
        Ok(())
    }

    fn load_html(&self, html: &str, document_url: &str, timeout: Option<Duration>) -> Result<()> {
        self.tab
            .set_default_timeout(timeout.map_or(CDP_UNBOUNDED_TIMEOUT, |t| t + CDP_TIMEOUT_GRACE));

        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = Some(Document {
            url: document_url.to_string(),
            html: html.to_string(),
        });

        self.tab
            .call_method(Page::SetLifecycleEventsEnabled { enabled: true })
            .map_err(|e| Error::RenderingFailure(format!("Failed to enable lifecycle events: {}", e)))?;

        // The page target id doubles as its main frame id.
        let main_frame = self.tab.get_target_id().to_string();
        let (idle_tx, idle_rx) = mpsc::channel::<()>();
        let idle_tx = Mutex::new(idle_tx);
        let navigation_started = AtomicBool::new(false);

        self.tab
            .add_event_listener(Arc::new(move |event: &Event| {
                if let Event::PageLifecycleEvent(lifecycle) = event {
                    if lifecycle.params.frame_id != main_frame {
                        return;
                    }
                    match lifecycle.params.name.as_str() {
                        "init" => navigation_started.store(true, Ordering::SeqCst),
                        "networkIdle" if navigation_started.load(Ordering::SeqCst) => {
                            let _ = idle_tx.lock().unwrap_or_else(PoisonError::into_inner).send(());
                        }
                        _ => {}
                    }
                }
            }))
            .map_err(|e| Error::RenderingFailure(format!("Failed to listen for lifecycle events: {}", e)))?;

        self.tab
            .navigate_to(document_url)
            .map_err(|e| Error::RenderingFailure(format!("Navigation failed: {}", e)))?;

        let waited = match timeout {
            Some(limit) => idle_rx.recv_timeout(limit).map_err(|e| match e {
                mpsc::RecvTimeoutError::Timeout => Error::Timeout(limit.as_millis() as u64),
                mpsc::RecvTimeoutError::Disconnected => {
                    Error::RenderingFailure("Lifecycle listener went away".into())
                }
            }),
            None => idle_rx
                .recv()
                .map_err(|_| Error::RenderingFailure("Lifecycle listener went away".into())),
        };
        waited?;
        debug!("Network idle for {}", document_url);
        Ok(())
    }

    fn print_to_pdf(&self, params: &PdfParams) -> Result<Vec<u8>> {
        let mut options = PrintToPdfOptions {
            landscape: Some(params.landscape),
            print_background: Some(params.print_background),
            scale: Some(params.scale),
            paper_width: Some(params.paper_width),
            paper_height: Some(params.paper_height),
            prefer_css_page_size: Some(false),
            ..Default::default()
        };
        if let Some(margins) = params.margins {
            options.margin_top = margins.top;
            options.margin_right = margins.right;
            options.margin_bottom = margins.bottom;
            options.margin_left = margins.left;
        }

        self.tab
            .print_to_pdf(Some(options))
            .map_err(|e| Error::RenderingFailure(format!("Print to PDF failed: {}", e)))
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.tab.close(false) {
            warn!("Failed to close tab: {}", e);
        }

        self.control
            .call_method(Target::DisposeBrowserContext {
                browser_context_id: self.context_id.clone(),
            })
            .map_err(|e| Error::RenderingFailure(format!("Failed to dispose browser context: {}", e)))?;
        Ok(())
    }
}

impl Drop for ChromeContext {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_do_not_change_the_document() {
        assert!(same_document("https://example.com/a", "https://example.com/a#top"));
        assert!(!same_document("https://example.com/a", "https://example.com/a/img.png"));
    }

    #[test]
    fn test_chrome_launch_and_teardown() {
        // This test requires Chrome to be installed, so we skip it in CI
        if std::env::var("CI").is_ok() {
            return;
        }
        let engine = match ChromeLauncher::new(LaunchConfig::from_env()).launch() {
            Ok(engine) => engine,
            Err(e) => {
                eprintln!("Skipping Chrome launch test because Chrome is not available or failed to launch: {}", e);
                return;
            }
        };
        assert!(engine.verify().is_ok());
        assert!(engine.shutdown().is_ok());
        // second teardown has nothing left to do
        assert!(engine.shutdown().is_ok());
    }
}
