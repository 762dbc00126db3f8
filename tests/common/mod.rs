//! In-memory engine used by the integration tests
//!
//! The fake "loads" a document by issuing one request per `src` / `href`
//! attribute through whatever interception handler the session installed,
//! and records what happened to each request.

#![allow(dead_code)]

use rfpdf::engine::{
    BrowsingContext, ContextOptions, Engine, EngineLauncher, PdfParams, RequestAction,
    RequestHandler, RequestInfo,
};
use rfpdf::{Error, Result};
use scraper::{Html, Selector};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub const FAKE_PDF_HEADER: &[u8] = b"%PDF-1.7\n";

/// Everything the fake engine observed, shared between launcher, engines and
/// contexts
#[derive(Default)]
pub struct Recorder {
    pub launches: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub contexts_opened: AtomicUsize,
    pub contexts_closed: AtomicUsize,
    pub requests: Mutex<Vec<(String, RequestAction)>>,
    pub javascript: Mutex<Vec<bool>>,
    pub printed: Mutex<Vec<PdfParams>>,
    pub load_delay: Mutex<Duration>,
    pub launch_delay: Mutex<Duration>,
    pub open_delay: Mutex<Duration>,
    pub failing_launches: AtomicUsize,
    pub failing_loads: AtomicUsize,
    pub failing_prints: AtomicUsize,
}

impl Recorder {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn open_contexts(&self) -> usize {
        self.contexts_opened.load(Ordering::SeqCst) - self.contexts_closed.load(Ordering::SeqCst)
    }

    pub fn request_action(&self, url: &str) -> Option<RequestAction> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, a)| a.clone())
    }

    pub fn set_load_delay(&self, delay: Duration) {
        *self.load_delay.lock().unwrap() = delay;
    }

    pub fn set_launch_delay(&self, delay: Duration) {
        *self.launch_delay.lock().unwrap() = delay;
    }

    pub fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock().unwrap() = delay;
    }
}

/// Consume one pending failure from `counter`, if any.
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Clone, Default)]
pub struct FakeLauncher {
    pub recorder: Arc<Recorder>,
}

impl FakeLauncher {
    pub fn new() -> (Self, Arc<Recorder>) {
        let launcher = Self::default();
        let recorder = Arc::clone(&launcher.recorder);
        (launcher, recorder)
    }
}

impl EngineLauncher for FakeLauncher {
    fn launch(&self) -> Result<Box<dyn Engine>> {
        std::thread::sleep(*self.recorder.launch_delay.lock().unwrap());
        self.recorder.launches.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.recorder.failing_launches) {
            return Err(Error::InitializationFailure(anyhow::anyhow!("fake browser refused to start")));
        }
        Ok(Box::new(FakeEngine {
            recorder: Arc::clone(&self.recorder),
        }))
    }
}

pub struct FakeEngine {
    recorder: Arc<Recorder>,
}

impl Engine for FakeEngine {
    fn open_context(&self, options: &ContextOptions) -> Result<Box<dyn BrowsingContext>> {
        std::thread::sleep(*self.recorder.open_delay.lock().unwrap());
        self.recorder.contexts_opened.fetch_add(1, Ordering::SeqCst);
        self.recorder.javascript.lock().unwrap().push(options.javascript_enabled);
        Ok(Box::new(FakeContext {
            recorder: Arc::clone(&self.recorder),
            handler: Mutex::new(None),
            closed: Mutex::new(false),
        }))
    }

    fn shutdown(&self) -> Result<()> {
        self.recorder.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeContext {
    recorder: Arc<Recorder>,
    handler: Mutex<Option<RequestHandler>>,
    closed: Mutex<bool>,
}

impl BrowsingContext for FakeContext {
    fn intercept_requests(&self, handler: RequestHandler) -> Result<()> {
        *self.handler.lock().unwrap() = Some(handler);
        Ok(())
    }

    fn load_html(&self, html: &str, document_url: &str, _timeout: Option<Duration>) -> Result<()> {
        std::thread::sleep(*self.recorder.load_delay.lock().unwrap());
        if take_failure(&self.recorder.failing_loads) {
            return Err(Error::RenderingFailure("fake page crashed during load".into()));
        }

        let base = Url::parse(document_url).map_err(|e| Error::RenderingFailure(e.to_string()))?;
        let handler = self.handler.lock().unwrap().clone();
        for (i, raw) in referenced_urls(html).into_iter().enumerate() {
            let url = base.join(&raw).map(|u| u.to_string()).unwrap_or(raw);
            let info = RequestInfo {
                request_id: format!("fake-{}", i),
                url: url.clone(),
                method: "GET".to_string(),
            };
            let action = match &handler {
                Some(cb) => cb(&info),
                None => RequestAction::Continue,
            };
            self.recorder.requests.lock().unwrap().push((url, action));
        }
        Ok(())
    }

    fn print_to_pdf(&self, params: &PdfParams) -> Result<Vec<u8>> {
        if take_failure(&self.recorder.failing_prints) {
            return Err(Error::RenderingFailure("fake printer jammed".into()));
        }
        self.recorder.printed.lock().unwrap().push(params.clone());
        let mut pdf = FAKE_PDF_HEADER.to_vec();
        pdf.extend_from_slice(b"1 0 obj << /Type /Catalog >> endobj\n%%EOF\n");
        Ok(pdf)
    }

    fn close(&self) -> Result<()> {
        let mut closed = self.closed.lock().unwrap();
        if !*closed {
            *closed = true;
            self.recorder.contexts_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Every `src` / `href` attribute value, in document order
fn referenced_urls(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("[src], [href]").unwrap();
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("src").or_else(|| el.value().attr("href")))
        .map(str::to_string)
        .collect()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
