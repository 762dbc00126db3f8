//! Per-conversion render options
//!
//! [`RenderOptions`] is what callers fill in. Validation turns it into the
//! pieces the session needs: the base origin for request gating and the
//! resolved [`PdfParams`] handed to the engine.

use crate::engine::{PdfMargins, PdfParams};
use crate::gate::BaseOrigin;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Default cap on HTML input size, in characters
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 1_000_000;

/// Default network-idle / print timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Options for a single conversion
///
/// The defaults are the restrictive ones: scripting off, remote resources
/// gated, and no base URL (so every absolute request is denied).
///
/// # Examples
///
/// ```
/// let opts = rfpdf::RenderOptions {
///     base_url: Some("https://example.com/invoices/".to_string()),
///     paper_format: "Letter".to_string(),
///     ..Default::default()
/// };
/// assert!(opts.disable_scripting);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Absolute URL the document is loaded at. Relative resources resolve
    /// against it and requests to its origin are allowed.
    pub base_url: Option<String>,
    /// Skip request gating entirely
    pub allow_remote_resources: bool,
    /// Turn off JavaScript in the browsing context
    pub disable_scripting: bool,
    /// Maximum HTML length in characters (0 disables the check)
    pub max_content_length: usize,
    /// Timeout for network idle and for PDF generation (0 disables it)
    pub timeout_ms: u64,
    /// Named paper size such as "A4" or "Letter"
    pub paper_format: String,
    /// Rendering scale, between 0.1 and 2.0
    pub scale: f64,
    /// Print background graphics
    pub print_background: bool,
    /// Landscape orientation
    pub landscape: bool,
    /// Page margins as CSS lengths
    pub margins: Margins,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            allow_remote_resources: false,
            disable_scripting: true,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            paper_format: "A4".to_string(),
            scale: 1.0,
            print_background: true,
            landscape: false,
            margins: Margins::default(),
        }
    }
}

/// Page margins as CSS lengths (`"1cm"`, `"0.5in"`, `"40px"`, `"12pt"`)
///
/// Unitless numbers are pixels. When all four are unset the engine's default
/// margins apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub top: Option<String>,
    pub right: Option<String>,
    pub bottom: Option<String>,
    pub left: Option<String>,
}

impl Margins {
    /// The same length on all four sides
    pub fn uniform(length: impl Into<String>) -> Self {
        let length = length.into();
        Self {
            top: Some(length.clone()),
            right: Some(length.clone()),
            bottom: Some(length.clone()),
            left: Some(length),
        }
    }

    pub fn is_unset(&self) -> bool {
        self.top.is_none() && self.right.is_none() && self.bottom.is_none() && self.left.is_none()
    }

    fn resolve(&self) -> Result<Option<PdfMargins>> {
        if self.is_unset() {
            return Ok(None);
        }
        Ok(Some(PdfMargins {
            top: resolve_margin("top", self.top.as_deref())?,
            right: resolve_margin("right", self.right.as_deref())?,
            bottom: resolve_margin("bottom", self.bottom.as_deref())?,
            left: resolve_margin("left", self.left.as_deref())?,
        }))
    }
}

fn resolve_margin(side: &str, value: Option<&str>) -> Result<Option<f64>> {
    match value {
        None => Ok(None),
        Some(v) => css_length_to_inches(v)
            .map(Some)
            .ok_or_else(|| Error::InvalidInput(format!("invalid {} margin '{}'", side, v))),
    }
}

impl RenderOptions {
    /// Network-idle and print timeout; `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Check the HTML against emptiness and `max_content_length`.
    pub fn check_content(&self, html: &str) -> Result<()> {
        if html.is_empty() {
            return Err(Error::InvalidInput("HTML content is empty".into()));
        }
        if self.max_content_length > 0 {
            let len = html.chars().count();
            if len > self.max_content_length {
                return Err(Error::InvalidInput(format!(
                    "HTML content is {} characters, limit is {}",
                    len, self.max_content_length
                )));
            }
        }
        Ok(())
    }

    /// Parse `base_url`, returning it with its origin.
    ///
    /// The URL must be absolute and have a host; `file:` and other host-less
    /// bases are rejected.
    pub fn base(&self) -> Result<Option<(Url, BaseOrigin)>> {
        let Some(raw) = self.base_url.as_deref() else {
            return Ok(None);
        };
        let url = Url::parse(raw)
            .map_err(|e| Error::InvalidInput(format!("base URL '{}' is not absolute: {}", raw, e)))?;
        let origin = BaseOrigin::from_url(&url)
            .ok_or_else(|| Error::InvalidInput(format!("base URL '{}' has no host", raw)))?;
        Ok(Some((url, origin)))
    }

    /// Resolve paper format, scale and margins into engine print parameters.
    pub fn pdf_params(&self) -> Result<PdfParams> {
        let (paper_width, paper_height) = paper_size(&self.paper_format).ok_or_else(|| {
            Error::InvalidInput(format!("unknown paper format '{}'", self.paper_format))
        })?;

        if !(0.1..=2.0).contains(&self.scale) {
            return Err(Error::InvalidInput(format!(
                "scale {} is outside 0.1..=2.0",
                self.scale
            )));
        }

        Ok(PdfParams {
            paper_width,
            paper_height,
            landscape: self.landscape,
            scale: self.scale,
            print_background: self.print_background,
            margins: self.margins.resolve()?,
        })
    }
}

/// Width and height in inches of a named paper format (case-insensitive)
pub fn paper_size(format: &str) -> Option<(f64, f64)> {
    let size = match format.trim().to_ascii_lowercase().as_str() {
        "letter" => (8.5, 11.0),
        "legal" => (8.5, 14.0),
        "tabloid" => (11.0, 17.0),
        "ledger" => (17.0, 11.0),
        "a0" => (33.1102, 46.811),
        "a1" => (23.3858, 33.1102),
        "a2" => (16.5354, 23.3858),
        "a3" => (11.6929, 16.5354),
        "a4" => (8.2677, 11.6929),
        "a5" => (5.8268, 8.2677),
        "a6" => (4.1339, 5.8268),
        _ => return None,
    };
    Some(size)
}

/// Convert a non-negative CSS length to inches.
///
/// Supports `px` (also the unit of bare numbers), `in`, `cm`, `mm`, `pt`
/// and `pc`.
pub fn css_length_to_inches(value: &str) -> Option<f64> {
    let v = value.trim().to_ascii_lowercase();
    let split = v
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(v.len());
    let (number, unit) = v.split_at(split);
    let number: f64 = number.parse().ok()?;
    if !number.is_finite() || number < 0.0 {
        return None;
    }
    let per_inch = match unit.trim() {
        "" | "px" => 96.0,
        "in" => 1.0,
        "cm" => 2.54,
        "mm" => 25.4,
        "pt" => 72.0,
        "pc" => 6.0,
        _ => return None,
    };
    Some(number / per_inch)
}
