//! Tunable layout and extraction parameters
//!
//! Every field has a default matching the browser tool's behaviour, so an
//! empty TOML document (or `Config::default()`) reproduces it exactly.
//!
//! ```
//! use doctools_core::config::Config;
//!
//! let config = Config::from_toml_str(
//!     r#"
//!     [extraction]
//!     paragraph_threshold = 8.0
//! "#,
//! )
//! .unwrap();
//! assert_eq!(config.extraction.paragraph_threshold, 8.0);
//! assert_eq!(config.layout.line_height, 14.0);
//! ```

use crate::error::{DocToolsError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Vertical distance (in PDF units) above which two fragments start separate paragraphs.
pub const PARAGRAPH_Y_THRESHOLD: f32 = 5.0;

/// Complete configuration for the document core
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            DocToolsError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string and validate it
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(s).map_err(|e| DocToolsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let layout = &self.layout;
        let positive = [
            ("page_width", layout.page_width),
            ("page_height", layout.page_height),
            ("line_height", layout.line_height),
            ("body_font_size", layout.body_font_size),
            ("heading_font_size", layout.heading_font_size),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(DocToolsError::Config(format!(
                    "layout.{} must be positive (got {})",
                    name, value
                )));
            }
        }
        if layout.margin < 0.0 || layout.text_width() <= 0.0 {
            return Err(DocToolsError::Config(format!(
                "layout.margin {} leaves no writable width on a {}pt page",
                layout.margin, layout.page_width
            )));
        }
        if layout.start_y > layout.page_height || layout.start_y <= layout.margin {
            return Err(DocToolsError::Config(format!(
                "layout.start_y must lie between the margin and the page height (got {})",
                layout.start_y
            )));
        }
        if self.extraction.paragraph_threshold < 0.0 {
            return Err(DocToolsError::Config(
                "extraction.paragraph_threshold must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Page geometry and typography used when re-flowing text into new PDF pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Page width in points (default: A4, 595)
    pub page_width: f32,
    /// Page height in points (default: A4, 842)
    pub page_height: f32,
    /// Left/right/bottom margin in points
    pub margin: f32,
    /// Baseline of the first line on every page
    pub start_y: f32,
    /// Base line advance in points
    pub line_height: f32,
    pub body_font_size: f32,
    pub heading_font_size: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            page_width: 595.0,
            page_height: 842.0,
            margin: 50.0,
            start_y: 800.0,
            line_height: 14.0,
            body_font_size: 12.0,
            heading_font_size: 16.0,
        }
    }
}

impl LayoutConfig {
    /// Width available to a line of text
    pub fn text_width(&self) -> f32 {
        self.page_width - 2.0 * self.margin
    }

    /// Lowest baseline allowed before a new page is started
    pub fn bottom_limit(&self) -> f32 {
        self.margin + self.line_height
    }
}

/// Parameters for the PDF text extraction heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub paragraph_threshold: f32,
    /// Re-read documents with `pdf-extract` when the text decoded through
    /// their fonts looks like garbage
    pub fallback_extractor: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            paragraph_threshold: PARAGRAPH_Y_THRESHOLD,
            fallback_extractor: true,
        }
    }
}
