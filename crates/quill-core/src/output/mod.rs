//! Output formats and the markup-output value they govern.
//!
//! An output format is a named escaping/markup discipline. Values inserted
//! into a template's output pass through the contextual format, which decides
//! whether plain text gets escaped and whether foreign markup may appear.

pub mod formats;
mod markup;

pub use markup::MarkupOutput;

use serde::{Deserialize, Serialize};

use crate::blame::Blame;
use crate::error::{Error, Result};

/// The closed set of output formats known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Html,
    Xml,
    Rtf,
    Url,
    JsonString,
}

impl OutputFormat {
    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Plain => "plainText",
            OutputFormat::Html => "HTML",
            OutputFormat::Xml => "XML",
            OutputFormat::Rtf => "RTF",
            OutputFormat::Url => "URL",
            OutputFormat::JsonString => "JSONString",
        }
    }

    pub fn for_name(name: &str) -> Option<OutputFormat> {
        Some(match name {
            "plainText" => OutputFormat::Plain,
            "HTML" => OutputFormat::Html,
            "XML" => OutputFormat::Xml,
            "RTF" => OutputFormat::Rtf,
            "URL" => OutputFormat::Url,
            "JSONString" => OutputFormat::JsonString,
            _ => return None,
        })
    }

    pub fn escape(self, text: &str) -> String {
        match self {
            OutputFormat::Plain => text.to_string(),
            OutputFormat::Html => formats::escape_html(text),
            OutputFormat::Xml => formats::escape_xml(text),
            OutputFormat::Rtf => formats::escape_rtf(text),
            OutputFormat::Url => formats::escape_url(text),
            OutputFormat::JsonString => formats::escape_json_string(text),
        }
    }

    /// Whether interpolated values are escaped by default. Consulted by the
    /// directive layer, never hard-coded at a call site.
    pub fn auto_escaped_by_default(self) -> bool {
        !matches!(self, OutputFormat::Plain)
    }

    /// Whether markup of another format may be inserted verbatim.
    pub fn mixing_allowed(self) -> bool {
        false
    }

    /// Escape `text` into a markup output that remembers its plain source.
    pub fn escape_plain_text(self, text: impl Into<String>) -> MarkupOutput {
        MarkupOutput::from_plain(self, text)
    }

    /// Wrap already-safe markup without re-escaping. The result has no plain
    /// text source.
    pub fn from_markup(self, markup: impl Into<String>) -> MarkupOutput {
        MarkupOutput::from_markup(self, markup)
    }

    /// Convert markup of some format into this format.
    ///
    /// Allowed when the formats match, when this format (or the engine
    /// configuration) permits mixing, or when the source still knows its
    /// plain text, in which case it is re-escaped here. Everything else is an
    /// output-format conflict naming both formats.
    pub fn convert(self, mo: &MarkupOutput, mixing_override: bool) -> Result<MarkupOutput> {
        if mo.format() == self {
            return Ok(mo.clone());
        }
        if self.mixing_allowed() || mixing_override {
            return Ok(MarkupOutput::from_markup(self, mo.markup_string()));
        }
        match mo.source_plain_text() {
            Some(plain) => Ok(self.escape_plain_text(plain)),
            None => Err(Error::OutputFormatConflict {
                from: mo.format().name(),
                to: self.name(),
                blame: Blame::new("The value to insert is markup of a different output format, ")
                    .part("and it has no plain text source to re-escape."),
            }),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_round_trips() {
        for format in [
            OutputFormat::Plain,
            OutputFormat::Html,
            OutputFormat::Xml,
            OutputFormat::Rtf,
            OutputFormat::Url,
            OutputFormat::JsonString,
        ] {
            assert_eq!(OutputFormat::for_name(format.name()), Some(format));
        }
        assert_eq!(OutputFormat::for_name("PDF"), None);
    }

    #[test]
    fn conversion_reescapes_when_plain_source_is_known() {
        let html = OutputFormat::Html.escape_plain_text("a & b");
        let xml = OutputFormat::Xml.convert(&html, false).unwrap();
        assert_eq!(xml.markup_string(), "a &amp; b");
        assert_eq!(xml.source_plain_text(), Some("a & b"));
    }

    #[test]
    fn conversion_without_plain_source_conflicts() {
        let html = OutputFormat::Html.from_markup("<b>hi</b>");
        let err = OutputFormat::Xml.convert(&html, false).unwrap_err();
        match err {
            Error::OutputFormatConflict { from, to, .. } => {
                assert_eq!(from, "HTML");
                assert_eq!(to, "XML");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn mixing_override_passes_markup_through() {
        let html = OutputFormat::Html.from_markup("<b>hi</b>");
        let xml = OutputFormat::Xml.convert(&html, true).unwrap();
        assert_eq!(xml.markup_string(), "<b>hi</b>");
    }
}
