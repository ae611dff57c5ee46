use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::OutputFormat;

/// Markup output of a given format.
///
/// Remembers at most one of {source plain text, generated markup} eagerly and
/// computes the other lazily, caching it at most once. Clones share the cache.
#[derive(Clone)]
pub struct MarkupOutput {
    inner: Arc<Inner>,
}

struct Inner {
    format: OutputFormat,
    plain: OnceCell<Box<str>>,
    markup: OnceCell<Box<str>>,
    // True iff constructed from plain text; only then is the plain side a
    // faithful source representation.
    plain_sourced: bool,
}

impl MarkupOutput {
    pub(super) fn from_plain(format: OutputFormat, text: impl Into<String>) -> MarkupOutput {
        let plain = OnceCell::new();
        let _ = plain.set(text.into().into_boxed_str());
        MarkupOutput {
            inner: Arc::new(Inner {
                format,
                plain,
                markup: OnceCell::new(),
                plain_sourced: true,
            }),
        }
    }

    pub(super) fn from_markup(format: OutputFormat, markup: impl Into<String>) -> MarkupOutput {
        let cell = OnceCell::new();
        let _ = cell.set(markup.into().into_boxed_str());
        MarkupOutput {
            inner: Arc::new(Inner {
                format,
                plain: OnceCell::new(),
                markup: cell,
                plain_sourced: false,
            }),
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.inner.format
    }

    /// The markup string; escaped on demand from the plain source, at most
    /// once.
    pub fn markup_string(&self) -> String {
        self.inner
            .markup
            .get_or_init(|| {
                let plain = self.inner.plain.get().map(|s| s.as_ref()).unwrap_or("");
                self.inner.format.escape(plain).into_boxed_str()
            })
            .to_string()
    }

    /// The original plain text, only if this value was built by escaping
    /// plain text. Markup wrapped directly is not losslessly reducible to
    /// plain text, so this is intentionally asymmetric.
    pub fn source_plain_text(&self) -> Option<&str> {
        if self.inner.plain_sourced {
            self.inner.plain.get().map(|s| s.as_ref())
        } else {
            None
        }
    }

    /// Concatenate two markup outputs of the same format.
    ///
    /// When both sides still have their plain-text source, the result stays
    /// in the plain representation and defers escaping; otherwise markup is
    /// materialized on both sides and joined.
    pub fn concat(&self, other: &MarkupOutput) -> MarkupOutput {
        debug_assert_eq!(self.inner.format, other.inner.format);
        match (self.source_plain_text(), other.source_plain_text()) {
            (Some(a), Some(b)) => {
                let mut joined = String::with_capacity(a.len() + b.len());
                joined.push_str(a);
                joined.push_str(b);
                MarkupOutput::from_plain(self.inner.format, joined)
            }
            _ => {
                let mut joined = self.markup_string();
                joined.push_str(&other.markup_string());
                MarkupOutput::from_markup(self.inner.format, joined)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self.source_plain_text() {
            Some(plain) => plain.is_empty(),
            None => self.markup_string().is_empty(),
        }
    }
}

impl std::fmt::Debug for MarkupOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("MarkupOutput");
        dbg.field("format", &self.inner.format.name());
        if let Some(plain) = self.source_plain_text() {
            dbg.field("plain", &plain);
        }
        if let Some(markup) = self.inner.markup.get() {
            dbg.field("markup", &markup);
        }
        dbg.finish()
    }
}

impl PartialEq for MarkupOutput {
    fn eq(&self, other: &Self) -> bool {
        self.inner.format == other.inner.format && self.markup_string() == other.markup_string()
    }
}
