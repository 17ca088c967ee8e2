//! Link tokens: the `[[path|alias]]` text stored in reference fields.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[\[([^\]|#]+)(?:#[^\]|]*)?(?:\|([^\]]*))?\]\]").expect("link pattern is valid")
    })
}

/// A parsed reference to another record.
///
/// `path` is the link target as written (with or without folders, usually
/// without the `.md` extension); `alias` is the optional display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkToken {
    pub path: String,
    pub alias: Option<String>,
}

impl LinkToken {
    /// Extracts the first bracketed link token from `text`.
    pub fn parse(text: &str) -> Option<Self> {
        let caps = link_pattern().captures(text)?;
        let path = caps.get(1)?.as_str().trim().to_string();
        if path.is_empty() {
            return None;
        }
        let alias = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|a| !a.is_empty());
        Some(Self { path, alias })
    }

    /// Extracts every bracketed link token from `text`, in order.
    pub fn parse_all(text: &str) -> Vec<Self> {
        link_pattern()
            .find_iter(text)
            .filter_map(|m| Self::parse(m.as_str()))
            .collect()
    }

    /// Like [`parse`](Self::parse), but also accepts a bare path without brackets.
    ///
    /// A bare path is only accepted when bracketing it yields a token that
    /// parses back to the same text, so it may not contain `[`, `]` or `#`.
    pub fn parse_lenient(text: &str) -> Option<Self> {
        if let Some(link) = Self::parse(text) {
            return Some(link);
        }
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.contains(['[', ']', '#']) {
            return None;
        }
        let wrapped = format!("[[{trimmed}]]");
        let whole = link_pattern().find(&wrapped)?;
        if whole.start() != 0 || whole.end() != wrapped.len() {
            return None;
        }
        Self::parse(&wrapped)
    }

    /// The last path segment, which is what a bare `[[Name]]` link matches on.
    pub fn base_name(&self) -> &str {
        let last = self.path.rsplit('/').next().unwrap_or(&self.path);
        last.strip_suffix(".md").unwrap_or(last)
    }
}

impl fmt::Display for LinkToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "[[{}|{}]]", self.path, alias),
            None => write!(f, "[[{}]]", self.path),
        }
    }
}
