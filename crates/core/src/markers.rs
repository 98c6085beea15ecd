//! Marker discovery in template text.

use crate::types::TemplateDocument;
use regex::Regex;
use std::sync::LazyLock;

/// A `{{name}}` marker: no nested braces, no escaping.
static MARKER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^{}]+)\}\}").unwrap());

/// Marker names in `text`, in order of first appearance, without duplicates.
pub fn find_markers(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in MARKER_REGEX.captures_iter(text) {
        let name = caps[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

impl TemplateDocument {
    /// Marker names present anywhere in the document, paragraph by paragraph.
    pub fn markers(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for paragraph in self.paragraphs() {
            for name in find_markers(&paragraph.text()) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}
