//! Placeholder resolution within a paragraph's runs.
//!
//! A marker such as `{{Name}}` may be split across several runs when the
//! author edited it with mixed formatting. Resolution works on the
//! concatenated paragraph text and then writes the result back into the
//! original runs, keeping the run count so every run keeps its formatting.

use crate::types::{Paragraph, SubstitutionMap, TemplateDocument};
use serde::{Deserialize, Serialize};

/// How resolved text is written back into runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Redistribution {
    /// Each replacement goes into the run holding the first character of
    /// its marker; the rest of the marker is removed from the runs it
    /// spanned. Text outside markers never moves between runs.
    #[default]
    Anchored,

    /// Runs are refilled left to right with slices as long as their original
    /// text (in characters); the last run takes whatever remains.
    Legacy,
}

/// Result of resolving one paragraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// New run texts, same length as the input.
    pub texts: Vec<String>,

    /// Number of marker occurrences replaced.
    pub replacements: usize,
}

/// A marker occurrence in the concatenated text, as byte offsets.
#[derive(Debug)]
struct Occurrence<'m> {
    start: usize,
    end: usize,
    value: &'m str,
}

/// Resolve markers across a paragraph's run texts.
///
/// Matching is a single left-to-right scan over the concatenated text; at
/// each position the longest matching tag wins and inserted values are
/// never scanned again.
pub fn resolve_texts(texts: &[&str], map: &SubstitutionMap, policy: Redistribution) -> Resolution {
    let joined: String = texts.concat();
    let tags = map.tags();
    let occurrences = find_occurrences(&joined, &tags);

    if occurrences.is_empty() {
        return Resolution {
            texts: texts.iter().map(|t| t.to_string()).collect(),
            replacements: 0,
        };
    }

    for (tag, value) in &tags {
        if occurrences
            .iter()
            .any(|o| &joined[o.start..o.end] == tag.as_str())
        {
            log::debug!("Found marker {}, replacing with: {}", tag, value);
        }
    }

    let texts = match policy {
        Redistribution::Anchored => redistribute_anchored(texts, &joined, &occurrences),
        Redistribution::Legacy => {
            let lengths: Vec<usize> = texts.iter().map(|t| t.chars().count()).collect();
            redistribute_by_length(&lengths, &substitute(&joined, &occurrences))
        }
    };

    Resolution {
        texts,
        replacements: occurrences.len(),
    }
}

impl Paragraph {
    /// Resolve markers in place. Returns the number of replacements.
    pub fn resolve(&mut self, map: &SubstitutionMap, policy: Redistribution) -> usize {
        if self.runs.is_empty() {
            return 0;
        }

        let resolution = resolve_texts(&self.run_texts(), map, policy);
        for (run, text) in self.runs.iter_mut().zip(resolution.texts) {
            run.text = text;
        }
        resolution.replacements
    }
}

impl TemplateDocument {
    /// Resolve markers in every paragraph. Returns the number of replacements.
    pub fn resolve(&mut self, map: &SubstitutionMap, policy: Redistribution) -> usize {
        self.paragraphs_mut().map(|p| p.resolve(map, policy)).sum()
    }
}

fn find_occurrences<'m>(text: &str, tags: &[(String, &'m str)]) -> Vec<Occurrence<'m>> {
    let mut occurrences = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        let rest = &text[pos..];
        if rest.starts_with("{{") {
            if let Some((tag, value)) = tags.iter().find(|(tag, _)| rest.starts_with(tag.as_str())) {
                occurrences.push(Occurrence {
                    start: pos,
                    end: pos + tag.len(),
                    value: *value,
                });
                pos += tag.len();
                continue;
            }
        }
        pos += rest.chars().next().map_or(1, char::len_utf8);
    }

    occurrences
}

fn substitute(text: &str, occurrences: &[Occurrence<'_>]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for o in occurrences {
        out.push_str(&text[cursor..o.start]);
        out.push_str(o.value);
        cursor = o.end;
    }
    out.push_str(&text[cursor..]);
    out
}

fn redistribute_anchored(texts: &[&str], joined: &str, occurrences: &[Occurrence<'_>]) -> Vec<String> {
    let mut out = Vec::with_capacity(texts.len());
    let mut next = 0;
    let mut offset = 0;

    for text in texts {
        let end = offset + text.len();
        let mut cursor = offset;
        let mut rebuilt = String::new();

        while cursor < end {
            let Some(o) = occurrences.get(next) else {
                rebuilt.push_str(&joined[cursor..end]);
                break;
            };

            if o.end <= cursor {
                next += 1;
            } else if o.start < cursor {
                // Tail of a marker that started in an earlier run.
                cursor = o.end.min(end);
            } else if o.start < end {
                rebuilt.push_str(&joined[cursor..o.start]);
                rebuilt.push_str(o.value);
                cursor = o.end.min(end);
            } else {
                rebuilt.push_str(&joined[cursor..end]);
                cursor = end;
            }
        }

        out.push(rebuilt);
        offset = end;
    }

    out
}

fn redistribute_by_length(lengths: &[usize], resolved: &str) -> Vec<String> {
    let mut chars = resolved.chars();
    let last = lengths.len().saturating_sub(1);

    lengths
        .iter()
        .enumerate()
        .map(|(i, &len)| {
            if i == last {
                chars.by_ref().collect()
            } else {
                chars.by_ref().take(len).collect()
            }
        })
        .collect()
}
