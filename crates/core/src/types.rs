//! Domain types for templates, substitution maps, and tabular records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A template document: slides in presentation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDocument {
    /// Slides in presentation order.
    pub slides: Vec<Slide>,
}

impl TemplateDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a slide to the document.
    pub fn add_slide(&mut self, slide: Slide) {
        self.slides.push(slide);
    }

    /// Iterate over every paragraph of every text frame, in document order.
    pub fn paragraphs(&self) -> impl Iterator<Item = &Paragraph> {
        self.slides
            .iter()
            .flat_map(|s| s.shapes.iter())
            .filter_map(|shape| shape.text_frame.as_ref())
            .flat_map(|frame| frame.paragraphs.iter())
    }

    /// Mutable variant of [`TemplateDocument::paragraphs`].
    pub fn paragraphs_mut(&mut self) -> impl Iterator<Item = &mut Paragraph> {
        self.slides
            .iter_mut()
            .flat_map(|s| s.shapes.iter_mut())
            .filter_map(|shape| shape.text_frame.as_mut())
            .flat_map(|frame| frame.paragraphs.iter_mut())
    }

    /// Text of every paragraph, one entry per paragraph.
    pub fn paragraph_texts(&self) -> Vec<String> {
        self.paragraphs().map(Paragraph::text).collect()
    }
}

/// A single slide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slide {
    /// 1-based slide number.
    pub number: usize,

    /// Shapes in document order, with group members and table cells
    /// flattened into the sequence.
    pub shapes: Vec<Shape>,
}

impl Slide {
    /// Create a new slide with the given number.
    pub fn new(number: usize) -> Self {
        Self {
            number,
            shapes: Vec::new(),
        }
    }
}

/// A shape, optionally carrying a text frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    /// Shape name from its non-visual properties, if any.
    pub name: Option<String>,

    pub text_frame: Option<TextFrame>,
}

/// Ordered paragraphs of a shape's text body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFrame {
    pub paragraphs: Vec<Paragraph>,
}

/// A paragraph: an ordered sequence of formatted runs.
///
/// Concatenating the run texts in order yields the paragraph text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    pub runs: Vec<Run>,
}

impl Paragraph {
    /// Build a paragraph from run texts.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            runs: texts.into_iter().map(Run::new).collect(),
        }
    }

    /// The full paragraph text.
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    /// Run texts in order.
    pub fn run_texts(&self) -> Vec<&str> {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

/// The smallest span of uniformly formatted text. Only the text is modelled;
/// formatting stays in the source document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub text: String,
}

impl Run {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Marker name to replacement value for one record.
///
/// Keys are header names exactly as read, so `{{ Name }}` matches only a
/// header spelled ` Name `.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstitutionMap {
    entries: BTreeMap<String, String>,
}

impl SubstitutionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the map for one record row, skipping fields whose header or
    /// value is empty.
    pub fn from_row(headers: &[String], cells: &[Option<String>]) -> Self {
        let mut map = Self::new();
        for (header, cell) in headers.iter().zip(cells.iter()) {
            if let Some(value) = cell {
                map.insert(header, value.clone());
            }
        }
        map
    }

    /// Insert a field. Empty names or values are ignored.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if name.is_empty() || value.is_empty() {
            return;
        }
        self.entries.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `({{name}}, value)` pairs, longest tag first, ties broken by name.
    pub fn tags(&self) -> Vec<(String, &str)> {
        let mut tags: Vec<(String, &str)> = self
            .entries
            .iter()
            .map(|(name, value)| (marker_tag(name), value.as_str()))
            .collect();
        tags.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        tags
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for SubstitutionMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k.as_ref(), v);
        }
        map
    }
}

/// The literal marker for a field name.
pub fn marker_tag(name: &str) -> String {
    format!("{{{{{}}}}}", name)
}

/// One named group of rows (a worksheet).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordGroup {
    /// Group identifier, used to name output files.
    pub name: String,

    /// Field names from the header row; empty strings for blank headers.
    pub headers: Vec<String>,

    /// Data rows after the header, in sheet order.
    pub rows: Vec<Row>,
}

impl RecordGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            headers: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Records with at least one usable field.
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| Record {
                row_index: row.index,
                substitutions: SubstitutionMap::from_row(&self.headers, &row.cells),
            })
            .filter(|record| !record.substitutions.is_empty())
            .collect()
    }
}

/// A raw data row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// 1-based row number in the sheet.
    pub index: usize,

    /// Cell values by column; `None` for blank cells.
    pub cells: Vec<Option<String>>,
}

/// A row turned into substitutions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub row_index: usize,
    pub substitutions: SubstitutionMap,
}

/// Outcome of composing one filled document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeSummary {
    /// Number of marker occurrences replaced.
    pub replacements: usize,

    /// Marker names still present in the filled document.
    pub unresolved: Vec<String>,
}
