//! PPTX template loading.
//!
//! A template is kept as the raw archive entries plus a parsed
//! [`TemplateDocument`] holding the text of every run. Saving writes the
//! archive back with only the run texts changed.

use certgen_core::{Error, Paragraph, Result, Run, Shape, Slide, TemplateDocument, TextFrame};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use zip::ZipArchive;

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const PRESENTATION_RELS_PART: &str = "ppt/_rels/presentation.xml.rels";

/// One file inside the PPTX archive.
#[derive(Debug, Clone)]
pub(crate) struct ArchiveEntry {
    pub(crate) name: String,
    pub(crate) data: Vec<u8>,
    pub(crate) is_dir: bool,
}

/// A loaded PPTX template.
#[derive(Debug, Clone)]
pub struct PptxTemplate {
    pub(crate) entries: Vec<ArchiveEntry>,

    /// Slide part names in presentation order.
    pub(crate) slide_parts: Vec<String>,

    document: TemplateDocument,
}

impl PptxTemplate {
    /// Load a template from disk.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::TemplateError(format!("Failed to open template {}: {}", path.display(), e))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Load a template from any seekable reader.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive =
            ZipArchive::new(reader).map_err(|e| Error::ZipError(format!("Failed to open ZIP: {}", e)))?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| Error::ZipError(format!("Failed to read entry {}: {}", i, e)))?;
            let mut data = Vec::new();
            file.read_to_end(&mut data)
                .map_err(|e| Error::ZipError(format!("Failed to read '{}': {}", file.name(), e)))?;
            entries.push(ArchiveEntry {
                name: file.name().to_string(),
                data,
                is_dir: file.is_dir(),
            });
        }

        let mut template = Self {
            entries,
            slide_parts: Vec::new(),
            document: TemplateDocument::new(),
        };

        template.slide_parts = template.get_slide_order()?;
        for (idx, part) in template.slide_parts.iter().enumerate() {
            let xml = template.read_part(part)?;
            let slide = parse_slide(xml, idx + 1)?;
            template.document.add_slide(slide);
        }

        log::debug!(
            "Loaded template with {} slide(s), {} paragraph(s)",
            template.document.slides.len(),
            template.document.paragraphs().count()
        );

        Ok(template)
    }

    /// The parsed text structure of the template.
    pub fn document(&self) -> &TemplateDocument {
        &self.document
    }

    /// Marker names found in the template.
    pub fn markers(&self) -> Vec<String> {
        self.document.markers()
    }

    /// Read an archive part as UTF-8 text.
    pub(crate) fn read_part(&self, name: &str) -> Result<&str> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::TemplateError(format!("Part not found in archive: '{}'", name)))?;
        std::str::from_utf8(&entry.data)
            .map_err(|e| Error::TemplateError(format!("Part '{}' is not UTF-8: {}", name, e)))
    }

    /// Slide part names in the order of `sldIdLst` in presentation.xml.
    fn get_slide_order(&self) -> Result<Vec<String>> {
        let targets = self.read_relationship_targets()?;
        let presentation = self.read_part(PRESENTATION_PART)?;

        let mut slides = Vec::new();
        let mut reader = Reader::from_str(presentation);
        reader.trim_text(true);

        loop {
            match reader.read_event() {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                    if local_name(e.name().as_ref()) == b"sldId" =>
                {
                    for attr in e.attributes().flatten() {
                        // `r:id` references the relationship; plain `id` is the slide id.
                        if attr.key.as_ref().ends_with(b":id") {
                            let rel_id = String::from_utf8_lossy(&attr.value).to_string();
                            match targets.get(&rel_id) {
                                Some(target) => slides.push(target.clone()),
                                None => log::warn!("Slide relationship {} has no target", rel_id),
                            }
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::XmlError(format!(
                        "Error parsing presentation.xml: {}",
                        e
                    )));
                }
                _ => {}
            }
        }

        Ok(slides)
    }

    /// Map of relationship id to archive part name for slide relationships.
    fn read_relationship_targets(&self) -> Result<HashMap<String, String>> {
        let rels_content = self.read_part(PRESENTATION_RELS_PART)?;
        let mut targets = HashMap::new();

        let mut reader = Reader::from_str(rels_content);
        reader.trim_text(true);

        loop {
            match reader.read_event() {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                    if e.name().as_ref() == b"Relationship" =>
                {
                    let mut rel_type = String::new();
                    let mut target = String::new();
                    let mut id = String::new();

                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"Type" => rel_type = String::from_utf8_lossy(&attr.value).to_string(),
                            b"Target" => target = String::from_utf8_lossy(&attr.value).to_string(),
                            b"Id" => id = String::from_utf8_lossy(&attr.value).to_string(),
                            _ => {}
                        }
                    }

                    if rel_type.ends_with("/slide") {
                        targets.insert(id, resolve_part_name(&target));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::XmlError(format!(
                        "Error parsing relationships: {}",
                        e
                    )));
                }
                _ => {}
            }
        }

        Ok(targets)
    }
}

/// Elements that start a new shape for naming and frame bookkeeping.
pub(crate) fn is_shape_element(name: &[u8]) -> bool {
    matches!(name, b"sp" | b"pic" | b"cxnSp" | b"graphicFrame")
}

/// A run is an `r` element directly inside a paragraph of a text body.
pub(crate) fn is_run_start(stack: &[Vec<u8>], name: &[u8]) -> bool {
    name == b"r" && parent_is(stack, b"p") && grandparent_is(stack, b"txBody")
}

pub(crate) fn parent_is(stack: &[Vec<u8>], name: &[u8]) -> bool {
    stack.last().map(|n| n.as_slice() == name).unwrap_or(false)
}

fn grandparent_is(stack: &[Vec<u8>], name: &[u8]) -> bool {
    stack.len() >= 2 && stack[stack.len() - 2].as_slice() == name
}

/// Parse one slide's XML into shapes, paragraphs and runs.
pub(crate) fn parse_slide(xml: &str, number: usize) -> Result<Slide> {
    let mut slide = Slide::new(number);
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<Vec<u8>> = Vec::new();
    // Frames emitted per open shape element.
    let mut shape_frames: Vec<usize> = Vec::new();
    let mut shape_name: Option<String> = None;
    let mut frame: Option<TextFrame> = None;
    let mut paragraph: Option<Paragraph> = None;
    let mut run: Option<Run> = None;
    let mut in_text = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::XmlError(format!("Error parsing slide {}: {}", number, e)))?;

        match event {
            Event::Start(ref e) => {
                let name = local_name(e.name().as_ref()).to_vec();
                match name.as_slice() {
                    n if is_shape_element(n) => shape_frames.push(0),
                    b"cNvPr" => shape_name = shape_name_attr(e),
                    b"txBody" => frame = Some(TextFrame::default()),
                    b"p" if frame.is_some() && parent_is(&stack, b"txBody") => {
                        paragraph = Some(Paragraph::default());
                    }
                    n if is_run_start(&stack, n) => run = Some(Run::default()),
                    b"t" if run.is_some() && parent_is(&stack, b"r") => in_text = true,
                    _ => {}
                }
                stack.push(name);
            }
            Event::Empty(ref e) => {
                let qname = e.name();
                let name = local_name(qname.as_ref());
                match name {
                    b"cNvPr" => shape_name = shape_name_attr(e),
                    b"p" if parent_is(&stack, b"txBody") => {
                        if let Some(frame) = frame.as_mut() {
                            frame.paragraphs.push(Paragraph::default());
                        }
                    }
                    n if is_run_start(&stack, n) => {
                        if let Some(paragraph) = paragraph.as_mut() {
                            paragraph.runs.push(Run::default());
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(ref e) if in_text => {
                let text = e
                    .unescape()
                    .map_err(|e| Error::XmlError(format!("Bad text in slide {}: {}", number, e)))?;
                if let Some(run) = run.as_mut() {
                    run.text.push_str(&text);
                }
            }
            Event::CData(ref e) if in_text => {
                if let Some(run) = run.as_mut() {
                    run.text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Event::End(ref e) => {
                stack.pop();
                let qname = e.name();
                let name = local_name(qname.as_ref());
                match name {
                    b"t" => in_text = false,
                    b"r" if parent_is(&stack, b"p") => {
                        if let (Some(finished), Some(paragraph)) = (run.take(), paragraph.as_mut()) {
                            paragraph.runs.push(finished);
                        }
                    }
                    b"p" if parent_is(&stack, b"txBody") => {
                        if let (Some(finished), Some(frame)) = (paragraph.take(), frame.as_mut()) {
                            frame.paragraphs.push(finished);
                        }
                    }
                    b"txBody" => {
                        if let Some(finished) = frame.take() {
                            slide.shapes.push(Shape {
                                name: shape_name.clone(),
                                text_frame: Some(finished),
                            });
                            if let Some(count) = shape_frames.last_mut() {
                                *count += 1;
                            }
                        }
                    }
                    n if is_shape_element(n) => {
                        if shape_frames.pop() == Some(0) {
                            slide.shapes.push(Shape {
                                name: shape_name.clone(),
                                text_frame: None,
                            });
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(slide)
}

fn shape_name_attr(e: &quick_xml::events::BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == b"name")
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.to_string()))
}

/// Turn a relationship target from presentation.xml.rels into a part name.
fn resolve_part_name(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        absolute.to_string()
    } else {
        format!("ppt/{}", target)
    }
}

/// Extract the local name from a potentially namespaced XML element name.
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    if let Some(pos) = name.iter().position(|&b| b == b':') {
        &name[pos + 1..]
    } else {
        name
    }
}
