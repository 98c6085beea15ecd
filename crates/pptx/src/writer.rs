//! Writing a filled document back into the PPTX archive.
//!
//! Slide XML is streamed through unchanged except for the text of each run,
//! which is taken from the filled [`TemplateDocument`] in document order.

use crate::parser::{is_run_start, local_name, parent_is, PptxTemplate};
use certgen_core::{Error, Result, Slide, TemplateDocument};
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

impl PptxTemplate {
    /// Write `document` (a filled copy of this template's document) to `path`.
    pub fn save_document(&self, document: &TemplateDocument, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.write_document(document, BufWriter::new(file))
            .map_err(|e| match e {
                Error::IoError(_) => e,
                other => Error::CompositionError {
                    path: path.display().to_string(),
                    reason: other.to_string(),
                },
            })
    }

    /// Write `document` as a PPTX archive into `sink`.
    pub fn write_document<W: Write + Seek>(&self, document: &TemplateDocument, sink: W) -> Result<()> {
        if document.slides.len() != self.slide_parts.len() {
            return Err(Error::TemplateError(format!(
                "Document has {} slide(s) but the template has {}",
                document.slides.len(),
                self.slide_parts.len()
            )));
        }

        let mut zip = ZipWriter::new(sink);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        for entry in &self.entries {
            if entry.is_dir {
                zip.add_directory(entry.name.as_str(), options)
                    .map_err(|e| Error::ZipError(format!("Failed to add '{}': {}", entry.name, e)))?;
                continue;
            }

            zip.start_file(entry.name.as_str(), options)
                .map_err(|e| Error::ZipError(format!("Failed to add '{}': {}", entry.name, e)))?;

            match self.slide_parts.iter().position(|p| *p == entry.name) {
                Some(idx) => {
                    let xml = self.read_part(&entry.name)?;
                    let rewritten = rewrite_slide(xml, &document.slides[idx])?;
                    zip.write_all(&rewritten)?;
                }
                None => zip.write_all(&entry.data)?,
            }
        }

        let mut sink = zip
            .finish()
            .map_err(|e| Error::ZipError(format!("Failed to finish archive: {}", e)))?;
        sink.flush()?;
        Ok(())
    }
}

/// Replace run texts in slide XML with the texts of `slide`.
pub(crate) fn rewrite_slide(xml: &str, slide: &Slide) -> Result<Vec<u8>> {
    let texts: Vec<&str> = slide
        .shapes
        .iter()
        .filter_map(|shape| shape.text_frame.as_ref())
        .flat_map(|frame| frame.paragraphs.iter())
        .flat_map(|paragraph| paragraph.runs.iter())
        .map(|run| run.text.as_str())
        .collect();

    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let xml_err = |e: quick_xml::Error| Error::XmlError(format!("Error rewriting slide {}: {}", slide.number, e));

    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut next_run = 0;
    // Text for the run being written, and whether its `t` has been emitted.
    let mut current: Option<(&str, bool)> = None;
    // Prefixed name of the run element, to build a missing `t`.
    let mut run_tag = String::new();
    let mut skip_text = false;

    loop {
        let event = reader.read_event().map_err(xml_err)?;
        match event {
            Event::Start(ref e) => {
                let name = local_name(e.name().as_ref()).to_vec();
                if is_run_start(&stack, &name) {
                    let text = texts.get(next_run).copied().ok_or_else(|| {
                        Error::TemplateError(format!("Slide {} has more runs than its model", slide.number))
                    })?;
                    next_run += 1;
                    current = Some((text, false));
                    run_tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    writer.write_event(Event::Start(e.clone())).map_err(xml_err)?;
                } else if name == b"t" && parent_is(&stack, b"r") && current.is_some() {
                    writer.write_event(Event::Start(e.clone())).map_err(xml_err)?;
                    if let Some((text, written)) = current.as_mut() {
                        if !*written && !text.is_empty() {
                            writer.write_event(text_event(text)).map_err(xml_err)?;
                        }
                        *written = true;
                    }
                    skip_text = true;
                } else {
                    writer.write_event(Event::Start(e.clone())).map_err(xml_err)?;
                }
                stack.push(name);
            }
            Event::Empty(ref e) => {
                let qname = e.name();
                let name = local_name(qname.as_ref());
                match current.as_mut() {
                    Some((text, written)) if name == b"t" && parent_is(&stack, b"r") => {
                        if !*written && !text.is_empty() {
                            let end = BytesEnd::new(String::from_utf8_lossy(e.name().as_ref()).to_string());
                            writer.write_event(Event::Start(e.clone())).map_err(xml_err)?;
                            writer.write_event(text_event(text)).map_err(xml_err)?;
                            writer.write_event(Event::End(end)).map_err(xml_err)?;
                        } else {
                            writer.write_event(Event::Empty(e.clone())).map_err(xml_err)?;
                        }
                        *written = true;
                    }
                    _ => {
                        if is_run_start(&stack, name) {
                            // `<a:r/>` holds no text; keep the model in step.
                            next_run += 1;
                        }
                        writer.write_event(Event::Empty(e.clone())).map_err(xml_err)?;
                    }
                }
            }
            Event::Text(_) | Event::CData(_) if skip_text => {}
            Event::End(ref e) => {
                stack.pop();
                let qname = e.name();
                let name = local_name(qname.as_ref());
                if name == b"t" {
                    skip_text = false;
                } else if name == b"r" && parent_is(&stack, b"p") {
                    if let Some((text, written)) = current.take() {
                        if !written && !text.is_empty() {
                            let t_tag = t_name_for(&run_tag);
                            writer
                                .write_event(Event::Start(BytesStart::new(t_tag.as_str())))
                                .map_err(xml_err)?;
                            writer.write_event(text_event(text)).map_err(xml_err)?;
                            writer
                                .write_event(Event::End(BytesEnd::new(t_tag.as_str())))
                                .map_err(xml_err)?;
                        }
                    }
                }
                writer.write_event(Event::End(e.clone())).map_err(xml_err)?;
            }
            Event::Eof => break,
            other => writer.write_event(other).map_err(xml_err)?,
        }
    }

    if next_run != texts.len() {
        return Err(Error::TemplateError(format!(
            "Slide {} has {} run(s) but its model has {}",
            slide.number,
            next_run,
            texts.len()
        )));
    }

    Ok(writer.into_inner())
}

/// Text content, escaping only what element content requires.
fn text_event(text: &str) -> Event<'_> {
    Event::Text(BytesText::from_escaped(partial_escape(text)))
}

/// `a:r` -> `a:t`, `r` -> `t`.
fn t_name_for(run_tag: &str) -> String {
    match run_tag.rsplit_once(':') {
        Some((prefix, _)) => format!("{}:t", prefix),
        None => "t".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_slide;
    use crate::testing::{build_pptx, slide_xml, GROUP_AND_TABLE_SLIDE};
    use certgen_core::{Redistribution, SubstitutionMap};
    use std::io::Cursor;

    fn map(pairs: &[(&str, &str)]) -> SubstitutionMap {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_t_name_for() {
        assert_eq!(t_name_for("a:r"), "a:t");
        assert_eq!(t_name_for("r"), "t");
    }

    #[test]
    fn test_rewrite_unchanged_slide_is_identical() {
        let xml = slide_xml(&[("Title", &[&["Certificate"], &["of ", "completion"]])]);
        let slide = parse_slide(&xml, 1).unwrap();
        let out = rewrite_slide(&xml, &slide).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), xml);
    }

    #[test]
    fn test_rewrite_keeps_run_properties() {
        let xml = slide_xml(&[("Title", &[&["Dear ", "{{", "Name", "}}", "!"]])]);
        let mut slide = parse_slide(&xml, 1).unwrap();
        for p in slide.shapes.iter_mut().filter_map(|s| s.text_frame.as_mut()).flat_map(|f| f.paragraphs.iter_mut()) {
            p.resolve(&map(&[("Name", "Tom & Jerry")]), Redistribution::Anchored);
        }

        let out = String::from_utf8(rewrite_slide(&xml, &slide).unwrap()).unwrap();
        assert!(out.contains(r#"<a:r><a:rPr lang="uk-UA" b="1" dirty="0"/><a:t>Tom &amp; Jerry</a:t></a:r>"#));
        assert!(out.contains(r#"<a:r><a:rPr lang="uk-UA" b="0" dirty="0"/><a:t></a:t></a:r>"#));
        assert_eq!(out.matches("<a:r>").count(), 5);

        let reparsed = parse_slide(&out, 1).unwrap();
        assert_eq!(reparsed, slide);
    }

    #[test]
    fn test_rewrite_fills_empty_text_element() {
        let xml = r#"<p:sld xmlns:a="a" xmlns:p="p"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:rPr/><a:t/></a:r><a:r><a:t>{{Name}}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#;
        let mut slide = parse_slide(xml, 1).unwrap();
        let frame = slide.shapes[0].text_frame.as_mut().unwrap();
        frame.paragraphs[0].resolve(&map(&[("Name", "Ann")]), Redistribution::Legacy);
        assert_eq!(frame.paragraphs[0].run_texts(), vec!["", "Ann"]);

        frame.paragraphs[0].runs[0].text = "Dr. ".into();
        let out = String::from_utf8(rewrite_slide(xml, &slide).unwrap()).unwrap();
        assert!(out.contains("<a:r><a:rPr/><a:t>Dr. </a:t></a:r><a:r><a:t>Ann</a:t></a:r>"));
    }

    #[test]
    fn test_rewrite_group_and_table_text() {
        let mut doc = TemplateDocument::new();
        doc.add_slide(parse_slide(GROUP_AND_TABLE_SLIDE, 1).unwrap());
        assert_eq!(doc.resolve(&map(&[("A", "1"), ("B", "2")]), Redistribution::Anchored), 2);

        let out = String::from_utf8(rewrite_slide(GROUP_AND_TABLE_SLIDE, &doc.slides[0]).unwrap()).unwrap();
        assert!(out.contains(r#"<a:r><a:rPr b="1"/><a:t>2</a:t></a:r><a:r><a:rPr b="0"/><a:t></a:t></a:r>"#));
        assert!(out.contains("<a:tcPr/></a:tc>"));
        assert!(out.contains(r#"<p:cNvPr id="2" name="Group 1"/>"#));

        let reparsed = parse_slide(&out, 1).unwrap();
        let texts: Vec<String> = reparsed
            .shapes
            .iter()
            .filter_map(|s| s.text_frame.as_ref())
            .flat_map(|f| f.paragraphs.iter().map(|p| p.text()))
            .collect();
        assert_eq!(texts, vec!["1", "2", "c"]);
    }

    #[test]
    fn test_rewrite_rejects_mismatched_model() {
        let xml = slide_xml(&[("Title", &[&["one", "two"]])]);
        let other = slide_xml(&[("Title", &[&["one"]])]);
        let slide = parse_slide(&other, 1).unwrap();
        assert!(matches!(rewrite_slide(&xml, &slide), Err(Error::TemplateError(_))));
    }

    #[test]
    fn test_write_document_round_trip() {
        let xml = slide_xml(&[("Name", &[&["{{Name}}"]])]);
        let bytes = build_pptx(&[("slide1.xml", xml.as_str())]);
        let template = PptxTemplate::from_reader(Cursor::new(bytes)).unwrap();

        let mut doc = template.document().clone();
        doc.resolve(&map(&[("Name", "Олена")]), Redistribution::Anchored);

        let mut out = Cursor::new(Vec::new());
        template.write_document(&doc, &mut out).unwrap();

        let filled = PptxTemplate::from_reader(Cursor::new(out.into_inner())).unwrap();
        assert_eq!(filled.document().paragraph_texts(), vec!["Олена"]);
        let png = filled.entries.iter().find(|e| e.name == "ppt/media/image1.png").unwrap();
        assert_eq!(png.data, vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3]);
        // Entry order is preserved.
        assert_eq!(filled.entries[0].name, "[Content_Types].xml");
    }

    #[test]
    fn test_write_document_slide_count_mismatch() {
        let xml = slide_xml(&[("Name", &[&["x"]])]);
        let template = PptxTemplate::from_reader(Cursor::new(build_pptx(&[("slide1.xml", xml.as_str())]))).unwrap();
        let err = template
            .write_document(&TemplateDocument::new(), Cursor::new(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, Error::TemplateError(_)));
    }
}
