//! In-memory PPTX fixtures for tests.

use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::ZipWriter;

/// Slide XML with one shape per `(name, paragraphs)`; each paragraph is a
/// list of run texts inserted verbatim (already XML-escaped).
pub(crate) fn slide_xml(shapes: &[(&str, &[&[&str]])]) -> String {
    let mut body = String::new();
    for (id, (name, paragraphs)) in shapes.iter().enumerate() {
        body.push_str(&format!(
            r#"<p:sp><p:nvSpPr><p:cNvPr id="{}" name="{}"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:lstStyle/>"#,
            id + 2,
            name
        ));
        for runs in paragraphs.iter() {
            body.push_str("<a:p>");
            for (i, text) in runs.iter().enumerate() {
                body.push_str(&format!(
                    r#"<a:r><a:rPr lang="uk-UA" b="{}" dirty="0"/><a:t>{}</a:t></a:r>"#,
                    i % 2,
                    text
                ));
            }
            body.push_str(r#"<a:endParaRPr lang="uk-UA"/></a:p>"#);
        }
        body.push_str("</p:txBody></p:sp>");
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{}</p:spTree></p:cSld></p:sld>"#,
        body
    )
}

/// A slide with a text shape nested in a group and a one-row, two-cell
/// table whose first cell splits `{{B}}` across two runs.
pub(crate) const GROUP_AND_TABLE_SLIDE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>
<p:grpSp><p:nvGrpSpPr><p:cNvPr id="2" name="Group 1"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>
<p:sp><p:nvSpPr><p:cNvPr id="3" name="Grouped"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:p><a:r><a:rPr lang="uk-UA"/><a:t>{{A}}</a:t></a:r></a:p></p:txBody></p:sp>
</p:grpSp>
<p:graphicFrame><p:nvGraphicFramePr><p:cNvPr id="4" name="Table 1"/><p:cNvGraphicFramePr/><p:nvPr/></p:nvGraphicFramePr><p:xfrm/><a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/table"><a:tbl><a:tblGrid><a:gridCol w="100"/><a:gridCol w="100"/></a:tblGrid><a:tr h="50"><a:tc><a:txBody><a:bodyPr/><a:p><a:r><a:rPr b="1"/><a:t>{{</a:t></a:r><a:r><a:rPr b="0"/><a:t>B}}</a:t></a:r></a:p></a:txBody><a:tcPr/></a:tc><a:tc><a:txBody><a:bodyPr/><a:p><a:r><a:rPr/><a:t>c</a:t></a:r></a:p></a:txBody><a:tcPr/></a:tc></a:tr></a:tbl></a:graphicData></a:graphic></p:graphicFrame>
</p:spTree></p:cSld></p:sld>"#;

/// A minimal PPTX archive. Slides are listed in `sldIdLst` in the given
/// order and stored as `ppt/slides/<file>`.
pub(crate) fn build_pptx(slides: &[(&str, &str)]) -> Vec<u8> {
    let mut ids = String::new();
    let mut rels = String::new();
    for (i, (file, _)) in slides.iter().enumerate() {
        ids.push_str(&format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + i, i + 10));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/{}"/>"#,
            i + 10,
            file
        ));
    }
    rels.push_str(r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="slideMasters/slideMaster1.xml"/>"#);

    let presentation = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:presentation xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:sldIdLst>{}</p:sldIdLst></p:presentation>"#,
        ids
    );
    let presentation_rels = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{}</Relationships>"#,
        rels
    );

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default();

    writer.start_file("[Content_Types].xml", options).unwrap();
    writer
        .write_all(br#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#)
        .unwrap();
    writer.add_directory("ppt/", options).unwrap();
    writer.start_file("ppt/presentation.xml", options).unwrap();
    writer.write_all(presentation.as_bytes()).unwrap();
    writer.start_file("ppt/_rels/presentation.xml.rels", options).unwrap();
    writer.write_all(presentation_rels.as_bytes()).unwrap();
    for (file, xml) in slides {
        writer.start_file(format!("ppt/slides/{}", file), options).unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
    }
    writer.start_file("ppt/media/image1.png", options).unwrap();
    writer.write_all(&[0x89, b'P', b'N', b'G', 0, 1, 2, 3]).unwrap();

    writer.finish().unwrap().into_inner()
}
