//! XLSX workbook reader.
//!
//! Each worksheet becomes a [`RecordGroup`]: row 1 supplies the headers and
//! every later row is a record keyed by its sheet row number.

use crate::numfmt::{self, parse_styles, NumberFormats};
use certgen_core::{Error, RecordGroup, RecordSource, Result, Row};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const STYLES_PART: &str = "xl/styles.xml";

/// Columns A through XFD.
const MAX_COLUMNS: usize = 16_384;

/// A worksheet listed in the workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetInfo {
    pub name: String,
    /// Archive part holding the sheet XML.
    pub part: String,
}

/// Reader over an open XLSX archive.
pub struct WorkbookReader<R: Read + Seek> {
    archive: ZipArchive<R>,
}

impl WorkbookReader<BufReader<File>> {
    /// Open a workbook on disk.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::WorkbookError(format!("Failed to open workbook {}: {}", path.display(), e))
        })?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> WorkbookReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        let archive =
            ZipArchive::new(reader).map_err(|e| Error::ZipError(format!("Failed to open ZIP: {}", e)))?;
        Ok(Self { archive })
    }

    /// Worksheets in workbook order.
    pub fn sheets(&mut self) -> Result<Vec<SheetInfo>> {
        let targets = self.read_relationship_targets()?;
        let workbook = self.read_part(WORKBOOK_PART)?;

        let mut sheets = Vec::new();
        let mut reader = Reader::from_str(&workbook);
        reader.trim_text(true);

        loop {
            match reader.read_event() {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                    if local_name(e.name().as_ref()) == b"sheet" =>
                {
                    let name = attr_value(e, b"name").unwrap_or_default();
                    let rel_id = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref().ends_with(b":id"))
                        .map(|a| String::from_utf8_lossy(&a.value).to_string());

                    match rel_id.and_then(|id| targets.get(&id).cloned()) {
                        Some(part) => sheets.push(SheetInfo { name, part }),
                        None => log::warn!("Sheet {} has no worksheet part, skipping", name),
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::XmlError(format!("Error parsing workbook.xml: {}", e)));
                }
                _ => {}
            }
        }

        Ok(sheets)
    }

    /// Read every worksheet as a record group.
    pub fn read_groups(&mut self) -> Result<Vec<RecordGroup>> {
        let shared = self.read_shared_strings()?;
        let formats = self.read_number_formats()?;
        let sheets = self.sheets()?;

        let mut groups = Vec::with_capacity(sheets.len());
        for sheet in sheets {
            let xml = self.read_part(&sheet.part)?;
            let group = parse_sheet(&sheet.name, &xml, &shared, &formats)?;
            log::debug!(
                "Sheet {}: {} header(s), {} data row(s)",
                group.name,
                group.headers.len(),
                group.rows.len()
            );
            groups.push(group);
        }

        Ok(groups)
    }

    /// The shared string table; empty when the workbook has none.
    fn read_shared_strings(&mut self) -> Result<Vec<String>> {
        if self.archive.by_name(SHARED_STRINGS_PART).is_err() {
            return Ok(Vec::new());
        }
        let xml = self.read_part(SHARED_STRINGS_PART)?;
        parse_shared_strings(&xml)
    }

    /// Date styles from the stylesheet and the workbook's date system.
    fn read_number_formats(&mut self) -> Result<NumberFormats> {
        let date1904 = parse_date1904(&self.read_part(WORKBOOK_PART)?)?;
        if self.archive.by_name(STYLES_PART).is_err() {
            return Ok(NumberFormats::new(Vec::new(), date1904));
        }
        let kinds = parse_styles(&self.read_part(STYLES_PART)?)?;
        Ok(NumberFormats::new(kinds, date1904))
    }

    /// Map of relationship id to worksheet part name.
    fn read_relationship_targets(&mut self) -> Result<HashMap<String, String>> {
        let rels_content = self.read_part(WORKBOOK_RELS_PART)?;
        let mut targets = HashMap::new();

        let mut reader = Reader::from_str(&rels_content);
        reader.trim_text(true);

        loop {
            match reader.read_event() {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                    if e.name().as_ref() == b"Relationship" =>
                {
                    let rel_type = attr_value(e, b"Type").unwrap_or_default();
                    if rel_type.ends_with("/worksheet") {
                        if let (Some(id), Some(target)) = (attr_value(e, b"Id"), attr_value(e, b"Target")) {
                            targets.insert(id, resolve_part_name(&target));
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::XmlError(format!(
                        "Error parsing workbook relationships: {}",
                        e
                    )));
                }
                _ => {}
            }
        }

        Ok(targets)
    }

    /// Read a file from the ZIP archive.
    fn read_part(&mut self, path: &str) -> Result<String> {
        let mut file = self
            .archive
            .by_name(path)
            .map_err(|e| Error::WorkbookError(format!("File not found in archive '{}': {}", path, e)))?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|e| Error::ZipError(format!("Failed to read '{}': {}", path, e)))?;

        Ok(content)
    }
}

/// A workbook on disk used as the record source for a batch run.
#[derive(Debug, Clone)]
pub struct XlsxSource {
    path: PathBuf,
}

impl XlsxSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSource for XlsxSource {
    fn load_groups(&mut self) -> Result<Vec<RecordGroup>> {
        WorkbookReader::open(&self.path)?.read_groups()
    }
}

/// Whether `workbookPr` selects the 1904 date system.
fn parse_date1904(xml: &str) -> Result<bool> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if local_name(e.name().as_ref()) == b"workbookPr" =>
            {
                let flag = attr_value(e, b"date1904").unwrap_or_default();
                return Ok(flag == "1" || flag.eq_ignore_ascii_case("true"));
            }
            Ok(Event::Eof) => return Ok(false),
            Err(e) => {
                return Err(Error::XmlError(format!("Error parsing workbook.xml: {}", e)));
            }
            _ => {}
        }
    }
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>> {
    let mut strings = Vec::new();
    let mut reader = Reader::from_str(xml);

    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::XmlError(format!("Error parsing shared strings: {}", e)))?;
        match event {
            Event::Start(ref e) => match local_name(e.name().as_ref()) {
                b"si" => current = Some(String::new()),
                b"rPh" => in_phonetic = true,
                b"t" if !in_phonetic => in_text = true,
                _ => {}
            },
            Event::Empty(ref e) if local_name(e.name().as_ref()) == b"si" => {
                strings.push(String::new());
            }
            Event::Text(ref e) if in_text => {
                let text = e
                    .unescape()
                    .map_err(|e| Error::XmlError(format!("Bad shared string: {}", e)))?;
                if let Some(current) = current.as_mut() {
                    current.push_str(&text);
                }
            }
            Event::End(ref e) => match local_name(e.name().as_ref()) {
                b"si" => strings.extend(current.take()),
                b"rPh" => in_phonetic = false,
                b"t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(strings)
}

/// The cell being read.
#[derive(Debug, Default)]
struct CellState {
    column: usize,
    kind: Option<String>,
    /// Index into the stylesheet's `cellXfs`.
    style: usize,
    raw: String,
}

impl CellState {
    fn decode(self, shared: &[String], formats: &NumberFormats) -> Option<String> {
        let value = match self.kind.as_deref() {
            Some("s") => {
                let idx: usize = self.raw.trim().parse().ok()?;
                shared.get(idx).cloned().unwrap_or_else(|| {
                    log::warn!("Shared string index {} out of range", idx);
                    String::new()
                })
            }
            Some("b") => {
                if self.raw.trim() == "1" {
                    "TRUE".to_string()
                } else {
                    "FALSE".to_string()
                }
            }
            Some("d") => numfmt::render_iso(&self.raw).unwrap_or(self.raw),
            Some("str") | Some("inlineStr") | Some("e") => self.raw,
            _ => formats.render(self.style, &self.raw).unwrap_or(self.raw),
        };
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

fn parse_sheet(
    name: &str,
    xml: &str,
    shared: &[String],
    formats: &NumberFormats,
) -> Result<RecordGroup> {
    let mut group = RecordGroup::new(name);
    let mut reader = Reader::from_str(xml);

    let mut row_index = 0;
    let mut cells: Vec<Option<String>> = Vec::new();
    let mut cell: Option<CellState> = None;
    let mut next_column = 0;
    let mut capture = false;
    let mut in_inline = false;
    let mut in_phonetic = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::XmlError(format!("Error parsing sheet {}: {}", name, e)))?;
        match event {
            Event::Start(ref e) => match local_name(e.name().as_ref()) {
                b"row" => {
                    row_index = row_number(e).unwrap_or(row_index + 1);
                    cells.clear();
                    next_column = 0;
                }
                b"c" => {
                    let column = cell_column(e).unwrap_or(next_column);
                    next_column = column + 1;
                    cell = Some(CellState {
                        column,
                        kind: attr_value(e, b"t"),
                        style: attr_value(e, b"s").and_then(|v| v.parse().ok()).unwrap_or(0),
                        raw: String::new(),
                    });
                }
                b"v" if cell.is_some() => capture = true,
                b"is" => in_inline = true,
                b"rPh" => in_phonetic = true,
                b"t" if in_inline && !in_phonetic => capture = true,
                _ => {}
            },
            Event::Empty(ref e) => match local_name(e.name().as_ref()) {
                b"row" => {
                    row_index = row_number(e).unwrap_or(row_index + 1);
                }
                b"c" => {
                    next_column = cell_column(e).unwrap_or(next_column) + 1;
                }
                _ => {}
            },
            Event::Text(ref e) if capture => {
                let text = e
                    .unescape()
                    .map_err(|e| Error::XmlError(format!("Bad cell text in sheet {}: {}", name, e)))?;
                if let Some(cell) = cell.as_mut() {
                    cell.raw.push_str(&text);
                }
            }
            Event::End(ref e) => match local_name(e.name().as_ref()) {
                b"v" | b"t" => capture = false,
                b"is" => in_inline = false,
                b"rPh" => in_phonetic = false,
                b"c" => {
                    if let Some(finished) = cell.take() {
                        let column = finished.column;
                        if column >= MAX_COLUMNS {
                            log::warn!("Sheet {}: ignoring cell beyond column XFD in row {}", name, row_index);
                        } else if let Some(value) = finished.decode(shared, formats) {
                            if cells.len() <= column {
                                cells.resize(column + 1, None);
                            }
                            cells[column] = Some(value);
                        }
                    }
                }
                b"row" => {
                    let row_cells = std::mem::take(&mut cells);
                    if row_index == 1 {
                        group.headers = row_cells.into_iter().map(Option::unwrap_or_default).collect();
                    } else if row_index > 1 {
                        group.rows.push(Row {
                            index: row_index,
                            cells: row_cells,
                        });
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(group)
}

fn row_number(e: &BytesStart<'_>) -> Option<usize> {
    attr_value(e, b"r")?.parse().ok()
}

fn cell_column(e: &BytesStart<'_>) -> Option<usize> {
    column_index(&attr_value(e, b"r")?)
}

/// Zero-based column index from a cell reference such as `"C5"` or `"AB12"`.
/// References past column XFD are rejected.
fn column_index(reference: &str) -> Option<usize> {
    let mut number: usize = 0;
    for letter in reference.bytes().take_while(u8::is_ascii_alphabetic) {
        let digit = (letter.to_ascii_uppercase() - b'A' + 1) as usize;
        number = number.checked_mul(26)?.checked_add(digit)?;
        if number > MAX_COLUMNS {
            return None;
        }
    }
    number.checked_sub(1)
}

pub(crate) fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.to_string()))
}

/// Turn a relationship target from workbook.xml.rels into a part name.
fn resolve_part_name(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        absolute.to_string()
    } else {
        format!("xl/{}", target)
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
