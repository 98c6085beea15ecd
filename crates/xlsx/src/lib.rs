//! XLSX (Office Open XML) workbook reader for certificate generation.
//!
//! Reads .xlsx files, which are ZIP archives of XML parts, into record
//! groups: one group per worksheet.

pub mod numfmt;
pub mod reader;

pub use numfmt::{NumberFormats, NumberKind};
pub use reader::{SheetInfo, WorkbookReader, XlsxSource};
