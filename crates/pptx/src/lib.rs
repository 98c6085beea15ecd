//! PPTX (Office Open XML) backend for certificate generation.
//!
//! Loads a .pptx template (a ZIP archive of XML parts), fills its markers
//! per record, and writes the result back with all formatting intact.

pub mod composer;
pub mod parser;
pub mod writer;

#[cfg(test)]
mod testing;

pub use composer::{compose_certificate, PptxComposer};
pub use parser::PptxTemplate;
