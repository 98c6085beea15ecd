//! Document-to-PDF conversion for certificate generation.
//!
//! Filled documents are converted with a headless LibreOffice and merged
//! into one PDF per group with `pdfunite`.

pub mod libreoffice;

pub use libreoffice::{ConversionSession, LibreOfficeConverter};
