//! Core domain types, placeholder resolution, and batch orchestration for
//! certificate generation.

pub mod batch;
pub mod error;
pub mod markers;
pub mod resolve;
pub mod types;

pub use batch::{
    BatchDriver, BatchReport, DocumentComposer, DocumentConverter, GroupPhase, GroupReport,
    GroupStatus, RecordSource,
};
pub use error::{Error, Result};
pub use markers::find_markers;
pub use resolve::{resolve_texts, Redistribution, Resolution};
pub use types::{
    marker_tag, ComposeSummary, Paragraph, Record, RecordGroup, Row, Run,
    Shape, Slide, SubstitutionMap, TemplateDocument, TextFrame,
};
