//! Batch orchestration: one filled document per record, one merged output
//! per record group.
//!
//! Each group moves through [`GroupPhase::Collecting`], [`GroupPhase::Merging`]
//! and [`GroupPhase::Cleanup`] before reaching [`GroupPhase::Done`]. Cleanup
//! runs whether or not the merge succeeded, and a merge failure never stops
//! the groups that follow.

use crate::error::Result;
use crate::types::{ComposeSummary, RecordGroup, SubstitutionMap};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Supplies the record groups for a run.
pub trait RecordSource {
    fn load_groups(&mut self) -> Result<Vec<RecordGroup>>;
}

/// Writes one filled document for a substitution map.
pub trait DocumentComposer {
    /// Extension of the documents this composer writes, without the dot.
    fn document_extension(&self) -> &str;

    fn compose(&self, output: &Path, substitutions: &SubstitutionMap) -> Result<ComposeSummary>;
}

/// Merges an ordered list of documents into one portable output file.
pub trait DocumentConverter {
    /// Extension of the combined output, without the dot.
    fn output_extension(&self) -> &str;

    fn merge(&self, documents: &[PathBuf], output: &Path) -> Result<()>;
}

/// Processing phase of a single group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPhase {
    Collecting,
    Merging,
    Cleanup,
    Done,
}

impl fmt::Display for GroupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Collecting => "collecting",
            Self::Merging => "merging",
            Self::Cleanup => "cleanup",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// How a group ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupStatus {
    /// The filled documents were merged into `output`.
    Merged { output: PathBuf },
    /// The converter failed; no combined output was produced.
    MergeFailed { error: String },
    /// No record in the group had any usable field.
    Empty,
}

/// Per-group result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupReport {
    pub group: String,

    /// Number of filled documents composed.
    pub documents: usize,

    pub status: GroupStatus,

    /// Temporary files that could not be deleted.
    pub cleanup_failures: Vec<PathBuf>,
}

/// Result of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub groups: Vec<GroupReport>,
}

impl BatchReport {
    /// Groups whose merge failed.
    pub fn failed_groups(&self) -> Vec<&GroupReport> {
        self.groups
            .iter()
            .filter(|g| matches!(g.status, GroupStatus::MergeFailed { .. }))
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failed_groups().is_empty()
    }
}

/// Drives a full run over a record source.
pub struct BatchDriver<C, V> {
    composer: C,
    converter: V,
    output_folder: PathBuf,
    group_filter: Vec<String>,
}

impl<C: DocumentComposer, V: DocumentConverter> BatchDriver<C, V> {
    pub fn new(composer: C, converter: V, output_folder: impl Into<PathBuf>) -> Self {
        Self {
            composer,
            converter,
            output_folder: output_folder.into(),
            group_filter: Vec::new(),
        }
    }

    /// Only process the named groups. An empty list processes all of them.
    pub fn with_group_filter(mut self, groups: Vec<String>) -> Self {
        self.group_filter = groups;
        self
    }

    /// Process every group from `source`.
    ///
    /// Load failures and composition failures abort the run; merge and
    /// cleanup failures are recorded in the report.
    pub fn run<S: RecordSource + ?Sized>(&self, source: &mut S) -> Result<BatchReport> {
        fs::create_dir_all(&self.output_folder)?;

        let groups = source.load_groups()?;
        for name in self.unmatched_filters(&groups) {
            log::warn!("Sheet {} was selected but is not in the workbook", name);
        }
        let mut report = BatchReport::default();

        for group in &groups {
            if !self.group_filter.is_empty() && !self.group_filter.contains(&group.name) {
                log::debug!("Skipping sheet {} (not selected)", group.name);
                continue;
            }
            report.groups.push(self.process_group(group)?);
        }

        Ok(report)
    }

    /// Names in the group filter that match none of `groups`.
    pub fn unmatched_filters<'a>(&'a self, groups: &[RecordGroup]) -> Vec<&'a str> {
        self.group_filter
            .iter()
            .filter(|name| !groups.iter().any(|g| &g.name == *name))
            .map(String::as_str)
            .collect()
    }

    /// Process one group: compose, merge, clean up.
    pub fn process_group(&self, group: &RecordGroup) -> Result<GroupReport> {
        let mut phase = GroupPhase::Collecting;
        log::debug!("Sheet {}: {}", group.name, phase);

        let mut documents: Vec<PathBuf> = Vec::new();
        for record in group.records() {
            log::info!(
                "Processing row {} on sheet {} ({} field(s))",
                record.row_index,
                group.name,
                record.substitutions.len()
            );

            let path = self.temp_path(&group.name, record.row_index);
            documents.push(path.clone());

            match self.composer.compose(&path, &record.substitutions) {
                Ok(summary) => {
                    if !summary.unresolved.is_empty() {
                        log::warn!(
                            "Row {} on sheet {} left markers unresolved: {}",
                            record.row_index,
                            group.name,
                            summary.unresolved.join(", ")
                        );
                    }
                }
                Err(e) => {
                    self.cleanup(&documents);
                    return Err(e);
                }
            }
        }

        let status = if documents.is_empty() {
            log::info!("Sheet {} has no records, nothing to merge", group.name);
            GroupStatus::Empty
        } else {
            phase = GroupPhase::Merging;
            log::debug!("Sheet {}: {}", group.name, phase);

            let output = self.output_path(&group.name);
            match self.converter.merge(&documents, &output) {
                Ok(()) => {
                    log::info!(
                        "All certificates from sheet {} saved to {}",
                        group.name,
                        output.display()
                    );
                    GroupStatus::Merged { output }
                }
                Err(e) => {
                    log::warn!("Failed to merge sheet {}: {}", group.name, e);
                    GroupStatus::MergeFailed {
                        error: e.to_string(),
                    }
                }
            }
        };

        phase = GroupPhase::Cleanup;
        log::debug!("Sheet {}: {}", group.name, phase);
        let cleanup_failures = self.cleanup(&documents);

        phase = GroupPhase::Done;
        log::debug!("Sheet {}: {}", group.name, phase);

        Ok(GroupReport {
            group: group.name.clone(),
            documents: documents.len(),
            status,
            cleanup_failures,
        })
    }

    /// `<output>/<group>_temp_<row>.<doc-ext>`
    pub fn temp_path(&self, group: &str, row_index: usize) -> PathBuf {
        self.output_folder.join(format!(
            "{}_temp_{}.{}",
            group,
            row_index,
            self.composer.document_extension()
        ))
    }

    /// `<output>/<group>.<output-ext>`
    pub fn output_path(&self, group: &str) -> PathBuf {
        self.output_folder
            .join(format!("{}.{}", group, self.converter.output_extension()))
    }

    /// Delete temporary documents, returning the ones that could not be removed.
    fn cleanup(&self, documents: &[PathBuf]) -> Vec<PathBuf> {
        let mut failures = Vec::new();
        for path in documents {
            if !path.exists() {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => log::info!("Removed temporary file {}", path.display()),
                Err(e) => {
                    log::warn!("Failed to remove temporary file {}: {}", path.display(), e);
                    failures.push(path.clone());
                }
            }
        }
        failures
    }
}
