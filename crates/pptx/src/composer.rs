//! Filling a PPTX template for one record.

use crate::parser::PptxTemplate;
use certgen_core::{ComposeSummary, DocumentComposer, Redistribution, Result, SubstitutionMap};
use std::path::Path;

/// Composes filled PPTX documents from a template loaded once.
#[derive(Debug, Clone)]
pub struct PptxComposer {
    template: PptxTemplate,
    policy: Redistribution,
}

impl PptxComposer {
    /// Load the template at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_template(PptxTemplate::open(path)?))
    }

    pub fn from_template(template: PptxTemplate) -> Self {
        Self {
            template,
            policy: Redistribution::default(),
        }
    }

    /// Choose how resolved text is written back into runs.
    pub fn with_redistribution(mut self, policy: Redistribution) -> Self {
        self.policy = policy;
        self
    }

    pub fn template(&self) -> &PptxTemplate {
        &self.template
    }
}

impl DocumentComposer for PptxComposer {
    fn document_extension(&self) -> &str {
        "pptx"
    }

    fn compose(&self, output: &Path, substitutions: &SubstitutionMap) -> Result<ComposeSummary> {
        let mut document = self.template.document().clone();
        let replacements = document.resolve(substitutions, self.policy);
        let unresolved = document.markers();

        self.template.save_document(&document, output)?;
        log::debug!(
            "Wrote {} ({} replacement(s))",
            output.display(),
            replacements
        );

        Ok(ComposeSummary {
            replacements,
            unresolved,
        })
    }
}

/// Load `template`, fill it with `substitutions`, and write it to `output`.
pub fn compose_certificate(
    template: &Path,
    output: &Path,
    substitutions: &SubstitutionMap,
) -> Result<ComposeSummary> {
    PptxComposer::open(template)?.compose(output, substitutions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{build_pptx, slide_xml};
    use certgen_core::Error;
    use std::fs;

    fn write_template(dir: &Path) -> std::path::PathBuf {
        let first = slide_xml(&[
            ("Title", &[&["Certificate"]]),
            ("Recipient", &[&["Awarded to ", "{{", "Прізвище та ім'я", "}}"]]),
        ]);
        let second = slide_xml(&[("Footer", &[&["{{Date}}", " / ", "{{Missing}}"]])]);
        let path = dir.join("template.pptx");
        fs::write(
            &path,
            build_pptx(&[("slide1.xml", first.as_str()), ("slide2.xml", second.as_str())]),
        )
        .unwrap();
        path
    }

    fn map(pairs: &[(&str, &str)]) -> SubstitutionMap {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_compose_fills_every_slide() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path());
        let output = dir.path().join("out.pptx");

        let summary = compose_certificate(
            &template,
            &output,
            &map(&[("Прізвище та ім'я", "Шевченко Тарас"), ("Date", "2024-05-01")]),
        )
        .unwrap();

        assert_eq!(summary.replacements, 2);
        assert_eq!(summary.unresolved, vec!["Missing"]);

        let filled = PptxTemplate::open(&output).unwrap();
        assert_eq!(
            filled.document().paragraph_texts(),
            vec![
                "Certificate",
                "Awarded to Шевченко Тарас",
                "2024-05-01 / {{Missing}}"
            ]
        );
    }

    #[test]
    fn test_template_reused_unmodified() {
        let dir = tempfile::tempdir().unwrap();
        let composer = PptxComposer::open(&write_template(dir.path())).unwrap();
        let before = composer.template().document().clone();

        composer
            .compose(&dir.path().join("a.pptx"), &map(&[("Date", "first")]))
            .unwrap();
        composer
            .compose(&dir.path().join("b.pptx"), &map(&[("Date", "second")]))
            .unwrap();

        assert_eq!(composer.template().document(), &before);
        let b = PptxTemplate::open(&dir.path().join("b.pptx")).unwrap();
        assert_eq!(b.document().paragraph_texts()[2], "second / {{Missing}}");
    }

    #[test]
    fn test_legacy_redistribution() {
        let dir = tempfile::tempdir().unwrap();
        let composer = PptxComposer::open(&write_template(dir.path()))
            .unwrap()
            .with_redistribution(Redistribution::Legacy);
        let output = dir.path().join("legacy.pptx");
        composer
            .compose(&output, &map(&[("Прізвище та ім'я", "Ann")]))
            .unwrap();

        let filled = PptxTemplate::open(&output).unwrap();
        let recipient = filled.document().slides[0].shapes[1]
            .text_frame
            .as_ref()
            .unwrap();
        assert_eq!(
            recipient.paragraphs[0].run_texts(),
            vec!["Awarded to ", "An", "n", ""]
        );
    }

    #[test]
    fn test_unwritable_output() {
        let dir = tempfile::tempdir().unwrap();
        let composer = PptxComposer::open(&write_template(dir.path())).unwrap();
        let err = composer
            .compose(&dir.path().join("missing").join("out.pptx"), &map(&[("Date", "x")]))
            .unwrap_err();
        assert!(matches!(err, Error::IoError(_)));
    }

    #[test]
    fn test_unloadable_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pptx");
        fs::write(&path, b"definitely not a zip").unwrap();
        assert!(PptxComposer::open(&path).is_err());
    }
}
