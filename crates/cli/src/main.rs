//! CLI tool for generating certificates from a PowerPoint template and an
//! Excel workbook.

use anyhow::{Context, Result};
use certgen_convert::LibreOfficeConverter;
use certgen_core::{BatchDriver, BatchReport, GroupStatus, Redistribution};
use certgen_pptx::PptxComposer;
use certgen_xlsx::XlsxSource;
use clap::Parser;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Fill a PowerPoint template once per spreadsheet row and merge each sheet
/// into a single PDF.
#[derive(Parser, Debug)]
#[command(name = "certgen")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// PowerPoint template containing {{Field}} markers
    #[arg(short, long, default_value = "template.pptx")]
    template: PathBuf,

    /// Excel workbook; row 1 of each sheet holds the field names
    #[arg(short, long, default_value = "input.xlsx")]
    workbook: PathBuf,

    /// Output folder for the merged PDFs (created if missing)
    #[arg(short, long, default_value = "certificates")]
    output: PathBuf,

    /// Only process these sheets (repeatable)
    #[arg(long = "sheet")]
    sheets: Vec<String>,

    /// LibreOffice executable
    #[arg(long, default_value = "soffice")]
    soffice: PathBuf,

    /// pdfunite executable
    #[arg(long, default_value = "pdfunite")]
    pdfunite: PathBuf,

    /// Refill runs by their original lengths instead of anchoring values to markers
    #[arg(long)]
    legacy_redistribution: bool,

    /// Print the markers found in the template and exit
    #[arg(long)]
    list_markers: bool,

    /// Write a JSON report of every sheet's outcome to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let policy = if args.legacy_redistribution {
        Redistribution::Legacy
    } else {
        Redistribution::Anchored
    };

    let composer = PptxComposer::open(&args.template)
        .with_context(|| format!("Failed to load template {}", args.template.display()))?
        .with_redistribution(policy);

    if args.list_markers {
        for marker in composer.template().markers() {
            println!("{}", marker);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let converter = LibreOfficeConverter::new()
        .with_soffice(&args.soffice)
        .with_pdfunite(&args.pdfunite);

    let driver = BatchDriver::new(composer, converter, &args.output).with_group_filter(args.sheets.clone());
    let mut source = XlsxSource::new(&args.workbook);

    let report = driver
        .run(&mut source)
        .with_context(|| format!("Failed to process {}", args.workbook.display()))?;

    print_summary(&report);

    if let Some(path) = &args.report {
        write_report(path, &report)?;
        log::info!("Report written to {}", path.display());
    }

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(2))
    }
}

/// One line per sheet on stderr.
fn print_summary(report: &BatchReport) {
    for group in &report.groups {
        match &group.status {
            GroupStatus::Merged { output } => eprintln!(
                "{}: {} certificate(s) -> {}",
                group.group,
                group.documents,
                output.display()
            ),
            GroupStatus::MergeFailed { error } => {
                eprintln!("{}: merge failed: {}", group.group, error)
            }
            GroupStatus::Empty => eprintln!("{}: no records", group.group),
        }
        for path in &group.cleanup_failures {
            eprintln!("  temporary file left behind: {}", path.display());
        }
    }
}

/// Write the report as pretty JSON.
fn write_report(path: &Path, report: &BatchReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    let mut file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(json.as_bytes())
        .with_context(|| format!("Failed to write to {}", path.display()))?;
    Ok(())
}
