//! # Bimify CLI
//!
//! Usage:
//!   bimify convert logo.svg                        # writes logo.bimi.svg
//!   bimify convert logo.svg -o out.svg --shape rounded-square
//!   bimify convert a.svg b.svg -o dist/            # batch, one file per input
//!   bimify check logo.bimi.svg --report report.json
//!
//! Exits with status 1 when any input fails to convert or its result has
//! validation errors.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use bimify::{convert_batch, validate_markup, ConvertOptions, Shape, ValidateOptions, ValidationResult};
use clap::{Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use serde::Serialize;

/// Advisory added with `--traced`.
const TRACED_WARNING: &str =
    "source was traced from a raster image; review the vector output before publishing";

#[derive(Parser, Debug)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert SVG logos into canonical BIMI form
    Convert(ConvertArgs),

    /// Validate SVG documents against the BIMI profile
    Check(CheckArgs),
}

#[derive(clap::Args, Debug)]
struct ConvertArgs {
    /// Source SVG files
    #[arg(value_name = "INPUT", required = true, value_hint = clap::ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Output file, or output directory when several inputs are given
    #[arg(short, long, value_hint = clap::ValueHint::AnyPath)]
    output: Option<PathBuf>,

    /// Background shape
    #[arg(long, value_enum)]
    shape: Option<ShapeArg>,

    /// Background color
    #[arg(short, long, value_name = "COLOR")]
    background: Option<String>,

    /// Margin on each side, in percent of the canvas
    #[arg(short, long, value_name = "PERCENT")]
    padding: Option<f64>,

    /// Accessible title embedded in the output
    #[arg(short, long)]
    title: Option<String>,

    /// JSON options file; flags take precedence over its values
    #[arg(short = 'C', long, value_hint = clap::ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Mark the source as traced from a raster image
    #[arg(long)]
    traced: bool,

    /// Write a JSON report of every result
    #[arg(long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    report: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct CheckArgs {
    /// SVG files to check
    #[arg(value_name = "INPUT", required = true, value_hint = clap::ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Nominal padding for the safe-area rule
    #[arg(short, long, value_name = "PERCENT")]
    padding: Option<f64>,

    /// Write a JSON report of every result
    #[arg(long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    report: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ShapeArg {
    Circle,
    RoundedSquare,
}

impl From<ShapeArg> for Shape {
    fn from(arg: ShapeArg) -> Self {
        match arg {
            ShapeArg::Circle => Shape::Circle,
            ShapeArg::RoundedSquare => Shape::RoundedSquare,
        }
    }
}

/// One entry of the `--report` file.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileReport {
    input: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    validation: Option<ValidationResult>,
}

impl FileReport {
    fn passed(&self) -> bool {
        self.error.is_none() && self.validation.as_ref().is_some_and(ValidationResult::is_valid)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Convert(args) => run_convert(args),
        Commands::Check(args) => run_check(args),
    };
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("✗ {e:#}");
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Convert
// =============================================================================

fn run_convert(args: ConvertArgs) -> Result<bool> {
    let options = load_options(&args)?;
    let outputs = output_paths(&args.inputs, args.output.as_deref())?;

    let sources = args
        .inputs
        .iter()
        .map(|path| {
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let markup: Vec<&str> = sources.iter().map(String::as_str).collect();

    let mut reports = Vec::with_capacity(markup.len());
    let results = convert_batch(&markup, &options);
    for ((input, output), result) in args.inputs.iter().zip(outputs).zip(results) {
        let report = match result {
            Ok(mut conversion) => {
                if args.traced {
                    conversion.validation.warning(TRACED_WARNING);
                }
                fs::write(&output, &conversion.document)
                    .with_context(|| format!("failed to write {}", output.display()))?;
                print_findings(&conversion.validation);
                if conversion.validation.is_valid() {
                    eprintln!(
                        "✓ {} → {} ({} bytes)",
                        input.display(),
                        output.display(),
                        conversion.document.len()
                    );
                } else {
                    eprintln!(
                        "✗ {} → {} has {} validation error(s)",
                        input.display(),
                        output.display(),
                        conversion.validation.errors.len()
                    );
                }
                FileReport {
                    input: input.clone(),
                    output: Some(output),
                    error: None,
                    validation: Some(conversion.validation),
                }
            }
            Err(e) => {
                eprintln!("✗ Failed to convert {}: {e}", input.display());
                FileReport {
                    input: input.clone(),
                    output: None,
                    error: Some(e.to_string()),
                    validation: None,
                }
            }
        };
        reports.push(report);
    }

    finish(&reports, args.report.as_deref())
}

/// Options from `--config`, overridden by explicit flags.
fn load_options(args: &ConvertArgs) -> Result<ConvertOptions> {
    let mut options = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str::<ConvertOptions>(&text)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => ConvertOptions::default(),
    };
    if let Some(shape) = args.shape {
        options.shape = shape.into();
    }
    if let Some(color) = &args.background {
        options.background_color = color.clone();
    }
    if let Some(padding) = args.padding {
        options.padding_percent = padding;
    }
    if let Some(title) = &args.title {
        options.title = Some(title.clone());
    }
    Ok(options)
}

/// Where each converted input is written.
///
/// One input: `-o` names the file. Several inputs: `-o` names a directory.
/// Without `-o`, `logo.svg` is written next to itself as `logo.bimi.svg`.
fn output_paths(inputs: &[PathBuf], output: Option<&Path>) -> Result<Vec<PathBuf>> {
    match (inputs, output) {
        ([_], Some(file)) => Ok(vec![file.to_path_buf()]),
        (_, Some(dir)) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            Ok(inputs.iter().map(|input| dir.join(converted_name(input))).collect())
        }
        (_, None) => Ok(inputs
            .iter()
            .map(|input| input.with_file_name(converted_name(input)))
            .collect()),
    }
}

fn converted_name(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_else(|| "logo".into());
    format!("{stem}.bimi.svg")
}

// =============================================================================
// Check
// =============================================================================

fn run_check(args: CheckArgs) -> Result<bool> {
    let options = match args.padding {
        Some(padding_percent) => ValidateOptions { padding_percent },
        None => ValidateOptions::default(),
    };

    let reports: Vec<FileReport> = args
        .inputs
        .par_iter()
        .map(|input| match fs::read_to_string(input) {
            Ok(markup) => FileReport {
                input: input.clone(),
                output: None,
                error: None,
                validation: Some(validate_markup(&markup, &options)),
            },
            Err(e) => FileReport {
                input: input.clone(),
                output: None,
                error: Some(format!("failed to read: {e}")),
                validation: None,
            },
        })
        .collect();

    for report in &reports {
        if let Some(validation) = &report.validation {
            print_findings(validation);
        }
        match (&report.error, report.passed()) {
            (Some(e), _) => eprintln!("✗ {}: {e}", report.input.display()),
            (None, true) => eprintln!("✓ {}", report.input.display()),
            (None, false) => eprintln!("✗ {}", report.input.display()),
        }
    }

    finish(&reports, args.report.as_deref())
}

// =============================================================================
// Output
// =============================================================================

fn print_findings(validation: &ValidationResult) {
    for error in &validation.errors {
        eprintln!("  error: {error}");
    }
    for warning in &validation.warnings {
        eprintln!("  warning: {warning}");
    }
}

/// Write the optional report and decide the exit status.
fn finish(reports: &[FileReport], report_path: Option<&Path>) -> Result<bool> {
    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(reports)?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("✓ Report written to {}", path.display());
    }
    Ok(reports.iter().all(FileReport::passed))
}
