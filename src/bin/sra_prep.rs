use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use sra_prep::app::{App, FileListRequest, FilesRequest, TemplateRequest, ValidateRequest};
use sra_prep::config::ConfigLoader;
use sra_prep::domain::{FieldKind, TableFormat};
use sra_prep::error::PrepError;
use sra_prep::files::LocalFileSystem;
use sra_prep::output::{HumanOutput, JsonOutput, OutputMode};

#[derive(Parser)]
#[command(name = "sra-prep")]
#[command(about = "Validate and normalize metagenome metadata and read files for SRA submission")]
#[command(version, author)]
struct Cli {
    /// Print machine-readable JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    /// Also write logs to this file (`auto` picks a timestamped name).
    #[arg(long, global = true, value_name = "PATH|auto")]
    log_file: Option<String>,

    /// JSON config file (default: ./sra-prep.json, then the user config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Validate, normalize and rewrite metadata tables")]
    Validate(ValidateArgs),
    #[command(about = "Cross-check file references against the sequence directory")]
    Files(FilesArgs),
    #[command(about = "Generate metadata templates from a directory of FASTQ files")]
    Template(TemplateArgs),
    #[command(about = "Write the list of files referenced by a sample table")]
    FileList(FileListArgs),
    #[command(about = "Normalize a single value")]
    Normalize(NormalizeArgs),
}

#[derive(Args)]
struct ValidateArgs {
    /// SRA sample metadata table (.txt, .tsv, .csv or .xlsx).
    #[arg(long)]
    sample: Option<PathBuf>,

    /// BioSample attribute table.
    #[arg(long)]
    bioproject: Option<PathBuf>,

    #[arg(long)]
    sample_output: Option<PathBuf>,

    #[arg(long)]
    bioproject_output: Option<PathBuf>,

    /// Write validated_sample.<ext> / validated_bioproject.<ext> here.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Directory holding the sequence files.
    #[arg(long)]
    sequence_dir: Option<PathBuf>,

    /// Check that every referenced file exists.
    #[arg(long)]
    check_files: bool,

    #[arg(long)]
    recursive: bool,

    /// Stream every .gz file through a decoder.
    #[arg(long, requires = "check_files")]
    check_gzip: bool,

    /// Remove samples with missing files from both tables.
    #[arg(long, requires = "check_files")]
    drop_incomplete: bool,

    /// Also write the upload file list.
    #[arg(long)]
    file_list: Option<PathBuf>,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct FilesArgs {
    #[arg(long)]
    sample: PathBuf,

    #[arg(long)]
    sequence_dir: Option<PathBuf>,

    #[arg(long)]
    recursive: bool,

    #[arg(long)]
    check_gzip: bool,
}

#[derive(Args)]
struct TemplateArgs {
    /// Directory of FASTQ files.
    dir: PathBuf,

    #[arg(long)]
    recursive: bool,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = TableFormat::Tsv)]
    format: TableFormat,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct FileListArgs {
    #[arg(long)]
    sample: PathBuf,

    #[arg(long)]
    sequence_dir: Option<PathBuf>,

    #[arg(long, default_value = "file_list.txt")]
    output: PathBuf,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct NormalizeArgs {
    /// date, lat-lon, geo-loc-name, library-layout or sample-source
    kind: String,

    value: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<PrepError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PrepError) -> u8 {
    match error {
        PrepError::ValidationFailed { .. } | PrepError::NoSequenceFiles(_) => 2,
        PrepError::UnsupportedFormat(_)
        | PrepError::TableRead { .. }
        | PrepError::EmptyTable(_)
        | PrepError::Spreadsheet(_)
        | PrepError::ConfigRead(_)
        | PrepError::ConfigParse(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let app = App::new(LocalFileSystem, config);

    match cli.command {
        Commands::Validate(args) => run_validate(&app, args, output_mode),
        Commands::Files(args) => run_files(&app, args, output_mode),
        Commands::Template(args) => run_template(&app, args, output_mode),
        Commands::FileList(args) => run_file_list(&app, args, output_mode),
        Commands::Normalize(args) => run_normalize(&app, args, output_mode),
    }
}

fn init_logging(log_file: Option<&str>) -> miette::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let file_layer = match log_file {
        Some(value) => {
            let path = if value == "auto" {
                PathBuf::from(format!(
                    "sra_prep_{}.log",
                    chrono::Local::now().format("%Y%m%d_%H%M%S")
                ))
            } else {
                PathBuf::from(value)
            };
            let file = File::create(&path).into_diagnostic()?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

fn run_validate(
    app: &App<LocalFileSystem>,
    args: ValidateArgs,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let request = ValidateRequest {
        sample: args.sample,
        bioproject: args.bioproject,
        sample_output: args.sample_output,
        bioproject_output: args.bioproject_output,
        output_dir: args.output_dir,
        sequence_dir: args.sequence_dir,
        check_files: args.check_files,
        recursive: args.recursive,
        check_gzip: args.check_gzip,
        drop_incomplete: args.drop_incomplete,
        file_list: args.file_list,
        dry_run: args.dry_run,
    };

    let result = match output_mode {
        OutputMode::Json => {
            let result = app.validate(request, &JsonOutput)?;
            JsonOutput::print_validate(&result).into_diagnostic()?;
            result
        }
        OutputMode::Human => {
            let human = HumanOutput::default();
            let result = app.validate(request, &human)?;
            human.print_validate(&result).into_diagnostic()?;
            result
        }
    };
    fail_on_errors(result.report.summary.errors)
}

fn run_files(
    app: &App<LocalFileSystem>,
    args: FilesArgs,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let request = FilesRequest {
        sample: args.sample,
        sequence_dir: args.sequence_dir,
        recursive: args.recursive,
        check_gzip: args.check_gzip,
    };
    let result = match output_mode {
        OutputMode::Json => {
            let result = app.check_files(request, &JsonOutput)?;
            JsonOutput::print_files(&result).into_diagnostic()?;
            result
        }
        OutputMode::Human => {
            let human = HumanOutput::default();
            let result = app.check_files(request, &human)?;
            human.print_files(&result).into_diagnostic()?;
            result
        }
    };
    fail_on_errors(result.report.summary.errors)
}

fn run_template(
    app: &App<LocalFileSystem>,
    args: TemplateArgs,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let request = TemplateRequest {
        dir: args.dir,
        recursive: args.recursive,
        output_dir: args.output_dir,
        format: args.format,
        dry_run: args.dry_run,
    };
    match output_mode {
        OutputMode::Json => {
            let result = app.template(request, &JsonOutput)?;
            JsonOutput::print_template(&result).into_diagnostic()?;
        }
        OutputMode::Human => {
            let human = HumanOutput::default();
            let result = app.template(request, &human)?;
            human.print_template(&result).into_diagnostic()?;
        }
    }
    Ok(())
}

fn run_file_list(
    app: &App<LocalFileSystem>,
    args: FileListArgs,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let request = FileListRequest {
        sample: args.sample,
        sequence_dir: args.sequence_dir,
        output: args.output,
        dry_run: args.dry_run,
    };
    match output_mode {
        OutputMode::Json => {
            let result = app.file_list(request, &JsonOutput)?;
            JsonOutput::print_file_list(&result).into_diagnostic()?;
        }
        OutputMode::Human => {
            let human = HumanOutput::default();
            let result = app.file_list(request, &human)?;
            human.print_file_list(&result).into_diagnostic()?;
        }
    }
    Ok(())
}

fn run_normalize(
    app: &App<LocalFileSystem>,
    args: NormalizeArgs,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let kind: FieldKind = args.kind.parse()?;
    let result = app.normalize_value(kind, &args.value);
    match output_mode {
        OutputMode::Json => JsonOutput::print_normalize(&result).into_diagnostic()?,
        OutputMode::Human => HumanOutput::default()
            .print_normalize(&result)
            .into_diagnostic()?,
    }
    if result.outcome.is_invalid() {
        return Err(PrepError::ValidationFailed { errors: 1 }.into());
    }
    Ok(())
}

fn fail_on_errors(errors: usize) -> miette::Result<()> {
    if errors > 0 {
        return Err(PrepError::ValidationFailed { errors }.into());
    }
    Ok(())
}
