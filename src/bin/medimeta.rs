use std::path::Path;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use medimeta_indexer::config::{FolderSection, Settings, SettingsLoader};
use medimeta_indexer::db::{RelationalStore, SqliteStore};
use medimeta_indexer::elements::ElementSpec;
use medimeta_indexer::error::IndexError;
use medimeta_indexer::extract::{DicomSource, NiftiSource, SourceFormat, TagSource};
use medimeta_indexer::ingest::{
    CheckResult, DropResult, IngestOptions, Ingestor, TableResult, ensure_table,
};
use medimeta_indexer::output::JsonOutput;

#[derive(Parser)]
#[command(name = "medimeta")]
#[command(about = "Index DICOM/NIFTI metadata from a folder tree into a relational table")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    elements: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Walk the configured folder and store per-file metadata")]
    Ingest(IngestArgs),
    #[command(about = "Create the database and metadata table if absent")]
    InitTable,
    #[command(about = "Drop the metadata table")]
    DropTable,
    #[command(about = "Check that the metadata database is reachable")]
    Check,
}

#[derive(Args)]
struct IngestArgs {
    #[arg(long, value_enum)]
    format: SourceFormat,

    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(index) = report.downcast_ref::<IndexError>() {
            return ExitCode::from(map_exit_code(index));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &IndexError) -> u8 {
    match error {
        IndexError::MissingConfig
        | IndexError::ConfigRead(_)
        | IndexError::ConfigParse(_)
        | IndexError::SectionNotFound(_)
        | IndexError::ElementsRead(_)
        | IndexError::ElementsParse(_)
        | IndexError::InvalidColumnName(_)
        | IndexError::DuplicateColumnName(_)
        | IndexError::InvalidSourceKey(_)
        | IndexError::InvalidTableName(_) => 2,
        IndexError::Connection(_) | IndexError::Database(_) | IndexError::Schema(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = SettingsLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest(args) => run_ingest(&settings, cli.elements.as_deref(), args),
        Commands::InitTable => run_init_table(&settings, cli.elements.as_deref()),
        Commands::DropTable => run_drop_table(&settings),
        Commands::Check => run_check(&settings),
    }
}

fn load_elements(path: Option<&str>) -> Result<ElementSpec, IndexError> {
    ElementSpec::load(Path::new(path.unwrap_or("elements.json")))
}

fn run_ingest(settings: &Settings, elements: Option<&str>, args: IngestArgs) -> miette::Result<()> {
    let spec = load_elements(elements)?;
    let folder = settings.folder(args.format)?.clone();
    let store = SqliteStore::open(&settings.database_path())?;
    let options = IngestOptions {
        dry_run: args.dry_run,
    };

    match args.format {
        SourceFormat::Dicom => run_with_source(DicomSource, store, settings, &folder, spec, options),
        SourceFormat::Nifti => run_with_source(NiftiSource, store, settings, &folder, spec, options),
    }
}

fn run_with_source<S: TagSource>(
    source: S,
    store: SqliteStore,
    settings: &Settings,
    folder: &FolderSection,
    spec: ElementSpec,
    options: IngestOptions,
) -> miette::Result<()> {
    let ingestor = Ingestor::new(
        source,
        store,
        settings.table_name().to_string(),
        Utf8PathBuf::from(&folder.folder_path),
        folder.name_contains.clone(),
        spec,
    );
    let report = ingestor.run(&options)?;
    JsonOutput::print_report(&report).into_diagnostic()?;
    Ok(())
}

fn run_init_table(settings: &Settings, elements: Option<&str>) -> miette::Result<()> {
    let spec = load_elements(elements)?;
    let store = SqliteStore::open(&settings.database_path())?;
    let created = ensure_table(&store, settings.table_name(), &spec)?;
    JsonOutput::print_table(&TableResult {
        table: settings.table_name().to_string(),
        created,
    })
    .into_diagnostic()?;
    Ok(())
}

fn run_drop_table(settings: &Settings) -> miette::Result<()> {
    let store = SqliteStore::open(&settings.database_path())?;
    store.drop_table(settings.table_name())?;
    JsonOutput::print_drop(&DropResult {
        table: settings.table_name().to_string(),
        dropped: true,
    })
    .into_diagnostic()?;
    Ok(())
}

fn run_check(settings: &Settings) -> miette::Result<()> {
    let store = SqliteStore::open(&settings.database_path())?;
    let server_version = store.server_version()?;
    JsonOutput::print_check(&CheckResult {
        database: store.path().to_string(),
        reachable: true,
        server_version,
    })
    .into_diagnostic()?;
    Ok(())
}
