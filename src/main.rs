use chartbook::loader::mime_for_extension;
use chartbook::{
    AnalysisInput, ChartKind, DatasetDetails, DatasetService, FileStore, JsonLedger, PageRequest,
    Settings, UserId,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "chartbook", about = "Store spreadsheets and build charts from them")]
struct Cli {
    /// Acting user
    #[arg(short, long, default_value = "local")]
    user: String,

    /// Overrides CHARTBOOK_DATA_DIR
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload an .xlsx, .xls or .csv file
    Ingest {
        path: PathBuf,
        /// Declared content type, guessed from the extension when absent
        #[arg(long)]
        mime: Option<String>,
    },
    /// Upload history, newest first
    List {
        #[arg(long)]
        page: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
    },
    Show {
        id: Uuid,
    },
    /// Chart data without saving it
    Chart {
        id: Uuid,
        #[arg(long)]
        x: Option<String>,
        #[arg(long)]
        y: Option<String>,
        #[arg(long, default_value = "bar")]
        kind: ChartKind,
    },
    #[command(subcommand)]
    Analysis(AnalysisCommand),
    /// Set the description and tags of a dataset
    Describe {
        id: Uuid,
        #[arg(long)]
        description: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    Delete {
        id: Uuid,
    },
    /// Upload count and bytes stored for the user
    Usage,
}

#[derive(Subcommand)]
enum AnalysisCommand {
    Add {
        dataset: Uuid,
        #[arg(long)]
        x: String,
        #[arg(long)]
        y: String,
        #[arg(long, default_value = "bar")]
        kind: ChartKind,
        #[arg(long)]
        title: Option<String>,
    },
    Remove {
        dataset: Uuid,
        analysis: Uuid,
    },
    List {
        dataset: Uuid,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut settings = Settings::from_env()?;
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log_filter))
        .with_writer(std::io::stderr)
        .init();

    let store = FileStore::open(settings.datasets_dir())?;
    let ledger = JsonLedger::open(settings.users_file())?;
    let service = DatasetService::with_settings(store, ledger, &settings);
    let user = UserId::new(cli.user);

    match cli.command {
        Command::Ingest { path, mime } => {
            let mime = match mime {
                Some(mime) => mime,
                None => path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .and_then(mime_for_extension)
                    .ok_or("cannot guess the file type, pass --mime")?
                    .to_string(),
            };
            let original_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let bytes = fs::read(&path)?;
            let dataset = service.ingest(&bytes, &mime, &user, &original_name)?;
            print_json(&dataset.summary())
        }
        Command::List { page, limit } => {
            let request = match (page, limit) {
                (None, None) => None,
                (page, limit) => Some(PageRequest::new(
                    page.unwrap_or(1),
                    limit.unwrap_or(settings.page_size),
                )),
            };
            print_json(&service.list_datasets(&user, request)?)
        }
        Command::Show { id } => print_json(&service.get_dataset(id, &user)?),
        Command::Chart { id, x, y, kind } => print_json(&service.preview_chart(
            id,
            &user,
            x.as_deref(),
            y.as_deref(),
            kind,
        )?),
        Command::Analysis(AnalysisCommand::Add {
            dataset,
            x,
            y,
            kind,
            title,
        }) => {
            let mut input = AnalysisInput::new(kind, &x, &y);
            if let Some(title) = title {
                input = input.with_title(title);
            }
            print_json(&service.add_analysis(dataset, &user, input)?)
        }
        Command::Analysis(AnalysisCommand::Remove { dataset, analysis }) => {
            service.remove_analysis(dataset, analysis, &user)?;
            print_json(&serde_json::json!({ "removed": analysis }))
        }
        Command::Analysis(AnalysisCommand::List { dataset }) => {
            print_json(&service.list_analyses(dataset, &user)?)
        }
        Command::Describe {
            id,
            description,
            tags,
        } => {
            let details = DatasetDetails {
                description,
                tags: if tags.is_empty() { None } else { Some(tags) },
            };
            print_json(&service.update_details(id, &user, details)?.summary())
        }
        Command::Delete { id } => {
            service.delete_dataset(id, &user)?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
        Command::Usage => print_json(&service.usage(&user)?),
    }
}
