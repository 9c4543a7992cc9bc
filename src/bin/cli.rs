//! FileCabinet CLI
//!
//! Non-interactive command-line access to a record store.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use filecabinet::config::{CorruptionPolicy, RuleSource};
use filecabinet::query::{FieldCondition, RecordField};
use filecabinet::record::parse_date;
use filecabinet::{Cabinet, Config, RecordInput, Result, SnapshotFormat, Tax};
use tracing_subscriber::{fmt, EnvFilter};

/// FileCabinet
#[derive(Parser, Debug)]
#[command(name = "filecabinet")]
#[command(about = "Personal records store with memory and binary file backends")]
#[command(version)]
struct Args {
    /// Storage backend
    #[arg(short, long, value_enum, default_value = "file")]
    storage: Storage,

    /// Data file for the file backend
    #[arg(short, long, default_value = "cabinet.db")]
    data_file: PathBuf,

    /// Validation rules: "default", "custom", or a path to a JSON rule file
    #[arg(short, long, default_value = "default")]
    rules: String,

    /// Fail instead of skipping when a stored record is corrupt
    #[arg(long)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Storage {
    Memory,
    File,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show live and removed record counts
    Stat,

    /// List records, optionally by first name, last name or date of birth
    List {
        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        last_name: Option<String>,

        #[arg(long)]
        date_of_birth: Option<String>,
    },

    /// Create a record with the next free id
    Create {
        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Store a record under an explicit id
    Insert {
        #[arg(long)]
        id: i32,

        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Delete every record whose field equals the value
    Delete {
        /// Field name (id, firstname, lastname, dateofbirth, income, tax, block)
        field: String,

        value: String,
    },

    /// Set fields on every record matching any condition
    Update {
        /// `field=value` to write (repeatable)
        #[arg(long = "set", required = true)]
        sets: Vec<String>,

        /// `field=value` to match (repeatable)
        #[arg(long = "where", required = true)]
        matches: Vec<String>,
    },

    /// Print selected fields of records matching any condition
    Select {
        /// Comma-separated field names (all when omitted)
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,

        /// `field=value` to match (repeatable)
        #[arg(long = "where")]
        matches: Vec<String>,
    },

    /// Import records from a CSV or XML file
    Import {
        path: PathBuf,

        /// Format (guessed from the extension when omitted)
        #[arg(long)]
        format: Option<String>,
    },

    /// Export all records to a CSV or XML file
    Export {
        path: PathBuf,

        /// Format (guessed from the extension when omitted)
        #[arg(long)]
        format: Option<String>,
    },

    /// Drop deleted records from the data file
    Purge,
}

#[derive(clap::Args, Debug)]
struct FieldArgs {
    #[arg(long)]
    first_name: String,

    #[arg(long)]
    last_name: String,

    /// Date of birth (MM/dd/yyyy)
    #[arg(long)]
    date_of_birth: String,

    #[arg(long)]
    income: i16,

    #[arg(long)]
    tax: String,

    #[arg(long)]
    block: char,
}

impl FieldArgs {
    fn to_input(&self) -> Result<RecordInput> {
        Ok(RecordInput::new(
            self.first_name.clone(),
            self.last_name.clone(),
            parse_date(&self.date_of_birth)?,
            self.income,
            self.tax.parse::<Tax>()?,
            self.block,
        ))
    }
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,filecabinet=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    tracing::info!("FileCabinet v{}", filecabinet::VERSION);

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let rules = match args.rules.as_str() {
        "default" => RuleSource::Default,
        "custom" => RuleSource::Custom,
        path => RuleSource::Path(PathBuf::from(path)),
    };
    let policy = if args.strict {
        CorruptionPolicy::Abort
    } else {
        CorruptionPolicy::Skip
    };

    let builder = Config::builder().rules(rules).corruption_policy(policy);
    let config = match args.storage {
        Storage::Memory => builder.memory().build(),
        Storage::File => builder.data_file(&args.data_file).build(),
    };

    let mut cabinet = Cabinet::open(config)?;

    match args.command {
        Commands::Stat => {
            let stat = cabinet.store().get_stat();
            println!("{} record(s), {} removed", stat.live, stat.removed);
        }
        Commands::List {
            first_name,
            last_name,
            date_of_birth,
        } => {
            let store = cabinet.store_mut();
            let iter = match (first_name, last_name, date_of_birth) {
                (Some(name), _, _) => store.find_by_first_name(&name)?,
                (_, Some(name), _) => store.find_by_last_name(&name)?,
                (_, _, Some(date)) => store.find_by_date_of_birth(parse_date(&date)?)?,
                _ => store.iterate()?,
            };
            for record in iter {
                println!("{}", record?);
            }
        }
        Commands::Create { fields } => {
            let id = cabinet.store_mut().create(&fields.to_input()?)?;
            println!("Record #{} is created.", id);
        }
        Commands::Insert { id, fields } => {
            cabinet.store_mut().insert(id, &fields.to_input()?)?;
            println!("Record #{} is stored.", id);
        }
        Commands::Delete { field, value } => {
            let ids = cabinet.store_mut().delete_by_field(&field, &value)?;
            for id in ids {
                println!("Record #{} is deleted.", id);
            }
        }
        Commands::Update { sets, matches } => {
            let sets = parse_conditions(&sets)?;
            let matches = parse_conditions(&matches)?;
            let ids = cabinet.store_mut().update_many(&matches, &sets)?;
            println!("{} record(s) updated.", ids.len());
        }
        Commands::Select { fields, matches } => {
            let fields = fields
                .iter()
                .map(|f| f.parse::<RecordField>())
                .collect::<Result<Vec<_>>>()?;
            let matches = parse_conditions(&matches)?;
            let selection = cabinet.store_mut().select(&fields, &matches)?;

            let header: Vec<&str> = selection.fields().iter().map(|f| f.as_str()).collect();
            println!("{}", header.join(" | "));
            for row in selection.rows() {
                println!("{}", row.join(" | "));
            }
        }
        Commands::Import { path, format } => {
            let format = resolve_format(&path, format.as_deref())?;
            let summary = cabinet.import_from(&path, format)?;
            println!(
                "{} of {} record(s) were imported from {}.",
                summary.accepted,
                summary.read,
                path.display()
            );
        }
        Commands::Export { path, format } => {
            let format = resolve_format(&path, format.as_deref())?;
            let count = cabinet.export_to(&path, format)?;
            println!("{} record(s) were exported to {}.", count, path.display());
        }
        Commands::Purge => {
            let stat = cabinet.store_mut().purge()?;
            println!("Data file processing is completed: {} of {} records were purged.", stat.purged, stat.total);
        }
    }

    Ok(())
}

/// Parse `field=value` pairs
fn parse_conditions(pairs: &[String]) -> Result<Vec<FieldCondition>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((field, value)) => FieldCondition::parse(field, value),
            None => Err(filecabinet::CabinetError::invalid_value("condition", pair.as_str())),
        })
        .collect()
}

fn resolve_format(path: &std::path::Path, explicit: Option<&str>) -> Result<SnapshotFormat> {
    match explicit {
        Some(name) => name.parse(),
        None => SnapshotFormat::from_extension(path).ok_or_else(|| {
            filecabinet::CabinetError::Format(format!(
                "cannot guess the format of {}; pass --format",
                path.display()
            ))
        }),
    }
}
