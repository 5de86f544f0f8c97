use clap::{Parser, Subcommand, ValueEnum};
use ml4ms::document::ID_FIELD;
use ml4ms::merge::{self, DEFAULT_ID_FIELD};
use ml4ms::{codec, Document, Ml4msError, RunControl, SchemaSet, Store};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

/// ml4ms - work with the JSON/YAML collections of an ml4ms dataset
#[derive(Parser)]
#[command(name = "ml4ms", version, about)]
struct Cli {
    /// Run control file (default: ml4msrc.json in the current directory)
    #[arg(long)]
    rc: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    /// Database to operate on (default: the primary database)
    #[arg(long)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Get a single document by ID
    Get {
        /// Collection name
        collection: String,
        /// Document ID
        id: String,
    },

    /// Find the first document matching every filter
    Find {
        /// Collection name
        collection: String,
        /// Field filters (e.g. --filter formula_pretty=Si)
        #[arg(long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
    },

    /// Insert or overwrite a document
    Insert {
        /// Collection name
        collection: String,
        /// Field values, including _id (e.g. --field _id=mp-149)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Update the first matching document, inserting it when nothing matches
    Update {
        /// Collection name
        collection: String,
        /// Field filters (e.g. --filter _id=mp-149)
        #[arg(long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
        /// Field values to set (e.g. --field band_gap=0.6)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Delete a document
    Delete {
        /// Collection name
        collection: String,
        /// Document ID
        id: String,
    },

    /// Merge a materials-project payload file into a collection
    Ingest {
        /// Payload file (a JSON array of records)
        payload: PathBuf,
        /// Target collection
        #[arg(long, default_value = "materials")]
        collection: String,
        /// Record field used as _id
        #[arg(long, default_value = DEFAULT_ID_FIELD)]
        id_field: String,
    },

    /// Check documents against the schema set
    Validate {
        /// Only validate this collection
        #[arg(long)]
        collection: Option<String>,
    },

    /// Convert a collection file between JSON and YAML
    Convert {
        /// Source collection file
        input: PathBuf,
        /// Destination file; its extension selects the format
        output: PathBuf,
    },

    /// Show loaded databases and collection sizes
    Status,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=').ok_or_else(|| {
        format!("Invalid key=value pair: no '=' found in '{s}'")
    })?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ERROR:{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let db = cli.db.as_deref();

    match cli.command {
        Command::Get { collection, id } => {
            let store = Store::connect(&load_rc(&cli.rc)?)?;
            let doc = match db {
                Some(_) => store.find_one(&collection, &Document::with_id(id.as_str()), db)?,
                None => store.chained(&collection)?.and_then(|view| view.get(&id)),
            };
            let doc = doc.ok_or(Ml4msError::NotFound { collection, id })?;
            print_output(doc, &cli.format)?;
        }

        Command::Find { collection, filters } => {
            let store = Store::connect(&load_rc(&cli.rc)?)?;
            let filter = fields_to_document(&filters);
            let doc = match db {
                Some(_) => store.find_one(&collection, &filter, db)?,
                None => store.chained(&collection)?.and_then(|view| view.find_one(&filter)),
            };
            print_output(&doc, &cli.format)?;
        }

        Command::Insert { collection, fields } => {
            let rc = load_rc(&cli.rc)?;
            let doc = fields_to_document(&fields);
            let id = doc.id().unwrap_or_default().to_string();
            Store::with_connection(&rc, |store| store.insert_one(&collection, doc, db))?;
            print_output(&serde_json::json!({ "ok": true, "id": id }), &cli.format)?;
        }

        Command::Update {
            collection,
            filters,
            fields,
        } => {
            let rc = load_rc(&cli.rc)?;
            let filter = fields_to_document(&filters);
            let update = fields_to_document(&fields);
            let id = Store::with_connection(&rc, |store| match db {
                Some(_) => store.update_one(&collection, &filter, &update, db),
                None => store.chained_update_one(&collection, &filter, &update),
            })?;
            print_output(&serde_json::json!({ "ok": true, "id": id }), &cli.format)?;
        }

        Command::Delete { collection, id } => {
            let rc = load_rc(&cli.rc)?;
            Store::with_connection(&rc, |store| {
                store.delete_one(&collection, &Document::with_id(id.as_str()), db)
            })?;
            print_output(&serde_json::json!({ "ok": true, "deleted": id }), &cli.format)?;
        }

        Command::Ingest {
            payload,
            collection,
            id_field,
        } => {
            let rc = load_rc(&cli.rc)?;
            let batch = merge::load_payload(&payload, &id_field)?;
            let report = Store::with_connection(&rc, |store| {
                merge::merge_new_data(store, &collection, batch, db)
            })?;
            print_output(&report, &cli.format)?;
        }

        Command::Validate { collection } => {
            let rc = load_rc(&cli.rc)?;
            let schemas = SchemaSet::with_overrides(&rc.schemas)?;
            let store = Store::connect(&rc)?;
            let report = store.validate_all(&schemas, collection.as_deref())?;
            if report.is_ok() {
                println!("NO ERRORS IN DBS");
                return Ok(ExitCode::SUCCESS);
            }
            for (name, collection_report) in &report.collections {
                if collection_report.is_ok() {
                    continue;
                }
                println!("Errors found in {name}");
                print_output(&collection_report.issues, &cli.format)?;
            }
            return Ok(ExitCode::FAILURE);
        }

        Command::Convert { input, output } => {
            let count = codec::convert(&input, &output)?;
            print_output(
                &serde_json::json!({ "converted": count, "output": output.display().to_string() }),
                &cli.format,
            )?;
        }

        Command::Status => {
            let store = Store::connect(&load_rc(&cli.rc)?)?;
            print_output(&store.status()?, &cli.format)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Layered run control; at least one database must be configured.
fn load_rc(rc_file: &Option<PathBuf>) -> Result<RunControl, Box<dyn std::error::Error>> {
    let rc = RunControl::load_layered(rc_file.as_deref())?;
    if rc.databases.is_empty() {
        return Err("no databases configured; add them to ml4msrc.json or pass --rc".into());
    }
    Ok(rc)
}

fn print_output<T: Serialize + ?Sized>(
    value: &T,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value)?);
        }
    }
    Ok(())
}

fn fields_to_document(fields: &[(String, String)]) -> Document {
    let mut doc = Document::new();
    for (key, val) in fields {
        if key == ID_FIELD {
            doc.set_id(val.as_str());
            continue;
        }
        // Try to parse as JSON value (for numbers, booleans, arrays, objects)
        let json_val = serde_json::from_str(val).unwrap_or(serde_json::Value::String(val.clone()));
        doc.insert(key.as_str(), json_val);
    }
    if !doc.normalize_date() {
        log::warn!("Ignoring unparsable date value");
    }
    doc
}
