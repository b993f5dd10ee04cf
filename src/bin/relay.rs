//! Schema Relay CLI
//!
//! Encode and decode records against `.avsc` schemas, check compatibility
//! between two schema files, and pipe JSON records through the relay.

use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use schema_relay::{
    Codec, CompatibilityChecker, Consumer, Record, RecordService, Schema, SchemaVersion, Settings,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-relay")]
#[command(about = "Schema-versioned binary records and relay")]
struct Cli {
    /// Config file to load on top of the default locations
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a JSON record, printing hex bytes
    Encode {
        /// Writer schema (.avsc)
        #[arg(short, long)]
        schema: PathBuf,
        /// Record as a JSON object
        #[arg(short, long)]
        record: String,
    },

    /// Decode hex bytes, printing a JSON record
    Decode {
        /// Schema the bytes were written with
        #[arg(short, long)]
        writer: PathBuf,
        /// Schema to read them as (defaults to the writer)
        #[arg(short, long)]
        reader: Option<PathBuf>,
        /// Encoded bytes in hex
        hex: String,
    },

    /// Check compatibility between two schema files
    Check {
        /// Base schema
        #[arg(short, long)]
        from: PathBuf,
        /// Target schema
        #[arg(short, long)]
        to: PathBuf,
        /// Strict mode - any change is breaking
        #[arg(long)]
        strict: bool,
    },

    /// Publish JSON records from stdin (one per line) and print what the consumer decodes
    Relay {
        /// Directory of .avsc files (overrides registry.schema_dir)
        #[arg(short, long)]
        schema_dir: Option<PathBuf>,
        /// Version records are written with
        #[arg(short, long)]
        writer: String,
        /// Version the consumer reads with (defaults to latest)
        #[arg(short, long)]
        reader: Option<String>,
    },

    /// Show the effective configuration
    Config {
        /// Save it to this path instead of printing
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref().and_then(Path::to_str);
    let settings = Settings::load_from(config_path).context("loading configuration")?;
    let codec = settings.codec.codec();

    match cli.command {
        Commands::Encode { schema, record } => {
            let schema = read_schema(&schema)?;
            let json: serde_json::Value = serde_json::from_str(&record).context("parsing record JSON")?;
            let record = Record::from_json_for(&schema, &json)?;
            let bytes = codec.encode(&schema, &record)?;
            println!("{}", to_hex(&bytes));
            Ok(())
        }

        Commands::Decode { writer, reader, hex } => {
            let writer = read_schema(&writer)?;
            let bytes = from_hex(&hex)?;
            let record = match reader {
                Some(path) => {
                    let reader = read_schema(&path)?;
                    schema_relay::resolve(&writer, &reader)?.decode(&codec, &bytes)?
                }
                None => codec.decode(&writer, &bytes)?,
            };
            println!("{}", serde_json::to_string_pretty(&record.to_json())?);
            Ok(())
        }

        Commands::Check { from, to, strict } => {
            let old = read_schema(&from)?;
            let new = read_schema(&to)?;
            let checker = if strict {
                CompatibilityChecker::new().strict()
            } else {
                CompatibilityChecker::new()
            };

            println!("🔍 Checking compatibility: {} -> {}", old.version(), new.version());
            if strict {
                println!("  (strict mode enabled)");
            }
            println!();

            let report = checker.check(&old, &new);
            for change in &report.changes {
                let marker = if change.is_breaking { "❌" } else { "✅" };
                println!("  {} {}", marker, change.description);
            }
            if !report.changes.is_empty() {
                println!();
            }
            println!("  backward compatible: {}", report.backward_compatible);
            println!("  forward compatible:  {}", report.forward_compatible);
            println!();

            if report.is_compatible {
                println!("✅ {}", report.summary);
                Ok(())
            } else {
                println!("❌ {}", report.summary);
                if !new.version().is_major_bump_from(old.version()) {
                    println!("   breaking change without a major version bump");
                }
                std::process::exit(1);
            }
        }

        Commands::Relay { schema_dir, writer, reader } => {
            let mut settings = settings;
            if schema_dir.is_some() {
                settings.registry.schema_dir = schema_dir;
            }
            if settings.registry.schema_dir.is_none() {
                bail!("no schema directory configured (use --schema-dir or registry.schema_dir)");
            }

            let writer = SchemaVersion::parse(&writer)?;
            let reader = reader.as_deref().map(SchemaVersion::parse).transpose()?;
            let service = Arc::new(RecordService::from_settings(&settings)?);
            let writer = service.registry().require(&writer)?;
            run_relay(service, &settings, codec, &writer, reader)
        }

        Commands::Config { save } => {
            match save {
                Some(path) => {
                    settings.save(&path.to_string_lossy())?;
                    println!("✅ Saved configuration to {}", path.display());
                }
                None => print!("{}", toml::to_string_pretty(&settings)?),
            }
            Ok(())
        }
    }
}

fn run_relay(
    service: Arc<RecordService>,
    settings: &Settings,
    codec: Codec,
    writer: &Schema,
    reader: Option<SchemaVersion>,
) -> anyhow::Result<()> {
    let consumer = {
        let service = service.clone();
        Consumer::spawn(service.relay().clone(), settings.relay.poll_interval(), move |message| {
            let record = service.decode_message(&message, reader.as_ref())?;
            println!("{}", record.to_json());
            Ok(())
        })?
    };

    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let json: serde_json::Value = serde_json::from_str(&line).context("parsing record JSON")?;
        let record = Record::from_json_for(writer, &json)?;
        let message = codec.encode_message(writer, &record)?;
        service.relay_push(message);
    }

    while !service.relay().is_empty() && consumer.is_running() {
        thread::sleep(Duration::from_millis(10));
    }
    if !consumer.is_running() {
        bail!("relay consumer exited with {} messages undelivered", service.relay().len());
    }

    let stats = consumer.stop();
    let relay = service.relay_stats();
    eprintln!(
        "processed {} failed {} dropped {}",
        stats.processed, stats.failed, relay.dropped_count
    );
    Ok(())
}

fn read_schema(path: &Path) -> anyhow::Result<Schema> {
    let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&content)?;
    let schema = Schema::from_avro_json(&json, None).with_context(|| format!("parsing {}", path.display()))?;
    Ok(schema)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn from_hex(hex: &str) -> anyhow::Result<Vec<u8>> {
    let hex: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    if !hex.is_ascii() || hex.len() % 2 != 0 {
        bail!("hex input must be an even number of ASCII digits");
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).with_context(|| format!("invalid hex at offset {}", i)))
        .collect()
}
