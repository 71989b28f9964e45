use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};

use zgrab_ingest::ingest::{ingest, IngestConfig};
use zgrab_ingest::output::{create_json_output, JsonLinesWriter};
use zgrab_ingest::ParserRegistry;

/// Convert zgrab / zgrab2 JSON output into host records with service details
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// zgrab output file, one JSON document per line (stdin when omitted)
    #[clap(value_parser)]
    input: Option<PathBuf>,

    /// Write host records to file instead of stdout
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Only process these zgrab modules (repeatable, e.g. -p http)
    #[clap(short, long = "probe")]
    probes: Vec<String>,

    /// Pretty-print JSON records
    #[clap(long)]
    pretty: bool,

    /// Also emit hosts for which no service could be extracted
    #[clap(long)]
    keep_empty: bool,

    /// Enable verbose output
    ///
    /// Debug-level messages go to stderr; `RUST_LOG` overrides this flag.
    #[clap(short, long)]
    verbose: bool,
}

impl Args {
    fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            probes: self.probes.clone(),
            keep_empty: self.keep_empty,
        }
    }
}

/// Initialize logging on stderr so stdout only carries records
fn setup_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .format_module_path(true)
        .format_target(false)
        .target(env_logger::Target::Stderr)
        .init();
}

fn run<W: Write>(args: &Args, registry: &ParserRegistry, mut writer: JsonLinesWriter<W>) -> Result<()> {
    let input: Box<dyn BufRead> = match &args.input {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("Failed to open input file: {:?}", path))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(io::stdin().lock()),
    };

    ingest(input, registry, &args.ingest_config(), |host| writer.write(host))?;
    writer.finish()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);

    let registry = ParserRegistry::new();
    debug!("Registered probe parsers: {}", registry.probes().join(", "));

    match &args.output {
        Some(path) => {
            run(&args, &registry, create_json_output(path, args.pretty)?)?;
            info!("Host records written to {}", path.display());
        }
        None => {
            let stdout = io::stdout().lock();
            run(&args, &registry, JsonLinesWriter::new(io::BufWriter::new(stdout), args.pretty))?;
        }
    }
    Ok(())
}
