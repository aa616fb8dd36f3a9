use arbor::{core_loader, DynamicEvents, Error, NodeSnapshot, RuntimeConfig};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the tree to execute, as JSON
    #[arg(short, long)]
    lambda: PathBuf,

    /// Event raised over the tree
    #[arg(short, long, default_value = "eval")]
    event: String,

    /// Enable debug mode
    #[arg(short, long)]
    verbose: bool,
}

fn run(cli: &Cli) -> Result<String, Error> {
    let config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig::default(),
    };
    info!("config loaded.");
    debug!("config: {:?}", config);

    let source = std::fs::read_to_string(&cli.lambda)
        .map_err(|e| Error::internal(format!("Failed to read lambda file: {}", e)))?;
    let tree = NodeSnapshot::from_json(&source)?.to_node()?;

    let loader = core_loader(DynamicEvents::shared(), config)?;
    let mut ctx = loader.context()?;
    debug!("raising [{}]", cli.event);
    let result = ctx.raise(&cli.event, &tree)?;
    Ok(result.snapshot().to_json()?)
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(&cli) {
        Ok(output) => println!("{}", output),
        Err(Error::Lambda(e)) => {
            eprintln!("Error [{}]: {}", e.kind(), e.message());
            for event in e.trace() {
                eprintln!("  at [{}]", event);
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
