use std::path::PathBuf;

use anyhow::Context;
use b2xklaim::{translate, TranslatorConfig};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Translate a BPMN 2.0 diagram into XKlaim code
#[derive(Debug, Parser)]
#[command(name = "b2xklaim", version)]
struct Cli {
    /// The BPMN 2.0 XML file to translate
    input: PathBuf,

    /// TOML file with translator settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the result as JSON instead of XKlaim source
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    // Log to stderr so the generated code can be piped
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => TranslatorConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => TranslatorConfig::default(),
    };

    let xml = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;

    let result = translate(&xml, &config).with_context(|| format!("failed to translate {}", cli.input.display()))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", result);
    }

    Ok(())
}
