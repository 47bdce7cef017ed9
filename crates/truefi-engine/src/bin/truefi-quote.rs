//! Rate quote tool
//!
//! Usage: `truefi-quote <scenario.json> [config.toml]`
//!
//! The config path may also come from `TRUEFI_CONFIG`. The report is printed
//! as JSON on stdout; logs go to stderr under `RUST_LOG`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use truefi_engine::{quote, EngineConfig, QuoteScenario};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(scenario_path) = args.next().map(PathBuf::from) else {
        bail!("usage: truefi-quote <scenario.json> [config.toml]");
    };
    let config_path = args
        .next()
        .or_else(|| std::env::var("TRUEFI_CONFIG").ok())
        .map(PathBuf::from);

    info!("truefi-quote v{}", truefi_common::VERSION);

    let config = EngineConfig::load(config_path.as_deref())
        .with_context(|| format!("loading config {:?}", config_path))?;
    let raw = std::fs::read_to_string(&scenario_path)
        .with_context(|| format!("reading scenario {}", scenario_path.display()))?;
    let scenario: QuoteScenario = serde_json::from_str(&raw)
        .with_context(|| format!("parsing scenario {}", scenario_path.display()))?;

    let report = quote(&config, &scenario)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
