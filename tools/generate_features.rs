//! Live Feature Generation Tool
//!
//! Runs the tick-to-feature control loop against a terminal bridge and emits
//! the newest feature values after every action boundary.
//!
//! # Output Format
//!
//! One JSON object per feature column per cycle:
//!
//! ```text
//! {"timestamp":"2023-01-04T10:20:33","symbol":"EURUSD","timeframe":"10s","feature":"bid_skew","value":0.41}
//! ```
//!
//! # Usage
//!
//! ```bash
//! # Run the loop from a config file, features to stdout
//! cargo run --release --bin generate_features -- --config configs/agent.toml
//!
//! # Single cycle at the current broker time, features to a file
//! cargo run --release --bin generate_features -- --config configs/agent.toml --once --output features.jsonl
//!
//! # Generate sample config
//! cargo run --release --bin generate_features -- --generate-config agent.toml
//! ```
//!
//! Logging goes to stderr; set `RUST_LOG=debug` for per-cycle details.

use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tick_features::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "generate_features", about = "Streaming tick-to-feature engine")]
struct Args {
    /// Agent configuration (TOML or JSON)
    #[arg(short, long, env = "TICK_FEATURES_CONFIG")]
    config: Option<PathBuf>,

    /// Write a sample configuration to this path and exit
    #[arg(long, value_name = "PATH")]
    generate_config: Option<PathBuf>,

    /// Run one cycle at the current broker time and exit
    #[arg(long)]
    once: bool,

    /// Append feature records here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    if let Some(path) = &args.generate_config {
        return generate_sample_config(path);
    }

    let Some(config_path) = &args.config else {
        eprintln!("Error: --config <path> or --generate-config <path> is required");
        return ExitCode::FAILURE;
    };

    let config = match AgentConfig::load(config_path) {
        Ok(c) => {
            eprintln!("✅ Loaded configuration: {}", config_path.display());
            c
        }
        Err(e) => {
            eprintln!("❌ Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };
    print_config_summary(&config);

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => match File::options().create(true).append(true).open(path) {
            Ok(f) => Box::new(BufWriter::new(f)),
            Err(e) => {
                eprintln!("❌ Cannot open {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => Box::new(io::stdout()),
    };

    match run(config, writer, args.once) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: AgentConfig, writer: Box<dyn Write>, once: bool) -> Result<()> {
    let bridge = HttpBridge::new(&config.broker.bridge_url, config.broker.request_timeout())?;
    let clock = config.broker.clock;
    let handler = TickHandler::new(config, bridge)?;
    let mut control = ControlLoop::new(handler, JsonLinesSink::new(writer));

    if once {
        let summary = control.run_cycle(clock.now())?;
        eprintln!("✅ Emitted {} feature records", summary.records);
        return Ok(());
    }
    control.run()
}

fn print_config_summary(config: &AgentConfig) {
    eprintln!("Agent:        {}", config.agent_version);
    eprintln!("Bridge:       {} ({})", config.broker.bridge_url, config.broker.name);
    eprintln!(
        "Instruments:  {}",
        config.symbols().collect::<Vec<_>>().join(", ")
    );
    eprintln!(
        "Action grid:  {} + {}",
        config.trade.timeframe, config.trade.action_offset
    );
    for group in &config.feature_groups {
        eprintln!(
            "Group {:>6}: {} columns x {} rows",
            group.timeframe.to_string(),
            group.output_names().len(),
            group.window_len
        );
    }
    eprintln!();
}

fn generate_sample_config(path: &PathBuf) -> ExitCode {
    let sample = AgentConfig::default()
        .with_instrument(InstrumentConfig::new("USDJPY", 1e-2))
        .with_instrument(InstrumentConfig::new("XAUUSD", 0.1));

    let result = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => sample.save_json(path),
        _ => sample.save_toml(path),
    };

    match result {
        Ok(()) => {
            println!("✅ Generated sample config: {}", path.display());
            println!("\nEdit the following fields before running:");
            println!("  - broker.bridge_url: Address of the terminal bridge");
            println!("  - broker.credentials: Terminal login");
            println!("  - instruments: Symbols and pip sizes to trade");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error generating config: {e}");
            ExitCode::FAILURE
        }
    }
}
