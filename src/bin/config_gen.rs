use clap::Parser;
use gridsample::{ConfigBuilder, TxnMix, Verbosity};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "config-gen")]
#[command(about = "Generate gridsample configuration files")]
struct Args {
    /// Output file path
    #[arg(short, long, default_value = "gridsample.toml")]
    output: PathBuf,

    /// Output format (json, toml)
    #[arg(short, long, default_value = "toml")]
    format: String,

    /// Connection target (host:port/database)
    #[arg(long, default_value = "localhost:4000/sampledb")]
    dsn: String,

    /// Database username
    #[arg(long, default_value = "appuser")]
    uid: String,

    /// Transaction mix A,C,T,Q,P
    #[arg(long, default_value = "70,15,5,5,5")]
    txn_mix: TxnMix,

    /// Stop after this many transactions
    #[arg(long, conflicts_with = "duration")]
    num_transactions: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Report statistics every this many seconds
    #[arg(long)]
    report_interval: Option<u64>,

    /// Execution log path
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn build_config(args: &Args) -> gridsample::AppConfig {
    let mut builder = ConfigBuilder::new()
        .dsn(args.dsn.clone())
        .uid(args.uid.clone())
        .txn_mix(args.txn_mix);

    if let Some(count) = args.num_transactions {
        builder = builder.num_transactions(count);
    }
    if let Some(secs) = args.duration {
        builder = builder.duration_secs(secs);
    }
    if let Some(secs) = args.report_interval {
        builder = builder.verbosity(Verbosity::Verbose).report_interval_secs(secs);
    }
    if let Some(path) = &args.log_file {
        builder = builder.log_file(path.clone());
    }
    builder.build()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = build_config(&args);
    config.validate()?;

    let mut output_path = args.output.clone();
    if args.format == "toml" {
        output_path.set_extension("toml");
    } else if args.format == "json" {
        output_path.set_extension("json");
    }

    config.save_to_file(&output_path)?;

    println!("Configuration saved to: {}", output_path.display());
    println!("Run the workload with:");
    println!("  gridsample -config {}", output_path.display());

    Ok(())
}
