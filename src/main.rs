use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;

use crate::fuzz::FuzzCampaign;
use crate::runtime::AnvilRuntime;

mod abi;
mod config;
mod errors;
mod fuzz;
mod generator;
mod harness;
mod invariants;
mod profiler;
mod report;
mod runtime;
mod synthesizer;
mod types;

#[derive(Parser)]
#[command(name = "gasprobe")]
#[command(about = "Randomized testing harness and gas-anomaly detector for deployed contracts")]
#[command(version)]
struct Cli {
    /// Path to the run configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// JSON-RPC endpoint of the contract runtime
    #[arg(short, long, default_value = "http://localhost:8545")]
    rpc_url: String,

    /// Directory for report artifacts
    #[arg(short, long, default_value = "gasprobe-out")]
    out: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(log_level).init();

    let config = config::RunConfig::load(&cli.config)?;
    if config.contracts.is_empty() {
        anyhow::bail!("configuration lists no contracts to fuzz");
    }

    let mut runtime = AnvilRuntime::connect(&cli.rpc_url)
        .await
        .context("failed to connect to the contract runtime")?;

    let campaign = FuzzCampaign::new(config);
    let summary = campaign.run(&mut runtime, &cli.out).await?;

    println!();
    println!("{}", "Combined campaign summary:".bold());
    println!("  {} {} calls succeeded", "✔".green(), summary.total_success);
    println!("  {} {} calls failed", "✘".red(), summary.total_failed);
    println!("  {} {} gas anomalies", "▲".yellow(), summary.total_anomalies);
    println!(
        "  {} {} invariant violations",
        "!".magenta(),
        summary.total_violations
    );
    println!(
        "  {} contract(s) fuzzed, {} skipped, reports in {}",
        summary.contracts_run,
        summary.contracts_skipped,
        cli.out.display()
    );

    Ok(())
}
