use anyhow::Context;
use clap::Parser;

use reimburse_backend::{cli, dataset, index::codes::CodeIndex, server, storage::StoragePaths};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = cli::Args::parse();

    match args.cmd {
        cli::Command::Check(cmd) => check(cmd).context("check failed"),
        cli::Command::Serve(cmd) => server::run(cmd).await.context("serve failed"),
    }
}

fn check(opts: cli::CheckArgs) -> anyhow::Result<()> {
    let paths = StoragePaths::new(&opts.data_dir);
    let records = dataset::load_codes(&paths)?;
    let index = CodeIndex::build(records);
    let stats = index.stats();
    tracing::info!("Total codes: {}", stats.total_codes);
    for (code_type, count) in &stats.types {
        tracing::info!("  {}: {} codes", code_type, count);
    }
    let ntap = dataset::load_ntap_program(&paths)?;
    let tpt = dataset::load_tpt_program(&paths)?;
    tracing::info!(
        "NTAP program data: {} DRG base payments, {} approved technologies",
        ntap.drg_base_payments.len(),
        ntap.technologies.len()
    );
    tracing::info!(
        "TPT program data: {} APC base payments, {} approved technologies",
        tpt.apc_base_payments.len(),
        tpt.technologies.len()
    );
    Ok(())
}
