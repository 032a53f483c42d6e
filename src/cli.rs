use clap::{Parser, Subcommand};

const DEFAULT_DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data");

#[derive(Parser, Debug)]
#[command(name = "reimburse-backend")]
#[command(about = "Code intelligence + reimbursement backend (in-memory index)", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the code dataset, print index statistics, and exit.
    Check(CheckArgs),
    /// Load the dataset and serve the HTTP API.
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct CheckArgs {
    /// Data directory (code chunks + NTAP/TPT program data).
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Data directory (code chunks + NTAP/TPT program data).
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 3001)]
    pub port: u16,
}
