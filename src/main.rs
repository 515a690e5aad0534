//! reasonbench CLI entrypoint

use clap::Parser;

use reasonbench::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    std::process::exit(cli.execute().await);
}
