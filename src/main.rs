// apireach: public API to third-party call path finder
//
// Reports every route from a Java project's public methods to the
// third-party calls they make, with sliced method bodies for each route.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use apireach_analyzer::cli::{self, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG wins over -v
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str())),
        )
        .init();

    // Run the appropriate command
    run_command(cli)?;

    Ok(())
}

fn run_command(cli: Cli) -> Result<()> {
    match cli.command.clone() {
        Commands::Paths(args) => cli::cmds::paths(args, &cli)?,
        Commands::Pairs(args) => cli::cmds::pairs(args, &cli)?,
        Commands::Slice(args) => cli::cmds::slice(args, &cli)?,
        Commands::Coverage(args) => cli::cmds::coverage(args, &cli)?,
    }
    Ok(())
}
