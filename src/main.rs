use clap::Parser;
use tracing_subscriber::EnvFilter;

use roletable::cli::{Commands, run_info, run_install, run_migrate};

#[derive(Parser)]
#[command(name = "roletable")]
#[command(about = "Maintain a normalized user roles table", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("roletable=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Install { data_dir, force } => run_install(data_dir, force)?,
        Commands::Migrate {
            data_dir,
            preserve,
            truncate: _,
            yes,
        } => run_migrate(data_dir, preserve, yes)?,
        Commands::Info { data_dir, json } => run_info(data_dir, json)?,
    }

    Ok(())
}
