use clap::{Parser, Subcommand};
use plugdb::{Application, PlugdbConfig};
use tracing::Level;

mod commands;

use commands::config::ConfigArgs;
use commands::database::DatabaseArgs;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.plugdb/plugdb.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect registered databases
    Database(DatabaseArgs),

    /// Show configuration
    Config(ConfigArgs),
}

fn main() {
    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt()
            // filter spans/events with level DEBUG or higher.
            .with_max_level(Level::DEBUG)
            .init();
    }

    let config = match PlugdbConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Config(args) => commands::config::run(&config, args),
        Commands::Database(args) => {
            let mut app = match Application::from_config(&config) {
                Ok(app) => app,
                Err(e) => {
                    eprintln!("{:#}", e);
                    std::process::exit(1);
                }
            };
            commands::database::run(&app, args);
            app.shutdown();
        }
    }
}
