use clap::{Args, Subcommand};
use plugdb::{Application, DatabaseInfo, OutputFormat};
use std::io::Write;
use tabled::settings::Style;
use tabled::Table;

/// Arguments for the Database command
#[derive(Args)]
pub struct DatabaseArgs {
    #[clap(subcommand)]
    pub command: Option<DatabaseCommands>,
}

/// Database subcommands
#[derive(Subcommand)]
pub enum DatabaseCommands {
    /// List all databases (default when no subcommand)
    List {
        /// Output format: text, table, json, json-pretty
        #[clap(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

pub fn run(app: &Application, args: DatabaseArgs) {
    let format = match args.command {
        None => OutputFormat::Text,
        Some(DatabaseCommands::List { format }) => format,
    };

    let infos: Vec<DatabaseInfo> = app
        .databases()
        .all()
        .values()
        .map(|db| db.info())
        .collect();

    let mut stdout = std::io::stdout();
    if let Err(e) = write_list(&mut stdout, &infos, format) {
        if e.kind() != std::io::ErrorKind::BrokenPipe {
            eprintln!("{e}");
        }
        std::process::exit(1);
    }
}

fn write_list<W: Write>(
    out: &mut W,
    infos: &[DatabaseInfo],
    format: OutputFormat,
) -> std::io::Result<()> {
    match format {
        OutputFormat::Text => {
            writeln!(out, "Registered databases")?;
            for info in infos {
                writeln!(out, "  {}\n  {}\n  {}\n", info.name, info.description, info.url)?;
            }
        }
        OutputFormat::Table => {
            writeln!(out, "{}", Table::new(infos).with(Style::rounded()))?;
        }
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::to_string(infos)?)?;
        }
        OutputFormat::JsonPretty => {
            writeln!(out, "{}", serde_json::to_string_pretty(infos)?)?;
        }
    }
    Ok(())
}
