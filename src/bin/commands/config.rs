use clap::Args;
use plugdb::{OutputFormat, PlugdbConfig};
use serde::Serialize;

/// Arguments for the Config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Output format: text, json, json-pretty
    #[clap(short, long, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct ConfigInfo<'a> {
    config_file: String,
    busy_timeout_ms: Option<u64>,
    databases: &'a [plugdb::DatabaseEntry],
}

pub fn run(config: &PlugdbConfig, args: ConfigArgs) {
    let info = ConfigInfo {
        config_file: PlugdbConfig::config_file_path(),
        busy_timeout_ms: config.busy_timeout_ms,
        databases: &config.databases,
    };

    let rendered = match args.format {
        OutputFormat::Json => serde_json::to_string(&info),
        OutputFormat::JsonPretty => serde_json::to_string_pretty(&info),
        _ => Ok(config.summary()),
    };
    match rendered {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Error serializing config: {}", e),
    }
}
