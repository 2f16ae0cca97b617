//! Demo Template Builder
//!
//! Writes a fully provisioned store that demo provisioning copies instead of
//! running the schema and seed scripts for every new identity.
//!
//! Usage:
//!   demo-template [--output storage/app/demo/template.sqlite] [--schema schema.sql]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use leancrm_core::DemoConfig;
use leancrm_storage::build_template;

#[derive(Debug, Parser)]
#[command(name = "demo-template", about = "Build the demo template store")]
struct Args {
    /// Where to write the template (default: the configured template path)
    #[arg(long)]
    output: Option<PathBuf>,

    /// DDL script to use instead of the configured or built-in schema
    #[arg(long)]
    schema: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = DemoConfig::from_env();
    let schema = args.schema.or(config.schema_path);
    let output = args.output.unwrap_or(config.template_path);

    match build_template(&output, schema) {
        Ok(()) => {
            println!("Wrote demo template to {}", output.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to build demo template: {}", e);
            ExitCode::from(1)
        }
    }
}
