//! Demo Purge CLI
//!
//! One-shot sweep of idle demo stores, for cron or manual cleanup.
//! Exits with status 1 when demo mode is disabled.
//!
//! Usage:
//!   demo-purge --ttl 60

use std::process::ExitCode;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use leancrm_api::telemetry::{init_tracing, TelemetryConfig};
use leancrm_core::{DemoConfig, DemoError};
use leancrm_storage::DemoSandbox;

#[derive(Debug, Parser)]
#[command(name = "demo-purge", about = "Delete demo stores and upload directories idle past a TTL")]
struct Args {
    /// Idle age in minutes after which demo data is deleted
    #[arg(long, default_value_t = 60)]
    ttl: u64,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_tracing(&TelemetryConfig::default()) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let config = DemoConfig::from_env();
    let sandbox = DemoSandbox::new(config);
    let ttl = Duration::from_secs(args.ttl.saturating_mul(60));

    println!("Cleaning up demo data older than {} minutes...", args.ttl);

    let report = match sandbox.sweep_blocking(ttl, Utc::now()) {
        Ok(report) => report,
        Err(DemoError::DemoModeDisabled) => {
            eprintln!("Demo mode is not enabled");
            return ExitCode::from(1);
        }
        Err(e) => {
            eprintln!("Demo purge failed: {}", e);
            return ExitCode::from(1);
        }
    };

    for error in &report.errors {
        eprintln!("Could not remove: {}", error);
    }

    println!("Cleanup completed:");
    println!("- Deleted {} expired demo databases", report.deleted_stores);
    println!("- Deleted {} expired upload directories", report.deleted_upload_dirs);
    println!("- Deleted {} abandoned provisioning files", report.deleted_temp_artifacts);

    ExitCode::SUCCESS
}
