use anyhow::Result;
use comb_common::observability::{LogConfig, LogFormat, init_logging};
use comb_config::{CombConfig, CombConfigLoader, LoggingSection};
use std::path::PathBuf;
use std::process::ExitCode;
use wiring::build_from_config;
mod wiring;

/// Exit status when the run stopped on a captcha or unsafe click.
const EXIT_POLICY_VIOLATION: u8 = 2;

fn log_config(section: &LoggingSection) -> LogConfig {
    LogConfig {
        log_dir: section.dir.as_ref().map(PathBuf::from),
        emit_stderr: section.emit_stderr,
        format: LogFormat::parse(&section.format),
        default_filter: section.filter.clone(),
        ..LogConfig::default()
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // 1) Load config (env wins)
    let loader = match std::env::var("COMB_CONFIG") {
        Ok(path) => CombConfigLoader::new().with_file(path),
        Err(_) => CombConfigLoader::new().with_optional_file("comb.yaml"),
    };
    let cfg: CombConfig = loader.load()?;

    // 2) Logging from the same config
    let log_file = init_logging(log_config(&cfg.logging))?;
    tracing::info!(target: "app", log_file = %log_file.display(), profile = %cfg.browser.profile, "comb starting");

    // 3) Wire collaborators and run once
    let harvest = build_from_config(&cfg)?;
    match harvest.run().await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_policy_violation() => {
            tracing::error!(target: "app", error = %e, "stopped on policy violation; browser left as-is");
            eprintln!("{e}");
            Ok(ExitCode::from(EXIT_POLICY_VIOLATION))
        }
        Err(e) => Err(e.into()),
    }
}
