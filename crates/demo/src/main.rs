//! `shellexec-demo` -- run one script through [`ProcessRunner`] and report it.
//!
//! Configured entirely through environment variables (a `.env` file is
//! honoured); see [`DemoConfig::from_env`] for the full table. The process
//! exits with the script's exit code.
//!
//! ```text
//! SHELLEXEC_SCRIPT=$'echo hello\necho world' shellexec-demo
//! ```

use shellexec_core::ProcessRunner;
use shellexec_demo::config::{DemoConfig, OutputFormat};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit status used when the demo itself is misconfigured.
const CONFIG_ERROR_EXIT: i32 = 2;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shellexec_demo=info,shellexec_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = DemoConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(CONFIG_ERROR_EXIT);
    });

    let mut runner = ProcessRunner::new();
    if let Err(e) = config.apply(&mut runner) {
        tracing::error!(error = %e, "Failed to configure runner");
        std::process::exit(CONFIG_ERROR_EXIT);
    }

    tracing::info!(
        host = %runner.host(),
        platform = %config.platform,
        working_dir = ?runner.config().working_dir(),
        "Running script",
    );

    let exit_code = runner.execute().await;

    match config.output {
        OutputFormat::Text => {
            println!("Exit Code: {exit_code}");
            println!("Output: {}", runner.output());
        }
        OutputFormat::Json => {
            let report = serde_json::json!({
                "exit_code": exit_code,
                "output": runner.output(),
                "result": runner.last_result(),
            });
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::error!(error = %e, "Failed to serialize report"),
            }
        }
    }

    std::process::exit(exit_code);
}
