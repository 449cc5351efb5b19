use std::path::Path;

use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

/// Initialize tracing. Logs go to stderr; when `log_directory` is set,
/// a `build.log` file in that directory receives the same stream.
pub fn init(log_directory: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("build log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match log_directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log directory: {}", dir.display()))?;
            let file = std::fs::File::create(dir.join("build.log"))
                .with_context(|| format!("create log file in {}", dir.display()))?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .try_init()
                .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;
        }
        None => {
            builder
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;
        }
    }
    Ok(())
}
