use anyhow::{Result, anyhow};
use tracing::Level;
use tracing_subscriber::fmt;

pub fn init(verbose: bool, level: Option<&str>) -> Result<()> {
    if !verbose && level.is_none() {
        return Ok(());
    }
    let level = match level {
        Some(value) => parse_level(value)?,
        None => Level::DEBUG,
    };
    let _ = fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
    Ok(())
}

fn parse_level(value: &str) -> Result<Level> {
    value
        .trim()
        .parse::<Level>()
        .map_err(|_| anyhow!("invalid log level '{}' (expected trace/debug/info/warn/error)", value))
}
