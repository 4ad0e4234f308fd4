pub mod retry;

use std::path::Path;

use anyhow::{Context, Result};
use config::{Environment, File};
use tracing::info;

use crate::models::common::Config;

/// Environment variables overriding file settings, e.g. `INDEXER__RPC_URL` or
/// `INDEXER__PROTOCOLS__MIMO__FACTORY_ADDRESS`.
pub const ENV_PREFIX: &str = "INDEXER";

pub fn load_config<P: AsRef<Path>>(file_name: P) -> Result<Config> {
    let config_path = file_name.as_ref();
    info!("Config path: {}", config_path.to_string_lossy());

    let mut config: Config = config::Config::builder()
        .add_source(File::from(config_path))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .context("failed to read config file")?
        .try_deserialize()
        .context("failed to parse config")?;

    // Metric labels do not allow hyphens
    config.chain_name = config.chain_name.replace('-', "_");

    Ok(config)
}

/// Reduces an HTML error page (as returned by some RPC gateways) to its first line of text.
pub fn strip_html(error: &str) -> String {
    if error.contains("<!doctype html>") || error.contains("<html>") {
        error
            .lines()
            .map(|line| line.trim())
            .find(|line| {
                !line.starts_with('<')
                    && !line.ends_with('>')
                    && !line.is_empty()
                    && *line != "html"
                    && *line != "body"
            })
            .unwrap_or(error)
            .to_string()
    } else {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_gateway_error_page() {
        let page = "<!doctype html>\n<html>\n<body>\n502 Bad Gateway\n</body>\n</html>";
        assert_eq!(strip_html(page), "502 Bad Gateway");
    }

    #[test]
    fn keeps_plain_errors() {
        assert_eq!(strip_html("connection reset"), "connection reset");
    }
}
