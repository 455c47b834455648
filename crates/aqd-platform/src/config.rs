use std::path::PathBuf;

use anyhow::{Context, Result};
use aqd_core::Catalog;
use tracing::info;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    pub http_addr: String,
    pub max_connections: u32,
    /// JSON catalog replacing the built-in plans when set.
    pub catalog_path: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let http_addr =
            std::env::var("HTTP_ADDR").unwrap_or_else(|_| default_http_addr.to_string());
        let max_connections =
            parse_max_connections(std::env::var("DATABASE_MAX_CONNECTIONS").ok().as_deref())?;
        let catalog_path = std::env::var("CATALOG_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            database_url,
            http_addr,
            max_connections,
            catalog_path,
        })
    }

    pub fn load_catalog(&self) -> Result<Catalog> {
        let Some(path) = &self.catalog_path else {
            return Ok(Catalog::default());
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        let catalog = Catalog::from_json(&raw)
            .with_context(|| format!("invalid catalog {}", path.display()))?;
        info!(path = %path.display(), plans = catalog.plans.len(), "catalog loaded");
        Ok(catalog)
    }
}

fn parse_max_connections(raw: Option<&str>) -> Result<u32> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(DEFAULT_MAX_CONNECTIONS);
    };

    let value: u32 = raw
        .parse()
        .with_context(|| format!("DATABASE_MAX_CONNECTIONS must be a positive integer, got {raw}"))?;
    if value == 0 {
        anyhow::bail!("DATABASE_MAX_CONNECTIONS must be at least 1");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(catalog_path: Option<PathBuf>) -> ServiceConfig {
        ServiceConfig {
            database_url: "postgres://localhost/aqd".to_string(),
            http_addr: "127.0.0.1:0".to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            catalog_path,
        }
    }

    #[test]
    fn max_connections_defaults_and_validates() {
        assert_eq!(parse_max_connections(None).unwrap(), 10);
        assert_eq!(parse_max_connections(Some(" ")).unwrap(), 10);
        assert_eq!(parse_max_connections(Some("25")).unwrap(), 25);
        assert!(parse_max_connections(Some("0")).is_err());
        assert!(parse_max_connections(Some("many")).is_err());
    }

    #[test]
    fn missing_catalog_path_uses_builtin_plans() {
        let catalog = config(None).load_catalog().unwrap();
        assert_eq!(catalog, Catalog::default());
    }

    #[test]
    fn unreadable_catalog_is_an_error() {
        let err = config(Some(PathBuf::from("/nonexistent/aqd-catalog.json")))
            .load_catalog()
            .unwrap_err();
        assert!(err.to_string().contains("failed to read catalog"));
    }
}
