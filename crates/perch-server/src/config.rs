use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub media_base_url: String,
    pub media_secret: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = lookup("PERCH_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("PERCH_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let host = var("PERCH_HOST", "0.0.0.0");
        let port: u16 = var("PERCH_PORT", "3000")
            .parse()
            .context("PERCH_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let media_secret = lookup("PERCH_MEDIA_SECRET")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| jwt_secret.clone());

        Ok(Self {
            db_path: PathBuf::from(var("PERCH_DB_PATH", "perch.db")),
            addr,
            media_base_url: var("PERCH_MEDIA_BASE_URL", "http://localhost:9000/media"),
            media_secret,
            jwt_secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("PERCH_JWT_SECRET", "a-real-secret")]).unwrap();
        assert_eq!(config.addr.port(), 3000);
        assert_eq!(config.db_path, PathBuf::from("perch.db"));
        assert_eq!(config.media_secret, "a-real-secret");
        assert_eq!(config.media_base_url, "http://localhost:9000/media");
    }

    #[test]
    fn placeholder_secret_is_rejected() {
        assert!(load(&[]).is_err());
        assert!(load(&[("PERCH_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn bad_port_is_rejected() {
        assert!(load(&[("PERCH_JWT_SECRET", "a-real-secret"), ("PERCH_PORT", "http")]).is_err());
    }
}
