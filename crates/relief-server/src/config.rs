use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use tracing::warn;

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Credentials for an admin account created at startup if none exists.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedAdmin {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub seed_admin: Option<SeedAdmin>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = match var("RELIEF_JWT_SECRET") {
            Some(secret) if secret != DEV_JWT_SECRET => secret,
            _ => {
                warn!("RELIEF_JWT_SECRET is unset or a placeholder, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let port = match var("RELIEF_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("RELIEF_PORT is not a valid port: {}", raw))?,
            None => 5000,
        };

        let seed_admin = match (var("RELIEF_SEED_ADMIN_EMAIL"), var("RELIEF_SEED_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(SeedAdmin {
                email: email.trim().to_lowercase(),
                password,
            }),
            (Some(_), None) | (None, Some(_)) => {
                warn!("Both RELIEF_SEED_ADMIN_EMAIL and RELIEF_SEED_ADMIN_PASSWORD are needed to seed an admin");
                None
            }
            (None, None) => None,
        };

        Ok(Self {
            jwt_secret,
            db_path: PathBuf::from(var("RELIEF_DB_PATH").unwrap_or_else(|| "relief.db".into())),
            host: var("RELIEF_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            seed_admin,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
