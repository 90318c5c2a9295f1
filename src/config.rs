use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use axum::http::HeaderValue;

pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Debug, Clone)]
pub struct Config {
    pub env_mode: String,
    pub bind_addr: SocketAddr,
    pub database_path: String,
    pub allowed_origins: Vec<HeaderValue>,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
    pub expiry_sweep: Duration,
    pub geocoder_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        if env::var("JWT_SECRET").is_err() {
            anyhow::bail!("JWT_SECRET must be set");
        }

        let env_mode = env::var("RUST_ENV").unwrap_or_else(|_| "development".to_string());
        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("Invalid BIND_ADDR: {}", e))?;

        Ok(Self {
            allowed_origins: allowed_origins(&env_mode, env::var("ALLOWED_ORIGINS").ok())?,
            env_mode,
            bind_addr,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "aahaar_setu.db".to_string()),
            rate_limit_per_second: parse_or("RATE_LIMIT_PER_SECOND", 1200),
            rate_limit_burst: parse_or("RATE_LIMIT_BURST", 2400),
            expiry_sweep: Duration::from_secs(parse_or("EXPIRY_SWEEP_SECS", 300)),
            geocoder_url: env::var("GEOCODER_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_GEOCODER_URL.to_string()),
        })
    }

    pub fn is_production(&self) -> bool {
        self.env_mode == "production"
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {} value: {}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

/// No permissive mode: production needs an explicit list, development falls
/// back to the local dev server.
fn allowed_origins(env_mode: &str, raw: Option<String>) -> anyhow::Result<Vec<HeaderValue>> {
    let origins: Vec<HeaderValue> = raw
        .as_deref()
        .unwrap_or("")
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid ALLOWED_ORIGINS entry: {}", trimmed);
                    None
                }
            }
        })
        .collect();

    if !origins.is_empty() {
        return Ok(origins);
    }
    if env_mode == "production" {
        anyhow::bail!("ALLOWED_ORIGINS must contain at least one valid origin in production");
    }
    Ok(vec![
        HeaderValue::from_static("http://localhost:5173"),
        HeaderValue::from_static("http://127.0.0.1:5173"),
    ])
}
