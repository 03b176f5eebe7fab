use std::{env, str::FromStr};

use anyhow::{Context, Result};

const DEV_JWT_SECRET: &str = "medbook-development-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

/// Loads the service configuration from the process environment.
///
/// `bootstrap::init_env` should run first so values from `.env` are visible.
pub fn load() -> Result<Config> {
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let jwt_secret = match env::var("JWT_SECRET") {
        Ok(secret) if !secret.is_empty() => secret,
        _ if cfg!(debug_assertions) => {
            tracing::warn!("JWT_SECRET is not set, falling back to the development secret");
            DEV_JWT_SECRET.to_string()
        }
        _ => anyhow::bail!("JWT_SECRET must be set in release builds"),
    };

    Ok(Config {
        server: ServerConfig {
            host: env::var("HOST").unwrap_or("0.0.0.0".to_string()),
            port: parse_var("PORT", 8000)?,
        },
        database: DatabaseConfig {
            url: database_url,
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,
        },
        auth: AuthConfig {
            jwt_secret,
            access_token_expire_minutes: parse_var("ACCESS_TOKEN_EXPIRE_MINUTES", 10)?,
            refresh_token_expire_minutes: parse_var("REFRESH_TOKEN_EXPIRE_MINUTES", 60 * 24 * 7)?,
        },
        cors: CorsConfig {
            allowed_origins: parse_origins(
                &env::var("CORS_ALLOWED_ORIGINS").unwrap_or("http://localhost:3000".to_string()),
            )?,
        },
    })
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

/// Credentialed CORS needs explicit origins, so a `*` wildcard is refused.
fn parse_origins(raw: &str) -> Result<Vec<String>> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect();

    if origins.iter().any(|origin| origin == "*") {
        anyhow::bail!("CORS_ALLOWED_ORIGINS must list explicit origins, not \"*\"");
    }
    Ok(origins)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_split_and_trimmed() {
        assert_eq!(
            parse_origins("http://localhost:3000, https://medbook.example ,,").unwrap(),
            vec!["http://localhost:3000", "https://medbook.example"]
        );
    }

    #[test]
    fn wildcard_origin_is_refused() {
        assert!(parse_origins("*").is_err());
        assert!(parse_origins("http://localhost:3000,*").is_err());
    }

    #[test]
    fn missing_numeric_vars_use_defaults() {
        let port: u16 = parse_var("MEDBOOK_TEST_UNSET_PORT", 8000).unwrap();
        assert_eq!(port, 8000);
    }
}
