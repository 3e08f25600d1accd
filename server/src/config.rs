use std::{fmt, str::FromStr, time::Duration as StdDuration};

use anyhow::{Context, Result, anyhow};
use axum_extra::extract::cookie::Key;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::Duration;
use platform_authz::{DEFAULT_LOOKUP_TIMEOUT, RedirectPaths};

#[derive(Clone)]
pub struct AppConfig {
    pub default_org_slug: String,
    pub default_org_name: String,
    pub cookie_key: Key,
    pub cors_allowed_origins: Vec<String>,
    pub session_ttl: Duration,
    pub authz_timeout: StdDuration,
    pub cron_secret: Option<String>,
    pub redirects: RedirectPaths,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("default_org_slug", &self.default_org_slug)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("session_ttl", &self.session_ttl)
            .field("authz_timeout", &self.authz_timeout)
            .field("cron_secret", &self.cron_secret.as_ref().map(|_| "<redacted>"))
            .field("redirects", &self.redirects)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (the process env in
    /// production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let default_org_slug = lookup("DEFAULT_ORG_SLUG").unwrap_or_else(|| "default".into());
        let default_org_name = lookup("DEFAULT_ORG_NAME").unwrap_or_else(|| "Default".into());

        let cookie_secret = lookup("COOKIE_SECRET_BASE64").context("COOKIE_SECRET_BASE64 missing")?;
        let secret_bytes = STANDARD
            .decode(cookie_secret.trim())
            .context("invalid COOKIE_SECRET_BASE64")?;
        if secret_bytes.len() < 64 {
            return Err(anyhow!(
                "COOKIE_SECRET_BASE64 must decode to at least 64 bytes"
            ));
        }
        let cookie_key = Key::from(&secret_bytes[..64]);

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .filter_map(|s| {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
            .collect::<Vec<_>>();

        let session_ttl = Duration::hours(parse_or(&lookup, "SESSION_TTL_HOURS", 12)?);
        let authz_timeout = StdDuration::from_millis(parse_or(
            &lookup,
            "AUTHZ_TIMEOUT_MS",
            DEFAULT_LOOKUP_TIMEOUT.as_millis() as u64,
        )?);

        let cron_secret = lookup("CRON_SECRET").filter(|s| !s.trim().is_empty());

        let defaults = RedirectPaths::default();
        let redirects = RedirectPaths {
            login: lookup("LOGIN_PATH").unwrap_or(defaults.login),
            unauthorized: lookup("UNAUTHORIZED_PATH").unwrap_or(defaults.unauthorized),
        };

        Ok(Self {
            default_org_slug,
            default_org_name,
            cookie_key,
            cors_allowed_origins,
            session_ttl,
            authz_timeout,
            cron_secret,
            redirects,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}")),
        None => Ok(default),
    }
}
