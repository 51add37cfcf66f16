// src/config/dashboard.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

use crate::articles::newsapi::DEFAULT_BASE_URL;

pub const ENV_CONFIG_PATH: &str = "DASHBOARD_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/dashboard.toml";

const DEV_SESSION_SECRET: &str = "dev-only-session-secret-change-me";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_query() -> String {
    "technology".to_string()
}
fn default_rates_path() -> PathBuf {
    PathBuf::from("data/kv.json")
}
fn default_refresh_secs() -> u64 {
    900
}

/// How `/auth/login` turns a credential into an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdentityMode {
    /// Verify a Google ID token.
    #[default]
    Google,
    /// Trust the credential as an email address (local development only).
    Static,
}

impl IdentityMode {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Some(Self::Google),
            "static" | "dev" => Some(Self::Static),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// NewsAPI key. When absent and no fixture is configured the feed stays empty.
    #[serde(default)]
    pub news_api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub news_api_base_url: String,
    #[serde(default = "default_query")]
    pub news_query: String,
    /// The one address that gets the admin role. Empty means nobody is admin.
    #[serde(default)]
    pub admin_email: String,
    #[serde(default)]
    pub session_secret: String,
    /// Expected `aud` of Google ID tokens; unchecked when absent.
    #[serde(default)]
    pub google_client_id: Option<String>,
    #[serde(default = "default_rates_path")]
    pub rates_path: PathBuf,
    #[serde(default = "default_refresh_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default)]
    pub identity_mode: IdentityMode,
    /// Serve articles from a NewsAPI-shaped JSON file instead of the live API.
    #[serde(default)]
    pub articles_fixture_path: Option<PathBuf>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            news_api_key: None,
            news_api_base_url: default_base_url(),
            news_query: default_query(),
            admin_email: String::new(),
            session_secret: String::new(),
            google_client_id: None,
            rates_path: default_rates_path(),
            refresh_interval_secs: default_refresh_secs(),
            identity_mode: IdentityMode::default(),
            articles_fixture_path: None,
        }
    }
}

impl DashboardConfig {
    /// Parse a TOML file. Unknown keys are ignored, missing keys take defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading dashboard config {}", path.display()))?;
        let cfg: DashboardConfig = toml::from_str(&content)
            .with_context(|| format!("parsing dashboard config {}", path.display()))?;
        Ok(cfg)
    }

    /// Resolve config the usual way:
    /// 1) $DASHBOARD_CONFIG_PATH (must exist)
    /// 2) config/dashboard.toml
    /// 3) built-in defaults
    ///
    /// then apply environment overrides.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::load_from(Path::new(DEFAULT_CONFIG_PATH))?
        } else {
            Self::default()
        };
        cfg.apply_env();
        cfg.finalize()?;
        Ok(cfg)
    }

    /// Environment variables win over file values.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_nonempty("NEWS_API_KEY") {
            self.news_api_key = Some(v);
        }
        if let Some(v) = env_nonempty("NEWS_API_BASE_URL") {
            self.news_api_base_url = v;
        }
        if let Some(v) = env_nonempty("NEWS_QUERY") {
            self.news_query = v;
        }
        if let Some(v) = env_nonempty("ADMIN_EMAIL") {
            self.admin_email = v;
        }
        if let Some(v) = env_nonempty("SESSION_SECRET") {
            self.session_secret = v;
        }
        if let Some(v) = env_nonempty("GOOGLE_CLIENT_ID") {
            self.google_client_id = Some(v);
        }
        if let Some(v) = env_nonempty("RATES_PATH") {
            self.rates_path = PathBuf::from(v);
        }
        if let Some(v) = env_nonempty("ARTICLES_FIXTURE_PATH") {
            self.articles_fixture_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env_nonempty("REFRESH_INTERVAL_SECS") {
            match v.trim().parse::<u64>() {
                Ok(n) => self.refresh_interval_secs = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid REFRESH_INTERVAL_SECS"),
            }
        }
        if let Some(v) = env_nonempty("IDENTITY_MODE") {
            match IdentityMode::parse(&v) {
                Some(m) => self.identity_mode = m,
                None => tracing::warn!(value = %v, "ignoring unknown IDENTITY_MODE"),
            }
        }
    }

    /// Fill gaps that have no sensible static default.
    /// A missing session secret is fatal outside `IdentityMode::Static`.
    fn finalize(&mut self) -> Result<()> {
        self.admin_email = self.admin_email.trim().to_string();
        if self.admin_email.is_empty() {
            tracing::warn!("ADMIN_EMAIL is not set; no user will get the admin role");
        }
        if self.session_secret.trim().is_empty() {
            if self.identity_mode != IdentityMode::Static {
                return Err(anyhow!(
                    "SESSION_SECRET must be set when identity_mode is google"
                ));
            }
            tracing::warn!(
                "SESSION_SECRET is not set; using the development secret (static identity mode)"
            );
            self.session_secret = DEV_SESSION_SECRET.to_string();
        }
        if self.refresh_interval_secs == 0 {
            self.refresh_interval_secs = default_refresh_secs();
        }
        Ok(())
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
