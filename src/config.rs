use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Shortest HMAC secret accepted for either token class
pub const MIN_SECRET_LEN: usize = 32;

/// Longest accepted token lifetime (one year). Access tokens are bounded
/// through the refresh > access rule.
pub const MAX_TOKEN_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    /// Super-admin seeded at startup when absent
    pub bootstrap: Option<BootstrapConfig>,
    pub cookies: CookieConfig,
    pub node: NodeConfig,
    pub passwords: PasswordConfig,
    /// Enables dangerous operations like purge. Must never be true in production.
    pub test_mode: bool,
    pub tokens: TokenConfig,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub access_ttl_seconds: u64,
    pub cleanup_interval_seconds: u64,
    pub issuer: String,
    pub refresh_secret: String,
    pub refresh_ttl_seconds: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SameSitePolicy {
    #[default]
    Lax,
    Strict,
}

#[derive(Debug, Clone)]
pub struct CookieConfig {
    /// Where interactive clients are sent after a login or refresh failure
    pub login_path: String,
    pub name: String,
    pub same_site: SameSitePolicy,
    pub secure: bool,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            name: "refresh_token".to_string(),
            same_site: SameSitePolicy::Lax,
            secure: true,
        }
    }
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy)]
pub struct PasswordConfig {
    pub iterations: u32,
    pub memory_kib: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            iterations: argon2::Params::DEFAULT_T_COST,
            memory_kib: argon2::Params::DEFAULT_M_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub email: String,
    pub password: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_address = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let data_dir = lookup("DATA_DIR").unwrap_or_else(|| "./data".to_string());

        let access_secret = lookup("ACCESS_TOKEN_SECRET").ok_or_else(|| {
            ConfigError::ValidationError("ACCESS_TOKEN_SECRET is required".to_string())
        })?;
        let refresh_secret = lookup("REFRESH_TOKEN_SECRET").ok_or_else(|| {
            ConfigError::ValidationError("REFRESH_TOKEN_SECRET is required".to_string())
        })?;

        let tokens = TokenConfig {
            access_secret,
            access_ttl_seconds: parse_or(&lookup, "ACCESS_TOKEN_TTL_SECONDS", 900)?,
            cleanup_interval_seconds: parse_or(&lookup, "CLEANUP_INTERVAL_SECONDS", 60)?,
            issuer: lookup("TOKEN_ISSUER").unwrap_or_else(|| "school-auth".to_string()),
            refresh_secret,
            refresh_ttl_seconds: parse_or(&lookup, "REFRESH_TOKEN_TTL_SECONDS", 604_800)?,
        };

        let development = lookup("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("development"))
            .unwrap_or(false);
        let same_site = match lookup("COOKIE_SAME_SITE")
            .map(|v| v.to_lowercase())
            .as_deref()
        {
            None | Some("lax") => SameSitePolicy::Lax,
            Some("strict") => SameSitePolicy::Strict,
            Some(other) => {
                return Err(ConfigError::ValidationError(format!(
                    "COOKIE_SAME_SITE must be lax or strict, got {other}"
                )))
            }
        };
        let cookies = CookieConfig {
            login_path: lookup("LOGIN_PATH").unwrap_or_else(|| "/login".to_string()),
            name: lookup("REFRESH_COOKIE_NAME").unwrap_or_else(|| "refresh_token".to_string()),
            same_site,
            secure: lookup("COOKIE_SECURE")
                .map(|v| is_truthy(&v))
                .unwrap_or(!development),
        };

        let defaults = PasswordConfig::default();
        let passwords = PasswordConfig {
            iterations: parse_or(&lookup, "ARGON2_T", defaults.iterations)?,
            memory_kib: parse_or(&lookup, "ARGON2_M", defaults.memory_kib)?,
            parallelism: parse_or(&lookup, "ARGON2_P", defaults.parallelism)?,
        };

        let bootstrap = match (
            lookup("BOOTSTRAP_SUPERADMIN_EMAIL"),
            lookup("BOOTSTRAP_SUPERADMIN_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Some(BootstrapConfig { email, password }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::ValidationError(
                    "BOOTSTRAP_SUPERADMIN_EMAIL and BOOTSTRAP_SUPERADMIN_PASSWORD must be set together"
                        .to_string(),
                ))
            }
        };

        let test_mode = lookup("TEST_MODE").map(|v| is_truthy(&v)).unwrap_or(false);

        let config = Config {
            bootstrap,
            cookies,
            node: NodeConfig {
                bind_address,
                data_dir,
            },
            passwords,
            test_mode,
            tokens,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let tokens = &self.tokens;
        if tokens.access_secret.len() < MIN_SECRET_LEN
            || tokens.refresh_secret.len() < MIN_SECRET_LEN
        {
            return Err(ConfigError::ValidationError(format!(
                "token secrets must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if tokens.access_secret == tokens.refresh_secret {
            return Err(ConfigError::ValidationError(
                "ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ".to_string(),
            ));
        }
        if tokens.access_ttl_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "ACCESS_TOKEN_TTL_SECONDS must be positive".to_string(),
            ));
        }
        if tokens.refresh_ttl_seconds > MAX_TOKEN_TTL_SECONDS {
            return Err(ConfigError::ValidationError(format!(
                "REFRESH_TOKEN_TTL_SECONDS must not exceed {MAX_TOKEN_TTL_SECONDS}"
            )));
        }
        if tokens.refresh_ttl_seconds <= tokens.access_ttl_seconds {
            return Err(ConfigError::ValidationError(
                "REFRESH_TOKEN_TTL_SECONDS must exceed ACCESS_TOKEN_TTL_SECONDS".to_string(),
            ));
        }
        if tokens.cleanup_interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "CLEANUP_INTERVAL_SECONDS must be positive".to_string(),
            ));
        }

        if !self.cookies.secure {
            tracing::warn!("Refresh cookie is not marked Secure. Do not run like this in production.");
        }

        Ok(())
    }
}

fn is_truthy(value: &str) -> bool {
    value == "true" || value == "1"
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::ValidationError(format!("{key} is not a valid number: {raw}"))),
    }
}
