//! Process configuration, read from `XADMIN_*` environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, bail};

use xadmin_auth::policy::DEFAULT_ALIAS_SUFFIXES;
use xadmin_auth::{AccessPolicy, MethodSet, PasswordPolicy, SigningAlgorithm, TokenSettings, Whitelist};
use xadmin_observability::LogFormat;

const DEV_SECRET: &str = "xadmin-insecure-dev-secret";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Routes every authenticated user may call regardless of grants.
const DEFAULT_WHITELIST: &[(&str, &[&str])] = &[
    ("^/api/auth/logout", &["*"]),
    ("^/api/system/userinfo", &["*"]),
    ("^/api/system/permission/explain", &["GET"]),
];

/// Superuser created at startup when no user with that name exists yet.
#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub log_format: LogFormat,
    pub tokens: TokenSettings,
    pub password_policy: PasswordPolicy,
    pub bcrypt_cost: u32,
    pub access_policy: AccessPolicy,
    pub permission_cache_ttl: Duration,
    pub allow_registration: bool,
    /// Postgres when set, in-memory store otherwise.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub bootstrap_admin: Option<AdminBootstrap>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = get("XADMIN_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("XADMIN_BIND_ADDR must be a socket address")?;

        let log_format = match get("XADMIN_LOG_FORMAT") {
            Some(raw) => raw
                .parse::<LogFormat>()
                .map_err(anyhow::Error::msg)
                .context("XADMIN_LOG_FORMAT")?,
            None => LogFormat::default(),
        };

        let secret = get("XADMIN_SECRET_KEY").unwrap_or_else(|| DEV_SECRET.to_string());
        let mut tokens = TokenSettings::new(secret);
        if let Some(raw) = get("XADMIN_JWT_ALGORITHM") {
            tokens.algorithm = raw
                .parse::<SigningAlgorithm>()
                .context("XADMIN_JWT_ALGORITHM")?;
        }
        if let Some(minutes) = parse_opt::<i64>(&get, "XADMIN_ACCESS_TOKEN_MINUTES")? {
            tokens.access_lifetime = positive_minutes("XADMIN_ACCESS_TOKEN_MINUTES", minutes)?;
        }
        if let Some(minutes) = parse_opt::<i64>(&get, "XADMIN_REFRESH_TOKEN_MINUTES")? {
            tokens.refresh_lifetime = positive_minutes("XADMIN_REFRESH_TOKEN_MINUTES", minutes)?;
        }

        let mut password_policy = PasswordPolicy::default();
        if let Some(v) = parse_opt(&get, "XADMIN_PASSWORD_MIN_LENGTH")? {
            password_policy.min_length = v;
        }
        if let Some(v) = parse_opt(&get, "XADMIN_PASSWORD_REQUIRE_UPPERCASE")? {
            password_policy.require_uppercase = v;
        }
        if let Some(v) = parse_opt(&get, "XADMIN_PASSWORD_REQUIRE_LOWERCASE")? {
            password_policy.require_lowercase = v;
        }
        if let Some(v) = parse_opt(&get, "XADMIN_PASSWORD_REQUIRE_DIGIT")? {
            password_policy.require_digit = v;
        }
        if let Some(v) = parse_opt(&get, "XADMIN_PASSWORD_REQUIRE_SYMBOL")? {
            password_policy.require_symbol = v;
        }
        if let Some(symbols) = get("XADMIN_PASSWORD_SYMBOLS") {
            password_policy.symbols = symbols;
        }

        let bcrypt_cost = parse_opt(&get, "XADMIN_BCRYPT_COST")?.unwrap_or(12);

        let whitelist = match get("XADMIN_PERMISSION_WHITELIST") {
            Some(raw) => parse_whitelist(&raw).context("XADMIN_PERMISSION_WHITELIST")?,
            None => default_whitelist()?,
        };
        let access_policy = match get("XADMIN_ALIAS_SUFFIXES") {
            Some(raw) => AccessPolicy::new(whitelist, raw.split(',')),
            None => AccessPolicy::new(whitelist, DEFAULT_ALIAS_SUFFIXES.iter().copied()),
        };

        let permission_cache_ttl =
            Duration::from_secs(parse_opt(&get, "XADMIN_PERMISSION_CACHE_TTL_SECS")?.unwrap_or(60));
        let allow_registration = parse_opt(&get, "XADMIN_ALLOW_REGISTRATION")?.unwrap_or(true);

        let database_url = get("DATABASE_URL");
        let database_max_connections = parse_opt(&get, "XADMIN_DATABASE_MAX_CONNECTIONS")?.unwrap_or(10);

        let bootstrap_admin = match (get("XADMIN_ADMIN_USERNAME"), get("XADMIN_ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(AdminBootstrap { username, password }),
            (Some(_), None) => bail!("XADMIN_ADMIN_PASSWORD is required when XADMIN_ADMIN_USERNAME is set"),
            _ => None,
        };

        Ok(Self {
            bind_addr,
            log_format,
            tokens,
            password_policy,
            bcrypt_cost,
            access_policy,
            permission_cache_ttl,
            allow_registration,
            database_url,
            database_max_connections,
            bootstrap_admin,
        })
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.tokens.secret == DEV_SECRET
    }
}

fn parse_opt<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| anyhow::anyhow!("{key}: cannot parse '{raw}': {e}"))
        })
        .transpose()
}

fn positive_minutes(key: &str, minutes: i64) -> anyhow::Result<chrono::Duration> {
    if minutes <= 0 {
        bail!("{key} must be positive");
    }
    Ok(chrono::Duration::minutes(minutes))
}

fn default_whitelist() -> anyhow::Result<Whitelist> {
    DEFAULT_WHITELIST
        .iter()
        .try_fold(Whitelist::new(), |wl, (pattern, methods)| {
            wl.allow(pattern, MethodSet::from_list(methods.iter()))
        })
        .context("built-in whitelist")
}

/// JSON object of `pattern -> "*" | [methods]`.
pub fn parse_whitelist(raw: &str) -> anyhow::Result<Whitelist> {
    let entries: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(raw).context("expected a JSON object of pattern -> methods")?;

    let mut whitelist = Whitelist::new();
    for (pattern, methods) in entries {
        let methods = match methods {
            serde_json::Value::String(m) => MethodSet::from_list([m]),
            serde_json::Value::Array(items) => {
                let mut names = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        serde_json::Value::String(m) => names.push(m),
                        other => bail!("methods for '{pattern}' must be strings, got {other}"),
                    }
                }
                MethodSet::from_list(names)
            }
            other => bail!("methods for '{pattern}' must be a string or an array, got {other}"),
        };
        whitelist = whitelist.allow(&pattern, methods)?;
    }
    Ok(whitelist)
}
