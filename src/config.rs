use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://blog.db";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5000";
const MIN_SECRET_LEN: usize = 32;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("SECRET_KEY must be at least 32 bytes long")]
    WeakSecret,
    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub secret_key: String,
    pub database_url: String,
    pub store: StoreKind,
    pub bind_addr: String,
    pub session_ttl_hours: i64,
    pub cookie_secure: bool,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let secret_key = get("SECRET_KEY").ok_or(ConfigError::Missing("SECRET_KEY"))?;
        if secret_key.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }
        let store = match get("STORE").as_deref() {
            None | Some("sqlite") => StoreKind::Sqlite,
            Some("memory") => StoreKind::Memory,
            Some(other) => return Err(ConfigError::Invalid { name: "STORE", value: other.into() }),
        };
        let session_ttl_hours = match get("SESSION_TTL_HOURS") {
            None => 24,
            Some(v) => match v.parse::<i64>() {
                Ok(h) if h > 0 => h,
                _ => return Err(ConfigError::Invalid { name: "SESSION_TTL_HOURS", value: v }),
            },
        };
        Ok(Self {
            secret_key,
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            store,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            session_ttl_hours,
            cookie_secure: get("COOKIE_SECURE").map(|v| flag(&v)).unwrap_or(false),
        })
    }
}

pub(crate) fn flag(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true")
}

pub(crate) fn usize_env(name: &str, default: usize) -> usize {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

pub(crate) fn secs_env(name: &str, default: u64) -> Duration {
    Duration::from_secs(std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k: &str| map.get(k).cloned()
    }

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn defaults_fill_everything_but_the_secret() {
        let s = Settings::from_lookup(lookup(&[("SECRET_KEY", SECRET)])).unwrap();
        assert_eq!(s.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(s.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(s.store, StoreKind::Sqlite);
        assert_eq!(s.session_ttl_hours, 24);
        assert!(!s.cookie_secure);
    }

    #[test]
    fn secret_is_required_and_must_be_long() {
        assert_eq!(Settings::from_lookup(lookup(&[])).unwrap_err(), ConfigError::Missing("SECRET_KEY"));
        assert_eq!(
            Settings::from_lookup(lookup(&[("SECRET_KEY", "short")])).unwrap_err(),
            ConfigError::WeakSecret
        );
    }

    #[test]
    fn overrides_are_honoured() {
        let s = Settings::from_lookup(lookup(&[
            ("SECRET_KEY", SECRET),
            ("DATABASE_URL", "sqlite::memory:"),
            ("STORE", "memory"),
            ("SESSION_TTL_HOURS", "2"),
            ("COOKIE_SECURE", "TRUE"),
        ]))
        .unwrap();
        assert_eq!(s.database_url, "sqlite::memory:");
        assert_eq!(s.store, StoreKind::Memory);
        assert_eq!(s.session_ttl_hours, 2);
        assert!(s.cookie_secure);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            Settings::from_lookup(lookup(&[("SECRET_KEY", SECRET), ("STORE", "redis")])),
            Err(ConfigError::Invalid { name: "STORE", .. })
        ));
        assert!(matches!(
            Settings::from_lookup(lookup(&[("SECRET_KEY", SECRET), ("SESSION_TTL_HOURS", "0")])),
            Err(ConfigError::Invalid { name: "SESSION_TTL_HOURS", .. })
        ));
    }
}
