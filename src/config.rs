use crate::auth::DEFAULT_PRIVILEGED_USER;
use crate::limits::DEFAULT_MAX_CONNECTIONS;

/// Process configuration, read from `ROOMBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub max_connections: usize,
    pub metrics_port: Option<u16>,
    pub privileged_user: String,
    pub seed_demo: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid value for {}: {:?}", self.var, self.value)
    }
}

impl std::error::Error for ConfigError {}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 3000,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            metrics_port: None,
            privileged_user: DEFAULT_PRIVILEGED_USER.into(),
            seed_demo: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            bind: lookup("ROOMBOOK_BIND").unwrap_or(defaults.bind),
            port: parsed(&lookup, "ROOMBOOK_PORT")?.unwrap_or(defaults.port),
            max_connections: parsed(&lookup, "ROOMBOOK_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
            metrics_port: parsed(&lookup, "ROOMBOOK_METRICS_PORT")?,
            privileged_user: lookup("ROOMBOOK_PRIVILEGED_USER")
                .filter(|u| !u.is_empty())
                .unwrap_or(defaults.privileged_user),
            seed_demo: flag(&lookup, "ROOMBOOK_SEED_DEMO")?.unwrap_or(defaults.seed_demo),
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError { var, value }),
    }
}

fn flag(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<bool>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError { var, value }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = from_pairs(&[]).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.listen_addr(), "0.0.0.0:3000");
        assert_eq!(cfg.privileged_user, "superuser");
        assert!(cfg.seed_demo);
    }

    #[test]
    fn overrides_applied() {
        let cfg = from_pairs(&[
            ("ROOMBOOK_BIND", "127.0.0.1"),
            ("ROOMBOOK_PORT", "8080"),
            ("ROOMBOOK_MAX_CONNECTIONS", "4"),
            ("ROOMBOOK_METRICS_PORT", "9100"),
            ("ROOMBOOK_PRIVILEGED_USER", "admin"),
            ("ROOMBOOK_SEED_DEMO", "off"),
        ])
        .unwrap();
        assert_eq!(cfg.listen_addr(), "127.0.0.1:8080");
        assert_eq!(cfg.max_connections, 4);
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.privileged_user, "admin");
        assert!(!cfg.seed_demo);
    }

    #[test]
    fn malformed_values_rejected() {
        let err = from_pairs(&[("ROOMBOOK_PORT", "eighty")]).unwrap_err();
        assert_eq!(err.var, "ROOMBOOK_PORT");
        assert!(err.to_string().contains("eighty"));

        let err = from_pairs(&[("ROOMBOOK_SEED_DEMO", "maybe")]).unwrap_err();
        assert_eq!(err.var, "ROOMBOOK_SEED_DEMO");
    }

    #[test]
    fn empty_privileged_user_keeps_default() {
        let cfg = from_pairs(&[("ROOMBOOK_PRIVILEGED_USER", "")]).unwrap();
        assert_eq!(cfg.privileged_user, "superuser");
    }
}
