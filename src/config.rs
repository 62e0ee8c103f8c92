use std::path::PathBuf;
use std::str::FromStr;

/// Server settings, read once from `SHAREIT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    /// Appends since the last compaction that trigger the next one. 0 disables it.
    pub compact_threshold: u64,
    /// Prometheus exporter port. `None` leaves the exporter off.
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 7070,
            data_dir: PathBuf::from("./data"),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable numbers fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind: lookup("SHAREIT_BIND").unwrap_or(defaults.bind),
            port: parsed(&lookup, "SHAREIT_PORT").unwrap_or(defaults.port),
            data_dir: lookup("SHAREIT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            max_connections: parsed(&lookup, "SHAREIT_MAX_CONNECTIONS")
                .unwrap_or(defaults.max_connections),
            compact_threshold: parsed(&lookup, "SHAREIT_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            metrics_port: parsed(&lookup, "SHAREIT_METRICS_PORT"),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("shareit.wal")
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_map(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = from_map(&[]);
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.addr(), "0.0.0.0:7070");
        assert_eq!(cfg.wal_path(), PathBuf::from("./data/shareit.wal"));
    }

    #[test]
    fn reads_overrides() {
        let cfg = from_map(&[
            ("SHAREIT_BIND", "127.0.0.1"),
            ("SHAREIT_PORT", "9000"),
            ("SHAREIT_DATA_DIR", "/var/lib/shareit"),
            ("SHAREIT_MAX_CONNECTIONS", "8"),
            ("SHAREIT_COMPACT_THRESHOLD", "0"),
            ("SHAREIT_METRICS_PORT", "9100"),
        ]);
        assert_eq!(cfg.addr(), "127.0.0.1:9000");
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/shareit"));
        assert_eq!(cfg.max_connections, 8);
        assert_eq!(cfg.compact_threshold, 0);
        assert_eq!(cfg.metrics_port, Some(9100));
    }

    #[test]
    fn garbage_numbers_fall_back() {
        let cfg = from_map(&[("SHAREIT_PORT", "http"), ("SHAREIT_METRICS_PORT", "-1")]);
        assert_eq!(cfg.port, 7070);
        assert_eq!(cfg.metrics_port, None);
    }
}
