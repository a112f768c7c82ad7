use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::SchedulerSettings;
use crate::limits::{DEFAULT_HORIZON_MINUTES, DEFAULT_SEARCH_WINDOW_MINUTES};
use crate::model::Minutes;

/// Process configuration, read from `STAGEGATE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub reconcile_every: Duration,
    pub horizon: Minutes,
    pub search_window: Minutes,
    /// JSON stage topology; the built-in healthcare model when unset.
    pub domain_file: Option<PathBuf>,
    /// Orchestrator "start instance" endpoint used by `/replan`.
    pub orchestrator_url: Option<String>,
    /// Process definition handed to new instances.
    pub process_url: String,
    pub callback_timeout: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|s| s.trim().parse().ok())
        }
        let non_empty = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        Self {
            bind: lookup("STAGEGATE_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&lookup, "STAGEGATE_PORT").unwrap_or(9007),
            data_dir: PathBuf::from(lookup("STAGEGATE_DATA_DIR").unwrap_or_else(|| "./data".into())),
            metrics_port: parsed(&lookup, "STAGEGATE_METRICS_PORT"),
            reconcile_every: Duration::from_millis(
                parsed(&lookup, "STAGEGATE_RECONCILE_MS").unwrap_or(500),
            ),
            horizon: parsed(&lookup, "STAGEGATE_HORIZON_MINUTES").unwrap_or(DEFAULT_HORIZON_MINUTES),
            search_window: parsed(&lookup, "STAGEGATE_SEARCH_WINDOW_MINUTES")
                .unwrap_or(DEFAULT_SEARCH_WINDOW_MINUTES),
            domain_file: non_empty("STAGEGATE_DOMAIN_FILE").map(PathBuf::from),
            orchestrator_url: non_empty("STAGEGATE_ORCHESTRATOR_URL"),
            process_url: lookup("STAGEGATE_PROCESS_URL").unwrap_or_default(),
            callback_timeout: Duration::from_millis(
                parsed(&lookup, "STAGEGATE_CALLBACK_TIMEOUT_MS").unwrap_or(5_000),
            ),
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            horizon: self.horizon,
            search_window: self.search_window,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("bookings.wal")
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]);
        assert_eq!(c.listen_addr(), "0.0.0.0:9007");
        assert_eq!(c.reconcile_every, Duration::from_millis(500));
        assert_eq!(c.horizon, DEFAULT_HORIZON_MINUTES);
        assert_eq!(c.search_window, DEFAULT_SEARCH_WINDOW_MINUTES);
        assert!(c.metrics_port.is_none());
        assert!(c.domain_file.is_none());
        assert!(c.orchestrator_url.is_none());
        assert_eq!(c.wal_path(), PathBuf::from("./data/bookings.wal"));
    }

    #[test]
    fn overrides() {
        let c = config(&[
            ("STAGEGATE_PORT", "8080"),
            ("STAGEGATE_BIND", "127.0.0.1"),
            ("STAGEGATE_RECONCILE_MS", "50"),
            ("STAGEGATE_HORIZON_MINUTES", "1440"),
            ("STAGEGATE_METRICS_PORT", "9100"),
            ("STAGEGATE_ORCHESTRATOR_URL", "http://cpee/start"),
        ]);
        assert_eq!(c.listen_addr(), "127.0.0.1:8080");
        assert_eq!(c.reconcile_every, Duration::from_millis(50));
        assert_eq!(c.scheduler_settings().horizon, 1440);
        assert_eq!(c.metrics_port, Some(9100));
        assert_eq!(c.orchestrator_url.as_deref(), Some("http://cpee/start"));
    }

    #[test]
    fn garbage_falls_back() {
        let c = config(&[
            ("STAGEGATE_PORT", "not-a-port"),
            ("STAGEGATE_DOMAIN_FILE", "  "),
        ]);
        assert_eq!(c.port, 9007);
        assert!(c.domain_file.is_none());
    }
}
