use std::{fs, io, path::PathBuf};

use grantdesk_core::DispatcherOptions;
use grantdesk_util::{env_u64, env_usize, expand_user, state_file_path, write_json_atomic};
use serde::{Deserialize, Serialize};
use tracing::warn;

const CONFIG_FILE: &str = "grantdesk-config.json";

const CATALOG_ENV: &str = "GRANTDESK_CATALOG";
const WORKERS_ENV: &str = "GRANTDESK_WORKERS";
const MAX_IN_FLIGHT_ENV: &str = "GRANTDESK_MAX_IN_FLIGHT";
const LATENCY_ENV: &str = "GRANTDESK_LATENCY_MS";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) catalog_path: String,
    pub(crate) worker_threads: usize,
    pub(crate) max_in_flight: usize,
    pub(crate) latency_ms: u64,
    pub(crate) last_app_id: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let dispatcher = DispatcherOptions::default();
        Self {
            catalog_path: std::env::var(CATALOG_ENV).unwrap_or_else(|_| {
                grantdesk_util::default_catalog_path()
                    .to_string_lossy()
                    .into_owned()
            }),
            worker_threads: env_usize(WORKERS_ENV).unwrap_or(dispatcher.worker_threads),
            max_in_flight: env_usize(MAX_IN_FLIGHT_ENV).unwrap_or(dispatcher.max_in_flight),
            latency_ms: env_u64(LATENCY_ENV).unwrap_or(0),
            last_app_id: String::new(),
        }
    }
}

impl AppConfig {
    pub(crate) fn load() -> Self {
        Self::load_from(&config_path())
    }

    /// Environment variables win over the file; the file wins over defaults.
    pub(crate) fn load_from(path: &std::path::Path) -> Self {
        let mut cfg = AppConfig::default();
        match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<AppConfig>(&data) {
                Ok(file_cfg) => {
                    if std::env::var(CATALOG_ENV).is_err() && !file_cfg.catalog_path.is_empty() {
                        cfg.catalog_path = file_cfg.catalog_path;
                    }
                    if env_usize(WORKERS_ENV).is_none() && file_cfg.worker_threads > 0 {
                        cfg.worker_threads = file_cfg.worker_threads;
                    }
                    if env_usize(MAX_IN_FLIGHT_ENV).is_none() && file_cfg.max_in_flight > 0 {
                        cfg.max_in_flight = file_cfg.max_in_flight;
                    }
                    if env_u64(LATENCY_ENV).is_none() {
                        cfg.latency_ms = file_cfg.latency_ms;
                    }
                    cfg.last_app_id = file_cfg.last_app_id;
                }
                Err(err) => {
                    warn!("Failed to parse {}: {err}", path.display());
                }
            },
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {err}", path.display());
                }
            }
        }
        cfg
    }

    pub(crate) fn save(&self) -> io::Result<()> {
        write_json_atomic(&config_path(), self)
    }

    pub(crate) fn save_best_effort(&self) {
        if let Err(err) = self.save() {
            warn!("Failed to persist config: {err}");
        }
    }

    pub(crate) fn catalog_path(&self) -> PathBuf {
        expand_user(&self.catalog_path)
    }

    pub(crate) fn preferred_app_id(&self) -> Option<String> {
        let id = self.last_app_id.trim();
        (!id.is_empty()).then(|| id.to_string())
    }

    pub(crate) fn dispatcher_options(&self) -> DispatcherOptions {
        DispatcherOptions {
            worker_threads: self.worker_threads.max(1),
            max_in_flight: self.max_in_flight.max(1),
            ..DispatcherOptions::default()
        }
    }
}

fn config_path() -> PathBuf {
    state_file_path(CONFIG_FILE)
}
