//! Configuration for the host-remap binary.
//!
//! Loads and validates a YAML file, builds the domain table from it, and can
//! watch the file so a changed mapping is picked up without restarting.
//!
//! ```yaml
//! logging:
//!   level: debug
//! connector:
//!   host_header: preserve
//!   connect_timeout: 10
//! domain_mappings:
//!   - hostname: api.example.com
//!     target: staging.example.com
//! ```

use crate::error::{RemapError, Result};
use crate::identity::HostHeaderPolicy;
use crate::mapping::StaticTable;
use http::uri::Authority;
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Log output format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// Structured JSON.
    Json,
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error.
    pub level: String,

    /// stdout, stderr, or a file path to append to.
    pub output: String,

    pub format: LogFormat,

    /// Prefix events with a timestamp.
    pub timestamps: bool,

    /// Include the module path of each event.
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: "stderr".to_string(),
            format: LogFormat::Compact,
            timestamps: true,
            include_target: false,
        }
    }
}

/// Connector behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectorConfig {
    /// What the Host header and SNI carry after remapping.
    pub host_header: HostHeaderPolicy,

    /// TCP connect timeout in seconds (0 = none).
    pub connect_timeout: u64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            host_header: HostHeaderPolicy::Replacement,
            connect_timeout: 10,
        }
    }
}

impl ConnectorConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout > 0).then(|| Duration::from_secs(self.connect_timeout))
    }
}

/// One hostname-to-hostname rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainMapping {
    /// Hostname as requested (case-sensitive, exact match).
    pub hostname: String,

    /// Hostname to connect to instead. Absent or empty keeps the entry but
    /// leaves the hostname alone.
    #[serde(default)]
    pub target: Option<String>,
}

impl DomainMapping {
    pub fn new(hostname: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            target: Some(target.into()),
        }
    }

    /// Validates the mapping entry.
    pub fn validate(&self) -> Result<()> {
        if self.hostname.is_empty() {
            return Err(RemapError::config_validation("Hostname cannot be empty"));
        }
        validate_hostname(&self.hostname)?;

        if let Some(target) = self.target.as_deref().filter(|t| !t.is_empty()) {
            validate_hostname(target)?;
        }
        Ok(())
    }
}

fn validate_hostname(name: &str) -> Result<()> {
    let authority: Authority = name
        .parse()
        .map_err(|_| RemapError::config_validation(format!("Invalid hostname: {name}")))?;
    if authority.port().is_some() || authority.as_str().contains('@') {
        return Err(RemapError::config_validation(format!(
            "Hostname must not carry a port or userinfo: {name}"
        )));
    }
    Ok(())
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,

    pub connector: ConnectorConfig,

    /// Hostname remapping rules.
    pub domain_mappings: Vec<DomainMapping>,
}

impl AppConfig {
    /// Loads and validates configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(RemapError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let contents = fs::read_to_string(path)?;
        let config: AppConfig =
            serde_yaml::from_str(&contents).map_err(|e| RemapError::config_parse(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for mapping in &self.domain_mappings {
            mapping.validate()?;
            if !seen.insert(mapping.hostname.as_str()) {
                return Err(RemapError::config_validation(format!(
                    "Duplicate mapping for {}",
                    mapping.hostname
                )));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(RemapError::config_validation(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level, valid_levels
            )));
        }

        Ok(())
    }

    /// Builds the lookup table used by the connector.
    pub fn build_domain_table(&self) -> StaticTable {
        let mut table = StaticTable::new();
        for mapping in &self.domain_mappings {
            match mapping.target.as_deref() {
                Some(target) if !target.is_empty() => {
                    table.insert(mapping.hostname.clone(), target);
                }
                _ => table.insert_unmapped(mapping.hostname.clone()),
            }
        }
        table
    }
}

/// Shared configuration with reload support.
#[derive(Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Loads the initial configuration from `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_path = path.as_ref().to_path_buf();
        let config = AppConfig::load(&config_path)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// A snapshot of the current configuration.
    pub fn get(&self) -> AppConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-reads the file. On failure the previous configuration stays.
    pub fn reload(&self) -> Result<()> {
        info!(path = %self.config_path.display(), "Reloading configuration");

        match AppConfig::load(&self.config_path) {
            Ok(new_config) => {
                *self.config.write().unwrap_or_else(PoisonError::into_inner) = new_config;
                info!("Configuration reloaded");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to reload configuration, keeping previous");
                Err(e)
            }
        }
    }

    /// Watches the file and reloads on change. The receiver gets one message
    /// per successful reload.
    pub fn start_watcher(&self) -> Result<mpsc::Receiver<()>> {
        let (tx, rx) = mpsc::channel(1);
        let manager = self.clone();

        std::thread::spawn(move || {
            let (event_tx, event_rx) = std::sync::mpsc::channel();
            let file_name = manager.config_path.file_name().map(|n| n.to_os_string());

            let mut watcher = match RecommendedWatcher::new(
                move |res: std::result::Result<Event, notify::Error>| {
                    let Ok(event) = res else { return };
                    let relevant = event.kind.is_modify() || event.kind.is_create();
                    let ours = file_name.as_ref().map_or(true, |name| {
                        event.paths.iter().any(|p| p.file_name() == Some(name.as_os_str()))
                    });
                    if relevant && ours {
                        let _ = event_tx.send(());
                    }
                },
                NotifyConfig::default(),
            ) {
                Ok(w) => w,
                Err(e) => {
                    error!(error = %e, "Failed to create file watcher");
                    return;
                }
            };

            // Editors often replace the file, so watch its directory.
            let watch_dir = manager
                .config_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            if let Err(e) = watcher.watch(watch_dir, RecursiveMode::NonRecursive) {
                error!(error = %e, "Failed to watch configuration directory");
                return;
            }

            info!(path = %manager.config_path.display(), "Watching configuration for changes");
            manager.watch_loop(event_rx, tx);
        });

        Ok(rx)
    }

    fn watch_loop(&self, events: std::sync::mpsc::Receiver<()>, reloaded: mpsc::Sender<()>) {
        let debounce = Duration::from_millis(500);
        let mut last_reload: Option<Instant> = None;

        while events.recv().is_ok() {
            let now = Instant::now();
            if last_reload.is_some_and(|t| now.duration_since(t) < debounce) {
                debug!("Debouncing configuration reload");
                continue;
            }
            if self.reload().is_ok() {
                last_reload = Some(now);
                if reloaded.blocking_send(()).is_err() {
                    break;
                }
            }
        }
        warn!("Configuration watcher stopped");
    }
}
