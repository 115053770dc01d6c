//! Agent configuration file.
//!
//! A JSON document with nested sections; unrecognized keys and missing
//! sections are tolerated silently so one config format can serve agents
//! of different vintages. Only the subsystems configured here are started.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{AgentError, AgentResult};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AgentConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub endpoint_sources: EndpointSourcesConfig,
    #[serde(default)]
    pub service_sources: ServiceSourcesConfig,
    #[serde(default)]
    pub drop_log_config_sources: DropLogSourcesConfig,
    #[serde(default)]
    pub opflex: OpflexConfig,
    #[serde(default)]
    pub ovsdb: OvsdbSectionConfig,
    #[serde(default)]
    pub id_registry: IdRegistryConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
    /// Renderer-specific settings, passed through opaquely.
    #[serde(default)]
    pub renderers: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LogConfig {
    pub level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EndpointSourcesConfig {
    /// Directories watched for `.ep`/`.extep` files.
    #[serde(default)]
    pub filesystem: Vec<PathBuf>,
    /// Names of local inventories to consume.
    #[serde(default)]
    pub model_local: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceSourcesConfig {
    #[serde(default)]
    pub filesystem: Vec<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DropLogSourcesConfig {
    #[serde(default)]
    pub filesystem: Vec<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OpflexConfig {
    pub name: Option<String>,
    pub domain: Option<String>,
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
    pub ssl: Option<SslConfig>,
    pub inspector: Option<InspectorConfig>,
    pub notif: Option<NotifSectionConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PeerConfig {
    pub hostname: String,
    pub port: u16,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SslConfig {
    pub mode: Option<String>,
    pub ca_store: Option<String>,
    pub client_cert: Option<ClientCertConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClientCertConfig {
    pub path: Option<PathBuf>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InspectorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub socket_name: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NotifSectionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub socket_name: Option<PathBuf>,
    pub socket_owner: Option<String>,
    pub socket_group: Option<String>,
    pub socket_permissions: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OvsdbSectionConfig {
    /// Path of the OVSDB server's UNIX socket.
    pub socket: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IdRegistryConfig {
    /// Directory for id persistence files; ids are volatile when unset.
    pub directory: Option<PathBuf>,
    pub cleanup_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PluginsConfig {
    #[serde(default)]
    pub renderer: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Load and parse the configuration file at `path`.
pub fn load(path: &Path) -> AgentResult<AgentConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AgentError::Config(format!("read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| AgentError::Config(format!("parse {}: {e}", path.display())))
}
