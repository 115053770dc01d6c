//! Filesystem endpoint sources.
//!
//! `.ep` files carry local endpoint declarations, `.extep` files external
//! ones. Each source remembers which uuid a path produced; rewriting a
//! file with a different uuid synthesizes a removal of the old uuid first,
//! so both the model and the registries always hold exactly one live
//! record per uuid.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{error, info};

use policy_model::endpoint::Endpoint;
use policy_model::endpoint_manager::EndpointManager;

use crate::SourceError;
use crate::ep_file::{EpFile, ExtEpFile};
use crate::fs_watcher::DirectoryHandler;

fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(suffix) && !n.starts_with('.'))
}

/// Path→uuid bookkeeping shared by the two endpoint sources.
struct KnownEndpoints {
    manager: Arc<EndpointManager>,
    known: Mutex<HashMap<PathBuf, String>>,
}

impl KnownEndpoints {
    fn new(manager: Arc<EndpointManager>) -> Self {
        Self {
            manager,
            known: Mutex::new(HashMap::new()),
        }
    }

    fn apply(&self, path: &Path, endpoint: Endpoint) {
        let uuid = endpoint.uuid.clone();
        let stale = {
            let Ok(mut known) = self.known.lock() else {
                return;
            };
            let stale = known
                .get(path)
                .filter(|old| **old != uuid)
                .cloned();
            known.insert(path.to_path_buf(), uuid.clone());
            stale
        };
        if let Some(stale) = stale {
            info!(uuid = stale.as_str(), path = %path.display(), "endpoint uuid changed, removing old");
            self.manager.remove_endpoint(&stale);
        }
        self.manager.update_endpoint(endpoint);
        info!(uuid = uuid.as_str(), path = %path.display(), "updated endpoint");
    }

    fn forget(&self, path: &Path) {
        let removed = self
            .known
            .lock()
            .ok()
            .and_then(|mut known| known.remove(path));
        if let Some(uuid) = removed {
            info!(uuid = uuid.as_str(), path = %path.display(), "removed endpoint");
            self.manager.remove_endpoint(&uuid);
        }
    }
}

/// Watches a directory for `.ep` files.
pub struct FsEndpointSource {
    known: KnownEndpoints,
}

impl FsEndpointSource {
    pub fn new(manager: Arc<EndpointManager>) -> Arc<Self> {
        Arc::new(Self {
            known: KnownEndpoints::new(manager),
        })
    }

    fn load(path: &Path) -> Result<Endpoint, SourceError> {
        let data = std::fs::read(path)?;
        let file: EpFile = serde_json::from_slice(&data)?;
        file.into_endpoint()
    }
}

impl DirectoryHandler for FsEndpointSource {
    fn updated(&self, path: &Path) {
        if !has_suffix(path, ".ep") {
            return;
        }
        match Self::load(path) {
            Ok(endpoint) => self.known.apply(path, endpoint),
            Err(err) => error!(path = %path.display(), %err, "could not load endpoint"),
        }
    }

    fn deleted(&self, path: &Path) {
        self.known.forget(path);
    }
}

/// Watches a directory for `.extep` files.
pub struct FsExternalEndpointSource {
    known: KnownEndpoints,
}

impl FsExternalEndpointSource {
    pub fn new(manager: Arc<EndpointManager>) -> Arc<Self> {
        Arc::new(Self {
            known: KnownEndpoints::new(manager),
        })
    }

    fn load(path: &Path) -> Result<Endpoint, SourceError> {
        let data = std::fs::read(path)?;
        let file: ExtEpFile = serde_json::from_slice(&data)?;
        file.into_endpoint()
    }
}

impl DirectoryHandler for FsExternalEndpointSource {
    fn updated(&self, path: &Path) {
        if !has_suffix(path, ".extep") {
            return;
        }
        match Self::load(path) {
            Ok(endpoint) => self.known.apply(path, endpoint),
            Err(err) => error!(path = %path.display(), %err, "could not load external endpoint"),
        }
    }

    fn deleted(&self, path: &Path) {
        self.known.forget(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_model::registry::{GroupContext, PolicyRegistry};
    use policy_model::uri::{Uri, epg_uri};

    fn manager() -> Arc<EndpointManager> {
        let registry = PolicyRegistry::new();
        registry.set_group_context(
            epg_uri("test", "epg"),
            GroupContext::new(
                Uri::from("/PolicyUniverse/PolicySpace/test/GbpBridgeDomain/bd/"),
                Uri::from("/PolicyUniverse/PolicySpace/test/GbpRoutingDomain/rd/"),
            ),
        );
        EndpointManager::new(registry)
    }

    fn write_ep(dir: &Path, name: &str, uuid: &str, mac: &str) -> PathBuf {
        let path = dir.join(name);
        let body = format!(
            r#"{{"uuid":"{uuid}","mac":"{mac}","ip":["10.0.0.1"],
                "interface-name":"veth0",
                "endpoint-group":"/PolicyUniverse/PolicySpace/test/GbpEpGroup/epg/"}}"#
        );
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn update_and_delete_flow() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager();
        let source = FsEndpointSource::new(manager.clone());

        let path = write_ep(dir.path(), "a.ep", "uuid-1", "10:ff:00:a3:01:00");
        source.updated(&path);
        assert!(manager.get_endpoint("uuid-1").is_some());
        assert!(manager.endpoints_by_iface("veth0").contains("uuid-1"));

        source.deleted(&path);
        assert!(manager.get_endpoint("uuid-1").is_none());
        assert!(manager.endpoints_by_iface("veth0").is_empty());
    }

    #[test]
    fn rewrite_with_new_uuid_removes_old_first() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager();
        let source = FsEndpointSource::new(manager.clone());

        let path = write_ep(dir.path(), "a.ep", "uuid-1", "10:ff:00:a3:01:00");
        source.updated(&path);
        write_ep(dir.path(), "a.ep", "uuid-2", "10:ff:00:a3:01:02");
        source.updated(&path);

        assert!(manager.get_endpoint("uuid-1").is_none());
        assert!(manager.get_endpoint("uuid-2").is_some());
        // exactly one endpoint owns the interface binding
        assert_eq!(
            manager.endpoints_by_iface("veth0"),
            std::collections::HashSet::from(["uuid-2".to_string()])
        );
    }

    #[test]
    fn malformed_file_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager();
        let source = FsEndpointSource::new(manager.clone());

        let path = write_ep(dir.path(), "a.ep", "uuid-1", "10:ff:00:a3:01:00");
        source.updated(&path);

        std::fs::write(&path, b"{ not json").unwrap();
        source.updated(&path);
        assert!(manager.get_endpoint("uuid-1").is_some());
    }

    #[test]
    fn wrong_suffix_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager();
        let source = FsEndpointSource::new(manager.clone());

        let path = dir.path().join("a.conf");
        std::fs::write(&path, br#"{"uuid": "uuid-9"}"#).unwrap();
        source.updated(&path);
        assert!(manager.get_endpoint("uuid-9").is_none());
    }

    #[test]
    fn external_endpoint_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager();
        let source = FsExternalEndpointSource::new(manager.clone());

        let path = dir.path().join("x.extep");
        std::fs::write(
            &path,
            br#"{"uuid":"ext-1","mac":"10:ff:00:a3:01:05",
                "policy-space-name":"test","path-attachment":"ext-int"}"#,
        )
        .unwrap();
        source.updated(&path);

        let ep = manager.get_endpoint("ext-1").unwrap();
        assert!(ep.is_external());
        assert_eq!(
            manager.resolved_group("ext-1").unwrap().as_str(),
            "/PolicyUniverse/PolicySpace/test/GbpExternalInterface/ext-int/"
        );

        source.deleted(&path);
        assert!(manager.get_endpoint("ext-1").is_none());
    }
}
