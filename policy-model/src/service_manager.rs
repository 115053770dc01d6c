//! Canonical service state.
//!
//! Upstream rewrites service declarations as whole files, so an update is
//! always treated as delete-then-insert: the previous record's index entries
//! are withdrawn before the new record is installed, and listeners see a
//! single `service_updated` per operation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::service::Service;
use crate::uri::Uri;

/// Notified with the service uuid after every update or removal.
pub trait ServiceListener: Send + Sync {
    fn service_updated(&self, uuid: &str);
}

#[derive(Default)]
struct ManagerState {
    services: HashMap<String, Arc<Service>>,
    iface_index: HashMap<String, HashSet<String>>,
    domain_index: HashMap<Uri, HashSet<String>>,
}

/// The service manager.
#[derive(Default)]
pub struct ServiceManager {
    state: Mutex<ManagerState>,
    listeners: Mutex<Vec<Arc<dyn ServiceListener>>>,
}

impl ServiceManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_listener(&self, listener: Arc<dyn ServiceListener>) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(listener);
        }
    }

    pub fn unregister_listener(&self, listener: &Arc<dyn ServiceListener>) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|l| !Arc::ptr_eq(l, listener));
        }
    }

    fn notify_listeners(&self, uuid: &str) {
        let listeners = match self.listeners.lock() {
            Ok(listeners) => listeners.clone(),
            Err(_) => return,
        };
        for listener in listeners {
            listener.service_updated(uuid);
        }
    }

    fn withdraw(state: &mut ManagerState, service: &Service) {
        if let Some(iface) = &service.interface_name {
            if let Some(set) = state.iface_index.get_mut(iface) {
                set.remove(&service.uuid);
                if set.is_empty() {
                    state.iface_index.remove(iface);
                }
            }
        }
        if let Some(domain) = &service.domain {
            if let Some(set) = state.domain_index.get_mut(domain) {
                set.remove(&service.uuid);
                if set.is_empty() {
                    state.domain_index.remove(domain);
                }
            }
        }
    }

    /// Upsert a service by uuid.
    pub fn update_service(&self, service: Service) {
        let uuid = service.uuid.clone();
        if let Ok(mut state) = self.state.lock() {
            if let Some(old) = state.services.remove(&uuid) {
                Self::withdraw(&mut state, &old);
            }
            if let Some(iface) = &service.interface_name {
                state
                    .iface_index
                    .entry(iface.clone())
                    .or_default()
                    .insert(uuid.clone());
            }
            if let Some(domain) = &service.domain {
                state
                    .domain_index
                    .entry(domain.clone())
                    .or_default()
                    .insert(uuid.clone());
            }
            debug!(uuid = uuid.as_str(), "updating service");
            state.services.insert(uuid.clone(), Arc::new(service));
        }
        self.notify_listeners(&uuid);
    }

    /// Remove a service and its index entries.
    pub fn remove_service(&self, uuid: &str) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(old) = state.services.remove(uuid) {
                Self::withdraw(&mut state, &old);
            }
        }
        self.notify_listeners(uuid);
    }

    pub fn get_service(&self, uuid: &str) -> Option<Arc<Service>> {
        let state = self.state.lock().ok()?;
        state.services.get(uuid).cloned()
    }

    pub fn services_by_iface(&self, iface: &str) -> HashSet<String> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.iface_index.get(iface).cloned())
            .unwrap_or_default()
    }

    pub fn services_by_domain(&self, domain: &Uri) -> HashSet<String> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.domain_index.get(domain).cloned())
            .unwrap_or_default()
    }

    pub fn service_uuids(&self) -> HashSet<String> {
        self.state
            .lock()
            .ok()
            .map(|s| s.services.keys().cloned().collect())
            .unwrap_or_default()
    }
}
