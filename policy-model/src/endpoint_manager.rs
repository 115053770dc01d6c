//! Canonical endpoint state and group resolution.
//!
//! The manager owns the uuid-keyed endpoint set, keeps every reverse index
//! consistent with it under one lock, resolves endpoints to their effective
//! endpoint group, and republishes resolved endpoints into the L2/L3
//! registries consumed by downstream components. Listener callbacks run
//! after the state lock is released; listeners must not call back into the
//! manager synchronously.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use mac_address::MacAddress;
use tracing::{debug, warn};

use crate::endpoint::Endpoint;
use crate::registry::{PolicyRegistry, PolicyUpdateObserver};
use crate::uri::Uri;

/// Notified with the endpoint uuid after every update or removal.
pub trait EndpointListener: Send + Sync {
    fn endpoint_updated(&self, uuid: &str);
}

/// An entry in the L2 endpoint registry, keyed by `(bridge-domain, mac)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EprL2Entry {
    pub uuid: String,
    pub egroup: Uri,
    pub mac: MacAddress,
    pub interface_name: Option<String>,
}

/// An entry in the L3 endpoint registry, keyed by `(routing-domain, ip)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EprL3Entry {
    pub uuid: String,
    pub egroup: Uri,
    pub ip: IpAddr,
    pub mac: Option<MacAddress>,
}

struct EpState {
    endpoint: Arc<Endpoint>,
    resolved_group: Option<Uri>,
    l2_keys: Vec<(Uri, MacAddress)>,
    l3_keys: Vec<(Uri, IpAddr)>,
}

#[derive(Default)]
struct ManagerState {
    endpoints: HashMap<String, EpState>,
    group_index: HashMap<Uri, HashSet<String>>,
    iface_index: HashMap<String, HashSet<String>>,
    access_iface_index: HashMap<String, HashSet<String>>,
    uplink_iface_index: HashMap<String, HashSet<String>>,
    ipm_nexthop_index: HashMap<String, HashSet<String>>,
    alias_index: HashMap<String, HashSet<String>>,
    l2_registry: HashMap<(Uri, MacAddress), EprL2Entry>,
    l3_registry: HashMap<(Uri, IpAddr), EprL3Entry>,
}

fn index_insert(index: &mut HashMap<String, HashSet<String>>, key: &str, uuid: &str) {
    index
        .entry(key.to_string())
        .or_default()
        .insert(uuid.to_string());
}

fn index_remove(index: &mut HashMap<String, HashSet<String>>, key: &str, uuid: &str) {
    if let Some(set) = index.get_mut(key) {
        set.remove(uuid);
        if set.is_empty() {
            index.remove(key);
        }
    }
}

/// The endpoint manager. Safe to call from any task; state is guarded by a
/// single mutex and never held across listener callbacks.
pub struct EndpointManager {
    registry: Arc<PolicyRegistry>,
    state: Mutex<ManagerState>,
    listeners: Mutex<Vec<Arc<dyn EndpointListener>>>,
}

impl EndpointManager {
    pub fn new(registry: Arc<PolicyRegistry>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            state: Mutex::new(ManagerState::default()),
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn register_listener(&self, listener: Arc<dyn EndpointListener>) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(listener);
        }
    }

    pub fn unregister_listener(&self, listener: &Arc<dyn EndpointListener>) {
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
            listener.endpoint_updated(uuid);
        }
    }

    /// Upsert an endpoint by uuid, withdrawing any previous indices first.
    pub fn update_endpoint(&self, endpoint: Endpoint) {
        let uuid = endpoint.uuid.clone();
        if let Ok(mut state) = self.state.lock() {
            if let Some(old) = state.endpoints.remove(&uuid) {
                Self::withdraw(&mut state, &old);
            }
            let resolved = self.resolve_group(&endpoint);
            debug!(
                uuid = uuid.as_str(),
                group = ?resolved.as_ref().map(Uri::as_str),
                "updating endpoint"
            );
            let ep_state = self.publish(&mut state, Arc::new(endpoint), resolved);
            state.endpoints.insert(uuid.clone(), ep_state);
        }
        self.notify_listeners(&uuid);
    }

    /// Remove an endpoint and every index entry referring to it.
    pub fn remove_endpoint(&self, uuid: &str) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(old) = state.endpoints.remove(uuid) {
                Self::withdraw(&mut state, &old);
            }
        }
        self.notify_listeners(uuid);
    }

    /// Resolve the effective endpoint group: explicit URI, then mapping
    /// rules, then the mapping default; `None` when unresolved.
    fn resolve_group(&self, endpoint: &Endpoint) -> Option<Uri> {
        if let Some(group) = &endpoint.egroup {
            return Some(group.clone());
        }
        let alias = endpoint.eg_mapping_alias.as_ref()?;
        let mapping = self.registry.epg_mapping(alias)?;
        let attrs = match self.registry.attribute_set(&endpoint.uuid) {
            Some(external) => endpoint.attributes.merged_with(&external),
            None => endpoint.attributes.clone(),
        };
        for rule in mapping.ordered_rules() {
            if rule.matches(attrs.get(&rule.attr_name)) {
                return Some(rule.group.clone());
            }
        }
        mapping.default_group.clone()
    }

    fn withdraw(state: &mut ManagerState, ep_state: &EpState) {
        let ep = &ep_state.endpoint;
        let uuid = ep.uuid.as_str();
        if let Some(group) = &ep_state.resolved_group {
            if let Some(set) = state.group_index.get_mut(group) {
                set.remove(uuid);
                if set.is_empty() {
                    state.group_index.remove(group);
                }
            }
        }
        if let Some(alias) = &ep.eg_mapping_alias {
            index_remove(&mut state.alias_index, alias, uuid);
        }
        if let Some(iface) = &ep.interface_name {
            index_remove(&mut state.iface_index, iface, uuid);
        }
        if let Some(iface) = &ep.access_interface {
            index_remove(&mut state.access_iface_index, iface, uuid);
        }
        if let Some(iface) = &ep.access_uplink_interface {
            index_remove(&mut state.uplink_iface_index, iface, uuid);
        }
        for ipm in &ep.ip_address_mappings {
            if let Some(iface) = &ipm.next_hop_if {
                index_remove(&mut state.ipm_nexthop_index, iface, uuid);
            }
        }
        for key in &ep_state.l2_keys {
            if state.l2_registry.get(key).is_some_and(|e| e.uuid == uuid) {
                state.l2_registry.remove(key);
            }
        }
        for key in &ep_state.l3_keys {
            if state.l3_registry.get(key).is_some_and(|e| e.uuid == uuid) {
                state.l3_registry.remove(key);
            }
        }
    }

    fn publish(
        &self,
        state: &mut ManagerState,
        endpoint: Arc<Endpoint>,
        resolved_group: Option<Uri>,
    ) -> EpState {
        let uuid = endpoint.uuid.as_str();
        if let Some(group) = &resolved_group {
            state
                .group_index
                .entry(group.clone())
                .or_default()
                .insert(uuid.to_string());
        }
        if let Some(alias) = &endpoint.eg_mapping_alias {
            index_insert(&mut state.alias_index, alias, uuid);
        }
        if let Some(iface) = &endpoint.interface_name {
            index_insert(&mut state.iface_index, iface, uuid);
        }
        if let Some(iface) = &endpoint.access_interface {
            index_insert(&mut state.access_iface_index, iface, uuid);
        }
        if let Some(iface) = &endpoint.access_uplink_interface {
            index_insert(&mut state.uplink_iface_index, iface, uuid);
        }
        for ipm in &endpoint.ip_address_mappings {
            if let Some(iface) = &ipm.next_hop_if {
                index_insert(&mut state.ipm_nexthop_index, iface, uuid);
            }
        }

        let mut l2_keys = Vec::new();
        let mut l3_keys = Vec::new();

        if let Some(group) = &resolved_group {
            if let Some(context) = self.registry.group_context(group) {
                if let (Some(bd), Some(mac)) = (&context.bridge_domain, endpoint.mac) {
                    let key = (bd.clone(), mac);
                    state.l2_registry.insert(
                        key.clone(),
                        EprL2Entry {
                            uuid: uuid.to_string(),
                            egroup: group.clone(),
                            mac,
                            interface_name: endpoint.interface_name.clone(),
                        },
                    );
                    l2_keys.push(key);
                }
                if let (Some(rd), true) = (&context.routing_domain, context.routing_enabled) {
                    for ip_str in &endpoint.ips {
                        match ip_str.parse::<IpAddr>() {
                            Ok(ip) => {
                                let key = (rd.clone(), ip);
                                state.l3_registry.insert(
                                    key.clone(),
                                    EprL3Entry {
                                        uuid: uuid.to_string(),
                                        egroup: group.clone(),
                                        ip,
                                        mac: endpoint.mac,
                                    },
                                );
                                l3_keys.push(key);
                            }
                            Err(_) => {
                                warn!(uuid, ip = ip_str.as_str(), "skipping invalid IP address");
                            }
                        }
                    }
                }
            }
        }

        // Floating IPs publish under the mapping's own group context.
        for ipm in &endpoint.ip_address_mappings {
            let (Some(group), Some(floating)) = (&ipm.egroup, &ipm.floating_ip) else {
                continue;
            };
            let Some(context) = self.registry.group_context(group) else {
                continue;
            };
            if let (Some(bd), Some(mac)) = (&context.bridge_domain, endpoint.mac) {
                let key = (bd.clone(), mac);
                if !l2_keys.contains(&key) {
                    state.l2_registry.insert(
                        key.clone(),
                        EprL2Entry {
                            uuid: uuid.to_string(),
                            egroup: group.clone(),
                            mac,
                            interface_name: endpoint.interface_name.clone(),
                        },
                    );
                    l2_keys.push(key);
                }
            }
            if let (Some(rd), true) = (&context.routing_domain, context.routing_enabled) {
                match floating.parse::<IpAddr>() {
                    Ok(ip) => {
                        let key = (rd.clone(), ip);
                        state.l3_registry.insert(
                            key.clone(),
                            EprL3Entry {
                                uuid: uuid.to_string(),
                                egroup: group.clone(),
                                ip,
                                mac: endpoint.mac,
                            },
                        );
                        l3_keys.push(key);
                    }
                    Err(_) => {
                        warn!(uuid, ip = floating.as_str(), "skipping invalid floating IP");
                    }
                }
            }
        }

        EpState {
            endpoint,
            resolved_group,
            l2_keys,
            l3_keys,
        }
    }

    /// Re-resolve and republish the given endpoints from their stored
    /// records, notifying listeners for each.
    fn recompute(&self, uuids: Vec<String>) {
        let mut notify = Vec::new();
        if let Ok(mut state) = self.state.lock() {
            for uuid in uuids {
                let Some(old) = state.endpoints.remove(&uuid) else {
                    continue;
                };
                Self::withdraw(&mut state, &old);
                let endpoint = old.endpoint;
                let resolved = self.resolve_group(&endpoint);
                let ep_state = self.publish(&mut state, endpoint, resolved);
                state.endpoints.insert(uuid.clone(), ep_state);
                notify.push(uuid);
            }
        }
        for uuid in notify {
            self.notify_listeners(&uuid);
        }
    }

    pub fn get_endpoint(&self, uuid: &str) -> Option<Arc<Endpoint>> {
        let state = self.state.lock().ok()?;
        state.endpoints.get(uuid).map(|s| s.endpoint.clone())
    }

    pub fn resolved_group(&self, uuid: &str) -> Option<Uri> {
        let state = self.state.lock().ok()?;
        state.endpoints.get(uuid)?.resolved_group.clone()
    }

    pub fn endpoints_for_group(&self, group: &Uri) -> HashSet<String> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.group_index.get(group).cloned())
            .unwrap_or_default()
    }

    pub fn endpoints_by_iface(&self, iface: &str) -> HashSet<String> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.iface_index.get(iface).cloned())
            .unwrap_or_default()
    }

    pub fn endpoints_by_access_iface(&self, iface: &str) -> HashSet<String> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.access_iface_index.get(iface).cloned())
            .unwrap_or_default()
    }

    pub fn endpoints_by_access_uplink_iface(&self, iface: &str) -> HashSet<String> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.uplink_iface_index.get(iface).cloned())
            .unwrap_or_default()
    }

    pub fn endpoints_by_ipm_nexthop_iface(&self, iface: &str) -> HashSet<String> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.ipm_nexthop_index.get(iface).cloned())
            .unwrap_or_default()
    }

    pub fn l2_entry(&self, bridge_domain: &Uri, mac: MacAddress) -> Option<EprL2Entry> {
        let state = self.state.lock().ok()?;
        state
            .l2_registry
            .get(&(bridge_domain.clone(), mac))
            .cloned()
    }

    pub fn l3_entry(&self, routing_domain: &Uri, ip: IpAddr) -> Option<EprL3Entry> {
        let state = self.state.lock().ok()?;
        state.l3_registry.get(&(routing_domain.clone(), ip)).cloned()
    }

    pub fn endpoint_uuids(&self) -> HashSet<String> {
        self.state
            .lock()
            .ok()
            .map(|s| s.endpoints.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl PolicyUpdateObserver for EndpointManager {
    fn egroup_updated(&self, group: &Uri) {
        let uuids: Vec<String> = self.endpoints_for_group(group).into_iter().collect();
        if !uuids.is_empty() {
            self.recompute(uuids);
        }
    }

    fn mapping_updated(&self, name: &str) {
        let uuids: Vec<String> = self
            .state
            .lock()
            .ok()
            .and_then(|s| s.alias_index.get(name).cloned())
            .unwrap_or_default()
            .into_iter()
            .collect();
        if !uuids.is_empty() {
            self.recompute(uuids);
        }
    }

    fn attribute_set_updated(&self, ep_uuid: &str) {
        let has_alias = self
            .get_endpoint(ep_uuid)
            .is_some_and(|ep| ep.eg_mapping_alias.is_some());
        if has_alias {
            self.recompute(vec![ep_uuid.to_string()]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::endpoint::IpAddressMapping;
    use crate::registry::{EpgMapping, GroupContext, MappingRule, MatchType};
    use crate::uri::epg_uri;

    fn mac(s: &str) -> MacAddress {
        s.parse().unwrap()
    }

    fn registry_with_groups(groups: &[&Uri]) -> Arc<PolicyRegistry> {
        let registry = PolicyRegistry::new();
        let bd = Uri::from("/PolicyUniverse/PolicySpace/test/GbpBridgeDomain/bd/");
        let rd = Uri::from("/PolicyUniverse/PolicySpace/test/GbpRoutingDomain/rd/");
        for group in groups {
            registry.set_group_context((*group).clone(), GroupContext::new(bd.clone(), rd.clone()));
        }
        registry
    }

    fn rule(order: i32, name: &str, attr: &str, m: &str, ty: MatchType, group: &Uri) -> MappingRule {
        MappingRule {
            order,
            name: name.into(),
            attr_name: attr.into(),
            match_string: m.into(),
            match_type: ty,
            negated: false,
            group: group.clone(),
        }
    }

    #[test]
    fn basic_group_and_iface_indices() {
        let epg = epg_uri("test", "epg");
        let registry = registry_with_groups(&[&epg]);
        let manager = EndpointManager::new(registry);

        let mut ep1 = Endpoint::new("e82e883b-851d-4cc6-bedb-fb5e27530043");
        ep1.mac = Some(mac("00:00:00:00:00:01"));
        ep1.add_ip("10.1.1.2");
        ep1.add_ip("10.1.1.3");
        ep1.interface_name = Some("veth1".into());
        ep1.egroup = Some(epg.clone());

        let mut ep2 = Endpoint::new("72ffb982-b2d5-4ae4-91ac-0dd61daf527a");
        ep2.mac = Some(mac("00:00:00:00:00:02"));
        ep2.add_ip("10.1.1.4");
        ep2.interface_name = Some("veth2".into());
        ep2.egroup = Some(epg.clone());

        manager.update_endpoint(ep1.clone());
        manager.update_endpoint(ep2.clone());

        let uuids = manager.endpoints_for_group(&epg);
        assert_eq!(uuids.len(), 2);
        assert!(uuids.contains(&ep1.uuid));
        assert!(uuids.contains(&ep2.uuid));
        assert_eq!(manager.endpoints_by_iface("veth1").len(), 1);

        manager.remove_endpoint(&ep2.uuid);
        let uuids = manager.endpoints_for_group(&epg);
        assert_eq!(uuids.len(), 1);
        assert!(uuids.contains(&ep1.uuid));
        assert!(manager.endpoints_by_iface("veth2").is_empty());
    }

    #[test]
    fn publishes_l2_and_l3_entries() {
        let epg = epg_uri("test", "epg");
        let registry = registry_with_groups(&[&epg]);
        let bd = Uri::from("/PolicyUniverse/PolicySpace/test/GbpBridgeDomain/bd/");
        let rd = Uri::from("/PolicyUniverse/PolicySpace/test/GbpRoutingDomain/rd/");
        let manager = EndpointManager::new(registry.clone());

        let mut ep = Endpoint::new("u1");
        ep.mac = Some(mac("00:00:00:00:00:01"));
        ep.add_ip("10.1.1.2");
        ep.add_ip("10.1.1.3");
        ep.egroup = Some(epg.clone());
        manager.update_endpoint(ep);

        assert!(manager.l2_entry(&bd, mac("00:00:00:00:00:01")).is_some());
        assert!(
            manager
                .l3_entry(&rd, "10.1.1.2".parse().unwrap())
                .is_some()
        );
        assert!(
            manager
                .l3_entry(&rd, "10.1.1.3".parse().unwrap())
                .is_some()
        );

        // Disabling routing on the bridge domain withdraws the L3 entries.
        registry.set_group_context(
            epg.clone(),
            GroupContext {
                bridge_domain: Some(bd.clone()),
                routing_domain: Some(rd.clone()),
                routing_enabled: false,
            },
        );
        // The registry is not wired as an observer in this test; re-push.
        let ep = manager.get_endpoint("u1").unwrap();
        manager.update_endpoint((*ep).clone());

        assert!(manager.l2_entry(&bd, mac("00:00:00:00:00:01")).is_some());
        assert!(
            manager
                .l3_entry(&rd, "10.1.1.2".parse().unwrap())
                .is_none()
        );
    }

    #[test]
    fn floating_ip_publishes_under_mapping_group() {
        let epg = epg_uri("test", "epg");
        let nat_epg = epg_uri("test", "nat-epg");
        let registry = registry_with_groups(&[&epg, &nat_epg]);
        let rd = Uri::from("/PolicyUniverse/PolicySpace/test/GbpRoutingDomain/rd/");
        let manager = EndpointManager::new(registry);

        let mut ep = Endpoint::new("u2");
        ep.mac = Some(mac("00:00:00:00:00:02"));
        ep.add_ip("10.1.1.4");
        ep.egroup = Some(epg);
        let mut ipm = IpAddressMapping::new("91c5b217-d244-432c-922d-533c6c036ab3");
        ipm.mapped_ip = Some("10.1.1.4".into());
        ipm.floating_ip = Some("5.5.5.5".into());
        ipm.egroup = Some(nat_epg.clone());
        ep.add_ip_address_mapping(ipm);
        manager.update_endpoint(ep);

        let entry = manager.l3_entry(&rd, "5.5.5.5".parse().unwrap()).unwrap();
        assert_eq!(entry.egroup, nat_epg);
        assert_eq!(entry.uuid, "u2");

        manager.remove_endpoint("u2");
        assert!(manager.l3_entry(&rd, "5.5.5.5".parse().unwrap()).is_none());
    }

    #[test]
    fn mapping_rules_resolve_in_order() {
        let epg = epg_uri("test", "epg");
        let epg2 = epg_uri("test", "epg2");
        let epg3 = epg_uri("test", "epg3");
        let registry = registry_with_groups(&[&epg, &epg2, &epg3]);
        let manager = EndpointManager::new(registry.clone());
        let observer: Arc<dyn PolicyUpdateObserver> = manager.clone();
        registry.register_observer(&observer);

        let uuid = "72ffb982-b2d5-4ae4-91ac-0dd61daf527a";
        let mut ep2 = Endpoint::new(uuid);
        ep2.mac = Some(mac("00:00:00:00:00:02"));
        ep2.add_ip("10.1.1.4");
        ep2.interface_name = Some("veth2".into());
        ep2.eg_mapping_alias = Some("testmapping".into());
        ep2.add_attribute("localattr", "asddsa");

        let mut external = Attributes::new();
        external.insert("registryattr", "attrvalue");
        registry.set_attribute_set(uuid, external);

        let mut mapping = EpgMapping {
            default_group: Some(epg.clone()),
            rules: Vec::new(),
        };
        registry.set_epg_mapping("testmapping", mapping.clone());

        manager.update_endpoint(ep2);
        assert_eq!(manager.endpoints_for_group(&epg).len(), 1);

        // starts-with on a local attribute moves the endpoint to epg2
        mapping.rules.push(rule(
            10,
            "rule1",
            "localattr",
            "asd",
            MatchType::StartsWith,
            &epg2,
        ));
        registry.set_epg_mapping("testmapping", mapping.clone());
        assert_eq!(manager.endpoints_for_group(&epg).len(), 0);
        assert_eq!(manager.endpoints_for_group(&epg2).len(), 1);

        // an earlier rule matching an externally registered attribute wins
        mapping.rules.push(rule(
            9,
            "rule2",
            "registryattr",
            "value",
            MatchType::EndsWith,
            &epg3,
        ));
        registry.set_epg_mapping("testmapping", mapping.clone());
        assert_eq!(manager.endpoints_for_group(&epg2).len(), 0);
        assert_eq!(manager.endpoints_for_group(&epg3).len(), 1);

        mapping.rules.push(rule(
            8,
            "rule3",
            "registryattr",
            "attrvalue",
            MatchType::Equals,
            &epg2,
        ));
        mapping.rules.push(rule(
            7,
            "rule4",
            "localattr",
            "sdds",
            MatchType::Contains,
            &epg2,
        ));
        registry.set_epg_mapping("testmapping", mapping.clone());
        assert_eq!(manager.endpoints_for_group(&epg3).len(), 0);
        assert_eq!(manager.endpoints_for_group(&epg2).len(), 1);

        // a negated rule on a missing attribute matches
        mapping.rules.push(MappingRule {
            order: 6,
            name: "rule5".into(),
            attr_name: "nothing".into(),
            match_string: "lksdflkjsd".into(),
            match_type: MatchType::Equals,
            negated: true,
            group: epg.clone(),
        });
        registry.set_epg_mapping("testmapping", mapping);
        assert_eq!(manager.endpoints_for_group(&epg2).len(), 0);
        assert_eq!(manager.endpoints_for_group(&epg3).len(), 0);
        assert_eq!(manager.endpoints_for_group(&epg).len(), 1);
    }

    #[test]
    fn unresolved_endpoint_stays_in_model() {
        let registry = PolicyRegistry::new();
        let manager = EndpointManager::new(registry);
        let mut ep = Endpoint::new("u1");
        ep.eg_mapping_alias = Some("no-such-mapping".into());
        manager.update_endpoint(ep);
        assert!(manager.get_endpoint("u1").is_some());
        assert!(manager.resolved_group("u1").is_none());
    }

    #[test]
    fn listeners_observe_update_and_remove() {
        struct Recorder(Mutex<Vec<String>>);
        impl EndpointListener for Recorder {
            fn endpoint_updated(&self, uuid: &str) {
                if let Ok(mut seen) = self.0.lock() {
                    seen.push(uuid.to_string());
                }
            }
        }

        let registry = PolicyRegistry::new();
        let manager = EndpointManager::new(registry);
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        manager.register_listener(recorder.clone());

        manager.update_endpoint(Endpoint::new("u1"));
        manager.remove_endpoint("u1");

        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(seen, ["u1", "u1"]);
    }
}
