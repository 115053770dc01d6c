//! Replicated policy state the endpoint manager resolves against.
//!
//! The controller distributes endpoint groups, their forwarding contexts and
//! attribute-mapping rules; this registry holds the slice of that state the
//! local managers need, keyed by URI. Mutations notify registered observers
//! (without the registry lock held) so dependent state can be recomputed.

use std::sync::{Arc, Mutex, Weak};

use crate::attributes::Attributes;
use crate::uri::Uri;

/// Forwarding context of an endpoint group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupContext {
    pub bridge_domain: Option<Uri>,
    pub routing_domain: Option<Uri>,
    /// Routing-disabled bridge domains suppress L3 registry entries.
    pub routing_enabled: bool,
}

impl GroupContext {
    pub fn new(bridge_domain: Uri, routing_domain: Uri) -> Self {
        Self {
            bridge_domain: Some(bridge_domain),
            routing_domain: Some(routing_domain),
            routing_enabled: true,
        }
    }
}

/// String predicate applied by a mapping rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    StartsWith,
    EndsWith,
    Contains,
    Equals,
}

/// One attribute-to-group rule inside an [`EpgMapping`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRule {
    /// Evaluation position; ties broken by rule name.
    pub order: i32,
    pub name: String,
    pub attr_name: String,
    pub match_string: String,
    pub match_type: MatchType,
    pub negated: bool,
    pub group: Uri,
}

impl MappingRule {
    /// Evaluate against an attribute value; a missing attribute never
    /// matches before negation is applied.
    pub fn matches(&self, value: Option<&str>) -> bool {
        let hit = value.is_some_and(|v| match self.match_type {
            MatchType::StartsWith => v.starts_with(&self.match_string),
            MatchType::EndsWith => v.ends_with(&self.match_string),
            MatchType::Contains => v.contains(&self.match_string),
            MatchType::Equals => v == self.match_string,
        });
        hit != self.negated
    }
}

/// A named, ordered set of attribute-to-group rules with an optional
/// fallback group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpgMapping {
    pub default_group: Option<Uri>,
    pub rules: Vec<MappingRule>,
}

impl EpgMapping {
    /// Rules in evaluation order: ascending `order`, ties by name.
    pub fn ordered_rules(&self) -> Vec<&MappingRule> {
        let mut rules: Vec<&MappingRule> = self.rules.iter().collect();
        rules.sort_by(|a, b| (a.order, a.name.as_str()).cmp(&(b.order, b.name.as_str())));
        rules
    }
}

/// Observer of registry mutations. Implemented by the endpoint manager to
/// re-resolve affected endpoints.
pub trait PolicyUpdateObserver: Send + Sync {
    fn egroup_updated(&self, group: &Uri);
    fn mapping_updated(&self, name: &str);
    fn attribute_set_updated(&self, ep_uuid: &str);
}

#[derive(Default)]
struct RegistryState {
    groups: std::collections::HashMap<Uri, GroupContext>,
    mappings: std::collections::HashMap<String, EpgMapping>,
    /// Externally registered attributes, keyed by endpoint uuid.
    attr_sets: std::collections::HashMap<String, Attributes>,
}

/// URI-keyed policy state shared by the managers.
#[derive(Default)]
pub struct PolicyRegistry {
    state: Mutex<RegistryState>,
    observers: Mutex<Vec<Weak<dyn PolicyUpdateObserver>>>,
}

impl PolicyRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_observer(&self, observer: &Arc<dyn PolicyUpdateObserver>) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.push(Arc::downgrade(observer));
        }
    }

    fn live_observers(&self) -> Vec<Arc<dyn PolicyUpdateObserver>> {
        match self.observers.lock() {
            Ok(mut observers) => {
                observers.retain(|w| w.strong_count() > 0);
                observers.iter().filter_map(Weak::upgrade).collect()
            }
            Err(_) => Vec::new(),
        }
    }

    pub fn set_group_context(&self, group: Uri, context: GroupContext) {
        if let Ok(mut state) = self.state.lock() {
            state.groups.insert(group.clone(), context);
        }
        for observer in self.live_observers() {
            observer.egroup_updated(&group);
        }
    }

    pub fn remove_group_context(&self, group: &Uri) {
        if let Ok(mut state) = self.state.lock() {
            state.groups.remove(group);
        }
        for observer in self.live_observers() {
            observer.egroup_updated(group);
        }
    }

    pub fn group_context(&self, group: &Uri) -> Option<GroupContext> {
        self.state.lock().ok()?.groups.get(group).cloned()
    }

    pub fn set_epg_mapping(&self, name: impl Into<String>, mapping: EpgMapping) {
        let name = name.into();
        if let Ok(mut state) = self.state.lock() {
            state.mappings.insert(name.clone(), mapping);
        }
        for observer in self.live_observers() {
            observer.mapping_updated(&name);
        }
    }

    pub fn remove_epg_mapping(&self, name: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.mappings.remove(name);
        }
        for observer in self.live_observers() {
            observer.mapping_updated(name);
        }
    }

    pub fn epg_mapping(&self, name: &str) -> Option<EpgMapping> {
        self.state.lock().ok()?.mappings.get(name).cloned()
    }

    pub fn set_attribute_set(&self, ep_uuid: impl Into<String>, attrs: Attributes) {
        let ep_uuid = ep_uuid.into();
        if let Ok(mut state) = self.state.lock() {
            state.attr_sets.insert(ep_uuid.clone(), attrs);
        }
        for observer in self.live_observers() {
            observer.attribute_set_updated(&ep_uuid);
        }
    }

    pub fn remove_attribute_set(&self, ep_uuid: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.attr_sets.remove(ep_uuid);
        }
        for observer in self.live_observers() {
            observer.attribute_set_updated(ep_uuid);
        }
    }

    pub fn attribute_set(&self, ep_uuid: &str) -> Option<Attributes> {
        self.state.lock().ok()?.attr_sets.get(ep_uuid).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_match_types() {
        let mut rule = MappingRule {
            order: 1,
            name: "r".into(),
            attr_name: "a".into(),
            match_string: "asd".into(),
            match_type: MatchType::StartsWith,
            negated: false,
            group: Uri::from("/g/"),
        };
        assert!(rule.matches(Some("asddsa")));
        assert!(!rule.matches(Some("xasd")));
        assert!(!rule.matches(None));

        rule.match_type = MatchType::EndsWith;
        rule.match_string = "dsa".into();
        assert!(rule.matches(Some("asddsa")));

        rule.match_type = MatchType::Contains;
        rule.match_string = "dd".into();
        assert!(rule.matches(Some("asddsa")));

        rule.match_type = MatchType::Equals;
        rule.match_string = "asddsa".into();
        assert!(rule.matches(Some("asddsa")));
        assert!(!rule.matches(Some("asddsa ")));
    }

    #[test]
    fn negated_rule_matches_missing_attribute() {
        let rule = MappingRule {
            order: 1,
            name: "r".into(),
            attr_name: "nothing".into(),
            match_string: "lksdflkjsd".into(),
            match_type: MatchType::Equals,
            negated: true,
            group: Uri::from("/g/"),
        };
        assert!(rule.matches(None));
        assert!(!rule.matches(Some("lksdflkjsd")));
    }

    #[test]
    fn rules_order_by_order_then_name() {
        let mk = |order, name: &str| MappingRule {
            order,
            name: name.into(),
            attr_name: "a".into(),
            match_string: String::new(),
            match_type: MatchType::Equals,
            negated: false,
            group: Uri::from("/g/"),
        };
        let mapping = EpgMapping {
            default_group: None,
            rules: vec![mk(10, "b"), mk(5, "z"), mk(10, "a")],
        };
        let names: Vec<&str> = mapping
            .ordered_rules()
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, ["z", "a", "b"]);
    }

    #[test]
    fn group_context_round_trip() {
        let registry = PolicyRegistry::new();
        let g = Uri::from("/g/");
        registry.set_group_context(
            g.clone(),
            GroupContext::new(Uri::from("/bd/"), Uri::from("/rd/")),
        );
        let ctx = registry.group_context(&g).unwrap();
        assert_eq!(ctx.bridge_domain.as_ref().unwrap().as_str(), "/bd/");
        assert!(ctx.routing_enabled);
        registry.remove_group_context(&g);
        assert!(registry.group_context(&g).is_none());
    }
}
