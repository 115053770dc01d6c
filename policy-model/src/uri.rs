//! Policy URIs.
//!
//! Policy objects are addressed by hierarchical URIs of the form
//! `/PolicyUniverse/PolicySpace/<space>/GbpEpGroup/<name>/`. Cross-references
//! between model records are stored as URIs rather than pointers, so lookups
//! join on URI equality and the object graph stays acyclic.

use std::fmt;

/// A policy object URI.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uri(String);

impl Uri {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uri {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Uri {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Builds a URI from path elements, one `/`-terminated segment per element.
///
/// `/` and `%` inside an element are percent-escaped so that element
/// boundaries survive a round trip.
#[derive(Debug, Default)]
pub struct UriBuilder {
    uri: String,
}

impl UriBuilder {
    pub fn new() -> Self {
        Self {
            uri: String::from("/"),
        }
    }

    pub fn element(mut self, element: &str) -> Self {
        for c in element.chars() {
            match c {
                '/' => self.uri.push_str("%2f"),
                '%' => self.uri.push_str("%25"),
                _ => self.uri.push(c),
            }
        }
        self.uri.push('/');
        self
    }

    pub fn build(self) -> Uri {
        Uri(self.uri)
    }
}

/// URI of an endpoint group named within a policy space.
pub fn epg_uri(policy_space: &str, group: &str) -> Uri {
    UriBuilder::new()
        .element("PolicyUniverse")
        .element("PolicySpace")
        .element(policy_space)
        .element("GbpEpGroup")
        .element(group)
        .build()
}

/// URI of a security group named within a policy space.
pub fn sec_group_uri(policy_space: &str, group: &str) -> Uri {
    UriBuilder::new()
        .element("PolicyUniverse")
        .element("PolicySpace")
        .element(policy_space)
        .element("GbpSecGroup")
        .element(group)
        .build()
}

/// URI of a routing domain named within a policy space.
pub fn routing_domain_uri(policy_space: &str, domain: &str) -> Uri {
    UriBuilder::new()
        .element("PolicyUniverse")
        .element("PolicySpace")
        .element(policy_space)
        .element("GbpRoutingDomain")
        .element(domain)
        .build()
}

/// URI of an external node named within a policy space.
pub fn ext_node_uri(policy_space: &str, node: &str) -> Uri {
    UriBuilder::new()
        .element("PolicyUniverse")
        .element("PolicySpace")
        .element(policy_space)
        .element("GbpExternalNode")
        .element(node)
        .build()
}

/// URI of an external interface named within a policy space.
pub fn ext_interface_uri(policy_space: &str, iface: &str) -> Uri {
    UriBuilder::new()
        .element("PolicyUniverse")
        .element("PolicySpace")
        .element(policy_space)
        .element("GbpExternalInterface")
        .element(iface)
        .build()
}
