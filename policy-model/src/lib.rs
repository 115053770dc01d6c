//! In-memory policy model for the agent.
//!
//! Declarations arrive from the sources (filesystem files, the local
//! inventory), are normalized into the records in this crate, and are held
//! by the managers, which keep reverse indices consistent, resolve
//! endpoints to endpoint groups against the [`registry::PolicyRegistry`],
//! and notify registered listeners after every change. Downstream
//! components (flow renderers, the notification server) consume snapshots
//! and listener callbacks; they never share locks with the managers.

pub mod attributes;
pub mod endpoint;
pub mod endpoint_manager;
pub mod extra_config;
pub mod learning_bridge;
pub mod registry;
pub mod service;
pub mod service_manager;
pub mod uri;

pub use attributes::Attributes;
pub use endpoint::{DhcpV4Config, DhcpV6Config, Endpoint, IpAddressMapping, StaticRoute};
pub use endpoint_manager::{EndpointListener, EndpointManager, EprL2Entry, EprL3Entry};
pub use extra_config::{
    DropLogMode, ExtraConfigListener, ExtraConfigManager, PacketDropFlowConfig,
    PacketDropLogConfig,
};
pub use learning_bridge::{
    LearningBridgeIface, LearningBridgeListener, LearningBridgeManager, VlanRange,
};
pub use registry::{
    EpgMapping, GroupContext, MappingRule, MatchType, PolicyRegistry, PolicyUpdateObserver,
};
pub use service::{Service, ServiceMapping, ServiceMode, ServiceType};
pub use service_manager::{ServiceListener, ServiceManager};
pub use uri::{Uri, UriBuilder};
