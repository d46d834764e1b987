// hublink-core: connectivity and commissioning engine
//
// Sits between the transport crate (`hublink-api`) and front ends. Resolves
// which transport and credential to use, caches credentials, and drives
// device commissioning against the hub.

pub mod commissioning;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod platform;
pub mod registry;
pub mod resolver;

// ── Primary re-exports ──────────────────────────────────────────────
pub use commissioning::{
    Commissioner, CommissioningConfig, CommissioningRequest, CommissioningSession,
    CommissioningStatus,
};
pub use config::{CredentialConfig, EngineConfig, TlsVerification};
pub use credentials::{CredentialBundle, CredentialCache, CredentialPersistence, CredentialSource};
pub use engine::{HubEngine, HubEngineBuilder};
pub use error::CoreError;
pub use platform::{
    DeviceOverride, OverrideStore, PlatformClient, PlatformCredentialSource,
    PlatformOverrideStore, StaticCredentialSource,
};
pub use registry::{HubRegistry, RegistryDelta, RegistrySnapshot, WsRegistry, diff};
pub use resolver::{
    ResolverRefresher, SessionMeta, TransportMode, TransportResolver, check_transport_policy,
};

// Transport types consumers need alongside the engine.
pub use hublink_api::{
    AreaEntry, ConnectionDescriptor, DeviceEntry, DeviceUpdate, EntityEntry, EntityUpdate,
    FlowStep, HubConfig, HubState, LabelEntry, Method, RestRequest, RestResponse,
};
