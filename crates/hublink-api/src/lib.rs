// hublink-api: Async REST + WebSocket client for home-automation hubs

pub mod auth;
pub mod error;
pub mod registry;
pub mod rest;
pub mod transport;
pub mod websocket;

pub use auth::{ConnectionDescriptor, CredentialRefresher};
pub use error::Error;
pub use registry::{AreaEntry, DeviceEntry, DeviceUpdate, EntityEntry, EntityUpdate, LabelEntry};
pub use rest::models::{FlowStep, HubConfig, HubState};
pub use rest::{RestClient, RestRequest, RestResponse};
pub use transport::{TlsMode, TransportConfig};
pub use websocket::WsRpcClient;

pub use reqwest::Method;
