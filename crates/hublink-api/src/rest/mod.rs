// Hub REST API modules
//
// Timeout-bound executor plus typed helpers for the endpoints the engine
// consumes: states, services, templates, and config flows.

pub mod client;
pub mod flow;
pub mod models;
pub mod states;

pub use client::{RestClient, RestRequest, RestResponse};
