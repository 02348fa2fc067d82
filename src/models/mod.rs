//! # Data Models
//!
//! Wire types exchanged with the remote service endpoint API.

pub mod service_endpoint;

pub use service_endpoint::{AuthScheme, EndpointAuthorization, ServiceEndpoint};
