//! # Service Endpoints Library
//!
//! Declarative management of Azure DevOps service endpoints: resource
//! schemas, expand/flatten mappers, a REST client and the lifecycle that
//! ties them together.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod resource_data;
pub mod resources;
pub mod schema;
pub mod secrets;
pub mod telemetry;
