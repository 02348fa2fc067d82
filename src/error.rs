//! # Error Handling
//!
//! Unified error type for resource operations. Transport failures come from
//! [`crate::client::ClientError`]; everything else is raised while validating,
//! expanding, or flattening resource data.

use thiserror::Error;
use uuid::Uuid;

use crate::client::ClientError;
use crate::resources::registry::RegistryError;
use crate::schema::Diagnostic;

/// Errors produced by the service endpoint resources and their lifecycle.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Declared configuration does not satisfy the schema
    #[error("invalid configuration: {}", render_diagnostics(.0))]
    Validation(Vec<Diagnostic>),

    /// A present block (or the legacy flat field) could not be read as a string
    #[error("Unable to read '{field}'")]
    MissingField { field: String },

    /// The server returned an authorization scheme this resource cannot represent
    #[error(
        "inconsistent authorization scheme. Expected: (Token, None, UsernamePassword), but got {scheme}"
    )]
    InconsistentScheme { scheme: String },

    /// An endpoint with the same name already exists in the project
    #[error(
        "Service connection with name {name} already exists in project {project_id} (id {id}); import it into state before managing it as {resource_type}"
    )]
    RequiresImport {
        resource_type: String,
        name: String,
        project_id: Uuid,
        id: String,
    },

    /// The server accepted a write but returned no endpoint identifier
    #[error("service endpoint '{name}' was created without an identifier")]
    MissingEndpointId { name: String },

    /// An endpoint disappeared between a write and the read-back
    #[error("service endpoint {id} in project {project_id} was not found after it was written")]
    EndpointVanished { project_id: Uuid, id: Uuid },

    #[error("service endpoint {id} in project {project_id} does not exist and cannot be imported")]
    ImportNotFound { project_id: Uuid, id: Uuid },

    #[error("invalid import id '{value}': expected <project_id>/<endpoint_id>")]
    InvalidImportId { value: String },

    /// Persisted state cannot be interpreted by the current schema
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("remote API error: {0}")]
    Client(#[from] ClientError),
}

impl ProviderError {
    pub fn missing_field<S: Into<String>>(field: S) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Diagnostics carried by a validation failure, empty for other errors.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            ProviderError::Validation(diagnostics) => diagnostics,
            _ => &[],
        }
    }
}

fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
