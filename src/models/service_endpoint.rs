//! Service endpoint wire model
//!
//! JSON shapes exchanged with the `_apis/serviceendpoint/endpoints` API.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generic service endpoint envelope shared by every endpoint type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    /// Server-assigned identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Endpoint type, e.g. `externalnugetfeed`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub endpoint_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Owner of the endpoint; always `library` for user-managed endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<EndpointAuthorization>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_endpoint_project_references: Vec<ServiceEndpointProjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_ready: Option<bool>,
}

impl ServiceEndpoint {
    /// Authorization scheme string as returned by the server.
    pub fn scheme(&self) -> Option<&str> {
        self.authorization.as_ref().map(|auth| auth.scheme.as_str())
    }

    /// Look up an authorization parameter value.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.authorization
            .as_ref()
            .and_then(|auth| auth.parameters.get(key))
            .map(String::as_str)
    }

    /// Whether the endpoint is shared with the given project.
    pub fn references_project(&self, project_id: Uuid) -> bool {
        self.service_endpoint_project_references
            .iter()
            .any(|reference| reference.project_reference.id == project_id)
    }
}

/// Authorization envelope: scheme tag plus scheme-specific parameters.
/// `Debug` lists parameter names only.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointAuthorization {
    pub scheme: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl fmt::Debug for EndpointAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointAuthorization")
            .field("scheme", &self.scheme)
            .field("parameters", &self.parameters.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Association between an endpoint and a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpointProjectReference {
    pub project_reference: ProjectReference,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectReference {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// List response wrapper (`{"count": n, "value": [...]}`), only `value` is read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceEndpointList {
    #[serde(default)]
    pub value: Vec<ServiceEndpoint>,
}

/// Authorization schemes understood by the NuGet endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthScheme {
    Token,
    None,
    UsernamePassword,
}

impl AuthScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::Token => "Token",
            AuthScheme::None => "None",
            AuthScheme::UsernamePassword => "UsernamePassword",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when the server reports a scheme outside [`AuthScheme`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown authorization scheme '{0}'")]
pub struct UnknownScheme(pub String);

impl FromStr for AuthScheme {
    type Err = UnknownScheme;

    /// Case-insensitive, the server is not consistent about casing.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [
            AuthScheme::Token,
            AuthScheme::None,
            AuthScheme::UsernamePassword,
        ]
        .into_iter()
        .find(|scheme| scheme.as_str().eq_ignore_ascii_case(value))
        .ok_or_else(|| UnknownScheme(value.to_string()))
    }
}
