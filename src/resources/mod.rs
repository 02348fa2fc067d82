//! Service endpoint resources
//!
//! Every endpoint kind shares a base schema fragment and the base
//! expansion/flattening of name, project and description. A concrete resource
//! only adds its own fields and credential handling by implementing
//! [`ServiceEndpointResource`].

pub mod lifecycle;
pub mod nuget;
pub mod plan;
pub mod registry;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ProviderError;
use crate::models::service_endpoint::{
    ProjectReference, ServiceEndpoint, ServiceEndpointProjectReference,
};
use crate::resource_data::ResourceData;
use crate::schema::{Attribute, Block, Diagnostic, Schema, Validator, validate_config};

pub use lifecycle::ServiceEndpointLifecycle;
pub use nuget::NugetServiceEndpoint;
pub use plan::{AttributeChange, Plan, PlanAction};
pub use registry::{Registry, RegistryError};

pub const PROJECT_ID: &str = "project_id";
pub const SERVICE_ENDPOINT_NAME: &str = "service_endpoint_name";
pub const DESCRIPTION: &str = "description";
pub const AUTHORIZATION: &str = "authorization";

/// Description applied when the declaration leaves it out.
pub const DEFAULT_DESCRIPTION: &str = "Managed by Terraform";

/// Owner recorded on every endpoint created through this crate.
pub const ENDPOINT_OWNER: &str = "library";

/// A service endpoint kind: its schema plus the mapping between declared
/// attributes and the remote envelope.
pub trait ServiceEndpointResource: Send + Sync {
    /// Resource type name, e.g. `azuredevops_serviceendpoint_nuget`
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    /// Convert declared attributes into the remote envelope and the owning
    /// project id.
    fn expand(&self, data: &ResourceData) -> Result<(ServiceEndpoint, Uuid), ProviderError>;

    /// Write a remote envelope back into `data`.
    fn flatten(
        &self,
        data: &mut ResourceData,
        endpoint: &ServiceEndpoint,
        project_id: Uuid,
    ) -> Result<(), ProviderError>;

    /// Rewrite attributes persisted under an older schema version. Versions
    /// newer than the resource's own are rejected.
    fn upgrade_state(
        &self,
        version: u32,
        attributes: Map<String, Value>,
    ) -> Result<Map<String, Value>, ProviderError>;
}

/// Attributes common to every service endpoint resource.
pub fn base_schema() -> Block {
    Block::new()
        .with_attribute(
            PROJECT_ID,
            Attribute::required_string()
                .force_new()
                .with_validator(Validator::Uuid)
                .with_description("The ID of the project to which the service endpoint belongs"),
        )
        .with_attribute(
            SERVICE_ENDPOINT_NAME,
            Attribute::required_string()
                .with_validator(Validator::NoZeroValue)
                .with_description("The name of the service endpoint"),
        )
        .with_attribute(
            DESCRIPTION,
            Attribute::optional_string()
                .with_default(DEFAULT_DESCRIPTION)
                .with_description("The description of the service endpoint"),
        )
        .with_attribute(AUTHORIZATION, Attribute::computed_map())
}

/// Run schema validation, failing with every diagnostic found.
pub fn validate(
    resource: &dyn ServiceEndpointResource,
    config: &ResourceData,
) -> Result<(), ProviderError> {
    let diagnostics = validate_config(&resource.schema(), config.attributes());
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(ProviderError::Validation(diagnostics))
    }
}

/// Name, description, owner and project reference shared by all endpoints.
pub fn base_expansion(data: &ResourceData) -> Result<(ServiceEndpoint, Uuid), ProviderError> {
    let project_id = project_id(data)?;
    let name = data
        .get_string(SERVICE_ENDPOINT_NAME)
        .ok_or_else(|| ProviderError::missing_field(SERVICE_ENDPOINT_NAME))?
        .to_string();
    let description = data
        .get_ok(DESCRIPTION)
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_DESCRIPTION)
        .to_string();

    let endpoint = ServiceEndpoint {
        id: data.id().and_then(|id| Uuid::parse_str(id).ok()),
        name: Some(name.clone()),
        description: Some(description.clone()),
        owner: Some(ENDPOINT_OWNER.to_string()),
        service_endpoint_project_references: vec![ServiceEndpointProjectReference {
            project_reference: ProjectReference {
                id: project_id,
                name: None,
            },
            name,
            description: Some(description),
        }],
        ..ServiceEndpoint::default()
    };
    Ok((endpoint, project_id))
}

/// Inverse of [`base_expansion`], plus the computed `authorization` map.
pub fn base_flattening(data: &mut ResourceData, endpoint: &ServiceEndpoint, project_id: Uuid) {
    if let Some(id) = endpoint.id {
        data.set_id(id.to_string());
    }
    if let Some(name) = &endpoint.name {
        data.set(SERVICE_ENDPOINT_NAME, name.as_str());
    }
    data.set(PROJECT_ID, project_id.to_string());
    if let Some(description) = &endpoint.description {
        data.set(DESCRIPTION, description.as_str());
    }

    let mut authorization = Map::new();
    if let Some(scheme) = endpoint.scheme() {
        authorization.insert("scheme".to_string(), Value::from(scheme));
    }
    data.set(AUTHORIZATION, Value::Object(authorization));
}

/// Owning project of declared or persisted data.
pub fn project_id(data: &ResourceData) -> Result<Uuid, ProviderError> {
    let raw = data
        .get_string(PROJECT_ID)
        .ok_or_else(|| ProviderError::missing_field(PROJECT_ID))?;
    Uuid::parse_str(raw).map_err(|err| {
        ProviderError::Validation(vec![Diagnostic::attribute_error(
            PROJECT_ID,
            format!("expected {PROJECT_ID:?} to be a valid UUID, got {raw:?}: {err}"),
        )])
    })
}

/// Server-assigned endpoint id of persisted data.
pub fn endpoint_id(data: &ResourceData) -> Result<Uuid, ProviderError> {
    let raw = data
        .id()
        .ok_or_else(|| ProviderError::InvalidState("resource has no id".to_string()))?;
    Uuid::parse_str(raw).map_err(|err| {
        ProviderError::InvalidState(format!("resource id {raw:?} is not a UUID: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::service_endpoint::EndpointAuthorization;
    use crate::schema::Presence;
    use serde_json::json;

    const PROJECT: &str = "5b1a2a64-8d5c-4bb4-8c8b-0d6a2b1c9e11";

    #[test]
    fn test_base_schema_fields() {
        let block = base_schema();
        let project = block.attribute(PROJECT_ID).unwrap();
        assert!(project.force_new);
        assert_eq!(project.presence, Presence::Required);
        assert_eq!(
            block.attribute(DESCRIPTION).and_then(|a| a.default.as_deref()),
            Some(DEFAULT_DESCRIPTION)
        );
        assert!(block.attribute(AUTHORIZATION).unwrap().is_computed());
    }

    #[test]
    fn test_base_expansion_defaults_description() {
        let data = ResourceData::from_value(json!({
            "project_id": PROJECT,
            "service_endpoint_name": "feed"
        }))
        .unwrap();

        let (endpoint, project_id) = base_expansion(&data).unwrap();
        assert_eq!(project_id.to_string(), PROJECT);
        assert_eq!(endpoint.description.as_deref(), Some(DEFAULT_DESCRIPTION));
        assert_eq!(endpoint.owner.as_deref(), Some("library"));
        assert!(endpoint.references_project(project_id));
        assert_eq!(endpoint.service_endpoint_project_references[0].name, "feed");
        assert!(endpoint.id.is_none());
    }

    #[test]
    fn test_base_expansion_rejects_bad_project() {
        let data = ResourceData::from_value(json!({
            "project_id": "not-a-uuid",
            "service_endpoint_name": "feed"
        }))
        .unwrap();
        assert!(matches!(
            base_expansion(&data),
            Err(ProviderError::Validation(_))
        ));
    }

    #[test]
    fn test_base_flattening_records_scheme() {
        let id = Uuid::new_v4();
        let project_id = Uuid::parse_str(PROJECT).unwrap();
        let endpoint = ServiceEndpoint {
            id: Some(id),
            name: Some("feed".to_string()),
            description: Some("desc".to_string()),
            authorization: Some(EndpointAuthorization {
                scheme: "Token".to_string(),
                ..EndpointAuthorization::default()
            }),
            ..ServiceEndpoint::default()
        };

        let mut data = ResourceData::new();
        base_flattening(&mut data, &endpoint, project_id);

        assert_eq!(data.id(), Some(id.to_string().as_str()));
        assert_eq!(data.get_string(PROJECT_ID), Some(PROJECT));
        assert_eq!(data.get(AUTHORIZATION), Some(&json!({"scheme": "Token"})));
        assert_eq!(endpoint_id(&data).unwrap(), id);
    }
}
