//! Base service endpoint lifecycle
//!
//! Drives create, read, update, delete and import for any
//! [`ServiceEndpointResource`] against a [`ServiceEndpointApi`]. Resources
//! only supply expand/flatten; everything remote lives here.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::plan::{self, Plan, PlanAction};
use super::{ServiceEndpointResource, endpoint_id, project_id, validate};
use crate::client::{ClientError, ServiceEndpointApi};
use crate::error::ProviderError;
use crate::resource_data::ResourceData;
use crate::schema::Schema;

#[derive(Clone)]
pub struct ServiceEndpointLifecycle {
    client: Arc<dyn ServiceEndpointApi>,
    resource: Arc<dyn ServiceEndpointResource>,
}

impl ServiceEndpointLifecycle {
    pub fn new(
        client: Arc<dyn ServiceEndpointApi>,
        resource: Arc<dyn ServiceEndpointResource>,
    ) -> Self {
        Self { client, resource }
    }

    pub fn resource_type(&self) -> &'static str {
        self.resource.type_name()
    }

    pub fn schema(&self) -> Schema {
        self.resource.schema()
    }

    pub fn validate(&self, config: &ResourceData) -> Result<(), ProviderError> {
        validate(self.resource.as_ref(), config)
    }

    /// Validate, then diff `config` against `prior`.
    pub fn plan(
        &self,
        prior: Option<&ResourceData>,
        config: &ResourceData,
    ) -> Result<Plan, ProviderError> {
        self.validate(config)?;
        Ok(plan::diff(&self.schema(), prior, config))
    }

    /// Create the endpoint, refusing to adopt one that already carries the
    /// same name in the project.
    #[instrument(skip_all, fields(resource_type = self.resource_type()))]
    pub async fn create(&self, config: &ResourceData) -> Result<ResourceData, ProviderError> {
        self.validate(config)?;
        let (endpoint, project_id) = self.resource.expand(config)?;
        let name = endpoint.name.clone().unwrap_or_default();

        if let Some(existing) = self.client.find_by_name(project_id, &name).await? {
            return Err(ProviderError::RequiresImport {
                resource_type: self.resource_type().to_string(),
                name,
                project_id,
                id: existing.id.map(|id| id.to_string()).unwrap_or_default(),
            });
        }

        let created = self.client.create(&endpoint).await?;
        let id = created
            .id
            .ok_or_else(|| ProviderError::MissingEndpointId { name: name.clone() })?;
        info!(endpoint_id = %id, %project_id, name = %name, "created service endpoint");

        let mut state = config.clone();
        state.set_id(id.to_string());
        self.read_back(&mut state, project_id, id).await?;
        Ok(state)
    }

    /// Refresh state from the remote system. `Ok(None)` means the endpoint is
    /// gone and should be dropped from state.
    #[instrument(skip_all, fields(resource_type = self.resource_type(), id = state.id()))]
    pub async fn read(&self, state: &ResourceData) -> Result<Option<ResourceData>, ProviderError> {
        let project_id = project_id(state)?;
        let id = endpoint_id(state)?;

        match self.client.get(project_id, id).await? {
            Some(endpoint) => {
                let mut refreshed = state.clone();
                self.resource
                    .flatten(&mut refreshed, &endpoint, project_id)?;
                Ok(Some(refreshed))
            }
            None => {
                warn!(endpoint_id = %id, %project_id, "service endpoint no longer exists");
                Ok(None)
            }
        }
    }

    /// Update in place, keeping the endpoint id recorded in `state`.
    #[instrument(skip_all, fields(resource_type = self.resource_type(), id = state.id()))]
    pub async fn update(
        &self,
        state: &ResourceData,
        config: &ResourceData,
    ) -> Result<ResourceData, ProviderError> {
        self.validate(config)?;
        let id = endpoint_id(state)?;
        let (mut endpoint, project_id) = self.resource.expand(config)?;
        endpoint.id = Some(id);

        self.client.update(id, &endpoint).await?;
        info!(endpoint_id = %id, %project_id, "updated service endpoint");

        let mut next = config.clone();
        next.set_id(id.to_string());
        self.read_back(&mut next, project_id, id).await?;
        Ok(next)
    }

    /// Delete the endpoint. An endpoint that is already gone counts as deleted.
    #[instrument(skip_all, fields(resource_type = self.resource_type(), id = state.id()))]
    pub async fn delete(&self, state: &ResourceData) -> Result<(), ProviderError> {
        let project_id = project_id(state)?;
        let id = endpoint_id(state)?;

        match self.client.delete(project_id, id).await {
            Ok(()) => {
                info!(endpoint_id = %id, %project_id, "deleted service endpoint");
                Ok(())
            }
            Err(ClientError::NotFound) => {
                warn!(endpoint_id = %id, %project_id, "service endpoint already deleted");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Import an existing endpoint by `<project_id>/<endpoint_id>`.
    #[instrument(skip_all, fields(resource_type = self.resource_type(), import_id = %import_id))]
    pub async fn import(&self, import_id: &str) -> Result<ResourceData, ProviderError> {
        let (project_id, id) = parse_import_id(import_id)?;
        let endpoint = self
            .client
            .get(project_id, id)
            .await?
            .ok_or(ProviderError::ImportNotFound { project_id, id })?;

        let mut state = ResourceData::new();
        state.set_id(id.to_string());
        self.resource.flatten(&mut state, &endpoint, project_id)?;
        info!(endpoint_id = %id, %project_id, "imported service endpoint");
        Ok(state)
    }

    /// Plan and carry out whatever moves `prior` to `config`. Returns the
    /// plan together with the resulting state.
    pub async fn apply(
        &self,
        prior: Option<&ResourceData>,
        config: &ResourceData,
    ) -> Result<(Plan, ResourceData), ProviderError> {
        let plan = self.plan(prior, config)?;
        let state = match (plan.action, prior) {
            (PlanAction::NoOp, Some(prior)) => prior.clone(),
            (PlanAction::Update, Some(prior)) => self.update(prior, config).await?,
            (PlanAction::Replace, Some(prior)) => {
                self.delete(prior).await?;
                self.create(config).await?
            }
            _ => self.create(config).await?,
        };
        Ok((plan, state))
    }

    async fn read_back(
        &self,
        state: &mut ResourceData,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<(), ProviderError> {
        let endpoint = self
            .client
            .get(project_id, id)
            .await?
            .ok_or(ProviderError::EndpointVanished { project_id, id })?;
        self.resource.flatten(state, &endpoint, project_id)
    }
}

/// Split `<project_id>/<endpoint_id>`.
pub fn parse_import_id(value: &str) -> Result<(Uuid, Uuid), ProviderError> {
    let invalid = || ProviderError::InvalidImportId {
        value: value.to_string(),
    };
    let (project, endpoint) = value.split_once('/').ok_or_else(invalid)?;
    let project_id = Uuid::parse_str(project.trim()).map_err(|_| invalid())?;
    let endpoint_id = Uuid::parse_str(endpoint.trim()).map_err(|_| invalid())?;
    Ok((project_id, endpoint_id))
}
