//! Resource registry
//!
//! Maps resource type names to their [`ServiceEndpointResource`] implementation.

use std::collections::HashMap;
use std::sync::Arc;

use super::ServiceEndpointResource;
use super::nuget::NugetServiceEndpoint;
use crate::schema::SchemaGeneration;

/// Error type for registry operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("Resource type '{name}' not found")]
    ResourceNotFound { name: String },
}

/// Registry of service endpoint resources keyed by type name
#[derive(Clone, Default)]
pub struct Registry {
    resources: HashMap<String, Arc<dyn ServiceEndpointResource>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in resource at the given schema generation
    pub fn with_defaults(generation: SchemaGeneration) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NugetServiceEndpoint::new(generation)));
        registry
    }

    pub fn register(&mut self, resource: Arc<dyn ServiceEndpointResource>) {
        self.resources
            .insert(resource.type_name().to_string(), resource);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ServiceEndpointResource>, RegistryError> {
        self.resources
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::ResourceNotFound {
                name: name.to_string(),
            })
    }

    /// Registered type names, sorted for stable output
    pub fn resource_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.resources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::nuget::RESOURCE_TYPE;

    #[test]
    fn test_defaults_register_nuget() {
        let registry = Registry::with_defaults(SchemaGeneration::Strict);
        let resource = registry.get(RESOURCE_TYPE).unwrap();
        assert_eq!(resource.type_name(), RESOURCE_TYPE);
        assert_eq!(resource.schema().version, 1);
        assert_eq!(registry.resource_types(), vec![RESOURCE_TYPE]);
    }

    #[test]
    fn test_unknown_resource_type() {
        let registry = Registry::new();
        let err = registry.get("azuredevops_serviceendpoint_npm").err().unwrap();
        assert_eq!(
            err.to_string(),
            "Resource type 'azuredevops_serviceendpoint_npm' not found"
        );
    }
}
