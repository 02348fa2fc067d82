//! Test utilities for exercising the service endpoint client.
//!
//! [`FakeAzureDevOps`] is a stateful `wiremock` responder that behaves like
//! the `_apis/serviceendpoint/endpoints` API: it assigns ids, keeps the
//! plaintext it was sent, and masks secret parameters in every response the
//! way the real service does.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use serviceendpoints::client::HttpServiceEndpointClient;
use serviceendpoints::secrets::SecretString;
use uuid::Uuid;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate, matchers::path_regex};

pub const ORG: &str = "contoso";
pub const PROJECT_ID: &str = "5b1a2a64-8d5c-4bb4-8c8b-0d6a2b1c9e11";
pub const PAT: &str = "test-personal-access-token";

/// Authorization parameters the service never echoes back.
const SECRET_PARAMETERS: [&str; 3] = ["apitoken", "nugetkey", "password"];

type Store = Arc<Mutex<HashMap<Uuid, Value>>>;

struct EndpointResponder {
    endpoints: Store,
}

impl EndpointResponder {
    fn masked(endpoint: &Value) -> Value {
        let mut endpoint = endpoint.clone();
        if let Some(parameters) = endpoint
            .pointer_mut("/authorization/parameters")
            .and_then(Value::as_object_mut)
        {
            for key in SECRET_PARAMETERS {
                parameters.remove(key);
            }
        }
        endpoint
    }

    fn references_project(endpoint: &Value, project: &str) -> bool {
        endpoint["serviceEndpointProjectReferences"]
            .as_array()
            .is_some_and(|references| {
                references
                    .iter()
                    .any(|reference| reference["projectReference"]["id"] == project)
            })
    }
}

impl Respond for EndpointResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let authorized = request
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("Basic "));
        if !authorized {
            return ResponseTemplate::new(401).set_body_string("TF400813: not authorized");
        }

        let segments: Vec<&str> = request
            .url
            .path_segments()
            .map(|segments| segments.collect())
            .unwrap_or_default();
        let Some(apis) = segments.iter().position(|segment| *segment == "_apis") else {
            return ResponseTemplate::new(404);
        };
        let project = (apis == 2).then(|| segments[1].to_string());
        let endpoint_id = segments
            .get(apis + 3)
            .and_then(|raw| Uuid::parse_str(raw).ok());

        let mut endpoints = self.endpoints.lock().unwrap();
        match (request.method.as_str(), endpoint_id) {
            ("POST", None) => {
                let mut endpoint: Value = serde_json::from_slice(&request.body).unwrap();
                let id = Uuid::new_v4();
                endpoint["id"] = json!(id);
                endpoint["isReady"] = json!(true);
                endpoints.insert(id, endpoint.clone());
                ResponseTemplate::new(200).set_body_json(Self::masked(&endpoint))
            }
            ("GET", Some(id)) => {
                let project = project.unwrap_or_default();
                match endpoints.get(&id) {
                    Some(endpoint) if Self::references_project(endpoint, &project) => {
                        ResponseTemplate::new(200).set_body_json(Self::masked(endpoint))
                    }
                    // the service answers an unknown id with an empty body
                    _ => ResponseTemplate::new(200),
                }
            }
            ("GET", None) => {
                let project = project.unwrap_or_default();
                let names: Vec<String> = request
                    .url
                    .query_pairs()
                    .filter(|(key, _)| key == "endpointNames")
                    .map(|(_, value)| value.to_lowercase())
                    .collect();
                let value: Vec<Value> = endpoints
                    .values()
                    .filter(|endpoint| Self::references_project(endpoint, &project))
                    .filter(|endpoint| {
                        endpoint["name"]
                            .as_str()
                            .is_some_and(|name| names.contains(&name.to_lowercase()))
                    })
                    .map(Self::masked)
                    .collect();
                ResponseTemplate::new(200).set_body_json(json!({
                    "count": value.len(),
                    "value": value
                }))
            }
            ("PUT", Some(id)) => {
                if !endpoints.contains_key(&id) {
                    return ResponseTemplate::new(404);
                }
                let mut endpoint: Value = serde_json::from_slice(&request.body).unwrap();
                endpoint["id"] = json!(id);
                endpoint["isReady"] = json!(true);
                endpoints.insert(id, endpoint.clone());
                ResponseTemplate::new(200).set_body_json(Self::masked(&endpoint))
            }
            ("DELETE", Some(id)) => match endpoints.remove(&id) {
                Some(_) => ResponseTemplate::new(204),
                None => ResponseTemplate::new(404),
            },
            _ => ResponseTemplate::new(405),
        }
    }
}

/// A running fake of the remote service endpoint API.
pub struct FakeAzureDevOps {
    pub server: MockServer,
    endpoints: Store,
}

impl FakeAzureDevOps {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let endpoints: Store = Arc::default();

        Mock::given(path_regex(r"/_apis/serviceendpoint/endpoints"))
            .respond_with(EndpointResponder {
                endpoints: endpoints.clone(),
            })
            .mount(&server)
            .await;

        Self { server, endpoints }
    }

    /// Organization URL to configure clients with.
    pub fn org_url(&self) -> String {
        format!("{}/{}", self.server.uri(), ORG)
    }

    pub fn client(&self) -> HttpServiceEndpointClient {
        HttpServiceEndpointClient::new(
            &self.org_url(),
            SecretString::new(PAT),
            "6.0-preview.4",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    pub fn project_id() -> Uuid {
        Uuid::parse_str(PROJECT_ID).unwrap()
    }

    /// The endpoint as stored, secrets included.
    pub fn stored(&self, id: &str) -> Option<Value> {
        let id = Uuid::parse_str(id).ok()?;
        self.endpoints.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.endpoints.lock().unwrap().len()
    }

    /// Delete an endpoint behind the client's back.
    pub fn remove(&self, id: &str) -> bool {
        Uuid::parse_str(id)
            .ok()
            .is_some_and(|id| self.endpoints.lock().unwrap().remove(&id).is_some())
    }

    /// Seed an endpoint created outside of this crate.
    pub fn insert(&self, mut endpoint: Value) -> Uuid {
        let id = Uuid::new_v4();
        endpoint["id"] = json!(id);
        self.endpoints.lock().unwrap().insert(id, endpoint);
        id
    }
}

/// Declared attributes of a token-authenticated NuGet endpoint.
pub fn token_declaration(name: &str, url: &str, token: &str) -> Value {
    json!({
        "project_id": PROJECT_ID,
        "service_endpoint_name": name,
        "description": "Managed by Terraform",
        "url": url,
        "authentication_token": [{"token": token}]
    })
}
