use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use serviceendpoints::client::{ClientError, HttpServiceEndpointClient, ServiceEndpointApi};
use serviceendpoints::error::ProviderError;
use serviceendpoints::resource_data::ResourceData;
use serviceendpoints::resources::{NugetServiceEndpoint, PlanAction, ServiceEndpointLifecycle};
use serviceendpoints::schema::SchemaGeneration;
use serviceendpoints::secrets::{SecretString, fingerprint, fingerprint_matches};
use uuid::Uuid;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

mod test_utils;
use test_utils::{FakeAzureDevOps, PROJECT_ID, token_declaration};

fn lifecycle(fake: &FakeAzureDevOps) -> ServiceEndpointLifecycle {
    ServiceEndpointLifecycle::new(
        Arc::new(fake.client()),
        Arc::new(NugetServiceEndpoint::new(SchemaGeneration::Relaxed)),
    )
}

fn declaration(value: serde_json::Value) -> ResourceData {
    ResourceData::from_value(value).unwrap()
}

fn token_hash(state: &ResourceData) -> String {
    state
        .get_block("authentication_token")
        .and_then(|block| block.get("token_hash"))
        .and_then(|hash| hash.as_str())
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_nuget_token_endpoint_create_then_update() {
    let fake = FakeAzureDevOps::start().await;
    let lifecycle = lifecycle(&fake);

    let created = lifecycle
        .create(&declaration(token_declaration(
            "nuget-acc",
            "http://url.com/1",
            "redacted",
        )))
        .await
        .unwrap();
    let id = created.id().unwrap().to_string();

    let stored = fake.stored(&id).unwrap();
    assert_eq!(stored["type"], "externalnugetfeed");
    assert_eq!(stored["owner"], "library");
    assert_eq!(stored["url"], "http://url.com/1");
    assert_eq!(stored["authorization"]["scheme"], "Token");
    assert_eq!(stored["authorization"]["parameters"]["apitoken"], "redacted");

    assert_eq!(created.get_string("service_endpoint_name"), Some("nuget-acc"));
    assert_eq!(created.get_string("url"), Some("http://url.com/1"));
    let first_hash = token_hash(&created);
    assert_eq!(first_hash, fingerprint("redacted"));

    let (plan, updated) = lifecycle
        .apply(
            Some(&created),
            &declaration(token_declaration(
                "nuget-acc",
                "https://url.com/2",
                "redacted2",
            )),
        )
        .await
        .unwrap();
    assert_eq!(plan.action, PlanAction::Update);
    assert_eq!(updated.id(), Some(id.as_str()));
    assert_eq!(updated.get_string("url"), Some("https://url.com/2"));

    let second_hash = token_hash(&updated);
    assert_ne!(second_hash, first_hash);
    assert!(fingerprint_matches(&second_hash, "redacted2"));
    assert!(!fingerprint_matches(&second_hash, "redacted"));

    let stored = fake.stored(&id).unwrap();
    assert_eq!(stored["url"], "https://url.com/2");
    assert_eq!(stored["authorization"]["parameters"]["apitoken"], "redacted2");
    assert_eq!(fake.len(), 1);
}

#[tokio::test]
async fn test_rename_updates_endpoint_in_place() {
    let fake = FakeAzureDevOps::start().await;
    let lifecycle = lifecycle(&fake);

    let created = lifecycle
        .create(&declaration(token_declaration(
            "first",
            "https://url.com/1",
            "redacted",
        )))
        .await
        .unwrap();
    let id = created.id().unwrap().to_string();

    let (plan, renamed) = lifecycle
        .apply(
            Some(&created),
            &declaration(token_declaration("second", "https://url.com/1", "redacted")),
        )
        .await
        .unwrap();

    assert_eq!(plan.action, PlanAction::Update);
    let paths: Vec<_> = plan.changes.iter().map(|c| c.path.as_str()).collect();
    assert_eq!(paths, vec!["service_endpoint_name"]);
    assert_eq!(renamed.id(), Some(id.as_str()));
    assert_eq!(renamed.get_string("service_endpoint_name"), Some("second"));
    assert_eq!(fake.stored(&id).unwrap()["name"], "second");
    assert_eq!(fake.len(), 1);
}

#[tokio::test]
async fn test_refresh_of_unchanged_declaration_plans_nothing() {
    let fake = FakeAzureDevOps::start().await;
    let lifecycle = lifecycle(&fake);
    let config = declaration(token_declaration("nuget-acc", "https://url.com/", "redacted"));

    let created = lifecycle.create(&config).await.unwrap();
    let refreshed = lifecycle.read(&created).await.unwrap().unwrap();

    let plan = lifecycle.plan(Some(&refreshed), &config).unwrap();
    assert!(plan.is_noop(), "unexpected changes: {:?}", plan.changes);
}

#[tokio::test]
async fn test_duplicate_name_in_project_requires_import() {
    let fake = FakeAzureDevOps::start().await;
    let lifecycle = lifecycle(&fake);

    let created = lifecycle
        .create(&declaration(token_declaration(
            "nuget-acc",
            "https://url.com/1",
            "redacted",
        )))
        .await
        .unwrap();

    let err = lifecycle
        .create(&declaration(token_declaration(
            "NuGet-ACC",
            "https://url.com/other",
            "other",
        )))
        .await
        .unwrap_err();

    match err {
        ProviderError::RequiresImport { id, project_id, .. } => {
            assert_eq!(Some(id.as_str()), created.id());
            assert_eq!(project_id.to_string(), PROJECT_ID);
        }
        other => panic!("expected requires-import error, got {other:?}"),
    }
    assert_eq!(fake.len(), 1);
}

#[tokio::test]
async fn test_basic_credentials_record_distinct_fingerprints() {
    let fake = FakeAzureDevOps::start().await;
    let lifecycle = lifecycle(&fake);

    let created = lifecycle
        .create(&declaration(json!({
            "project_id": PROJECT_ID,
            "service_endpoint_name": "nuget-basic",
            "url": "https://pkgs.example.com/nuget/v3/index.json",
            "authentication_basic": [{"username": "builder", "password": "p4ssw0rd"}]
        })))
        .await
        .unwrap();

    let stored = fake.stored(created.id().unwrap()).unwrap();
    assert_eq!(stored["authorization"]["scheme"], "UsernamePassword");
    assert_eq!(stored["authorization"]["parameters"]["username"], "builder");
    assert_eq!(stored["authorization"]["parameters"]["password"], "p4ssw0rd");

    let block = created.get_block("authentication_basic").unwrap();
    assert_eq!(block["username_hash"], fingerprint("builder"));
    assert_eq!(block["password_hash"], fingerprint("p4ssw0rd"));
    assert!(block.get("password").is_none());
}

#[tokio::test]
async fn test_api_key_endpoint_uses_none_scheme() {
    let fake = FakeAzureDevOps::start().await;
    let lifecycle = lifecycle(&fake);

    let created = lifecycle
        .create(&declaration(json!({
            "project_id": PROJECT_ID,
            "service_endpoint_name": "nuget-key",
            "url": "https://api.nuget.org/v3/index.json",
            "authentication_none": [{"key": "oy2api-key"}]
        })))
        .await
        .unwrap();

    let stored = fake.stored(created.id().unwrap()).unwrap();
    assert_eq!(stored["authorization"]["scheme"], "None");
    assert_eq!(stored["authorization"]["parameters"]["nugetkey"], "oy2api-key");
    assert_eq!(
        created.get("authorization"),
        Some(&json!({"scheme": "None"}))
    );
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let fake = FakeAzureDevOps::start().await;
    let lifecycle = lifecycle(&fake);

    let created = lifecycle
        .create(&declaration(token_declaration(
            "nuget-acc",
            "https://url.com/1",
            "redacted",
        )))
        .await
        .unwrap();

    lifecycle.delete(&created).await.unwrap();
    assert_eq!(fake.len(), 0);
    lifecycle.delete(&created).await.unwrap();

    assert!(lifecycle.read(&created).await.unwrap().is_none());
}

#[tokio::test]
async fn test_import_records_raw_non_secret_values() {
    let fake = FakeAzureDevOps::start().await;
    let lifecycle = lifecycle(&fake);

    let id = fake.insert(json!({
        "name": "imported-feed",
        "type": "externalnugetfeed",
        "url": "https://pkgs.example.com/index.json",
        "description": "created by hand",
        "owner": "library",
        "authorization": {
            "scheme": "UsernamePassword",
            "parameters": {"username": "builder", "password": "p4ssw0rd"}
        },
        "serviceEndpointProjectReferences": [{
            "projectReference": {"id": PROJECT_ID},
            "name": "imported-feed"
        }]
    }));

    let state = lifecycle
        .import(&format!("{PROJECT_ID}/{id}"))
        .await
        .unwrap();
    assert_eq!(state.id(), Some(id.to_string().as_str()));
    assert_eq!(state.get_string("description"), Some("created by hand"));
    let block = state.get_block("authentication_basic").unwrap();
    assert_eq!(block["username"], "builder");
    // the service masks the password
    assert_eq!(block["password"], "");

    let plan = lifecycle
        .plan(
            Some(&state),
            &declaration(json!({
                "project_id": PROJECT_ID,
                "service_endpoint_name": "imported-feed",
                "description": "created by hand",
                "url": "https://pkgs.example.com/index.json",
                "authentication_basic": [{"username": "builder", "password": "p4ssw0rd"}]
            })),
        )
        .unwrap();
    assert_eq!(plan.action, PlanAction::Update);
    let paths: Vec<_> = plan.changes.iter().map(|c| c.path.as_str()).collect();
    assert_eq!(paths, vec!["authentication_basic.0.password"]);
}

#[tokio::test]
async fn test_import_of_unknown_endpoint_fails() {
    let fake = FakeAzureDevOps::start().await;
    let lifecycle = lifecycle(&fake);

    let err = lifecycle
        .import(&format!("{PROJECT_ID}/{}", Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::ImportNotFound { .. }));
}

#[tokio::test]
async fn test_project_change_replaces_endpoint() {
    let fake = FakeAzureDevOps::start().await;
    let lifecycle = lifecycle(&fake);
    let config = declaration(token_declaration("nuget-acc", "https://url.com/1", "redacted"));
    let created = lifecycle.create(&config).await.unwrap();

    let mut moved = config.clone();
    moved.set("project_id", "9d3f1a66-1b1c-4f4e-a7a0-2f9a0d4e7b33");
    let (plan, replaced) = lifecycle.apply(Some(&created), &moved).await.unwrap();

    assert_eq!(plan.action, PlanAction::Replace);
    assert_ne!(replaced.id(), created.id());
    assert!(fake.stored(created.id().unwrap()).is_none());
    assert_eq!(fake.len(), 1);
}

#[tokio::test]
async fn test_client_surfaces_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contoso/_apis/serviceendpoint/endpoints"))
        .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(300)))
        .mount(&server)
        .await;

    let client = HttpServiceEndpointClient::new(
        &format!("{}/contoso", server.uri()),
        SecretString::new("pat"),
        "6.0-preview.4",
        Duration::from_secs(5),
    )
    .unwrap();

    let err = client.create(&Default::default()).await.unwrap_err();
    match err {
        ClientError::Http {
            status,
            body_snippet,
        } => {
            assert_eq!(status, 500);
            assert_eq!(body_snippet.len(), 203);
        }
        other => panic!("expected http error, got {other:?}"),
    }

    let fake = FakeAzureDevOps::start().await;
    let missing = fake
        .client()
        .update(Uuid::new_v4(), &Default::default())
        .await
        .unwrap_err();
    assert!(missing.is_not_found());
}

#[tokio::test]
async fn test_unreachable_service_is_a_network_error() {
    let client = HttpServiceEndpointClient::new(
        "http://127.0.0.1:9/contoso",
        SecretString::new("pat"),
        "6.0-preview.4",
        Duration::from_secs(2),
    )
    .unwrap();

    let err = client
        .find_by_name(FakeAzureDevOps::project_id(), "nuget-acc")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Network(_)));
}
