//! NuGet feed service endpoint (`externalnugetfeed`)
//!
//! Credentials are declared as exactly one of three blocks:
//!
//! | block                  | scheme             | parameters               |
//! |------------------------|--------------------|--------------------------|
//! | `authentication_token` | `Token`            | `apitoken`               |
//! | `authentication_none`  | `None`             | `nugetkey`               |
//! | `authentication_basic` | `UsernamePassword` | `username`, `password`   |
//!
//! The legacy generation declares a single flat `access_token` instead.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use super::{ServiceEndpointResource, base_expansion, base_flattening, base_schema};
use crate::error::ProviderError;
use crate::models::service_endpoint::{AuthScheme, EndpointAuthorization, ServiceEndpoint};
use crate::resource_data::ResourceData;
use crate::schema::{Attribute, Block, Diagnostic, Schema, SchemaGeneration, Validator};
use crate::secrets::{SecretString, fingerprint, hash_key};

pub const RESOURCE_TYPE: &str = "azuredevops_serviceendpoint_nuget";
pub const ENDPOINT_TYPE: &str = "externalnugetfeed";

pub const URL: &str = "url";
pub const ACCESS_TOKEN: &str = "access_token";
pub const AUTHENTICATION_TOKEN: &str = "authentication_token";
pub const AUTHENTICATION_NONE: &str = "authentication_none";
pub const AUTHENTICATION_BASIC: &str = "authentication_basic";

const CREDENTIAL_BLOCKS: [&str; 3] = [
    AUTHENTICATION_BASIC,
    AUTHENTICATION_NONE,
    AUTHENTICATION_TOKEN,
];

pub const PARAM_API_TOKEN: &str = "apitoken";
pub const PARAM_NUGET_KEY: &str = "nugetkey";
pub const PARAM_USERNAME: &str = "username";
pub const PARAM_PASSWORD: &str = "password";

/// Credential declared for a NuGet endpoint. Exactly one variant applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NugetCredential {
    Token { token: SecretString },
    /// API key, sent under the `None` scheme
    None { key: SecretString },
    UsernamePassword {
        username: SecretString,
        password: SecretString,
    },
}

impl NugetCredential {
    pub fn scheme(&self) -> AuthScheme {
        match self {
            NugetCredential::Token { .. } => AuthScheme::Token,
            NugetCredential::None { .. } => AuthScheme::None,
            NugetCredential::UsernamePassword { .. } => AuthScheme::UsernamePassword,
        }
    }

    pub fn to_authorization(&self) -> EndpointAuthorization {
        let mut parameters = BTreeMap::new();
        match self {
            NugetCredential::Token { token } => {
                parameters.insert(PARAM_API_TOKEN.to_string(), token.expose().to_string());
            }
            NugetCredential::None { key } => {
                parameters.insert(PARAM_NUGET_KEY.to_string(), key.expose().to_string());
            }
            NugetCredential::UsernamePassword { username, password } => {
                parameters.insert(PARAM_USERNAME.to_string(), username.expose().to_string());
                parameters.insert(PARAM_PASSWORD.to_string(), password.expose().to_string());
            }
        }
        EndpointAuthorization {
            scheme: self.scheme().to_string(),
            parameters,
        }
    }

    /// Read the declared credential. Blocks are checked in the order token,
    /// none, basic; the first present one wins.
    pub fn from_resource_data(
        data: &ResourceData,
        generation: SchemaGeneration,
    ) -> Result<Self, ProviderError> {
        if generation == SchemaGeneration::Legacy {
            return match data.get_ok(ACCESS_TOKEN) {
                Some(value) => value
                    .as_str()
                    .map(|token| NugetCredential::Token {
                        token: SecretString::from(token),
                    })
                    .ok_or_else(|| ProviderError::missing_field(ACCESS_TOKEN)),
                None => Err(ProviderError::missing_field(ACCESS_TOKEN)),
            };
        }

        if data.get_ok(AUTHENTICATION_TOKEN).is_some() {
            Ok(NugetCredential::Token {
                token: read_secret(data, AUTHENTICATION_TOKEN, "token")?,
            })
        } else if data.get_ok(AUTHENTICATION_NONE).is_some() {
            Ok(NugetCredential::None {
                key: read_secret(data, AUTHENTICATION_NONE, "key")?,
            })
        } else if data.get_ok(AUTHENTICATION_BASIC).is_some() {
            Ok(NugetCredential::UsernamePassword {
                username: read_secret(data, AUTHENTICATION_BASIC, "username")?,
                password: read_secret(data, AUTHENTICATION_BASIC, "password")?,
            })
        } else {
            Err(ProviderError::Validation(vec![Diagnostic::error(format!(
                "one of `{}` must be specified",
                CREDENTIAL_BLOCKS.join(",")
            ))]))
        }
    }
}

fn read_secret(data: &ResourceData, block: &str, field: &str) -> Result<SecretString, ProviderError> {
    data.get_block(block)
        .and_then(|fields| fields.get(field))
        .and_then(Value::as_str)
        .map(SecretString::from)
        .ok_or_else(|| ProviderError::missing_field(field))
}

type SecretFields = &'static [(&'static str, &'static str)];

const TOKEN_FIELDS: SecretFields = &[("token", PARAM_API_TOKEN)];
const NONE_FIELDS: SecretFields = &[("key", PARAM_NUGET_KEY)];
const BASIC_FIELDS: SecretFields = &[("username", PARAM_USERNAME), ("password", PARAM_PASSWORD)];

/// Block name plus (secret field, remote parameter key) pairs for a scheme.
fn credential_layout(scheme: AuthScheme) -> (&'static str, SecretFields) {
    match scheme {
        AuthScheme::Token => (AUTHENTICATION_TOKEN, TOKEN_FIELDS),
        AuthScheme::None => (AUTHENTICATION_NONE, NONE_FIELDS),
        AuthScheme::UsernamePassword => (AUTHENTICATION_BASIC, BASIC_FIELDS),
    }
}

/// Fingerprint memo for `field`: hash the declared plaintext when present,
/// otherwise carry over the previous memo.
fn flatten_secret(local: &Map<String, Value>, field: &str) -> Value {
    match local.get(field).and_then(Value::as_str) {
        Some(secret) if !secret.is_empty() => Value::from(fingerprint(secret)),
        _ => local.get(&hash_key(field)).cloned().unwrap_or(Value::Null),
    }
}

/// The `azuredevops_serviceendpoint_nuget` resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct NugetServiceEndpoint {
    generation: SchemaGeneration,
}

impl NugetServiceEndpoint {
    pub fn new(generation: SchemaGeneration) -> Self {
        Self { generation }
    }

    fn url_attribute(&self) -> Attribute {
        let url = Attribute::required_string()
            .with_description("Url for the Nuget Feed")
            .with_validator(Validator::HttpOrHttpsUrl);
        match self.generation {
            SchemaGeneration::Strict => url.with_validator(Validator::NoTrailingSlash),
            SchemaGeneration::Legacy | SchemaGeneration::Relaxed => url,
        }
    }

    fn credential_schema(&self) -> Block {
        if self.generation == SchemaGeneration::Legacy {
            return Block::new().with_secret(ACCESS_TOKEN, "The Nuget Feed access token.");
        }

        Block::new()
            .with_attribute(
                AUTHENTICATION_TOKEN,
                Attribute::optional_block(
                    Block::new().with_secret("token", "The Nuget Feed access token."),
                )
                .exactly_one_of(&CREDENTIAL_BLOCKS),
            )
            .with_attribute(
                AUTHENTICATION_NONE,
                Attribute::optional_block(
                    Block::new().with_secret("key", "The Nuget Feed API key."),
                ),
            )
            .with_attribute(
                AUTHENTICATION_BASIC,
                Attribute::optional_block(
                    Block::new()
                        .with_secret("username", "The Nuget feed user name.")
                        .with_secret("password", "The Nuget feed password."),
                ),
            )
    }

    fn flatten_legacy(
        &self,
        data: &mut ResourceData,
        endpoint: &ServiceEndpoint,
    ) -> Result<(), ProviderError> {
        let memo_key = hash_key(ACCESS_TOKEN);
        let declared = data
            .get_ok(ACCESS_TOKEN)
            .and_then(Value::as_str)
            .map(fingerprint);
        let existing = data.get(&memo_key).cloned();

        match (declared, existing) {
            (Some(hash), _) => {
                data.remove(ACCESS_TOKEN);
                data.set(&memo_key, hash);
            }
            (None, Some(_)) => {}
            (None, None) => {
                let raw = endpoint.parameter(PARAM_API_TOKEN).unwrap_or_default();
                data.set(ACCESS_TOKEN, raw);
            }
        }
        Ok(())
    }

    fn flatten_blocks(
        &self,
        data: &mut ResourceData,
        endpoint: &ServiceEndpoint,
        scheme: AuthScheme,
    ) {
        let (block_name, fields) = credential_layout(scheme);

        let mut flattened = Map::new();
        match data.get_block(block_name).filter(|local| !local.is_empty()) {
            Some(local) => {
                for (field, _) in fields {
                    flattened.insert(hash_key(field), flatten_secret(local, field));
                }
            }
            None => {
                // imported or created out of band: record what the server reports
                for (field, parameter) in fields {
                    let raw = endpoint.parameter(parameter).unwrap_or_default();
                    flattened.insert(field.to_string(), Value::from(raw));
                }
            }
        }

        for other in CREDENTIAL_BLOCKS.iter().filter(|name| **name != block_name) {
            if data.remove(other).is_some() {
                debug!(block = other, %scheme, "dropping credential block that does not match remote scheme");
            }
        }
        data.set_block(block_name, flattened);
    }
}

impl ServiceEndpointResource for NugetServiceEndpoint {
    fn type_name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> Schema {
        let block = base_schema()
            .merge(Block::new().with_attribute(URL, self.url_attribute()))
            .merge(self.credential_schema());
        Schema::new(self.generation, block)
    }

    fn expand(&self, data: &ResourceData) -> Result<(ServiceEndpoint, Uuid), ProviderError> {
        let (mut endpoint, project_id) = base_expansion(data)?;
        let url = data
            .get_string(URL)
            .ok_or_else(|| ProviderError::missing_field(URL))?;
        let credential = NugetCredential::from_resource_data(data, self.generation)?;

        endpoint.endpoint_type = Some(ENDPOINT_TYPE.to_string());
        endpoint.url = Some(url.to_string());
        endpoint.authorization = Some(credential.to_authorization());
        Ok((endpoint, project_id))
    }

    fn flatten(
        &self,
        data: &mut ResourceData,
        endpoint: &ServiceEndpoint,
        project_id: Uuid,
    ) -> Result<(), ProviderError> {
        base_flattening(data, endpoint, project_id);

        let reported = endpoint.scheme().unwrap_or_default();
        let scheme: AuthScheme =
            reported
                .parse()
                .map_err(|_| ProviderError::InconsistentScheme {
                    scheme: reported.to_string(),
                })?;

        if self.generation == SchemaGeneration::Legacy {
            if scheme != AuthScheme::Token {
                return Err(ProviderError::InconsistentScheme {
                    scheme: reported.to_string(),
                });
            }
            self.flatten_legacy(data, endpoint)?;
        } else {
            self.flatten_blocks(data, endpoint, scheme);
        }

        if let Some(url) = &endpoint.url {
            data.set(URL, url.as_str());
        }
        Ok(())
    }

    /// Version 0 kept a flat `access_token`; later versions nest it in the
    /// `authentication_token` block. Versions 1 and 2 share a state layout.
    fn upgrade_state(
        &self,
        version: u32,
        mut attributes: Map<String, Value>,
    ) -> Result<Map<String, Value>, ProviderError> {
        let current = self.generation.version();
        let Some(from) =
            SchemaGeneration::from_version(version).filter(|from| *from <= self.generation)
        else {
            return Err(ProviderError::InvalidState(format!(
                "state schema version {version} is not supported, expected at most {current}"
            )));
        };
        if from != SchemaGeneration::Legacy || self.generation == SchemaGeneration::Legacy {
            return Ok(attributes);
        }

        let token = attributes.remove(ACCESS_TOKEN);
        let memo = attributes.remove(&hash_key(ACCESS_TOKEN));
        if token.is_some() || memo.is_some() {
            let mut block = Map::new();
            if let Some(token) = token {
                block.insert("token".to_string(), token);
            }
            if let Some(memo) = memo {
                block.insert(hash_key("token"), memo);
            }
            attributes.insert(
                AUTHENTICATION_TOKEN.to_string(),
                Value::Array(vec![Value::Object(block)]),
            );
        }
        debug!(from = version, to = current, "upgraded nuget endpoint state");
        Ok(attributes)
    }
}
