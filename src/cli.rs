//! Command-line surface
//!
//! Each command reads a JSON declaration and/or a JSON state file, drives
//! the [`ServiceEndpointLifecycle`] and returns the text to print.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use crate::client::HttpServiceEndpointClient;
use crate::config::AppConfig;
use crate::resource_data::{Declaration, ResourceData, ResourceState};
use crate::resources::{
    Registry, ServiceEndpointLifecycle, ServiceEndpointResource, plan, validate,
};
use crate::schema::Diagnostic;

/// Manage Azure DevOps service endpoints from JSON declarations
#[derive(Debug, Parser)]
#[command(name = "serviceendpoints")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the layered `.env` files
    #[arg(long, global = true)]
    pub env_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check a declaration against the resource schema
    Validate(DeclarationArgs),
    /// Show what apply would change
    Plan(PlanArgs),
    /// Create, update or replace the endpoint and record its state
    Apply(StatefulArgs),
    /// Delete the endpoint recorded in a state file
    Destroy(StateArgs),
    /// Adopt an existing endpoint into a state file
    Import(ImportArgs),
}

#[derive(Debug, Args)]
pub struct DeclarationArgs {
    /// Declaration file (`{"resource_type": ..., "attributes": {...}}`)
    #[arg(long, short = 'c')]
    pub config: PathBuf,
}

#[derive(Debug, Args)]
pub struct StateArgs {
    #[arg(long, short = 's')]
    pub state: PathBuf,
}

#[derive(Debug, Args)]
pub struct StatefulArgs {
    #[command(flatten)]
    pub declaration: DeclarationArgs,
    #[command(flatten)]
    pub state: StateArgs,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub stateful: StatefulArgs,
    /// Diff against the state file without reading the remote endpoint
    #[arg(long)]
    pub no_refresh: bool,
    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Resource type, e.g. `azuredevops_serviceendpoint_nuget`
    #[arg(long)]
    pub resource_type: String,
    /// `<project_id>/<endpoint_id>`
    #[arg(long)]
    pub id: String,
    #[command(flatten)]
    pub state: StateArgs,
}

#[derive(Serialize)]
struct ValidationReport<'a> {
    resource_type: &'a str,
    valid: bool,
    diagnostics: &'a [Diagnostic],
}

/// Execute `command`, returning what should be printed on stdout.
pub async fn run(command: Command, config: &AppConfig) -> Result<String> {
    let registry = Registry::with_defaults(config.schema_generation);

    match command {
        Command::Validate(args) => {
            let declaration = read_declaration(&args.config)?;
            let resource = registry.get(&declaration.resource_type)?;
            let diagnostics = match validate(resource.as_ref(), &declaration.to_data()) {
                Ok(()) => Vec::new(),
                Err(err) => err.diagnostics().to_vec(),
            };
            let report = ValidationReport {
                resource_type: resource.type_name(),
                valid: diagnostics.is_empty(),
                diagnostics: &diagnostics,
            };
            let rendered = serde_json::to_string_pretty(&report)?;
            if diagnostics.is_empty() {
                Ok(rendered)
            } else {
                bail!("{rendered}")
            }
        }
        Command::Plan(args) => {
            let declaration = read_declaration(&args.stateful.declaration.config)?;
            let resource = registry.get(&declaration.resource_type)?;
            let prior = read_state(&args.stateful.state.state, resource.as_ref())?;
            let config_data = declaration.to_data();

            let plan = if args.no_refresh {
                validate(resource.as_ref(), &config_data)?;
                plan::diff(&resource.schema(), prior.as_ref(), &config_data)
            } else {
                let lifecycle = connect(config, resource)?;
                let refreshed = match prior {
                    Some(prior) => lifecycle.read(&prior).await?,
                    None => None,
                };
                lifecycle.plan(refreshed.as_ref(), &config_data)?
            };

            if args.json {
                Ok(serde_json::to_string_pretty(&plan)?)
            } else {
                Ok(plan.to_string())
            }
        }
        Command::Apply(args) => {
            let declaration = read_declaration(&args.declaration.config)?;
            let resource = registry.get(&declaration.resource_type)?;
            let prior = read_state(&args.state.state, resource.as_ref())?;
            let lifecycle = connect(config, resource.clone())?;

            let refreshed = match prior {
                Some(prior) => lifecycle.read(&prior).await?,
                None => None,
            };
            let (plan, state) = lifecycle
                .apply(refreshed.as_ref(), &declaration.to_data())
                .await?;
            write_state(&args.state.state, resource.as_ref(), Some(&state))?;
            info!(action = %plan.action, state = %args.state.state.display(), "apply finished");
            Ok(plan.to_string())
        }
        Command::Destroy(args) => {
            let resource_type = peek_resource_type(&args.state)?;
            let Some(resource_type) = resource_type else {
                return Ok("nothing to destroy".to_string());
            };
            let resource = registry.get(&resource_type)?;
            let Some(state) = read_state(&args.state, resource.as_ref())? else {
                return Ok("nothing to destroy".to_string());
            };
            let lifecycle = connect(config, resource.clone())?;
            lifecycle.delete(&state).await?;
            write_state(&args.state, resource.as_ref(), None)?;
            Ok(format!(
                "destroyed {} {}",
                resource.type_name(),
                state.id().unwrap_or_default()
            ))
        }
        Command::Import(args) => {
            let resource = registry.get(&args.resource_type)?;
            if read_state(&args.state.state, resource.as_ref())?.is_some() {
                bail!(
                    "state file {} already tracks a resource; remove it before importing",
                    args.state.state.display()
                );
            }
            let lifecycle = connect(config, resource.clone())?;
            let state = lifecycle.import(&args.id).await?;
            write_state(&args.state.state, resource.as_ref(), Some(&state))?;
            Ok(format!(
                "imported {} {}",
                resource.type_name(),
                state.id().unwrap_or_default()
            ))
        }
    }
}

fn connect(
    config: &AppConfig,
    resource: Arc<dyn ServiceEndpointResource>,
) -> Result<ServiceEndpointLifecycle> {
    let remote = config.remote()?;
    let client = HttpServiceEndpointClient::from_settings(&remote)
        .context("building service endpoint client")?;
    Ok(ServiceEndpointLifecycle::new(Arc::new(client), resource))
}

fn read_declaration(path: &Path) -> Result<Declaration> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading declaration {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing declaration {}", path.display()))
}

fn read_state_file(path: &Path) -> Result<Option<ResourceState>> {
    match fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => Ok(Some(
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing state {}", path.display()))?,
        )),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading state {}", path.display())),
    }
}

fn peek_resource_type(path: &Path) -> Result<Option<String>> {
    Ok(read_state_file(path)?.map(|state| state.resource_type))
}

/// Load a state file and upgrade it to the resource's current schema.
pub fn read_state(
    path: &Path,
    resource: &dyn ServiceEndpointResource,
) -> Result<Option<ResourceData>> {
    let Some(mut state) = read_state_file(path)? else {
        return Ok(None);
    };
    if state.resource_type != resource.type_name() {
        bail!(
            "state file {} tracks {}, not {}",
            path.display(),
            state.resource_type,
            resource.type_name()
        );
    }
    state.attributes = resource.upgrade_state(state.schema_version, state.attributes)?;
    Ok(Some(state.into_data()))
}

/// Persist `data`, or remove the state file when the resource is gone.
pub fn write_state(
    path: &Path,
    resource: &dyn ServiceEndpointResource,
    data: Option<&ResourceData>,
) -> Result<()> {
    match data {
        Some(data) => {
            let state =
                ResourceState::from_data(resource.type_name(), resource.schema().version, data)?;
            let rendered = serde_json::to_string_pretty(&state)?;
            fs::write(path, rendered)
                .with_context(|| format!("writing state {}", path.display()))
        }
        None => match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("removing state {}", path.display())),
        },
    }
}
