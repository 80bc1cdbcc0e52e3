//! Workspace lifecycle: create, start, stop, mutate, wipe, destroy.
//!
//! Container labels are immutable after creation, so every metadata change
//! (route table edits, recorded deployments) goes through destructive
//! recreation: stop, remove, create the same container under the same name
//! with the new label set, and restore the previous run state. The data
//! volume outlives the container, so recreation never loses user files.

use std::collections::HashMap;

use bollard::models::{
    ContainerCreateBody, ContainerSummaryStateEnum, HostConfig, Mount, MountType,
    RestartPolicy, RestartPolicyNameEnum,
};
use chrono::Utc;
use futures_util::Stream;
use tracing::{info, instrument};

use podium_core::error::{PodiumError, Result};
use podium_core::identity::Identity;
use podium_runtime::{line_events, ExecSession, LogLine, Runtime, RuntimeClient};

use crate::config::OrchestratorConfig;
use crate::workspace::{
    DeploymentSource, Preset, ResourceLimits, Route, RunState, Workspace, WorkspaceKey,
    WorkspaceMeta,
};
use crate::{deploy, labels, routes};

/// Parameters for creating a workspace.
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub project: String,
    pub preset: Preset,
    pub cpus: Option<f64>,
    pub mem_mb: Option<u64>,
    pub deployment: Option<DeploymentSource>,
}

pub struct WorkspaceEngine<R: Runtime = RuntimeClient> {
    runtime: R,
    config: OrchestratorConfig,
}

impl<R: Runtime> WorkspaceEngine<R> {
    pub fn new(runtime: R, config: OrchestratorConfig) -> Self {
        Self { runtime, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn key_for(&self, identity: &Identity, project: &str) -> Result<WorkspaceKey> {
        WorkspaceKey::new(identity.owner_key(), project)
    }

    /// Load a workspace's metadata plus its current run state and the raw
    /// label map, enforcing ownership. Admins may act on any workspace.
    async fn fetch_owned(
        &self,
        identity: &Identity,
        key: &WorkspaceKey,
    ) -> Result<(WorkspaceMeta, RunState, HashMap<String, String>)> {
        let name = key.object_name();
        let info = self
            .runtime
            .inspect_container(&name)
            .await?
            .ok_or_else(|| PodiumError::NotFound(format!("Workspace '{}' does not exist", key.project)))?;

        let label_map = info
            .config
            .as_ref()
            .and_then(|c| c.labels.clone())
            .unwrap_or_default();
        let meta = labels::decode(&label_map).ok_or_else(|| {
            PodiumError::NotFound(format!("Workspace '{}' does not exist", key.project))
        })?;

        if meta.owner != identity.owner_key() && !identity.has_role("admin") {
            return Err(PodiumError::Forbidden(
                "You do not own this workspace".into(),
            ));
        }

        let running = info
            .state
            .as_ref()
            .and_then(|s| s.running)
            .unwrap_or(false);
        let run_state = if running {
            RunState::Running
        } else {
            RunState::Stopped
        };
        Ok((meta, run_state, label_map))
    }

    // --- creation ---------------------------------------------------------

    /// Create a workspace. Calling init again for an existing workspace of
    /// the same owner returns its current state unchanged.
    #[instrument(skip(self, identity, options), fields(owner = %identity.owner_key(), project = %options.project))]
    pub async fn init(&self, identity: &Identity, options: InitOptions) -> Result<Workspace> {
        let key = self.key_for(identity, &options.project)?;
        let name = key.object_name();

        if let Some(info) = self.runtime.inspect_container(&name).await? {
            let label_map = info
                .config
                .as_ref()
                .and_then(|c| c.labels.clone())
                .unwrap_or_default();
            return match labels::decode(&label_map) {
                Some(meta) if meta.owner == identity.owner_key() => {
                    let (meta, run_state, _) = self.fetch_owned(identity, &key).await?;
                    Ok(Workspace::from_meta(meta, run_state, &self.config))
                }
                _ => Err(PodiumError::Conflict(format!(
                    "Container name '{}' is already taken",
                    name
                ))),
            };
        }

        if let Preset::GitDeployed { .. } = options.preset {
            if options.deployment.as_ref().map_or(true, |d| d.repo_url.is_empty()) {
                return Err(PodiumError::InvalidArgument(
                    "A repository URL is required for git-deployed workspaces".into(),
                ));
            }
        }
        let limits = ResourceLimits::from_request(options.cpus, options.mem_mb)?;

        self.runtime
            .ensure_image(options.preset.image(&self.config))
            .await?;
        self.runtime.ensure_network(&self.config.main_network).await?;
        self.runtime.ensure_network(&key.owner_network()).await?;
        self.runtime
            .ensure_volume(&key.volume_name(), volume_labels(&key, identity))
            .await?;

        let mut deployment = options.deployment.clone();
        if let Preset::GitDeployed { .. } = options.preset {
            let source = deployment.as_mut().ok_or_else(|| {
                PodiumError::InvalidArgument(
                    "A repository URL is required for git-deployed workspaces".into(),
                )
            })?;
            let commit = deploy::clone_repo(&self.runtime, &self.config, &key, source).await?;
            source.last_commit = Some(commit);
        }

        let meta = WorkspaceMeta {
            owner: identity.owner_key(),
            owner_email: identity.email.clone(),
            project: options.project.clone(),
            preset: options.preset,
            created_at: Utc::now(),
            limits,
            routes: options.preset.default_routes(),
            deployment,
        };

        match self.create_container(&meta, HashMap::new()).await {
            Ok(()) => {}
            // Lost a creation race; the winner's workspace is the result.
            Err(PodiumError::Conflict(_)) => {
                let (meta, run_state, _) = self.fetch_owned(identity, &key).await?;
                return Ok(Workspace::from_meta(meta, run_state, &self.config));
            }
            Err(err) => return Err(err),
        }
        self.runtime.start_container(&name).await?;

        info!(container = %name, "workspace created");
        Ok(Workspace::from_meta(meta, RunState::Running, &self.config))
    }

    /// Create the container described by `meta` without starting it,
    /// layering the metadata and reverse-proxy labels over any `extra`
    /// labels carried forward from a predecessor.
    async fn create_container(
        &self,
        meta: &WorkspaceMeta,
        extra: HashMap<String, String>,
    ) -> Result<()> {
        let key = meta.key();
        let name = key.object_name();

        let mut label_map = extra;
        label_map.extend(labels::encode(meta));
        label_map.extend(routes::render(&key, &meta.routes, &self.config));

        let config = ContainerCreateBody {
            image: Some(meta.preset.image(&self.config).to_string()),
            cmd: meta.preset.command(&key, meta.deployment.as_ref()),
            labels: Some(label_map),
            host_config: Some(HostConfig {
                nano_cpus: Some(meta.limits.cpu_nanos),
                memory: Some(meta.limits.mem_bytes),
                network_mode: Some(self.config.main_network.clone()),
                restart_policy: Some(RestartPolicy {
                    name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                    ..Default::default()
                }),
                mounts: Some(vec![Mount {
                    target: Some(meta.preset.mount_target().to_string()),
                    source: Some(key.volume_name()),
                    typ: Some(MountType::VOLUME),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        self.runtime.create_container(&name, config).await?;
        self.runtime
            .connect_network(&key.owner_network(), &name)
            .await?;
        Ok(())
    }

    /// Replace a workspace's container with one carrying fresh metadata.
    /// Labels not written by this orchestrator survive; the replacement is
    /// only started if the previous container was running, so mutating a
    /// stopped workspace never wakes it up.
    async fn recreate(
        &self,
        meta: &WorkspaceMeta,
        run_state: RunState,
        previous_labels: HashMap<String, String>,
    ) -> Result<()> {
        let key = meta.key();
        let name = key.object_name();

        let mut carried = previous_labels;
        labels::strip_managed(&mut carried);
        routes::strip_rendered(&mut carried, &key);

        self.runtime
            .stop_container(&name, self.config.stop_timeout_secs)
            .await?;
        self.runtime.remove_container(&name, false).await?;
        self.create_container(meta, carried).await?;
        if run_state == RunState::Running {
            self.runtime.start_container(&name).await?;
        }
        Ok(())
    }

    // --- run state --------------------------------------------------------

    pub async fn start(&self, identity: &Identity, project: &str) -> Result<Workspace> {
        let key = self.key_for(identity, project)?;
        let (meta, run_state, _) = self.fetch_owned(identity, &key).await?;
        if run_state != RunState::Running {
            self.runtime.start_container(&key.object_name()).await?;
        }
        Ok(Workspace::from_meta(meta, RunState::Running, &self.config))
    }

    pub async fn stop(&self, identity: &Identity, project: &str) -> Result<Workspace> {
        let key = self.key_for(identity, project)?;
        let (meta, _, _) = self.fetch_owned(identity, &key).await?;
        self.runtime
            .stop_container(&key.object_name(), self.config.stop_timeout_secs)
            .await?;
        Ok(Workspace::from_meta(meta, RunState::Stopped, &self.config))
    }

    pub async fn restart(&self, identity: &Identity, project: &str) -> Result<Workspace> {
        let key = self.key_for(identity, project)?;
        let (meta, _, _) = self.fetch_owned(identity, &key).await?;
        self.runtime.restart_container(&key.object_name()).await?;
        Ok(Workspace::from_meta(meta, RunState::Running, &self.config))
    }

    // --- reads ------------------------------------------------------------

    pub async fn get(&self, identity: &Identity, project: &str) -> Result<Workspace> {
        let key = self.key_for(identity, project)?;
        let (meta, run_state, _) = self.fetch_owned(identity, &key).await?;
        Ok(Workspace::from_meta(meta, run_state, &self.config))
    }

    /// All workspaces of the calling owner, whatever their run state.
    pub async fn list_mine(&self, identity: &Identity) -> Result<Vec<Workspace>> {
        let owner = identity.owner_key();
        let summaries = self
            .runtime
            .list_containers_by_label(&[
                (labels::MANAGED_BY, labels::MANAGER),
                (labels::OWNER, &owner),
            ])
            .await?;

        let mut out = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let label_map = summary.labels.unwrap_or_default();
            let Some(meta) = labels::decode(&label_map) else {
                continue;
            };
            let run_state = match summary.state {
                Some(ContainerSummaryStateEnum::RUNNING) => RunState::Running,
                _ => RunState::Stopped,
            };
            out.push(Workspace::from_meta(meta, run_state, &self.config));
        }
        out.sort_by(|a, b| a.project.cmp(&b.project));
        Ok(out)
    }

    // --- routes -----------------------------------------------------------

    #[instrument(skip(self, identity), fields(owner = %identity.owner_key()))]
    pub async fn add_route(
        &self,
        identity: &Identity,
        project: &str,
        route: Route,
    ) -> Result<Workspace> {
        let key = self.key_for(identity, project)?;
        let (mut meta, run_state, previous) = self.fetch_owned(identity, &key).await?;
        routes::add_route(&mut meta.routes, route)?;
        self.recreate(&meta, run_state, previous).await?;
        Ok(Workspace::from_meta(meta, run_state, &self.config))
    }

    #[instrument(skip(self, identity), fields(owner = %identity.owner_key()))]
    pub async fn remove_route(
        &self,
        identity: &Identity,
        project: &str,
        endpoint: &str,
    ) -> Result<Workspace> {
        let key = self.key_for(identity, project)?;
        let (mut meta, run_state, previous) = self.fetch_owned(identity, &key).await?;
        routes::remove_route(&mut meta.routes, endpoint)?;
        self.recreate(&meta, run_state, previous).await?;
        Ok(Workspace::from_meta(meta, run_state, &self.config))
    }

    // --- deployment -------------------------------------------------------

    /// Pull the latest commit of a git-deployed workspace and restart it on
    /// the new code. The recorded commit only advances when the pull
    /// succeeds end to end.
    #[instrument(skip(self, identity), fields(owner = %identity.owner_key()))]
    pub async fn redeploy(&self, identity: &Identity, project: &str) -> Result<Workspace> {
        let key = self.key_for(identity, project)?;
        let (mut meta, _, previous) = self.fetch_owned(identity, &key).await?;
        let Some(source) = meta.deployment.clone() else {
            return Err(PodiumError::InvalidArgument(format!(
                "Workspace '{}' is not deployed from a repository",
                project
            )));
        };

        let commit = deploy::pull_repo(&self.runtime, &self.config, &key, &source).await?;
        if meta.deployment.as_ref().and_then(|d| d.last_commit.as_deref()) == Some(commit.as_str())
        {
            // Nothing new; restart anyway so a crashed app comes back.
            self.runtime.restart_container(&key.object_name()).await?;
            return Ok(Workspace::from_meta(meta, RunState::Running, &self.config));
        }

        if let Some(deployment) = meta.deployment.as_mut() {
            deployment.last_commit = Some(commit);
        }
        self.recreate(&meta, RunState::Running, previous).await?;
        info!(container = %key.object_name(), "workspace redeployed");
        Ok(Workspace::from_meta(meta, RunState::Running, &self.config))
    }

    // --- wipe and destroy -------------------------------------------------

    /// Reset a workspace to a pristine state: the container and its volume
    /// are destroyed and rebuilt from the recorded metadata. Git-deployed
    /// workspaces are cloned again.
    #[instrument(skip(self, identity), fields(owner = %identity.owner_key()))]
    pub async fn wipe(&self, identity: &Identity, project: &str) -> Result<Workspace> {
        let key = self.key_for(identity, project)?;
        let (mut meta, run_state, previous) = match self.fetch_owned(identity, &key).await {
            Ok(found) => found,
            Err(err @ PodiumError::NotFound(_)) => {
                // Container already gone (e.g. an interrupted destroy).
                // Clean up the leftover volume so a fresh init starts empty,
                // then report the workspace as missing.
                self.runtime.remove_volume(&key.volume_name()).await?;
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        let name = key.object_name();

        self.runtime
            .stop_container(&name, self.config.stop_timeout_secs)
            .await?;
        self.runtime.remove_container(&name, false).await?;
        self.runtime.remove_volume(&key.volume_name()).await?;
        self.runtime
            .ensure_volume(&key.volume_name(), volume_labels(&key, identity))
            .await?;

        if let Some(source) = meta.deployment.as_mut() {
            let commit = deploy::clone_repo(&self.runtime, &self.config, &key, source).await?;
            source.last_commit = Some(commit);
        }

        let mut carried = previous;
        labels::strip_managed(&mut carried);
        routes::strip_rendered(&mut carried, &key);
        self.create_container(&meta, carried).await?;
        if run_state == RunState::Running {
            self.runtime.start_container(&name).await?;
        }
        info!(container = %name, "workspace wiped");
        Ok(Workspace::from_meta(meta, run_state, &self.config))
    }

    /// Remove a workspace and everything attached to it. Destroying a
    /// workspace that does not exist is success.
    #[instrument(skip(self, identity), fields(owner = %identity.owner_key()))]
    pub async fn destroy(&self, identity: &Identity, project: &str) -> Result<()> {
        let key = self.key_for(identity, project)?;
        match self.fetch_owned(identity, &key).await {
            Ok(_) => {}
            Err(PodiumError::NotFound(_)) => {
                // Best effort on the volume in case a previous destroy was
                // interrupted between container and volume removal.
                self.runtime.remove_volume(&key.volume_name()).await?;
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        let name = key.object_name();
        self.runtime
            .stop_container(&name, self.config.stop_timeout_secs)
            .await?;
        self.runtime.remove_container(&name, false).await?;
        self.runtime.remove_volume(&key.volume_name()).await?;
        info!(container = %name, "workspace destroyed");
        Ok(())
    }

    // --- streaming --------------------------------------------------------

    /// Stream the workspace's logs as structured line events.
    pub async fn stream_logs(
        &self,
        identity: &Identity,
        project: &str,
        follow: bool,
        tail: Option<u32>,
    ) -> Result<impl Stream<Item = LogLine>> {
        let key = self.key_for(identity, project)?;
        self.fetch_owned(identity, &key).await?;
        let chunks = self
            .runtime
            .container_logs(&key.object_name(), follow, tail);
        Ok(line_events(chunks))
    }

    /// Open an interactive shell (or arbitrary command) inside the workspace.
    pub async fn shell(
        &self,
        identity: &Identity,
        project: &str,
        command: Option<Vec<String>>,
    ) -> Result<ExecSession> {
        let key = self.key_for(identity, project)?;
        let (_, run_state, _) = self.fetch_owned(identity, &key).await?;
        if run_state != RunState::Running {
            return Err(PodiumError::Conflict(format!(
                "Workspace '{}' is not running",
                project
            )));
        }
        let cmd = command.unwrap_or_else(|| vec!["/bin/sh".to_string()]);
        self.runtime
            .exec_interactive(&key.object_name(), cmd)
            .await
    }
}

fn volume_labels(key: &WorkspaceKey, identity: &Identity) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    labels.insert(labels::MANAGED_BY.to_string(), labels::MANAGER.to_string());
    labels.insert(labels::OWNER.to_string(), identity.owner_key());
    labels.insert(labels::PROJECT.to_string(), key.project.clone());
    labels
}
