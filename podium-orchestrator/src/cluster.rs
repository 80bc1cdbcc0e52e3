//! Clustered variant: workspaces as Swarm services.
//!
//! On a cluster the single-host container path does not work: a task can land
//! on any node, so the workspace volume must come from shared NFS storage and
//! the reverse-proxy labels live on the service object instead of the
//! container. Metadata handling is otherwise identical, the service's label
//! set is the record and the same codec reads it.

use std::collections::HashMap;

use bollard::models::{
    Limit, Mount, MountType, NetworkAttachmentConfig, ServiceSpec, ServiceSpecMode,
    ServiceSpecModeReplicated, TaskSpec, TaskSpecContainerSpec, TaskSpecPlacement,
    TaskSpecResources, TaskState,
};
use chrono::Utc;
use futures_util::Stream;
use tracing::{info, instrument};

use podium_core::error::{PodiumError, Result};
use podium_core::identity::Identity;
use podium_runtime::{line_events, LogLine, Runtime, RuntimeClient};

use crate::config::OrchestratorConfig;
use crate::lifecycle::InitOptions;
use crate::workspace::{Preset, ResourceLimits, RunState, Workspace, WorkspaceKey, WorkspaceMeta};
use crate::{labels, routes};

pub struct ClusterController<R: Runtime = RuntimeClient> {
    runtime: R,
    config: OrchestratorConfig,
}

impl<R: Runtime> ClusterController<R> {
    pub fn new(runtime: R, config: OrchestratorConfig) -> Self {
        Self { runtime, config }
    }

    /// Every clustered operation starts here: without an active Swarm the
    /// whole variant is unavailable, not broken.
    async fn require_swarm(&self) -> Result<()> {
        if self.runtime.swarm_active().await {
            Ok(())
        } else {
            Err(PodiumError::RuntimeUnavailable(
                "This node is not part of an active cluster".into(),
            ))
        }
    }

    fn key_for(&self, identity: &Identity, project: &str) -> Result<WorkspaceKey> {
        WorkspaceKey::new(identity.owner_key(), project)
    }

    async fn fetch_owned(
        &self,
        identity: &Identity,
        key: &WorkspaceKey,
    ) -> Result<(WorkspaceMeta, u64, ServiceSpec)> {
        let service = self
            .runtime
            .inspect_service(&key.object_name())
            .await?
            .ok_or_else(|| {
                PodiumError::NotFound(format!("Workspace '{}' does not exist", key.project))
            })?;

        let spec = service.spec.clone().ok_or_else(|| {
            PodiumError::Internal(format!("Service '{}' has no spec", key.object_name()))
        })?;
        let label_map = spec.labels.clone().unwrap_or_default();
        let meta = labels::decode(&label_map).ok_or_else(|| {
            PodiumError::NotFound(format!("Workspace '{}' does not exist", key.project))
        })?;
        if meta.owner != identity.owner_key() && !identity.has_role("admin") {
            return Err(PodiumError::Forbidden(
                "You do not own this workspace".into(),
            ));
        }
        let version = service.version.and_then(|v| v.index).ok_or_else(|| {
            PodiumError::Internal(format!("Service '{}' has no version", key.object_name()))
        })?;
        Ok((meta, version, spec))
    }

    /// The service is up when at least one of its tasks is running;
    /// otherwise it is still scheduling, rescheduling, or has exited.
    async fn run_state(&self, name: &str) -> Result<RunState> {
        let tasks = self.runtime.list_service_tasks(name).await?;
        let running = tasks.iter().any(|task| {
            matches!(
                task.status.as_ref().and_then(|s| s.state),
                Some(TaskState::RUNNING)
            )
        });
        Ok(if running {
            RunState::Running
        } else {
            RunState::Stopped
        })
    }

    fn build_spec(&self, meta: &WorkspaceMeta) -> ServiceSpec {
        let key = meta.key();

        let mut label_map: HashMap<String, String> = labels::encode(meta);
        label_map.extend(routes::render(&key, &meta.routes, &self.config));
        // The cluster provider reads labels off the service, where the
        // network reference names the overlay network.
        label_map.insert(
            "traefik.docker.network".to_string(),
            self.config.cluster_network.clone(),
        );

        let placement = if self.config.gpu_placement && meta.preset == Preset::Notebook {
            Some(TaskSpecPlacement {
                constraints: Some(vec!["node.labels.gpu==true".to_string()]),
                ..Default::default()
            })
        } else {
            None
        };

        ServiceSpec {
            name: Some(key.object_name()),
            labels: Some(label_map),
            mode: Some(ServiceSpecMode {
                replicated: Some(ServiceSpecModeReplicated { replicas: Some(1) }),
                ..Default::default()
            }),
            task_template: Some(TaskSpec {
                container_spec: Some(TaskSpecContainerSpec {
                    image: Some(meta.preset.image(&self.config).to_string()),
                    command: meta.preset.command(&key, meta.deployment.as_ref()),
                    mounts: Some(vec![Mount {
                        target: Some(meta.preset.mount_target().to_string()),
                        source: Some(key.volume_name()),
                        typ: Some(MountType::VOLUME),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
                resources: Some(TaskSpecResources {
                    limits: Some(Limit {
                        nano_cpus: Some(meta.limits.cpu_nanos),
                        memory_bytes: Some(meta.limits.mem_bytes),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                placement,
                networks: Some(vec![NetworkAttachmentConfig {
                    target: Some(self.config.cluster_network.clone()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Create a clustered workspace. Git-deployed presets are not offered on
    /// the cluster; the deployment helper would race the scheduler for the
    /// shared volume.
    #[instrument(skip(self, identity, options), fields(owner = %identity.owner_key(), project = %options.project))]
    pub async fn init(&self, identity: &Identity, options: InitOptions) -> Result<Workspace> {
        self.require_swarm().await?;
        if let Preset::GitDeployed { .. } = options.preset {
            return Err(PodiumError::InvalidArgument(
                "Git-deployed workspaces are not available in clustered mode".into(),
            ));
        }
        let key = self.key_for(identity, &options.project)?;

        if self
            .runtime
            .inspect_service(&key.object_name())
            .await?
            .is_some()
        {
            let (meta, _, _) = self.fetch_owned(identity, &key).await?;
            let run_state = self.run_state(&key.object_name()).await?;
            return Ok(Workspace::from_meta(meta, run_state, &self.config));
        }

        let limits = ResourceLimits::from_request(options.cpus, options.mem_mb)?;

        let device = format!("{}/{}", self.config.nfs_export, key.volume_name());
        self.runtime
            .ensure_nfs_volume(
                &key.volume_name(),
                &self.config.nfs_server,
                &device,
                HashMap::new(),
            )
            .await?;

        let meta = WorkspaceMeta {
            owner: identity.owner_key(),
            owner_email: identity.email.clone(),
            project: options.project.clone(),
            preset: options.preset,
            created_at: Utc::now(),
            limits,
            routes: options.preset.default_routes(),
            deployment: None,
        };
        self.runtime.create_service(self.build_spec(&meta)).await?;
        info!(service = %key.object_name(), "clustered workspace created");
        Ok(Workspace::from_meta(meta, RunState::Running, &self.config))
    }

    pub async fn get(&self, identity: &Identity, project: &str) -> Result<Workspace> {
        self.require_swarm().await?;
        let key = self.key_for(identity, project)?;
        let (meta, _, _) = self.fetch_owned(identity, &key).await?;
        let run_state = self.run_state(&key.object_name()).await?;
        Ok(Workspace::from_meta(meta, run_state, &self.config))
    }

    pub async fn list_mine(&self, identity: &Identity) -> Result<Vec<Workspace>> {
        self.require_swarm().await?;
        let owner = identity.owner_key();
        let services = self
            .runtime
            .list_services_by_label(&[
                (labels::MANAGED_BY, labels::MANAGER),
                (labels::OWNER, &owner),
            ])
            .await?;

        let mut out = Vec::with_capacity(services.len());
        for service in services {
            let label_map = service
                .spec
                .and_then(|s| s.labels)
                .unwrap_or_default();
            let Some(meta) = labels::decode(&label_map) else {
                continue;
            };
            let run_state = self.run_state(&meta.key().object_name()).await?;
            out.push(Workspace::from_meta(meta, run_state, &self.config));
        }
        out.sort_by(|a, b| a.project.cmp(&b.project));
        Ok(out)
    }

    /// Roll the service's single task onto a fresh container.
    #[instrument(skip(self, identity), fields(owner = %identity.owner_key()))]
    pub async fn restart(&self, identity: &Identity, project: &str) -> Result<Workspace> {
        self.require_swarm().await?;
        let key = self.key_for(identity, project)?;
        let (meta, version, mut spec) = self.fetch_owned(identity, &key).await?;

        if let Some(task) = spec.task_template.as_mut() {
            task.force_update = Some(task.force_update.unwrap_or(0) + 1);
        }
        self.runtime
            .update_service(&key.object_name(), version, spec)
            .await?;
        Ok(Workspace::from_meta(meta, RunState::Running, &self.config))
    }

    /// Remove the service and its shared volume. Absent workspaces destroy
    /// successfully.
    #[instrument(skip(self, identity), fields(owner = %identity.owner_key()))]
    pub async fn destroy(&self, identity: &Identity, project: &str) -> Result<()> {
        self.require_swarm().await?;
        let key = self.key_for(identity, project)?;
        match self.fetch_owned(identity, &key).await {
            Ok(_) => {}
            Err(PodiumError::NotFound(_)) => {
                self.runtime.remove_volume(&key.volume_name()).await?;
                return Ok(());
            }
            Err(err) => return Err(err),
        }
        self.runtime.remove_service(&key.object_name()).await?;
        self.runtime.remove_volume(&key.volume_name()).await?;
        info!(service = %key.object_name(), "clustered workspace destroyed");
        Ok(())
    }

    /// Stream aggregated task logs as structured line events.
    pub async fn stream_logs(
        &self,
        identity: &Identity,
        project: &str,
        follow: bool,
        tail: Option<u32>,
    ) -> Result<impl Stream<Item = LogLine>> {
        self.require_swarm().await?;
        let key = self.key_for(identity, project)?;
        self.fetch_owned(identity, &key).await?;
        let chunks = self.runtime.service_logs(&key.object_name(), follow, tail);
        Ok(line_events(chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use podium_runtime::MockRuntime;

    fn controller(gpu: bool) -> ClusterController<MockRuntime> {
        let mut config = OrchestratorConfig::default();
        config.gpu_placement = gpu;
        ClusterController::new(MockRuntime::with_swarm(), config)
    }

    fn identity() -> Identity {
        Identity {
            subject: "alice".into(),
            email: "alice@example.edu".into(),
            roles: vec![],
            groups: vec![],
        }
    }

    fn meta() -> WorkspaceMeta {
        WorkspaceMeta {
            owner: "alice".into(),
            owner_email: "alice@example.edu".into(),
            project: "proj1".into(),
            preset: Preset::Notebook,
            created_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
            limits: ResourceLimits::default(),
            routes: Preset::Notebook.default_routes(),
            deployment: None,
        }
    }

    #[test]
    fn spec_carries_labels_limits_and_network() {
        let spec = controller(false).build_spec(&meta());
        assert_eq!(spec.name.as_deref(), Some("workspace-alice-proj1"));

        let label_map = spec.labels.unwrap();
        assert_eq!(
            label_map.get(labels::MANAGED_BY).map(String::as_str),
            Some(labels::MANAGER)
        );
        assert!(label_map.contains_key(
            "traefik.http.routers.workspace-alice-proj1-notebook.rule"
        ));

        let task = spec.task_template.unwrap();
        let limits = task.resources.unwrap().limits.unwrap();
        assert_eq!(limits.nano_cpus, Some(2_000_000_000));
        assert!(task.placement.is_none());
        assert_eq!(
            task.networks.unwrap()[0].target.as_deref(),
            Some("podium_cluster")
        );
    }

    #[test]
    fn gpu_placement_constrains_notebooks() {
        let spec = controller(true).build_spec(&meta());
        let placement = spec.task_template.unwrap().placement.unwrap();
        assert_eq!(
            placement.constraints.unwrap(),
            vec!["node.labels.gpu==true".to_string()]
        );
    }

    #[tokio::test]
    async fn run_state_follows_the_service_tasks() {
        let mock = MockRuntime::with_swarm();
        let controller = ClusterController::new(mock.clone(), OrchestratorConfig::default());
        let identity = identity();

        let options = InitOptions {
            project: "proj1".into(),
            preset: Preset::Notebook,
            cpus: None,
            mem_mb: None,
            deployment: None,
        };
        let ws = controller.init(&identity, options).await.unwrap();
        assert_eq!(ws.run_state, RunState::Running);

        mock.set_service_task_states("workspace-alice-proj1", vec![TaskState::PENDING]);
        let ws = controller.get(&identity, "proj1").await.unwrap();
        assert_eq!(ws.run_state, RunState::Stopped);

        mock.set_service_task_states(
            "workspace-alice-proj1",
            vec![TaskState::SHUTDOWN, TaskState::RUNNING],
        );
        let listed = controller.list_mine(&identity).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].run_state, RunState::Running);
    }

    #[tokio::test]
    async fn inactive_swarm_is_reported_as_unavailable() {
        let controller = ClusterController::new(MockRuntime::new(), OrchestratorConfig::default());
        let err = controller.get(&identity(), "proj1").await.unwrap_err();
        assert!(matches!(err, PodiumError::RuntimeUnavailable(_)));
    }
}
