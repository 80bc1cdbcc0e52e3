use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::models::{
    ContainerCreateBody, ContainerInspectResponse, ContainerSummary, NetworkConnectRequest,
    NetworkCreateRequest, Service, ServiceSpec, Task, VolumeCreateRequest,
};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, InspectNetworkOptions,
    InspectServiceOptions, ListContainersOptions, ListServicesOptions, ListTasksOptions,
    LogsOptions, RemoveContainerOptions, RemoveVolumeOptions, StartContainerOptions,
    StopContainerOptions, UpdateServiceOptions, WaitContainerOptions,
};
use bollard::Docker;
use futures_util::{Stream, StreamExt, TryStreamExt};
use tokio::io::AsyncWrite;
use tracing::{debug, warn};

use podium_core::error::{PodiumError, Result};

/// A boxed stream of raw demultiplexed log chunks.
pub type LogChunkStream =
    Pin<Box<dyn Stream<Item = std::result::Result<LogOutput, DockerError>> + Send>>;

/// An attached interactive exec session.
///
/// `output` carries the remote stdout/stderr, `input` feeds the remote stdin.
/// Dropping both ends closes the session.
pub struct ExecSession {
    pub id: String,
    pub output: LogChunkStream,
    pub input: Pin<Box<dyn AsyncWrite + Send>>,
}

/// The runtime surface the orchestration layer is written against.
///
/// [`RuntimeClient`] is the Docker Engine implementation; `MockRuntime`
/// provides an in-memory one for engine tests.
#[async_trait]
pub trait Runtime: Clone + Send + Sync + 'static {
    // --- containers -------------------------------------------------------

    /// Inspect a container by name. `None` when it does not exist.
    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerInspectResponse>>;

    /// Create a named container. An existing container under the same name
    /// is reported as `Conflict` so the caller can treat the race as
    /// "already exists".
    async fn create_container(&self, name: &str, config: ContainerCreateBody) -> Result<()>;

    async fn start_container(&self, name: &str) -> Result<()>;

    /// Stop a container. Stopping one that is already stopped, or already
    /// gone, is success.
    async fn stop_container(&self, name: &str, timeout_secs: i64) -> Result<()>;

    async fn restart_container(&self, name: &str) -> Result<()>;

    /// Force-remove a container. Removing a container that is already gone
    /// is success. `remove_volumes` detaches anonymous volumes as well.
    async fn remove_container(&self, name: &str, remove_volumes: bool) -> Result<()>;

    /// List containers (running or not) carrying all of the given labels.
    async fn list_containers_by_label(
        &self,
        labels: &[(&str, &str)],
    ) -> Result<Vec<ContainerSummary>>;

    /// Block until the container exits and return its exit code.
    async fn wait_container(&self, name: &str) -> Result<i64>;

    /// Stream container logs as raw demultiplexed chunks.
    fn container_logs(&self, name: &str, follow: bool, tail: Option<u32>) -> LogChunkStream;

    /// Create and attach an interactive exec session inside a container.
    async fn exec_interactive(&self, name: &str, cmd: Vec<String>) -> Result<ExecSession>;

    // --- volumes ----------------------------------------------------------

    /// Create the volume if it is missing; an existing volume is reused
    /// as-is.
    async fn ensure_volume(&self, name: &str, labels: HashMap<String, String>) -> Result<()>;

    /// Create an NFS-backed volume if missing (clustered variant).
    async fn ensure_nfs_volume(
        &self,
        name: &str,
        nfs_server: &str,
        device: &str,
        labels: HashMap<String, String>,
    ) -> Result<()>;

    /// Force-remove a volume; a missing volume is success.
    async fn remove_volume(&self, name: &str) -> Result<()>;

    // --- networks ---------------------------------------------------------

    /// Create an attachable bridge network if it is missing.
    async fn ensure_network(&self, name: &str) -> Result<()>;

    async fn connect_network(&self, network: &str, container: &str) -> Result<()>;

    // --- images -----------------------------------------------------------

    /// Pull the image only if it is not present locally.
    async fn ensure_image(&self, image: &str) -> Result<()>;

    // --- swarm services (clustered variant) -------------------------------

    async fn swarm_active(&self) -> bool;

    async fn create_service(&self, spec: ServiceSpec) -> Result<()>;

    async fn inspect_service(&self, name: &str) -> Result<Option<Service>>;

    async fn list_services_by_label(&self, labels: &[(&str, &str)]) -> Result<Vec<Service>>;

    async fn remove_service(&self, name: &str) -> Result<()>;

    /// Re-submit the service spec at the given version, typically with a
    /// bumped `force_update` counter to roll the tasks.
    async fn update_service(&self, name: &str, version: u64, spec: ServiceSpec) -> Result<()>;

    async fn list_service_tasks(&self, service: &str) -> Result<Vec<Task>>;

    fn service_logs(&self, name: &str, follow: bool, tail: Option<u32>) -> LogChunkStream;
}

/// Adapter over the Docker Engine API used by every orchestration path.
#[derive(Clone)]
pub struct RuntimeClient {
    docker: Docker,
}

fn is_not_found(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn is_conflict(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 409,
            ..
        }
    )
}

impl RuntimeClient {
    /// Connect using the platform defaults (unix socket or named pipe).
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(PodiumError::runtime)?;
        Ok(Self { docker })
    }

    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }

    async fn image_present(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(err) => Err(PodiumError::runtime(err)),
        }
    }

    /// Pull an image, draining progress events until completion.
    async fn pull_image(&self, image: &str) -> Result<()> {
        debug!(image, "pulling image");
        self.docker
            .create_image(
                Some(CreateImageOptions {
                    from_image: Some(image.to_string()),
                    ..Default::default()
                }),
                None,
                None,
            )
            .try_collect::<Vec<_>>()
            .await
            .map_err(PodiumError::runtime)?;
        Ok(())
    }
}

#[async_trait]
impl Runtime for RuntimeClient {
    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerInspectResponse>> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => Ok(Some(info)),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(PodiumError::runtime(err)),
        }
    }

    async fn create_container(&self, name: &str, config: ContainerCreateBody) -> Result<()> {
        let options = CreateContainerOptions {
            name: Some(name.to_string()),
            ..Default::default()
        };
        match self.docker.create_container(Some(options), config).await {
            Ok(_) => Ok(()),
            Err(err) if is_conflict(&err) => {
                Err(PodiumError::Conflict(format!("{} already exists", name)))
            }
            Err(err) => Err(PodiumError::runtime(err)),
        }
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        self.docker
            .start_container(name, None::<StartContainerOptions>)
            .await
            .map_err(PodiumError::runtime)
    }

    async fn stop_container(&self, name: &str, timeout_secs: i64) -> Result<()> {
        match self
            .docker
            .stop_container(
                name,
                Some(StopContainerOptions {
                    t: Some(timeout_secs as i32),
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            // Already stopped (304) or already gone (404): both are the
            // state the caller asked for.
            Err(DockerError::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(PodiumError::runtime(err)),
        }
    }

    async fn restart_container(&self, name: &str) -> Result<()> {
        self.docker
            .restart_container(name, None)
            .await
            .map_err(PodiumError::runtime)
    }

    async fn remove_container(&self, name: &str, remove_volumes: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: remove_volumes,
            link: false,
        };
        match self.docker.remove_container(name, Some(options)).await {
            Ok(()) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(PodiumError::runtime(err)),
        }
    }

    async fn list_containers_by_label(
        &self,
        labels: &[(&str, &str)],
    ) -> Result<Vec<ContainerSummary>> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        filters.insert(
            "label".to_string(),
            labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect(),
        );
        self.docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters: Some(filters),
                ..Default::default()
            }))
            .await
            .map_err(PodiumError::runtime)
    }

    async fn wait_container(&self, name: &str) -> Result<i64> {
        let mut wait = self
            .docker
            .wait_container(name, None::<WaitContainerOptions>);
        match wait.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard surfaces a non-zero exit as an error carrying the code.
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(err)) => Err(PodiumError::runtime(err)),
            None => Err(PodiumError::runtime("wait stream ended without a status")),
        }
    }

    fn container_logs(&self, name: &str, follow: bool, tail: Option<u32>) -> LogChunkStream {
        let options = LogsOptions {
            follow,
            stdout: true,
            stderr: true,
            tail: tail.map(|t| t.to_string()).unwrap_or_else(|| "all".into()),
            ..Default::default()
        };
        Box::pin(self.docker.logs(name, Some(options)))
    }

    async fn exec_interactive(&self, name: &str, cmd: Vec<String>) -> Result<ExecSession> {
        let exec = self
            .docker
            .create_exec(
                name,
                CreateExecOptions::<String> {
                    cmd: Some(cmd),
                    attach_stdin: Some(true),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    tty: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(PodiumError::runtime)?;

        match self
            .docker
            .start_exec(&exec.id, None::<StartExecOptions>)
            .await
            .map_err(PodiumError::runtime)?
        {
            StartExecResults::Attached { output, input } => Ok(ExecSession {
                id: exec.id,
                output,
                input,
            }),
            StartExecResults::Detached => {
                Err(PodiumError::runtime("exec session started detached"))
            }
        }
    }

    async fn ensure_volume(&self, name: &str, labels: HashMap<String, String>) -> Result<()> {
        if self.docker.inspect_volume(name).await.is_ok() {
            return Ok(());
        }
        debug!(volume = name, "creating volume");
        self.docker
            .create_volume(VolumeCreateRequest {
                name: Some(name.to_string()),
                labels: Some(labels),
                ..Default::default()
            })
            .await
            .map_err(PodiumError::runtime)?;
        Ok(())
    }

    async fn ensure_nfs_volume(
        &self,
        name: &str,
        nfs_server: &str,
        device: &str,
        labels: HashMap<String, String>,
    ) -> Result<()> {
        if self.docker.inspect_volume(name).await.is_ok() {
            return Ok(());
        }
        debug!(volume = name, nfs_server, "creating NFS volume");
        let mut driver_opts = HashMap::new();
        driver_opts.insert("type".to_string(), "nfs".to_string());
        driver_opts.insert("o".to_string(), format!("addr={},rw,nolock", nfs_server));
        driver_opts.insert("device".to_string(), format!(":{}", device));
        self.docker
            .create_volume(VolumeCreateRequest {
                name: Some(name.to_string()),
                driver: Some("local".to_string()),
                driver_opts: Some(driver_opts),
                labels: Some(labels),
                ..Default::default()
            })
            .await
            .map_err(PodiumError::runtime)?;
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        match self
            .docker
            .remove_volume(name, Some(RemoveVolumeOptions { force: true }))
            .await
        {
            Ok(()) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => {
                warn!(volume = name, error = %err, "failed to remove volume");
                Err(PodiumError::runtime(err))
            }
        }
    }

    async fn ensure_network(&self, name: &str) -> Result<()> {
        if self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions>)
            .await
            .is_ok()
        {
            return Ok(());
        }
        debug!(network = name, "creating network");
        self.docker
            .create_network(NetworkCreateRequest {
                name: name.to_string(),
                driver: Some("bridge".to_string()),
                attachable: Some(true),
                ..Default::default()
            })
            .await
            .map_err(PodiumError::runtime)?;
        Ok(())
    }

    async fn connect_network(&self, network: &str, container: &str) -> Result<()> {
        match self
            .docker
            .connect_network(
                network,
                NetworkConnectRequest {
                    container: container.to_string(),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(()) => Ok(()),
            // Already connected.
            Err(err) if is_conflict(&err) => Ok(()),
            Err(err) => Err(PodiumError::runtime(err)),
        }
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.image_present(image).await? {
            return Ok(());
        }
        self.pull_image(image).await
    }

    async fn swarm_active(&self) -> bool {
        self.docker.inspect_swarm().await.is_ok()
    }

    async fn create_service(&self, spec: ServiceSpec) -> Result<()> {
        self.docker
            .create_service(spec, None)
            .await
            .map_err(PodiumError::runtime)?;
        Ok(())
    }

    async fn inspect_service(&self, name: &str) -> Result<Option<Service>> {
        match self
            .docker
            .inspect_service(name, None::<InspectServiceOptions>)
            .await
        {
            Ok(service) => Ok(Some(service)),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(PodiumError::runtime(err)),
        }
    }

    async fn list_services_by_label(&self, labels: &[(&str, &str)]) -> Result<Vec<Service>> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        filters.insert(
            "label".to_string(),
            labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect(),
        );
        self.docker
            .list_services(Some(ListServicesOptions {
                filters: Some(filters),
                ..Default::default()
            }))
            .await
            .map_err(PodiumError::runtime)
    }

    async fn remove_service(&self, name: &str) -> Result<()> {
        match self.docker.delete_service(name).await {
            Ok(()) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(PodiumError::runtime(err)),
        }
    }

    async fn update_service(&self, name: &str, version: u64, spec: ServiceSpec) -> Result<()> {
        self.docker
            .update_service(
                name,
                spec,
                UpdateServiceOptions {
                    version: version as i32,
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(PodiumError::runtime)?;
        Ok(())
    }

    async fn list_service_tasks(&self, service: &str) -> Result<Vec<Task>> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        filters.insert("service".to_string(), vec![service.to_string()]);
        self.docker
            .list_tasks(Some(ListTasksOptions {
                filters: Some(filters),
            }))
            .await
            .map_err(PodiumError::runtime)
    }

    fn service_logs(&self, name: &str, follow: bool, tail: Option<u32>) -> LogChunkStream {
        let options = LogsOptions {
            follow,
            stdout: true,
            stderr: true,
            tail: tail.map(|t| t.to_string()).unwrap_or_else(|| "all".into()),
            ..Default::default()
        };
        Box::pin(self.docker.service_logs(name, Some(options)))
    }
}
