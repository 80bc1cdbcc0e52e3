//! In-memory [`Runtime`] used by engine tests.
//!
//! Containers, volumes, networks and services are plain maps; behavior
//! mirrors the Docker adapter's contract (create conflicts, idempotent
//! stop/remove, label filtering) without a daemon. Inspection helpers let
//! tests assert on state transitions the real engine would cause.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use bollard::container::LogOutput;
use bollard::models::{
    ContainerConfig, ContainerCreateBody, ContainerInspectResponse, ContainerState,
    ContainerSummary, ContainerSummaryStateEnum, ObjectVersion, Service, ServiceSpec, Task,
    TaskState, TaskStatus,
};
use futures_util::stream;

use podium_core::error::{PodiumError, Result};

use crate::client::{ExecSession, LogChunkStream, Runtime};

#[derive(Debug, Clone)]
struct MockContainer {
    labels: HashMap<String, String>,
    running: bool,
}

#[derive(Debug, Clone)]
struct MockService {
    spec: ServiceSpec,
    version: u64,
    task_states: Vec<TaskState>,
}

#[derive(Debug, Default)]
struct MockState {
    containers: HashMap<String, MockContainer>,
    volumes: HashSet<String>,
    removed_volumes: Vec<String>,
    networks: HashSet<String>,
    images: HashSet<String>,
    services: HashMap<String, MockService>,
    swarm_active: bool,
    start_events: Vec<String>,
    exit_code: i64,
    logs: HashMap<String, String>,
    default_logs: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MockRuntime {
    state: Arc<Mutex<MockState>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_swarm() -> Self {
        let mock = Self::default();
        mock.lock().swarm_active = true;
        mock
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- test setup -------------------------------------------------------

    pub fn insert_volume(&self, name: &str) {
        self.lock().volumes.insert(name.to_string());
    }

    /// Stdout every subsequently spawned container's logs will contain.
    pub fn set_default_logs(&self, stdout: &str) {
        self.lock().default_logs = Some(stdout.to_string());
    }

    pub fn set_container_logs(&self, name: &str, stdout: &str) {
        self.lock().logs.insert(name.to_string(), stdout.to_string());
    }

    pub fn set_exit_code(&self, code: i64) {
        self.lock().exit_code = code;
    }

    pub fn set_service_task_states(&self, name: &str, states: Vec<TaskState>) {
        if let Some(service) = self.lock().services.get_mut(name) {
            service.task_states = states;
        }
    }

    /// Register a container that is not managed by the orchestrator.
    pub fn insert_foreign_container(&self, name: &str, labels: HashMap<String, String>) {
        self.lock().containers.insert(
            name.to_string(),
            MockContainer {
                labels,
                running: true,
            },
        );
    }

    // --- test inspection --------------------------------------------------

    pub fn container_running(&self, name: &str) -> Option<bool> {
        self.lock().containers.get(name).map(|c| c.running)
    }

    pub fn container_labels(&self, name: &str) -> Option<HashMap<String, String>> {
        self.lock().containers.get(name).map(|c| c.labels.clone())
    }

    /// Number of times the named container has been started (including via
    /// restart).
    pub fn start_count(&self, name: &str) -> usize {
        self.lock()
            .start_events
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }

    pub fn has_volume(&self, name: &str) -> bool {
        self.lock().volumes.contains(name)
    }

    pub fn removed_volumes(&self) -> Vec<String> {
        self.lock().removed_volumes.clone()
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.lock().services.contains_key(name)
    }

    pub fn service_force_update(&self, name: &str) -> Option<u64> {
        self.lock()
            .services
            .get(name)
            .and_then(|s| s.spec.task_template.as_ref())
            .and_then(|t| t.force_update)
    }
}

fn log_stream(stdout: Option<String>) -> LogChunkStream {
    let chunks: Vec<std::result::Result<LogOutput, bollard::errors::Error>> = stdout
        .map(|text| {
            vec![Ok(LogOutput::StdOut {
                message: text.into_bytes().into(),
            })]
        })
        .unwrap_or_default();
    Box::pin(stream::iter(chunks))
}

#[async_trait::async_trait]
impl Runtime for MockRuntime {
    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerInspectResponse>> {
        Ok(self.lock().containers.get(name).map(|c| ContainerInspectResponse {
            name: Some(format!("/{}", name)),
            config: Some(ContainerConfig {
                labels: Some(c.labels.clone()),
                ..Default::default()
            }),
            state: Some(ContainerState {
                running: Some(c.running),
                ..Default::default()
            }),
            ..Default::default()
        }))
    }

    async fn create_container(&self, name: &str, config: ContainerCreateBody) -> Result<()> {
        let mut state = self.lock();
        if state.containers.contains_key(name) {
            return Err(PodiumError::Conflict(format!("{} already exists", name)));
        }
        state.containers.insert(
            name.to_string(),
            MockContainer {
                labels: config.labels.unwrap_or_default(),
                running: false,
            },
        );
        Ok(())
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        match state.containers.get_mut(name) {
            Some(container) => {
                container.running = true;
                state.start_events.push(name.to_string());
                Ok(())
            }
            None => Err(PodiumError::runtime(format!("no such container: {}", name))),
        }
    }

    async fn stop_container(&self, name: &str, _timeout_secs: i64) -> Result<()> {
        if let Some(container) = self.lock().containers.get_mut(name) {
            container.running = false;
        }
        Ok(())
    }

    async fn restart_container(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        match state.containers.get_mut(name) {
            Some(container) => {
                container.running = true;
                state.start_events.push(name.to_string());
                Ok(())
            }
            None => Err(PodiumError::runtime(format!("no such container: {}", name))),
        }
    }

    async fn remove_container(&self, name: &str, _remove_volumes: bool) -> Result<()> {
        self.lock().containers.remove(name);
        Ok(())
    }

    async fn list_containers_by_label(
        &self,
        labels: &[(&str, &str)],
    ) -> Result<Vec<ContainerSummary>> {
        Ok(self
            .lock()
            .containers
            .iter()
            .filter(|(_, c)| {
                labels
                    .iter()
                    .all(|(k, v)| c.labels.get(*k).map(String::as_str) == Some(*v))
            })
            .map(|(name, c)| ContainerSummary {
                names: Some(vec![format!("/{}", name)]),
                labels: Some(c.labels.clone()),
                state: Some(if c.running {
                    ContainerSummaryStateEnum::RUNNING
                } else {
                    ContainerSummaryStateEnum::EXITED
                }),
                ..Default::default()
            })
            .collect())
    }

    async fn wait_container(&self, _name: &str) -> Result<i64> {
        Ok(self.lock().exit_code)
    }

    fn container_logs(&self, name: &str, _follow: bool, _tail: Option<u32>) -> LogChunkStream {
        let state = self.lock();
        log_stream(
            state
                .logs
                .get(name)
                .cloned()
                .or_else(|| state.default_logs.clone()),
        )
    }

    async fn exec_interactive(&self, name: &str, _cmd: Vec<String>) -> Result<ExecSession> {
        if !self.lock().containers.contains_key(name) {
            return Err(PodiumError::runtime(format!("no such container: {}", name)));
        }
        Ok(ExecSession {
            id: format!("exec-{}", name),
            output: Box::pin(stream::empty()),
            input: Box::pin(tokio::io::sink()),
        })
    }

    async fn ensure_volume(&self, name: &str, _labels: HashMap<String, String>) -> Result<()> {
        self.lock().volumes.insert(name.to_string());
        Ok(())
    }

    async fn ensure_nfs_volume(
        &self,
        name: &str,
        _nfs_server: &str,
        _device: &str,
        _labels: HashMap<String, String>,
    ) -> Result<()> {
        self.lock().volumes.insert(name.to_string());
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.volumes.remove(name);
        state.removed_volumes.push(name.to_string());
        Ok(())
    }

    async fn ensure_network(&self, name: &str) -> Result<()> {
        self.lock().networks.insert(name.to_string());
        Ok(())
    }

    async fn connect_network(&self, _network: &str, _container: &str) -> Result<()> {
        Ok(())
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        self.lock().images.insert(image.to_string());
        Ok(())
    }

    async fn swarm_active(&self) -> bool {
        self.lock().swarm_active
    }

    async fn create_service(&self, spec: ServiceSpec) -> Result<()> {
        let name = spec.name.clone().unwrap_or_default();
        let mut state = self.lock();
        if state.services.contains_key(&name) {
            return Err(PodiumError::Conflict(format!("{} already exists", name)));
        }
        state.services.insert(
            name,
            MockService {
                spec,
                version: 1,
                task_states: vec![TaskState::RUNNING],
            },
        );
        Ok(())
    }

    async fn inspect_service(&self, name: &str) -> Result<Option<Service>> {
        Ok(self.lock().services.get(name).map(|s| Service {
            spec: Some(s.spec.clone()),
            version: Some(ObjectVersion {
                index: Some(s.version),
            }),
            ..Default::default()
        }))
    }

    async fn list_services_by_label(&self, labels: &[(&str, &str)]) -> Result<Vec<Service>> {
        Ok(self
            .lock()
            .services
            .values()
            .filter(|s| {
                let empty = HashMap::new();
                let map = s.spec.labels.as_ref().unwrap_or(&empty);
                labels
                    .iter()
                    .all(|(k, v)| map.get(*k).map(String::as_str) == Some(*v))
            })
            .map(|s| Service {
                spec: Some(s.spec.clone()),
                version: Some(ObjectVersion {
                    index: Some(s.version),
                }),
                ..Default::default()
            })
            .collect())
    }

    async fn remove_service(&self, name: &str) -> Result<()> {
        self.lock().services.remove(name);
        Ok(())
    }

    async fn update_service(&self, name: &str, version: u64, spec: ServiceSpec) -> Result<()> {
        let mut state = self.lock();
        let service = state
            .services
            .get_mut(name)
            .ok_or_else(|| PodiumError::runtime(format!("no such service: {}", name)))?;
        if service.version != version {
            return Err(PodiumError::runtime("service version is out of date"));
        }
        service.spec = spec;
        service.version += 1;
        Ok(())
    }

    async fn list_service_tasks(&self, service: &str) -> Result<Vec<Task>> {
        Ok(self
            .lock()
            .services
            .get(service)
            .map(|s| {
                s.task_states
                    .iter()
                    .map(|ts| Task {
                        status: Some(TaskStatus {
                            state: Some(*ts),
                            ..Default::default()
                        }),
                        ..Default::default()
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn service_logs(&self, name: &str, _follow: bool, _tail: Option<u32>) -> LogChunkStream {
        self.container_logs(name, false, None)
    }
}
