use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use podium_core::error::{PodiumError, Result};
use podium_core::validate;

use crate::config::OrchestratorConfig;

/// Identity of a workspace: `(owner, project)` and every name derived from it.
///
/// The derived container name doubles as the runtime-side mutual exclusion
/// key: two workspaces can never map to the same name because both components
/// are validated slugs joined in a fixed shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkspaceKey {
    pub owner: String,
    pub project: String,
}

impl WorkspaceKey {
    pub fn new(owner: impl Into<String>, project: impl Into<String>) -> Result<Self> {
        let owner = owner.into();
        let project = project.into();
        if owner.is_empty() {
            return Err(PodiumError::InvalidArgument("Missing owner".into()));
        }
        validate::project_name(&project)?;
        Ok(Self { owner, project })
    }

    /// Canonical name of the backing container or service.
    pub fn object_name(&self) -> String {
        format!("workspace-{}-{}", self.owner, self.project)
    }

    /// Name of the workspace's dedicated volume.
    pub fn volume_name(&self) -> String {
        format!("workspace-vol-{}-{}", self.owner, self.project)
    }

    /// Per-owner secondary network shared by all of one owner's workspaces.
    pub fn owner_network(&self) -> String {
        format!("workspace-net-{}", self.owner)
    }

    /// Path prefix every route of this workspace lives under.
    pub fn base_path(&self) -> String {
        format!("/students/{}/{}", self.owner, self.project)
    }

    /// Browser-facing URL of the workspace's primary endpoint. Rendered
    /// proxy rules always include an endpoint segment, so the URL points at
    /// the first published route; with no routes it falls back to the bare
    /// workspace prefix.
    pub fn public_url(&self, config: &OrchestratorConfig, endpoint: Option<&str>) -> String {
        let base = format!(
            "{}/{}/{}/",
            config.public_base.trim_end_matches('/'),
            self.owner,
            self.project
        );
        match endpoint {
            Some(endpoint) => format!("{}{}/", base, endpoint),
            None => base,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppRuntime {
    Node,
    Python,
    Static,
}

impl AppRuntime {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppRuntime::Node => "node",
            AppRuntime::Python => "python",
            AppRuntime::Static => "static",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "node" => Some(AppRuntime::Node),
            "python" => Some(AppRuntime::Python),
            "static" => Some(AppRuntime::Static),
            _ => None,
        }
    }
}

/// The workload template a workspace runs, resolved once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "preset", rename_all = "kebab-case")]
pub enum Preset {
    Notebook,
    StaticSite,
    GitDeployed { runtime: AppRuntime },
    Custom,
}

impl Preset {
    pub fn label_value(&self) -> &'static str {
        match self {
            Preset::Notebook => "notebook",
            Preset::StaticSite => "static-site",
            Preset::GitDeployed { .. } => "git-deployed",
            Preset::Custom => "custom",
        }
    }

    pub fn from_label(preset: &str, runtime: Option<&str>) -> Option<Self> {
        match preset {
            "notebook" => Some(Preset::Notebook),
            "static-site" => Some(Preset::StaticSite),
            "git-deployed" => Some(Preset::GitDeployed {
                runtime: AppRuntime::parse(runtime?)?,
            }),
            "custom" => Some(Preset::Custom),
            _ => None,
        }
    }

    pub fn runtime(&self) -> Option<AppRuntime> {
        match self {
            Preset::GitDeployed { runtime } => Some(*runtime),
            _ => None,
        }
    }

    pub fn image<'a>(&self, config: &'a OrchestratorConfig) -> &'a str {
        match self {
            Preset::Notebook => &config.notebook_image,
            Preset::StaticSite => &config.static_image,
            Preset::GitDeployed { runtime } => match runtime {
                AppRuntime::Node => &config.node_image,
                AppRuntime::Python => &config.python_image,
                AppRuntime::Static => &config.static_image,
            },
            Preset::Custom => &config.custom_image,
        }
    }

    /// Where the workspace volume is mounted inside the container.
    pub fn mount_target(&self) -> &'static str {
        match self {
            Preset::Notebook => "/home/jovyan/work",
            _ => "/workspace",
        }
    }

    /// The preset's own service endpoints, published on every workspace of
    /// this preset from creation on. The notebook keeps its prefix because
    /// the server must know its own base URL; everything else is
    /// prefix-stripped.
    pub fn default_routes(&self) -> Vec<Route> {
        match self {
            Preset::Notebook => vec![Route {
                endpoint: "notebook".into(),
                port: 8888,
                strip_prefix: false,
            }],
            Preset::StaticSite => vec![Route {
                endpoint: "site".into(),
                port: 8080,
                strip_prefix: true,
            }],
            Preset::GitDeployed { runtime } => vec![Route {
                endpoint: "app".into(),
                port: match runtime {
                    AppRuntime::Node => 3000,
                    AppRuntime::Python => 8000,
                    AppRuntime::Static => 8080,
                },
                strip_prefix: true,
            }],
            Preset::Custom => vec![Route {
                endpoint: "app".into(),
                port: 8080,
                strip_prefix: true,
            }],
        }
    }

    /// Container command for this preset, or `None` to use the image default.
    pub fn command(
        &self,
        key: &WorkspaceKey,
        deployment: Option<&DeploymentSource>,
    ) -> Option<Vec<String>> {
        match self {
            Preset::Notebook => Some(vec![
                "start-notebook.sh".into(),
                format!("--NotebookApp.base_url={}/notebook", key.base_path()),
                "--NotebookApp.token=".into(),
                "--NotebookApp.password=".into(),
                "--NotebookApp.allow_origin=*".into(),
            ]),
            Preset::StaticSite => Some(vec![
                "httpd".into(),
                "-f".into(),
                "-p".into(),
                "8080".into(),
                "-h".into(),
                "/workspace".into(),
            ]),
            Preset::GitDeployed { runtime } => {
                let app_dir = match deployment.and_then(|d| d.subdir.as_deref()) {
                    Some(subdir) => format!("/workspace/app/{}", subdir),
                    None => "/workspace/app".to_string(),
                };
                let start = deployment.and_then(|d| d.start_command.clone());
                let shell_line = match runtime {
                    AppRuntime::Node => format!(
                        "cd {} && {}",
                        app_dir,
                        start.unwrap_or_else(|| "npm start".into())
                    ),
                    AppRuntime::Python => format!(
                        "cd {} && {}",
                        app_dir,
                        start.unwrap_or_else(|| "python3 -m http.server 8000".into())
                    ),
                    AppRuntime::Static => format!("httpd -f -p 8080 -h {}", app_dir),
                };
                Some(vec!["/bin/sh".into(), "-c".into(), shell_line])
            }
            Preset::Custom => Some(vec!["sleep".into(), "infinity".into()]),
        }
    }
}

/// A published path-to-port mapping exposed through the reverse proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub endpoint: String,
    pub port: u16,
    #[serde(default)]
    pub strip_prefix: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_nanos: i64,
    pub mem_bytes: i64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        // 2 CPUs, 4 GiB
        Self {
            cpu_nanos: 2_000_000_000,
            mem_bytes: 4 * 1024 * 1024 * 1024,
        }
    }
}

impl ResourceLimits {
    pub const MAX_CPUS: f64 = 16.0;
    pub const MIN_MEM_MB: u64 = 128;
    pub const MAX_MEM_MB: u64 = 65_536;

    pub fn from_request(cpus: Option<f64>, mem_mb: Option<u64>) -> Result<Self> {
        let default = Self::default();
        let cpu_nanos = match cpus {
            Some(c) if c.is_finite() && c > 0.0 && c <= Self::MAX_CPUS => (c * 1e9) as i64,
            Some(c) => {
                return Err(PodiumError::InvalidArgument(format!(
                    "cpus must be between 0 and {}, got {}",
                    Self::MAX_CPUS,
                    c
                )))
            }
            None => default.cpu_nanos,
        };
        let mem_bytes = match mem_mb {
            Some(m) if (Self::MIN_MEM_MB..=Self::MAX_MEM_MB).contains(&m) => {
                (m as i64) * 1024 * 1024
            }
            Some(m) => {
                return Err(PodiumError::InvalidArgument(format!(
                    "mem_mb must be between {} and {}, got {}",
                    Self::MIN_MEM_MB,
                    Self::MAX_MEM_MB,
                    m
                )))
            }
            None => default.mem_bytes,
        };
        Ok(Self { cpu_nanos, mem_bytes })
    }
}

/// Git source of a git-deployed workspace. `last_commit` is only advanced
/// after a clone or pull fully succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSource {
    pub repo_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
}

/// Everything durably recorded about a workspace. This is exactly the data
/// the label codec round-trips; run state lives in the runtime object itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceMeta {
    pub owner: String,
    pub owner_email: String,
    pub project: String,
    pub preset: Preset,
    pub created_at: DateTime<Utc>,
    pub limits: ResourceLimits,
    pub routes: Vec<Route>,
    pub deployment: Option<DeploymentSource>,
}

impl WorkspaceMeta {
    pub fn key(&self) -> WorkspaceKey {
        WorkspaceKey {
            owner: self.owner.clone(),
            project: self.project.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunState {
    Stopped,
    Running,
}

/// API-facing snapshot of a workspace: durable metadata plus the run state
/// read fresh from the runtime.
#[derive(Debug, Clone, Serialize)]
pub struct Workspace {
    pub name: String,
    pub owner: String,
    pub project: String,
    pub preset: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<&'static str>,
    pub base_path: String,
    pub public_url: String,
    pub created_at: DateTime<Utc>,
    pub limits: ResourceLimits,
    pub routes: Vec<Route>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentSource>,
    pub run_state: RunState,
}

impl Workspace {
    pub fn from_meta(meta: WorkspaceMeta, run_state: RunState, config: &OrchestratorConfig) -> Self {
        let key = meta.key();
        let endpoint = meta.routes.first().map(|r| r.endpoint.as_str());
        Self {
            name: key.object_name(),
            base_path: key.base_path(),
            public_url: key.public_url(config, endpoint),
            preset: meta.preset.label_value(),
            runtime: meta.preset.runtime().map(|r| r.as_str()),
            owner: meta.owner,
            project: meta.project,
            created_at: meta.created_at,
            limits: meta.limits,
            routes: meta.routes,
            deployment: meta.deployment,
            run_state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_names() {
        let key = WorkspaceKey::new("alice", "proj1").unwrap();
        assert_eq!(key.object_name(), "workspace-alice-proj1");
        assert_eq!(key.volume_name(), "workspace-vol-alice-proj1");
        assert_eq!(key.owner_network(), "workspace-net-alice");
        assert_eq!(key.base_path(), "/students/alice/proj1");
    }

    #[test]
    fn rejects_invalid_project() {
        assert!(WorkspaceKey::new("alice", "Bad Name").is_err());
        assert!(WorkspaceKey::new("", "proj").is_err());
    }

    #[test]
    fn preset_label_round_trip() {
        for preset in [
            Preset::Notebook,
            Preset::StaticSite,
            Preset::GitDeployed {
                runtime: AppRuntime::Python,
            },
            Preset::Custom,
        ] {
            let runtime = preset.runtime().map(|r| r.as_str().to_string());
            let parsed = Preset::from_label(preset.label_value(), runtime.as_deref());
            assert_eq!(parsed, Some(preset));
        }
    }

    #[test]
    fn git_deployed_without_runtime_label_is_rejected() {
        assert_eq!(Preset::from_label("git-deployed", None), None);
        assert_eq!(Preset::from_label("mystery", None), None);
    }

    #[test]
    fn notebook_default_route_keeps_prefix() {
        let routes = Preset::Notebook.default_routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].endpoint, "notebook");
        assert_eq!(routes[0].port, 8888);
        assert!(!routes[0].strip_prefix);
    }

    #[test]
    fn public_url_points_at_first_route_endpoint() {
        let config = OrchestratorConfig::default();
        let meta = WorkspaceMeta {
            owner: "alice".into(),
            owner_email: "alice@example.com".into(),
            project: "proj1".into(),
            preset: Preset::Notebook,
            created_at: Utc::now(),
            limits: ResourceLimits::default(),
            routes: Preset::Notebook.default_routes(),
            deployment: None,
        };
        let ws = Workspace::from_meta(meta.clone(), RunState::Running, &config);
        assert!(ws.public_url.ends_with("/alice/proj1/notebook/"));

        let mut bare = meta;
        bare.routes.clear();
        let ws = Workspace::from_meta(bare, RunState::Stopped, &config);
        assert!(ws.public_url.ends_with("/alice/proj1/"));
    }

    #[test]
    fn resource_limits_accept_sane_requests() {
        let limits = ResourceLimits::from_request(Some(1.5), Some(2048)).unwrap();
        assert_eq!(limits.cpu_nanos, 1_500_000_000);
        assert_eq!(limits.mem_bytes, 2048 * 1024 * 1024);

        let defaults = ResourceLimits::from_request(None, None).unwrap();
        assert_eq!(defaults, ResourceLimits::default());
    }

    #[test]
    fn resource_limits_reject_out_of_range_requests() {
        assert!(ResourceLimits::from_request(Some(-1.0), None).is_err());
        assert!(ResourceLimits::from_request(Some(f64::NAN), None).is_err());
        assert!(ResourceLimits::from_request(Some(f64::INFINITY), None).is_err());
        assert!(ResourceLimits::from_request(Some(64.0), None).is_err());
        assert!(ResourceLimits::from_request(None, Some(16)).is_err());
        assert!(ResourceLimits::from_request(None, Some(1_048_576)).is_err());
    }

    #[test]
    fn git_deployed_command_uses_subdir_and_start_command() {
        let key = WorkspaceKey::new("alice", "proj1").unwrap();
        let deployment = DeploymentSource {
            repo_url: "https://example.com/repo.git".into(),
            branch: None,
            subdir: Some("web".into()),
            start_command: Some("node server.js".into()),
            last_commit: None,
        };
        let cmd = Preset::GitDeployed {
            runtime: AppRuntime::Node,
        }
        .command(&key, Some(&deployment))
        .unwrap();
        assert_eq!(cmd[0], "/bin/sh");
        assert!(cmd[2].contains("/workspace/app/web"));
        assert!(cmd[2].ends_with("node server.js"));
    }
}
