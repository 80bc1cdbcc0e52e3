use serde::Deserialize;

/// Orchestrator settings, all overridable through `PODIUM_*` env vars.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Public base under which workspaces are exposed, without trailing slash.
    #[serde(default = "default_public_base")]
    pub public_base: String,

    /// Forward-auth verification endpoint every route is gated through.
    #[serde(default = "default_auth_verify_address")]
    pub auth_verify_address: String,

    /// Shared network Traefik watches for workspace containers.
    #[serde(default = "default_main_network")]
    pub main_network: String,

    /// Overlay network for the clustered (Swarm) variant.
    #[serde(default = "default_cluster_network")]
    pub cluster_network: String,

    #[serde(default = "default_notebook_image")]
    pub notebook_image: String,

    #[serde(default = "default_static_image")]
    pub static_image: String,

    #[serde(default = "default_node_image")]
    pub node_image: String,

    #[serde(default = "default_python_image")]
    pub python_image: String,

    #[serde(default = "default_custom_image")]
    pub custom_image: String,

    /// Image used by the disposable git helper containers.
    #[serde(default = "default_git_helper_image")]
    pub git_helper_image: String,

    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: i64,

    /// NFS server address for clustered volumes.
    #[serde(default = "default_nfs_server")]
    pub nfs_server: String,

    /// NFS export path holding per-workspace directories.
    #[serde(default = "default_nfs_export")]
    pub nfs_export: String,

    /// Constrain clustered notebook tasks to GPU-labeled nodes.
    #[serde(default = "default_gpu_placement")]
    pub gpu_placement: bool,
}

fn default_public_base() -> String {
    std::env::var("PODIUM_PUBLIC_BASE").unwrap_or_else(|_| "http://localhost/students".to_string())
}

fn default_auth_verify_address() -> String {
    std::env::var("PODIUM_AUTH_VERIFY_ADDRESS")
        .unwrap_or_else(|_| "http://host.docker.internal:6969/auth/verify".to_string())
}

fn default_main_network() -> String {
    std::env::var("PODIUM_MAIN_NETWORK").unwrap_or_else(|_| "podium_workspaces".to_string())
}

fn default_cluster_network() -> String {
    std::env::var("PODIUM_CLUSTER_NETWORK").unwrap_or_else(|_| "podium_cluster".to_string())
}

fn default_notebook_image() -> String {
    std::env::var("PODIUM_NOTEBOOK_IMAGE")
        .unwrap_or_else(|_| "jupyter/minimal-notebook:latest".to_string())
}

fn default_static_image() -> String {
    std::env::var("PODIUM_STATIC_IMAGE").unwrap_or_else(|_| "busybox:stable".to_string())
}

fn default_node_image() -> String {
    std::env::var("PODIUM_NODE_IMAGE").unwrap_or_else(|_| "node:20-alpine".to_string())
}

fn default_python_image() -> String {
    std::env::var("PODIUM_PYTHON_IMAGE").unwrap_or_else(|_| "python:3.12-slim".to_string())
}

fn default_custom_image() -> String {
    std::env::var("PODIUM_CUSTOM_IMAGE").unwrap_or_else(|_| "ubuntu:24.04".to_string())
}

fn default_git_helper_image() -> String {
    std::env::var("PODIUM_GIT_HELPER_IMAGE").unwrap_or_else(|_| "alpine/git:latest".to_string())
}

fn default_stop_timeout_secs() -> i64 {
    std::env::var("PODIUM_STOP_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10)
}

fn default_nfs_server() -> String {
    std::env::var("PODIUM_NFS_SERVER").unwrap_or_else(|_| "172.30.0.5".to_string())
}

fn default_nfs_export() -> String {
    std::env::var("PODIUM_NFS_EXPORT").unwrap_or_else(|_| "/exports/workspace-volumes".to_string())
}

fn default_gpu_placement() -> bool {
    std::env::var("PODIUM_GPU_PLACEMENT")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            public_base: default_public_base(),
            auth_verify_address: default_auth_verify_address(),
            main_network: default_main_network(),
            cluster_network: default_cluster_network(),
            notebook_image: default_notebook_image(),
            static_image: default_static_image(),
            node_image: default_node_image(),
            python_image: default_python_image(),
            custom_image: default_custom_image(),
            git_helper_image: default_git_helper_image(),
            stop_timeout_secs: default_stop_timeout_secs(),
            nfs_server: default_nfs_server(),
            nfs_export: default_nfs_export(),
            gpu_placement: default_gpu_placement(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        Self::default()
    }
}
