use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Expose the clustered endpoints. They still answer 503 when the node
    /// turns out not to be part of an active cluster.
    #[serde(default = "default_cluster_mode")]
    pub cluster_mode: bool,
}

fn default_bind_addr() -> String {
    std::env::var("PODIUM_API_BIND").unwrap_or_else(|_| "0.0.0.0:4000".to_string())
}

fn default_cluster_mode() -> bool {
    std::env::var("PODIUM_CLUSTER_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cluster_mode: default_cluster_mode(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}
