//! The label codec: workspace metadata serialized into, and recovered from,
//! the label map of the backing container or service.
//!
//! Decoding fails closed. An object without the manager marker, or with any
//! required field missing or malformed, decodes to `None` and is treated as
//! not being a workspace at all. The one exception is the routes label: a
//! corrupt route table degrades to an empty one so the workspace stays
//! reachable for repair (the next route mutation rewrites it whole).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::workspace::{DeploymentSource, Preset, ResourceLimits, Route, WorkspaceMeta};

pub const MANAGED_BY: &str = "podium.managed-by";
pub const MANAGER: &str = "podium-orchestrator";

pub const OWNER: &str = "podium.owner";
pub const OWNER_EMAIL: &str = "podium.owner-email";
pub const PROJECT: &str = "podium.project";
pub const PRESET: &str = "podium.preset";
pub const RUNTIME: &str = "podium.runtime";
pub const CREATED_AT: &str = "podium.created-at";
pub const CPU_NANOS: &str = "podium.cpu-nanos";
pub const MEM_BYTES: &str = "podium.mem-bytes";
pub const ROUTES: &str = "podium.routes";
pub const REPO_URL: &str = "podium.repo-url";
pub const REPO_BRANCH: &str = "podium.repo-branch";
pub const REPO_SUBDIR: &str = "podium.repo-subdir";
pub const START_COMMAND: &str = "podium.start-command";
pub const LAST_COMMIT: &str = "podium.last-commit";

/// Label selector matching every object this orchestrator manages.
pub fn managed_filter() -> String {
    format!("{}={}", MANAGED_BY, MANAGER)
}

/// Label selector matching one owner's objects.
pub fn owner_filter(owner: &str) -> String {
    format!("{}={}", OWNER, owner)
}

/// Serialize workspace metadata into labels. The inverse of [`decode`].
pub fn encode(meta: &WorkspaceMeta) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    labels.insert(MANAGED_BY.to_string(), MANAGER.to_string());
    labels.insert(OWNER.to_string(), meta.owner.clone());
    labels.insert(OWNER_EMAIL.to_string(), meta.owner_email.clone());
    labels.insert(PROJECT.to_string(), meta.project.clone());
    labels.insert(PRESET.to_string(), meta.preset.label_value().to_string());
    if let Some(runtime) = meta.preset.runtime() {
        labels.insert(RUNTIME.to_string(), runtime.as_str().to_string());
    }
    labels.insert(CREATED_AT.to_string(), meta.created_at.to_rfc3339());
    labels.insert(CPU_NANOS.to_string(), meta.limits.cpu_nanos.to_string());
    labels.insert(MEM_BYTES.to_string(), meta.limits.mem_bytes.to_string());
    // Serializing a Vec<Route> cannot fail.
    labels.insert(
        ROUTES.to_string(),
        serde_json::to_string(&meta.routes).unwrap_or_else(|_| "[]".to_string()),
    );
    if let Some(deployment) = &meta.deployment {
        labels.insert(REPO_URL.to_string(), deployment.repo_url.clone());
        if let Some(branch) = &deployment.branch {
            labels.insert(REPO_BRANCH.to_string(), branch.clone());
        }
        if let Some(subdir) = &deployment.subdir {
            labels.insert(REPO_SUBDIR.to_string(), subdir.clone());
        }
        if let Some(cmd) = &deployment.start_command {
            labels.insert(START_COMMAND.to_string(), cmd.clone());
        }
        if let Some(commit) = &deployment.last_commit {
            labels.insert(LAST_COMMIT.to_string(), commit.clone());
        }
    }
    labels
}

/// Recover workspace metadata from a label map, or `None` if the object is
/// not a well-formed managed workspace.
pub fn decode(labels: &HashMap<String, String>) -> Option<WorkspaceMeta> {
    if labels.get(MANAGED_BY).map(String::as_str) != Some(MANAGER) {
        return None;
    }
    let owner = labels.get(OWNER)?.clone();
    let project = labels.get(PROJECT)?.clone();
    let preset = Preset::from_label(
        labels.get(PRESET)?,
        labels.get(RUNTIME).map(String::as_str),
    )?;
    let created_at = labels
        .get(CREATED_AT)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))?;

    let default_limits = ResourceLimits::default();
    let limits = ResourceLimits {
        cpu_nanos: labels
            .get(CPU_NANOS)
            .and_then(|s| s.parse().ok())
            .unwrap_or(default_limits.cpu_nanos),
        mem_bytes: labels
            .get(MEM_BYTES)
            .and_then(|s| s.parse().ok())
            .unwrap_or(default_limits.mem_bytes),
    };

    let routes: Vec<Route> = match labels.get(ROUTES) {
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|err| {
            warn!(%owner, %project, %err, "unreadable route table label, treating as empty");
            Vec::new()
        }),
        None => Vec::new(),
    };

    let deployment = labels.get(REPO_URL).map(|repo_url| DeploymentSource {
        repo_url: repo_url.clone(),
        branch: labels.get(REPO_BRANCH).cloned(),
        subdir: labels.get(REPO_SUBDIR).cloned(),
        start_command: labels.get(START_COMMAND).cloned(),
        last_commit: labels.get(LAST_COMMIT).cloned(),
    });

    Some(WorkspaceMeta {
        owner,
        owner_email: labels.get(OWNER_EMAIL).cloned().unwrap_or_default(),
        project,
        preset,
        created_at,
        limits,
        routes,
        deployment,
    })
}

/// Remove every label this orchestrator writes, keeping user-supplied or
/// third-party labels intact. Used when a container is recreated with fresh
/// metadata. Reverse-proxy labels are stripped separately by the route
/// renderer since their keys embed the workspace router names.
pub fn strip_managed(labels: &mut HashMap<String, String>) {
    labels.retain(|key, _| !key.starts_with("podium."));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::AppRuntime;
    use chrono::TimeZone;

    fn meta(preset: Preset, deployment: Option<DeploymentSource>) -> WorkspaceMeta {
        WorkspaceMeta {
            owner: "alice".into(),
            owner_email: "alice@example.edu".into(),
            project: "proj1".into(),
            preset,
            created_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
            limits: ResourceLimits::default(),
            routes: preset.default_routes(),
            deployment,
        }
    }

    #[test]
    fn round_trips_every_preset() {
        let git = DeploymentSource {
            repo_url: "https://example.com/repo.git".into(),
            branch: Some("main".into()),
            subdir: Some("web".into()),
            start_command: Some("node server.js".into()),
            last_commit: Some("deadbeef".into()),
        };
        for meta in [
            meta(Preset::Notebook, None),
            meta(Preset::StaticSite, None),
            meta(
                Preset::GitDeployed {
                    runtime: AppRuntime::Node,
                },
                Some(git),
            ),
            meta(Preset::Custom, None),
        ] {
            assert_eq!(decode(&encode(&meta)), Some(meta));
        }
    }

    #[test]
    fn unmanaged_labels_decode_to_none() {
        let mut labels = encode(&meta(Preset::Notebook, None));
        labels.remove(MANAGED_BY);
        assert_eq!(decode(&labels), None);

        let mut labels = encode(&meta(Preset::Notebook, None));
        labels.insert(MANAGED_BY.to_string(), "someone-else".to_string());
        assert_eq!(decode(&labels), None);
    }

    #[test]
    fn missing_required_field_decodes_to_none() {
        for required in [OWNER, PROJECT, PRESET, CREATED_AT] {
            let mut labels = encode(&meta(Preset::Notebook, None));
            labels.remove(required);
            assert_eq!(decode(&labels), None, "missing {required}");
        }
    }

    #[test]
    fn corrupt_routes_degrade_to_empty() {
        let mut labels = encode(&meta(Preset::Notebook, None));
        labels.insert(ROUTES.to_string(), "{not json".to_string());
        let decoded = decode(&labels).unwrap();
        assert!(decoded.routes.is_empty());
    }

    #[test]
    fn malformed_limits_fall_back_to_defaults() {
        let mut labels = encode(&meta(Preset::Notebook, None));
        labels.insert(CPU_NANOS.to_string(), "lots".to_string());
        let decoded = decode(&labels).unwrap();
        assert_eq!(decoded.limits.cpu_nanos, ResourceLimits::default().cpu_nanos);
    }

    #[test]
    fn strip_managed_keeps_foreign_labels() {
        let mut labels = encode(&meta(Preset::Notebook, None));
        labels.insert("com.example.team".to_string(), "robotics".to_string());
        strip_managed(&mut labels);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("com.example.team").map(String::as_str), Some("robotics"));
    }
}
