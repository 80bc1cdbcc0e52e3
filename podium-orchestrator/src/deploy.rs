//! Git deployment through disposable helper containers.
//!
//! Clones and pulls never run inside the workspace container (its image has
//! no git, and it may not even be running). Instead a short-lived helper
//! container mounts the workspace volume, runs git non-interactively, writes
//! the resulting commit to `/workspace/.deploy-head`, and is removed again
//! whatever the outcome. The commit printed on stdout is the pipeline's
//! return value; a non-zero exit surfaces the captured output so users can
//! see what git said.

use std::collections::HashMap;

use bollard::models::{ContainerCreateBody, HostConfig, Mount, MountType};
use tracing::{debug, instrument};
use uuid::Uuid;

use podium_core::error::{PodiumError, Result};
use podium_runtime::Runtime;

use crate::config::OrchestratorConfig;
use crate::labels;
use crate::workspace::{DeploymentSource, WorkspaceKey};

/// Quote a value for embedding in the helper's shell script. Single quotes
/// are rejected outright rather than escaped.
fn shell_quote(value: &str) -> Result<String> {
    if value.contains('\'') || value.contains('\0') {
        return Err(PodiumError::InvalidArgument(
            "Repository parameters must not contain quotes".into(),
        ));
    }
    Ok(format!("'{}'", value))
}

fn clone_script(source: &DeploymentSource) -> Result<String> {
    let repo = shell_quote(&source.repo_url)?;
    let branch_flag = match &source.branch {
        Some(branch) => format!("--branch {} ", shell_quote(branch)?),
        None => String::new(),
    };
    Ok(format!(
        "set -e\n\
         rm -rf /workspace/app\n\
         git clone -q --depth 1 {branch_flag}{repo} /workspace/app\n\
         cd /workspace/app\n\
         git rev-parse HEAD | tee /workspace/.deploy-head"
    ))
}

fn pull_script(source: &DeploymentSource) -> Result<String> {
    let checkout = match &source.branch {
        Some(branch) => format!("git checkout -q {}\n", shell_quote(branch)?),
        None => String::new(),
    };
    Ok(format!(
        "set -e\n\
         cd /workspace/app\n\
         {checkout}git pull -q --ff-only\n\
         git rev-parse HEAD | tee /workspace/.deploy-head"
    ))
}

/// Clone the workspace's repository into its volume. Returns the commit at
/// the checked-out head.
#[instrument(skip(runtime, config, source), fields(repo = %source.repo_url))]
pub async fn clone_repo<R: Runtime>(
    runtime: &R,
    config: &OrchestratorConfig,
    key: &WorkspaceKey,
    source: &DeploymentSource,
) -> Result<String> {
    run_helper(runtime, config, key, clone_script(source)?).await
}

/// Fast-forward the existing checkout. Returns the commit after the pull.
#[instrument(skip(runtime, config, source), fields(repo = %source.repo_url))]
pub async fn pull_repo<R: Runtime>(
    runtime: &R,
    config: &OrchestratorConfig,
    key: &WorkspaceKey,
    source: &DeploymentSource,
) -> Result<String> {
    run_helper(runtime, config, key, pull_script(source)?).await
}

/// Run `script` in a one-shot git helper container against the workspace
/// volume. The helper is always removed, including on failure.
async fn run_helper<R: Runtime>(
    runtime: &R,
    config: &OrchestratorConfig,
    key: &WorkspaceKey,
    script: String,
) -> Result<String> {
    runtime.ensure_image(&config.git_helper_image).await?;

    let helper_name = format!("deploy-{}-{}", key.object_name(), Uuid::new_v4().simple());
    let mut helper_labels = HashMap::new();
    helper_labels.insert(labels::MANAGED_BY.to_string(), labels::MANAGER.to_string());
    helper_labels.insert("podium.helper".to_string(), "git".to_string());

    let container = ContainerCreateBody {
        image: Some(config.git_helper_image.clone()),
        entrypoint: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
        cmd: Some(vec![script]),
        env: Some(vec!["GIT_TERMINAL_PROMPT=0".to_string()]),
        labels: Some(helper_labels),
        host_config: Some(HostConfig {
            mounts: Some(vec![Mount {
                target: Some("/workspace".to_string()),
                source: Some(key.volume_name()),
                typ: Some(MountType::VOLUME),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };

    runtime.create_container(&helper_name, container).await?;
    let outcome = drive_helper(runtime, &helper_name).await;
    runtime.remove_container(&helper_name, false).await?;
    outcome
}

async fn drive_helper<R: Runtime>(runtime: &R, helper_name: &str) -> Result<String> {
    runtime.start_container(helper_name).await?;
    let exit_code = runtime.wait_container(helper_name).await?;
    let chunks = runtime.container_logs(helper_name, false, None);
    let (stdout, stderr) = podium_runtime::collect_chunks(chunks).await;

    if exit_code != 0 {
        return Err(PodiumError::DeploymentFailed {
            message: format!("git exited with status {}", exit_code),
            output: format!("{}{}", stdout, stderr),
        });
    }

    let commit = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .to_string();
    if commit.len() != 40 || !commit.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(PodiumError::DeploymentFailed {
            message: "could not determine the deployed commit".into(),
            output: format!("{}{}", stdout, stderr),
        });
    }
    debug!(helper = helper_name, %commit, "deployment helper finished");
    Ok(commit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(branch: Option<&str>) -> DeploymentSource {
        DeploymentSource {
            repo_url: "https://example.com/repo.git".into(),
            branch: branch.map(String::from),
            subdir: None,
            start_command: None,
            last_commit: None,
        }
    }

    #[test]
    fn clone_script_pins_branch_when_given() {
        let script = clone_script(&source(Some("main"))).unwrap();
        assert!(script.contains("git clone -q --depth 1 --branch 'main' 'https://example.com/repo.git' /workspace/app"));
        assert!(script.contains("tee /workspace/.deploy-head"));

        let script = clone_script(&source(None)).unwrap();
        assert!(script.contains("git clone -q --depth 1 'https://example.com/repo.git' /workspace/app"));
    }

    #[test]
    fn pull_script_checks_out_branch_first() {
        let script = pull_script(&source(Some("dev"))).unwrap();
        let checkout_pos = script.find("git checkout -q 'dev'").unwrap();
        let pull_pos = script.find("git pull -q --ff-only").unwrap();
        assert!(checkout_pos < pull_pos);
    }

    #[test]
    fn quoted_parameters_are_rejected() {
        let mut bad = source(None);
        bad.repo_url = "https://example.com/'; rm -rf /".into();
        assert!(matches!(
            clone_script(&bad),
            Err(PodiumError::InvalidArgument(_))
        ));
    }
}
