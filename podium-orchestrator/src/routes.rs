//! Route table mutation rules and the Traefik label renderer.
//!
//! Every workspace carries a route table in its labels; this module owns the
//! rules for changing it (reserved names, port collisions) and the rendering
//! of the whole table into `traefik.*` labels. Rendering is always done from
//! scratch for the full table, so a recreated container carries exactly the
//! rules its table says and nothing stale.

use std::collections::BTreeMap;
use std::collections::HashMap;

use podium_core::error::{PodiumError, Result};
use podium_core::validate;

use crate::config::OrchestratorConfig;
use crate::workspace::{Route, WorkspaceKey};

/// Endpoint names claimed by the presets themselves.
pub const RESERVED_ENDPOINTS: [&str; 3] = ["notebook", "site", "app"];

/// Ports the preset services listen on.
pub const RESERVED_PORTS: [u16; 4] = [8888, 8080, 8000, 3000];

/// Add a user route to the table, enforcing name validity, reserved sets and
/// uniqueness of both endpoint and port.
pub fn add_route(routes: &mut Vec<Route>, route: Route) -> Result<()> {
    validate::endpoint_name(&route.endpoint)?;
    validate::user_port(route.port)?;
    if RESERVED_ENDPOINTS.contains(&route.endpoint.as_str()) {
        return Err(PodiumError::InvalidArgument(format!(
            "Endpoint '{}' is reserved",
            route.endpoint
        )));
    }
    if RESERVED_PORTS.contains(&route.port) {
        return Err(PodiumError::InvalidArgument(format!(
            "Port {} is reserved",
            route.port
        )));
    }
    if routes.iter().any(|r| r.endpoint == route.endpoint) {
        return Err(PodiumError::Conflict(format!(
            "Endpoint '{}' is already routed",
            route.endpoint
        )));
    }
    if routes.iter().any(|r| r.port == route.port) {
        return Err(PodiumError::Conflict(format!(
            "Port {} is already routed",
            route.port
        )));
    }
    routes.push(route);
    Ok(())
}

/// Remove a user route. Preset routes cannot be removed.
pub fn remove_route(routes: &mut Vec<Route>, endpoint: &str) -> Result<Route> {
    if RESERVED_ENDPOINTS.contains(&endpoint) {
        return Err(PodiumError::InvalidArgument(format!(
            "Endpoint '{}' is reserved and cannot be removed",
            endpoint
        )));
    }
    let idx = routes
        .iter()
        .position(|r| r.endpoint == endpoint)
        .ok_or_else(|| PodiumError::NotFound(format!("No route for endpoint '{}'", endpoint)))?;
    Ok(routes.remove(idx))
}

fn router_name(key: &WorkspaceKey, endpoint: &str) -> String {
    format!("{}-{}", key.object_name(), endpoint)
}

/// Render the complete `traefik.*` label set for a workspace's route table.
///
/// `BTreeMap` keeps the label order deterministic, which makes recreated
/// containers diffable against their predecessors.
pub fn render(
    key: &WorkspaceKey,
    routes: &[Route],
    config: &OrchestratorConfig,
) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("traefik.enable".to_string(), "true".to_string());
    labels.insert(
        "traefik.docker.network".to_string(),
        config.main_network.clone(),
    );
    for route in routes {
        let router = router_name(key, &route.endpoint);
        let prefix = format!("{}/{}", key.base_path(), route.endpoint);
        labels.insert(
            format!("traefik.http.routers.{router}.rule"),
            format!("PathPrefix(`{prefix}`)"),
        );
        labels.insert(
            format!("traefik.http.routers.{router}.entrypoints"),
            "web".to_string(),
        );
        labels.insert(
            format!("traefik.http.services.{router}.loadbalancer.server.port"),
            route.port.to_string(),
        );

        let mut middlewares = vec![format!("{router}-auth")];
        labels.insert(
            format!("traefik.http.middlewares.{router}-auth.forwardauth.address"),
            config.auth_verify_address.clone(),
        );
        labels.insert(
            format!("traefik.http.middlewares.{router}-auth.forwardauth.trustForwardHeader"),
            "true".to_string(),
        );
        if route.strip_prefix {
            labels.insert(
                format!("traefik.http.middlewares.{router}-strip.stripprefix.prefixes"),
                prefix.clone(),
            );
            middlewares.push(format!("{router}-strip"));
        }
        labels.insert(
            format!("traefik.http.routers.{router}.middlewares"),
            middlewares.join(","),
        );
    }
    labels
}

/// Remove every `traefik.*` label belonging to this workspace's routers.
/// Foreign traefik labels (none are expected, but a user could have set some
/// on a custom image) are left alone unless they collide with our namespace.
pub fn strip_rendered(labels: &mut HashMap<String, String>, key: &WorkspaceKey) {
    let marker = key.object_name();
    labels.retain(|k, _| {
        if k == "traefik.enable" || k == "traefik.docker.network" {
            return false;
        }
        !(k.starts_with("traefik.") && k.contains(&marker))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::Preset;

    fn key() -> WorkspaceKey {
        WorkspaceKey::new("alice", "proj1").unwrap()
    }

    fn user_route(endpoint: &str, port: u16) -> Route {
        Route {
            endpoint: endpoint.into(),
            port,
            strip_prefix: true,
        }
    }

    #[test]
    fn add_rejects_reserved_endpoint_and_port() {
        let mut routes = Preset::Notebook.default_routes();
        let err = add_route(&mut routes, user_route("notebook", 5000)).unwrap_err();
        assert!(matches!(err, PodiumError::InvalidArgument(_)));
        let err = add_route(&mut routes, user_route("dash", 8888)).unwrap_err();
        assert!(matches!(err, PodiumError::InvalidArgument(_)));
    }

    #[test]
    fn add_rejects_duplicates() {
        let mut routes = Vec::new();
        add_route(&mut routes, user_route("dash", 5000)).unwrap();
        assert!(matches!(
            add_route(&mut routes, user_route("dash", 5001)),
            Err(PodiumError::Conflict(_))
        ));
        assert!(matches!(
            add_route(&mut routes, user_route("other", 5000)),
            Err(PodiumError::Conflict(_))
        ));
    }

    #[test]
    fn add_rejects_privileged_ports() {
        let mut routes = Vec::new();
        assert!(matches!(
            add_route(&mut routes, user_route("dash", 80)),
            Err(PodiumError::InvalidArgument(_))
        ));
    }

    #[test]
    fn remove_restores_table() {
        let mut routes = Preset::Notebook.default_routes();
        let before = routes.clone();
        add_route(&mut routes, user_route("dash", 5000)).unwrap();
        let removed = remove_route(&mut routes, "dash").unwrap();
        assert_eq!(removed.port, 5000);
        assert_eq!(routes, before);
    }

    #[test]
    fn remove_refuses_preset_routes() {
        let mut routes = Preset::Notebook.default_routes();
        assert!(matches!(
            remove_route(&mut routes, "notebook"),
            Err(PodiumError::InvalidArgument(_))
        ));
        assert!(matches!(
            remove_route(&mut routes, "ghost"),
            Err(PodiumError::NotFound(_))
        ));
    }

    #[test]
    fn render_emits_rule_service_and_auth() {
        let config = OrchestratorConfig::default();
        let routes = Preset::Notebook.default_routes();
        let labels = render(&key(), &routes, &config);

        let router = "workspace-alice-proj1-notebook";
        assert_eq!(labels.get("traefik.enable").map(String::as_str), Some("true"));
        assert_eq!(
            labels
                .get(&format!("traefik.http.routers.{router}.rule"))
                .map(String::as_str),
            Some("PathPrefix(`/students/alice/proj1/notebook`)")
        );
        assert_eq!(
            labels
                .get(&format!(
                    "traefik.http.services.{router}.loadbalancer.server.port"
                ))
                .map(String::as_str),
            Some("8888")
        );
        // The notebook keeps its prefix, so only the auth middleware applies.
        assert_eq!(
            labels
                .get(&format!("traefik.http.routers.{router}.middlewares"))
                .map(String::as_str),
            Some("workspace-alice-proj1-notebook-auth")
        );
        assert!(!labels.contains_key(&format!(
            "traefik.http.middlewares.{router}-strip.stripprefix.prefixes"
        )));
    }

    #[test]
    fn render_adds_strip_middleware_when_requested() {
        let config = OrchestratorConfig::default();
        let routes = vec![user_route("dash", 5000)];
        let labels = render(&key(), &routes, &config);
        let router = "workspace-alice-proj1-dash";
        assert_eq!(
            labels
                .get(&format!("traefik.http.routers.{router}.middlewares"))
                .map(String::as_str),
            Some("workspace-alice-proj1-dash-auth,workspace-alice-proj1-dash-strip")
        );
        assert_eq!(
            labels
                .get(&format!(
                    "traefik.http.middlewares.{router}-strip.stripprefix.prefixes"
                ))
                .map(String::as_str),
            Some("/students/alice/proj1/dash")
        );
    }

    #[test]
    fn strip_rendered_clears_only_this_workspace() {
        let config = OrchestratorConfig::default();
        let mut labels: HashMap<String, String> = render(
            &key(),
            &Preset::Notebook.default_routes(),
            &config,
        )
        .into_iter()
        .collect();
        labels.insert(
            "traefik.http.routers.unrelated.rule".to_string(),
            "PathPrefix(`/elsewhere`)".to_string(),
        );
        strip_rendered(&mut labels, &key());
        assert_eq!(labels.len(), 1);
        assert!(labels.contains_key("traefik.http.routers.unrelated.rule"));
    }
}
