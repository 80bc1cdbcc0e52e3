//! Input validation applied before any mutating runtime call.

use crate::error::{PodiumError, Result};

/// Lowest port a user-added route may target. Everything below is left to
/// the preset's own service ports.
pub const MIN_USER_PORT: u16 = 1024;

fn is_valid_slug(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 40
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Project names become part of container, volume and router names, so the
/// character set is restricted to lowercase alphanumerics and hyphens.
pub fn project_name(name: &str) -> Result<()> {
    if is_valid_slug(name) {
        Ok(())
    } else {
        Err(PodiumError::InvalidArgument(
            "Invalid project name (lowercase alphanumeric and hyphens, max 40 chars)".into(),
        ))
    }
}

pub fn endpoint_name(name: &str) -> Result<()> {
    if is_valid_slug(name) {
        Ok(())
    } else {
        Err(PodiumError::InvalidArgument(
            "Invalid endpoint name (lowercase alphanumeric and hyphens, max 40 chars)".into(),
        ))
    }
}

pub fn user_port(port: u16) -> Result<()> {
    if port >= MIN_USER_PORT {
        Ok(())
    } else {
        Err(PodiumError::InvalidArgument(format!(
            "Port must be between {} and 65535",
            MIN_USER_PORT
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_slugs() {
        assert!(project_name("proj1").is_ok());
        assert!(endpoint_name("my-viewer-2").is_ok());
    }

    #[test]
    fn rejects_bad_slugs() {
        assert!(project_name("").is_err());
        assert!(project_name("Has-Upper").is_err());
        assert!(project_name("spaces here").is_err());
        assert!(endpoint_name(&"x".repeat(41)).is_err());
        assert!(endpoint_name("dot.dot").is_err());
    }

    #[test]
    fn rejects_privileged_ports() {
        assert!(user_port(80).is_err());
        assert!(user_port(1023).is_err());
        assert!(user_port(1024).is_ok());
        assert!(user_port(9000).is_ok());
    }
}
