use serde::{Deserialize, Serialize};

/// A verified identity, as produced by the external SSO bridge.
///
/// Podium never performs the identity-provider exchange itself; it consumes
/// this record as already-verified input and reduces it to an owner key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    pub email: String,
    pub roles: Vec<String>,
    pub groups: Vec<String>,
}

impl Identity {
    /// The owner key is the lowercased local part of the verified email.
    /// It is the sole authorization predicate against the `owner` label.
    pub fn owner_key(&self) -> String {
        self.email
            .split('@')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g.eq_ignore_ascii_case(group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(email: &str) -> Identity {
        Identity {
            subject: "sub-1".into(),
            email: email.into(),
            roles: vec!["Student".into()],
            groups: vec!["compsci-students".into()],
        }
    }

    #[test]
    fn owner_key_is_lowercased_local_part() {
        assert_eq!(identity("Alice@newpaltz.edu").owner_key(), "alice");
        assert_eq!(identity("bob.smith@example.org").owner_key(), "bob.smith");
    }

    #[test]
    fn role_and_group_checks_are_case_insensitive() {
        let id = identity("a@b.c");
        assert!(id.has_role("student"));
        assert!(!id.has_role("faculty"));
        assert!(id.in_group("Compsci-Students"));
    }
}
