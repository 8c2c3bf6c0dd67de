//! Materialized path derivation and name validation.

use orgtree_core::config::HierarchyConfig;
use orgtree_core::error::AppError;
use orgtree_core::result::AppResult;
use orgtree_entity::node::EntityNode;

/// Derives a node's path and level from its parent.
///
/// Paths are never patched in place: every value comes from the parent's
/// current path and level.
#[derive(Debug, Clone)]
pub struct PathBuilder {
    separator: String,
    max_name_length: usize,
}

impl PathBuilder {
    /// Creates a builder from the hierarchy settings.
    pub fn new(config: &HierarchyConfig) -> Self {
        Self {
            separator: config.path_separator.clone(),
            max_name_length: config.max_name_length,
        }
    }

    /// The separator placed between path segments.
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Validate an entity name and return its trimmed form.
    pub fn validate_name(&self, name: &str) -> AppResult<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(AppError::validation("Entity name cannot be empty"));
        }
        if trimmed.chars().count() > self.max_name_length {
            return Err(AppError::validation(format!(
                "Entity name exceeds {} characters",
                self.max_name_length
            )));
        }
        if trimmed.contains(self.separator.trim()) {
            return Err(AppError::validation(format!(
                "Entity name cannot contain the path separator '{}'",
                self.separator.trim()
            )));
        }
        Ok(trimmed.to_string())
    }

    /// Path and level of a node named `name` under `parent` (a root when
    /// `parent` is `None`).
    pub fn derive(&self, name: &str, parent: Option<&EntityNode>) -> (String, i32) {
        match parent {
            Some(parent) => self.child_of(&parent.path, parent.level, name),
            None => (name.to_string(), 0),
        }
    }

    /// Path and level of a node named `name` below a parent with the given
    /// path and level.
    pub fn child_of(&self, parent_path: &str, parent_level: i32, name: &str) -> (String, i32) {
        (
            format!("{parent_path}{}{name}", self.separator),
            parent_level + 1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use orgtree_core::ErrorKind;
    use orgtree_entity::node::{EntityType, NewEntityNode};
    use uuid::Uuid;

    fn builder() -> PathBuilder {
        PathBuilder::new(&HierarchyConfig::default())
    }

    #[test]
    fn test_derive_root_and_child() {
        let paths = builder();
        let (path, level) = paths.derive("Acme", None);
        assert_eq!((path.as_str(), level), ("Acme", 0));

        let acme = NewEntityNode {
            tenant_id: Uuid::new_v4(),
            name: "Acme".to_string(),
            entity_type: EntityType::Company,
            parent_id: None,
            path,
            level,
            metadata: serde_json::json!({}),
            created_by: None,
        }
        .into_node(Uuid::new_v4(), Utc::now());

        let (path, level) = paths.derive("Sales", Some(&acme));
        assert_eq!(path, "Acme > Sales");
        assert_eq!(level, 1);
    }

    #[test]
    fn test_validate_name() {
        let paths = builder();
        assert_eq!(paths.validate_name("  Sales ").unwrap(), "Sales");
        assert_eq!(
            paths.validate_name("   ").unwrap_err().kind,
            ErrorKind::Validation
        );
        assert_eq!(
            paths.validate_name("Sales > EMEA").unwrap_err().kind,
            ErrorKind::Validation
        );
        assert!(paths.validate_name("Sales>EMEA").is_err());
    }

    #[test]
    fn test_name_length_counts_characters() {
        let paths = PathBuilder::new(&HierarchyConfig {
            max_name_length: 3,
            ..HierarchyConfig::default()
        });
        assert!(paths.validate_name("Äöü").is_ok());
        assert!(paths.validate_name("Äöüß").is_err());
    }
}
