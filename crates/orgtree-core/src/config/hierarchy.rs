//! Hierarchy shape and naming configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Scope within which active entity names must be unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameUniqueness {
    /// Unique across every tenant.
    Global,
    /// Unique within one tenant.
    Tenant,
    /// Unique among active siblings under the same parent.
    #[default]
    Siblings,
    /// No uniqueness enforcement.
    None,
}

impl fmt::Display for NameUniqueness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Global => "global",
            Self::Tenant => "tenant",
            Self::Siblings => "siblings",
            Self::None => "none",
        };
        f.write_str(s)
    }
}

/// Tree-shape limits and naming policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Separator placed between names in a materialized path.
    #[serde(default = "default_separator")]
    pub path_separator: String,
    /// Deepest level a node may occupy (roots are level 0).
    #[serde(default = "default_max_depth")]
    pub max_depth: i32,
    /// Maximum entity name length in characters.
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    /// Rows per bulk update statement while cascading.
    #[serde(default = "default_cascade_batch_size")]
    pub cascade_batch_size: usize,
    /// Name uniqueness policy.
    #[serde(default)]
    pub name_uniqueness: NameUniqueness,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            path_separator: default_separator(),
            max_depth: default_max_depth(),
            max_name_length: default_max_name_length(),
            cascade_batch_size: default_cascade_batch_size(),
            name_uniqueness: NameUniqueness::default(),
        }
    }
}

impl HierarchyConfig {
    /// Reject settings that would make the tree unusable.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.path_separator.trim().is_empty() {
            return Err(AppError::configuration(
                "hierarchy.path_separator must contain a visible character",
            ));
        }
        if self.max_depth < 0 {
            return Err(AppError::configuration(
                "hierarchy.max_depth must not be negative",
            ));
        }
        if self.max_name_length == 0 {
            return Err(AppError::configuration(
                "hierarchy.max_name_length must be positive",
            ));
        }
        if self.cascade_batch_size == 0 {
            return Err(AppError::configuration(
                "hierarchy.cascade_batch_size must be positive",
            ));
        }
        Ok(())
    }
}

fn default_separator() -> String {
    " > ".to_string()
}

fn default_max_depth() -> i32 {
    32
}

fn default_max_name_length() -> usize {
    255
}

fn default_cascade_batch_size() -> usize {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HierarchyConfig::default();
        assert_eq!(config.path_separator, " > ");
        assert_eq!(config.name_uniqueness, NameUniqueness::Siblings);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_separator_rejected() {
        let config = HierarchyConfig {
            path_separator: "  ".to_string(),
            ..HierarchyConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_name_uniqueness_from_lowercase() {
        let parsed: NameUniqueness = serde_json::from_str("\"tenant\"").unwrap();
        assert_eq!(parsed, NameUniqueness::Tenant);
        assert_eq!(NameUniqueness::None.to_string(), "none");
    }
}
