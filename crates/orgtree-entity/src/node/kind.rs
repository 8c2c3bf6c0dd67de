//! Entity type enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of organizational unit a node represents.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    sqlx::Type,
)]
#[sqlx(type_name = "entity_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// A generic organizational entity.
    #[default]
    Generic,
    /// A company.
    Company,
    /// A department inside a company or another department.
    Department,
}

impl EntityType {
    /// All entity types, in display order.
    pub const ALL: [EntityType; 3] = [Self::Generic, Self::Company, Self::Department];

    /// Return the type as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Company => "company",
            Self::Department => "department",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = orgtree_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "generic" | "entity" => Ok(Self::Generic),
            "company" => Ok(Self::Company),
            "department" => Ok(Self::Department),
            _ => Err(orgtree_core::AppError::validation(format!(
                "Invalid entity type: '{s}'. Expected one of: generic, company, department"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!("company".parse::<EntityType>().unwrap(), EntityType::Company);
        assert_eq!(
            " Department ".parse::<EntityType>().unwrap(),
            EntityType::Department
        );
        assert_eq!("entity".parse::<EntityType>().unwrap(), EntityType::Generic);
        assert!("division".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&EntityType::Department).unwrap();
        assert_eq!(json, "\"department\"");
    }
}
