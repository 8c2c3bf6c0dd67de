//! # orgtree-database
//!
//! PostgreSQL connection management, the [`TreeStore`] contract with its
//! PostgreSQL and in-memory implementations, and the dependent-count
//! collaborator consulted before an entity is removed.

pub mod connection;
pub mod dependents;
pub mod migration;
pub mod store;

pub use connection::DatabasePool;
pub use dependents::{DependentCounter, StaticDependents, UserDependents};
pub use store::{MemoryTreeStore, NameQuery, NameScope, PgTreeStore, TreeStore};
