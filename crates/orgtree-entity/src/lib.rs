//! # orgtree-entity
//!
//! Domain models for OrgTree. [`node::EntityNode`] is the single persisted
//! record; everything else in this crate is a value object built from it
//! or a change description consumed by the tree store.

pub mod node;

pub use node::{EntityNode, EntityType, NodeState};
