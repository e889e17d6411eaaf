//! carta-core - Metadata-driven entity access primitives
//!
//! This crate provides the domain core of the carta access layer:
//! - Entity descriptor metadata (table identity and special columns)
//! - The scope registry deriving named query modifiers from a descriptor
//! - The query model (projection, predicate, modifier composition)
//! - Tagged entity-resolution inputs
//! - The structured error facility
//! - The logging facility (init + canonical op-logging macros)
//!
//! The transactional repository and the persistence-engine contract live in
//! `carta-store`, layered on top of this crate.

pub mod descriptor;
pub mod entity;
pub mod errors;
pub mod logging_facility;
pub mod query;
pub mod scope;

// Re-export commonly used types
pub use descriptor::{EntityDescriptor, FieldName};
pub use entity::{
    merge_values, AssociatedEntities, AssociationSource, Entity, EntityResolution, EntityValues,
    RelationshipLink,
};
pub use errors::{CartaError, CartaErrorKind, ErrorBody, Result};
pub use query::{Modifier, Predicate, Projection, Query};
pub use scope::{Scope, ScopeCall, ScopeFactory, ScopeRegistry};
