//! Entity contract and resolution inputs
//!
//! The access layer is generic over entity types. The [`Entity`] bound is
//! the minimum needed to move values across the engine boundary: cloneable,
//! thread-safe, serde-serializable in both directions.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::descriptor::FieldName;

/// Marker bound for types usable as entities
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> Entity for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Column values for create/update operations
pub type EntityValues = BTreeMap<FieldName, Value>;

/// Merge create values with update values; update wins on key collision
pub fn merge_values(values_to_create: &EntityValues, values_to_update: &EntityValues) -> EntityValues {
    let mut merged = values_to_create.clone();
    merged.extend(
        values_to_update
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    merged
}

/// Tagged input for turning an entity reference into a materialized entity
///
/// Replaces ambiguous runtime type tests (string vs number vs instance) with
/// an explicit variant chosen by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityResolution<E> {
    /// Already materialized; resolution returns it unchanged with no query
    ByInstance(E),
    /// Look up by the descriptor's UUID column (contract error if the
    /// descriptor has none)
    ByUuid(String),
    /// Look up by numeric primary key
    ByKey(i64),
}

/// One enumerated association of an entity
///
/// Consumed by the response-shaping collaborator that strips non-exposed
/// keys from returned entity graphs; the collaborator itself lives outside
/// this workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipLink {
    pub property_key: String,
    pub entities: AssociatedEntities,
}

/// The target side of a relationship link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssociatedEntities {
    One(Value),
    Many(Vec<Value>),
}

/// Association enumeration surface entity types may implement
pub trait AssociationSource {
    /// The associations currently loaded on this instance
    fn relationship_links(&self) -> Vec<RelationshipLink>;
}
