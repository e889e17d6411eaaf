use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Name of a table column / entity field
pub type FieldName = String;

/// Static metadata for one entity type
///
/// An EntityDescriptor describes the table identity and the special columns
/// of one entity type: primary key, optional UUID column, optional active
/// flag, optional timestamp columns, and the key-exposure lists consumed by
/// response-shaping collaborators.
///
/// Descriptors are immutable once constructed. The application builds one
/// per entity type at startup and hands it by reference to the scope
/// registry and the entity repository; the access layer never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    table_name: String,
    schema_name: Option<String>,
    primary_key_field: FieldName,
    uuid_field: Option<FieldName>,
    active_field: Option<FieldName>,
    created_at_field: Option<FieldName>,
    updated_at_field: Option<FieldName>,
    deleted_at_field: Option<FieldName>,
    exposed_primary_key: bool,
    exposed_foreign_keys: BTreeSet<FieldName>,
}

impl EntityDescriptor {
    /// Create a descriptor with the mandatory table identity and primary key
    pub fn new(table_name: impl Into<String>, primary_key_field: impl Into<FieldName>) -> Self {
        Self {
            table_name: table_name.into(),
            schema_name: None,
            primary_key_field: primary_key_field.into(),
            uuid_field: None,
            active_field: None,
            created_at_field: None,
            updated_at_field: None,
            deleted_at_field: None,
            exposed_primary_key: false,
            exposed_foreign_keys: BTreeSet::new(),
        }
    }

    /// Set the schema the table lives in
    pub fn with_schema_name(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = Some(schema_name.into());
        self
    }

    /// Set the column holding the external UUID identifier
    pub fn with_uuid_field(mut self, field: impl Into<FieldName>) -> Self {
        self.uuid_field = Some(field.into());
        self
    }

    /// Set the boolean active-flag column
    pub fn with_active_field(mut self, field: impl Into<FieldName>) -> Self {
        self.active_field = Some(field.into());
        self
    }

    /// Set the creation timestamp column
    pub fn with_created_at_field(mut self, field: impl Into<FieldName>) -> Self {
        self.created_at_field = Some(field.into());
        self
    }

    /// Set the update timestamp column
    pub fn with_updated_at_field(mut self, field: impl Into<FieldName>) -> Self {
        self.updated_at_field = Some(field.into());
        self
    }

    /// Set the soft-delete timestamp column
    pub fn with_deleted_at_field(mut self, field: impl Into<FieldName>) -> Self {
        self.deleted_at_field = Some(field.into());
        self
    }

    /// Mark the primary key as exposed to response shaping
    pub fn with_exposed_primary_key(mut self, exposed: bool) -> Self {
        self.exposed_primary_key = exposed;
        self
    }

    /// Add a foreign-key column exposed to response shaping
    pub fn with_exposed_foreign_key(mut self, field: impl Into<FieldName>) -> Self {
        self.exposed_foreign_keys.insert(field.into());
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.schema_name.as_deref()
    }

    pub fn primary_key_field(&self) -> &str {
        &self.primary_key_field
    }

    pub fn uuid_field(&self) -> Option<&str> {
        self.uuid_field.as_deref()
    }

    pub fn active_field(&self) -> Option<&str> {
        self.active_field.as_deref()
    }

    pub fn created_at_field(&self) -> Option<&str> {
        self.created_at_field.as_deref()
    }

    pub fn updated_at_field(&self) -> Option<&str> {
        self.updated_at_field.as_deref()
    }

    pub fn deleted_at_field(&self) -> Option<&str> {
        self.deleted_at_field.as_deref()
    }

    pub fn exposed_primary_key(&self) -> bool {
        self.exposed_primary_key
    }

    pub fn exposed_foreign_keys(&self) -> &BTreeSet<FieldName> {
        &self.exposed_foreign_keys
    }

    /// The timestamp columns that are actually configured, in
    /// created/updated/deleted order
    pub fn timestamp_fields(&self) -> Vec<FieldName> {
        [
            self.created_at_field.as_ref(),
            self.updated_at_field.as_ref(),
            self.deleted_at_field.as_ref(),
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect()
    }
}
