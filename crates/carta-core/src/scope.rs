//! Scope registry - metadata-driven query modifiers
//!
//! A scope is a named, reusable query modifier: either a fixed
//! projection/predicate or a factory from a column list to a projection.
//! The registry derives the complete scope set for one entity type from its
//! [`EntityDescriptor`]; scopes whose metadata is absent are simply omitted,
//! never an error.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::descriptor::{EntityDescriptor, FieldName};
use crate::errors::{CartaError, CartaErrorKind, Result};
use crate::query::{Modifier, Predicate, Projection};

/// Recognized scope names
///
/// Fixed, case-sensitive vocabulary. Application-defined scopes must not
/// collide with these.
pub mod names {
    // Without any columns (mostly for applying a filter on a relationship
    // table without selecting anything from it)
    pub const WITHOUT_SELECTING_COLUMNS: &str = "withoutSelectingColumns";

    // Regarding PK
    pub const PRIMARY_KEY_ONLY: &str = "primaryKeyOnly";
    pub const INCLUDING_PRIMARY_KEY: &str = "includingPrimaryKey";

    // Regarding UUID
    pub const PRIMARY_KEY_AND_UUID_ONLY: &str = "primaryKeyAndUuidOnly";
    pub const INCLUDING_PRIMARY_KEY_AND_UUID: &str = "includingPrimaryKeyAndUuid";

    // Regarding other columns
    pub const WITH_COLUMNS: &str = "withColumns";
    pub const WITHOUT_COLUMNS: &str = "withoutColumns";

    // Miscellaneous
    pub const IS_ACTIVE: &str = "isActive";
    pub const WITHOUT_TIMESTAMPS: &str = "withoutTimestamps";

    /// The whole fixed vocabulary, for collision checks
    pub const ALL: [&str; 9] = [
        WITHOUT_SELECTING_COLUMNS,
        PRIMARY_KEY_ONLY,
        INCLUDING_PRIMARY_KEY,
        PRIMARY_KEY_AND_UUID_ONLY,
        INCLUDING_PRIMARY_KEY_AND_UUID,
        WITH_COLUMNS,
        WITHOUT_COLUMNS,
        IS_ACTIVE,
        WITHOUT_TIMESTAMPS,
    ];
}

/// Factory from a column-name list to a modifier, for parametric scopes
pub type ScopeFactory = Arc<dyn Fn(&[FieldName]) -> Modifier + Send + Sync>;

/// A named query modifier: fixed, or parameterized by a column list
#[derive(Clone)]
pub enum Scope {
    /// Fixed projection and/or predicate
    Static(Modifier),
    /// Function from a column list to a modifier
    Parametric(ScopeFactory),
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Static(modifier) => f.debug_tuple("Static").field(modifier).finish(),
            Scope::Parametric(_) => f.debug_tuple("Parametric").field(&"<factory>").finish(),
        }
    }
}

/// A request to apply one named scope
///
/// `columns` feeds parametric scopes and is ignored by static ones.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeCall {
    pub name: String,
    pub columns: Vec<FieldName>,
}

impl ScopeCall {
    /// Apply a scope by name with no column arguments
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Apply a parametric scope with the given columns
    pub fn with_columns<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FieldName>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

/// The complete scope mapping for one entity type
///
/// Built once per entity type from its descriptor (the repository memoizes
/// the build in its constructor). Construction is pure and idempotent:
/// building twice from the same descriptor yields structurally equal
/// mappings.
#[derive(Debug, Clone)]
pub struct ScopeRegistry {
    scopes: BTreeMap<String, Scope>,
}

impl ScopeRegistry {
    /// Derive the scope mapping for the given descriptor
    ///
    /// Rule order is irrelevant to the result; each rule is independent and
    /// conditional rules silently skip when their metadata is absent.
    pub fn for_descriptor(descriptor: &EntityDescriptor) -> Self {
        let mut registry = Self {
            scopes: BTreeMap::new(),
        };

        registry
            .prepare_primary_key_scopes(descriptor)
            .prepare_uuid_key_scopes(descriptor)
            .prepare_column_participation_scopes(descriptor)
            .prepare_timestamps_scopes(descriptor)
            .prepare_active_column_scopes(descriptor);

        registry
    }

    fn prepare_primary_key_scopes(&mut self, descriptor: &EntityDescriptor) -> &mut Self {
        let primary_key: FieldName = descriptor.primary_key_field().to_string();

        self.scopes.insert(
            names::PRIMARY_KEY_ONLY.to_string(),
            Scope::Static(Modifier::projection(Projection::Columns(vec![
                primary_key.clone(),
            ]))),
        );

        self.scopes.insert(
            names::INCLUDING_PRIMARY_KEY.to_string(),
            Scope::Parametric(Arc::new(move |columns| {
                let mut selected = vec![primary_key.clone()];
                selected.extend(columns.iter().cloned());
                Modifier::projection(Projection::Columns(selected))
            })),
        );

        self
    }

    fn prepare_uuid_key_scopes(&mut self, descriptor: &EntityDescriptor) -> &mut Self {
        let Some(uuid_field) = descriptor.uuid_field() else {
            return self;
        };
        let primary_key: FieldName = descriptor.primary_key_field().to_string();
        let uuid_field: FieldName = uuid_field.to_string();

        self.scopes.insert(
            names::PRIMARY_KEY_AND_UUID_ONLY.to_string(),
            Scope::Static(Modifier::projection(Projection::Columns(vec![
                primary_key.clone(),
                uuid_field.clone(),
            ]))),
        );

        self.scopes.insert(
            names::INCLUDING_PRIMARY_KEY_AND_UUID.to_string(),
            Scope::Parametric(Arc::new(move |columns| {
                let mut selected = vec![primary_key.clone(), uuid_field.clone()];
                selected.extend(columns.iter().cloned());
                Modifier::projection(Projection::Columns(selected))
            })),
        );

        self
    }

    fn prepare_column_participation_scopes(&mut self, _descriptor: &EntityDescriptor) -> &mut Self {
        self.scopes.insert(
            names::WITH_COLUMNS.to_string(),
            Scope::Parametric(Arc::new(|columns| {
                Modifier::projection(Projection::Columns(columns.to_vec()))
            })),
        );

        self.scopes.insert(
            names::WITHOUT_COLUMNS.to_string(),
            Scope::Parametric(Arc::new(|columns| {
                Modifier::projection(Projection::Exclude(columns.to_vec()))
            })),
        );

        self.scopes.insert(
            names::WITHOUT_SELECTING_COLUMNS.to_string(),
            Scope::Static(Modifier::projection(Projection::Columns(Vec::new()))),
        );

        self
    }

    fn prepare_timestamps_scopes(&mut self, descriptor: &EntityDescriptor) -> &mut Self {
        let available_timestamps = descriptor.timestamp_fields();

        if !available_timestamps.is_empty() {
            self.scopes.insert(
                names::WITHOUT_TIMESTAMPS.to_string(),
                Scope::Static(Modifier::projection(Projection::Exclude(
                    available_timestamps,
                ))),
            );
        }

        self
    }

    fn prepare_active_column_scopes(&mut self, descriptor: &EntityDescriptor) -> &mut Self {
        if let Some(active_field) = descriptor.active_field() {
            self.scopes.insert(
                names::IS_ACTIVE.to_string(),
                Scope::Static(Modifier::predicate(Predicate::field_eq(active_field, true))),
            );
        }

        self
    }

    /// Register an application-defined scope
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the name collides with the fixed vocabulary or an
    /// already-registered scope.
    pub fn insert_custom(&mut self, name: impl Into<String>, scope: Scope) -> Result<()> {
        let name = name.into();

        if names::ALL.contains(&name.as_str()) || self.scopes.contains_key(&name) {
            return Err(CartaError::new(CartaErrorKind::InvalidInput)
                .with_op("insert_custom_scope")
                .with_message(format!("Scope name '{}' is already taken", name)));
        }

        self.scopes.insert(name, scope);
        Ok(())
    }

    /// Look up a scope by name
    pub fn get(&self, name: &str) -> Option<&Scope> {
        self.scopes.get(name)
    }

    /// True if the registry knows the given name
    pub fn contains(&self, name: &str) -> bool {
        self.scopes.contains_key(name)
    }

    /// All registered scope names, in sorted order
    pub fn scope_names(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }

    /// Resolve scope calls into concrete modifiers, in call order
    ///
    /// Static scopes ignore provided columns; parametric scopes are invoked
    /// with them.
    ///
    /// # Errors
    ///
    /// `UnknownScope` when a call names a scope the registry does not hold.
    pub fn resolve(&self, calls: &[ScopeCall]) -> Result<Vec<Modifier>> {
        calls
            .iter()
            .map(|call| match self.scopes.get(&call.name) {
                Some(Scope::Static(modifier)) => Ok(modifier.clone()),
                Some(Scope::Parametric(factory)) => Ok(factory(&call.columns)),
                None => Err(CartaError::new(CartaErrorKind::UnknownScope)
                    .with_op("resolve_scopes")
                    .with_message(format!("Scope '{}' is not registered", call.name))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_descriptor() -> EntityDescriptor {
        EntityDescriptor::new("customers", "id")
            .with_uuid_field("uuid")
            .with_active_field("is_active")
            .with_created_at_field("created_at")
            .with_updated_at_field("updated_at")
            .with_deleted_at_field("deleted_at")
    }

    fn bare_descriptor() -> EntityDescriptor {
        EntityDescriptor::new("lookup_values", "id")
    }

    #[test]
    fn uuid_scopes_present_iff_uuid_field_configured() {
        let with_uuid = ScopeRegistry::for_descriptor(&full_descriptor());
        assert!(with_uuid.contains(names::PRIMARY_KEY_AND_UUID_ONLY));
        assert!(with_uuid.contains(names::INCLUDING_PRIMARY_KEY_AND_UUID));

        let without_uuid = ScopeRegistry::for_descriptor(&bare_descriptor());
        assert!(!without_uuid.contains(names::PRIMARY_KEY_AND_UUID_ONLY));
        assert!(!without_uuid.contains(names::INCLUDING_PRIMARY_KEY_AND_UUID));
    }

    #[test]
    fn primary_key_only_projects_exactly_the_primary_key() {
        let registry = ScopeRegistry::for_descriptor(&full_descriptor());
        let modifiers = registry
            .resolve(&[ScopeCall::named(names::PRIMARY_KEY_ONLY)])
            .unwrap();
        assert_eq!(
            modifiers[0].projection,
            Some(Projection::Columns(vec!["id".into()]))
        );
        assert!(modifiers[0].predicate.is_none());
    }

    #[test]
    fn including_primary_key_prepends_the_primary_key() {
        let registry = ScopeRegistry::for_descriptor(&full_descriptor());
        let modifiers = registry
            .resolve(&[ScopeCall::with_columns(
                names::INCLUDING_PRIMARY_KEY,
                ["email", "display_name"],
            )])
            .unwrap();
        assert_eq!(
            modifiers[0].projection,
            Some(Projection::Columns(vec![
                "id".into(),
                "email".into(),
                "display_name".into(),
            ]))
        );
    }

    #[test]
    fn including_primary_key_and_uuid_prepends_both() {
        let registry = ScopeRegistry::for_descriptor(&full_descriptor());
        let modifiers = registry
            .resolve(&[ScopeCall::with_columns(
                names::INCLUDING_PRIMARY_KEY_AND_UUID,
                ["email"],
            )])
            .unwrap();
        assert_eq!(
            modifiers[0].projection,
            Some(Projection::Columns(vec![
                "id".into(),
                "uuid".into(),
                "email".into(),
            ]))
        );
    }

    #[test]
    fn without_selecting_columns_is_the_empty_projection() {
        let registry = ScopeRegistry::for_descriptor(&bare_descriptor());
        let modifiers = registry
            .resolve(&[ScopeCall::named(names::WITHOUT_SELECTING_COLUMNS)])
            .unwrap();
        assert_eq!(
            modifiers[0].projection,
            Some(Projection::Columns(Vec::new()))
        );
    }

    #[test]
    fn without_timestamps_excludes_exactly_the_configured_fields() {
        let registry = ScopeRegistry::for_descriptor(&full_descriptor());
        let modifiers = registry
            .resolve(&[ScopeCall::named(names::WITHOUT_TIMESTAMPS)])
            .unwrap();
        assert_eq!(
            modifiers[0].projection,
            Some(Projection::Exclude(vec![
                "created_at".into(),
                "updated_at".into(),
                "deleted_at".into(),
            ]))
        );

        let only_created =
            EntityDescriptor::new("events", "id").with_created_at_field("created_at");
        let registry = ScopeRegistry::for_descriptor(&only_created);
        let modifiers = registry
            .resolve(&[ScopeCall::named(names::WITHOUT_TIMESTAMPS)])
            .unwrap();
        assert_eq!(
            modifiers[0].projection,
            Some(Projection::Exclude(vec!["created_at".into()]))
        );
    }

    #[test]
    fn without_timestamps_absent_when_no_timestamp_configured() {
        let registry = ScopeRegistry::for_descriptor(&bare_descriptor());
        assert!(!registry.contains(names::WITHOUT_TIMESTAMPS));
    }

    #[test]
    fn is_active_requires_boolean_true() {
        let registry = ScopeRegistry::for_descriptor(&full_descriptor());
        let modifiers = registry
            .resolve(&[ScopeCall::named(names::IS_ACTIVE)])
            .unwrap();
        assert_eq!(
            modifiers[0].predicate,
            Some(Predicate::field_eq("is_active", true))
        );

        let registry = ScopeRegistry::for_descriptor(&bare_descriptor());
        assert!(!registry.contains(names::IS_ACTIVE));
    }

    #[test]
    fn build_is_idempotent() {
        let descriptor = full_descriptor();
        let first = ScopeRegistry::for_descriptor(&descriptor);
        let second = ScopeRegistry::for_descriptor(&descriptor);

        let first_names: Vec<_> = first.scope_names().collect();
        let second_names: Vec<_> = second.scope_names().collect();
        assert_eq!(first_names, second_names);

        // Static modifiers and factory outputs agree across builds
        let sample = [
            ScopeCall::named(names::PRIMARY_KEY_ONLY),
            ScopeCall::with_columns(names::WITH_COLUMNS, ["email"]),
            ScopeCall::with_columns(names::WITHOUT_COLUMNS, ["uuid"]),
            ScopeCall::named(names::WITHOUT_TIMESTAMPS),
            ScopeCall::named(names::IS_ACTIVE),
        ];
        assert_eq!(first.resolve(&sample).unwrap(), second.resolve(&sample).unwrap());
    }

    #[test]
    fn unknown_scope_name_is_an_error() {
        let registry = ScopeRegistry::for_descriptor(&bare_descriptor());
        let err = registry
            .resolve(&[ScopeCall::named("noSuchScope")])
            .unwrap_err();
        assert_eq!(err.kind(), CartaErrorKind::UnknownScope);
    }

    #[test]
    fn custom_scope_name_must_not_collide_with_vocabulary() {
        let mut registry = ScopeRegistry::for_descriptor(&bare_descriptor());

        let err = registry
            .insert_custom(
                names::IS_ACTIVE,
                Scope::Static(Modifier::predicate(Predicate::All)),
            )
            .unwrap_err();
        assert_eq!(err.kind(), CartaErrorKind::InvalidInput);

        registry
            .insert_custom(
                "recentlyTouched",
                Scope::Static(Modifier::predicate(Predicate::field_eq("touched", true))),
            )
            .unwrap();
        assert!(registry.contains("recentlyTouched"));
    }

    #[test]
    fn static_scope_ignores_provided_columns() {
        let registry = ScopeRegistry::for_descriptor(&full_descriptor());
        let modifiers = registry
            .resolve(&[ScopeCall::with_columns(
                names::PRIMARY_KEY_ONLY,
                ["email"],
            )])
            .unwrap();
        assert_eq!(
            modifiers[0].projection,
            Some(Projection::Columns(vec!["id".into()]))
        );
    }
}
