//! Query model shared by the scope registry, the repository, and engines
//!
//! A query is a column projection plus a predicate. Scopes contribute
//! [`Modifier`]s; the repository composes them (default scope first, named
//! scopes in caller order) into the final [`Query`] handed to the engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::descriptor::FieldName;

/// Column projection carried by a query
///
/// Absence of a projection means "all columns". `Columns(vec![])` is the
/// legitimate empty projection used when an entity participates only in a
/// predicate or join and nothing is selected from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// Select exactly the listed columns
    Columns(Vec<FieldName>),
    /// Select all columns except the listed ones
    Exclude(Vec<FieldName>),
}

/// Typed query predicate
///
/// Kept deliberately small: the access layer itself only ever builds
/// equality tests and conjunctions; anything richer is the caller's to
/// construct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Matches every record
    All,
    /// Field equals the given JSON value
    Eq(FieldName, Value),
    /// All inner predicates match
    And(Vec<Predicate>),
}

impl Predicate {
    /// Equality test helper
    pub fn field_eq(field: impl Into<FieldName>, value: impl Into<Value>) -> Self {
        Predicate::Eq(field.into(), value.into())
    }

    /// Conjoin two predicates, flattening `All` away
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::All, p) | (p, Predicate::All) => p,
            (Predicate::And(mut inner), p) => {
                inner.push(p);
                Predicate::And(inner)
            }
            (a, b) => Predicate::And(vec![a, b]),
        }
    }

    /// Evaluate against a serialized record
    ///
    /// Missing fields compare as JSON null.
    pub fn matches(&self, record: &serde_json::Map<String, Value>) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Eq(field, expected) => {
                record.get(field.as_str()).unwrap_or(&Value::Null) == expected
            }
            Predicate::And(inner) => inner.iter().all(|p| p.matches(record)),
        }
    }

    /// True if this predicate restricts nothing
    pub fn is_empty(&self) -> bool {
        match self {
            Predicate::All => true,
            Predicate::And(inner) => inner.iter().all(Predicate::is_empty),
            Predicate::Eq(..) => false,
        }
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Predicate::All
    }
}

/// Query modifier contributed by a single scope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Modifier {
    pub projection: Option<Projection>,
    pub predicate: Option<Predicate>,
}

impl Modifier {
    /// Modifier carrying only a projection
    pub fn projection(projection: Projection) -> Self {
        Self {
            projection: Some(projection),
            predicate: None,
        }
    }

    /// Modifier carrying only a predicate
    pub fn predicate(predicate: Predicate) -> Self {
        Self {
            projection: None,
            predicate: Some(predicate),
        }
    }
}

/// The effective query handed to a persistence engine
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// `None` selects all columns
    pub projection: Option<Projection>,
    pub predicate: Predicate,
}

impl Query {
    /// Compose resolved scope modifiers and the caller's predicate
    ///
    /// The implicit default scope (no projection, no predicate) is the
    /// starting point. Modifiers apply in order: a later projection replaces
    /// an earlier one wholesale, predicates conjoin. The caller predicate
    /// conjoins last.
    pub fn compose(modifiers: &[Modifier], caller_predicate: &Predicate) -> Query {
        let mut projection = None;
        let mut predicate = Predicate::All;

        for modifier in modifiers {
            if let Some(p) = &modifier.projection {
                projection = Some(p.clone());
            }
            if let Some(p) = &modifier.predicate {
                predicate = predicate.and(p.clone());
            }
        }

        Query {
            projection,
            predicate: predicate.and(caller_predicate.clone()),
        }
    }
}

impl Default for Query {
    fn default() -> Self {
        Query {
            projection: None,
            predicate: Predicate::All,
        }
    }
}
