// Integration tests for the transaction coordinator: reentrant
// join/ownership semantics, single commit/rollback by the owning level,
// failure normalization, and recovery handlers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use carta_core::{
    CartaError, CartaErrorKind, EntityDescriptor, EntityValues, ErrorBody, Predicate,
};
use carta_store::{
    EntityCreateOptions, EntityRepository, MemoryEngine, ScopedFindOptions, TransactionCoordinator,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Account {
    id: i64,
    name: String,
    deleted_at: Option<String>,
}

fn descriptor() -> Arc<EntityDescriptor> {
    Arc::new(EntityDescriptor::new("accounts", "id").with_deleted_at_field("deleted_at"))
}

fn setup() -> (
    Arc<MemoryEngine<Account>>,
    TransactionCoordinator<MemoryEngine<Account>>,
) {
    let engine = Arc::new(MemoryEngine::new(descriptor()));
    let coordinator = TransactionCoordinator::new(Arc::clone(&engine));
    (engine, coordinator)
}

fn account_values(name: &str) -> EntityValues {
    EntityValues::from([("name".to_string(), json!(name))])
}

#[tokio::test]
async fn outer_level_owns_and_commits_exactly_once() {
    let (engine, coordinator) = setup();

    let result = coordinator
        .execute(None, |outer| {
            let coordinator = coordinator.clone();
            async move {
                assert!(outer.created_here());

                let inner_value = coordinator
                    .execute(Some(&outer), |inner| async move {
                        // Joined level borrows the handle without ownership
                        assert!(!inner.created_here());
                        Ok(21)
                    })
                    .await?;

                Ok(inner_value * 2)
            }
        })
        .await
        .unwrap();

    assert_eq!(result, 42);
    let counters = engine.counters();
    assert_eq!(counters.begins, 1);
    assert_eq!(counters.commits, 1);
    assert_eq!(counters.rollbacks, 0);
}

#[tokio::test]
async fn joined_level_shares_the_owners_handle() {
    let (engine, coordinator) = setup();

    coordinator
        .execute(None, |outer| {
            let coordinator = coordinator.clone();
            async move {
                let outer_id = outer.handle().id();
                coordinator
                    .execute(Some(&outer), move |inner| async move {
                        assert_eq!(inner.handle().id(), outer_id);
                        Ok(())
                    })
                    .await
            }
        })
        .await
        .unwrap();

    // One begin for the whole chain
    assert_eq!(engine.counters().begins, 1);
}

#[tokio::test]
async fn inner_failure_rolls_back_once_at_the_owning_level() {
    let (engine, coordinator) = setup();

    let result: Result<i32, CartaError> = coordinator
        .execute(None, |outer| {
            let coordinator = coordinator.clone();
            async move {
                coordinator
                    .execute(Some(&outer), |_inner| async move {
                        Err::<i32, _>(
                            CartaError::new(CartaErrorKind::Persistence)
                                .with_message("constraint blew up"),
                        )
                    })
                    .await
            }
        })
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), CartaErrorKind::TransactionFailure);
    // Without a structured body on the cause, the generic body is
    // synthesized
    assert_eq!(err.body().unwrap().code, "ERR_TRANSACTION_FAILURE");

    let counters = engine.counters();
    assert_eq!(counters.begins, 1);
    assert_eq!(counters.commits, 0);
    // The joined level never touched the handle; only the owner unwound it
    assert_eq!(counters.rollbacks, 1);
}

#[tokio::test]
async fn structured_body_on_the_cause_is_reused() {
    let (_engine, coordinator) = setup();

    let body = ErrorBody::new("ERR_QUOTA_EXCEEDED", "account quota exhausted");
    let cause_body = body.clone();

    let err = coordinator
        .execute(None, |_running| async move {
            Err::<(), _>(
                CartaError::new(CartaErrorKind::ConstraintViolation).with_body(cause_body),
            )
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), CartaErrorKind::TransactionFailure);
    assert_eq!(err.body(), Some(&body));
    assert_eq!(
        err.source_error().map(CartaError::kind),
        Some(CartaErrorKind::ConstraintViolation)
    );
}

#[tokio::test]
async fn body_extractor_hook_supplies_the_normalized_body() {
    let (engine, _) = setup();
    let coordinator = TransactionCoordinator::new(Arc::clone(&engine)).with_body_extractor(
        Arc::new(|err| Some(ErrorBody::new("ERR_MAPPED", err.code()))),
    );

    let err = coordinator
        .execute(None, |_running| async move {
            Err::<(), _>(CartaError::new(CartaErrorKind::Timeout))
        })
        .await
        .unwrap_err();

    let body = err.body().unwrap();
    assert_eq!(body.code, "ERR_MAPPED");
    assert_eq!(body.message, "ERR_TIMEOUT");
}

#[tokio::test]
async fn recovery_handler_swallows_the_error() {
    let (engine, coordinator) = setup();

    let value = coordinator
        .execute_with_recovery(
            None,
            |_running| async move {
                Err::<String, _>(
                    CartaError::new(CartaErrorKind::Persistence).with_message("boom"),
                )
            },
            |error| async move {
                // The handler receives the raw cause, not a normalized
                // wrapper
                format!("recovered from {}", error.code())
            },
        )
        .await
        .unwrap();

    assert_eq!(value, "recovered from ERR_PERSISTENCE");
    let counters = engine.counters();
    assert_eq!(counters.rollbacks, 1);
    assert_eq!(counters.commits, 0);
}

#[tokio::test]
async fn recovery_handler_not_invoked_on_success() {
    let (engine, coordinator) = setup();

    let value = coordinator
        .execute_with_recovery(
            None,
            |_running| async move { Ok(7) },
            |_error| async move { -1 },
        )
        .await
        .unwrap();

    assert_eq!(value, 7);
    assert_eq!(engine.counters().commits, 1);
}

#[tokio::test]
async fn failed_unit_of_work_undoes_repository_mutations() {
    let engine = Arc::new(MemoryEngine::<Account>::new(descriptor()));
    let repository = EntityRepository::new(descriptor(), Arc::clone(&engine));

    let result: Result<(), CartaError> = repository
        .coordinator()
        .execute(None, |outer| {
            let repository = &repository;
            async move {
                repository
                    .create_entity(EntityCreateOptions {
                        values_to_create: account_values("first"),
                        transaction: Some(outer.clone()),
                    })
                    .await?;
                repository
                    .create_entity(EntityCreateOptions {
                        values_to_create: account_values("second"),
                        transaction: Some(outer.clone()),
                    })
                    .await?;

                Err(CartaError::new(CartaErrorKind::ConstraintViolation)
                    .with_message("balance check failed"))
            }
        })
        .await;

    assert!(result.is_err());
    let counters = engine.counters();
    assert_eq!(counters.begins, 1);
    assert_eq!(counters.commits, 0);
    assert_eq!(counters.rollbacks, 1);

    // Both creates were rolled back with the owning transaction
    assert_eq!(engine.row_count(), 0);
    let found = repository
        .find_entity(ScopedFindOptions::with_predicate(Predicate::field_eq(
            "name", "first",
        )))
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn committed_unit_of_work_keeps_repository_mutations() {
    let engine = Arc::new(MemoryEngine::<Account>::new(descriptor()));
    let repository = EntityRepository::new(descriptor(), Arc::clone(&engine));

    let created = repository
        .coordinator()
        .execute(None, |outer| {
            let repository = &repository;
            async move {
                repository
                    .create_entity(EntityCreateOptions {
                        values_to_create: account_values("durable"),
                        transaction: Some(outer.clone()),
                    })
                    .await
            }
        })
        .await
        .unwrap();

    assert_eq!(created.name, "durable");
    let counters = engine.counters();
    assert_eq!(counters.begins, 1);
    assert_eq!(counters.commits, 1);
    assert_eq!(engine.row_count(), 1);
}

#[tokio::test]
async fn repository_mutation_without_a_handle_owns_its_own_transaction() {
    let engine = Arc::new(MemoryEngine::<Account>::new(descriptor()));
    let repository = EntityRepository::new(descriptor(), Arc::clone(&engine));

    repository
        .create_entity(EntityCreateOptions {
            values_to_create: account_values("standalone"),
            transaction: None,
        })
        .await
        .unwrap();

    let counters = engine.counters();
    assert_eq!(counters.begins, 1);
    assert_eq!(counters.commits, 1);
    assert_eq!(counters.rollbacks, 0);
}
