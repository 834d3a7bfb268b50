use std::future::Future;

use carpark_core::SpaceStatus;

use super::{make_space, seed_spaces, TestResult};
use crate::record::SpaceFilter;
use crate::ParkStore;

pub(super) async fn run_init_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "init",
        "replace_all_creates_spaces_at_version_0",
        replace_all_creates_spaces_at_version_0(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "replace_all_spaces_readable_after_commit",
        replace_all_spaces_readable_after_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "list_spaces_ordered_by_number_ascending",
        list_spaces_ordered_by_number_ascending(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "replace_all_wipes_previous_registry",
        replace_all_wipes_previous_registry(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "replace_all_leaves_history_untouched",
        replace_all_leaves_history_untouched(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "replace_all_with_empty_set_clears_registry",
        replace_all_with_empty_set_clears_registry(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// A freshly seeded registry holds every space at version 0, free, with no
/// reservation or session attached.
async fn replace_all_creates_spaces_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A'), make_space("A002", 'A')]).await?;

    for number in ["A001", "A002"] {
        let rec = s.get_space(number).await.map_err(|e| format!("get: {e}"))?;
        if rec.version != 0 {
            return Err(format!("{number}: expected version 0, got {}", rec.version));
        }
        if rec.status != SpaceStatus::Free {
            return Err(format!("{number}: expected free, got {}", rec.status));
        }
        if rec.reservation.is_some() || rec.current_session_id.is_some() {
            return Err(format!("{number}: fresh space carries stale attachments"));
        }
    }
    Ok(())
}

/// After seeding, get_space returns the exact record that was written.
async fn replace_all_spaces_readable_after_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("B004", 'B')]).await?;

    let rec = s.get_space("B004").await.map_err(|e| format!("get: {e}"))?;
    if rec.number != "B004" || rec.zone != 'B' {
        return Err(format!("expected B004/B, got {}/{}", rec.number, rec.zone));
    }
    Ok(())
}

/// list_spaces returns all spaces ordered by number ascending regardless of
/// insertion order.
async fn list_spaces_ordered_by_number_ascending<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(
        &s,
        vec![
            make_space("C001", 'C'),
            make_space("A002", 'A'),
            make_space("B001", 'B'),
            make_space("A001", 'A'),
        ],
    )
    .await?;

    let spaces = s
        .list_spaces(&SpaceFilter::default())
        .await
        .map_err(|e| format!("list: {e}"))?;
    let numbers: Vec<&str> = spaces.iter().map(|s| s.number.as_str()).collect();
    if numbers != ["A001", "A002", "B001", "C001"] {
        return Err(format!("wrong order: {numbers:?}"));
    }
    Ok(())
}

/// Re-seeding replaces the registry wholesale: old spaces vanish.
async fn replace_all_wipes_previous_registry<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A'), make_space("A002", 'A')]).await?;
    seed_spaces(&s, vec![make_space("Z001", 'Z')]).await?;

    let spaces = s
        .list_spaces(&SpaceFilter::default())
        .await
        .map_err(|e| format!("list: {e}"))?;
    if spaces.len() != 1 || spaces[0].number != "Z001" {
        return Err(format!(
            "expected only Z001 after re-seed, got {:?}",
            spaces.iter().map(|s| &s.number).collect::<Vec<_>>()
        ));
    }
    match s.get_space("A001").await {
        Err(crate::StoreError::SpaceNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected SpaceNotFound for A001, got: {e}")),
        Ok(_) => Err("A001 still present after re-seed".to_string()),
    }
}

/// Replacing the registry does not delete existing history entries.
async fn replace_all_leaves_history_untouched<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A')]).await?;

    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    s.append_history(
        &mut txn,
        super::make_history("A001", SpaceStatus::Free, SpaceStatus::Occupied),
    )
    .await
    .map_err(|e| format!("append: {e}"))?;
    s.commit_txn(txn).await.map_err(|e| format!("commit: {e}"))?;

    seed_spaces(&s, vec![make_space("B001", 'B')]).await?;

    let history = s
        .history_for_space("A001", 10)
        .await
        .map_err(|e| format!("history: {e}"))?;
    if history.len() != 1 {
        return Err(format!(
            "expected A001 history to survive re-seed, got {} entries",
            history.len()
        ));
    }
    Ok(())
}

/// Seeding with an empty set leaves an empty registry.
async fn replace_all_with_empty_set_clears_registry<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A')]).await?;
    seed_spaces(&s, Vec::new()).await?;

    let spaces = s
        .list_spaces(&SpaceFilter::default())
        .await
        .map_err(|e| format!("list: {e}"))?;
    if !spaces.is_empty() {
        return Err(format!("expected empty registry, got {} spaces", spaces.len()));
    }
    Ok(())
}
