use std::future::Future;

use carpark_core::{SessionStatus, SpaceStatus};

use super::{make_alert, make_history, make_session, make_space, make_update, seed_spaces, t0, TestResult};
use crate::record::{SessionFilter, SessionUpdate};
use crate::{ParkStore, StoreError};

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "commit",
        "space_update_and_history_commit_together",
        space_update_and_history_commit_together(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "sweep_shaped_txn_commits_update_history_and_alert",
        sweep_shaped_txn_commits_update_history_and_alert(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "session_shaped_txn_commits_session_and_occupation",
        session_shaped_txn_commits_session_and_occupation(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "failed_commit_applies_nothing",
        failed_commit_applies_nothing(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "session_update_visible_after_commit",
        session_update_visible_after_commit(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// The transition pattern: one space update plus its history entry, staged in
/// one transaction, land together.
async fn space_update_and_history_commit_together<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A')]).await?;

    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    s.update_space(&mut txn, "A001", 0, make_update(SpaceStatus::Occupied, t0()))
        .await
        .map_err(|e| format!("update: {e}"))?;
    s.append_history(
        &mut txn,
        make_history("A001", SpaceStatus::Free, SpaceStatus::Occupied),
    )
    .await
    .map_err(|e| format!("append: {e}"))?;
    s.commit_txn(txn).await.map_err(|e| format!("commit: {e}"))?;

    let rec = s.get_space("A001").await.map_err(|e| format!("get: {e}"))?;
    if rec.status != SpaceStatus::Occupied {
        return Err(format!("expected occupied, got {}", rec.status));
    }
    let history = s
        .history_for_space("A001", 10)
        .await
        .map_err(|e| format!("history: {e}"))?;
    if history.len() != 1 {
        return Err(format!("expected 1 history entry, got {}", history.len()));
    }
    Ok(())
}

/// The sweeper pattern: space freed, expiry history entry, and alert all in
/// one transaction.
async fn sweep_shaped_txn_commits_update_history_and_alert<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A')]).await?;

    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    s.update_space(&mut txn, "A001", 0, make_update(SpaceStatus::Free, t0()))
        .await
        .map_err(|e| format!("update: {e}"))?;
    s.append_history(
        &mut txn,
        make_history("A001", SpaceStatus::Reserved, SpaceStatus::Free),
    )
    .await
    .map_err(|e| format!("append: {e}"))?;
    s.insert_alert(&mut txn, make_alert("Reservation expired"))
        .await
        .map_err(|e| format!("alert: {e}"))?;
    s.commit_txn(txn).await.map_err(|e| format!("commit: {e}"))?;

    let history = s
        .history_for_space("A001", 10)
        .await
        .map_err(|e| format!("history: {e}"))?;
    let alerts = s.list_alerts(10).await.map_err(|e| format!("alerts: {e}"))?;
    if history.len() != 1 || alerts.len() != 1 {
        return Err(format!(
            "expected 1 history + 1 alert, got {} + {}",
            history.len(),
            alerts.len()
        ));
    }
    Ok(())
}

/// The session-start pattern: session insert plus occupation of its space in
/// one transaction.
async fn session_shaped_txn_commits_session_and_occupation<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A')]).await?;

    let session = make_session("A001", "user-1", t0());
    let session_id = session.id;

    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_session(&mut txn, session)
        .await
        .map_err(|e| format!("insert session: {e}"))?;
    let mut update = make_update(SpaceStatus::Occupied, t0());
    update.current_session_id = Some(session_id);
    s.update_space(&mut txn, "A001", 0, update)
        .await
        .map_err(|e| format!("update: {e}"))?;
    s.commit_txn(txn).await.map_err(|e| format!("commit: {e}"))?;

    let rec = s.get_space("A001").await.map_err(|e| format!("get: {e}"))?;
    if rec.current_session_id != Some(session_id) {
        return Err("space not linked to the committed session".to_string());
    }
    let stored = s
        .get_session(session_id)
        .await
        .map_err(|e| format!("get session: {e}"))?;
    if stored.status != SessionStatus::Active {
        return Err(format!("expected active session, got {:?}", stored.status));
    }
    Ok(())
}

/// When commit fails (stale version), none of the transaction's staged
/// records may be applied: no space change, no history, no alert, no session.
async fn failed_commit_applies_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A')]).await?;

    // Stale transaction reads version 0 implicitly by staging against it.
    let mut stale = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    s.update_space(&mut stale, "A001", 0, make_update(SpaceStatus::Reserved, t0()))
        .await
        .map_err(|e| format!("stale update: {e}"))?;
    s.append_history(
        &mut stale,
        make_history("A001", SpaceStatus::Free, SpaceStatus::Reserved),
    )
    .await
    .map_err(|e| format!("stale append: {e}"))?;
    s.insert_alert(&mut stale, make_alert("stale"))
        .await
        .map_err(|e| format!("stale alert: {e}"))?;
    s.insert_session(&mut stale, make_session("A001", "user-1", t0()))
        .await
        .map_err(|e| format!("stale session: {e}"))?;

    // A second writer wins the race and moves the space to version 1.
    let mut winner = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    s.update_space(&mut winner, "A001", 0, make_update(SpaceStatus::Occupied, t0()))
        .await
        .map_err(|e| format!("winner update: {e}"))?;
    s.commit_txn(winner)
        .await
        .map_err(|e| format!("winner commit: {e}"))?;

    match s.commit_txn(stale).await {
        Err(StoreError::Conflict { .. }) => {}
        Err(e) => return Err(format!("expected Conflict, got: {e}")),
        Ok(()) => return Err("stale commit unexpectedly succeeded".to_string()),
    }

    let rec = s.get_space("A001").await.map_err(|e| format!("get: {e}"))?;
    if rec.status != SpaceStatus::Occupied || rec.version != 1 {
        return Err(format!(
            "loser corrupted state: status {}, version {}",
            rec.status, rec.version
        ));
    }
    let history = s
        .history_for_space("A001", 10)
        .await
        .map_err(|e| format!("history: {e}"))?;
    if !history.is_empty() {
        return Err(format!("loser history leaked: {} entries", history.len()));
    }
    let alerts = s.list_alerts(10).await.map_err(|e| format!("alerts: {e}"))?;
    if !alerts.is_empty() {
        return Err(format!("loser alert leaked: {} alerts", alerts.len()));
    }
    let (sessions, total) = s
        .list_sessions(&SessionFilter::default(), 1, 10)
        .await
        .map_err(|e| format!("sessions: {e}"))?;
    if !sessions.is_empty() || total != 0 {
        return Err(format!("loser session leaked: {total} sessions"));
    }
    Ok(())
}

/// update_session applies status, end time, and amount after commit.
async fn session_update_visible_after_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;

    let session = make_session("A001", "user-1", t0());
    let id = session.id;
    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_session(&mut txn, session)
        .await
        .map_err(|e| format!("insert: {e}"))?;
    s.commit_txn(txn).await.map_err(|e| format!("commit: {e}"))?;

    let ended_at = t0() + time::Duration::hours(2);
    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    s.update_session(
        &mut txn,
        id,
        SessionUpdate {
            status: SessionStatus::Ended,
            end_time: Some(ended_at),
            amount: Some(12.5),
        },
    )
    .await
    .map_err(|e| format!("update: {e}"))?;
    s.commit_txn(txn).await.map_err(|e| format!("commit: {e}"))?;

    let stored = s.get_session(id).await.map_err(|e| format!("get: {e}"))?;
    if stored.status != SessionStatus::Ended {
        return Err(format!("expected ended, got {:?}", stored.status));
    }
    if stored.end_time != Some(ended_at) {
        return Err("end_time not applied".to_string());
    }
    if stored.amount != 12.5 {
        return Err(format!("expected amount 12.5, got {}", stored.amount));
    }
    Ok(())
}
