use std::future::Future;

use carpark_core::{SessionStatus, SpaceStatus};
use time::Duration;

use super::{
    make_alert, make_history, make_session, make_space, make_update, seed_spaces, t0, TestResult,
};
use crate::record::{SessionFilter, SpaceFilter};
use crate::ParkStore;

pub(super) async fn run_query_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "query",
        "list_spaces_order_survives_insert_order",
        list_spaces_order_survives_insert_order(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "list_spaces_filters_by_zone_and_status",
        list_spaces_filters_by_zone_and_status(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "history_for_space_newest_first_with_limit",
        history_for_space_newest_first_with_limit(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "list_history_paginates_newest_first",
        list_history_paginates_newest_first(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "list_alerts_newest_first_and_mark_read",
        list_alerts_newest_first_and_mark_read(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "list_sessions_filters_and_paginates",
        list_sessions_filters_and_paginates(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "pagination_handles_huge_page_numbers",
        pagination_handles_huge_page_numbers(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// list_spaces returns number-ascending order regardless of insert order.
async fn list_spaces_order_survives_insert_order<S, F, Fut>(factory: &F) -> Result<(), String>
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

/// Zone and status filters compose; an empty filter matches everything.
async fn list_spaces_filters_by_zone_and_status<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(
        &s,
        vec![
            make_space("A001", 'A'),
            make_space("A002", 'A'),
            make_space("B001", 'B'),
        ],
    )
    .await?;

    // Occupy A002 so status filtering has something to separate.
    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    s.update_space(&mut txn, "A002", 0, make_update(SpaceStatus::Occupied, t0()))
        .await
        .map_err(|e| format!("update: {e}"))?;
    s.commit_txn(txn).await.map_err(|e| format!("commit: {e}"))?;

    let zone_a = s
        .list_spaces(&SpaceFilter {
            zone: Some('A'),
            status: None,
        })
        .await
        .map_err(|e| format!("zone filter: {e}"))?;
    if zone_a.len() != 2 {
        return Err(format!("expected 2 zone-A spaces, got {}", zone_a.len()));
    }

    let free = s
        .list_spaces(&SpaceFilter {
            zone: None,
            status: Some(SpaceStatus::Free),
        })
        .await
        .map_err(|e| format!("status filter: {e}"))?;
    if free.len() != 2 {
        return Err(format!("expected 2 free spaces, got {}", free.len()));
    }

    let free_in_a = s
        .list_spaces(&SpaceFilter {
            zone: Some('A'),
            status: Some(SpaceStatus::Free),
        })
        .await
        .map_err(|e| format!("combined filter: {e}"))?;
    if free_in_a.len() != 1 || free_in_a[0].number != "A001" {
        return Err(format!(
            "expected only A001 free in zone A, got {:?}",
            free_in_a.iter().map(|s| &s.number).collect::<Vec<_>>()
        ));
    }
    Ok(())
}

/// Per-space history comes back newest first, truncated to the limit, and
/// never includes other spaces' entries.
async fn history_for_space_newest_first_with_limit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A'), make_space("B001", 'B')]).await?;

    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    for i in 0..5 {
        let mut entry = make_history("A001", SpaceStatus::Free, SpaceStatus::Occupied);
        entry.reason = format!("step-{i}");
        entry.timestamp = t0() + Duration::minutes(i);
        s.append_history(&mut txn, entry)
            .await
            .map_err(|e| format!("append {i}: {e}"))?;
    }
    s.append_history(
        &mut txn,
        make_history("B001", SpaceStatus::Free, SpaceStatus::Occupied),
    )
    .await
    .map_err(|e| format!("append other: {e}"))?;
    s.commit_txn(txn).await.map_err(|e| format!("commit: {e}"))?;

    let entries = s
        .history_for_space("A001", 3)
        .await
        .map_err(|e| format!("history: {e}"))?;
    if entries.len() != 3 {
        return Err(format!("expected 3 entries, got {}", entries.len()));
    }
    let reasons: Vec<&str> = entries.iter().map(|e| e.reason.as_str()).collect();
    if reasons != ["step-4", "step-3", "step-2"] {
        return Err(format!("wrong order: {reasons:?}"));
    }
    if entries.iter().any(|e| e.space_number != "A001") {
        return Err("foreign space entry leaked into per-space history".to_string());
    }
    Ok(())
}

/// Global history pagination: newest first, 1-based pages, accurate total.
async fn list_history_paginates_newest_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A')]).await?;

    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    for i in 0..7 {
        let mut entry = make_history("A001", SpaceStatus::Free, SpaceStatus::Occupied);
        entry.reason = format!("step-{i}");
        s.append_history(&mut txn, entry)
            .await
            .map_err(|e| format!("append {i}: {e}"))?;
    }
    s.commit_txn(txn).await.map_err(|e| format!("commit: {e}"))?;

    let (page1, total) = s
        .list_history(1, 3)
        .await
        .map_err(|e| format!("page 1: {e}"))?;
    if total != 7 {
        return Err(format!("expected total 7, got {total}"));
    }
    let reasons: Vec<&str> = page1.iter().map(|e| e.reason.as_str()).collect();
    if reasons != ["step-6", "step-5", "step-4"] {
        return Err(format!("wrong page 1: {reasons:?}"));
    }

    let (page3, _) = s
        .list_history(3, 3)
        .await
        .map_err(|e| format!("page 3: {e}"))?;
    if page3.len() != 1 || page3[0].reason != "step-0" {
        return Err(format!(
            "wrong page 3: {:?}",
            page3.iter().map(|e| &e.reason).collect::<Vec<_>>()
        ));
    }

    let (page4, _) = s
        .list_history(4, 3)
        .await
        .map_err(|e| format!("page 4: {e}"))?;
    if !page4.is_empty() {
        return Err(format!("expected empty page past end, got {}", page4.len()));
    }
    Ok(())
}

/// Alerts come back newest first; mark_alert_read flips exactly one flag.
async fn list_alerts_newest_first_and_mark_read<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;

    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    let first = make_alert("first");
    let second = make_alert("second");
    let first_id = first.id;
    s.insert_alert(&mut txn, first)
        .await
        .map_err(|e| format!("insert first: {e}"))?;
    s.insert_alert(&mut txn, second)
        .await
        .map_err(|e| format!("insert second: {e}"))?;
    s.commit_txn(txn).await.map_err(|e| format!("commit: {e}"))?;

    let alerts = s.list_alerts(10).await.map_err(|e| format!("list: {e}"))?;
    let titles: Vec<&str> = alerts.iter().map(|a| a.title.as_str()).collect();
    if titles != ["second", "first"] {
        return Err(format!("wrong order: {titles:?}"));
    }

    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    s.mark_alert_read(&mut txn, first_id)
        .await
        .map_err(|e| format!("mark read: {e}"))?;
    s.commit_txn(txn).await.map_err(|e| format!("commit: {e}"))?;

    let alerts = s.list_alerts(10).await.map_err(|e| format!("list: {e}"))?;
    for alert in &alerts {
        let expect_read = alert.id == first_id;
        if alert.read != expect_read {
            return Err(format!(
                "alert \"{}\": expected read={expect_read}, got {}",
                alert.title, alert.read
            ));
        }
    }
    Ok(())
}

/// Session listing filters by status and user, sorts newest start first,
/// and reports the filtered total.
async fn list_sessions_filters_and_paginates<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;

    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    for i in 0..4 {
        let mut session = make_session(&format!("A00{}", i + 1), "user-1", t0() + Duration::hours(i));
        if i == 0 {
            session.status = SessionStatus::Ended;
            session.end_time = Some(t0() + Duration::hours(1));
        }
        s.insert_session(&mut txn, session)
            .await
            .map_err(|e| format!("insert {i}: {e}"))?;
    }
    s.insert_session(&mut txn, make_session("B001", "user-2", t0()))
        .await
        .map_err(|e| format!("insert other user: {e}"))?;
    s.commit_txn(txn).await.map_err(|e| format!("commit: {e}"))?;

    let (active, total) = s
        .list_sessions(
            &SessionFilter {
                status: Some(SessionStatus::Active),
                user_id: Some("user-1".to_string()),
                started_after: None,
            },
            1,
            2,
        )
        .await
        .map_err(|e| format!("list: {e}"))?;
    if total != 3 {
        return Err(format!("expected 3 active user-1 sessions, got {total}"));
    }
    if active.len() != 2 {
        return Err(format!("expected page of 2, got {}", active.len()));
    }
    // Newest start first.
    if active[0].start_time < active[1].start_time {
        return Err("sessions not sorted newest first".to_string());
    }

    let (recent, recent_total) = s
        .list_sessions(
            &SessionFilter {
                status: None,
                user_id: None,
                started_after: Some(t0() + Duration::hours(2)),
            },
            1,
            10,
        )
        .await
        .map_err(|e| format!("started_after: {e}"))?;
    if recent_total != 2 || recent.len() != 2 {
        return Err(format!(
            "expected 2 sessions started after +2h, got {recent_total}"
        ));
    }
    Ok(())
}

/// A page number near `usize::MAX` must not overflow the page offset; it
/// is simply an empty page past the end, with the total intact.
async fn pagination_handles_huge_page_numbers<S, F, Fut>(factory: &F) -> Result<(), String>
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
        make_history("A001", SpaceStatus::Free, SpaceStatus::Occupied),
    )
    .await
    .map_err(|e| format!("append: {e}"))?;
    s.insert_session(&mut txn, make_session("A001", "user-1", t0()))
        .await
        .map_err(|e| format!("insert session: {e}"))?;
    s.commit_txn(txn).await.map_err(|e| format!("commit: {e}"))?;

    let (entries, total) = s
        .list_history(usize::MAX, 500)
        .await
        .map_err(|e| format!("history: {e}"))?;
    if !entries.is_empty() || total != 1 {
        return Err(format!(
            "expected empty history page with total 1, got {} entries, total {total}",
            entries.len()
        ));
    }

    let (sessions, total) = s
        .list_sessions(&SessionFilter::default(), usize::MAX, 500)
        .await
        .map_err(|e| format!("sessions: {e}"))?;
    if !sessions.is_empty() || total != 1 {
        return Err(format!(
            "expected empty session page with total 1, got {} sessions, total {total}",
            sessions.len()
        ));
    }
    Ok(())
}
