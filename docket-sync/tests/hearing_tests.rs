//! Hearing pass tests: ordered step execution and snapshot handling

mod helpers;

use docket_sync::db::{failures, hearings, mappings};
use docket_sync::error::BoardError;
use docket_sync::models::HearingStatus;
use helpers::*;

const ACTIVE: i32 = 0;
const CANCELLED: i32 = 1;
const TRANSFERRED: i32 = 2;

/// One onboarded case with no hearing yet
async fn onboarded() -> Harness {
    let h = Harness::new(vec![case(1, Some(at(2024, 3, 1, 10)))]).await;
    h.run().await;
    h.board.clear_calls();
    h
}

fn hearing_calls(h: &Harness) -> Vec<String> {
    h.board
        .calls()
        .into_iter()
        .filter(|c| c.contains("hearing"))
        .collect()
}

#[tokio::test]
async fn test_new_hearing_sets_details_before_status() {
    let h = onboarded().await;
    h.source
        .set_hearings(vec![hearing(10, 1, at(2024, 6, 10, 9), ACTIVE)]);

    let stats = h.run().await;
    assert_eq!(stats.hearing_updates, 1);
    assert_eq!(
        hearing_calls(&h),
        vec![
            "update_hearing_location",
            "update_hearing_date",
            "set_hearing_status"
        ]
    );

    let mapping = mappings::get(&h.pool, 1).await.unwrap().unwrap();
    let item = h.board.item(&mapping.item_id).unwrap();
    assert_eq!(item.hearing_status.as_deref(), Some("active"));
    assert_eq!(item.hearing_date, Some(at(2024, 6, 10, 9)));
    assert_eq!(item.hearing_city.as_deref(), Some("Haifa"));
    assert!(mapping.hearing_checksum.is_some());

    let snapshot = hearings::get_snapshot(&h.pool, 1, BOARD_ID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.status, HearingStatus::Active.code());
    assert_eq!(snapshot.starts_at, at(2024, 6, 10, 9));
}

#[tokio::test]
async fn test_unchanged_hearing_writes_nothing() {
    let h = onboarded().await;
    h.source
        .set_hearings(vec![hearing(10, 1, at(2024, 6, 10, 9), ACTIVE)]);
    h.run().await;
    h.board.clear_calls();

    let stats = h.run().await;
    assert_eq!(stats.hearing_updates, 0);
    assert!(hearing_calls(&h).is_empty());
}

#[tokio::test]
async fn test_reschedule_shows_status_before_new_date() {
    let h = onboarded().await;
    h.source
        .set_hearings(vec![hearing(10, 1, at(2024, 6, 10, 9), ACTIVE)]);
    h.run().await;
    h.board.clear_calls();

    let mut moved = hearing(10, 1, at(2024, 6, 20, 11), TRANSFERRED);
    moved.city = Some("Nazareth".to_string());
    h.source.set_hearings(vec![moved]);

    assert_eq!(h.run().await.hearing_updates, 1);
    assert_eq!(
        hearing_calls(&h),
        vec![
            "set_hearing_status",
            "update_hearing_location",
            "update_hearing_date"
        ]
    );
    let mapping = mappings::get(&h.pool, 1).await.unwrap().unwrap();
    let item = h.board.item(&mapping.item_id).unwrap();
    assert_eq!(item.hearing_status.as_deref(), Some("rescheduled"));
    assert_eq!(item.hearing_city.as_deref(), Some("Nazareth"));
}

#[tokio::test]
async fn test_cancellation_only_sets_status() {
    let h = onboarded().await;
    h.source
        .set_hearings(vec![hearing(10, 1, at(2024, 6, 10, 9), ACTIVE)]);
    h.run().await;
    h.board.clear_calls();

    h.source
        .set_hearings(vec![hearing(10, 1, at(2024, 6, 10, 9), CANCELLED)]);
    h.run().await;

    assert_eq!(hearing_calls(&h), vec!["set_hearing_status"]);
    let mapping = mappings::get(&h.pool, 1).await.unwrap().unwrap();
    let item = h.board.item(&mapping.item_id).unwrap();
    assert_eq!(item.hearing_status.as_deref(), Some("cancelled"));
    // Date left untouched
    assert_eq!(item.hearing_date, Some(at(2024, 6, 10, 9)));
}

#[tokio::test]
async fn test_past_hearings_are_ignored_and_nearest_wins() {
    let h = onboarded().await;
    h.source.set_hearings(vec![
        hearing(10, 1, at(2024, 5, 1, 9), ACTIVE),
        hearing(11, 1, at(2024, 7, 1, 9), ACTIVE),
        hearing(12, 1, at(2024, 6, 5, 9), ACTIVE),
    ]);

    h.run().await;
    let snapshot = hearings::get_snapshot(&h.pool, 1, BOARD_ID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.starts_at, at(2024, 6, 5, 9));
}

#[tokio::test]
async fn test_partial_failure_keeps_prior_snapshot() {
    let h = onboarded().await;
    h.source
        .set_hearings(vec![hearing(10, 1, at(2024, 6, 10, 9), ACTIVE)]);
    h.board.fail_always(
        "update_hearing_date",
        BoardError::Http { status: 400, message: "bad date".into() },
    );

    let stats = h.run().await;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.hearing_updates, 0);
    assert_eq!(
        hearing_calls(&h),
        vec!["update_hearing_location", "update_hearing_date"]
    );
    assert!(hearings::get_snapshot(&h.pool, 1, BOARD_ID)
        .await
        .unwrap()
        .is_none());
    assert!(mappings::get(&h.pool, 1)
        .await
        .unwrap()
        .unwrap()
        .hearing_checksum
        .is_none());

    // Next run retries the whole sequence from the last known good state
    h.board.clear_failures();
    h.board.clear_calls();
    assert_eq!(h.run().await.hearing_updates, 1);
    assert_eq!(hearing_calls(&h).len(), 3);
}

#[tokio::test]
async fn test_recovered_hearing_resolves_dead_letter_entry() {
    let h = onboarded().await;
    h.source
        .set_hearings(vec![hearing(10, 1, at(2024, 6, 10, 9), ACTIVE)]);
    h.board.fail_always(
        "update_hearing_date",
        BoardError::Http { status: 400, message: "bad date".into() },
    );

    assert_eq!(h.run().await.failed, 1);
    assert_eq!(failures::count_unresolved(&h.pool).await.unwrap(), 1);

    h.board.clear_failures();
    let stats = h.run().await;
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.hearing_updates, 1);
    assert_eq!(failures::count_unresolved(&h.pool).await.unwrap(), 0);
}

#[tokio::test]
async fn test_hearing_only_pass() {
    let h = onboarded().await;
    h.source
        .set_hearings(vec![hearing(10, 1, at(2024, 6, 10, 9), ACTIVE)]);

    let stats = h.run_hearings().await;
    assert_eq!(stats.hearing_updates, 1);
    assert_eq!(stats.created, 0);
    assert_eq!(h.board.count_calls("find_item_by_value"), 0);
}

#[tokio::test]
async fn test_unmapped_case_hearing_is_ignored() {
    let h = onboarded().await;
    h.source
        .set_hearings(vec![hearing(10, 99, at(2024, 6, 10, 9), ACTIVE)]);

    assert_eq!(h.run().await.hearing_updates, 0);
    assert!(hearing_calls(&h).is_empty());
}
