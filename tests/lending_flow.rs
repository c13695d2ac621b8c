use std::path::PathBuf;

use lendhub::model::BookingStatus;
use lendhub::{BookingBucket, Engine, EngineError};

// ── Test infrastructure ──────────────────────────────────────

const HOUR: i64 = 3_600_000;
const DAY: i64 = 24 * HOUR;

fn wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("lendhub_int_test_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn full_sharing_flow_survives_restart() {
    let path = wal_path("full_flow.wal");
    let now = now_ms();

    let (anna, bela, camera) = {
        let engine = Engine::new(path.clone()).unwrap();

        let anna = engine
            .create_user("Anna".into(), "anna@example.com".into())
            .await
            .unwrap();
        let bela = engine
            .create_user("Bela".into(), "bela@example.com".into())
            .await
            .unwrap();

        let camera = engine
            .create_item(
                anna.id,
                "Camera".into(),
                "Mirrorless with two lenses".into(),
                true,
                None,
            )
            .await
            .unwrap();

        // Bela borrowed the camera last month and asks for it again
        let past = engine
            .create_booking(bela.id, camera.id, now - 20 * DAY, now - 18 * DAY)
            .await
            .unwrap();
        engine.decide_booking(anna.id, past.id, true).await.unwrap();

        let upcoming = engine
            .create_booking(bela.id, camera.id, now + 2 * DAY, now + 4 * DAY)
            .await
            .unwrap();
        assert_eq!(upcoming.status, BookingStatus::Waiting);
        engine
            .decide_booking(anna.id, upcoming.id, true)
            .await
            .unwrap();

        // The finished loan lets Bela leave a comment
        engine
            .add_comment(bela.id, camera.id, "Shutter is snappy".into())
            .await
            .unwrap();

        (anna.id, bela.id, camera.id)
    };

    // A fresh process picks up where the old one stopped
    let engine = Engine::new(path).unwrap();

    let dashboard = engine.owner_items_detail(anna).await.unwrap();
    assert_eq!(dashboard.len(), 1);
    let row = &dashboard[0];
    assert_eq!(row.item.id, camera);
    assert!(row.last_booking.is_some());
    assert!(row.next_booking.is_some());
    assert_eq!(row.comments.len(), 1);

    let history = engine
        .list_for_booker(bela, BookingBucket::Past, 0, 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, BookingStatus::Approved);

    let upcoming = engine
        .list_for_booker(bela, BookingBucket::Future, 0, 10)
        .await
        .unwrap();
    assert_eq!(upcoming.len(), 1);
}

#[tokio::test]
async fn browse_via_search_and_requests() {
    let path = wal_path("browse.wal");
    let engine = Engine::new(path).unwrap();

    let owner = engine
        .create_user("Owner".into(), "owner@example.com".into())
        .await
        .unwrap();
    let seeker = engine
        .create_user("Seeker".into(), "seeker@example.com".into())
        .await
        .unwrap();

    engine
        .create_item(
            owner.id,
            "Pressure washer".into(),
            "Electric, 1800 PSI".into(),
            true,
            None,
        )
        .await
        .unwrap();
    engine
        .create_item(
            owner.id,
            "Broken washer".into(),
            "Needs a new pump".into(),
            false,
            None,
        )
        .await
        .unwrap();

    // Search sees only what can actually be borrowed
    let hits = engine.search_items("washer").await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "Pressure washer");
    assert!(engine.search_items("  ").await.is_empty());

    // Nothing matched, so the seeker posts a request instead
    let request = engine
        .create_request(seeker.id, "Looking for a wet vac".into())
        .await
        .unwrap();

    // Owners browse requests from others
    let open = engine.all_requests(owner.id).await.unwrap();
    assert_eq!(open.len(), 1);
    assert!(open[0].items.is_empty());

    // The owner answers the request with a matching listing
    let vac = engine
        .create_item(
            owner.id,
            "Wet vac".into(),
            "20L wet/dry vacuum".into(),
            true,
            Some(request.id),
        )
        .await
        .unwrap();

    let mine = engine.my_requests(seeker.id).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].items.len(), 1);
    assert_eq!(mine[0].items[0].id, vac.id);
}

#[tokio::test]
async fn decision_stays_final_across_restart() {
    let path = wal_path("final_decision.wal");
    let now = now_ms();

    let (owner, booker, booking) = {
        let engine = Engine::new(path.clone()).unwrap();
        let owner = engine
            .create_user("Owner".into(), "owner@example.com".into())
            .await
            .unwrap();
        let booker = engine
            .create_user("Booker".into(), "booker@example.com".into())
            .await
            .unwrap();
        let item = engine
            .create_item(owner.id, "Bike".into(), "City bike".into(), true, None)
            .await
            .unwrap();
        let booking = engine
            .create_booking(booker.id, item.id, now + DAY, now + 2 * DAY)
            .await
            .unwrap();
        engine
            .decide_booking(owner.id, booking.id, false)
            .await
            .unwrap();
        (owner.id, booker.id, booking.id)
    };

    let engine = Engine::new(path).unwrap();
    let fetched = engine.get_booking(booker, booking).await.unwrap();
    assert_eq!(fetched.status, BookingStatus::Rejected);

    // Rejections cannot be reconsidered, not even after a restart
    let result = engine.decide_booking(owner, booking, true).await;
    assert!(matches!(result, Err(EngineError::Forbidden(_))));
}
