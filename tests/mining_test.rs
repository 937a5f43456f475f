mod helpers;

use exocortex::patterns::{Pattern, PatternKey, PatternKind, PatternPayload, PatternStore};
use helpers::{co_occurrences, default_miner, frequency_count, ingest, read_at, sqlite_stores};

#[test]
fn redelivered_events_never_inflate_counters() {
    let (_db, events, patterns) = sqlite_stores();
    let miner = default_miner();

    ingest(&events, &patterns, &miner, read_at("/proj/a.txt", 0, "s1"));
    ingest(&events, &patterns, &miner, read_at("/proj/b.txt", 20, "s1"));
    assert_eq!(co_occurrences(&patterns, "/proj/a.txt", "/proj/b.txt"), 1);

    // At-least-once delivery: the same operations arrive again
    let again_a = ingest(&events, &patterns, &miner, read_at("/proj/a.txt", 0, "s1"));
    let again_b = ingest(&events, &patterns, &miner, read_at("/proj/b.txt", 20, "s1"));
    assert!(again_a.duplicate && again_b.duplicate);

    assert_eq!(co_occurrences(&patterns, "/proj/a.txt", "/proj/b.txt"), 1);
    assert_eq!(frequency_count(&patterns, "/proj/a.txt"), 1);
    assert_eq!(frequency_count(&patterns, "/proj/b.txt"), 1);

    // A genuinely new access does count
    ingest(&events, &patterns, &miner, read_at("/proj/a.txt", 40, "s1"));
    assert_eq!(co_occurrences(&patterns, "/proj/a.txt", "/proj/b.txt"), 2);
    assert_eq!(frequency_count(&patterns, "/proj/a.txt"), 2);
}

#[test]
fn hidden_paths_are_stored_but_never_mined() {
    let (_db, events, patterns) = sqlite_stores();
    let miner = default_miner();

    ingest(&events, &patterns, &miner, read_at("/proj/main.rs", 0, "s1"));
    let hidden = ingest(&events, &patterns, &miner, read_at("/proj/.git/index", 5, "s1"));
    ingest(&events, &patterns, &miner, read_at("/proj/lib.rs", 10, "s1"));

    assert!(!hidden.duplicate);
    assert_eq!(frequency_count(&patterns, "/proj/.git/index"), 0);
    assert_eq!(co_occurrences(&patterns, "/proj/main.rs", "/proj/.git/index"), 0);
    assert_eq!(co_occurrences(&patterns, "/proj/main.rs", "/proj/lib.rs"), 1);
    assert!(patterns
        .get(&PatternKey::directory("/proj/.git"))
        .unwrap()
        .is_none());
}

#[test]
fn sequential_pattern_tracks_delay() {
    let (_db, events, patterns) = sqlite_stores();
    let miner = default_miner();

    for (i, session) in ["s1", "s2", "s3"].iter().enumerate() {
        let base = i as i64 * 3600;
        ingest(&events, &patterns, &miner, read_at("/proj/outline.md", base, session));
        ingest(&events, &patterns, &miner, read_at("/proj/impl.rs", base + 120, session));
    }

    let seq = patterns
        .get(&PatternKey::sequential("/proj/outline.md", "/proj/impl.rs"))
        .unwrap()
        .unwrap();
    match &seq.payload {
        PatternPayload::Sequential { occurrences, delay, .. } => {
            assert_eq!(*occurrences, 3);
            assert!((delay.mean_ms - 120_000.0).abs() < 1e-6);
        }
        other => panic!("unexpected payload {other:?}"),
    }
    // Identical delays: full consistency bonus, clamped to 1
    assert!((seq.confidence - 1.0).abs() < 1e-9);

    // The reverse direction never happened within the delay window
    assert!(patterns
        .get(&PatternKey::sequential("/proj/impl.rs", "/proj/outline.md"))
        .unwrap()
        .is_none());
}

#[test]
fn rebuild_on_sqlite_reproduces_out_of_order_ingestion() {
    let (_db, events, patterns) = sqlite_stores();
    let miner = default_miner();

    // Deliberately delivered out of timestamp order
    for (path, secs, session) in [
        ("/proj/b.txt", 40, "s1"),
        ("/proj/a.txt", 0, "s1"),
        ("/proj/c.md", 90, "s1"),
        ("/proj/a.txt", 400, "s2"),
        ("/proj/b.txt", 380, "s2"),
        ("/docs/d.md", 60, "s1"),
    ] {
        ingest(&events, &patterns, &miner, read_at(path, secs, session));
    }

    let snapshot = |store: &dyn PatternStore| -> Vec<Pattern> {
        let mut all: Vec<Pattern> = store
            .keys()
            .unwrap()
            .iter()
            .filter_map(|k| store.get(k).unwrap())
            .collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    };
    let before = snapshot(&patterns);

    let report = miner.rebuild(&events, &patterns).unwrap();
    assert_eq!(report.events_replayed, 6);
    assert_eq!(report.events_failed, 0);
    assert_eq!(report.patterns_cleared, before.len());

    let after = snapshot(&patterns);
    assert_eq!(after.len(), before.len());
    for (a, b) in before.iter().zip(&after) {
        assert_eq!(a.key, b.key);
        assert_eq!(a.last_used, b.last_used, "{}", a.key);
        assert!((a.confidence - b.confidence).abs() < 1e-9, "{}", a.key);
        if a.kind() != PatternKind::Sequential {
            assert_eq!(a.payload, b.payload, "{}", a.key);
        }
    }
    assert_eq!(co_occurrences(&patterns, "/proj/a.txt", "/proj/b.txt"), 2);
}

#[test]
fn undecodable_event_is_skipped_by_rebuild_and_neighbours() {
    let (db, events, patterns) = sqlite_stores();
    let miner = default_miner();

    for hour in 0..5 {
        ingest(&events, &patterns, &miner, read_at("/proj/notes.md", hour * 3600, "s1"));
    }
    let todo = ingest(&events, &patterns, &miner, read_at("/proj/todo.md", 30, "s1"));
    db.lock()
        .unwrap()
        .execute(
            "UPDATE file_operations SET context = '{broken' WHERE id = ?1",
            [&todo.id],
        )
        .unwrap();

    let report = miner.rebuild(&events, &patterns).unwrap();
    assert_eq!(report.events_replayed, 5);
    assert_eq!(report.events_failed, 1);
    assert_eq!(frequency_count(&patterns, "/proj/notes.md"), 5);
    assert_eq!(frequency_count(&patterns, "/proj/todo.md"), 0);
    assert_eq!(co_occurrences(&patterns, "/proj/notes.md", "/proj/todo.md"), 0);

    // Later events in the same stream still learn around the bad row
    ingest(&events, &patterns, &miner, read_at("/proj/plan.md", 45, "s1"));
    assert_eq!(co_occurrences(&patterns, "/proj/notes.md", "/proj/plan.md"), 1);
    assert_eq!(frequency_count(&patterns, "/proj/plan.md"), 1);
}
