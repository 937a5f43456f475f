mod helpers;

use chrono::{Duration, Utc};
use exocortex::config::{PatternConfig, PredictionConfig};
use exocortex::feedback::ActivePredictions;
use exocortex::patterns::PatternStore;
use exocortex::predict::{PredictionContext, PredictionStatus, Predictor};
use helpers::{default_miner, ingest, read_at, sqlite_stores, t0};
use std::sync::Arc;

fn predictor() -> Predictor {
    Predictor::new(
        PredictionConfig::default(),
        PatternConfig::default(),
        Arc::new(ActivePredictions::new()),
    )
}

#[test]
fn empty_store_yields_no_patterns_available() {
    let (_db, _events, patterns) = sqlite_stores();
    let set = predictor()
        .predict(&patterns, &PredictionContext::new(["/proj/a.txt"]), 5, Utc::now())
        .unwrap();
    assert!(set.predictions.is_empty());
    assert_eq!(set.status, PredictionStatus::NoPatternsAvailable);
}

#[test]
fn report_followed_by_data_predicts_data() {
    let (_db, events, patterns) = sqlite_stores();
    let miner = default_miner();
    for day in 0..3 {
        let base = day * 86_400;
        let session = format!("day-{day}");
        ingest(&events, &patterns, &miner, read_at("/proj/report.docx", base, &session));
        ingest(&events, &patterns, &miner, read_at("/proj/data.csv", base + 60, &session));
    }

    let context = PredictionContext::new(["/proj/report.docx"]).with_directory("/proj");
    let set = predictor()
        .predict(&patterns, &context, 5, t0() + Duration::days(3))
        .unwrap();

    assert_eq!(set.status, PredictionStatus::Fresh);
    let top = &set.predictions[0];
    assert_eq!(top.path, "/proj/data.csv");
    assert!(top.confidence > 0.4, "confidence {}", top.confidence);
    assert!(set.predictions.iter().all(|p| p.path != "/proj/report.docx"));
}

#[test]
fn paths_seen_together_more_often_rank_higher() {
    let (_db, events, patterns) = sqlite_stores();
    let miner = default_miner();
    // Comparable activity: both partners are touched, b with a four times, c with a once
    for i in 0..4 {
        let base = i * 86_400;
        let session = format!("b{i}");
        ingest(&events, &patterns, &miner, read_at("/w/a.md", base, &session));
        ingest(&events, &patterns, &miner, read_at("/w/b.md", base + 30, &session));
    }
    ingest(&events, &patterns, &miner, read_at("/w/a.md", 5 * 86_400, "c0"));
    ingest(&events, &patterns, &miner, read_at("/w/c.md", 5 * 86_400 + 30, "c0"));

    let set = predictor()
        .predict(&patterns, &PredictionContext::new(["/w/a.md"]), 5, t0() + Duration::days(6))
        .unwrap();
    let paths: Vec<&str> = set.predictions.iter().map(|p| p.path.as_str()).collect();
    assert_eq!(paths, vec!["/w/b.md", "/w/c.md"]);
    assert!(set.predictions.windows(2).all(|w| w[0].confidence >= w[1].confidence));
}

#[test]
fn decay_keeps_confidence_in_unit_interval_and_is_idempotent() {
    let (_db, events, patterns) = sqlite_stores();
    let miner = default_miner();
    for i in 0..6 {
        ingest(&events, &patterns, &miner, read_at("/proj/a.rs", i * 40, "s"));
        ingest(&events, &patterns, &miner, read_at("/proj/b.rs", i * 40 + 20, "s"));
    }
    let model = PatternConfig::default();
    let now = t0() + Duration::days(30);

    let first = patterns.decay(now, &model).unwrap();
    assert!(first.decayed > 0);
    let after_first = patterns.list(None, 0.0).unwrap();
    assert!(after_first
        .iter()
        .all(|p| (0.0..=1.0).contains(&p.confidence) && (0.0..=1.0).contains(&p.decay_weight)));

    let second = patterns.decay(now, &model).unwrap();
    assert_eq!(second.decayed, 0);
    let after_second = patterns.list(None, 0.0).unwrap();
    assert_eq!(after_first, after_second);
}

#[test]
fn long_idle_patterns_retire_and_stop_predicting() {
    let (_db, events, patterns) = sqlite_stores();
    let miner = default_miner();
    ingest(&events, &patterns, &miner, read_at("/w/a.md", 0, "s"));
    ingest(&events, &patterns, &miner, read_at("/w/b.md", 30, "s"));

    let report = patterns
        .decay(t0() + Duration::days(400), &PatternConfig::default())
        .unwrap();
    assert_eq!(report.retired, report.examined);
    assert_eq!(patterns.stats().unwrap().active_patterns, 0);

    let set = predictor()
        .predict(
            &patterns,
            &PredictionContext::new(["/w/a.md"]),
            5,
            t0() + Duration::days(400),
        )
        .unwrap();
    assert_eq!(set.status, PredictionStatus::NoPatternsAvailable);

    // Renewed activity revives the pair
    ingest(&events, &patterns, &miner, read_at("/w/a.md", 401 * 86_400, "s2"));
    ingest(&events, &patterns, &miner, read_at("/w/b.md", 401 * 86_400 + 30, "s2"));
    let set = predictor()
        .predict(
            &patterns,
            &PredictionContext::new(["/w/a.md"]),
            5,
            t0() + Duration::days(401) + Duration::minutes(1),
        )
        .unwrap();
    assert_eq!(set.predictions[0].path, "/w/b.md");
}

#[test]
fn busy_file_seen_once_with_the_context_ranks_below_a_regular_partner() {
    let (_db, events, patterns) = sqlite_stores();
    let miner = default_miner();
    for i in 0..3 {
        let base = i * 86_400;
        let session = format!("pair-{i}");
        ingest(&events, &patterns, &miner, read_at("/w/a.txt", base, &session));
        ingest(&events, &patterns, &miner, read_at("/w/b.txt", base + 30, &session));
    }
    let base = 3 * 86_400;
    ingest(&events, &patterns, &miner, read_at("/w/a.txt", base, "once"));
    ingest(&events, &patterns, &miner, read_at("/w/c.txt", base + 30, "once"));
    // c is far busier than b on its own
    for i in 0..20 {
        let session = format!("solo-{i}");
        ingest(&events, &patterns, &miner, read_at("/w/c.txt", base + 3600 + i * 600, &session));
    }

    let set = predictor()
        .predict(&patterns, &PredictionContext::new(["/w/a.txt"]), 5, t0() + Duration::days(4))
        .unwrap();
    let paths: Vec<&str> = set.predictions.iter().map(|p| p.path.as_str()).collect();
    let b = paths.iter().position(|p| *p == "/w/b.txt").unwrap();
    let c = paths.iter().position(|p| *p == "/w/c.txt").unwrap();
    assert_eq!(b, 0, "{paths:?}");
    assert!(b < c);
}
