//! Fan-out behaviour of the search aggregator across several sources.

mod common;

use std::time::{Duration, Instant};

use common::*;
use lacuna_discovery::aggregator::DEADLINE_FAILURE;
use lacuna_discovery::{Query, SourceResult};

fn queries() -> Vec<Query> {
    vec![Query::new("hallucination detection"), Query::new("code review")]
}

#[tokio::test]
async fn test_one_failing_source_does_not_affect_others() {
    let agg = aggregator(vec![
        FakeSource::ok("a", vec![paper("A1", 1.0, "a")]),
        FakeSource::failing("b"),
        FakeSource::ok("c", vec![paper("C1", 2.0, "c")]),
    ]);

    let report = agg.search(&queries()).await;

    let ids: Vec<_> = report.sources.iter().map(|r| r.source.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!(report.get("a").unwrap().is_success());
    assert!(matches!(report.get("b"), Some(SourceResult::Failure { .. })));
    assert!(report.get("c").unwrap().is_success());
    // one paper per query per healthy source
    assert_eq!(report.candidates().len(), 4);
}

#[tokio::test]
async fn test_sources_are_queried_concurrently() {
    let delay = Duration::from_millis(300);
    let agg = aggregator(vec![
        FakeSource::slow("a", vec![paper("A1", 1.0, "a")], delay),
        FakeSource::slow("b", vec![paper("B1", 1.0, "b")], delay),
        FakeSource::slow("c", vec![paper("C1", 1.0, "c")], delay),
    ]);

    let started = Instant::now();
    let report = agg.search(&queries()).await;

    assert!(started.elapsed() < Duration::from_millis(1200), "took {:?}", started.elapsed());
    assert_eq!(report.candidates().len(), 6);
}

#[tokio::test]
async fn test_slow_source_times_out_alone() {
    let agg = aggregator(vec![
        FakeSource::ok("a", vec![paper("A1", 1.0, "a")]),
        FakeSource::slow("b", vec![paper("B1", 1.0, "b")], Duration::from_secs(30)),
    ]);

    let report = agg.search(&queries()).await;

    assert!(report.get("a").unwrap().is_success());
    match report.get("b").unwrap() {
        SourceResult::Failure { error } => {
            assert!(error.contains("timed out") || error == DEADLINE_FAILURE, "{error}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_every_query_reaches_every_source() {
    let a = FakeSource::ok("a", vec![]);
    let b = FakeSource::ok("b", vec![]);
    let agg = aggregator(vec![a.clone(), b.clone()]);

    agg.search(&queries()).await;

    for source in [a, b] {
        let mut seen = source.seen_queries();
        seen.sort();
        assert_eq!(seen, vec!["code review", "hallucination detection"]);
    }
}
