use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use freight_offer_scanner::domain::{
    aggregate, rank_json, AgentConfig, Offer, Provenance, SearchQuery, SourceName, SourceResult,
};
use freight_offer_scanner::infra::{
    FileSource, HistoryEntry, OfferAggregator, OfferCache, OfferSource, SearchHistory,
    SourceError,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use uuid::Uuid;

enum Behaviour {
    Answer(Vec<Offer>),
    Fail(&'static str),
}

struct MockExchange {
    name: SourceName,
    behaviour: Behaviour,
    delay: Duration,
}

impl MockExchange {
    fn answering(name: &str, offers: Vec<Offer>) -> Arc<dyn OfferSource> {
        Arc::new(Self {
            name: SourceName::from(name),
            behaviour: Behaviour::Answer(offers),
            delay: Duration::ZERO,
        })
    }

    fn failing(name: &str, message: &'static str) -> Arc<dyn OfferSource> {
        Arc::new(Self {
            name: SourceName::from(name),
            behaviour: Behaviour::Fail(message),
            delay: Duration::ZERO,
        })
    }

    fn slow(name: &str, offers: Vec<Offer>, delay: Duration) -> Arc<dyn OfferSource> {
        Arc::new(Self {
            name: SourceName::from(name),
            behaviour: Behaviour::Answer(offers),
            delay,
        })
    }
}

#[async_trait]
impl OfferSource for MockExchange {
    fn name(&self) -> &SourceName {
        &self.name
    }

    async fn fetch_offers(&self, _query: &SearchQuery) -> Result<Vec<Offer>, SourceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.behaviour {
            Behaviour::Answer(offers) => Ok(offers.clone()),
            Behaviour::Fail(message) => Err(SourceError::Api((*message).to_string())),
        }
    }
}

fn offer(id: &str, distance_km: f64) -> Offer {
    serde_json::from_value(json!({
        "id": id,
        "freight": { "route": { "distance": distance_km * 1000.0 } },
    }))
    .expect("offer fixture decodes")
}

fn ids(offers: &[Offer]) -> Vec<&str> {
    offers.iter().filter_map(|o| o.id.as_deref()).collect()
}

#[tokio::test]
async fn one_failing_exchange_yields_partial_results() {
    let aggregator = OfferAggregator::new(Arc::new(OfferCache::in_memory()))
        .with_source(MockExchange::answering(
            "transeu",
            vec![offer("a", 100.0), offer("b", 200.0), offer("c", 300.0)],
        ))
        .with_source(MockExchange::failing("timocom", "503 service unavailable"));

    let merged = aggregator.search(&SearchQuery::default()).await;

    assert_eq!(merged.provenance, Provenance::Partial);
    assert_eq!(ids(&merged.offers), vec!["a", "b", "c"]);
    assert_eq!(
        merged.errors,
        vec!["timocom: api error: 503 service unavailable".to_string()]
    );
}

#[tokio::test]
async fn total_outage_serves_cached_offers() {
    let cache = Arc::new(OfferCache::in_memory());
    cache
        .record(&[offer("cached-1", 400.0), offer("cached-2", 500.0)])
        .await
        .expect("in-memory cache records");

    let aggregator = OfferAggregator::new(cache)
        .with_source(MockExchange::failing("transeu", "token expired"))
        .with_source(MockExchange::failing("timocom", "502 bad gateway"));

    let merged = aggregator.search(&SearchQuery::default()).await;

    assert_eq!(merged.provenance, Provenance::Cache);
    assert_eq!(ids(&merged.offers), vec!["cached-1", "cached-2"]);
    assert_eq!(merged.errors.len(), 2);
}

#[tokio::test]
async fn total_outage_with_empty_cache_is_an_error_state() {
    let aggregator = OfferAggregator::new(Arc::new(OfferCache::in_memory()))
        .with_source(MockExchange::failing("transeu", "token expired"));

    let merged = aggregator.search(&SearchQuery::default()).await;

    assert_eq!(merged.provenance, Provenance::Error);
    assert!(merged.is_empty());
    assert_eq!(
        merged.error_summary().as_deref(),
        Some("transeu: api error: token expired")
    );
}

#[tokio::test]
async fn duplicates_across_exchanges_are_merged_once() {
    let aggregator = OfferAggregator::new(Arc::new(OfferCache::in_memory()))
        .with_source(MockExchange::answering(
            "transeu",
            vec![offer("shared", 100.0), offer("a", 200.0)],
        ))
        .with_source(MockExchange::answering(
            "timocom",
            vec![offer("shared", 999.0), offer("b", 300.0)],
        ));

    let merged = aggregator.search(&SearchQuery::default()).await;

    assert_eq!(ids(&merged.offers), vec!["shared", "a", "b"]);
    assert_eq!(merged.skipped_duplicates, 1);
    assert_eq!(merged.offers[0].distance_meters(), Some(100_000.0));

    let again = aggregate(
        vec![SourceResult::<SourceError>::ok("replay", merged.offers.clone())],
        Vec::new,
    );
    assert_eq!(again.offers, merged.offers);
}

#[tokio::test]
async fn cancelled_search_leaves_cache_untouched() {
    let cache = Arc::new(OfferCache::in_memory());
    let aggregator = OfferAggregator::new(cache.clone()).with_source(MockExchange::slow(
        "transeu",
        vec![offer("late", 100.0)],
        Duration::from_millis(500),
    ));

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        aggregator.search(&SearchQuery::default()),
    )
    .await;

    assert!(outcome.is_err());
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn ranked_search_orders_by_score_and_records_history() {
    let aggregator = OfferAggregator::new(Arc::new(OfferCache::in_memory()))
        .with_source(MockExchange::answering(
            "transeu",
            vec![offer("short", 80.0), offer("long", 800.0)],
        ))
        .with_source(MockExchange::answering("timocom", vec![offer("mid", 400.0)]));

    let query = SearchQuery {
        origin: Some("Katowice".into()),
        destination: Some("Milano".into()),
        ..SearchQuery::default()
    };
    let ranked = aggregator.search_ranked(&query, &AgentConfig::default()).await;

    let order: Vec<&str> = ranked
        .offers
        .iter()
        .filter_map(|r| r.offer.id.as_deref())
        .collect();
    assert_eq!(order, vec!["long", "mid", "short"]);
    assert!(ranked.offers.windows(2).all(|w| w[0].score() >= w[1].score()));

    let dir = std::env::temp_dir().join(format!("pipeline-{}", Uuid::new_v4()));
    let history = SearchHistory::new(dir.join("history.jsonl"));
    let entry = HistoryEntry::new(Some("agent-1".into()), query.clone(), &ranked)
        .expect("timestamp formats");
    history.append(&entry).expect("history appends");

    let entries = history.read_all().expect("history reads back");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].query, query);
    assert_eq!(entries[0].offers, ranked.offers);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn file_replay_feeds_the_aggregator() {
    let path = std::env::temp_dir().join(format!("replay-{}.json", Uuid::new_v4()));
    std::fs::write(
        &path,
        json!({
            "status": "ok",
            "data": [
                { "id": 17, "freight": { "route": { "distance": 500000 } } },
                { "freight": { "route": { "distance": 1000 } } },
                "garbage"
            ]
        })
        .to_string(),
    )
    .expect("fixture written");

    let aggregator = OfferAggregator::new(Arc::new(OfferCache::in_memory()))
        .with_source(Arc::new(FileSource::new("replay", &path)));
    let merged = aggregator.search(&SearchQuery::default()).await;
    std::fs::remove_file(&path).ok();

    assert_eq!(merged.provenance, Provenance::Live);
    assert_eq!(ids(&merged.offers), vec!["17"]);
    assert_eq!(merged.skipped_malformed, 1);
}

#[test]
fn raw_payload_ranks_with_default_profile() {
    let ranked = rank_json(
        json!([
            { "id": "reference", "freight": { "route": { "distance": 800000 } }, "price": 2100 },
            { "id": "empty" },
        ]),
        &AgentConfig::default(),
    );

    assert_eq!(ranked.len(), 2);
    let reference = &ranked[0];
    assert_eq!(reference.offer.id.as_deref(), Some("reference"));
    assert_eq!(reference.score(), 28);

    let serialized = serde_json::to_value(reference).expect("ranked offer serializes");
    assert_eq!(serialized["price"], json!(2100));
    assert_eq!(
        serialized["profitability"],
        json!({
            "score": 28,
            "profit": -200.0,
            "profitMargin": -10.0,
            "metrics": {
                "distance": 800.0,
                "revenue": 2000.0,
                "fuelCost": 1560.0,
                "driverWages": 400.0,
                "operationalCosts": 240.0,
                "totalCosts": 2200.0,
                "capacityUtilization": 0.0,
                "routeEfficiency": 100.0,
                "paymentScore": 50.0,
                "clientRatingScore": 50.0
            }
        })
    );
}
