//! Concurrent search across every configured exchange.
//!
//! Each source is queried at the same time under its own timeout. Outcomes
//! are collected into a per-call vector and merged only once every query has
//! finished, so dropping a search midway leaves no partial state behind.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::domain::{
    aggregate, AgentConfig, Aggregation, ProfitabilityCalculator, RankedAggregation,
    SearchQuery, SourceResult,
};
use crate::infra::cache::OfferCache;
use crate::infra::exchange::{ExchangeClient, OfferSource, SourceError};

pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct OfferAggregator {
    sources: Vec<Arc<dyn OfferSource>>,
    cache: Arc<OfferCache>,
    source_timeout: Duration,
    calculator: ProfitabilityCalculator,
}

impl OfferAggregator {
    pub fn new(cache: Arc<OfferCache>) -> Self {
        Self {
            sources: Vec::new(),
            cache,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
            calculator: ProfitabilityCalculator::default(),
        }
    }

    /// Builds exchange clients and the offer cache from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, SourceError> {
        let cache = OfferCache::open(&config.cache.path)
            .with_ttl(config.cache.ttl)
            .with_max_offers(config.cache.max_offers);

        let mut aggregator =
            Self::new(Arc::new(cache)).with_source_timeout(config.source_timeout);
        for source in &config.sources {
            let mut client = ExchangeClient::new(source.name.as_str(), &source.endpoint)?;
            if let Some(key) = &source.api_key {
                client = client.with_api_key(key.clone());
            }
            aggregator = aggregator.with_source(Arc::new(client));
        }
        Ok(aggregator)
    }

    pub fn with_source(mut self, source: Arc<dyn OfferSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_source_timeout(mut self, source_timeout: Duration) -> Self {
        self.source_timeout = source_timeout;
        self
    }

    pub fn with_calculator(mut self, calculator: ProfitabilityCalculator) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Queries every source and merges the answers. Never fails: source
    /// errors end up in `Aggregation::errors` and total failure is reported
    /// through the provenance.
    pub async fn search(&self, query: &SearchQuery) -> Aggregation {
        let queries = self
            .sources
            .iter()
            .map(|source| query_source(source.as_ref(), query, self.source_timeout));
        let results: Vec<SourceResult<SourceError>> = join_all(queries).await;

        for result in &results {
            match &result.outcome {
                Ok(offers) => {
                    debug!(source = %result.source, offers = offers.len(), "source answered")
                }
                Err(error) => warn!(source = %result.source, "source failed: {error}"),
            }
        }

        let all_failed = results.iter().all(|r| r.outcome.is_err());
        let cached = if all_failed {
            self.cache.fallback_offers().await
        } else {
            Vec::new()
        };

        let aggregation = aggregate(results, move || cached);

        if aggregation.provenance.is_fresh() {
            if let Err(error) = self.cache.record(&aggregation.offers).await {
                warn!("failed to update offer cache: {error}");
            }
        }

        info!(
            provenance = %aggregation.provenance,
            offers = aggregation.offers.len(),
            errors = aggregation.errors.len(),
            skipped_duplicates = aggregation.skipped_duplicates,
            skipped_malformed = aggregation.skipped_malformed,
            "offer search finished"
        );

        aggregation
    }

    /// Searches, then scores and sorts the merged offers for `agent`.
    pub async fn search_ranked(
        &self,
        query: &SearchQuery,
        agent: &AgentConfig,
    ) -> RankedAggregation {
        self.search(query).await.rank_with(&self.calculator, agent)
    }
}

async fn query_source(
    source: &dyn OfferSource,
    query: &SearchQuery,
    limit: Duration,
) -> SourceResult<SourceError> {
    let name = source.name().clone();
    debug!(source = %name, "querying offer source");
    let outcome = match timeout(limit, source.fetch_offers(query)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(SourceError::Timeout(limit)),
    };
    SourceResult {
        source: name,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Freight, FreightRoute, Offer, Provenance, ScoringModel, ScoringWeights, SourceName,
    };
    use async_trait::async_trait;

    struct StaticSource {
        name: SourceName,
        offers: Vec<Offer>,
        delay: Duration,
    }

    #[async_trait]
    impl OfferSource for StaticSource {
        fn name(&self) -> &SourceName {
            &self.name
        }

        async fn fetch_offers(&self, _query: &SearchQuery) -> Result<Vec<Offer>, SourceError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.offers.clone())
        }
    }

    fn offer(id: &str) -> Offer {
        Offer {
            id: Some(id.to_string()),
            ..Offer::default()
        }
    }

    fn source(name: &str, ids: &[&str], delay_ms: u64) -> Arc<dyn OfferSource> {
        Arc::new(StaticSource {
            name: SourceName::from(name),
            offers: ids.iter().map(|id| offer(id)).collect(),
            delay: Duration::from_millis(delay_ms),
        })
    }

    #[tokio::test]
    async fn sources_run_concurrently() {
        let aggregator = OfferAggregator::new(Arc::new(OfferCache::in_memory()))
            .with_source(source("transeu", &["a"], 200))
            .with_source(source("timocom", &["b"], 200))
            .with_source(source("trans.info", &["c"], 200));

        let started = std::time::Instant::now();
        let merged = aggregator.search(&SearchQuery::default()).await;

        assert_eq!(merged.provenance, Provenance::Live);
        assert_eq!(merged.offers.len(), 3);
        assert!(started.elapsed() < Duration::from_millis(550));
    }

    #[tokio::test]
    async fn slow_source_times_out_without_blocking_others() {
        let aggregator = OfferAggregator::new(Arc::new(OfferCache::in_memory()))
            .with_source(source("transeu", &["a", "b"], 0))
            .with_source(source("timocom", &["late"], 5_000))
            .with_source_timeout(Duration::from_millis(50));

        let merged = aggregator.search(&SearchQuery::default()).await;

        assert_eq!(merged.provenance, Provenance::Partial);
        assert_eq!(merged.offers.len(), 2);
        assert_eq!(merged.errors, vec!["timocom: timed out after 50ms".to_string()]);
    }

    #[tokio::test]
    async fn live_results_are_recorded_in_cache() {
        let cache = Arc::new(OfferCache::in_memory());
        let aggregator = OfferAggregator::new(cache.clone())
            .with_source(source("transeu", &["a", "b"], 0));

        aggregator.search(&SearchQuery::default()).await;

        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn ranked_search_uses_the_injected_calculator() {
        let routed = |id: &str, km: f64| Offer {
            id: Some(id.to_string()),
            freight: Some(Freight {
                route: Some(FreightRoute {
                    distance: Some(km * 1000.0),
                    ..FreightRoute::default()
                }),
                ..Freight::default()
            }),
            ..Offer::default()
        };
        let route_only = ScoringModel {
            weights: ScoringWeights {
                profitability: 0.0,
                capacity_utilization: 0.0,
                route_efficiency: 1.0,
                payment: 0.0,
                client_rating: 0.0,
            },
            ..ScoringModel::default()
        };
        let aggregator = OfferAggregator::new(Arc::new(OfferCache::in_memory()))
            .with_source(Arc::new(StaticSource {
                name: SourceName::from("transeu"),
                offers: vec![routed("short", 80.0), routed("long", 800.0)],
                delay: Duration::ZERO,
            }))
            .with_calculator(ProfitabilityCalculator::new(route_only));

        let ranked = aggregator
            .search_ranked(&SearchQuery::default(), &AgentConfig::default())
            .await;

        let scores: Vec<(Option<&str>, u8)> = ranked
            .offers
            .iter()
            .map(|r| (r.offer.id.as_deref(), r.score()))
            .collect();
        assert_eq!(scores, vec![(Some("long"), 100), (Some("short"), 10)]);
    }

    #[tokio::test]
    async fn no_sources_reports_error_provenance() {
        let aggregator = OfferAggregator::new(Arc::new(OfferCache::in_memory()));
        let merged = aggregator.search(&SearchQuery::default()).await;
        assert_eq!(merged.provenance, Provenance::Error);
        assert_eq!(merged.errors.len(), 1);
    }
}
