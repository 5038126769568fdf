//! Merging offers gathered from several exchanges.
//!
//! Everything here is synchronous and side-effect free. The async fan-out,
//! timeouts and the on-disk cache live in `infra::aggregator`; this module
//! only decides what the merged result and its provenance are.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::entities::{AgentConfig, Offer, OfferId};
use super::profitability::ProfitabilityCalculator;
use super::ranking::RankedOffer;

/// Name of a configured offer source, e.g. `transeu` or `timocom`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceName(String);

impl SourceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Outcome of querying one source.
#[derive(Debug)]
pub struct SourceResult<E> {
    pub source: SourceName,
    pub outcome: Result<Vec<Offer>, E>,
}

impl<E> SourceResult<E> {
    pub fn ok(source: impl Into<SourceName>, offers: Vec<Offer>) -> Self {
        Self {
            source: source.into(),
            outcome: Ok(offers),
        }
    }

    pub fn err(source: impl Into<SourceName>, error: E) -> Self {
        Self {
            source: source.into(),
            outcome: Err(error),
        }
    }
}

/// Where an aggregated result set came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Every source answered.
    Live,
    /// At least one source answered and at least one failed.
    Partial,
    /// Every source failed; offers come from the last-known-good cache.
    Cache,
    /// Every source failed and the cache had nothing to offer.
    Error,
}

impl Provenance {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Partial => "partial",
            Self::Cache => "cache",
            Self::Error => "error",
        }
    }

    /// True when the offers were fetched during this run.
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Live | Self::Partial)
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// Offers reduced to one copy per id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Deduplicated {
    pub offers: Vec<Offer>,
    /// Repeats of an id already kept.
    pub duplicates: usize,
    /// Entries without an id.
    pub malformed: usize,
}

/// Keeps the first offer seen for each id and drops entries with no id.
pub fn dedupe_offers<I>(offers: I) -> Deduplicated
where
    I: IntoIterator<Item = Offer>,
{
    let mut seen: HashSet<OfferId> = HashSet::new();
    let mut result = Deduplicated::default();

    for offer in offers {
        let Some(id) = offer.id.as_ref() else {
            result.malformed += 1;
            continue;
        };
        if seen.insert(id.clone()) {
            result.offers.push(offer);
        } else {
            result.duplicates += 1;
        }
    }

    result
}

/// Merged view over every source, before scoring.
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregation {
    pub offers: Vec<Offer>,
    /// One message per failed source, in source order.
    pub errors: Vec<String>,
    pub provenance: Provenance,
    pub skipped_duplicates: usize,
    pub skipped_malformed: usize,
}

impl Aggregation {
    /// Nothing to show: the caller renders "no offers found".
    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }

    /// All source errors joined for display.
    pub fn error_summary(&self) -> Option<String> {
        (!self.errors.is_empty()).then(|| self.errors.join("; "))
    }

    pub fn rank(&self, agent: &AgentConfig) -> RankedAggregation {
        self.rank_with(&ProfitabilityCalculator::default(), agent)
    }

    pub fn rank_with(
        &self,
        calculator: &ProfitabilityCalculator,
        agent: &AgentConfig,
    ) -> RankedAggregation {
        RankedAggregation {
            offers: calculator.rank(&self.offers, agent),
            errors: self.errors.clone(),
            provenance: self.provenance,
            skipped_duplicates: self.skipped_duplicates,
            skipped_malformed: self.skipped_malformed,
        }
    }
}

/// Aggregated offers scored and sorted best first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedAggregation {
    pub offers: Vec<RankedOffer>,
    pub errors: Vec<String>,
    pub provenance: Provenance,
    pub skipped_duplicates: usize,
    pub skipped_malformed: usize,
}

impl RankedAggregation {
    pub fn error_summary(&self) -> Option<String> {
        (!self.errors.is_empty()).then(|| self.errors.join("; "))
    }
}

/// Message recorded when there is no source to ask at all.
pub const NO_SOURCES_MESSAGE: &str = "no offer sources configured";

/// Merges per-source outcomes into one result set.
///
/// Successful sources are concatenated in the given order and deduplicated
/// by id. `fallback` is consulted only when no source succeeded; its offers
/// are deduplicated the same way.
pub fn aggregate<E, F>(results: Vec<SourceResult<E>>, fallback: F) -> Aggregation
where
    E: fmt::Display,
    F: FnOnce() -> Vec<Offer>,
{
    let mut errors = Vec::new();
    let mut live = Vec::new();
    let mut succeeded = 0_usize;

    if results.is_empty() {
        errors.push(NO_SOURCES_MESSAGE.to_string());
    }

    for SourceResult { source, outcome } in results {
        match outcome {
            Ok(offers) => {
                succeeded += 1;
                live.extend(offers);
            }
            Err(error) => errors.push(format!("{source}: {error}")),
        }
    }

    if succeeded > 0 {
        let merged = dedupe_offers(live);
        let provenance = if errors.is_empty() {
            Provenance::Live
        } else {
            Provenance::Partial
        };
        return Aggregation {
            offers: merged.offers,
            errors,
            provenance,
            skipped_duplicates: merged.duplicates,
            skipped_malformed: merged.malformed,
        };
    }

    let cached = dedupe_offers(fallback());
    let provenance = if cached.offers.is_empty() {
        Provenance::Error
    } else {
        Provenance::Cache
    };

    Aggregation {
        offers: cached.offers,
        errors,
        provenance,
        skipped_duplicates: cached.duplicates,
        skipped_malformed: cached.malformed,
    }
}
