//! Offer ranking: score every offer, then order by score.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entities::{AgentConfig, Offer};
use super::profitability::{ProfitabilityCalculator, ProfitabilityResult};

/// Batches at least this large are scored on the rayon pool.
pub const PARALLEL_SCORING_THRESHOLD: usize = 256;

/// A copy of an offer with its profitability attached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedOffer {
    #[serde(flatten)]
    pub offer: Offer,
    pub profitability: ProfitabilityResult,
}

impl RankedOffer {
    pub fn new(offer: &Offer, profitability: ProfitabilityResult) -> Self {
        let mut offer = offer.clone();
        // A previously scored payload must not carry a stale result alongside the fresh one.
        offer.extra.remove("profitability");
        Self {
            offer,
            profitability,
        }
    }

    pub fn score(&self) -> u8 {
        self.profitability.score
    }
}

impl ProfitabilityCalculator {
    /// Scores every offer and returns them best first. Offers with equal
    /// scores keep their input order.
    pub fn rank(&self, offers: &[Offer], agent: &AgentConfig) -> Vec<RankedOffer> {
        let score = |offer: &Offer| RankedOffer::new(offer, self.calculate(offer, agent));

        let mut ranked: Vec<RankedOffer> = if offers.len() >= PARALLEL_SCORING_THRESHOLD {
            offers.par_iter().map(score).collect()
        } else {
            offers.iter().map(score).collect()
        };

        sort_ranked(&mut ranked);
        ranked
    }
}

/// Ranks offers with the stock scoring model.
pub fn rank_offers(offers: &[Offer], agent: &AgentConfig) -> Vec<RankedOffer> {
    ProfitabilityCalculator::default().rank(offers, agent)
}

/// Stable sort by score, highest first.
pub fn sort_ranked(ranked: &mut [RankedOffer]) {
    ranked.sort_by(|a, b| b.score().cmp(&a.score()));
}

/// Offers decoded from an untyped JSON payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedOffers {
    pub offers: Vec<Offer>,
    /// Entries that were not offer objects.
    pub malformed: usize,
}

/// Decodes a JSON array of offers. Anything other than an array yields an
/// empty result; entries that fail to decode are counted and skipped.
pub fn offers_from_json(value: Value) -> ParsedOffers {
    let Value::Array(entries) = value else {
        return ParsedOffers::default();
    };

    let mut parsed = ParsedOffers {
        offers: Vec::with_capacity(entries.len()),
        malformed: 0,
    };
    for entry in entries {
        if !entry.is_object() {
            parsed.malformed += 1;
            continue;
        }
        match serde_json::from_value::<Offer>(entry) {
            Ok(offer) => parsed.offers.push(offer),
            Err(_) => parsed.malformed += 1,
        }
    }
    parsed
}

/// Decodes and ranks a raw JSON payload in one step.
pub fn rank_json(value: Value, agent: &AgentConfig) -> Vec<RankedOffer> {
    rank_offers(&offers_from_json(value).offers, agent)
}
