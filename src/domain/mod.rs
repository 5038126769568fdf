//! Offer scoring, ranking and merging. Pure logic, no I/O.

pub mod aggregation;
pub mod entities;
pub mod profitability;
pub mod ranking;

pub use aggregation::{
    aggregate, dedupe_offers, Aggregation, Deduplicated, Provenance, RankedAggregation,
    SourceName, SourceResult,
};
pub use entities::{
    AgentConfig, CapacityRange, Financials, Freight, FreightRoute, Offer, OfferId, PaymentPeriod,
    RatingSummary, SearchQuery, VehiclePreferences,
};
pub use profitability::{
    calculate_profitability, ProfitabilityCalculator, ProfitabilityMetrics, ProfitabilityResult,
    ResolvedAgentConfig, ScoringDefaults, ScoringModel, ScoringWeights,
};
pub use ranking::{
    offers_from_json, rank_json, rank_offers, sort_ranked, ParsedOffers, RankedOffer,
    PARALLEL_SCORING_THRESHOLD,
};
