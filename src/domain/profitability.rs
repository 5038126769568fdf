//! Profitability scoring for a single freight offer.
//!
//! The calculator turns one offer plus one agent configuration into a cost and
//! revenue breakdown and a 0-100 composite score. It is a pure function of its
//! inputs: no I/O, no hidden state, identical output for identical input.

use serde::{Deserialize, Serialize};

use super::entities::{AgentConfig, Offer};

/// Fallback values applied when an agent leaves a preference unset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringDefaults {
    pub rate_per_km: f64,
    /// Liters per 100 km.
    pub fuel_consumption: f64,
    pub fuel_price: f64,
    /// Driver cost per km.
    pub driver_cost: f64,
    /// Other operational costs per km.
    pub other_costs: f64,
    /// Vehicle payload in tons.
    pub capacity_max: f64,
}

impl Default for ScoringDefaults {
    fn default() -> Self {
        Self {
            rate_per_km: 2.5,
            fuel_consumption: 30.0,
            fuel_price: 6.5,
            driver_cost: 0.5,
            other_costs: 0.3,
            capacity_max: 24.0,
        }
    }
}

impl ScoringDefaults {
    /// Resolves every optional agent preference in one place.
    pub fn resolve(&self, agent: &AgentConfig) -> ResolvedAgentConfig {
        let financials = agent.financials.as_ref();
        let vehicle = agent.vehicle_preferences.as_ref();

        ResolvedAgentConfig {
            rate_per_km: pick(financials.and_then(|f| f.rate_per_km), self.rate_per_km),
            fuel_consumption: pick(vehicle.and_then(|v| v.fuel_consumption), self.fuel_consumption),
            fuel_price: pick(financials.and_then(|f| f.fuel_price), self.fuel_price),
            driver_cost: pick(financials.and_then(|f| f.driver_cost), self.driver_cost),
            other_costs: pick(financials.and_then(|f| f.other_costs), self.other_costs),
            capacity_max: pick(
                vehicle.and_then(|v| v.capacity.as_ref()).and_then(|c| c.max),
                self.capacity_max,
            ),
        }
    }
}

fn pick(value: Option<f64>, fallback: f64) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(fallback)
}

/// Agent preferences with every default applied.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedAgentConfig {
    pub rate_per_km: f64,
    pub fuel_consumption: f64,
    pub fuel_price: f64,
    pub driver_cost: f64,
    pub other_costs: f64,
    pub capacity_max: f64,
}

/// Weights of the five score components. They sum to 1.0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub profitability: f64,
    pub capacity_utilization: f64,
    pub route_efficiency: f64,
    pub payment: f64,
    pub client_rating: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            profitability: 0.4,
            capacity_utilization: 0.2,
            route_efficiency: 0.15,
            payment: 0.15,
            client_rating: 0.1,
        }
    }
}

/// Every tunable constant of the scoring formula.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringModel {
    pub defaults: ScoringDefaults,
    pub weights: ScoringWeights,
    /// A 20% margin maps to a full profitability score.
    pub margin_multiplier: f64,
    /// Route length that earns a full route-efficiency score.
    pub reference_route_km: f64,
    /// Each block of this many payment days costs `payment_penalty` points.
    pub payment_period_days: f64,
    pub payment_penalty: f64,
    /// Score used for payment terms or ratings the exchange did not report.
    pub neutral_score: f64,
}

impl Default for ScoringModel {
    fn default() -> Self {
        Self {
            defaults: ScoringDefaults::default(),
            weights: ScoringWeights::default(),
            margin_multiplier: 5.0,
            reference_route_km: 800.0,
            payment_period_days: 30.0,
            payment_penalty: 20.0,
            neutral_score: 50.0,
        }
    }
}

/// Cost, revenue and component breakdown. Values are rounded to 2 decimals.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitabilityMetrics {
    /// Kilometers.
    pub distance: f64,
    pub revenue: f64,
    pub fuel_cost: f64,
    pub driver_wages: f64,
    pub operational_costs: f64,
    pub total_costs: f64,
    pub capacity_utilization: f64,
    pub route_efficiency: f64,
    pub payment_score: f64,
    pub client_rating_score: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitabilityResult {
    /// Weighted composite, always within 0..=100.
    pub score: u8,
    pub profit: f64,
    /// Percentage of revenue.
    pub profit_margin: f64,
    pub metrics: ProfitabilityMetrics,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProfitabilityCalculator {
    model: ScoringModel,
}

impl ProfitabilityCalculator {
    pub fn new(model: ScoringModel) -> Self {
        Self { model }
    }

    pub fn calculate(&self, offer: &Offer, agent: &AgentConfig) -> ProfitabilityResult {
        let model = &self.model;
        let agent = model.defaults.resolve(agent);

        let distance_km = offer.distance_meters().map(|m| m / 1000.0).unwrap_or(0.0);

        let revenue = distance_km * agent.rate_per_km;
        let fuel_cost = (distance_km * agent.fuel_consumption * agent.fuel_price) / 100.0;
        let driver_wages = distance_km * agent.driver_cost;
        let operational_costs = distance_km * agent.other_costs;
        let total_costs = fuel_cost + driver_wages + operational_costs;

        let profit = revenue - total_costs;
        let profit_margin = if revenue > 0.0 {
            (profit / revenue) * 100.0
        } else {
            0.0
        };

        let profitability_score = clamp_score(profit_margin * model.margin_multiplier);

        let capacity_utilization = offer
            .capacity()
            .map(|capacity| clamp_score((capacity / agent.capacity_max) * 100.0))
            .unwrap_or(0.0);

        let route_efficiency = if distance_km > 0.0 {
            clamp_score((distance_km / model.reference_route_km) * 100.0)
        } else {
            0.0
        };

        let payment_score = offer
            .payment_days()
            .map(|days| {
                (100.0 - (days / model.payment_period_days) * model.payment_penalty).max(0.0)
            })
            .unwrap_or(model.neutral_score);

        let client_rating_score = offer
            .client_rating()
            .map(|rate| (rate / 5.0) * 100.0)
            .unwrap_or(model.neutral_score);

        let weights = &model.weights;
        let weighted_score = profitability_score * weights.profitability
            + capacity_utilization * weights.capacity_utilization
            + route_efficiency * weights.route_efficiency
            + payment_score * weights.payment
            + client_rating_score * weights.client_rating;

        ProfitabilityResult {
            score: final_score(weighted_score),
            profit: round2(profit),
            profit_margin: round2(profit_margin),
            metrics: ProfitabilityMetrics {
                distance: round2(distance_km),
                revenue: round2(revenue),
                fuel_cost: round2(fuel_cost),
                driver_wages: round2(driver_wages),
                operational_costs: round2(operational_costs),
                total_costs: round2(total_costs),
                capacity_utilization: round2(capacity_utilization),
                route_efficiency: round2(route_efficiency),
                payment_score: round2(payment_score),
                client_rating_score: round2(client_rating_score),
            },
        }
    }
}

/// Scores one offer with the stock scoring model.
pub fn calculate_profitability(offer: &Offer, agent: &AgentConfig) -> ProfitabilityResult {
    ProfitabilityCalculator::default().calculate(offer, agent)
}

/// NaN (e.g. a zero capacity divided by a zero maximum) counts as 0.
fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Round half up, then clamp. NaN collapses to 0.
fn final_score(weighted: f64) -> u8 {
    if !weighted.is_finite() {
        return if weighted == f64::INFINITY { 100 } else { 0 };
    }
    (weighted + 0.5).floor().clamp(0.0, 100.0) as u8
}

fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    // Drop the sign of a negative zero so -0.001 prints as 0.
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}
