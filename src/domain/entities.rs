use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier for offers returned by the freight exchanges.
///
/// Exchanges hand these out as strings or numbers; both are normalized to a
/// string so the same offer seen through two sources compares equal.
pub type OfferId = String;

/// A single freight transport opportunity as delivered by an exchange.
///
/// Only the fields the scoring engine reads are typed. Everything else in the
/// exchange payload is kept in `extra` and written back out unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    #[serde(
        default,
        deserialize_with = "optional_id_from_json",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<OfferId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freight: Option<Freight>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_summary: Option<RatingSummary>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Offer {
    /// Route length in meters, if the exchange reported a usable value.
    pub fn distance_meters(&self) -> Option<f64> {
        self.freight
            .as_ref()
            .and_then(|f| f.route.as_ref())
            .and_then(|r| r.distance)
            .filter(|d| d.is_finite())
    }

    /// Payload capacity in tons.
    pub fn capacity(&self) -> Option<f64> {
        self.freight
            .as_ref()
            .and_then(|f| f.capacity)
            .filter(|c| c.is_finite())
    }

    /// Payment term length in days.
    pub fn payment_days(&self) -> Option<f64> {
        self.freight
            .as_ref()
            .and_then(|f| f.period.as_ref())
            .and_then(|p| p.days)
            .filter(|d| d.is_finite())
    }

    /// Counterparty rating on a 0-5 scale.
    pub fn client_rating(&self) -> Option<f64> {
        self.rating_summary
            .as_ref()
            .and_then(|r| r.rate)
            .filter(|r| r.is_finite())
    }

    /// Best-effort price amount for display. Exchanges send either a bare
    /// number or an object carrying `value`/`amount`.
    pub fn price_amount(&self) -> Option<f64> {
        match self.extra.get("price")? {
            Value::Number(number) => number.as_f64(),
            Value::String(raw) => raw.trim().parse().ok(),
            Value::Object(fields) => fields
                .get("value")
                .or_else(|| fields.get("amount"))
                .and_then(Value::as_f64),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Freight {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<FreightRoute>,
    #[serde(
        default,
        deserialize_with = "optional_number_from_json",
        skip_serializing_if = "Option::is_none"
    )]
    pub capacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<PaymentPeriod>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FreightRoute {
    /// Distance in meters.
    #[serde(
        default,
        deserialize_with = "optional_number_from_json",
        skip_serializing_if = "Option::is_none"
    )]
    pub distance: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentPeriod {
    #[serde(
        default,
        deserialize_with = "optional_number_from_json",
        skip_serializing_if = "Option::is_none"
    )]
    pub days: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    #[serde(
        default,
        deserialize_with = "optional_number_from_json",
        skip_serializing_if = "Option::is_none"
    )]
    pub rate: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Automation profile preferences used to evaluate offers. Every field is
/// optional; missing values fall back to the scoring defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financials: Option<Financials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_preferences: Option<VehiclePreferences>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Financials {
    /// Revenue per kilometer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_per_km: Option<f64>,
    /// Price per liter of fuel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_price: Option<f64>,
    /// Driver cost per kilometer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_cost: Option<f64>,
    /// Other operational costs per kilometer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_costs: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehiclePreferences {
    /// Liters per 100 km.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_consumption: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<CapacityRange>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CapacityRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Search parameters forwarded to every exchange and recorded in history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loading_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl SearchQuery {
    /// Query-string pairs for the populated fields.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(origin) = &self.origin {
            pairs.push(("origin", origin.clone()));
        }
        if let Some(destination) = &self.destination {
            pairs.push(("destination", destination.clone()));
        }
        if let Some(date) = &self.loading_date {
            pairs.push(("loading_date", date.clone()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        pairs
    }
}

fn optional_id_from_json<'de, D>(deserializer: D) -> Result<Option<OfferId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct IdVisitor;

    impl<'de> serde::de::Visitor<'de> for IdVisitor {
        type Value = Option<OfferId>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or number identifier")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            let trimmed = value.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if value.is_finite() && value.fract() == 0.0 {
                Ok(Some(format!("{value:.0}")))
            } else {
                Ok(Some(value.to_string()))
            }
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(None)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

/// Accepts numbers, numeric strings and null. Anything else reads as absent
/// rather than failing the whole offer.
fn optional_number_from_json<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(raw)) => raw.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    })
}
