use crate::error::AppError;
use crate::types::{CanonicalReadings, SensorReadings, SensorRecord};
use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};

/// Fields the strict policy insists on.
pub const REQUIRED_FIELDS: [&str; 5] = ["gas1", "gas2", "gas3", "latitude", "longitude"];

/// Normalizes a device payload into the canonical channel set.
///
/// `gas1`, `gas2` and `gas3` become `CO`, `CO2` and `air quality`,
/// `distancia` becomes `distance` rounded to two decimals and `id` is kept.
/// Anything else is dropped; missing or non-numeric values read as zero.
pub fn build_sensor_record(payload: &Map<String, Value>, now: DateTime<Utc>) -> SensorRecord {
    let readings = CanonicalReadings {
        co: number_or_zero(payload.get("gas1")),
        co2: number_or_zero(payload.get("gas2")),
        air_quality: number_or_zero(payload.get("gas3")),
        distance: payload
            .get("distancia")
            .and_then(Value::as_f64)
            .map(round_to_hundredths)
            .unwrap_or(0.0),
        id: number_or_zero(payload.get("id")),
    };
    SensorRecord {
        readings: SensorReadings::Canonical(readings),
        timestamp: now,
    }
}

/// Rejects payloads missing any of [`REQUIRED_FIELDS`], otherwise stores
/// the payload as received.
pub fn validate_sensor_record(
    payload: &Map<String, Value>,
    now: DateTime<Utc>,
) -> Result<SensorRecord, AppError> {
    let missing: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|field| !payload.contains_key(**field))
        .map(|field| field.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(AppError::MissingFields(missing));
    }

    let mut fields = payload.clone();
    // The ingestion time is authoritative.
    fields.remove("timestamp");
    Ok(SensorRecord {
        readings: SensorReadings::Passthrough(fields),
        timestamp: now,
    })
}

fn number_or_zero(value: Option<&Value>) -> Number {
    match value {
        Some(Value::Number(n)) => n.clone(),
        _ => Number::from(0),
    }
}

// Values too large to scale already have no fractional part.
fn round_to_hundredths(value: f64) -> f64 {
    let scaled = value * 100.0;
    if scaled.is_finite() {
        scaled.round() / 100.0
    } else {
        value
    }
}
