use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;
use std::str::FromStr;

/// Class of device that captured a plate image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceSource {
    #[serde(rename = "camera")]
    Camera,
    #[serde(rename = "ESP32-CAM")]
    Esp32Cam,
}

impl DeviceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceSource::Camera => "camera",
            DeviceSource::Esp32Cam => "ESP32-CAM",
        }
    }
}

impl fmt::Display for DeviceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            s if s.eq_ignore_ascii_case("camera") => Ok(DeviceSource::Camera),
            s if s.eq_ignore_ascii_case("esp32-cam") => Ok(DeviceSource::Esp32Cam),
            other => Err(format!("unknown device source '{}'", other)),
        }
    }
}

/// One processed image. Written whether or not a plate was recognized.
#[derive(Debug, Clone, Serialize)]
pub struct PlateRecord {
    pub plate: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub source: DeviceSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

/// Stored sensor reading set, stamped with the ingestion time.
#[derive(Debug, Clone, Serialize)]
pub struct SensorRecord {
    #[serde(flatten)]
    pub readings: SensorReadings,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SensorReadings {
    /// Fixed channel set with zero defaults.
    Canonical(CanonicalReadings),
    /// Payload fields stored as received, after required-field validation.
    Passthrough(Map<String, Value>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalReadings {
    #[serde(rename = "CO")]
    pub co: Number,
    #[serde(rename = "CO2")]
    pub co2: Number,
    #[serde(rename = "air quality")]
    pub air_quality: Number,
    pub distance: f64,
    pub id: Number,
}

impl Default for CanonicalReadings {
    fn default() -> Self {
        CanonicalReadings {
            co: Number::from(0),
            co2: Number::from(0),
            air_quality: Number::from(0),
            distance: 0.0,
            id: Number::from(0),
        }
    }
}

/// Record written by the combined JSON ingestion route.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionRecord {
    pub timestamp: DateTime<Utc>,
    pub sensors: Option<Value>,
    pub gps: Option<Value>,
    pub recognized_plate: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn device_source_names() {
        assert_eq!("camera".parse::<DeviceSource>(), Ok(DeviceSource::Camera));
        assert_eq!(
            "ESP32-CAM".parse::<DeviceSource>(),
            Ok(DeviceSource::Esp32Cam)
        );
        assert_eq!(
            "esp32-cam".parse::<DeviceSource>(),
            Ok(DeviceSource::Esp32Cam)
        );
        assert!("webcam".parse::<DeviceSource>().is_err());
        assert_eq!(
            serde_json::to_value(DeviceSource::Esp32Cam).unwrap(),
            json!("ESP32-CAM")
        );
    }

    #[test]
    fn plate_record_omits_missing_image_path() {
        let timestamp = Utc::now();
        let record = PlateRecord {
            plate: None,
            timestamp,
            source: DeviceSource::Camera,
            image_path: None,
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"plate": null, "timestamp": timestamp, "source": "camera"})
        );
    }

    #[test]
    fn passthrough_readings_are_flattened() {
        let timestamp = Utc::now();
        let mut fields = Map::new();
        fields.insert("gas1".to_string(), json!(4));
        fields.insert("latitude".to_string(), json!(-12.04));
        let record = SensorRecord {
            readings: SensorReadings::Passthrough(fields),
            timestamp,
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"gas1": 4, "latitude": -12.04, "timestamp": timestamp})
        );
    }
}
