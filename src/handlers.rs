use crate::context::Context;
use crate::db;
use crate::error::AppError;
use crate::plate::extract_plate;
use crate::sensor::{build_sensor_record, validate_sensor_record};
use crate::types::{IngestionRecord, PlateRecord};
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use warp::{Rejection, Reply};

pub const BANNER: &str = "Plate and sensor ingestion backend is running";

#[derive(Debug, Serialize)]
struct PlateResponse {
    status: &'static str,
    recognized_plate: Option<String>,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_path: Option<String>,
}

fn reject(what: &str, e: AppError) -> Rejection {
    if e.status().is_client_error() {
        warn!("Rejected {}: {}", what, e);
    } else {
        error!("Error handling {}: {}", what, e);
    }
    warp::reject::custom(e)
}

pub async fn index() -> Result<impl Reply, Rejection> {
    Ok(BANNER)
}

/// Accepts only an exact `image/jpeg` content type. Runs before the body is read.
pub async fn require_jpeg(content_type: Option<String>) -> Result<(), Rejection> {
    match content_type.as_deref() {
        Some("image/jpeg") => Ok(()),
        other => Err(reject(
            "plate image",
            AppError::UnsupportedMediaType(other.unwrap_or("none").to_string()),
        )),
    }
}

pub async fn create_plate(body: Bytes, ctx: Arc<Context>) -> Result<impl Reply, Rejection> {
    let response = ingest_plate(body, &ctx)
        .await
        .map_err(|e| reject("plate image", e))?;
    Ok(warp::reply::json(&response))
}

async fn ingest_plate(body: Bytes, ctx: &Context) -> Result<PlateResponse, AppError> {
    if body.is_empty() {
        return Err(AppError::EmptyImage);
    }
    debug!("Received {} byte image", body.len());

    let prepared = ctx.pipeline.prepare(body).await?;
    let plate = recognize(ctx, &prepared.jpeg).await?;
    let image_path = prepared
        .path
        .map(|path| path.to_string_lossy().into_owned());

    let record = PlateRecord {
        plate: plate.clone(),
        timestamp: Utc::now(),
        source: ctx.source,
        image_path: image_path.clone(),
    };
    let collection = ctx.collections.plates.clone();
    ctx.with_db(move |conn| db::insert_document(conn, &collection, &record))
        .await?;
    match &plate {
        Some(plate) => info!("Recognized plate {} from {}", plate, ctx.source),
        None => info!("No plate recognized in image from {}", ctx.source),
    }

    Ok(PlateResponse {
        status: "success",
        recognized_plate: plate,
        timestamp: Utc::now(),
        image_path,
    })
}

/// Runs text detection and plate extraction, applying the OCR error policy.
async fn recognize(ctx: &Context, jpeg: &[u8]) -> Result<Option<String>, AppError> {
    let detection = match ctx.detector.detect_text(jpeg).await {
        Ok(detection) => detection,
        Err(e) if ctx.policy.fail_on_ocr_error => return Err(e.into()),
        Err(e) => {
            warn!("Text detection failed, storing image without a plate: {}", e);
            return Ok(None);
        }
    };
    if let Some(message) = &detection.error {
        if ctx.policy.fail_on_ocr_error {
            return Err(AppError::Ocr(message.clone()));
        }
        warn!("Text detection reported an error, storing image without a plate: {}", message);
        return Ok(None);
    }
    Ok(detection.full_text().and_then(extract_plate))
}

pub async fn list_plates(ctx: Arc<Context>) -> Result<impl Reply, Rejection> {
    let plates = all_documents(&ctx, &ctx.collections.plates)
        .await
        .map_err(|e| reject("plate listing", e))?;
    Ok(warp::reply::json(&json!({
        "status": "success",
        "plates": plates,
    })))
}

pub async fn create_sensor(body: Bytes, ctx: Arc<Context>) -> Result<impl Reply, Rejection> {
    let timestamp = ingest_sensor(&body, &ctx)
        .await
        .map_err(|e| reject("sensor data", e))?;
    Ok(warp::reply::json(&json!({
        "status": "success",
        "message": "Sensor data stored successfully",
        "timestamp": timestamp,
    })))
}

async fn ingest_sensor(body: &[u8], ctx: &Context) -> Result<DateTime<Utc>, AppError> {
    let payload = parse_object(body)?;
    let now = Utc::now();
    let record = if ctx.policy.strict_validation {
        validate_sensor_record(&payload, now)?
    } else {
        build_sensor_record(&payload, now)
    };

    debug!("Storing sensor record {:?}", record);
    let collection = ctx.collections.sensors.clone();
    ctx.with_db(move |conn| db::insert_document(conn, &collection, &record))
        .await?;
    Ok(now)
}

pub async fn list_sensors(ctx: Arc<Context>) -> Result<impl Reply, Rejection> {
    let sensors = all_documents(&ctx, &ctx.collections.sensors)
        .await
        .map_err(|e| reject("sensor listing", e))?;
    Ok(warp::reply::json(&json!({
        "status": "success",
        "sensors": sensors,
    })))
}

/// Sensor readings, GPS fix and an optional base64 image in one JSON body.
/// Image problems never block storing the readings.
pub async fn ingest_data(body: Bytes, ctx: Arc<Context>) -> Result<impl Reply, Rejection> {
    let recognized_plate = ingest_combined(&body, &ctx)
        .await
        .map_err(|e| reject("data ingestion", e))?;
    Ok(warp::reply::json(&json!({
        "status": "success",
        "message": "Data ingested successfully",
        "recognized_plate": recognized_plate,
    })))
}

async fn ingest_combined(body: &[u8], ctx: &Context) -> Result<Option<String>, AppError> {
    let payload = parse_object(body)?;
    if payload.is_empty() {
        return Err(AppError::InvalidJson("no JSON data received".to_string()));
    }

    let recognized_plate = match payload.get("image") {
        Some(Value::String(encoded)) if !encoded.trim().is_empty() => {
            recognize_encoded(ctx, encoded).await
        }
        Some(Value::String(_)) | Some(Value::Null) | None => {
            debug!("No base64 image received");
            None
        }
        Some(other) => {
            warn!("Ignoring image field of unexpected type: {}", other);
            None
        }
    };

    let record = IngestionRecord {
        timestamp: Utc::now(),
        sensors: payload.get("sensors").cloned(),
        gps: payload.get("gps").cloned(),
        recognized_plate: recognized_plate.clone(),
    };
    let collection = ctx.collections.ingestion.clone();
    ctx.with_db(move |conn| db::insert_document(conn, &collection, &record))
        .await?;
    Ok(recognized_plate)
}

async fn recognize_encoded(ctx: &Context, encoded: &str) -> Option<String> {
    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let jpeg = match general_purpose::STANDARD.decode(cleaned) {
        Ok(jpeg) => jpeg,
        Err(e) => {
            warn!("Failed to decode base64 image: {}", e);
            return None;
        }
    };
    let detection = match ctx.detector.detect_text(&jpeg).await {
        Ok(detection) => detection,
        Err(e) => {
            warn!("Text detection failed, continuing ingestion: {}", e);
            return None;
        }
    };
    if let Some(message) = &detection.error {
        warn!("Text detection reported an error: {}", message);
    }
    detection.full_text().and_then(extract_plate)
}

fn parse_object(body: &[u8]) -> Result<Map<String, Value>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::InvalidJson("no JSON data received".to_string()));
    }
    match serde_json::from_slice(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::InvalidJson("expected a JSON object".to_string())),
        Err(e) => Err(AppError::InvalidJson(e.to_string())),
    }
}

async fn all_documents(ctx: &Context, collection: &str) -> Result<Vec<Value>, AppError> {
    let collection = collection.to_string();
    ctx.with_db(move |conn| db::all_documents(conn, &collection))
        .await
}
