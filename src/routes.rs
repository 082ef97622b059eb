use crate::context::Context;
use crate::error::handle_rejection;
use crate::handlers;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, Rejection, Reply};

// JSON bodies from devices are small.
const MAX_JSON_BYTES: u64 = 1024 * 1024;

/// Full service: routes, CORS, error rendering and access log.
pub fn api(
    ctx: Arc<Context>,
    max_image_bytes: u64,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST"])
        .allow_header("content-type");
    routes(ctx, max_image_bytes)
        .with(cors)
        .recover(handle_rejection)
        .with(warp::log("plate_ingest"))
}

fn routes(
    ctx: Arc<Context>,
    max_image_bytes: u64,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let index = warp::path::end()
        .and(warp::get())
        .and_then(handlers::index);

    let create_plate = warp::path!("api" / "plates")
        .and(warp::post())
        .and(
            warp::header::optional::<String>("content-type")
                .and_then(handlers::require_jpeg)
                .untuple_one(),
        )
        .and(warp::body::content_length_limit(max_image_bytes))
        .and(warp::body::bytes())
        .and(with_context(ctx.clone()))
        .and_then(handlers::create_plate);

    let list_plates = warp::path!("api" / "plates")
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(handlers::list_plates);

    let create_sensor = warp::path!("api" / "sensors")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_JSON_BYTES))
        .and(warp::body::bytes())
        .and(with_context(ctx.clone()))
        .and_then(handlers::create_sensor);

    let list_sensors = warp::path!("api" / "sensors")
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(handlers::list_sensors);

    let ingest_data = warp::path!("data_ingestion")
        .and(warp::post())
        .and(warp::body::content_length_limit(max_image_bytes))
        .and(warp::body::bytes())
        .and(with_context(ctx))
        .and_then(handlers::ingest_data);

    index
        .or(create_plate)
        .or(list_plates)
        .or(create_sensor)
        .or(list_sensors)
        .or(ingest_data)
}

fn with_context(
    ctx: Arc<Context>,
) -> impl Filter<Extract = (Arc<Context>,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}
