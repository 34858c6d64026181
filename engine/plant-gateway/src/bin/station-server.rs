//! Standalone remote-station simulator.
//!
//! Exposes the `/execute` and `/compensate` endpoints the orchestrator's
//! remote station client speaks, with a configurable processing delay and
//! an optional fail mode for rollback drills.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use warp::http::StatusCode;
use warp::Filter;

#[derive(Parser, Debug, Clone)]
#[command(name = "station-server", about = "Simulated remote production station")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:9090")]
    listen: SocketAddr,

    /// Simulated processing time in milliseconds
    #[arg(long, default_value_t = 500)]
    delay_ms: u64,

    /// Answer every execute request with HTTP 500
    #[arg(long, default_value_t = false)]
    fail: bool,
}

#[derive(Debug, Deserialize)]
struct StationRequest {
    id: String,
}

#[derive(Debug, Serialize)]
struct StationResponse {
    product_id: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    tracing::info!(listen = %args.listen, fail = args.fail, "station server starting");

    let execute = {
        let args = args.clone();
        warp::path!("execute")
            .and(warp::post())
            .and(warp::body::json())
            .and(trace_id())
            .and(warp::any().map(move || args.clone()))
            .and_then(handle_execute)
    };

    let compensate = {
        let args = args.clone();
        warp::path!("compensate")
            .and(warp::post())
            .and(warp::body::json())
            .and(trace_id())
            .and(warp::any().map(move || args.clone()))
            .and_then(handle_compensate)
    };

    warp::serve(execute.or(compensate)).run(args.listen).await;
}

fn trace_id() -> impl Filter<Extract = (Option<String>,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>("x-trace-id")
}

async fn handle_execute(
    request: StationRequest,
    trace_id: Option<String>,
    args: Args,
) -> Result<impl warp::Reply, warp::Rejection> {
    let trace_id = trace_id.unwrap_or_default();
    tracing::info!(product_id = %request.id, %trace_id, "executing remote work");

    tokio::time::sleep(Duration::from_millis(args.delay_ms)).await;

    if args.fail {
        tracing::warn!(product_id = %request.id, "fail mode active, rejecting");
        return Ok(warp::reply::with_status(
            warp::reply::json(&StationResponse {
                product_id: request.id,
                success: false,
                error: Some("simulated station failure".to_string()),
            }),
            StatusCode::INTERNAL_SERVER_ERROR,
        ));
    }

    tracing::info!(product_id = %request.id, "remote work finished");
    Ok(warp::reply::with_status(
        warp::reply::json(&StationResponse {
            product_id: request.id,
            success: true,
            error: None,
        }),
        StatusCode::OK,
    ))
}

async fn handle_compensate(
    request: StationRequest,
    trace_id: Option<String>,
    args: Args,
) -> Result<impl warp::Reply, warp::Rejection> {
    let trace_id = trace_id.unwrap_or_default();
    tracing::warn!(product_id = %request.id, %trace_id, "compensating remote work");

    tokio::time::sleep(Duration::from_millis(args.delay_ms / 2)).await;

    Ok(warp::reply::with_status(
        warp::reply::json(&StationResponse {
            product_id: request.id,
            success: true,
            error: None,
        }),
        StatusCode::OK,
    ))
}
