//! HTTP client for a remote station service

use crate::error::{Result, StationError};
use crate::Station;
use async_trait::async_trait;
use prodline_types::{Order, TaskContext};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Header carrying the trace id across service boundaries.
pub const TRACE_HEADER: &str = "X-Trace-ID";

const REMOTE_TIMEOUT: Duration = Duration::from_secs(5);

/// Request body for `/execute` and `/compensate`.
#[derive(Debug, Serialize)]
struct RemoteRequest<'a> {
    id: &'a str,
}

/// Response body from the remote station.
#[derive(Debug, Deserialize)]
struct RemoteResponse {
    #[allow(dead_code)]
    product_id: Option<String>,
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// A station reached over HTTP.
///
/// The engine treats it exactly like a local one; transport errors,
/// non-200 responses and remote-reported failures all surface as a failed
/// execution. Dropping the in-flight request on cancellation aborts it.
pub struct RemoteStation {
    id: String,
    endpoint: String,
    client: reqwest::Client,
}

impl RemoteStation {
    /// `endpoint` is the base URL of the station service, e.g.
    /// `http://localhost:9090`.
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REMOTE_TIMEOUT).build()?;
        Ok(Self { id: id.into(), endpoint: endpoint.into(), client })
    }

    async fn post(&self, ctx: &TaskContext, path: &str, order: &Order) -> Result<RemoteResponse> {
        let url = format!("{}{}", self.endpoint, path);
        let response = self
            .client
            .post(&url)
            .header(TRACE_HEADER, ctx.trace_id())
            .json(&RemoteRequest { id: &order.id })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StationError::Status(status.as_u16()));
        }

        Ok(response.json::<RemoteResponse>().await?)
    }
}

#[async_trait]
impl Station for RemoteStation {
    fn id(&self) -> &str {
        &self.id
    }

    fn history_label(&self) -> String {
        format!("{}(Remote)", self.id)
    }

    async fn execute(&self, ctx: &TaskContext, order: &Order) -> Result<()> {
        tracing::info!(
            station_id = %self.id,
            product_id = %order.id,
            trace_id = %ctx.trace_id(),
            endpoint = %self.endpoint,
            "dispatching order to remote station"
        );

        let response = tokio::select! {
            result = self.post(ctx, "/execute", order) => result?,
            _ = ctx.cancelled() => {
                tracing::warn!(station_id = %self.id, product_id = %order.id, "remote call cancelled");
                return Err(StationError::Cancelled);
            }
        };

        if !response.success {
            let message = response.error.unwrap_or_else(|| "remote station failed".to_string());
            tracing::warn!(station_id = %self.id, product_id = %order.id, error = %message, "remote execution failed");
            return Err(StationError::Failed(message));
        }

        tracing::info!(station_id = %self.id, product_id = %order.id, "remote execution succeeded");
        Ok(())
    }

    async fn compensate(&self, ctx: &TaskContext, order: &Order) {
        tracing::warn!(
            station_id = %self.id,
            product_id = %order.id,
            trace_id = %ctx.trace_id(),
            "requesting remote compensation"
        );

        // Best-effort: rollback keeps going whatever the remote says.
        if let Err(error) = self.post(ctx, "/compensate", order).await {
            tracing::warn!(
                station_id = %self.id,
                product_id = %order.id,
                %error,
                "remote compensation failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_label_marks_remote_execution() {
        let station = RemoteStation::new("STATION_AOI", "http://localhost:9090").unwrap();
        assert_eq!(station.history_label(), "STATION_AOI(Remote)");
    }

    #[tokio::test]
    async fn unreachable_endpoint_maps_to_transport_error() {
        // Port 9 (discard) is expected to refuse connections immediately.
        let station = RemoteStation::new("STATION_AOI", "http://127.0.0.1:9").unwrap();
        let ctx = TaskContext::root();
        let order = Order::new("PCB-1", "PCB_DOUBLE_LAYER", 0);

        match station.execute(&ctx, &order).await {
            Err(StationError::Transport(_)) => {}
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
