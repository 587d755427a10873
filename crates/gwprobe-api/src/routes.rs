//! ---
//! probe_section: "05-http-surface"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Notification ingress and campaign control over HTTP."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use gwprobe_common::{parse_i64, parse_u64, TimeUnit};
use gwprobe_core::{
    ArmRequest, DeathEvent, MarkSelector, PendingAction, Probe, RestartEvent, SharedRegistry,
    StartEvent, StartOutcome, StatsDocument, StatusSnapshot, WorkloadConfig,
};
use prometheus::TextEncoder;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::{invalid_param, ApiError};

/// Shared state injected into the handlers.
pub struct ApiState {
    probe: Arc<Probe>,
    registry: Option<SharedRegistry>,
}

impl ApiState {
    pub fn new(probe: Arc<Probe>, registry: Option<SharedRegistry>) -> Self {
        Self { probe, registry }
    }
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/death", put(put_death))
        .route("/start", put(put_start))
        .route("/probe", put(put_probe))
        .route("/clear", put(put_clear))
        .route("/stats", get(get_stats))
        .route("/status", get(get_status))
        .route("/metrics", get(get_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
struct Ack {
    accepted: bool,
}

#[derive(Debug, Deserialize)]
struct DeathQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
    ts: Option<String>,
}

async fn put_death(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<DeathQuery>,
) -> Result<Json<Ack>, ApiError> {
    let ts = parse_i64(query.ts.as_deref().unwrap_or_default())
        .map_err(|err| invalid_param("ts", err))?;
    let death = DeathEvent {
        ts,
        kind: query.kind.unwrap_or_default(),
    };
    state.probe.submit_death(death).await?;
    Ok(Json(Ack { accepted: true }))
}

#[derive(Debug, Deserialize)]
struct StartQuery {
    ts: Option<String>,
    #[serde(rename = "where")]
    checkpoint: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StartResponse {
    sealed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    restart: Option<RestartEvent>,
}

async fn put_start(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<StartQuery>,
) -> Result<Json<StartResponse>, ApiError> {
    let ts = parse_i64(query.ts.as_deref().unwrap_or_default())
        .map_err(|err| invalid_param("ts", err))?;
    let checkpoint = query
        .checkpoint
        .filter(|checkpoint| !checkpoint.is_empty())
        .ok_or_else(|| ApiError::bad_request("where: missing value"))?;
    let response = match state.probe.submit_start(StartEvent::new(ts, checkpoint)).await? {
        StartOutcome::Recorded => StartResponse {
            sealed: false,
            restart: None,
        },
        StartOutcome::Sealed(restart) => StartResponse {
            sealed: true,
            restart: Some(restart),
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Default, Deserialize)]
struct ProbeQuery {
    restarts: Option<String>,
    how: Option<String>,
    mark: Option<String>,
    grace_period_ms: Option<String>,
    pin_node: Option<String>,
    wl_fn: Option<String>,
    wl_args: Option<String>,
    wl_freq_ms: Option<String>,
}

impl ProbeQuery {
    /// `body` optionally carries a JSON [`PendingAction`].
    fn into_request(self, body: &[u8]) -> Result<ArmRequest, ApiError> {
        let restarts = parse_u64(self.restarts.as_deref().unwrap_or_default())
            .map_err(|err| invalid_param("restarts", err))?;
        let restarts = u32::try_from(restarts)
            .map_err(|_| ApiError::bad_request(format!("restarts: {restarts} is too large")))?;
        let grace_period_ms = match self.grace_period_ms.as_deref() {
            None | Some("") => 0,
            Some(raw) => parse_u64(raw).map_err(|err| invalid_param("grace_period_ms", err))?,
        };
        let workload = match self.wl_fn.as_deref() {
            None | Some("") => None,
            Some(function) => {
                let frequency = parse_u64(self.wl_freq_ms.as_deref().unwrap_or_default())
                    .map_err(|err| invalid_param("wl_freq_ms", err))?;
                Some(WorkloadConfig::from_wire(
                    function,
                    self.wl_args.as_deref().unwrap_or_default(),
                    frequency,
                ))
            }
        };
        let interpose = if body.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            let action: PendingAction = serde_json::from_slice(body)
                .map_err(|err| ApiError::bad_request(format!("interposition action: {err}")))?;
            Some(action)
        };
        Ok(ArmRequest {
            restarts,
            how: self.how.unwrap_or_default(),
            mark: self.mark.unwrap_or_default(),
            grace_period_ms,
            pin_node: self.pin_node.filter(|node| !node.is_empty()),
            interpose,
            workload,
        })
    }
}

async fn put_probe(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ProbeQuery>,
    body: Bytes,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let request = query.into_request(&body)?;
    state.probe.arm(request).await?;
    Ok(Json(state.probe.status().await))
}

async fn put_clear(State(state): State<Arc<ApiState>>) -> Json<Ack> {
    state.probe.clear().await;
    Json(Ack { accepted: true })
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    mark: Option<String>,
    time_unit: Option<String>,
    full_series: Option<String>,
}

async fn get_stats(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsDocument>, ApiError> {
    let unit = match query.time_unit.as_deref() {
        None | Some("") => TimeUnit::Seconds,
        Some(raw) => raw.parse::<TimeUnit>()?,
    };
    let selector = MarkSelector::parse(query.mark.as_deref().unwrap_or_default());
    let full_series = query.full_series.as_deref() == Some("true");
    Ok(Json(state.probe.stats(&selector, unit, full_series)))
}

async fn get_status(State(state): State<Arc<ApiState>>) -> Json<StatusSnapshot> {
    Json(state.probe.status().await)
}

async fn get_metrics(State(state): State<Arc<ApiState>>) -> Response {
    let Some(registry) = &state.registry else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics registry unavailable",
        )
            .into_response();
    };

    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&registry.gather()) {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => {
            warn!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn restarts(raw: &str) -> ProbeQuery {
        ProbeQuery {
            restarts: Some(raw.to_owned()),
            ..ProbeQuery::default()
        }
    }

    #[test]
    fn arm_query_accepts_prefixed_integers_and_workload() {
        let request = ProbeQuery {
            how: Some("k8s_scale_deployment_0_1".into()),
            mark: Some("run".into()),
            grace_period_ms: Some("250".into()),
            wl_fn: Some("SendObject".into()),
            wl_args: Some("bn=b,on=o,pl=p".into()),
            wl_freq_ms: Some("20".into()),
            ..restarts("0x10")
        }
        .into_request(b"")
        .unwrap();
        assert_eq!(request.restarts, 16);
        assert_eq!(request.grace_period_ms, 250);
        assert_eq!(request.mark, "run");
        let workload = request.workload.unwrap();
        assert_eq!(workload.frequency_ms, 20);
        assert_eq!(workload.args.get("on").map(String::as_str), Some("o"));
        assert!(request.interpose.is_none());
    }

    #[test]
    fn arm_query_rejects_bad_counts_and_bodies() {
        for raw in ["ten", "", "0x100000000"] {
            let err = restarts(raw).into_request(b"").unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "restarts={raw}");
        }
        let err = restarts("1")
            .into_request(br#"{"action":"shuffle"}"#)
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn arm_body_carries_the_interposition_action() {
        let request = restarts("2")
            .into_request(br#"{"action":"erase_objects","bucket":"b","prefix":"o","count":3}"#)
            .unwrap();
        assert_eq!(
            request.interpose,
            Some(PendingAction::EraseObjects {
                bucket: "b".into(),
                prefix: "o".into(),
                count: 3,
            })
        );
    }
}
