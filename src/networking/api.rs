// Copyright (c) 2026 Potchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

//! The peer API surface: a thin request/response envelope over the engine.
//!
//! Handlers resolve the caller by its source address, delegate to the
//! engine, and serialize `PotError` verbatim as `{"error": ...}` with the
//! mapped status code.

use crate::core::consensus::engine::Pot;
use crate::core::node::NodeType;
use crate::core::types::PotError;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use rand::Rng;
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::error;
use uuid::Uuid;

/// Maximum accepted raw-transaction body.
const MAX_TX_BODY: usize = 1024;

struct ApiError(PotError);

impl From<PotError> for ApiError {
    fn from(e: PotError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        error!(code = status.as_u16(), error = %self.0, "request failed");
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn source_ip(addr: &SocketAddr) -> String {
    addr.ip().to_string()
}

fn parse_uuid(raw: &str) -> Result<Uuid, PotError> {
    Uuid::parse_str(raw)
        .map_err(|_| PotError::Malformed(format!("Identifier {raw} is not valid UUID")))
}

fn check_tx_body(body: &Bytes) -> Result<(), PotError> {
    if body.len() >= MAX_TX_BODY {
        return Err(PotError::Malformed("Transaction data is too long".to_string()));
    }
    Ok(())
}

/// Optional inbound latency injection, driven by `MIN_DELAY`/`MAX_DELAY`.
async fn inject_delay(
    State(pot): State<Arc<Pot>>,
    req: axum::extract::Request,
    next: middleware::Next,
) -> Response {
    if pot.cfg.max_delay_ms > 0 {
        let lo = pot.cfg.min_delay_ms.min(pot.cfg.max_delay_ms);
        let ms = rand::thread_rng().gen_range(lo..=pot.cfg.max_delay_ms);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
    next.run(req).await
}

/// Count error responses.
async fn count_errors(
    State(pot): State<Arc<Pot>>,
    req: axum::extract::Request,
    next: middleware::Next,
) -> Response {
    let res = next.run(req).await;
    if !res.status().is_success() {
        pot.metrics.api_errors_total.inc();
    }
    res
}

/// Build the full router over a shared engine.
pub fn router(pot: Arc<Pot>) -> Router {
    Router::new()
        .route("/info", get(info))
        .route("/public-key", get(public_key))
        .route("/blockchain", get(blockchain))
        .route("/blockchain/verified", get(blockchain_verified))
        .route("/blockchain/block/new", post(blockchain_block_new))
        .route("/block", post(block_populate))
        .route("/transaction", post(transaction_new))
        .route("/transaction/to-verify", get(transaction_to_verify))
        .route("/transaction/:id", get(transaction_get))
        .route("/transaction/:id/populate", post(transaction_populate))
        .route("/transaction/:id/verifyResult", post(transaction_verify_result))
        .route("/transaction/:id/verified", post(transaction_verified))
        .route("/node/list", get(node_list))
        .route("/node/register", post(node_register))
        .route("/node/populate-new", post(node_populate_new))
        .route("/node/update", get(node_update))
        .route("/node/validator/new", post(node_validator_new))
        .route("/node/validator/agreement", get(agreement_get).post(agreement_start))
        .route("/node/validator/agreement/vote", patch(agreement_vote))
        .route("/node/validator/agreement/done", post(agreement_done))
        .route("/node/:id", get(node_get))
        .route("/node/:id/trust", patch(node_trust))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn_with_state(pot.clone(), count_errors))
        .layer(middleware::from_fn_with_state(pot.clone(), inject_delay))
        .with_state(pot)
}

async fn info(State(pot): State<Arc<Pot>>) -> Json<Value> {
    Json(json!({
        "status": "active",
        "ip": pot.cfg.host,
        "hostname": pot.cfg.host,
        "identifier": pot.keystore.identifier.simple().to_string(),
    }))
}

async fn public_key(State(pot): State<Arc<Pot>>) -> String {
    pot.keystore.public_key_pem().to_string()
}

async fn blockchain(State(pot): State<Arc<Pot>>) -> ApiResult<Json<Value>> {
    let blocks = pot.chain.all().map_err(PotError::from)?;
    Ok(Json(json!({
        "blockchain": blocks.iter().map(|b| b.to_json()).collect::<Vec<_>>(),
    })))
}

async fn blockchain_verified(State(pot): State<Arc<Pot>>) -> ApiResult<Json<Value>> {
    let txs = pot.verified.all().map_err(PotError::from)?;
    Ok(Json(json!({
        "transactions": txs.iter().map(|(id, v)| json!({
            "identifier": id.simple().to_string(),
            "timestamp": v.time,
            "data": v.tx.data,
        })).collect::<Vec<_>>(),
    })))
}

async fn transaction_to_verify(State(pot): State<Arc<Pot>>) -> ApiResult<Json<Value>> {
    let pending = pot.pending.all().map_err(PotError::from)?;
    let mut out = serde_json::Map::new();
    for (id, entry) in pending {
        let positives = entry.voting.values().filter(|v| **v).count();
        out.insert(
            id.simple().to_string(),
            json!({
                "timestamp": entry.time,
                "transaction": entry.tx.to_string_form(),
                "node": entry.node_id.simple().to_string(),
                "voting": {
                    "result": positives,
                    "count": entry.voting.len(),
                    "voting": entry.voting.iter().map(|(voter, v)| json!({
                        "uuid": voter.simple().to_string(),
                        "result": v,
                    })).collect::<Vec<_>>(),
                },
            }),
        );
    }
    Ok(Json(Value::Object(out)))
}

async fn transaction_new(
    State(pot): State<Arc<Pot>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    check_tx_body(&body)?;
    let id = pot.transaction_new(&body, &source_ip(&addr)).await?;
    Ok(Json(json!({ "id": id.simple().to_string() })))
}

async fn transaction_get(
    State(pot): State<Arc<Pot>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<u8>> {
    let id = parse_uuid(&id)?;
    Ok(pot.transaction_get(&id)?)
}

async fn transaction_populate(
    State(pot): State<Arc<Pot>>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<()> {
    let id = parse_uuid(&id)?;
    pot.transaction_populate(&body, id).await?;
    Ok(())
}

async fn transaction_verify_result(
    State(pot): State<Arc<Pot>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> ApiResult<()> {
    let id = parse_uuid(&id)?;
    let result = payload
        .get("result")
        .and_then(Value::as_bool)
        .ok_or_else(|| PotError::Malformed("Missing vote result".to_string()))?;
    pot.transaction_populate_verify_result(result, id, &source_ip(&addr)).await?;
    Ok(())
}

async fn transaction_verified(
    State(pot): State<Arc<Pot>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<()> {
    check_tx_body(&body)?;
    let id = parse_uuid(&id)?;
    let body = String::from_utf8(body.to_vec())
        .map_err(|_| PotError::Malformed("Invalid transaction data".to_string()))?;
    pot.transaction_verified_new(id, &body, &source_ip(&addr))?;
    Ok(())
}

async fn block_populate(
    State(pot): State<Arc<Pot>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> ApiResult<()> {
    pot.add_new_block(&body, &source_ip(&addr), false)?;
    Ok(())
}

async fn blockchain_block_new(
    State(pot): State<Arc<Pot>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> ApiResult<String> {
    Ok(pot.add_new_block(&body, &source_ip(&addr), true)?.to_string())
}

async fn node_list(State(pot): State<Arc<Pot>>) -> ApiResult<Json<Value>> {
    let nodes = pot.nodes.all().map_err(PotError::from)?;
    Ok(Json(json!({ "nodes": pot.nodes_info(&nodes)? })))
}

async fn node_get(State(pot): State<Arc<Pot>>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let id = parse_uuid(&id)?;
    let node = pot
        .nodes
        .find_by_identifier(&id)
        .map_err(PotError::from)?
        .ok_or_else(|| PotError::Unknown("Node not found".to_string()))?;
    let info = pot.nodes_info(std::slice::from_ref(&node))?;
    Ok(Json(serde_json::to_value(&info[0]).unwrap_or_default()))
}

async fn node_register(
    State(pot): State<Arc<Pot>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<Value>> {
    let port = payload
        .get("port")
        .and_then(Value::as_u64)
        .ok_or_else(|| PotError::Malformed("Missing required keys port".to_string()))?;
    let node_type = payload
        .get("type")
        .and_then(Value::as_str)
        .map(NodeType::from_name)
        .unwrap_or(NodeType::Sensor);
    let identifier = match payload.get("identifier").and_then(Value::as_str) {
        Some(raw) => parse_uuid(raw)?,
        None => Uuid::new_v4(),
    };
    let out = pot.node_register(identifier, &source_ip(&addr), port as u16, node_type).await?;
    Ok(Json(out))
}

async fn node_populate_new(
    State(pot): State<Arc<Pot>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<Value>,
) -> ApiResult<()> {
    pot.populate_new_node(&payload, &source_ip(&addr))?;
    Ok(())
}

async fn node_update(State(pot): State<Arc<Pot>>) -> ApiResult<Json<Value>> {
    Ok(Json(pot.node_update_snapshot()?))
}

async fn node_validator_new(
    State(pot): State<Arc<Pot>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<Value>,
) -> ApiResult<()> {
    pot.node_new_validators(&source_ip(&addr), &payload)?;
    Ok(())
}

async fn node_trust(
    State(pot): State<Arc<Pot>>,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> ApiResult<()> {
    let id = parse_uuid(&id)?;
    pot.node_trust_change(id, &payload)?;
    Ok(())
}

async fn agreement_get(State(pot): State<Arc<Pot>>) -> ApiResult<Json<Value>> {
    Ok(Json(pot.node_validator_agreement_get()?))
}

async fn agreement_start(
    State(pot): State<Arc<Pot>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<Value>> {
    Ok(Json(pot.node_validator_agreement_start(&source_ip(&addr), &payload).await?))
}

async fn agreement_vote(
    State(pot): State<Arc<Pot>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<Value>> {
    pot.node_validator_agreement_vote(&source_ip(&addr), &payload).await?;
    Ok(Json(json!({})))
}

async fn agreement_done(
    State(pot): State<Arc<Pot>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<Value>> {
    pot.node_validator_agreement_done(&source_ip(&addr), &payload)?;
    Ok(Json(json!({})))
}

async fn metrics(State(pot): State<Arc<Pot>>) -> Response {
    let encoder = TextEncoder::new();
    let families = pot.metrics.registry.gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buf) {
        error!(%e, "failed to encode metrics");
    }
    ([(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())], buf).into_response()
}
