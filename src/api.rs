//! REST API server for AgriChain
//!
//! Exposes the ledger, mining, peer management and consensus over HTTP.

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::error::ChainError;
use crate::node::{Node, NodeState};
use crate::transaction::TransactionRequest;

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BlockchainError(ChainError),
    InvalidInput(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BlockchainError(e) => {
                let status = match &e {
                    ChainError::InvalidTransaction(_) | ChainError::InvalidPeerAddress(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    e if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
                    ChainError::EmptyChain => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::BlockchainError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct SubmitResponse {
    pub message: String,
    pub index: u64,
}

#[derive(Serialize)]
pub struct MineResponse {
    pub message: String,
    pub index: u64,
    pub transactions: Vec<crate::transaction::Transaction>,
    pub proof: u64,
    pub previous_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterNodesRequest {
    #[serde(default)]
    pub nodes: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct RegisterNodesResponse {
    pub message: String,
    pub total_nodes: Vec<String>,
}

#[derive(Serialize)]
pub struct ResolveResponse {
    pub message: String,
    pub replaced: bool,
    pub chain: Vec<crate::blockchain::Block>,
    pub length: usize,
    pub rejected: Vec<crate::consensus::PeerRejection>,
}

// ============================================================================
// Middleware
// ============================================================================

/// Logs method, path, status, duration and current `NodeState`.
async fn logging_middleware(
    State(node): State<Arc<Node>>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status();
    let node_state = format!("{:?}", node.state().await);

    tracing::info!(
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        node_state = %node_state,
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Build the API router with all endpoints
pub fn build_api_router(node: Arc<Node>) -> Router {
    Router::new()
        // Ledger
        .route("/chain", get(get_chain))
        .route("/transactions/new", post(submit_transaction))
        .route("/pending", get(get_pending))
        .route("/trace/:batch_id", get(trace_batch))
        // Mining
        .route("/mine", get(mine).post(mine))
        .route("/mining/status", get(get_mining_status))
        // Peers & consensus
        .route("/nodes", get(get_nodes))
        .route("/nodes/register", post(register_nodes))
        .route("/nodes/resolve", get(resolve_conflicts))
        // System
        .route("/health", get(health_check))
        .layer(middleware::from_fn_with_state(node.clone(), logging_middleware))
        .with_state(node)
        .layer(cors_layer())
}

/// Serve the API on `addr` until the listener fails.
pub async fn run_api_server(node: Arc<Node>, addr: SocketAddr) -> Result<(), ChainError> {
    let app = build_api_router(node);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health_check(State(node): State<Arc<Node>>) -> impl IntoResponse {
    let state = node.state().await;
    let (status, label) = if state == NodeState::Ready {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };
    (
        status,
        Json(serde_json::json!({
            "status": label,
            "node_state": format!("{:?}", state),
            "height": node.height().await,
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

async fn get_chain(State(node): State<Arc<Node>>) -> impl IntoResponse {
    Json(node.chain().await)
}

async fn submit_transaction(
    State(node): State<Arc<Node>>,
    payload: Result<Json<TransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let Json(request) = payload?;
    let index = node.submit_transaction(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            message: format!("Transaction will be added to Block {}", index),
            index,
        }),
    ))
}

async fn mine(State(node): State<Arc<Node>>) -> Result<Json<MineResponse>, ApiError> {
    let block = node.mine().await?;

    Ok(Json(MineResponse {
        message: "New Block Forged".to_string(),
        index: block.index,
        transactions: block.transactions,
        proof: block.proof,
        previous_hash: block.previous_hash,
    }))
}

async fn get_mining_status(State(node): State<Arc<Node>>) -> impl IntoResponse {
    Json(node.mining_status())
}

async fn get_pending(State(node): State<Arc<Node>>) -> impl IntoResponse {
    let transactions = node.pending_transactions().await;
    Json(serde_json::json!({
        "count": transactions.len(),
        "transactions": transactions
    }))
}

async fn trace_batch(
    State(node): State<Arc<Node>>,
    Path(batch_id): Path<String>,
) -> impl IntoResponse {
    let entries = node.trace_batch(&batch_id).await;
    Json(serde_json::json!({
        "batch_id": batch_id,
        "count": entries.len(),
        "entries": entries
    }))
}

async fn get_nodes(State(node): State<Arc<Node>>) -> impl IntoResponse {
    let nodes = node.peer_list();
    Json(serde_json::json!({
        "count": nodes.len(),
        "nodes": nodes
    }))
}

async fn register_nodes(
    State(node): State<Arc<Node>>,
    payload: Result<Json<RegisterNodesRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterNodesResponse>), ApiError> {
    let Json(request) = payload?;
    let nodes = match request.nodes {
        Some(nodes) if !nodes.is_empty() => nodes,
        _ => {
            return Err(ApiError::InvalidInput(
                "Please supply a valid list of nodes".to_string(),
            ))
        }
    };

    node.register_peers(&nodes)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterNodesResponse {
            message: "New nodes have been added".to_string(),
            total_nodes: node.peer_list(),
        }),
    ))
}

async fn resolve_conflicts(State(node): State<Arc<Node>>) -> impl IntoResponse {
    let resolution = node.resolve_conflicts().await;
    let message = if resolution.replaced {
        "Our chain was replaced"
    } else {
        "Our chain is authoritative"
    };
    let chain = node.chain().await;

    Json(ResolveResponse {
        message: message.to_string(),
        replaced: resolution.replaced,
        length: chain.length,
        chain: chain.chain,
        rejected: resolution.rejected,
    })
}
