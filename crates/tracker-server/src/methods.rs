//! Tracker Methods - request validation and route handlers
//!
//! Every request field is optional on the wire so that a missing field can be
//! reported with the route's own message instead of a generic parse error.

use crate::ServerConfig;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracker_core::{Node, NodeId, Status, Tracker, Transaction};

/// Context shared across handlers
pub struct TrackerContext {
    pub tracker: Arc<Tracker>,
    pub config: ServerConfig,
}

impl TrackerContext {
    pub fn new(tracker: Arc<Tracker>, config: ServerConfig) -> Self {
        Self { tracker, config }
    }

    /// Reject ids above the tracker's max node id
    fn node_id(&self, id: NodeId) -> Result<NodeId, ApiError> {
        if id > self.tracker.max_node_id() {
            return Err(ApiError::InvalidNode);
        }
        Ok(id)
    }
}

// ============ Request/Response Types ============

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRequest {
    pub id: Option<NodeId>,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub public_key: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SetNodeStatusRequest {
    pub id: Option<NodeId>,
    pub running: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GetNodeRequest {
    pub id: Option<NodeId>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTransactionRequest {
    pub from: Option<NodeId>,
    pub to: Option<NodeId>,
    pub amount: Option<u64>,
    pub remainder: Option<u64>,
    pub number_of_chains: Option<u64>,
    pub number_of_blocks: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
}

impl SuccessResponse {
    fn ok() -> Self {
        Self {
            success: true,
            id: None,
        }
    }

    fn with_id(id: NodeId) -> Self {
        Self {
            success: true,
            id: Some(id),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetNodeResponse {
    pub success: bool,
    pub node: Node,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetNodesResponse {
    pub nodes: Vec<Option<Node>>,
}

// ============ Handlers ============

const SPECIFY_NODE: &str = "Specify id, address, port and publicKey";
const SPECIFY_STATUS: &str = "Specify node ID and running status";
const SPECIFY_ID: &str = "Specify id";
const SPECIFY_TRANSACTION: &str =
    "Specify from, to, amount, remainder, numberOfChains and numberOfBlocks";

/// Unwrap a present field or fail with the route's message
fn require<T>(field: Option<T>, message: &'static str) -> Result<T, ApiError> {
    field.ok_or(ApiError::MissingFields(message))
}

/// Handle GET /
pub fn handle_get_nodes(ctx: &TrackerContext) -> GetNodesResponse {
    GetNodesResponse {
        nodes: ctx.tracker.nodes(),
    }
}

/// Handle POST /register-node
pub fn handle_register_node(
    ctx: &TrackerContext,
    params: NodeRequest,
) -> Result<SuccessResponse, ApiError> {
    let (id, address, port, public_key) = (
        require(params.id, SPECIFY_NODE)?,
        require(params.address, SPECIFY_NODE)?,
        require(params.port, SPECIFY_NODE)?,
        require(params.public_key, SPECIFY_NODE)?,
    );
    let id = ctx.node_id(id)?;

    let id = ctx
        .tracker
        .register_node(id, address, port, public_key)
        .ok_or(ApiError::InvalidNode)?;
    ctx.tracker.publish_update();
    tracing::info!("Node {} registered", id);

    Ok(SuccessResponse::with_id(id))
}

/// Handle POST /update-node
pub fn handle_update_node(
    ctx: &TrackerContext,
    params: NodeRequest,
) -> Result<SuccessResponse, ApiError> {
    let (id, address, port, public_key) = (
        require(params.id, SPECIFY_NODE)?,
        require(params.address, SPECIFY_NODE)?,
        require(params.port, SPECIFY_NODE)?,
        require(params.public_key, SPECIFY_NODE)?,
    );
    let id = ctx.node_id(id)?;

    if !ctx.tracker.update_node(id, address, port, public_key) {
        return Err(ApiError::InvalidNode);
    }
    ctx.tracker.publish_update();

    Ok(SuccessResponse::ok())
}

/// Handle POST /set-node-status
pub fn handle_set_node_status(
    ctx: &TrackerContext,
    params: SetNodeStatusRequest,
) -> Result<SuccessResponse, ApiError> {
    let id = require(params.id, SPECIFY_STATUS)?;
    let running = require(params.running, SPECIFY_STATUS)?;
    let id = ctx.node_id(id)?;

    if !ctx.tracker.set_node_status(id, running) {
        return Err(ApiError::InvalidNode);
    }
    tracing::debug!("Node {} running = {}", id, running);
    ctx.tracker.publish_update();

    Ok(SuccessResponse::with_id(id))
}

/// Handle GET /node
pub fn handle_get_node(
    ctx: &TrackerContext,
    params: GetNodeRequest,
) -> Result<GetNodeResponse, ApiError> {
    let id = require(params.id, SPECIFY_ID)?;

    let node = ctx.tracker.get_node(id).ok_or(ApiError::UnknownNode)?;
    Ok(GetNodeResponse {
        success: true,
        node,
    })
}

/// Handle POST /register-transaction
pub fn handle_register_transaction(
    ctx: &TrackerContext,
    params: RegisterTransactionRequest,
) -> Result<SuccessResponse, ApiError> {
    let tx = Transaction {
        from: require(params.from, SPECIFY_TRANSACTION)?,
        to: require(params.to, SPECIFY_TRANSACTION)?,
        amount: require(params.amount, SPECIFY_TRANSACTION)?,
        remainder: require(params.remainder, SPECIFY_TRANSACTION)?,
        number_of_chains: require(params.number_of_chains, SPECIFY_TRANSACTION)?,
        number_of_blocks: require(params.number_of_blocks, SPECIFY_TRANSACTION)?,
    };

    ctx.tracker.add_transaction(tx);
    ctx.tracker.publish_update();

    Ok(SuccessResponse::ok())
}

/// Handle POST /reset
pub fn handle_reset(ctx: &TrackerContext) -> SuccessResponse {
    ctx.tracker.reset();
    ctx.tracker.publish_update();
    SuccessResponse::ok()
}

/// Handle GET /status
pub fn handle_status(ctx: &TrackerContext) -> Status {
    ctx.tracker.status()
}

// ============ Error Types ============

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    MissingFields(&'static str),
    #[error("invalid node")]
    InvalidNode,
    #[error("invalid id or uninitialized node")]
    UnknownNode,
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("cannot open update stream: {0}")]
    Unavailable(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "err": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TrackerContext {
        TrackerContext::new(Arc::new(Tracker::new()), ServerConfig::default())
    }

    fn node_request(id: NodeId) -> NodeRequest {
        NodeRequest {
            id: Some(id),
            address: Some(format!("10.0.0.{}", id)),
            port: Some(9000),
            public_key: Some(format!("pub{}", id)),
        }
    }

    #[test]
    fn test_register_requires_every_field() {
        let ctx = context();
        let mut request = node_request(1);
        request.public_key = None;

        let err = handle_register_node(&ctx, request).unwrap_err();
        assert!(matches!(err, ApiError::MissingFields(SPECIFY_NODE)));
        assert_eq!(ctx.tracker.status().registered, 0);
    }

    #[test]
    fn test_register_then_update() {
        let ctx = context();
        let response = handle_register_node(&ctx, node_request(3)).unwrap();
        assert_eq!(response.id, Some(3));

        let mut update = node_request(3);
        update.port = Some(9100);
        assert!(handle_update_node(&ctx, update).unwrap().success);
        assert_eq!(ctx.tracker.get_node(3).unwrap().port, 9100);
    }

    #[test]
    fn test_update_unknown_node() {
        let ctx = context();
        let err = handle_update_node(&ctx, node_request(4)).unwrap_err();
        assert!(matches!(err, ApiError::InvalidNode));
    }

    #[test]
    fn test_id_above_limit_rejected() {
        let ctx = context();
        let limit = ctx.tracker.max_node_id();
        let err = handle_register_node(&ctx, node_request(limit + 1)).unwrap_err();
        assert!(matches!(err, ApiError::InvalidNode));
        assert!(handle_register_node(&ctx, node_request(limit)).is_ok());
    }

    #[test]
    fn test_set_status_false_is_present() {
        let ctx = context();
        handle_register_node(&ctx, node_request(0)).unwrap();

        let request = SetNodeStatusRequest {
            id: Some(0),
            running: Some(false),
        };
        assert!(handle_set_node_status(&ctx, request).is_ok());

        let request = SetNodeStatusRequest {
            id: Some(0),
            running: None,
        };
        assert!(matches!(
            handle_set_node_status(&ctx, request),
            Err(ApiError::MissingFields(SPECIFY_STATUS))
        ));
    }

    #[test]
    fn test_get_node_hole() {
        let ctx = context();
        handle_register_node(&ctx, node_request(2)).unwrap();

        let err = handle_get_node(&ctx, GetNodeRequest { id: Some(1) }).unwrap_err();
        assert_eq!(err.to_string(), "invalid id or uninitialized node");

        let found = handle_get_node(&ctx, GetNodeRequest { id: Some(2) }).unwrap();
        assert_eq!(found.node.address, "10.0.0.2");
    }

    #[test]
    fn test_register_transaction_zero_values_count_as_present() {
        let ctx = context();
        let request = RegisterTransactionRequest {
            from: Some(0),
            to: Some(0),
            amount: Some(0),
            remainder: Some(0),
            number_of_chains: Some(0),
            number_of_blocks: Some(0),
        };
        assert!(handle_register_transaction(&ctx, request).is_ok());
        assert_eq!(ctx.tracker.snapshot().edges.len(), 1);

        let err = handle_register_transaction(&ctx, RegisterTransactionRequest::default())
            .unwrap_err();
        assert_eq!(err.to_string(), SPECIFY_TRANSACTION);
    }

    #[test]
    fn test_id_limit_follows_tracker() {
        let ctx = TrackerContext::new(
            Arc::new(Tracker::with_max_node_id(5)),
            ServerConfig::default(),
        );
        let err = handle_register_node(&ctx, node_request(6)).unwrap_err();
        assert!(matches!(err, ApiError::InvalidNode));
        assert!(ctx.tracker.nodes().is_empty());
    }

    #[tokio::test]
    async fn test_error_body() {
        let response = ApiError::InvalidNode.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"success": false, "err": "invalid node"}));

        assert_eq!(
            ApiError::Unavailable("x".into()).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
