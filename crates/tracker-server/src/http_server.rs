//! HTTP Tracker Server
//!
//! Axum routes over the tracker. Validation failures and unknown nodes are
//! answered with 403 and `{"success": false, "err": ...}`.

use crate::{
    methods::{
        handle_get_node, handle_get_nodes, handle_register_node, handle_register_transaction,
        handle_reset, handle_set_node_status, handle_status, handle_update_node, ApiError,
        GetNodeRequest, GetNodeResponse, GetNodesResponse, NodeRequest, RegisterTransactionRequest,
        SetNodeStatusRequest, SuccessResponse, TrackerContext,
    },
    subscriptions::SnapshotStream,
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header, Method},
    response::sse::{KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracker_core::Status;

/// HTTP server for the tracker
pub struct HttpTrackerServer {
    context: Arc<TrackerContext>,
}

impl HttpTrackerServer {
    /// Create a new HTTP server
    pub fn new(context: Arc<TrackerContext>) -> Self {
        Self { context }
    }

    /// Create the Axum router
    pub fn router(self) -> Router {
        // CORS layer to allow the browser graph view
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

        Router::new()
            .route("/", get(get_nodes))
            .route("/register-node", post(register_node))
            .route("/update-node", post(update_node))
            .route("/set-node-status", post(set_node_status))
            .route("/node", get(get_node))
            .route("/register-transaction", post(register_transaction))
            .route("/reset", post(reset))
            .route("/status", get(status))
            .route("/topn/updates", get(updates))
            .layer(cors)
            .with_state(self.context)
    }

    /// Run the server on the configured address
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.context.config.http_addr.clone();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("HTTP tracker server listening on {}", addr);

        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

type Ctx = State<Arc<TrackerContext>>;

/// Unwrap an extracted body, mapping shape errors to the tracker error body
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::Malformed(e.body_text()))
}

async fn get_nodes(State(ctx): Ctx) -> Json<GetNodesResponse> {
    Json(handle_get_nodes(&ctx))
}

async fn register_node(
    State(ctx): Ctx,
    payload: Result<Json<NodeRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    handle_register_node(&ctx, body(payload)?).map(Json)
}

async fn update_node(
    State(ctx): Ctx,
    payload: Result<Json<NodeRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    handle_update_node(&ctx, body(payload)?).map(Json)
}

async fn set_node_status(
    State(ctx): Ctx,
    payload: Result<Json<SetNodeStatusRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    handle_set_node_status(&ctx, body(payload)?).map(Json)
}

async fn get_node(
    State(ctx): Ctx,
    query: Result<Query<GetNodeRequest>, QueryRejection>,
) -> Result<Json<GetNodeResponse>, ApiError> {
    let Query(params) = query.map_err(|e| ApiError::Malformed(e.body_text()))?;
    handle_get_node(&ctx, params).map(Json)
}

async fn register_transaction(
    State(ctx): Ctx,
    payload: Result<Json<RegisterTransactionRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    handle_register_transaction(&ctx, body(payload)?).map(Json)
}

async fn reset(State(ctx): Ctx) -> Json<SuccessResponse> {
    Json(handle_reset(&ctx))
}

async fn status(State(ctx): Ctx) -> Json<Status> {
    Json(handle_status(&ctx))
}

/// Open a server-sent event stream of snapshots
async fn updates(State(ctx): Ctx) -> Result<Sse<SnapshotStream>, ApiError> {
    let stream = SnapshotStream::open(&ctx.tracker, ctx.config.subscriber_buffer)
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServerConfig;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use futures::StreamExt;
    use serde_json::{json, Value};
    use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
    use tower::ServiceExt;
    use tracker_core::{DeliveryError, GraphNode, Snapshot, Subscriber, Tracker};

    /// Forwards every published snapshot to the test
    struct Recorder(UnboundedSender<Snapshot>);

    impl Subscriber for Recorder {
        fn send(&mut self, snapshot: &Snapshot) -> Result<(), DeliveryError> {
            self.0
                .send(snapshot.clone())
                .map_err(|_| DeliveryError::Closed)
        }
    }

    /// The single snapshot published since the last call
    fn published_once(rx: &mut UnboundedReceiver<Snapshot>) -> Snapshot {
        let snapshot = rx.try_recv().expect("nothing was published");
        assert!(rx.try_recv().is_err(), "published more than once");
        snapshot
    }

    fn setup() -> (Arc<Tracker>, Router) {
        let tracker = Arc::new(Tracker::new());
        let context = Arc::new(TrackerContext::new(tracker.clone(), ServerConfig::default()));
        (tracker, HttpTrackerServer::new(context).router())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_register_and_status() {
        let (_, router) = setup();

        let response = router
            .clone()
            .oneshot(post_json(
                "/register-node",
                json!({"id": 2, "address": "10.0.0.2", "port": 9001, "publicKey": "pub2"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"success": true, "id": 2}));

        let response = router
            .clone()
            .oneshot(post_json("/set-node-status", json!({"id": 2, "running": true})))
            .await
            .unwrap();
        assert_eq!(json_body(response).await, json!({"success": true, "id": 2}));

        let response = router.clone().oneshot(get("/status")).await.unwrap();
        assert_eq!(
            json_body(response).await,
            json!({"registered": 1, "running": 1})
        );

        let response = router.oneshot(get("/")).await.unwrap();
        let nodes = json_body(response).await;
        assert_eq!(nodes["nodes"].as_array().unwrap().len(), 3);
        assert!(nodes["nodes"][0].is_null());
        assert_eq!(nodes["nodes"][2]["publicKey"], "pub2");
        assert_eq!(nodes["nodes"][2]["running"], true);
    }

    #[tokio::test]
    async fn test_missing_field_is_forbidden() {
        let (_, router) = setup();

        let response = router
            .oneshot(post_json(
                "/register-node",
                json!({"id": 1, "address": "10.0.0.1", "port": null}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            json_body(response).await,
            json!({"success": false, "err": "Specify id, address, port and publicKey"})
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_forbidden() {
        let (_, router) = setup();

        let response = router
            .oneshot(post_json("/set-node-status", json!({"id": "zero"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["success"], false);
    }

    #[tokio::test]
    async fn test_get_node_by_query() {
        let (tracker, router) = setup();
        tracker.register_node(0, "10.0.0.1", 9000, "pub0");

        let response = router.clone().oneshot(get("/node?id=0")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["node"]["address"], "10.0.0.1");

        let response = router.oneshot(get("/node?id=1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            json_body(response).await["err"],
            "invalid id or uninitialized node"
        );
    }

    #[tokio::test]
    async fn test_transactions_and_reset() {
        let (tracker, router) = setup();
        tracker.register_node(0, "10.0.0.1", 9000, "pub0");

        let response = router
            .clone()
            .oneshot(post_json(
                "/register-transaction",
                json!({
                    "from": 0, "to": 2, "amount": 5, "remainder": 1,
                    "numberOfChains": 1, "numberOfBlocks": 2
                }),
            ))
            .await
            .unwrap();
        assert_eq!(json_body(response).await, json!({"success": true}));
        assert_eq!(tracker.snapshot().edges.len(), 1);

        let response = router.oneshot(post_json("/reset", json!({}))).await.unwrap();
        assert_eq!(json_body(response).await, json!({"success": true}));
        assert_eq!(tracker.status().registered, 0);
        assert!(tracker.snapshot().edges.is_empty());
    }

    #[tokio::test]
    async fn test_updates_stream() {
        let (tracker, router) = setup();

        let response = router.oneshot(get("/topn/updates")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(tracker.hub().len(), 1);

        let mut frames = response.into_body().into_data_stream();
        let opened = frames.next().await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&opened).contains("connected"));

        tracker.register_node(4, "10.0.0.4", 9004, "pub4");
        assert_eq!(tracker.publish_update(), 1);

        let frame = frames.next().await.unwrap().unwrap();
        let text = String::from_utf8_lossy(&frame).to_string();
        let data = text
            .lines()
            .find_map(|line| line.strip_prefix("data: ").or(line.strip_prefix("data:")))
            .unwrap();
        let snapshot: Value = serde_json::from_str(data).unwrap();
        assert_eq!(snapshot["nodes"], json!([{"id": 4, "label": "4"}]));
        assert_eq!(snapshot["edges"], json!([]));
        assert_eq!(snapshot["numbers"]["transactions"], 0);

        drop(frames);
        assert!(tracker.hub().is_empty());
    }

    #[tokio::test]
    async fn test_mutation_routes_publish_once() {
        let (tracker, router) = setup();
        let (sender, mut rx) = mpsc::unbounded_channel();
        tracker.subscribe(Box::new(Recorder(sender))).unwrap();
        assert!(rx.try_recv().is_err());

        let response = router
            .clone()
            .oneshot(post_json(
                "/register-node",
                json!({"id": 3, "address": "10.0.0.3", "port": 9003, "publicKey": "pub3"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let snapshot = published_once(&mut rx);
        assert_eq!(
            snapshot.nodes,
            vec![GraphNode {
                id: 3,
                label: "3".to_string()
            }]
        );

        let response = router
            .clone()
            .oneshot(post_json(
                "/update-node",
                json!({"id": 3, "address": "10.0.0.33", "port": 9100, "publicKey": "pub3b"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(published_once(&mut rx), tracker.snapshot());
        assert_eq!(tracker.get_node(3).unwrap().port, 9100);

        let response = router
            .clone()
            .oneshot(post_json("/set-node-status", json!({"id": 3, "running": true})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(published_once(&mut rx).nodes.len(), 1);
        assert!(tracker.get_node(3).unwrap().running);

        let response = router
            .clone()
            .oneshot(post_json(
                "/register-transaction",
                json!({
                    "from": 3, "to": 0, "amount": 5, "remainder": 1,
                    "numberOfChains": 2, "numberOfBlocks": 4
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let snapshot = published_once(&mut rx);
        assert_eq!(snapshot.edges.len(), 1);
        assert_eq!(snapshot.edges[0].amount, 5);
        assert_eq!(snapshot.numbers.transactions, 1);

        let response = router
            .clone()
            .oneshot(post_json("/reset", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(published_once(&mut rx), Snapshot::default());
    }

    #[tokio::test]
    async fn test_rejected_mutations_publish_nothing() {
        let (tracker, router) = setup();
        tracker.register_node(0, "10.0.0.1", 9000, "pub0");
        let (sender, mut rx) = mpsc::unbounded_channel();
        tracker.subscribe(Box::new(Recorder(sender))).unwrap();

        let response = router
            .clone()
            .oneshot(post_json(
                "/update-node",
                json!({"id": 1, "address": "10.0.0.2", "port": 9001, "publicKey": "pub1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(rx.try_recv().is_err());

        let response = router
            .clone()
            .oneshot(post_json("/set-node-status", json!({"id": 1, "running": true})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(rx.try_recv().is_err());

        let response = router
            .clone()
            .oneshot(post_json(
                "/register-node",
                json!({"id": 200_000_000, "address": "h", "port": 1, "publicKey": "k"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(rx.try_recv().is_err());

        let response = router.oneshot(get("/")).await.unwrap();
        assert_eq!(json_body(response).await["nodes"].as_array().unwrap().len(), 1);
        assert_eq!(tracker.hub().stats().publishes, 0);
    }

    #[tokio::test]
    async fn test_run_binds_configured_address() {
        let config = ServerConfig {
            http_addr: "not-an-address".to_string(),
            ..ServerConfig::default()
        };
        let context = Arc::new(TrackerContext::new(Arc::new(Tracker::new()), config));
        assert!(HttpTrackerServer::new(context).run().await.is_err());
    }
}
