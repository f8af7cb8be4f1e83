/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The HTTP control surface.
//!
//! A thin adapter over [`SuperVm`]: validate, forward, serialise.  Errors
//! come back as `{error, kind}` bodies with the status mapping documented
//! on [`SchedulerError`](crate::error::SchedulerError).  Partial task
//! success is a 200 with `success: true` and a populated `failures`
//! array; only whole-task failures use error statuses.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::compute::{self, ComputeOp};
use crate::error::SchedulerError;
use crate::node::ResourceRequirement;
use crate::task::{
    BrowserSpec, ComputeSpec, Options, RenderSpec, SyncSpec, Task, TaskPayload, TaskPriority,
    TaskStatus,
};
use crate::vm::{SuperVm, VmMode};

// ── Error envelope ────────────────────────────────────────────────────────────

/// API error response: `{error, kind}` plus an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: String,
    message: String,
}

impl ApiError {
    fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: String::from("Validation"),
            message: message.into(),
        }
    }

    fn not_found(what: &str, id: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind: String::from("NotFound"),
            message: format!("{what} '{id}' not found"),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        let status = match &err {
            SchedulerError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            SchedulerError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.message, "kind": self.kind })),
        )
            .into_response()
    }
}

// ── Request bodies ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub scene_file: String,
    pub frame_start: i64,
    pub frame_end: i64,
    #[serde(default)]
    pub options: Options,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub requirements: ResourceRequirement,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub input_data: Vec<Value>,
    pub operation: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, Value>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub requirements: ResourceRequirement,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserRequest {
    pub url: String,
    #[serde(default)]
    pub actions: Vec<Value>,
    #[serde(default)]
    pub options: Options,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub requirements: ResourceRequirement,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub operation: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub options: Options,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub requirements: ResourceRequirement,
}

#[derive(Debug, Deserialize)]
pub struct ScaleRequest {
    pub nodes: i64,
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Build the control router over a started facade.
pub fn router(vm: Arc<SuperVm>) -> Router {
    let cfg = vm.config();
    let body_limit = cfg.request_body_limit_bytes;
    let timeout = cfg.request_timeout();

    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(system_status))
        .route("/api/super-vm/status", get(vm_status))
        .route("/api/super-vm/resources", get(vm_resources))
        .route("/api/super-vm/metrics", get(vm_metrics))
        .route("/api/super-vm/render", post(submit_render))
        .route("/api/super-vm/process", post(submit_process))
        .route("/api/super-vm/browser", post(submit_browser))
        .route("/api/super-vm/sync", post(submit_sync))
        .route("/api/super-vm/scale", post(scale))
        .route("/api/nodes", get(list_nodes))
        .route("/api/nodes/:id", get(node_detail))
        .route("/api/tasks", get(list_tasks))
        .route("/api/tasks/:id", get(task_detail))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .with_state(vm)
}

fn status_label(mode: VmMode) -> &'static str {
    if mode == VmMode::Ready {
        "ok"
    } else {
        "degraded"
    }
}

// ── Introspection handlers ────────────────────────────────────────────────────

async fn health(State(vm): State<Arc<SuperVm>>) -> Json<Value> {
    let status = vm.status().await;
    Json(json!({
        "status": status_label(status.mode),
        "timestamp": Utc::now(),
        "superVM": status,
    }))
}

async fn system_status(State(vm): State<Arc<SuperVm>>) -> Json<Value> {
    let status = vm.status().await;
    let nodes = vm.registry().list().await;
    Json(json!({
        "status": status_label(status.mode),
        "nodes": nodes,
        "superVM": status,
    }))
}

async fn vm_status(State(vm): State<Arc<SuperVm>>) -> Json<crate::vm::VmStatus> {
    Json(vm.status().await)
}

async fn vm_resources(State(vm): State<Arc<SuperVm>>) -> Json<Value> {
    let pool = vm.resources().await;
    Json(json!({
        "resources": pool,
        "utilization": pool.utilization_pct,
    }))
}

async fn vm_metrics(State(vm): State<Arc<SuperVm>>) -> Json<crate::vm::MetricsSnapshot> {
    Json(vm.metrics().await)
}

// ── Submission handlers ───────────────────────────────────────────────────────

async fn submit_render(
    State(vm): State<Arc<SuperVm>>,
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> Result<Json<crate::vm::TaskOutcome>, ApiError> {
    let Json(req) = payload?;
    if req.scene_file.trim().is_empty() {
        return Err(ApiError::validation("sceneFile must not be empty"));
    }
    if req.frame_end < req.frame_start {
        return Err(ApiError::validation(format!(
            "frameEnd {} is before frameStart {}",
            req.frame_end, req.frame_start
        )));
    }

    let task = Task::new(
        TaskPayload::Render(RenderSpec {
            scene_file: req.scene_file,
            frame_start: req.frame_start,
            frame_end: req.frame_end,
            options: req.options,
        }),
        req.priority,
        req.requirements,
        vm.config().task_deadline(),
    );
    Ok(Json(vm.submit(task).await?))
}

async fn submit_process(
    State(vm): State<Arc<SuperVm>>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<Json<crate::vm::TaskOutcome>, ApiError> {
    let Json(req) = payload?;
    if req.input_data.is_empty() {
        return Err(ApiError::validation("inputData must not be empty"));
    }
    compute::validate_numeric(&req.input_data).map_err(ApiError::validation)?;
    let operation =
        ComputeOp::from_request(&req.operation, &req.parameters).map_err(ApiError::validation)?;
    let chunk_size = chunk_size_from(&req.parameters, vm.config().default_chunk_size)?;
    let exhaustive = req
        .parameters
        .get("exhaustive")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let task = Task::new(
        TaskPayload::Compute(ComputeSpec {
            input_data: req.input_data,
            operation,
            chunk_size,
            exhaustive,
        }),
        req.priority,
        req.requirements,
        vm.config().task_deadline(),
    );
    Ok(Json(vm.submit(task).await?))
}

async fn submit_browser(
    State(vm): State<Arc<SuperVm>>,
    payload: Result<Json<BrowserRequest>, JsonRejection>,
) -> Result<Json<crate::vm::TaskOutcome>, ApiError> {
    let Json(req) = payload?;
    if req.url.trim().is_empty() {
        return Err(ApiError::validation("url must not be empty"));
    }

    let task = Task::new(
        TaskPayload::Browser(BrowserSpec {
            url: req.url,
            actions: req.actions,
            options: req.options,
        }),
        req.priority,
        req.requirements,
        vm.config().task_deadline(),
    );
    Ok(Json(vm.submit(task).await?))
}

async fn submit_sync(
    State(vm): State<Arc<SuperVm>>,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<crate::vm::TaskOutcome>, ApiError> {
    let Json(req) = payload?;
    if req.operation.trim().is_empty() {
        return Err(ApiError::validation("operation must not be empty"));
    }

    let task = Task::new(
        TaskPayload::FileSync(SyncSpec {
            operation: req.operation,
            files: req.files,
            options: req.options,
        }),
        req.priority,
        req.requirements,
        vm.config().task_deadline(),
    );
    Ok(Json(vm.submit(task).await?))
}

/// Accepts both `chunk_size` and `chunkSize`; the dashboard sends the
/// former, newer clients the latter.
fn chunk_size_from(
    parameters: &serde_json::Map<String, Value>,
    default: usize,
) -> Result<usize, ApiError> {
    let raw = parameters
        .get("chunk_size")
        .or_else(|| parameters.get("chunkSize"));
    match raw {
        None => Ok(default),
        Some(v) => match v.as_u64() {
            Some(n) if n >= 1 => Ok(n as usize),
            _ => Err(ApiError::validation(
                "chunk_size must be a positive integer",
            )),
        },
    }
}

// ── Scale handler ─────────────────────────────────────────────────────────────

async fn scale(
    State(vm): State<Arc<SuperVm>>,
    payload: Result<Json<ScaleRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;
    if req.nodes < 1 {
        return Err(ApiError::validation("nodes must be a positive integer"));
    }
    vm.scale(req.nodes as u32).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("requested {} node(s) from the provider", req.nodes),
    })))
}

// ── Listing handlers ──────────────────────────────────────────────────────────

async fn list_nodes(State(vm): State<Arc<SuperVm>>) -> Json<Value> {
    let nodes = vm.registry().list().await;
    let active = nodes
        .iter()
        .filter(|n| n.status == crate::node::NodeStatus::Running)
        .count();
    Json(json!({ "nodes": nodes, "activeNodes": active }))
}

async fn node_detail(
    State(vm): State<Arc<SuperVm>>,
    Path(id): Path<String>,
) -> Result<Json<crate::node::Node>, ApiError> {
    vm.registry()
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("node", &id))
}

async fn list_tasks(State(vm): State<Arc<SuperVm>>) -> Json<Value> {
    let store = vm.store();
    let tasks = store.list().await;
    let active = store.count_by_status(TaskStatus::Running).await;
    let completed = store.count_by_status(TaskStatus::Completed).await;
    let failed = store.count_by_status(TaskStatus::Failed).await;
    Json(json!({
        "tasks": tasks,
        "activeTasks": active,
        "completedTasks": completed,
        "failedTasks": failed,
    }))
}

async fn task_detail(
    State(vm): State<Arc<SuperVm>>,
    Path(id): Path<String>,
) -> Result<Json<crate::store::TaskRecord>, ApiError> {
    vm.store()
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("task", &id))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::node::{NodeCapacity, NodeDescriptor};
    use crate::provider::StaticNodeProvider;
    use crate::task::{SubTaskSpec, WorkerOutput};
    use crate::worker::{ExecuteRequest, WorkerCallError, WorkerClient, WorkerHealth};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    // ── Fake worker ───────────────────────────────────────────────────────────

    struct KernelWorker;

    #[async_trait]
    impl WorkerClient for KernelWorker {
        async fn execute(
            &self,
            _addr: &str,
            request: &ExecuteRequest,
            _deadline: Duration,
        ) -> Result<WorkerOutput, WorkerCallError> {
            match &request.spec {
                SubTaskSpec::Compute {
                    data, operation, ..
                } => Ok(WorkerOutput::Compute {
                    processed_data: crate::compute::apply(operation, data),
                }),
                _ => Ok(WorkerOutput::Raw {
                    content_type: "text/plain".into(),
                    data: "b2s=".into(),
                }),
            }
        }

        async fn health(
            &self,
            _addr: &str,
            _timeout: Duration,
        ) -> Result<WorkerHealth, WorkerCallError> {
            Ok(WorkerHealth {
                ok: true,
                load_pct: 0.0,
            })
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    async fn app_with_nodes(count: usize) -> Router {
        let descriptors = (0..count)
            .map(|i| NodeDescriptor {
                id: format!("n{i}"),
                label: format!("n{i}"),
                addr: format!("http://n{i}:7071"),
                capacity: NodeCapacity {
                    cpu_cores: 4,
                    memory_mb: 4096,
                    gpu_count: 0,
                },
                confirmed: true,
            })
            .collect();
        let vm = SuperVm::new(
            SchedulerConfig::default(),
            Arc::new(StaticNodeProvider::new(descriptors)),
            Arc::new(KernelWorker),
        );
        vm.start().await.unwrap();
        router(vm)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn health_reports_ok_when_ready() {
        let app = app_with_nodes(1).await;
        let response = app.oneshot(get_req("/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["superVM"]["mode"], "ready");
    }

    #[tokio::test]
    async fn nodes_listing_counts_active_nodes() {
        let app = app_with_nodes(2).await;
        let body = body_json(app.oneshot(get_req("/api/nodes")).await.unwrap()).await;
        assert_eq!(body["activeNodes"], 2);
        assert_eq!(body["nodes"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_node_is_404_with_kind() {
        let app = app_with_nodes(1).await;
        let response = app.oneshot(get_req("/api/nodes/ghost")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["kind"], "NotFound");
    }

    #[tokio::test]
    async fn resources_exposes_pool_and_utilization() {
        let app = app_with_nodes(2).await;
        let body = body_json(
            app.oneshot(get_req("/api/super-vm/resources"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body["resources"]["totalCpuCores"], 8);
        assert!(body["utilization"].is_number());
    }

    // ── Submission ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn process_sort_returns_sorted_output() {
        let app = app_with_nodes(1).await;
        let response = app
            .oneshot(post_json(
                "/api/super-vm/process",
                json!({
                    "inputData": [5, 2, 8, 1, 9, 3, 7, 4, 6],
                    "operation": "sort",
                    "parameters": {"chunk_size": 9}
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["nodesUsed"], 1);
        assert_eq!(body["result"]["type"], "compute");
        assert_eq!(
            body["result"]["processedData"],
            json!([1, 2, 3, 4, 5, 6, 7, 8, 9])
        );
        assert_eq!(body["result"]["totalProcessed"], 9);
        assert!(body["executionTime"].is_number());
    }

    #[tokio::test]
    async fn render_returns_task_outcome_shape() {
        let app = app_with_nodes(2).await;
        let response = app
            .oneshot(post_json(
                "/api/super-vm/render",
                json!({"sceneFile": "/s.blend", "frameStart": 1, "frameEnd": 4}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["result"]["type"], "render");
        assert!(body["taskId"].is_string());
    }

    #[tokio::test]
    async fn submitted_task_is_visible_in_listing() {
        let app = app_with_nodes(1).await;
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/super-vm/process",
                json!({"inputData": [2, 1], "operation": "sort"}),
            ))
            .await
            .unwrap();
        let task_id = body_json(response).await["taskId"]
            .as_str()
            .unwrap()
            .to_string();

        let listing = body_json(app.clone().oneshot(get_req("/api/tasks")).await.unwrap()).await;
        assert_eq!(listing["completedTasks"], 1);

        let detail = app
            .oneshot(get_req(&format!("/api/tasks/{task_id}")))
            .await
            .unwrap();
        assert_eq!(detail.status(), StatusCode::OK);
        let body = body_json(detail).await;
        assert_eq!(body["status"], "completed");
    }

    // ── Validation ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn unknown_operation_is_400_validation() {
        let app = app_with_nodes(1).await;
        let response = app
            .oneshot(post_json(
                "/api/super-vm/process",
                json!({"inputData": [1], "operation": "eval"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["kind"], "Validation");
    }

    #[tokio::test]
    async fn non_numeric_input_data_is_rejected() {
        let app = app_with_nodes(1).await;
        let response = app
            .oneshot(post_json(
                "/api/super-vm/process",
                json!({"inputData": [1, "two"], "operation": "sort"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn inverted_frame_range_is_rejected() {
        let app = app_with_nodes(1).await;
        let response = app
            .oneshot(post_json(
                "/api/super-vm/render",
                json!({"sceneFile": "/s.blend", "frameStart": 9, "frameEnd": 1}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_body_is_400() {
        let app = app_with_nodes(1).await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/super-vm/render")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn scale_rejects_non_positive_counts() {
        let app = app_with_nodes(1).await;
        let response = app
            .oneshot(post_json("/api/super-vm/scale", json!({"nodes": 0})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // ── Failure mapping ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_fleet_submit_maps_to_500_no_eligible_nodes() {
        let app = app_with_nodes(0).await;
        let response = app
            .oneshot(post_json(
                "/api/super-vm/process",
                json!({"inputData": [1], "operation": "sort"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["kind"], "NoEligibleNodes");
    }

    #[tokio::test]
    async fn not_started_vm_maps_to_503() {
        let vm = SuperVm::new(
            SchedulerConfig::default(),
            Arc::new(StaticNodeProvider::new(vec![])),
            Arc::new(KernelWorker),
        );
        let app = router(vm);
        let response = app
            .oneshot(post_json(
                "/api/super-vm/browser",
                json!({"url": "https://example.com"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["kind"], "NotReady");
    }
}
