//! HTTP transport implementation.
//!
//! JSON-RPC over POST requests, so standard HTTP clients (curl, browsers,
//! etc.) can call the gateway. The caller's credential comes from an
//! `Authorization: Bearer ...` header or the `api_token` query parameter.
//! A tool call that fails authentication is answered with HTTP 401, one that
//! lacks a scope with 403, both carrying a `WWW-Authenticate` challenge.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
    },
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use super::{TransportError, TransportResult, config::HttpConfig};
use crate::core::server::Gateway;
use crate::domains::auth::Credential;
use crate::domains::tools::{ToolError, to_call_result};

/// Protocol version reported by `initialize`.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Path of the RFC 9728 metadata document.
const RESOURCE_METADATA_PATH: &str = "/.well-known/oauth-protected-resource";

/// HTTP transport handler.
pub struct HttpTransport {
    config: HttpConfig,
}

/// JSON-RPC request structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC response structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Body could not be parsed as JSON.
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::error(None, -32700, msg)
    }

    /// Method not found error.
    pub fn method_not_found(id: Option<Value>) -> Self {
        Self::error(id, -32601, "Method not found")
    }

    /// Invalid request error.
    pub fn invalid_request(id: Option<Value>) -> Self {
        Self::error(id, -32600, "Invalid Request")
    }

    /// Invalid params error.
    pub fn invalid_params(id: Option<Value>, msg: impl Into<String>) -> Self {
        Self::error(id, -32602, msg)
    }

    /// Internal error.
    pub fn internal_error(id: Option<Value>, msg: impl Into<String>) -> Self {
        Self::error(id, -32603, msg)
    }

    /// Authentication or authorization failure, with the error report as data.
    pub fn access_denied(id: Option<Value>, err: &ToolError) -> Self {
        let mut response = Self::error(id, -32001, err.to_string());
        if let Some(error) = response.error.as_mut() {
            error.data = serde_json::to_value(err.report()).ok();
        }
        response
    }
}

/// How a JSON-RPC message is answered over HTTP.
enum RpcReply {
    /// 200 with a JSON-RPC body.
    Ok(JsonRpcResponse),
    /// Notifications get no body.
    Accepted,
    /// 401/403 with a challenge header.
    Denied {
        status: StatusCode,
        challenge: String,
        response: JsonRpcResponse,
    },
}

impl IntoResponse for RpcReply {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(response) => (StatusCode::OK, Json(response)).into_response(),
            Self::Accepted => StatusCode::ACCEPTED.into_response(),
            Self::Denied {
                status,
                challenge,
                response,
            } => {
                let mut http = (status, Json(response)).into_response();
                match HeaderValue::from_str(&challenge) {
                    Ok(value) => {
                        http.headers_mut().insert(WWW_AUTHENTICATE, value);
                    }
                    Err(e) => warn!("Challenge is not a valid header value: {}", e),
                }
                http
            }
        }
    }
}

/// Application state shared across HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    gateway: Arc<Gateway>,
    rpc_path: String,
}

/// Query parameters carrying a legacy credential.
#[derive(Debug, Default, Deserialize)]
struct CredentialQuery {
    api_token: Option<String>,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given config.
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }

    /// Get the bind address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Run the HTTP transport.
    pub async fn run(self, gateway: Arc<Gateway>) -> TransportResult<()> {
        let addr = self.address();
        let app = router(gateway, &self.config);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::bind(&addr, e))?;

        let cors_status = if self.config.enable_cors {
            "enabled"
        } else {
            "disabled"
        };
        info!(
            "Ready - listening on {} (JSON-RPC over HTTP, CORS {})",
            addr, cors_status
        );
        info!("  → JSON-RPC: POST {}", self.config.rpc_path);
        info!("  → Health:   GET /health");
        info!("  → Metadata: GET {}", RESOURCE_METADATA_PATH);

        axum::serve(listener, app)
            .await
            .map_err(|e| TransportError::http(e.to_string()))?;

        Ok(())
    }
}

/// Build the axum router for `gateway`.
pub fn router(gateway: Arc<Gateway>, config: &HttpConfig) -> Router {
    let state = AppState {
        gateway,
        rpc_path: config.rpc_path.clone(),
    };

    let mut app = Router::new()
        .route(&config.rpc_path, post(handle_rpc))
        .route("/health", get(health_check))
        .route(RESOURCE_METADATA_PATH, get(resource_metadata))
        .route("/", get(root_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Add CORS if enabled
    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers([WWW_AUTHENTICATE]);
        app = app.layer(cors);
    }
    app
}

/// Root handler - provides API info.
async fn root_handler(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.gateway.config();
    Json(json!({
        "name": config.server.name,
        "version": config.server.version,
        "transport": "HTTP",
        "endpoints": {
            "rpc": state.rpc_path,
            "health": "/health",
            "resource_metadata": RESOURCE_METADATA_PATH,
        },
        "protocol": "JSON-RPC 2.0",
        "documentation": format!(
            "Send POST requests to {} with JSON-RPC messages; authenticate with \
             'Authorization: Bearer <token>' or '?api_token=<key>'",
            state.rpc_path
        )
    }))
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "tools": state.gateway.list_tools().len(),
        "cache": state.gateway.cache_stats(),
    }))
}

/// OAuth 2.0 protected resource metadata.
async fn resource_metadata(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.gateway.gate().protected_resource_metadata())
}

/// Handle JSON-RPC requests.
#[instrument(skip_all, fields(method))]
async fn handle_rpc(
    State(state): State<AppState>,
    Query(query): Query<CredentialQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> RpcReply {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejecting malformed JSON-RPC body: {}", e);
            return RpcReply::Ok(JsonRpcResponse::parse_error(format!("Parse error: {e}")));
        }
    };
    tracing::Span::current().record("method", request.method.as_str());

    let credential = Credential::from_http(
        headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
        query.api_token.as_deref(),
    );
    info!(
        credential = credential.kind(),
        "Received JSON-RPC request: {}", request.method
    );

    process_request(&state, request, &credential).await
}

/// Process a JSON-RPC request and decide how to answer it.
async fn process_request(
    state: &AppState,
    request: JsonRpcRequest,
    credential: &Credential,
) -> RpcReply {
    // Validate JSON-RPC version
    if request.jsonrpc != "2.0" {
        return RpcReply::Ok(JsonRpcResponse::invalid_request(request.id));
    }

    match request.method.as_str() {
        "initialize" => RpcReply::Ok(handle_initialize(state, request)),
        "ping" => RpcReply::Ok(JsonRpcResponse::success(request.id, json!({}))),
        "tools/list" => RpcReply::Ok(handle_tools_list(state, request)),
        "tools/call" => handle_tools_call(state, request, credential).await,

        // Notifications (no response needed for stateless HTTP)
        method if method.starts_with("notifications/") => {
            info!("Received notification: {}", method);
            RpcReply::Accepted
        }

        // Unknown method
        _ => {
            warn!("Unknown method: {}", request.method);
            RpcReply::Ok(JsonRpcResponse::method_not_found(request.id))
        }
    }
}

/// Handle initialize request.
fn handle_initialize(state: &AppState, request: JsonRpcRequest) -> JsonRpcResponse {
    info!("Processing initialize request");
    let config = state.gateway.config();

    let result = json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": config.server.name,
            "version": config.server.version
        },
        "instructions": "Market data gateway. Authenticate with a bearer token or api_token, then call tools/list."
    });

    JsonRpcResponse::success(request.id, result)
}

/// Handle tools/list request.
fn handle_tools_list(state: &AppState, request: JsonRpcRequest) -> JsonRpcResponse {
    info!("Processing tools/list request");

    match serde_json::to_value(state.gateway.list_tools()) {
        Ok(tools) => JsonRpcResponse::success(request.id, json!({ "tools": tools })),
        Err(e) => JsonRpcResponse::internal_error(request.id, e.to_string()),
    }
}

/// Handle tools/call request.
async fn handle_tools_call(
    state: &AppState,
    request: JsonRpcRequest,
    credential: &Credential,
) -> RpcReply {
    let id = request.id;
    let Some(params) = request.params else {
        return RpcReply::Ok(JsonRpcResponse::invalid_params(id, "Missing params"));
    };

    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return RpcReply::Ok(JsonRpcResponse::invalid_params(id, "Missing tool name"));
    };

    let arguments = match params.get("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return RpcReply::Ok(JsonRpcResponse::invalid_params(
                id,
                "Tool arguments must be an object",
            ));
        }
    };

    info!("Processing tools/call request: {}", name);
    let result = state.gateway.call_tool(name, arguments, credential).await;

    if let Err(err) = &result {
        let status = match err {
            ToolError::Unauthenticated { .. } => Some(StatusCode::UNAUTHORIZED),
            ToolError::Forbidden { .. } => Some(StatusCode::FORBIDDEN),
            _ => None,
        };
        if let (Some(status), Some(challenge)) = (status, err.challenge()) {
            return RpcReply::Denied {
                status,
                challenge: challenge.header_value(),
                response: JsonRpcResponse::access_denied(id, err),
            };
        }
    }

    match serde_json::to_value(to_call_result(result)) {
        Ok(value) => RpcReply::Ok(JsonRpcResponse::success(id, value)),
        Err(e) => RpcReply::Ok(JsonRpcResponse::internal_error(id, e.to_string())),
    }
}
