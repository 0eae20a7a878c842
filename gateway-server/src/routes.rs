//! HTTP surface of the gateway.
//!
//! Every response is wrapped in the same envelope: `code` (200 on success,
//! the mapped HTTP status on failure), `message`, and `data`. The call route
//! is schema-less: the path segment names the
//! method, the body carries the JSON payload, and an optional `headers` query
//! parameter (a JSON object) becomes outgoing gRPC metadata.
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use gateway_core::catalog::CatalogError;
use gateway_core::dispatch::CallOptions;
use gateway_core::endpoint::Endpoint;
use gateway_core::method::MethodType;
use gateway_core::proxy::{GrpcProxy, InvokeError, metadata_from_json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    proxy: GrpcProxy,
}

pub fn router(proxy: GrpcProxy) -> Router {
    Router::new()
        .route("/services", get(list_services))
        .route("/methods", get(list_methods))
        .route("/reset", get(reset))
        .route("/register", put(register))
        .route("/{raw_method}", post(invoke))
        .with_state(AppState { proxy })
}

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub code: i32,
    pub message: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct InvokeParams {
    /// JSON object of metadata entries to attach to the outgoing call.
    headers: Option<String>,
    /// Overall call deadline in milliseconds.
    deadline_ms: Option<u64>,
}

async fn invoke(
    State(state): State<AppState>,
    Path(raw_method): Path<String>,
    Query(params): Query<InvokeParams>,
    body: String,
) -> Response {
    let metadata = match params.headers.as_deref() {
        Some(raw) => match metadata_from_json(raw) {
            Ok(entries) => entries,
            Err(error) => return error_response(error),
        },
        None => Vec::new(),
    };
    let options = CallOptions {
        deadline: params.deadline_ms.map(Duration::from_millis),
        metadata,
    };
    match state.proxy.invoke(&raw_method, &body, options).await {
        Ok(data) => ok_response(data),
        Err(error) => error_response(error),
    }
}

/// Drops whatever endpoint was registered and rebuilds the catalog from the
/// configured default backend.
async fn reset(State(state): State<AppState>) -> Response {
    match state.proxy.catalog().reload_default().await {
        Ok(()) => ok_response(json!(state.proxy.catalog().service_names())),
        Err(error) => error_response(InvokeError::Catalog(error.into())),
    }
}

/// Points the gateway at a different backend and rebuilds the catalog from it.
async fn register(State(state): State<AppState>, Json(endpoint): Json<Endpoint>) -> Response {
    match state.proxy.catalog().reload(endpoint).await {
        Ok(()) => ok_response(json!(state.proxy.catalog().service_names())),
        Err(error) => error_response(InvokeError::Catalog(error.into())),
    }
}

async fn list_services(State(state): State<AppState>) -> Response {
    if let Err(error) = state.proxy.catalog().active_or_load().await {
        return error_response(InvokeError::Catalog(error.into()));
    }
    let services: Vec<serde_json::Value> = state
        .proxy
        .catalog()
        .service_descriptors()
        .into_iter()
        .map(|service| {
            json!({
                "service": service.full_name(),
                "methods": service.methods().map(|m| m.name().to_string()).collect::<Vec<_>>(),
            })
        })
        .collect();
    ok_response(serde_json::Value::Array(services))
}

async fn list_methods(State(state): State<AppState>) -> Response {
    if let Err(error) = state.proxy.catalog().active_or_load().await {
        return error_response(InvokeError::Catalog(error.into()));
    }
    let methods: Vec<serde_json::Value> = state
        .proxy
        .catalog()
        .method_descriptors()
        .into_iter()
        .map(|method| {
            json!({
                "method": format!("{}.{}", method.parent_service().full_name(), method.name()),
                "type": shape_name(MethodType::classify(&method)),
            })
        })
        .collect();
    ok_response(serde_json::Value::Array(methods))
}

fn shape_name(method_type: MethodType) -> &'static str {
    match method_type {
        MethodType::Unary => "UNARY",
        MethodType::ServerStreaming => "SERVER_STREAMING",
        MethodType::ClientStreaming => "CLIENT_STREAMING",
        MethodType::BidiStreaming => "BIDI_STREAMING",
    }
}

fn ok_response(data: serde_json::Value) -> Response {
    (
        StatusCode::OK,
        Json(ApiResponse {
            code: i32::from(StatusCode::OK.as_u16()),
            message: "OK".to_string(),
            data,
        }),
    )
        .into_response()
}

fn error_response(error: InvokeError) -> Response {
    let status = http_status(&error);
    tracing::warn!(%error, http_status = %status, "request failed");
    (
        status,
        Json(ApiResponse {
            code: i32::from(status.as_u16()),
            message: error.to_string(),
            data: serde_json::Value::Null,
        }),
    )
        .into_response()
}

fn http_status(error: &InvokeError) -> StatusCode {
    match error {
        InvokeError::MalformedIdentifier(_)
        | InvokeError::InvalidHeaders(_)
        | InvokeError::PayloadParse(_)
        | InvokeError::InvalidCall(_) => StatusCode::BAD_REQUEST,
        InvokeError::Resolve(_) | InvokeError::Catalog(CatalogError::ServiceNotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        InvokeError::Catalog(_) | InvokeError::Connect(_) | InvokeError::Grpc(_) => {
            StatusCode::BAD_GATEWAY
        }
        InvokeError::CallFailed { code, .. } => grpc_to_http(*code),
        InvokeError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        InvokeError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn grpc_to_http(code: tonic::Code) -> StatusCode {
    use tonic::Code;
    match code {
        Code::Ok => StatusCode::OK,
        Code::InvalidArgument | Code::OutOfRange | Code::FailedPrecondition => {
            StatusCode::BAD_REQUEST
        }
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists | Code::Aborted => StatusCode::CONFLICT,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        // 499 is the de facto "client closed request" status.
        Code::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::Unknown | Code::Internal | Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
