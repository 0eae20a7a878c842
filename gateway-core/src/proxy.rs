//! # Gateway Façade
//!
//! One entry point, [`GrpcProxy::invoke`], runs the whole proxied call:
//!
//! 1. parse the raw `package.Service.method` identifier,
//! 2. resolve the endpoint and link the service's type graph from the catalog,
//! 3. resolve the method contract and classify its streaming shape,
//! 4. parse the JSON payload into request messages (all of them, upfront),
//! 5. open a fresh channel, dispatch, and drain the responses,
//! 6. render the collected responses as one JSON value.
//!
//! Payload validation strictly precedes connection setup: a malformed request
//! never causes a channel to be opened. The per-call channel is dropped on
//! every exit path, success or failure.
//!
//! When a call fails, servers that attach a structured `google.rpc.Status` to
//! the trailers get that status surfaced instead of the raw transport one.
use crate::catalog::{CatalogError, DescriptorCatalog};
use crate::channel::{ChannelFactory, ConnectError};
use crate::dispatch::{dispatch, CallOptions, DispatchError};
use crate::grpc::client::{GrpcClient, GrpcRequestError};
use crate::grpc::codec::{parse_messages, PayloadParseError};
use crate::method::{resolve_method, MalformedIdentifierError, MethodContract, MethodIdentifier, ResolveError};
use crate::results::CallResults;
use prost::Message;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error(transparent)]
    MalformedIdentifier(#[from] MalformedIdentifierError),

    #[error("Invalid headers parameter: {0}")]
    InvalidHeaders(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    PayloadParse(#[from] PayloadParseError),

    #[error("Invalid request payload: {0}")]
    InvalidCall(String),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Grpc(#[from] GrpcRequestError),

    /// The server answered with a non-OK status. `code` and `message` come
    /// from the structured trailer status when the server attached one.
    #[error("Call failed with status '{code}': {message}")]
    CallFailed { code: tonic::Code, message: String },

    #[error("Call did not complete within the requested deadline")]
    DeadlineExceeded,

    #[error("Failed to render the call results as JSON: '{0}'")]
    Render(#[from] serde_json::Error),
}

/// The wire shape of `google.rpc.Status`, as carried in the
/// `grpc-status-details-bin` trailer. Only the fields the gateway surfaces.
#[derive(Clone, PartialEq, prost::Message)]
struct RpcStatus {
    #[prost(int32, tag = "1")]
    code: i32,
    #[prost(string, tag = "2")]
    message: String,
}

/// The schema-less HTTP-to-gRPC proxy.
#[derive(Clone)]
pub struct GrpcProxy {
    catalog: Arc<DescriptorCatalog>,
}

impl GrpcProxy {
    pub fn new(catalog: Arc<DescriptorCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &DescriptorCatalog {
        &self.catalog
    }

    /// Executes one proxied call end to end.
    ///
    /// `raw_method` is a dot-separated `package.Service.method` identifier.
    /// `payload` is a single JSON object for unary and server-streaming calls,
    /// or a JSON array of objects for the client-streaming shapes.
    pub async fn invoke(
        &self,
        raw_method: &str,
        payload: &str,
        options: CallOptions,
    ) -> Result<serde_json::Value, InvokeError> {
        let identifier: MethodIdentifier = raw_method.parse()?;
        let endpoint = self
            .catalog
            .active_or_load()
            .await
            .map_err(CatalogError::from)?;
        let graph = self
            .catalog
            .resolve_type_graph(&identifier.full_service_name())
            .await?;
        let contract = resolve_method(&identifier, &graph)?;

        let texts = request_texts(&contract, payload)?;
        let requests = parse_messages(&contract.input(), &texts)?;

        tracing::debug!(
            method = %contract.fully_qualified_name(),
            shape = ?contract.method_type(),
            requests = requests.len(),
            %endpoint,
            "dispatching proxied call"
        );

        let channel = ChannelFactory::create(&endpoint)?;
        let mut client = GrpcClient::new(channel);
        let mut results = CallResults::new();
        dispatch(&mut client, &contract, requests, options, &mut results)
            .await
            .map_err(translate_dispatch_error)?;

        Ok(results.into_json()?)
    }
}

/// Parses the `headers` query parameter, a flat JSON object, into metadata
/// entries. String values pass through as-is; numbers and booleans are
/// stringified; nested values are rejected.
pub fn metadata_from_json(raw: &str) -> Result<Vec<(String, String)>, InvokeError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| InvokeError::InvalidHeaders(e.to_string()))?;
    let serde_json::Value::Object(entries) = value else {
        return Err(InvokeError::InvalidHeaders(
            "expected a JSON object".to_string(),
        ));
    };
    entries
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(text) => text,
                serde_json::Value::Number(number) => number.to_string(),
                serde_json::Value::Bool(flag) => flag.to_string(),
                _ => {
                    return Err(InvokeError::InvalidHeaders(format!(
                        "header '{key}' must be a JSON primitive"
                    )));
                }
            };
            Ok((key, text))
        })
        .collect()
}

/// Splits the payload into the per-message JSON texts the method shape needs.
fn request_texts(contract: &MethodContract, payload: &str) -> Result<Vec<String>, InvokeError> {
    if !contract.method_type().is_client_streaming() {
        return Ok(vec![payload.to_string()]);
    }
    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| InvokeError::InvalidCall(format!("request body is not valid JSON: {e}")))?;
    let serde_json::Value::Array(items) = value else {
        return Err(InvokeError::InvalidCall(
            "a client-streaming call takes a JSON array of request messages".to_string(),
        ));
    };
    if items.is_empty() {
        return Err(InvokeError::InvalidCall(
            "a client-streaming call requires at least one request message".to_string(),
        ));
    }
    items
        .iter()
        .map(|item| serde_json::to_string(item).map_err(InvokeError::Render))
        .collect()
}

fn translate_dispatch_error(error: DispatchError) -> InvokeError {
    match error {
        DispatchError::NoRequestMessages => {
            InvokeError::InvalidCall("at least one request message is required".to_string())
        }
        DispatchError::DeadlineExceeded => InvokeError::DeadlineExceeded,
        DispatchError::Grpc(e) => InvokeError::Grpc(e),
        DispatchError::Failed(status) => call_failed(status),
        DispatchError::Render(e) => InvokeError::Render(e),
    }
}

fn call_failed(status: tonic::Status) -> InvokeError {
    let details = status.details();
    if !details.is_empty() {
        if let Ok(decoded) = RpcStatus::decode(details) {
            if !decoded.message.is_empty() {
                return InvokeError::CallFailed {
                    code: tonic::Code::from(decoded.code),
                    message: decoded.message,
                };
            }
        }
    }
    InvokeError::CallFailed {
        code: status.code(),
        message: status.message().to_string(),
    }
}
