//! # Call Dispatcher
//!
//! Routes an already-validated batch of request messages through the client
//! entry point matching the method's streaming shape, and appends every
//! response to the caller's [`CallResults`] as it arrives.
//!
//! Unary and server-streaming calls send the first (and only) message of the
//! batch; client-streaming and bidirectional calls send the whole batch as a
//! request stream. An empty batch is rejected for every shape. Awaiting the
//! dispatch future is the completion handle: when it resolves, the response
//! stream has been fully drained or the call has failed.
use crate::grpc::client::{GrpcClient, GrpcRequestError};
use crate::grpc::codec::render_message;
use crate::method::{MethodContract, MethodType};
use crate::results::CallResults;
use crate::BoxError;
use futures_util::StreamExt;
use http_body::Body as HttpBody;
use prost_reflect::DynamicMessage;
use std::pin::pin;
use std::time::Duration;
use tonic::client::GrpcService;

/// Per-call knobs carried from the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overall deadline for the call, including stream drain.
    pub deadline: Option<Duration>,
    /// Metadata entries attached to the outgoing request.
    pub metadata: Vec<(String, String)>,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("At least one request message is required")]
    NoRequestMessages,

    #[error("Call did not complete within the requested deadline")]
    DeadlineExceeded,

    #[error(transparent)]
    Grpc(#[from] GrpcRequestError),

    /// The server answered with a non-OK status.
    #[error("Call failed with status '{}': {}", .0.code(), .0.message())]
    Failed(tonic::Status),

    #[error("Failed to render a response message as JSON: '{0}'")]
    Render(#[from] serde_json::Error),
}

/// Executes one call end to end and collects its responses into `results`.
pub async fn dispatch<S>(
    client: &mut GrpcClient<S>,
    contract: &MethodContract,
    requests: Vec<DynamicMessage>,
    options: CallOptions,
    results: &mut CallResults,
) -> Result<(), DispatchError>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    if requests.is_empty() {
        return Err(DispatchError::NoRequestMessages);
    }

    let call = run_call(client, contract, requests, options.metadata, results);
    match options.deadline {
        Some(deadline) => match tokio::time::timeout(deadline, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(DispatchError::DeadlineExceeded),
        },
        None => call.await,
    }
}

async fn run_call<S>(
    client: &mut GrpcClient<S>,
    contract: &MethodContract,
    requests: Vec<DynamicMessage>,
    metadata: Vec<(String, String)>,
    results: &mut CallResults,
) -> Result<(), DispatchError>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    let descriptor = contract.descriptor().clone();
    match contract.method_type() {
        MethodType::Unary => {
            let Some(message) = requests.into_iter().next() else {
                return Err(DispatchError::NoRequestMessages);
            };
            let response = client
                .unary(descriptor, message, metadata)
                .await?
                .map_err(DispatchError::Failed)?;
            results.push(render_message(&response)?);
        }
        MethodType::ServerStreaming => {
            let Some(message) = requests.into_iter().next() else {
                return Err(DispatchError::NoRequestMessages);
            };
            let stream = client
                .server_streaming(descriptor, message, metadata)
                .await?
                .map_err(DispatchError::Failed)?;
            let mut stream = pin!(stream);
            while let Some(item) = stream.next().await {
                let response = item.map_err(DispatchError::Failed)?;
                results.push(render_message(&response)?);
            }
        }
        MethodType::ClientStreaming => {
            let response = client
                .client_streaming(descriptor, tokio_stream::iter(requests), metadata)
                .await?
                .map_err(DispatchError::Failed)?;
            results.push(render_message(&response)?);
        }
        MethodType::BidiStreaming => {
            let stream = client
                .bidirectional_streaming(descriptor, tokio_stream::iter(requests), metadata)
                .await?
                .map_err(DispatchError::Failed)?;
            let mut stream = pin!(stream);
            while let Some(item) = stream.next().await {
                let response = item.map_err(DispatchError::Failed)?;
                results.push(render_message(&response)?);
            }
        }
    }
    Ok(())
}
