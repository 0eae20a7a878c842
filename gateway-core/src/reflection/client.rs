//! # Reflection Client
//!
//! A client implementation for `grpc.reflection.v1`, offering the two exchanges
//! the descriptor catalog is built on:
//!
//! * [`ReflectionClient::list_services`]: the "list services" exchange.
//! * [`ReflectionClient::lookup_service`]: the "lookup service" exchange,
//!   which resolves the file declaring a symbol plus every transitive
//!   dependency into a raw (unlinked) [`FileDescriptorSet`].
//!
//! Both are implemented as independent request/response exchanges over the
//! server's bidirectional reflection stream: each opens its own stream, sends
//! one request (plus follow-ups for missing dependencies), collects the
//! matching responses, and completes with the result or the stream error.
//!
//! ## References
//!
//! * [gRPC Server Reflection Protocol](https://github.com/grpc/grpc/blob/master/doc/server-reflection.md)
use super::generated::reflection_v1::{
    ServerReflectionRequest, ServerReflectionResponse,
    server_reflection_client::ServerReflectionClient, server_reflection_request::MessageRequest,
    server_reflection_response::MessageResponse,
};
use crate::BoxError;
use futures_util::stream::once;
use http_body::Body as HttpBody;
use prost::Message;
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::{Streaming, client::GrpcService};

#[derive(Debug, thiserror::Error)]
pub enum ReflectionError {
    #[error(
        "Failed to start a stream request with the reflection server, reflection might not be supported: '{0}'"
    )]
    StreamInitFailed(#[source] tonic::Status),

    #[error("The server stream returned an error status: '{0}'")]
    StreamFailure(#[source] tonic::Status),

    #[error("Reflection stream closed unexpectedly")]
    StreamClosed,

    #[error("Internal error: Failed to send request to stream")]
    SendFailed,

    #[error("Server returned reflection error code {code}: {message}")]
    ServerError { code: i32, message: String },

    #[error("Protocol error: Received unexpected response type: {0}")]
    UnexpectedResponseType(String),

    #[error("Failed to decode FileDescriptorProto: {0}")]
    DecodeError(#[from] prost::DecodeError),
}

// The host field of reflection requests is undocumented and servers ignore it,
// so we never ask callers for one.
const EMPTY_HOST: &str = "";

/// A generic client for the gRPC Server Reflection Protocol.
#[derive(Debug, Clone)]
pub struct ReflectionClient<T = Channel> {
    client: ServerReflectionClient<T>,
}

impl<S> ReflectionClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(channel: S) -> Self {
        let client = ServerReflectionClient::new(channel);
        Self { client }
    }

    /// Lists the full names of every service the server exposes.
    pub async fn list_services(&mut self) -> Result<Vec<String>, ReflectionError> {
        let req = ServerReflectionRequest {
            host: EMPTY_HOST.to_string(),
            message_request: Some(MessageRequest::ListServices(String::new())),
        };

        let mut response_stream = self
            .client
            .server_reflection_info(once(async { req }))
            .await
            .map_err(ReflectionError::StreamInitFailed)?
            .into_inner();

        let response = next_response(&mut response_stream).await?;

        match response.message_response {
            Some(MessageResponse::ListServicesResponse(resp)) => {
                Ok(resp.service.into_iter().map(|s| s.name).collect())
            }
            other => Err(unexpected(other)),
        }
    }

    /// Fetches the raw file descriptor set behind `service_name`.
    ///
    /// The server answers a `file_containing_symbol` request with the file that
    /// declares the symbol; this client then inspects that file's imports and
    /// keeps requesting any dependency it has not seen yet, until the whole
    /// transitive closure has been collected. The returned set is *unlinked*:
    /// linking into a queryable type graph is the caller's concern.
    pub async fn lookup_service(
        &mut self,
        service_name: &str,
    ) -> Result<FileDescriptorSet, ReflectionError> {
        let (tx, rx) = mpsc::channel(100);

        let mut response_stream = self
            .client
            .server_reflection_info(ReceiverStream::new(rx))
            .await
            .map_err(ReflectionError::StreamInitFailed)?
            .into_inner();

        tx.send(ServerReflectionRequest {
            host: EMPTY_HOST.to_string(),
            message_request: Some(MessageRequest::FileContainingSymbol(
                service_name.to_string(),
            )),
        })
        .await
        .map_err(|_| ReflectionError::SendFailed)?;

        let mut collector = FileSetCollector::new(tx);
        collector.run(&mut response_stream).await?;

        Ok(collector.into_file_descriptor_set())
    }
}

/// Accumulates file descriptor protos from a lookup exchange, chasing imports
/// that the server has not sent yet.
struct FileSetCollector {
    requests: mpsc::Sender<ServerReflectionRequest>,
    collected: HashMap<String, FileDescriptorProto>,
    requested: HashSet<String>,
    inflight: usize,
}

impl FileSetCollector {
    fn new(requests: mpsc::Sender<ServerReflectionRequest>) -> Self {
        Self {
            requests,
            collected: HashMap::new(),
            requested: HashSet::new(),
            // The initial file_containing_symbol request is already in flight.
            inflight: 1,
        }
    }

    async fn run(
        &mut self,
        response_stream: &mut Streaming<ServerReflectionResponse>,
    ) -> Result<(), ReflectionError> {
        while self.inflight > 0 {
            let response = next_response(response_stream).await?;
            self.inflight -= 1;

            match response.message_response {
                Some(MessageResponse::FileDescriptorResponse(resp)) => {
                    self.accept_batch(resp.file_descriptor_proto).await?;
                }
                other => return Err(unexpected(other)),
            }
        }
        Ok(())
    }

    async fn accept_batch(&mut self, raw_protos: Vec<Vec<u8>>) -> Result<(), ReflectionError> {
        for raw in raw_protos {
            let fd = FileDescriptorProto::decode(raw.as_ref())?;

            let Some(name) = fd.name.clone() else {
                continue;
            };
            if self.collected.contains_key(&name) {
                continue;
            }

            self.request_missing_imports(&fd).await?;
            self.collected.insert(name, fd);
        }
        Ok(())
    }

    async fn request_missing_imports(
        &mut self,
        fd: &FileDescriptorProto,
    ) -> Result<(), ReflectionError> {
        for dep in &fd.dependency {
            if self.collected.contains_key(dep) || !self.requested.insert(dep.clone()) {
                continue;
            }
            self.requests
                .send(ServerReflectionRequest {
                    host: EMPTY_HOST.to_string(),
                    message_request: Some(MessageRequest::FileByFilename(dep.clone())),
                })
                .await
                .map_err(|_| ReflectionError::SendFailed)?;
            self.inflight += 1;
        }
        Ok(())
    }

    fn into_file_descriptor_set(self) -> FileDescriptorSet {
        FileDescriptorSet {
            file: self.collected.into_values().collect(),
        }
    }
}

async fn next_response(
    stream: &mut Streaming<ServerReflectionResponse>,
) -> Result<ServerReflectionResponse, ReflectionError> {
    stream
        .message()
        .await
        .map_err(ReflectionError::StreamFailure)?
        .ok_or(ReflectionError::StreamClosed)
}

fn unexpected(response: Option<MessageResponse>) -> ReflectionError {
    match response {
        Some(MessageResponse::ErrorResponse(e)) => ReflectionError::ServerError {
            code: e.error_code,
            message: e.error_message,
        },
        Some(other) => ReflectionError::UnexpectedResponseType(format!("{other:?}")),
        None => ReflectionError::UnexpectedResponseType("Empty Message".into()),
    }
}
