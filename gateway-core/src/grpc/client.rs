//! # Generic gRPC Client
//!
//! This module wraps a standard `tonic` client to provide a generic interface
//! for gRPC communication. It is agnostic to the specific Protobuf messages
//! being exchanged: callers hand it already-validated [`DynamicMessage`]s and a
//! [`MethodDescriptor`], and the [`super::codec::DynamicCodec`] handles the
//! wire format.
//!
//! ## Features
//!
//! * **Dynamic Pathing**: Constructs the HTTP/2 path (e.g., `/package.Service/Method`)
//!   at runtime from the method descriptor.
//! * **Metadata Handling**: Converts string tuples into Tonic's `MetadataMap`
//!   for per-request headers.
//! * **Access Patterns**: One method per streaming shape: Unary, Server
//!   Streaming, Client Streaming, and Bidirectional Streaming.
use super::codec::DynamicCodec;
use crate::BoxError;
use futures_util::Stream;
use http_body::Body as HttpBody;
use prost_reflect::{DynamicMessage, MethodDescriptor};
use std::str::FromStr;
use tonic::{
    client::GrpcService,
    metadata::{
        MetadataKey, MetadataValue,
        errors::{InvalidMetadataKey, InvalidMetadataValue},
    },
    transport::Channel,
};

#[derive(thiserror::Error, Debug)]
pub enum GrpcRequestError {
    #[error("Internal error, the client was not ready: '{0}'")]
    ClientNotReady(#[source] BoxError),
    #[error("Invalid metadata (header) key '{key}': '{source}'")]
    InvalidMetadataKey {
        key: String,
        source: InvalidMetadataKey,
    },
    #[error("Invalid metadata (header) value for key '{key}': '{source}'")]
    InvalidMetadataValue {
        key: String,
        source: InvalidMetadataValue,
    },
}

/// A dynamic gRPC client generic over its transport.
#[derive(Debug, Clone)]
pub struct GrpcClient<S = Channel> {
    client: tonic::client::Grpc<S>,
}

impl<S> GrpcClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        let client = tonic::client::Grpc::new(service);
        Self { client }
    }

    /// Performs a Unary gRPC call (Single Request -> Single Response).
    ///
    /// # Returns
    /// * `Ok(Ok(message))` - Successful RPC execution.
    /// * `Ok(Err(Status))` - RPC executed, but server returned an error.
    /// * `Err(GrpcRequestError)` - Failed to send request or connect.
    pub async fn unary(
        &mut self,
        method: MethodDescriptor,
        message: DynamicMessage,
        headers: Vec<(String, String)>,
    ) -> Result<Result<DynamicMessage, tonic::Status>, GrpcRequestError> {
        let (request, path, codec) = self.prepare(&method, message, headers).await?;
        match self.client.unary(request, path, codec).await {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }

    /// Performs a Server Streaming gRPC call (Single Request -> Stream of Responses).
    pub async fn server_streaming(
        &mut self,
        method: MethodDescriptor,
        message: DynamicMessage,
        headers: Vec<(String, String)>,
    ) -> Result<
        Result<impl Stream<Item = Result<DynamicMessage, tonic::Status>>, tonic::Status>,
        GrpcRequestError,
    > {
        let (request, path, codec) = self.prepare(&method, message, headers).await?;
        match self.client.server_streaming(request, path, codec).await {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }

    /// Performs a Client Streaming gRPC call (Stream of Requests -> Single Response).
    pub async fn client_streaming(
        &mut self,
        method: MethodDescriptor,
        messages: impl Stream<Item = DynamicMessage> + Send + 'static,
        headers: Vec<(String, String)>,
    ) -> Result<Result<DynamicMessage, tonic::Status>, GrpcRequestError> {
        let (request, path, codec) = self.prepare(&method, messages, headers).await?;
        match self.client.client_streaming(request, path, codec).await {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }

    /// Performs a Bidirectional Streaming gRPC call (Stream of Requests -> Stream of Responses).
    pub async fn bidirectional_streaming(
        &mut self,
        method: MethodDescriptor,
        messages: impl Stream<Item = DynamicMessage> + Send + 'static,
        headers: Vec<(String, String)>,
    ) -> Result<
        Result<impl Stream<Item = Result<DynamicMessage, tonic::Status>>, tonic::Status>,
        GrpcRequestError,
    > {
        let (request, path, codec) = self.prepare(&method, messages, headers).await?;
        match self.client.streaming(request, path, codec).await {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }

    /// The shared front half of every call shape: waits for the transport to
    /// accept a request, attaches the caller's metadata, and derives the
    /// HTTP/2 path and codec from the method descriptor.
    async fn prepare<T>(
        &mut self,
        method: &MethodDescriptor,
        payload: T,
        headers: Vec<(String, String)>,
    ) -> Result<(tonic::Request<T>, http::uri::PathAndQuery, DynamicCodec), GrpcRequestError> {
        self.client
            .ready()
            .await
            .map_err(|e| GrpcRequestError::ClientNotReady(e.into()))?;

        let mut request = tonic::Request::new(payload);
        for (key, value) in headers {
            let parsed_key = MetadataKey::from_str(&key).map_err(|source| {
                GrpcRequestError::InvalidMetadataKey {
                    key: key.clone(),
                    source,
                }
            })?;
            let parsed_value = MetadataValue::from_str(&value)
                .map_err(|source| GrpcRequestError::InvalidMetadataValue { key, source })?;
            request.metadata_mut().insert(parsed_key, parsed_value);
        }

        let path = format!("/{}/{}", method.parent_service().full_name(), method.name());
        let path = http::uri::PathAndQuery::from_str(&path).expect("valid gRPC path");
        Ok((request, path, DynamicCodec::for_client(method)))
    }
}
