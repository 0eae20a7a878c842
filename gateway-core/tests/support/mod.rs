//! Shared test backend: a `demo.Greeter` service whose schema is built
//! programmatically (no protoc involved) and whose handlers work on
//! [`DynamicMessage`] values directly, one handler per streaming shape.
#![allow(dead_code)]

use futures_util::{Stream, StreamExt};
use gateway_core::endpoint::Endpoint;
use gateway_core::grpc::codec::DynamicCodec;
use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage, Value};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    MethodDescriptorProto, ServiceDescriptorProto,
    field_descriptor_proto::{Label, Type},
};
use std::pin::Pin;
use std::task::{Context, Poll};
use tonic::{Code, Status};

pub const GREETER: &str = "demo.Greeter";

type BoxFuture<T, E> =
    Pin<Box<dyn std::future::Future<Output = Result<T, E>> + Send + 'static>>;
type ReplyStream = Pin<Box<dyn Stream<Item = Result<DynamicMessage, Status>> + Send>>;

fn string_field(name: &str, number: i32) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        json_name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(Type::String as i32),
        ..Default::default()
    }
}

fn method(
    name: &str,
    client_streaming: bool,
    server_streaming: bool,
) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(".demo.HelloRequest".to_string()),
        output_type: Some(".demo.Reply".to_string()),
        client_streaming: Some(client_streaming),
        server_streaming: Some(server_streaming),
        ..Default::default()
    }
}

/// Two files so the lookup exchange has a real import edge to chase:
/// `demo/greeter.proto` declares the service and imports `demo/common.proto`,
/// which declares the reply message.
pub fn descriptor_set() -> FileDescriptorSet {
    let common = FileDescriptorProto {
        name: Some("demo/common.proto".to_string()),
        package: Some("demo".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![DescriptorProto {
            name: Some("Reply".to_string()),
            field: vec![string_field("message", 1)],
            ..Default::default()
        }],
        ..Default::default()
    };

    let greeter = FileDescriptorProto {
        name: Some("demo/greeter.proto".to_string()),
        package: Some("demo".to_string()),
        syntax: Some("proto3".to_string()),
        dependency: vec!["demo/common.proto".to_string()],
        message_type: vec![DescriptorProto {
            name: Some("HelloRequest".to_string()),
            field: vec![
                string_field("name", 1),
                FieldDescriptorProto {
                    name: Some("count".to_string()),
                    json_name: Some("count".to_string()),
                    number: Some(2),
                    label: Some(Label::Optional as i32),
                    r#type: Some(Type::Int32 as i32),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }],
        service: vec![ServiceDescriptorProto {
            name: Some("Greeter".to_string()),
            method: vec![
                method("SayHello", false, false),
                method("HelloStream", false, true),
                method("JoinNames", true, false),
                method("Chat", true, true),
                method("EchoHeader", false, false),
                method("Fail", false, false),
            ],
            ..Default::default()
        }],
        ..Default::default()
    };

    FileDescriptorSet {
        file: vec![greeter, common],
    }
}

pub fn pool() -> DescriptorPool {
    DescriptorPool::from_file_descriptor_set(descriptor_set()).unwrap()
}

fn reply(pool: &DescriptorPool, text: impl Into<String>) -> DynamicMessage {
    let descriptor = pool.get_message_by_name("demo.Reply").unwrap();
    let mut message = DynamicMessage::new(descriptor);
    message.set_field_by_name("message", Value::String(text.into()));
    message
}

fn name_of(message: &DynamicMessage) -> String {
    message
        .get_field_by_name("name")
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_default()
}

fn count_of(message: &DynamicMessage) -> i32 {
    message
        .get_field_by_name("count")
        .and_then(|v| v.as_i32())
        .unwrap_or(0)
}

/// The structured status the `Fail` method attaches to its trailers.
#[derive(Clone, PartialEq, prost::Message)]
struct ErrorDetail {
    #[prost(int32, tag = "1")]
    code: i32,
    #[prost(string, tag = "2")]
    message: String,
}

/// A `demo.Greeter` implementation routed by hand, one arm per method.
#[derive(Clone)]
pub struct GreeterServer {
    pool: DescriptorPool,
}

impl GreeterServer {
    pub fn new() -> Self {
        Self { pool: pool() }
    }

    fn codec(&self, method: &str) -> DynamicCodec {
        let descriptor = self
            .pool
            .get_service_by_name(GREETER)
            .unwrap()
            .methods()
            .find(|m| m.name() == method)
            .unwrap();
        // Server side: responses out, requests in.
        DynamicCodec::new(descriptor.output(), descriptor.input())
    }
}

struct SayHelloSvc(DescriptorPool);

impl tonic::server::UnaryService<DynamicMessage> for SayHelloSvc {
    type Response = DynamicMessage;
    type Future = BoxFuture<tonic::Response<Self::Response>, Status>;

    fn call(&mut self, request: tonic::Request<DynamicMessage>) -> Self::Future {
        let pool = self.0.clone();
        Box::pin(async move {
            let name = name_of(request.get_ref());
            Ok(tonic::Response::new(reply(&pool, format!("Hello {name}"))))
        })
    }
}

struct HelloStreamSvc(DescriptorPool);

impl tonic::server::ServerStreamingService<DynamicMessage> for HelloStreamSvc {
    type Response = DynamicMessage;
    type ResponseStream = ReplyStream;
    type Future = BoxFuture<tonic::Response<Self::ResponseStream>, Status>;

    fn call(&mut self, request: tonic::Request<DynamicMessage>) -> Self::Future {
        let pool = self.0.clone();
        Box::pin(async move {
            let message = request.into_inner();
            let name = name_of(&message);
            let replies: Vec<Result<DynamicMessage, Status>> = (1..=count_of(&message))
                .map(|i| Ok(reply(&pool, format!("Hello {name} #{i}"))))
                .collect();
            Ok(tonic::Response::new(
                Box::pin(tokio_stream::iter(replies)) as ReplyStream
            ))
        })
    }
}

struct JoinNamesSvc(DescriptorPool);

impl tonic::server::ClientStreamingService<DynamicMessage> for JoinNamesSvc {
    type Response = DynamicMessage;
    type Future = BoxFuture<tonic::Response<Self::Response>, Status>;

    fn call(&mut self, request: tonic::Request<tonic::Streaming<DynamicMessage>>) -> Self::Future {
        let pool = self.0.clone();
        Box::pin(async move {
            let mut stream = request.into_inner();
            let mut names = Vec::new();
            while let Some(message) = stream.message().await? {
                names.push(name_of(&message));
            }
            Ok(tonic::Response::new(reply(
                &pool,
                format!("Hello {}", names.join(", ")),
            )))
        })
    }
}

struct ChatSvc(DescriptorPool);

impl tonic::server::StreamingService<DynamicMessage> for ChatSvc {
    type Response = DynamicMessage;
    type ResponseStream = ReplyStream;
    type Future = BoxFuture<tonic::Response<Self::ResponseStream>, Status>;

    fn call(&mut self, request: tonic::Request<tonic::Streaming<DynamicMessage>>) -> Self::Future {
        let pool = self.0.clone();
        Box::pin(async move {
            let replies = request
                .into_inner()
                .map(move |item| item.map(|message| reply(&pool, format!("Hello {}", name_of(&message)))));
            Ok(tonic::Response::new(Box::pin(replies) as ReplyStream))
        })
    }
}

struct EchoHeaderSvc(DescriptorPool);

impl tonic::server::UnaryService<DynamicMessage> for EchoHeaderSvc {
    type Response = DynamicMessage;
    type Future = BoxFuture<tonic::Response<Self::Response>, Status>;

    fn call(&mut self, request: tonic::Request<DynamicMessage>) -> Self::Future {
        let pool = self.0.clone();
        Box::pin(async move {
            let echoed = request
                .metadata()
                .get("x-echo")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("missing")
                .to_string();
            Ok(tonic::Response::new(reply(&pool, echoed)))
        })
    }
}

struct FailSvc;

impl tonic::server::UnaryService<DynamicMessage> for FailSvc {
    type Response = DynamicMessage;
    type Future = BoxFuture<tonic::Response<Self::Response>, Status>;

    fn call(&mut self, _request: tonic::Request<DynamicMessage>) -> Self::Future {
        Box::pin(async move {
            let detail = ErrorDetail {
                code: Code::InvalidArgument as i32,
                message: "name must not be empty".to_string(),
            };
            Err(Status::with_details(
                Code::Unknown,
                "outer failure",
                detail.encode_to_vec().into(),
            ))
        })
    }
}

impl tonic::codegen::Service<http::Request<tonic::body::Body>> for GreeterServer {
    type Response = http::Response<tonic::body::Body>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<tonic::body::Body>) -> Self::Future {
        let pool = self.pool.clone();
        match req.uri().path() {
            "/demo.Greeter/SayHello" => {
                let codec = self.codec("SayHello");
                Box::pin(async move {
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Ok(grpc.unary(SayHelloSvc(pool), req).await)
                })
            }
            "/demo.Greeter/HelloStream" => {
                let codec = self.codec("HelloStream");
                Box::pin(async move {
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Ok(grpc.server_streaming(HelloStreamSvc(pool), req).await)
                })
            }
            "/demo.Greeter/JoinNames" => {
                let codec = self.codec("JoinNames");
                Box::pin(async move {
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Ok(grpc.client_streaming(JoinNamesSvc(pool), req).await)
                })
            }
            "/demo.Greeter/Chat" => {
                let codec = self.codec("Chat");
                Box::pin(async move {
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Ok(grpc.streaming(ChatSvc(pool), req).await)
                })
            }
            "/demo.Greeter/EchoHeader" => {
                let codec = self.codec("EchoHeader");
                Box::pin(async move {
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Ok(grpc.unary(EchoHeaderSvc(pool), req).await)
                })
            }
            "/demo.Greeter/Fail" => {
                let codec = self.codec("Fail");
                Box::pin(async move {
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Ok(grpc.unary(FailSvc, req).await)
                })
            }
            _ => Box::pin(async move {
                Ok(http::Response::builder()
                    .status(http::StatusCode::OK)
                    .header("grpc-status", Code::Unimplemented as i32)
                    .header(http::header::CONTENT_TYPE, "application/grpc")
                    .body(tonic::body::Body::empty())
                    .unwrap())
            }),
        }
    }
}

impl tonic::server::NamedService for GreeterServer {
    const NAME: &'static str = "demo.Greeter";
}

/// The reflection side of the backend, serving `descriptor_set()`.
pub fn reflection_service()
-> tonic_reflection::server::v1::ServerReflectionServer<impl tonic_reflection::server::v1::ServerReflection>
{
    tonic_reflection::server::Builder::configure()
        .register_file_descriptor_set(descriptor_set())
        .build_v1()
        .expect("Failed to setup Reflection Service")
}

/// Boots a real backend (reflection + greeter) on an ephemeral port and
/// returns the endpoint it listens on.
pub async fn spawn_backend() -> Endpoint {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(reflection_service())
            .add_service(GreeterServer::new())
            .serve_with_incoming(incoming)
            .await
            .expect("backend server crashed");
    });

    Endpoint::new("127.0.0.1", port)
}

pub const TRACKER: &str = "audit.Tracker";

/// A second, unrelated schema: `audit.Tracker` with one unary method.
pub fn tracker_descriptor_set() -> FileDescriptorSet {
    let file = FileDescriptorProto {
        name: Some("audit/tracker.proto".to_string()),
        package: Some("audit".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![DescriptorProto {
            name: Some("Event".to_string()),
            field: vec![string_field("label", 1)],
            ..Default::default()
        }],
        service: vec![ServiceDescriptorProto {
            name: Some("Tracker".to_string()),
            method: vec![MethodDescriptorProto {
                name: Some("Record".to_string()),
                input_type: Some(".audit.Event".to_string()),
                output_type: Some(".audit.Event".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    };
    FileDescriptorSet { file: vec![file] }
}

/// Boots a backend exposing only `audit.Tracker` over reflection. There is no
/// handler behind the service, which is enough for catalog-level tests.
pub async fn spawn_tracker_backend() -> Endpoint {
    let reflection = tonic_reflection::server::Builder::configure()
        .register_file_descriptor_set(tracker_descriptor_set())
        .build_v1()
        .expect("Failed to setup Reflection Service");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(reflection)
            .serve_with_incoming(incoming)
            .await
            .expect("backend server crashed");
    });

    Endpoint::new("127.0.0.1", port)
}
