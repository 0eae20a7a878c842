//! # Gateway Core
//!
//! `gateway-core` is the engine behind the gRPC JSON gateway. It turns a textual
//! method name plus a JSON payload into a real gRPC call against a backend the
//! gateway has never seen a `.proto` file for: the wire contract is discovered at
//! runtime through the server's reflection protocol and messages are marshalled
//! with `prost-reflect` dynamic messages instead of generated stubs.
//!
//! ## Key Components
//!
//! * **[`proxy::GrpcProxy`]:** The façade. Its [`proxy::GrpcProxy::invoke`] operation
//!   drives one complete request: resolve, encode, dispatch, aggregate.
//! * **[`catalog::DescriptorCatalog`]:** Discovers the backend's services via
//!   reflection and caches their raw file descriptor sets, keyed by service name.
//! * **[`method`]:** Parses dotted method identifiers and resolves them against a
//!   linked [`graph::TypeGraph`] into a [`method::MethodContract`].
//! * **[`dispatch`]:** Executes any of the four streaming shapes uniformly and
//!   collects responses into [`results::CallResults`].
//!
//! ## Internal clients
//!
//! * **[`grpc::client::GrpcClient`]:** A generic dynamic gRPC client moving
//!   [`prost_reflect::DynamicMessage`] values through a custom codec.
//! * **[`reflection::client::ReflectionClient`]:** A `grpc.reflection.v1` client
//!   offering the two exchanges the catalog needs: list services and look up the
//!   full transitive file set for a symbol.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that
//! consumers use compatible versions of these underlying dependencies.
pub mod catalog;
pub mod channel;
pub mod dispatch;
pub mod endpoint;
pub mod graph;
pub mod grpc;
pub mod method;
pub mod proxy;
pub mod reflection;
pub mod results;
pub mod store;

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
