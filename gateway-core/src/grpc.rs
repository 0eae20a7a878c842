//! Dynamic gRPC transport: a generic client plus the codec that moves
//! [`prost_reflect::DynamicMessage`] values over the wire without generated
//! stubs.
pub mod client;
pub mod codec;
