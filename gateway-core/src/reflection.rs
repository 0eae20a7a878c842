//! # Server Reflection
//!
//! This module contains the logic necessary to interact with the gRPC Server
//! Reflection Protocol.
//!
//! It is how the gateway learns a backend's schema at runtime: the catalog asks
//! a reflecting server which services it exposes and fetches the complete file
//! descriptor set behind each of them, so no `.proto` files are needed at
//! deploy time.
pub mod client;
mod generated;
