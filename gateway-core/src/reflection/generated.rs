//! Checked-in bindings for `grpc.reflection.v1`, produced by `prost-build` /
//! `tonic-prost-build` from the upstream `reflection.proto`.
pub mod reflection_v1;
