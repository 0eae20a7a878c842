//! # Method Resolver
//!
//! Turns the textual method identifiers arriving at the gateway
//! (`pkg.Service.Method` or `Service.Method`) into a concrete, fully-linked
//! [`MethodContract`] backed by the catalog's type graph.
use crate::graph::TypeGraph;
use prost_reflect::{MessageDescriptor, MethodDescriptor};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum MalformedIdentifierError {
    #[error("Raw method name can't be empty")]
    Empty,
    #[error("No package name and service name found in '{0}'")]
    MissingServiceName(String),
    #[error("Method name can't be empty in '{0}'")]
    EmptyMethodName(String),
    #[error("Service name can't be empty in '{0}'")]
    EmptyServiceName(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Unable to find service '{0}'")]
    ServiceNotFound(String),
    #[error("Unable to find method '{method}' in service '{service}'")]
    MethodNotFound { service: String, method: String },
}

/// The parsed form of a dotted method name.
///
/// `service_name` and `method_name` are always non-empty; `package_name` may be
/// empty, in which case the fully-qualified service name is `service_name`
/// alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodIdentifier {
    pub package_name: String,
    pub service_name: String,
    pub method_name: String,
}

impl MethodIdentifier {
    /// `pkg.Service` (or `Service` for the empty package).
    pub fn full_service_name(&self) -> String {
        if self.package_name.is_empty() {
            self.service_name.clone()
        } else {
            format!("{}.{}", self.package_name, self.service_name)
        }
    }

    /// The original dotted method path, `pkg.Service.Method`.
    pub fn fully_qualified_name(&self) -> String {
        format!("{}.{}", self.full_service_name(), self.method_name)
    }
}

impl FromStr for MethodIdentifier {
    type Err = MalformedIdentifierError;

    /// Splits on the last `.` to separate the method name, then on the next
    /// last `.` to separate the service name from an optional package prefix.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.trim().is_empty() {
            return Err(MalformedIdentifierError::Empty);
        }
        let (full_service_name, method_name) = raw
            .rsplit_once('.')
            .ok_or_else(|| MalformedIdentifierError::MissingServiceName(raw.to_string()))?;
        if method_name.is_empty() {
            return Err(MalformedIdentifierError::EmptyMethodName(raw.to_string()));
        }

        let (package_name, service_name) = match full_service_name.rsplit_once('.') {
            Some((package, service)) => (package, service),
            None => ("", full_service_name),
        };
        if service_name.is_empty() {
            return Err(MalformedIdentifierError::EmptyServiceName(raw.to_string()));
        }

        Ok(Self {
            package_name: package_name.to_string(),
            service_name: service_name.to_string(),
            method_name: method_name.to_string(),
        })
    }
}

impl fmt::Display for MethodIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fully_qualified_name())
    }
}

/// The four streaming shapes a gRPC method can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodType {
    Unary,
    ServerStreaming,
    ClientStreaming,
    BidiStreaming,
}

impl MethodType {
    /// Reads the shape straight off the method's declared streaming flags.
    pub fn classify(method: &MethodDescriptor) -> Self {
        match (method.is_client_streaming(), method.is_server_streaming()) {
            (false, false) => MethodType::Unary,
            (false, true) => MethodType::ServerStreaming,
            (true, false) => MethodType::ClientStreaming,
            (true, true) => MethodType::BidiStreaming,
        }
    }

    /// Shapes whose request side is a stream of messages.
    pub fn is_client_streaming(&self) -> bool {
        matches!(self, MethodType::ClientStreaming | MethodType::BidiStreaming)
    }

    /// Shapes whose response side is a stream of messages.
    pub fn is_server_streaming(&self) -> bool {
        matches!(self, MethodType::ServerStreaming | MethodType::BidiStreaming)
    }
}

/// A resolved method: its descriptor plus its streaming shape.
///
/// Contracts are derived from one [`TypeGraph`] generation and must be
/// re-resolved after a catalog reload; they are never persisted.
#[derive(Debug, Clone)]
pub struct MethodContract {
    descriptor: MethodDescriptor,
    method_type: MethodType,
}

impl MethodContract {
    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    pub fn method_type(&self) -> MethodType {
        self.method_type
    }

    pub fn input(&self) -> MessageDescriptor {
        self.descriptor.input()
    }

    pub fn output(&self) -> MessageDescriptor {
        self.descriptor.output()
    }

    /// `pkg.Service.Method`.
    pub fn fully_qualified_name(&self) -> String {
        format!(
            "{}.{}",
            self.descriptor.parent_service().full_name(),
            self.descriptor.name()
        )
    }
}

/// Locates `identifier` within `graph`.
///
/// The lookup walks the files of the graph for one whose declared package
/// matches the identifier's package and which declares the service by name,
/// then looks the method up on that service.
pub fn resolve_method(
    identifier: &MethodIdentifier,
    graph: &TypeGraph,
) -> Result<MethodContract, ResolveError> {
    let service = graph
        .files()
        .filter(|file| file.package_name() == identifier.package_name)
        .flat_map(|file| file.services().collect::<Vec<_>>())
        .find(|service| service.name() == identifier.service_name)
        .ok_or_else(|| ResolveError::ServiceNotFound(identifier.full_service_name()))?;

    let descriptor = service
        .methods()
        .find(|method| method.name() == identifier.method_name)
        .ok_or_else(|| ResolveError::MethodNotFound {
            service: identifier.full_service_name(),
            method: identifier.method_name.clone(),
        })?;

    let method_type = MethodType::classify(&descriptor);
    Ok(MethodContract {
        descriptor,
        method_type,
    })
}
