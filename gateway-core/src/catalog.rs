//! # Descriptor Catalog
//!
//! Discovers which services a backend exposes and caches the raw file
//! descriptor set behind each of them, keyed by fully qualified service name.
//!
//! The catalog has two stable states, empty and loaded, with [`DescriptorCatalog::reload`]
//! as the only transition. A reload runs the "list services" exchange followed
//! by one "lookup service" exchange per discovered service, then swaps the
//! whole cache in one step: a failed reload leaves the previous cache and the
//! previous active endpoint untouched. Reloads are serialized by a mutex;
//! lookups and listings read the cache without taking it, so they observe
//! either the pre-reload or the fully-loaded post-reload state, never anything
//! in between.
//!
//! The discovery channel is the only connection the gateway ever reuses, and
//! only while the endpoint stays the same. Every reflection exchange is bounded
//! by a fixed deadline.
use crate::channel::{ChannelFactory, ConnectError};
use crate::endpoint::Endpoint;
use crate::graph::{LinkError, TypeGraph};
use crate::reflection::client::{ReflectionClient, ReflectionError};
use crate::store::{CacheStorage, MapStorage, Storage};
use parking_lot::RwLock;
use prost_reflect::{FileDescriptor, MethodDescriptor, ServiceDescriptor};
use prost_types::FileDescriptorSet;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

const DISCOVERY_DEADLINE: Duration = Duration::from_secs(10);

/// Linked type graphs kept around between calls. Bounded because a backend can
/// expose arbitrarily many services; raw protos stay in unbounded storage.
const GRAPH_CACHE_CAPACITY: u64 = 64;

/// The reflection meta-service itself is not part of the backend's API surface.
const REFLECTION_META_SERVICE_PREFIX: &str = "grpc.reflection.";

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Failed to open a channel to the backend: '{0}'")]
    Connect(#[from] ConnectError),

    #[error("Reflection exchange failed: '{0}'")]
    Reflection(#[from] ReflectionError),

    #[error("Reflection exchange did not complete within {DISCOVERY_DEADLINE:?}")]
    DeadlineExceeded,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("Service '{0}' is not exposed by the active endpoint")]
    ServiceNotFound(String),

    #[error(transparent)]
    Link(#[from] LinkError),
}

struct DiscoveryState {
    channel: Option<tonic::transport::Channel>,
    endpoint: Option<Endpoint>,
}

/// The process-wide catalog of reflected service schemas.
pub struct DescriptorCatalog {
    default_endpoint: Endpoint,
    storage: MapStorage<String, FileDescriptorSet>,
    /// Linked graphs derived from `storage`. Keys carry the reload generation,
    /// so an insert racing a reload can never be served once that reload
    /// completes; stale entries age out of the bounded cache.
    graphs: CacheStorage<(u64, String), TypeGraph>,
    /// Bumped after every cache swap in [`DescriptorCatalog::reload`].
    generation: AtomicU64,
    /// Single-writer (reload), multi-reader view of the active endpoint.
    active: RwLock<Option<Endpoint>>,
    /// Serializes reloads and owns the reusable discovery channel.
    discovery: Mutex<DiscoveryState>,
}

impl DescriptorCatalog {
    /// Creates an empty catalog that will lazily load from `default_endpoint`.
    pub fn new(default_endpoint: Endpoint) -> Self {
        Self {
            default_endpoint,
            storage: MapStorage::new(),
            graphs: CacheStorage::new(GRAPH_CACHE_CAPACITY),
            generation: AtomicU64::new(0),
            active: RwLock::new(None),
            discovery: Mutex::new(DiscoveryState {
                channel: None,
                endpoint: None,
            }),
        }
    }

    /// The endpoint requests are currently routed to, once one has loaded.
    pub fn active_endpoint(&self) -> Option<Endpoint> {
        self.active.read().clone()
    }

    /// Rebuilds the whole catalog from `endpoint` and makes it the active one.
    ///
    /// All-or-nothing: the cache swap happens only after every discovered
    /// service has been looked up successfully.
    pub async fn reload(&self, endpoint: Endpoint) -> Result<(), DiscoveryError> {
        let mut discovery = self.discovery.lock().await;

        let channel = match (&discovery.channel, &discovery.endpoint) {
            (Some(channel), Some(current)) if *current == endpoint => channel.clone(),
            _ => ChannelFactory::create(&endpoint)?,
        };

        let mut reflection = ReflectionClient::new(channel.clone());
        let service_names = bounded(reflection.list_services()).await?;
        tracing::debug!(%endpoint, services = service_names.len(), "discovered services");

        let mut loaded = HashMap::with_capacity(service_names.len());
        for name in service_names {
            // The meta-service is how we are talking to the backend, not part
            // of its API surface; looking it up would be a wasted exchange.
            if name.starts_with(REFLECTION_META_SERVICE_PREFIX) {
                continue;
            }
            let file_set = bounded(reflection.lookup_service(&name)).await?;
            loaded.insert(name, file_set);
        }

        self.storage.replace_all(loaded);
        self.generation.fetch_add(1, Ordering::Release);
        self.graphs.remove_all();
        discovery.channel = Some(channel);
        discovery.endpoint = Some(endpoint.clone());
        *self.active.write() = Some(endpoint.clone());
        tracing::info!(%endpoint, "descriptor catalog reloaded");
        Ok(())
    }

    /// Reloads against the configured default endpoint, making it the active
    /// one again regardless of any endpoint registered since startup.
    pub async fn reload_default(&self) -> Result<(), DiscoveryError> {
        self.reload(self.default_endpoint.clone()).await
    }

    /// Returns the active endpoint, loading the catalog first if no endpoint
    /// has been activated yet.
    pub async fn active_or_load(&self) -> Result<Endpoint, DiscoveryError> {
        if let Some(endpoint) = self.active_endpoint() {
            return Ok(endpoint);
        }
        let target = self.default_endpoint.clone();
        self.reload(target.clone()).await?;
        Ok(target)
    }

    /// Links and returns the full type graph for `service_full_name`.
    ///
    /// Triggers at most one lazy reload (against the default endpoint) when the
    /// cache is empty. Linked graphs are memoized under the current reload
    /// generation; an evicted or stale entry is simply relinked from the raw
    /// protos. The generation is read before the raw cache, so a graph linked
    /// concurrently with a reload can only land under a key no later reader
    /// will ask for.
    pub async fn resolve_type_graph(&self, service_full_name: &str) -> Result<TypeGraph, CatalogError> {
        if self.storage.is_empty() {
            self.reload_default().await?;
        }
        let generation = self.generation.load(Ordering::Acquire);
        let key = (generation, service_full_name.to_string());
        if let Some(graph) = self.graphs.get(&key) {
            return Ok(graph);
        }
        let raw = self
            .storage
            .get(&key.1)
            .ok_or_else(|| CatalogError::ServiceNotFound(key.1.clone()))?;
        let graph = TypeGraph::link(&raw)?;
        self.graphs.put(key, graph.clone());
        Ok(graph)
    }

    /// The fully qualified names of every cached service, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let mut names = self.storage.keys();
        names.sort();
        names
    }

    /// A point-in-time copy of the raw cache.
    pub fn snapshot(&self) -> HashMap<String, FileDescriptorSet> {
        self.storage.snapshot()
    }

    /// Every linked file descriptor currently cached.
    ///
    /// A cached set that fails to link is skipped with a warning rather than
    /// failing the whole listing; `resolve_type_graph` stays fail-fast.
    pub fn file_descriptors(&self) -> Vec<FileDescriptor> {
        let mut files = Vec::new();
        for (service, file_set) in self.storage.snapshot() {
            match TypeGraph::link(&file_set) {
                Ok(graph) => files.extend(graph.files()),
                Err(error) => {
                    tracing::warn!(%service, %error, "skipped descriptors that failed to link");
                }
            }
        }
        files
    }

    /// Every cached service descriptor, excluding the reflection meta-service,
    /// sorted by fully qualified name.
    pub fn service_descriptors(&self) -> Vec<ServiceDescriptor> {
        let mut services: Vec<ServiceDescriptor> = self
            .file_descriptors()
            .into_iter()
            .flat_map(|file| file.services().collect::<Vec<_>>())
            .filter(|service| !service.full_name().starts_with(REFLECTION_META_SERVICE_PREFIX))
            .collect();
        services.sort_by(|a, b| a.full_name().cmp(b.full_name()));
        // The same service shows up once per cached set that includes its file.
        services.dedup_by(|a, b| a.full_name() == b.full_name());
        services
    }

    /// Every method of every cached service, in service order.
    pub fn method_descriptors(&self) -> Vec<MethodDescriptor> {
        self.service_descriptors()
            .into_iter()
            .flat_map(|service| service.methods().collect::<Vec<_>>())
            .collect()
    }
}

async fn bounded<T>(
    exchange: impl Future<Output = Result<T, ReflectionError>>,
) -> Result<T, DiscoveryError> {
    match tokio::time::timeout(DISCOVERY_DEADLINE, exchange).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(DiscoveryError::DeadlineExceeded),
    }
}
