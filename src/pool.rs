//! Bounded connection pool for the analysis service.
//!
//! Two layers of tokio semaphores bound concurrent use: one global (`maxTotal`) and one per
//! route (`maxPerRoute`, keyed by `scheme://host:port`). A [`Lease`] holds one permit of each
//! and releases both when dropped, on every exit path, cancellation included.
//!
//! The sockets themselves live in a `reqwest::Client` keep-alive pool. Idle sockets are closed
//! after `idleTimeout` and at most `maxPerRoute` idle sockets are kept per host. Sockets are
//! retired after `timeToLive` by rotating the client *generation*: the first acquire after the
//! current generation has aged past its TTL builds a fresh client on the blocking pool while
//! concurrent acquires keep using the current one. Leases taken earlier keep the old generation
//! alive until they drop, after which its sockets close.

use crate::config::{ConfigError, TransportConfig};
use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// No lease became available within the configured acquire timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no pooled connection available after {}ms", .waited.as_millis())]
pub struct AcquireTimeout {
    pub waited: Duration,
}

/// One instance of the underlying HTTP client.
#[derive(Debug)]
pub struct Generation {
    id: u64,
    client: reqwest::Client,
    born: Instant,
}

impl Generation {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn age(&self) -> Duration {
        self.born.elapsed()
    }
}

/// Borrowed pool slot. Dropping it returns capacity to the pool.
#[derive(Debug)]
pub struct Lease {
    generation: Arc<Generation>,
    _route: OwnedSemaphorePermit,
    _total: OwnedSemaphorePermit,
}

impl Lease {
    pub fn client(&self) -> &reqwest::Client {
        &self.generation.client
    }

    pub fn generation(&self) -> u64 {
        self.generation.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub max_total: usize,
    pub max_per_route: usize,
    /// Leases currently held, across every route.
    pub in_use: usize,
    pub available: usize,
    /// Id of the current client generation; increments on each TTL rotation.
    pub generation: u64,
    /// Leases currently held per route.
    pub routes: BTreeMap<String, usize>,
}

#[derive(Debug)]
pub struct ConnectionPool {
    config: TransportConfig,
    total: Arc<Semaphore>,
    routes: Mutex<HashMap<String, Arc<Semaphore>>>,
    current: ArcSwap<Generation>,
    rotating: AtomicBool,
    next_generation: AtomicU64,
}

impl ConnectionPool {
    pub fn new(config: &TransportConfig) -> Result<Self, ConfigError> {
        let client = build_client(config).map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self {
            config: config.clone(),
            total: Arc::new(Semaphore::new(config.pool().max_total)),
            routes: Mutex::new(HashMap::new()),
            current: ArcSwap::from_pointee(Generation { id: 1, client, born: Instant::now() }),
            rotating: AtomicBool::new(false),
            next_generation: AtomicU64::new(2),
        })
    }

    /// Wait up to `acquireTimeout` for a slot on `route`.
    pub async fn acquire(&self, route: &str) -> Result<Lease, AcquireTimeout> {
        let started = Instant::now();
        let limit = self.config.pool().acquire_timeout;
        let total = self.total.clone();
        let per_route = self.route_semaphore(route);

        let permits = tokio::time::timeout(limit, async move {
            let total = total.acquire_owned().await?;
            let route = per_route.acquire_owned().await?;
            Ok::<_, tokio::sync::AcquireError>((total, route))
        })
        .await;

        match permits {
            Ok(Ok((total, route_permit))) => Ok(Lease {
                generation: self.generation().await,
                _route: route_permit,
                _total: total,
            }),
            // semaphores are never closed; treat it like running out of time
            Ok(Err(_)) | Err(_) => {
                let waited = started.elapsed();
                tracing::warn!(route, waited_ms = waited.as_millis() as u64, "connection pool exhausted");
                Err(AcquireTimeout { waited })
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let max_total = self.config.pool().max_total;
        let max_per_route = self.config.pool().max_per_route;
        let available = self.total.available_permits();
        let routes = self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(route, sem)| (route.clone(), max_per_route - sem.available_permits()))
            .collect();
        PoolStats {
            max_total,
            max_per_route,
            in_use: max_total - available,
            available,
            generation: self.current.load().id,
            routes,
        }
    }

    /// Current client generation, rotated first if it has outlived `timeToLive`.
    async fn generation(&self) -> Arc<Generation> {
        let ttl = self.config.pool().time_to_live;
        let current = self.current.load_full();
        if current.born.elapsed() < ttl {
            return current;
        }
        if self.rotating.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return current;
        }
        let _rotating = RotationFlag(&self.rotating);
        let current = self.current.load_full();
        if current.born.elapsed() < ttl {
            return current;
        }

        let config = self.config.clone();
        match tokio::task::spawn_blocking(move || build_client(&config)).await {
            Ok(Ok(client)) => {
                let id = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let fresh = Arc::new(Generation { id, client, born: Instant::now() });
                self.current.store(fresh.clone());
                tracing::debug!(
                    retired = current.id,
                    generation = id,
                    age_secs = current.born.elapsed().as_secs(),
                    "rotated HTTP client generation"
                );
                fresh
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, generation = current.id, "keeping stale HTTP client generation");
                current
            }
            Err(err) => {
                tracing::warn!(error = %err, generation = current.id, "client rebuild task failed");
                current
            }
        }
    }

    fn route_semaphore(&self, route: &str) -> Arc<Semaphore> {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        routes
            .entry(route.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.pool().max_per_route)))
            .clone()
    }
}

/// Clears the rotation flag on every exit, cancellation included.
struct RotationFlag<'a>(&'a AtomicBool);

impl Drop for RotationFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn build_client(config: &TransportConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout())
        .pool_max_idle_per_host(config.pool().max_per_route)
        .pool_idle_timeout(config.pool().idle_timeout)
        .user_agent(config.user_agent())
        .build()
}
