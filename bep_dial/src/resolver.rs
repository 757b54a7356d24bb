//! DNS resolution with a short TTL cache.
//!
//! Lookups go through the blocking system resolver, offloaded to a
//! small worker pool so the event loop never stalls. Fresh results are
//! served straight from the cache without touching the pool.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::{self, Future};
use futures_cpupool::{Builder, CpuPool};

const DEFAULT_TTL_MS: u64 = 30_000;
const DEFAULT_WORKERS: usize = 2;

#[derive(Clone)]
struct CacheEntry {
    resolved_at: Instant,
    addrs: Vec<SocketAddr>,
}

/// Shared handle to the resolver; cheap to clone.
#[derive(Clone)]
pub struct Resolver {
    pool: CpuPool,
    cache: Arc<Mutex<HashMap<(String, u16), CacheEntry>>>,
    ttl: Duration,
}

impl Resolver {
    pub fn new() -> Resolver {
        Resolver::with_ttl(Duration::from_millis(DEFAULT_TTL_MS))
    }

    pub fn with_ttl(ttl: Duration) -> Resolver {
        Resolver {
            pool: Builder::new().pool_size(DEFAULT_WORKERS).create(),
            cache: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Resolve a host and port into socket addresses.
    pub fn resolve(
        &self,
        host: &str,
        port: u16,
    ) -> Box<dyn Future<Item = Vec<SocketAddr>, Error = io::Error> + Send> {
        let key = (host.to_owned(), port);

        if let Some(addrs) = self.cached(&key) {
            return Box::new(future::ok(addrs));
        }

        let cache = self.cache.clone();
        let ttl_key = key.clone();

        Box::new(self.pool.spawn_fn(move || {
            let addrs: Vec<SocketAddr> = (&key.0[..], key.1).to_socket_addrs()?.collect();
            if addrs.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    "Host Resolved To No Addresses",
                ));
            }

            let mut lock_cache = cache
                .lock()
                .expect("bep_dial: Failed To Lock Resolver Cache");
            lock_cache.insert(
                ttl_key,
                CacheEntry {
                    resolved_at: Instant::now(),
                    addrs: addrs.clone(),
                },
            );

            Ok(addrs)
        }))
    }

    fn cached(&self, key: &(String, u16)) -> Option<Vec<SocketAddr>> {
        let mut lock_cache = self
            .cache
            .lock()
            .expect("bep_dial: Failed To Lock Resolver Cache");

        let fresh = lock_cache
            .get(key)
            .map(|entry| entry.resolved_at.elapsed() <= self.ttl)
            .unwrap_or(false);
        if !fresh {
            lock_cache.remove(key);
            return None;
        }

        lock_cache.get(key).map(|entry| entry.addrs.clone())
    }

    /// Number of cached, possibly stale, entries.
    pub fn cached_entries(&self) -> usize {
        self.cache
            .lock()
            .expect("bep_dial: Failed To Lock Resolver Cache")
            .len()
    }
}
