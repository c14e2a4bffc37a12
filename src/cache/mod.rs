//! Key-value store adapter backed by Redis.
//!
//! Sessions, the token blacklist, and OTP state all live here with per-key
//! TTLs. The adapter is deliberately forgiving: an unconfigured or failing
//! backend answers absent/false/empty instead of propagating errors, so a
//! cache outage degrades the service rather than taking it down. Callers that
//! cannot tolerate that (OTP verification) treat "absent" as their own
//! failure class.

use redis::{aio::ConnectionManager, AsyncCommands};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{error, warn};

#[derive(Clone)]
enum Backend {
    Redis(ConnectionManager),
    Memory(Arc<Mutex<MemoryStore>>),
    Disabled,
}

/// Handle to the key-value store. Cheap to clone; all clones share the
/// underlying connection manager.
#[derive(Clone)]
pub struct Cache {
    backend: Backend,
}

#[derive(Default)]
struct MemoryStore {
    entries: HashMap<String, (String, Option<Instant>)>,
    sets: HashMap<String, HashSet<String>>,
}

impl MemoryStore {
    fn get(&mut self, key: &str) -> Option<String> {
        match self.entries.get(key) {
            Some((_, Some(deadline))) if *deadline <= Instant::now() => {
                self.entries.remove(key);
                None
            }
            Some((value, _)) => Some(value.clone()),
            None => None,
        }
    }
}

impl Cache {
    /// Connect to Redis. A missing URL or failed connection yields a disabled
    /// cache: every operation becomes a logged no-op.
    pub async fn connect(url: Option<&str>) -> Self {
        let Some(url) = url else {
            warn!("no redis url configured, cache disabled");
            return Self::disabled();
        };

        let client = match redis::Client::open(url) {
            Ok(client) => client,
            Err(err) => {
                error!("invalid redis url: {err}");
                return Self::disabled();
            }
        };

        match ConnectionManager::new(client).await {
            Ok(manager) => Self {
                backend: Backend::Redis(manager),
            },
            Err(err) => {
                error!("failed to connect to redis: {err}");
                Self::disabled()
            }
        }
    }

    /// In-process store for local development and tests. Keys expire on read.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(Mutex::new(MemoryStore::default()))),
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            backend: Backend::Disabled,
        }
    }

    /// Backend label for health reporting.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match &self.backend {
            Backend::Redis(_) => "redis",
            Backend::Memory(_) => "memory",
            Backend::Disabled => "disabled",
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                match conn.get::<_, Option<String>>(key).await {
                    Ok(value) => value,
                    Err(err) => {
                        error!(key, "redis GET failed: {err}");
                        None
                    }
                }
            }
            Backend::Memory(store) => lock(store).get(key),
            Backend::Disabled => None,
        }
    }

    /// Store a value with a TTL in seconds. Non-positive TTLs are rejected so
    /// a miscomputed remaining lifetime cannot persist a key forever.
    pub async fn set_ex(&self, key: &str, value: &str, ttl_seconds: i64) -> bool {
        let Ok(ttl) = u64::try_from(ttl_seconds) else {
            warn!(key, ttl_seconds, "refusing to store key with negative ttl");
            return false;
        };
        if ttl == 0 {
            warn!(key, "refusing to store key with zero ttl");
            return false;
        }

        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                match conn.set_ex::<_, _, ()>(key, value, ttl).await {
                    Ok(()) => true,
                    Err(err) => {
                        error!(key, "redis SETEX failed: {err}");
                        false
                    }
                }
            }
            Backend::Memory(store) => {
                let deadline = Instant::now() + Duration::from_secs(ttl);
                lock(store)
                    .entries
                    .insert(key.to_string(), (value.to_string(), Some(deadline)));
                true
            }
            Backend::Disabled => false,
        }
    }

    pub async fn del(&self, key: &str) -> bool {
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                match conn.del::<_, i64>(key).await {
                    Ok(_) => true,
                    Err(err) => {
                        error!(key, "redis DEL failed: {err}");
                        false
                    }
                }
            }
            Backend::Memory(store) => {
                let mut store = lock(store);
                let had_entry = store.entries.remove(key).is_some();
                let had_set = store.sets.remove(key).is_some();
                had_entry || had_set
            }
            Backend::Disabled => false,
        }
    }

    pub async fn sadd(&self, key: &str, member: &str) -> bool {
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                match conn.sadd::<_, _, i64>(key, member).await {
                    Ok(_) => true,
                    Err(err) => {
                        error!(key, "redis SADD failed: {err}");
                        false
                    }
                }
            }
            Backend::Memory(store) => {
                lock(store)
                    .sets
                    .entry(key.to_string())
                    .or_default()
                    .insert(member.to_string());
                true
            }
            Backend::Disabled => false,
        }
    }

    pub async fn srem(&self, key: &str, member: &str) -> bool {
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                match conn.srem::<_, _, i64>(key, member).await {
                    Ok(_) => true,
                    Err(err) => {
                        error!(key, "redis SREM failed: {err}");
                        false
                    }
                }
            }
            Backend::Memory(store) => {
                let mut store = lock(store);
                match store.sets.get_mut(key) {
                    Some(members) => members.remove(member),
                    None => false,
                }
            }
            Backend::Disabled => false,
        }
    }

    pub async fn smembers(&self, key: &str) -> Vec<String> {
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                match conn.smembers::<_, Vec<String>>(key).await {
                    Ok(members) => members,
                    Err(err) => {
                        error!(key, "redis SMEMBERS failed: {err}");
                        Vec::new()
                    }
                }
            }
            Backend::Memory(store) => lock(store)
                .sets
                .get(key)
                .map(|members| members.iter().cloned().collect())
                .unwrap_or_default(),
            Backend::Disabled => Vec::new(),
        }
    }
}

fn lock(store: &Mutex<MemoryStore>) -> std::sync::MutexGuard<'_, MemoryStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}
