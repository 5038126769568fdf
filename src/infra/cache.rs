//! Persistent last-known-good offer cache with TTL and size cap.
//!
//! Offers from every successful search are recorded here and served back
//! when every exchange is down. Reads run concurrently; writes are serialized
//! by the lock and persist the whole snapshot to disk before releasing it.

use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::{dedupe_offers, Offer};

const CACHE_DIR: &str = "freight-offer-scanner";
const CACHE_FILENAME: &str = "offer_cache.json";

/// Cache TTL: 24 hours. Older offers are most likely booked already.
pub const OFFER_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on cached offers; the oldest are evicted first.
pub const DEFAULT_MAX_CACHED_OFFERS: usize = 500;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// One cached offer and when it was last fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedOffer {
    /// Unix timestamp (seconds) of the search that last returned this offer.
    pub recorded_at: u64,
    pub offer: Offer,
}

impl CachedOffer {
    fn is_expired(&self, ttl: Duration, now: u64) -> bool {
        Duration::from_secs(now.saturating_sub(self.recorded_at)) > ttl
    }
}

/// Cached offers as stored on disk. Each offer expires on its own;
/// `cached_at` only tracks the last write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfferCacheSnapshot {
    /// Unix timestamp (seconds) of the last write.
    pub cached_at: u64,
    pub offers: Vec<CachedOffer>,
}

impl OfferCacheSnapshot {
    pub fn age(&self) -> Duration {
        Duration::from_secs(unix_now().saturating_sub(self.cached_at))
    }

    /// Offers still within `ttl`, oldest first.
    pub fn live_offers(&self, ttl: Duration) -> Vec<Offer> {
        let now = unix_now();
        self.offers
            .iter()
            .filter(|cached| !cached.is_expired(ttl, now))
            .map(|cached| cached.offer.clone())
            .collect()
    }

    /// Human-readable age string.
    pub fn age_string(&self) -> String {
        let secs = self.age().as_secs();
        if secs < 60 {
            format!("{secs}s")
        } else if secs < 3600 {
            format!("{}m", secs / 60)
        } else if secs < 86400 {
            format!("{}h", secs / 3600)
        } else {
            format!("{}d", secs / 86400)
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub struct OfferCache {
    path: Option<PathBuf>,
    ttl: Duration,
    max_offers: usize,
    snapshot: RwLock<OfferCacheSnapshot>,
}

impl OfferCache {
    /// A cache that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            ttl: OFFER_CACHE_TTL,
            max_offers: DEFAULT_MAX_CACHED_OFFERS,
            snapshot: RwLock::new(OfferCacheSnapshot::default()),
        }
    }

    /// Opens the cache file at `path`, starting empty if it is missing or
    /// unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = load_snapshot(&path).unwrap_or_default();
        Self {
            path: Some(path),
            ttl: OFFER_CACHE_TTL,
            max_offers: DEFAULT_MAX_CACHED_OFFERS,
            snapshot: RwLock::new(snapshot),
        }
    }

    /// Default cache location in the local app data directory.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CACHE_DIR)
            .join(CACHE_FILENAME)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_offers(mut self, max_offers: usize) -> Self {
        self.max_offers = max_offers;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn snapshot(&self) -> OfferCacheSnapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.snapshot.read().await.offers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Offers to serve when every source failed. Offers older than the TTL
    /// are left out.
    pub async fn fallback_offers(&self) -> Vec<Offer> {
        let snapshot = self.snapshot.read().await;
        if snapshot.offers.is_empty() {
            debug!("offer cache is empty");
            return Vec::new();
        }
        let offers = snapshot.live_offers(self.ttl);
        if offers.is_empty() {
            info!(age = %snapshot.age_string(), "offer cache expired, not serving it");
            return Vec::new();
        }
        info!(
            offers = offers.len(),
            expired = snapshot.offers.len() - offers.len(),
            age = %snapshot.age_string(),
            "serving offers from cache"
        );
        offers
    }

    /// Records freshly fetched offers. A newer copy of a cached id replaces
    /// the older one and moves to the back; offers without an id are ignored.
    /// Carried-over offers keep their original timestamp and expired ones are
    /// dropped. Returns the number of cached offers afterwards.
    pub async fn record(&self, offers: &[Offer]) -> Result<usize, CacheError> {
        let fresh = dedupe_offers(offers.iter().cloned());
        let now = unix_now();
        let mut snapshot = self.snapshot.write().await;

        let fresh_ids: HashSet<&str> = fresh
            .offers
            .iter()
            .filter_map(|o| o.id.as_deref())
            .collect();
        let mut merged: Vec<CachedOffer> = snapshot
            .offers
            .iter()
            .filter(|cached| !cached.is_expired(self.ttl, now))
            .filter(|cached| {
                cached
                    .offer
                    .id
                    .as_deref()
                    .map(|id| !fresh_ids.contains(id))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        merged.extend(fresh.offers.iter().map(|offer| CachedOffer {
            recorded_at: now,
            offer: offer.clone(),
        }));

        if merged.len() > self.max_offers {
            let excess = merged.len() - self.max_offers;
            merged.drain(..excess);
        }

        let next = OfferCacheSnapshot {
            cached_at: now,
            offers: merged,
        };
        if let Some(path) = &self.path {
            save_snapshot(path, &next).await?;
        }
        let count = next.offers.len();
        *snapshot = next;
        Ok(count)
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        let mut snapshot = self.snapshot.write().await;
        let empty = OfferCacheSnapshot::default();
        if let Some(path) = &self.path {
            save_snapshot(path, &empty).await?;
        }
        *snapshot = empty;
        Ok(())
    }
}

/// Load a snapshot from disk, if it exists and parses.
fn load_snapshot(path: &Path) -> Option<OfferCacheSnapshot> {
    if !path.exists() {
        debug!(path = %path.display(), "no offer cache found");
        return None;
    }

    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<OfferCacheSnapshot>(&content) {
            Ok(snapshot) => {
                debug!(
                    offers = snapshot.offers.len(),
                    age = %snapshot.age_string(),
                    "loaded offer cache"
                );
                Some(snapshot)
            }
            Err(e) => {
                warn!(path = %path.display(), "failed to parse offer cache: {e}");
                None
            }
        },
        Err(e) => {
            warn!(path = %path.display(), "failed to read offer cache: {e}");
            None
        }
    }
}

async fn save_snapshot(path: &Path, snapshot: &OfferCacheSnapshot) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    // Compact, not pretty: snapshots can hold hundreds of full offers.
    let content = serde_json::to_string(snapshot)?;
    tokio::fs::write(path, content).await?;
    debug!(
        offers = snapshot.offers.len(),
        path = %path.display(),
        "saved offer cache"
    );
    Ok(())
}
