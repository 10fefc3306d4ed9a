//! Shared tunnel handles and the weak-reference registry.
//!
//! The registry observes tunnels without extending their lifetime: it
//! holds `Weak` references to a small shared handle, while the tunnel
//! itself (and both its sockets) stays uniquely owned by the driving
//! task. Evicting a tunnel fires its close signal; the driver reacts
//! by dropping the tunnel, which closes both endpoints and unblocks
//! any relay I/O still in flight.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::info;
use tokio::sync::Notify;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Observable part of a tunnel, shared between the driving task and
/// the registry.
pub struct TunnelHandle {
    id: u64,
    peer: String,
    /// Creation time, milliseconds since the epoch
    mtime: i64,
    /// Last-I/O time, milliseconds since the epoch
    ktime: AtomicI64,
    evicted: AtomicBool,
    close: Notify,
}

impl TunnelHandle {
    pub fn new(id: u64, peer: String) -> Arc<Self> {
        let now = now_millis();
        Arc::new(Self {
            id,
            peer,
            mtime: now,
            ktime: AtomicI64::new(now),
            evicted: AtomicBool::new(false),
            close: Notify::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Address of the accepted (ep0) peer.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn mtime_millis(&self) -> i64 {
        self.mtime
    }

    /// Record I/O activity now.
    pub fn touch(&self) {
        self.ktime.store(now_millis(), Ordering::Relaxed);
    }

    /// Time since the last read or write on either endpoint.
    pub fn idle(&self) -> Duration {
        let idle = now_millis() - self.ktime.load(Ordering::Relaxed);
        Duration::from_millis(idle.max(0) as u64)
    }

    /// Ask the driving task to tear the tunnel down.
    pub fn evict(&self) {
        self.evicted.store(true, Ordering::Release);
        self.close.notify_one();
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::Acquire)
    }

    /// Resolves once the tunnel has been evicted.
    pub async fn closed(&self) {
        if self.is_evicted() {
            return;
        }
        self.close.notified().await;
    }
}

impl std::fmt::Debug for TunnelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelHandle")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}

/// Set of weak references to the live tunnels.
#[derive(Default)]
pub struct TunnelRegistry {
    tunnels: Mutex<Vec<Weak<TunnelHandle>>>,
}

impl TunnelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: &Arc<TunnelHandle>) {
        self.tunnels
            .lock()
            .expect("tunnel registry poisoned")
            .push(Arc::downgrade(handle));
    }

    /// Number of still-live entries.
    pub fn len(&self) -> usize {
        self.tunnels
            .lock()
            .expect("tunnel registry poisoned")
            .iter()
            .filter(|w| w.upgrade().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One GC pass: drop expired weak references and evict tunnels
    /// idle longer than `max_idle`. Returns the eviction count.
    pub fn sweep(&self, max_idle: Duration) -> usize {
        let mut evicted = 0;
        self.tunnels
            .lock()
            .expect("tunnel registry poisoned")
            .retain(|weak| match weak.upgrade() {
                Some(handle) => {
                    if handle.idle() > max_idle {
                        info!(
                            "tunnel {} ({}) idle for {:?}, evicting",
                            handle.id(),
                            handle.peer(),
                            handle.idle()
                        );
                        handle.evict();
                        evicted += 1;
                        false
                    } else {
                        true
                    }
                }
                None => false,
            });
        evicted
    }
}
