//! The listening server: accept loop, per-mode flows, tunnel GC and
//! traffic statistics.

mod flow;
mod gc;
mod signals;
mod stats;

pub use signals::shutdown_signal;
pub use stats::{format_rate, TrafficCounters};

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{error, info};
use tokio::net::{TcpListener, TcpSocket};

use crate::config::{Mode, Reloadable, Settings};
use crate::crypto::rsa::RsaKeypair;
use crate::error::{ConfigError, Error, Result};
use crate::resolver::{Resolve, SystemResolver};
use crate::tunnel::TunnelRegistry;

/// Process-wide proxy state shared by every tunnel.
pub struct Server {
    settings: Settings,
    config_path: Option<PathBuf>,
    reloadable: RwLock<Reloadable>,
    /// Generated at startup in decryption mode only
    rsa_keypair: Option<RsaKeypair>,
    registry: TunnelRegistry,
    counters: TrafficCounters,
    resolver: Box<dyn Resolve>,
    next_tunnel_id: AtomicU64,
}

impl Server {
    /// Build a server from validated settings. In decryption mode this
    /// generates the RSA keypair; a generation failure is fatal.
    pub fn new(settings: Settings, config_path: Option<PathBuf>) -> Result<Arc<Self>> {
        Self::with_resolver(settings, config_path, Box::new(SystemResolver::new()))
    }

    /// Same as [`Server::new`] with a custom resolver, used by tests.
    pub fn with_resolver(
        settings: Settings,
        config_path: Option<PathBuf>,
        resolver: Box<dyn Resolve>,
    ) -> Result<Arc<Self>> {
        let rsa_keypair = match settings.proxy.mode {
            Mode::Decryption => {
                let keypair = RsaKeypair::generate()?;
                info!("generated the RSA-1024 keypair for this decryption node");
                Some(keypair)
            }
            _ => None,
        };

        let reloadable = RwLock::new(settings.reloadable());
        Ok(Arc::new(Self {
            settings,
            config_path,
            reloadable,
            rsa_keypair,
            registry: TunnelRegistry::new(),
            counters: TrafficCounters::new(),
            resolver,
            next_tunnel_id: AtomicU64::new(1),
        }))
    }

    pub fn mode(&self) -> Mode {
        self.settings.proxy.mode
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &TunnelRegistry {
        &self.registry
    }

    pub fn counters(&self) -> &TrafficCounters {
        &self.counters
    }

    pub fn resolver(&self) -> &dyn Resolve {
        self.resolver.as_ref()
    }

    /// The node keypair; present only in decryption mode.
    pub fn rsa_keypair(&self) -> Option<&RsaKeypair> {
        self.rsa_keypair.as_ref()
    }

    pub fn allocate_tunnel_id(&self) -> u64 {
        self.next_tunnel_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Peer (encryption mode) or relay target (transmission mode).
    pub fn remote_addr(&self) -> Result<(String, u16)> {
        let host = self
            .settings
            .proxy
            .remote_host
            .clone()
            .ok_or(ConfigError::MissingField {
                field: "proxy.remote_host",
            })?;
        let port = self
            .settings
            .proxy
            .remote_port
            .ok_or(ConfigError::MissingField {
                field: "proxy.remote_port",
            })?;
        Ok((host, port))
    }

    /// Currently configured credentials (reload-aware).
    pub fn credentials(&self) -> (String, String) {
        let guard = self.reloadable.read().expect("reloadable lock poisoned");
        (guard.username.clone(), guard.password.clone())
    }

    /// Currently configured statistics/GC cadence (reload-aware).
    pub fn statistic_interval(&self) -> Duration {
        self.reloadable
            .read()
            .expect("reloadable lock poisoned")
            .statistic_interval
    }

    /// Currently configured idle threshold (reload-aware).
    pub fn max_idle_time(&self) -> Duration {
        self.reloadable
            .read()
            .expect("reloadable lock poisoned")
            .max_idle_time
    }

    /// Re-read the runtime-adjustable settings from the config file.
    /// On any failure the previous values stay in effect.
    pub fn reload(&self) -> Result<()> {
        let path = self
            .config_path
            .as_ref()
            .ok_or(ConfigError::MissingField {
                field: "config path",
            })?;
        let fresh = Settings::reload(path, self.mode())?;
        let mut guard = self.reloadable.write().expect("reloadable lock poisoned");
        *guard = fresh;
        info!(
            "configuration reloaded: statistic_interval={:?}, max_idle_time={:?}",
            guard.statistic_interval, guard.max_idle_time
        );
        Ok(())
    }

    /// Render the effective configuration for the startup banner and
    /// the SIGUSR dumps.
    pub fn dump_config(&self) -> String {
        let guard = self.reloadable.read().expect("reloadable lock poisoned");
        format!(
            "{}effective.statistic_interval = {:?}\neffective.max_idle_time = {:?}",
            self.settings, guard.statistic_interval, guard.max_idle_time
        )
    }

    /// Bind the listener with the configured backlog.
    pub async fn bind(&self) -> Result<TcpListener> {
        let ip: IpAddr = self.settings.proxy.local_host.parse().map_err(|_| {
            Error::from(ConfigError::InvalidValue {
                field: "proxy.local_host",
                value: self.settings.proxy.local_host.clone(),
            })
        })?;
        let addr = SocketAddr::new(ip, self.settings.proxy.local_port);

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(self.settings.proxy.listen_backlog)?;

        info!(
            "{} node listening on {} (backlog {})",
            self.mode(),
            addr,
            self.settings.proxy.listen_backlog
        );
        Ok(listener)
    }

    /// Run the accept loop forever, with the GC, statistics and signal
    /// loops alongside. Accept errors are logged and skipped.
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) -> Result<()> {
        tokio::spawn(gc::run_gc_loop(Arc::clone(self)));
        tokio::spawn(stats::run_statistics_loop(Arc::clone(self)));
        {
            let server = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = signals::run_signal_loop(server).await {
                    error!("signal handler setup failed: {}", e);
                }
            });
        }

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    info!("accepted connection from {}", peer);
                    let server = Arc::clone(self);
                    tokio::spawn(flow::drive(stream, peer, server));
                }
                Err(e) => {
                    error!("accepting a connection failed: {}", e);
                }
            }
        }
    }

    /// Bind and serve.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }
}
