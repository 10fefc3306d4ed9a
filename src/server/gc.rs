//! Idle-tunnel garbage collection.
//!
//! Runs on the statistics cadence. Each pass drops expired registry
//! entries and evicts tunnels whose last I/O is older than the
//! configured idle threshold. Eviction fires the tunnel's close
//! signal; its driving task drops the tunnel, closing both sockets
//! and erroring out any relay I/O still blocked on them.

use std::sync::Arc;

use log::info;

use super::Server;

pub(crate) async fn run_gc_loop(server: Arc<Server>) {
    loop {
        tokio::time::sleep(server.statistic_interval()).await;
        let max_idle = server.max_idle_time();
        let evicted = server.registry().sweep(max_idle);
        if evicted > 0 {
            info!(
                "gc pass evicted {} idle tunnel(s), {} remain",
                evicted,
                server.registry().len()
            );
        }
    }
}
