//! Proxy entry point: CLI, logging, PID file, runtime.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use log::{error, info};

use tunnel_proxy_rs::config::Settings;
use tunnel_proxy_rs::server::{shutdown_signal, Server};

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Parser, Debug)]
#[command(author, version, about = "Tri-mode encrypted SOCKS5 tunnel proxy")]
struct Args {
    /// Path to the INI configuration file
    #[arg(short, long, default_value = "./conf/proxy.ini")]
    config: PathBuf,
}

fn write_pid_file(log_dir: &str) -> std::io::Result<PathBuf> {
    fs::create_dir_all(log_dir)?;
    let path = Path::new(log_dir).join("proxy.pid");
    fs::write(&path, format!("{}\n", process::id()))?;
    Ok(path)
}

fn main() {
    let args = Args::parse();

    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());
    env::set_var("RUST_LOG", log_level);
    env_logger::init();

    let settings = match Settings::load(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            error!("loading {} failed: {}", args.config.display(), e);
            process::exit(1);
        }
    };

    info!("starting in {} mode", settings.proxy.mode);
    info!("configuration:\n{}", settings);

    match write_pid_file(&settings.log.dir) {
        Ok(path) => info!("pid file written to {}", path.display()),
        Err(e) => {
            error!("writing the pid file failed: {}", e);
            process::exit(1);
        }
    }

    let worker_threads = env::var("WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(num_cpus::get);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .thread_name("tunnel-proxy-worker")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("building the tokio runtime failed: {}", e);
            process::exit(1);
        }
    };

    let exit_code = runtime.block_on(async {
        let server = match Server::new(settings, Some(args.config.clone())) {
            Ok(server) => server,
            Err(e) => {
                error!("server setup failed: {}", e);
                return 1;
            }
        };

        tokio::select! {
            result = server.run() => match result {
                Ok(()) => 0,
                Err(e) => {
                    error!("server terminated: {}", e);
                    1
                }
            },
            result = shutdown_signal() => match result {
                Ok(()) => {
                    info!("shutting down, abandoning in-flight tunnels");
                    0
                }
                Err(e) => {
                    error!("installing shutdown signal handlers failed: {}", e);
                    1
                }
            },
        }
    });

    process::exit(exit_code);
}
