//! Hailo device plugin entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use hailo_core::{Config, DescriptorStore, DiscoveryMonitor, SysfsDeviceSource};
use hailo_device_plugin::Lifecycle;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Advertise Hailo NPUs to the kubelet and hand them to containers through CDI
#[derive(Parser, Debug)]
#[command(name = "hailo-device-plugin")]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON config file; built-in defaults apply when it does not exist
    #[arg(long, value_name = "PATH", default_value = "/etc/hailo/device-plugin.json")]
    config: PathBuf,

    /// Kubelet registration socket
    #[arg(long, value_name = "PATH")]
    kubelet_socket: Option<PathBuf>,

    /// Socket to serve the device plugin API on
    #[arg(long, value_name = "PATH")]
    plugin_socket: Option<PathBuf>,

    /// Extended resource name, e.g. `hailo.ai/npu`
    #[arg(long, value_name = "NAME")]
    resource_name: Option<String>,

    /// Directory the CDI descriptor is written to
    #[arg(long, value_name = "DIR")]
    cdi_dir: Option<PathBuf>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(path) = self.kubelet_socket {
            config.kubelet_socket = path;
        }
        if let Some(path) = self.plugin_socket {
            config.plugin_socket = path;
        }
        if let Some(name) = self.resource_name {
            config.resource_name = name;
        }
        if let Some(dir) = self.cdi_dir {
            config.cdi_dir = dir;
        }
    }
}

/// Install the tracing subscriber. `RUST_LOG` overrides the `hailo=` filter.
///
/// Every build logs to stderr. Debug builds also keep a per-run file under the
/// temp dir, with `hailo-device-plugin.log` pointing at the latest run. The
/// returned guard flushes that file and must live until exit.
fn setup_logging() -> Option<WorkerGuard> {
    let default_level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("hailo={default_level}")));

    if cfg!(debug_assertions) {
        let log_dir = std::env::temp_dir();
        let started = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let run_log = format!("hailo-device-plugin-{started}.log");
        let run_log_path = log_dir.join(&run_log);

        let latest = log_dir.join("hailo-device-plugin.log");
        let _ = std::fs::remove_file(&latest);
        let _ = std::os::unix::fs::symlink(&run_log_path, &latest);

        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::never(&log_dir, &run_log));

        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true);

        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(stderr_layer)
            .with(filter)
            .init();

        eprintln!("Logging to: {} (and stderr)", run_log_path.display());
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
        None
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = ?e, "Failed to install Ctrl+C handler");
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    info!(
        resource = %config.resource_name,
        kubelet_socket = %config.kubelet_socket.display(),
        plugin_socket = %config.plugin_socket.display(),
        "Starting Hailo device plugin"
    );

    std::fs::create_dir_all(&config.cdi_dir)
        .with_context(|| format!("creating CDI directory {}", config.cdi_dir.display()))?;

    let cancel = CancellationToken::new();

    let monitor = DiscoveryMonitor::new(
        SysfsDeviceSource::new(&config.layout.sysfs_class_dir),
        DescriptorStore::from_config(&config),
        config.timings.discovery_interval(),
    )
    .spawn(cancel.child_token());

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    let mut lifecycle = Lifecycle::new(config, cancel.clone())?;
    lifecycle.run().await;

    cancel.cancel();
    if let Err(e) = monitor.await {
        error!("Discovery monitor task failed: {e}");
    }

    info!("Hailo device plugin stopped");
    Ok(())
}
