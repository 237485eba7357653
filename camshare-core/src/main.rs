//! camshare - shared camera demo
//!
//! Simulates a handful of concurrent viewers streaming from one capture
//! device through a single `SharedResource`, then prints the sharing report.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use camshare_core::resource::camera::MotionMarker;
use camshare_core::share::{stream_frames, FrameSink, StreamEnd};
use camshare_core::{
    init_tracing, CameraArgs, KeepWarmDriver, ShareConfig, ShareError, SharedResource,
    SimulatedCamera,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

fn print_help() {
    println!("camshare - shared camera demo v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("USAGE:");
    println!("  camshare [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -c, --config <PATH>   Load sharing configuration from a JSON file");
    println!("  -n, --viewers <N>     Number of simulated viewers (default: 6)");
    println!("  -d, --device <INDEX>  Camera index to open (default: 0)");
    println!("  -k, --keep-warm       Keep the camera open with no viewers attached");
    println!("  -h, --help            Print this help message");
    println!("  -v, --version         Print version information");
}

struct Options {
    config: ShareConfig,
    viewers: usize,
    device: u32,
}

fn parse_args() -> Result<Option<Options>> {
    let mut options = Options {
        config: ShareConfig::default(),
        viewers: 6,
        device: 0,
    };
    let mut keep_warm = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(None);
            }
            "-v" | "--version" => {
                println!("camshare {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            "-c" | "--config" => {
                let path = args.next().context("--config needs a path")?;
                options.config = ShareConfig::from_json_file(&path)
                    .with_context(|| format!("loading config from {path}"))?;
            }
            "-n" | "--viewers" => {
                let n = args.next().context("--viewers needs a number")?;
                options.viewers = n.parse().with_context(|| format!("invalid viewer count '{n}'"))?;
            }
            "-d" | "--device" => {
                let d = args.next().context("--device needs an index")?;
                options.device = d.parse().with_context(|| format!("invalid device index '{d}'"))?;
            }
            "-k" | "--keep-warm" => keep_warm = true,
            other => bail!("unrecognized argument '{other}'. Run 'camshare --help' for usage."),
        }
    }
    options.config.keep_warm |= keep_warm;
    Ok(Some(options))
}

/// Stands in for a viewer's socket: counts bytes and hangs up after `budget` frames.
struct SimulatedConnection {
    viewer: usize,
    budget: usize,
    bytes: usize,
}

#[async_trait]
impl FrameSink for SimulatedConnection {
    async fn send(&mut self, frame: Vec<u8>) -> io::Result<()> {
        if self.budget == 0 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "viewer left"));
        }
        self.budget -= 1;
        self.bytes += frame.len();
        Ok(())
    }
}

async fn run_viewer(
    cam: Arc<SharedResource<SimulatedCamera>>,
    args: CameraArgs,
    config: ShareConfig,
    viewer: usize,
    cancel: CancellationToken,
) {
    let mut lease = match cam.lease(&args, config.grace_period()) {
        Ok(lease) => lease,
        Err(err @ ShareError::CapacityReached) => {
            warn!(viewer, "{err}");
            return;
        }
        Err(err) => {
            warn!(viewer, error = %err, "Viewer could not open the camera");
            return;
        }
    };
    if lease.created() {
        info!(viewer, camera = args.index, "Opened camera");
    }

    let mut conn = SimulatedConnection {
        viewer,
        budget: 10 * (viewer + 1),
        bytes: 0,
    };
    let report = stream_frames(
        &mut lease,
        &mut conn,
        config.refresh_interval(),
        &cancel,
        |cam: &SimulatedCamera| cam.latest().to_vec(),
    )
    .await;
    info!(
        viewer = conn.viewer,
        frames = report.frames_sent,
        bytes = conn.bytes,
        refreshes = report.refreshes,
        cancelled = report.ended == StreamEnd::Cancelled,
        "Stream finished"
    );

    if lease.finish().await {
        info!(viewer, "Released camera");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let Some(options) = parse_args()? else {
        return Ok(());
    };
    init_tracing();

    let marker = Arc::new(MotionMarker::new(50.0));
    let hook_marker = marker.clone();
    let cam = Arc::new(
        SharedResource::<SimulatedCamera>::from_config(&options.config)
            .with_post_create(move |cam| cam.install(hook_marker.clone())),
    );
    let args = CameraArgs::new(options.device);
    info!(
        capacity = options.config.capacity,
        viewers = options.viewers,
        keep_warm = options.config.keep_warm,
        "camshare demo starting"
    );

    let driver = if options.config.keep_warm {
        let driver = KeepWarmDriver::start(cam.clone(), &args, options.config.refresh_interval())
            .context("keeping the camera warm")?;
        Some(driver)
    } else {
        None
    };

    let cancel = CancellationToken::new();
    let mut viewers = Vec::with_capacity(options.viewers);
    for viewer in 0..options.viewers {
        viewers.push(tokio::spawn(run_viewer(
            cam.clone(),
            args.clone(),
            options.config.clone(),
            viewer,
            cancel.clone(),
        )));
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping viewers");
            interrupt.cancel();
        }
    });
    for handle in viewers {
        if let Err(err) = handle.await {
            warn!(error = %err, "Viewer task failed");
        }
    }

    if let Some(driver) = driver {
        if driver.shutdown().await {
            info!("Released kept-warm camera");
        }
    }

    println!();
    cam.metrics().snapshot().print_report();
    println!("Motion detections: {}", marker.detections());
    info!("exit gracefully");
    Ok(())
}
