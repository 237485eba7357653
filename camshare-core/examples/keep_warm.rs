//! Keep-Warm Walkthrough
//!
//! Pins a camera open with no viewers, lets two viewers come and go, and
//! shows that the device survives them until the driver is shut down.

use camshare_core::{CameraArgs, KeepWarmDriver, SharedResource, SimulatedCamera};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    camshare_core::init_tracing();

    let cam = Arc::new(SharedResource::<SimulatedCamera>::new(2));
    let args = CameraArgs::new(0);

    println!("Starting keep-warm driver (30 ms refresh)");
    let driver = KeepWarmDriver::start(cam.clone(), &args, Duration::from_millis(30))?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let seq = cam.with_resource(|c| c.frame_seq()).unwrap_or_default();
    println!("  frames captured with nobody watching: {seq}");

    for viewer in 0..2 {
        let mut lease = cam.lease(&args, Duration::from_millis(100))?;
        lease.refresh();
        let jpeg = lease.with(|c| c.latest().to_vec()).unwrap_or_default();
        println!(
            "  viewer {viewer}: owner={} snapshot={} bytes shared_count={}",
            lease.is_owner(),
            jpeg.len(),
            cam.shared_count()
        );
        let destroyed = lease.finish().await;
        println!("  viewer {viewer} left, camera destroyed: {destroyed}");
    }

    println!("Shutting down driver");
    let destroyed = driver.shutdown().await;
    println!("  camera destroyed: {destroyed}");

    cam.metrics().snapshot().print_report();
    Ok(())
}
