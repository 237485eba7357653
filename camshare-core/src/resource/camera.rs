//! Simulated Capture Device
//!
//! An in-process stand-in for a webcam: it "captures" numbered frames on
//! every refresh, keeps the most recent encoded snapshot for viewers, can
//! record a clip and take a still.  Observers installed on the device see
//! every frame, which is how post-create wiring is exercised.
//!
//! The frame payload is synthetic; no image processing happens here.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};

use super::ManagedResource;

/// Constructor arguments for a [`SimulatedCamera`].
#[derive(Debug, Clone)]
pub struct CameraArgs {
    /// Device index, as a capture API would take it.
    pub index: u32,
    /// JPEG quality recorded in every snapshot header (0-100).
    pub jpeg_quality: u8,
    /// Indices that refuse to open, to simulate a device held elsewhere.
    pub unavailable: Arc<HashSet<u32>>,
}

impl CameraArgs {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            jpeg_quality: 95,
            unavailable: Arc::default(),
        }
    }

    pub fn with_unavailable(mut self, indices: impl IntoIterator<Item = u32>) -> Self {
        self.unavailable = Arc::new(indices.into_iter().collect());
        self
    }
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("cannot open camera {0}: device busy")]
    Busy(u32),
}

/// One captured frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub seq: u64,
    /// Mean brightness of the frame, 0.0-255.0.
    pub brightness: f32,
}

/// Sees every frame the camera captures.
pub trait FrameObserver: Send + Sync {
    /// Called with the current frame when installed on an open camera.
    fn init(&self, frame: &Frame);

    /// Called for each new frame; returns whether the frame is notable.
    fn on_frame(&self, frame: &Frame) -> bool;
}

/// A finished recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub path: String,
    pub frames: Vec<u64>,
}

pub struct SimulatedCamera {
    index: u32,
    quality: u8,
    frame: Frame,
    snapshot: Vec<u8>,
    notable_frames: u64,
    observers: Vec<Arc<dyn FrameObserver>>,
    recording: Option<Recording>,
}

impl SimulatedCamera {
    /// Attach an observer; it is initialized with the current frame.
    pub fn install(&mut self, observer: Arc<dyn FrameObserver>) {
        observer.init(&self.frame);
        self.observers.push(observer);
    }

    /// Most recent encoded snapshot.
    pub fn latest(&self) -> &[u8] {
        &self.snapshot
    }

    pub fn frame_seq(&self) -> u64 {
        self.frame.seq
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Frames that at least one observer flagged.
    pub fn notable_frames(&self) -> u64 {
        self.notable_frames
    }

    pub fn set_quality(&mut self, quality: u8) {
        self.quality = quality.min(100);
    }

    /// Start appending frames to a recording at `path`.
    ///
    /// Returns `false` if a recording is already running.
    pub fn start_recording(&mut self, path: impl Into<String>) -> bool {
        if self.recording.is_some() {
            return false;
        }
        let path = path.into();
        info!(camera = self.index, path = %path, "Recording started");
        self.recording = Some(Recording {
            path,
            frames: Vec::new(),
        });
        true
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn stop_recording(&mut self) -> Option<Recording> {
        let recording = self.recording.take()?;
        info!(
            camera = self.index,
            frames = recording.frames.len(),
            "Recording stopped"
        );
        Some(recording)
    }

    /// Encode the current frame as a still image.
    pub fn take_picture(&self) -> Vec<u8> {
        encode(&self.frame, self.quality)
    }

    fn capture(&mut self) {
        let seq = self.frame.seq + 1;
        // Deterministic brightness with a jump every 16th frame.
        let brightness = if seq % 16 == 0 { 200.0 } else { 96.0 + (seq % 8) as f32 };
        self.frame = Frame { seq, brightness };
    }
}

/// Fake JPEG: SOI marker, quality, big-endian sequence, EOI marker.
fn encode(frame: &Frame, quality: u8) -> Vec<u8> {
    let mut buf = Vec::with_capacity(13);
    buf.extend_from_slice(&[0xFF, 0xD8, quality]);
    buf.extend_from_slice(&frame.seq.to_be_bytes());
    buf.extend_from_slice(&[0xFF, 0xD9]);
    buf
}

impl ManagedResource for SimulatedCamera {
    type Args = CameraArgs;
    type Error = CameraError;

    fn open(args: &CameraArgs) -> Result<Self, CameraError> {
        if args.unavailable.contains(&args.index) {
            return Err(CameraError::Busy(args.index));
        }
        info!(camera = args.index, "Opening camera");

        let mut camera = Self {
            index: args.index,
            quality: args.jpeg_quality.min(100),
            frame: Frame {
                seq: 0,
                brightness: 0.0,
            },
            snapshot: Vec::new(),
            notable_frames: 0,
            observers: Vec::new(),
            recording: None,
        };
        camera.refresh();
        Ok(camera)
    }

    fn refresh(&mut self) {
        self.capture();
        let mut notable = false;
        for observer in &self.observers {
            notable |= observer.on_frame(&self.frame);
        }
        if notable {
            self.notable_frames += 1;
        }
        if let Some(recording) = self.recording.as_mut() {
            recording.frames.push(self.frame.seq);
        }
        self.snapshot = encode(&self.frame, self.quality);
    }
}

impl Drop for SimulatedCamera {
    fn drop(&mut self) {
        debug!(camera = self.index, "Closing camera");
    }
}

/// Flags frames whose brightness departs from the running average.
///
/// A numeric stand-in for motion detection: one observer instance is shared
/// by every generation of a camera and re-seeded on each `init`.
pub struct MotionMarker {
    threshold: f32,
    state: Mutex<MarkerState>,
}

#[derive(Default)]
struct MarkerState {
    average: f32,
    detections: u64,
}

impl MotionMarker {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            state: Mutex::new(MarkerState::default()),
        }
    }

    pub fn detections(&self) -> u64 {
        self.state.lock().map(|s| s.detections).unwrap_or_default()
    }
}

impl FrameObserver for MotionMarker {
    fn init(&self, frame: &Frame) {
        if let Ok(mut state) = self.state.lock() {
            state.average = frame.brightness;
        }
    }

    fn on_frame(&self, frame: &Frame) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        let detected = (frame.brightness - state.average).abs() > self.threshold;
        if detected {
            state.detections += 1;
        }
        // Slow-moving average so a single spike stands out.
        state.average += (frame.brightness - state.average) * 0.01;
        detected
    }
}
