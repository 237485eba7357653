//! Streaming loop driven by a [`Lease`].
//!
//! This is the body of a typical viewer: on every tick refresh
//! cooperatively, read the latest data out of the resource and push it to
//! the connection, until the connection ends or the caller cancels.

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::lease::Lease;
use crate::resource::ManagedResource;

/// Where a streaming viewer delivers its frames.
#[async_trait]
pub trait FrameSink: Send {
    /// Deliver one frame.  An error means the connection is gone.
    async fn send(&mut self, frame: Vec<u8>) -> io::Result<()>;
}

/// Why [`stream_frames`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Cancelled,
    SinkClosed,
    /// The generation disappeared underneath the lease.
    GenerationEnded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReport {
    pub frames_sent: u64,
    /// Refreshes this viewer performed on behalf of all holders.
    pub refreshes: u64,
    pub ended: StreamEnd,
}

/// Stream frames from `lease` into `sink` every `interval`.
pub async fn stream_frames<R, S, F>(
    lease: &mut Lease<R>,
    sink: &mut S,
    interval: Duration,
    cancel: &CancellationToken,
    read: F,
) -> StreamReport
where
    R: ManagedResource,
    S: FrameSink + ?Sized,
    F: Fn(&R) -> Vec<u8>,
{
    let mut frames_sent = 0;
    let mut refreshes = 0;

    let ended = loop {
        if cancel.is_cancelled() {
            break StreamEnd::Cancelled;
        }
        if lease.refresh() {
            refreshes += 1;
        }
        let Some(frame) = lease.with(&read) else {
            break StreamEnd::GenerationEnded;
        };
        if let Err(err) = sink.send(frame).await {
            debug!(error = %err, "Viewer connection closed");
            break StreamEnd::SinkClosed;
        }
        frames_sent += 1;

        tokio::select! {
            _ = cancel.cancelled() => break StreamEnd::Cancelled,
            _ = tokio::time::sleep(interval) => {}
        }
    };

    debug!(frames_sent, refreshes, ?ended, "Stream stopped");
    StreamReport {
        frames_sent,
        refreshes,
        ended,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::{Tracked, TrackedArgs};
    use crate::share::SharedResource;
    use std::sync::Arc;

    /// Accepts a fixed number of frames, then reports the peer gone.
    struct CountingSink {
        frames: Vec<Vec<u8>>,
        limit: usize,
    }

    #[async_trait]
    impl FrameSink for CountingSink {
        async fn send(&mut self, frame: Vec<u8>) -> io::Result<()> {
            if self.frames.len() >= self.limit {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
            }
            self.frames.push(frame);
            Ok(())
        }
    }

    fn read_refreshes(p: &Tracked) -> Vec<u8> {
        vec![p.refreshes as u8]
    }

    #[tokio::test]
    async fn test_owner_streams_fresh_frames() {
        let m = Arc::new(SharedResource::<Tracked>::new(0));
        let mut lease = m.lease(&TrackedArgs::default(), Duration::ZERO).unwrap();
        let mut sink = CountingSink {
            frames: Vec::new(),
            limit: 3,
        };

        let report = stream_frames(
            &mut lease,
            &mut sink,
            Duration::from_millis(1),
            &CancellationToken::new(),
            read_refreshes,
        )
        .await;

        assert_eq!(report.ended, StreamEnd::SinkClosed);
        assert_eq!(report.frames_sent, 3);
        assert_eq!(sink.frames, vec![vec![1], vec![2], vec![3]]);
        // The fourth tick refreshed before the sink refused the frame.
        assert_eq!(report.refreshes, 4);
    }

    #[tokio::test]
    async fn test_joiner_does_not_refresh() {
        let m = Arc::new(SharedResource::<Tracked>::new(0));
        let args = TrackedArgs::default();
        let _owner = m.lease(&args, Duration::ZERO).unwrap();
        let mut joiner = m.lease(&args, Duration::ZERO).unwrap();
        let mut sink = CountingSink {
            frames: Vec::new(),
            limit: 2,
        };

        let report = stream_frames(
            &mut joiner,
            &mut sink,
            Duration::from_millis(1),
            &CancellationToken::new(),
            read_refreshes,
        )
        .await;

        assert_eq!(report.refreshes, 0);
        assert_eq!(args.stats.refreshed(), 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_stream() {
        let m = Arc::new(SharedResource::<Tracked>::new(0));
        let mut lease = m.lease(&TrackedArgs::default(), Duration::ZERO).unwrap();
        let mut sink = CountingSink {
            frames: Vec::new(),
            limit: usize::MAX,
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let report = stream_frames(
            &mut lease,
            &mut sink,
            Duration::from_millis(5),
            &cancel,
            read_refreshes,
        )
        .await;

        assert_eq!(report.ended, StreamEnd::Cancelled);
        assert!(report.frames_sent >= 1);
    }
}
