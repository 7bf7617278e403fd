// src/pipeline/prefetch.rs
//
// Decode-ahead frame source. A worker thread pulls frames from the wrapped
// source and pushes them through a bounded channel; the counting loop stays
// on the consumer side and only ever sees frames in decode order.
//
//   decoder thread ──► bounded(capacity) ──► Session::run (single consumer)

use crate::pipeline::session::FrameSource;
use crate::types::FrameSize;
use anyhow::{anyhow, Result};
use crossbeam::channel::{bounded, Receiver};
use image::RgbImage;
use std::thread;
use tracing::{debug, warn};

pub struct PrefetchSource {
    frame_rx: Receiver<Result<RgbImage>>,
    frame_rate: f64,
    frame_size: FrameSize,
    total_frames: Option<u64>,
    finished: bool,
    _worker_handle: thread::JoinHandle<()>,
}

impl PrefetchSource {
    /// Move `source` onto a decode thread buffering up to `capacity` frames.
    pub fn spawn<S>(mut source: S, capacity: usize) -> Result<Self>
    where
        S: FrameSource + Send + 'static,
    {
        let frame_rate = source.frame_rate();
        let frame_size = source.frame_size();
        let total_frames = source.total_frames();
        let (frame_tx, frame_rx) = bounded::<Result<RgbImage>>(capacity.max(1));

        let worker_handle = thread::Builder::new()
            .name("frame-decoder".to_string())
            .spawn(move || {
                let mut decoded = 0_u64;
                loop {
                    let next = match source.next_frame() {
                        Ok(Some(frame)) => Ok(frame),
                        Ok(None) => break,
                        Err(e) => Err(e),
                    };
                    let failed = next.is_err();
                    if frame_tx.send(next).is_err() {
                        debug!("Frame consumer gone after {} frames", decoded);
                        return;
                    }
                    if failed {
                        return;
                    }
                    decoded += 1;
                }
                debug!("Decoder reached end of stream after {} frames", decoded);
            })?;

        Ok(Self {
            frame_rx,
            frame_rate,
            frame_size,
            total_frames,
            finished: false,
            _worker_handle: worker_handle,
        })
    }
}

impl FrameSource for PrefetchSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.finished {
            return Ok(None);
        }
        match self.frame_rx.recv() {
            Ok(Ok(frame)) => Ok(Some(frame)),
            Ok(Err(e)) => {
                self.finished = true;
                warn!("Frame decoder failed: {}", e);
                Err(anyhow!("Frame decoder failed: {e}"))
            }
            // sender dropped: decoder finished
            Err(_) => {
                self.finished = true;
                Ok(None)
            }
        }
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn frame_size(&self) -> FrameSize {
        self.frame_size
    }

    fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }
}
