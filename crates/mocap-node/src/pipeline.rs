use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;

use log::{debug, warn};
use mocap_core::FrameDetections;
use rayon::{ThreadPool, ThreadPoolBuilder};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{AgentError, FrameArena, FrameDecoder, FrameError, MarkerIdentifier};

/// Number of chunks a recording is split into.
pub const PIPELINE_CHUNKS: usize = 4;

/// Per-frame detections of one recording, in frame order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineOutput {
    pub frames: Vec<FrameDetections>,
    /// Frames whose processing failed; each has an empty detection map.
    pub failed: Vec<(usize, FrameError)>,
}

/// Bounded-parallel marker detection over a frozen recording.
pub struct DetectionPipeline {
    pool: ThreadPool,
    decoder: Arc<dyn FrameDecoder>,
    identifier: Arc<dyn MarkerIdentifier>,
}

impl DetectionPipeline {
    /// Build a pipeline with `workers` threads (available cores when `None`).
    pub fn new(
        workers: Option<usize>,
        decoder: Arc<dyn FrameDecoder>,
        identifier: Arc<dyn MarkerIdentifier>,
    ) -> Result<Self, AgentError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.unwrap_or(0))
            .thread_name(|i| format!("detect-{i}"))
            .build()
            .map_err(|e| AgentError::Pipeline(e.to_string()))?;
        Ok(Self {
            pool,
            decoder,
            identifier,
        })
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Detect markers in every frame of `arena`.
    ///
    /// Each chunk job sends `(frame, result)` messages back; the call blocks
    /// until all jobs finish and then reassembles the results by index.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, arena), fields(frames = arena.len()))
    )]
    pub fn run(&self, arena: &FrameArena) -> PipelineOutput {
        let (tx, rx) = mpsc::channel::<(usize, Result<FrameDetections, FrameError>)>();

        self.pool.scope(|scope| {
            for range in arena.partition(PIPELINE_CHUNKS) {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    debug!("chunk {range:?} started");
                    for index in range {
                        let result = self.detect(arena, index);
                        if tx.send((index, result)).is_err() {
                            return;
                        }
                    }
                });
            }
        });
        drop(tx);

        let mut frames = vec![FrameDetections::new(); arena.len()];
        let mut failed = Vec::new();
        for (index, result) in rx {
            match result {
                Ok(detections) => frames[index] = detections,
                Err(err) => {
                    warn!("frame {index}: {err}; keeping an empty detection map");
                    failed.push((index, err));
                }
            }
        }
        failed.sort_by_key(|(index, _)| *index);
        PipelineOutput { frames, failed }
    }

    fn detect(&self, arena: &FrameArena, index: usize) -> Result<FrameDetections, FrameError> {
        let raw = arena
            .get(index)
            .ok_or_else(|| FrameError::Decode(format!("frame {index} out of range")))?;
        let resolution = arena.resolution();
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
            let image = self.decoder.decode(raw, resolution)?;
            self.identifier.identify(&image)
        }));
        attempt.unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(FrameError::Panicked(message))
        })
    }
}
