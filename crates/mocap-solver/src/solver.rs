use std::collections::BTreeSet;

use log::{debug, warn};
use mocap_core::{Camera, FrameDetections, MarkerIdentity, Resolution, SolvedPoint, SolvedSequence};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::geometry::{closest_approach, Ray, RayApproach};
use crate::params::{FrameCountPolicy, SolverParams};
use crate::projection::back_project_at;

/// Errors returned by [`TriangulationSolver::solve_sequence`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SolveError {
    #[error("at least two calibrated views are required, got {available}")]
    NotEnoughViews { available: usize },
}

/// One node's detections for a single frame, paired with its camera.
#[derive(Clone, Copy, Debug)]
pub struct NodeFrame<'a> {
    pub camera: &'a Camera,
    pub detections: &'a FrameDetections,
    /// Size of the frame the detections were made in.
    pub resolution: Resolution,
}

impl<'a> NodeFrame<'a> {
    /// Detections made at the camera's calibration resolution.
    pub fn new(camera: &'a Camera, detections: &'a FrameDetections) -> Self {
        Self {
            camera,
            detections,
            resolution: camera.resolution(),
        }
    }
}

/// One node's full detection sequence, paired with its camera.
#[derive(Clone, Copy, Debug)]
pub struct NodeTrack<'a> {
    pub camera: &'a Camera,
    pub frames: &'a [FrameDetections],
    pub resolution: Resolution,
}

impl<'a> NodeTrack<'a> {
    /// A track recorded at the camera's calibration resolution.
    pub fn new(camera: &'a Camera, frames: &'a [FrameDetections]) -> Self {
        Self {
            camera,
            frames,
            resolution: camera.resolution(),
        }
    }

    /// The same track, recorded at `resolution`.
    pub fn at(self, resolution: Resolution) -> Self {
        Self { resolution, ..self }
    }
}

/// Output of [`TriangulationSolver::solve_sequence`].
#[derive(Clone, Debug, PartialEq)]
pub struct SequenceSolution {
    pub sequence: SolvedSequence,
    /// Frames recorded by longer nodes that could not be fused, per host.
    pub dropped_frames: Vec<(String, usize)>,
}

/// Fuses per-node 2D detections into 3D marker positions.
#[derive(Clone, Debug, Default)]
pub struct TriangulationSolver {
    params: SolverParams,
}

impl TriangulationSolver {
    pub fn new(params: SolverParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Triangulate every marker seen by at least two views in one frame.
    ///
    /// Markers observed by a single view, or whose every view pair is
    /// parallel, are absent from the output. Output is ordered by marker.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, views), fields(views = views.len()))
    )]
    pub fn solve_frame(&self, frame: usize, views: &[NodeFrame<'_>]) -> Vec<SolvedPoint> {
        let markers: BTreeSet<MarkerIdentity> = views
            .iter()
            .flat_map(|v| v.detections.keys().copied())
            .collect();

        markers
            .into_iter()
            .filter_map(|marker| self.solve_marker(frame, marker, views))
            .collect()
    }

    fn solve_marker(
        &self,
        frame: usize,
        marker: MarkerIdentity,
        views: &[NodeFrame<'_>],
    ) -> Option<SolvedPoint> {
        let rays: Vec<Ray> = views
            .iter()
            .filter_map(|v| {
                v.detections
                    .get(&marker)
                    .map(|px| back_project_at(v.camera, v.resolution, *px))
            })
            .collect();
        if rays.len() < 2 {
            return None;
        }

        let mut sum = Vector3::zeros();
        let mut residual = 0.0;
        let mut pairs = 0usize;
        for (i, a) in rays.iter().enumerate() {
            for b in &rays[i + 1..] {
                match closest_approach(a, b, self.params.parallel_epsilon) {
                    RayApproach::Skew { on_a, on_b, distance } => {
                        sum += nalgebra::center(&on_a, &on_b).coords;
                        residual += distance;
                        pairs += 1;
                    }
                    RayApproach::Parallel { distance } => {
                        debug!("frame {frame}: parallel rays for {marker} (gap {distance:.4})");
                    }
                }
            }
        }
        if pairs == 0 {
            return None;
        }

        let n = pairs as f64;
        Some(SolvedPoint {
            marker,
            position: Point3::from(sum / n),
            residual: residual / n,
            frame,
        })
    }

    /// Solve every frame that all tracks recorded.
    ///
    /// Frames are independent and are solved in parallel; the output keeps
    /// frame order. Frames past the shortest track are dropped.
    pub fn solve_sequence(&self, tracks: &[NodeTrack<'_>]) -> Result<SequenceSolution, SolveError> {
        if tracks.len() < 2 {
            return Err(SolveError::NotEnoughViews {
                available: tracks.len(),
            });
        }

        let frame_count = tracks.iter().map(|t| t.frames.len()).min().unwrap_or(0);
        let dropped_frames: Vec<(String, usize)> = tracks
            .iter()
            .filter(|t| t.frames.len() > frame_count)
            .map(|t| (t.camera.host.clone(), t.frames.len() - frame_count))
            .collect();
        if self.params.frame_count_policy == FrameCountPolicy::Warn {
            for (host, dropped) in &dropped_frames {
                warn!("{host}: dropping {dropped} frame(s) past the shortest node ({frame_count})");
            }
        }

        let frames = (0..frame_count)
            .into_par_iter()
            .map(|frame| {
                let views: Vec<NodeFrame<'_>> = tracks
                    .iter()
                    .map(|t| NodeFrame {
                        camera: t.camera,
                        detections: &t.frames[frame],
                        resolution: t.resolution,
                    })
                    .collect();
                self.solve_frame(frame, &views)
            })
            .collect();

        Ok(SequenceSolution {
            sequence: SolvedSequence::new(frames),
            dropped_frames,
        })
    }
}
