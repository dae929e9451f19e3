use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::MarkerIdentity;

/// A marker fused from at least two camera views.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolvedPoint {
    pub marker: MarkerIdentity,
    pub position: Point3<f64>,
    /// Mean closest-approach distance between the contributing rays.
    pub residual: f64,
    pub frame: usize,
}

/// Solved markers for every frame of a session, in frame order.
///
/// On disk each frame is a list of `[label, [x, y, z], residual]` entries;
/// the frame index is implied by position.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "SolvedFile", from = "SolvedFile")]
pub struct SolvedSequence {
    pub frames: Vec<Vec<SolvedPoint>>,
}

#[derive(Serialize, Deserialize)]
struct SolvedEntry(MarkerIdentity, [f64; 3], f64);

#[derive(Serialize, Deserialize)]
struct SolvedFile(Vec<Vec<SolvedEntry>>);

impl From<SolvedSequence> for SolvedFile {
    fn from(seq: SolvedSequence) -> Self {
        SolvedFile(
            seq.frames
                .into_iter()
                .map(|frame| {
                    frame
                        .into_iter()
                        .map(|p| {
                            let xyz = [p.position.x, p.position.y, p.position.z];
                            SolvedEntry(p.marker, xyz, p.residual)
                        })
                        .collect()
                })
                .collect(),
        )
    }
}

impl From<SolvedFile> for SolvedSequence {
    fn from(file: SolvedFile) -> Self {
        let frames = file
            .0
            .into_iter()
            .enumerate()
            .map(|(frame, entries)| {
                entries
                    .into_iter()
                    .map(|SolvedEntry(marker, [x, y, z], residual)| SolvedPoint {
                        marker,
                        position: Point3::new(x, y, z),
                        residual,
                        frame,
                    })
                    .collect()
            })
            .collect();
        SolvedSequence { frames }
    }
}

impl SolvedSequence {
    pub fn new(frames: Vec<Vec<SolvedPoint>>) -> Self {
        Self { frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Trajectory of one marker as `(frame, position)` pairs.
    pub fn track(&self, marker: MarkerIdentity) -> impl Iterator<Item = (usize, Point3<f64>)> + '_ {
        self.frames
            .iter()
            .flatten()
            .filter(move |p| p.marker == marker)
            .map(|p| (p.frame, p.position))
    }

    /// Total number of solved points across all frames.
    pub fn point_count(&self) -> usize {
        self.frames.iter().map(Vec::len).sum()
    }
}
