//! Raw frame storage.
//!
//! Recording appends to a [`FrameBuffer`]; nothing reads it until the
//! recording window closes. [`FrameBuffer::flush`] then freezes the frames
//! into a [`FrameArena`], an immutable, cheaply cloneable, indexable view
//! handed to the detection workers.

use std::ops::Range;
use std::sync::Arc;

use mocap_core::Resolution;

/// Append-only frame store filled while recording.
#[derive(Debug)]
pub struct FrameBuffer {
    resolution: Resolution,
    limit: usize,
    frames: Vec<Vec<u8>>,
}

impl FrameBuffer {
    /// A buffer that accepts at most `limit` frames.
    pub fn new(resolution: Resolution, limit: usize) -> Self {
        Self {
            resolution,
            limit,
            frames: Vec::with_capacity(limit.min(1024)),
        }
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Append one raw frame. Returns `false` once the limit is reached; the
    /// frame is then discarded and the source should stop.
    pub fn push(&mut self, frame: Vec<u8>) -> bool {
        if self.is_full() {
            return false;
        }
        self.frames.push(frame);
        true
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.limit
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// End of recording: finalize the frame count and freeze the frames.
    pub fn flush(self) -> FrameArena {
        FrameArena {
            resolution: self.resolution,
            frames: self.frames.into(),
        }
    }
}

/// Read-only frames of one recording.
#[derive(Clone, Debug)]
pub struct FrameArena {
    resolution: Resolution,
    frames: Arc<[Vec<u8>]>,
}

impl FrameArena {
    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.frames.get(index).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.frames.iter().map(Vec::as_slice)
    }

    /// Split the frame indices into at most `parts` contiguous, disjoint
    /// ranges of `ceil(len / parts)` frames (the last may be shorter).
    pub fn partition(&self, parts: usize) -> Vec<Range<usize>> {
        let len = self.len();
        if len == 0 {
            return Vec::new();
        }
        let chunk = len.div_ceil(parts.max(1));
        (0..len)
            .step_by(chunk)
            .map(|start| start..(start + chunk).min(len))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(frames: usize) -> FrameArena {
        let mut buffer = FrameBuffer::new(Resolution::new(2, 2), frames);
        for i in 0..frames {
            assert!(buffer.push(vec![i as u8; 12]));
        }
        buffer.flush()
    }

    #[test]
    fn buffer_stops_at_its_limit() {
        let mut buffer = FrameBuffer::new(Resolution::new(2, 2), 2);
        assert!(buffer.push(vec![0]));
        assert!(buffer.push(vec![1]));
        assert!(buffer.is_full());
        assert!(!buffer.push(vec![2]));
        let arena = buffer.flush();
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(1), Some(&[1u8][..]));
        assert_eq!(arena.get(2), None);
    }

    #[test]
    fn partition_covers_every_frame_once() {
        for len in [1usize, 3, 4, 5, 10, 17, 120] {
            let ranges = arena(len).partition(4);
            assert!(ranges.len() <= 4);
            let chunk = len.div_ceil(4);
            let mut next = 0;
            for r in &ranges {
                assert_eq!(r.start, next);
                assert!(r.len() <= chunk && !r.is_empty());
                next = r.end;
            }
            assert_eq!(next, len);
        }
    }

    #[test]
    fn empty_recording_has_no_chunks() {
        assert!(arena(0).partition(4).is_empty());
    }

    #[test]
    fn clones_share_frames() {
        let a = arena(3);
        let b = a.clone();
        assert!(std::ptr::eq(a.get(0).unwrap(), b.get(0).unwrap()));
    }
}
