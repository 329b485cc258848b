//! Fixed-size windowing of normalized samples for the VAD.

use std::collections::VecDeque;

/// FIFO that re-slices irregular sample batches into fixed windows.
///
/// Single owner; callers that share it across tasks must wrap it in a
/// mutex.
#[derive(Debug, Default)]
pub struct WindowBuffer {
    samples: VecDeque<f32>,
}

impl WindowBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append samples at the back.
    pub fn write(&mut self, samples: &[f32]) {
        self.samples.extend(samples.iter().copied());
    }

    /// Pop exactly `window_size` samples from the front, if that many are buffered.
    pub fn read_chunk(&mut self, window_size: usize) -> Option<Vec<f32>> {
        if window_size == 0 || self.samples.len() < window_size {
            return None;
        }
        Some(self.samples.drain(..window_size).collect())
    }

    /// Drain everything that is left.
    pub fn flush(&mut self) -> Vec<f32> {
        self.samples.drain(..).collect()
    }

    /// Samples currently buffered.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
