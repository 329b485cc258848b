//! Fixed-capacity byte arena for decoder output.
//!
//! The decoder copies every decoded buffer into the arena. When the
//! arena is full its buffer is moved out as one chunk and a recycled
//! buffer takes its place, so steady-state decoding does not allocate.

use crate::format::MediaInfo;

/// Accumulates PCM bytes into chunks of a fixed size.
#[derive(Debug)]
pub struct ChunkArena {
    buf: Vec<u8>,
    capacity: usize,
    spare: Option<Vec<u8>>,
}

impl ChunkArena {
    /// Create an arena that emits chunks of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            spare: None,
        }
    }

    /// Create an arena holding `seconds` of audio in the given format,
    /// rounded to a whole number of frames.
    pub fn for_media(info: &MediaInfo, seconds: u32) -> Self {
        let frame = info.frame_bytes();
        let frames = (u64::from(info.sample_rate) * u64::from(seconds.max(1))) as usize;
        Self::new(frames.max(1) * frame)
    }

    /// Chunk size in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Copy as much of `data` as fits.
    ///
    /// Returns the filled chunk if the arena became full, plus the part
    /// of `data` that did not fit. Callers loop until the rest is empty.
    pub fn fill<'a>(&mut self, data: &'a [u8]) -> (Option<Vec<u8>>, &'a [u8]) {
        let room = self.capacity - self.buf.len();
        let take = room.min(data.len());
        self.buf.extend_from_slice(&data[..take]);

        let full = if self.buf.len() == self.capacity {
            Some(self.swap_out())
        } else {
            None
        };
        (full, &data[take..])
    }

    /// Move out whatever is buffered as a final, possibly short chunk.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            return None;
        }
        Some(self.swap_out())
    }

    /// Hand a consumed chunk back for reuse.
    pub fn recycle(&mut self, mut buf: Vec<u8>) {
        if buf.capacity() < self.capacity {
            return;
        }
        buf.clear();
        self.spare = Some(buf);
    }

    fn swap_out(&mut self) -> Vec<u8> {
        let next = self
            .spare
            .take()
            .unwrap_or_else(|| Vec::with_capacity(self.capacity));
        std::mem::replace(&mut self.buf, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PcmEncoding;

    fn drain(arena: &mut ChunkArena, mut data: &[u8]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while !data.is_empty() {
            let (full, rest) = arena.fill(data);
            out.extend(full);
            data = rest;
        }
        out
    }

    #[test]
    fn test_fill_splits_at_capacity() {
        let mut arena = ChunkArena::new(4);
        let chunks = drain(&mut arena, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(chunks, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.finish(), Some(vec![9, 10]));
        assert_eq!(arena.finish(), None);
    }

    #[test]
    fn test_recycled_buffer_is_reused() {
        let mut arena = ChunkArena::new(3);
        let first = drain(&mut arena, &[1, 2, 3]).pop().unwrap();
        let ptr = first.as_ptr();
        arena.recycle(first);

        // The recycled buffer becomes the fill buffer after the next swap.
        let second = drain(&mut arena, &[4, 5, 6]).pop().unwrap();
        assert_eq!(second, vec![4, 5, 6]);
        let third = drain(&mut arena, &[7, 8, 9]).pop().unwrap();
        assert_eq!(third.as_ptr(), ptr);
        assert_eq!(third, vec![7, 8, 9]);
    }

    #[test]
    fn test_capacity_from_media_info() {
        let info = MediaInfo {
            sample_rate: 16_000,
            channel_count: 2,
            encoding: PcmEncoding::S16,
            duration_secs: 0.0,
        };
        let arena = ChunkArena::for_media(&info, 30);
        assert_eq!(arena.capacity(), 16_000 * 30 * 4);
        assert_eq!(arena.capacity() % info.frame_bytes(), 0);
    }
}
