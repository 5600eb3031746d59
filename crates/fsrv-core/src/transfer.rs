//! Transfer classification and chunk planning.

/// How a file body is moved to the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// In-kernel file-to-socket copy (`sendfile`).
    ZeroCopy,
    /// Async read into a staging buffer, then async send, chunk by chunk.
    StagedAsync,
}

impl TransferKind {
    /// Classify by substring match on the request path as the client sent
    /// it (not the resolved filesystem path).
    pub fn classify(request_path: &str, static_segment: &str) -> Self {
        if request_path.contains(static_segment) {
            TransferKind::ZeroCopy
        } else {
            TransferKind::StagedAsync
        }
    }
}

/// Partition of a file into fixed-size chunks.
///
/// `chunk_count = ceil(file_size / chunk_size)`; every chunk is
/// `chunk_size` bytes except the last, which holds the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    file_size: u64,
    chunk_size: usize,
}

impl ChunkPlan {
    /// `chunk_size` of 0 is treated as 1.
    pub fn new(file_size: u64, chunk_size: usize) -> Self {
        Self { file_size, chunk_size: chunk_size.max(1) }
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_count(&self) -> u64 {
        self.file_size.div_ceil(self.chunk_size as u64)
    }

    /// File offset of chunk `index`.
    pub fn offset(&self, index: u64) -> u64 {
        index * self.chunk_size as u64
    }

    /// Length of chunk `index`; 0 past the end.
    pub fn chunk_len(&self, index: u64) -> usize {
        let start = self.offset(index);
        if start >= self.file_size {
            return 0;
        }
        (self.file_size - start).min(self.chunk_size as u64) as usize
    }

    /// `(offset, len)` of every chunk, in order.
    pub fn chunks(&self) -> impl Iterator<Item = (u64, usize)> + '_ {
        (0..self.chunk_count()).map(move |i| (self.offset(i), self.chunk_len(i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_segment_selects_zero_copy() {
        assert_eq!(TransferKind::classify("/static/a.txt", "static"), TransferKind::ZeroCopy);
        assert_eq!(TransferKind::classify("/x/staticfile", "static"), TransferKind::ZeroCopy);
        assert_eq!(TransferKind::classify("/dynamic/a.txt", "static"), TransferKind::StagedAsync);
    }

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(ChunkPlan::new(0, 4096).chunk_count(), 0);
        assert_eq!(ChunkPlan::new(1, 4096).chunk_count(), 1);
        assert_eq!(ChunkPlan::new(4096, 4096).chunk_count(), 1);
        assert_eq!(ChunkPlan::new(4097, 4096).chunk_count(), 2);
    }

    #[test]
    fn last_chunk_holds_remainder() {
        let plan = ChunkPlan::new(10_000, 4096);
        let lens: Vec<usize> = plan.chunks().map(|(_, l)| l).collect();
        assert_eq!(lens, vec![4096, 4096, 1808]);
        assert_eq!(plan.chunk_len(3), 0);
    }

    #[test]
    fn exact_multiple_ends_with_full_chunk() {
        let plan = ChunkPlan::new(8192, 4096);
        let chunks: Vec<(u64, usize)> = plan.chunks().collect();
        assert_eq!(chunks, vec![(0, 4096), (4096, 4096)]);
    }

    #[test]
    fn chunk_lengths_sum_to_file_size() {
        for (size, chunk) in [(1u64, 1usize), (12_345, 100), (65_536, 8192), (99, 1000)] {
            let plan = ChunkPlan::new(size, chunk);
            let total: u64 = plan.chunks().map(|(_, l)| l as u64).sum();
            assert_eq!(total, size);
            let offsets: Vec<u64> = plan.chunks().map(|(o, _)| o).collect();
            assert!(offsets.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn zero_chunk_size_is_clamped() {
        assert_eq!(ChunkPlan::new(3, 0).chunk_count(), 3);
    }
}
