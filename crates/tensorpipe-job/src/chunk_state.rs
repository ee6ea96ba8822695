/// Tracks prefill chunking for one job. A prompt longer than `chunk_size` is processed
/// in slices so peak per-layer memory stays bounded; a prompt that fits in one chunk
/// never activates chunking at all.
#[derive(Debug, Clone, Default)]
pub struct ChunkState {
    current_chunk: u32,
    total_chunks: u32,
    chunk_size: u32,
    prompt_length: u32,
}

impl ChunkState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates chunking only if the prompt exceeds `chunk_size`.
    pub fn init(&mut self, prompt_length: u32, chunk_size: u32) {
        self.prompt_length = prompt_length;
        if prompt_length > chunk_size && chunk_size > 0 {
            self.chunk_size = chunk_size;
            self.total_chunks = (prompt_length + chunk_size - 1) / chunk_size;
        } else {
            self.chunk_size = 0;
            self.total_chunks = 0;
        }
        self.current_chunk = 0;
    }

    /// True whenever chunking has been activated at all; `total_chunks > 0` is the sole
    /// condition (a single-chunk prompt that still needed splitting counts as active).
    pub fn is_active(&self) -> bool {
        self.total_chunks > 0
    }

    pub fn has_more(&self) -> bool {
        self.is_active() && self.current_chunk < self.total_chunks - 1
    }

    pub fn get_range(&self) -> (u32, u32) {
        if !self.is_active() {
            return (0, self.prompt_length);
        }
        let start = self.current_chunk * self.chunk_size;
        let end = (start + self.chunk_size).min(self.prompt_length);
        (start, end)
    }

    /// Moves to the next chunk. Caller must check `has_more()` first.
    pub fn advance(&mut self) {
        debug_assert!(self.has_more(), "advance() called with no more chunks");
        self.current_chunk += 1;
    }

    pub fn disable(&mut self) {
        self.current_chunk = 0;
        self.total_chunks = 0;
        self.chunk_size = 0;
    }

    pub fn current_chunk(&self) -> u32 {
        self.current_chunk
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_at_chunk_size_is_inactive() {
        let mut chunks = ChunkState::new();
        chunks.init(6, 6);
        assert!(!chunks.is_active());
        assert_eq!(chunks.get_range(), (0, 6));
    }

    #[test]
    fn prompt_one_over_chunk_size_needs_two_chunks() {
        let mut chunks = ChunkState::new();
        chunks.init(7, 6);
        assert!(chunks.is_active());
        assert_eq!(chunks.total_chunks(), 2);
        assert!(chunks.has_more());
        assert_eq!(chunks.get_range(), (0, 6));
        chunks.advance();
        assert!(!chunks.has_more());
        assert_eq!(chunks.get_range(), (6, 7));
    }

    #[test]
    fn chunk_size_one_yields_one_chunk_per_token() {
        let mut chunks = ChunkState::new();
        chunks.init(3, 1);
        assert_eq!(chunks.total_chunks(), 3);
        for expected_start in 0..3u32 {
            assert_eq!(chunks.get_range(), (expected_start, expected_start + 1));
            if chunks.has_more() {
                chunks.advance();
            }
        }
        assert!(!chunks.has_more());
    }

    #[test]
    fn disable_makes_state_permanently_inactive() {
        let mut chunks = ChunkState::new();
        chunks.init(12, 4);
        assert!(chunks.is_active());
        chunks.disable();
        assert!(!chunks.is_active());
        assert!(!chunks.has_more());
    }
}
