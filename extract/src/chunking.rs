//! Word-based sliding-window chunker (§4.3), ported from the original
//! `chunk_document` helper.

pub const DEFAULT_CHUNK_SIZE: usize = 1500;
pub const DEFAULT_OVERLAP: usize = 200;
pub const DEFAULT_MAX_CHUNKS: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    pub max_chunks: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, overlap: DEFAULT_OVERLAP, max_chunks: DEFAULT_MAX_CHUNKS }
    }
}

/// Splits `text` into overlapping word windows, bounded by `max_chunks`.
pub fn chunk_document(text: &str, config: ChunkConfig) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= config.chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() && chunks.len() < config.max_chunks {
        let end = (start + config.chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start = end - config.overlap;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn short_text_returns_single_chunk() {
        let text = words(10);
        let chunks = chunk_document(&text, ChunkConfig::default());
        assert_eq!(chunks, vec![text]);
    }

    #[test]
    fn long_text_slides_with_overlap() {
        let text = words(4000);
        let config = ChunkConfig { chunk_size: 1500, overlap: 200, max_chunks: 5 };
        let chunks = chunk_document(&text, config);
        assert!(chunks.len() >= 2);
        assert!(chunks.len() <= config.max_chunks);

        let first_words: Vec<&str> = chunks[0].split_whitespace().collect();
        let second_words: Vec<&str> = chunks[1].split_whitespace().collect();
        assert_eq!(first_words[first_words.len() - 200..], second_words[..200]);
    }

    #[test]
    fn stops_at_max_chunks_even_if_input_remains() {
        let text = words(100_000);
        let config = ChunkConfig { chunk_size: 100, overlap: 10, max_chunks: 3 };
        let chunks = chunk_document(&text, config);
        assert_eq!(chunks.len(), 3);
    }
}
