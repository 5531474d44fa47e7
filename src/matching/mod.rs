pub mod fanout;
pub mod gate;
pub mod kernel;
pub mod pipeline;
pub mod scanner;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod types;

/// Encode an f32 embedding as little-endian bytes for storage.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Decode little-endian bytes back to an f32 embedding.
///
/// Returns `None` when the length is not a whole number of f32 values.
pub fn bytes_to_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}
