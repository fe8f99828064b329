//! Deterministic hash-embedding stub standing in for a real embedding
//! model; only used to populate the networked store's `VECTOR(1536)`
//! column so that backend's schema can be exercised.

const DIMENSIONS: usize = 1536;

pub fn hash_embedding(text: &str) -> Vec<f32> {
    use sha2::{Digest, Sha256};

    let mut out = Vec::with_capacity(DIMENSIONS);
    let mut counter: u32 = 0;
    while out.len() < DIMENSIONS {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(counter.to_le_bytes());
        let digest = hasher.finalize();
        for chunk in digest.chunks_exact(4) {
            if out.len() >= DIMENSIONS {
                break;
            }
            let bits = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let normalized = (bits as f64 / u32::MAX as f64) as f32 * 2.0 - 1.0;
            out.push(normalized);
        }
        counter += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_is_deterministic_and_correctly_sized() {
        let a = hash_embedding("same text");
        let b = hash_embedding("same text");
        assert_eq!(a, b);
        assert_eq!(a.len(), DIMENSIONS);
    }

    #[test]
    fn different_text_yields_different_embedding() {
        let a = hash_embedding("alpha");
        let b = hash_embedding("beta");
        assert_ne!(a, b);
    }
}
