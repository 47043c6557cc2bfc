use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Length of every vector this client produces.
    fn dimension(&self) -> usize;
}

/// Deterministic bag-of-words embeddings built with feature hashing.
///
/// Each lowercased alphanumeric token is hashed into one of `dimension` buckets with a signed
/// weight, and the result is L2-normalized. Texts sharing vocabulary land close together under
/// cosine similarity, which is all retrieval over a single uploaded document needs.
pub struct HashedEmbeddingClient {
    dimension: usize,
}

impl HashedEmbeddingClient {
    /// Construct a client producing vectors of the given size.
    pub fn new(dimension: usize) -> Result<Self, EmbeddingClientError> {
        if dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];

        for token in tokens(text) {
            let hash = fnv1a(token.as_bytes());
            let position = (hash % self.dimension as u64) as usize;
            // The top bit picks a sign so colliding tokens partially cancel instead of piling up.
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[position] += sign;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashedEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        tracing::trace!(
            count = texts.len(),
            dimension = self.dimension,
            "Generating embeddings"
        );
        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() > 1)
        .map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

/// Cosine similarity of two vectors; zero when lengths differ or either vector is empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
