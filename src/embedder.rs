use image::DynamicImage;

#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("encoder unavailable: {0}")]
    Unavailable(String),
    #[error("failed to prepare encoder input: {0}")]
    InvalidInput(String),
}

/// The vision-language encoder boundary.
///
/// Both branches return L2-normalized vectors of the encoder's native
/// dimensionality so cosine similarity reduces to a dot product. A failing
/// encoder surfaces as an error; callers never substitute a zero vector.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>, EncoderError>;

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, EncoderError>;

    /// Embeds many images at once. Implementations with batched inference
    /// override this; the default encodes one image at a time.
    fn embed_images(&self, images: &[DynamicImage]) -> Result<Vec<Vec<f32>>, EncoderError> {
        images.iter().map(|image| self.embed_image(image)).collect()
    }
}

/// Normalize vector to unit length (L2 normalization)
pub fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let magnitude = vec.iter().map(|x| x * x).sum::<f32>().sqrt();

    // Avoid division by zero
    if magnitude == 0.0 {
        return vec.to_vec();
    }

    vec.iter().map(|x| x / magnitude).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let vec = vec![3.0, 4.0];
        let normalized = l2_normalize(&vec);

        // Length should be 1.0
        let length = normalized.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((length - 1.0).abs() < 1e-5);

        // Values should be [0.6, 0.8]
        assert!((normalized[0] - 0.6).abs() < 1e-5);
        assert!((normalized[1] - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let vec = vec![0.0, 0.0];
        let normalized = l2_normalize(&vec);

        // Should return original vector
        assert_eq!(normalized, vec);
    }

    #[test]
    fn test_l2_normalize_unit_norm_property() {
        let vec: Vec<f32> = (0..512).map(|i| (i as f32) * 0.37 - 19.0).collect();
        let normalized = l2_normalize(&vec);
        let length = normalized.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((length - 1.0).abs() < 1e-5);
    }
}
