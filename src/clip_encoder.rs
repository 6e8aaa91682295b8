//! CLIP encoder for generating image and text embeddings.
//!
//! Loads OpenAI's CLIP ViT-B/32 through the candle runtime; weights and
//! tokenizer are fetched from HuggingFace Hub into a local cache directory on
//! first use. Both branches produce L2-normalized 512-dimensional vectors in
//! a shared space, so text-to-image relevance is a dot product.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip;
use image::DynamicImage;
use log::info;
use tokenizers::Tokenizer;

use crate::embedder::{Embedder, EncoderError};

// Model configuration
const CLIP_MODEL: &str = "openai/clip-vit-base-patch32";
const MODEL_REVISION: &str = "d15b5f29721ca72dac15f8526b284be910de18be";

// Text encoding parameters
const CONTEXT_LENGTH: usize = 77;
const EOT_TOKEN: u32 = 49407;

// Image preprocessing constants
const CLIP_IMAGE_SIZE: u32 = 224;
const CLIP_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const CLIP_STD: [f32; 3] = [0.26862954, 0.261_302_6, 0.275_777_1];

pub const CLIP_EMBEDDING_DIM: usize = 512;

fn unavailable(err: impl std::fmt::Display) -> EncoderError {
    EncoderError::Unavailable(err.to_string())
}

/// CLIP ViT-B/32 encoder backed by candle.
pub struct ClipEncoder {
    model: clip::ClipModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl ClipEncoder {
    /// Loads model weights and tokenizer, downloading into `model_cache_path`
    /// if not already cached.
    pub fn new(model_cache_path: &Path) -> Result<Self, EncoderError> {
        let device = Device::Cpu;

        info!("Loading CLIP model from {}", model_cache_path.display());
        let (model, tokenizer) = load_clip_model(&device, model_cache_path)?;
        info!("CLIP encoder initialized successfully");

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    fn encode_text_tensor(&self, text: &str) -> Result<Tensor, EncoderError> {
        let mut tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(unavailable)?
            .get_ids()
            .to_vec();

        // CLIP expects exactly 77 tokens; pad with the EOT token or truncate.
        if tokens.len() < CONTEXT_LENGTH {
            tokens.resize(CONTEXT_LENGTH, EOT_TOKEN);
        } else {
            tokens.truncate(CONTEXT_LENGTH);
        }

        let token_ids = Tensor::new(&tokens[..], &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(unavailable)?;
        let features = self
            .model
            .get_text_features(&token_ids)
            .map_err(unavailable)?;
        normalize_tensor(&features)
    }

    fn encode_image_tensor(&self, image: &DynamicImage) -> Result<Tensor, EncoderError> {
        let img_tensor = preprocess_image(image, &self.device)?
            .unsqueeze(0)
            .map_err(unavailable)?;

        let mean = Tensor::new(&CLIP_MEAN, &self.device)
            .and_then(|t| t.reshape((1, 3, 1, 1)))
            .map_err(unavailable)?;
        let std = Tensor::new(&CLIP_STD, &self.device)
            .and_then(|t| t.reshape((1, 3, 1, 1)))
            .map_err(unavailable)?;
        let img_normalized = img_tensor
            .broadcast_sub(&mean)
            .and_then(|t| t.broadcast_div(&std))
            .map_err(unavailable)?;

        let features = self
            .model
            .get_image_features(&img_normalized)
            .map_err(unavailable)?;
        normalize_tensor(&features)
    }
}

impl Embedder for ClipEncoder {
    fn dimension(&self) -> usize {
        CLIP_EMBEDDING_DIM
    }

    fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>, EncoderError> {
        let features = self.encode_image_tensor(image)?;
        tensor_to_vec(&features)
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, EncoderError> {
        let features = self.encode_text_tensor(text)?;
        tensor_to_vec(&features)
    }

    /// Batched inference amortizes the forward pass when a video contributes
    /// many sampled frames; decoding and resizing are the CPU-bound part and
    /// go wide through rayon.
    fn embed_images(&self, images: &[DynamicImage]) -> Result<Vec<Vec<f32>>, EncoderError> {
        use rayon::prelude::*;

        if images.is_empty() {
            return Ok(Vec::new());
        }

        let tensors: Vec<Tensor> = images
            .par_iter()
            .map(|img| preprocess_image(img, &Device::Cpu))
            .collect::<Result<Vec<_>, _>>()?;

        let batch = Tensor::stack(&tensors, 0).map_err(unavailable)?;

        let mean = Tensor::new(&CLIP_MEAN, &self.device)
            .and_then(|t| t.reshape((1, 3, 1, 1)))
            .map_err(unavailable)?;
        let std = Tensor::new(&CLIP_STD, &self.device)
            .and_then(|t| t.reshape((1, 3, 1, 1)))
            .map_err(unavailable)?;
        let batch_normalized = batch
            .broadcast_sub(&mean)
            .and_then(|t| t.broadcast_div(&std))
            .map_err(unavailable)?;

        let features = self
            .model
            .get_image_features(&batch_normalized)
            .map_err(unavailable)?;
        let normalized = normalize_tensor(&features)?;

        normalized.to_vec2().map_err(unavailable)
    }
}

/// Loads CLIP ViT-B/32 model and tokenizer from HuggingFace Hub.
fn load_clip_model(device: &Device, cache_dir: &Path) -> Result<(clip::ClipModel, Tokenizer), EncoderError> {
    let model_repo = hf_hub::api::sync::ApiBuilder::new()
        .with_cache_dir(cache_dir.to_path_buf())
        .build()
        .map_err(unavailable)?
        .repo(hf_hub::Repo::with_revision(
            CLIP_MODEL.into(),
            hf_hub::RepoType::Model,
            MODEL_REVISION.into(),
        ));

    let weights_filename = model_repo.get("model.safetensors").map_err(unavailable)?;
    let tokenizer_filename = model_repo.get("tokenizer.json").map_err(unavailable)?;

    let config = clip::ClipConfig::vit_base_patch32();
    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[weights_filename], DType::F32, device)
            .map_err(unavailable)?
    };

    let model = clip::ClipModel::new(vb, &config).map_err(unavailable)?;
    let tokenizer = Tokenizer::from_file(tokenizer_filename).map_err(unavailable)?;

    Ok((model, tokenizer))
}

/// Resizes and converts an image into a [3, 224, 224] pixel tensor in [0, 1].
fn preprocess_image(image: &DynamicImage, device: &Device) -> Result<Tensor, EncoderError> {
    let img = if image.width() == CLIP_IMAGE_SIZE && image.height() == CLIP_IMAGE_SIZE {
        image.clone()
    } else {
        image.resize_exact(
            CLIP_IMAGE_SIZE,
            CLIP_IMAGE_SIZE,
            image::imageops::FilterType::Triangle,
        )
    };

    let img_rgb = img.to_rgb8();

    let data: Vec<f32> = img_rgb
        .pixels()
        .flat_map(|p| {
            [
                (p[0] as f32) / 255.0,
                (p[1] as f32) / 255.0,
                (p[2] as f32) / 255.0,
            ]
        })
        .collect();

    Tensor::from_vec(
        data,
        (CLIP_IMAGE_SIZE as usize, CLIP_IMAGE_SIZE as usize, 3),
        device,
    )
    .and_then(|t| t.permute((2, 0, 1)))
    .map_err(unavailable)
}

/// Computes L2 normalization of a feature tensor along its last dimension.
fn normalize_tensor(tensor: &Tensor) -> Result<Tensor, EncoderError> {
    let dim = match tensor.rank() {
        1 => 0,
        2 => 1,
        r => {
            return Err(EncoderError::InvalidInput(format!(
                "unexpected tensor rank for normalization: {}",
                r
            )))
        }
    };
    let norm = tensor
        .sqr()
        .and_then(|t| t.sum_keepdim(dim))
        .and_then(|t| t.sqrt())
        .map_err(unavailable)?;
    tensor.broadcast_div(&norm).map_err(unavailable)
}

fn tensor_to_vec(tensor: &Tensor) -> Result<Vec<f32>, EncoderError> {
    tensor
        .flatten_all()
        .and_then(|t| t.to_vec1())
        .map_err(unavailable)
}
