use crate::config::CardSearchDirs;
use crate::traits::TextEncoder;
use anyhow::{Result, anyhow};
use fastembed::{
    InitOptions, InitOptionsUserDefined, TextEmbedding, TokenizerFiles, UserDefinedEmbeddingModel,
};
use log::{debug, info};
use std::{fs, path::PathBuf};

/// Sentence-embedding model used for smart search and for embedding cards on ingest.
///
/// Loads a FastEmbed model (AllMiniLML6V2 by default, 384 dimensions) or a
/// local ONNX export with its tokenizer files. Built once and shared across
/// threads; encodes may run concurrently.
pub struct LocalEmbedder {
    model: TextEmbedding,
}

impl LocalEmbedder {
    /// Creates a new embedder with the specified model or default AllMiniLML6V2.
    /// If cache_dir is provided, uses that; otherwise uses CardSearchDirs default.
    pub fn new(
        model_name: Option<fastembed::EmbeddingModel>,
        cache_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let model_name = model_name.unwrap_or(fastembed::EmbeddingModel::AllMiniLML6V2);

        let cache_dir = match cache_dir {
            Some(dir) => dir,
            None => CardSearchDirs::new().ensure_cache_dir()?,
        };

        let init_options = InitOptions::new(model_name.clone()).with_cache_dir(cache_dir);
        let model = TextEmbedding::try_new(init_options)?;

        info!("Initialized embedding model: {:?}", model_name);

        Ok(LocalEmbedder { model })
    }

    /// Creates a new embedder from a local ONNX model.
    ///
    /// `tokenizer_dir` must contain tokenizer.json, config.json,
    /// special_tokens_map.json and tokenizer_config.json.
    pub fn new_with_local_model(
        onnx_model_path: PathBuf,
        tokenizer_dir: PathBuf,
        max_length: Option<usize>,
    ) -> Result<Self> {
        let onnx_file = fs::read(&onnx_model_path).map_err(|e| {
            anyhow!("Failed to read ONNX model from {:?}: {}", onnx_model_path, e)
        })?;

        let read_tokenizer_file = |name: &str| {
            fs::read(tokenizer_dir.join(name))
                .map_err(|e| anyhow!("Failed to read {} from {:?}: {}", name, tokenizer_dir, e))
        };
        let tokenizer_files = TokenizerFiles {
            tokenizer_file: read_tokenizer_file("tokenizer.json")?,
            config_file: read_tokenizer_file("config.json")?,
            special_tokens_map_file: read_tokenizer_file("special_tokens_map.json")?,
            tokenizer_config_file: read_tokenizer_file("tokenizer_config.json")?,
        };

        let user_defined_model = UserDefinedEmbeddingModel::new(onnx_file, tokenizer_files);

        let mut init_options = InitOptionsUserDefined::new();
        if let Some(max_len) = max_length {
            init_options = init_options.with_max_length(max_len);
        }

        let model = TextEmbedding::try_new_from_user_defined(user_defined_model, init_options)?;

        info!(
            "Initialized local embedding model from {:?} with tokenizer from {:?}",
            onnx_model_path, tokenizer_dir
        );

        Ok(LocalEmbedder { model })
    }

    /// Creates a new embedder with the default model and default cache directory.
    pub fn new_with_default_model() -> Result<Self> {
        Self::new(None, None)
    }

    /// Embeds a single text string and returns a normalized vector.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.model.embed(vec![text], None)?;
        embeddings
            .into_iter()
            .next()
            .map(|x| Self::normalize_l2(&x))
            .ok_or_else(|| anyhow!("Failed to get embedding"))
    }

    /// Embeds multiple text strings and returns normalized vectors.
    pub fn embed_batch(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        let embeddings = self.model.embed(texts, None)?;
        Ok(embeddings.iter().map(|e| Self::normalize_l2(e)).collect())
    }

    /// Normalizes an embedding vector using L2 normalization.
    pub fn normalize_l2(embedding: &[f32]) -> Vec<f32> {
        let norm = (embedding.iter().map(|x| x * x).sum::<f32>()).sqrt();
        if norm < 1e-5 {
            debug!(
                "Embedding norm {} is less than 1e-5, returning original embedding",
                norm
            );
            embedding.to_vec()
        } else {
            embedding.iter().map(|x| x / norm).collect()
        }
    }
}

impl TextEncoder for LocalEmbedder {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_text(text)
    }

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.embed_batch(texts.to_vec())
    }
}
