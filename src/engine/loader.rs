//! Model and tokenizer loading from the Hugging Face hub

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use candle_core::quantized::gguf_file;
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::{gemma2, quantized_llama};
use hf_hub::api::sync::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::core::config::TranslatorConfig;
use crate::core::errors::{Result, TranslationError};
use crate::core::models::LoadStrategy;
use crate::engine::generator::{CandleGenerator, ModelWeights};
use crate::engine::tokenizer::{eos_tokens, load_tokenizer};

/// A ready generator plus the tokenizer used for prompt chunking
pub struct LoadedModel {
    pub generator: CandleGenerator,
    pub tokenizer: Arc<Tokenizer>,
}

/// Pick the compute device
pub fn select_device(force_cpu: bool) -> Result<Device> {
    if force_cpu {
        return Ok(Device::Cpu);
    }
    let device = Device::cuda_if_available(0)?;
    if device.is_cpu() {
        info!("No accelerator available, running on CPU");
    }
    Ok(device)
}

/// Load the configured model with its tokenizer
pub fn load(config: &TranslatorConfig) -> Result<LoadedModel> {
    let start = Instant::now();
    let device = select_device(config.force_cpu)?;
    let api = hub_api(config)?;

    info!(
        "Loading {} ({} strategy) on {:?}",
        config.model_id, config.load_strategy, device
    );

    let tokenizer_repo = api.repo(Repo::with_revision(
        config.tokenizer_repo().to_string(),
        RepoType::Model,
        config.revision.clone(),
    ));
    let tokenizer = Arc::new(load_tokenizer(&tokenizer_repo.get("tokenizer.json")?)?);
    let eos = eos_tokens(&tokenizer);
    if eos.is_empty() {
        return Err(TranslationError::TokenizerError {
            message: "tokenizer defines no end-of-sequence token".to_string(),
        });
    }

    let (model, context_length) = match config.load_strategy {
        LoadStrategy::Memory => load_memory(&api, config, &device)?,
        LoadStrategy::Quantized => load_quantized(&api, config, &device)?,
    };

    info!(
        "Model loaded in {:?} (context: {})",
        start.elapsed(),
        context_length
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    );

    let generator = CandleGenerator::new(
        model,
        Arc::clone(&tokenizer),
        device,
        config.model_id.clone(),
        eos,
        context_length,
    );

    Ok(LoadedModel {
        generator,
        tokenizer,
    })
}

fn hub_api(config: &TranslatorConfig) -> Result<Api> {
    Ok(ApiBuilder::new()
        .with_token(config.hf_token.clone())
        .with_progress(true)
        .build()?)
}

/// Safetensors weights in reduced precision, memory-mapped
#[allow(unsafe_code)]
fn load_memory(
    api: &Api,
    config: &TranslatorConfig,
    device: &Device,
) -> Result<(ModelWeights, Option<usize>)> {
    let repo = api.repo(Repo::with_revision(
        config.model_id.clone(),
        RepoType::Model,
        config.revision.clone(),
    ));

    let config_path = repo.get("config.json")?;
    let model_config: gemma2::Config = serde_json::from_slice(&std::fs::read(&config_path)?)
        .map_err(|e| TranslationError::ModelLoadError {
            message: format!("{}: {}", config_path.display(), e),
        })?;

    let weights = hub_safetensors(&repo)?;
    let dtype = if device.is_cuda() { DType::BF16 } else { DType::F32 };
    debug!("Mapping {} weight file(s) as {:?}", weights.len(), dtype);

    // Safety: the mapped files come from the hub cache and are not modified while loaded
    let vb = unsafe { VarBuilder::from_mmaped_safetensors(&weights, dtype, device)? };
    let model = gemma2::Model::new(config.use_flash_attn, &model_config, vb)?;

    Ok((
        ModelWeights::Gemma2(model),
        Some(model_config.max_position_embeddings),
    ))
}

/// 4-bit GGUF weights
fn load_quantized(
    api: &Api,
    config: &TranslatorConfig,
    device: &Device,
) -> Result<(ModelWeights, Option<usize>)> {
    let (Some(gguf_repo), Some(gguf_file_name)) = (&config.gguf_repo, &config.gguf_file) else {
        return Err(TranslationError::ConfigError {
            message: "quantized loading requires gguf_repo and gguf_file".to_string(),
        });
    };

    let path = api.model(gguf_repo.clone()).get(gguf_file_name)?;
    let mut file = std::fs::File::open(&path).map_err(|e| TranslationError::FileError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let content = gguf_file::Content::read(&mut file).map_err(|e| e.with_path(&path))?;

    check_gguf_architecture(&content.metadata)?;
    let context_length = gguf_context_length(&content.metadata);

    debug!(
        "GGUF {} holds {} tensors",
        path.display(),
        content.tensor_infos.len()
    );

    let model = quantized_llama::ModelWeights::from_gguf(content, &mut file, device)?;
    Ok((ModelWeights::Quantized(model), context_length))
}

/// Quantized loading reads `llama.*` hyperparameters only
fn check_gguf_architecture(metadata: &HashMap<String, gguf_file::Value>) -> Result<()> {
    match metadata
        .get("general.architecture")
        .and_then(|value| value.to_string().ok())
    {
        Some(architecture) if architecture != "llama" => Err(TranslationError::ModelLoadError {
            message: format!("unsupported GGUF architecture {}, expected llama", architecture),
        }),
        _ => Ok(()),
    }
}

/// Usable context of a GGUF llama, capped by the rotary table the model builds
fn gguf_context_length(metadata: &HashMap<String, gguf_file::Value>) -> Option<usize> {
    metadata
        .get("llama.context_length")
        .and_then(|value| value.to_u32().ok())
        .map(|n| (n as usize).min(quantized_llama::MAX_SEQ_LEN))
}

/// Resolve sharded weights through the index file, or the single file
fn hub_safetensors(repo: &ApiRepo) -> Result<Vec<PathBuf>> {
    let index_path = match repo.get("model.safetensors.index.json") {
        Ok(path) => path,
        Err(_) => return Ok(vec![repo.get("model.safetensors")?]),
    };

    let index: serde_json::Value = serde_json::from_slice(&std::fs::read(&index_path)?)?;
    let shards = shard_names(&index)?;
    shards
        .iter()
        .map(|name| repo.get(name).map_err(TranslationError::from))
        .collect()
}

/// Unique shard file names listed in a safetensors index
fn shard_names(index: &serde_json::Value) -> Result<BTreeSet<String>> {
    let weight_map = index
        .get("weight_map")
        .and_then(|map| map.as_object())
        .ok_or_else(|| TranslationError::ModelLoadError {
            message: "safetensors index has no weight_map".to_string(),
        })?;

    Ok(weight_map
        .values()
        .filter_map(|file| file.as_str().map(str::to_string))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_names_deduplicated() {
        let index = serde_json::json!({
            "metadata": { "total_size": 1 },
            "weight_map": {
                "model.embed_tokens.weight": "model-00001-of-00002.safetensors",
                "model.layers.0.mlp.up_proj.weight": "model-00001-of-00002.safetensors",
                "model.norm.weight": "model-00002-of-00002.safetensors"
            }
        });

        let shards: Vec<String> = shard_names(&index).unwrap().into_iter().collect();
        assert_eq!(
            shards,
            vec![
                "model-00001-of-00002.safetensors".to_string(),
                "model-00002-of-00002.safetensors".to_string()
            ]
        );
    }

    #[test]
    fn test_shard_names_missing_map() {
        let index = serde_json::json!({ "metadata": {} });
        assert!(matches!(
            shard_names(&index),
            Err(TranslationError::ModelLoadError { .. })
        ));
    }

    fn gguf_metadata(entries: &[(&str, gguf_file::Value)]) -> HashMap<String, gguf_file::Value> {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_gguf_context_capped() {
        let metadata = gguf_metadata(&[("llama.context_length", gguf_file::Value::U32(32_768))]);
        assert_eq!(
            gguf_context_length(&metadata),
            Some(quantized_llama::MAX_SEQ_LEN)
        );

        let metadata = gguf_metadata(&[("llama.context_length", gguf_file::Value::U32(2048))]);
        assert_eq!(gguf_context_length(&metadata), Some(2048));

        assert_eq!(gguf_context_length(&HashMap::new()), None);
    }

    #[test]
    fn test_gguf_architecture_checked() {
        let llama = gguf_metadata(&[(
            "general.architecture",
            gguf_file::Value::String("llama".to_string()),
        )]);
        assert!(check_gguf_architecture(&llama).is_ok());

        let gemma = gguf_metadata(&[(
            "general.architecture",
            gguf_file::Value::String("gemma2".to_string()),
        )]);
        assert!(matches!(
            check_gguf_architecture(&gemma),
            Err(TranslationError::ModelLoadError { .. })
        ));
    }

    #[test]
    fn test_forced_cpu_device() {
        assert!(select_device(true).unwrap().is_cpu());
    }
}
