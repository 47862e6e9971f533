//! Edge adapter serving the session contract from a local Gemma checkpoint.

use std::path::PathBuf;

use async_trait::async_trait;
use candle_core::Device;
use candle_transformers::models::gemma::{Config, Model};

use super::{Feeds, InferenceSession, Outputs, INPUT_IDS, LOGITS};
use crate::error::{Error, Result};
use crate::utils;
use crate::Args;

/// A locally loaded Gemma checkpoint behind the [`InferenceSession`]
/// contract.
pub struct GemmaSession {
    model: Model,
    device: Device,
}

impl GemmaSession {
    /// Load the checkpoint (config.json plus safetensors) from the model
    /// data path.
    pub fn load(args: &Args) -> Result<Self> {
        let device = utils::inference_device(args.cpu, args.device)?;
        let dtype = utils::parse_dtype(args.dtype.as_deref(), &device)?;
        let data_path = PathBuf::from(&args.model);

        let config_path = data_path.join("config.json");
        log::info!("loading model configuration from {}", config_path.display());
        let raw = std::fs::read_to_string(&config_path).map_err(|e| Error::load(e, &config_path))?;
        let config: Config = serde_json::from_str(&raw)?;

        let var_builder = utils::var_builder_from_path(&data_path, dtype, &device)?;
        let model = Model::new(false, &config, var_builder)?;

        log::info!(
            "model loaded - mem={}",
            human_bytes::human_bytes(memory_stats::memory_stats().unwrap().physical_mem as f64)
        );

        Ok(Self { model, device })
    }
}

#[async_trait]
impl InferenceSession for GemmaSession {
    fn device(&self) -> &Device {
        &self.device
    }

    async fn run(&mut self, feeds: Feeds) -> Result<Outputs> {
        let ids = feeds
            .get(INPUT_IDS)
            .ok_or_else(|| Error::inference("feeds have no input_ids tensor"))?;

        // The whole sequence is recomputed on every step; the attention mask
        // and position feeds are implicit in the forward pass.
        self.model.clear_kv_cache();
        let logits = self.model.forward(ids, 0)?;

        let mut outputs = Outputs::with_capacity(1);
        outputs.insert(LOGITS.to_string(), logits);
        Ok(outputs)
    }
}
