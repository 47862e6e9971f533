//! The opaque model inference capability and its wire contract.
//!
//! A session takes a mapping of named integer tensors and returns a mapping
//! of named output tensors. Loading and initializing the capability happens
//! outside the generation core; [`gemma::GemmaSession`] is the bundled edge
//! adapter.

pub mod gemma;

use std::collections::HashMap;

use async_trait::async_trait;
use candle_core::{DType, Device, IndexOp, Tensor};

use crate::error::{Error, Result};

/// Feed name of the token id tensor.
pub const INPUT_IDS: &str = "input_ids";
/// Feed name of the attention mask tensor.
pub const ATTENTION_MASK: &str = "attention_mask";
/// Feed name of the position index tensor.
pub const POSITION_IDS: &str = "position_ids";
/// Output name of the logits tensor.
pub const LOGITS: &str = "logits";

/// Named input tensors submitted to a session.
pub type Feeds = HashMap<&'static str, Tensor>;
/// Named output tensors returned by a session.
pub type Outputs = HashMap<String, Tensor>;

/// An opaque model inference capability.
#[async_trait]
pub trait InferenceSession: Send {
    /// The device input tensors must be allocated on.
    fn device(&self) -> &Device;

    /// Run one forward pass over the feeds and return the named outputs,
    /// including a `logits` tensor shaped `[1, seq, vocab]`.
    async fn run(&mut self, feeds: Feeds) -> Result<Outputs>;
}

/// Build the three equal length `[1, len]` feeds from the current token
/// sequence: ids, an all ones attention mask and 0-based position indices.
pub fn feeds_from_tokens(tokens: &[u32], device: &Device) -> Result<Feeds> {
    if tokens.is_empty() {
        return Err(Error::inference(
            "can't build feeds from an empty token sequence",
        ));
    }

    let len = tokens.len();
    let ids: Vec<i64> = tokens.iter().map(|&id| i64::from(id)).collect();
    let mask = vec![1i64; len];
    let positions: Vec<i64> = (0..len as i64).collect();

    let mut feeds = Feeds::with_capacity(3);
    feeds.insert(INPUT_IDS, Tensor::from_vec(ids, (1, len), device)?);
    feeds.insert(ATTENTION_MASK, Tensor::from_vec(mask, (1, len), device)?);
    feeds.insert(POSITION_IDS, Tensor::from_vec(positions, (1, len), device)?);

    Ok(feeds)
}

/// Validate the session outputs and extract the last position's logits as
/// plain f32 scores.
///
/// The logits tensor must be shaped `[1, seq, vocab]` with `1 <= seq <=
/// context_len`; sessions that keep their own KV cache may return only a
/// suffix of positions.
pub fn last_position_logits(outputs: &Outputs, context_len: usize) -> Result<Vec<f32>> {
    let logits = outputs
        .get(LOGITS)
        .ok_or_else(|| Error::inference("session output has no logits tensor"))?;

    let (batch, seq, vocab) = logits.dims3().map_err(|_| {
        Error::inference(format!(
            "logits tensor has shape {:?} instead of [1, seq, vocab]",
            logits.dims()
        ))
    })?;

    if batch != 1 {
        return Err(Error::inference(format!(
            "logits batch dimension is {batch} instead of 1"
        )));
    }
    if seq == 0 || seq > context_len {
        return Err(Error::inference(format!(
            "logits cover {seq} positions for a context of {context_len}"
        )));
    }
    if vocab == 0 {
        return Err(Error::inference("logits vocabulary dimension is empty"));
    }

    let last = logits.i((0, seq - 1, ..))?.to_dtype(DType::F32)?;
    Ok(last.to_vec1::<f32>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs_with_logits(data: Vec<f32>, shape: (usize, usize, usize)) -> Outputs {
        let mut outputs = Outputs::new();
        outputs.insert(
            LOGITS.to_string(),
            Tensor::from_vec(data, shape, &Device::Cpu).unwrap(),
        );
        outputs
    }

    #[test]
    fn feeds_cover_ids_mask_and_positions() {
        let feeds = feeds_from_tokens(&[5, 6, 7], &Device::Cpu).unwrap();

        assert_eq!(
            feeds[INPUT_IDS].to_vec2::<i64>().unwrap(),
            vec![vec![5, 6, 7]]
        );
        assert_eq!(
            feeds[ATTENTION_MASK].to_vec2::<i64>().unwrap(),
            vec![vec![1, 1, 1]]
        );
        assert_eq!(
            feeds[POSITION_IDS].to_vec2::<i64>().unwrap(),
            vec![vec![0, 1, 2]]
        );
    }

    #[test]
    fn an_empty_sequence_is_rejected() {
        assert!(feeds_from_tokens(&[], &Device::Cpu).is_err());
    }

    #[test]
    fn the_last_position_is_extracted() {
        let outputs = outputs_with_logits(vec![0., 1., 2., 3., 4., 5.], (1, 2, 3));
        assert_eq!(
            last_position_logits(&outputs, 2).unwrap(),
            vec![3., 4., 5.]
        );
    }

    #[test]
    fn suffix_logits_are_accepted() {
        let outputs = outputs_with_logits(vec![7., 8.], (1, 1, 2));
        assert_eq!(last_position_logits(&outputs, 4).unwrap(), vec![7., 8.]);
    }

    #[test]
    fn missing_logits_are_rejected() {
        assert!(last_position_logits(&Outputs::new(), 3).is_err());
    }

    #[test]
    fn wrong_rank_logits_are_rejected() {
        let mut outputs = Outputs::new();
        outputs.insert(
            LOGITS.to_string(),
            Tensor::from_vec(vec![0f32, 1.], (1, 2), &Device::Cpu).unwrap(),
        );
        assert!(last_position_logits(&outputs, 2).is_err());
    }

    #[test]
    fn batched_logits_are_rejected() {
        let outputs = outputs_with_logits(vec![0.; 8], (2, 2, 2));
        assert!(last_position_logits(&outputs, 2).is_err());
    }

    #[test]
    fn more_positions_than_context_are_rejected() {
        let outputs = outputs_with_logits(vec![0.; 6], (1, 3, 2));
        assert!(last_position_logits(&outputs, 2).is_err());
    }
}
