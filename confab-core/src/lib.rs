//! This is the core library where all confab logic is implemented.
//!
//! A question is wrapped in turn markup, encoded with a byte/word level BPE
//! tokenizer, fed iteratively into an opaque inference session and the
//! produced token ids are decoded back into streamed text.

use clap::Parser;

pub mod chat;
pub mod error;
pub mod generation;
pub mod session;
pub mod tokenizer;
pub mod utils;

pub use error::{Error, Result};
pub use generation::{Generation, GenerationOptions, GenerationStatus, Generator, StopSignal};
pub use session::InferenceSession;
pub use tokenizer::{Tokenizer, Vocabulary};

#[derive(Clone, Parser, Default, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// GPU device index.
    #[arg(long, default_value_t = 0)]
    pub device: usize,
    /// Model data path (config.json, tokenizer.json and safetensors).
    #[arg(long, default_value = "./confab-data/gemma-2b-it/")]
    pub model: String,
    /// The question to ask.
    #[arg(long, default_value = "Why is the sky blue?")]
    pub question: String,
    /// The maximum number of new tokens to generate.
    #[arg(short = 'n', long, default_value_t = generation::DEFAULT_MAX_NEW_TOKENS)]
    pub max_new_tokens: usize,
    /// Per step timeout in seconds, unlimited if omitted.
    #[arg(long)]
    pub step_timeout: Option<u64>,
    /// Use different dtype than the device default.
    #[arg(long)]
    pub dtype: Option<String>,
    /// Run on CPU rather than on GPU.
    #[arg(long, default_value_t = false)]
    pub cpu: bool,
}
