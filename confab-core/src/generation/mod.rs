//! Autoregressive greedy decoding over an [`InferenceSession`].
//!
//! One request runs sequentially end to end: the prompt is encoded once,
//! then every step rebuilds the feeds from the full sequence, runs the
//! session, picks the argmax of the last position and decodes exactly one
//! id. The loop owns nothing across requests; session and tokenizer are
//! borrowed from the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::chat;
use crate::error::{Error, Result};
use crate::session::{self, InferenceSession};
use crate::tokenizer::Tokenizer;

/// Default cap on generated tokens per request.
pub const DEFAULT_MAX_NEW_TOKENS: usize = 150;

/// A generated token.
#[derive(Debug, Clone)]
pub struct Token {
    /// Numerical identifier.
    pub id: u32,
    /// Rendered text.
    pub text: String,
    /// Set to true when the rendered text is the end-of-turn marker.
    pub is_end_of_turn: bool,
}

/// Knobs of a generation request.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Stop after this many accepted tokens with no end signal.
    pub max_new_tokens: usize,
    /// Rendered text that signals the end of the model turn.
    pub end_of_turn: String,
    /// Abort a single step after this long, unlimited when `None`.
    pub step_timeout: Option<Duration>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            end_of_turn: chat::END_OF_TURN.to_string(),
            step_timeout: None,
        }
    }
}

/// Why a generation stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationStatus {
    /// The model produced the end-of-turn marker.
    End,
    /// The step cap was reached with no end signal.
    MaxSteps,
    /// The caller requested a stop.
    Cancelled,
    /// A step failed; the text streamed so far is still valid.
    Failed(String),
}

/// Outcome of one generation request.
#[derive(Debug, Clone)]
pub struct Generation {
    /// Cumulative decoded text.
    pub text: String,
    /// Number of accepted steps.
    pub steps: usize,
    /// Terminal status.
    pub status: GenerationStatus,
}

/// Cloneable cooperative stop handle.
///
/// Checked at the top of every iteration; an in-flight session call is
/// allowed to finish before the stop takes effect.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Request the generation to stop.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// True once a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per request state, discarded when the request completes.
struct GenerationState {
    tokens: Vec<u32>,
    text: String,
    steps: usize,
}

impl GenerationState {
    fn new(tokens: Vec<u32>) -> Self {
        Self {
            tokens,
            text: String::new(),
            steps: 0,
        }
    }

    /// Accept a generated token: the sequence grows by exactly one id.
    fn accept(&mut self, token: Token) {
        self.text += &token.text;
        self.tokens.push(token.id);
        self.steps += 1;
    }
}

/// Drives the decoding loop over borrowed session and tokenizer handles.
pub struct Generator<'a, S> {
    session: &'a mut S,
    tokenizer: &'a Tokenizer,
    options: GenerationOptions,
    stop: StopSignal,
}

impl<'a, S: InferenceSession> Generator<'a, S> {
    /// Create a generator for one or more sequential requests.
    pub fn new(session: &'a mut S, tokenizer: &'a Tokenizer, options: GenerationOptions) -> Self {
        Self {
            session,
            tokenizer,
            options,
            stop: StopSignal::default(),
        }
    }

    /// A stop handle for this generator, to hand to another task.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Run one full generation for the prompt, calling `stream` with every
    /// accepted fragment and once with `""` when the stream ends.
    ///
    /// Inference failures end the request with [`GenerationStatus::Failed`];
    /// fragments already streamed remain valid.
    pub async fn generate<F>(&mut self, prompt: &str, mut stream: F) -> Generation
    where
        F: FnMut(&str),
    {
        let mut state = GenerationState::new(self.tokenizer.encode(prompt));

        log::debug!("prompt encoded to {} ids", state.tokens.len());

        let status = loop {
            if self.stop.is_stopped() {
                break GenerationStatus::Cancelled;
            }
            if state.steps >= self.options.max_new_tokens {
                break GenerationStatus::MaxSteps;
            }

            let token = match self.step(&state.tokens).await {
                Ok(token) => token,
                Err(e) => break GenerationStatus::Failed(e.to_string()),
            };

            log::trace!("step {}: {} {:?}", state.steps, token.id, token.text);

            if token.is_end_of_turn {
                break GenerationStatus::End;
            }

            stream(&token.text);
            state.accept(token);
        };

        // signal end of stream
        stream("");

        Generation {
            text: state.text,
            steps: state.steps,
            status,
        }
    }

    /// One decoding step over the current sequence. Does not mutate the
    /// sequence; the caller appends accepted ids.
    async fn step(&mut self, context: &[u32]) -> Result<Token> {
        let feeds = session::feeds_from_tokens(context, self.session.device())?;

        let run = self.session.run(feeds);
        let outputs = match self.options.step_timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| Error::inference(format!("inference step exceeded {limit:?}")))??,
            None => run.await?,
        };

        let scores = session::last_position_logits(&outputs, context.len())?;
        let id = argmax(&scores);
        let text = self.tokenizer.decode(&[id]);
        let is_end_of_turn = text == self.options.end_of_turn;

        Ok(Token {
            id,
            text,
            is_end_of_turn,
        })
    }
}

/// Index of the strictly maximal score; the leftmost wins on ties.
fn argmax(scores: &[f32]) -> u32 {
    let mut best = 0usize;
    let mut best_score = f32::NEG_INFINITY;

    for (index, &score) in scores.iter().enumerate() {
        if score > best_score {
            best_score = score;
            best = index;
        }
    }

    best as u32
}
