//! Word and character level BPE tokenizer.
//!
//! Text is pre-segmented into single character units (whitespace and
//! sentence punctuation stand alone), mapped through the vocabulary and
//! merged in rule priority order. Decoding undoes the word boundary marker.

pub mod vocab;

pub use vocab::{Vocabulary, UNKNOWN_TOKEN, WORD_BOUNDARY};

use vocab::MergeTarget;

/// Encodes text into token ids and decodes ids back into text.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    vocab: Vocabulary,
}

impl Tokenizer {
    /// Create a tokenizer over a loaded vocabulary.
    pub fn new(vocab: Vocabulary) -> Self {
        Self { vocab }
    }

    /// The underlying vocabulary.
    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Encode text into a sequence of token ids.
    ///
    /// Units that are not in the vocabulary degrade to the unknown id, they
    /// never fail the encode.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        let mut ids: Vec<u32> = pretokenize(text)
            .iter()
            .map(|unit| self.vocab.id_of(&normalize(unit)))
            .collect();

        self.apply_merges(&mut ids);
        ids
    }

    /// Decode a sequence of token ids back into text.
    pub fn decode(&self, ids: &[u32]) -> String {
        let mut text = String::new();

        for &id in ids {
            for ch in self.vocab.token_of(id).chars() {
                text.push(if ch == WORD_BOUNDARY { ' ' } else { ch });
            }
        }

        collapse_spaces(&text)
    }

    /// Repeatedly merge the adjacent pair whose rule has the lowest rank
    /// until no pair is mergeable. On equal ranks the leftmost pair wins:
    /// a candidate only replaces the current best on a strictly lower rank.
    fn apply_merges(&self, ids: &mut Vec<u32>) {
        loop {
            let mut best: Option<(usize, MergeTarget)> = None;

            for at in 0..ids.len().saturating_sub(1) {
                let Some(merge) = self.vocab.merge_for(ids[at], ids[at + 1]) else {
                    continue;
                };
                if best.map_or(true, |(_, found)| merge.rank < found.rank) {
                    best = Some((at, merge));
                }
            }

            let Some((at, merge)) = best else {
                break;
            };

            ids[at] = merge.id;
            ids.remove(at + 1);
        }
    }
}

fn is_separator(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '.' | ',' | '!' | '?')
}

/// Split text into lookup units: whitespace and the punctuation set
/// {. , ! ?} stand alone, every other run is split into individual
/// characters. Deliberately not a full Unicode segmenter.
pub fn pretokenize(text: &str) -> Vec<String> {
    let mut units = Vec::new();
    let mut run = String::new();

    for ch in text.chars() {
        if is_separator(ch) {
            flush_run(&mut units, &mut run);
            units.push(ch.to_string());
        } else {
            run.push(ch);
        }
    }

    flush_run(&mut units, &mut run);
    units
}

fn flush_run(units: &mut Vec<String>, run: &mut String) {
    units.extend(run.chars().map(String::from));
    run.clear();
}

/// Replace literal spaces with the word boundary marker before lookup,
/// matching the "preceded by a space" spelling convention.
pub fn normalize(unit: &str) -> String {
    unit.chars()
        .map(|ch| if ch == ' ' { WORD_BOUNDARY } else { ch })
        .collect()
}

/// Collapse runs of adjacent spaces left behind by marker replacement at
/// token boundaries. Only literal spaces collapse, other whitespace is kept.
fn collapse_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;

    for ch in text.chars() {
        if ch == ' ' && last_was_space {
            continue;
        }
        last_was_space = ch == ' ';
        out.push(ch);
    }

    out
}
