//! Vocabulary model: the token table and merge rules loaded from a
//! tokenizer artifact, immutable for the lifetime of the process.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use crate::error::{Error, Result};

/// Spelling of the reserved unknown token.
pub const UNKNOWN_TOKEN: &str = "<unk>";

/// Marker used in vocabulary spellings for "preceded by a space".
pub const WORD_BOUNDARY: char = '\u{2581}';

/// A single merge rule; its priority is its position in the rule list,
/// lower index means applied first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRule {
    /// Left side spelling.
    pub left: String,
    /// Right side spelling.
    pub right: String,
}

/// Resolution of a mergeable id pair.
#[derive(Debug, Clone, Copy)]
pub struct MergeTarget {
    /// Position of the rule in the ordered merge list.
    pub rank: usize,
    /// Id of the concatenated spelling.
    pub id: u32,
}

/// Immutable token↔id table plus the ordered merge rules.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    token_to_id: HashMap<String, u32>,
    id_to_token: HashMap<u32, String>,
    merges: Vec<MergeRule>,
    merge_table: HashMap<(u32, u32), MergeTarget>,
    unknown_id: u32,
}

impl Vocabulary {
    /// Load the vocabulary artifact from a tokenizer.json file.
    pub fn from_path(path: &Path) -> Result<Self> {
        log::info!("loading vocabulary from {}", path.display());

        let data = std::fs::read_to_string(path).map_err(|e| Error::load(e, path))?;
        let artifact: Value = serde_json::from_str(&data)?;

        Self::from_artifact(&artifact)
    }

    /// Build the vocabulary from a parsed artifact document.
    pub fn from_artifact(artifact: &Value) -> Result<Self> {
        let model = artifact
            .get("model")
            .ok_or_else(|| Error::config("artifact has no model section"))?;

        let vocab = match model.get("vocab") {
            Some(Value::Object(map)) => map,
            Some(_) => return Err(Error::config("model.vocab is not a map")),
            None => return Err(Error::config("model.vocab is missing")),
        };

        let mut tokens = HashMap::with_capacity(vocab.len());
        for (token, id) in vocab {
            let id = id
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| {
                    Error::config(format!("id of token {token:?} is not a non-negative integer"))
                })?;
            tokens.insert(token.clone(), id);
        }

        let merges = match model.get("merges") {
            Some(Value::Array(list)) => list,
            Some(_) => return Err(Error::config("model.merges is not a list")),
            None => return Err(Error::config("model.merges is missing")),
        };

        let mut rules = Vec::with_capacity(merges.len());
        for rule in merges {
            let rule = rule
                .as_str()
                .ok_or_else(|| Error::config(format!("merge rule {rule} is not a string")))?;
            rules.push(rule.to_string());
        }

        Self::from_parts(tokens, rules)
    }

    /// Build the vocabulary from its raw parts: a token→id map and the
    /// ordered list of `"left right"` rules.
    pub fn from_parts(tokens: HashMap<String, u32>, rules: Vec<String>) -> Result<Self> {
        let unknown_id = *tokens
            .get(UNKNOWN_TOKEN)
            .ok_or_else(|| Error::config(format!("vocabulary has no {UNKNOWN_TOKEN} entry")))?;

        let mut id_to_token = HashMap::with_capacity(tokens.len());
        for (token, id) in &tokens {
            id_to_token.insert(*id, token.clone());
        }

        let mut merges = Vec::with_capacity(rules.len());
        let mut merge_table = HashMap::new();

        for (rank, rule) in rules.iter().enumerate() {
            let (left, right) = match rule.split_once(' ') {
                Some((left, right))
                    if !left.is_empty() && !right.is_empty() && !right.contains(' ') =>
                {
                    (left, right)
                }
                _ => return Err(Error::config(format!("malformed merge rule {rule:?}"))),
            };

            // A rule whose sides are not vocabulary spellings can never match
            // an id pair; it keeps its rank slot but never enters the table.
            // A duplicated rule keeps its first, lower rank.
            if let (Some(&lid), Some(&rid)) = (tokens.get(left), tokens.get(right)) {
                let merged = tokens
                    .get(&format!("{left}{right}"))
                    .copied()
                    .unwrap_or(unknown_id);
                merge_table
                    .entry((lid, rid))
                    .or_insert(MergeTarget { rank, id: merged });
            }

            merges.push(MergeRule {
                left: left.to_string(),
                right: right.to_string(),
            });
        }

        log::debug!(
            "vocabulary ready: {} tokens, {} merge rules",
            tokens.len(),
            merges.len()
        );

        Ok(Self {
            token_to_id: tokens,
            id_to_token,
            merges,
            merge_table,
            unknown_id,
        })
    }

    /// Id of the given spelling, or the unknown id if absent.
    pub fn id_of(&self, token: &str) -> u32 {
        self.token_to_id
            .get(token)
            .copied()
            .unwrap_or(self.unknown_id)
    }

    /// Spelling of the given id, or the unknown sentinel if absent.
    pub fn token_of(&self, id: u32) -> &str {
        self.token(id).unwrap_or(UNKNOWN_TOKEN)
    }

    /// Spelling of the given id if it is part of the vocabulary.
    pub fn token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(&id).map(String::as_str)
    }

    /// Highest priority merge for the given adjacent id pair.
    pub fn merge_for(&self, left: u32, right: u32) -> Option<MergeTarget> {
        self.merge_table.get(&(left, right)).copied()
    }

    /// The reserved unknown token id.
    pub fn unknown_id(&self) -> u32 {
        self.unknown_id
    }

    /// The ordered merge rules.
    pub fn merges(&self) -> &[MergeRule] {
        &self.merges
    }

    /// Number of known spellings.
    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    /// True when the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(pairs: &[(&str, u32)]) -> HashMap<String, u32> {
        pairs
            .iter()
            .map(|(token, id)| (token.to_string(), *id))
            .collect()
    }

    fn rules(list: &[&str]) -> Vec<String> {
        list.iter().map(|rule| rule.to_string()).collect()
    }

    #[test]
    fn missing_unknown_entry_is_a_config_error() {
        let err = Vocabulary::from_parts(entries(&[("a", 1)]), vec![]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn malformed_merge_rules_are_config_errors() {
        for rule in ["ab", "a b c", " b", "a "] {
            let err = Vocabulary::from_parts(
                entries(&[(UNKNOWN_TOKEN, 0), ("a", 1), ("b", 2)]),
                rules(&[rule]),
            )
            .unwrap_err();
            assert!(matches!(err, Error::Config(_)), "rule {rule:?}");
        }
    }

    #[test]
    fn lookups_fall_back_to_the_unknown_entry() {
        let vocab =
            Vocabulary::from_parts(entries(&[(UNKNOWN_TOKEN, 0), ("a", 1)]), vec![]).unwrap();
        assert_eq!(vocab.id_of("a"), 1);
        assert_eq!(vocab.id_of("missing"), 0);
        assert_eq!(vocab.token_of(1), "a");
        assert_eq!(vocab.token_of(99), UNKNOWN_TOKEN);
        assert_eq!(vocab.unknown_id(), 0);
    }

    #[test]
    fn duplicated_rules_keep_their_first_rank() {
        let vocab = Vocabulary::from_parts(
            entries(&[(UNKNOWN_TOKEN, 0), ("a", 1), ("b", 2), ("ab", 3)]),
            rules(&["a b", "a b"]),
        )
        .unwrap();

        let merge = vocab.merge_for(1, 2).unwrap();
        assert_eq!(merge.rank, 0);
        assert_eq!(merge.id, 3);
        assert_eq!(vocab.merges().len(), 2);
    }

    #[test]
    fn rules_with_unknown_spellings_never_match() {
        let vocab = Vocabulary::from_parts(
            entries(&[(UNKNOWN_TOKEN, 0), ("a", 1), ("b", 2)]),
            rules(&["a x"]),
        )
        .unwrap();
        assert!(vocab.merge_for(1, 2).is_none());
        assert_eq!(vocab.merges().len(), 1);
    }

    #[test]
    fn merges_without_a_merged_spelling_degrade_to_unknown() {
        let vocab = Vocabulary::from_parts(
            entries(&[(UNKNOWN_TOKEN, 7), ("a", 1), ("b", 2)]),
            rules(&["a b"]),
        )
        .unwrap();
        assert_eq!(vocab.merge_for(1, 2).unwrap().id, 7);
    }

    #[test]
    fn artifact_parses_vocab_and_merges() {
        let doc = json!({
            "model": {
                "vocab": { "<unk>": 0, "a": 1, "b": 2, "ab": 3 },
                "merges": ["a b"],
            }
        });

        let vocab = Vocabulary::from_artifact(&doc).unwrap();
        assert_eq!(vocab.len(), 4);
        assert_eq!(vocab.id_of("ab"), 3);
        assert_eq!(vocab.merge_for(1, 2).unwrap().rank, 0);
    }

    #[test]
    fn artifact_missing_sections_are_config_errors() {
        let docs = [
            json!({}),
            json!({ "model": {} }),
            json!({ "model": { "vocab": {} } }),
            json!({ "model": { "vocab": 3, "merges": [] } }),
            json!({ "model": { "vocab": {}, "merges": "a b" } }),
            json!({ "model": { "vocab": { "a": "one" }, "merges": [] } }),
            json!({ "model": { "vocab": { "a": -1 }, "merges": [] } }),
        ];

        for doc in docs {
            let err = Vocabulary::from_artifact(&doc).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "doc {doc}");
        }
    }

    #[test]
    fn unreachable_artifact_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Vocabulary::from_path(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
    }

    #[test]
    fn artifact_loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        std::fs::write(
            &path,
            r#"{ "model": { "vocab": { "<unk>": 0, "hi": 1 }, "merges": [] } }"#,
        )
        .unwrap();

        let vocab = Vocabulary::from_path(&path).unwrap();
        assert_eq!(vocab.id_of("hi"), 1);
    }

    #[test]
    fn syntactically_broken_artifact_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Vocabulary::from_path(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
