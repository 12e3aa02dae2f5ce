//! Typed models for structured analysis results.
//!
//! These mirror the JSON the prompts ask for. Every field is defaulted:
//! model output is best-effort and a missing key must not fail a call that
//! already produced parseable JSON.

use serde::{Deserialize, Serialize};

/// Analysis of a single vocabulary word.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WordAnalysis {
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub word_type: String,
    #[serde(default)]
    pub cefr_level: String,
    #[serde(default)]
    pub ipa_pronunciation: String,
    #[serde(default)]
    pub example_sentence: String,
}

/// Graded analysis of a learner-written sentence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentenceAnalysis {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub overall_feedback: String,
    #[serde(default)]
    pub errors: Vec<SentenceError>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<Improvement>,
    #[serde(default)]
    pub grammar_analysis: Option<GrammarAnalysis>,
    #[serde(default)]
    pub vocabulary_analysis: Option<VocabularyAnalysis>,
}

/// One flagged span in the sentence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentenceError {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub start_index: Option<u32>,
    #[serde(default)]
    pub end_index: Option<u32>,
    /// grammar | vocabulary | spelling | punctuation | tense | article | preposition
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub correction: String,
    #[serde(default)]
    pub suggestion: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Improvement {
    #[serde(default)]
    pub aspect: String,
    #[serde(default)]
    pub suggestion: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrammarAnalysis {
    #[serde(default)]
    pub tense: String,
    #[serde(default)]
    pub subject_verb_agreement: String,
    #[serde(default)]
    pub word_order: String,
    #[serde(default)]
    pub articles: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VocabularyAnalysis {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub appropriateness: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}
