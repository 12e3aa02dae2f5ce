//! Handlebars templates for the analysis prompts.

use crate::error::AiError;
use handlebars::Handlebars;
use serde_json::json;

const WORD_ANALYSIS_TEMPLATE: &str = include_str!("templates/word_analysis.hbs");
const SENTENCE_ANALYSIS_TEMPLATE: &str = include_str!("templates/sentence_analysis.hbs");

/// Fixed system instruction prepended to every chat call.
pub const CHAT_SYSTEM_PROMPT: &str =
    "You are a helpful English learning assistant. Answer questions clearly and concisely.";

/// Holds the registered prompt templates.
pub struct Templates {
    handlebars: Handlebars<'static>,
}

impl Templates {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars
            .register_template_string("word_analysis.hbs", WORD_ANALYSIS_TEMPLATE)
            .expect("Failed to register word analysis template");
        handlebars
            .register_template_string("sentence_analysis.hbs", SENTENCE_ANALYSIS_TEMPLATE)
            .expect("Failed to register sentence analysis template");

        Self { handlebars }
    }

    /// Render the word-analysis prompt.
    pub fn word_analysis(&self, word: &str) -> Result<String, AiError> {
        Ok(self
            .handlebars
            .render("word_analysis.hbs", &json!({"word": word}))?)
    }

    /// Render the sentence-analysis prompt.
    pub fn sentence_analysis(&self, sentence: &str) -> Result<String, AiError> {
        Ok(self
            .handlebars
            .render("sentence_analysis.hbs", &json!({"sentence": sentence}))?)
    }
}

impl Default for Templates {
    fn default() -> Self {
        Self::new()
    }
}
