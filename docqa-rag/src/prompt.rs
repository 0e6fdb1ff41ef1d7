//! Prompt construction for grounded answers.

use std::fmt::Write as _;

use crate::document::SearchResult;
use crate::generation::{GenerationOptions, GenerationRequest};

/// Sentence the model is told to use when the context does not cover the question.
pub const INSUFFICIENT_CONTEXT: &str =
    "I could not find specific information about this in the provided documents.";

/// Reply the model is told to give instead of personal advice.
pub const ADVICE_DISCLAIMER: &str = "I cannot provide financial advice or personal recommendations. \
My purpose is to supply factual information from the provided documents. For personalised \
financial or tax advice, please consult a registered tax agent or a licensed financial adviser.";

/// Default system instructions: answer only from context, cite by number,
/// refuse personal advice. No closing source list is requested; callers
/// render one from the resolved citations.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a document question-answering assistant. Answer using ONLY the numbered context \
passages supplied with the question.

Rules:
1. Use only information explicitly stated in the context. Never rely on outside knowledge.
2. If the context does not contain the answer, reply exactly: \"I could not find specific \
information about this in the provided documents.\"
3. Follow every claim with the number of the passage that supports it, in square brackets, \
for example [1] or [2, 3].
4. Combine information from several passages when they agree; say so when they conflict.
5. Write plain paragraphs and bullet points. Do not use code blocks or backticks.
6. You provide information, not advice. If the question asks for advice, opinions, \
recommendations or \"should I\" decisions, reply with exactly this and nothing else: \
\"I cannot provide financial advice or personal recommendations. My purpose is to supply \
factual information from the provided documents. For personalised financial or tax advice, \
please consult a registered tax agent or a licensed financial adviser.\"";

/// Renders retrieved chunks and the question into a [`GenerationRequest`].
///
/// Context passages are numbered from 1 in the order given, which the query
/// engine guarantees is descending similarity. The numbers are what inline
/// citation markers refer to.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: String,
    options: GenerationOptions,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self { system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(), options: GenerationOptions::default() }
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the system instructions, e.g. with domain-specific guidelines.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Render the numbered context block.
    pub fn build_context(results: &[SearchResult]) -> String {
        let mut context = String::new();
        for (i, result) in results.iter().enumerate() {
            let chunk = &result.chunk;
            let title = chunk.title().unwrap_or(&chunk.document_id);
            let _ = writeln!(context, "---");
            let _ = writeln!(context, "[{}] Title: {title}", i + 1);
            if let Some(uri) = chunk.source_uri() {
                let _ = writeln!(context, "URL: {uri}");
            }
            let _ = writeln!(context, "Text: {}", chunk.text.trim());
        }
        if !results.is_empty() {
            context.push_str("---\n");
        }
        context
    }

    /// Build the full request for `question` over `results`.
    pub fn build(&self, question: &str, results: &[SearchResult]) -> GenerationRequest {
        let prompt = format!(
            "CONTEXT:\n{}\nQUESTION:\n{}",
            Self::build_context(results),
            question.trim()
        );
        GenerationRequest {
            system: self.system_prompt.clone(),
            prompt,
            options: self.options.clone(),
        }
    }
}
