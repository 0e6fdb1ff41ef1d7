//! Query results: answers and the citations that ground them.

use serde::{Deserialize, Serialize};

use crate::document::SearchResult;

/// Text returned when no retrieved chunk cleared the similarity threshold.
pub const NO_GROUNDED_ANSWER: &str = "No grounded answer found: the knowledge base has no information relevant to this question.";

/// A reference from an answer back to the chunk that supports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    /// 1-based position of the chunk in the prompt's context list.
    pub index: usize,
    pub chunk_id: String,
    pub document_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
    /// Similarity of the chunk to the question.
    pub score: f32,
}

impl Citation {
    /// Build the citation for the `index`-th (1-based) retrieved result.
    pub fn from_result(index: usize, result: &SearchResult) -> Self {
        Self {
            index,
            chunk_id: result.chunk.id.clone(),
            document_id: result.chunk.document_id.clone(),
            title: result.chunk.title().map(str::to_string),
            source_uri: result.chunk.source_uri().map(str::to_string),
            score: result.score,
        }
    }

    /// `Title (uri)` with sensible fallbacks, for display.
    pub fn label(&self) -> String {
        let title = self.title.as_deref().unwrap_or(&self.document_id);
        match &self.source_uri {
            Some(uri) => format!("{title} ({uri})"),
            None => title.to_string(),
        }
    }
}

/// How a query ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// The model answered from retrieved context.
    Grounded,
    /// Nothing relevant was retrieved; the model was not invoked.
    NoContext,
}

/// The output of a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Citations ordered by their position in the prompt.
    pub citations: Vec<Citation>,
    pub outcome: AnswerOutcome,
}

impl Answer {
    /// The answer given when retrieval found nothing.
    pub fn no_context() -> Self {
        Self {
            text: NO_GROUNDED_ANSWER.to_string(),
            citations: Vec::new(),
            outcome: AnswerOutcome::NoContext,
        }
    }

    pub fn is_grounded(&self) -> bool {
        self.outcome == AnswerOutcome::Grounded
    }
}
