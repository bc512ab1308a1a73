use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use maildesk_core::{CollaboratorError, FaqMatch, KnowledgeBase};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FaqEntry {
    pub id: String,
    /// Question phrasings; each is indexed separately.
    pub questions: Vec<String>,
    pub answer: String,
}

#[derive(Debug, Default, Deserialize)]
struct KnowledgeFile {
    #[serde(default)]
    faq_entries: Vec<FaqEntry>,
}

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("could not read knowledge base `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse knowledge base `{path}`: {source}")]
    ParseFile { path: PathBuf, source: serde_json::Error },
}

struct IndexedQuestion {
    entry: usize,
    terms: HashMap<String, f32>,
    norm: f32,
}

/// FAQ retrieval over term-frequency cosine similarity. Each stored
/// question phrasing is a vector; the best-scoring phrasing wins for its
/// entry. Scores land in [0, 1]; the orchestrator applies the threshold.
pub struct FaqIndex {
    entries: Vec<FaqEntry>,
    questions: Vec<IndexedQuestion>,
}

impl FaqIndex {
    pub fn new(entries: Vec<FaqEntry>) -> Self {
        let mut questions = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            for question in &entry.questions {
                let terms = term_frequencies(question);
                let norm = vector_norm(&terms);
                if norm > 0.0 {
                    questions.push(IndexedQuestion { entry: index, terms, norm });
                }
            }
        }
        Self { entries, questions }
    }

    pub fn from_json_str(path: &Path, raw: &str) -> Result<Self, KnowledgeError> {
        let file: KnowledgeFile = serde_json::from_str(raw)
            .map_err(|source| KnowledgeError::ParseFile { path: path.to_path_buf(), source })?;
        Ok(Self::new(file.faq_entries))
    }

    pub fn from_path(path: &Path) -> Result<Self, KnowledgeError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| KnowledgeError::ReadFile { path: path.to_path_buf(), source })?;
        Self::from_json_str(path, &raw)
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    fn score_query(&self, question: &str) -> Option<(usize, f32)> {
        let query_terms = term_frequencies(question);
        let query_norm = vector_norm(&query_terms);
        if query_norm == 0.0 {
            return None;
        }

        let mut best: Option<(usize, f32)> = None;
        for indexed in &self.questions {
            let mut dot = 0.0f32;
            for (term, weight) in &query_terms {
                if let Some(doc_weight) = indexed.terms.get(term) {
                    dot += weight * doc_weight;
                }
            }
            let score = dot / (query_norm * indexed.norm);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((indexed.entry, score)),
            }
        }
        best
    }
}

#[async_trait]
impl KnowledgeBase for FaqIndex {
    async fn best_match(&self, question: &str) -> Result<Option<FaqMatch>, CollaboratorError> {
        Ok(self.score_query(question).map(|(index, score)| {
            let entry = &self.entries[index];
            FaqMatch { entry_id: entry.id.clone(), answer: entry.answer.clone(), score }
        }))
    }
}

fn term_frequencies(text: &str) -> HashMap<String, f32> {
    let mut terms: HashMap<String, f32> = HashMap::new();
    for token in text
        .to_lowercase()
        .split(|character: char| !character.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
    {
        *terms.entry(token.to_string()).or_insert(0.0) += 1.0;
    }
    terms
}

fn vector_norm(terms: &HashMap<String, f32>) -> f32 {
    terms.values().map(|weight| weight * weight).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use maildesk_core::KnowledgeBase;

    use super::{FaqEntry, FaqIndex};

    fn index() -> FaqIndex {
        FaqIndex::new(vec![
            FaqEntry {
                id: "return-policy".to_string(),
                questions: vec![
                    "What is your return policy?".to_string(),
                    "How do I return an item?".to_string(),
                ],
                answer: "Returns are free within 30 days.".to_string(),
            },
            FaqEntry {
                id: "shipping-cost".to_string(),
                questions: vec!["How much does shipping cost?".to_string()],
                answer: "Standard shipping is a flat $4.99.".to_string(),
            },
        ])
    }

    #[tokio::test]
    async fn exact_question_scores_at_the_top_of_the_range() {
        let hit = index()
            .best_match("What is your return policy?")
            .await
            .expect("match")
            .expect("hit");

        assert_eq!(hit.entry_id, "return-policy");
        assert!(hit.score > 0.99, "identical phrasing should score ~1.0, got {}", hit.score);
    }

    #[tokio::test]
    async fn paraphrase_still_lands_on_the_right_entry() {
        let hit = index()
            .best_match("I want to return my shoes")
            .await
            .expect("match")
            .expect("hit");

        assert_eq!(hit.entry_id, "return-policy");
        assert!(hit.score > 0.0 && hit.score < 1.0);
    }

    #[tokio::test]
    async fn unrelated_question_scores_low_rather_than_erroring() {
        let hit = index()
            .best_match("What is the meaning of life?")
            .await
            .expect("match")
            .expect("some best entry always exists");

        assert!(hit.score < 0.60, "unrelated text must stay under the FAQ threshold");
    }

    #[tokio::test]
    async fn empty_index_returns_no_match() {
        let empty = FaqIndex::new(Vec::new());
        assert!(empty.is_empty());
        assert!(empty.best_match("anything").await.expect("match").is_none());
    }
}
