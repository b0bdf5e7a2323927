//! Model-backed choice among retrieved catalog candidates.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use kasir_core::ports::{Candidate, Disambiguation, DisambiguationDomain, Disambiguator};

use crate::llm::LlmClient;
use crate::prompts::{selection_instruction, NO_MATCH_SENTINEL};

pub struct LlmDisambiguator {
    llm: Arc<dyn LlmClient>,
}

impl LlmDisambiguator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

pub fn selection_prompt(query: &str, candidates: &[Candidate]) -> String {
    let mut prompt = format!("Query: {}\nCandidates:\n", query.trim());
    for candidate in candidates {
        prompt.push_str(&format!("{}: {}\n", candidate.id, candidate.name));
    }
    prompt
}

/// Maps a free-text answer onto a candidate id. Anything that is not
/// recognisably one of the candidates is a non-match.
pub fn interpret_answer(answer: &str, candidates: &[Candidate]) -> Disambiguation {
    let cleaned = answer.trim().trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '.' | '*'));
    if cleaned.is_empty() || cleaned.contains(NO_MATCH_SENTINEL) {
        return Disambiguation::NoMatch;
    }
    if let Some(candidate) = candidates.iter().find(|candidate| candidate.id == cleaned) {
        return Disambiguation::Selected(candidate.id.clone());
    }
    let tokens: Vec<&str> = cleaned
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
        .filter(|token| !token.is_empty())
        .collect();
    if let Some(candidate) = candidates.iter().find(|candidate| tokens.contains(&candidate.id.as_str())) {
        return Disambiguation::Selected(candidate.id.clone());
    }
    candidates
        .iter()
        .find(|candidate| candidate.name.trim().eq_ignore_ascii_case(cleaned))
        .map(|candidate| Disambiguation::Selected(candidate.id.clone()))
        .unwrap_or(Disambiguation::NoMatch)
}

#[async_trait]
impl Disambiguator for LlmDisambiguator {
    async fn select(
        &self,
        query: &str,
        candidates: &[Candidate],
        domain: DisambiguationDomain,
    ) -> Disambiguation {
        if candidates.is_empty() {
            return Disambiguation::NoMatch;
        }
        let instruction = selection_instruction(domain);
        let answer = match self.llm.complete(&instruction, &selection_prompt(query, candidates)).await {
            Ok(answer) => answer,
            Err(error) => {
                warn!(
                    event_name = "agent.disambiguation.failed",
                    query,
                    error = %format!("{error:#}"),
                    "selection model unavailable; treating as no match"
                );
                return Disambiguation::NoMatch;
            }
        };
        let choice = interpret_answer(&answer, candidates);
        if choice == Disambiguation::NoMatch && !answer.contains(NO_MATCH_SENTINEL) {
            warn!(
                event_name = "agent.disambiguation.unrecognised",
                query,
                answer = answer.trim(),
                "selection answer named no candidate"
            );
        }
        debug!(event_name = "agent.disambiguation.answered", query, choice = ?choice, "candidate selected");
        choice
    }
}
