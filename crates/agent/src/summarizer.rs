use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use kasir_core::ports::NotesSummarizer;

use crate::llm::LlmClient;
use crate::prompts::NOTES_SUMMARY;

/// Writes the friendly one-liner stored as the POS order note.
pub struct LlmNotesSummarizer {
    llm: Arc<dyn LlmClient>,
}

impl LlmNotesSummarizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl NotesSummarizer for LlmNotesSummarizer {
    async fn summarize(&self, notes: &str) -> String {
        let notes = notes.trim();
        if notes.is_empty() {
            return String::new();
        }
        match self.llm.complete(NOTES_SUMMARY, notes).await {
            Ok(summary) => summary.trim().to_string(),
            Err(error) => {
                warn!(event_name = "agent.notes.summary_failed", error = %format!("{error:#}"), "notes left unsummarised");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use kasir_core::ports::NotesSummarizer;

    use crate::llm::LlmClient;

    use super::LlmNotesSummarizer;

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl LlmClient for Counting {
        async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("timeout");
            }
            Ok(format!("  Thanks for ordering, {prompt}!\n"))
        }
    }

    #[tokio::test]
    async fn empty_notes_skip_the_model() {
        let llm = Arc::new(Counting { calls: AtomicUsize::new(0), fail: false });
        let summary = LlmNotesSummarizer::new(llm.clone()).summarize("  ").await;
        assert!(summary.is_empty());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn summaries_are_trimmed_and_failures_are_empty() {
        let ok = LlmNotesSummarizer::new(Arc::new(Counting { calls: AtomicUsize::new(0), fail: false }));
        assert_eq!(ok.summarize("extra ice").await, "Thanks for ordering, extra ice!");

        let failing = LlmNotesSummarizer::new(Arc::new(Counting { calls: AtomicUsize::new(0), fail: true }));
        assert_eq!(failing.summarize("extra ice").await, "");
    }
}
