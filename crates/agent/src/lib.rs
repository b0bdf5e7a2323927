//! Language-model adapters and the message runtime.
//!
//! The model translates chat text into a structured order, picks among
//! catalog candidates the index already retrieved, and writes a thank-you
//! note. Prices, stock, discounts and every backend write are decided by
//! `kasir-core`; replies the model produces are validated before use.
//!
//! - `translation` parses translator output, tolerating the older schema.
//! - `guardrails` rejects incomplete or out-of-range requests.
//! - `disambiguator` and `summarizer` implement the core ports.
//! - `runtime` runs one message end to end and builds the reply.

pub mod disambiguator;
pub mod guardrails;
pub mod llm;
pub mod prompts;
pub mod runtime;
pub mod summarizer;
pub mod translation;

pub use disambiguator::LlmDisambiguator;
pub use guardrails::{GuardrailDecision, GuardrailPolicy};
pub use llm::{build_client, LlmClient};
pub use runtime::{AgentRuntime, OrderReply, RuntimeSettings};
pub use summarizer::LlmNotesSummarizer;
pub use translation::{parse_translation, LlmTranslator};
