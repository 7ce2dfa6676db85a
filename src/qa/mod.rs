//! The QA Orchestrator (§4.I): answers a question over a project's
//! documents by retrieving cited context through the Hybrid Retriever
//! and synthesizing a grounded response through the Gateway.
//!
//! Grounded in the sibling repo's `Orchestrator::query` final
//! synthesis step (build a prompt from retrieved findings, short-
//! circuit to a canned "no relevant findings" message when retrieval
//! is empty) and its `ToolExecutor`'s lazy-initialization pattern for
//! acquiring a capability only when first needed. Per-sentence
//! citation validation is new, built on [`crate::text::split_sentences`].

use std::sync::Arc;

use crate::core::{Citation, Conversation, Message};
use crate::error::{Error, NotFoundError, Result};
use crate::gateway::{CompletionRequest, Gateway};
use crate::search::{HybridRetriever, RetrievalSource, RetrieveOptions, RetrievedChunk};
use crate::store::RelationalStore;
use crate::text::split_sentences;

/// Default number of retrieved chunks fed into the synthesis prompt.
pub const DEFAULT_TOP_K: usize = 8;

/// Message returned instead of a synthesized answer when retrieval
/// finds nothing for the project.
pub const INSUFFICIENT_CONTEXT_MESSAGE: &str =
    "I don't have enough indexed context to answer that question.";

/// One chunk the answer drew on, surfaced for the caller to display
/// alongside the prose.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnswerCitation {
    /// Document the cited chunk belongs to.
    pub doc_id: String,
    /// Chunk id within that document.
    pub chunk_id: i64,
    /// Fused retrieval score, `[0, 1]`.
    pub score: f64,
    /// Which retrieval leg(s) surfaced this chunk.
    pub source: RetrievalSource,
}

/// The result of [`QaOrchestrator::answer`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnswerPacket {
    /// Conversation the question/answer pair was appended to.
    pub conversation_id: String,
    /// Synthesized answer text.
    pub answer: String,
    /// Chunks the answer was grounded on.
    pub citations: Vec<AnswerCitation>,
    /// `true` if retrieval found nothing and `answer` is the canned
    /// insufficient-context response rather than a synthesized one.
    pub insufficient_context: bool,
    /// Set when `strict_citations` was requested and at least one
    /// sentence in the synthesized answer carried no chunk reference.
    /// The answer is still returned; this flags it as unverified.
    pub uncited_sentences: Vec<String>,
}

/// Answers questions over a project's indexed documents, citing the
/// chunks it drew on and tracking the exchange as conversation turns.
pub struct QaOrchestrator {
    relational: Arc<dyn RelationalStore>,
    retriever: HybridRetriever,
    gateway: Arc<dyn Gateway>,
}

impl QaOrchestrator {
    /// Creates an orchestrator over the given capability ports. The
    /// retriever is built eagerly since it is cheap (it only clones a
    /// handful of `Arc`s); there is no lazy-initialized capability
    /// here because every call to `answer` needs both the retriever
    /// and the gateway regardless of question content.
    #[must_use]
    pub fn new(relational: Arc<dyn RelationalStore>, retriever: HybridRetriever, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            relational,
            retriever,
            gateway,
        }
    }

    /// Answers `question` over `project_id`'s documents.
    ///
    /// When `conversation_id` is `None`, a fresh conversation is
    /// created. When `strict_citations` is set, every sentence of the
    /// synthesized answer is checked for at least one chunk
    /// reference (`[chunk <id>]`); sentences without one are reported
    /// in [`AnswerPacket::uncited_sentences`] rather than rejected,
    /// since a refused answer is worse than a flagged one.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError::Conversation`] if `conversation_id` is
    /// given but does not exist, or propagates retrieval/gateway/store
    /// errors.
    pub async fn answer(
        &self,
        question: &str,
        project_id: &str,
        conversation_id: Option<&str>,
        strict_citations: bool,
        now: i64,
    ) -> Result<AnswerPacket> {
        let conversation_id = self.resolve_conversation(project_id, conversation_id, now)?;

        let previous = self.relational.get_messages(&conversation_id)?;
        let user_message = Message::user(conversation_id.clone(), question.to_string(), now);
        self.relational.append_message(&user_message)?;

        let options = RetrieveOptions::with_top_k(DEFAULT_TOP_K);
        let retrieved = self.retriever.retrieve(question, project_id, &options).await?;

        if retrieved.is_empty() {
            let assistant_message = Message::assistant(
                conversation_id.clone(),
                INSUFFICIENT_CONTEXT_MESSAGE.to_string(),
                Vec::new(),
                now,
            );
            self.relational.append_message(&assistant_message)?;
            return Ok(AnswerPacket {
                conversation_id,
                answer: INSUFFICIENT_CONTEXT_MESSAGE.to_string(),
                citations: Vec::new(),
                insufficient_context: true,
                uncited_sentences: Vec::new(),
            });
        }

        let prompt = build_answer_prompt(question, &retrieved, &previous);
        let (answer, _usage) = self.gateway.complete(&CompletionRequest::new(prompt)).await?;

        let uncited_sentences = if strict_citations {
            find_uncited_sentences(&answer)
        } else {
            Vec::new()
        };

        let citations: Vec<Citation> = retrieved
            .iter()
            .map(|chunk| Citation {
                chunk_id: chunk.chunk_id,
                score: chunk.score as f32,
            })
            .collect();
        let assistant_message =
            Message::assistant(conversation_id.clone(), answer.clone(), citations, now);
        self.relational.append_message(&assistant_message)?;

        Ok(AnswerPacket {
            conversation_id,
            answer,
            citations: retrieved
                .into_iter()
                .map(|chunk| AnswerCitation {
                    doc_id: chunk.doc_id,
                    chunk_id: chunk.chunk_id,
                    score: chunk.score,
                    source: chunk.source,
                })
                .collect(),
            insufficient_context: false,
            uncited_sentences,
        })
    }

    fn resolve_conversation(
        &self,
        project_id: &str,
        conversation_id: Option<&str>,
        now: i64,
    ) -> Result<String> {
        match conversation_id {
            Some(id) => {
                self.relational
                    .get_conversation(id)?
                    .ok_or_else(|| Error::from(NotFoundError::Conversation { conversation_id: id.to_string() }))?;
                Ok(id.to_string())
            }
            None => {
                let conversation_id = format!("conv-{project_id}-{now}");
                let conversation = Conversation::new(conversation_id.clone(), project_id, now);
                self.relational.insert_conversation(&conversation)?;
                Ok(conversation_id)
            }
        }
    }
}

/// Builds the synthesis prompt: retrieved context (each chunk tagged
/// with its id for citation), a short summary of the prior turn if
/// any, and citation instructions.
fn build_answer_prompt(question: &str, retrieved: &[RetrievedChunk], previous: &[Message]) -> String {
    let context = retrieved
        .iter()
        .map(|chunk| format!("[chunk {}] ({}): {}", chunk.chunk_id, chunk.doc_id, chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    let history = previous
        .last()
        .map(|message| format!("\n\n<previous_turn>\n{}\n</previous_turn>", message.content))
        .unwrap_or_default();

    format!(
        "<question>{question}</question>\n\n\
         <context>\n{context}\n</context>{history}\n\n\
         Answer the question using only the context above. Cite the \
         chunk each claim comes from by writing `[chunk <id>]` \
         immediately after the sentence it supports. If the context \
         does not contain enough information, say so plainly instead \
         of guessing."
    )
}

/// Returns every sentence of `answer` that carries no `[chunk <id>]`
/// reference.
fn find_uncited_sentences(answer: &str) -> Vec<String> {
    split_sentences(answer)
        .into_iter()
        .filter(|sentence| !sentence.text.contains("[chunk "))
        .map(|sentence| sentence.text.to_string())
        .collect()
}
