// Answer generation: prompt the model, collect its stream, format the result.

use async_trait::async_trait;
use dotsage_core::protocol::LlmEvent;
use dotsage_core::question::Category;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::LlmClient;
use crate::markdown::to_html;
use crate::prompt::{fallback_answer, sources, system_prompt, Source};

/// Capacity of the channel between the streaming client and the collector.
const EVENT_BUFFER: usize = 64;

/// A formatted answer and the documentation it points to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<Source>,
}

/// Something that can answer a question in a category.
///
/// The HTTP layer only sees this trait, so tests can swap in a canned
/// implementation.
#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(&self, text: &str, category: Category) -> anyhow::Result<Answer>;

    /// Like `answer`, but forwards each generated `LlmEvent::Token` to
    /// `tokens` as it arrives. The channel closes when this returns.
    async fn stream(
        &self,
        text: &str,
        category: Category,
        tokens: mpsc::Sender<LlmEvent>,
    ) -> anyhow::Result<Answer>;
}

/// Model-backed `Answerer`. Upstream failures produce a fallback answer
/// rather than an error.
pub struct AnswerService {
    client: LlmClient,
}

impl AnswerService {
    pub fn new(client: LlmClient) -> Self {
        if !client.is_enabled() {
            info!("No Groq API key configured; answers will use the fallback text");
        }
        Self { client }
    }

    async fn generate(
        &self,
        text: &str,
        category: Category,
        forward: Option<&mpsc::Sender<LlmEvent>>,
    ) -> Answer {
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let system = system_prompt(category);

        let request = self.client.stream_chat(&system, text, tx);
        let collect = async {
            let mut outcome: Option<Result<String, String>> = None;
            while let Some(event) = rx.recv().await {
                match event {
                    LlmEvent::Token { .. } => {
                        if let Some(forward) = forward {
                            // A departed listener does not stop generation.
                            let _ = forward.send(event).await;
                        }
                    }
                    LlmEvent::Complete {
                        full_text,
                        input_tokens,
                        output_tokens,
                    } => {
                        debug!(input_tokens, output_tokens, "completion finished");
                        outcome = Some(Ok(full_text));
                    }
                    LlmEvent::Error { message } => outcome = Some(Err(message)),
                }
            }
            outcome
        };

        let (request_result, outcome) = tokio::join!(request, collect);

        let outcome = match (request_result, outcome) {
            (Err(e), _) => Err(format!("{e:#}")),
            (Ok(()), Some(outcome)) => outcome,
            (Ok(()), None) => Err("stream ended without a response".to_string()),
        };

        let answer = match outcome {
            Ok(full_text) => to_html(&full_text),
            Err(message) => {
                warn!(%category, "AI call failed: {message}");
                fallback_answer(&message, text, category)
            }
        };

        Answer {
            answer,
            sources: sources(category),
        }
    }
}

#[async_trait]
impl Answerer for AnswerService {
    async fn answer(&self, text: &str, category: Category) -> anyhow::Result<Answer> {
        Ok(self.generate(text, category, None).await)
    }

    async fn stream(
        &self,
        text: &str,
        category: Category,
        tokens: mpsc::Sender<LlmEvent>,
    ) -> anyhow::Result<Answer> {
        Ok(self.generate(text, category, Some(&tokens)).await)
    }
}
