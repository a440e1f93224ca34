//! Side-by-side comparison of several models on one request.

use futures::future::join_all;
use std::time::Duration;
use tokio::time::Instant;
use tracing::instrument;

use crate::client::Client;
use crate::error::Result;
use crate::request::CompletionRequest;
use crate::response::CompletionResult;

/// Outcome of sending the shared request to one model.
#[derive(Debug)]
pub struct ModelComparison {
    /// Model the request was sent to.
    pub model: String,
    /// Wall-clock time of the call, retries included.
    pub latency: Duration,
    /// Reply or failure.
    pub outcome: Result<CompletionResult>,
}

impl ModelComparison {
    /// Whether the model answered.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Total tokens billed, when reported.
    pub fn total_tokens(&self) -> Option<u32> {
        self.outcome.as_ref().ok().and_then(CompletionResult::total_tokens)
    }

    /// Reply length in characters.
    pub fn reply_chars(&self) -> Option<usize> {
        self.outcome.as_ref().ok().map(|r| r.text.chars().count())
    }
}

/// The successful comparison with the lowest latency.
pub fn fastest(results: &[ModelComparison]) -> Option<&ModelComparison> {
    results
        .iter()
        .filter(|r| r.is_success())
        .min_by_key(|r| r.latency)
}

impl Client {
    /// Send `template` to every model concurrently.
    ///
    /// The template's own model is ignored. Results come back in the order of
    /// `models`; one model failing does not affect the others.
    #[instrument(skip(self, template), fields(models = models.len()))]
    pub async fn compare_models<S: AsRef<str>>(
        &self,
        models: &[S],
        template: &CompletionRequest,
    ) -> Vec<ModelComparison> {
        let calls = models.iter().map(|model| {
            let mut request = template.clone();
            request.model = model.as_ref().to_string();
            async move {
                let started = Instant::now();
                let outcome = self.chat_completion(&request).await;
                ModelComparison {
                    model: request.model,
                    latency: started.elapsed(),
                    outcome,
                }
            }
        });

        join_all(calls).await
    }
}
