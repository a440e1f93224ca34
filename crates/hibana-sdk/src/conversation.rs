//! Multi-turn conversation state.

use futures::StreamExt;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::request::{CompletionRequest, Message, Role};
use crate::response::CompletionResult;
use crate::streaming::StreamResult;

/// An ordered chat history bound to a client and a model.
///
/// Each successful turn appends the user message and the assistant reply.
/// A failed turn leaves the history exactly as it was before the call.
#[derive(Debug, Clone)]
pub struct Conversation {
    client: Client,
    model: String,
    messages: Vec<Message>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    top_p: Option<f32>,
    seed: Option<i64>,
    stop: Vec<String>,
}

impl Conversation {
    /// Create an empty conversation.
    pub fn new(client: Client, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            messages: Vec::new(),
            temperature: None,
            max_tokens: None,
            top_p: None,
            seed: None,
            stop: Vec::new(),
        }
    }

    /// Set or replace the system prompt, which always comes first.
    pub fn with_system(mut self, prompt: impl Into<String>) -> Self {
        let system = Message::system(prompt);
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => *first = system,
            _ => self.messages.insert(0, system),
        }
        self
    }

    /// Set the sampling temperature for every turn.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the token limit for every turn.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set nucleus sampling for every turn.
    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set the sampling seed for every turn.
    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Add a stop sequence applied to every turn.
    pub fn stop(mut self, sequence: impl Into<String>) -> Self {
        self.stop.push(sequence.into());
        self
    }

    /// Model the conversation talks to.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// History, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of user turns recorded.
    pub fn turns(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }

    /// Forget every turn but keep the system prompt.
    pub fn clear(&mut self) {
        self.messages.retain(|m| m.role == Role::System);
    }

    /// Send a user message and record the reply.
    pub async fn send(&mut self, content: impl Into<String>) -> Result<CompletionResult> {
        let request = self.begin_turn(content.into(), false)?;

        match self.client.chat_completion(&request).await {
            Ok(result) => {
                self.messages.push(Message::assistant(result.text.clone()));
                Ok(result)
            }
            Err(error) => {
                self.rollback();
                Err(error)
            }
        }
    }

    /// Send a user message, streaming the reply through `on_delta`.
    ///
    /// The reply is recorded only if the stream completes without error.
    pub async fn send_streaming<F>(&mut self, content: impl Into<String>, mut on_delta: F) -> Result<StreamResult>
    where
        F: FnMut(&str),
    {
        let request = self.begin_turn(content.into(), true)?;

        let outcome = async {
            let mut stream = self.client.chat_completion_stream(&request).await?;
            let mut result = StreamResult::default();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                if let Some(text) = chunk.delta_text.as_deref() {
                    on_delta(text);
                }
                result.add_chunk(chunk);
            }
            Ok::<_, Error>(result)
        }
        .await;

        match outcome {
            Ok(result) => {
                self.messages.push(Message::assistant(result.text.clone()));
                Ok(result)
            }
            Err(error) => {
                self.rollback();
                Err(error)
            }
        }
    }

    fn begin_turn(&mut self, content: String, stream: bool) -> Result<CompletionRequest> {
        self.messages.push(Message::user(content));

        let mut request = CompletionRequest::new(self.model.clone(), self.messages.clone());
        request.stream = stream;
        if let Some(temperature) = self.temperature {
            request.temperature = temperature;
        }
        request.max_tokens = self.max_tokens;
        request.top_p = self.top_p;
        request.seed = self.seed;
        if !self.stop.is_empty() {
            request.stop = Some(self.stop.clone());
        }

        if let Err(error) = request.validate() {
            self.rollback();
            return Err(error);
        }
        Ok(request)
    }

    fn rollback(&mut self) {
        if self.messages.last().is_some_and(|m| m.role == Role::User) {
            self.messages.pop();
        }
    }
}
