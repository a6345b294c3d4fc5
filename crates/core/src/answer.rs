use crate::error::AnswerError;
use crate::index::ScoredChunk;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com";
pub const DEFAULT_LLM_MODEL: &str = "llama-3.1-8b-instant";

/// Answers are generated greedily so the same context and question give
/// the same reply.
pub const ANSWER_TEMPERATURE: f32 = 0.0;

const CONTEXT_SEPARATOR: &str = "\n\n";

const SYSTEM_TEMPLATE: &str = "Use the following pieces of context to answer the user's question. \n\
If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\
----------------\n\
{context}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, messages: &[Message], temperature: f32)
        -> Result<String, AnswerError>;
}

#[async_trait]
impl<T> LanguageModel for Box<T>
where
    T: LanguageModel + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn complete(
        &self,
        messages: &[Message],
        temperature: f32,
    ) -> Result<String, AnswerError> {
        (**self).complete(messages, temperature).await
    }
}

/// Stuffs every retrieved chunk into one system message followed by the
/// question.
pub fn build_prompt(chunks: &[ScoredChunk], question: &str) -> Vec<Message> {
    let context = chunks
        .iter()
        .map(|hit| hit.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    vec![
        Message::system(SYSTEM_TEMPLATE.replace("{context}", &context)),
        Message::user(question),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<ScoredChunk>,
}

pub async fn answer_question<M>(
    model: &M,
    chunks: Vec<ScoredChunk>,
    question: &str,
) -> Result<Answer, AnswerError>
where
    M: LanguageModel + ?Sized,
{
    let messages = build_prompt(&chunks, question);
    debug!(model = model.name(), context_chunks = chunks.len(), "requesting answer");
    let answer = model.complete(&messages, ANSWER_TEMPERATURE).await?;

    Ok(Answer {
        answer,
        sources: chunks,
    })
}

/// Chat client for Groq's OpenAI-compatible completions endpoint.
pub struct GroqChatModel {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    max_tokens: Option<u32>,
}

impl GroqChatModel {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AnswerError> {
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: base.join("openai/v1/chat/completions")?,
            api_key,
            model: model.into(),
            max_tokens: None,
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request_body(&self, messages: &[Message], temperature: f32) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }
}

#[async_trait]
impl LanguageModel for GroqChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[Message],
        temperature: f32,
    ) -> Result<String, AnswerError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&self.request_body(messages, temperature));

        // A missing key is not checked up front; the provider rejects the call.
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        debug!(endpoint = %self.endpoint, "chat completion request");
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnswerError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await?;
        extract_content(&payload)
    }
}

fn extract_content(payload: &Value) -> Result<String, AnswerError> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AnswerError::MalformedResponse("missing choices[0].message.content".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::TextChunk;
    use crate::testing::{EchoModel, StubProvider};

    fn hit(index: usize, text: &str) -> ScoredChunk {
        ScoredChunk {
            score: 1.0,
            chunk: TextChunk {
                index,
                start: 0,
                text: text.to_string(),
            },
        }
    }

    #[test]
    fn prompt_stuffs_chunks_in_retrieval_order() {
        let messages = build_prompt(&[hit(3, "third"), hit(0, "first")], "what?");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0]
            .content
            .starts_with("Use the following pieces of context"));
        assert!(messages[0]
            .content
            .ends_with("----------------\nthird\n\nfirst"));
        assert_eq!(messages[1], Message::user("what?"));
    }

    #[test]
    fn endpoint_is_joined_onto_base_url() {
        let model = GroqChatModel::new(
            "https://api.groq.com/",
            None,
            DEFAULT_LLM_MODEL,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            model.endpoint().as_str(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn request_body_carries_temperature_and_roles() {
        let model =
            GroqChatModel::new(DEFAULT_GROQ_BASE_URL, None, "m", Duration::from_secs(5)).unwrap();
        let body = model.request_body(&[Message::system("ctx"), Message::user("q")], 0.0);

        assert_eq!(body["model"], "m");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "q");
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn content_is_read_from_first_choice() {
        let payload = json!({"choices": [{"message": {"role": "assistant", "content": "42"}}]});
        assert_eq!(extract_content(&payload).unwrap(), "42");
        assert!(matches!(
            extract_content(&json!({"choices": []})),
            Err(AnswerError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn answer_uses_zero_temperature() {
        let model = EchoModel::default();
        let answer = answer_question(&model, vec![hit(0, "the sky is blue")], "colour?")
            .await
            .unwrap();

        assert!(answer.answer.contains("the sky is blue"));
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(model.temperatures(), vec![ANSWER_TEMPERATURE]);
    }

    const COMPLETIONS_PATH: &str = "/openai/v1/chat/completions";

    #[tokio::test]
    async fn completion_sends_bearer_key_and_reads_reply() -> Result<(), Box<dyn std::error::Error>>
    {
        let provider = StubProvider::start(
            COMPLETIONS_PATH,
            200,
            json!({"choices": [{"message": {"role": "assistant", "content": "forty-two"}}]}),
        )
        .await?;
        let model = GroqChatModel::new(
            &provider.base_url,
            Some("gsk_test".to_string()),
            "m",
            Duration::from_secs(5),
        )?;

        let reply = model
            .complete(&[Message::system("ctx"), Message::user("q")], 0.0)
            .await?;
        assert_eq!(reply, "forty-two");

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer gsk_test"));
        assert_eq!(requests[0].body["temperature"], 0.0);
        assert_eq!(requests[0].body["messages"][1]["content"], "q");
        Ok(())
    }

    #[tokio::test]
    async fn rejected_key_maps_to_provider_error() -> Result<(), Box<dyn std::error::Error>> {
        let provider = StubProvider::start(
            COMPLETIONS_PATH,
            401,
            json!({"error": {"message": "Invalid API Key"}}),
        )
        .await?;
        let model = GroqChatModel::new(&provider.base_url, None, "m", Duration::from_secs(5))?;

        let error = model
            .complete(&[Message::user("q")], 0.0)
            .await
            .expect_err("provider refuses the call");
        match error {
            AnswerError::Provider { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("Invalid API Key"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(provider.requests()[0].authorization, None);
        Ok(())
    }

    #[tokio::test]
    async fn reply_without_content_is_malformed() -> Result<(), Box<dyn std::error::Error>> {
        let provider = StubProvider::start(COMPLETIONS_PATH, 200, json!({"choices": []})).await?;
        let model = GroqChatModel::new(&provider.base_url, None, "m", Duration::from_secs(5))?;

        let error = model
            .complete(&[Message::user("q")], 0.0)
            .await
            .expect_err("no choices");
        assert!(matches!(error, AnswerError::MalformedResponse(_)));
        Ok(())
    }
}
