//! Decision oracle - the text-generation backend each cardinal consults
//!
//! Both providers speak the chat-completions wire shape and return the
//! trimmed content of the first choice. Neither retries; a failed request
//! surfaces as an [`OracleError`] and the coordinator decides what to do.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{OracleConfig, OracleProvider};
use crate::error::{ConclaveError, OracleError};

/// Anything that can answer a voting prompt
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Ask for a completion and return its trimmed text
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, OracleError>;
}

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Request body for `/v1/chat/completions`
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

fn messages(system_prompt: &str, user_prompt: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::new(Role::System, system_prompt),
        ChatMessage::new(Role::User, user_prompt),
    ]
}

fn completions_url(base_url: &str) -> String {
    format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
}

/// POST a chat request and pull out the first choice's text
async fn post_chat(
    client: &Client,
    url: &str,
    bearer: Option<&str>,
    request: &ChatRequest<'_>,
) -> Result<String, OracleError> {
    let mut builder = client.post(url).json(request);
    if let Some(token) = bearer {
        builder = builder.bearer_auth(token);
    }

    let response = builder.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(OracleError::Status {
            status: status.as_u16(),
            body,
        });
    }

    parse_completion(&body)
}

/// Extract `choices[0].message.content`, trimmed
pub(crate) fn parse_completion(body: &str) -> Result<String, OracleError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| OracleError::Malformed(format!("{e}: {body}")))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| OracleError::Malformed("No choices in response".to_string()))?;

    choice
        .message
        .content
        .map(|c| c.trim().to_string())
        .ok_or_else(|| OracleError::Malformed("Choice has no content".to_string()))
}

/// Hosted chat-completions provider
pub struct HostedOracle {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
}

impl HostedOracle {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f64,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl DecisionOracle for HostedOracle {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, OracleError> {
        let request = ChatRequest {
            model: Some(self.model.as_str()),
            messages: messages(system_prompt, user_prompt),
            temperature: self.temperature,
            stream: None,
        };
        debug!(model = %self.model, "Querying hosted oracle");
        post_chat(
            &self.client,
            &completions_url(&self.base_url),
            Some(self.api_key.as_str()),
            &request,
        )
        .await
    }
}

/// OpenAI-compatible server reachable over plain HTTP
pub struct LocalOracle {
    client: Client,
    base_url: String,
    temperature: f64,
}

impl LocalOracle {
    pub fn new(base_url: impl Into<String>, temperature: f64) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            temperature,
        }
    }
}

#[async_trait]
impl DecisionOracle for LocalOracle {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, OracleError> {
        let request = ChatRequest {
            model: None,
            messages: messages(system_prompt, user_prompt),
            temperature: self.temperature,
            stream: Some(false),
        };
        debug!(url = %self.base_url, "Querying local oracle");
        post_chat(&self.client, &completions_url(&self.base_url), None, &request).await
    }
}

/// The configured backend, chosen once at startup
pub enum Oracle {
    Hosted(HostedOracle),
    Local(LocalOracle),
}

impl Oracle {
    /// Build the backend named by `config`
    pub fn from_config(config: &OracleConfig) -> Result<Self, ConclaveError> {
        config.validate()?;
        Ok(match config.provider {
            OracleProvider::Hosted => {
                let api_key = config.api_key.clone().ok_or_else(|| {
                    ConclaveError::ConfigError("hosted provider requires an API key".into())
                })?;
                Oracle::Hosted(HostedOracle::new(
                    config.hosted_url.clone(),
                    api_key,
                    config.model.clone(),
                    config.temperature,
                ))
            }
            OracleProvider::Local => {
                Oracle::Local(LocalOracle::new(config.local_url.clone(), config.temperature))
            }
        })
    }

    pub fn provider(&self) -> OracleProvider {
        match self {
            Oracle::Hosted(_) => OracleProvider::Hosted,
            Oracle::Local(_) => OracleProvider::Local,
        }
    }
}

#[async_trait]
impl DecisionOracle for Oracle {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, OracleError> {
        match self {
            Oracle::Hosted(inner) => inner.complete(system_prompt, user_prompt).await,
            Oracle::Local(inner) => inner.complete(system_prompt, user_prompt).await,
        }
    }
}
