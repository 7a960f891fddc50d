use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    #[error("server responded with status {0}")]
    Status(StatusCode),
    #[error("invalid response body: {0}")]
    Decode(String),
}

/// The two remote operations the chat client needs.
#[async_trait]
pub trait ShopBackend: Send + Sync {
    /// Send one user message and return the agent's reply text.
    async fn chat(&self, message: &str) -> Result<String, ClientError>;

    /// Ask the agent to drop the current order.
    async fn abort(&self) -> Result<(), ClientError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    user_id: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    response: String,
}

/// HTTP client for the shopping agent service.
#[derive(Clone)]
pub struct ShopClient {
    client: Client,
    base_url: String,
    user_id: String,
}

impl ShopClient {
    pub fn new(base_url: &str, user_id: &str) -> Self {
        Self::with_client(Client::new(), base_url, user_id)
    }

    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self::with_client(
            builder.build()?,
            &config.base_url,
            &config.user_id,
        ))
    }

    fn with_client(client: Client, base_url: &str, user_id: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: user_id.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

#[async_trait]
impl ShopBackend for ShopClient {
    async fn chat(&self, message: &str) -> Result<String, ClientError> {
        let url = format!("{}/chat", self.base_url);

        let request = ChatRequest {
            message,
            user_id: &self.user_id,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(ClientError::Status(response.status()));
        }

        let body = response.text().await?;
        let chat_response: ChatResponse =
            serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(chat_response.response)
    }

    async fn abort(&self) -> Result<(), ClientError> {
        let url = format!("{}/abort", self.base_url);

        let response = self.client.post(&url).send().await?;

        if !response.status().is_success() {
            return Err(ClientError::Status(response.status()));
        }
        Ok(())
    }
}
