use crate::api::decoder::{decode_models, decode_response};
use crate::api::stream::ChatStream;
use crate::api::transport::{HttpTransport, Transport};
use crate::error::Result;
use crate::models::{ChatRequest, ChatResponse, ModelsResponse};
use tracing::debug;

pub const CHAT_COMPLETIONS_PATH: &str = "chat/completions";
pub const MODELS_PATH: &str = "models";

/// Everything a [`Client`] needs. Passed in explicitly; there is no global
/// client state.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub endpoint: String,
    pub stream_timeout: u64,
}

pub struct Client {
    transport: Box<dyn Transport>,
}

impl Client {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.api_key, &config.endpoint, config.stream_timeout)?;
        Ok(Self::with_transport(transport))
    }

    pub fn with_transport(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
        }
    }

    /// Blocking-style completion: one request, one decoded response.
    pub async fn chat_completion(&self, mut request: ChatRequest) -> Result<ChatResponse> {
        request.stream = Some(false);
        let body = serde_json::to_string(&request)?;
        debug!(model = %request.model, messages = request.messages.len(), "chat completion");

        let payload = self.transport.post_json(CHAT_COMPLETIONS_PATH, body).await?;
        decode_response(&payload)
    }

    /// Streaming completion. The returned stream yields one update per frame.
    pub async fn chat_completion_stream(&self, mut request: ChatRequest) -> Result<ChatStream> {
        request.stream = Some(true);
        let body = serde_json::to_string(&request)?;
        debug!(model = %request.model, messages = request.messages.len(), "chat completion stream");

        let frames = self.transport.post_stream(CHAT_COMPLETIONS_PATH, body).await?;
        Ok(ChatStream::new(frames))
    }

    pub async fn models(&self) -> Result<ModelsResponse> {
        let payload = self.transport.get(MODELS_PATH).await?;
        decode_models(&payload)
    }
}
