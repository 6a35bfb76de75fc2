use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures_util::StreamExt;
use log::debug;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response, Url};

use super::models::{CreateConversationPayload, RunPayload};
use super::{ChunkStream, Conversation, ConversationHistory, ConversationStore, Telemetry};
use crate::config::ConsoleSettings;
use crate::error::ConsoleError;

/// 透過後端 JSON/HTTP API 實作的 `ConversationStore`。
pub struct HttpStore {
    base_url: Url,
    client: Client,
}

impl HttpStore {
    /// 為 `settings.api_base` 建立 HTTP 客戶端。
    ///
    /// 只限制連線階段的逾時；整個請求的逾時會切斷執行時間較長的串流。
    pub fn new(settings: &ConsoleSettings) -> Result<Self> {
        let base_url = Url::parse(&settings.api_base)
            .with_context(|| format!("invalid api_base: {}", settings.api_base))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("api_base cannot carry a path: {}", settings.api_base));
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { base_url, client })
    }

    /// 將經過百分比編碼的路徑片段附加到基底網址後。
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

/// 將非成功的狀態碼轉為 `RequestFailed`，並附上回應內容。
async fn expect_success(response: Response, action: &'static str) -> Result<Response, ConsoleError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    Err(ConsoleError::RequestFailed {
        action,
        status: Some(status.as_u16()),
        detail,
    })
}

#[async_trait]
impl ConversationStore for HttpStore {
    fn name(&self) -> &str {
        self.base_url.as_str()
    }

    async fn create_conversation(&self, title: Option<&str>) -> Result<Conversation, ConsoleError> {
        const ACTION: &str = "create conversation";
        let response = self
            .client
            .post(self.endpoint(&["conversations"]))
            .headers(json_headers())
            .json(&CreateConversationPayload { title })
            .send()
            .await
            .map_err(|err| ConsoleError::request(ACTION, err))?;
        let response = expect_success(response, ACTION).await?;
        response
            .json()
            .await
            .map_err(|source| ConsoleError::InvalidResponse { action: ACTION, source })
    }

    async fn history(&self, conversation_id: &str) -> Result<ConversationHistory, ConsoleError> {
        const ACTION: &str = "load history";
        let response = self
            .client
            .get(self.endpoint(&["conversations", conversation_id]))
            .send()
            .await
            .map_err(|err| ConsoleError::request(ACTION, err))?;
        let response = expect_success(response, ACTION).await?;
        response
            .json()
            .await
            .map_err(|source| ConsoleError::InvalidResponse { action: ACTION, source })
    }

    async fn telemetry(&self, conversation_id: &str) -> Result<Telemetry, ConsoleError> {
        const ACTION: &str = "load telemetry";
        let response = self
            .client
            .get(self.endpoint(&["conversations", conversation_id, "telemetry"]))
            .send()
            .await
            .map_err(|err| ConsoleError::request(ACTION, err))?;
        let response = expect_success(response, ACTION).await?;
        response
            .json()
            .await
            .map_err(|source| ConsoleError::InvalidResponse { action: ACTION, source })
    }

    async fn open_run(
        &self,
        conversation_id: &str,
        user_message: &str,
    ) -> Result<ChunkStream, ConsoleError> {
        const ACTION: &str = "start run";
        let mut headers = json_headers();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        let response = self
            .client
            .post(self.endpoint(&["conversations", conversation_id, "run", "stream"]))
            .headers(headers)
            .json(&RunPayload { user_message })
            .send()
            .await
            .map_err(|err| ConsoleError::request(ACTION, err))?;
        let response = expect_success(response, ACTION).await?;
        debug!(
            "run stream opened for {} ({:?})",
            conversation_id,
            response.headers().get(CONTENT_TYPE)
        );

        let chunks = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|err| ConsoleError::StreamTransport(err.to_string()))
        });
        Ok(Box::pin(chunks))
    }
}
