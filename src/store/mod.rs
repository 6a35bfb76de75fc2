//! 主控台核心所使用的後端介面。
//!
//! 對話儲存（建立、歷史、遙測）與代理執行服務（串流執行）都透過同一個 trait 存取，
//! 讓會話控制器與遙測輪詢器可以在測試中換成假的實作。

pub mod http;
pub mod models;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::ConsoleError;
pub use models::{
    Conversation, ConversationHistory, LOCAL_ID_PREFIX, Message, Role, Telemetry, ToolCall,
    TraceStep,
};

/// 執行串流的原始內容，依抵達順序逐塊產出。
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ConsoleError>> + Send>>;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// 顯示用名稱，用於標題列與日誌。
    fn name(&self) -> &str;

    async fn create_conversation(&self, title: Option<&str>) -> Result<Conversation, ConsoleError>;

    /// 取得對話及其依時間排序的訊息。
    async fn history(&self, conversation_id: &str) -> Result<ConversationHistory, ConsoleError>;

    async fn telemetry(&self, conversation_id: &str) -> Result<Telemetry, ConsoleError>;

    /// 啟動一次代理執行。收到回應標頭後即返回；
    /// 非成功的狀態碼會在這裡回報，早於任何資料塊。
    async fn open_run(
        &self,
        conversation_id: &str,
        user_message: &str,
    ) -> Result<ChunkStream, ConsoleError>;
}
