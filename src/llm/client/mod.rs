//! LLM客户端 - 基于rig的文本生成实现

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rig::completion::Message;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use super::{ChatRole, ChatTurn, TextGenerator};
use crate::config::LLMConfig;
use crate::errors::CollaboratorError;

mod providers;

use providers::ProviderClient;

/// 提示词长度超过该值时直接使用高质量模型
const EFFICIENT_MODEL_PROMPT_LIMIT: usize = 32 * 1024;

/// LLM客户端 - 提供统一的LLM服务接口
#[derive(Clone)]
pub struct LLMClient {
    config: LLMConfig,
    client: ProviderClient,
}

impl LLMClient {
    /// 创建新的LLM客户端
    pub fn new(config: &LLMConfig) -> Result<Self> {
        let client = ProviderClient::new(config)?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// 检查模型连接和功能是否正常
    pub async fn check_connection(&self) -> Result<()> {
        println!("🔄 正在检查模型连接...");
        match self
            .chat("You are a helpful assistant.", "Hello", &[])
            .await
        {
            Ok(_) => {
                println!("✅ 模型连接正常");
                Ok(())
            }
            Err(e) => {
                eprintln!("❌ 模型连接失败: {}", e);
                Err(e)
            }
        }
    }

    /// 按提示词长度选择模型，返回（首选模型，备选模型）
    fn evaluate_befitting_model(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> (String, Option<String>) {
        if system_prompt.len() + user_prompt.len() <= EFFICIENT_MODEL_PROMPT_LIMIT
            && self.config.model_efficient != self.config.model_powerful
        {
            return (
                self.config.model_efficient.clone(),
                Some(self.config.model_powerful.clone()),
            );
        }
        (self.config.model_powerful.clone(), None)
    }

    /// 通用重试逻辑，单次调用受 timeout_seconds 限制
    async fn retry_with_backoff<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, anyhow::Error>>,
    {
        let max_retries = self.config.retry_attempts.max(1);
        let retry_delay = Duration::from_millis(self.config.retry_delay_ms);
        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let mut retries = 0;

        loop {
            let attempt = match tokio::time::timeout(timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(anyhow!("模型调用超时（{}秒）", timeout.as_secs())),
            };
            match attempt {
                Ok(result) => return Ok(result),
                Err(err) => {
                    retries += 1;
                    warn!(retries, max_retries, error = %err, "LLM call failed");
                    if retries >= max_retries {
                        return Err(err);
                    }
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }

    /// 带历史的单轮对话，首选模型多次失败后切换到备选模型
    pub async fn chat(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        history: &[ChatTurn],
    ) -> Result<String> {
        let (befitting_model, fallover_model) =
            self.evaluate_befitting_model(system_prompt, user_prompt);

        let chat_history: Vec<Message> = history
            .iter()
            .map(|turn| match turn.role {
                ChatRole::User => Message::user(turn.content.clone()),
                ChatRole::Assistant => Message::assistant(turn.content.clone()),
            })
            .collect();

        let agent = self
            .client
            .create_agent(&befitting_model, system_prompt, &self.config);
        let first = self
            .retry_with_backoff(|| agent.chat(user_prompt, chat_history.clone()))
            .await;

        match (first, fallover_model) {
            (Ok(text), _) => Ok(text),
            (Err(e), Some(model)) => {
                info!(model = %model, error = %e, "switching to fallback model");
                let agent = self.client.create_agent(&model, system_prompt, &self.config);
                self.retry_with_backoff(|| agent.chat(user_prompt, chat_history.clone()))
                    .await
            }
            (Err(e), None) => Err(e),
        }
    }
}

#[async_trait]
impl TextGenerator for LLMClient {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        history: &[ChatTurn],
    ) -> Result<String, CollaboratorError> {
        self.chat(system_prompt, user_prompt, history)
            .await
            .map_err(|e| CollaboratorError::Generation(format!("{:#}", e)))
    }
}
