//! 人工反馈协作者：交互模式下审核子问题与报告

use std::io::Write;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Stdin};
use tokio::sync::Mutex;

use crate::errors::{CollaboratorError, ResearchError};

/// 恢复挂起阶段时调用方给出的决定
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackDecision {
    Approve,
    Feedback(String),
}

impl TryFrom<Value> for FeedbackDecision {
    type Error = ResearchError;

    /// `true` 表示通过，字符串表示修改意见，其余取值都是协议错误
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(true) => Ok(FeedbackDecision::Approve),
            Value::String(text) if text.trim().eq_ignore_ascii_case("true") => {
                Ok(FeedbackDecision::Approve)
            }
            Value::String(text) => Ok(FeedbackDecision::Feedback(text)),
            other => Err(ResearchError::UnsupportedFeedback(other.to_string())),
        }
    }
}

#[async_trait]
pub trait FeedbackProvider: Send + Sync {
    async fn request_feedback(&self, prompt: &str) -> Result<Value, CollaboratorError>;
}

/// 逐行读取反馈，整个运行期间共用同一个缓冲读取器，空行会重新提示
pub struct LineFeedback<R> {
    reader: Mutex<BufReader<R>>,
}

/// 从终端读取反馈
pub type StdinFeedback = LineFeedback<Stdin>;

impl StdinFeedback {
    pub fn stdin() -> Self {
        LineFeedback::new(tokio::io::stdin())
    }
}

impl<R: AsyncRead + Unpin + Send> LineFeedback<R> {
    pub fn new(input: R) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(input)),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> FeedbackProvider for LineFeedback<R> {
    async fn request_feedback(&self, prompt: &str) -> Result<Value, CollaboratorError> {
        let mut reader = self.reader.lock().await;
        println!("\n{}", prompt);
        loop {
            print!("> ");
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            let read = reader
                .read_line(&mut line)
                .await
                .map_err(|e| CollaboratorError::Feedback(e.to_string()))?;
            if read == 0 {
                return Err(CollaboratorError::Feedback(String::from(
                    "input closed before feedback was given",
                )));
            }

            let line = line.trim();
            if !line.is_empty() {
                return Ok(Value::String(line.to_string()));
            }
        }
    }
}

/// 依次返回预设取值，供非交互式驱动或测试使用
pub struct ScriptedFeedback {
    answers: std::sync::Mutex<std::collections::VecDeque<Value>>,
}

impl ScriptedFeedback {
    pub fn new(answers: Vec<Value>) -> Self {
        Self {
            answers: std::sync::Mutex::new(answers.into()),
        }
    }
}

#[async_trait]
impl FeedbackProvider for ScriptedFeedback {
    async fn request_feedback(&self, _prompt: &str) -> Result<Value, CollaboratorError> {
        self.answers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| CollaboratorError::Feedback(String::from("no scripted answer left")))
    }
}
