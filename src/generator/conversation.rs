//! 基于研究结果的追问对话
//!
//! 回答中的 `[n]` 引用按引用清单的登记顺序解析回Reference。

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::{ResearchError, ValidationError};
use crate::generator::research::ResearchOutcome;
use crate::graph::{GraphStore, NodeResult, Reference, ReferenceId, ReferenceRegistry};
use crate::llm::{ChatRole, ChatTurn, TextGenerator};

static CITATION: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").ok());

/// 对话中的一条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    #[serde(default)]
    pub reference_ids: Vec<ReferenceId>,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(role: ChatRole, content: impl Into<String>, reference_ids: Vec<ReferenceId>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            reference_ids,
            timestamp: Utc::now(),
        }
    }
}

/// 回答追问时使用的研究结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    #[serde(default)]
    pub final_report: String,
    /// 子问题 → 搜索结果
    #[serde(default)]
    pub search_results: BTreeMap<String, NodeResult>,
}

/// 对话的持久化形式
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDocument {
    pub messages: Vec<ConversationMessage>,
    /// 按登记顺序的引用快照
    pub references: Vec<Reference>,
    pub research_context: ConversationContext,
}

pub struct Conversation {
    generator: Arc<dyn TextGenerator>,
    references: ReferenceRegistry,
    context: ConversationContext,
    messages: Vec<ConversationMessage>,
}

impl Conversation {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        references: ReferenceRegistry,
        context: ConversationContext,
    ) -> Self {
        Self {
            generator,
            references,
            context,
            messages: Vec::new(),
        }
    }

    /// 以一次研究的报告与搜索结果作为上下文
    pub fn from_outcome(generator: Arc<dyn TextGenerator>, outcome: &ResearchOutcome) -> Self {
        let context = ConversationContext {
            final_report: outcome.final_report.clone(),
            search_results: outcome.graph.all_search_results(),
        };
        Self::new(generator, outcome.graph.references(), context)
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn research_context(&self) -> &ConversationContext {
        &self.context
    }

    /// 提出追问，返回带引用的回答
    ///
    /// 生成失败时本轮问题不会留在历史中。
    pub async fn ask(&mut self, question: &str) -> Result<String, ResearchError> {
        let history: Vec<ChatTurn> = self
            .messages
            .iter()
            .map(|m| ChatTurn {
                role: m.role,
                content: m.content.clone(),
            })
            .collect();
        self.messages
            .push(ConversationMessage::new(ChatRole::User, question, Vec::new()));

        let user_prompt = format!(
            include_str!("prompts/conversation_user.tpl"),
            question,
            self.render_context(),
            self.references.render_numbered()
        );
        let answer = match self
            .generator
            .generate(
                include_str!("prompts/conversation_sys.tpl"),
                &user_prompt,
                &history,
            )
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                self.messages.pop();
                return Err(e.into());
            }
        };

        let reference_ids = self.cited_references(&answer);
        info!(citations = reference_ids.len(), "follow-up question answered");
        self.messages.push(ConversationMessage::new(
            ChatRole::Assistant,
            answer.clone(),
            reference_ids,
        ));
        Ok(answer)
    }

    fn render_context(&self) -> String {
        let mut text = format!("{}\n\n", self.context.final_report);
        if !self.context.search_results.is_empty() {
            text.push_str("Additional search results:\n");
            for (query, result) in &self.context.search_results {
                text.push_str(&format!("Query: {}\n", query));
                if let Some(response) = result.as_search() {
                    for (i, hit) in response.results.iter().enumerate() {
                        text.push_str(&format!("Result {}: {}\n", i + 1, hit.content));
                    }
                }
                text.push('\n');
            }
        }
        text
    }

    /// 解析回答中的 `[n]` 引用，按首次出现的顺序去重
    fn cited_references(&self, answer: &str) -> Vec<ReferenceId> {
        let Some(pattern) = CITATION.as_ref() else {
            return Vec::new();
        };
        let mut ids: Vec<ReferenceId> = Vec::new();
        for captures in pattern.captures_iter(answer) {
            let Some(ordinal) = captures.get(1).and_then(|m| m.as_str().parse::<usize>().ok())
            else {
                continue;
            };
            if let Some(reference) = self.references.resolve_ordinal(ordinal) {
                if !ids.contains(&reference.id) {
                    ids.push(reference.id);
                }
            }
        }
        ids
    }

    pub fn to_document(&self) -> ConversationDocument {
        ConversationDocument {
            messages: self.messages.clone(),
            references: self.references.list(),
            research_context: self.context.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_document())
    }

    /// 从JSON恢复对话，引用快照重建为独立的引用清单
    pub fn from_json(generator: Arc<dyn TextGenerator>, json: &str) -> Result<Self, ResearchError> {
        let document: ConversationDocument = serde_json::from_str(json)
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;

        let store = Arc::new(GraphStore::new());
        for reference in document.references {
            store.add_reference(reference);
        }

        Ok(Self {
            generator,
            references: store.references(),
            context: document.research_context,
            messages: document.messages,
        })
    }

    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = self.to_json().context("Failed to serialize conversation")?;
        tokio::fs::write(path, json)
            .await
            .context(format!("Failed to write conversation: {:?}", path))?;
        Ok(())
    }

    pub async fn load_from_file(generator: Arc<dyn TextGenerator>, path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .context(format!("Failed to read conversation: {:?}", path))?;
        Ok(Self::from_json(generator, &json)?)
    }
}
