use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::search::{SearchHit, SearchResponse};

pub type NodeId = String;
pub type EdgeId = String;
pub type ReferenceId = String;

/// 根节点的固定ID
pub const ROOT_NODE_ID: &str = "root";

/// 节点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    Search,
    Response,
}

impl NodeKind {
    /// 生成节点ID时使用的前缀
    pub fn id_prefix(&self) -> &'static str {
        match self {
            NodeKind::Root => ROOT_NODE_ID,
            NodeKind::Search => "search",
            NodeKind::Response => "response",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Root => write!(f, "root"),
            NodeKind::Search => write!(f, "search"),
            NodeKind::Response => write!(f, "response"),
        }
    }
}

/// 边的生命周期状态，只能单调前进
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeState {
    Pending,
    Processing,
    Completed,
}

impl EdgeState {
    /// `next` 是否严格位于当前状态之后
    pub fn can_advance_to(&self, next: EdgeState) -> bool {
        next > *self
    }
}

impl std::fmt::Display for EdgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeState::Pending => write!(f, "pending"),
            EdgeState::Processing => write!(f, "processing"),
            EdgeState::Completed => write!(f, "completed"),
        }
    }
}

/// 节点任务完成后的负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeResult {
    /// Response节点的生成文本
    Text(String),
    /// 任务失败或被取消时的错误标记
    Failed { error: String },
    /// Search节点的原始搜索结果
    Search(SearchResponse),
}

impl NodeResult {
    pub fn failed(message: impl Into<String>) -> Self {
        NodeResult::Failed {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, NodeResult::Failed { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            NodeResult::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            NodeResult::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_search(&self) -> Option<&SearchResponse> {
        match self {
            NodeResult::Search(response) => Some(response),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// 产生该节点的问题或提示词
    pub content: String,
    pub result: Option<NodeResult>,
    /// 插入顺序即引用顺序
    pub reference_ids: Vec<ReferenceId>,
    /// 毫秒时间戳，在同一张图内严格递增
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub state: EdgeState,
}

/// 由一条搜索结果派生的可引用记录，创建后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub id: ReferenceId,
    pub title: String,
    /// URL或引用字符串
    pub source: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub relevance_score: f64,
}

impl Reference {
    pub fn new(title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            source: source.into(),
            authors: Vec::new(),
            date: String::new(),
            snippet: String::new(),
            relevance_score: 0.0,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn with_relevance_score(mut self, score: f64) -> Self {
        self.relevance_score = score;
        self
    }

    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    /// 每条搜索结果都生成一个新的Reference，不做内容去重
    pub fn from_hit(hit: &SearchHit) -> Self {
        Reference::new(&hit.title, &hit.url)
            .with_snippet(&hit.content)
            .with_relevance_score(hit.score)
    }

    /// 报告与对话中使用的引用行
    pub fn citation_line(&self, ordinal: usize) -> String {
        format!("{}. {} - {}", ordinal, self.title, self.source)
    }
}
