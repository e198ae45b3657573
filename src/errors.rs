//! 研究引擎的错误分类

use std::fmt;

use thiserror::Error;

use crate::graph::types::EdgeState;

/// 图结构错误，对当前操作总是致命的，不会重试
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("a root node already exists")]
    DuplicateRoot,

    #[error("unknown parent node `{0}`")]
    UnknownParent(String),

    #[error("unknown node `{0}`")]
    UnknownNode(String),

    #[error("unknown edge `{0}`")]
    UnknownEdge(String),

    #[error("node `{node_id}` cites unknown reference `{reference_id}`")]
    DanglingReference {
        node_id: String,
        reference_id: String,
    },

    #[error("edge `{edge_id}` cannot move from {from} to {to}")]
    InvalidTransition {
        edge_id: String,
        from: EdgeState,
        to: EdgeState,
    },

    #[error("node `{0}` already carries a result")]
    ResultAlreadySet(String),

    #[error("node `{0}` appears more than once in the batch")]
    DuplicateTask(String),

    #[error("node `{0}` is not a search node")]
    NotSearchNode(String),

    #[error("edge into node `{node_id}` is {state}, expected pending")]
    EdgeNotPending { node_id: String, state: EdgeState },
}

/// 外部协作者（文本生成、网络搜索、人工反馈）的失败
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollaboratorError {
    #[error("search failed: {0}")]
    Search(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("feedback channel failed: {0}")]
    Feedback(String),
}

/// 加载持久化文档时校验的图不变量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invariant {
    SingleRoot,
    EdgeEndpoints,
    EdgeState,
    ReferenceResolution,
    Acyclic,
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invariant::SingleRoot => write!(f, "single-root"),
            Invariant::EdgeEndpoints => write!(f, "edge-endpoints"),
            Invariant::EdgeState => write!(f, "edge-state"),
            Invariant::ReferenceResolution => write!(f, "reference-resolution"),
            Invariant::Acyclic => write!(f, "acyclic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invariant {invariant} violated: {detail}")]
    Invariant { invariant: Invariant, detail: String },

    #[error("malformed graph document: {0}")]
    Malformed(String),
}

impl ValidationError {
    pub fn invariant(invariant: Invariant, detail: impl Into<String>) -> Self {
        ValidationError::Invariant {
            invariant,
            detail: detail.into(),
        }
    }

    /// 返回被违反的不变量（文档格式错误时为 None）
    pub fn violated(&self) -> Option<Invariant> {
        match self {
            ValidationError::Invariant { invariant, .. } => Some(*invariant),
            ValidationError::Malformed(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ResearchError {
    #[error(transparent)]
    Structural(#[from] GraphError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("phase {phase} failed: {failed}/{total} tasks failed")]
    PhaseFailed {
        phase: String,
        failed: usize,
        total: usize,
    },

    #[error("phase {phase} was cancelled")]
    Cancelled { phase: String },

    #[error("unsupported feedback value: {0}")]
    UnsupportedFeedback(String),

    #[error("orchestrator is in phase {actual}, expected {expected}")]
    InvalidPhase { expected: String, actual: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}
