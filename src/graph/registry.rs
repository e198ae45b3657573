use std::sync::Arc;

use super::GraphStore;
use super::types::{Reference, ReferenceId};

/// GraphStore上只开放引用增查能力的视图
///
/// 对话等只需要引用查找的组件持有它，而不是整张图。
#[derive(Clone)]
pub struct ReferenceRegistry {
    graph: Arc<GraphStore>,
}

impl ReferenceRegistry {
    pub fn new(graph: Arc<GraphStore>) -> Self {
        Self { graph }
    }

    pub fn create(&self, reference: Reference) -> ReferenceId {
        self.graph.add_reference(reference)
    }

    pub fn get(&self, reference_id: &str) -> Option<Reference> {
        self.graph.get_reference(reference_id)
    }

    /// 按登记顺序列出全部引用
    pub fn list(&self) -> Vec<Reference> {
        self.graph.all_references()
    }

    pub fn len(&self) -> usize {
        self.graph.reference_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 引用在登记顺序中的序号（从1开始）
    pub fn ordinal_of(&self, reference_id: &str) -> Option<usize> {
        self.list()
            .iter()
            .position(|r| r.id == reference_id)
            .map(|index| index + 1)
    }

    /// 将 `[n]` 序号解析回引用
    pub fn resolve_ordinal(&self, ordinal: usize) -> Option<Reference> {
        if ordinal == 0 {
            return None;
        }
        self.list().into_iter().nth(ordinal - 1)
    }

    /// 按登记顺序编号的引用清单
    pub fn render_numbered(&self) -> String {
        self.list()
            .iter()
            .enumerate()
            .map(|(i, r)| r.citation_line(i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
