//! 研究任务图：节点、边与引用的内存存储
//!
//! 结构性修改（新增节点/边）会短暂持有表级写锁；单个节点或边的内容修改只锁定该条目，
//! 不同节点之间的写入可以并发进行。

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;
use uuid::Uuid;

use crate::errors::GraphError;

pub mod registry;
pub mod serializer;
pub mod types;

pub use registry::ReferenceRegistry;
pub use serializer::GraphDocument;
pub use types::{
    Edge, EdgeId, EdgeState, Node, NodeId, NodeKind, NodeResult, ROOT_NODE_ID, Reference,
    ReferenceId,
};

#[derive(Default)]
struct NodeTable {
    order: Vec<NodeId>,
    slots: HashMap<NodeId, Arc<Mutex<Node>>>,
}

#[derive(Default)]
struct EdgeTable {
    order: Vec<EdgeId>,
    slots: HashMap<EdgeId, Arc<Mutex<Edge>>>,
    /// 每个非根节点恰好有一条入边
    by_target: HashMap<NodeId, EdgeId>,
    by_source: HashMap<NodeId, Vec<EdgeId>>,
}

#[derive(Default)]
struct ReferenceTable {
    order: Vec<ReferenceId>,
    entries: HashMap<ReferenceId, Reference>,
}

/// 研究图存储
///
/// 加锁顺序固定为 nodes → edges → references。
#[derive(Default)]
pub struct GraphStore {
    nodes: RwLock<NodeTable>,
    edges: RwLock<EdgeTable>,
    references: RwLock<ReferenceTable>,
    clock: AtomicI64,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由已校验的部件重建图，供反序列化使用
    pub(crate) fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>, references: Vec<Reference>) -> Self {
        let latest = nodes.iter().map(|n| n.created_at).max().unwrap_or(0);

        let mut node_table = NodeTable::default();
        for node in nodes {
            node_table.order.push(node.id.clone());
            node_table
                .slots
                .insert(node.id.clone(), Arc::new(Mutex::new(node)));
        }

        let mut edge_table = EdgeTable::default();
        for edge in edges {
            edge_table.order.push(edge.id.clone());
            edge_table
                .by_target
                .insert(edge.target_id.clone(), edge.id.clone());
            edge_table
                .by_source
                .entry(edge.source_id.clone())
                .or_default()
                .push(edge.id.clone());
            edge_table
                .slots
                .insert(edge.id.clone(), Arc::new(Mutex::new(edge)));
        }

        let mut reference_table = ReferenceTable::default();
        for reference in references {
            reference_table.order.push(reference.id.clone());
            reference_table
                .entries
                .insert(reference.id.clone(), reference);
        }

        Self {
            nodes: RwLock::new(node_table),
            edges: RwLock::new(edge_table),
            references: RwLock::new(reference_table),
            clock: AtomicI64::new(latest),
        }
    }

    /// 生成严格递增的毫秒时间戳
    fn next_timestamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut last = self.clock.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self
                .clock
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    fn mint_node_id(table: &NodeTable, kind: NodeKind) -> NodeId {
        loop {
            let suffix = Uuid::new_v4().simple().to_string();
            let candidate = format!("{}_{}", kind.id_prefix(), &suffix[..8]);
            if !table.slots.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// 创建根节点，整张图只允许一个
    pub fn add_root_node(&self, content: &str) -> Result<NodeId, GraphError> {
        let mut nodes = write(&self.nodes);
        if nodes.slots.contains_key(ROOT_NODE_ID) {
            return Err(GraphError::DuplicateRoot);
        }

        let node = Node {
            id: ROOT_NODE_ID.to_string(),
            kind: NodeKind::Root,
            content: content.to_string(),
            result: None,
            reference_ids: Vec::new(),
            created_at: self.next_timestamp(),
        };
        nodes.order.push(node.id.clone());
        nodes
            .slots
            .insert(node.id.clone(), Arc::new(Mutex::new(node)));

        debug!("root node created");
        Ok(ROOT_NODE_ID.to_string())
    }

    /// 在已有父节点下创建子节点，同时创建一条 Pending 状态的父→子边
    pub fn add_child_node(
        &self,
        parent_id: &str,
        kind: NodeKind,
        content: &str,
    ) -> Result<NodeId, GraphError> {
        if kind == NodeKind::Root {
            return Err(GraphError::DuplicateRoot);
        }

        let mut nodes = write(&self.nodes);
        if !nodes.slots.contains_key(parent_id) {
            return Err(GraphError::UnknownParent(parent_id.to_string()));
        }
        let mut edges = write(&self.edges);

        let node_id = Self::mint_node_id(&nodes, kind);
        let node = Node {
            id: node_id.clone(),
            kind,
            content: content.to_string(),
            result: None,
            reference_ids: Vec::new(),
            created_at: self.next_timestamp(),
        };
        let edge = Edge {
            id: format!("{}_{}", parent_id, node_id),
            source_id: parent_id.to_string(),
            target_id: node_id.clone(),
            state: EdgeState::Pending,
        };

        nodes.order.push(node_id.clone());
        nodes
            .slots
            .insert(node_id.clone(), Arc::new(Mutex::new(node)));

        edges.order.push(edge.id.clone());
        edges.by_target.insert(node_id.clone(), edge.id.clone());
        edges
            .by_source
            .entry(parent_id.to_string())
            .or_default()
            .push(edge.id.clone());
        edges
            .slots
            .insert(edge.id.clone(), Arc::new(Mutex::new(edge)));

        debug!(%node_id, parent_id, %kind, "child node created");
        Ok(node_id)
    }

    fn node_slot(&self, node_id: &str) -> Option<Arc<Mutex<Node>>> {
        read(&self.nodes).slots.get(node_id).cloned()
    }

    fn edge_slot(&self, edge_id: &str) -> Option<Arc<Mutex<Edge>>> {
        read(&self.edges).slots.get(edge_id).cloned()
    }

    /// 写入节点结果，每个节点只允许写入一次
    ///
    /// 校验失败时节点保持不变。
    pub fn set_node_result(
        &self,
        node_id: &str,
        result: NodeResult,
        reference_ids: Vec<ReferenceId>,
    ) -> Result<(), GraphError> {
        let slot = self
            .node_slot(node_id)
            .ok_or_else(|| GraphError::UnknownNode(node_id.to_string()))?;

        {
            let references = read(&self.references);
            if let Some(missing) = reference_ids
                .iter()
                .find(|id| !references.entries.contains_key(*id))
            {
                return Err(GraphError::DanglingReference {
                    node_id: node_id.to_string(),
                    reference_id: missing.clone(),
                });
            }
        }

        let mut node = lock(&slot);
        if node.result.is_some() {
            return Err(GraphError::ResultAlreadySet(node_id.to_string()));
        }
        node.result = Some(result);
        node.reference_ids = reference_ids;
        Ok(())
    }

    /// 推进边的状态，只允许向后推进
    pub fn transition_edge(&self, edge_id: &str, new_state: EdgeState) -> Result<(), GraphError> {
        let slot = self
            .edge_slot(edge_id)
            .ok_or_else(|| GraphError::UnknownEdge(edge_id.to_string()))?;

        let mut edge = lock(&slot);
        if !edge.state.can_advance_to(new_state) {
            return Err(GraphError::InvalidTransition {
                edge_id: edge_id.to_string(),
                from: edge.state,
                to: new_state,
            });
        }
        debug!(edge_id, from = %edge.state, to = %new_state, "edge transition");
        edge.state = new_state;
        Ok(())
    }

    /// 登记引用，不按内容去重
    pub fn add_reference(&self, mut reference: Reference) -> ReferenceId {
        let mut references = write(&self.references);
        while references.entries.contains_key(&reference.id) {
            reference.id = Uuid::new_v4().to_string();
        }
        let id = reference.id.clone();
        references.order.push(id.clone());
        references.entries.insert(id.clone(), reference);
        id
    }

    pub fn get_reference(&self, reference_id: &str) -> Option<Reference> {
        read(&self.references).entries.get(reference_id).cloned()
    }

    /// 按登记顺序返回全部引用
    pub fn all_references(&self) -> Vec<Reference> {
        let references = read(&self.references);
        references
            .order
            .iter()
            .filter_map(|id| references.entries.get(id).cloned())
            .collect()
    }

    /// 节点引用的Reference，按节点内的引用顺序
    pub fn get_references_of(&self, node_id: &str) -> Result<Vec<Reference>, GraphError> {
        let node = self
            .get_node(node_id)
            .ok_or_else(|| GraphError::UnknownNode(node_id.to_string()))?;
        let references = read(&self.references);
        Ok(node
            .reference_ids
            .iter()
            .filter_map(|id| references.entries.get(id).cloned())
            .collect())
    }

    pub fn get_node(&self, node_id: &str) -> Option<Node> {
        self.node_slot(node_id).map(|slot| lock(&slot).clone())
    }

    pub fn get_edge(&self, edge_id: &str) -> Option<Edge> {
        self.edge_slot(edge_id).map(|slot| lock(&slot).clone())
    }

    /// 指向该节点的唯一入边
    pub fn edge_into(&self, node_id: &str) -> Option<Edge> {
        let slot = {
            let edges = read(&self.edges);
            let edge_id = edges.by_target.get(node_id)?;
            edges.slots.get(edge_id).cloned()
        }?;
        let edge = lock(&slot).clone();
        Some(edge)
    }

    /// 从该节点出发的边，按创建顺序
    pub fn edges_from(&self, node_id: &str) -> Vec<Edge> {
        let slots: Vec<_> = {
            let edges = read(&self.edges);
            edges
                .by_source
                .get(node_id)
                .map(|ids| ids.iter().filter_map(|id| edges.slots.get(id).cloned()).collect())
                .unwrap_or_default()
        };
        slots.iter().map(|slot| lock(slot).clone()).collect()
    }

    pub fn children_of(&self, node_id: &str) -> Vec<Node> {
        self.edges_from(node_id)
            .iter()
            .filter_map(|edge| self.get_node(&edge.target_id))
            .collect()
    }

    pub fn root(&self) -> Option<Node> {
        self.get_node(ROOT_NODE_ID)
    }

    /// 全部节点，按创建顺序
    pub fn nodes(&self) -> Vec<Node> {
        let slots: Vec<_> = {
            let nodes = read(&self.nodes);
            nodes
                .order
                .iter()
                .filter_map(|id| nodes.slots.get(id).cloned())
                .collect()
        };
        slots.iter().map(|slot| lock(slot).clone()).collect()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<Node> {
        self.nodes().into_iter().filter(|n| n.kind == kind).collect()
    }

    /// 全部边，按创建顺序
    pub fn edges(&self) -> Vec<Edge> {
        let slots: Vec<_> = {
            let edges = read(&self.edges);
            edges
                .order
                .iter()
                .filter_map(|id| edges.slots.get(id).cloned())
                .collect()
        };
        slots.iter().map(|slot| lock(slot).clone()).collect()
    }

    /// Search节点的问题 → 搜索结果
    pub fn all_search_results(&self) -> BTreeMap<String, NodeResult> {
        self.nodes_of_kind(NodeKind::Search)
            .into_iter()
            .filter_map(|node| node.result.map(|result| (node.content, result)))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        read(&self.nodes).order.len()
    }

    pub fn edge_count(&self) -> usize {
        read(&self.edges).order.len()
    }

    pub fn reference_count(&self) -> usize {
        read(&self.references).order.len()
    }

    /// 仅限引用增查的视图
    pub fn references(self: &Arc<Self>) -> ReferenceRegistry {
        ReferenceRegistry::new(Arc::clone(self))
    }

    pub fn export(&self) -> GraphDocument {
        serializer::dump(self)
    }

    pub fn import(document: GraphDocument) -> Result<Self, crate::errors::ValidationError> {
        serializer::load(document)
    }
}
