//! 研究图与持久化文档之间的转换
//!
//! 文档结构：
//! `nodes{id: {kind, content, result?, referenceIds[], createdAt}}`、
//! `edges{sourceId: [{id, targetId, state}]}`、
//! `references{id: {title, source, authors[], date, snippet, relevanceScore}}`。
//! 所有映射都按插入顺序读写，引用的序号依赖这个顺序。

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::GraphStore;
use super::types::{Edge, EdgeState, Node, NodeKind, NodeResult, ROOT_NODE_ID, Reference};
use crate::errors::{Invariant, ValidationError};

/// 保持插入顺序、拒绝重复键的字符串映射，按键查找走哈希索引
#[derive(Debug, Clone)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<V: PartialEq> PartialEq for OrderedMap<V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.index.get(&key) {
            Some(&position) => self.entries[position].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&position| &self.entries[position].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        let position = *self.index.get(key)?;
        Some(&mut self.entries[position].1)
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let position = self.index.remove(key)?;
        let (_, value) = self.entries.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map with unique string keys")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = OrderedMap::new();
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            if map.get(&key).is_some() {
                return Err(serde::de::Error::custom(format!("duplicate key `{}`", key)));
            }
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub kind: NodeKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<NodeResult>,
    #[serde(default)]
    pub reference_ids: Vec<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    pub id: String,
    pub target_id: String,
    pub state: EdgeState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRecord {
    pub title: String,
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

/// 研究图的持久化文档
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: OrderedMap<NodeRecord>,
    #[serde(default)]
    pub edges: OrderedMap<Vec<EdgeRecord>>,
    #[serde(default)]
    pub references: OrderedMap<ReferenceRecord>,
}

impl GraphDocument {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json).map_err(|e| ValidationError::Malformed(e.to_string()))
    }
}

/// 导出图的快照
pub fn dump(graph: &GraphStore) -> GraphDocument {
    let mut document = GraphDocument::default();

    for node in graph.nodes() {
        document.nodes.insert(
            node.id,
            NodeRecord {
                kind: node.kind,
                content: node.content,
                result: node.result,
                reference_ids: node.reference_ids,
                created_at: node.created_at,
            },
        );
    }

    for edge in graph.edges() {
        let record = EdgeRecord {
            id: edge.id,
            target_id: edge.target_id,
            state: edge.state,
        };
        match document.edges.get_mut(&edge.source_id) {
            Some(group) => group.push(record),
            None => document.edges.insert(edge.source_id, vec![record]),
        }
    }

    for reference in graph.all_references() {
        document.references.insert(
            reference.id,
            ReferenceRecord {
                title: reference.title,
                source: reference.source,
                authors: reference.authors,
                date: reference.date,
                snippet: reference.snippet,
                relevance_score: reference.relevance_score,
            },
        );
    }

    document
}

/// 从文档重建图，五条图不变量全部重新校验
pub fn load(document: GraphDocument) -> Result<GraphStore, ValidationError> {
    validate(&document)?;

    let nodes = document
        .nodes
        .iter()
        .map(|(id, record)| Node {
            id: id.clone(),
            kind: record.kind,
            content: record.content.clone(),
            result: record.result.clone(),
            reference_ids: record.reference_ids.clone(),
            created_at: record.created_at,
        })
        .collect();

    // 文档按源节点分组存放边；每个非根节点恰有一条随其创建的入边，
    // 按目标节点的先后排序即可还原边的创建顺序
    let mut edges: Vec<Edge> = document
        .edges
        .iter()
        .flat_map(|(source_id, group)| {
            group.iter().map(move |record| Edge {
                id: record.id.clone(),
                source_id: source_id.clone(),
                target_id: record.target_id.clone(),
                state: record.state,
            })
        })
        .collect();
    edges.sort_by_key(|edge| document.nodes.position(&edge.target_id));

    let references = document
        .references
        .iter()
        .map(|(id, record)| Reference {
            id: id.clone(),
            title: record.title.clone(),
            source: record.source.clone(),
            authors: record.authors.clone(),
            date: record.date.clone(),
            snippet: record.snippet.clone(),
            relevance_score: record.relevance_score,
        })
        .collect();

    Ok(GraphStore::from_parts(nodes, edges, references))
}

fn validate(document: &GraphDocument) -> Result<(), ValidationError> {
    // 1. 唯一根节点，固定ID，最先创建
    let roots: Vec<_> = document
        .nodes
        .iter()
        .filter(|(_, n)| n.kind == NodeKind::Root)
        .collect();
    let root = match roots.as_slice() {
        [(id, record)] if id.as_str() == ROOT_NODE_ID => *record,
        [(id, _)] => {
            return Err(ValidationError::invariant(
                Invariant::SingleRoot,
                format!("root node has id `{}`, expected `{}`", id, ROOT_NODE_ID),
            ));
        }
        [] => {
            return Err(ValidationError::invariant(
                Invariant::SingleRoot,
                "document has no root node",
            ));
        }
        many => {
            return Err(ValidationError::invariant(
                Invariant::SingleRoot,
                format!("document has {} root nodes", many.len()),
            ));
        }
    };
    if let Some((id, _)) = document
        .nodes
        .iter()
        .find(|(id, n)| id.as_str() != ROOT_NODE_ID && n.created_at <= root.created_at)
    {
        return Err(ValidationError::invariant(
            Invariant::SingleRoot,
            format!("node `{}` is not newer than the root", id),
        ));
    }

    // 2. 边的两端都必须存在
    let mut edge_ids = HashSet::new();
    let mut parents: HashMap<&str, Vec<&str>> = HashMap::new();
    for (source_id, group) in document.edges.iter() {
        if document.nodes.get(source_id).is_none() {
            return Err(ValidationError::invariant(
                Invariant::EdgeEndpoints,
                format!("edges listed under unknown source `{}`", source_id),
            ));
        }
        for record in group {
            if !edge_ids.insert(record.id.as_str()) {
                return Err(ValidationError::Malformed(format!(
                    "duplicate edge id `{}`",
                    record.id
                )));
            }
            if document.nodes.get(&record.target_id).is_none() {
                return Err(ValidationError::invariant(
                    Invariant::EdgeEndpoints,
                    format!(
                        "edge `{}` points to unknown node `{}`",
                        record.id, record.target_id
                    ),
                ));
            }
            parents
                .entry(record.target_id.as_str())
                .or_default()
                .push(source_id.as_str());
        }
    }

    // 3. 已有结果的节点，其入边不可能仍是 Pending
    for (_, group) in document.edges.iter() {
        for record in group {
            let has_result = document
                .nodes
                .get(&record.target_id)
                .is_some_and(|n| n.result.is_some());
            if has_result && record.state == EdgeState::Pending {
                return Err(ValidationError::invariant(
                    Invariant::EdgeState,
                    format!(
                        "edge `{}` is pending but node `{}` already has a result",
                        record.id, record.target_id
                    ),
                ));
            }
        }
    }

    // 4. 节点引用必须全部可解析
    for (node_id, record) in document.nodes.iter() {
        if let Some(missing) = record
            .reference_ids
            .iter()
            .find(|id| document.references.get(id).is_none())
        {
            return Err(ValidationError::invariant(
                Invariant::ReferenceResolution,
                format!("node `{}` cites unknown reference `{}`", node_id, missing),
            ));
        }
    }

    // 5. 图必须是以根为起点的树：根无入边，其余节点恰好一条入边且都能从根到达
    if let Some(sources) = parents.get(ROOT_NODE_ID) {
        return Err(ValidationError::invariant(
            Invariant::Acyclic,
            format!("root has an incoming edge from `{}`", sources[0]),
        ));
    }
    for (node_id, _) in document.nodes.iter() {
        if node_id.as_str() == ROOT_NODE_ID {
            continue;
        }
        match parents.get(node_id.as_str()).map(Vec::len) {
            Some(1) => {}
            Some(n) => {
                return Err(ValidationError::invariant(
                    Invariant::Acyclic,
                    format!("node `{}` has {} parents", node_id, n),
                ));
            }
            None => {
                return Err(ValidationError::invariant(
                    Invariant::Acyclic,
                    format!("node `{}` has no parent", node_id),
                ));
            }
        }
    }

    let mut reached: HashSet<&str> = HashSet::from([ROOT_NODE_ID]);
    let mut queue = VecDeque::from([ROOT_NODE_ID]);
    while let Some(current) = queue.pop_front() {
        if let Some(group) = document.edges.get(current) {
            for record in group {
                if reached.insert(record.target_id.as_str()) {
                    queue.push_back(record.target_id.as_str());
                }
            }
        }
    }
    if let Some((unreached, _)) = document
        .nodes
        .iter()
        .find(|(id, _)| !reached.contains(id.as_str()))
    {
        return Err(ValidationError::invariant(
            Invariant::Acyclic,
            format!("node `{}` sits on a cycle unreachable from the root", unreached),
        ));
    }

    Ok(())
}

/// 将图写入JSON文件
pub async fn save_to_file(graph: &GraphStore, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = dump(graph)
        .to_json()
        .context("Failed to serialize research graph")?;
    tokio::fs::write(path, json)
        .await
        .context(format!("Failed to write research graph: {:?}", path))?;
    Ok(())
}

/// 从JSON文件加载并校验图
pub async fn load_from_file(path: &Path) -> Result<GraphStore> {
    let json = tokio::fs::read_to_string(path)
        .await
        .context(format!("Failed to read research graph: {:?}", path))?;
    let document = GraphDocument::from_json(&json)?;
    Ok(load(document)?)
}
