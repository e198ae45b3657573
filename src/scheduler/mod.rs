//! 搜索任务调度器
//!
//! 固定数量的worker从FIFO队列中领取任务，每个任务驱动对应边的
//! `Pending → Processing → Completed` 状态流转。完成的任务按完成顺序发布到进度通道。

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::GraphError;
use crate::graph::{EdgeState, GraphStore, NodeId, NodeKind, NodeResult, Reference, ReferenceId};
use crate::search::{SearchOptions, WebSearcher};

/// 取消时写入节点的错误标记
pub const CANCELLED_MARKER: &str = "cancelled";

/// 一个待执行的搜索任务
#[derive(Debug, Clone, PartialEq)]
pub struct SearchTask {
    pub node_id: NodeId,
    pub query: String,
}

impl SearchTask {
    pub fn new(node_id: impl Into<NodeId>, query: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            query: query.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed { reference_ids: Vec<ReferenceId> },
    /// 搜索失败或被取消，节点上已写入错误标记
    Failed { error: String },
    /// 批次取消时尚未开始的任务，节点与边保持原样
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub node_id: NodeId,
    pub query: String,
    pub outcome: TaskOutcome,
}

impl TaskReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Failed { .. })
    }
}

/// 一个批次的执行结果，报告按完成顺序排列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub reports: Vec<TaskReport>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.reports.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Completed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Skipped))
    }

    /// 批次非空且每个已启动的任务都失败了
    pub fn all_failed(&self) -> bool {
        let started = self.total() - self.skipped();
        started > 0 && self.failed() == started
    }

    fn count(&self, predicate: impl Fn(&TaskOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| predicate(&r.outcome)).count()
    }
}

pub struct TaskScheduler {
    graph: Arc<GraphStore>,
    searcher: Arc<dyn WebSearcher>,
    options: SearchOptions,
    progress: Option<UnboundedSender<TaskReport>>,
    cancel: CancellationToken,
}

/// 一次批次执行期间worker共享的状态
struct BatchState {
    queue: Mutex<VecDeque<SearchTask>>,
    reports: Mutex<Vec<TaskReport>>,
    fatal: Mutex<Option<GraphError>>,
}

impl TaskScheduler {
    pub fn new(
        graph: Arc<GraphStore>,
        searcher: Arc<dyn WebSearcher>,
        options: SearchOptions,
    ) -> Self {
        Self {
            graph,
            searcher,
            options,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    /// 任务完成后按完成顺序发送报告
    pub fn with_progress(mut self, sender: UnboundedSender<TaskReport>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 以最多 `max_parallel` 个并发执行一批搜索任务，等待全部完成
    ///
    /// 单个任务的搜索失败不会中断批次；图结构错误会停止领取新任务并返回给调用方。
    pub async fn run_batch(
        &self,
        tasks: Vec<SearchTask>,
        max_parallel: usize,
    ) -> Result<BatchSummary, GraphError> {
        self.validate(&tasks)?;

        let total = tasks.len();
        let workers = max_parallel.max(1).min(total);
        info!(total, workers, "starting search batch");

        let state = BatchState {
            queue: Mutex::new(tasks.into_iter().collect()),
            reports: Mutex::new(Vec::with_capacity(total)),
            fatal: Mutex::new(None),
        };

        join_all((0..workers).map(|worker| self.worker(worker, &state))).await;

        if let Some(error) = state
            .fatal
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
        {
            return Err(error);
        }

        let summary = BatchSummary {
            reports: state
                .reports
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
        };
        info!(
            total,
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            "search batch finished"
        );
        Ok(summary)
    }

    /// 任务启动前的整体校验：节点存在、是Search节点、入边为Pending、同一节点只出现一次
    fn validate(&self, tasks: &[SearchTask]) -> Result<(), GraphError> {
        let mut seen = HashSet::new();
        for task in tasks {
            if !seen.insert(task.node_id.as_str()) {
                return Err(GraphError::DuplicateTask(task.node_id.clone()));
            }
            let node = self
                .graph
                .get_node(&task.node_id)
                .ok_or_else(|| GraphError::UnknownNode(task.node_id.clone()))?;
            if node.kind != NodeKind::Search {
                return Err(GraphError::NotSearchNode(task.node_id.clone()));
            }
            let edge = self
                .graph
                .edge_into(&task.node_id)
                .ok_or_else(|| GraphError::UnknownNode(task.node_id.clone()))?;
            if edge.state != EdgeState::Pending {
                return Err(GraphError::EdgeNotPending {
                    node_id: task.node_id.clone(),
                    state: edge.state,
                });
            }
        }
        Ok(())
    }

    async fn worker(&self, worker: usize, state: &BatchState) {
        loop {
            let next = state
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(task) = next else {
                break;
            };

            let halted = self.cancel.is_cancelled()
                || state
                    .fatal
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_some();
            if halted {
                self.publish(
                    state,
                    TaskReport {
                        node_id: task.node_id,
                        query: task.query,
                        outcome: TaskOutcome::Skipped,
                    },
                );
                continue;
            }

            debug!(worker, node_id = %task.node_id, "task picked up");
            match self.execute(&task).await {
                Ok(outcome) => self.publish(
                    state,
                    TaskReport {
                        node_id: task.node_id,
                        query: task.query,
                        outcome,
                    },
                ),
                Err(error) => {
                    warn!(node_id = %task.node_id, %error, "search task hit a structural error");
                    let mut fatal = state.fatal.lock().unwrap_or_else(PoisonError::into_inner);
                    if fatal.is_none() {
                        *fatal = Some(error);
                    }
                }
            }
        }
    }

    /// 执行单个任务；搜索失败被转换为节点上的错误标记
    async fn execute(&self, task: &SearchTask) -> Result<TaskOutcome, GraphError> {
        let edge = self
            .graph
            .edge_into(&task.node_id)
            .ok_or_else(|| GraphError::UnknownNode(task.node_id.clone()))?;
        self.graph.transition_edge(&edge.id, EdgeState::Processing)?;

        let searched = tokio::select! {
            result = self.searcher.search(&task.query, &self.options) => {
                result.map_err(|e| e.to_string())
            }
            _ = self.cancel.cancelled() => Err(CANCELLED_MARKER.to_string()),
        };

        let outcome = match searched {
            Ok(response) => {
                let reference_ids: Vec<ReferenceId> = response
                    .results
                    .iter()
                    .map(|hit| self.graph.add_reference(Reference::from_hit(hit)))
                    .collect();
                info!(
                    node_id = %task.node_id,
                    hits = reference_ids.len(),
                    "search task completed"
                );
                self.graph.set_node_result(
                    &task.node_id,
                    NodeResult::Search(response),
                    reference_ids.clone(),
                )?;
                TaskOutcome::Completed { reference_ids }
            }
            Err(error) => {
                warn!(node_id = %task.node_id, %error, "search task failed");
                self.graph.set_node_result(
                    &task.node_id,
                    NodeResult::failed(error.clone()),
                    Vec::new(),
                )?;
                TaskOutcome::Failed { error }
            }
        };

        self.graph.transition_edge(&edge.id, EdgeState::Completed)?;
        Ok(outcome)
    }

    fn publish(&self, state: &BatchState, report: TaskReport) {
        if let Some(sender) = &self.progress {
            // 接收端已关闭时只丢弃进度，不影响批次
            let _ = sender.send(report.clone());
        }
        state
            .reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report);
    }
}

// Include tests
#[cfg(test)]
mod tests;
