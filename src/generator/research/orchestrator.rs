use std::sync::Arc;

use tracing::{info, warn};

use crate::errors::{GraphError, ResearchError};
use crate::feedback::FeedbackDecision;
use crate::generator::context::ResearchContext;
use crate::graph::{EdgeState, GraphStore, Node, NodeKind, NodeResult, ROOT_NODE_ID};
use crate::llm::ChatTurn;
use crate::scheduler::{SearchTask, TaskScheduler};
use crate::search::SearchOptions;

use super::questions::parse_sub_questions;

/// 恢复持久化的研究图时，写入中断任务节点的错误标记
pub const INTERRUPTED_MARKER: &str = "interrupted";

/// 研究流程的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearchPhase {
    Seeded,
    QuestionsGenerated,
    AwaitingQuestionApproval,
    GraphExpanded,
    ReportGenerated,
    AwaitingReportApproval,
    Done,
}

impl ResearchPhase {
    pub fn is_suspended(&self) -> bool {
        matches!(
            self,
            ResearchPhase::AwaitingQuestionApproval | ResearchPhase::AwaitingReportApproval
        )
    }
}

impl std::fmt::Display for ResearchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResearchPhase::Seeded => write!(f, "Seeded"),
            ResearchPhase::QuestionsGenerated => write!(f, "QuestionsGenerated"),
            ResearchPhase::AwaitingQuestionApproval => write!(f, "AwaitingQuestionApproval"),
            ResearchPhase::GraphExpanded => write!(f, "GraphExpanded"),
            ResearchPhase::ReportGenerated => write!(f, "ReportGenerated"),
            ResearchPhase::AwaitingReportApproval => write!(f, "AwaitingReportApproval"),
            ResearchPhase::Done => write!(f, "Done"),
        }
    }
}

/// 研究完成后的产物
#[derive(Clone)]
pub struct ResearchOutcome {
    pub final_report: String,
    pub graph: Arc<GraphStore>,
}

/// 一次生成调用的提示词与回答，反馈重新生成时作为历史传入
#[derive(Debug, Clone, Default)]
struct Exchange {
    user_prompt: String,
    answer: String,
}

impl Exchange {
    fn as_history(&self) -> Vec<ChatTurn> {
        vec![
            ChatTurn::user(self.user_prompt.clone()),
            ChatTurn::assistant(self.answer.clone()),
        ]
    }
}

/// 研究流程的阶段状态机
///
/// `advance` 执行下一个自动阶段，`resume` 回答挂起的审核，`run` 驱动到 `Done`。
pub struct ResearchOrchestrator {
    context: ResearchContext,
    graph: Arc<GraphStore>,
    topic: String,
    phase: ResearchPhase,
    questions: Vec<String>,
    question_exchange: Option<Exchange>,
    report: Option<String>,
    report_exchange: Option<Exchange>,
}

impl ResearchOrchestrator {
    /// 由主题创建根节点，进入 `Seeded`
    pub fn new(context: ResearchContext, topic: &str) -> Result<Self, ResearchError> {
        context.config.validate()?;

        let graph = Arc::new(GraphStore::new());
        graph.add_root_node(topic)?;
        info!(topic, "research seeded");

        Ok(Self {
            context,
            graph,
            topic: topic.to_string(),
            phase: ResearchPhase::Seeded,
            questions: Vec::new(),
            question_exchange: None,
            report: None,
            report_exchange: None,
        })
    }

    /// 从持久化的研究图恢复
    ///
    /// 停留在 Processing 的边视为中断，标记失败后置为 Completed；
    /// 之后的扩展阶段只重跑 Pending 任务、只为缺少Response的Search节点生成回答。
    pub fn from_graph(
        context: ResearchContext,
        graph: Arc<GraphStore>,
    ) -> Result<Self, ResearchError> {
        context.config.validate()?;

        let root = graph
            .root()
            .ok_or_else(|| GraphError::UnknownNode(ROOT_NODE_ID.to_string()))?;

        let search_nodes = graph.nodes_of_kind(NodeKind::Search);
        for node in &search_nodes {
            let Some(edge) = graph.edge_into(&node.id) else {
                continue;
            };
            if edge.state != EdgeState::Processing {
                continue;
            }
            if node.result.is_none() {
                graph.set_node_result(&node.id, NodeResult::failed(INTERRUPTED_MARKER), Vec::new())?;
            }
            graph.transition_edge(&edge.id, EdgeState::Completed)?;
            warn!(node_id = %node.id, "interrupted search task marked as failed");
        }

        let questions: Vec<String> = search_nodes.into_iter().map(|n| n.content).collect();
        let phase = if questions.is_empty() {
            ResearchPhase::Seeded
        } else {
            ResearchPhase::QuestionsGenerated
        };
        info!(topic = %root.content, questions = questions.len(), %phase, "research resumed");

        Ok(Self {
            context,
            graph,
            topic: root.content,
            phase,
            questions,
            question_exchange: None,
            report: None,
            report_exchange: None,
        })
    }

    pub fn phase(&self) -> ResearchPhase {
        self.phase
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    pub fn report(&self) -> Option<&str> {
        self.report.as_deref()
    }

    pub fn graph(&self) -> Arc<GraphStore> {
        Arc::clone(&self.graph)
    }

    /// 流程结束后的产物
    pub fn outcome(&self) -> Option<ResearchOutcome> {
        if self.phase != ResearchPhase::Done {
            return None;
        }
        self.report.as_ref().map(|report| ResearchOutcome {
            final_report: report.clone(),
            graph: self.graph(),
        })
    }

    /// 执行下一个自动阶段，返回进入的新阶段
    pub async fn advance(&mut self) -> Result<ResearchPhase, ResearchError> {
        let next = match self.phase {
            ResearchPhase::Seeded => {
                self.generate_questions(None).await?;
                ResearchPhase::QuestionsGenerated
            }
            ResearchPhase::QuestionsGenerated => {
                if self.context.config.interactive && !self.has_search_nodes() {
                    ResearchPhase::AwaitingQuestionApproval
                } else {
                    self.expand_graph().await?;
                    ResearchPhase::GraphExpanded
                }
            }
            ResearchPhase::GraphExpanded => {
                self.generate_report(None).await?;
                ResearchPhase::ReportGenerated
            }
            ResearchPhase::ReportGenerated => {
                if self.context.config.interactive {
                    ResearchPhase::AwaitingReportApproval
                } else {
                    ResearchPhase::Done
                }
            }
            ResearchPhase::AwaitingQuestionApproval | ResearchPhase::AwaitingReportApproval => {
                return Err(ResearchError::InvalidPhase {
                    expected: String::from("a phase that can advance without feedback"),
                    actual: self.phase.to_string(),
                });
            }
            ResearchPhase::Done => return Ok(ResearchPhase::Done),
        };
        self.enter(next).await;
        Ok(next)
    }

    /// 回答挂起阶段的审核
    pub async fn resume(
        &mut self,
        decision: FeedbackDecision,
    ) -> Result<ResearchPhase, ResearchError> {
        let next = match (self.phase, decision) {
            (ResearchPhase::AwaitingQuestionApproval, FeedbackDecision::Approve) => {
                self.expand_graph().await?;
                ResearchPhase::GraphExpanded
            }
            (ResearchPhase::AwaitingQuestionApproval, FeedbackDecision::Feedback(feedback)) => {
                self.generate_questions(Some(&feedback)).await?;
                ResearchPhase::QuestionsGenerated
            }
            (ResearchPhase::AwaitingReportApproval, FeedbackDecision::Approve) => {
                ResearchPhase::Done
            }
            (ResearchPhase::AwaitingReportApproval, FeedbackDecision::Feedback(feedback)) => {
                self.generate_report(Some(&feedback)).await?;
                ResearchPhase::ReportGenerated
            }
            (phase, _) => {
                return Err(ResearchError::InvalidPhase {
                    expected: String::from("AwaitingQuestionApproval or AwaitingReportApproval"),
                    actual: phase.to_string(),
                });
            }
        };
        self.enter(next).await;
        Ok(next)
    }

    /// 执行一步：挂起阶段向反馈协作者请求决定，其余阶段自动推进
    pub async fn step(&mut self) -> Result<ResearchPhase, ResearchError> {
        if !self.phase.is_suspended() {
            return self.advance().await;
        }

        let feedback = self.context.feedback.clone().ok_or_else(|| {
            ResearchError::Config(String::from(
                "interactive mode requires a feedback provider",
            ))
        })?;
        let prompt = self.feedback_prompt();
        let value = feedback.request_feedback(&prompt).await?;
        let decision = FeedbackDecision::try_from(value)?;
        self.resume(decision).await
    }

    /// 驱动整个流程直到 `Done`
    pub async fn run(mut self) -> Result<ResearchOutcome, ResearchError> {
        while self.phase != ResearchPhase::Done {
            self.step().await?;
        }
        Ok(ResearchOutcome {
            final_report: self.report.unwrap_or_default(),
            graph: self.graph,
        })
    }

    async fn enter(&mut self, phase: ResearchPhase) {
        info!(from = %self.phase, to = %phase, "phase transition");
        self.phase = phase;
        self.checkpoint().await;
    }

    /// 阶段完成后把研究图写入输出目录，失败只记录日志
    async fn checkpoint(&self) {
        if !self.context.config.checkpoint_enabled {
            return;
        }
        let path = self.context.config.graph_path();
        if let Err(e) = crate::graph::serializer::save_to_file(&self.graph, &path).await {
            warn!(path = %path.display(), error = %e, "failed to write graph checkpoint");
        }
    }

    fn has_search_nodes(&self) -> bool {
        !self.graph.nodes_of_kind(NodeKind::Search).is_empty()
    }

    fn feedback_prompt(&self) -> String {
        match self.phase {
            ResearchPhase::AwaitingQuestionApproval => {
                let listing = self
                    .questions
                    .iter()
                    .enumerate()
                    .map(|(i, q)| format!("{}. {}", i + 1, q))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!(
                    "📝 子问题如下：\n{}\n输入 true 确认，或输入修改意见：",
                    listing
                )
            }
            _ => format!(
                "📄 报告草稿如下：\n{}\n输入 true 确认，或输入修改意见：",
                self.report.as_deref().unwrap_or_default()
            ),
        }
    }

    async fn generate_questions(&mut self, feedback: Option<&str>) -> Result<(), ResearchError> {
        let count = self.context.config.number_of_queries;
        let mut user_prompt = format!(
            include_str!("prompts/questions_user.tpl"),
            count, self.topic
        );
        let history = match feedback {
            Some(feedback) => {
                user_prompt.push_str(&format!(
                    "\n\nFeedback on the previous questions:\n{}",
                    feedback
                ));
                self.question_exchange
                    .as_ref()
                    .map(Exchange::as_history)
                    .unwrap_or_default()
            }
            None => Vec::new(),
        };

        let answer = self
            .context
            .generator
            .generate(include_str!("prompts/questions_sys.tpl"), &user_prompt, &history)
            .await?;

        self.questions = parse_sub_questions(&answer, &self.topic, count);
        info!(count = self.questions.len(), "sub-questions generated");
        self.question_exchange = Some(Exchange {
            user_prompt,
            answer,
        });
        Ok(())
    }

    /// 为每个子问题创建Search节点、执行搜索批次，再为成功的搜索生成Response节点
    async fn expand_graph(&mut self) -> Result<(), ResearchError> {
        if !self.has_search_nodes() {
            for question in &self.questions {
                self.graph
                    .add_child_node(ROOT_NODE_ID, NodeKind::Search, question)?;
            }
        }

        let tasks: Vec<SearchTask> = self
            .graph
            .nodes_of_kind(NodeKind::Search)
            .into_iter()
            .filter(|node| {
                self.graph
                    .edge_into(&node.id)
                    .is_some_and(|edge| edge.state == EdgeState::Pending)
            })
            .map(|node| SearchTask::new(node.id, node.content))
            .collect();

        if !tasks.is_empty() {
            let mut scheduler = TaskScheduler::new(
                Arc::clone(&self.graph),
                Arc::clone(&self.context.searcher),
                SearchOptions::from(&self.context.config.search),
            )
            .with_cancellation(self.context.cancel.clone());
            if let Some(sender) = &self.context.progress {
                scheduler = scheduler.with_progress(sender.clone());
            }
            scheduler
                .run_batch(tasks, self.context.config.effective_max_parallel())
                .await?;
        }

        if self.context.cancel.is_cancelled() {
            // 未启动的任务仍为 Pending，写入检查点后可恢复重跑
            self.checkpoint().await;
            return Err(ResearchError::Cancelled {
                phase: ResearchPhase::GraphExpanded.to_string(),
            });
        }

        let searched: Vec<Node> = self
            .graph
            .nodes_of_kind(NodeKind::Search)
            .into_iter()
            .filter(|node| node.result.is_some())
            .collect();
        let failed = searched
            .iter()
            .filter(|node| node.result.as_ref().is_some_and(NodeResult::is_error))
            .count();
        if !searched.is_empty() && failed == searched.len() {
            self.checkpoint().await;
            return Err(ResearchError::PhaseFailed {
                phase: ResearchPhase::GraphExpanded.to_string(),
                failed,
                total: searched.len(),
            });
        }

        for node in searched {
            if node.result.as_ref().is_some_and(NodeResult::is_error) {
                continue;
            }
            let answered = self
                .graph
                .children_of(&node.id)
                .iter()
                .any(|child| child.kind == NodeKind::Response);
            if !answered {
                self.synthesize(&node).await?;
            }
        }
        Ok(())
    }

    /// 基于单个Search节点的结果与引用生成带 `[n]` 引用的回答
    async fn synthesize(&self, search_node: &Node) -> Result<(), ResearchError> {
        let references = self.graph.get_references_of(&search_node.id)?;
        let sources = references
            .iter()
            .enumerate()
            .map(|(i, r)| format!("[{}] {} ({})\n{}", i + 1, r.title, r.source, r.snippet))
            .collect::<Vec<_>>()
            .join("\n\n");

        let user_prompt = format!(
            include_str!("prompts/synthesis_user.tpl"),
            search_node.content, sources
        );
        let answer = self
            .context
            .generator
            .generate(include_str!("prompts/synthesis_sys.tpl"), &user_prompt, &[])
            .await?;

        let response_id =
            self.graph
                .add_child_node(&search_node.id, NodeKind::Response, &search_node.content)?;
        self.graph.set_node_result(
            &response_id,
            NodeResult::Text(answer),
            search_node.reference_ids.clone(),
        )?;
        if let Some(edge) = self.graph.edge_into(&response_id) {
            self.graph.transition_edge(&edge.id, EdgeState::Completed)?;
        }
        info!(node_id = %response_id, citations = references.len(), "response synthesized");
        Ok(())
    }

    /// 汇总全部Response与编号引用清单，生成最终报告
    async fn generate_report(&mut self, feedback: Option<&str>) -> Result<(), ResearchError> {
        let findings = self
            .graph
            .nodes_of_kind(NodeKind::Response)
            .iter()
            .filter_map(|node| node.result.as_ref().and_then(NodeResult::as_text))
            .collect::<Vec<_>>()
            .join("\n\n");
        let references = self.graph.references().render_numbered();

        let system_prompt = format!(
            include_str!("prompts/report_sys.tpl"),
            self.topic, self.context.config.report_structure
        );
        let mut user_prompt = format!(
            include_str!("prompts/report_user.tpl"),
            self.topic, findings, references
        );
        let mut history = Vec::new();
        if let Some(feedback) = feedback {
            user_prompt.push_str(&format!(
                "\n\nFeedback on the previous draft:\n{}",
                feedback
            ));
            if let Some(previous) = &self.report_exchange {
                history = previous.as_history();
            }
        }

        let report = self
            .context
            .generator
            .generate(&system_prompt, &user_prompt, &history)
            .await?;
        info!(chars = report.len(), "report generated");

        self.report = Some(report.clone());
        self.report_exchange = Some(Exchange {
            user_prompt,
            answer: report,
        });
        Ok(())
    }
}
