// 研究流程：主题 → 子问题 → 并行搜索扩展研究图 → 逐问题综合带引用的回答 → 最终报告
//
// 子问题与报告两个阶段在交互模式下会挂起，等待人工确认或修改意见。

use crate::errors::ResearchError;
use crate::generator::context::ResearchContext;

pub mod orchestrator;
pub mod questions;

pub use orchestrator::{INTERRUPTED_MARKER, ResearchOrchestrator, ResearchOutcome, ResearchPhase};

/// 对一个主题执行完整的研究流程
pub async fn run_research(
    topic: &str,
    context: ResearchContext,
) -> Result<ResearchOutcome, ResearchError> {
    ResearchOrchestrator::new(context, topic)?.run().await
}
