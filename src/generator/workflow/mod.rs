use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::errors::ResearchError;
use crate::feedback::StdinFeedback;
use crate::generator::context::ResearchContext;
use crate::generator::conversation::Conversation;
use crate::generator::outlet::{DiskOutlet, Outlet, ResearchArtifacts};
use crate::generator::research::{ResearchOrchestrator, ResearchPhase};
use crate::graph::serializer;
use crate::llm::{LLMClient, TextGenerator};
use crate::scheduler::{TaskOutcome, TaskReport};
use crate::search::{TavilySearcher, WebSearcher};

/// 时间跟踪作用域
pub struct TimingScope {
    start_time: Instant,
    phase_start_times: Vec<(String, Instant)>,
    /// 按结束顺序记录
    phase_durations: Vec<(String, Duration)>,
}

impl Default for TimingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingScope {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            phase_start_times: Vec::new(),
            phase_durations: Vec::new(),
        }
    }

    /// 开始一个新的阶段计时
    pub fn start_phase(&mut self, phase_name: &str) {
        self.phase_start_times
            .push((phase_name.to_string(), Instant::now()));
    }

    /// 结束一个阶段的计时
    pub fn end_phase(&mut self, phase_name: &str) -> Option<Duration> {
        let index = self
            .phase_start_times
            .iter()
            .rposition(|(name, _)| name == phase_name)?;
        let (name, started) = self.phase_start_times.remove(index);
        let duration = started.elapsed();
        self.phase_durations.push((name, duration));
        Some(duration)
    }

    /// 获取总执行时间
    pub fn get_total_duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn get_phase_durations(&self) -> &[(String, Duration)] {
        &self.phase_durations
    }

    /// 获取格式化的执行时间报告
    pub fn generate_timing_report(&self) -> String {
        let mut report = format!(
            "总执行时间: {:.2}秒\n",
            self.get_total_duration().as_secs_f64()
        );

        if !self.phase_durations.is_empty() {
            report.push_str("\n各阶段执行时间:\n");
            for (phase, duration) in &self.phase_durations {
                report.push_str(&format!("- {}: {:.3}秒\n", phase, duration.as_secs_f64()));
            }
        }

        report
    }
}

/// 研究阶段之外的计时键
pub struct TimingKeys;

impl TimingKeys {
    pub const FOLLOW_UP: &'static str = "follow_up";
    pub const OUTPUT: &'static str = "output";
}

/// 研究的起点
#[derive(Debug, Clone, PartialEq)]
pub enum ResearchTarget {
    /// 从新主题开始
    Topic(String),
    /// 从持久化的研究图继续
    Resume(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
    pub target: ResearchTarget,
    /// 报告完成后依次追问的问题
    pub follow_ups: Vec<String>,
}

/// 启动研究工作流
pub async fn launch(config: &Config, request: LaunchRequest) -> Result<()> {
    let mut timing = TimingScope::new();

    let llm_client = LLMClient::new(&config.llm)?;
    // 启动时检查模型连接
    llm_client.check_connection().await?;
    let generator: Arc<dyn TextGenerator> = Arc::new(llm_client);
    let searcher: Arc<dyn WebSearcher> = Arc::new(TavilySearcher::new(&config.search)?);

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_progress(progress_rx));
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(watch_interrupts(cancel.clone()));

    let mut context =
        ResearchContext::with_collaborators(config.clone(), Arc::clone(&generator), searcher)
            .with_progress(progress_tx)
            .with_cancellation(cancel.clone());
    if config.interactive {
        context = context.with_feedback(Arc::new(StdinFeedback::stdin()));
    }

    let mut orchestrator = match request.target {
        ResearchTarget::Topic(topic) => {
            println!("🚀 开始研究: {}", topic);
            ResearchOrchestrator::new(context, &topic)?
        }
        ResearchTarget::Resume(path) => {
            let graph = serializer::load_from_file(&path).await?;
            println!("🔁 从研究图继续: {}", path.display());
            ResearchOrchestrator::from_graph(context, Arc::new(graph))?
        }
    };

    while orchestrator.phase() != ResearchPhase::Done {
        let phase = orchestrator.phase().to_string();
        println!("🤖 执行阶段 {} ...", phase);
        timing.start_phase(&phase);
        let next = match orchestrator.step().await {
            Ok(next) => next,
            Err(e @ (ResearchError::Cancelled { .. } | ResearchError::PhaseFailed { .. })) => {
                bail!("{}，最近一次检查点位于 {:?}", e, config.graph_path());
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(duration) = timing.end_phase(&phase) {
            println!("✓ {} → {} ({:.2}秒)", phase, next, duration.as_secs_f64());
        }
        if cancel.is_cancelled() {
            bail!("研究已取消，最近一次检查点位于 {:?}", config.graph_path());
        }
    }

    let outcome = orchestrator
        .outcome()
        .ok_or_else(|| anyhow!("research finished without a report"))?;
    // 释放进度通道的发送端，进度打印任务随之结束
    drop(orchestrator);
    watcher.abort();
    let _ = printer.await;

    let conversation = if request.follow_ups.is_empty() {
        None
    } else {
        timing.start_phase(TimingKeys::FOLLOW_UP);
        let mut conversation = Conversation::from_outcome(generator, &outcome);
        for question in &request.follow_ups {
            println!("\n❓ {}", question);
            let answer = conversation.ask(question).await?;
            println!("{}", answer);
        }
        timing.end_phase(TimingKeys::FOLLOW_UP);
        Some(conversation)
    };

    timing.start_phase(TimingKeys::OUTPUT);
    let outlet = DiskOutlet::new(config.output_path.clone());
    outlet
        .save(&ResearchArtifacts {
            outcome: &outcome,
            conversation: conversation.as_ref(),
        })
        .await?;
    timing.end_phase(TimingKeys::OUTPUT);

    println!("\n{}", timing.generate_timing_report());
    Ok(())
}

/// 按完成顺序打印搜索任务进度
async fn print_progress(mut receiver: UnboundedReceiver<TaskReport>) {
    while let Some(report) = receiver.recv().await {
        println!("{}", describe_report(&report));
    }
}

fn describe_report(report: &TaskReport) -> String {
    match &report.outcome {
        TaskOutcome::Completed { reference_ids } => {
            format!("   ✅ {} ({} 条结果)", report.query, reference_ids.len())
        }
        TaskOutcome::Failed { error } => format!("   ❌ {} ({})", report.query, error),
        TaskOutcome::Skipped => format!("   ⏭️ 已跳过: {}", report.query),
    }
}

/// 第一次 Ctrl-C 取消搜索批次，第二次直接退出
async fn watch_interrupts(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    eprintln!("⚠️ 收到中断信号，正在取消搜索任务...");
    cancel.cancel();
    if tokio::signal::ctrl_c().await.is_ok() {
        std::process::exit(130);
    }
}

// Include tests
#[cfg(test)]
mod tests;
