use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::feedback::FeedbackProvider;
use crate::llm::TextGenerator;
use crate::scheduler::TaskReport;
use crate::search::WebSearcher;

/// 研究流程的运行上下文：配置与外部协作者
#[derive(Clone)]
pub struct ResearchContext {
    /// 文本生成服务
    pub generator: Arc<dyn TextGenerator>,
    /// 网络搜索服务
    pub searcher: Arc<dyn WebSearcher>,
    /// 人工反馈，仅交互模式使用
    pub feedback: Option<Arc<dyn FeedbackProvider>>,
    /// 配置
    pub config: Config,
    /// 搜索任务的进度通道
    pub progress: Option<UnboundedSender<TaskReport>>,
    /// 取消正在进行的搜索批次
    pub cancel: CancellationToken,
}

impl ResearchContext {
    /// 使用调用方提供的协作者
    pub fn with_collaborators(
        config: Config,
        generator: Arc<dyn TextGenerator>,
        searcher: Arc<dyn WebSearcher>,
    ) -> Self {
        Self {
            generator,
            searcher,
            feedback: None,
            config,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_feedback(mut self, feedback: Arc<dyn FeedbackProvider>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn with_progress(mut self, sender: UnboundedSender<TaskReport>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}
