//! 单元测试共用的进程内协作者

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::errors::CollaboratorError;
use crate::llm::{ChatTurn, TextGenerator};
use crate::search::{SearchHit, SearchOptions, SearchResponse, WebSearcher};

/// 不写检查点、不依赖环境的测试配置
pub fn test_config() -> Config {
    Config {
        number_of_queries: 2,
        max_parallel_searches: 2,
        checkpoint_enabled: false,
        ..Config::default()
    }
}

/// 记录调用与并发度的搜索替身
pub struct FakeSearcher {
    hits_per_query: usize,
    failing: HashSet<String>,
    fail_all: bool,
    delay: Duration,
    query_delays: HashMap<String, Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: Mutex<Vec<String>>,
}

impl FakeSearcher {
    pub fn new(hits_per_query: usize) -> Self {
        Self {
            hits_per_query,
            failing: HashSet::new(),
            fail_all: false,
            delay: Duration::ZERO,
            query_delays: HashMap::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    pub fn failing_always(mut self) -> Self {
        self.fail_all = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_query_delay(mut self, query: &str, delay: Duration) -> Self {
        self.query_delays.insert(query.to_string(), delay);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// 按开始顺序记录的查询
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebSearcher for FakeSearcher {
    async fn search(
        &self,
        query: &str,
        _options: &SearchOptions,
    ) -> Result<SearchResponse, CollaboratorError> {
        self.started.lock().unwrap().push(query.to_string());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = self.query_delays.get(query).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_all || self.failing.contains(query) {
            return Err(CollaboratorError::Search(format!("upstream error for {}", query)));
        }
        let results = (1..=self.hits_per_query)
            .map(|i| {
                SearchHit::new(
                    format!("{} result {}", query, i),
                    format!("https://example.com/{}/{}", query.len(), i),
                    format!("content {} for {}", i, query),
                )
                .with_score(1.0 / i as f64)
            })
            .collect();
        Ok(SearchResponse::new(query, results))
    }
}

/// 一次生成调用的记录
#[derive(Debug, Clone)]
pub struct GenerateCall {
    pub system_prompt: String,
    pub user_prompt: String,
    pub history: Vec<ChatTurn>,
}

/// 按提示词类型返回预设文本的生成替身
pub struct ScriptedGenerator {
    question_answers: Mutex<VecDeque<String>>,
    reports: AtomicUsize,
    fail_synthesis: bool,
    calls: Mutex<Vec<GenerateCall>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            question_answers: Mutex::new(VecDeque::new()),
            reports: AtomicUsize::new(0),
            fail_synthesis: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 依次作为子问题生成的回答；用完后回落到默认问题
    pub fn with_questions(self, answers: &[&str]) -> Self {
        *self.question_answers.lock().unwrap() = answers.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn failing_synthesis(mut self) -> Self {
        self.fail_synthesis = true;
        self
    }

    pub fn calls(&self) -> Vec<GenerateCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, marker: &str) -> Vec<GenerateCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.system_prompt.contains(marker))
            .collect()
    }
}

pub const PLANNER: &str = "research planner";
pub const SYNTHESIZER: &str = "provided search results";
pub const REPORT_WRITER: &str = "research report writer";
pub const FOLLOW_UP: &str = "follow-up questions";

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        history: &[ChatTurn],
    ) -> Result<String, CollaboratorError> {
        self.calls.lock().unwrap().push(GenerateCall {
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
            history: history.to_vec(),
        });

        if system_prompt.contains(PLANNER) {
            let scripted = self.question_answers.lock().unwrap().pop_front();
            return Ok(scripted.unwrap_or_else(|| {
                "1. What is the first aspect?\n2. What is the second aspect?\n3. What is the third aspect?"
                    .to_string()
            }));
        }
        if system_prompt.contains(SYNTHESIZER) {
            if self.fail_synthesis {
                return Err(CollaboratorError::Generation("model unavailable".to_string()));
            }
            return Ok("Synthesized answer [1].".to_string());
        }
        if system_prompt.contains(REPORT_WRITER) {
            let n = self.reports.fetch_add(1, Ordering::SeqCst) + 1;
            return Ok(format!("# Report draft {}\n\nFindings [1].", n));
        }
        if system_prompt.contains(FOLLOW_UP) {
            return Ok("Follow-up answer citing [2] and [1] and [2] again, plus [99].".to_string());
        }
        Ok(String::new())
    }
}
