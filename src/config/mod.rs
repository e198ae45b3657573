use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::errors::ResearchError;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "deep-research.toml";

/// 默认的报告结构
const DEFAULT_REPORT_STRUCTURE: &str = "1. Introduction: frame the topic and why it matters\n\
2. Main body: one section per sub-question, synthesizing the findings\n\
3. Conclusion: summarize the key findings and open questions";

/// LLM Provider类型，其他 OpenAI 兼容服务通过 `openai` 加 `api_base_url` 接入
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "openai")]
    #[default]
    OpenAI,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "ollama")]
    Ollama,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::DeepSeek => write!(f, "deepseek"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    /// 输出路径（报告、研究图、对话记录）
    pub output_path: PathBuf,

    /// 每个主题生成的子问题数量
    pub number_of_queries: usize,

    /// 是否并行执行搜索
    pub parallel_search_enabled: bool,

    /// 最大并行搜索数
    pub max_parallel_searches: usize,

    /// 是否在子问题和报告生成后等待人工审核
    pub interactive: bool,

    /// 每个阶段完成后是否把研究图写入输出目录
    pub checkpoint_enabled: bool,

    /// 最终报告的结构说明
    pub report_structure: String,

    /// LLM模型配置
    pub llm: LLMConfig,

    /// 搜索服务配置
    pub search: SearchConfig,

    /// 是否启用详细日志
    pub verbose: bool,
}

/// LLM模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// LLM Provider类型，其他 OpenAI 兼容服务通过 `openai` 加 `api_base_url` 接入
    pub provider: LLMProvider,

    /// LLM API KEY
    pub api_key: String,

    /// LLM API基地址
    pub api_base_url: String,

    /// 高能效模型，用于子问题生成和常规的综合任务
    pub model_efficient: String,

    /// 高质量模型，用于长上下文的报告撰写，以及作为efficient失效情况下的兜底
    pub model_powerful: String,

    /// 最大tokens
    pub max_tokens: u32,

    /// 温度
    pub temperature: f64,

    /// 重试次数
    pub retry_attempts: u32,

    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,

    /// 超时时间（秒）
    pub timeout_seconds: u64,
}

/// 搜索服务配置（Tavily）
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    /// 搜索API KEY
    pub api_key: String,

    /// 搜索API基地址
    pub api_base_url: String,

    /// 每个问题返回的最大结果数
    pub max_results: usize,

    /// 搜索深度（basic / advanced）
    pub search_depth: String,

    /// 是否返回网页原文
    pub include_raw_content: bool,

    /// 超时时间（秒）
    pub timeout_seconds: u64,
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// 校验配置取值
    pub fn validate(&self) -> Result<(), ResearchError> {
        if self.number_of_queries == 0 {
            return Err(ResearchError::Config(String::from(
                "number_of_queries must be at least 1",
            )));
        }
        if self.max_parallel_searches == 0 {
            return Err(ResearchError::Config(String::from(
                "max_parallel_searches must be at least 1",
            )));
        }
        if self.search.max_results == 0 {
            return Err(ResearchError::Config(String::from(
                "search.max_results must be at least 1",
            )));
        }
        Ok(())
    }

    /// 实际使用的并发上限，关闭并行搜索时为1
    pub fn effective_max_parallel(&self) -> usize {
        if self.parallel_search_enabled {
            self.max_parallel_searches.max(1)
        } else {
            1
        }
    }

    /// 研究图检查点文件路径
    pub fn graph_path(&self) -> PathBuf {
        self.output_path.join("research_graph.json")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("./research.out"),
            number_of_queries: 3,
            parallel_search_enabled: true,
            max_parallel_searches: 3,
            interactive: false,
            checkpoint_enabled: true,
            report_structure: String::from(DEFAULT_REPORT_STRUCTURE),
            llm: LLMConfig::default(),
            search: SearchConfig::default(),
            verbose: false,
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::default(),
            api_key: std::env::var("DEEP_RESEARCH_LLM_API_KEY").unwrap_or_default(),
            api_base_url: String::from("https://api-inference.modelscope.cn/v1"),
            model_efficient: String::from("Qwen/Qwen3-Next-80B-A3B-Instruct"),
            model_powerful: String::from("Qwen/Qwen3-235B-A22B-Instruct-2507"),
            max_tokens: 32768,
            temperature: 0.1,
            retry_attempts: 5,
            retry_delay_ms: 5000,
            timeout_seconds: 300,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("TAVILY_API_KEY").unwrap_or_default(),
            api_base_url: String::from("https://api.tavily.com"),
            max_results: 5,
            search_depth: String::from("basic"),
            include_raw_content: false,
            timeout_seconds: 30,
        }
    }
}

// Include tests
#[cfg(test)]
mod tests;
