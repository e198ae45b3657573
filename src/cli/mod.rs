use crate::config::{Config, DEFAULT_CONFIG_FILE, LLMProvider};
use crate::generator::workflow::{LaunchRequest, ResearchTarget};
use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;

/// Deep Research RS - 由Rust与AI驱动的深度研究报告生成引擎
#[derive(Parser, Debug)]
#[command(name = "deep-research-rs")]
#[command(
    about = "AI-based research engine: breaks a topic into sub-questions, searches the web in parallel, and writes a cited report."
)]
#[command(version)]
pub struct Args {
    /// 研究主题
    #[arg(required_unless_present = "resume", conflicts_with = "resume")]
    pub topic: Option<String>,

    /// 从已保存的研究图继续（research_graph.json）
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// 输出路径
    #[arg(short, long)]
    pub output_path: Option<PathBuf>,

    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 子问题数量
    #[arg(short, long)]
    pub number_of_queries: Option<usize>,

    /// 最大并行搜索数
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// 串行执行搜索
    #[arg(long)]
    pub no_parallel: bool,

    /// 子问题与报告生成后等待人工确认
    #[arg(short, long)]
    pub interactive: bool,

    /// 不在阶段之间写入研究图检查点
    #[arg(long)]
    pub no_checkpoint: bool,

    /// 报告结构说明
    #[arg(long)]
    pub report_structure: Option<String>,

    /// 报告完成后追问的问题，可重复
    #[arg(long = "ask")]
    pub follow_ups: Vec<String>,

    /// 是否启用详细日志
    #[arg(short, long)]
    pub verbose: bool,

    /// 高能效模型，优先用于子问题生成与回答综合
    #[arg(long)]
    pub model_efficient: Option<String>,

    /// 高质量模型，用于长上下文任务，以及作为efficient失效情况下的兜底
    #[arg(long)]
    pub model_powerful: Option<String>,

    /// LLM API基地址
    #[arg(long)]
    pub llm_api_base_url: Option<String>,

    /// LLM API KEY
    #[arg(long)]
    pub llm_api_key: Option<String>,

    /// 最大tokens数
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// 温度参数
    #[arg(long)]
    pub temperature: Option<f64>,

    /// LLM Provider (openai, deepseek, anthropic, ollama)
    #[arg(long)]
    pub llm_provider: Option<String>,

    /// 搜索API KEY（Tavily）
    #[arg(long)]
    pub search_api_key: Option<String>,

    /// 每个子问题的最大搜索结果数
    #[arg(long)]
    pub search_max_results: Option<usize>,

    /// 搜索深度 (basic, advanced)
    #[arg(long)]
    pub search_depth: Option<String>,
}

impl Args {
    /// 将CLI参数转换为配置
    pub fn into_config(&self) -> Result<Config> {
        let mut config = if let Some(config_path) = &self.config {
            // 显式指定的配置文件必须能读取
            Config::from_file(config_path)?
        } else {
            // 如果没有显式指定配置文件，尝试从默认位置加载
            let default_config_path = std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(DEFAULT_CONFIG_FILE);

            if default_config_path.exists() {
                Config::from_file(&default_config_path)?
            } else {
                Config::default()
            }
        };

        // 覆盖配置文件中的设置
        if let Some(output_path) = &self.output_path {
            config.output_path = output_path.clone();
        }
        if let Some(number_of_queries) = self.number_of_queries {
            config.number_of_queries = number_of_queries;
        }
        if let Some(max_parallel) = self.max_parallel {
            config.max_parallel_searches = max_parallel;
        }
        if self.no_parallel {
            config.parallel_search_enabled = false;
        }
        if self.interactive {
            config.interactive = true;
        }
        if self.no_checkpoint {
            config.checkpoint_enabled = false;
        }
        if let Some(report_structure) = &self.report_structure {
            config.report_structure = report_structure.clone();
        }

        // 覆盖LLM配置
        if let Some(provider_str) = &self.llm_provider {
            if let Ok(provider) = provider_str.parse::<LLMProvider>() {
                config.llm.provider = provider;
            } else {
                eprintln!(
                    "⚠️ 警告: 未知的provider: {}，使用配置中的provider: {}",
                    provider_str, config.llm.provider
                );
            }
        }
        if let Some(llm_api_base_url) = &self.llm_api_base_url {
            config.llm.api_base_url = llm_api_base_url.clone();
        }
        if let Some(llm_api_key) = &self.llm_api_key {
            config.llm.api_key = llm_api_key.clone();
        }
        if let Some(model_efficient) = &self.model_efficient {
            config.llm.model_efficient = model_efficient.clone();
        }
        if let Some(model_powerful) = &self.model_powerful {
            config.llm.model_powerful = model_powerful.clone();
        }
        if let Some(max_tokens) = self.max_tokens {
            config.llm.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }

        // 搜索配置
        if let Some(search_api_key) = &self.search_api_key {
            config.search.api_key = search_api_key.clone();
        }
        if let Some(max_results) = self.search_max_results {
            config.search.max_results = max_results;
        }
        if let Some(search_depth) = &self.search_depth {
            config.search.search_depth = search_depth.clone();
        }

        if self.verbose {
            config.verbose = true;
        }

        config.validate()?;
        Ok(config)
    }

    /// 本次运行的研究起点与追问
    pub fn launch_request(&self) -> Result<LaunchRequest> {
        let target = match (&self.topic, &self.resume) {
            (Some(topic), None) => {
                if topic.trim().is_empty() {
                    bail!("research topic must not be empty");
                }
                ResearchTarget::Topic(topic.trim().to_string())
            }
            (None, Some(path)) => ResearchTarget::Resume(path.clone()),
            (Some(_), Some(_)) => bail!("a topic and --resume cannot be combined"),
            (None, None) => bail!("either a topic or --resume is required"),
        };
        Ok(LaunchRequest {
            target,
            follow_ups: self.follow_ups.clone(),
        })
    }
}
