//! rig provider 接入
//!
//! OpenAI 分支走 Chat Completions 接口，配合 `api_base_url` 可接入 Moonshot、OpenRouter 等兼容服务。

use anyhow::Result;
use rig::{
    agent::Agent,
    client::CompletionClient,
    completion::{Chat, Message},
};

use crate::config::{LLMConfig, LLMProvider};

#[derive(Clone)]
pub enum ProviderClient {
    OpenAI(rig::providers::openai::Client),
    DeepSeek(rig::providers::deepseek::Client),
    Anthropic(rig::providers::anthropic::Client),
    Ollama(rig::providers::ollama::Client),
}

/// 以系统提示词、温度和可选的 max_tokens 构建 Agent
macro_rules! research_agent {
    ($builder:expr, $system_prompt:expr, $config:expr, max_tokens) => {
        $builder
            .preamble($system_prompt)
            .max_tokens($config.max_tokens.into())
            .temperature($config.temperature)
            .build()
    };
    ($builder:expr, $system_prompt:expr, $config:expr) => {
        $builder
            .preamble($system_prompt)
            .temperature($config.temperature)
            .build()
    };
}

impl ProviderClient {
    pub fn new(config: &LLMConfig) -> Result<Self> {
        let client = match config.provider {
            LLMProvider::OpenAI => ProviderClient::OpenAI(
                rig::providers::openai::Client::builder(&config.api_key)
                    .base_url(&config.api_base_url)
                    .build(),
            ),
            LLMProvider::DeepSeek => ProviderClient::DeepSeek(
                rig::providers::deepseek::Client::builder(&config.api_key)
                    .base_url(&config.api_base_url)
                    .build(),
            ),
            LLMProvider::Anthropic => ProviderClient::Anthropic(
                rig::providers::anthropic::ClientBuilder::new(&config.api_key).build()?,
            ),
            LLMProvider::Ollama => {
                ProviderClient::Ollama(rig::providers::ollama::Client::builder().build())
            }
        };
        Ok(client)
    }

    pub fn provider(&self) -> LLMProvider {
        match self {
            ProviderClient::OpenAI(_) => LLMProvider::OpenAI,
            ProviderClient::DeepSeek(_) => LLMProvider::DeepSeek,
            ProviderClient::Anthropic(_) => LLMProvider::Anthropic,
            ProviderClient::Ollama(_) => LLMProvider::Ollama,
        }
    }

    /// 为一次生成创建不带工具的 Agent
    pub fn create_agent(&self, model: &str, system_prompt: &str, config: &LLMConfig) -> ProviderAgent {
        match self {
            ProviderClient::OpenAI(client) => ProviderAgent::OpenAI(research_agent!(
                client.completion_model(model).completions_api().into_agent_builder(),
                system_prompt,
                config,
                max_tokens
            )),
            // DeepSeek 的输出上限远低于默认 max_tokens，交由服务端决定
            ProviderClient::DeepSeek(client) => {
                ProviderAgent::DeepSeek(research_agent!(client.agent(model), system_prompt, config))
            }
            ProviderClient::Anthropic(client) => ProviderAgent::Anthropic(research_agent!(
                client.agent(model),
                system_prompt,
                config,
                max_tokens
            )),
            ProviderClient::Ollama(client) => ProviderAgent::Ollama(research_agent!(
                client.agent(model),
                system_prompt,
                config,
                max_tokens
            )),
        }
    }
}

pub enum ProviderAgent {
    OpenAI(Agent<rig::providers::openai::CompletionModel>),
    DeepSeek(Agent<rig::providers::deepseek::CompletionModel>),
    Anthropic(Agent<rig::providers::anthropic::completion::CompletionModel>),
    Ollama(Agent<rig::providers::ollama::CompletionModel<reqwest::Client>>),
}

impl ProviderAgent {
    /// 携带历史消息执行一轮对话
    pub async fn chat(&self, prompt: &str, history: Vec<Message>) -> Result<String> {
        let text = match self {
            ProviderAgent::OpenAI(agent) => agent.chat(prompt, history).await?,
            ProviderAgent::DeepSeek(agent) => agent.chat(prompt, history).await?,
            ProviderAgent::Anthropic(agent) => agent.chat(prompt, history).await?,
            ProviderAgent::Ollama(agent) => agent.chat(prompt, history).await?,
        };
        Ok(text)
    }
}
