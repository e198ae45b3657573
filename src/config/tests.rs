#[cfg(test)]
mod tests {
    use crate::config::{Config, LLMConfig, LLMProvider, SearchConfig};
    use crate::errors::ResearchError;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.output_path, PathBuf::from("./research.out"));
        assert_eq!(config.number_of_queries, 3);
        assert!(config.parallel_search_enabled);
        assert_eq!(config.max_parallel_searches, 3);
        assert!(!config.interactive);
        assert!(config.checkpoint_enabled);
        assert!(config.report_structure.contains("Introduction"));
        assert!(!config.verbose);
    }

    #[test]
    fn test_llm_provider_from_str() {
        assert_eq!(
            "openai".parse::<LLMProvider>().unwrap(),
            LLMProvider::OpenAI
        );
        assert_eq!(
            "DeepSeek".parse::<LLMProvider>().unwrap(),
            LLMProvider::DeepSeek
        );
        assert_eq!(
            "anthropic".parse::<LLMProvider>().unwrap(),
            LLMProvider::Anthropic
        );
        assert_eq!(
            "ollama".parse::<LLMProvider>().unwrap(),
            LLMProvider::Ollama
        );
        assert!("unknown".parse::<LLMProvider>().is_err());
        assert!("gemini".parse::<LLMProvider>().is_err());
    }

    #[test]
    fn test_llm_provider_display() {
        assert_eq!(LLMProvider::OpenAI.to_string(), "openai");
        assert_eq!(LLMProvider::DeepSeek.to_string(), "deepseek");
        assert_eq!(LLMProvider::Ollama.to_string(), "ollama");
    }

    #[test]
    fn test_llm_config_default() {
        let config = LLMConfig::default();

        assert_eq!(config.provider, LLMProvider::OpenAI);
        assert_eq!(config.max_tokens, 32768);
        assert_eq!(config.temperature, 0.1);
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.retry_delay_ms, 5000);
        assert_eq!(config.timeout_seconds, 300);
    }

    #[test]
    fn test_search_config_default() {
        let config = SearchConfig::default();

        assert_eq!(config.api_base_url, "https://api.tavily.com");
        assert_eq!(config.max_results, 5);
        assert_eq!(config.search_depth, "basic");
        assert!(!config.include_raw_content);
    }

    #[test]
    fn test_effective_max_parallel() {
        let mut config = Config::default();
        config.max_parallel_searches = 8;
        assert_eq!(config.effective_max_parallel(), 8);

        config.parallel_search_enabled = false;
        assert_eq!(config.effective_max_parallel(), 1);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.number_of_queries = 0;
        assert!(matches!(config.validate(), Err(ResearchError::Config(_))));

        let mut config = Config::default();
        config.max_parallel_searches = 0;
        assert!(matches!(config.validate(), Err(ResearchError::Config(_))));

        let mut config = Config::default();
        config.search.max_results = 0;
        assert!(matches!(config.validate(), Err(ResearchError::Config(_))));
    }

    #[test]
    fn test_from_file_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("deep-research.toml");

        let content = r#"
output_path = "out"
number_of_queries = 5
interactive = true

[llm]
provider = "deepseek"
model_efficient = "deepseek-chat"

[search]
max_results = 8
search_depth = "advanced"
"#;
        std::fs::write(&config_path, content).unwrap();

        let config = Config::from_file(&config_path).unwrap();
        assert_eq!(config.output_path, PathBuf::from("out"));
        assert_eq!(config.number_of_queries, 5);
        assert!(config.interactive);
        // 未出现的字段回落到默认值
        assert_eq!(config.max_parallel_searches, 3);
        assert_eq!(config.llm.provider, LLMProvider::DeepSeek);
        assert_eq!(config.llm.model_efficient, "deepseek-chat");
        assert_eq!(config.llm.retry_attempts, 5);
        assert_eq!(config.search.max_results, 8);
        assert_eq!(config.search.search_depth, "advanced");
    }

    #[test]
    fn test_from_file_errors() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Config::from_file(&temp_dir.path().join("missing.toml")).is_err());

        let broken = temp_dir.path().join("broken.toml");
        std::fs::write(&broken, "number_of_queries = \"three\"").unwrap();
        assert!(Config::from_file(&broken).is_err());
    }

    #[test]
    fn test_graph_path() {
        let mut config = Config::default();
        config.output_path = PathBuf::from("/tmp/research");
        assert_eq!(
            config.graph_path(),
            PathBuf::from("/tmp/research/research_graph.json")
        );
    }
}
