use super::*;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.default_user, "local");
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.model, "nomic-embed-text:latest");
    assert_eq!(config.llm.model, "auto");
    assert_eq!(config.retrieval.default_top_k, 6);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.synthesis.quiz_regeneration_attempts, 1);
    assert!(config.validate().is_ok());
}

#[test]
fn config_validation() {
    let config = Config::default();

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.llm.base_url = "not a url".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.default_user = "  ".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.retry.max_attempts = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.synthesis.max_context_words = 10;
    assert!(invalid_config.validate().is_err());
}

#[test]
fn chunking_validation() {
    let mut config = Config::default();
    config.chunking.overlap_size = config.chunking.max_chunk_size;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::OverlapTooLarge(_, _))
    ));

    let mut config = Config::default();
    config.chunking.boundary_window = config.chunking.max_chunk_size + 1;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::BoundaryWindowTooLarge(_, _))
    ));

    let mut config = Config::default();
    config.chunking.max_chunk_size = 50;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidMaxChunkSize(50))
    ));
}

#[test]
fn top_k_validation() {
    let mut config = Config::default();
    config.retrieval.default_top_k = 30;
    config.retrieval.max_top_k = 20;
    assert!(matches!(config.validate(), Err(ConfigError::InvalidTopK(30, 20))));

    config.retrieval.default_top_k = 0;
    assert!(config.validate().is_err());
}

#[test]
fn ollama_url_generation() {
    let mut config = Config::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");

    config.ollama.protocol = "https".to_string();
    config.ollama.host = "secure.example.com".to_string();
    config.ollama.port = 443;
    let url = config
        .ollama_url()
        .expect("should generate https url successfully");
    assert_eq!(url.as_str(), "https://secure.example.com/");
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_defaults() {
    let partial = r#"
        [ollama]
        host = "gpu-box"

        [retrieval]
        default_top_k = 4
    "#;
    let config: Config = toml::from_str(partial).expect("partial config should parse");
    assert_eq!(config.ollama.host, "gpu-box");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.retrieval.default_top_k, 4);
    assert_eq!(config.retrieval.max_top_k, 20);
    assert_eq!(config.default_user, "local");
}

#[test]
fn setter_validation() {
    let mut ollama = OllamaConfig::default();

    assert!(ollama.set_protocol("https".to_string()).is_ok());
    assert!(ollama.set_host("example.com".to_string()).is_ok());
    assert!(ollama.set_port(8080).is_ok());
    assert!(ollama.set_model("new-model".to_string()).is_ok());
    assert!(ollama.set_batch_size(128).is_ok());
    assert!(ollama.set_embedding_dimension(384).is_ok());

    assert!(ollama.set_protocol("ftp".to_string()).is_err());
    assert!(ollama.set_port(0).is_err());
    assert!(ollama.set_model(String::new()).is_err());
    assert!(ollama.set_batch_size(0).is_err());
    assert!(ollama.set_embedding_dimension(8).is_err());

    let mut llm = LlmConfig::default();
    assert!(llm.uses_auto_model());
    assert!(llm.set_model("llama-3.1-8b-instant".to_string()).is_ok());
    assert!(!llm.uses_auto_model());
    assert!(llm.set_base_url("http://localhost:8000/v1".to_string()).is_ok());
    assert!(llm.set_base_url("ftp://example.com".to_string()).is_err());
}

#[test]
fn load_missing_config_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("missing config should load defaults");

    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.ollama, OllamaConfig::default());
    assert_eq!(config.database_path(), temp_dir.path().join("thinkbook.db"));
}

#[test]
fn save_and_reload() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::load(temp_dir.path()).expect("should load defaults");
    config.ollama.port = 9999;
    config.default_user = "alice".to_string();
    config.save().expect("should save config");

    assert!(config.config_file_path().exists());
    let reloaded = Config::load(temp_dir.path()).expect("should reload config");
    assert_eq!(reloaded, config);
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(
        temp_dir.path().join("config.toml"),
        "[ollama]\nbatch_size = 0\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}
