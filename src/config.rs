use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub target: TargetConfig,
    pub schema: SchemaConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub guardrail: GuardrailConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// The database questions are answered against. Always opened read-only.
#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    #[serde(default = "default_query_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_rows() -> usize {
    100
}
fn default_query_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchemaConfig {
    pub description_path: PathBuf,
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(default)]
    pub rules_path: Option<PathBuf>,
    #[serde(default)]
    pub allowed_tables: Vec<String>,
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
}

/// A named grouping of tables. Segments for these tables are tagged with `id`.
#[derive(Debug, Deserialize, Clone)]
pub struct DomainConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tables: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_true")]
    pub sync_on_startup: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            min_score: default_min_score(),
            sync_on_startup: true,
        }
    }
}

fn default_max_results() -> usize {
    5
}
fn default_min_score() -> f64 {
    0.5
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            url: None,
            temperature: 0.0,
            max_retries: default_llm_retries(),
            timeout_secs: default_llm_timeout_secs(),
            system_prompt_path: None,
        }
    }
}

fn default_llm_retries() -> u32 {
    2
}
fn default_llm_timeout_secs() -> u64 {
    120
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_few_shot_limit")]
    pub few_shot_limit: usize,
    #[serde(default = "default_summary_rows")]
    pub summary_rows: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            few_shot_limit: default_few_shot_limit(),
            summary_rows: default_summary_rows(),
        }
    }
}

fn default_max_attempts() -> usize {
    3
}
fn default_few_shot_limit() -> usize {
    3
}
fn default_summary_rows() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct GuardrailConfig {
    #[serde(default = "default_dialect")]
    pub dialect: String,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            dialect: default_dialect(),
        }
    }
}

fn default_dialect() -> String {
    "sqlite".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.target.max_rows == 0 {
        anyhow::bail!("target.max_rows must be >= 1");
    }
    if config.target.timeout_secs == 0 {
        anyhow::bail!("target.timeout_secs must be >= 1");
    }

    if config.retrieval.max_results == 0 {
        anyhow::bail!("retrieval.max_results must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.min_score) {
        anyhow::bail!("retrieval.min_score must be in [0.0, 1.0]");
    }

    if config.orchestrator.max_attempts == 0 {
        anyhow::bail!("orchestrator.max_attempts must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    if config.llm.is_enabled() && config.llm.model.is_none() {
        anyhow::bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    match config.guardrail.dialect.as_str() {
        "generic" | "sqlite" | "postgres" => {}
        other => anyhow::bail!(
            "Unknown guardrail dialect: '{}'. Must be generic, sqlite, or postgres.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/nlsql.sqlite"

[target]
path = "./data/target.sqlite"

[schema]
description_path = "./schema/description.md"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.target.max_rows, 100);
        assert_eq!(config.target.timeout_secs, 30);
        assert_eq!(config.retrieval.max_results, 5);
        assert!((config.retrieval.min_score - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.orchestrator.max_attempts, 3);
        assert_eq!(config.orchestrator.few_shot_limit, 3);
        assert_eq!(config.orchestrator.summary_rows, 20);
        assert!(!config.embedding.is_enabled());
        assert!(!config.llm.is_enabled());
        assert!(config.schema.allowed_tables.is_empty());
    }

    #[test]
    fn test_enabled_embedding_requires_dims() {
        let text = format!("{}\n[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\n", MINIMAL);
        let config: Config = toml::from_str(&text).unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_unknown_llm_provider_rejected() {
        let text = format!("{}\n[llm]\nprovider = \"mystery\"\nmodel = \"m\"\n", MINIMAL);
        let config: Config = toml::from_str(&text).unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("Unknown llm provider"));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let text = format!("{}\n[orchestrator]\nmax_attempts = 0\n", MINIMAL);
        let config: Config = toml::from_str(&text).unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_domains_parse() {
        let text = format!(
            "{}\n[[schema.domains]]\nid = \"7\"\nname = \"fleet\"\ntables = [\"starships\", \"starship_pilots\"]\n",
            MINIMAL
        );
        let config: Config = toml::from_str(&text).unwrap();
        assert_eq!(config.schema.domains.len(), 1);
        assert_eq!(config.schema.domains[0].id, "7");
        assert_eq!(config.schema.domains[0].tables.len(), 2);
    }
}
