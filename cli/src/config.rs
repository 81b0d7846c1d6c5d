//! Configuration loading (§6): a YAML file layered under the system's
//! literal environment variable names, then overridden by whichever CLI
//! flags the operator actually passed -- a figment
//! file-then-env-then-overrides layering with no common prefix, since these
//! variable names are normative, not namespaced.

use crate::cli::{Cli, Mode};
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use pipeline_core::errors::CoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmType {
    Local,
    Openai,
    OpenaiCompatible,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub llm_type: LlmType,
    pub model_path: String,
    pub llama_path: String,
    pub openai_api_key: Option<String>,
    pub openai_api_base: String,
    pub llm_model: String,
    pub redis_url: Option<String>,
    pub doc_queue_key: String,
    pub web_api_endpoint: Option<String>,
    pub api_key: Option<String>,
    pub graph_ipns_key: String,
    pub vector_url: String,
    pub vector_collection: String,
    pub embed_endpoint: String,
    pub pin_lifetime_days: i64,
    pub failed_doc_staleness_days: i64,
    pub prompt_hot_reload: bool,
    pub graph_path: PathBuf,

    // Not environment-backed; carried through so the rest of the CLI only
    // has to consult `Settings`.
    #[serde(skip)]
    pub threads: Option<u32>,
    #[serde(skip)]
    pub ctx_size: Option<u32>,
    #[serde(skip)]
    pub batch_size: usize,
    #[serde(skip)]
    pub max_parallel: usize,
    #[serde(skip)]
    pub cost_per_hour: f64,
    #[serde(skip)]
    pub max_budget: f64,
    #[serde(skip)]
    pub idle_shutdown_secs: u64,
    #[serde(skip)]
    pub storage_path: PathBuf,
    #[serde(skip)]
    pub replication: usize,
    #[serde(skip)]
    pub storage_capacity_gb: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm_type: LlmType::Local,
            model_path: "./path/to/phi3-model.gguf".to_string(),
            llama_path: "./main".to_string(),
            openai_api_key: None,
            openai_api_base: "https://api.openai.com/v1".to_string(),
            llm_model: "gpt-3.5-turbo".to_string(),
            redis_url: None,
            doc_queue_key: "doc_queue".to_string(),
            web_api_endpoint: None,
            api_key: None,
            graph_ipns_key: "self".to_string(),
            vector_url: "http://localhost:6333".to_string(),
            vector_collection: "docs".to_string(),
            embed_endpoint: "http://localhost:8081/embed".to_string(),
            pin_lifetime_days: 30,
            failed_doc_staleness_days: 7,
            prompt_hot_reload: false,
            graph_path: PathBuf::from("data/graph_data.json"),
            threads: None,
            ctx_size: None,
            batch_size: 32,
            max_parallel: 32,
            cost_per_hour: 50.0,
            max_budget: f64::INFINITY,
            idle_shutdown_secs: 600,
            storage_path: PathBuf::from("./temp_storage"),
            replication: 2,
            storage_capacity_gb: 50.0,
        }
    }
}

impl Settings {
    /// Loads defaults, layers a YAML file (if one exists at `config_path`),
    /// layers the system's literal environment variables over that, then
    /// applies whichever CLI flags the operator passed.
    pub fn load(config_path: &Option<PathBuf>, args: &Cli) -> Result<Self, CoreError> {
        let mut figment = Figment::from(figment::providers::Serialized::defaults(Settings::default()));

        for candidate in ["pipeline.yaml", "pipeline.yml"] {
            if Path::new(candidate).exists() {
                figment = figment.merge(Yaml::file(candidate));
                break;
            }
        }

        if let Some(path) = config_path {
            if !path.exists() {
                return Err(CoreError::Configuration(format!("configuration file not found: {}", path.display())));
            }
            figment = figment.merge(Yaml::file(path));
        }

        figment = figment.merge(Env::raw());

        let mut settings: Settings =
            figment.extract().map_err(|e| CoreError::Configuration(format!("failed to parse configuration: {e}")))?;

        settings.apply_overrides(args);
        Ok(settings)
    }

    fn apply_overrides(&mut self, args: &Cli) {
        if let Some(model) = &args.model {
            self.llm_model = model.clone();
        }
        if let Some(ollama_base) = &args.ollama_base {
            self.openai_api_base = ollama_base.clone();
        }
        if let Some(threads) = args.threads {
            self.threads = Some(threads);
        }
        if let Some(ctx_size) = args.ctx_size {
            self.ctx_size = Some(ctx_size);
        }
        if let Some(batch_size) = args.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(max_parallel) = args.max_parallel {
            self.max_parallel = max_parallel;
        }
        if let Some(cost_per_hour) = args.cost_per_hour {
            self.cost_per_hour = cost_per_hour;
        }
        if let Some(max_budget) = args.max_budget {
            self.max_budget = max_budget;
        }
        if let Some(idle_shutdown) = args.idle_shutdown {
            self.idle_shutdown_secs = idle_shutdown;
        }
        if let Some(storage_path) = &args.storage_path {
            self.storage_path = storage_path.clone();
        }
        if let Some(redis_url) = &args.redis_url {
            self.redis_url = Some(redis_url.clone());
        }
        if let Some(replication) = args.replication {
            self.replication = replication;
        }
        if let Some(storage_capacity) = args.storage_capacity {
            self.storage_capacity_gb = storage_capacity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_fallbacks() {
        let settings = Settings::default();
        assert_eq!(settings.redis_url, None);
        assert_eq!(settings.doc_queue_key, "doc_queue");
        assert_eq!(settings.graph_ipns_key, "self");
        assert_eq!(settings.vector_collection, "docs");
    }

    #[test]
    fn cli_flags_override_loaded_settings() {
        let mut settings = Settings::default();
        let args = Cli {
            mode: Mode::Worker,
            config: None,
            model: Some("deepseek-r1:70b".to_string()),
            ollama_base: None,
            threads: Some(8),
            ctx_size: None,
            batch_size: Some(64),
            max_parallel: None,
            cost_per_hour: None,
            max_budget: Some(100.0),
            idle_shutdown: None,
            single_file: None,
            storage_path: None,
            redis_url: Some("redis://example:6379/1".to_string()),
            replication: None,
            storage_capacity: None,
            verbose: 0,
            command: None,
        };
        settings.apply_overrides(&args);
        assert_eq!(settings.llm_model, "deepseek-r1:70b");
        assert_eq!(settings.threads, Some(8));
        assert_eq!(settings.batch_size, 64);
        assert_eq!(settings.max_budget, 100.0);
        assert_eq!(settings.redis_url, Some("redis://example:6379/1".to_string()));
    }
}
