use crate::answering::AnswererSettings;
use crate::processing::ProcessorSettings;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_GROQ_API_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_GROQ_MODEL: &str = "llama-3.1-8b-instant";
const DEFAULT_SERVER_PORT: u16 = 5000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Configuration was installed more than once.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration for the Audit RAG server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Credential used by the answering backend. May be unset or a placeholder.
    pub groq_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible chat completions API.
    pub groq_api_url: String,
    /// Chat model identifier.
    pub groq_model: String,
    /// Sampling temperature for generated answers.
    pub answer_temperature: f32,
    /// Maximum tokens requested per answer.
    pub answer_max_tokens: u32,
    /// Token budget per chunk.
    pub text_splitter_chunk_size: usize,
    /// Token overlap between adjacent chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Dimensionality of the hashed embedding vectors.
    pub embedding_dimension: usize,
    /// Number of context fragments returned per search.
    pub search_top_k: usize,
    /// Upper bound on the multipart request body.
    pub max_upload_bytes: usize,
    /// Parent directory for per-request upload workspaces.
    pub upload_temp_dir: Option<PathBuf>,
    /// HTTP server port.
    pub server_port: u16,
}

impl Config {
    /// Load configuration from environment variables, applying defaults for unset values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            groq_api_key: load_env_optional("GROQ_API_KEY"),
            groq_api_url: load_env_optional("GROQ_API_URL")
                .unwrap_or_else(|| DEFAULT_GROQ_API_URL.to_string()),
            groq_model: load_env_optional("GROQ_MODEL")
                .unwrap_or_else(|| DEFAULT_GROQ_MODEL.to_string()),
            answer_temperature: load_parsed("ANSWER_TEMPERATURE", 0.1)?,
            answer_max_tokens: load_parsed("ANSWER_MAX_TOKENS", 1024)?,
            text_splitter_chunk_size: load_parsed("TEXT_SPLITTER_CHUNK_SIZE", 512)?,
            text_splitter_chunk_overlap: load_parsed("TEXT_SPLITTER_CHUNK_OVERLAP", 64)?,
            embedding_dimension: load_parsed("EMBEDDING_DIMENSION", 384)?,
            search_top_k: load_parsed("SEARCH_TOP_K", 4)?,
            max_upload_bytes: load_parsed("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            upload_temp_dir: load_env_optional("UPLOAD_TEMP_DIR").map(PathBuf::from),
            server_port: load_parsed("SERVER_PORT", DEFAULT_SERVER_PORT)?,
        })
    }

    /// Settings for the default document processor.
    pub fn processor_settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            chunk_size: self.text_splitter_chunk_size,
            chunk_overlap: self.text_splitter_chunk_overlap,
            embedding_dimension: self.embedding_dimension,
            top_k: self.search_top_k,
        }
    }

    /// Settings for the default query answerer.
    pub fn answerer_settings(&self) -> AnswererSettings {
        AnswererSettings {
            api_url: self.groq_api_url.clone(),
            api_key: self.groq_api_key.clone(),
            model: self.groq_model.clone(),
            temperature: self.answer_temperature,
            max_tokens: self.answer_max_tokens,
        }
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_parsed<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
        .map(|parsed| parsed.unwrap_or(default))
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load `.env` and the process environment, then install the result in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        groq_api_url = %config.groq_api_url,
        groq_model = %config.groq_model,
        chunk_size = config.text_splitter_chunk_size,
        top_k = config.search_top_k,
        server_port = config.server_port,
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    CONFIG.get().ok_or(ConfigError::AlreadyInitialized)
}
