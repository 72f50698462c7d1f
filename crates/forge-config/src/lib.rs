//! Configuration model, discovery, and validation for forge.

pub mod config;

pub use config::{
    ArtifactsConfig, CliArgs, Config, ConfigSource, GenerationConfig, LlmConfig, LlmProvider,
    PipelineConfig, PipelineFlow, RetrievalConfig,
};
