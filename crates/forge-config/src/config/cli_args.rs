use camino::Utf8PathBuf;
use std::path::PathBuf;

/// Command-line overrides applied on top of the config file.
///
/// Every field is optional; `None` means "leave the file/default value alone".
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub model: Option<String>,
    pub worker_model: Option<String>,
    pub flow: Option<String>,
    pub llm_provider: Option<String>,
    pub retrieval_enabled: Option<bool>,
    pub retrieval_endpoint: Option<String>,
    pub artifacts_log: Option<Utf8PathBuf>,
}
