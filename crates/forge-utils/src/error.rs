use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::exit_codes::ExitCode;

/// Library-level error type with rich context and user-friendly reporting.
///
/// `ForgeError` is the error type returned at crate boundaries. Inside the
/// orchestrator most failures are caught and turned into chat notices; only
/// caller mistakes (unknown document, empty request) and configuration
/// problems reach the caller as `Err`.
///
/// # Error Categories
///
/// | Category | Description |
/// |----------|-------------|
/// | `Config` | Configuration file or CLI argument errors |
/// | `Phase` | Phase executor failures |
/// | `Llm` | Model gateway failures |
/// | `Store` | Artifact history violations and log I/O |
/// | `Document*` | Unknown or duplicate documents |
///
/// # Exit Code Mapping
///
/// Use [`to_exit_code()`](Self::to_exit_code) to map errors to CLI exit codes.
#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Phase execution error: {0}")]
    Phase(#[from] PhaseError),

    #[error("Model gateway error: {0}")]
    Llm(#[from] LlmError),

    #[error("Artifact store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    #[error("Document already exists: {id}")]
    DocumentExists { id: String },

    #[error("Chat message {message_id} not found in document {id}")]
    MessageNotFound { id: String, message_id: u64 },

    #[error("Chat message {message_id} in document {id} is not linked to a version")]
    MessageHasNoVersion { id: String, message_id: u64 },

    #[error("Generation request is empty")]
    EmptyRequest,
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    PhaseExecution,
    ModelGateway,
    Storage,
    Cancellation,
    Validation,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::PhaseExecution => write!(f, "Phase Execution"),
            Self::ModelGateway => write!(f, "Model Gateway"),
            Self::Storage => write!(f, "Storage"),
            Self::Cancellation => write!(f, "Cancellation"),
            Self::Validation => write!(f, "Validation"),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },

    #[error("Configuration validation failed: {error_count} errors")]
    ValidationFailed {
        errors: Vec<String>,
        error_count: usize,
    },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(msg) => format!("The configuration file could not be parsed: {msg}"),
            Self::MissingRequired(key) => format!("Required configuration '{key}' is missing"),
            Self::InvalidValue { key, value } => {
                format!("Configuration key '{key}' has an invalid value: {value}")
            }
            Self::NotFound { path } => format!("No configuration file exists at {path}"),
            Self::DiscoveryFailed { reason } => {
                format!("Configuration discovery failed: {reason}")
            }
            Self::ValidationFailed { errors, .. } => {
                format!("Configuration is invalid:\n  - {}", errors.join("\n  - "))
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) | Self::ValidationFailed { .. } => Some(
                "forge reads TOML from --config, $FORGE_HOME/config.toml or the nearest .forge/config.toml."
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::NotFound { .. } => vec!["Check the --config path".to_string()],
            Self::InvalidValue { key, .. } if key.contains("temperature") => {
                vec!["Temperatures must be between 0.0 and 1.0".to_string()]
            }
            _ => vec!["Run `forge config` to print the effective configuration".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Phase executor errors.
///
/// Only the failures that must abort a generation attempt are represented here.
/// Degraded-but-valid outcomes (fallback plans, worker placeholders, fallback
/// retrieval context) are not errors.
#[derive(Error, Debug)]
pub enum PhaseError {
    #[error("Phase {phase} was cancelled")]
    Cancelled { phase: String },

    #[error("Phase {phase} produced an invalid structure: {reason}")]
    InvalidStructure { phase: String, reason: String },

    #[error("Phase {phase} received an empty model response")]
    EmptyResponse { phase: String },

    #[error("Phase {phase} stream failed: {reason}")]
    StreamFailed { phase: String, reason: String },

    #[error("Phase {phase} model invocation failed: {source}")]
    Llm {
        phase: String,
        #[source]
        source: LlmError,
    },
}

impl PhaseError {
    /// Whether this error only reports that the generation token went stale.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl UserFriendlyError for PhaseError {
    fn user_message(&self) -> String {
        match self {
            Self::Cancelled { phase } => format!("The {phase} phase was cancelled"),
            Self::InvalidStructure { phase, reason } => {
                format!("The {phase} phase returned a result that could not be used: {reason}")
            }
            Self::EmptyResponse { phase } => {
                format!("The model returned nothing during the {phase} phase")
            }
            Self::StreamFailed { phase, reason } => {
                format!("The {phase} phase stopped while streaming code: {reason}")
            }
            Self::Llm { phase, source } => {
                format!("The {phase} phase could not reach the model: {}", source.user_message())
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidStructure { .. } => Some(
                "The hierarchical build needs a well-formed component plan to continue.".to_string(),
            ),
            Self::StreamFailed { .. } => {
                Some("No partial version was saved; the last committed version is unchanged.".to_string())
            }
            Self::Llm { source, .. } => source.context(),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Cancelled { .. } => Vec::new(),
            Self::InvalidStructure { .. } | Self::EmptyResponse { .. } => vec![
                "Send the request again".to_string(),
                "Describe fewer components in one request".to_string(),
            ],
            Self::StreamFailed { .. } => vec!["Send the request again".to_string()],
            Self::Llm { source, .. } => source.suggestions(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Cancelled { .. } => ErrorCategory::Cancellation,
            Self::InvalidStructure { .. } => ErrorCategory::Validation,
            Self::Llm { .. } => ErrorCategory::ModelGateway,
            _ => ErrorCategory::PhaseExecution,
        }
    }
}

/// Model gateway errors
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// Transport-level failure (HTTP connectivity, broken stream)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403, missing API key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// Invocation timed out
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// Budget limit exceeded
    #[error("Budget exceeded: attempted {attempted} calls, limit is {limit}")]
    BudgetExceeded { limit: u32, attempted: u32 },

    /// Response arrived but did not have the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Configuration error
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// Unsupported feature or provider
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl UserFriendlyError for LlmError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("model transport error: {msg}"),
            Self::ProviderAuth(msg) => format!("model provider authentication failed: {msg}"),
            Self::ProviderQuota(msg) => format!("model provider quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("model provider service outage: {msg}"),
            Self::Timeout { duration } => format!("model invocation timed out after {duration:?}"),
            Self::BudgetExceeded { limit, attempted } => {
                format!("model call budget exceeded: attempted {attempted} calls, limit is {limit}")
            }
            Self::MalformedResponse(msg) => format!("model response was malformed: {msg}"),
            Self::Misconfiguration(msg) => format!("model configuration error: {msg}"),
            Self::Unsupported(msg) => format!("model feature not supported: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Transport(_) => {
                Some("The model provider could not be reached or the connection dropped.".to_string())
            }
            Self::ProviderAuth(_) => Some("The provider rejected the configured API key.".to_string()),
            Self::BudgetExceeded { .. } => {
                Some("Budget tracking counts attempted calls for this process.".to_string())
            }
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ProviderAuth(_) | Self::Misconfiguration(_) => vec![
                "Check that the API key environment variable named in [llm] api_key_env is set"
                    .to_string(),
            ],
            Self::ProviderQuota(_) | Self::ProviderOutage(_) | Self::Timeout { .. } => {
                vec!["Wait a moment and send the request again".to_string()]
            }
            Self::BudgetExceeded { .. } => {
                vec!["Restart forge or raise [llm] budget".to_string()]
            }
            _ => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Misconfiguration(_) | Self::Unsupported(_) => ErrorCategory::Configuration,
            _ => ErrorCategory::ModelGateway,
        }
    }
}

/// Artifact history errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No history exists for document {document}")]
    DocumentNotFound { document: String },

    /// A commit tried to reuse a version number. Always an internal defect.
    #[error("Version {version} already exists in the history of {document}")]
    VersionExists { document: String, version: u64 },

    #[error("Version {version} does not exist in the history of {document} (latest: {latest})")]
    VersionNotFound {
        document: String,
        version: u64,
        latest: u64,
    },

    #[error("Artifact log {path} could not be written: {reason}")]
    LogWrite { path: String, reason: String },

    #[error("Artifact log {path} is corrupt at line {line}: {reason}")]
    LogCorrupt {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("Could not export to {path}: {reason}")]
    Export { path: String, reason: String },
}

impl UserFriendlyError for StoreError {
    fn user_message(&self) -> String {
        match self {
            Self::DocumentNotFound { document } => format!("Document '{document}' has no history"),
            Self::VersionExists { document, version } => {
                format!("Version {version} of '{document}' was already saved")
            }
            Self::VersionNotFound {
                version, latest, ..
            } => format!("Version {version} does not exist (latest version is {latest})"),
            Self::LogWrite { path, reason } => {
                format!("Could not append to the artifact log at {path}: {reason}")
            }
            Self::LogCorrupt { path, line, reason } => {
                format!("The artifact log at {path} is damaged (line {line}): {reason}")
            }
            Self::Export { path, reason } => format!("Could not write {path}: {reason}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::VersionExists { .. } => {
                Some("Version numbers are never reused; this indicates a bug in forge.".to_string())
            }
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::VersionNotFound { .. } => vec!["Use :history to list saved versions".to_string()],
            Self::LogCorrupt { .. } => {
                vec!["Move the damaged log aside; forge will start a new one".to_string()]
            }
            _ => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Storage
    }
}

impl UserFriendlyError for ForgeError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Phase(e) => e.user_message(),
            Self::Llm(e) => e.user_message(),
            Self::Store(e) => e.user_message(),
            Self::Io(e) => format!("File system error: {e}"),
            Self::DocumentNotFound { id } => format!("Document '{id}' does not exist"),
            Self::DocumentExists { id } => format!("Document '{id}' already exists"),
            Self::MessageNotFound { message_id, .. } => {
                format!("Chat message #{message_id} does not exist")
            }
            Self::MessageHasNoVersion { message_id, .. } => {
                format!("Chat message #{message_id} does not refer to a saved version")
            }
            Self::EmptyRequest => "The request is empty".to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::Phase(e) => e.context(),
            Self::Llm(e) => e.context(),
            Self::Store(e) => e.context(),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(e) => e.suggestions(),
            Self::Phase(e) => e.suggestions(),
            Self::Llm(e) => e.suggestions(),
            Self::Store(e) => e.suggestions(),
            Self::EmptyRequest => vec!["Describe the interface you want to build".to_string()],
            _ => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(e) => e.category(),
            Self::Phase(e) => e.category(),
            Self::Llm(e) => e.category(),
            Self::Store(e) => e.category(),
            Self::Io(_) => ErrorCategory::Storage,
            _ => ErrorCategory::Validation,
        }
    }
}

impl ForgeError {
    /// Map this error to the CLI exit code.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::CONFIG_ERROR,
            Self::Llm(_) | Self::Phase(_) => ExitCode::GENERATION_FAILED,
            Self::Store(_) | Self::Io(_) => ExitCode::STORAGE_ERROR,
            _ => ExitCode::INTERNAL,
        }
    }

    /// Multi-line message with context and suggestions, for terminal output.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut out = format!("Error: {}", self.user_message());
        if let Some(context) = self.context() {
            out.push_str(&format!("\n\n  {context}"));
        }
        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            out.push_str("\n\nSuggestions:");
            for suggestion in suggestions {
                out.push_str(&format!("\n  - {suggestion}"));
            }
        }
        out
    }
}
