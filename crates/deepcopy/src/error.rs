//! Error types for the copy engine.

use std::fmt;

use thiserror::Error;

/// Main error type for copy operations.
#[derive(Error, Debug)]
pub enum CopyError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The table configuration does not match the live schema.
    #[error("Invalid copy configuration ({} errors):\n{}", .0.len(), format_config_errors(.0))]
    InvalidSchema(Vec<ConfigError>),

    /// A copy controller call failed.
    #[error("Backend error during {operation}: {message}")]
    Backend { operation: String, message: String },

    /// The storage engine behind a controller failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The controller decided to abort on a link it could not resolve.
    #[error("Unsatisfied link {table}.{column} -> {target} (value {value})")]
    UnsatisfiedLink {
        table: String,
        column: String,
        target: String,
        value: String,
    },

    /// Traversal went deeper than the configured ceiling.
    #[error("Recursion limit of {limit} exceeded at {table} {id} - check for contradictory reference policies")]
    RecursionLimit { limit: usize, table: String, id: String },

    /// Copy phases ran out of order or a node is missing its new identity.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Copy run was interrupted (SIGINT, etc.)
    #[error("Copy interrupted")]
    Cancelled,
}

impl CopyError {
    /// Create a Backend error
    pub fn backend(operation: impl Into<String>, message: impl Into<String>) -> Self {
        CopyError::Backend {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a Storage error
    pub fn storage(message: impl Into<String>) -> Self {
        CopyError::Storage(message.into())
    }

    /// Create an Invariant error
    pub fn invariant(message: impl Into<String>) -> Self {
        CopyError::Invariant(message.into())
    }

    /// Whether this error is the cooperative cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CopyError::Cancelled)
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            CopyError::Config(_) | CopyError::InvalidSchema(_) | CopyError::Yaml(_) => 2,
            CopyError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// A single problem found while validating the copy configuration
/// against the live schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    /// Table id the problem belongs to, if any.
    pub table: Option<String>,
    /// Reference or column involved.
    pub item: Option<String>,
    /// Human-readable description.
    pub message: String,
}

impl ConfigError {
    pub fn global(message: impl Into<String>) -> Self {
        Self {
            table: None,
            item: None,
            message: message.into(),
        }
    }

    pub fn table(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            item: None,
            message: message.into(),
        }
    }

    pub fn item(
        table: impl Into<String>,
        item: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            table: Some(table.into()),
            item: Some(item.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.table, &self.item) {
            (Some(table), Some(item)) => write!(f, "{} [{}]: {}", table, item, self.message),
            (Some(table), None) => write!(f, "{}: {}", table, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

fn format_config_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result type alias for copy operations.
pub type Result<T> = std::result::Result<T, CopyError>;
