use std::fmt;

/// Main error type for the landed-cost engine
#[derive(Debug)]
pub enum Error {
    /// Configuration errors
    Config(String),

    /// Database errors (SQLx wrapped)
    Database(sqlx::Error),

    /// HTTP/Network errors
    Network(String),

    /// Validation errors
    Validation(String),

    /// Not found errors
    NotFound(String),

    /// Cache errors
    Cache(String),

    /// Contract violations (corrupt cache payloads, unparseable enums)
    Contract(String),

    /// Serialization/deserialization errors
    Serialization(serde_json::Error),

    /// IO errors
    Io(std::io::Error),

    /// Generic errors with description
    Other(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Database(e) => write!(f, "Database error: {}", e),
            Error::Network(msg) => write!(f, "Network error: {}", msg),
            Error::Validation(msg) => write!(f, "Validation error: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::Cache(msg) => write!(f, "Cache error: {}", msg),
            Error::Contract(msg) => write!(f, "Contract violation: {}", msg),
            Error::Serialization(e) => write!(f, "Serialization error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(e) => Some(e),
            Error::Serialization(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

// Conversions from external error types
impl From<sqlx::Error> for Error {
    fn from(error: sqlx::Error) -> Self {
        Error::Database(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Config(error.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Error::Network(error.to_string())
    }
}

impl From<uuid::Error> for Error {
    fn from(error: uuid::Error) -> Self {
        Error::Validation(format!("Invalid UUID: {}", error))
    }
}

// Common error constructors
impl Error {
    /// Create a new configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new validation error
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a new not found error
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a new cache error
    pub fn cache<T: Into<String>>(msg: T) -> Self {
        Error::Cache(msg.into())
    }

    /// Create a new contract violation error
    pub fn contract<T: Into<String>>(msg: T) -> Self {
        Error::Contract(msg.into())
    }

    /// Create a new network error
    pub fn network<T: Into<String>>(msg: T) -> Self {
        Error::Network(msg.into())
    }
}

impl Error {
    /// Get HTTP status code for error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::Config(_) => 500,
            Error::Database(_) => 500,
            Error::Cache(_) => 500,
            Error::Contract(_) => 500,
            Error::Serialization(_) => 500,
            Error::Io(_) => 500,
            Error::Network(_) => 503,
            Error::Other(_) => 500,
        }
    }

    /// Get error category for monitoring
    pub fn category(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Database(_) => "database",
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::Cache(_) => "cache",
            Error::Contract(_) => "contract",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
            Error::Network(_) => "network",
            Error::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::validation("bad country code");
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_contract_violations_are_fatal_500() {
        let err = Error::contract("corrupt cached payload");
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.category(), "contract");
    }
}
