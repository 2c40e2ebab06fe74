//! Error types for LangWise.

use uuid::Uuid;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Plan generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Voice agent gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Agent {operation} request failed with status {status}: {body}")]
    RequestFailed {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("HTTP transport error during {operation}: {reason}")]
    Transport { operation: String, reason: String },

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),
}

/// Assessment session lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session {id} not found")]
    NotFound { id: Uuid },

    #[error("Session {id} does not belong to user {user_id}")]
    Forbidden { id: Uuid, user_id: String },

    #[error("Session {id} has no transcript yet")]
    TranscriptNotReady { id: Uuid },
}

/// Plan generator errors.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Malformed plan output: {0}")]
    InvalidResponse(String),

    #[error("Plan output violates schema: {0}")]
    SchemaMismatch(String),
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials for user {user_id}")]
    InvalidCredentials { user_id: String },

    #[error("Invalid or expired token")]
    InvalidToken,
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
