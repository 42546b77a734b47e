use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("Invalid input: {message}")]
    Validation { message: String },

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("PIN not set")]
    PinNotSet,

    #[error("Challenge has expired; request a new code")]
    ChallengeExpired,

    #[error("Too many incorrect attempts; request a new code")]
    ChallengeExhausted,

    #[error("Invalid state transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GateError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Terminal errors cannot be retried against the same challenge.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ChallengeExpired | Self::ChallengeExhausted)
    }

    /// Downstream failures: the store or a collaborator broke, not the caller.
    pub fn is_downstream(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Serialization(_) | Self::Other(_))
    }

    /// Message safe to show a customer. Downstream detail is never surfaced.
    pub fn user_message(&self) -> String {
        if self.is_downstream() {
            "Something went wrong on our side. Please try again.".to_string()
        } else {
            self.to_string()
        }
    }
}

pub type GateResult<T> = Result<T, GateError>;
