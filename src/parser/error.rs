use thiserror::Error;

/// Why a payload could not be decoded into slots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Payload is empty")]
    EmptyPayload,

    #[error("Malformed JSON: {0}")]
    Malformed(String),

    #[error("Payload is valid JSON but not an object")]
    NotAnObject,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field has the wrong shape: {0}")]
    WrongShape(String),
}

impl ParseError {
    /// Stable label for metrics and stage traces.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyPayload => "empty_payload",
            Self::Malformed(_) => "malformed",
            Self::NotAnObject => "not_an_object",
            Self::MissingField(_) => "missing_field",
            Self::WrongShape(_) => "wrong_shape",
        }
    }
}
