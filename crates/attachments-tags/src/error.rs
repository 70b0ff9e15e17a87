use attachments_service::ServiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TagError {
    #[error("'{directive}' {message}")]
    Syntax { directive: String, message: String },

    #[error("unknown directive '{0}'")]
    UnknownDirective(String),

    #[error("variable '{0}' does not exist")]
    VariableDoesNotExist(String),

    #[error("'{name}' is not {expected}")]
    WrongType { name: String, expected: &'static str },

    #[error("unterminated directive at byte {0}")]
    Unterminated(usize),

    #[error("lookup failed: {0}")]
    Lookup(#[from] ServiceError),

    #[error("render error: {0}")]
    Render(String),
}

impl TagError {
    pub(crate) fn syntax(directive: &str, message: impl Into<String>) -> Self {
        TagError::Syntax {
            directive: directive.to_string(),
            message: message.into(),
        }
    }
}

impl From<minijinja::Error> for TagError {
    fn from(e: minijinja::Error) -> Self {
        TagError::Render(e.to_string())
    }
}
