//! Errors raised while wiring the application to the host: locating
//! directories and rendering results for the terminal.

use thiserror::Error;

use crate::application::ApplicationError;

#[derive(Error, Debug)]
pub enum InfraError {
    #[error(transparent)]
    Application(#[from] ApplicationError),

    /// No home directory, so no XDG location for `what`.
    #[error("cannot locate the {0}: no home directory")]
    NoHomeDir(&'static str),

    #[error("cannot render {what} as JSON")]
    Render {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

impl InfraError {
    pub fn render(what: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Render {
            what: what.into(),
            source,
        }
    }
}
