use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Malformed block framing or block content; aborts the ingestion run.
    #[error("framing error: {0}")]
    Framing(String),

    #[error("could not decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: prost::DecodeError,
    },

    /// Input this service deliberately does not handle.
    #[error("unsupported feature: {0}")]
    Unsupported(String),

    #[error("invalid state file: {0}")]
    State(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn framing(msg: impl Into<String>) -> Self {
        Error::Framing(msg.into())
    }

    pub(crate) fn decode(what: &'static str) -> impl FnOnce(prost::DecodeError) -> Self {
        move |source| Error::Decode { what, source }
    }

    /// Fatal errors are configuration problems that retrying will not fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Unsupported(_) | Error::State(_) | Error::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
