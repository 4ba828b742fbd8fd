//! Library-boundary error kinds (§7): which kind determines whether a
//! REST call gets retried, a kill-switch error counter gets bumped, or the
//! error just gets logged and the loop moves on. Most call sites still
//! return plain `anyhow::Result` — this only exists where a caller needs to
//! match on the kind rather than just propagate it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("transient: {0}")]
    Transient(#[source] anyhow::Error),
    #[error("rejected by venue: {0}")]
    Rejected(#[source] anyhow::Error),
    #[error("parse error: {0}")]
    Parse(#[source] anyhow::Error),
    #[error("configuration error: {0}")]
    Config(#[source] anyhow::Error),
}

impl BotError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BotError::Transient(_))
    }
}
