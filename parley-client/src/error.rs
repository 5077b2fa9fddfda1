use crate::media::MediaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Local media could not be acquired; fatal to starting a session.
    #[error("media engine failure: {0}")]
    Media(#[from] MediaError),

    #[error("signaling link closed")]
    LinkClosed,

    #[error("transport: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
}
