pub mod error;
pub mod link;
pub mod media;
pub mod negotiation;
pub mod session;

pub use error::ClientError;
pub use media::{
    LocalMedia, MediaChannel, MediaEngine, MediaError, MediaEvent, RemoteTrack, RtcEngineConfig,
    RtcMediaEngine,
};
pub use negotiation::{Negotiation, NegotiationRole, NegotiationState};
pub use session::{ChatEntry, Session, SessionConfig, SessionEvent, SessionHandle};
