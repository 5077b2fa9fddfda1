use crate::media::{LocalMedia, MediaChannel, MediaEngine, MediaError, MediaEvent, RemoteTrack};
use async_trait::async_trait;
use parley_core::PeerId;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

#[derive(Clone)]
pub struct RtcEngineConfig {
    pub ice_servers: Vec<String>,
}

impl Default for RtcEngineConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
        }
    }
}

/// Media engine backed by the `webrtc` crate. Local media are
/// static-sample tracks the application feeds; capture devices are
/// outside this crate.
pub struct RtcMediaEngine {
    config: RtcEngineConfig,
}

struct RtcLocalMedia {
    tracks: Vec<Arc<TrackLocalStaticSample>>,
}

impl RtcMediaEngine {
    pub fn new(config: RtcEngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MediaEngine for RtcMediaEngine {
    async fn acquire_local_media(&self) -> Result<LocalMedia, MediaError> {
        let audio = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            "parley-local".to_owned(),
        ));
        let video = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                ..Default::default()
            },
            "video".to_owned(),
            "parley-local".to_owned(),
        ));

        Ok(LocalMedia::new(RtcLocalMedia {
            tracks: vec![audio, video],
        }))
    }

    async fn create_channel(
        &self,
        remote_peer_id: PeerId,
        events: mpsc::Sender<MediaEvent>,
    ) -> Result<Box<dyn MediaChannel>, MediaError> {
        let mut codecs = webrtc::api::media_engine::MediaEngine::default();
        codecs.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut codecs)?;

        let api = APIBuilder::new()
            .with_media_engine(codecs)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.config.ice_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(rtc_config).await?);

        let ice_tx = events.clone();
        let ice_peer = remote_peer_id.clone();
        pc.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            let peer = ice_peer.clone();
            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let Ok(value) = serde_json::to_value(&init) else {
                    return;
                };
                let _ = tx.send(MediaEvent::CandidateGenerated(peer, value)).await;
            })
        }));

        let track_tx = events.clone();
        let track_peer = remote_peer_id.clone();
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            let tx = track_tx.clone();
            let peer = track_peer.clone();
            Box::pin(async move {
                info!("remote track arrived from {}", peer);
                let remote = RemoteTrack {
                    id: track.id(),
                    kind: track.kind().to_string(),
                };
                let _ = tx.send(MediaEvent::RemoteTrack(peer, remote)).await;
            })
        }));

        let state_tx = events;
        let state_peer = remote_peer_id.clone();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let tx = state_tx.clone();
            let peer = state_peer.clone();
            Box::pin(async move {
                debug!("peer connection state for {}: {}", peer, s);
                match s {
                    RTCPeerConnectionState::Failed
                    | RTCPeerConnectionState::Disconnected
                    | RTCPeerConnectionState::Closed => {
                        let _ = tx.send(MediaEvent::ChannelClosed(peer)).await;
                    }
                    _ => {}
                }
            })
        }));

        Ok(Box::new(RtcMediaChannel { pc }))
    }
}

struct RtcMediaChannel {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl MediaChannel for RtcMediaChannel {
    async fn add_local_tracks(&self, media: &LocalMedia) -> Result<(), MediaError> {
        let local = media
            .downcast_ref::<RtcLocalMedia>()
            .ok_or(MediaError::ForeignMedia)?;
        for track in &local.tracks {
            let track: Arc<dyn TrackLocal + Send + Sync> = track.clone();
            self.pc.add_track(track).await?;
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<Value, MediaError> {
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer.clone()).await?;
        Ok(serde_json::to_value(&offer)?)
    }

    async fn apply_remote_offer(&self, offer: Value) -> Result<(), MediaError> {
        let desc: RTCSessionDescription = serde_json::from_value(offer)?;
        self.pc.set_remote_description(desc).await?;
        Ok(())
    }

    async fn create_answer(&self) -> Result<Value, MediaError> {
        let answer = self.pc.create_answer(None).await?;
        self.pc.set_local_description(answer.clone()).await?;
        Ok(serde_json::to_value(&answer)?)
    }

    async fn apply_remote_answer(&self, answer: Value) -> Result<(), MediaError> {
        let desc: RTCSessionDescription = serde_json::from_value(answer)?;
        self.pc.set_remote_description(desc).await?;
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: Value) -> Result<(), MediaError> {
        let init: RTCIceCandidateInit = serde_json::from_value(candidate)?;
        self.pc.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            debug!("error closing peer connection: {}", e);
        }
    }
}
