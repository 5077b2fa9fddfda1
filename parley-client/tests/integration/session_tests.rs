use crate::utils::{MockMediaEngine, init_tracing};
use anyhow::{Context, Result};
use parley_client::{
    ClientError, MediaEvent, RemoteTrack, Session, SessionConfig, SessionEvent, SessionHandle,
};
use parley_core::{PeerInfo, SignalMessage};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Harness {
    engine: Arc<MockMediaEngine>,
    handle: SessionHandle,
    /// What the session sent toward the coordinator.
    outbound: mpsc::UnboundedReceiver<SignalMessage>,
    /// Feed of signals "from" the coordinator.
    inbound: mpsc::UnboundedSender<SignalMessage>,
}

impl Harness {
    async fn recv_outbound(&mut self) -> Result<SignalMessage> {
        tokio::time::timeout(Duration::from_secs(5), self.outbound.recv())
            .await
            .context("timed out waiting for outbound signal")?
            .context("session link closed")
    }

    async fn recv_event(&mut self) -> Result<SessionEvent> {
        tokio::time::timeout(Duration::from_secs(5), self.handle.events.recv())
            .await
            .context("timed out waiting for session event")?
            .context("session events closed")
    }

    /// Round-trip a chat through the loop; once the echo event arrives,
    /// everything fed before it has been processed.
    async fn sync(&mut self) -> Result<()> {
        self.inbound.send(SignalMessage::Chat {
            room_id: "r1".into(),
            message: "sync".into(),
            username: "sync".into(),
            sender_peer_id: "sync".into(),
            timestamp: Some(0),
        })?;
        loop {
            if let SessionEvent::Chat(entry) = self.recv_event().await? {
                if entry.message == "sync" {
                    return Ok(());
                }
            }
        }
    }
}

async fn start_session() -> Harness {
    init_tracing();
    let engine = Arc::new(MockMediaEngine::new());
    let (link_tx, outbound) = mpsc::unbounded_channel();
    let (inbound, signal_rx) = mpsc::unbounded_channel();

    let config = SessionConfig {
        room_id: "r1".into(),
        username: "ada".into(),
        peer_id: "A".into(),
    };
    let (session, handle) = Session::join(engine.clone(), config, link_tx, signal_rx)
        .await
        .expect("join failed");
    tokio::spawn(session.run());

    Harness {
        engine,
        handle,
        outbound,
        inbound,
    }
}

fn member(id: &str) -> PeerInfo {
    PeerInfo {
        peer_id: id.into(),
        username: id.to_lowercase(),
    }
}

#[tokio::test]
async fn media_failure_is_fatal_to_joining() {
    init_tracing();
    let engine = Arc::new(MockMediaEngine::failing());
    let (link_tx, mut outbound) = mpsc::unbounded_channel();
    let (_inbound, signal_rx) = mpsc::unbounded_channel();

    let config = SessionConfig {
        room_id: "r1".into(),
        username: "ada".into(),
        peer_id: "A".into(),
    };
    let result = Session::join(engine, config, link_tx, signal_rx).await;

    assert!(matches!(result, Err(ClientError::Media(_))));
    // No join was attempted without media.
    assert!(outbound.try_recv().is_err());
}

#[tokio::test]
async fn join_is_sent_once_media_and_link_are_ready() {
    let mut h = start_session().await;
    assert_eq!(
        h.recv_outbound().await.unwrap(),
        SignalMessage::JoinRoom {
            room_id: "r1".into(),
            peer_id: "A".into(),
            username: "ada".into(),
        }
    );
}

#[tokio::test]
async fn room_joined_spawns_one_initiator_per_existing_peer() {
    let mut h = start_session().await;
    h.recv_outbound().await.unwrap(); // join-room

    h.inbound
        .send(SignalMessage::RoomJoined {
            peers: vec![member("B"), member("C")],
            your_peer_id: "A".into(),
        })
        .unwrap();

    let mut targets = Vec::new();
    for _ in 0..2 {
        match h.recv_outbound().await.unwrap() {
            SignalMessage::Offer {
                target_peer_id,
                sender_peer_id,
                ..
            } => {
                assert_eq!(sender_peer_id, "A".into());
                targets.push(target_peer_id.unwrap());
            }
            other => panic!("expected offer, got {:?}", other),
        }
    }
    assert_eq!(targets, vec!["B".into(), "C".into()]);
    assert_eq!(h.engine.ops.count("B:create_offer"), 1);
    assert_eq!(h.engine.ops.count("C:create_offer"), 1);
}

#[tokio::test]
async fn peer_joined_records_membership_but_does_not_negotiate() {
    let mut h = start_session().await;
    h.recv_outbound().await.unwrap();

    h.inbound
        .send(SignalMessage::PeerJoined {
            peer_id: "D".into(),
            username: "dee".into(),
        })
        .unwrap();

    match h.recv_event().await.unwrap() {
        SessionEvent::PeerJoined { peer_id, username } => {
            assert_eq!(peer_id, "D".into());
            assert_eq!(username, "dee");
        }
        other => panic!("expected peer-joined event, got {:?}", other),
    }
    // The newcomer is the initiator toward us: nothing was sent and no
    // channel was created.
    assert_eq!(h.engine.ops.count("D:create_channel"), 0);
    assert!(h.outbound.try_recv().is_err());
}

#[tokio::test]
async fn offer_from_unknown_peer_is_answered() {
    let mut h = start_session().await;
    h.recv_outbound().await.unwrap();

    h.inbound
        .send(SignalMessage::Offer {
            target_peer_id: None,
            offer: json!({"type": "offer", "sdp": "remote-D"}),
            sender_peer_id: "D".into(),
        })
        .unwrap();

    match h.recv_outbound().await.unwrap() {
        SignalMessage::Answer {
            target_peer_id,
            sender_peer_id,
            ..
        } => {
            assert_eq!(target_peer_id, Some("D".into()));
            assert_eq!(sender_peer_id, "A".into());
        }
        other => panic!("expected answer, got {:?}", other),
    }

    // A candidate for the now-live negotiation is applied.
    h.inbound
        .send(SignalMessage::IceCandidate {
            target_peer_id: None,
            candidate: json!({"candidate": "c1"}),
            sender_peer_id: "D".into(),
        })
        .unwrap();
    h.sync().await.unwrap();
    assert_eq!(h.engine.ops.count("D:add_remote_candidate"), 1);
}

#[tokio::test]
async fn candidate_without_negotiation_is_dropped_quietly() {
    let mut h = start_session().await;
    h.recv_outbound().await.unwrap();

    h.inbound
        .send(SignalMessage::IceCandidate {
            target_peer_id: None,
            candidate: json!({"candidate": "early"}),
            sender_peer_id: "Z".into(),
        })
        .unwrap();
    h.sync().await.unwrap();

    assert!(h.engine.ops.snapshot().iter().all(|op| !op.starts_with("Z:")));
    // Session still works afterwards.
    h.handle.send_chat("still alive");
    assert!(matches!(
        h.recv_outbound().await.unwrap(),
        SignalMessage::Chat { .. }
    ));
}

#[tokio::test]
async fn peer_left_destroys_the_negotiation() {
    let mut h = start_session().await;
    h.recv_outbound().await.unwrap();

    h.inbound
        .send(SignalMessage::RoomJoined {
            peers: vec![member("B")],
            your_peer_id: "A".into(),
        })
        .unwrap();
    h.recv_outbound().await.unwrap(); // offer to B

    h.inbound
        .send(SignalMessage::PeerLeft { peer_id: "B".into() })
        .unwrap();
    match h.recv_event().await.unwrap() {
        SessionEvent::PeerLeft { peer_id } => assert_eq!(peer_id, "B".into()),
        other => panic!("expected peer-left event, got {:?}", other),
    }
    assert_eq!(h.engine.ops.count("B:close"), 1);

    // A late answer from the departed peer is dropped, not applied.
    h.inbound
        .send(SignalMessage::Answer {
            target_peer_id: None,
            answer: json!({"type": "answer", "sdp": "late"}),
            sender_peer_id: "B".into(),
        })
        .unwrap();
    h.sync().await.unwrap();
    assert_eq!(h.engine.ops.count("B:apply_remote_answer"), 0);
}

#[tokio::test]
async fn chat_echo_lands_in_the_transcript_event() {
    let mut h = start_session().await;
    h.recv_outbound().await.unwrap();

    h.handle.send_chat("hello");
    match h.recv_outbound().await.unwrap() {
        SignalMessage::Chat {
            message, timestamp, ..
        } => {
            assert_eq!(message, "hello");
            assert!(timestamp.is_none(), "client never stamps chat");
        }
        other => panic!("expected chat, got {:?}", other),
    }

    // The coordinator's echo is the delivery confirmation.
    h.inbound
        .send(SignalMessage::Chat {
            room_id: "r1".into(),
            message: "hello".into(),
            username: "ada".into(),
            sender_peer_id: "A".into(),
            timestamp: Some(1_700_000_000_000),
        })
        .unwrap();
    match h.recv_event().await.unwrap() {
        SessionEvent::Chat(entry) => {
            assert_eq!(entry.message, "hello");
            assert_eq!(entry.timestamp, Some(1_700_000_000_000));
        }
        other => panic!("expected chat event, got {:?}", other),
    }
}

#[tokio::test]
async fn locally_gathered_candidates_are_relayed() {
    let mut h = start_session().await;
    h.recv_outbound().await.unwrap();

    h.inbound
        .send(SignalMessage::RoomJoined {
            peers: vec![member("B")],
            your_peer_id: "A".into(),
        })
        .unwrap();
    h.recv_outbound().await.unwrap(); // offer to B

    h.engine
        .events_tx()
        .send(MediaEvent::CandidateGenerated(
            "B".into(),
            json!({"candidate": "local-1"}),
        ))
        .await
        .unwrap();

    match h.recv_outbound().await.unwrap() {
        SignalMessage::IceCandidate {
            target_peer_id,
            sender_peer_id,
            candidate,
        } => {
            assert_eq!(target_peer_id, Some("B".into()));
            assert_eq!(sender_peer_id, "A".into());
            assert_eq!(candidate["candidate"], "local-1");
        }
        other => panic!("expected ice-candidate, got {:?}", other),
    }
}

#[tokio::test]
async fn remote_tracks_surface_as_session_events() {
    let mut h = start_session().await;
    h.recv_outbound().await.unwrap();

    h.inbound
        .send(SignalMessage::RoomJoined {
            peers: vec![member("B")],
            your_peer_id: "A".into(),
        })
        .unwrap();
    h.recv_outbound().await.unwrap();

    h.engine
        .events_tx()
        .send(MediaEvent::RemoteTrack(
            "B".into(),
            RemoteTrack {
                id: "t0".into(),
                kind: "video".into(),
            },
        ))
        .await
        .unwrap();

    match h.recv_event().await.unwrap() {
        SessionEvent::RemoteTrack { peer_id, track } => {
            assert_eq!(peer_id, "B".into());
            assert_eq!(track.kind, "video");
        }
        other => panic!("expected remote-track event, got {:?}", other),
    }
}

#[tokio::test]
async fn leave_tears_down_negotiations_and_notifies_the_coordinator() {
    let mut h = start_session().await;
    h.recv_outbound().await.unwrap();

    h.inbound
        .send(SignalMessage::RoomJoined {
            peers: vec![member("B"), member("C")],
            your_peer_id: "A".into(),
        })
        .unwrap();
    h.recv_outbound().await.unwrap();
    h.recv_outbound().await.unwrap();

    h.handle.leave();

    assert_eq!(
        h.recv_outbound().await.unwrap(),
        SignalMessage::Leave {
            peer_id: "A".into(),
            room_id: "r1".into(),
        }
    );
    loop {
        match h.recv_event().await.unwrap() {
            SessionEvent::Left => break,
            _ => continue,
        }
    }
    assert_eq!(h.engine.ops.count("B:close"), 1);
    assert_eq!(h.engine.ops.count("C:close"), 1);
}
