use crate::integration::{create_router, init_tracing};
use crate::utils::TestPeer;
use parley_core::SignalMessage;
use serde_json::json;

/// The full two-party lifecycle: join, membership announcement, offer
/// and answer relay, disconnect cleanup, relay to the departed peer.
#[tokio::test]
async fn full_session_lifecycle() {
    init_tracing();
    let router = create_router();

    let mut a = TestPeer::connect("A");
    a.join(&router, "r1", "ada");
    assert_eq!(
        a.recv().await.unwrap(),
        SignalMessage::RoomJoined {
            peers: vec![],
            your_peer_id: "A".into(),
        }
    );

    let mut b = TestPeer::connect("B");
    b.join(&router, "r1", "bob");
    match b.recv().await.unwrap() {
        SignalMessage::RoomJoined { peers, your_peer_id } => {
            assert_eq!(your_peer_id, "B".into());
            assert_eq!(peers.len(), 1);
            assert_eq!(peers[0].peer_id, "A".into());
            assert_eq!(peers[0].username, "ada");
        }
        other => panic!("expected room-joined, got {:?}", other),
    }
    assert_eq!(
        a.recv().await.unwrap(),
        SignalMessage::PeerJoined {
            peer_id: "B".into(),
            username: "bob".to_string(),
        }
    );

    let offer = json!({"type": "offer", "sdp": "v=0 A"});
    router.handle_message(
        &a.link,
        SignalMessage::Offer {
            target_peer_id: Some("B".into()),
            offer: offer.clone(),
            sender_peer_id: "A".into(),
        },
    );
    assert_eq!(
        b.recv().await.unwrap(),
        SignalMessage::Offer {
            target_peer_id: None,
            offer,
            sender_peer_id: "A".into(),
        }
    );

    let answer = json!({"type": "answer", "sdp": "v=0 B"});
    router.handle_message(
        &b.link,
        SignalMessage::Answer {
            target_peer_id: Some("A".into()),
            answer: answer.clone(),
            sender_peer_id: "B".into(),
        },
    );
    assert_eq!(
        a.recv().await.unwrap(),
        SignalMessage::Answer {
            target_peer_id: None,
            answer,
            sender_peer_id: "B".into(),
        }
    );

    // A vanishes without a leave message.
    router.disconnect(&"A".into());
    assert_eq!(
        b.recv().await.unwrap(),
        SignalMessage::PeerLeft { peer_id: "A".into() }
    );

    // A later offer targeting the departed peer goes nowhere.
    router.handle_message(
        &b.link,
        SignalMessage::Offer {
            target_peer_id: Some("A".into()),
            offer: json!({}),
            sender_peer_id: "B".into(),
        },
    );
    assert!(b.try_recv().is_none());
    assert_eq!(router.connections(), 1);
}

#[tokio::test]
async fn explicit_leave_and_transport_close_are_one_departure() {
    init_tracing();
    let router = create_router();

    let mut a = TestPeer::connect("A");
    let b = TestPeer::connect("B");
    a.join(&router, "r1", "ada");
    b.join(&router, "r1", "bob");
    a.drain();

    b.leave(&router, "r1");
    router.disconnect(&b.peer_id);

    assert_eq!(
        a.recv().await.unwrap(),
        SignalMessage::PeerLeft { peer_id: "B".into() }
    );
    assert!(a.try_recv().is_none(), "peer-left must fire exactly once");
}

#[tokio::test]
async fn rejoin_replaces_the_previous_registration() {
    init_tracing();
    let router = create_router();

    let mut first = TestPeer::connect("A");
    first.join(&router, "r1", "ada");
    first.drain();

    // The client re-sends join after suspecting the first one was lost.
    let mut second = TestPeer::connect("A");
    second.join(&router, "r1", "ada");
    match second.recv().await.unwrap() {
        SignalMessage::RoomJoined { peers, .. } => assert!(peers.is_empty()),
        other => panic!("expected room-joined, got {:?}", other),
    }
    assert_eq!(router.connections(), 1);
}

#[tokio::test]
async fn stale_link_close_keeps_the_live_registration() {
    init_tracing();
    let router = create_router();

    let stale = TestPeer::connect("A");
    stale.join(&router, "r1", "ada");
    let mut fresh = TestPeer::connect("A");
    fresh.join(&router, "r1", "ada");
    let mut b = TestPeer::connect("B");
    b.join(&router, "r1", "bob");
    fresh.drain();
    b.drain();

    // The first connection finally times out and closes.
    router.disconnect_link(&"A".into(), &stale.link);

    assert!(b.try_recv().is_none(), "live registration must not depart");
    assert_eq!(router.connections(), 2);

    // Relay to A lands on the fresh link.
    router.handle_message(
        &b.link,
        SignalMessage::Offer {
            target_peer_id: Some("A".into()),
            offer: json!({}),
            sender_peer_id: "B".into(),
        },
    );
    assert!(matches!(
        fresh.recv().await.unwrap(),
        SignalMessage::Offer { .. }
    ));

    // The fresh link closing is a real departure.
    router.disconnect_link(&"A".into(), &fresh.link);
    assert_eq!(
        b.recv().await.unwrap(),
        SignalMessage::PeerLeft { peer_id: "A".into() }
    );
}

#[tokio::test]
async fn joins_from_different_links_commute() {
    init_tracing();
    let router = create_router();

    // Whichever order the coordinator processes the two joins, the
    // later joiner sees the earlier one and membership agrees.
    let mut a = TestPeer::connect("A");
    let mut b = TestPeer::connect("B");
    b.join(&router, "r1", "bob");
    a.join(&router, "r1", "ada");

    match a.recv().await.unwrap() {
        SignalMessage::RoomJoined { peers, .. } => {
            assert_eq!(peers.len(), 1);
            assert_eq!(peers[0].peer_id, "B".into());
        }
        other => panic!("expected room-joined, got {:?}", other),
    }
    b.drain();
    assert_eq!(router.registry().members_of(&"r1".into(), &"Z".into()).len(), 2);
}
