
pub use test_peer::TestPeer;
