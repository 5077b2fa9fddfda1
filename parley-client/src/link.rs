use crate::error::ClientError;
use futures::{SinkExt, StreamExt};
use parley_core::SignalMessage;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

pub type SignalSender = mpsc::UnboundedSender<SignalMessage>;
pub type SignalReceiver = mpsc::UnboundedReceiver<SignalMessage>;

/// Open the persistent signaling connection to the coordinator and
/// expose it as a pair of typed channels. The writer and reader tasks
/// own the socket halves; dropping both channel ends tears them down.
///
/// A returned pair means the link is open, which is the readiness
/// signal the session couples with local media acquisition before
/// joining.
pub async fn connect(url: &str) -> Result<(SignalSender, SignalReceiver), ClientError> {
    let (socket, _) = connect_async(url).await?;
    let (mut sink, mut stream) = socket.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<SignalMessage>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<SignalMessage>();

    tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    warn!("failed to serialize outbound signal: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        while let Some(Ok(frame)) = stream.next().await {
            match frame {
                Message::Text(text) => match serde_json::from_str::<SignalMessage>(&text) {
                    Ok(signal) => {
                        if in_tx.send(signal).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("malformed signal from coordinator dropped: {}", e),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
        debug!("signaling link reader finished");
    });

    Ok((out_tx, in_rx))
}
