use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

/// Something that happened on an open transport, in delivery order.
/// After `Error` or `Closed` nothing further is delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// One text frame (one serialized message)
    Frame(String),
    Error(String),
    /// Peer closed the transport, optionally with a reason
    Closed(Option<String>),
}

/// An open, ordered, full-duplex message transport.
///
/// Closing `outbound` closes the transport. Dropping `inbound` detaches the
/// owner from anything still in flight.
pub struct Transport {
    pub outbound: async_channel::Sender<String>,
    pub inbound: async_channel::Receiver<TransportEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Cannot reach {address}: {reason}")]
    Connect { address: String, reason: String },
}

/// Opens transports to remote instances.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, host: &str, port: u16) -> BoxFuture<'static, Result<Transport, TransportError>>;
}

/// WebSocket transport: one JSON message per text frame on `ws://host:port/`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&self, host: &str, port: u16) -> BoxFuture<'static, Result<Transport, TransportError>> {
        let address = format!("{}:{}", host, port);
        Box::pin(async move {
            let ws_url = format!("ws://{}/", address);
            let (ws_stream, _response) = tokio_tungstenite::connect_async(&ws_url)
                .await
                .map_err(|e| TransportError::Connect {
                    address: address.clone(),
                    reason: e.to_string(),
                })?;
            log::debug!("WebSocket open to {}", address);

            let (mut ws_write, mut ws_read) = ws_stream.split();
            let (out_tx, out_rx) = async_channel::bounded::<String>(256);
            let (in_tx, in_rx) = async_channel::bounded::<TransportEvent>(256);

            // Writer: drains outbound frames; a closed channel means close the socket
            let writer_handle = tokio::spawn(async move {
                while let Ok(text) = out_rx.recv().await {
                    if let Err(e) = ws_write.send(tungstenite::Message::Text(text.into())).await {
                        log::warn!("Failed to send WS message: {}", e);
                        return;
                    }
                }
                let _ = ws_write.close().await;
            });

            // Reader: forwards frames until error/close
            tokio::spawn(async move {
                loop {
                    let event = match ws_read.next().await {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            TransportEvent::Frame(text.to_string())
                        }
                        Some(Ok(tungstenite::Message::Binary(data))) => {
                            log::debug!("Ignoring binary frame ({} bytes)", data.len());
                            continue;
                        }
                        Some(Ok(tungstenite::Message::Close(frame))) => TransportEvent::Closed(
                            frame
                                .map(|f| f.reason.to_string())
                                .filter(|reason| !reason.is_empty()),
                        ),
                        // Ping/Pong/raw frames are answered by tungstenite itself
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => TransportEvent::Error(format!("WebSocket error: {}", e)),
                        None => TransportEvent::Closed(None),
                    };
                    let terminal = !matches!(event, TransportEvent::Frame(_));
                    if in_tx.send(event).await.is_err() || terminal {
                        break;
                    }
                }
                writer_handle.abort();
            });

            Ok(Transport {
                outbound: out_tx,
                inbound: in_rx,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ws_connector_reports_unreachable_peer() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = WsConnector.open("127.0.0.1", port).await;
        match result {
            Err(TransportError::Connect { address, .. }) => {
                assert_eq!(address, format!("127.0.0.1:{}", port));
            }
            Ok(_) => panic!("expected connection failure"),
        }
    }
}
