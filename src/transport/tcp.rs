//! TCP listener for device connectors
//!
//! Connectors (BLE, Modbus, ...) run as separate processes and speak
//! newline-delimited JSON:
//! ```text
//! connector -> gateway: {"connector":"ble"}          (once, on connect)
//! gateway -> connector: <request envelope>\n
//! connector -> gateway: <response or notification>\n
//! ```

use super::hub::ConnectorHub;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Time a new connection has to introduce itself
const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct Hello {
    connector: String,
}

/// Accepts connector connections and attaches them to the hub
pub struct ConnectorServer {
    hub: Arc<ConnectorHub>,
    queue_capacity: usize,
}

impl ConnectorServer {
    pub fn new(hub: Arc<ConnectorHub>, queue_capacity: usize) -> Self {
        Self {
            hub,
            queue_capacity,
        }
    }

    /// Accept connectors until the listener fails
    pub async fn run(self, listener: TcpListener) -> Result<()> {
        info!("Connector server listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = listener.accept().await?;
            let hub = self.hub.clone();
            let capacity = self.queue_capacity;

            tokio::spawn(async move {
                if let Err(e) = handle_connector(stream, addr, hub, capacity).await {
                    warn!("Connector {} closed: {}", addr, e);
                }
            });
        }
    }
}

async fn handle_connector(
    stream: TcpStream,
    addr: SocketAddr,
    hub: Arc<ConnectorHub>,
    capacity: usize,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let hello = timeout(HELLO_TIMEOUT, lines.next_line())
        .await
        .map_err(|_| anyhow!("no hello within {:?}", HELLO_TIMEOUT))??
        .ok_or_else(|| anyhow!("closed before hello"))?;
    let hello: Hello = serde_json::from_str(&hello)?;
    let name = hello.connector;

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Bytes>(capacity);
    hub.register(&name, outbound_tx.clone());
    info!("Connector {} attached from {}", name, addr);

    let result: Result<()> = async {
        loop {
            tokio::select! {
                Some(payload) = outbound_rx.recv() => {
                    writer.write_all(&single_line(&payload)).await?;
                    writer.write_all(b"\n").await?;
                }

                line = lines.next_line() => {
                    match line? {
                        Some(line) if line.trim().is_empty() => {}
                        Some(line) => hub.deliver(Bytes::from(line)).await,
                        None => return Ok(()),
                    }
                }
            }
        }
    }
    .await;

    hub.unregister(&name, &outbound_tx);
    if let Err(e) = &result {
        error!("Connector {} link error: {}", name, e);
    }
    result
}

/// Raw line breaks in JSON are insignificant whitespace; flatten them
fn single_line(payload: &[u8]) -> Vec<u8> {
    payload
        .iter()
        .map(|&b| if b == b'\n' || b == b'\r' { b' ' } else { b })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RpcTransport;

    #[test]
    fn test_single_line() {
        assert_eq!(single_line(b"{\n  \"a\": \"x\\ny\"\r\n}"), b"{   \"a\": \"x\\ny\"  }".to_vec());
    }

    #[tokio::test]
    async fn test_connector_roundtrip_over_tcp() {
        let (notify_tx, mut notify_rx) = mpsc::channel(8);
        let hub = Arc::new(ConnectorHub::new(notify_tx));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(ConnectorServer::new(hub.clone(), 8).run(listener));

        let client = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = client.into_split();
        let mut lines = BufReader::new(reader).lines();
        writer.write_all(b"{\"connector\":\"ble\"}\n").await.unwrap();

        for _ in 0..100 {
            if !hub.connectors().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(hub.connectors(), vec!["ble".to_string()]);

        let rx = hub.call("ble", "r1", Bytes::from_static(b"{\"id\":\"r1\",\"method\":\"read\"}"));
        let request = lines.next_line().await.unwrap().unwrap();
        assert_eq!(request, "{\"id\":\"r1\",\"method\":\"read\"}");

        writer
            .write_all(b"{\"id\":\"r1\",\"result\":7}\n{\"method\":\"notify\"}\n")
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap(), Bytes::from_static(b"{\"id\":\"r1\",\"result\":7}"));
        assert_eq!(
            notify_rx.recv().await.unwrap(),
            Bytes::from_static(b"{\"method\":\"notify\"}")
        );

        drop(writer);
        drop(lines);
        for _ in 0..100 {
            if hub.connectors().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(hub.connectors().is_empty());
    }
}
