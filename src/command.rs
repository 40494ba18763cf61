//! Commands from outside callers
//!
//! A command names a connector and carries a raw request payload. Each one is
//! run through the interceptor on its own task, so a slow device never holds
//! up the commands behind it, and the reply goes to a [`ResponseSink`] tagged
//! with the same connector.
//!
//! [`CommandServer`] takes commands over newline-delimited JSON:
//! ```text
//! caller -> gateway: {"connector":"ble","payload":{"method":"ble-read",...}}
//! gateway -> caller: {"connector":"ble","response":{"id":"...","result":...}}
//! ```
//! A string `payload` is sent as its raw text, which lets callers pass
//! templates that are not valid JSON until they are filled in.

use crate::interceptor::Interceptor;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// A request for one connector
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub connector: String,
    pub payload: Bytes,
}

/// Runs a command payload against a connector
#[async_trait]
pub trait CallHandler: Send + Sync {
    async fn call(&self, connector: &str, payload: &[u8]) -> Bytes;
}

#[async_trait]
impl CallHandler for Interceptor {
    async fn call(&self, connector: &str, payload: &[u8]) -> Bytes {
        Interceptor::call(self, connector, payload).await
    }
}

/// Destination of command replies
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn send(&self, connector: &str, response: Bytes) -> Result<()>;
}

/// Run every queued command and hand its reply to `sink`
///
/// Returns once the queue is closed. Commands still in flight finish on
/// their own tasks.
pub async fn command_listener(
    handler: Arc<dyn CallHandler>,
    mut rx: mpsc::Receiver<Command>,
    sink: Arc<dyn ResponseSink>,
) {
    while let Some(command) = rx.recv().await {
        let handler = handler.clone();
        let sink = sink.clone();

        tokio::spawn(async move {
            let response = handler.call(&command.connector, &command.payload).await;
            if let Err(e) = sink.send(&command.connector, response.clone()).await {
                error!(
                    "Send response {} for {} failed: {:#}",
                    String::from_utf8_lossy(&response),
                    command.connector,
                    e
                );
            }
        });
    }
    info!("Command queue closed, command listener stopped");
}

#[derive(Deserialize)]
struct WireCommand {
    connector: String,
    payload: Value,
}

impl From<WireCommand> for Command {
    fn from(wire: WireCommand) -> Self {
        let payload = match wire.payload {
            Value::String(text) => text.into_bytes(),
            other => other.to_string().into_bytes(),
        };
        Command {
            connector: wire.connector,
            payload: Bytes::from(payload),
        }
    }
}

/// Reply line for one command
fn response_line(connector: &str, response: &[u8]) -> Bytes {
    let response = serde_json::from_slice::<Value>(response)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(response).into_owned()));
    Bytes::from(json!({"connector": connector, "response": response}).to_string())
}

/// Queues reply lines for the connection a command came in on
struct LineSink {
    tx: mpsc::Sender<Bytes>,
}

#[async_trait]
impl ResponseSink for LineSink {
    async fn send(&self, connector: &str, response: Bytes) -> Result<()> {
        self.tx.send(response_line(connector, &response)).await?;
        Ok(())
    }
}

/// Accepts command callers and answers each command on its connection
pub struct CommandServer {
    handler: Arc<dyn CallHandler>,
    queue_capacity: usize,
}

impl CommandServer {
    pub fn new(handler: Arc<dyn CallHandler>, queue_capacity: usize) -> Self {
        Self {
            handler,
            queue_capacity,
        }
    }

    /// Accept callers until the listener fails
    pub async fn run(self, listener: TcpListener) -> Result<()> {
        info!("Command server listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = listener.accept().await?;
            let handler = self.handler.clone();
            let capacity = self.queue_capacity;

            tokio::spawn(async move {
                if let Err(e) = handle_caller(stream, addr, handler, capacity).await {
                    warn!("Command caller {} closed: {}", addr, e);
                }
            });
        }
    }
}

async fn handle_caller(
    stream: TcpStream,
    addr: SocketAddr,
    handler: Arc<dyn CallHandler>,
    capacity: usize,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let (command_tx, command_rx) = mpsc::channel(capacity);
    let (reply_tx, mut reply_rx) = mpsc::channel::<Bytes>(capacity);
    tokio::spawn(command_listener(
        handler,
        command_rx,
        Arc::new(LineSink { tx: reply_tx }),
    ));
    debug!("Command caller {} connected", addr);

    // Cleared at end of input; replies still owed are written before closing
    let mut commands = Some(command_tx);
    loop {
        tokio::select! {
            reply = reply_rx.recv() => {
                let Some(reply) = reply else {
                    return Ok(());
                };
                writer.write_all(&reply).await?;
                writer.write_all(b"\n").await?;
            }

            line = lines.next_line(), if commands.is_some() => {
                match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match serde_json::from_str::<WireCommand>(&line) {
                        Ok(wire) => {
                            if let Some(tx) = &commands {
                                tx.send(Command::from(wire)).await?;
                            }
                        }
                        Err(e) => {
                            warn!("Bad command from {}: {}", addr, e);
                            let line = json!({"error": e.to_string()}).to_string();
                            writer.write_all(line.as_bytes()).await?;
                            writer.write_all(b"\n").await?;
                        }
                    },
                    None => commands = None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Echoes the connector and payload, or stalls for `stall`
    struct EchoHandler {
        stall: &'static str,
    }

    #[async_trait]
    impl CallHandler for EchoHandler {
        async fn call(&self, connector: &str, payload: &[u8]) -> Bytes {
            if connector == self.stall {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            let body = json!({"to": connector, "got": String::from_utf8_lossy(payload)});
            Bytes::from(body.to_string())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<(String, Bytes)>>,
        fail_for: Option<&'static str>,
    }

    #[async_trait]
    impl ResponseSink for RecordingSink {
        async fn send(&self, connector: &str, response: Bytes) -> Result<()> {
            if self.fail_for == Some(connector) {
                anyhow::bail!("broker rejected response");
            }
            self.seen.lock().push((connector.to_string(), response));
            Ok(())
        }
    }

    fn command(connector: &str, payload: &'static str) -> Command {
        Command {
            connector: connector.into(),
            payload: Bytes::from_static(payload.as_bytes()),
        }
    }

    async fn wait_for(sink: &RecordingSink, count: usize) {
        for _ in 0..100 {
            if sink.seen.lock().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn test_wire_payloads() {
        let wire: WireCommand =
            serde_json::from_str(r#"{"connector":"ble","payload":{"method":"ping"}}"#).unwrap();
        assert_eq!(Command::from(wire), command("ble", r#"{"method":"ping"}"#));

        let wire: WireCommand =
            serde_json::from_str(r#"{"connector":"ble","payload":"{\"unit\":{{object.config.unit}}}"}"#)
                .unwrap();
        assert_eq!(Command::from(wire), command("ble", "{\"unit\":{{object.config.unit}}}"));
    }

    #[test]
    fn test_response_line() {
        let line = response_line("ble", br#"{"id":"1","result":2}"#);
        assert_eq!(
            serde_json::from_slice::<Value>(&line).unwrap(),
            json!({"connector": "ble", "response": {"id": "1", "result": 2}})
        );

        let line = response_line("ble", b"<<garbage>>");
        assert_eq!(
            serde_json::from_slice::<Value>(&line).unwrap(),
            json!({"connector": "ble", "response": "<<garbage>>"})
        );
    }

    #[tokio::test]
    async fn test_slow_command_does_not_block_others() {
        let (tx, rx) = mpsc::channel(4);
        let sink = Arc::new(RecordingSink::default());
        tokio::spawn(command_listener(
            Arc::new(EchoHandler { stall: "slow" }),
            rx,
            sink.clone(),
        ));

        tx.send(command("slow", "a")).await.unwrap();
        tx.send(command("ble", "b")).await.unwrap();
        wait_for(&sink, 1).await;
        assert_eq!(sink.seen.lock()[0].0, "ble");

        wait_for(&sink, 2).await;
        assert_eq!(sink.seen.lock()[1].0, "slow");
    }

    #[tokio::test]
    async fn test_listener_continues_after_sink_error() {
        let (tx, rx) = mpsc::channel(4);
        let sink = Arc::new(RecordingSink {
            fail_for: Some("ble"),
            ..Default::default()
        });
        tokio::spawn(command_listener(
            Arc::new(EchoHandler { stall: "" }),
            rx,
            sink.clone(),
        ));

        tx.send(command("ble", "a")).await.unwrap();
        tx.send(command("modbus", "b")).await.unwrap();
        wait_for(&sink, 1).await;

        let seen = sink.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "modbus");
        assert_eq!(
            serde_json::from_slice::<Value>(&seen[0].1).unwrap(),
            json!({"to": "modbus", "got": "b"})
        );
    }

    #[tokio::test]
    async fn test_commands_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler = Arc::new(EchoHandler { stall: "" });
        tokio::spawn(CommandServer::new(handler, 8).run(listener));

        let client = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = client.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer
            .write_all(b"not json\n{\"connector\":\"ble\",\"payload\":{\"id\":\"1\"}}\n")
            .await
            .unwrap();
        // End of input still gets the replies owed
        writer.shutdown().await.unwrap();

        let mut replies = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            replies.push(serde_json::from_str::<Value>(&line).unwrap());
        }
        assert_eq!(replies.len(), 2);
        assert!(replies[0]["error"].is_string());
        assert_eq!(
            replies[1],
            json!({"connector": "ble", "response": {"to": "ble", "got": "{\"id\":\"1\"}"}})
        );
    }
}
