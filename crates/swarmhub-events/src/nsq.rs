//! Minimal NSQ TCP producer.
//!
//! Speaks the `V2` protocol subset needed to publish: the magic preamble,
//! `PUB <topic>\n<size><body>`, and the framed `OK` / error responses
//! (answering `_heartbeat_` with `NOP`). Each publish exchange is bounded by
//! the I/O timeout. The connection is opened lazily again after any failure;
//! the failed event itself is not retried.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{EventBusError, EventBusResult};
use crate::publisher::BusSink;

const MAGIC_V2: &[u8; 4] = b"  V2";
const FRAME_TYPE_RESPONSE: u32 = 0;
const FRAME_TYPE_ERROR: u32 = 1;
const HEARTBEAT: &[u8] = b"_heartbeat_";
const MAX_FRAME_BYTES: u32 = 1024 * 1024;
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Producer connection to a single `nsqd`.
pub struct NsqProducer {
    address: String,
    connect_timeout: Duration,
    io_timeout: Duration,
    stream: Option<TcpStream>,
}

impl NsqProducer {
    /// Open a producer connection to `address` (`host:port` of nsqd's TCP listener).
    ///
    /// # Errors
    ///
    /// Returns an error when the TCP connection or preamble fails, or does not
    /// complete within `connect_timeout`.
    pub async fn connect(address: &str, connect_timeout: Duration) -> EventBusResult<Self> {
        let stream = open(address, connect_timeout).await?;
        Ok(Self {
            address: address.to_string(),
            connect_timeout,
            io_timeout: DEFAULT_IO_TIMEOUT,
            stream: Some(stream),
        })
    }

    /// Bound on one publish exchange (write plus response).
    #[must_use]
    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    async fn publish_once(&mut self, topic: &str, body: &[u8]) -> EventBusResult<()> {
        if self.stream.is_none() {
            let stream = open(&self.address, self.connect_timeout).await?;
            info!(address = %self.address, "event bus producer reconnected");
            self.stream = Some(stream);
        }
        let io_timeout = self.io_timeout;
        let Some(stream) = self.stream.as_mut() else {
            return Err(EventBusError::Protocol {
                reason: "connection_missing",
            });
        };

        let size = u32::try_from(body.len()).map_err(|_| EventBusError::Protocol {
            reason: "body_too_large",
        })?;
        let mut frame = Vec::with_capacity(topic.len() + body.len() + 9);
        frame.extend_from_slice(b"PUB ");
        frame.extend_from_slice(topic.as_bytes());
        frame.push(b'\n');
        frame.extend_from_slice(&size.to_be_bytes());
        frame.extend_from_slice(body);
        timeout(io_timeout, exchange(stream, topic, &frame))
            .await
            .map_err(|_| EventBusError::Timeout {
                operation: "nsq.publish",
            })?
    }
}

async fn exchange(stream: &mut TcpStream, topic: &str, frame: &[u8]) -> EventBusResult<()> {
    stream
        .write_all(frame)
        .await
        .map_err(|source| EventBusError::Io {
            operation: "nsq.publish.write",
            source,
        })?;

    loop {
        let (frame_type, data) = read_frame(stream).await?;
        match frame_type {
            FRAME_TYPE_RESPONSE if data == HEARTBEAT => {
                debug!("event bus heartbeat");
                stream
                    .write_all(b"NOP\n")
                    .await
                    .map_err(|source| EventBusError::Io {
                        operation: "nsq.heartbeat.write",
                        source,
                    })?;
            }
            FRAME_TYPE_RESPONSE if data == b"OK" => return Ok(()),
            FRAME_TYPE_ERROR => {
                return Err(EventBusError::Rejected {
                    topic: topic.to_string(),
                    reason: String::from_utf8_lossy(&data).into_owned(),
                });
            }
            _ => {
                return Err(EventBusError::Protocol {
                    reason: "unexpected_frame",
                });
            }
        }
    }
}

#[async_trait]
impl BusSink for NsqProducer {
    async fn publish(&mut self, topic: &str, body: &[u8]) -> EventBusResult<()> {
        let result = self.publish_once(topic, body).await;
        if matches!(
            result,
            Err(EventBusError::Io { .. }
                | EventBusError::Protocol { .. }
                | EventBusError::Connect { .. }
                | EventBusError::ConnectTimeout { .. }
                | EventBusError::Timeout { .. })
        ) {
            self.stream = None;
        }
        result
    }
}

async fn open(address: &str, connect_timeout: Duration) -> EventBusResult<TcpStream> {
    let mut stream = timeout(connect_timeout, TcpStream::connect(address))
        .await
        .map_err(|_| EventBusError::ConnectTimeout {
            address: address.to_string(),
        })?
        .map_err(|source| EventBusError::Connect {
            address: address.to_string(),
            source,
        })?;
    stream
        .write_all(MAGIC_V2)
        .await
        .map_err(|source| EventBusError::Connect {
            address: address.to_string(),
            source,
        })?;
    Ok(stream)
}

async fn read_frame(stream: &mut TcpStream) -> EventBusResult<(u32, Vec<u8>)> {
    let size = stream.read_u32().await.map_err(|source| EventBusError::Io {
        operation: "nsq.frame.size",
        source,
    })?;
    if !(4..=MAX_FRAME_BYTES).contains(&size) {
        return Err(EventBusError::Protocol {
            reason: "frame_size_out_of_range",
        });
    }
    let frame_type = stream.read_u32().await.map_err(|source| EventBusError::Io {
        operation: "nsq.frame.type",
        source,
    })?;
    let mut data = vec![0_u8; (size - 4) as usize];
    stream
        .read_exact(&mut data)
        .await
        .map_err(|source| EventBusError::Io {
            operation: "nsq.frame.data",
            source,
        })?;
    Ok((frame_type, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn write_frame(stream: &mut TcpStream, frame_type: u32, data: &[u8]) {
        let size = u32::try_from(data.len() + 4).unwrap_or(u32::MAX);
        let mut out = Vec::new();
        out.extend_from_slice(&size.to_be_bytes());
        out.extend_from_slice(&frame_type.to_be_bytes());
        out.extend_from_slice(data);
        stream.write_all(&out).await.expect("write frame");
    }

    async fn read_pub(stream: &mut TcpStream) -> (String, Vec<u8>) {
        let mut line = Vec::new();
        loop {
            let byte = stream.read_u8().await.expect("read command");
            if byte == b'\n' {
                break;
            }
            line.push(byte);
        }
        let size = stream.read_u32().await.expect("read size");
        let mut body = vec![0_u8; size as usize];
        stream.read_exact(&mut body).await.expect("read body");
        (String::from_utf8(line).expect("utf8 command"), body)
    }

    #[tokio::test]
    async fn publishes_and_handles_heartbeat_and_errors() -> EventBusResult<()> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|source| EventBusError::Io {
                operation: "bind",
                source,
            })?;
        let addr = listener
            .local_addr()
            .map_err(|source| EventBusError::Io {
                operation: "local_addr",
                source,
            })?
            .to_string();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut magic = [0_u8; 4];
            socket.read_exact(&mut magic).await.expect("magic");
            assert_eq!(&magic, MAGIC_V2);

            let (command, body) = read_pub(&mut socket).await;
            assert_eq!(command, "PUB torrent");
            assert_eq!(body, br#"{"hash":"h1","eventType":"added"}"#);
            write_frame(&mut socket, FRAME_TYPE_RESPONSE, HEARTBEAT).await;
            let mut nop = [0_u8; 4];
            socket.read_exact(&mut nop).await.expect("nop");
            assert_eq!(&nop, b"NOP\n");
            write_frame(&mut socket, FRAME_TYPE_RESPONSE, b"OK").await;

            let (_, _) = read_pub(&mut socket).await;
            write_frame(&mut socket, FRAME_TYPE_ERROR, b"E_BAD_TOPIC").await;
        });

        let mut producer = NsqProducer::connect(&addr, Duration::from_secs(2)).await?;
        producer
            .publish("torrent", br#"{"hash":"h1","eventType":"added"}"#)
            .await?;
        let rejected = producer.publish("torrent", b"{}").await;
        assert!(matches!(
            rejected,
            Err(EventBusError::Rejected { ref reason, .. }) if reason == "E_BAD_TOPIC"
        ));
        server.await.expect("server task");
        Ok(())
    }

    #[tokio::test]
    async fn silent_broker_times_out_and_reconnects() -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?.to_string();
        let (accepted_tx, mut accepted_rx) = tokio::sync::mpsc::unbounded_channel();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                let _ = accepted_tx.send(());
                held.push(socket);
            }
        });

        let mut producer = NsqProducer::connect(&addr, Duration::from_secs(2))
            .await?
            .with_io_timeout(Duration::from_millis(200));
        let first = timeout(Duration::from_secs(3), producer.publish("torrent", b"{}")).await?;
        assert!(matches!(
            first,
            Err(EventBusError::Timeout {
                operation: "nsq.publish"
            })
        ));
        assert!(producer.stream.is_none());

        let second = timeout(Duration::from_secs(3), producer.publish("torrent", b"{}")).await?;
        assert!(matches!(second, Err(EventBusError::Timeout { .. })));
        timeout(Duration::from_secs(1), accepted_rx.recv()).await?;
        timeout(Duration::from_secs(1), accepted_rx.recv())
            .await?
            .ok_or("producer never reconnected")?;
        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn connect_failure_reports_address() {
        let result = NsqProducer::connect("127.0.0.1:1", Duration::from_millis(500)).await;
        assert!(matches!(
            result,
            Err(EventBusError::Connect { .. } | EventBusError::ConnectTimeout { .. })
        ));
    }
}
