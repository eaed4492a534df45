use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::{mpsc, oneshot},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::daemon::{
    collection::collector::{CollectorHandle, DataCollectionModule},
    processing::TrackerEvent,
};

use super::protocol::{parse_request, Command, Reply, MAX_REQUEST_LINE};

/// A bound server with its collector running. Serves connections until `quit` is requested or
/// the shutdown token is cancelled.
pub struct RpcServer {
    listener: TcpListener,
    events: mpsc::Sender<TrackerEvent>,
    collector: CollectorHandle,
    shutdown: CancellationToken,
}

impl RpcServer {
    pub async fn bind(
        addr: SocketAddr,
        events: mpsc::Sender<TrackerEvent>,
        collector: DataCollectionModule,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to listen on {addr}"))?;
        info!("Listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            events,
            collector: collector.spawn(),
            shutdown,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Accepted connection from {peer}");
                        let connection = Connection {
                            events: self.events.clone(),
                            collector: self.collector.clone(),
                            shutdown: self.shutdown.clone(),
                        };
                        tokio::spawn(async move {
                            if let Err(e) = connection.handle(stream).await {
                                warn!("Connection with {peer} failed: {e:?}");
                            }
                        });
                    }
                    Err(e) => warn!("Failed to accept a connection: {e}"),
                }
            }
        }

        self.collector.stop().await;
        info!("Server stopped");
        Ok(())
    }
}

struct Connection {
    events: mpsc::Sender<TrackerEvent>,
    collector: CollectorHandle,
    shutdown: CancellationToken,
}

impl Connection {
    async fn handle(self, mut stream: TcpStream) -> Result<()> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            // The newline counts towards the limit.
            let mut limited = (&mut reader).take(MAX_REQUEST_LINE as u64 + 1);
            let read = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                read = limited.read_line(&mut line) => read?,
            };
            if read == 0 {
                break;
            }
            let oversized = line.len() > MAX_REQUEST_LINE && !line.ends_with('\n');
            if !oversized && line.trim().is_empty() {
                continue;
            }

            let (reply, close) = if oversized {
                warn!("Closing a connection that sent a request over {MAX_REQUEST_LINE} bytes");
                let what = format!("Request is longer than {MAX_REQUEST_LINE} bytes");
                (Reply::malformed(what), true)
            } else {
                match parse_request(line.trim()) {
                    Ok(command) => {
                        let quit = command == Command::Quit;
                        (self.execute(command).await, quit)
                    }
                    Err(e) => (Reply::from(e), false),
                }
            };

            let mut bytes = serde_json::to_vec(&reply)?;
            bytes.push(b'\n');
            writer.write_all(&bytes).await?;
            writer.flush().await?;

            if close {
                break;
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn execute(&self, command: Command) -> Reply {
        if command == Command::Quit {
            info!("Quit requested");
            // Samples taken before this point are queued ahead of the quit request.
            self.collector.stop().await;
        }

        let (reply, response) = oneshot::channel();
        if self
            .events
            .send(TrackerEvent::Request { command, reply })
            .await
            .is_err()
        {
            return Reply::error("Tracker is not running");
        }
        response
            .await
            .unwrap_or_else(|_| Reply::error("Tracker stopped before replying"))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::{Ipv4Addr, SocketAddr},
        time::Duration,
    };

    use anyhow::Result;
    use serde_json::{json, Value};
    use tempfile::tempdir;
    use tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::TcpStream,
    };

    use super::MAX_REQUEST_LINE;
    use crate::{
        daemon::{tracker::TrackerConfig, Daemon},
        utils::clock::DefaultClock,
        window_api::{MockWindowManager, ProbeError},
    };

    async fn daemon(dir: &std::path::Path) -> Result<Daemon> {
        let mut manager = MockWindowManager::new();
        manager
            .expect_get_active_window_data()
            .returning(|| Err(ProbeError::Unavailable("no focus".into())));
        manager.expect_get_idle_time().returning(|| Ok(0));
        Daemon::create(
            &TrackerConfig::new(dir.to_owned()),
            SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            manager,
            DefaultClock,
            Duration::from_millis(20),
        )
        .await
    }

    async fn exchange(
        reader: &mut BufReader<tokio::net::tcp::ReadHalf<'_>>,
        writer: &mut tokio::net::tcp::WriteHalf<'_>,
        request: &str,
    ) -> Result<Value> {
        writer.write_all(format!("{request}\n").as_bytes()).await?;
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        Ok(serde_json::from_str(&line)?)
    }

    #[tokio::test]
    async fn test_bad_requests_dont_stop_the_server() -> Result<()> {
        let dir = tempdir()?;
        let daemon = daemon(dir.path()).await?;
        let addr = daemon.local_addr()?;
        let running = tokio::spawn(daemon.run());

        let mut stream = TcpStream::connect(addr).await?;
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);

        let reply = exchange(&mut reader, &mut writer, r#"{"cmd":"bogus"}"#).await?;
        let expected = json!({
            "type": "error",
            "error_type": "request_malformed",
            "what": "Command 'bogus' not known",
        });
        assert_eq!(reply, expected);

        let reply = exchange(&mut reader, &mut writer, "{not json").await?;
        assert_eq!(reply["error_type"], "request_malformed");

        let clip = r#"{"cmd":"clip_from","data":{"index":3}}"#;
        let reply = exchange(&mut reader, &mut writer, clip).await?;
        assert_eq!(reply["type"], "error");
        assert!(reply.get("error_type").is_none());

        let reply = exchange(&mut reader, &mut writer, r#"{"cmd":"version"}"#).await?;
        assert_eq!(reply["type"], "ok");
        assert_eq!(reply["data"]["version"], env!("CARGO_PKG_VERSION"));

        let reply = exchange(&mut reader, &mut writer, r#"{"cmd":"quit"}"#).await?;
        assert_eq!(reply, json!({"type": "ok", "data": {}}));
        running.await??;

        assert!(TcpStream::connect(addr).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_long_request_is_refused() -> Result<()> {
        let dir = tempdir()?;
        let daemon = daemon(dir.path()).await?;
        let addr = daemon.local_addr()?;
        let running = tokio::spawn(daemon.run());

        let mut stream = TcpStream::connect(addr).await?;
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let request = vec![b'a'; MAX_REQUEST_LINE + 1];
        writer.write_all(&request).await?;

        let mut line = String::new();
        reader.read_line(&mut line).await?;
        let reply: Value = serde_json::from_str(&line)?;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["error_type"], "request_malformed");

        line.clear();
        assert_eq!(reader.read_line(&mut line).await?, 0);

        // The server keeps serving other connections.
        let mut stream = TcpStream::connect(addr).await?;
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let reply = exchange(&mut reader, &mut writer, r#"{"cmd":"quit"}"#).await?;
        assert_eq!(reply["type"], "ok");
        running.await??;
        Ok(())
    }

    #[tokio::test]
    async fn test_quit_closes_other_connections() -> Result<()> {
        let dir = tempdir()?;
        let daemon = daemon(dir.path()).await?;
        let addr = daemon.local_addr()?;
        let running = tokio::spawn(daemon.run());

        let mut idle = TcpStream::connect(addr).await?;
        let mut stream = TcpStream::connect(addr).await?;
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        exchange(&mut reader, &mut writer, r#"{"cmd":"quit"}"#).await?;
        running.await??;

        let mut line = String::new();
        let read = BufReader::new(&mut idle).read_line(&mut line).await?;
        assert_eq!(read, 0);
        Ok(())
    }
}
