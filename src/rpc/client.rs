use std::{net::SocketAddr, time::Duration};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
};
use tracing::{error, info, warn};

use crate::{
    daemon::tracker::CurrentState,
    timeline::{
        category::{Category, Rule},
        entities::TimelineEntity,
        UsageTimeline,
    },
};

use super::protocol::{Command, Reply, RpcError, VERSION};

/// Wait for ordinary replies before the first warning.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(50);
/// Wait after a warning was logged.
pub const RETRY_TIMEOUT: Duration = Duration::from_secs(2);
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

struct Link {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    /// Part of a reply line read before a timeout. Kept so the next read continues it.
    buffer: Vec<u8>,
}

fn take_field<T: DeserializeOwned>(mut data: Value, key: &str) -> Result<T, RpcError> {
    let value = data.get_mut(key).map(Value::take).unwrap_or(Value::Null);
    serde_json::from_value(value)
        .map_err(|e| RpcError::InvalidReply(format!("bad \"{key}\": {e}")))
}

/// Client side of the tracking server. Requests and replies strictly alternate, and the last
/// fetched state is cached for display.
#[derive(Default)]
pub struct RpcClient {
    link: Option<Link>,
    awaiting_reply: bool,
    timeline: UsageTimeline,
    current: CurrentState,
    rules: Vec<Rule>,
}

impl RpcClient {
    /// A client that isn't connected yet. Every request fails with [RpcError::NotConnected].
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects, checks the server version and fetches the rules.
    pub async fn connect(addr: SocketAddr) -> Result<Self, RpcError> {
        let mut client = Self::new();
        client.attach(TcpStream::connect(addr).await?);
        if let Err(e) = client.handshake().await {
            client.link = None;
            return Err(e);
        }
        Ok(client)
    }

    fn attach(&mut self, stream: TcpStream) {
        let (reader, writer) = stream.into_split();
        self.link = Some(Link {
            reader: BufReader::new(reader),
            writer,
            buffer: Vec::new(),
        });
        self.awaiting_reply = false;
    }

    async fn handshake(&mut self) -> Result<(), RpcError> {
        self.send(&Command::Version).await?;
        let data = self.receive(HANDSHAKE_TIMEOUT, true).await?;
        let version: String = take_field(data, "version")?;
        if version == VERSION {
            info!("Server version: {version}");
        } else {
            error!("Server version {version} differs from client version {VERSION}");
        }
        self.fetch_rules().await?;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    fn disconnect(&mut self) {
        self.link = None;
        self.awaiting_reply = false;
    }

    pub async fn send(&mut self, command: &Command) -> Result<(), RpcError> {
        let link = self.link.as_mut().ok_or(RpcError::NotConnected)?;
        if self.awaiting_reply {
            return Err(RpcError::ProtocolViolation(
                "a request was sent before the previous reply was received",
            ));
        }
        let mut bytes = serde_json::to_vec(&command.to_request())?;
        bytes.push(b'\n');
        link.writer.write_all(&bytes).await?;
        self.awaiting_reply = true;
        Ok(())
    }

    /// Waits for the reply of the last request. When `timeout` passes either fails with
    /// [RpcError::Timeout] or keeps waiting in steps of [RETRY_TIMEOUT], warning each time.
    pub async fn receive(
        &mut self,
        timeout: Duration,
        raise_on_timeout: bool,
    ) -> Result<Value, RpcError> {
        let link = self.link.as_mut().ok_or(RpcError::NotConnected)?;
        if !self.awaiting_reply {
            return Err(RpcError::ProtocolViolation(
                "a reply was requested without a pending request",
            ));
        }

        let mut bound = timeout;
        loop {
            let read = link.reader.read_until(b'\n', &mut link.buffer);
            match tokio::time::timeout(bound, read).await {
                Ok(Ok(0)) => {
                    self.disconnect();
                    return Err(RpcError::Disconnected);
                }
                Ok(Ok(_)) => break,
                Ok(Err(e)) => {
                    warn!("Lost the server connection: {e}");
                    self.disconnect();
                    return Err(e.into());
                }
                Err(_) if raise_on_timeout => return Err(RpcError::Timeout(bound)),
                Err(_) => {
                    warn!("server timeout. did you even start one?");
                    bound = RETRY_TIMEOUT;
                }
            }
        }

        self.awaiting_reply = false;
        let line = std::mem::take(&mut link.buffer);
        let reply: Reply = serde_json::from_slice(&line)?;
        reply.into_data()
    }

    pub async fn request(&mut self, command: Command) -> Result<Value, RpcError> {
        self.send(&command).await?;
        self.receive(DEFAULT_TIMEOUT, false).await
    }

    pub async fn version(&mut self) -> Result<String, RpcError> {
        take_field(self.request(Command::Version).await?, "version")
    }

    pub async fn apps(&mut self) -> Result<UsageTimeline, RpcError> {
        let entity: TimelineEntity = take_field(self.request(Command::Apps).await?, "apps")?;
        UsageTimeline::import(entity).map_err(|e| RpcError::InvalidReply(e.to_string()))
    }

    pub async fn current(&mut self) -> Result<CurrentState, RpcError> {
        take_field(self.request(Command::Current).await?, "current")
    }

    /// Fetches the rules of the server and caches them.
    pub async fn fetch_rules(&mut self) -> Result<&[Rule], RpcError> {
        self.rules = take_field(self.request(Command::Rules).await?, "rules")?;
        Ok(&self.rules)
    }

    pub async fn set_rules(&mut self, rules: Vec<Rule>) -> Result<(), RpcError> {
        self.request(Command::SetRules(rules.clone())).await?;
        self.timeline.recategorize(&rules);
        self.rules = rules;
        Ok(())
    }

    pub async fn note(&mut self) -> Result<Option<String>, RpcError> {
        take_field(self.request(Command::Note).await?, "note")
    }

    pub async fn set_note(&mut self, note: impl Into<String>) -> Result<(), RpcError> {
        self.request(Command::SetNote(note.into())).await?;
        Ok(())
    }

    pub async fn clip_from(&mut self, index: u32) -> Result<(), RpcError> {
        self.request(Command::ClipFrom(index)).await?;
        Ok(())
    }

    pub async fn clip_to(&mut self, index: u32) -> Result<(), RpcError> {
        self.request(Command::ClipTo(index)).await?;
        Ok(())
    }

    pub async fn save(&mut self) -> Result<(), RpcError> {
        self.request(Command::Save).await?;
        Ok(())
    }

    /// Stops the server. The client is disconnected afterwards even if the server reported an
    /// error.
    pub async fn quit_server(&mut self) -> Result<(), RpcError> {
        let result = self.request(Command::Quit).await;
        self.disconnect();
        match result {
            Ok(_) | Err(RpcError::Server(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Fetches the live state and today's timeline into the cache.
    pub async fn refresh(&mut self) -> Result<(), RpcError> {
        self.current = self.current().await?;
        self.timeline = self.apps().await?;
        Ok(())
    }

    pub fn timeline(&self) -> &UsageTimeline {
        &self.timeline
    }

    pub fn current_state(&self) -> &CurrentState {
        &self.current
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Minutes from the first to the last recorded minute.
    pub fn time_total(&self) -> u32 {
        match (self.timeline.begin_index(), self.timeline.end_index()) {
            (Some(begin), Some(end)) => end - begin + 1,
            _ => 0,
        }
    }

    pub fn time_active(&self) -> u32 {
        self.timeline.active_minutes() as u32
    }

    pub fn time_idle(&self) -> u32 {
        self.time_total().saturating_sub(self.time_active())
    }

    pub fn time_in_category(&self, category: Category) -> u32 {
        self.timeline.minutes_in_category(category) as u32
    }
}
