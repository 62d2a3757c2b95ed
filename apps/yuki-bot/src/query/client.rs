//! TCP ServerQuery connection: command/response round-trips and the reader
//! task that fans notifications out to subscribers.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time;
use yuki_common::{GroupId, SessionHandle};

use super::codec::{parse_records, parse_status, Command, Record};
use super::events::{descriptor_from_clientlist, is_regular, parse_notification};
use crate::config::Config;
use crate::error::ServiceError;
use crate::service::{ServerEvent, SessionDescriptor, SessionService};

/// How long a command may wait for its `error` line.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Idle connections are dropped by the server after 5 minutes.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(240);

/// Capacity of the notification channel. Slow receivers skip events
/// (RecvError::Lagged) and rely on the next sweep.
const EVENT_CAPACITY: usize = 1024;

/// `duplicate entry` when adding a held group, `empty result` when removing a
/// group the client does not have.
const BENIGN_GROUP_ERRORS: [u32; 2] = [2561, 2563];

/// Private text message to a single client.
const TARGET_CLIENT: u8 = 1;

type Response = Result<Vec<Record>, ServiceError>;

struct CommandChannel {
    writer: OwnedWriteHalf,
    responses: mpsc::UnboundedReceiver<Response>,
    /// Commands written whose status line has not been consumed yet. Replies
    /// arrive in command order, so all but the last of these are stale.
    in_flight: usize,
}

/// A logged-in ServerQuery session.
///
/// Commands are serialized: the server answers them strictly in order, and
/// the lock is held from writing a command until its status line arrives.
pub struct QueryClient {
    commands: Mutex<CommandChannel>,
    response_timeout: Duration,
}

impl QueryClient {
    /// Open the TCP connection and check the banner.
    ///
    /// Returns the client together with the notification stream. The stream
    /// closes when the connection is lost.
    pub async fn connect(
        host: &str,
        port: u16,
    ) -> Result<(Self, broadcast::Receiver<ServerEvent>), ServiceError> {
        let stream = TcpStream::connect((host, port)).await?;
        let (read, writer) = stream.into_split();
        let mut reader = BufReader::new(read);

        time::timeout(RESPONSE_TIMEOUT, read_banner(&mut reader))
            .await
            .map_err(|_| ServiceError::Timeout(RESPONSE_TIMEOUT))??;

        let (response_tx, responses) = mpsc::unbounded_channel();
        let (event_tx, events) = broadcast::channel(EVENT_CAPACITY);
        tokio::spawn(read_loop(reader, response_tx, event_tx));

        tracing::info!(%host, port, "serverquery connected");

        let client = Self {
            commands: Mutex::new(CommandChannel {
                writer,
                responses,
                in_flight: 0,
            }),
            response_timeout: RESPONSE_TIMEOUT,
        };
        Ok((client, events))
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Connect, log in, select the virtual server, set the nickname and
    /// subscribe to server-wide client notifications.
    pub async fn start(
        config: &Config,
    ) -> Result<(Self, broadcast::Receiver<ServerEvent>), ServiceError> {
        let (client, events) = Self::connect(&config.host, config.query_port).await?;

        client
            .execute(
                Command::new("login")
                    .arg("client_login_name", &config.username)
                    .arg("client_login_password", &config.password),
            )
            .await?;
        client
            .execute(Command::new("use").arg("port", config.server_port))
            .await?;

        // A taken nickname is not fatal; the server keeps the default one.
        if let Err(err) = client
            .execute(Command::new("clientupdate").arg("client_nickname", &config.nickname))
            .await
        {
            tracing::warn!(%err, nickname = %config.nickname, "could not set nickname");
        }

        client
            .execute(Command::new("servernotifyregister").arg("event", "server"))
            .await?;

        tracing::info!(server_port = config.server_port, "serverquery ready");
        Ok((client, events))
    }

    /// Send one command and wait for its records.
    ///
    /// A command that timed out still gets its reply later; that reply is
    /// skipped by whichever command is waiting when it arrives.
    pub async fn execute(&self, command: Command) -> Result<Vec<Record>, ServiceError> {
        let mut channel = self.commands.lock().await;

        tracing::trace!(command = command.name(), "serverquery command");
        channel.writer.write_all(command.as_str().as_bytes()).await?;
        channel.writer.write_all(b"\n").await?;
        channel.in_flight += 1;

        let deadline = time::Instant::now() + self.response_timeout;
        loop {
            match time::timeout_at(deadline, channel.responses.recv()).await {
                Ok(Some(response)) => {
                    channel.in_flight = channel.in_flight.saturating_sub(1);
                    if channel.in_flight == 0 {
                        return response;
                    }
                    tracing::debug!(?response, "discarding reply to timed-out command");
                }
                Ok(None) => return Err(ServiceError::Disconnected),
                Err(_) => return Err(ServiceError::Timeout(self.response_timeout)),
            }
        }
    }

    /// Periodically send a no-op so the server does not drop the idle session.
    pub fn spawn_keepalive(self: &Arc<Self>) -> JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = time::interval(KEEPALIVE_INTERVAL);
            ticker.tick().await; // First tick fires immediately; skip it.
            loop {
                ticker.tick().await;
                match client.execute(Command::new("version")).await {
                    Ok(_) => tracing::trace!("serverquery keepalive"),
                    Err(ServiceError::Disconnected) => break,
                    Err(err) => tracing::warn!(%err, "serverquery keepalive failed"),
                }
            }
        })
    }

    async fn execute_group_command(&self, command: Command) -> Result<(), ServiceError> {
        match self.execute(command).await {
            Ok(_) => Ok(()),
            Err(ServiceError::Command { id, .. }) if BENIGN_GROUP_ERRORS.contains(&id) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl SessionService for QueryClient {
    async fn list_live_sessions(&self) -> Result<Vec<SessionDescriptor>, ServiceError> {
        let records = self
            .execute(Command::new("clientlist").flag("groups").flag("times"))
            .await?;
        let now_ms = Utc::now().timestamp_millis();

        let sessions = records
            .iter()
            .filter(|record| is_regular(record))
            .filter_map(|record| {
                let descriptor = descriptor_from_clientlist(record, now_ms);
                if descriptor.is_none() {
                    tracing::debug!(?record, "skipping malformed clientlist entry");
                }
                descriptor
            })
            .collect();
        Ok(sessions)
    }

    async fn add_groups(
        &self,
        session: &SessionDescriptor,
        groups: &BTreeSet<GroupId>,
    ) -> Result<(), ServiceError> {
        if groups.is_empty() {
            return Ok(());
        }
        self.execute_group_command(
            Command::new("clientaddservergroup")
                .arg("cldbid", session.identity)
                .arg_list("sgid", groups),
        )
        .await
    }

    async fn remove_groups(
        &self,
        session: &SessionDescriptor,
        groups: &BTreeSet<GroupId>,
    ) -> Result<(), ServiceError> {
        if groups.is_empty() {
            return Ok(());
        }
        self.execute_group_command(
            Command::new("clientdelservergroup")
                .arg("cldbid", session.identity)
                .arg_list("sgid", groups),
        )
        .await
    }

    async fn notify(&self, handle: SessionHandle, text: &str) -> Result<(), ServiceError> {
        self.execute(
            Command::new("sendtextmessage")
                .arg("targetmode", TARGET_CLIENT)
                .arg("target", handle)
                .arg("msg", text),
        )
        .await?;
        Ok(())
    }
}

/// Lines end in `\n\r`, so after splitting on `\n` the `\r` leads the next one.
fn trim_line(line: &str) -> &str {
    line.trim_matches(|c| c == '\r' || c == '\n')
}

/// Expect `TS3` followed by the welcome text.
async fn read_banner(reader: &mut BufReader<OwnedReadHalf>) -> Result<(), ServiceError> {
    let mut line = String::new();
    let mut seen_magic = false;
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Err(ServiceError::Disconnected);
        }
        let text = trim_line(&line);
        if text.is_empty() {
            continue;
        }
        if !seen_magic {
            if text != "TS3" {
                return Err(ServiceError::Protocol(format!("unexpected banner {text:?}")));
            }
            seen_magic = true;
            continue;
        }
        tracing::debug!(banner = text, "serverquery banner");
        return Ok(());
    }
}

/// Route every incoming line: notifications to the broadcast channel, data
/// and status lines to whoever is waiting on the current command.
async fn read_loop(
    mut reader: BufReader<OwnedReadHalf>,
    responses: mpsc::UnboundedSender<Response>,
    events: broadcast::Sender<ServerEvent>,
) {
    let mut pending: Vec<Record> = Vec::new();
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(%err, "serverquery read failed");
                break;
            }
        }

        let text = trim_line(&line);
        if text.is_empty() {
            continue;
        }

        if text.starts_with("notify") {
            for event in parse_notification(text) {
                // No subscribers is fine; the sweep covers for it.
                let _ = events.send(event);
            }
        } else if let Some(status) = parse_status(text) {
            let data = std::mem::take(&mut pending);
            let response = if status.id == 0 {
                Ok(data)
            } else {
                Err(ServiceError::Command {
                    id: status.id,
                    message: status.message,
                })
            };
            if responses.send(response).is_err() {
                break;
            }
        } else {
            pending.extend(parse_records(text));
        }
    }

    tracing::info!("serverquery connection closed");
}
