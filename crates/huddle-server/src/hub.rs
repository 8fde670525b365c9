//! Hub event loop.
//!
//! One task owns the [`ServerDriver`] and is the only place driver state is
//! touched. Connection tasks, the collaborator and finished storage jobs all
//! talk to it through one unbounded channel; the hub answers by pushing
//! encoded frames into each connection's own outbound channel, which keeps
//! per-connection order without any lock.

use std::{collections::HashMap, time::Duration};

use bytes::Bytes;
use huddle_core::Environment;
use huddle_proto::{CloseCode, ConnectionId, codec};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    auth::Authenticator,
    driver::{LogLevel, ServerAction, ServerDriver, ServerEvent},
    handle::HubHandle,
    router::Delivery,
    storage::{Storage, StorageError},
};

/// How often the hub checks handshake timeouts.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Work item for a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Length-prefixed encoded event
    Frame(Bytes),
    /// Flush and close the connection
    Close {
        /// Application close code
        code: CloseCode,
        /// Reason phrase
        reason: String,
    },
}

/// Commands accepted by the hub loop.
#[derive(Debug)]
pub(crate) enum HubCommand {
    /// Track a new connection's outbound channel, then accept it
    Attach { connection_id: ConnectionId, outbound: mpsc::UnboundedSender<Outbound> },
    /// Tear down a connection, then forget its outbound channel
    Detach { connection_id: ConnectionId, reason: String },
    /// Anything else the driver handles
    Event(ServerEvent),
}

/// Owner of the driver and the outbound channels.
pub struct Hub<E, A, S>
where
    E: Environment,
    A: Authenticator,
    S: Storage,
{
    driver: ServerDriver<E, A>,
    storage: S,
    outbound: HashMap<ConnectionId, mpsc::UnboundedSender<Outbound>>,
    commands_tx: mpsc::UnboundedSender<HubCommand>,
    commands_rx: mpsc::UnboundedReceiver<HubCommand>,
    tick_interval: Duration,
}

impl<E, A, S> Hub<E, A, S>
where
    E: Environment,
    A: Authenticator,
    S: Storage,
{
    /// Create a hub around a driver and the durable store.
    pub fn new(driver: ServerDriver<E, A>, storage: S, tick_interval: Duration) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Self { driver, storage, outbound: HashMap::new(), commands_tx, commands_rx, tick_interval }
    }

    /// Handle for submitting work to this hub.
    pub fn handle(&self) -> HubHandle {
        HubHandle::new(self.commands_tx.clone())
    }

    /// Spawn the loop on the current Tokio runtime.
    ///
    /// The loop runs until every [`HubHandle`] is dropped.
    pub fn spawn(self) -> (HubHandle, JoinHandle<()>) {
        let handle = self.handle();
        (handle, tokio::spawn(self.run()))
    }

    /// Run the event loop.
    pub async fn run(mut self) {
        // The hub keeps a sender for storage callbacks, so recv() never
        // yields None. Stop once no outside handle is left.
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                _ = ticker.tick() => {
                    self.dispatch(ServerEvent::Tick);
                    if self.commands_tx.strong_count() == 1 && self.commands_rx.is_empty() {
                        break;
                    }
                },
            }
        }

        tracing::debug!("hub loop stopped");
    }

    fn handle_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::Attach { connection_id, outbound } => {
                self.outbound.insert(connection_id, outbound);
                self.dispatch(ServerEvent::ConnectionAccepted { connection_id });
            },
            HubCommand::Detach { connection_id, reason } => {
                self.dispatch(ServerEvent::ConnectionClosed { connection_id, reason });
                self.outbound.remove(&connection_id);
            },
            HubCommand::Event(event) => self.dispatch(event),
        }
    }

    fn dispatch(&mut self, event: ServerEvent) {
        match self.driver.process_event(event) {
            Ok(actions) => self.execute(actions),
            Err(err) => {
                tracing::warn!(connection_id = %err.connection_id(), error = %err, "driver error");
            },
        }
    }

    /// Execute server actions.
    fn execute(&mut self, actions: Vec<ServerAction>) {
        for action in actions {
            match action {
                ServerAction::Deliver(delivery) => self.deliver(delivery),

                ServerAction::CloseConnection { connection_id, code, reason } => {
                    tracing::info!(%connection_id, ?code, %reason, "closing connection");
                    if let Some(outbound) = self.outbound.get(&connection_id) {
                        let _ = outbound.send(Outbound::Close { code, reason });
                    }
                },

                ServerAction::FetchGroupRooms { connection_id, user_id } => {
                    let storage = self.storage.clone();
                    let commands = self.commands_tx.clone();

                    tokio::spawn(async move {
                        let lookup = user_id.clone();
                        let result =
                            tokio::task::spawn_blocking(move || storage.group_rooms_for(&lookup))
                                .await
                                .unwrap_or_else(|e| Err(StorageError::Io(e.to_string())));

                        let _ = commands.send(HubCommand::Event(ServerEvent::GroupRoomsLoaded {
                            connection_id,
                            user_id,
                            result,
                        }));
                    });
                },

                ServerAction::StampLastSeen { user_id, at_secs } => {
                    let storage = self.storage.clone();

                    tokio::task::spawn_blocking(move || {
                        if let Err(err) = storage.stamp_last_seen(&user_id, at_secs) {
                            tracing::error!(%user_id, error = %err, "failed to stamp last-seen");
                        }
                    });
                },

                ServerAction::Log { level, message } => match level {
                    LogLevel::Debug => tracing::debug!("{}", message),
                    LogLevel::Info => tracing::info!("{}", message),
                    LogLevel::Warn => tracing::warn!("{}", message),
                    LogLevel::Error => tracing::error!("{}", message),
                },
            }
        }
    }

    /// Encode once, then hand the same bytes to every recipient.
    fn deliver(&self, delivery: Delivery) {
        if delivery.connections.is_empty() {
            return;
        }

        let frame = match codec::encode(&delivery.event) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(
                    event = %delivery.event.name,
                    error = %err,
                    "failed to encode event"
                );
                return;
            },
        };

        for connection_id in delivery.connections {
            if let Some(outbound) = self.outbound.get(&connection_id) {
                // Writer gone means the connection is closing; the detach
                // command is already queued.
                let _ = outbound.send(Outbound::Frame(frame.clone()));
            }
        }
    }
}
