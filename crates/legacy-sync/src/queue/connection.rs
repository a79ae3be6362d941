//! Broker connection state machine.
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected
//!       ^                       |                  |
//!       +------ failure --------+---- link lost ---+
//!                (reconnect scheduled after RECONNECT_DELAY)
//! ```
//!
//! At most one connection attempt and at most one pending reconnect timer exist at any time.
//! Once [`ConnectionManager::close`] has run, nothing reconnects.
//!
//! Consumers follow the link through a [`watch`] channel rather than polling the state.

use super::{BrokerError, Session, Transport};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// What consumers currently see of the connection.
pub enum Link<S> {
    Down,
    Up(Arc<S>),
    Closed,
}

impl<S> Clone for Link<S> {
    fn clone(&self) -> Self {
        match self {
            Link::Down => Link::Down,
            Link::Up(session) => Link::Up(session.clone()),
            Link::Closed => Link::Closed,
        }
    }
}

struct State<S> {
    session: Option<Arc<S>>,
    connecting: bool,
    reconnect_pending: bool,
    closed: bool,
    /// Bumped for every connection attempt that gets past setup, and again when its link is
    /// lost, so a hook only ever acts on the connection it was registered for, and only once.
    epoch: u64,
}

struct Inner<T: Transport> {
    transport: T,
    queues: Vec<String>,
    prefetch: u16,
    reconnect_delay: Duration,
    state: Mutex<State<T::Session>>,
    link: watch::Sender<Link<T::Session>>,
    reconnect: Notify,
}

pub struct ConnectionManager<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for ConnectionManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport> ConnectionManager<T> {
    /// Must be called from within a Tokio runtime; the reconnect task is spawned on it.
    pub fn new(
        transport: T,
        queues: Vec<String>,
        prefetch: u16,
        reconnect_delay: Duration,
    ) -> Self {
        let (link, _) = watch::channel(Link::Down);
        let manager = Self {
            inner: Arc::new(Inner {
                transport,
                queues,
                prefetch,
                reconnect_delay,
                state: Mutex::new(State {
                    session: None,
                    connecting: false,
                    reconnect_pending: false,
                    closed: false,
                    epoch: 0,
                }),
                link,
                reconnect: Notify::new(),
            }),
        };
        tokio::spawn(manager.clone().supervise());
        manager
    }

    fn lock(&self) -> MutexGuard<'_, State<T::Session>> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ConnectionState {
        let state = self.lock();
        if state.session.is_some() {
            ConnectionState::Connected
        } else if state.connecting {
            ConnectionState::Connecting
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Link<T::Session>> {
        self.inner.link.subscribe()
    }

    /// Connects, declares every queue and sets the prefetch.
    ///
    /// Returns `Ok` without doing anything when already connected or connecting. On failure a
    /// reconnect is scheduled before the error is returned.
    pub async fn connect(&self) -> Result<(), BrokerError> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(BrokerError::Closed);
            }
            if state.session.is_some() || state.connecting {
                debug!("Connection already established or in progress");
                return Ok(());
            }
            state.connecting = true;
        }

        info!("Connecting to RabbitMQ");
        let session = match self.establish().await {
            Ok(session) => Arc::new(session),
            Err(err) => {
                self.lock().connecting = false;
                error!(error = %err, "Failed to connect to RabbitMQ");
                self.schedule_reconnect();
                return Err(err);
            }
        };

        // The hook goes in before the session is published, so a link that dies in between
        // still reaches `link_lost`.
        let epoch = {
            let mut state = self.lock();
            state.epoch += 1;
            state.epoch
        };
        let weak = Arc::downgrade(&self.inner);
        session.on_failure(Box::new(move |err| Self::link_lost(&weak, epoch, err)));

        let published = {
            let mut state = self.lock();
            state.connecting = false;
            if state.closed {
                Err(BrokerError::Closed)
            } else if state.epoch != epoch {
                Err(BrokerError::Connect("connection lost during setup".into()))
            } else {
                state.session = Some(session.clone());
                Ok(())
            }
        };
        if let Err(err) = published {
            Self::close_session(&session).await;
            return Err(err);
        }

        self.inner.link.send_replace(Link::Up(session));
        info!(queues = ?self.inner.queues, "Connected to RabbitMQ");
        Ok(())
    }

    async fn establish(&self) -> Result<T::Session, BrokerError> {
        let session = self.inner.transport.connect().await?;
        let prepared = async {
            for queue in &self.inner.queues {
                session.declare_queue(queue).await?;
            }
            session.set_prefetch(self.inner.prefetch).await
        }
        .await;

        if let Err(err) = prepared {
            Self::close_session(&session).await;
            return Err(err);
        }
        Ok(session)
    }

    fn link_lost(inner: &Weak<Inner<T>>, epoch: u64, err: BrokerError) {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let manager = Self { inner };
        let was_up = {
            let mut state = manager.lock();
            if state.closed || state.epoch != epoch {
                return;
            }
            state.epoch += 1;
            state.session.take().is_some()
        };
        warn!(error = %err, "RabbitMQ connection lost");
        if was_up {
            manager.inner.link.send_replace(Link::Down);
        }
        manager.schedule_reconnect();
    }

    fn schedule_reconnect(&self) {
        {
            let mut state = self.lock();
            if state.closed || state.reconnect_pending {
                return;
            }
            state.reconnect_pending = true;
        }
        info!(delay_secs = self.inner.reconnect_delay.as_secs(), "Reconnect scheduled");
        self.inner.reconnect.notify_one();
    }

    /// Runs scheduled reconnects until the manager is closed.
    async fn supervise(self) {
        loop {
            self.inner.reconnect.notified().await;
            if self.lock().closed {
                break;
            }
            tokio::time::sleep(self.inner.reconnect_delay).await;
            {
                let mut state = self.lock();
                state.reconnect_pending = false;
                if state.closed {
                    break;
                }
            }
            // Failures are logged and rescheduled by connect itself.
            let _ = self.connect().await;
        }
        debug!("Reconnect task stopped");
    }

    /// Stops reconnecting, then closes the channel and the connection. Close failures are
    /// logged, never returned.
    pub async fn close(&self) {
        let session = {
            let mut state = self.lock();
            state.closed = true;
            state.session.take()
        };
        self.inner.link.send_replace(Link::Closed);
        self.inner.reconnect.notify_one();

        if let Some(session) = session {
            Self::close_session(&session).await;
        }
        info!("RabbitMQ connection closed");
    }

    async fn close_session(session: &T::Session) {
        if let Err(err) = session.close_channel().await {
            error!(error = %err, "Failed to close RabbitMQ channel");
        }
        if let Err(err) = session.close_connection().await {
            error!(error = %err, "Failed to close RabbitMQ connection");
        }
    }
}
