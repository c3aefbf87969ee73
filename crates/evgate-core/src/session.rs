//! Vehicle session tracking.
//!
//! One session per VIN, process-wide. Sessions are created by a vehicle
//! login (or defensively by a realtime report), refreshed by any terminal
//! traffic, and torn down by logout or the liveness sweeper. The map is
//! sharded ([`DashMap`]) so connection workers touching different VINs do
//! not contend.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Commands accepted by a connection's writer task.
#[derive(Debug)]
pub enum ConnCommand {
    /// Write these bytes to the socket.
    Send(Vec<u8>),
    /// Close the socket and end the writer task.
    Close,
}

/// Cheap cloneable handle to one terminal connection.
///
/// All writes funnel through the connection's writer task, so replies from
/// the handler and closes from the sweeper serialise naturally.
#[derive(Debug, Clone)]
pub struct ConnHandle {
    peer: String,
    tx: mpsc::UnboundedSender<ConnCommand>,
}

impl ConnHandle {
    /// Create a handle backed by the given writer-task channel.
    pub fn new(peer: String, tx: mpsc::UnboundedSender<ConnCommand>) -> Self {
        Self { peer, tx }
    }

    /// Remote address, for logging.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Queue bytes for writing. Fails if the connection is gone.
    pub fn send(&self, bytes: Vec<u8>) -> Result<()> {
        self.tx.send(ConnCommand::Send(bytes)).map_err(|_| Error::ConnWrite)
    }

    /// Ask the writer task to close the socket. Idempotent.
    pub fn close(&self) {
        let _ = self.tx.send(ConnCommand::Close);
    }
}

/// State for one logged-in vehicle.
#[derive(Debug, Clone)]
pub struct Session {
    /// Vehicle identifier.
    pub vin: String,
    /// Connection the vehicle is bound to.
    pub conn: ConnHandle,
    /// When the session was created.
    pub login_at: Instant,
    /// Last time any packet arrived for this VIN.
    pub last_active: Instant,
}

/// Concurrent VIN → [`Session`] map with timeout-based eviction.
#[derive(Default)]
pub struct SessionManager {
    sessions: DashMap<String, Session>,
}

impl SessionManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace the session for `vin`.
    ///
    /// A replaced session's connection is left open; if the old terminal is
    /// really gone the sweeper reaps it once it stops being refreshed.
    pub fn add(&self, vin: &str, conn: ConnHandle) {
        let now = Instant::now();
        info!(vin = %vin, peer = %conn.peer(), "session added");
        self.sessions.insert(
            vin.to_string(),
            Session { vin: vin.to_string(), conn, login_at: now, last_active: now },
        );
    }

    /// Remove the session for `vin` and close its connection.
    pub fn remove(&self, vin: &str) {
        if let Some((_, session)) = self.sessions.remove(vin) {
            info!(vin = %vin, "session removed");
            session.conn.close();
        }
    }

    /// Look up a session snapshot.
    pub fn get(&self, vin: &str) -> Option<Session> {
        self.sessions.get(vin).map(|s| s.clone())
    }

    /// Refresh the liveness timestamp. No-op for unknown VINs.
    pub fn touch(&self, vin: &str) {
        if let Some(mut session) = self.sessions.get_mut(vin) {
            session.last_active = Instant::now();
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no sessions exist.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Evict every session idle for longer than `timeout`, closing its
    /// connection.
    pub fn sweep(&self, timeout: Duration) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| now.duration_since(s.last_active) > timeout)
            .map(|s| s.vin.clone())
            .collect();
        for vin in expired {
            info!(vin = %vin, "session timed out");
            self.remove(&vin);
        }
    }

    /// Periodic sweep loop; exits when `shutdown` flips to true.
    pub async fn run_sweeper(
        &self,
        interval: Duration,
        timeout: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        debug!(interval_secs = interval.as_secs(), timeout_secs = timeout.as_secs(), "sweeper started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep(timeout),
                changed = shutdown.changed() => {
                    // A dropped sender means the process is going away too.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("sweeper stopped");
    }
}
