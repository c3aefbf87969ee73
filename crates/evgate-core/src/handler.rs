//! Per-packet protocol handling.
//!
//! Implements the login → realtime → logout contract:
//!
//! ```text
//! Fresh --0x05 ok--> PlatformAuthed --0x01--> VehicleBound(vin)
//!   |  \--0x05 fail--> Fresh (failure reply)      |    \--0x03--> PlatformAuthed
//!   \--0x01--> Fresh (failure reply)              \--0x02--> VehicleBound
//! ```
//!
//! Platform authentication is a property of the connection, not of the
//! session: it must be checked before any VIN is bound, so the flag lives in
//! [`ConnState`] and never moves into the session map.
//!
//! A fault inside packet handling is caught at the `handle` boundary and
//! logged with a backtrace; the connection and the listener survive it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::AuthService;
use crate::dispatch::{RecordEnvelope, Submitter};
use crate::error::{Error, Result};
use crate::protocol::login::{
    general_response, login_result_response, PlatformLogin, VehicleLogin, VehicleLogout,
};
use crate::protocol::{
    Command, Packet, RealtimeFrame, RESP_FAILURE, RESP_REQUEST, RESP_SUCCESS,
};
use crate::session::{ConnHandle, SessionManager};

/// Per-connection protocol state.
#[derive(Debug)]
pub struct ConnState {
    /// Handle used for replies and stored into sessions on login.
    pub handle: ConnHandle,
    /// Set once a platform login (0x05) succeeds on this connection.
    pub platform_authenticated: bool,
}

impl ConnState {
    /// Fresh state for a new connection.
    pub fn new(handle: ConnHandle) -> Self {
        Self { handle, platform_authenticated: false }
    }
}

/// Packet dispatcher shared by all connections.
pub struct ProtocolHandler {
    sessions: Arc<SessionManager>,
    submitter: Submitter,
    auth: Arc<AuthService>,
}

impl ProtocolHandler {
    /// Create a handler over the shared session map, record queue and
    /// credential store.
    pub fn new(sessions: Arc<SessionManager>, submitter: Submitter, auth: Arc<AuthService>) -> Self {
        Self { sessions, submitter, auth }
    }

    /// Handle one decoded packet.
    ///
    /// Never panics: faults are caught, logged with a backtrace, and
    /// reported as [`Error::HandlerFault`].
    pub fn handle(&self, conn: &mut ConnState, packet: &Packet) -> Result<()> {
        match catch_unwind(AssertUnwindSafe(|| self.dispatch(conn, packet))) {
            Ok(result) => result,
            Err(panic) => {
                let msg = panic_message(&panic);
                warn!(
                    vin = %packet.vin,
                    command = %format_args!("{:#04x}", packet.command.to_byte()),
                    panic = %msg,
                    backtrace = %std::backtrace::Backtrace::force_capture(),
                    "panic in packet handler"
                );
                Err(Error::HandlerFault(msg))
            }
        }
    }

    fn dispatch(&self, conn: &mut ConnState, packet: &Packet) -> Result<()> {
        match packet.command {
            Command::PlatformLogin => self.handle_platform_login(conn, packet),
            Command::VehicleLogin => self.handle_vehicle_login(conn, packet),
            Command::Realtime => self.handle_realtime(conn, packet),
            Command::Logout => self.handle_logout(conn, packet),
            Command::Heartbeat => {
                self.sessions.touch(&packet.vin);
                debug!(vin = %packet.vin, "heartbeat");
                Ok(())
            }
            Command::Other(op) => {
                self.sessions.touch(&packet.vin);
                warn!(vin = %packet.vin, command = %format_args!("{op:#04x}"), "unknown command");
                Ok(())
            }
        }
    }

    fn handle_platform_login(&self, conn: &mut ConnState, packet: &Packet) -> Result<()> {
        let login = PlatformLogin::decode(&packet.payload)?;
        debug!(
            username = %login.username,
            payload = %hex::encode(&packet.payload),
            "platform login request"
        );

        let authed = self.auth.platform_login(&login.username, &login.password).is_ok();
        let flag = if authed { RESP_SUCCESS } else { RESP_FAILURE };
        self.reply(conn, packet, Command::PlatformLogin, flag, general_response(&packet.payload));

        if !authed {
            warn!(username = %login.username, peer = %conn.handle.peer(), "platform auth failed");
            return Err(Error::AuthRejected);
        }
        conn.platform_authenticated = true;
        info!(username = %login.username, peer = %conn.handle.peer(), "platform authenticated");
        Ok(())
    }

    fn handle_vehicle_login(&self, conn: &mut ConnState, packet: &Packet) -> Result<()> {
        if !conn.platform_authenticated {
            warn!(vin = %packet.vin, "vehicle login refused: platform not authenticated");
            self.reply(
                conn,
                packet,
                Command::VehicleLogin,
                RESP_FAILURE,
                login_result_response(&packet.payload, false),
            );
            return Err(Error::State("vehicle login before platform login".into()));
        }

        let login = VehicleLogin::decode(&packet.payload)?;
        info!(vin = %packet.vin, seq = login.seq, iccid = %login.iccid, "vehicle login");
        self.auth.vehicle_login(&packet.vin, &login.iccid)?;

        self.reply(
            conn,
            packet,
            Command::VehicleLogin,
            RESP_SUCCESS,
            login_result_response(&packet.payload, true),
        );
        self.sessions.add(&packet.vin, conn.handle.clone());
        Ok(())
    }

    fn handle_logout(&self, conn: &mut ConnState, packet: &Packet) -> Result<()> {
        let logout = VehicleLogout::decode(&packet.payload)?;
        info!(vin = %packet.vin, seq = logout.seq, "vehicle logout");
        self.sessions.remove(&packet.vin);
        self.reply(
            conn,
            packet,
            Command::Logout,
            RESP_SUCCESS,
            login_result_response(&packet.payload, true),
        );
        Ok(())
    }

    fn handle_realtime(&self, conn: &mut ConnState, packet: &Packet) -> Result<()> {
        // A report for a VIN with no session re-binds it; the terminal may
        // have reconnected without the gateway seeing a fresh login.
        if self.sessions.get(&packet.vin).is_none() {
            self.sessions.add(&packet.vin, conn.handle.clone());
        }
        self.sessions.touch(&packet.vin);

        let frame = RealtimeFrame::parse(packet.version, &packet.payload)?;
        let mut blocks = frame.blocks();
        let mut forwarded = 0usize;
        for block in blocks.by_ref() {
            match block {
                Ok(record) => {
                    self.submitter.submit(RecordEnvelope {
                        vin: packet.vin.clone(),
                        record,
                    });
                    forwarded += 1;
                }
                Err(e) => {
                    // Records already forwarded stay forwarded; the rest of
                    // this packet is abandoned and no reply is sent.
                    warn!(
                        vin = %packet.vin,
                        forwarded = forwarded,
                        error = %e,
                        "realtime sub-record decode failed"
                    );
                    return Err(e);
                }
            }
        }
        if let Some(info) = blocks.unknown_type() {
            warn!(
                vin = %packet.vin,
                info_type = %format_args!("{info:#04x}"),
                "unknown info type, rest of packet dropped"
            );
        }
        debug!(vin = %packet.vin, records = forwarded, "realtime report");

        if packet.response == RESP_REQUEST {
            self.reply(
                conn,
                packet,
                Command::Realtime,
                RESP_SUCCESS,
                general_response(&packet.payload),
            );
        }
        Ok(())
    }

    fn reply(
        &self,
        conn: &ConnState,
        request: &Packet,
        command: Command,
        response: u8,
        payload: Vec<u8>,
    ) {
        let reply = Packet {
            version: request.version,
            command,
            response,
            vin: request.vin.clone(),
            encryption: 0x01,
            payload,
        };
        if conn.handle.send(reply.encode()).is_err() {
            warn!(vin = %request.vin, peer = %conn.handle.peer(), "failed to queue reply");
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
