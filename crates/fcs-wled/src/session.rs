//! Per-controller session state machine.
//!
//! Each session owns one link, three deadline slots (heartbeat, keepalive,
//! reconnect), and the retained pattern state replayed after a reconnect.
//! Deadlines are polled by `service()` on every daemon tick; at most one
//! deadline per concern is live, and re-arming overwrites the slot.

use crate::protocol::{initialization_payload, set_color_payload, HEARTBEAT_PAYLOAD};
use crate::transport::{WledLink, WledTransport};
use fcs_packets::{WledInitParameters, WledUpdateParameters};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Interval between heartbeat probes on a live link.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_millis(1000);

/// How long an unanswered probe is tolerated before forcing a reconnect.
pub const KEEPALIVE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Delay before retrying a failed connection.
pub const RECONNECT_PERIOD: Duration = Duration::from_millis(1000);

/// Session for one WLED controller.
pub struct WledSession<T: WledTransport> {
    transport: T,
    init_packet: WledInitParameters,
    link: Option<T::Link>,
    latest_state: Option<WledUpdateParameters>,
    heartbeat_at: Option<Instant>,
    keepalive_at: Option<Instant>,
    reconnect_at: Option<Instant>,
}

/// Take a deadline when it has passed.
fn take_due(slot: &mut Option<Instant>, now: Instant) -> bool {
    if slot.map_or(false, |at| now >= at) {
        *slot = None;
        true
    } else {
        false
    }
}

impl<T: WledTransport> WledSession<T> {
    /// Create a dormant session; call [`initialize`](Self::initialize) to
    /// connect.
    pub fn new(transport: T, init_packet: WledInitParameters) -> Self {
        Self {
            transport,
            init_packet,
            link: None,
            latest_state: None,
            heartbeat_at: None,
            keepalive_at: None,
            reconnect_at: None,
        }
    }

    /// True while a link is open.
    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Configured controller address; empty means intentionally absent.
    pub fn address(&self) -> &str {
        &self.init_packet.address
    }

    /// Retained pattern state, replayed on reconnect.
    pub fn latest_state(&self) -> Option<&WledUpdateParameters> {
        self.latest_state.as_ref()
    }

    /// (Re)establish the session.
    ///
    /// With a new init packet whose address matches the live connection,
    /// the segment layout is re-sent in place. Otherwise the session tears
    /// down and reconnects to the configured address; an empty address
    /// leaves it dormant.
    pub fn initialize(&mut self, init_packet: Option<WledInitParameters>, now: Instant) {
        if let Some(packet) = init_packet {
            let same_address =
                self.link.is_some() && packet.address == self.init_packet.address;
            self.init_packet = packet;
            if same_address {
                let payload = initialization_payload(&self.init_packet);
                if let Some(link) = self.link.as_mut() {
                    if let Err(e) = link.send(&payload) {
                        warn!(addr = %self.init_packet.address, error = %e,
                            "failed to reinitialize");
                    }
                }
                return;
            }
        }

        self.heartbeat_at = None;
        self.keepalive_at = None;
        self.reconnect_at = None;
        self.link = None;

        if self.init_packet.address.is_empty() {
            return;
        }

        match self.transport.connect(&self.init_packet.address) {
            Ok(mut link) => {
                let payload = initialization_payload(&self.init_packet);
                if let Err(e) = link.send(&payload) {
                    warn!(addr = %self.init_packet.address, error = %e,
                        "failed to initialize");
                    self.reconnect_at = Some(now + RECONNECT_PERIOD);
                    return;
                }

                info!(addr = %self.init_packet.address, "connected to WLED controller");

                // Probe straight away so a dead-on-arrival link is caught
                // one keepalive window after connect.
                if let Err(e) = link.send(HEARTBEAT_PAYLOAD) {
                    debug!(addr = %self.init_packet.address, error = %e,
                        "failed to send heartbeat");
                }
                self.keepalive_at = Some(now + KEEPALIVE_TIMEOUT);
                self.heartbeat_at = Some(now + HEARTBEAT_PERIOD);

                if let Some(state) = &self.latest_state {
                    if let Err(e) = link.send(&set_color_payload(state)) {
                        warn!(addr = %self.init_packet.address, error = %e,
                            "failed to replay retained state");
                    }
                }

                self.link = Some(link);
            }
            Err(e) => {
                warn!(addr = %self.init_packet.address, error = %e,
                    "failed to connect to WLED controller");
                self.reconnect_at = Some(now + RECONNECT_PERIOD);
            }
        }
    }

    /// Send a pattern update and retain it for replay.
    ///
    /// The merge happens whether or not the send succeeds, so the retained
    /// state always reflects the latest intent.
    pub fn update(&mut self, update: &WledUpdateParameters) {
        if let Some(link) = self.link.as_mut() {
            if let Err(e) = link.send(&set_color_payload(update)) {
                warn!(addr = %self.init_packet.address, error = %e,
                    "failed to send pattern");
            }
        }

        match self.latest_state.as_mut() {
            Some(state) => state.merge(update),
            None => self.latest_state = Some(update.clone()),
        }
    }

    /// Drive the timers; call once per tick.
    pub fn service(&mut self, now: Instant) {
        if take_due(&mut self.reconnect_at, now) {
            self.initialize(None, now);
        }

        if let Some(link) = self.link.as_mut() {
            // Any inbound traffic proves the controller is alive.
            if !link.drain().is_empty() {
                self.keepalive_at = None;
            }
        }

        if take_due(&mut self.heartbeat_at, now) {
            if let Some(link) = self.link.as_mut() {
                if let Err(e) = link.send(HEARTBEAT_PAYLOAD) {
                    debug!(addr = %self.init_packet.address, error = %e,
                        "failed to send heartbeat");
                }
                // Arm only when no probe is outstanding, so a silent link
                // still times out.
                if self.keepalive_at.is_none() {
                    self.keepalive_at = Some(now + KEEPALIVE_TIMEOUT);
                }
                self.heartbeat_at = Some(now + HEARTBEAT_PERIOD);
            }
        }

        if take_due(&mut self.keepalive_at, now) {
            warn!(addr = %self.init_packet.address, "disconnected from WLED controller");
            self.initialize(None, now);
        }
    }
}
