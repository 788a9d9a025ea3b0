//! Field status engine.
//!
//! Owns the compiled packet set, the merged `latest_status` snapshot, and
//! one WLED session per controller. Collaborators joining late read
//! `init_packet()` plus `latest_status()` to reconstruct the exact current
//! hardware state.

use fcs_common::{FieldOptions, MatchEvent};
use fcs_packets::{FcsPackets, FieldControlInitPacket, FieldControlUpdatePacket};
use fcs_wled::{WledSession, WledTransport};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info};

/// Outbound notification seam for update packets.
///
/// Every update goes through the sink before any hardware sees it, so
/// observers always learn of a transition no later than the devices do.
pub trait UpdateSink {
    /// Publish one update packet.
    fn broadcast_update(&mut self, update: &FieldControlUpdatePacket);
}

/// Sink that drops updates; useful for tests and headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl UpdateSink for NullSink {
    fn broadcast_update(&mut self, _update: &FieldControlUpdatePacket) {}
}

/// Engine over the compiled packets, the status snapshot, and the sessions.
pub struct FieldEngine<T: WledTransport + Clone, S: UpdateSink> {
    packets: FcsPackets,
    latest_status: FieldControlUpdatePacket,
    sessions: BTreeMap<String, WledSession<T>>,
    sink: S,
}

impl<T: WledTransport + Clone, S: UpdateSink> FieldEngine<T, S> {
    /// Compile the packet set and create one session per controller.
    ///
    /// Sessions are created dormant; [`start`](Self::start) opens the
    /// connections.
    pub fn new(options: &FieldOptions, transport: &T, sink: S) -> Self {
        let packets = FcsPackets::compile(options);
        let sessions = packets
            .init
            .wleds
            .iter()
            .map(|(key, params)| {
                (
                    key.clone(),
                    WledSession::new(transport.clone(), params.clone()),
                )
            })
            .collect();
        Self {
            packets,
            latest_status: FieldControlUpdatePacket::default(),
            sessions,
            sink,
        }
    }

    /// Open every configured session. Empty addresses stay dormant.
    pub fn start(&mut self, now: Instant) {
        info!(sessions = self.sessions.len(), "starting field control sessions");
        for session in self.sessions.values_mut() {
            session.initialize(None, now);
        }
    }

    /// The init packet a late-joining collaborator needs first.
    pub fn init_packet(&self) -> &FieldControlInitPacket {
        &self.packets.init
    }

    /// Merged snapshot of every update broadcast so far.
    pub fn latest_status(&self) -> &FieldControlUpdatePacket {
        &self.latest_status
    }

    /// Session lookup by controller key, for inspection.
    pub fn session(&self, key: &str) -> Option<&WledSession<T>> {
        self.sessions.get(key)
    }

    /// Publish an update: notify the sink, fan slices out to sessions,
    /// then merge into the snapshot. The order is contractual.
    pub fn broadcast(&mut self, update: &FieldControlUpdatePacket) {
        self.sink.broadcast_update(update);

        for (key, params) in &update.wleds {
            if let Some(session) = self.sessions.get_mut(key) {
                session.update(params);
            } else {
                debug!(controller = %key, "update for unknown controller dropped");
            }
        }

        self.latest_status.merge(update);
    }

    /// Ready the field for a new match.
    pub fn prepare_field(&mut self) {
        let packet = self.packets.prepare_field.clone();
        self.broadcast(&packet);
    }

    /// Signal that the field is safe to enter.
    pub fn all_clear(&mut self) {
        let packet = self.packets.all_clear.clone();
        self.broadcast(&packet);
    }

    /// Put the field into its fault state.
    pub fn field_fault(&mut self) {
        let packet = self.packets.field_fault.clone();
        self.broadcast(&packet);
    }

    /// Dispatch the packet tied to a match lifecycle event.
    pub fn on_match_event(&mut self, event: MatchEvent) {
        let packet = match event {
            MatchEvent::Teleoperated => self.packets.match_start.clone(),
            MatchEvent::Endgame => self.packets.endgame.clone(),
            MatchEvent::Ended => self.packets.match_end.clone(),
            MatchEvent::Aborted => self.packets.field_fault.clone(),
        };
        self.broadcast(&packet);
    }

    /// Recompile the packet set for new options without touching sessions.
    ///
    /// Takes effect on the next named transition.
    pub fn set_field_options(&mut self, options: &FieldOptions) {
        self.packets = FcsPackets::compile(options);
    }

    /// Recompile and push the new layout to every session.
    ///
    /// Sessions whose address is unchanged re-send the layout in place;
    /// changed addresses reconnect.
    pub fn apply_settings(&mut self, options: &FieldOptions, now: Instant) {
        self.packets = FcsPackets::compile(options);
        for (key, session) in &mut self.sessions {
            if let Some(params) = self.packets.init.wleds.get(key) {
                session.initialize(Some(params.clone()), now);
            }
        }
    }

    /// Tick every session's timers.
    pub fn service(&mut self, now: Instant) {
        for session in self.sessions.values_mut() {
            session.service(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcs_wled::SimulatedTransport;

    #[test]
    fn test_engine_creates_one_session_per_controller() {
        let transport = SimulatedTransport::new();
        let engine = FieldEngine::new(&FieldOptions::default(), &transport, NullSink);
        assert!(engine.session("center").is_some());
        assert!(engine.session("red").is_some());
        assert!(engine.session("blue").is_some());
        assert!(engine.session("ramp").is_none());
    }

    #[test]
    fn test_start_with_empty_addresses_opens_nothing() {
        let transport = SimulatedTransport::new();
        let mut engine = FieldEngine::new(&FieldOptions::default(), &transport, NullSink);
        engine.start(Instant::now());
        assert_eq!(transport.connect_count(), 0);
        assert!(!engine.session("center").unwrap().is_connected());
    }

    #[test]
    fn test_broadcast_merges_into_snapshot() {
        let transport = SimulatedTransport::new();
        let mut engine = FieldEngine::new(&FieldOptions::default(), &transport, NullSink);

        engine.prepare_field();
        engine.on_match_event(MatchEvent::Teleoperated);

        let snapshot = engine.latest_status();
        // Motors from prepare_field survive the match_start merge.
        assert_eq!(snapshot.hubs.len(), 4);
        // Patterns were replaced by the match-start darkening.
        for wled in snapshot.wleds.values() {
            for pattern in &wled.patterns {
                assert_eq!(pattern.color, "000000");
            }
        }
    }

    #[test]
    fn test_set_field_options_changes_next_transition() {
        let transport = SimulatedTransport::new();
        let mut engine = FieldEngine::new(&FieldOptions::default(), &transport, NullSink);

        let options = FieldOptions {
            all_clear_color: String::from("123456"),
            ..FieldOptions::default()
        };
        engine.set_field_options(&options);
        engine.all_clear();

        let snapshot = engine.latest_status();
        let center = &snapshot.wleds["center"];
        assert!(center.patterns.iter().all(|p| p.color == "123456"));
    }
}
