//! PLC supervisor: keeps the output coil image consistent with match state.
//!
//! The supervisor owns the desired coil image and the last confirmed copy.
//! Every poll re-derives what must go on the wire from current state; a
//! failed operation leaves the confirmed baseline untouched so the next
//! poll retries the same diff.

use crate::image::{PlcInputs, PlcStatus, INPUT_COUNT, REGISTER_COUNT};
use crate::modbus::{ModbusClient, SLAVE_ID};
use fcs_common::{MatchPhase, RTrig};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Minimum interval between watchdog heartbeat writes when nothing else
/// changed.
pub const COIL_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(500);

/// How long the stack-light buzzer stays asserted after being triggered.
pub const BUZZER_PULSE: Duration = Duration::from_millis(1500);

/// Sentinel for a field stack channel forced on.
pub const STACK_LIGHT_ON: u8 = 1;

/// Sentinel for a field stack channel forced off.
pub const STACK_LIGHT_OFF: u8 = 0;

/// Events raised by a poll for collaborators to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlcEvent {
    /// The discrete input image changed; carries the new image.
    InputsChanged(PlcInputs),
    /// The field e-stop was asserted; the running match must abort.
    MatchAbort,
}

/// Supervisor over one PLC connection.
pub struct PlcSupervisor<C: ModbusClient> {
    status: PlcStatus,
    client: C,
    first_conn: bool,
    last_sent_heartbeat: Option<Instant>,
    match_start_edge: RTrig,
    buzzer_clear_at: Option<Instant>,
}

impl<C: ModbusClient> PlcSupervisor<C> {
    /// Create a supervisor around a disconnected client.
    pub fn new(client: C) -> Self {
        Self {
            status: PlcStatus::default(),
            client,
            first_conn: false,
            last_sent_heartbeat: None,
            match_start_edge: RTrig::default(),
            buzzer_clear_at: None,
        }
    }

    /// Current PLC state.
    pub fn status(&self) -> &PlcStatus {
        &self.status
    }

    /// The underlying client, for inspection in tests.
    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    /// Connect to the PLC at `address`.
    ///
    /// On success the full current coil image is pushed unconditionally so
    /// the PLC starts from a known output state. On failure the first-conn
    /// flag is set so the next poll retries.
    pub fn connect(&mut self, address: &str) {
        self.status.address = address.to_owned();

        if let Err(e) = self.client.connect(address) {
            warn!(addr = %address, error = %e, "PLC connection failed");
            self.status.is_healthy = false;
            self.first_conn = true;
            return;
        }

        info!(addr = %address, "connected to PLC");
        self.client.set_slave_id(SLAVE_ID);
        self.first_conn = false;
        self.status.is_healthy = true;

        match self.client.write_coils(0, &self.status.coils.to_bits()) {
            Ok(()) => {
                self.status.old_coils = self.status.coils;
                self.last_sent_heartbeat = Some(Instant::now());
            }
            Err(e) => {
                warn!(error = %e, "initial coil push failed");
                self.on_link_fault();
            }
        }
    }

    /// One supervision pass: read inputs and registers, derive coil state,
    /// and write whatever differs from the confirmed baseline.
    pub fn poll(&mut self, phase: MatchPhase, now: Instant) -> Vec<PlcEvent> {
        let mut events = Vec::new();

        if !self.client.is_open() {
            if self.first_conn {
                self.first_conn = false;
                let address = self.status.address.clone();
                self.connect(&address);
            }
            // No address configured yet, or waiting for connect(): stay quiet.
            return events;
        }

        match self.client.read_holding_registers(0, REGISTER_COUNT) {
            Ok(registers) => self.status.registers = registers,
            Err(e) => {
                warn!(error = %e, "holding register read failed");
                self.on_link_fault();
                return events;
            }
        }

        let candidate = match self.client.read_discrete_inputs(0, INPUT_COUNT) {
            Ok(bits) => PlcInputs::from_bits(&bits),
            Err(e) => {
                warn!(error = %e, "discrete input read failed");
                self.on_link_fault();
                return events;
            }
        };
        self.status.inputs = candidate;

        // One-shot pulse on the tick a match becomes active.
        self.status.coils.match_start = self.match_start_edge.sample(phase.is_in_match());

        if candidate != self.status.old_inputs {
            debug!(?candidate, "PLC inputs changed");
            events.push(PlcEvent::InputsChanged(candidate));
            if candidate.field_estop {
                events.push(PlcEvent::MatchAbort);
            }
            self.status.old_inputs = candidate;
        }

        if let Some(clear_at) = self.buzzer_clear_at {
            if now >= clear_at {
                self.status.coils.stack_light_buzzer = false;
                self.buzzer_clear_at = None;
            }
        }

        self.write_coils_if_due(now);
        events
    }

    /// Mark one driver station connected or not, then re-evaluate the
    /// green stack light.
    pub fn set_station_stack(
        &mut self,
        station: u8,
        connected: bool,
        phase: MatchPhase,
        now: Instant,
    ) {
        self.status.coils.set_station_conn(station, connected);
        self.refresh_green(phase, now);
    }

    /// Bulk set all six station connection flags.
    pub fn set_all_station_stacks(&mut self, connected: bool, phase: MatchPhase, now: Instant) {
        for station in 0..6 {
            self.status.coils.set_station_conn(station, connected);
        }
        self.refresh_green(phase, now);
    }

    /// Mark one driver station bypassed or not, then re-evaluate the
    /// green stack light.
    pub fn set_station_bypass(
        &mut self,
        station: u8,
        bypassed: bool,
        phase: MatchPhase,
        now: Instant,
    ) {
        self.status.coils.set_station_bypass(station, bypassed);
        self.refresh_green(phase, now);
    }

    /// Directly override the field stack light channels.
    ///
    /// A channel is on for [`STACK_LIGHT_ON`] and off for anything else.
    pub fn set_field_stack(&mut self, blue: u8, red: u8, orange: u8, green: u8, buzzer: u8) {
        self.status.coils.stack_light_blue = blue == STACK_LIGHT_ON;
        self.status.coils.stack_light_red = red == STACK_LIGHT_ON;
        self.status.coils.stack_light_orange = orange == STACK_LIGHT_ON;
        self.status.coils.stack_light_green = green == STACK_LIGHT_ON;
        self.status.coils.stack_light_buzzer = buzzer == STACK_LIGHT_ON;
        if buzzer != STACK_LIGHT_ON {
            self.buzzer_clear_at = None;
        }
    }

    /// Reset for a new match: all stations disconnected, field stack dark.
    pub fn on_prestart(&mut self) {
        for station in 0..6 {
            self.status.coils.set_station_conn(station, false);
        }
        self.status.coils.stack_light_blue = false;
        self.status.coils.stack_light_red = false;
        self.status.coils.stack_light_orange = false;
        self.status.coils.stack_light_green = false;
        self.status.coils.stack_light_buzzer = false;
        self.buzzer_clear_at = None;
    }

    /// E-stop state by station index (0-5 alliance stations, 99 field-wide).
    pub fn estop(&self, station: u8) -> Option<bool> {
        self.status.inputs.estop(station)
    }

    /// Assert the buzzer; it auto-clears after [`BUZZER_PULSE`].
    pub fn sound_buzzer(&mut self, now: Instant) {
        self.status.coils.stack_light_buzzer = true;
        self.buzzer_clear_at = Some(now + BUZZER_PULSE);
    }

    /// Green asserted iff every station is ready and the field is in
    /// prestart; the buzzer sounds once on the rising edge.
    fn refresh_green(&mut self, phase: MatchPhase, now: Instant) {
        let green = self.status.coils.all_stations_ready() && phase == MatchPhase::Prestart;
        if green && !self.status.coils.stack_light_green {
            self.sound_buzzer(now);
        }
        self.status.coils.stack_light_green = green;
    }

    /// Coil write policy: full image when anything changed, otherwise a
    /// single heartbeat coil write at most every 500 ms.
    fn write_coils_if_due(&mut self, now: Instant) {
        if self.status.coils != self.status.old_coils {
            self.status.coils.heartbeat = true;
            match self.client.write_coils(0, &self.status.coils.to_bits()) {
                Ok(()) => {
                    self.status.old_coils = self.status.coils;
                    self.last_sent_heartbeat = Some(now);
                }
                Err(e) => {
                    warn!(error = %e, "coil image write failed");
                    self.on_link_fault();
                }
            }
        } else if self
            .last_sent_heartbeat
            .map_or(true, |sent| now.duration_since(sent) >= COIL_HEARTBEAT_INTERVAL)
        {
            match self.client.write_coil(0, true) {
                Ok(()) => self.last_sent_heartbeat = Some(now),
                Err(e) => {
                    warn!(error = %e, "heartbeat coil write failed");
                    self.on_link_fault();
                }
            }
        }
    }

    fn on_link_fault(&mut self) {
        self.status.is_healthy = false;
        self.client.close();
        self.first_conn = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::{CoilWrite, SimulatedModbus};
    use crate::COIL_COUNT;

    fn connected_supervisor() -> PlcSupervisor<SimulatedModbus> {
        let mut plc = PlcSupervisor::new(SimulatedModbus::new());
        plc.connect("10.0.100.10");
        plc.client_mut().writes.clear();
        plc
    }

    #[test]
    fn test_connect_pushes_full_coil_image() {
        let mut plc = PlcSupervisor::new(SimulatedModbus::new());
        plc.connect("10.0.100.10");
        assert!(plc.status().is_healthy);
        assert_eq!(plc.client_mut().slave_id, SLAVE_ID);
        let image = plc.client_mut().last_full_write().map(<[bool]>::to_vec);
        assert_eq!(image, Some(vec![false; COIL_COUNT as usize]));
    }

    #[test]
    fn test_connect_failure_sets_retry_flag() {
        let mut client = SimulatedModbus::new();
        client.fail_connect = true;
        let mut plc = PlcSupervisor::new(client);
        plc.connect("10.0.100.10");
        assert!(!plc.status().is_healthy);

        // Next poll retries the connection.
        plc.client_mut().fail_connect = false;
        plc.poll(MatchPhase::Prestart, Instant::now());
        assert!(plc.status().is_healthy);
        assert_eq!(plc.client_mut().connect_attempts, 2);
    }

    #[test]
    fn test_poll_without_connect_stays_quiet() {
        let mut plc = PlcSupervisor::new(SimulatedModbus::new());
        let events = plc.poll(MatchPhase::Prestart, Instant::now());
        assert!(events.is_empty());
        assert_eq!(plc.client_mut().connect_attempts, 0);
    }

    #[test]
    fn test_green_requires_all_stations_and_prestart() {
        let now = Instant::now();
        let mut plc = connected_supervisor();

        for station in 0..5 {
            plc.set_station_stack(station, true, MatchPhase::Prestart, now);
            assert!(!plc.status().coils.stack_light_green);
        }
        plc.set_station_stack(5, true, MatchPhase::Prestart, now);
        assert!(plc.status().coils.stack_light_green);

        // Any phase other than prestart drops the green.
        plc.set_station_stack(5, true, MatchPhase::Autonomous, now);
        assert!(!plc.status().coils.stack_light_green);
    }

    #[test]
    fn test_green_truth_table_over_flag_permutations() {
        let now = Instant::now();
        let phases = [
            MatchPhase::Prestart,
            MatchPhase::Autonomous,
            MatchPhase::Transition,
            MatchPhase::Teleoperated,
            MatchPhase::Endgame,
            MatchPhase::Ended,
            MatchPhase::Aborted,
        ];

        for phase in phases {
            // Twelve bits: one connected and one bypassed flag per station.
            for mask in 0u16..(1 << 12) {
                let mut plc = connected_supervisor();
                let mut all_ready = true;
                for station in 0..6u8 {
                    let connected = mask & (1 << station) != 0;
                    let bypassed = mask & (1 << (station + 6)) != 0;
                    plc.set_station_bypass(station, bypassed, phase, now);
                    plc.set_station_stack(station, connected, phase, now);
                    all_ready &= connected || bypassed;
                }
                let expected = all_ready && phase == MatchPhase::Prestart;
                assert_eq!(
                    plc.status().coils.stack_light_green,
                    expected,
                    "mask {mask:#014b} phase {phase}"
                );
            }
        }
    }

    #[test]
    fn test_bypass_counts_as_ready() {
        let now = Instant::now();
        let mut plc = connected_supervisor();

        for station in 0..5 {
            plc.set_station_stack(station, true, MatchPhase::Prestart, now);
        }
        plc.set_station_bypass(5, true, MatchPhase::Prestart, now);
        assert!(plc.status().coils.stack_light_green);

        plc.set_station_bypass(5, false, MatchPhase::Prestart, now);
        assert!(!plc.status().coils.stack_light_green);
    }

    #[test]
    fn test_buzzer_sounds_once_on_green_edge_and_clears() {
        let now = Instant::now();
        let mut plc = connected_supervisor();

        plc.set_all_station_stacks(true, MatchPhase::Prestart, now);
        assert!(plc.status().coils.stack_light_green);
        assert!(plc.status().coils.stack_light_buzzer);

        // Re-evaluating while already green must not re-trigger the pulse.
        plc.poll(MatchPhase::Prestart, now + Duration::from_millis(1600));
        assert!(!plc.status().coils.stack_light_buzzer);
        plc.set_station_stack(0, true, MatchPhase::Prestart, now + Duration::from_millis(1700));
        assert!(!plc.status().coils.stack_light_buzzer);
    }

    #[test]
    fn test_field_estop_emits_one_change_and_one_abort() {
        let now = Instant::now();
        let mut plc = connected_supervisor();

        plc.client_mut().inputs[0] = true;
        let events = plc.poll(MatchPhase::Teleoperated, now);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], PlcEvent::InputsChanged(i) if i.field_estop));
        assert_eq!(events[1], PlcEvent::MatchAbort);

        // Steady state: no repeat events.
        let events = plc.poll(MatchPhase::Teleoperated, now + Duration::from_millis(100));
        assert!(events.is_empty());
    }

    #[test]
    fn test_station_estop_changes_without_abort() {
        let now = Instant::now();
        let mut plc = connected_supervisor();

        plc.client_mut().inputs[2] = true; // red station 2
        let events = plc.poll(MatchPhase::Teleoperated, now);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], PlcEvent::InputsChanged(i) if i.red_estop_2));
        assert_eq!(plc.estop(1), Some(true));
        assert_eq!(plc.estop(99), Some(false));
    }

    #[test]
    fn test_unchanged_coils_heartbeat_every_500ms() {
        let mut plc = connected_supervisor();
        let base = Instant::now();

        // Within the interval of the connect-time write: no write at all.
        plc.poll(MatchPhase::Prestart, base);
        plc.poll(MatchPhase::Prestart, base + Duration::from_millis(100));
        plc.poll(MatchPhase::Prestart, base + Duration::from_millis(400));
        // Past the interval: one heartbeat write, then one more 500 ms on.
        plc.poll(MatchPhase::Prestart, base + Duration::from_millis(500));
        plc.poll(MatchPhase::Prestart, base + Duration::from_millis(900));
        plc.poll(MatchPhase::Prestart, base + Duration::from_millis(1000));

        let writes = &plc.client_mut().writes;
        assert_eq!(writes.len(), 2);
        for write in writes {
            assert_eq!(*write, CoilWrite::Single { index: 0, value: true });
        }
    }

    #[test]
    fn test_connect_write_counts_as_heartbeat() {
        let mut plc = PlcSupervisor::new(SimulatedModbus::new());
        plc.connect("10.0.100.10");
        let base = Instant::now();
        plc.client_mut().writes.clear();

        // The connect-time full write satisfied the watchdog.
        plc.poll(MatchPhase::Prestart, base + Duration::from_millis(100));
        assert!(plc.client_mut().writes.is_empty());

        plc.poll(MatchPhase::Prestart, base + Duration::from_millis(500));
        assert_eq!(
            plc.client_mut().writes,
            vec![CoilWrite::Single { index: 0, value: true }]
        );
    }

    #[test]
    fn test_changed_coils_write_full_image() {
        let base = Instant::now();
        let mut plc = connected_supervisor();
        plc.poll(MatchPhase::Prestart, base);
        plc.client_mut().writes.clear();

        plc.set_field_stack(STACK_LIGHT_ON, STACK_LIGHT_OFF, STACK_LIGHT_OFF, STACK_LIGHT_OFF, STACK_LIGHT_OFF);
        plc.poll(MatchPhase::Prestart, base + Duration::from_millis(100));

        let writes = &plc.client_mut().writes;
        assert_eq!(writes.len(), 1);
        match &writes[0] {
            CoilWrite::Multiple { start, values } => {
                assert_eq!(*start, 0);
                assert!(values[14]); // blue channel
                assert!(values[0]); // heartbeat rides along
            }
            CoilWrite::Single { .. } => panic!("expected a full image write"),
        }
    }

    #[test]
    fn test_write_failure_keeps_baseline_for_retry() {
        let base = Instant::now();
        let mut plc = connected_supervisor();
        plc.poll(MatchPhase::Prestart, base);

        plc.set_field_stack(STACK_LIGHT_OFF, STACK_LIGHT_ON, STACK_LIGHT_OFF, STACK_LIGHT_OFF, STACK_LIGHT_OFF);
        plc.client_mut().fail_writes = true;
        plc.poll(MatchPhase::Prestart, base + Duration::from_millis(100));
        assert_ne!(plc.status().coils, plc.status().old_coils);
        assert!(!plc.status().is_healthy);

        // Link recovers: the same diff goes out on the next poll.
        plc.client_mut().fail_writes = false;
        plc.poll(MatchPhase::Prestart, base + Duration::from_millis(200));
        plc.poll(MatchPhase::Prestart, base + Duration::from_millis(300));
        assert_eq!(plc.status().coils, plc.status().old_coils);
        assert!(plc.status().coils.stack_light_red);
    }

    #[test]
    fn test_match_start_pulses_once_per_match() {
        let base = Instant::now();
        let mut plc = connected_supervisor();

        plc.poll(MatchPhase::Prestart, base);
        assert!(!plc.status().coils.match_start);

        plc.poll(MatchPhase::Autonomous, base + Duration::from_millis(100));
        assert!(plc.status().coils.match_start);

        // Held high input produces a single-tick pulse.
        plc.poll(MatchPhase::Autonomous, base + Duration::from_millis(200));
        assert!(!plc.status().coils.match_start);
        plc.poll(MatchPhase::Teleoperated, base + Duration::from_millis(300));
        assert!(!plc.status().coils.match_start);
    }

    #[test]
    fn test_sound_buzzer_autoclears_after_pulse() {
        let base = Instant::now();
        let mut plc = connected_supervisor();

        plc.sound_buzzer(base);
        plc.poll(MatchPhase::Prestart, base + Duration::from_millis(1400));
        assert!(plc.status().coils.stack_light_buzzer);
        plc.poll(MatchPhase::Prestart, base + Duration::from_millis(1500));
        assert!(!plc.status().coils.stack_light_buzzer);
    }

    #[test]
    fn test_field_stack_treats_nonsentinel_values_as_off() {
        let mut plc = connected_supervisor();
        plc.set_field_stack(STACK_LIGHT_ON, STACK_LIGHT_ON, STACK_LIGHT_ON, STACK_LIGHT_ON, STACK_LIGHT_ON);

        plc.set_field_stack(2, 255, STACK_LIGHT_ON, 7, STACK_LIGHT_OFF);
        let coils = plc.status().coils;
        assert!(!coils.stack_light_blue);
        assert!(!coils.stack_light_red);
        assert!(coils.stack_light_orange);
        assert!(!coils.stack_light_green);
        assert!(!coils.stack_light_buzzer);
    }

    #[test]
    fn test_on_prestart_resets_stacks() {
        let now = Instant::now();
        let mut plc = connected_supervisor();
        plc.set_all_station_stacks(true, MatchPhase::Prestart, now);
        plc.set_field_stack(STACK_LIGHT_ON, STACK_LIGHT_ON, STACK_LIGHT_ON, STACK_LIGHT_ON, STACK_LIGHT_ON);

        plc.on_prestart();
        let coils = plc.status().coils;
        assert!(!coils.red_one_conn && !coils.blue_three_conn);
        assert!(!coils.stack_light_blue && !coils.stack_light_buzzer);
        assert!(!coils.stack_light_green);
    }
}
