//! PLC I/O image: named views over the discrete input and output coil tables.
//!
//! The bit layouts here are the single source of truth for channel
//! assignment. `from_bits`/`to_bits` are exact inverses; everything else in
//! the crate works on the named fields.

/// Number of discrete input channels read each poll.
pub const INPUT_COUNT: u16 = 7;

/// Number of output coils in the image.
pub const COIL_COUNT: u16 = 19;

/// Number of holding registers read each poll.
pub const REGISTER_COUNT: u16 = 10;

/// Default PLC address when none is configured.
pub const DEFAULT_PLC_ADDRESS: &str = "10.0.100.10";

/// Decoded discrete input table.
///
/// Channel layout: 0 field e-stop, 1-3 red station e-stops, 4-6 blue
/// station e-stops. An e-stop channel reads true while the stop is
/// asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlcInputs {
    /// Channel 0: field-wide emergency stop.
    pub field_estop: bool,
    /// Channel 1: red station 1 e-stop.
    pub red_estop_1: bool,
    /// Channel 2: red station 2 e-stop.
    pub red_estop_2: bool,
    /// Channel 3: red station 3 e-stop.
    pub red_estop_3: bool,
    /// Channel 4: blue station 1 e-stop.
    pub blue_estop_1: bool,
    /// Channel 5: blue station 2 e-stop.
    pub blue_estop_2: bool,
    /// Channel 6: blue station 3 e-stop.
    pub blue_estop_3: bool,
}

impl PlcInputs {
    /// Decode from a discrete-input read. Missing bits decode as false.
    #[must_use]
    pub fn from_bits(bits: &[bool]) -> Self {
        let bit = |i: usize| bits.get(i).copied().unwrap_or(false);
        Self {
            field_estop: bit(0),
            red_estop_1: bit(1),
            red_estop_2: bit(2),
            red_estop_3: bit(3),
            blue_estop_1: bit(4),
            blue_estop_2: bit(5),
            blue_estop_3: bit(6),
        }
    }

    /// Encode back to the channel layout.
    #[must_use]
    pub fn to_bits(self) -> [bool; INPUT_COUNT as usize] {
        [
            self.field_estop,
            self.red_estop_1,
            self.red_estop_2,
            self.red_estop_3,
            self.blue_estop_1,
            self.blue_estop_2,
            self.blue_estop_3,
        ]
    }

    /// E-stop state by station index.
    ///
    /// Stations 0-2 are red 1-3, stations 3-5 are blue 1-3, and 99 is the
    /// field-wide e-stop. Anything else returns `None`.
    #[must_use]
    pub fn estop(&self, station: u8) -> Option<bool> {
        match station {
            0 => Some(self.red_estop_1),
            1 => Some(self.red_estop_2),
            2 => Some(self.red_estop_3),
            3 => Some(self.blue_estop_1),
            4 => Some(self.blue_estop_2),
            5 => Some(self.blue_estop_3),
            99 => Some(self.field_estop),
            _ => None,
        }
    }
}

/// Output coil table written back to the PLC.
///
/// Coil layout: 0 watchdog heartbeat, 1 match-start pulse, 2-7 station
/// connection indicators, 8-13 station bypass flags, 14-18 the field
/// stack light channels (blue, red, orange, green, buzzer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct PlcOutputCoils {
    pub heartbeat: bool,
    pub match_start: bool,
    pub red_one_conn: bool,
    pub red_two_conn: bool,
    pub red_three_conn: bool,
    pub blue_one_conn: bool,
    pub blue_two_conn: bool,
    pub blue_three_conn: bool,
    pub red_one_bypass: bool,
    pub red_two_bypass: bool,
    pub red_three_bypass: bool,
    pub blue_one_bypass: bool,
    pub blue_two_bypass: bool,
    pub blue_three_bypass: bool,
    pub stack_light_blue: bool,
    pub stack_light_red: bool,
    pub stack_light_orange: bool,
    pub stack_light_green: bool,
    pub stack_light_buzzer: bool,
}

impl PlcOutputCoils {
    /// Decode from a coil read. Missing bits decode as false.
    #[must_use]
    pub fn from_bits(bits: &[bool]) -> Self {
        let bit = |i: usize| bits.get(i).copied().unwrap_or(false);
        Self {
            heartbeat: bit(0),
            match_start: bit(1),
            red_one_conn: bit(2),
            red_two_conn: bit(3),
            red_three_conn: bit(4),
            blue_one_conn: bit(5),
            blue_two_conn: bit(6),
            blue_three_conn: bit(7),
            red_one_bypass: bit(8),
            red_two_bypass: bit(9),
            red_three_bypass: bit(10),
            blue_one_bypass: bit(11),
            blue_two_bypass: bit(12),
            blue_three_bypass: bit(13),
            stack_light_blue: bit(14),
            stack_light_red: bit(15),
            stack_light_orange: bit(16),
            stack_light_green: bit(17),
            stack_light_buzzer: bit(18),
        }
    }

    /// Encode to the coil layout for a multiple-coil write.
    #[must_use]
    pub fn to_bits(self) -> [bool; COIL_COUNT as usize] {
        [
            self.heartbeat,
            self.match_start,
            self.red_one_conn,
            self.red_two_conn,
            self.red_three_conn,
            self.blue_one_conn,
            self.blue_two_conn,
            self.blue_three_conn,
            self.red_one_bypass,
            self.red_two_bypass,
            self.red_three_bypass,
            self.blue_one_bypass,
            self.blue_two_bypass,
            self.blue_three_bypass,
            self.stack_light_blue,
            self.stack_light_red,
            self.stack_light_orange,
            self.stack_light_green,
            self.stack_light_buzzer,
        ]
    }

    /// Station connection flag by index (0-2 red, 3-5 blue).
    pub fn set_station_conn(&mut self, station: u8, connected: bool) {
        match station {
            0 => self.red_one_conn = connected,
            1 => self.red_two_conn = connected,
            2 => self.red_three_conn = connected,
            3 => self.blue_one_conn = connected,
            4 => self.blue_two_conn = connected,
            5 => self.blue_three_conn = connected,
            _ => {}
        }
    }

    /// Station bypass flag by index (0-2 red, 3-5 blue).
    pub fn set_station_bypass(&mut self, station: u8, bypassed: bool) {
        match station {
            0 => self.red_one_bypass = bypassed,
            1 => self.red_two_bypass = bypassed,
            2 => self.red_three_bypass = bypassed,
            3 => self.blue_one_bypass = bypassed,
            4 => self.blue_two_bypass = bypassed,
            5 => self.blue_three_bypass = bypassed,
            _ => {}
        }
    }

    /// True when every station is either connected or bypassed.
    #[must_use]
    pub fn all_stations_ready(&self) -> bool {
        (self.red_one_conn || self.red_one_bypass)
            && (self.red_two_conn || self.red_two_bypass)
            && (self.red_three_conn || self.red_three_bypass)
            && (self.blue_one_conn || self.blue_one_bypass)
            && (self.blue_two_conn || self.blue_two_bypass)
            && (self.blue_three_conn || self.blue_three_bypass)
    }
}

/// Aggregate PLC state held by the supervisor.
///
/// The `old_*` images are the last confirmed-on-the-wire copies and are
/// used only for diffing; they advance only after a successful read or
/// write.
#[derive(Debug, Clone)]
pub struct PlcStatus {
    /// PLC network address (host or host:port).
    pub address: String,
    /// Most recently decoded discrete inputs.
    pub inputs: PlcInputs,
    /// Last inputs for which change events were emitted.
    pub old_inputs: PlcInputs,
    /// Desired output coil image.
    pub coils: PlcOutputCoils,
    /// Last coil image confirmed written.
    pub old_coils: PlcOutputCoils,
    /// Most recently read holding registers.
    pub registers: Vec<u16>,
    /// True while the Modbus link is believed good.
    pub is_healthy: bool,
}

impl Default for PlcStatus {
    fn default() -> Self {
        Self {
            address: DEFAULT_PLC_ADDRESS.to_owned(),
            inputs: PlcInputs::default(),
            old_inputs: PlcInputs::default(),
            coils: PlcOutputCoils::default(),
            old_coils: PlcOutputCoils::default(),
            registers: vec![0; REGISTER_COUNT as usize],
            is_healthy: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inputs_round_trip() {
        let inputs = PlcInputs {
            field_estop: true,
            red_estop_2: true,
            blue_estop_3: true,
            ..PlcInputs::default()
        };
        assert_eq!(PlcInputs::from_bits(&inputs.to_bits()), inputs);
    }

    #[test]
    fn test_inputs_channel_assignment() {
        let mut bits = [false; INPUT_COUNT as usize];
        bits[0] = true;
        bits[4] = true;
        let inputs = PlcInputs::from_bits(&bits);
        assert!(inputs.field_estop);
        assert!(inputs.blue_estop_1);
        assert!(!inputs.red_estop_1);
    }

    #[test]
    fn test_inputs_short_read_decodes_missing_as_false() {
        let inputs = PlcInputs::from_bits(&[true, true]);
        assert!(inputs.field_estop);
        assert!(inputs.red_estop_1);
        assert!(!inputs.blue_estop_3);
    }

    #[test]
    fn test_coils_round_trip() {
        let coils = PlcOutputCoils {
            heartbeat: true,
            match_start: true,
            blue_two_conn: true,
            red_three_bypass: true,
            stack_light_green: true,
            stack_light_buzzer: true,
            ..PlcOutputCoils::default()
        };
        assert_eq!(PlcOutputCoils::from_bits(&coils.to_bits()), coils);
    }

    #[test]
    fn test_coil_index_assignment() {
        let mut coils = PlcOutputCoils::default();
        coils.heartbeat = true;
        coils.stack_light_blue = true;
        coils.stack_light_buzzer = true;
        let bits = coils.to_bits();
        assert!(bits[0]);
        assert!(bits[14]);
        assert!(bits[18]);
        assert_eq!(bits.iter().filter(|b| **b).count(), 3);
    }

    #[test]
    fn test_estop_station_mapping() {
        let inputs = PlcInputs {
            red_estop_1: true,
            blue_estop_2: true,
            field_estop: true,
            ..PlcInputs::default()
        };
        assert_eq!(inputs.estop(0), Some(true));
        assert_eq!(inputs.estop(1), Some(false));
        assert_eq!(inputs.estop(4), Some(true));
        assert_eq!(inputs.estop(99), Some(true));
        assert_eq!(inputs.estop(6), None);
        assert_eq!(inputs.estop(42), None);
    }

    #[test]
    fn test_all_stations_ready_mixes_conn_and_bypass() {
        let mut coils = PlcOutputCoils::default();
        assert!(!coils.all_stations_ready());

        for station in 0..3 {
            coils.set_station_conn(station, true);
        }
        for station in 3..6 {
            coils.set_station_bypass(station, true);
        }
        assert!(coils.all_stations_ready());

        coils.set_station_bypass(4, false);
        assert!(!coils.all_stations_ready());
    }

    #[test]
    fn test_out_of_range_station_is_ignored() {
        let mut coils = PlcOutputCoils::default();
        coils.set_station_conn(6, true);
        coils.set_station_bypass(99, true);
        assert_eq!(coils, PlcOutputCoils::default());
    }

    #[test]
    fn test_status_defaults() {
        let status = PlcStatus::default();
        assert_eq!(status.address, DEFAULT_PLC_ADDRESS);
        assert_eq!(status.registers.len(), REGISTER_COUNT as usize);
        assert!(!status.is_healthy);
    }
}
