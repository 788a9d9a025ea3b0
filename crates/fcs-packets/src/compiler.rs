//! Packet compiler: turns `FieldOptions` into the named packet set.
//!
//! Compilation is pure and deterministic. Every builder starts from an
//! empty packet, so no state leaks between compilations or between the
//! named packets of one set. There is no failure path: degenerate options
//! (zero lengths, empty colors) compile to packets with no effect.

use crate::packet::{
    FieldControlInitPacket, FieldControlUpdatePacket, LedPattern, LedSegment, MotorUpdate,
    ServoInit, ServoUpdate, WledInitParameters,
};
use crate::topology::{LedStrip, Motor, MotorPortType, WledControllerId};
use fcs_common::FieldOptions;

/// Servo rest pulse width in microseconds.
pub const SERVO_NEUTRAL_PULSE_WIDTH: u32 = 1500;

/// Servo PWM frame period in microseconds, declared once in the init packet.
pub const SERVO_FRAME_PERIOD: u32 = 20000;

/// The complete named packet set compiled from one `FieldOptions`.
#[derive(Debug, Clone, PartialEq)]
pub struct FcsPackets {
    /// Full-state packet sent once per controller connection.
    pub init: FieldControlInitPacket,
    /// All strips to the fault color.
    pub field_fault: FieldControlUpdatePacket,
    /// All strips to the prepare color, all goals stopped.
    pub prepare_field: FieldControlUpdatePacket,
    /// All strips dark for the start of a match.
    pub match_start: FieldControlUpdatePacket,
    /// Endgame transition (no season-specific effect).
    pub endgame: FieldControlUpdatePacket,
    /// Alliance colors on the goals, ramp color, all goals stopped.
    pub match_end: FieldControlUpdatePacket,
    /// All-clear color, goals running the reset setpoint.
    pub all_clear: FieldControlUpdatePacket,
}

impl FcsPackets {
    /// Compile the named packet set from field options.
    #[must_use]
    pub fn compile(options: &FieldOptions) -> Self {
        Self {
            init: build_init_packet(options),
            field_fault: build_field_fault_packet(options),
            prepare_field: build_prepare_field_packet(options),
            match_start: build_match_start_packet(),
            endgame: build_endgame_packet(),
            match_end: build_match_end_packet(options),
            all_clear: build_all_clear_packet(options),
        }
    }
}

/// Derive the six contiguous goal segments for one controller.
///
/// Segment `i` covers `[i*len + offset, (i+1)*len + offset)`.
fn nexus_goal_segments(options: &FieldOptions, starting_index: u16) -> Vec<LedSegment> {
    let len = u16::from(options.goal_led_length);
    (0..6)
        .map(|i| LedSegment {
            start: i * len + starting_index,
            stop: (i + 1) * len + starting_index,
        })
        .collect()
}

/// Apply one color to every segment of the given strips.
fn apply_pattern(color: &str, strips: &[LedStrip], packet: &mut FieldControlUpdatePacket) {
    for strip in strips {
        let wled = packet
            .wleds
            .entry(strip.controller.key().to_owned())
            .or_default();
        wled.patterns.push(LedPattern {
            color: color.to_owned(),
            target_segments: strip.segments.to_vec(),
        });
    }
}

/// Apply one setpoint to every motor of the given group.
///
/// On-board ports take the setpoint directly; aux-driver ports take the
/// equivalent pulse width (`setpoint * 1000 + 1500`).
fn apply_setpoint(setpoint: f64, motors: &[Motor], packet: &mut FieldControlUpdatePacket) {
    for motor in motors {
        let hub = packet.hubs.entry(motor.hub.id()).or_default();
        match motor.port_type {
            MotorPortType::OnBoard => hub.motors.push(MotorUpdate {
                port: motor.port,
                setpoint,
            }),
            MotorPortType::AuxDriver => hub.servos.push(ServoUpdate {
                port: motor.port,
                pulse_width: (setpoint * 1000.0 + 1500.0) as u32,
            }),
        }
    }
}

/// Build the init packet.
///
/// Must enumerate the rest state of every port and segment that any update
/// packet will ever touch, so a freshly connected device starts from a
/// known baseline. Controller addresses are declared even when empty; an
/// empty address means "do not open a connection".
fn build_init_packet(options: &FieldOptions) -> FieldControlInitPacket {
    let mut packet = FieldControlInitPacket::default();

    let goal_bank_len = 6 * u16::from(options.goal_led_length);
    let mut center_segments = nexus_goal_segments(options, 0);
    center_segments.extend(nexus_goal_segments(options, goal_bank_len));
    center_segments.push(LedSegment {
        start: 2 * goal_bank_len,
        stop: 2 * goal_bank_len + u16::from(options.ramp_led_length),
    });

    packet.wleds.insert(
        WledControllerId::Center.key().to_owned(),
        WledInitParameters {
            address: options.center_wled_address.clone(),
            segments: center_segments,
        },
    );
    packet.wleds.insert(
        WledControllerId::Red.key().to_owned(),
        WledInitParameters {
            address: options.red_wled_address.clone(),
            segments: nexus_goal_segments(options, 0),
        },
    );
    packet.wleds.insert(
        WledControllerId::Blue.key().to_owned(),
        WledInitParameters {
            address: options.blue_wled_address.clone(),
            segments: nexus_goal_segments(options, 0),
        },
    );

    for motor in Motor::all_goals() {
        let hub = packet.hubs.entry(motor.hub.id()).or_default();
        match motor.port_type {
            MotorPortType::OnBoard => hub.motors.push(MotorUpdate {
                port: motor.port,
                setpoint: 0.0,
            }),
            MotorPortType::AuxDriver => hub.servos.push(ServoInit {
                port: motor.port,
                pulse_width: SERVO_NEUTRAL_PULSE_WIDTH,
                frame_period: SERVO_FRAME_PERIOD,
            }),
        }
    }

    packet
}

fn build_field_fault_packet(options: &FieldOptions) -> FieldControlUpdatePacket {
    let mut packet = FieldControlUpdatePacket::default();
    apply_pattern(&options.field_fault_color, &LedStrip::ALL_STRIPS, &mut packet);
    packet
}

fn build_prepare_field_packet(options: &FieldOptions) -> FieldControlUpdatePacket {
    let mut packet = FieldControlUpdatePacket::default();
    apply_pattern(
        &options.prepare_field_color,
        &LedStrip::ALL_STRIPS,
        &mut packet,
    );
    apply_setpoint(0.0, &Motor::all_goals(), &mut packet);
    packet
}

fn build_match_start_packet() -> FieldControlUpdatePacket {
    let mut packet = FieldControlUpdatePacket::default();
    apply_pattern("000000", &LedStrip::ALL_STRIPS, &mut packet);
    packet
}

fn build_endgame_packet() -> FieldControlUpdatePacket {
    FieldControlUpdatePacket::default()
}

fn build_match_end_packet(options: &FieldOptions) -> FieldControlUpdatePacket {
    let mut packet = FieldControlUpdatePacket::default();
    apply_pattern(
        &options.match_end_blue_nexus_goal_color,
        &LedStrip::ALL_BLUE_STRIPS,
        &mut packet,
    );
    apply_pattern(
        &options.match_end_red_nexus_goal_color,
        &LedStrip::ALL_RED_STRIPS,
        &mut packet,
    );
    apply_pattern(&options.match_end_ramp_color, &[LedStrip::RAMP], &mut packet);
    apply_setpoint(0.0, &Motor::all_goals(), &mut packet);
    packet
}

fn build_all_clear_packet(options: &FieldOptions) -> FieldControlUpdatePacket {
    let mut packet = FieldControlUpdatePacket::default();
    apply_pattern(&options.all_clear_color, &LedStrip::ALL_STRIPS, &mut packet);
    apply_setpoint(
        options.food_reset_motor_setpoint,
        &Motor::all_goals(),
        &mut packet,
    );
    packet
}
