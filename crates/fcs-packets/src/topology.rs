//! Static hardware topology of the field.
//!
//! Describes which physical actuator and LED segment lives on which hub,
//! controller, and port. Pure data, defined once at startup and never
//! mutated; the packet compiler is its only consumer.

use serde::{Deserialize, Serialize};

/// Actuator hubs installed on the field, with their bus ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Hub {
    /// Hub under the red alliance wall.
    RedControl = 0,
    /// Secondary hub in the center structure.
    CenterExpansion = 1,
    /// Primary hub in the center structure.
    CenterControl = 2,
    /// Hub under the blue alliance wall.
    BlueControl = 3,
}

impl Hub {
    /// Bus id of the hub, used as the packet map key.
    #[must_use]
    pub fn id(self) -> u8 {
        self as u8
    }
}

/// The three addressable LED controllers on the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WledControllerId {
    /// Controller driving the center structure strips.
    Center,
    /// Controller driving the red alliance goal strip.
    Red,
    /// Controller driving the blue alliance goal strip.
    Blue,
}

impl WledControllerId {
    /// Stable string key used in packet maps and configuration.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Center => "center",
            Self::Red => "red",
            Self::Blue => "blue",
        }
    }
}

/// Kind of port an actuator is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MotorPortType {
    /// Hub-native motor port, driven by setpoint.
    OnBoard,
    /// Auxiliary PWM driver on a servo port, driven by pulse width.
    AuxDriver,
}

/// A named run of LED segments on one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedStrip {
    /// Controller the strip is wired to.
    pub controller: WledControllerId,
    /// Segment indices on that controller, in layout order.
    pub segments: &'static [u8],
}

impl LedStrip {
    /// Red alliance nexus goal strip (red controller, segments 0-5).
    pub const RED_NEXUS_GOAL: LedStrip = LedStrip {
        controller: WledControllerId::Red,
        segments: &[0, 1, 2, 3, 4, 5],
    };

    /// Blue alliance nexus goal strip (blue controller, segments 0-5).
    pub const BLUE_NEXUS_GOAL: LedStrip = LedStrip {
        controller: WledControllerId::Blue,
        segments: &[0, 1, 2, 3, 4, 5],
    };

    /// Red-side center goals (center controller, segments 0-5).
    pub const RED_CENTER_NEXUS_GOAL: LedStrip = LedStrip {
        controller: WledControllerId::Center,
        segments: &[0, 1, 2, 3, 4, 5],
    };

    /// Blue-side center goals (center controller, segments 6-11).
    pub const BLUE_CENTER_NEXUS_GOAL: LedStrip = LedStrip {
        controller: WledControllerId::Center,
        segments: &[6, 7, 8, 9, 10, 11],
    };

    /// Center ramp (center controller, segment 12).
    pub const RAMP: LedStrip = LedStrip {
        controller: WledControllerId::Center,
        segments: &[12],
    };

    /// Every strip associated with the red alliance.
    pub const ALL_RED_STRIPS: [LedStrip; 2] =
        [Self::RED_NEXUS_GOAL, Self::RED_CENTER_NEXUS_GOAL];

    /// Every strip associated with the blue alliance.
    pub const ALL_BLUE_STRIPS: [LedStrip; 2] =
        [Self::BLUE_NEXUS_GOAL, Self::BLUE_CENTER_NEXUS_GOAL];

    /// Every nexus goal strip on the field.
    pub const ALL_NEXUS_GOALS: [LedStrip; 4] = [
        Self::RED_NEXUS_GOAL,
        Self::RED_CENTER_NEXUS_GOAL,
        Self::BLUE_NEXUS_GOAL,
        Self::BLUE_CENTER_NEXUS_GOAL,
    ];

    /// Every strip on the field.
    pub const ALL_STRIPS: [LedStrip; 5] = [
        Self::RED_NEXUS_GOAL,
        Self::RED_CENTER_NEXUS_GOAL,
        Self::BLUE_NEXUS_GOAL,
        Self::BLUE_CENTER_NEXUS_GOAL,
        Self::RAMP,
    ];
}

/// A single actuator: one port on one hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Motor {
    /// Hub the actuator is wired to.
    pub hub: Hub,
    /// Port kind on that hub.
    pub port_type: MotorPortType,
    /// Port number.
    pub port: u8,
}

/// One hub's goal bank: four on-board motors then two aux-driver ports.
const fn goal_bank(hub: Hub) -> [Motor; 6] {
    [
        Motor { hub, port_type: MotorPortType::OnBoard, port: 0 },
        Motor { hub, port_type: MotorPortType::OnBoard, port: 1 },
        Motor { hub, port_type: MotorPortType::OnBoard, port: 2 },
        Motor { hub, port_type: MotorPortType::OnBoard, port: 3 },
        Motor { hub, port_type: MotorPortType::AuxDriver, port: 4 },
        Motor { hub, port_type: MotorPortType::AuxDriver, port: 5 },
    ]
}

impl Motor {
    /// Red alliance nexus goal actuators.
    pub const RED_NEXUS_GOALS: [Motor; 6] = goal_bank(Hub::RedControl);

    /// Blue alliance nexus goal actuators.
    pub const BLUE_NEXUS_GOALS: [Motor; 6] = goal_bank(Hub::BlueControl);

    /// Red-side center goal actuators.
    pub const RED_CENTER_NEXUS_GOALS: [Motor; 6] = goal_bank(Hub::CenterControl);

    /// Blue-side center goal actuators.
    pub const BLUE_CENTER_NEXUS_GOALS: [Motor; 6] = goal_bank(Hub::CenterExpansion);

    /// Every goal actuator on the field, across all four hubs.
    #[must_use]
    pub fn all_goals() -> Vec<Motor> {
        let mut motors = Vec::with_capacity(24);
        motors.extend_from_slice(&Self::RED_NEXUS_GOALS);
        motors.extend_from_slice(&Self::BLUE_NEXUS_GOALS);
        motors.extend_from_slice(&Self::RED_CENTER_NEXUS_GOALS);
        motors.extend_from_slice(&Self::BLUE_CENTER_NEXUS_GOALS);
        motors
    }
}
