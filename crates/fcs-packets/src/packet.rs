//! Field control packet envelopes and the status-snapshot merge law.
//!
//! The generic envelope lets init packets and update packets share one
//! shape while carrying different per-device parameter types. Wire names
//! are camelCase to match the JSON the browser-side collaborators consume.
//!
//! Init packets must enumerate every port and segment that will ever be
//! touched; update packets are sparse and must only reference ports and
//! segments the most recent init packet declared.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Motor parameters in an update packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotorUpdate {
    /// On-board motor port.
    pub port: u8,
    /// Commanded setpoint in [-1.0, 1.0].
    pub setpoint: f64,
}

/// Servo parameters in an update packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServoUpdate {
    /// Servo / aux-driver port.
    pub port: u8,
    /// Commanded pulse width in microseconds.
    pub pulse_width: u32,
}

/// Servo parameters in an init packet; adds the PWM frame period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServoInit {
    /// Servo / aux-driver port.
    pub port: u8,
    /// Rest pulse width in microseconds.
    pub pulse_width: u32,
    /// PWM frame period in microseconds.
    pub frame_period: u32,
}

/// Trigger configuration for one hub digital input channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigitalTrigger {
    /// Fire on a falling level instead of a rising one.
    pub trigger_on_low: bool,
    /// Update packet broadcast when the trigger fires.
    pub update_to_send: FieldControlUpdatePacket,
}

/// Digital input parameters; a `None` trigger disables the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigitalInputUpdate {
    /// Hub digital input channel.
    pub channel: u8,
    /// Trigger configuration, or `None` to disable.
    pub trigger: Option<DigitalTrigger>,
}

/// Per-hub parameters of an init packet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubInit {
    /// Motor rest states.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub motors: Vec<MotorUpdate>,
    /// Servo rest states with frame periods.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servos: Vec<ServoInit>,
    /// Digital input channel baselines.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub digital_inputs: Vec<DigitalInputUpdate>,
}

/// Per-hub parameters of an update packet. Sparse: only changed ports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubUpdate {
    /// Motors whose setpoint changed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub motors: Vec<MotorUpdate>,
    /// Servos whose pulse width changed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servos: Vec<ServoUpdate>,
    /// Digital input channels whose trigger changed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub digital_inputs: Vec<DigitalInputUpdate>,
}

/// One contiguous run of LED pixels, addressed `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedSegment {
    /// First pixel index.
    pub start: u16,
    /// One past the last pixel index.
    pub stop: u16,
}

/// A color assignment to a set of segments on one controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedPattern {
    /// Hex color, e.g. `"00ff00"`.
    pub color: String,
    /// Segment indices the color applies to.
    pub target_segments: Vec<u8>,
}

/// LED controller parameters in an init packet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WledInitParameters {
    /// Controller network address; empty means intentionally absent.
    pub address: String,
    /// Full segment layout of the controller.
    pub segments: Vec<LedSegment>,
}

/// LED controller parameters in an update packet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WledUpdateParameters {
    /// Pattern assignments, applied in order.
    pub patterns: Vec<LedPattern>,
}

impl WledUpdateParameters {
    /// Merge `update` into this retained state.
    ///
    /// Any retained pattern targeting the same segment set as an incoming
    /// pattern is removed and replaced; other patterns are preserved.
    pub fn merge(&mut self, update: &WledUpdateParameters) {
        for new_pattern in &update.patterns {
            self.patterns
                .retain(|old| old.target_segments != new_pattern.target_segments);
            self.patterns.push(new_pattern.clone());
        }
    }
}

/// Generic field control packet envelope.
///
/// `hubs` is keyed by hub bus id, `wleds` by controller name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldControlPacket<H, W> {
    /// Per-hub parameters.
    pub hubs: BTreeMap<u8, H>,
    /// Per-LED-controller parameters.
    pub wleds: BTreeMap<String, W>,
}

impl<H, W> Default for FieldControlPacket<H, W> {
    fn default() -> Self {
        Self {
            hubs: BTreeMap::new(),
            wleds: BTreeMap::new(),
        }
    }
}

/// Full-state packet sent once per controller connection.
pub type FieldControlInitPacket = FieldControlPacket<HubInit, WledInitParameters>;

/// Sparse packet describing only changed ports and segments.
pub type FieldControlUpdatePacket = FieldControlPacket<HubUpdate, WledUpdateParameters>;

impl FieldControlUpdatePacket {
    /// Merge `update` into this snapshot using last-writer-wins semantics.
    ///
    /// Keys are the physical port (motors, servos), channel (digital
    /// inputs), and segment-set identity (LED patterns). An incoming entry
    /// removes and replaces any retained entry with the same key; entries
    /// the update does not touch are preserved.
    pub fn merge(&mut self, update: &FieldControlUpdatePacket) {
        for (hub_id, new_hub) in &update.hubs {
            let retained = self.hubs.entry(*hub_id).or_default();

            for motor in &new_hub.motors {
                retained.motors.retain(|old| old.port != motor.port);
                retained.motors.push(motor.clone());
            }

            for servo in &new_hub.servos {
                retained.servos.retain(|old| old.port != servo.port);
                retained.servos.push(servo.clone());
            }

            for input in &new_hub.digital_inputs {
                retained
                    .digital_inputs
                    .retain(|old| old.channel != input.channel);
                retained.digital_inputs.push(input.clone());
            }
        }

        for (name, new_wled) in &update.wleds {
            self.wleds.entry(name.clone()).or_default().merge(new_wled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motor_update(hub: u8, port: u8, setpoint: f64) -> FieldControlUpdatePacket {
        let mut packet = FieldControlUpdatePacket::default();
        packet
            .hubs
            .entry(hub)
            .or_default()
            .motors
            .push(MotorUpdate { port, setpoint });
        packet
    }

    #[test]
    fn test_merge_replaces_same_port() {
        let mut snapshot = FieldControlUpdatePacket::default();
        snapshot.merge(&motor_update(0, 2, 1.0));
        snapshot.merge(&motor_update(0, 2, -0.5));

        let hub = &snapshot.hubs[&0];
        assert_eq!(hub.motors.len(), 1);
        assert_eq!(hub.motors[0].port, 2);
        assert!((hub.motors[0].setpoint - (-0.5)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_merge_preserves_untouched_ports() {
        let mut snapshot = FieldControlUpdatePacket::default();
        snapshot.merge(&motor_update(0, 1, 0.25));
        snapshot.merge(&motor_update(0, 2, 0.75));

        let hub = &snapshot.hubs[&0];
        assert_eq!(hub.motors.len(), 2);
        let port1 = hub.motors.iter().find(|m| m.port == 1).unwrap();
        assert!((port1.setpoint - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_merge_keeps_hubs_separate() {
        let mut snapshot = FieldControlUpdatePacket::default();
        snapshot.merge(&motor_update(0, 0, 1.0));
        snapshot.merge(&motor_update(3, 0, -1.0));

        assert_eq!(snapshot.hubs.len(), 2);
        assert!((snapshot.hubs[&0].motors[0].setpoint - 1.0).abs() < f64::EPSILON);
        assert!((snapshot.hubs[&3].motors[0].setpoint - (-1.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_wled_merge_replaces_by_segment_set() {
        let mut retained = WledUpdateParameters {
            patterns: vec![
                LedPattern {
                    color: String::from("ff0000"),
                    target_segments: vec![0, 1, 2],
                },
                LedPattern {
                    color: String::from("0000ff"),
                    target_segments: vec![3],
                },
            ],
        };

        retained.merge(&WledUpdateParameters {
            patterns: vec![LedPattern {
                color: String::from("00ff00"),
                target_segments: vec![0, 1, 2],
            }],
        });

        assert_eq!(retained.patterns.len(), 2);
        let goal = retained
            .patterns
            .iter()
            .find(|p| p.target_segments == vec![0, 1, 2])
            .unwrap();
        assert_eq!(goal.color, "00ff00");
        assert!(retained
            .patterns
            .iter()
            .any(|p| p.target_segments == vec![3] && p.color == "0000ff"));
    }

    #[test]
    fn test_merge_replaces_servos_and_inputs_by_key() {
        let mut snapshot = FieldControlUpdatePacket::default();

        let mut first = FieldControlUpdatePacket::default();
        {
            let hub = first.hubs.entry(1).or_default();
            hub.servos.push(ServoUpdate {
                port: 4,
                pulse_width: 1500,
            });
            hub.digital_inputs.push(DigitalInputUpdate {
                channel: 0,
                trigger: None,
            });
        }
        snapshot.merge(&first);

        let mut second = FieldControlUpdatePacket::default();
        {
            let hub = second.hubs.entry(1).or_default();
            hub.servos.push(ServoUpdate {
                port: 4,
                pulse_width: 2000,
            });
            hub.digital_inputs.push(DigitalInputUpdate {
                channel: 0,
                trigger: Some(DigitalTrigger {
                    trigger_on_low: true,
                    update_to_send: FieldControlUpdatePacket::default(),
                }),
            });
        }
        snapshot.merge(&second);

        let hub = &snapshot.hubs[&1];
        assert_eq!(hub.servos.len(), 1);
        assert_eq!(hub.servos[0].pulse_width, 2000);
        assert_eq!(hub.digital_inputs.len(), 1);
        assert!(hub.digital_inputs[0].trigger.is_some());
    }

    #[test]
    fn test_wire_names_are_camel_case() {
        let packet = motor_update(0, 1, 0.5);
        let json = serde_json::to_string(&packet).unwrap();
        assert!(json.contains("\"hubs\""));
        assert!(json.contains("\"setpoint\""));

        let servo = ServoInit {
            port: 4,
            pulse_width: 1500,
            frame_period: 20000,
        };
        let json = serde_json::to_string(&servo).unwrap();
        assert!(json.contains("\"pulseWidth\""));
        assert!(json.contains("\"framePeriod\""));
    }
}
