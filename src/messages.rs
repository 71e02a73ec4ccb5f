// Messages exchanged over zenoh

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::robot::{Channel, ChannelAngles};

/// Servo outputs of one control tick, published on `hexapod/rt/angles`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleSnapshot {
    pub seq: u64,
    /// Seconds since the controller started
    pub t: f64,
    /// Channel name (e.g. "L1_coxa") -> degrees
    pub angles: BTreeMap<String, f64>,
}

impl AngleSnapshot {
    pub fn new(seq: u64, t: f64, angles: &ChannelAngles) -> Self {
        Self {
            seq,
            t,
            angles: angles.to_named(),
        }
    }

    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Known channels with their values, plus the names that matched no channel
    pub fn channels(&self) -> (Vec<(Channel, f64)>, Vec<String>) {
        let mut known = Vec::with_capacity(self.angles.len());
        let mut unknown = Vec::new();
        for (name, &value) in &self.angles {
            match name.parse::<Channel>() {
                Ok(channel) => known.push((channel, value)),
                Err(_) => unknown.push(name.clone()),
            }
        }
        (known, unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::{Joint, LegId};

    #[test]
    fn test_snapshot_json_shape() {
        let mut angles = ChannelAngles::splat(90.0);
        angles.set(Channel::new(LegId::R1, Joint::Tibia), 42.5);
        let json = AngleSnapshot::new(7, 0.25, &angles).to_json().unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["seq"], 7);
        assert_eq!(value["t"], 0.25);
        assert_eq!(value["angles"]["R1_tibia"], 42.5);
        assert_eq!(value["angles"].as_object().unwrap().len(), 18);
    }

    #[test]
    fn test_integer_angles_are_accepted() {
        let snapshot =
            AngleSnapshot::from_json(br#"{"seq": 1, "t": 0, "angles": {"L1_coxa": 90}}"#).unwrap();
        assert_eq!(snapshot.angles["L1_coxa"], 90.0);
        assert_eq!(snapshot.t, 0.0);
    }

    #[test]
    fn test_unknown_channel_names_are_reported() {
        let snapshot = AngleSnapshot::from_json(
            br#"{"seq": 3, "t": 1.5, "angles": {"L1_coxa": 10.0, "L4_coxa": 20.0, "tail": 1}}"#,
        )
        .unwrap();
        let (known, unknown) = snapshot.channels();
        assert_eq!(known, vec![(Channel::new(LegId::L1, Joint::Coxa), 10.0)]);
        assert_eq!(unknown, vec!["L4_coxa".to_string(), "tail".to_string()]);
    }

    #[test]
    fn test_malformed_payload_is_rejected() {
        assert!(AngleSnapshot::from_json(b"not json").is_err());
        assert!(AngleSnapshot::from_json(br#"{"seq": 1, "angles": {}}"#).is_err());
        assert!(AngleSnapshot::from_json(br#"{"seq": 1, "t": 0.0, "angles": {"L1_coxa": "x"}}"#).is_err());
    }
}
