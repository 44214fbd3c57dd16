//! Signal domain types.
//!
//! A signal is a durably stored trigger derived from an automation. The
//! payload enum carries the kind discriminator on the wire so rows in the
//! store round-trip as a single JSON column.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind-specific trigger payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SignalData {
    /// Standard 5-field cron expression, evaluated in the configured timezone.
    Cron { expr: String },

    /// Fires when any listed entity's new state matches the regex.
    /// Matching is unanchored: the pattern may match any substring.
    State {
        entity_ids: Vec<String>,
        regex: String,
    },

    /// Fires at `anchor + offset`, then every `offset` thereafter when
    /// `repeat_forever` is set.
    Offset {
        offset_seconds: i64,
        repeat_forever: bool,
        anchor: DateTime<Utc>,
    },

    /// Fires once at the absolute instant.
    Time { at: DateTime<Utc> },

    /// Fires when the numeric state has stayed within `[min, max]`
    /// continuously for at least `for_seconds`. Re-arms when the state
    /// leaves the range.
    StateRange {
        entity_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        for_seconds: i64,
    },
}

impl SignalData {
    /// The kind discriminator as stored in the `kind` column.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalData::Cron { .. } => "cron",
            SignalData::State { .. } => "state",
            SignalData::Offset { .. } => "offset",
            SignalData::Time { .. } => "time",
            SignalData::StateRange { .. } => "state-range",
        }
    }

    /// One-shot signals die atomically with the log row for their firing.
    pub fn is_one_shot(&self) -> bool {
        match self {
            SignalData::Time { .. } => true,
            SignalData::Offset { repeat_forever, .. } => !repeat_forever,
            _ => false,
        }
    }

    /// Short human-readable description, used by the trigger-listing tool.
    pub fn describe(&self) -> String {
        match self {
            SignalData::Cron { expr } => format!("cron `{expr}`"),
            SignalData::State { entity_ids, regex } => {
                format!("state of [{}] matching /{regex}/", entity_ids.join(", "))
            }
            SignalData::Offset {
                offset_seconds,
                repeat_forever,
                anchor,
            } => {
                let repeat = if *repeat_forever { ", repeating" } else { "" };
                format!("{offset_seconds}s after {}{repeat}", anchor.to_rfc3339())
            }
            SignalData::Time { at } => format!("once at {}", at.to_rfc3339()),
            SignalData::StateRange {
                entity_id,
                min,
                max,
                for_seconds,
            } => {
                let lo = min.map_or("-inf".to_string(), |v| v.to_string());
                let hi = max.map_or("+inf".to_string(), |v| v.to_string());
                format!("{entity_id} within [{lo}, {hi}] for {for_seconds}s")
            }
        }
    }
}

/// A persisted signal row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: i64,
    pub automation_hash: String,
    pub data: SignalData,
    pub is_dead: bool,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    pub fn is_one_shot(&self) -> bool {
        self.data.is_one_shot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_discriminators() {
        let cron = SignalData::Cron {
            expr: "0 7 * * *".into(),
        };
        assert_eq!(cron.kind(), "cron");
        assert!(!cron.is_one_shot());

        let range = SignalData::StateRange {
            entity_id: "climate.bedroom".into(),
            min: Some(18.0),
            max: None,
            for_seconds: 300,
        };
        assert_eq!(range.kind(), "state-range");
    }

    #[test]
    fn one_shot_classification() {
        let time = SignalData::Time { at: Utc::now() };
        assert!(time.is_one_shot());

        let once = SignalData::Offset {
            offset_seconds: 60,
            repeat_forever: false,
            anchor: Utc::now(),
        };
        assert!(once.is_one_shot());

        let repeating = SignalData::Offset {
            offset_seconds: 60,
            repeat_forever: true,
            anchor: Utc::now(),
        };
        assert!(!repeating.is_one_shot());
    }

    #[test]
    fn payload_roundtrip_all_kinds() {
        let samples = vec![
            SignalData::Cron {
                expr: "*/5 * * * *".into(),
            },
            SignalData::State {
                entity_ids: vec!["binary_sensor.front_door".into()],
                regex: "open".into(),
            },
            SignalData::Offset {
                offset_seconds: 3600,
                repeat_forever: true,
                anchor: Utc::now(),
            },
            SignalData::Time { at: Utc::now() },
            SignalData::StateRange {
                entity_id: "sensor.humidity".into(),
                min: Some(40.0),
                max: Some(60.0),
                for_seconds: 120,
            },
        ];
        for data in samples {
            let json = serde_json::to_string(&data).unwrap();
            let back: SignalData = serde_json::from_str(&json).unwrap();
            assert_eq!(back, data);
        }
    }

    #[test]
    fn kebab_case_kind_tag() {
        let data = SignalData::StateRange {
            entity_id: "sensor.x".into(),
            min: None,
            max: Some(1.0),
            for_seconds: 10,
        };
        let json = serde_json::to_string(&data).unwrap();
        assert!(json.contains("\"kind\":\"state-range\""));
    }
}
