//! The in-process alert object consumed by the pipeline.
//!
//! VOEvent parsing happens upstream; by the time an [`Event`] reaches this
//! crate it already carries its identity, timing, optional coordinates, an
//! optional (lazily fetchable) skymap and the resolved strategy document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::grid::SkyMap;

/// Classification of an incoming notice.
///
/// `GwRetraction` is special: it cancels a previous gravitational-wave alert
/// and must never produce observation requests of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// Gravitational-wave detection (LVC preliminary/initial/update notices)
    Gw,
    /// Retraction of a previous gravitational-wave alert
    GwRetraction,
    /// Gamma-ray burst (Fermi, Swift)
    Grb,
    /// Anything else that made it through the upstream filter
    Unknown,
}

impl EventType {
    /// The string stored in the database `event_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Gw => "GW",
            EventType::GwRetraction => "GW_RETRACTION",
            EventType::Grb => "GRB",
            EventType::Unknown => "UNKNOWN",
        }
    }

    /// Parse the database representation back into the enum.
    pub fn parse(s: &str) -> Self {
        match s {
            "GW" => EventType::Gw,
            "GW_RETRACTION" => EventType::GwRetraction,
            "GRB" => EventType::Grb,
            _ => EventType::Unknown,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An equatorial sky position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquatorialCoord {
    pub ra_deg: f64,
    pub dec_deg: f64,
}

/// A single parsed transient alert.
///
/// Identity for deduplication is the `(name, source)` pair; the `ivorn` is
/// globally unique per notice and guards against ingesting the same notice
/// twice.
#[derive(Debug, Clone)]
pub struct Event {
    /// Our event name, e.g. `LVC_S190510g` or `Fermi_579943502`
    pub name: String,
    /// The notice identifier (`ivo://authority/resource#local_id`)
    pub ivorn: String,
    /// Originating observatory network, e.g. `LVC`, `Fermi`, `Swift`
    pub source: String,
    /// Notice classification
    pub event_type: EventType,
    /// Event time from the notice
    pub time: DateTime<Utc>,
    /// Best-guess position, present for well-localised events (GRBs)
    pub coord: Option<EquatorialCoord>,
    /// Where the skymap can be fetched from, when one exists
    pub skymap_url: Option<String>,
    /// The skymap itself, if already downloaded
    pub skymap: Option<SkyMap>,
    /// Nested strategy document resolved by the upstream strategy tables.
    /// Deserialized into a typed [`super::ObservingStrategy`] when the plan
    /// is derived.
    pub strategy: serde_json::Value,
}

impl Event {
    /// True when this notice is a retraction and must not be scheduled.
    pub fn is_retraction(&self) -> bool {
        self.event_type == EventType::GwRetraction
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(ivorn={})", self.name, self.ivorn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trip() {
        for ty in [
            EventType::Gw,
            EventType::GwRetraction,
            EventType::Grb,
            EventType::Unknown,
        ] {
            assert_eq!(EventType::parse(ty.as_str()), ty);
        }
    }

    #[test]
    fn test_unrecognised_event_type_is_unknown() {
        assert_eq!(EventType::parse("NEUTRINO"), EventType::Unknown);
    }
}
