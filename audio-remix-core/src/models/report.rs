use serde::{Deserialize, Serialize};

use super::format::AudioFormat;

/// Summary handed back to the controller when a session ends.
///
/// Serializable so front ends can emit it as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub id: String,
    pub started_at: String,
    /// Source frames consumed. Wraps at `u64::MAX`.
    pub frames: u64,
    /// Completed wait cycles.
    pub passes: u64,
    pub glitches: u64,
    pub overflow_retries: u64,
    pub source_format: Option<AudioFormat>,
    pub sink_format: Option<AudioFormat>,
}

impl SessionReport {
    /// Creates a fresh report stamped with a new id and the current time.
    pub fn begin() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            ..Self::default()
        }
    }

    /// Seconds of source audio streamed, or 0 before a format was negotiated.
    pub fn seconds_streamed(&self) -> f64 {
        match self.source_format {
            Some(format) if format.sample_rate > 0 => self.frames as f64 / format.sample_rate as f64,
            _ => 0.0,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::models::format::SampleEncoding;

    #[test]
    fn begin_stamps_id_and_time() {
        let report = SessionReport::begin();
        assert_eq!(report.id.len(), 36);
        assert!(chrono::DateTime::parse_from_rfc3339(&report.started_at).is_ok());
        assert_eq!(report.frames, 0);
    }

    #[test]
    fn seconds_streamed_uses_source_rate() {
        let report = SessionReport {
            frames: 72_000,
            source_format: Some(AudioFormat::new(1, 16, 48_000, SampleEncoding::Pcm)),
            ..SessionReport::default()
        };
        assert_relative_eq!(report.seconds_streamed(), 1.5);
    }

    #[test]
    fn seconds_streamed_without_format_is_zero() {
        let report = SessionReport {
            frames: 100,
            ..SessionReport::default()
        };
        assert_relative_eq!(report.seconds_streamed(), 0.0);
    }

    #[test]
    fn json_round_trip() {
        let report = SessionReport {
            frames: 10,
            passes: 3,
            sink_format: Some(AudioFormat::new(2, 32, 44_100, SampleEncoding::IeeeFloat)),
            ..SessionReport::begin()
        };
        let json = report.to_json().unwrap();
        assert!(json.contains("\"frames\": 10"));
        let parsed: SessionReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }
}
