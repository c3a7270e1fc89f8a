//! Picking an endpoint by its friendly name.
//!
//! Matching is exact but case-insensitive, and must be unambiguous: two
//! endpoints sharing a name in the same direction are an error rather than
//! a silent first-wins.

use std::fmt;

use audio_remix_core::{CaptureSourceKind, DeviceError};

/// Data-flow direction of an audio endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Render,
    Capture,
}

impl Direction {
    /// Direction holding the endpoints a session of `kind` captures from.
    pub fn source_of(kind: CaptureSourceKind) -> Self {
        match kind {
            CaptureSourceKind::CaptureDevice => Self::Capture,
            CaptureSourceKind::RenderLoopback => Self::Render,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Render => f.write_str("render"),
            Self::Capture => f.write_str("capture"),
        }
    }
}

/// Returns the single candidate whose name matches `wanted`.
pub fn select_unique<T>(candidates: impl IntoIterator<Item = (String, T)>, wanted: &str) -> Result<T, DeviceError> {
    let wanted_folded = wanted.to_lowercase();
    let mut found = None;

    for (name, candidate) in candidates {
        if name.to_lowercase() != wanted_folded {
            continue;
        }
        if found.is_some() {
            return Err(DeviceError::Other(format!("found (at least) two devices named {}", wanted)));
        }
        found = Some(candidate);
    }

    found.ok_or_else(|| DeviceError::Unavailable(format!("could not find a device named {}", wanted)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<(String, u32)> {
        vec![
            ("Speakers (Realtek Audio)".to_string(), 1),
            ("Headphones".to_string(), 2),
            ("CABLE Input".to_string(), 3),
        ]
    }

    #[test]
    fn matches_ignoring_case() {
        assert_eq!(select_unique(devices(), "headphones").unwrap(), 2);
        assert_eq!(select_unique(devices(), "SPEAKERS (REALTEK AUDIO)").unwrap(), 1);
    }

    #[test]
    fn prefix_is_not_a_match() {
        let err = select_unique(devices(), "Speakers").unwrap_err();
        assert_eq!(err, DeviceError::Unavailable("could not find a device named Speakers".into()));
    }

    #[test]
    fn duplicate_names_are_ambiguous() {
        let mut list = devices();
        list.push(("cable input".to_string(), 4));

        let err = select_unique(list, "Cable Input").unwrap_err();
        assert_eq!(err.to_string(), "device error: found (at least) two devices named Cable Input");
    }

    #[test]
    fn empty_list_finds_nothing() {
        let err = select_unique(Vec::<(String, u32)>::new(), "Headphones").unwrap_err();
        assert!(matches!(err, DeviceError::Unavailable(_)));
    }

    #[test]
    fn loopback_sources_live_among_render_endpoints() {
        assert_eq!(Direction::source_of(CaptureSourceKind::CaptureDevice), Direction::Capture);
        assert_eq!(Direction::source_of(CaptureSourceKind::RenderLoopback), Direction::Render);
    }

    #[test]
    fn direction_display() {
        assert_eq!(Direction::Render.to_string(), "render");
        assert_eq!(Direction::Capture.to_string(), "capture");
    }
}
