use crate::models::config::RemixPolicy;
use crate::models::error::RemixError;
use crate::models::format::AudioFormat;
use crate::traits::endpoint::{FormatSupport, RenderEndpoint};

/// Formats agreed for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormats {
    /// What the capture endpoint delivers.
    pub source: AudioFormat,
    /// How the remixer reads captured bytes. Differs from `source` only
    /// when mono is reinterpreted as stereo.
    pub remix_input: AudioFormat,
    /// What the render endpoint plays.
    pub sink: AudioFormat,
    /// Sink has more channels than `remix_input`; output must be zero-filled
    /// before remixing.
    pub channels_differ: bool,
    /// Source frames that make up one output frame (2 for forced
    /// mono→stereo, otherwise 1).
    pub source_frames_per_output_frame: u32,
}

impl NegotiatedFormats {
    /// Output frames produced by `source_frames` captured frames.
    pub fn output_frames(&self, source_frames: u32) -> u32 {
        source_frames / self.source_frames_per_output_frame
    }

    /// Largest source frame count that maps onto whole output frames.
    pub fn usable_source_frames(&self, source_frames: u32) -> u32 {
        source_frames - source_frames % self.source_frames_per_output_frame
    }
}

/// Derive the format the sink is first asked for.
pub fn candidate_format(source: &AudioFormat, policy: &RemixPolicy) -> Result<AudioFormat, RemixError> {
    let source = source.normalized();
    if !source.has_supported_layout() {
        return Err(RemixError::UnsupportedInputLayout(format!(
            "{} channels at {} bits",
            source.channels, source.bits_per_sample
        )));
    }

    if !policy.force_mono_to_stereo {
        return Ok(source);
    }

    if source.channels != 1 {
        return Err(RemixError::UnsupportedInputLayout(format!(
            "forcing mono to stereo needs a 1-channel source, device has {}",
            source.channels
        )));
    }

    Ok(AudioFormat {
        channels: source.channels * 2,
        sample_rate: source.sample_rate / 2,
        block_align: source.block_align * 2,
        ..source
    })
}

/// Decide whether the sink's answer for `candidate` is usable.
///
/// A close match is only accepted as an up-mix: more channels, everything
/// else identical. Sample-rate conversion and down-mixing are rejected.
pub fn accept(candidate: &AudioFormat, support: FormatSupport) -> Result<AudioFormat, RemixError> {
    let closest = match support {
        FormatSupport::Exact => return Ok(*candidate),
        FormatSupport::Unsupported => {
            return Err(RemixError::UnsupportedOutputFormat(format!(
                "render device cannot play {}",
                candidate
            )))
        }
        FormatSupport::Closest(closest) => closest.normalized(),
    };

    if closest == *candidate {
        return Ok(closest);
    }
    if closest.sample_rate != candidate.sample_rate {
        return Err(RemixError::UnsupportedOutputFormat(format!(
            "sample rate conversion from {} Hz to {} Hz is not supported",
            candidate.sample_rate, closest.sample_rate
        )));
    }
    if !closest.differs_only_in_channels(candidate) {
        return Err(RemixError::UnsupportedOutputFormat(format!(
            "render device offers {}, wanted {}",
            closest, candidate
        )));
    }
    if closest.channels < candidate.channels {
        return Err(RemixError::UnsupportedOutputFormat(format!(
            "down-mixing {} channels to {} is not supported",
            candidate.channels, closest.channels
        )));
    }
    if !closest.has_supported_layout() {
        return Err(RemixError::UnsupportedOutputFormat(format!(
            "render device offers unsupported layout {}",
            closest
        )));
    }

    Ok(closest)
}

/// Agree on source and sink formats with the render endpoint.
pub fn negotiate<R>(source: &AudioFormat, policy: &RemixPolicy, render: &mut R) -> Result<NegotiatedFormats, RemixError>
where
    R: RenderEndpoint + ?Sized,
{
    let source = source.normalized();
    let candidate = candidate_format(&source, policy)?;
    let support = render.check_support(&candidate)?;
    let sink = accept(&candidate, support)?;

    Ok(NegotiatedFormats {
        source,
        remix_input: candidate,
        sink,
        channels_differ: sink.channels != candidate.channels,
        source_frames_per_output_frame: if policy.force_mono_to_stereo { 2 } else { 1 },
    })
}
