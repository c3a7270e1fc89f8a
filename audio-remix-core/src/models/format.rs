use serde::{Deserialize, Serialize};

/// Channel counts the remix pipeline understands.
///
/// Layout order is front L/R, rear L/R, center, LFE, side L/R.
pub const SUPPORTED_CHANNEL_COUNTS: [u16; 5] = [1, 2, 4, 6, 8];

/// Largest number of channels in a frame.
pub const MAX_CHANNELS: usize = 8;

/// How sample bits are interpreted by the device. The remix pipeline only
/// moves bytes, but negotiation requires both ends to agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleEncoding {
    Pcm,
    IeeeFloat,
}

/// Interleaved PCM stream layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub channels: u16,
    pub bits_per_sample: u16,
    pub sample_rate: u32,
    /// Bytes per frame. Equals `channels * bits_per_sample / 8` once normalized.
    pub block_align: u16,
    pub encoding: SampleEncoding,
}

impl AudioFormat {
    pub fn new(channels: u16, bits_per_sample: u16, sample_rate: u32, encoding: SampleEncoding) -> Self {
        Self {
            channels,
            bits_per_sample,
            sample_rate,
            block_align: channels * (bits_per_sample / 8),
            encoding,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    pub fn block_size(&self) -> usize {
        usize::from(self.block_align)
    }

    /// Byte length of `frames` whole frames.
    pub fn bytes_for(&self, frames: usize) -> usize {
        frames * self.block_size()
    }

    /// Recomputes `block_align` from channels and bit depth.
    ///
    /// Devices occasionally report a padded block alignment; everything
    /// downstream assumes tightly packed samples.
    pub fn normalized(mut self) -> Self {
        self.block_align = self.channels * (self.bits_per_sample / 8);
        self
    }

    pub fn is_normalized(&self) -> bool {
        self.block_align == self.channels * (self.bits_per_sample / 8)
    }

    pub fn has_supported_layout(&self) -> bool {
        SUPPORTED_CHANNEL_COUNTS.contains(&self.channels)
            && matches!(self.bits_per_sample, 8 | 16 | 24 | 32)
    }

    /// Same shape apart from channel count.
    pub fn differs_only_in_channels(&self, other: &AudioFormat) -> bool {
        self.bits_per_sample == other.bits_per_sample
            && self.sample_rate == other.sample_rate
            && self.encoding == other.encoding
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let encoding = match self.encoding {
            SampleEncoding::Pcm => "pcm",
            SampleEncoding::IeeeFloat => "float",
        };
        write!(
            f,
            "{}ch {}-bit {} @ {} Hz",
            self.channels, self.bits_per_sample, encoding, self.sample_rate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_computes_block_align() {
        let format = AudioFormat::new(6, 24, 48_000, SampleEncoding::Pcm);
        assert_eq!(format.block_align, 18);
        assert_eq!(format.bytes_per_sample(), 3);
        assert_eq!(format.bytes_for(10), 180);
    }

    #[test]
    fn normalized_fixes_padded_block_align() {
        let padded = AudioFormat {
            block_align: 8,
            ..AudioFormat::new(2, 16, 44_100, SampleEncoding::Pcm)
        };
        assert!(!padded.is_normalized());
        assert_eq!(padded.normalized().block_align, 4);
    }

    #[test]
    fn supported_layouts() {
        assert!(AudioFormat::new(8, 32, 48_000, SampleEncoding::IeeeFloat).has_supported_layout());
        assert!(!AudioFormat::new(3, 16, 48_000, SampleEncoding::Pcm).has_supported_layout());
        assert!(!AudioFormat::new(2, 12, 48_000, SampleEncoding::Pcm).has_supported_layout());
    }

    #[test]
    fn display_is_readable() {
        let format = AudioFormat::new(2, 32, 48_000, SampleEncoding::IeeeFloat);
        assert_eq!(format.to_string(), "2ch 32-bit float @ 48000 Hz");
    }
}
