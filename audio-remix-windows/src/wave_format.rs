//! Conversion between `WAVEFORMATEX(TENSIBLE)` and [`AudioFormat`].

use windows::core::GUID;
use windows::Win32::Media::Audio::{WAVEFORMATEX, WAVEFORMATEXTENSIBLE, WAVEFORMATEXTENSIBLE_0};

use audio_remix_core::{AudioFormat, DeviceError, SampleEncoding};

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

const SUBTYPE_PCM: GUID = GUID::from_u128(0x00000001_0000_0010_8000_00aa00389b71);
const SUBTYPE_IEEE_FLOAT: GUID = GUID::from_u128(0x00000003_0000_0010_8000_00aa00389b71);

const EXTENSION_SIZE: u16 = (size_of::<WAVEFORMATEXTENSIBLE>() - size_of::<WAVEFORMATEX>()) as u16;

/// Speaker mask for the channel counts the remixer supports, in the
/// remixer's slot order (front, rear, center/LFE, side).
pub fn channel_mask(channels: u16) -> u32 {
    const FRONT: u32 = 0x1 | 0x2;
    const CENTER_LFE: u32 = 0x4 | 0x8;
    const BACK: u32 = 0x10 | 0x20;
    const SIDE: u32 = 0x200 | 0x400;
    match channels {
        1 => 0x4,
        2 => FRONT,
        4 => FRONT | BACK,
        6 => FRONT | CENTER_LFE | BACK,
        8 => FRONT | CENTER_LFE | BACK | SIDE,
        _ => 0,
    }
}

/// An owned, always-extensible wave format.
#[derive(Clone, Copy)]
pub struct WaveFormat(WAVEFORMATEXTENSIBLE);

impl WaveFormat {
    pub fn from_audio_format(format: &AudioFormat) -> Self {
        let format = format.normalized();
        let sub_format = match format.encoding {
            SampleEncoding::Pcm => SUBTYPE_PCM,
            SampleEncoding::IeeeFloat => SUBTYPE_IEEE_FLOAT,
        };
        Self(WAVEFORMATEXTENSIBLE {
            Format: WAVEFORMATEX {
                wFormatTag: WAVE_FORMAT_EXTENSIBLE,
                nChannels: format.channels,
                nSamplesPerSec: format.sample_rate,
                nAvgBytesPerSec: format.sample_rate * u32::from(format.block_align),
                nBlockAlign: format.block_align,
                wBitsPerSample: format.bits_per_sample,
                cbSize: EXTENSION_SIZE,
            },
            Samples: WAVEFORMATEXTENSIBLE_0 {
                wValidBitsPerSample: format.bits_per_sample,
            },
            dwChannelMask: channel_mask(format.channels),
            SubFormat: sub_format,
        })
    }

    /// Copies a device-allocated format, widening plain `WAVEFORMATEX` to the
    /// extensible form.
    ///
    /// # Safety
    /// `ptr` must point to a valid `WAVEFORMATEX`, followed by the extensible
    /// tail when its tag says so.
    pub unsafe fn from_ptr(ptr: *const WAVEFORMATEX) -> Result<Self, DeviceError> {
        if ptr.is_null() {
            return Err(DeviceError::Other("device returned no wave format".into()));
        }
        let base = std::ptr::read_unaligned(ptr);
        let tag = base.wFormatTag;
        let extension = base.cbSize;
        if tag == WAVE_FORMAT_EXTENSIBLE && extension >= EXTENSION_SIZE {
            return Ok(Self(std::ptr::read_unaligned(ptr as *const WAVEFORMATEXTENSIBLE)));
        }

        let sub_format = match tag {
            WAVE_FORMAT_PCM => SUBTYPE_PCM,
            WAVE_FORMAT_IEEE_FLOAT => SUBTYPE_IEEE_FLOAT,
            other => return Err(DeviceError::Other(format!("unsupported wave format tag 0x{:04x}", other))),
        };
        let channels = base.nChannels;
        let bits = base.wBitsPerSample;
        Ok(Self(WAVEFORMATEXTENSIBLE {
            Format: WAVEFORMATEX {
                wFormatTag: WAVE_FORMAT_EXTENSIBLE,
                cbSize: EXTENSION_SIZE,
                ..base
            },
            Samples: WAVEFORMATEXTENSIBLE_0 {
                wValidBitsPerSample: bits,
            },
            dwChannelMask: channel_mask(channels),
            SubFormat: sub_format,
        }))
    }

    pub fn to_audio_format(&self) -> Result<AudioFormat, DeviceError> {
        let format = self.0.Format;
        let sub_format = self.0.SubFormat;
        let encoding = if sub_format == SUBTYPE_PCM {
            SampleEncoding::Pcm
        } else if sub_format == SUBTYPE_IEEE_FLOAT {
            SampleEncoding::IeeeFloat
        } else {
            return Err(DeviceError::Other(format!("unsupported sample subformat {:?}", sub_format)));
        };
        Ok(AudioFormat {
            channels: format.nChannels,
            bits_per_sample: format.wBitsPerSample,
            sample_rate: format.nSamplesPerSec,
            block_align: format.nBlockAlign,
            encoding,
        })
    }

    /// Forces a tightly packed block alignment, keeping speaker mask and
    /// subformat.
    pub fn normalize_block_align(&mut self) {
        let format = self.0.Format;
        let block_align = format.nChannels * (format.wBitsPerSample / 8);
        self.0.Format.nBlockAlign = block_align;
        self.0.Format.nAvgBytesPerSec = format.nSamplesPerSec * u32::from(block_align);
    }

    pub fn as_ptr(&self) -> *const WAVEFORMATEX {
        &self.0 as *const WAVEFORMATEXTENSIBLE as *const WAVEFORMATEX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_follow_slot_order() {
        assert_eq!(channel_mask(1), 0x4);
        assert_eq!(channel_mask(2), 0x3);
        assert_eq!(channel_mask(4), 0x33);
        assert_eq!(channel_mask(6), 0x3F);
        assert_eq!(channel_mask(8), 0x63F);
        assert_eq!(channel_mask(3), 0);
    }

    #[test]
    fn audio_format_survives_conversion() {
        let format = AudioFormat::new(6, 24, 48_000, SampleEncoding::Pcm);
        let wave = WaveFormat::from_audio_format(&format);
        assert_eq!(wave.to_audio_format().unwrap(), format);
    }

    #[test]
    fn plain_float_format_is_widened() {
        let plain = WAVEFORMATEX {
            wFormatTag: WAVE_FORMAT_IEEE_FLOAT,
            nChannels: 2,
            nSamplesPerSec: 44_100,
            nAvgBytesPerSec: 44_100 * 8,
            nBlockAlign: 8,
            wBitsPerSample: 32,
            cbSize: 0,
        };
        let wave = unsafe { WaveFormat::from_ptr(&plain) }.unwrap();
        assert_eq!(
            wave.to_audio_format().unwrap(),
            AudioFormat::new(2, 32, 44_100, SampleEncoding::IeeeFloat)
        );
    }

    #[test]
    fn padded_block_align_is_tightened() {
        let mut wave = WaveFormat::from_audio_format(&AudioFormat::new(2, 16, 48_000, SampleEncoding::Pcm));
        wave.0.Format.nBlockAlign = 8;
        wave.normalize_block_align();
        assert_eq!(wave.to_audio_format().unwrap().block_align, 4);
    }
}
