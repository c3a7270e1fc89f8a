//! Channel remixing between interleaved frame layouts.
//!
//! Slots follow the canonical order front L/R, rear L/R, center, LFE,
//! side L/R. Samples are moved as raw bytes: a width change keeps the most
//! significant bytes (truncating or zero-padding the low-order end) and never
//! scales values.

use crate::models::format::{AudioFormat, MAX_CHANNELS};

/// Where an output slot takes its sample from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRoute {
    /// Source channel with this index.
    Input(usize),
    /// Output slot already written earlier in the same frame.
    Output(usize),
    /// Left as the caller prepared it (zero-filled for up-mix targets).
    Untouched,
}

/// Routing table for one (input channels, output channels) pair.
///
/// Center and LFE are only ever copied from a source that has them; they
/// are never synthesized by duplication. Side channels duplicate the front
/// pair, not the rear.
pub fn channel_routes(in_channels: usize, out_channels: usize, duplicate: bool) -> [ChannelRoute; MAX_CHANNELS] {
    let mut routes = [ChannelRoute::Untouched; MAX_CHANNELS];
    let out_channels = out_channels.min(MAX_CHANNELS);

    for (slot, route) in routes.iter_mut().enumerate().take(out_channels) {
        *route = match slot {
            0 => ChannelRoute::Input(0),
            1 if in_channels >= 2 => ChannelRoute::Input(1),
            1 if duplicate => ChannelRoute::Output(0),
            2 | 3 if in_channels > slot => ChannelRoute::Input(slot),
            2 | 3 if duplicate && out_channels >= 4 => ChannelRoute::Output(slot - 2),
            4 | 5 if in_channels >= 6 => ChannelRoute::Input(slot),
            6 | 7 if in_channels >= 8 => ChannelRoute::Input(slot),
            6 | 7 if duplicate && out_channels >= 8 => ChannelRoute::Output(slot - 6),
            _ => ChannelRoute::Untouched,
        };
    }
    routes
}

/// Remix `frames` frames from `input` (laid out as `in_format`) into `out`
/// (laid out as `out_format`).
///
/// Returns the number of frames written. That is `frames` clamped to what
/// both buffers can hold, or 0 when the sample rates differ.
///
/// Down-mixing is not synthesized: slots are filled only by the copy and
/// duplication rules, so callers must not rely on down-mixed output.
pub fn remix(
    out: &mut [u8],
    out_format: &AudioFormat,
    input: &[u8],
    in_format: &AudioFormat,
    frames: usize,
    duplicate_channels: bool,
) -> usize {
    if frames == 0 || in_format.sample_rate != out_format.sample_rate {
        return 0;
    }

    let in_block = in_format.block_size();
    let out_block = out_format.block_size();
    if in_block == 0 || out_block == 0 || in_format.channels == 0 {
        return 0;
    }
    let frames = frames.min(input.len() / in_block).min(out.len() / out_block);

    if in_format.channels == out_format.channels && in_format.bits_per_sample == out_format.bits_per_sample {
        let len = frames * in_block.min(out_block);
        out[..len].copy_from_slice(&input[..len]);
        return frames;
    }

    let in_width = in_format.bytes_per_sample();
    let out_width = out_format.bytes_per_sample();
    let in_channels = usize::from(in_format.channels);
    let out_channels = usize::from(out_format.channels).min(MAX_CHANNELS);
    let routes = channel_routes(in_channels, out_channels, duplicate_channels);

    let in_frames = input[..frames * in_block].chunks_exact(in_block);
    let out_frames = out[..frames * out_block].chunks_exact_mut(out_block);

    for (src, dst) in in_frames.zip(out_frames) {
        for (slot, route) in routes.iter().enumerate().take(out_channels) {
            let dst_start = slot * out_width;
            match *route {
                ChannelRoute::Input(ch) if ch < in_channels => {
                    let src_start = ch * in_width;
                    copy_sample(
                        &mut dst[dst_start..dst_start + out_width],
                        &src[src_start..src_start + in_width],
                    );
                }
                ChannelRoute::Output(from) => {
                    let from_start = from * out_width;
                    dst.copy_within(from_start..from_start + out_width, dst_start);
                }
                _ => {}
            }
        }
    }

    frames
}

/// Copy one little-endian sample, adjusting its byte width.
fn copy_sample(dst: &mut [u8], src: &[u8]) {
    match dst.len().cmp(&src.len()) {
        std::cmp::Ordering::Equal => dst.copy_from_slice(src),
        std::cmp::Ordering::Less => dst.copy_from_slice(&src[src.len() - dst.len()..]),
        std::cmp::Ordering::Greater => {
            let pad = dst.len() - src.len();
            dst[..pad].fill(0);
            dst[pad..].copy_from_slice(src);
        }
    }
}
