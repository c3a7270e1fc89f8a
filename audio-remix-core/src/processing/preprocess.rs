use crate::models::config::{ChannelEdit, PreProcessConfig};
use crate::models::format::AudioFormat;

/// Channel pairs that receive the left/right edit. Center/LFE (4, 5) never do.
const EDITED_PAIRS: [(usize, usize); 3] = [(0, 1), (2, 3), (6, 7)];

/// Apply `config` to one interleaved frame in place.
///
/// Within each pair the order is: zero left, zero right, then the
/// swap/copy edit. The order is observable: zeroing the left channel and
/// then copying left from right leaves the right channel's value on both,
/// while copying to the left *after* zeroing the right zeroes the frame.
pub fn preprocess_frame(frame: &mut [u8], bytes_per_sample: usize, config: &PreProcessConfig) {
    if bytes_per_sample == 0 {
        return;
    }
    let channels = frame.len() / bytes_per_sample;
    if channels < 2 {
        return;
    }

    for &(left, right) in EDITED_PAIRS.iter().filter(|&&(_, right)| right < channels) {
        debug_assert_eq!(right, left + 1);
        let start = left * bytes_per_sample;
        let pair = &mut frame[start..start + 2 * bytes_per_sample];
        let (l, r) = pair.split_at_mut(bytes_per_sample);

        if config.zero_left {
            l.fill(0);
        }
        if config.zero_right {
            r.fill(0);
        }
        match config.edit {
            ChannelEdit::None => {}
            ChannelEdit::Swap => l.swap_with_slice(r),
            ChannelEdit::CopyToRight => r.copy_from_slice(l),
            ChannelEdit::CopyToLeft => l.copy_from_slice(r),
        }
    }
}

/// Apply `config` to every whole frame of `bytes`, laid out as `format`.
pub fn preprocess_batch(bytes: &mut [u8], format: &AudioFormat, config: &PreProcessConfig) {
    let block = format.block_size();
    if block == 0 || format.channels < 2 || !config.is_required() {
        return;
    }
    let width = format.bytes_per_sample();
    let tight = usize::from(format.channels) * width;
    for frame in bytes.chunks_exact_mut(block) {
        preprocess_frame(&mut frame[..tight.min(block)], width, config);
    }
}
