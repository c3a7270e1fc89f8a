/// Whether the aligner has seen real audio yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignerState {
    /// Still holding the initial silent frame; the next batch starts with it.
    FirstCycle,
    /// Holding the last frame of the previous batch.
    Primed,
}

/// One-frame delay line that shifts a stream late by exactly one source frame.
///
/// Some capture devices deliver their channels one sample out of step; holding
/// back the newest frame and emitting it at the start of the next batch
/// cancels the skew. The first batch after start therefore begins with one
/// frame of silence.
#[derive(Debug, Clone)]
pub struct PhaseAligner {
    held: Vec<u8>,
    state: AlignerState,
}

impl PhaseAligner {
    /// Creates an aligner for frames of `block_size` bytes, holding silence.
    pub fn new(block_size: usize) -> Self {
        Self {
            held: vec![0; block_size],
            state: AlignerState::FirstCycle,
        }
    }

    pub fn state(&self) -> AlignerState {
        self.state
    }

    pub fn held_frame(&self) -> &[u8] {
        &self.held
    }

    /// Write the delayed version of `input` into `out`.
    ///
    /// Output frame 0 is the held frame, output frames 1..N are input frames
    /// 0..N-1, and input frame N-1 becomes the held frame. Both buffers are
    /// treated as whole frames; returns how many frames were written.
    pub fn align(&mut self, input: &[u8], out: &mut [u8]) -> usize {
        let block = self.held.len();
        if block == 0 {
            return 0;
        }
        let frames = (input.len() / block).min(out.len() / block);
        if frames == 0 {
            return 0;
        }

        let len = frames * block;
        out[..block].copy_from_slice(&self.held);
        out[block..len].copy_from_slice(&input[..len - block]);
        self.held.copy_from_slice(&input[len - block..len]);
        self.state = AlignerState::Primed;
        frames
    }
}
