//! Animated-icon data and the frame-sequencing cursor.

use crate::image::SharedImage;

// -------------------------------------------------------------------------------------------------

pub const MAX_FRAMES: usize = 64;
pub const MAX_SEQUENCE: usize = 64;

/// One sequence entry's display time, as the source rational plus the
/// precomputed milliseconds.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FrameDelay {
    pub numer: u16,
    pub denom: u16,
    pub ms: u32,
}

impl FrameDelay {
    pub fn new(numer: u16, denom: u16) -> Self {
        let ms = if denom == 0 { 0 } else { numer as u32 * 1000 / denom as u32 };
        Self { numer, denom, ms }
    }
}

/// Decoded animation frames plus the display order. A `None` frame means
/// "reuse the previous frame"; some formats emit those deliberately.
#[derive(Default)]
pub struct IconAnimData {
    frames: Vec<Option<SharedImage>>,
    seq_index: Vec<u8>,
    delays: Vec<FrameDelay>,
}

impl IconAnimData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct frame slots.
    pub fn count(&self) -> usize {
        self.frames.len()
    }

    /// Length of the display sequence.
    pub fn seq_count(&self) -> usize {
        self.seq_index.len()
    }

    pub fn frame(&self, idx: usize) -> Option<&SharedImage> {
        self.frames.get(idx).and_then(Option::as_ref)
    }

    pub fn push_frame(&mut self, frame: Option<SharedImage>) {
        debug_assert!(self.frames.len() < MAX_FRAMES);
        self.frames.push(frame);
    }

    pub fn seq_index(&self, seq_idx: usize) -> Option<u8> {
        self.seq_index.get(seq_idx).copied()
    }

    pub fn delay(&self, seq_idx: usize) -> FrameDelay {
        self.delays.get(seq_idx).copied().unwrap_or_default()
    }

    pub fn push_seq(&mut self, frame_idx: u8, delay: FrameDelay) {
        debug_assert!(self.seq_index.len() < MAX_SEQUENCE);
        self.seq_index.push(frame_idx);
        self.delays.push(delay);
    }

    /// First non-null frame, i.e. what a static shell icon shows.
    pub fn first_frame(&self) -> Option<&SharedImage> {
        self.frames.iter().flatten().next()
    }
}

// -------------------------------------------------------------------------------------------------

/// Sequencing cursor over an [`IconAnimData`].
pub struct IconAnimHelper<'a> {
    data: &'a IconAnimData,
    seq_idx: usize,
    frame: usize,
    delay_ms: u32,
    last_valid_frame: usize,
}

impl<'a> IconAnimHelper<'a> {
    pub fn new(data: &'a IconAnimData) -> Self {
        let mut helper = Self { data, seq_idx: 0, frame: 0, delay_ms: 0, last_valid_frame: 0 };
        helper.reset();
        helper
    }

    /// Animated only when there is both more than one frame and more than
    /// one sequence entry.
    pub fn is_animated(&self) -> bool {
        self.data.count() > 1 && self.data.seq_count() > 1
    }

    /// The frame to display: the last sequence position that held a valid
    /// frame.
    pub fn frame_number(&self) -> usize {
        self.last_valid_frame
    }

    pub fn frame_delay_ms(&self) -> u32 {
        self.delay_ms
    }

    pub fn reset(&mut self) {
        self.seq_idx = 0;
        self.frame = self.data.seq_index(0).unwrap_or(0) as usize;
        self.delay_ms = self.data.delay(0).ms;
        self.last_valid_frame = self.frame;
    }

    /// Advances to the next sequence slot (wrapping), returning the frame
    /// number to display.
    pub fn next_frame(&mut self) -> usize {
        let seq_count = self.data.seq_count();
        if seq_count == 0 {
            return 0;
        }

        self.seq_idx = if self.seq_idx >= seq_count - 1 { 0 } else { self.seq_idx + 1 };
        self.frame = self.data.seq_index(self.seq_idx).unwrap_or(0) as usize;
        self.delay_ms = self.data.delay(self.seq_idx).ms;

        if self.data.frame(self.frame).is_some() {
            self.last_valid_frame = self.frame;
        }
        self.last_valid_frame
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::image::{Image, ImageFormat};

    fn dummy_frame() -> SharedImage {
        Arc::new(Image::new(2, 2, ImageFormat::Ci8).unwrap())
    }

    fn three_frame_anim(with_hole: bool) -> IconAnimData {
        let mut data = IconAnimData::new();
        data.push_frame(Some(dummy_frame()));
        data.push_frame(if with_hole { None } else { Some(dummy_frame()) });
        data.push_frame(Some(dummy_frame()));
        for i in 0..3 {
            data.push_seq(i, FrameDelay::new(1, 8));
        }
        data
    }

    #[test]
    fn delay_precomputes_milliseconds() {
        assert_eq!(FrameDelay::new(1, 8).ms, 125);
        assert_eq!(FrameDelay::new(16, 50).ms, 320);
        assert_eq!(FrameDelay::new(11, 50).ms, 220);
    }

    #[test]
    fn animation_requires_frames_and_sequence() {
        let mut data = IconAnimData::new();
        data.push_frame(Some(dummy_frame()));
        data.push_seq(0, FrameDelay::new(1, 4));
        assert!(!IconAnimHelper::new(&data).is_animated());

        let data = three_frame_anim(false);
        assert!(IconAnimHelper::new(&data).is_animated());
    }

    #[test]
    fn sequence_wraps_around() {
        let data = three_frame_anim(false);
        let mut helper = IconAnimHelper::new(&data);
        assert_eq!(helper.frame_number(), 0);
        assert_eq!(helper.next_frame(), 1);
        assert_eq!(helper.next_frame(), 2);
        assert_eq!(helper.next_frame(), 0);
        assert_eq!(helper.frame_delay_ms(), 125);
    }

    #[test]
    fn null_frames_reuse_the_previous_one() {
        let data = three_frame_anim(true);
        let mut helper = IconAnimHelper::new(&data);
        // Frame 1 is a hole: the display frame stays at 0.
        assert_eq!(helper.next_frame(), 0);
        assert_eq!(helper.next_frame(), 2);
        helper.reset();
        assert_eq!(helper.frame_number(), 0);
    }
}
