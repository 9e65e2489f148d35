use super::AudioFrame;

/// Builds overlapping analysis windows out of hop-sized frames.
///
/// The mono ring is written at a circular offset; `push` hands back the
/// window in chronological order.
pub struct FrameAccumulator {
    ring: Vec<f32>,
    window: Vec<f32>,
    hop: usize,
    offset: usize,
}

impl FrameAccumulator {
    /// # Panics
    /// If `hop` is zero or does not divide `chunk`.
    pub fn new(chunk: usize, hop: usize) -> Self {
        assert!(hop > 0 && chunk % hop == 0, "chunk must be a multiple of hop");

        Self {
            ring: vec![0.0; chunk],
            window: vec![0.0; chunk],
            hop,
            offset: 0,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.ring.len()
    }

    pub fn hop_size(&self) -> usize {
        self.hop
    }

    /// Downmix `frame` into the ring and return the current full window.
    ///
    /// # Panics
    /// If the frame does not hold exactly one hop of sample frames.
    pub fn push(&mut self, frame: &AudioFrame) -> &[f32] {
        let channels = frame.channels.max(1) as usize;
        assert_eq!(
            frame.samples.len(),
            self.hop * channels,
            "frame must hold exactly one hop"
        );

        let slot = &mut self.ring[self.offset..self.offset + self.hop];
        if channels == 1 {
            slot.copy_from_slice(&frame.samples);
        } else {
            for (out, chunk) in slot.iter_mut().zip(frame.samples.chunks_exact(channels)) {
                *out = chunk.iter().sum::<f32>() / channels as f32;
            }
        }
        self.advance()
    }

    /// Append one hop of mono samples and return the current full window.
    ///
    /// # Panics
    /// If `samples` is not exactly one hop long.
    pub fn push_mono(&mut self, samples: &[f32]) -> &[f32] {
        assert_eq!(samples.len(), self.hop, "frame must hold exactly one hop");
        self.ring[self.offset..self.offset + self.hop].copy_from_slice(samples);
        self.advance()
    }

    /// Append one hop of zeros
    pub fn push_silence(&mut self) -> &[f32] {
        self.ring[self.offset..self.offset + self.hop].fill(0.0);
        self.advance()
    }

    /// Window returned by the most recent push
    pub fn window(&self) -> &[f32] {
        &self.window
    }

    fn advance(&mut self) -> &[f32] {
        self.offset = (self.offset + self.hop) % self.ring.len();

        // offset now points at the oldest hop
        let (newer, older) = self.ring.split_at(self.offset);
        self.window[..older.len()].copy_from_slice(older);
        self.window[older.len()..].copy_from_slice(newer);
        &self.window
    }

    /// Zero the ring and rewind the write offset
    pub fn clear(&mut self) {
        self.ring.fill(0.0);
        self.window.fill(0.0);
        self.offset = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hop(values: &[f32]) -> AudioFrame {
        AudioFrame::mono(values.to_vec(), 44100)
    }

    #[test]
    fn test_first_push_is_preceded_by_zeros() {
        let mut acc = FrameAccumulator::new(4, 2);
        let window = acc.push(&hop(&[1.0, 2.0]));
        assert_eq!(window, &[0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_windows_overlap_in_chronological_order() {
        let mut acc = FrameAccumulator::new(4, 2);
        acc.push(&hop(&[1.0, 2.0]));
        assert_eq!(acc.push(&hop(&[3.0, 4.0])), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(acc.push(&hop(&[5.0, 6.0])), &[3.0, 4.0, 5.0, 6.0]);
        assert_eq!(acc.push(&hop(&[7.0, 8.0])), &[5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_quarter_hop_layout() {
        let mut acc = FrameAccumulator::new(4, 1);
        for v in 1..=5 {
            acc.push(&hop(&[v as f32]));
        }
        assert_eq!(acc.push(&hop(&[6.0])), &[3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_stereo_downmix_is_mean() {
        let mut acc = FrameAccumulator::new(4, 2);
        let frame = AudioFrame::new(vec![1.0, 0.0, -0.5, 0.5], 2, 44100);
        assert_eq!(acc.push(&frame), &[0.0, 0.0, 0.5, 0.0]);
    }

    #[test]
    #[should_panic(expected = "exactly one hop")]
    fn test_wrong_hop_length_panics() {
        let mut acc = FrameAccumulator::new(4, 2);
        acc.push(&hop(&[1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_mono_and_silence_pushes_share_the_ring() {
        let mut acc = FrameAccumulator::new(4, 2);
        acc.push_mono(&[1.0, 2.0]);
        assert_eq!(acc.push_silence(), &[1.0, 2.0, 0.0, 0.0]);
        assert_eq!(acc.push_mono(&[3.0, 4.0]), &[0.0, 0.0, 3.0, 4.0]);
        assert_eq!(acc.window(), &[0.0, 0.0, 3.0, 4.0]);
    }

    #[test]
    fn test_clear_rewinds() {
        let mut acc = FrameAccumulator::new(4, 2);
        acc.push(&hop(&[1.0, 2.0]));
        acc.clear();
        assert_eq!(acc.push(&hop(&[9.0, 9.0])), &[0.0, 0.0, 9.0, 9.0]);
    }
}
