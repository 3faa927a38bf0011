use crate::error::Result;
use crate::pcm::PcmParams;

/// A seekable linear PCM stream that hands out raw interleaved frames.
pub trait AudioSource {
    /// Format of the whole stream; `frame_count` is the total length.
    fn params(&self) -> PcmParams;

    /// Moves the read position to `frame`. Seeking past the end is an
    /// `OutOfRange` error; seeking exactly to the end is allowed.
    fn seek(&mut self, frame: usize) -> Result<()>;

    /// Reads up to `max_frames` frames from the current position and
    /// advances past them. Returns fewer frames (possibly none) only when
    /// the stream ends.
    fn read_frames(&mut self, max_frames: usize) -> Result<Vec<u8>>;
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn params(&self) -> PcmParams {
        (**self).params()
    }

    fn seek(&mut self, frame: usize) -> Result<()> {
        (**self).seek(frame)
    }

    fn read_frames(&mut self, max_frames: usize) -> Result<Vec<u8>> {
        (**self).read_frames(max_frames)
    }
}
