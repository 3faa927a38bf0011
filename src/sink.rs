//! Output side of a playback session.
//!
//! A sink receives raw interleaved little-endian frames in the format it was
//! opened with. The players only ever talk to a sink through a
//! [`SinkSession`], which closes it on every exit path.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use log::warn;

use crate::error::{AudioError, Result};
use crate::pcm::{decode_samples, PcmParams, SampleBuffer, Samples};
use crate::wav_header::{WavHeader, CANONICAL_HEADER_LEN};

pub trait AudioSink {
    fn open(&mut self, params: &PcmParams) -> Result<()>;

    /// Writes `frame_count` frames. Blocks until the sink has accepted them.
    fn write(&mut self, bytes: &[u8], frame_count: usize) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

impl<S: AudioSink + ?Sized> AudioSink for Box<S> {
    fn open(&mut self, params: &PcmParams) -> Result<()> {
        (**self).open(params)
    }

    fn write(&mut self, bytes: &[u8], frame_count: usize) -> Result<()> {
        (**self).write(bytes, frame_count)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// An open sink. Dropping it without [`close`](SinkSession::close) still
/// closes the sink; only the explicit close reports the close error.
pub struct SinkSession<'a, S: AudioSink + ?Sized> {
    sink: &'a mut S,
    params: PcmParams,
    open: bool,
}

impl<'a, S: AudioSink + ?Sized> SinkSession<'a, S> {
    pub fn open(sink: &'a mut S, params: PcmParams) -> Result<Self> {
        sink.open(&params)?;
        Ok(SinkSession {
            sink,
            params,
            open: true,
        })
    }

    pub fn params(&self) -> &PcmParams {
        &self.params
    }

    /// Writes one chunk, checking that `bytes` holds exactly `frame_count`
    /// frames.
    pub fn write(&mut self, bytes: &[u8], frame_count: usize) -> Result<()> {
        let expected = frame_count * self.params.bytes_per_frame();
        if bytes.len() != expected {
            return Err(AudioError::Device(format!(
                "chunk of {} bytes does not hold {} frames ({} bytes expected)",
                bytes.len(),
                frame_count,
                expected
            )));
        }
        self.sink.write(bytes, frame_count)
    }

    pub fn close(mut self) -> Result<()> {
        self.open = false;
        self.sink.close()
    }
}

impl<S: AudioSink + ?Sized> Drop for SinkSession<'_, S> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.sink.close() {
                warn!("failed to close sink after aborted playback: {}", e);
            }
        }
    }
}

/// Keeps everything written to it; an in-memory render target.
#[derive(Debug, Default)]
pub struct MemorySink {
    params: Option<PcmParams>,
    chunks: Vec<Vec<u8>>,
    frame_counts: Vec<usize>,
    is_open: bool,
    open_count: usize,
    close_count: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Format of the most recent `open`.
    pub fn params(&self) -> Option<&PcmParams> {
        self.params.as_ref()
    }

    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    /// Frame count declared with each chunk.
    pub fn frame_counts(&self) -> &[usize] {
        &self.frame_counts
    }

    pub fn frames_written(&self) -> usize {
        self.frame_counts.iter().sum()
    }

    pub fn data(&self) -> Vec<u8> {
        self.chunks.concat()
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn open_count(&self) -> usize {
        self.open_count
    }

    pub fn close_count(&self) -> usize {
        self.close_count
    }

    /// Decodes everything written so far.
    pub fn to_buffer(&self) -> Result<SampleBuffer> {
        let params = self
            .params
            .ok_or_else(|| AudioError::Device("sink was never opened".into()))?;
        let samples = decode_samples(&self.data(), params.sample_width);
        SampleBuffer::new(params, Samples::Int(samples))
    }
}

impl AudioSink for MemorySink {
    fn open(&mut self, params: &PcmParams) -> Result<()> {
        if self.is_open {
            return Err(AudioError::Device("sink is already open".into()));
        }
        self.params = Some(*params);
        self.chunks.clear();
        self.frame_counts.clear();
        self.is_open = true;
        self.open_count += 1;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8], frame_count: usize) -> Result<()> {
        if !self.is_open {
            return Err(AudioError::Device("write to a closed sink".into()));
        }
        self.chunks.push(bytes.to_vec());
        self.frame_counts.push(frame_count);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.is_open = false;
        self.close_count += 1;
        Ok(())
    }
}

/// Streams chunks into a WAV file, fixing up the header sizes on close.
pub struct WavSink<W: Write + Seek> {
    writer: W,
    params: Option<PcmParams>,
    data_size: u32,
}

impl WavSink<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(WavSink::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write + Seek> WavSink<W> {
    pub fn new(writer: W) -> Self {
        WavSink {
            writer,
            params: None,
            data_size: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Seek> AudioSink for WavSink<W> {
    fn open(&mut self, params: &PcmParams) -> Result<()> {
        params.validate()?;
        self.writer.seek(SeekFrom::Start(0))?;
        WavHeader::for_params(params, 0)?.write_to(&mut self.writer)?;
        self.params = Some(*params);
        self.data_size = 0;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8], _frame_count: usize) -> Result<()> {
        if self.params.is_none() {
            return Err(AudioError::Device("write to a closed sink".into()));
        }
        self.data_size = u32::try_from(bytes.len())
            .ok()
            .and_then(|len| self.data_size.checked_add(len))
            .filter(|&size| size <= u32::MAX - 37)
            .ok_or_else(|| AudioError::Device("WAV output exceeds 4 GiB".into()))?;
        self.writer.write_all(bytes)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(params) = self.params.take() else {
            return Ok(());
        };
        if self.data_size & 1 == 1 {
            self.writer.write_all(&[0])?;
        }
        self.writer.seek(SeekFrom::Start(0))?;
        WavHeader::for_params(&params, self.data_size)?.write_to(&mut self.writer)?;
        self.writer.seek(SeekFrom::Start(
            CANONICAL_HEADER_LEN + self.data_size as u64 + (self.data_size & 1) as u64,
        ))?;
        self.writer.flush()?;
        Ok(())
    }
}
