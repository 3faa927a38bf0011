//! Linear PCM bookkeeping: stream parameters, frame ranges, sample buffers and
//! the integer sample codec shared by the WAV reader, writer and sinks.

use crate::error::{AudioError, Result};

/// Format of a linear PCM stream.
///
/// `sample_width` is in bytes (1..=4). `frame_count` is only ever replaced
/// wholesale, by whoever read or produced a new number of frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmParams {
    pub channels: u16,
    pub sample_width: u16,
    pub sample_rate: u32,
    pub frame_count: usize,
}

impl PcmParams {
    pub fn new(
        channels: u16,
        sample_width: u16,
        sample_rate: u32,
        frame_count: usize,
    ) -> Result<PcmParams> {
        let params = PcmParams {
            channels,
            sample_width,
            sample_rate,
            frame_count,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(AudioError::Format("channel count is zero".into()));
        }
        if !(1..=4).contains(&self.sample_width) {
            return Err(AudioError::Format(format!(
                "unsupported sample width {} bytes",
                self.sample_width
            )));
        }
        if self.sample_rate == 0 {
            return Err(AudioError::Format("sample rate is zero".into()));
        }
        // block align is a u16 and the byte rate a u32 in a WAV header
        if u16::try_from(self.bytes_per_frame()).is_err() {
            return Err(AudioError::Format(format!(
                "{} channels of {} bytes exceed the largest frame size",
                self.channels, self.sample_width
            )));
        }
        if self.bytes_per_second().is_none() {
            return Err(AudioError::Format(format!(
                "{} Hz at {} bytes per frame exceeds the largest byte rate",
                self.sample_rate,
                self.bytes_per_frame()
            )));
        }
        Ok(())
    }

    /// `sample_rate * bytes_per_frame`, if it fits in 32 bits.
    pub fn bytes_per_second(&self) -> Option<u32> {
        u32::try_from(self.bytes_per_frame())
            .ok()
            .and_then(|bpf| self.sample_rate.checked_mul(bpf))
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.sample_width as usize
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frame_count as f64 / self.sample_rate as f64
    }

    pub fn with_frame_count(self, frame_count: usize) -> PcmParams {
        PcmParams {
            frame_count,
            ..self
        }
    }

    /// Scale between normalized floats and integers of this width.
    pub fn full_scale(&self) -> f64 {
        full_scale(self.sample_width)
    }
}

/// A contiguous run of frames inside a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRange {
    pub start_frame: usize,
    pub frame_count: usize,
}

impl FrameRange {
    /// Resolves a `(start_time, duration)` pair in seconds against a stream of
    /// `total_frames` frames. An infinite duration means "to the end".
    ///
    /// Starting exactly at the end yields an empty range; starting past it is
    /// an error.
    pub fn from_times(
        sample_rate: u32,
        total_frames: usize,
        start_time: f64,
        duration: f64,
    ) -> Result<FrameRange> {
        if start_time.is_nan() || start_time < 0.0 {
            return Err(AudioError::OutOfRange(format!(
                "invalid start time {start_time}"
            )));
        }
        if duration.is_nan() || duration < 0.0 {
            return Err(AudioError::OutOfRange(format!(
                "invalid duration {duration}"
            )));
        }

        let start_frame = seconds_to_frames(sample_rate, start_time);
        if start_frame > total_frames {
            return Err(AudioError::OutOfRange(format!(
                "start frame {start_frame} is beyond the end of the stream ({total_frames} frames)"
            )));
        }

        let available = total_frames - start_frame;
        let frame_count = if duration.is_finite() {
            seconds_to_frames(sample_rate, duration).min(available)
        } else {
            available
        };

        Ok(FrameRange {
            start_frame,
            frame_count,
        })
    }

    pub fn end_frame(&self) -> usize {
        self.start_frame + self.frame_count
    }
}

/// `round(sample_rate * seconds)` with ties going to the even frame.
pub fn seconds_to_frames(sample_rate: u32, seconds: f64) -> usize {
    (sample_rate as f64 * seconds).round_ties_even() as usize
}

/// Interleaved samples, either already quantized or still normalized floats.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    /// Integers at the buffer's sample width (8-bit samples are signed here).
    Int(Vec<i32>),
    /// Floats nominally in `[-1.0, 1.0]`.
    Float(Vec<f32>),
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Samples::Int(s) => s.len(),
            Samples::Float(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interleaved samples paired with the parameters that describe them.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    params: PcmParams,
    samples: Samples,
}

impl SampleBuffer {
    /// Wraps `samples`, recomputing `frame_count` from their length.
    pub fn new(params: PcmParams, samples: Samples) -> Result<SampleBuffer> {
        params.validate()?;
        let channels = params.channels as usize;
        if samples.len() % channels != 0 {
            return Err(AudioError::Format(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(SampleBuffer {
            params: params.with_frame_count(samples.len() / channels),
            samples,
        })
    }

    pub fn from_int(
        channels: u16,
        sample_width: u16,
        sample_rate: u32,
        samples: Vec<i32>,
    ) -> Result<SampleBuffer> {
        let params = PcmParams::new(channels, sample_width, sample_rate, 0)?;
        SampleBuffer::new(params, Samples::Int(samples))
    }

    pub fn from_float(
        channels: u16,
        sample_width: u16,
        sample_rate: u32,
        samples: Vec<f32>,
    ) -> Result<SampleBuffer> {
        let params = PcmParams::new(channels, sample_width, sample_rate, 0)?;
        SampleBuffer::new(params, Samples::Float(samples))
    }

    pub fn params(&self) -> &PcmParams {
        &self.params
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    pub fn into_samples(self) -> Samples {
        self.samples
    }

    pub fn frame_count(&self) -> usize {
        self.params.frame_count
    }

    pub fn channels(&self) -> u16 {
        self.params.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.params.sample_rate
    }

    pub fn duration_seconds(&self) -> f64 {
        self.params.duration_seconds()
    }

    pub fn is_quantized(&self) -> bool {
        matches!(self.samples, Samples::Int(_))
    }

    /// Same samples under a different declared sample rate.
    pub fn with_sample_rate(self, sample_rate: u32) -> SampleBuffer {
        SampleBuffer {
            params: PcmParams {
                sample_rate,
                ..self.params
            },
            samples: self.samples,
        }
    }

    /// Normalized float view of the samples.
    pub fn to_float(&self) -> Vec<f32> {
        match &self.samples {
            Samples::Float(s) => s.clone(),
            Samples::Int(s) => {
                let scale = self.params.full_scale();
                s.iter().map(|&v| (v as f64 / scale) as f32).collect()
            }
        }
    }

    /// Integer view at the buffer's sample width. Floats are scaled by
    /// `2^(8 * width - 1)`, rounded and saturated.
    pub fn to_int(&self) -> Vec<i32> {
        match &self.samples {
            Samples::Int(s) => s.clone(),
            Samples::Float(s) => {
                let width = self.params.sample_width;
                let scale = self.params.full_scale();
                s.iter().map(|&v| quantize(v, scale, width)).collect()
            }
        }
    }

    /// Little-endian bytes as they appear in a WAV data chunk.
    pub fn to_bytes(&self) -> Vec<u8> {
        encode_samples(&self.to_int(), self.params.sample_width)
    }

    /// Per-channel normalized samples.
    pub fn channel_data(&self) -> Vec<Vec<f32>> {
        deinterleave(&self.to_float(), self.params.channels as usize)
    }
}

pub fn deinterleave(input: &[f32], num_channels: usize) -> Vec<Vec<f32>> {
    (0..num_channels)
        .map(|ch| {
            input
                .iter()
                .skip(ch)
                .step_by(num_channels)
                .copied()
                .collect()
        })
        .collect()
}

/// Interleaves per-channel vectors, truncating to the shortest channel.
pub fn interleave(channels: &[Vec<f32>]) -> Vec<f32> {
    let min_len = channels.iter().map(|c| c.len()).min().unwrap_or(0);
    (0..min_len)
        .flat_map(|i| channels.iter().map(move |ch| ch[i]))
        .collect()
}

/// `2^(8 * width - 1)`
pub fn full_scale(sample_width: u16) -> f64 {
    (1u64 << (8 * sample_width as u32 - 1)) as f64
}

/// Smallest and largest integer representable at `sample_width` bytes.
pub fn sample_bounds(sample_width: u16) -> (i32, i32) {
    let half = 1i64 << (8 * sample_width as u32 - 1);
    ((-half) as i32, (half - 1) as i32)
}

/// `round(sample * scale)` with ties to even, saturated to the range of `sample_width`.
///
/// Out-of-range input clips to the nearest bound instead of wrapping, and
/// NaN maps to zero.
pub fn quantize(sample: f32, scale: f64, sample_width: u16) -> i32 {
    let (lo, hi) = sample_bounds(sample_width);
    let scaled = (sample as f64 * scale).round_ties_even();
    if scaled.is_nan() {
        return 0;
    }
    scaled.clamp(lo as f64, hi as f64) as i32
}

/// Decodes little-endian PCM. 8-bit data is unsigned on disk and comes back
/// centered on zero. A trailing partial sample is ignored.
pub fn decode_samples(bytes: &[u8], sample_width: u16) -> Vec<i32> {
    let width = sample_width as usize;
    bytes
        .chunks_exact(width)
        .map(|b| match width {
            1 => b[0] as i32 - 128,
            2 => i16::from_le_bytes([b[0], b[1]]) as i32,
            // sign-extend from bit 23
            3 => i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8,
            _ => i32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        })
        .collect()
}

/// Inverse of [`decode_samples`]. Values outside the width's range saturate.
pub fn encode_samples(samples: &[i32], sample_width: u16) -> Vec<u8> {
    let (lo, hi) = sample_bounds(sample_width);
    let mut bytes = Vec::with_capacity(samples.len() * sample_width as usize);
    for &sample in samples {
        let s = sample.clamp(lo, hi);
        match sample_width {
            1 => bytes.push((s + 128) as u8),
            2 => bytes.extend_from_slice(&(s as i16).to_le_bytes()),
            3 => bytes.extend_from_slice(&s.to_le_bytes()[..3]),
            _ => bytes.extend_from_slice(&s.to_le_bytes()),
        }
    }
    bytes
}
