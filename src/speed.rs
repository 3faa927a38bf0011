//! Speed changes over fully materialized buffers.
//!
//! None of these functions mutate their input; each returns a new buffer.

use log::debug;
use rubato::{FftFixedIn, Resampler};

use crate::error::{AudioError, Result};
use crate::pcm::{interleave, quantize, SampleBuffer};
use crate::stretch::{check_ratio, TimeStretcher};

const RESAMPLE_CHUNK: usize = 1024;

/// A one-shot speed change. `ratio > 1` is faster and shorter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedChangeRequest {
    pub ratio: f64,
    pub preserve_pitch: bool,
}

impl SpeedChangeRequest {
    pub fn new(ratio: f64, preserve_pitch: bool) -> Result<Self> {
        check_ratio(ratio)?;
        Ok(SpeedChangeRequest {
            ratio,
            preserve_pitch,
        })
    }

    /// Time-stretches when `preserve_pitch` is set; otherwise takes the
    /// relabel-only path of [`change_speed_with_pitch`].
    pub fn apply<T: TimeStretcher + ?Sized>(
        self,
        buffer: &SampleBuffer,
        stretcher: &T,
    ) -> Result<SampleBuffer> {
        if self.preserve_pitch {
            change_speed_only(buffer, self.ratio, stretcher)
        } else {
            change_speed_with_pitch(buffer, self.ratio)
        }
    }
}

/// Rate label a buffer is read at when played `ratio` times faster.
fn overridden_rate(sample_rate: u32, ratio: f64) -> Result<u32> {
    let rate = (sample_rate as f64 * ratio).floor();
    if !(1.0..=u32::MAX as f64).contains(&rate) {
        return Err(AudioError::Transform(format!(
            "speed ratio {ratio} gives an unusable sample rate {rate}"
        )));
    }
    Ok(rate as u32)
}

/// Copy of `buffer` with its declared rate replaced; samples are untouched.
pub fn override_frame_rate(buffer: &SampleBuffer, sample_rate: u32) -> SampleBuffer {
    buffer.clone().with_sample_rate(sample_rate)
}

/// Speed change that couples tempo and pitch, done purely on metadata.
///
/// The rate label is first overridden to `rate * ratio` and then restored
/// to the original rate. The waveform is never interpolated, so the result
/// carries the same samples under the same rate as the input. Only a
/// consumer that plays the intermediate relabeled buffer hears the speed
/// change; use [`resample_speed_with_pitch`] for an actual resample.
pub fn change_speed_with_pitch(buffer: &SampleBuffer, ratio: f64) -> Result<SampleBuffer> {
    check_ratio(ratio)?;
    let original_rate = buffer.sample_rate();
    let altered = override_frame_rate(buffer, overridden_rate(original_rate, ratio)?);
    debug!(
        "relabeled {} Hz audio as {} Hz, restoring {} Hz",
        original_rate,
        altered.sample_rate(),
        original_rate
    );
    Ok(override_frame_rate(&altered, original_rate))
}

/// Speed change that couples tempo and pitch by resampling.
///
/// The buffer is taken to run at `floor(rate * ratio)` and converted back to
/// `rate`, so the output is about `len / ratio` frames long and its pitch
/// moves by `ratio`. Sample width and the int/float variant are kept.
pub fn resample_speed_with_pitch(buffer: &SampleBuffer, ratio: f64) -> Result<SampleBuffer> {
    check_ratio(ratio)?;
    let params = *buffer.params();
    let from_rate = overridden_rate(params.sample_rate, ratio)?;
    let to_rate = params.sample_rate;

    let channels = buffer.channel_data();
    let resampled = resample(&channels, from_rate, to_rate)?;
    let samples = interleave(&resampled);

    let out = SampleBuffer::from_float(params.channels, params.sample_width, to_rate, samples)?;
    if buffer.is_quantized() {
        SampleBuffer::from_int(params.channels, params.sample_width, to_rate, out.to_int())
    } else {
        Ok(out)
    }
}

fn resample(channels: &[Vec<f32>], from_rate: u32, to_rate: u32) -> Result<Vec<Vec<f32>>> {
    let input_frames = channels.first().map_or(0, |c| c.len());
    if from_rate == to_rate || input_frames == 0 {
        return Ok(channels.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        RESAMPLE_CHUNK,
        2,
        channels.len(),
    )?;
    let delay = resampler.output_delay();
    let expected = (input_frames as f64 * to_rate as f64 / from_rate as f64).round() as usize;

    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels.len()];
    let mut pos = 0;
    // keep feeding (zeros once the input runs out) until the delayed tail is out
    while output[0].len() < expected + delay {
        let needed = resampler.input_frames_next();
        let chunk: Vec<Vec<f32>> = channels
            .iter()
            .map(|c| {
                let mut block = vec![0.0f32; needed];
                if pos < c.len() {
                    let n = needed.min(c.len() - pos);
                    block[..n].copy_from_slice(&c[pos..pos + n]);
                }
                block
            })
            .collect();
        let processed = resampler.process(&chunk, None)?;
        for (out, new) in output.iter_mut().zip(processed) {
            out.extend_from_slice(&new);
        }
        pos += needed;
    }

    for out in output.iter_mut() {
        out.drain(..delay);
        out.truncate(expected);
    }
    Ok(output)
}

/// Tempo change at constant pitch.
///
/// The buffer is split into channels and time-stretched. The stretched
/// floats are quantized to 16-bit (`round(x * 2^15)`, saturating) at the
/// original sample rate. The channel count comes from what the stretcher
/// returned, so a stretcher that mixes down to one channel yields mono.
pub fn change_speed_only<T: TimeStretcher + ?Sized>(
    buffer: &SampleBuffer,
    tempo_ratio: f64,
    stretcher: &T,
) -> Result<SampleBuffer> {
    check_ratio(tempo_ratio)?;
    let sample_rate = buffer.sample_rate();
    let stretched = stretcher.stretch(&buffer.channel_data(), sample_rate, tempo_ratio)?;

    let channels = u16::try_from(stretched.len().max(1))
        .map_err(|_| AudioError::Transform("stretcher returned too many channels".into()))?;
    let samples: Vec<i32> = interleave(&stretched)
        .into_iter()
        .map(|s| quantize(s, 32768.0, 2))
        .collect();

    debug!(
        "stretched {} frames to {} frames at tempo {}",
        buffer.frame_count(),
        samples.len() / channels as usize,
        tempo_ratio
    );
    SampleBuffer::from_int(channels, 2, sample_rate, samples)
}
