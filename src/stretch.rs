//! Pitch-preserving time stretching.

use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::{AudioError, Result};

/// Changes the duration of audio without changing its pitch.
///
/// Implementations take per-channel samples and return per-channel samples
/// roughly `len / tempo_ratio` long. They may return a different number of
/// channels than they were given.
pub trait TimeStretcher {
    fn stretch(
        &self,
        channels: &[Vec<f32>],
        sample_rate: u32,
        tempo_ratio: f64,
    ) -> Result<Vec<Vec<f32>>>;
}

pub fn check_ratio(ratio: f64) -> Result<()> {
    if !(ratio.is_finite() && ratio > 0.0) {
        return Err(AudioError::Transform(format!(
            "speed ratio must be positive, got {ratio}"
        )));
    }
    Ok(())
}

/// Phase vocoder with a Hann window and 75% overlap.
///
/// Output frames are placed every `fft_size / 4` samples; the matching
/// analysis frames are taken `tempo_ratio` times further apart, and each
/// bin's phase is advanced by its measured instantaneous frequency. Output
/// length is exactly `round(len / tempo_ratio)`.
pub struct PhaseVocoder {
    fft_size: usize,
    hop: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
}

impl Default for PhaseVocoder {
    fn default() -> Self {
        Self::build(2048)
    }
}

impl PhaseVocoder {
    pub fn new(fft_size: usize) -> Result<Self> {
        if !fft_size.is_power_of_two() || fft_size < 256 {
            return Err(AudioError::Config(format!(
                "FFT size must be a power of two >= 256, got {fft_size}"
            )));
        }
        Ok(Self::build(fft_size))
    }

    fn build(fft_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        // periodic Hann
        let window = (0..fft_size)
            .map(|i| (0.5 - 0.5 * (2.0 * PI * i as f64 / fft_size as f64).cos()) as f32)
            .collect();
        PhaseVocoder {
            fft_size,
            hop: fft_size / 4,
            window,
            fft: planner.plan_fft_forward(fft_size),
            ifft: planner.plan_fft_inverse(fft_size),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    fn stretch_channel(&self, input: &[f32], tempo_ratio: f64) -> Vec<f32> {
        let n = self.fft_size;
        let hop = self.hop;
        let out_len = (input.len() as f64 / tempo_ratio).round() as usize;
        if input.is_empty() || out_len == 0 {
            return vec![0.0; out_len];
        }

        // n samples of silence either side so edge frames see full windows
        let mut padded = vec![0.0f32; n];
        padded.extend_from_slice(input);
        padded.resize(padded.len() + n, 0.0);

        let frames = (out_len + n) / hop + 2;
        let total = (frames - 1) * hop + n;
        let mut output = vec![0.0f32; total];
        let mut norm = vec![0.0f32; total];

        let bins = n / 2 + 1;
        let mut last_phase = vec![0.0f64; bins];
        let mut synth_phase = vec![0.0f64; bins];
        let mut last_pos: Option<isize> = None;
        let mut spectrum = vec![Complex::new(0.0f32, 0.0); n];

        for m in 0..frames {
            // line up frame centers: output time t maps to input time t * ratio
            let out_center = (m * hop + n / 2) as f64 - n as f64;
            let pos = (n as f64 + out_center * tempo_ratio - (n / 2) as f64).round() as isize;

            for (i, bin) in spectrum.iter_mut().enumerate() {
                let idx = pos + i as isize;
                let x = if idx >= 0 {
                    padded.get(idx as usize).copied().unwrap_or(0.0)
                } else {
                    0.0
                };
                *bin = Complex::new(x * self.window[i], 0.0);
            }
            self.fft.process(&mut spectrum);

            for k in 0..bins {
                let magnitude = spectrum[k].norm();
                let phase = spectrum[k].arg() as f64;
                let omega = 2.0 * PI * k as f64 / n as f64;
                synth_phase[k] = match last_pos {
                    None => phase,
                    Some(prev) if pos > prev => {
                        let advance = (pos - prev) as f64;
                        let deviation = wrap_phase(phase - last_phase[k] - omega * advance);
                        let frequency = omega + deviation / advance;
                        wrap_phase(synth_phase[k] + frequency * hop as f64)
                    }
                    Some(_) => wrap_phase(synth_phase[k] + omega * hop as f64),
                };
                last_phase[k] = phase;
                spectrum[k] = Complex::from_polar(magnitude, synth_phase[k] as f32);
            }
            for k in 1..n / 2 {
                spectrum[n - k] = spectrum[k].conj();
            }
            self.ifft.process(&mut spectrum);

            let start = m * hop;
            for i in 0..n {
                let w = self.window[i];
                output[start + i] += spectrum[i].re / n as f32 * w;
                norm[start + i] += w * w;
            }
            last_pos = Some(pos);
        }

        output[n..n + out_len]
            .iter()
            .zip(&norm[n..n + out_len])
            .map(|(&y, &w)| if w > 1e-6 { y / w } else { 0.0 })
            .collect()
    }
}

/// Wraps a phase into `[-pi, pi)`.
fn wrap_phase(phase: f64) -> f64 {
    phase - 2.0 * PI * ((phase + PI) / (2.0 * PI)).floor()
}

impl TimeStretcher for PhaseVocoder {
    fn stretch(
        &self,
        channels: &[Vec<f32>],
        _sample_rate: u32,
        tempo_ratio: f64,
    ) -> Result<Vec<Vec<f32>>> {
        check_ratio(tempo_ratio)?;
        Ok(channels
            .iter()
            .map(|channel| self.stretch_channel(channel, tempo_ratio))
            .collect())
    }
}
