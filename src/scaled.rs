//! Playback of in-memory sample buffers with amplitude scaling.

use log::{debug, info};

use crate::config::PlaybackConfig;
use crate::error::{AudioError, Result};
use crate::pcm::{encode_samples, quantize, FrameRange, PcmParams, SampleBuffer, Samples};
use crate::player::PlaybackReport;
use crate::player_state::{PlaybackState, PlayerState};
use crate::progress::ProgressReporter;
use crate::sink::{AudioSink, SinkSession};

/// Output width of the scaled player; buffers are always sent as 16-bit.
const OUTPUT_WIDTH: u16 = 2;

/// Chunking for the scaled player.
///
/// Long buffers are cut into `target_chunks` equal pieces; anything no longer
/// than `target_chunks` seconds is cut into one-second pieces instead. The
/// last chunk takes whatever is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaledChunkPlan {
    pub chunk_frames: usize,
    pub chunk_count: usize,
    pub last_chunk_frames: usize,
}

impl ScaledChunkPlan {
    pub fn new(frame_count: usize, sample_rate: u32, target_chunks: usize) -> Result<Self> {
        if target_chunks == 0 {
            return Err(AudioError::Config("scaled_chunks must be at least 1".into()));
        }
        if frame_count == 0 {
            return Ok(ScaledChunkPlan {
                chunk_frames: 0,
                chunk_count: 0,
                last_chunk_frames: 0,
            });
        }

        let seconds = frame_count as f64 / sample_rate as f64;
        let (chunk_count, chunk_frames) = if seconds > target_chunks as f64 {
            (target_chunks, frame_count / target_chunks)
        } else {
            (seconds.ceil() as usize, sample_rate as usize)
        };

        Ok(ScaledChunkPlan {
            chunk_frames,
            chunk_count,
            last_chunk_frames: frame_count - (chunk_count - 1) * chunk_frames,
        })
    }

    pub fn frames_in_chunk(&self, index: usize) -> usize {
        if index + 1 == self.chunk_count {
            self.last_chunk_frames
        } else {
            self.chunk_frames
        }
    }
}

pub struct ScaledPlayer {
    config: PlaybackConfig,
    state: PlayerState,
}

impl ScaledPlayer {
    pub fn new(config: PlaybackConfig) -> Result<Self> {
        config.validate()?;
        Ok(ScaledPlayer {
            config,
            state: PlayerState::new(),
        })
    }

    pub fn state(&self) -> PlaybackState {
        self.state.state()
    }

    /// 16-bit samples as they will be sent to the sink.
    ///
    /// Float buffers are multiplied by `dmax` (default `2^(8 * width - 1)`),
    /// rounded and saturated. Integer buffers are already quantized and are
    /// only rescaled from their own width to 16 bits.
    pub fn quantize(&self, buffer: &SampleBuffer) -> Vec<i32> {
        let params = buffer.params();
        match buffer.samples() {
            Samples::Float(samples) => {
                let dmax = self.config.dmax.unwrap_or_else(|| params.full_scale());
                samples
                    .iter()
                    .map(|&s| quantize(s, dmax, OUTPUT_WIDTH))
                    .collect()
            }
            Samples::Int(samples) if params.sample_width == OUTPUT_WIDTH => samples.clone(),
            Samples::Int(samples) => {
                let factor = 32768.0 / params.full_scale();
                samples
                    .iter()
                    .map(|&s| quantize(s as f32, factor, OUTPUT_WIDTH))
                    .collect()
            }
        }
    }

    pub fn play<K, R>(
        &mut self,
        buffer: &SampleBuffer,
        sink: &mut K,
        progress: &mut R,
    ) -> Result<PlaybackReport>
    where
        K: AudioSink + ?Sized,
        R: ProgressReporter + ?Sized,
    {
        self.state = PlayerState::new();
        let result = self.run(buffer, sink, progress);
        if result.is_err() {
            self.state.fail();
        }
        result
    }

    fn run<K, R>(
        &mut self,
        buffer: &SampleBuffer,
        sink: &mut K,
        progress: &mut R,
    ) -> Result<PlaybackReport>
    where
        K: AudioSink + ?Sized,
        R: ProgressReporter + ?Sized,
    {
        let params = buffer.params();
        let plan = ScaledChunkPlan::new(
            params.frame_count,
            params.sample_rate,
            self.config.scaled_chunks,
        )?;

        let data = encode_samples(&self.quantize(buffer), OUTPUT_WIDTH);
        let out_params = PcmParams {
            sample_width: OUTPUT_WIDTH,
            ..*params
        };
        let bytes_per_frame = out_params.bytes_per_frame();

        let mut session = SinkSession::open(sink, out_params)?;
        self.state.open()?;
        progress.start(plan.chunk_count);
        self.state.stream()?;

        let mut offset = 0;
        for i in 0..plan.chunk_count {
            let frames = plan.frames_in_chunk(i);
            let end = offset + frames * bytes_per_frame;
            session.write(&data[offset..end], frames)?;
            debug!(
                "chunk {}/{}: frames [{} ~ {})",
                i + 1,
                plan.chunk_count,
                offset / bytes_per_frame,
                end / bytes_per_frame
            );
            offset = end;
            progress.update(i + 1);
        }

        progress.finish();
        session.close()?;
        self.state.finish()?;
        info!(
            "played {:.2} sec. of scaled audio in {} chunks",
            buffer.duration_seconds(),
            plan.chunk_count
        );

        Ok(PlaybackReport {
            range: FrameRange {
                start_frame: 0,
                frame_count: params.frame_count,
            },
            chunks_written: plan.chunk_count,
            frames_written: params.frame_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::tests::FailingSink;
    use crate::progress::tests::{Event, RecordingProgress};
    use crate::sink::MemorySink;

    fn player_with(config: PlaybackConfig) -> ScaledPlayer {
        ScaledPlayer::new(config).unwrap()
    }

    #[test]
    fn long_buffers_use_target_chunk_count() {
        // 25 s at 100 Hz with 20 target chunks
        let plan = ScaledChunkPlan::new(2503, 100, 20).unwrap();
        assert_eq!(plan.chunk_count, 20);
        assert_eq!(plan.chunk_frames, 125);
        assert_eq!(plan.last_chunk_frames, 2503 - 19 * 125);
    }

    #[test]
    fn short_buffers_use_one_second_chunks() {
        let plan = ScaledChunkPlan::new(350, 100, 20).unwrap();
        assert_eq!(plan.chunk_count, 4);
        assert_eq!(plan.chunk_frames, 100);
        assert_eq!(plan.last_chunk_frames, 50);

        let exact = ScaledChunkPlan::new(300, 100, 20).unwrap();
        assert_eq!(exact.chunk_count, 3);
        assert_eq!(exact.last_chunk_frames, 100);

        // exactly `target_chunks` seconds still uses one-second chunks
        let boundary = ScaledChunkPlan::new(2000, 100, 20).unwrap();
        assert_eq!(boundary.chunk_count, 20);
        assert_eq!(boundary.chunk_frames, 100);
    }

    #[test]
    fn plays_float_buffer_scaled_to_16_bit() {
        let samples: Vec<f32> = (0..700).map(|i| (i as f32 / 700.0) - 0.5).collect();
        let buffer = SampleBuffer::from_float(1, 2, 200, samples.clone()).unwrap();
        let mut sink = MemorySink::new();
        let mut progress = RecordingProgress::default();
        let mut player = player_with(PlaybackConfig::default());

        let report = player.play(&buffer, &mut sink, &mut progress).unwrap();

        // 3.5 s -> four one-second chunks, the last one half full
        assert_eq!(report.chunks_written, 4);
        assert_eq!(sink.frame_counts(), &[200, 200, 200, 100]);
        assert_eq!(progress.events[0], Event::Start(4));
        assert_eq!(progress.assert_well_formed(), vec![1, 2, 3, 4]);
        assert_eq!(player.state(), PlaybackState::Finished);

        let out = sink.to_buffer().unwrap();
        assert_eq!(out.params().sample_width, 2);
        let expected: Vec<i32> = samples
            .iter()
            .map(|&s| (s as f64 * 32768.0).round_ties_even() as i32)
            .collect();
        assert_eq!(out.to_int(), expected);
    }

    #[test]
    fn custom_dmax_and_saturation() {
        let buffer = SampleBuffer::from_float(2, 2, 8000, vec![1.0, -1.0, 0.5, 2.0]).unwrap();
        let default = player_with(PlaybackConfig::default());
        assert_eq!(default.quantize(&buffer), vec![32767, -32768, 16384, 32767]);

        let custom = player_with(PlaybackConfig {
            dmax: Some(1000.0),
            ..PlaybackConfig::default()
        });
        assert_eq!(custom.quantize(&buffer), vec![1000, -1000, 500, 2000]);
    }

    #[test]
    fn integer_buffers_skip_dmax() {
        let pcm16 = SampleBuffer::from_int(1, 2, 8000, vec![123, -4567]).unwrap();
        let eight_bit = SampleBuffer::from_int(1, 1, 8000, vec![64, -128]).unwrap();
        let player = player_with(PlaybackConfig {
            dmax: Some(2.0),
            ..PlaybackConfig::default()
        });
        assert_eq!(player.quantize(&pcm16), vec![123, -4567]);
        assert_eq!(player.quantize(&eight_bit), vec![16384, -32768]);
    }

    #[test]
    fn stereo_chunks_carry_whole_frames() {
        let samples = vec![0.25f32; 2 * 150];
        let buffer = SampleBuffer::from_float(2, 2, 100, samples).unwrap();
        let mut sink = MemorySink::new();
        player_with(PlaybackConfig::default())
            .play(&buffer, &mut sink, &mut RecordingProgress::default())
            .unwrap();
        assert_eq!(sink.frame_counts(), &[100, 50]);
        assert_eq!(sink.chunks()[1].len(), 50 * 4);
    }

    #[test]
    fn empty_buffer_reports_nothing_to_play() {
        let buffer = SampleBuffer::from_float(1, 2, 8000, Vec::new()).unwrap();
        let mut sink = MemorySink::new();
        let mut progress = RecordingProgress::default();
        let report = player_with(PlaybackConfig::default())
            .play(&buffer, &mut sink, &mut progress)
            .unwrap();
        assert_eq!(report.chunks_written, 0);
        assert!(sink.chunks().is_empty());
        assert_eq!(progress.events, vec![Event::Start(0), Event::Finish]);
        assert_eq!(sink.close_count(), 1);
    }

    #[test]
    fn sink_failure_aborts_and_closes() {
        // 5 s at 100 Hz: five one-second chunks, the third write fails
        let buffer = SampleBuffer::from_float(1, 2, 100, vec![0.1; 500]).unwrap();
        let mut sink = FailingSink {
            inner: MemorySink::new(),
            fail_on_write: 3,
        };
        let mut progress = RecordingProgress::default();
        let mut player = player_with(PlaybackConfig::default());

        let err = player.play(&buffer, &mut sink, &mut progress).unwrap_err();

        assert!(matches!(err, AudioError::Device(_)));
        assert_eq!(player.state(), PlaybackState::Failed);
        assert_eq!(sink.inner.frame_counts(), &[100, 100]);
        assert_eq!(sink.inner.open_count(), 1);
        assert_eq!(sink.inner.close_count(), 1);
        assert_eq!(progress.events[0], Event::Start(5));
        assert!(!progress.events.contains(&Event::Finish));
        assert_eq!(progress.events.last(), Some(&Event::Update(2)));
    }
}
