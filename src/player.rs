//! Chunked streaming of a PCM source into a sink.

use std::path::Path;

use log::{debug, info};

use crate::audio_source::AudioSource;
use crate::config::PlaybackConfig;
use crate::error::{AudioError, Result};
use crate::pcm::{seconds_to_frames, FrameRange, PcmParams};
use crate::player_state::{PlaybackState, PlayerState};
use crate::progress::ProgressReporter;
use crate::sink::{AudioSink, SinkSession};
use crate::wav::WavSource;

/// Portion of a stream to play, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayWindow {
    pub start_time: f64,
    /// `f64::INFINITY` plays to the end of the stream.
    pub duration: f64,
}

impl Default for PlayWindow {
    fn default() -> Self {
        PlayWindow {
            start_time: 0.0,
            duration: f64::INFINITY,
        }
    }
}

impl PlayWindow {
    pub fn new(start_time: f64, duration: f64) -> Self {
        PlayWindow {
            start_time,
            duration,
        }
    }

    pub fn resolve(&self, params: &PcmParams) -> Result<FrameRange> {
        FrameRange::from_times(
            params.sample_rate,
            params.frame_count,
            self.start_time,
            self.duration,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    /// Frames requested from the source for this chunk.
    pub frame_count: usize,
    pub is_last: bool,
}

/// How a frame range is cut into chunks.
///
/// `remainder` is measured against the whole stream, not the requested
/// range, and the trailing chunk requests a full `chunk_frames` rather than
/// the remainder. Playing a window that starts mid-file therefore almost
/// always gets one extra chunk, which reads past the window's end up to the
/// end of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub chunk_frames: usize,
    pub full_chunks: usize,
    pub remainder: usize,
}

impl ChunkPlan {
    pub fn new(total_frames: usize, range: &FrameRange, chunk_frames: usize) -> Result<ChunkPlan> {
        if chunk_frames == 0 {
            return Err(AudioError::Config("chunk size rounds to zero frames".into()));
        }
        let full_chunks = range.frame_count / chunk_frames;
        Ok(ChunkPlan {
            chunk_frames,
            full_chunks,
            remainder: total_frames.saturating_sub(full_chunks * chunk_frames),
        })
    }

    /// Number of chunks, and so of progress ticks.
    pub fn chunk_count(&self) -> usize {
        self.full_chunks + usize::from(self.remainder > 0)
    }

    pub fn chunks(&self) -> impl Iterator<Item = Chunk> {
        let count = self.chunk_count();
        let chunk_frames = self.chunk_frames;
        (0..count).map(move |index| Chunk {
            index,
            frame_count: chunk_frames,
            is_last: index + 1 == count,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackReport {
    pub range: FrameRange,
    pub chunks_written: usize,
    pub frames_written: usize,
}

/// Streams a source to a sink one chunk at a time.
///
/// Each chunk is read and written before the next one is read. The source is
/// owned for the duration of [`play`](ChunkedPlayer::play) and the sink is
/// closed on every exit path.
pub struct ChunkedPlayer {
    config: PlaybackConfig,
    state: PlayerState,
}

impl ChunkedPlayer {
    pub fn new(config: PlaybackConfig) -> Result<Self> {
        config.validate()?;
        Ok(ChunkedPlayer {
            config,
            state: PlayerState::new(),
        })
    }

    /// State of the most recent session.
    pub fn state(&self) -> PlaybackState {
        self.state.state()
    }

    pub fn chunk_frames(&self, sample_rate: u32) -> usize {
        seconds_to_frames(sample_rate, self.config.chunk_duration)
    }

    pub fn play_file<P, K, R>(
        &mut self,
        path: P,
        sink: &mut K,
        progress: &mut R,
        window: PlayWindow,
    ) -> Result<PlaybackReport>
    where
        P: AsRef<Path>,
        K: AudioSink + ?Sized,
        R: ProgressReporter + ?Sized,
    {
        self.state = PlayerState::new();
        match WavSource::open(path) {
            Ok(source) => self.play(source, sink, progress, window),
            Err(e) => {
                self.state.fail();
                Err(e)
            }
        }
    }

    pub fn play<S, K, R>(
        &mut self,
        mut source: S,
        sink: &mut K,
        progress: &mut R,
        window: PlayWindow,
    ) -> Result<PlaybackReport>
    where
        S: AudioSource,
        K: AudioSink + ?Sized,
        R: ProgressReporter + ?Sized,
    {
        self.state = PlayerState::new();
        let result = self.run(&mut source, sink, progress, window);
        if result.is_err() {
            self.state.fail();
        }
        result
    }

    fn run<S, K, R>(
        &mut self,
        source: &mut S,
        sink: &mut K,
        progress: &mut R,
        window: PlayWindow,
    ) -> Result<PlaybackReport>
    where
        S: AudioSource,
        K: AudioSink + ?Sized,
        R: ProgressReporter + ?Sized,
    {
        let params = source.params();
        let range = window.resolve(&params)?;
        let plan = ChunkPlan::new(
            params.frame_count,
            &range,
            self.chunk_frames(params.sample_rate),
        )?;

        source.seek(range.start_frame)?;
        let mut session = SinkSession::open(sink, params.with_frame_count(range.frame_count))?;
        self.state.open()?;

        progress.start(plan.chunk_count());
        self.state.stream()?;

        let bytes_per_frame = params.bytes_per_frame();
        let mut frames_written = 0;
        for chunk in plan.chunks() {
            let data = source.read_frames(chunk.frame_count)?;
            let frames = data.len() / bytes_per_frame;
            session.write(&data, frames)?;
            frames_written += frames;
            debug!(
                "chunk {}/{}: {} frames{}",
                chunk.index + 1,
                plan.chunk_count(),
                frames,
                if chunk.is_last { " (last)" } else { "" }
            );
            progress.update(chunk.index + 1);
        }

        progress.finish();
        session.close()?;
        self.state.finish()?;

        let rate = params.sample_rate as f64;
        info!(
            "played {:.2} sec.: {:.2} ~ {:.2} sec. ({} ~ {} frame)",
            range.frame_count as f64 / rate,
            range.start_frame as f64 / rate,
            range.end_frame() as f64 / rate,
            range.start_frame,
            range.end_frame(),
        );

        Ok(PlaybackReport {
            range,
            chunks_written: plan.chunk_count(),
            frames_written,
        })
    }
}
