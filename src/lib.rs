//! Chunked PCM playback and speed/pitch transforms.

pub mod audio_source;
pub mod config;
#[cfg(feature = "device")]
pub mod device;
pub mod error;
pub mod pcm;
pub mod player;
pub mod player_state;
pub mod progress;
pub mod scaled;
pub mod sink;
pub mod speed;
pub mod stretch;
pub mod wav;
pub mod wav_header;

pub use audio_source::AudioSource;
pub use config::PlaybackConfig;
#[cfg(feature = "device")]
pub use device::DeviceSink;
pub use error::{AudioError, Result};
pub use pcm::{FrameRange, PcmParams, SampleBuffer, Samples};
pub use player::{ChunkedPlayer, PlayWindow, PlaybackReport};
pub use player_state::PlaybackState;
pub use progress::{LogProgress, NoProgress, ProgressReporter, TextBar};
pub use scaled::ScaledPlayer;
pub use sink::{AudioSink, MemorySink, WavSink};
pub use speed::{
    change_speed_only, change_speed_with_pitch, resample_speed_with_pitch, SpeedChangeRequest,
};
pub use stretch::{PhaseVocoder, TimeStretcher};
pub use wav::{wav_duration, write_wav, WavSource};
