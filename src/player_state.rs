use log::debug;

use crate::error::{AudioError, Result};

/// Lifecycle of one playback session.
///
/// `Idle → Opened → Streaming → Finished`, with any state able to drop into
/// `Failed`. `Finished` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Opened,
    Streaming,
    Finished,
    Failed,
}

impl PlaybackState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackState::Finished | PlaybackState::Failed)
    }
}

#[derive(Debug)]
pub struct PlayerState {
    state: PlaybackState,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerState {
    pub fn new() -> Self {
        PlayerState {
            state: PlaybackState::Idle,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    fn transition(&mut self, from: PlaybackState, to: PlaybackState) -> Result<&mut Self> {
        if self.state != from {
            return Err(AudioError::Device(format!(
                "cannot move playback from {:?} to {:?}",
                self.state, to
            )));
        }
        debug!("playback {:?} -> {:?}", from, to);
        self.state = to;
        Ok(self)
    }

    pub fn open(&mut self) -> Result<&mut Self> {
        self.transition(PlaybackState::Idle, PlaybackState::Opened)
    }

    pub fn stream(&mut self) -> Result<&mut Self> {
        self.transition(PlaybackState::Opened, PlaybackState::Streaming)
    }

    pub fn finish(&mut self) -> Result<&mut Self> {
        self.transition(PlaybackState::Streaming, PlaybackState::Finished)
    }

    /// Any non-terminal state can fail; failing twice is a no-op.
    pub fn fail(&mut self) -> &mut Self {
        if !self.state.is_terminal() {
            debug!("playback {:?} -> Failed", self.state);
            self.state = PlaybackState::Failed;
        }
        self
    }
}
