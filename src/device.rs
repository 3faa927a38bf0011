//! Sound card output through cpal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, info, warn};

use crate::error::{AudioError, Result};
use crate::pcm::{decode_samples, PcmParams};
use crate::sink::AudioSink;

/// Chunks that may sit in the queue before `write` blocks.
const QUEUE_CHUNKS: usize = 4;

/// Plays frames on the default output device.
///
/// Each `write` hands one chunk to the audio callback through a bounded
/// queue and blocks while the queue is full, so a caller writing chunk after
/// chunk is paced by the device. `close` waits for the queue to drain.
pub struct DeviceSink {
    stream: Option<cpal::Stream>,
    sender: Option<SyncSender<Vec<f32>>>,
    drained: Arc<AtomicBool>,
    params: Option<PcmParams>,
    queued_frames: usize,
}

impl DeviceSink {
    pub fn new() -> Self {
        DeviceSink {
            stream: None,
            sender: None,
            drained: Arc::new(AtomicBool::new(false)),
            params: None,
            queued_frames: 0,
        }
    }
}

impl Default for DeviceSink {
    fn default() -> Self {
        Self::new()
    }
}

fn device_err<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> AudioError {
    move |e| AudioError::Device(format!("{context}: {e}"))
}

/// Feeds queued chunks into the device buffer, padding underruns with
/// silence, and raises `drained` once the sender is gone and all is played.
struct Feeder {
    receiver: Receiver<Vec<f32>>,
    current: Vec<f32>,
    pos: usize,
    drained: Arc<AtomicBool>,
}

impl Feeder {
    fn fill(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            while self.pos >= self.current.len() {
                match self.receiver.try_recv() {
                    Ok(chunk) => {
                        self.current = chunk;
                        self.pos = 0;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.drained.store(true, Ordering::Release);
                        break;
                    }
                }
            }
            *sample = match self.current.get(self.pos) {
                Some(&s) => {
                    self.pos += 1;
                    s
                }
                None => 0.0,
            };
        }
    }
}

impl AudioSink for DeviceSink {
    fn open(&mut self, params: &PcmParams) -> Result<()> {
        if self.stream.is_some() {
            return Err(AudioError::Device("device sink is already open".into()));
        }
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::Device("no output device available".into()))?;
        let config = cpal::StreamConfig {
            channels: params.channels,
            sample_rate: cpal::SampleRate(params.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (sender, receiver) = sync_channel(QUEUE_CHUNKS);
        self.drained = Arc::new(AtomicBool::new(false));
        let mut feeder = Feeder {
            receiver,
            current: Vec::new(),
            pos: 0,
            drained: self.drained.clone(),
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| feeder.fill(data),
                |err| warn!("output stream error: {}", err),
                None,
            )
            .map_err(device_err("could not open output stream"))?;
        stream.play().map_err(device_err("could not start output stream"))?;

        info!(
            "opened {} for {} ch. at {} Hz",
            device.name().unwrap_or_else(|_| "output device".into()),
            params.channels,
            params.sample_rate
        );
        self.stream = Some(stream);
        self.sender = Some(sender);
        self.params = Some(*params);
        self.queued_frames = 0;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8], frame_count: usize) -> Result<()> {
        let (Some(sender), Some(params)) = (&self.sender, &self.params) else {
            return Err(AudioError::Device("write to a closed device sink".into()));
        };
        let scale = params.full_scale();
        let samples = decode_samples(bytes, params.sample_width)
            .into_iter()
            .map(|s| (s as f64 / scale) as f32)
            .collect();
        sender
            .send(samples)
            .map_err(|_| AudioError::Device("output stream stopped".into()))?;
        self.queued_frames += frame_count;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // dropping the sender lets the callback see the end of the queue
        drop(self.sender.take());
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        let queued = self
            .params
            .take()
            .map_or(0.0, |p| self.queued_frames as f64 / p.sample_rate as f64);
        let deadline = Instant::now() + Duration::from_secs_f64(queued + 1.0);
        while !self.drained.load(Ordering::Acquire) {
            if Instant::now() > deadline {
                warn!("output device did not drain in time");
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        drop(stream);
        debug!("closed output device");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feeder() -> (SyncSender<Vec<f32>>, Feeder) {
        let (sender, receiver) = sync_channel(QUEUE_CHUNKS);
        let feeder = Feeder {
            receiver,
            current: Vec::new(),
            pos: 0,
            drained: Arc::new(AtomicBool::new(false)),
        };
        (sender, feeder)
    }

    #[test]
    fn feeder_spans_chunks_and_pads_underruns() {
        let (sender, mut feeder) = feeder();
        sender.send(vec![0.1, 0.2, 0.3]).unwrap();
        sender.send(vec![0.4]).unwrap();

        let mut out = [9.0f32; 6];
        feeder.fill(&mut out);
        assert_eq!(out, [0.1, 0.2, 0.3, 0.4, 0.0, 0.0]);
        assert!(!feeder.drained.load(Ordering::Acquire));
    }

    #[test]
    fn feeder_reports_drain_after_sender_drops() {
        let (sender, mut feeder) = feeder();
        sender.send(vec![0.5; 4]).unwrap();
        drop(sender);

        let mut out = [0.0f32; 2];
        feeder.fill(&mut out);
        assert!(!feeder.drained.load(Ordering::Acquire));
        let mut out = [0.0f32; 4];
        feeder.fill(&mut out);
        assert_eq!(out, [0.5, 0.5, 0.0, 0.0]);
        assert!(feeder.drained.load(Ordering::Acquire));
    }

    #[test]
    fn write_before_open_fails() {
        let mut sink = DeviceSink::new();
        assert!(matches!(
            sink.write(&[0, 0], 1).unwrap_err(),
            AudioError::Device(_)
        ));
        sink.close().unwrap();
    }
}
