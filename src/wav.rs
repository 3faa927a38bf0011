use crate::{
    audio_source::AudioSource,
    error::{AudioError, Result},
    pcm::{decode_samples, FrameRange, PcmParams, SampleBuffer, Samples},
    wav_header::WavHeader,
};

use log::debug;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Linear PCM WAV stream over any seekable reader.
pub struct WavSource<R> {
    reader: R,
    header: WavHeader,
    position: usize,
}

pub(crate) fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => AudioError::NotFound(PathBuf::from(path)),
        _ => AudioError::Io(e),
    })
}

impl WavSource<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = open_file(path.as_ref())?;
        WavSource::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> WavSource<R> {
    /// Parses the header and positions the stream on the first frame.
    pub fn new(mut reader: R) -> Result<Self> {
        let header = WavHeader::read_from(&mut reader)?;
        reader.seek(SeekFrom::Start(header.data_start))?;
        Ok(WavSource {
            reader,
            header,
            position: 0,
        })
    }

    pub fn header(&self) -> &WavHeader {
        &self.header
    }

    /// Current read position in frames.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn duration_seconds(&self) -> f64 {
        self.header.params().duration_seconds()
    }

    /// Reads exactly the frames in `range` (fewer only if the data chunk is
    /// shorter than its header claims). The returned buffer's `frame_count`
    /// is the number of frames actually read.
    pub fn read_range(&mut self, range: FrameRange) -> Result<SampleBuffer> {
        self.seek(range.start_frame)?;
        let bytes = self.read_frames(range.frame_count)?;

        let params = self.header.params();
        let samples = decode_samples(&bytes, params.sample_width);
        let buffer = SampleBuffer::new(params, Samples::Int(samples))?;

        let rate = params.sample_rate as f64;
        debug!(
            "read {:.2} sec.: {:.2} ~ {:.2} sec. ({} ~ {} frame)",
            buffer.frame_count() as f64 / rate,
            range.start_frame as f64 / rate,
            (range.start_frame + buffer.frame_count()) as f64 / rate,
            range.start_frame,
            range.start_frame + buffer.frame_count(),
        );
        Ok(buffer)
    }

    /// [`read_range`](Self::read_range) for a `(start_time, duration)` pair in
    /// seconds; `f64::INFINITY` reads to the end.
    pub fn read_times(&mut self, start_time: f64, duration: f64) -> Result<SampleBuffer> {
        let params = self.header.params();
        let range = FrameRange::from_times(
            params.sample_rate,
            params.frame_count,
            start_time,
            duration,
        )?;
        self.read_range(range)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read + Seek> AudioSource for WavSource<R> {
    fn params(&self) -> PcmParams {
        self.header.params()
    }

    fn seek(&mut self, frame: usize) -> Result<()> {
        let params = self.header.params();
        if frame > params.frame_count {
            return Err(AudioError::OutOfRange(format!(
                "frame {} is beyond the end of the stream ({} frames)",
                frame, params.frame_count
            )));
        }
        let byte_offset = self.header.data_start + (frame * params.bytes_per_frame()) as u64;
        self.reader.seek(SeekFrom::Start(byte_offset))?;
        self.position = frame;
        Ok(())
    }

    fn read_frames(&mut self, max_frames: usize) -> Result<Vec<u8>> {
        let params = self.header.params();
        let bytes_per_frame = params.bytes_per_frame();
        let frames = max_frames.min(params.frame_count.saturating_sub(self.position));

        let mut buffer = Vec::with_capacity(frames * bytes_per_frame);
        (&mut self.reader)
            .take((frames * bytes_per_frame) as u64)
            .read_to_end(&mut buffer)?;

        // a truncated data chunk can end mid-frame
        let whole_frames = buffer.len() / bytes_per_frame;
        buffer.truncate(whole_frames * bytes_per_frame);
        self.position += whole_frames;
        Ok(buffer)
    }
}

/// Writes `buffer` as a canonical linear PCM WAV file and returns the
/// parameters that were written. Float samples are quantized to the
/// buffer's sample width with saturation.
pub fn write_wav<P: AsRef<Path>>(path: P, buffer: &SampleBuffer) -> Result<PcmParams> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    let params = write_wav_to(&mut writer, buffer)?;
    writer.flush()?;
    Ok(params)
}

pub fn write_wav_to<W: Write>(writer: &mut W, buffer: &SampleBuffer) -> Result<PcmParams> {
    let data = buffer.to_bytes();
    let data_size = u32::try_from(data.len())
        .ok()
        .filter(|&size| size <= u32::MAX - 37)
        .ok_or_else(|| {
            AudioError::Format(format!("{} bytes of audio do not fit in a WAV file", data.len()))
        })?;

    let params = *buffer.params();
    WavHeader::for_params(&params, data_size)?.write_to(writer)?;
    writer.write_all(&data)?;
    if data_size & 1 == 1 {
        writer.write_all(&[0])?;
    }
    Ok(params)
}

/// Length of a WAV file in seconds.
pub fn wav_duration<P: AsRef<Path>>(path: P) -> Result<f64> {
    Ok(WavSource::open(path)?.duration_seconds())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pcm::sample_bounds;
    use std::io::Cursor;
    use std::path::PathBuf;

    /// 16-bit fixture written with hound; sample `i` of channel `c` is
    /// `(i + 1000 * c) % 30000`.
    pub(crate) fn ramp_fixture(
        dir: &Path,
        name: &str,
        channels: u16,
        sample_rate: u32,
        frames: usize,
    ) -> PathBuf {
        let path = dir.join(name);
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..frames {
            for c in 0..channels as usize {
                writer
                    .write_sample(((i + 1000 * c) % 30000) as i16)
                    .unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn reads_header_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = ramp_fixture(dir.path(), "ramp.wav", 2, 44100, 4410);

        let src = WavSource::open(&path).unwrap();
        let params = src.params();
        assert_eq!(params.sample_rate, 44100);
        assert_eq!(params.channels, 2);
        assert_eq!(params.sample_width, 2);
        assert_eq!(params.frame_count, 4410);
        assert!((src.duration_seconds() - 0.1).abs() < 1e-12);
        assert!((wav_duration(&path).unwrap() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn reads_requested_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = ramp_fixture(dir.path(), "ten_seconds.wav", 1, 16000, 160_000);

        let mut src = WavSource::open(&path).unwrap();
        let buf = src.read_times(2.0, 3.0).unwrap();

        assert_eq!(buf.frame_count(), 48_000);
        assert_eq!(buf.params().frame_count, 48_000);
        let Samples::Int(samples) = buf.samples() else {
            panic!("expected integer samples");
        };
        assert_eq!(samples[0], (32_000 % 30000) as i32);
        assert_eq!(samples[47_999], (79_999 % 30000) as i32);
        assert_eq!(src.position(), 80_000);
    }

    #[test]
    fn start_at_end_reads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = ramp_fixture(dir.path(), "short.wav", 1, 8000, 8000);

        let mut src = WavSource::open(&path).unwrap();
        let buf = src.read_times(1.0, f64::INFINITY).unwrap();
        assert_eq!(buf.frame_count(), 0);

        let err = src.read_times(1.5, f64::INFINITY).unwrap_err();
        assert!(matches!(err, AudioError::OutOfRange(_)));

        let err = src
            .read_range(FrameRange {
                start_frame: 8001,
                frame_count: 0,
            })
            .unwrap_err();
        assert!(matches!(err, AudioError::OutOfRange(_)));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = WavSource::open(dir.path().join("nope.wav")).err().unwrap();
        assert!(matches!(err, AudioError::NotFound(_)));
        assert!(matches!(
            wav_duration(dir.path().join("nope.wav")).unwrap_err(),
            AudioError::NotFound(_)
        ));
    }

    #[test]
    fn write_then_read_is_bit_identical() {
        let dir = tempfile::tempdir().unwrap();
        for width in 1..=4u16 {
            let (lo, hi) = sample_bounds(width);
            let samples: Vec<i32> = vec![lo, hi, -1, 0, 1, lo / 3, hi / 7, 42, -42];
            let buf = SampleBuffer::from_int(3, width, 22050, samples.clone()).unwrap();

            let path = dir.path().join(format!("w{width}.wav"));
            let written = write_wav(&path, &buf).unwrap();
            assert_eq!(written.frame_count, 3);

            let mut src = WavSource::open(&path).unwrap();
            assert_eq!(src.params(), written);
            let back = src.read_times(0.0, f64::INFINITY).unwrap();
            assert_eq!(back.samples(), &Samples::Int(samples), "width {width}");
        }
    }

    #[test]
    fn written_files_are_readable_by_hound() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let buf = SampleBuffer::from_float(1, 2, 16000, vec![0.0, 0.5, -0.5, 1.0, -1.0]).unwrap();
        write_wav(&path, &buf).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 16384, -16384, 32767, -32768]);
    }

    #[test]
    fn buffers_too_wide_or_fast_for_a_header_are_rejected() {
        assert!(matches!(
            SampleBuffer::from_int(1, 4, 2_000_000_000, vec![0]).unwrap_err(),
            AudioError::Format(_)
        ));
        assert!(matches!(
            SampleBuffer::from_int(20000, 4, 8000, vec![0; 20000]).unwrap_err(),
            AudioError::Format(_)
        ));

        // the widest frame that fits still round-trips
        let buf = SampleBuffer::from_int(16383, 1, 8, vec![5; 16383]).unwrap();
        let mut out = Vec::new();
        write_wav_to(&mut out, &buf).unwrap();
        let mut src = WavSource::new(Cursor::new(out)).unwrap();
        assert_eq!(src.header().params(), *buf.params());
        assert_eq!(src.read_times(0.0, f64::INFINITY).unwrap(), buf);
    }

    #[test]
    fn odd_length_data_is_padded() {
        let buf = SampleBuffer::from_int(1, 1, 8000, vec![1, 2, 3]).unwrap();
        let mut out = Vec::new();
        write_wav_to(&mut out, &buf).unwrap();
        assert_eq!(out.len(), 44 + 3 + 1);

        let mut src = WavSource::new(Cursor::new(out)).unwrap();
        let back = src.read_times(0.0, f64::INFINITY).unwrap();
        assert_eq!(back.samples(), &Samples::Int(vec![1, 2, 3]));
    }

    #[test]
    fn truncated_data_yields_short_read() {
        let buf = SampleBuffer::from_int(2, 2, 8000, (0..20).collect()).unwrap();
        let mut out = Vec::new();
        write_wav_to(&mut out, &buf).unwrap();
        // drop the last frame and a half
        out.truncate(out.len() - 6);

        let mut src = WavSource::new(Cursor::new(out)).unwrap();
        assert_eq!(src.params().frame_count, 10);
        let back = src.read_times(0.0, f64::INFINITY).unwrap();
        assert_eq!(back.frame_count(), 8);
        assert_eq!(back.params().frame_count, 8);
    }

    #[test]
    fn sequential_reads_advance_and_stop_at_end() {
        let buf = SampleBuffer::from_int(1, 2, 8000, (0..10).collect()).unwrap();
        let mut out = Vec::new();
        write_wav_to(&mut out, &buf).unwrap();

        let mut src = WavSource::new(Cursor::new(out)).unwrap();
        src.seek(6).unwrap();
        assert_eq!(src.read_frames(3).unwrap().len(), 6);
        assert_eq!(src.read_frames(3).unwrap().len(), 2);
        assert!(src.read_frames(3).unwrap().is_empty());
    }
}
