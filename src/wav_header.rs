use std::io::{self, Cursor, Read, Write};

use crate::error::{AudioError, Result};
use crate::pcm::PcmParams;

const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Size of the canonical header written by [`WavHeader::write_to`].
pub const CANONICAL_HEADER_LEN: u64 = 44;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WavHeader {
    pub file_size: u32,
    pub format_data_length: u32,
    pub format_type: u16,
    pub number_of_channels: u16,
    pub sample_rate: u32,
    pub bytes_per_second: u32,
    pub bytes_per_frame: u16,
    pub bits_per_sample: u16,
    pub data_size: u32,
    /// Byte offset of the first sample in the file.
    pub data_start: u64,
}

fn truncated(e: io::Error) -> AudioError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        AudioError::Format("truncated WAV header".into())
    } else {
        AudioError::Io(e)
    }
}

fn read_array<const N: usize, R: Read>(reader: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(truncated)?;
    Ok(buf)
}

fn skip<R: Read>(reader: &mut R, len: u64) -> Result<()> {
    let skipped = io::copy(&mut reader.by_ref().take(len), &mut io::sink())?;
    if skipped < len {
        return Err(AudioError::Format("truncated WAV chunk".into()));
    }
    Ok(())
}

impl WavHeader {
    /// Walks the RIFF chunk list up to the start of the `data` chunk, leaving
    /// `reader` positioned on the first sample.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<WavHeader> {
        let riff = read_array::<4, _>(reader)?;
        let file_size = u32::from_le_bytes(read_array(reader)?);
        let file_type = read_array::<4, _>(reader)?;
        if &riff != b"RIFF" || &file_type != b"WAVE" {
            return Err(AudioError::Format("not a RIFF/WAVE file".into()));
        }

        let mut pos: u64 = 12;
        let mut format: Option<(u32, [u8; 16], u16)> = None;

        loop {
            let id = read_array::<4, _>(reader)?;
            let len = u32::from_le_bytes(read_array(reader)?);
            pos += 8;

            match &id {
                b"fmt " => {
                    if len < 16 {
                        return Err(AudioError::Format(format!(
                            "fmt chunk too short ({len} bytes)"
                        )));
                    }
                    let fmt = read_array::<16, _>(reader)?;
                    let mut sub_format = u16::from_le_bytes([fmt[0], fmt[1]]);
                    let mut rest = len as u64 - 16;
                    if sub_format == WAVE_FORMAT_EXTENSIBLE && rest >= 24 {
                        // cbSize, valid bits, channel mask, then the sub-format GUID
                        let ext = read_array::<10, _>(reader)?;
                        sub_format = u16::from_le_bytes([ext[8], ext[9]]);
                        rest -= 10;
                    }
                    skip(reader, rest + (len as u64 & 1))?;
                    format = Some((len, fmt, sub_format));
                }
                b"data" => {
                    let (format_data_length, fmt, format_type) = format.ok_or_else(|| {
                        AudioError::Format("data chunk precedes fmt chunk".into())
                    })?;
                    let header = WavHeader {
                        file_size,
                        format_data_length,
                        format_type,
                        number_of_channels: u16::from_le_bytes([fmt[2], fmt[3]]),
                        sample_rate: u32::from_le_bytes([fmt[4], fmt[5], fmt[6], fmt[7]]),
                        bytes_per_second: u32::from_le_bytes([fmt[8], fmt[9], fmt[10], fmt[11]]),
                        bytes_per_frame: u16::from_le_bytes([fmt[12], fmt[13]]),
                        bits_per_sample: u16::from_le_bytes([fmt[14], fmt[15]]),
                        data_size: len,
                        data_start: pos,
                    };
                    header.validate()?;
                    return Ok(header);
                }
                _ => skip(reader, len as u64 + (len as u64 & 1))?,
            }
            pos += len as u64 + (len as u64 & 1);
        }
    }

    pub fn from_bytes(header_bytes: &[u8]) -> Result<WavHeader> {
        WavHeader::read_from(&mut Cursor::new(header_bytes))
    }

    /// Canonical 44-byte PCM header for `params` followed by `data_size` bytes.
    ///
    /// Fails with `Format` when the frame size or byte rate does not fit the
    /// header's fields.
    pub fn for_params(params: &PcmParams, data_size: u32) -> Result<WavHeader> {
        params.validate()?;
        let bytes_per_frame = u16::try_from(params.bytes_per_frame())
            .map_err(|_| AudioError::Format("frame size does not fit a WAV header".into()))?;
        let bytes_per_second = params
            .bytes_per_second()
            .ok_or_else(|| AudioError::Format("byte rate does not fit a WAV header".into()))?;
        Ok(WavHeader {
            file_size: 36 + data_size + (data_size & 1),
            format_data_length: 16,
            format_type: WAVE_FORMAT_PCM,
            number_of_channels: params.channels,
            sample_rate: params.sample_rate,
            bytes_per_second,
            bytes_per_frame,
            bits_per_sample: params.sample_width * 8,
            data_size,
            data_start: CANONICAL_HEADER_LEN,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut bytes = Vec::with_capacity(CANONICAL_HEADER_LEN as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&self.file_size.to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
        bytes.extend_from_slice(&self.number_of_channels.to_le_bytes());
        bytes.extend_from_slice(&self.sample_rate.to_le_bytes());
        bytes.extend_from_slice(&self.bytes_per_second.to_le_bytes());
        bytes.extend_from_slice(&self.bytes_per_frame.to_le_bytes());
        bytes.extend_from_slice(&self.bits_per_sample.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&self.data_size.to_le_bytes());
        writer.write_all(&bytes)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.format_type != WAVE_FORMAT_PCM {
            return Err(AudioError::Format(format!(
                "only linear PCM is supported, got format type {:#06x}",
                self.format_type
            )));
        }
        if !matches!(self.bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(AudioError::Format(format!(
                "unsupported bits per sample {}",
                self.bits_per_sample
            )));
        }
        self.params().validate()?;
        let expected = self.number_of_channels as u32 * self.bits_per_sample as u32 / 8;
        if self.bytes_per_frame as u32 != expected {
            return Err(AudioError::Format(format!(
                "block align {} does not match {} channels of {} bits",
                self.bytes_per_frame, self.number_of_channels, self.bits_per_sample
            )));
        }
        Ok(())
    }

    /// Stream parameters, with the frame count implied by the data chunk size.
    pub fn params(&self) -> PcmParams {
        let frame_count = if self.bytes_per_frame == 0 {
            0
        } else {
            self.data_size as usize / self.bytes_per_frame as usize
        };
        PcmParams {
            channels: self.number_of_channels,
            sample_width: self.bits_per_sample / 8,
            sample_rate: self.sample_rate,
            frame_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: [u8; 44] = [
        82, 73, 70, 70, 58, 5, 5, 0, 87, 65, 86, 69, 102, 109, 116, 32, 16, 0, 0, 0, 1, 0, 1, 0,
        68, 172, 0, 0, 136, 88, 1, 0, 2, 0, 16, 0, 100, 97, 116, 97, 22, 5, 5, 0,
    ];

    #[test]
    fn reads_wav_header_from_bytes() {
        let header = WavHeader::from_bytes(&HEADER).unwrap();
        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.format_type, 1);
        assert_eq!(header.number_of_channels, 1);
        assert_eq!(header.bits_per_sample, 16);
        assert_eq!(header.data_size, 328982);
        assert_eq!(header.data_start, 44);
        assert_eq!(header.params().frame_count, 164491);
    }

    #[test]
    fn skips_unknown_chunks_with_padding() {
        let mut bytes = HEADER[..36].to_vec();
        bytes.extend_from_slice(b"LIST");
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3, 0]);
        bytes.extend_from_slice(&HEADER[36..]);

        let header = WavHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.data_start, 56);
        assert_eq!(header.data_size, 328982);
    }

    #[test]
    fn accepts_extensible_pcm() {
        let mut bytes = b"RIFF\0\0\0\0WAVEfmt ".to_vec();
        bytes.extend_from_slice(&40u32.to_le_bytes());
        bytes.extend_from_slice(&0xFFFEu16.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&48000u32.to_le_bytes());
        bytes.extend_from_slice(&(48000u32 * 6).to_le_bytes());
        bytes.extend_from_slice(&6u16.to_le_bytes());
        bytes.extend_from_slice(&24u16.to_le_bytes());
        bytes.extend_from_slice(&22u16.to_le_bytes());
        bytes.extend_from_slice(&24u16.to_le_bytes());
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0x10, 0, 0x80, 0, 0, 0xAA, 0, 0x38, 0x9B, 0x71]);
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&12u32.to_le_bytes());

        let header = WavHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.format_type, 1);
        let params = header.params();
        assert_eq!(params.channels, 2);
        assert_eq!(params.sample_width, 3);
        assert_eq!(params.frame_count, 2);
    }

    #[test]
    fn rejects_float_format() {
        let mut bytes = HEADER.to_vec();
        bytes[20] = 3;
        let err = WavHeader::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, AudioError::Format(_)));
    }

    #[test]
    fn rejects_zero_sample_rate() {
        let mut bytes = HEADER.to_vec();
        bytes[24..28].copy_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(
            WavHeader::from_bytes(&bytes).unwrap_err(),
            AudioError::Format(_)
        ));
    }

    #[test]
    fn rejects_inconsistent_block_align() {
        let mut bytes = HEADER.to_vec();
        bytes[32] = 4;
        assert!(matches!(
            WavHeader::from_bytes(&bytes).unwrap_err(),
            AudioError::Format(_)
        ));
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(matches!(
            WavHeader::from_bytes(&HEADER[..30]).unwrap_err(),
            AudioError::Format(_)
        ));
        assert!(matches!(
            WavHeader::from_bytes(b"OggS").unwrap_err(),
            AudioError::Format(_)
        ));
    }

    #[test]
    fn writes_canonical_header() {
        let params = PcmParams::new(1, 2, 44100, 0).unwrap();
        let mut out = Vec::new();
        WavHeader::for_params(&params, 328982)
            .unwrap()
            .write_to(&mut out)
            .unwrap();
        assert_eq!(out, HEADER.to_vec());
    }

    #[test]
    fn refuses_params_that_overflow_header_fields() {
        let wide = PcmParams {
            channels: 20000,
            sample_width: 4,
            sample_rate: 8000,
            frame_count: 0,
        };
        assert!(matches!(
            WavHeader::for_params(&wide, 0).unwrap_err(),
            AudioError::Format(_)
        ));

        let fast = PcmParams {
            channels: 1,
            sample_width: 4,
            sample_rate: 2_000_000_000,
            frame_count: 0,
        };
        assert!(matches!(
            WavHeader::for_params(&fast, 0).unwrap_err(),
            AudioError::Format(_)
        ));
    }
}
