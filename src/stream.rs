//! Decoded audio source abstraction used by voices and the loader pool.
//!
//! A `FormattedSoundStream` is a pull-based decoder: the engine asks for
//! frames and the stream fills them in, reporting how many it actually
//! produced. Implementations range from a file decoder to a procedural
//! generator; the engine never cares which.

use crate::types::SampleFormat;

/// Result of a read/seek operation that can legitimately come up short
/// (end of stream) without being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Ok,
    EndOfStream,
}

/// A sound stream's contract is stricter than a generic reader: once a
/// stream has looped (via `skip_coarse` back to a loop point), a
/// subsequent seek failure is fatal rather than recoverable, since the
/// voice has no well-defined fallback position to resume from. Callers
/// must check [`FormattedSoundStream::has_looped`] before treating a
/// seek failure as retryable.
pub trait FormattedSoundStream: Send {
    /// Native sample format of the underlying data, prior to the f32
    /// conversion this trait always returns from `read`.
    fn format(&self) -> SampleFormat;

    fn channels(&self) -> u16;

    fn sample_rate(&self) -> u32;

    /// Best-effort total frame count, when known up front (e.g. a WAV
    /// file's header). Streaming sources may return `None`.
    fn estimate_len_frames(&self) -> Option<u64>;

    /// Decode up to `out.len() / channels()` frames into `out`
    /// (interleaved), returning the number of frames written.
    fn read(&mut self, out: &mut [f32]) -> (usize, StreamOutcome);

    /// Seek to an exact frame position. Returns `false` on failure.
    ///
    /// # Fatal seek contract
    ///
    /// If this stream has already looped (see `has_looped`) and this
    /// seek fails, the caller must treat the voice as unrecoverable and
    /// stop it rather than retry: a stream that cannot honor a loop-back
    /// seek has no safe position to resume decoding from.
    fn skip_precise(&mut self, frame: u64) -> bool;

    /// Seek approximately to `frame`, allowed to land on the nearest
    /// keyframe/block boundary at or before it. Used for coarse
    /// scrubbing where exactness is not required.
    fn skip_coarse(&mut self, frame: u64) -> bool;

    /// Whether this stream instance has looped at least once.
    fn has_looped(&self) -> bool;

    /// Duplicate this stream's decode state so a second voice can play
    /// the same underlying sound independently (e.g. two overlapping
    /// triggers of the same one-shot).
    fn try_clone_stream(&self) -> Option<Box<dyn FormattedSoundStream>>;
}

/// Deterministic procedural tone, useful for engine tests and demos
/// without shipping audio assets.
pub struct SineWaveStream {
    sample_rate: u32,
    channels: u16,
    frequency_hz: f32,
    phase: f32,
    frame: u64,
    looped: bool,
}

impl SineWaveStream {
    pub fn new(sample_rate: u32, channels: u16, frequency_hz: f32) -> Self {
        Self {
            sample_rate,
            channels,
            frequency_hz,
            phase: 0.0,
            frame: 0,
            looped: false,
        }
    }
}

impl FormattedSoundStream for SineWaveStream {
    fn format(&self) -> SampleFormat {
        SampleFormat::Float32
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn estimate_len_frames(&self) -> Option<u64> {
        None
    }

    fn read(&mut self, out: &mut [f32]) -> (usize, StreamOutcome) {
        let channels = self.channels as usize;
        let frames = out.len() / channels;
        let step = std::f32::consts::TAU * self.frequency_hz / self.sample_rate as f32;

        for frame_idx in 0..frames {
            let value = self.phase.sin();
            for ch in 0..channels {
                out[frame_idx * channels + ch] = value;
            }
            self.phase = (self.phase + step) % std::f32::consts::TAU;
        }

        self.frame += frames as u64;
        (frames, StreamOutcome::Ok)
    }

    fn skip_precise(&mut self, frame: u64) -> bool {
        self.frame = frame;
        true
    }

    fn skip_coarse(&mut self, frame: u64) -> bool {
        self.looped = true;
        self.frame = frame;
        true
    }

    fn has_looped(&self) -> bool {
        self.looped
    }

    fn try_clone_stream(&self) -> Option<Box<dyn FormattedSoundStream>> {
        Some(Box::new(SineWaveStream::new(
            self.sample_rate,
            self.channels,
            self.frequency_hz,
        )))
    }
}

/// WAV file decoder backed by `hound`, used for both the default loader
/// pool decode path and standalone testing against real assets.
pub struct WavFileStream {
    path: std::path::PathBuf,
    reader: hound::WavReader<std::io::BufReader<std::fs::File>>,
    channels: u16,
    sample_rate: u32,
    sample_format: SampleFormat,
    frame: u64,
    total_frames: u64,
    looped: bool,
}

impl WavFileStream {
    pub fn open(path: impl Into<std::path::PathBuf>) -> Result<Self, crate::types::SmsError> {
        let path = path.into();
        let reader = hound::WavReader::open(&path)
            .map_err(|e| crate::types::SmsError::DelegateOpenFailed(e.to_string()))?;
        let spec = reader.spec();

        let sample_format = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Float, _) => SampleFormat::Float32,
            (hound::SampleFormat::Int, 8) => SampleFormat::Signed8,
            (hound::SampleFormat::Int, 16) => SampleFormat::Signed16,
            _ => SampleFormat::Float32,
        };

        let total_frames = reader.duration() as u64;

        Ok(Self {
            path,
            total_frames,
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            sample_format,
            reader,
            frame: 0,
            looped: false,
        })
    }
}

impl FormattedSoundStream for WavFileStream {
    fn format(&self) -> SampleFormat {
        self.sample_format
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn estimate_len_frames(&self) -> Option<u64> {
        Some(self.total_frames)
    }

    fn read(&mut self, out: &mut [f32]) -> (usize, StreamOutcome) {
        let channels = self.channels as usize;
        let max_frames = out.len() / channels;
        let mut written_frames = 0;

        let spec = self.reader.spec();
        let mut samples = self.reader.samples::<i32>();

        'frames: for frame_idx in 0..max_frames {
            for ch in 0..channels {
                let Some(Ok(raw)) = samples.next() else {
                    break 'frames;
                };
                let normalized = match spec.bits_per_sample {
                    8 => raw as f32 / 128.0,
                    16 => raw as f32 / 32768.0,
                    24 => raw as f32 / 8_388_608.0,
                    _ => raw as f32 / 2_147_483_648.0,
                };
                out[frame_idx * channels + ch] = normalized;
            }
            written_frames += 1;
        }

        self.frame += written_frames as u64;
        let outcome = if written_frames < max_frames {
            StreamOutcome::EndOfStream
        } else {
            StreamOutcome::Ok
        };
        (written_frames, outcome)
    }

    fn skip_precise(&mut self, frame: u64) -> bool {
        if self.reader.seek(frame as u32).is_ok() {
            self.frame = frame;
            true
        } else {
            false
        }
    }

    fn skip_coarse(&mut self, frame: u64) -> bool {
        let ok = self.skip_precise(frame);
        self.looped |= ok;
        ok
    }

    fn has_looped(&self) -> bool {
        self.looped
    }

    fn try_clone_stream(&self) -> Option<Box<dyn FormattedSoundStream>> {
        WavFileStream::open(&self.path)
            .ok()
            .map(|s| Box::new(s) as Box<dyn FormattedSoundStream>)
    }
}

/// Plays back already-decoded, already-resampled interleaved frames
/// held entirely in memory. Built from a [`crate::memory::preroll::PrerollCache`]
/// hit so a voice can start on the very block it's requested, with no
/// disk I/O on the audio thread.
pub struct CachedSoundStream {
    data: Vec<f32>,
    channels: u16,
    sample_rate: u32,
    frame: usize,
    looped: bool,
}

impl CachedSoundStream {
    pub fn new(data: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            data,
            channels,
            sample_rate,
            frame: 0,
            looped: false,
        }
    }

    fn total_frames(&self) -> usize {
        self.data.len() / self.channels.max(1) as usize
    }
}

impl FormattedSoundStream for CachedSoundStream {
    fn format(&self) -> SampleFormat {
        SampleFormat::Float32
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn estimate_len_frames(&self) -> Option<u64> {
        Some(self.total_frames() as u64)
    }

    fn read(&mut self, out: &mut [f32]) -> (usize, StreamOutcome) {
        let channels = self.channels as usize;
        let remaining_frames = self.total_frames().saturating_sub(self.frame);
        let frames = (out.len() / channels).min(remaining_frames);

        let start = self.frame * channels;
        out[..frames * channels].copy_from_slice(&self.data[start..start + frames * channels]);
        self.frame += frames;

        let outcome = if self.frame >= self.total_frames() {
            StreamOutcome::EndOfStream
        } else {
            StreamOutcome::Ok
        };
        (frames, outcome)
    }

    fn skip_precise(&mut self, frame: u64) -> bool {
        let frame = frame as usize;
        if frame > self.total_frames() {
            return false;
        }
        self.frame = frame;
        true
    }

    fn skip_coarse(&mut self, frame: u64) -> bool {
        let ok = self.skip_precise(frame);
        self.looped |= ok;
        ok
    }

    fn has_looped(&self) -> bool {
        self.looped
    }

    fn try_clone_stream(&self) -> Option<Box<dyn FormattedSoundStream>> {
        Some(Box::new(CachedSoundStream::new(self.data.clone(), self.channels, self.sample_rate)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_sound_stream_reports_end_of_stream_once_exhausted() {
        let mut stream = CachedSoundStream::new(vec![0.1, 0.2, 0.3, 0.4], 2, 44100);
        let mut buf = vec![0.0_f32; 4];
        let (frames, outcome) = stream.read(&mut buf);
        assert_eq!(frames, 2);
        assert_eq!(outcome, StreamOutcome::EndOfStream);
    }

    #[test]
    fn sine_wave_stream_fills_requested_frames() {
        let mut stream = SineWaveStream::new(44100, 2, 440.0);
        let mut buf = vec![0.0_f32; 256 * 2];
        let (frames, outcome) = stream.read(&mut buf);
        assert_eq!(frames, 256);
        assert_eq!(outcome, StreamOutcome::Ok);
        assert!(buf.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn sine_wave_stream_never_loops_on_its_own() {
        let stream = SineWaveStream::new(44100, 1, 220.0);
        assert!(!stream.has_looped());
    }
}
