//! A single playing sound instance: owns a decode stream, its own
//! resampler, and a fade envelope, and accumulates its output into a
//! named mix bus every block.

use crate::delegate::SharedDelegate;
use crate::resample::{remap_channels, StreamResampler};
use crate::stream::{FormattedSoundStream, StreamOutcome};
use crate::types::{EngineWarning, FadeCurve, VoiceId};
use crate::warning::WarningSink;

#[derive(Debug, Clone, Copy)]
struct VoiceFade {
    curve: FadeCurve,
    from_gain: f32,
    to_gain: f32,
    elapsed_frames: u64,
    duration_frames: u64,
}

impl VoiceFade {
    fn instant(gain: f32) -> Self {
        Self {
            curve: FadeCurve::Linear,
            from_gain: gain,
            to_gain: gain,
            elapsed_frames: 0,
            duration_frames: 0,
        }
    }

    fn current_gain(&self) -> f32 {
        if self.duration_frames == 0 {
            return self.to_gain;
        }
        let t = self.elapsed_frames as f32 / self.duration_frames as f32;
        self.curve.value_at(t, self.from_gain, self.to_gain)
    }

    fn retired(&self) -> bool {
        self.to_gain == 0.0 && self.elapsed_frames >= self.duration_frames
    }
}

pub struct Voice {
    pub id: VoiceId,
    pub sound_name: String,
    pub bus_name: String,
    pub looping: bool,
    pub flow_instance: Option<crate::types::FlowInstanceId>,
    stream: Box<dyn FormattedSoundStream>,
    resampler: StreamResampler,
    engine_sample_rate: u32,
    chunk_frames: usize,
    base_gain: f32,
    fade: VoiceFade,
    remap_scratch: Vec<f32>,
    stopped_after_stream_error: bool,
    reopen_delegate: Option<SharedDelegate>,
}

impl Voice {
    pub fn new(
        id: VoiceId,
        sound_name: String,
        bus_name: String,
        stream: Box<dyn FormattedSoundStream>,
        engine_sample_rate: u32,
        engine_channels: u16,
        base_gain: f32,
        looping: bool,
        chunk_frames: usize,
    ) -> Option<Self> {
        Self::with_reopen_delegate(
            id,
            sound_name,
            bus_name,
            stream,
            engine_sample_rate,
            engine_channels,
            base_gain,
            looping,
            chunk_frames,
            None,
        )
    }

    /// Like [`Voice::new`], but keeps a delegate handle so a seek that
    /// fails before the stream has ever looped (the decoder signalling
    /// "seeking unsupported" rather than "out of range") can be
    /// recovered by reopening `sound_name` from scratch instead of
    /// stalling the voice.
    ///
    /// Returns `None` if the stream's declared sample rate can't be
    /// turned into a resampler (spec §7(c): a decoder protocol
    /// violation drops the voice rather than crashing the caller).
    pub fn with_reopen_delegate(
        id: VoiceId,
        sound_name: String,
        bus_name: String,
        stream: Box<dyn FormattedSoundStream>,
        engine_sample_rate: u32,
        engine_channels: u16,
        base_gain: f32,
        looping: bool,
        chunk_frames: usize,
        reopen_delegate: Option<SharedDelegate>,
    ) -> Option<Self> {
        let _ = engine_channels;
        let resampler = StreamResampler::new(stream.sample_rate(), engine_sample_rate, stream.channels(), chunk_frames)?;
        Some(Self {
            id,
            sound_name,
            bus_name,
            looping,
            flow_instance: None,
            stream,
            resampler,
            engine_sample_rate,
            chunk_frames,
            base_gain,
            fade: VoiceFade::instant(1.0),
            remap_scratch: Vec::new(),
            stopped_after_stream_error: false,
            reopen_delegate,
        })
    }

    pub fn start_fade(&mut self, target_gain: f32, duration_frames: u64, curve: FadeCurve) {
        let current = self.fade.current_gain();
        self.fade = VoiceFade {
            curve,
            from_gain: current,
            to_gain: target_gain,
            elapsed_frames: 0,
            duration_frames,
        };
    }

    pub fn is_finished(&self) -> bool {
        self.stopped_after_stream_error || self.fade.retired()
    }

    /// Decode, resample, remap, apply the voice's fade and base gain,
    /// and accumulate into `bus_accum` (interleaved at the engine's
    /// native channel count). Returns `false` once the voice should be
    /// retired (end of stream on a non-looping sound, a fatal seek
    /// failure, or a fully settled fade-to-zero).
    pub fn process(
        &mut self,
        decode_scratch: &mut [f32],
        resample_scratch: &mut [f32],
        bus_accum: &mut [f32],
        engine_channels: u16,
        warnings: &WarningSink,
    ) -> bool {
        if self.is_finished() {
            return false;
        }

        let (decoded_frames, outcome) = self.stream.read(decode_scratch);

        if decoded_frames == 0 {
            match outcome {
                StreamOutcome::EndOfStream if self.looping => {
                    let ok = self.stream.skip_coarse(0);
                    if !ok {
                        if self.stream.has_looped() {
                            warnings.push(EngineWarning::StreamSeekFailedAfterLoop(self.sound_name.clone()));
                            self.stopped_after_stream_error = true;
                            return false;
                        }
                        if !self.reopen_stream() {
                            warnings.push(EngineWarning::StreamReopenFailed(self.sound_name.clone()));
                            self.stopped_after_stream_error = true;
                            return false;
                        }
                    }
                    return true;
                }
                _ => return false,
            }
        }

        let used_decode = &decode_scratch[..decoded_frames * self.stream.channels() as usize];
        let resampled_frames = self.resampler.process(used_decode, resample_scratch);
        let resampled = &resample_scratch[..resampled_frames * self.stream.channels() as usize];

        remap_channels(resampled, self.stream.channels(), engine_channels, &mut self.remap_scratch);

        let gain = self.base_gain * self.fade.current_gain();
        let frames = self.remap_scratch.len() / engine_channels.max(1) as usize;
        let accum_frames = bus_accum.len() / engine_channels.max(1) as usize;
        let frames = frames.min(accum_frames);

        for i in 0..frames * engine_channels as usize {
            bus_accum[i] += self.remap_scratch[i] * gain;
        }

        self.fade.elapsed_frames = (self.fade.elapsed_frames + frames as u64).min(self.fade.duration_frames);

        !self.is_finished()
    }

    /// Recovers from a seek-unsupported decoder by discarding it and
    /// opening a fresh stream for the same resource name, starting
    /// back at frame zero. Returns `false` if there is no delegate to
    /// reopen through, or the delegate's open call itself fails.
    fn reopen_stream(&mut self) -> bool {
        let Some(delegate) = self.reopen_delegate.clone() else {
            return false;
        };
        let Ok(fresh) = delegate.open(&self.sound_name) else {
            return false;
        };
        let Some(resampler) =
            StreamResampler::new(fresh.sample_rate(), self.engine_sample_rate, fresh.channels(), self.chunk_frames)
        else {
            return false;
        };
        self.resampler = resampler;
        self.stream = fresh;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::SineWaveStream;

    #[test]
    fn voice_accumulates_nonzero_signal_into_bus() {
        let stream = Box::new(SineWaveStream::new(44100, 1, 440.0));
        let mut voice = Voice::new(
            VoiceId(0),
            "tone".into(),
            "main".into(),
            stream,
            44100,
            1,
            1.0,
            false,
            256,
        )
        .unwrap();
        let (sink, _drain) = crate::warning::warning_channel();
        let mut decode = vec![0.0_f32; 4096];
        let mut resample = vec![0.0_f32; 4096];
        let mut accum = vec![0.0_f32; 256];
        let alive = voice.process(&mut decode, &mut resample, &mut accum, 1, &sink);
        assert!(alive);
        assert!(accum.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn fade_to_zero_eventually_retires_voice() {
        let stream = Box::new(SineWaveStream::new(44100, 1, 440.0));
        let mut voice = Voice::new(VoiceId(1), "tone".into(), "main".into(), stream, 44100, 1, 1.0, true, 256).unwrap();
        voice.start_fade(0.0, 256, FadeCurve::Linear);
        let (sink, _drain) = crate::warning::warning_channel();
        let mut decode = vec![0.0_f32; 4096];
        let mut resample = vec![0.0_f32; 4096];
        let mut accum = vec![0.0_f32; 256];
        voice.process(&mut decode, &mut resample, &mut accum, 1, &sink);
        assert!(voice.is_finished());
    }

    /// A stream whose `skip_coarse` fails exactly once (simulating a
    /// decoder that cannot seek) before behaving like a normal
    /// loopable tone, to exercise `Voice::reopen_stream`.
    struct SeekUnsupportedOnceStream {
        inner: SineWaveStream,
        seek_attempted: bool,
    }

    impl FormattedSoundStream for SeekUnsupportedOnceStream {
        fn format(&self) -> crate::types::SampleFormat {
            self.inner.format()
        }
        fn channels(&self) -> u16 {
            self.inner.channels()
        }
        fn sample_rate(&self) -> u32 {
            self.inner.sample_rate()
        }
        fn estimate_len_frames(&self) -> Option<u64> {
            self.inner.estimate_len_frames()
        }
        fn read(&mut self, _out: &mut [f32]) -> (usize, StreamOutcome) {
            (0, StreamOutcome::EndOfStream)
        }
        fn skip_precise(&mut self, frame: u64) -> bool {
            self.inner.skip_precise(frame)
        }
        fn skip_coarse(&mut self, _frame: u64) -> bool {
            if !self.seek_attempted {
                self.seek_attempted = true;
                false
            } else {
                true
            }
        }
        fn has_looped(&self) -> bool {
            false
        }
        fn try_clone_stream(&self) -> Option<Box<dyn FormattedSoundStream>> {
            None
        }
    }

    #[test]
    fn seek_failure_before_first_loop_reopens_via_delegate_instead_of_stalling() {
        let delegate = crate::delegate::InMemoryDelegate::new();
        delegate.register("tone", || Box::new(SineWaveStream::new(44100, 1, 440.0)));
        let shared = SharedDelegate::new(delegate);

        let stream = Box::new(SeekUnsupportedOnceStream {
            inner: SineWaveStream::new(44100, 1, 440.0),
            seek_attempted: false,
        });
        let mut voice = Voice::with_reopen_delegate(
            VoiceId(2),
            "tone".into(),
            "main".into(),
            stream,
            44100,
            1,
            1.0,
            true,
            256,
            Some(shared),
        )
        .unwrap();

        let (sink, drain) = crate::warning::warning_channel();
        let mut decode = vec![0.0_f32; 4096];
        let mut resample = vec![0.0_f32; 4096];
        let mut accum = vec![0.0_f32; 256];

        // First read drains the stream to end-of-stream, triggering the
        // failed skip_coarse and a reopen through the delegate.
        let alive = voice.process(&mut decode, &mut resample, &mut accum, 1, &sink);
        assert!(alive);
        assert!(!voice.is_finished());
        assert!(drain.drain().is_empty());

        // Second call decodes from the freshly reopened stream.
        let alive = voice.process(&mut decode, &mut resample, &mut accum, 1, &sink);
        assert!(alive);
        assert!(accum.iter().any(|&s| s != 0.0));
    }
}
