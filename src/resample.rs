//! Sample-rate and channel-count conversion between a decoded stream's
//! native format and the engine's render format.
//!
//! Every sound can be authored at its own sample rate and channel
//! count; the mixer only ever deals in the engine's configured rate and
//! layout, so every voice runs its decode output through this stage
//! before it reaches the bus accumulator.

use rubato::{Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

/// Wraps a `rubato` sinc resampler, handling interleave/de-interleave so
/// callers only ever see the engine's native interleaved `f32` buffers.
pub struct StreamResampler {
    inner: Option<SincFixedIn<f32>>,
    channels: usize,
    scratch_in: Vec<Vec<f32>>,
    scratch_out: Vec<Vec<f32>>,
}

impl StreamResampler {
    /// Build a resampler for `from_rate` -> `to_rate` at `channels`
    /// channels. Returns a passthrough (no-op) resampler when the rates
    /// already match, since `rubato` adds latency even at a 1:1 ratio.
    ///
    /// Returns `None` rather than panicking when a decoder-reported rate
    /// produces a degenerate or invalid resample ratio (zero rates, a
    /// ratio `rubato` can't build a filter for, ...) — this can run on
    /// the audio thread when a voice reopens its stream mid-block, so a
    /// bad decoder must surface as a handled failure, not a crash (spec
    /// §7(c): decoder protocol violations are fatal to the voice, not to
    /// the engine).
    pub fn new(from_rate: u32, to_rate: u32, channels: u16, chunk_frames: usize) -> Option<Self> {
        let channels = channels.max(1) as usize;

        if from_rate == 0 || to_rate == 0 {
            return None;
        }

        if from_rate == to_rate {
            return Some(Self {
                inner: None,
                channels,
                scratch_in: vec![Vec::new(); channels],
                scratch_out: vec![Vec::new(); channels],
            });
        }

        let ratio = to_rate as f64 / from_rate as f64;
        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.92,
            oversampling_factor: 128,
            interpolation: SincInterpolationType::Linear,
            window: WindowFunction::BlackmanHarris2,
        };

        let resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_frames, channels).ok()?;

        Some(Self {
            inner: Some(resampler),
            channels,
            scratch_in: vec![Vec::with_capacity(chunk_frames); channels],
            scratch_out: Vec::new(),
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    /// Resample `input` (interleaved) into `output` (interleaved),
    /// returning the number of output frames written. `output` must be
    /// large enough for the worst-case expansion ratio.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) -> usize {
        let Some(resampler) = self.inner.as_mut() else {
            let n = input.len().min(output.len());
            output[..n].copy_from_slice(&input[..n]);
            return n / self.channels;
        };

        let frames_in = input.len() / self.channels;
        for ch in self.scratch_in.iter_mut() {
            ch.clear();
        }
        for frame in 0..frames_in {
            for ch in 0..self.channels {
                self.scratch_in[ch].push(input[frame * self.channels + ch]);
            }
        }

        let result = match resampler.process(&self.scratch_in, None) {
            Ok(frames) => frames,
            Err(_) => return 0,
        };
        self.scratch_out = result;

        let frames_out = self.scratch_out.first().map(|c| c.len()).unwrap_or(0);
        let max_frames = frames_out.min(output.len() / self.channels);
        for frame in 0..max_frames {
            for ch in 0..self.channels {
                output[frame * self.channels + ch] = self.scratch_out[ch][frame];
            }
        }
        max_frames
    }
}

/// Remaps a decoded source's channel count onto the engine's output
/// layout using simple duplication/downmix rules, applied after
/// resampling so rate conversion always runs at the source's native
/// channel count.
pub fn remap_channels(input: &[f32], in_channels: u16, out_channels: u16, output: &mut Vec<f32>) {
    output.clear();
    let in_channels = in_channels.max(1) as usize;
    let out_channels = out_channels.max(1) as usize;
    let frames = input.len() / in_channels;
    output.resize(frames * out_channels, 0.0);

    for frame in 0..frames {
        match (in_channels, out_channels) {
            (a, b) if a == b => {
                output[frame * out_channels..frame * out_channels + out_channels]
                    .copy_from_slice(&input[frame * in_channels..frame * in_channels + in_channels]);
            }
            (1, b) => {
                let value = input[frame];
                for ch in 0..b {
                    output[frame * b + ch] = value;
                }
            }
            (a, 1) => {
                let sum: f32 = input[frame * a..frame * a + a].iter().sum();
                output[frame] = sum / a as f32;
            }
            (a, b) => {
                for ch in 0..b {
                    output[frame * b + ch] = input[frame * a + (ch % a)];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_resampler_copies_input() {
        let mut resampler = StreamResampler::new(44100, 44100, 2, 256).unwrap();
        assert!(resampler.is_passthrough());
        let input = vec![0.1_f32, 0.2, 0.3, 0.4];
        let mut output = vec![0.0_f32; 4];
        let frames = resampler.process(&input, &mut output);
        assert_eq!(frames, 2);
        assert_eq!(output, input);
    }

    #[test]
    fn zero_sample_rate_fails_to_construct_instead_of_panicking() {
        assert!(StreamResampler::new(0, 44100, 2, 256).is_none());
        assert!(StreamResampler::new(44100, 0, 2, 256).is_none());
    }

    #[test]
    fn mono_to_stereo_duplicates_samples() {
        let input = vec![0.5_f32, -0.5];
        let mut output = Vec::new();
        remap_channels(&input, 1, 2, &mut output);
        assert_eq!(output, vec![0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn stereo_to_mono_averages_channels() {
        let input = vec![1.0_f32, -1.0];
        let mut output = Vec::new();
        remap_channels(&input, 2, 1, &mut output);
        assert_eq!(output, vec![0.0]);
    }
}
