//! Fixed-size scratch buffer pool backing the voice array: one decode
//! buffer and one resample buffer per voice slot, bump-allocated once at
//! construction so the audio thread never allocates while playing.

use crate::memory::pool::MemoryPool;
use std::ptr::NonNull;

/// Number of interleaved frames held in each voice's decode/resample
/// scratch buffer. Sized generously above the default block size so a
/// voice can read ahead without re-allocating.
const SCRATCH_FRAMES: usize = 4096;

pub struct VoiceScratchPool {
    #[allow(dead_code)]
    pool: MemoryPool,
    max_voices: usize,
    max_channels: usize,
    decode_buffers: Vec<NonNull<f32>>,
    resample_buffers: Vec<NonNull<f32>>,
}

impl VoiceScratchPool {
    pub fn new(max_voices: usize, max_channels: usize) -> Self {
        let per_voice_bytes = SCRATCH_FRAMES * max_channels * std::mem::size_of::<f32>();
        let total_size = per_voice_bytes * max_voices * 2 + 65536;
        let pool = MemoryPool::new(total_size);

        let mut decode_buffers = Vec::with_capacity(max_voices);
        let mut resample_buffers = Vec::with_capacity(max_voices);

        for _ in 0..max_voices {
            decode_buffers.push(
                pool.allocate(per_voice_bytes, 16)
                    .expect("voice scratch pool undersized")
                    .cast(),
            );
            resample_buffers.push(
                pool.allocate(per_voice_bytes, 16)
                    .expect("voice scratch pool undersized")
                    .cast(),
            );
        }

        Self {
            pool,
            max_voices,
            max_channels,
            decode_buffers,
            resample_buffers,
        }
    }

    /// Interleaved decode scratch for `voice_id`, sized for the pool's
    /// configured channel count times [`SCRATCH_FRAMES`].
    pub fn decode_buffer(&self, voice_id: usize) -> Option<&mut [f32]> {
        if voice_id >= self.max_voices {
            return None;
        }
        unsafe {
            Some(std::slice::from_raw_parts_mut(
                self.decode_buffers[voice_id].as_ptr(),
                SCRATCH_FRAMES * self.max_channels,
            ))
        }
    }

    /// Interleaved resample scratch for `voice_id`, used as the output of
    /// the resampler stage before mixing into the owning bus.
    pub fn resample_buffer(&self, voice_id: usize) -> Option<&mut [f32]> {
        if voice_id >= self.max_voices {
            return None;
        }
        unsafe {
            Some(std::slice::from_raw_parts_mut(
                self.resample_buffers[voice_id].as_ptr(),
                SCRATCH_FRAMES * self.max_channels,
            ))
        }
    }

    pub fn scratch_frames(&self) -> usize {
        SCRATCH_FRAMES
    }
}

unsafe impl Send for VoiceScratchPool {}
unsafe impl Sync for VoiceScratchPool {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_disjoint_and_sized() {
        let pool = VoiceScratchPool::new(4, 2);
        let a = pool.decode_buffer(0).unwrap().as_mut_ptr();
        let b = pool.decode_buffer(1).unwrap().as_mut_ptr();
        assert_ne!(a, b);
        assert_eq!(pool.decode_buffer(0).unwrap().len(), SCRATCH_FRAMES * 2);
    }

    #[test]
    fn out_of_range_voice_is_none() {
        let pool = VoiceScratchPool::new(2, 2);
        assert!(pool.decode_buffer(2).is_none());
    }
}
