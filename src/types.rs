//! Core scalar types shared across the engine: ids, speaker layouts, sample
//! formats, fade curves and the fallible-operation error type.

use std::fmt;
use thiserror::Error;

/// Identifies a single active voice in the voice pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

/// Identifies a running flow instance (a started node, with its own
/// frame stack and lifecycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowInstanceId(pub u64);

/// Output channel layout the engine is configured to render.
///
/// Numeric values match the layout constants used by the original C
/// header so that host bindings can pass the raw integer through
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SpeakerLayout {
    Mono = 0,
    Stereo = 1,
    Headphones = 2,
    Quadraphonic = 3,
    Surround51 = 4,
    Surround71 = 5,
}

impl SpeakerLayout {
    pub fn channel_count(self) -> usize {
        match self {
            SpeakerLayout::Mono => 1,
            SpeakerLayout::Stereo | SpeakerLayout::Headphones => 2,
            SpeakerLayout::Quadraphonic => 4,
            SpeakerLayout::Surround51 => 6,
            SpeakerLayout::Surround71 => 8,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => SpeakerLayout::Mono,
            1 => SpeakerLayout::Stereo,
            2 => SpeakerLayout::Headphones,
            3 => SpeakerLayout::Quadraphonic,
            4 => SpeakerLayout::Surround51,
            5 => SpeakerLayout::Surround71,
            _ => return None,
        })
    }
}

/// Sample encoding of a decoded stream's raw frames, as reported by a
/// `FormattedSoundStream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SampleFormat {
    Unsigned8 = 0,
    Unsigned16 = 1,
    Signed8 = 2,
    Signed16 = 3,
    Float32 = 4,
}

/// Shape of a mix bus volume fade's gain-over-time curve.
///
/// Numeric values match the fade type constants used by the original
/// C header; `Exponential` is the engine-wide default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum FadeCurve {
    #[default]
    Exponential = 0,
    Logarithmic = 1,
    Linear = 2,
}

impl FadeCurve {
    /// Evaluate the curve at normalized progress `t` in `[0, 1]`, producing
    /// a gain multiplier that interpolates from `from` to `to`.
    pub fn value_at(self, t: f32, from: f32, to: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FadeCurve::Linear => from + (to - from) * t,
            FadeCurve::Exponential => {
                // Perceptually even fade: interpolate in log-amplitude space,
                // treating 0.0 as a very small floor to avoid -inf.
                let floor = 1e-4_f32;
                let a = from.max(floor);
                let b = to.max(floor);
                let value = a * (b / a).powf(t);
                if to <= floor { value * (1.0 - t) + to * t } else { value }
            }
            FadeCurve::Logarithmic => {
                // Inverse shape of Exponential: fast early movement, slow settle.
                let floor = 1e-4_f32;
                let a = from.max(floor);
                let b = to.max(floor);
                let inv_t = 1.0 - (1.0 - t).powf(2.0);
                a + (b - a) * inv_t
            }
        }
    }
}

/// Errors returned by fallible, non-realtime engine operations: engine
/// construction, soundtrack parsing, and command validation.
#[derive(Debug, Error)]
pub enum SmsError {
    #[error("failed to parse soundtrack: {0}")]
    Parse(String),

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to open sound delegate resource: {0}")]
    DelegateOpenFailed(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown bus name: {0}")]
    UnknownBus(String),

    #[error("unknown flow or node name: {0}")]
    UnknownNode(String),
}

/// Non-fatal diagnostic raised during realtime processing. Delivered to
/// the host through a [`crate::warning::WarningSink`] rather than logged
/// directly, since the audio thread must not block on I/O.
#[derive(Debug, Clone)]
pub enum EngineWarning {
    SoundNotFound(String),
    StreamReopenFailed(String),
    StreamSeekFailedAfterLoop(String),
    VoicePoolExhausted,
    PrerollCacheEvicted(String),
    LoaderQueueSaturated,
    InvalidBlockSize(usize),
}

impl fmt::Display for EngineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineWarning::SoundNotFound(name) => write!(f, "sound not found: {name}"),
            EngineWarning::StreamReopenFailed(name) => {
                write!(f, "failed to reopen stream for sound: {name}")
            }
            EngineWarning::StreamSeekFailedAfterLoop(name) => {
                write!(f, "seek after loop failed for sound: {name}")
            }
            EngineWarning::VoicePoolExhausted => write!(f, "voice pool exhausted"),
            EngineWarning::PrerollCacheEvicted(name) => {
                write!(f, "preroll cache evicted sound: {name}")
            }
            EngineWarning::LoaderQueueSaturated => write!(f, "loader queue saturated"),
            EngineWarning::InvalidBlockSize(len) => {
                write!(f, "turn_handle buffer length {len} is not a multiple of the channel count")
            }
        }
    }
}
