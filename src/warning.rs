//! Realtime-safe delivery of non-fatal diagnostics from the audio thread.
//!
//! The audio thread must never block on I/O or take a lock that a
//! non-realtime thread might hold for long, so warnings raised during
//! `turn_handle` are pushed onto a bounded channel rather than logged
//! directly. A host drains the sink on its own schedule and may forward
//! entries to `tracing` or its own UI.

use crate::constants::WARNING_CHANNEL_BOUND;
use crate::types::EngineWarning;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

/// Producer half, held by the engine/voice pool/loader and used from any
/// thread including the audio thread. Never blocks: a full channel drops
/// the oldest-style way by simply discarding the new warning and emitting
/// a `tracing` event, since losing a diagnostic is preferable to stalling
/// rendering.
#[derive(Clone)]
pub struct WarningSink {
    tx: Sender<EngineWarning>,
}

impl WarningSink {
    pub fn push(&self, warning: EngineWarning) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(warning) {
            tracing::warn!("warning channel saturated, dropping diagnostic");
        }
    }
}

/// Consumer half, held by the host application. Drain with [`WarningDrain::try_recv`]
/// or [`WarningDrain::drain`] outside the audio callback.
pub struct WarningDrain {
    rx: Receiver<EngineWarning>,
}

impl WarningDrain {
    pub fn try_recv(&self) -> Option<EngineWarning> {
        self.rx.try_recv().ok()
    }

    pub fn drain(&self) -> Vec<EngineWarning> {
        self.rx.try_iter().collect()
    }
}

/// Create a connected sink/drain pair.
pub fn warning_channel() -> (WarningSink, WarningDrain) {
    let (tx, rx) = bounded(WARNING_CHANNEL_BOUND);
    (WarningSink { tx }, WarningDrain { rx })
}
