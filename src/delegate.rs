//! Host-provided file access and diagnostics callback.
//!
//! The engine never touches a filesystem directly: every open goes
//! through a `SoundDelegate`, so hosts can serve sounds from an
//! archive, a network cache, or memory instead of plain files.

use crate::stream::FormattedSoundStream;
use crate::types::{EngineWarning, SmsError};
use std::sync::Arc;

/// Implemented by the host application. Cloned cheaply (an `Arc` wrapper
/// is provided below) and shared across the engine, loader pool, and
/// voice pool.
pub trait SoundDelegate: Send + Sync {
    /// Open `name` for playback, returning a fresh decode stream.
    /// Called both for immediate playback and from loader worker
    /// threads, so implementations must be safe to call concurrently
    /// from multiple threads.
    fn open(&self, name: &str) -> Result<Box<dyn FormattedSoundStream>, SmsError>;

    /// Receives non-fatal diagnostics synchronously. Implementations
    /// should be cheap and non-blocking: this may be called from a
    /// loader worker thread or forwarded from the engine's
    /// [`crate::warning::WarningDrain`].
    fn on_warning(&self, warning: &EngineWarning) {
        let _ = warning;
    }
}

/// Refcounted, thread-safe handle to a [`SoundDelegate`], passed freely
/// between the engine, loader workers, and commander handles.
#[derive(Clone)]
pub struct SharedDelegate(Arc<dyn SoundDelegate>);

impl SharedDelegate {
    pub fn new(delegate: impl SoundDelegate + 'static) -> Self {
        Self(Arc::new(delegate))
    }

    pub fn open(&self, name: &str) -> Result<Box<dyn FormattedSoundStream>, SmsError> {
        self.0.open(name)
    }

    pub fn on_warning(&self, warning: &EngineWarning) {
        self.0.on_warning(warning);
    }
}

/// A delegate over an in-memory name-to-stream-factory table, used for
/// tests and demos that don't need real files.
pub struct InMemoryDelegate {
    factories: dashmap::DashMap<String, Arc<dyn Fn() -> Box<dyn FormattedSoundStream> + Send + Sync>>,
}

impl InMemoryDelegate {
    pub fn new() -> Self {
        Self {
            factories: dashmap::DashMap::new(),
        }
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        factory: impl Fn() -> Box<dyn FormattedSoundStream> + Send + Sync + 'static,
    ) {
        self.factories.insert(name.into(), Arc::new(factory));
    }
}

impl Default for InMemoryDelegate {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundDelegate for InMemoryDelegate {
    fn open(&self, name: &str) -> Result<Box<dyn FormattedSoundStream>, SmsError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| SmsError::DelegateOpenFailed(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::SineWaveStream;

    #[test]
    fn in_memory_delegate_opens_registered_sounds() {
        let delegate = InMemoryDelegate::new();
        delegate.register("tone", || Box::new(SineWaveStream::new(44100, 1, 440.0)));
        let shared = SharedDelegate::new(delegate);
        assert!(shared.open("tone").is_ok());
        assert!(shared.open("missing").is_err());
    }
}
