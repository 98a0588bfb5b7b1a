pub mod loader;
pub mod pool;
pub mod preroll;
pub mod voice;

pub use loader::{LoadPriority, LoadRequest, LoaderPool};
pub use pool::MemoryPool;
pub use preroll::{PrecacheState, PrerollCache};
pub use voice::VoiceScratchPool;
