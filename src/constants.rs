//! Centralized tunables for the Second Music System engine.
//! Contains only the constants that are actually used throughout the codebase.

// Audio processing constants
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
pub const DEFAULT_BLOCK_SIZE: u32 = 512;

// Memory allocation constants
pub const DEFAULT_MEMORY_SIZE: usize = 64 * 1024 * 1024; // 64MB

// Voice and bus limits
pub const DEFAULT_MAX_VOICES: usize = 128;
pub const BUS_NAME_MAIN: &str = "main";

// Preroll cache / loader constants
pub const DEFAULT_PREROLL_CACHE_CAPACITY: usize = 256;
pub const DEFAULT_LOADER_WORKER_COUNT: usize = 2;
pub const DEFAULT_HORIZON_FRAMES: u64 = 4096;
pub const LOAD_REQUEST_CHANNEL_BOUND: usize = 1024;

// Command queue constants
pub const ENGINE_TX_CHANNEL_BOUND: usize = 1024;
pub const WARNING_CHANNEL_BOUND: usize = 256;

// Thread priority constants
pub const DEFAULT_AUDIO_PRIORITY: u8 = 80;
