//! Flow scheduling: turns a soundtrack's declarative `Node` graph into
//! running voices. Each started flow gets one [`flow::FlowInstance`],
//! interpreted with an explicit frame stack rather than a coroutine or
//! async task, so stepping it is just a function call from inside
//! `turn_handle` with no executor of its own.

pub mod flow;

pub use flow::{FlowInstance, FlowState};
