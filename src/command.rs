//! The full command surface. `Engine`, `Commander`, and `Transaction`
//! all expose the same operations; each just differs in how a
//! `Command` reaches the engine's queue.

use crate::soundtrack::Soundtrack;
use crate::types::{FadeCurve, FlowInstanceId};
use crossbeam_channel::Sender;
use std::sync::Arc;

/// Targets a set of mix buses for a fade/kill command.
#[derive(Debug, Clone)]
pub enum BusSelector {
    Named(String),
    Prefixed(String),
    AllExceptMain,
}

/// Targets a set of running flow instances for a fade/kill command.
#[derive(Debug, Clone)]
pub enum FlowSelector {
    Instance(FlowInstanceId),
    NamePrefixed(String),
    All,
}

#[derive(Debug, Clone)]
pub enum Command {
    /// Swaps in a new soundtrack by name-replacement. The soundtrack
    /// must already be parsed off the audio thread — see
    /// `Engine::parse_soundtrack` — so applying this command is just a
    /// pointer swap plus a map merge, not a text parse.
    ReplaceSoundtrack { soundtrack: Arc<Soundtrack> },

    /// Pins every sound reachable from `flow_name`'s node graph in the
    /// preroll cache, refcounted so nested precache/unprecache pairs
    /// compose (spec §3/§4.7).
    Precache { flow_name: String },
    Unprecache { flow_name: String },
    UnprecacheAll,

    SetFlowControlNumber { name: Vec<u8>, value: f32 },
    SetFlowControlString { name: Vec<u8>, value: Vec<u8> },
    ClearFlowControl { name: Vec<u8> },
    /// Clears every flow control whose name starts with `prefix` (spec
    /// §6 group 4).
    ClearPrefixedFlowControls { prefix: Vec<u8> },
    ClearAllFlowControls,

    StartFlow { flow_name: String, gain: f32, duration_frames: u64, curve: FadeCurve },

    FadeMixBus { target: BusSelector, gain: f32, duration_frames: u64, curve: FadeCurve },
    /// `fade_to(target, 0.0, ...)` that also removes the bus once the
    /// fade settles, rather than leaving it parked at zero gain.
    FadeOutMixBus { target: BusSelector, duration_frames: u64, curve: FadeCurve },
    KillMixBus { target: BusSelector },

    FadeFlow { target: FlowSelector, gain: f32, duration_frames: u64, curve: FadeCurve },
    /// Fades the flow's bus to zero and tears the flow instance down
    /// once the fade settles, rather than leaving it running silently
    /// (that's what `FadeFlow { gain: 0.0, .. }` is for).
    FadeFlowOut { target: FlowSelector, duration_frames: u64, curve: FadeCurve },
    KillFlow { target: FlowSelector },
}

/// A batch of commands applied atomically between two rendered blocks.
/// Built with [`Transaction::push`] and submitted with
/// [`Transaction::commit`]; nothing in the batch takes effect until the
/// whole batch is enqueued.
pub struct Transaction {
    tx: Sender<QueuedCommand>,
    pending: Vec<Command>,
}

pub(crate) enum QueuedCommand {
    Single(Command),
    Batch(Vec<Command>),
}

impl Transaction {
    pub(crate) fn new(tx: Sender<QueuedCommand>, capacity_hint: usize) -> Self {
        Self { tx, pending: Vec::with_capacity(capacity_hint) }
    }

    pub fn push(&mut self, command: Command) -> &mut Self {
        self.pending.push(command);
        self
    }

    /// Submit every pushed command as one atomic batch. Commands already
    /// pushed remain queued if this is called again without further
    /// pushes (a no-op re-send), mirroring `Commander`'s fire-and-forget
    /// semantics rather than consuming `self`.
    pub fn commit(&mut self) -> bool {
        if self.pending.is_empty() {
            return true;
        }
        let batch = std::mem::take(&mut self.pending);
        self.tx.try_send(QueuedCommand::Batch(batch)).is_ok()
    }
}

/// Cheap, cloneable, cross-thread handle used to send individual
/// commands to the engine without going through a `Transaction`.
#[derive(Clone)]
pub struct Commander {
    tx: Sender<QueuedCommand>,
}

impl Commander {
    pub(crate) fn new(tx: Sender<QueuedCommand>) -> Self {
        Self { tx }
    }

    /// Enqueue a single command. Returns `false` if the engine's queue is
    /// full or the engine has been dropped; callers on a non-realtime
    /// thread may retry, but this never blocks.
    pub fn send(&self, command: Command) -> bool {
        self.tx.try_send(QueuedCommand::Single(command)).is_ok()
    }

    /// `hint` presizes the transaction's pending-command buffer; pass
    /// the number of commands you expect to `push` to avoid
    /// reallocating as a large batch is built up.
    pub fn begin_transaction(&self, hint: usize) -> Transaction {
        Transaction::new(self.tx.clone(), hint)
    }
}
