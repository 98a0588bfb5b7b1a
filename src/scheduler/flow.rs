//! Explicit frame-stack interpreter for a single started flow.
//!
//! A `FlowInstance` owns a tree of [`ActiveNode`]s mirroring the
//! soundtrack's declarative node graph, advanced one `tick` per audio
//! block. There is no coroutine, generator, or async task backing this:
//! each node type knows how to resolve its next child and when it has
//! finished, and the tree is walked top-down every tick.

use crate::flow_controls::FlowControls;
use crate::soundtrack::{Node, SequenceStep, Soundtrack};
use crate::types::{FlowInstanceId, VoiceId};

/// Minimal xorshift64* generator. Not cryptographic; exists only to give
/// `Random`/`Weighted` nodes a reproducible choice sequence seeded from
/// the engine's configured seed and this instance's id, so the same
/// soundtrack replayed with the same seed always makes the same choices.
struct DeterministicRng(u64);

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    fn gen_range(&mut self, len: usize) -> usize {
        if len == 0 {
            0
        } else {
            (self.next_u64() as usize) % len
        }
    }
}

/// Caller-supplied hooks so the interpreter stays free of any knowledge
/// of the voice pool's internals.
pub trait FlowHost {
    fn start_voice(
        &mut self,
        sound_name: &str,
        bus_name: &str,
        instance: FlowInstanceId,
        looping: bool,
        base_gain: f32,
    ) -> Option<VoiceId>;
    fn is_voice_alive(&self, voice: VoiceId) -> bool;

    /// Arms a fade on an already-started voice. Used for per-sequence-step
    /// fade-in/out envelopes; a no-op default keeps test doubles that don't
    /// care about fades trivial to write.
    fn fade_voice(&mut self, _voice: VoiceId, _target_gain: f32, _duration_frames: u64) {}

    /// Asks the loader to warm `sound_name` ahead of when a voice will
    /// actually need it, within the engine's configured schedule horizon.
    /// A no-op default is fine for hosts with no loader to drive.
    fn request_horizon_load(&mut self, _sound_name: &str) {}
}

enum ActiveNode {
    Sound {
        sound_name: String,
        looping: bool,
        base_gain: f32,
        voice: Option<VoiceId>,
        finished: bool,
    },
    Sequence {
        steps: Vec<SequenceStep>,
        looping: bool,
        index: usize,
        current: Option<Box<ActiveNode>>,
        /// Frames left before `current` may be (re)created: the active
        /// step's `offset_frames`, plus any `fade_out_frames` hangtime
        /// left over from the step that just finished.
        pending_delay_frames: u64,
        /// Whether this step's `fade_in_frames` has already been armed
        /// on its voice (armed once, the first tick its voice exists).
        fade_in_armed: bool,
        /// Index for which the next step's horizon load has already
        /// been requested, so it's only submitted once per step.
        horizon_requested_index: Option<usize>,
        finished: bool,
    },
    Random {
        choices: Vec<String>,
        current: Option<Box<ActiveNode>>,
        finished: bool,
    },
    Weighted {
        choices: Vec<(String, f32)>,
        current: Option<Box<ActiveNode>>,
        finished: bool,
    },
    Conditional {
        control_name: Vec<u8>,
        if_nonzero: String,
        if_zero: String,
        current: Option<Box<ActiveNode>>,
        finished: bool,
    },
    Parallel {
        children: Vec<ActiveNode>,
        finished: bool,
    },
    Loop {
        child_name: String,
        remaining: Option<u32>,
        current: Option<Box<ActiveNode>>,
        finished: bool,
    },
    /// A node name the soundtrack doesn't define, or a leaf resolved via
    /// `Soundtrack::resolve_node` failing. Finishes instantly rather than
    /// panicking, so a bad reference silently drops that branch.
    Missing,
}

impl ActiveNode {
    fn from_node_name(name: &str, soundtrack: &Soundtrack) -> Self {
        match soundtrack.resolve_node(name) {
            Some(Node::Sound(sound_name)) => match soundtrack.resolve_sound(sound_name) {
                Some(def) => ActiveNode::Sound {
                    sound_name: def.resource_name.clone(),
                    looping: def.looping,
                    base_gain: def.base_gain,
                    voice: None,
                    finished: false,
                },
                None => ActiveNode::Missing,
            },
            Some(Node::Sequence(def)) => ActiveNode::Sequence {
                pending_delay_frames: def.steps.first().map(|s| s.offset_frames).unwrap_or(0),
                steps: def.steps.clone(),
                looping: def.looping,
                index: 0,
                current: None,
                fade_in_armed: false,
                horizon_requested_index: None,
                finished: def.steps.is_empty(),
            },
            Some(Node::Random(choices)) => ActiveNode::Random {
                choices: choices.clone(),
                current: None,
                finished: choices.is_empty(),
            },
            Some(Node::Weighted(entries)) => ActiveNode::Weighted {
                choices: entries.iter().map(|c| (c.node_name.clone(), c.weight.max(0.0))).collect(),
                current: None,
                finished: entries.is_empty(),
            },
            Some(Node::Conditional {
                control_name,
                if_nonzero,
                if_zero,
            }) => ActiveNode::Conditional {
                control_name: control_name.clone(),
                if_nonzero: if_nonzero.clone(),
                if_zero: if_zero.clone(),
                current: None,
                finished: false,
            },
            Some(Node::Parallel(children)) => ActiveNode::Parallel {
                children: children
                    .iter()
                    .map(|child_name| ActiveNode::from_node_name(child_name, soundtrack))
                    .collect(),
                finished: children.is_empty(),
            },
            Some(Node::Loop { child, count }) => ActiveNode::Loop {
                child_name: child.clone(),
                remaining: *count,
                current: None,
                finished: matches!(count, Some(0)),
            },
            None => {
                if let Some(sound) = soundtrack.resolve_sound(name) {
                    ActiveNode::Sound {
                        sound_name: sound.resource_name.clone(),
                        looping: sound.looping,
                        base_gain: sound.base_gain,
                        voice: None,
                        finished: false,
                    }
                } else {
                    ActiveNode::Missing
                }
            }
        }
    }

    /// Like `from_node_name`, but scales a resolved `Sound` leaf's base
    /// gain by `gain_multiplier` — used to apply a sequence step's own
    /// `gain` without having to special-case every node kind a step can
    /// name.
    fn from_node_name_with_gain(name: &str, soundtrack: &Soundtrack, gain_multiplier: f32) -> Self {
        let mut node = Self::from_node_name(name, soundtrack);
        if let ActiveNode::Sound { base_gain, .. } = &mut node {
            *base_gain *= gain_multiplier;
        }
        node
    }

    /// The `VoiceId` currently driving audio for this subtree, if any.
    /// Used to arm per-step fades on a sequence's active child without
    /// the sequence needing to know what kind of node it is.
    fn active_voice_id(&self) -> Option<VoiceId> {
        match self {
            ActiveNode::Sound { voice, .. } => *voice,
            ActiveNode::Sequence { current, .. }
            | ActiveNode::Random { current, .. }
            | ActiveNode::Weighted { current, .. }
            | ActiveNode::Conditional { current, .. }
            | ActiveNode::Loop { current, .. } => current.as_ref().and_then(|c| c.active_voice_id()),
            ActiveNode::Parallel { .. } | ActiveNode::Missing => None,
        }
    }

    fn is_finished(&self) -> bool {
        match self {
            ActiveNode::Sound { finished, .. }
            | ActiveNode::Sequence { finished, .. }
            | ActiveNode::Random { finished, .. }
            | ActiveNode::Weighted { finished, .. }
            | ActiveNode::Conditional { finished, .. }
            | ActiveNode::Parallel { finished, .. }
            | ActiveNode::Loop { finished, .. } => *finished,
            ActiveNode::Missing => true,
        }
    }

    fn tick(
        &mut self,
        soundtrack: &Soundtrack,
        controls: &FlowControls,
        rng: &mut DeterministicRng,
        bus_name: &str,
        instance: FlowInstanceId,
        host: &mut dyn FlowHost,
        block_frames: u64,
    ) {
        match self {
            ActiveNode::Missing => {}
            ActiveNode::Sound { sound_name, looping, base_gain, voice, finished } => {
                if *finished {
                    return;
                }
                match voice {
                    None => {
                        // Stays `None` (and not finished) until the host
                        // reports the sound is ready to play; the loader
                        // pool may need a block or two to decode it.
                        *voice = host.start_voice(sound_name, bus_name, instance, *looping, *base_gain);
                    }
                    Some(v) => {
                        if !host.is_voice_alive(*v) {
                            *finished = true;
                        }
                    }
                }
            }
            ActiveNode::Sequence {
                steps,
                looping,
                index,
                current,
                pending_delay_frames,
                fade_in_armed,
                horizon_requested_index,
                finished,
            } => {
                if *finished {
                    return;
                }
                if *pending_delay_frames > 0 {
                    *pending_delay_frames = pending_delay_frames.saturating_sub(block_frames);
                    return;
                }
                if current.is_none() {
                    let step = &steps[*index];
                    *current = Some(Box::new(ActiveNode::from_node_name_with_gain(&step.node_name, soundtrack, step.gain)));
                    *fade_in_armed = false;
                }
                if *horizon_requested_index != Some(*index) {
                    let next_index = if *index + 1 < steps.len() {
                        Some(*index + 1)
                    } else if *looping {
                        Some(0)
                    } else {
                        None
                    };
                    if let Some(next_index) = next_index {
                        if let Some(sound) = soundtrack.resolve_leaf_sound_resource(&steps[next_index].node_name) {
                            host.request_horizon_load(&sound);
                        }
                    }
                    *horizon_requested_index = Some(*index);
                }
                let fade_in_frames = steps[*index].fade_in_frames;
                let child = current.as_mut().unwrap();
                child.tick(soundtrack, controls, rng, bus_name, instance, host, block_frames);
                if !*fade_in_armed {
                    if let Some(voice) = child.active_voice_id() {
                        if fade_in_frames > 0 {
                            host.fade_voice(voice, 1.0, fade_in_frames);
                        }
                        *fade_in_armed = true;
                    }
                }
                if child.is_finished() {
                    let fade_out_frames = steps[*index].fade_out_frames;
                    *index += 1;
                    if *index >= steps.len() {
                        if *looping {
                            *index = 0;
                        } else {
                            *finished = true;
                            return;
                        }
                    }
                    *current = None;
                    *horizon_requested_index = None;
                    *pending_delay_frames = steps[*index].offset_frames + fade_out_frames;
                }
            }
            ActiveNode::Random { choices, current, finished } => {
                if *finished {
                    return;
                }
                if current.is_none() {
                    let pick = &choices[rng.gen_range(choices.len())];
                    *current = Some(Box::new(ActiveNode::from_node_name(pick, soundtrack)));
                }
                let child = current.as_mut().unwrap();
                child.tick(soundtrack, controls, rng, bus_name, instance, host, block_frames);
                if child.is_finished() {
                    *finished = true;
                }
            }
            ActiveNode::Weighted { choices, current, finished } => {
                if *finished {
                    return;
                }
                if current.is_none() {
                    let total: f32 = choices.iter().map(|(_, w)| w).sum();
                    let pick_name = if total <= 0.0 {
                        choices[rng.gen_range(choices.len())].0.clone()
                    } else {
                        let mut target = rng.next_f32() * total;
                        let mut chosen = &choices[choices.len() - 1].0;
                        for (name, weight) in choices.iter() {
                            if target < *weight {
                                chosen = name;
                                break;
                            }
                            target -= weight;
                        }
                        chosen.clone()
                    };
                    *current = Some(Box::new(ActiveNode::from_node_name(&pick_name, soundtrack)));
                }
                let child = current.as_mut().unwrap();
                child.tick(soundtrack, controls, rng, bus_name, instance, host, block_frames);
                if child.is_finished() {
                    *finished = true;
                }
            }
            ActiveNode::Conditional {
                control_name,
                if_nonzero,
                if_zero,
                current,
                finished,
            } => {
                if *finished {
                    return;
                }
                if current.is_none() {
                    let branch = if controls.is_truthy(control_name) {
                        if_nonzero.as_str()
                    } else {
                        if_zero.as_str()
                    };
                    *current = Some(Box::new(ActiveNode::from_node_name(branch, soundtrack)));
                }
                let child = current.as_mut().unwrap();
                child.tick(soundtrack, controls, rng, bus_name, instance, host, block_frames);
                if child.is_finished() {
                    *finished = true;
                }
            }
            ActiveNode::Parallel { children, finished } => {
                if *finished {
                    return;
                }
                let mut all_done = true;
                for child in children.iter_mut() {
                    child.tick(soundtrack, controls, rng, bus_name, instance, host, block_frames);
                    all_done &= child.is_finished();
                }
                if all_done {
                    *finished = true;
                }
            }
            ActiveNode::Loop { child_name, remaining, current, finished } => {
                if *finished {
                    return;
                }
                if current.is_none() {
                    *current = Some(Box::new(ActiveNode::from_node_name(child_name, soundtrack)));
                }
                let child = current.as_mut().unwrap();
                child.tick(soundtrack, controls, rng, bus_name, instance, host, block_frames);
                if child.is_finished() {
                    match remaining {
                        Some(0) => {
                            *finished = true;
                        }
                        Some(n) => {
                            *n -= 1;
                            if *n == 0 {
                                *finished = true;
                            } else {
                                *current = None;
                            }
                        }
                        None => {
                            *current = None;
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Running,
    Fading,
    Stopped,
}

pub struct FlowInstance {
    pub id: FlowInstanceId,
    pub flow_name: String,
    pub bus_name: String,
    root: ActiveNode,
    rng: DeterministicRng,
    state: FlowState,
}

impl FlowInstance {
    pub fn start(
        id: FlowInstanceId,
        flow_name: String,
        root_node_name: &str,
        bus_name: String,
        soundtrack: &Soundtrack,
        engine_seed: u64,
    ) -> Self {
        let seed = engine_seed ^ id.0.wrapping_mul(0x9E3779B97F4A7C15);
        Self {
            id,
            flow_name,
            bus_name,
            root: ActiveNode::from_node_name(root_node_name, soundtrack),
            rng: DeterministicRng::new(seed),
            state: FlowState::Running,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn mark_fading(&mut self) {
        if self.state == FlowState::Running {
            self.state = FlowState::Fading;
        }
    }

    /// A fading-out flow is considered finished from the scheduler's
    /// point of view the instant it's marked: `kill_flow`/`fade_flow_out`
    /// hand teardown off to the mix-bus tree (bus removal or a settled
    /// fade), and any voices the flow already started keep playing out
    /// through the engine's voice pool independently of this instance.
    pub fn is_finished(&self) -> bool {
        self.state != FlowState::Running || self.root.is_finished()
    }

    pub fn tick(&mut self, soundtrack: &Soundtrack, controls: &FlowControls, host: &mut dyn FlowHost, block_frames: u64) {
        if self.state != FlowState::Running {
            return;
        }
        self.root
            .tick(soundtrack, controls, &mut self.rng, &self.bus_name, self.id, host, block_frames);
        if self.root.is_finished() {
            self.state = FlowState::Stopped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soundtrack::{SequenceDef, SequenceStep, SoundDef};

    struct CountingHost {
        started: Vec<String>,
        next_voice: u64,
    }

    impl FlowHost for CountingHost {
        fn start_voice(
            &mut self,
            sound_name: &str,
            _bus_name: &str,
            _instance: FlowInstanceId,
            _looping: bool,
            _base_gain: f32,
        ) -> Option<VoiceId> {
            self.started.push(sound_name.to_string());
            let id = VoiceId(self.next_voice);
            self.next_voice += 1;
            Some(id)
        }

        fn is_voice_alive(&self, _voice: VoiceId) -> bool {
            false
        }
    }

    fn soundtrack_with_sequence() -> Soundtrack {
        let mut track = Soundtrack::new();
        track.sounds.insert(
            "a".into(),
            SoundDef { resource_name: "a.wav".into(), looping: false, base_gain: 1.0 },
        );
        track.sounds.insert(
            "b".into(),
            SoundDef { resource_name: "b.wav".into(), looping: false, base_gain: 1.0 },
        );
        track.nodes.insert("a".into(), Node::Sound("a".into()));
        track.nodes.insert("b".into(), Node::Sound("b".into()));
        track.nodes.insert(
            "seq".into(),
            Node::Sequence(SequenceDef {
                steps: vec![SequenceStep::plain("a"), SequenceStep::plain("b")],
                looping: false,
            }),
        );
        track
    }

    #[test]
    fn sequence_advances_through_steps_as_voices_finish() {
        let track = soundtrack_with_sequence();
        let mut instance = FlowInstance::start(FlowInstanceId(0), "seq".into(), "seq", "main".into(), &track, 42);
        let mut host = CountingHost { started: Vec::new(), next_voice: 0 };
        let controls = FlowControls::new();

        for _ in 0..4 {
            instance.tick(&track, &controls, &mut host, 256);
        }

        assert_eq!(host.started, vec!["a.wav", "b.wav"]);
        assert!(instance.is_finished());
    }

    #[test]
    fn missing_node_reference_finishes_immediately_without_panic() {
        let track = Soundtrack::new();
        let mut instance = FlowInstance::start(FlowInstanceId(0), "does-not-exist".into(), "does-not-exist", "main".into(), &track, 1);
        let mut host = CountingHost { started: Vec::new(), next_voice: 0 };
        let controls = FlowControls::new();
        instance.tick(&track, &controls, &mut host, 256);
        assert!(instance.is_finished());
    }

    #[test]
    fn sequence_step_offset_delays_the_step_from_starting() {
        let mut track = Soundtrack::new();
        track.sounds.insert("a".into(), SoundDef { resource_name: "a.wav".into(), looping: false, base_gain: 1.0 });
        track.nodes.insert("a".into(), Node::Sound("a".into()));
        track.nodes.insert(
            "seq".into(),
            Node::Sequence(SequenceDef {
                steps: vec![SequenceStep { node_name: "a".into(), gain: 1.0, offset_frames: 1000, fade_in_frames: 0, fade_out_frames: 0 }],
                looping: false,
            }),
        );
        let mut instance = FlowInstance::start(FlowInstanceId(0), "seq".into(), "seq", "main".into(), &track, 7);
        let mut host = CountingHost { started: Vec::new(), next_voice: 0 };
        let controls = FlowControls::new();

        instance.tick(&track, &controls, &mut host, 256);
        assert!(host.started.is_empty(), "step must wait out its offset before starting");

        for _ in 0..4 {
            instance.tick(&track, &controls, &mut host, 256);
        }
        assert_eq!(host.started, vec!["a.wav"]);
    }

    #[test]
    fn sequence_step_gain_scales_the_voice_base_gain() {
        let mut track = Soundtrack::new();
        track.sounds.insert("a".into(), SoundDef { resource_name: "a.wav".into(), looping: false, base_gain: 0.8 });
        track.nodes.insert("a".into(), Node::Sound("a".into()));
        track.nodes.insert(
            "seq".into(),
            Node::Sequence(SequenceDef {
                steps: vec![SequenceStep { node_name: "a".into(), gain: 0.5, offset_frames: 0, fade_in_frames: 0, fade_out_frames: 0 }],
                looping: false,
            }),
        );

        struct GainCapturingHost {
            gains: Vec<f32>,
        }
        impl FlowHost for GainCapturingHost {
            fn start_voice(&mut self, _sound_name: &str, _bus_name: &str, _instance: FlowInstanceId, _looping: bool, base_gain: f32) -> Option<VoiceId> {
                self.gains.push(base_gain);
                Some(VoiceId(0))
            }
            fn is_voice_alive(&self, _voice: VoiceId) -> bool {
                true
            }
        }

        let mut instance = FlowInstance::start(FlowInstanceId(0), "seq".into(), "seq", "main".into(), &track, 3);
        let mut host = GainCapturingHost { gains: Vec::new() };
        let controls = FlowControls::new();
        instance.tick(&track, &controls, &mut host, 256);

        assert_eq!(host.gains, vec![0.4]);
    }
}
