//! Soundtrack data model: the inert, cloneable description of what can
//! be played. A soundtrack is swapped into the engine atomically via
//! `replace_soundtrack`; nothing in this module touches audio hardware
//! or realtime state.

use std::collections::HashMap;

/// One playable leaf: a named sound asset with its own loop/gain
/// defaults, resolved through the host's `SoundDelegate` at play time.
#[derive(Debug, Clone)]
pub struct SoundDef {
    pub resource_name: String,
    pub looping: bool,
    pub base_gain: f32,
}

/// One entry in a sequence: the node it plays plus the per-item
/// envelope shaping spec'd alongside it (§3/§4.5: "each element carries
/// offset, gain, fade-in/out overlap").
#[derive(Debug, Clone)]
pub struct SequenceStep {
    pub node_name: String,
    pub gain: f32,
    pub offset_frames: u64,
    pub fade_in_frames: u64,
    pub fade_out_frames: u64,
}

impl SequenceStep {
    /// A step with no envelope shaping, for grammars/tests that just
    /// name a node.
    pub fn plain(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            gain: 1.0,
            offset_frames: 0,
            fade_in_frames: 0,
            fade_out_frames: 0,
        }
    }
}

/// A fixed, ordered list of steps played one after another.
#[derive(Debug, Clone)]
pub struct SequenceDef {
    pub steps: Vec<SequenceStep>,
    pub looping: bool,
}

/// One entry in a weighted-choice node.
#[derive(Debug, Clone)]
pub struct WeightedChoice {
    pub node_name: String,
    pub weight: f32,
}

/// A named point in a flow's structure. Nodes reference other nodes and
/// sounds by name; cycles are a soundtrack author error detected at
/// parse time, not at runtime.
#[derive(Debug, Clone)]
pub enum Node {
    /// Play a single sound to completion (or loop, per `SoundDef`).
    Sound(String),
    /// Play named child nodes in order.
    Sequence(SequenceDef),
    /// Pick one child uniformly at random.
    Random(Vec<String>),
    /// Pick one child using per-entry weights.
    Weighted(Vec<WeightedChoice>),
    /// Evaluate a named `FlowControls` variable and branch.
    Conditional {
        control_name: Vec<u8>,
        if_nonzero: String,
        if_zero: String,
    },
    /// Start every child node concurrently, as independent sub-instances.
    Parallel(Vec<String>),
    /// Repeat a child node, either forever or a fixed number of times.
    Loop { child: String, count: Option<u32> },
}

/// A named entry point: the node a flow starts at, plus which mix bus
/// its voices accumulate into.
#[derive(Debug, Clone)]
pub struct FlowDef {
    pub root_node: String,
    pub bus_name: String,
}

/// The full, versioned content of a soundtrack. Four independent maps
/// keyed by name; merging a soundtrack in replaces same-named entries
/// one at a time and leaves every other entry untouched (spec §4.2:
/// "for each named entry in the new source, replace the existing entry
/// of the same kind and name; other entries untouched").
#[derive(Debug, Clone, Default)]
pub struct Soundtrack {
    pub sounds: HashMap<String, SoundDef>,
    pub sequences: HashMap<String, SequenceDef>,
    pub nodes: HashMap<String, Node>,
    pub flows: HashMap<String, FlowDef>,
}

impl Soundtrack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge_replace(&mut self, incoming: Soundtrack) {
        for (name, sound) in incoming.sounds {
            self.sounds.insert(name, sound);
        }
        for (name, sequence) in incoming.sequences {
            self.sequences.insert(name, sequence);
        }
        for (name, node) in incoming.nodes {
            self.nodes.insert(name, node);
        }
        for (name, flow) in incoming.flows {
            self.flows.insert(name, flow);
        }
    }

    pub fn resolve_node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn resolve_sound(&self, name: &str) -> Option<&SoundDef> {
        self.sounds.get(name)
    }

    pub fn resolve_flow(&self, name: &str) -> Option<&FlowDef> {
        self.flows.get(name)
    }

    /// The resource name of the sound a node name resolves to directly
    /// (a bare `Node::Sound`, or the "node name is itself a sound name"
    /// shorthand), or `None` for compound node kinds. Used by the
    /// scheduler's horizon lookahead, which only needs to peek one step
    /// ahead rather than walk the whole graph.
    pub fn resolve_leaf_sound_resource(&self, node_name: &str) -> Option<String> {
        match self.nodes.get(node_name) {
            Some(Node::Sound(sound_name)) => self.sounds.get(sound_name).map(|d| d.resource_name.clone()),
            None => self.sounds.get(node_name).map(|d| d.resource_name.clone()),
            _ => None,
        }
    }

    /// Every sound resource reachable from `flow_name`'s root node,
    /// walking the full node graph (spec §3/§4.7's precache registry
    /// target). Unknown flow names yield an empty list rather than an
    /// error; precaching a typo'd flow name is a no-op, not a crash.
    pub fn reachable_sounds(&self, flow_name: &str) -> Vec<String> {
        let mut visited = std::collections::HashSet::new();
        let mut out = Vec::new();
        if let Some(flow) = self.flows.get(flow_name) {
            self.collect_reachable_sounds(&flow.root_node, &mut visited, &mut out);
        }
        out
    }

    fn collect_reachable_sounds(
        &self,
        node_name: &str,
        visited: &mut std::collections::HashSet<String>,
        out: &mut Vec<String>,
    ) {
        if !visited.insert(node_name.to_string()) {
            return;
        }
        match self.nodes.get(node_name) {
            Some(Node::Sound(sound_name)) => {
                if let Some(def) = self.sounds.get(sound_name) {
                    out.push(def.resource_name.clone());
                } else {
                    self.collect_reachable_sounds(sound_name, visited, out);
                }
            }
            Some(Node::Sequence(seq)) => {
                for step in &seq.steps {
                    self.collect_reachable_sounds(&step.node_name, visited, out);
                }
            }
            Some(Node::Random(choices)) => {
                for choice in choices {
                    self.collect_reachable_sounds(choice, visited, out);
                }
            }
            Some(Node::Weighted(choices)) => {
                for choice in choices {
                    self.collect_reachable_sounds(&choice.node_name, visited, out);
                }
            }
            Some(Node::Conditional { if_nonzero, if_zero, .. }) => {
                self.collect_reachable_sounds(if_nonzero, visited, out);
                self.collect_reachable_sounds(if_zero, visited, out);
            }
            Some(Node::Parallel(children)) => {
                for child in children {
                    self.collect_reachable_sounds(child, visited, out);
                }
            }
            Some(Node::Loop { child, .. }) => {
                self.collect_reachable_sounds(child, visited, out);
            }
            None => {
                // Shorthand: a node name that is itself a sound name,
                // mirroring `ActiveNode::from_node_name`'s fallback.
                if let Some(def) = self.sounds.get(node_name) {
                    out.push(def.resource_name.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_replace_leaves_entries_missing_from_incoming_untouched() {
        let mut track = Soundtrack::new();
        track.sounds.insert(
            "old".into(),
            SoundDef {
                resource_name: "old.wav".into(),
                looping: false,
                base_gain: 1.0,
            },
        );

        let mut incoming = Soundtrack::new();
        incoming.sounds.insert(
            "new".into(),
            SoundDef {
                resource_name: "new.wav".into(),
                looping: false,
                base_gain: 1.0,
            },
        );

        track.merge_replace(incoming);
        assert!(track.resolve_sound("old").is_some(), "merge must not drop entries absent from the incoming source");
        assert!(track.resolve_sound("new").is_some());
    }

    #[test]
    fn merge_replace_replaces_same_named_entry_in_place() {
        let mut track = Soundtrack::new();
        track.sounds.insert(
            "kick".into(),
            SoundDef {
                resource_name: "kick.wav".into(),
                looping: false,
                base_gain: 1.0,
            },
        );
        track.sounds.insert(
            "snare".into(),
            SoundDef {
                resource_name: "snare.wav".into(),
                looping: false,
                base_gain: 1.0,
            },
        );

        let mut incoming = Soundtrack::new();
        incoming.sounds.insert(
            "kick".into(),
            SoundDef {
                resource_name: "kick2.wav".into(),
                looping: true,
                base_gain: 0.5,
            },
        );

        track.merge_replace(incoming);
        assert_eq!(track.resolve_sound("kick").unwrap().resource_name, "kick2.wav");
        assert!(track.resolve_sound("kick").unwrap().looping);
        assert!(track.resolve_sound("snare").is_some(), "entries absent from the incoming source must survive the merge");
    }

    #[test]
    fn reachable_sounds_walks_sequence_and_parallel_children() {
        let mut track = Soundtrack::new();
        track.sounds.insert("kick".into(), SoundDef { resource_name: "kick.wav".into(), looping: false, base_gain: 1.0 });
        track.sounds.insert("snare".into(), SoundDef { resource_name: "snare.wav".into(), looping: false, base_gain: 1.0 });
        track.sounds.insert("hat".into(), SoundDef { resource_name: "hat.wav".into(), looping: false, base_gain: 1.0 });

        track.nodes.insert("kick_node".into(), Node::Sound("kick".into()));
        track.nodes.insert("snare_node".into(), Node::Sound("snare".into()));
        track.nodes.insert(
            "drum_seq".into(),
            Node::Sequence(SequenceDef {
                steps: vec![SequenceStep::plain("kick_node"), SequenceStep::plain("snare_node")],
                looping: true,
            }),
        );
        track.nodes.insert("hat_node".into(), Node::Sound("hat".into()));
        track.nodes.insert("root".into(), Node::Parallel(vec!["drum_seq".into(), "hat_node".into()]));
        track.flows.insert("beat".into(), FlowDef { root_node: "root".into(), bus_name: "music".into() });

        let mut reached = track.reachable_sounds("beat");
        reached.sort();
        assert_eq!(reached, vec!["hat.wav".to_string(), "kick.wav".to_string(), "snare.wav".to_string()]);
    }

    #[test]
    fn reachable_sounds_on_unknown_flow_is_empty() {
        let track = Soundtrack::new();
        assert!(track.reachable_sounds("nope").is_empty());
    }
}
