//! Hierarchical gain bus tree rooted at `main`. Every voice accumulates
//! into exactly one bus; a bus's effective gain is the product of its
//! own current gain and every ancestor's, so fading a parent fades
//! everything beneath it without touching child state.

use crate::constants::BUS_NAME_MAIN;
use crate::types::FadeCurve;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct FadeEnvelope {
    curve: FadeCurve,
    from_gain: f32,
    to_gain: f32,
    elapsed_frames: u64,
    duration_frames: u64,
}

impl FadeEnvelope {
    fn instant(gain: f32) -> Self {
        Self {
            curve: FadeCurve::Linear,
            from_gain: gain,
            to_gain: gain,
            elapsed_frames: 0,
            duration_frames: 0,
        }
    }

    fn current_gain(&self) -> f32 {
        if self.duration_frames == 0 {
            return self.to_gain;
        }
        let t = self.elapsed_frames as f32 / self.duration_frames as f32;
        self.curve.value_at(t, self.from_gain, self.to_gain)
    }

    fn is_settled(&self) -> bool {
        self.elapsed_frames >= self.duration_frames
    }

    fn advance(&mut self, frames: u64) {
        self.elapsed_frames = (self.elapsed_frames + frames).min(self.duration_frames);
    }
}

#[derive(Debug, Clone)]
pub struct MixBus {
    pub parent: Option<String>,
    envelope: FadeEnvelope,
    /// Set by `fade_out`; once the envelope settles the bus is pruned
    /// from the tree at the next `advance`, per spec §4.4 ("fade_out
    /// does fade_to(0) and arms marked_for_removal to trigger at fade
    /// completion").
    scheduled_removal: bool,
}

impl MixBus {
    fn root() -> Self {
        Self {
            parent: None,
            envelope: FadeEnvelope::instant(1.0),
            scheduled_removal: false,
        }
    }
}

pub struct MixBusTree {
    buses: HashMap<String, MixBus>,
}

impl MixBusTree {
    pub fn new() -> Self {
        let mut buses = HashMap::new();
        buses.insert(BUS_NAME_MAIN.to_string(), MixBus::root());
        Self { buses }
    }

    /// Create `name` as a child of `parent` if it doesn't already exist.
    /// Implicitly creates `main` first the first time it's referenced as
    /// a parent, since every tree always has a `main` root.
    pub fn ensure_bus(&mut self, name: &str, parent: &str) {
        if self.buses.contains_key(name) {
            return;
        }
        self.buses.insert(
            name.to_string(),
            MixBus {
                parent: Some(parent.to_string()),
                envelope: FadeEnvelope::instant(1.0),
                scheduled_removal: false,
            },
        );
    }

    pub fn bus_exists(&self, name: &str) -> bool {
        self.buses.contains_key(name)
    }

    /// Begin fading `name` from its current gain to `target_gain` over
    /// `duration_frames`, along `curve`. A duration of zero applies the
    /// target gain immediately. A bus named here for the first time is
    /// created as a child of `main` with unity starting gain, per spec
    /// ("creates the bus if absent").
    pub fn fade_to(&mut self, name: &str, target_gain: f32, duration_frames: u64, curve: FadeCurve) {
        self.ensure_bus(name, BUS_NAME_MAIN);
        let bus = self.buses.get_mut(name).expect("just ensured");
        let current = bus.envelope.current_gain();
        bus.envelope = FadeEnvelope {
            curve,
            from_gain: current,
            to_gain: target_gain,
            elapsed_frames: 0,
            duration_frames,
        };
        bus.scheduled_removal = false;
    }

    /// `fade_to(name, 0.0, ...)` plus arming the bus for removal once
    /// the fade settles. `main` is never armed for removal even if
    /// named explicitly, since it must always exist (spec §3 invariant
    /// i).
    pub fn fade_out(&mut self, name: &str, duration_frames: u64, curve: FadeCurve) {
        self.fade_to(name, 0.0, duration_frames, curve);
        if name != BUS_NAME_MAIN {
            if let Some(bus) = self.buses.get_mut(name) {
                bus.scheduled_removal = true;
            }
        }
    }

    /// `fade_out` applied to every bus whose name starts with `prefix`.
    pub fn fade_out_prefixed(&mut self, prefix: &str, duration_frames: u64, curve: FadeCurve) {
        let names: Vec<String> = self.buses.keys().filter(|name| name.starts_with(prefix)).cloned().collect();
        for name in names {
            self.fade_out(&name, duration_frames, curve);
        }
    }

    /// `fade_out` applied to every bus except `main`.
    pub fn fade_out_all_except_main(&mut self, duration_frames: u64, curve: FadeCurve) {
        let names: Vec<String> =
            self.buses.keys().filter(|name| name.as_str() != BUS_NAME_MAIN).cloned().collect();
        for name in names {
            self.fade_out(&name, duration_frames, curve);
        }
    }

    /// Removes `name` from the tree immediately; the current block
    /// sees zero gain for it and subsequent prefixed/all commands no
    /// longer enumerate it. `main` is never removed.
    pub fn kill(&mut self, name: &str) {
        if name != BUS_NAME_MAIN {
            self.buses.remove(name);
        }
    }

    /// `kill` applied to every bus whose name starts with `prefix`.
    pub fn kill_prefixed(&mut self, prefix: &str) {
        self.buses.retain(|name, _| !(name.starts_with(prefix) && name != BUS_NAME_MAIN));
    }

    /// `kill` applied to every bus except `main`.
    pub fn kill_all_except_main(&mut self) {
        self.buses.retain(|name, _| name.as_str() == BUS_NAME_MAIN);
    }

    /// Apply `fade_to` to every bus whose name starts with `prefix`. An
    /// empty prefix matches every bus, `main` included.
    pub fn fade_prefixed(&mut self, prefix: &str, target_gain: f32, duration_frames: u64, curve: FadeCurve) {
        let names: Vec<String> = self
            .buses
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        for name in names {
            self.fade_to(&name, target_gain, duration_frames, curve);
        }
    }

    /// Apply `fade_to` to every bus except `main`.
    pub fn fade_all_except_main(&mut self, target_gain: f32, duration_frames: u64, curve: FadeCurve) {
        let names: Vec<String> = self
            .buses
            .keys()
            .filter(|name| name.as_str() != BUS_NAME_MAIN)
            .cloned()
            .collect();
        for name in names {
            self.fade_to(&name, target_gain, duration_frames, curve);
        }
    }

    /// Advance every bus's fade envelope by the block length just
    /// rendered, then prune any bus whose `fade_out` has settled.
    /// Called once per `turn_handle`, after voices for this block have
    /// already been mixed against the pre-advance gain (spec §3
    /// invariant ii: bus removal is deferred to end-of-block).
    pub fn advance(&mut self, frames: u64) {
        for bus in self.buses.values_mut() {
            bus.envelope.advance(frames);
        }
        self.buses
            .retain(|name, bus| name.as_str() == BUS_NAME_MAIN || !bus.scheduled_removal || !bus.envelope.is_settled());
    }

    /// Product of `name`'s own gain and every ancestor's, walking up to
    /// `main`. Returns `0.0` for an unknown bus name so a voice routed
    /// to a bus that was subsequently removed goes silent rather than
    /// panicking.
    pub fn effective_gain(&self, name: &str) -> f32 {
        let mut gain = 1.0;
        let mut current = Some(name.to_string());
        let mut hops = 0;

        while let Some(bus_name) = current {
            let Some(bus) = self.buses.get(&bus_name) else {
                return 0.0;
            };
            gain *= bus.envelope.current_gain();
            current = bus.parent.clone();

            hops += 1;
            if hops > self.buses.len() + 1 {
                // Cycle guard: should be unreachable since `ensure_bus`
                // only appends leaves, but never spin forever on
                // malformed state.
                break;
            }
        }

        gain
    }

    pub fn is_settled(&self, name: &str) -> bool {
        self.buses.get(name).map(|b| b.envelope.is_settled()).unwrap_or(true)
    }
}

impl Default for MixBusTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_bus_exists_by_default_with_unity_gain() {
        let tree = MixBusTree::new();
        assert!(tree.bus_exists("main"));
        assert_eq!(tree.effective_gain("main"), 1.0);
    }

    #[test]
    fn child_gain_multiplies_with_ancestor_gain() {
        let mut tree = MixBusTree::new();
        tree.ensure_bus("music", "main");
        tree.fade_to("main", 0.5, 0, FadeCurve::Linear);
        tree.fade_to("music", 0.5, 0, FadeCurve::Linear);
        assert!((tree.effective_gain("music") - 0.25).abs() < 1e-6);
    }

    #[test]
    fn empty_prefix_matches_main() {
        let mut tree = MixBusTree::new();
        tree.fade_prefixed("", 0.0, 0, FadeCurve::Linear);
        assert_eq!(tree.effective_gain("main"), 0.0);
    }

    #[test]
    fn unknown_bus_is_silent() {
        let tree = MixBusTree::new();
        assert_eq!(tree.effective_gain("nonexistent"), 0.0);
    }

    #[test]
    fn fade_to_creates_the_bus_if_absent() {
        let mut tree = MixBusTree::new();
        assert!(!tree.bus_exists("sfx.hit"));
        tree.fade_to("sfx.hit", 0.5, 0, FadeCurve::Linear);
        assert!(tree.bus_exists("sfx.hit"));
        assert_eq!(tree.effective_gain("sfx.hit"), 0.5);
    }

    #[test]
    fn fade_out_removes_bus_once_settled_but_not_before() {
        let mut tree = MixBusTree::new();
        tree.ensure_bus("sfx.explosion", "main");
        tree.fade_out("sfx.explosion", 100, FadeCurve::Linear);

        tree.advance(50);
        assert!(tree.bus_exists("sfx.explosion"), "bus should still exist mid-fade");

        tree.advance(50);
        assert!(!tree.bus_exists("sfx.explosion"), "bus should be pruned once its fade-out settles");
    }

    #[test]
    fn settled_fade_out_bus_is_untouched_by_later_prefixed_or_all_commands() {
        let mut tree = MixBusTree::new();
        tree.ensure_bus("sfx.explosion", "main");
        tree.fade_out("sfx.explosion", 0, FadeCurve::Linear);
        tree.advance(1);
        assert!(!tree.bus_exists("sfx.explosion"));

        // Reviving it is only possible by naming it explicitly again.
        tree.fade_prefixed("", 1.0, 0, FadeCurve::Linear);
        assert!(!tree.bus_exists("sfx.explosion"));
        tree.fade_all_except_main(1.0, 0, FadeCurve::Linear);
        assert!(!tree.bus_exists("sfx.explosion"));
    }

    #[test]
    fn kill_removes_bus_immediately_regardless_of_fade_state() {
        let mut tree = MixBusTree::new();
        tree.ensure_bus("music.theme", "main");
        tree.fade_to("music.theme", 1.0, 1000, FadeCurve::Exponential);
        tree.kill("music.theme");
        assert!(!tree.bus_exists("music.theme"));
        assert_eq!(tree.effective_gain("music.theme"), 0.0);
    }

    #[test]
    fn kill_never_removes_main() {
        let mut tree = MixBusTree::new();
        tree.kill("main");
        tree.kill_prefixed("");
        tree.kill_all_except_main();
        assert!(tree.bus_exists("main"));
    }

    #[test]
    fn fade_out_never_arms_main_for_removal() {
        let mut tree = MixBusTree::new();
        tree.fade_out("main", 0, FadeCurve::Linear);
        tree.advance(1);
        assert!(tree.bus_exists("main"));
        assert_eq!(tree.effective_gain("main"), 0.0);
    }
}
