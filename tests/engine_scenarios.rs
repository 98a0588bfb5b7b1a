//! Crate-level scenario tests exercising `Engine` end-to-end through its
//! public command surface. Everything here runs against synthetic tones
//! and an in-memory delegate, so no real audio device or file I/O is
//! needed to drive a full render pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use second_music_system::memory::PrecacheState;
use second_music_system::{
    BusSelector, Command, DefaultTextParser, Engine, EngineConfig, FadeCurve, FlowSelector,
    InMemoryDelegate, MixBusTree, SharedDelegate, SineWaveStream,
};

fn test_delegate() -> SharedDelegate {
    let delegate = InMemoryDelegate::new();
    delegate.register("tone_a", || Box::new(SineWaveStream::new(44100, 2, 440.0)));
    delegate.register("tone_b", || Box::new(SineWaveStream::new(44100, 2, 220.0)));
    SharedDelegate::new(delegate)
}

fn test_config() -> EngineConfig {
    EngineConfig {
        sample_rate: 44100,
        block_size: 256,
        ..EngineConfig::default()
    }
}

fn block_energy(buf: &[f32]) -> f32 {
    buf.iter().map(|s| s.abs()).sum()
}

/// Repeatedly renders blocks until the predicate is satisfied or the
/// deadline passes, to ride out the loader pool's background decode
/// without relying on a fixed iteration count.
fn wait_until(engine: &mut Engine, mut predicate: impl FnMut(&[f32]) -> bool) -> bool {
    let channels = engine.channels() as usize;
    let mut block = vec![0.0_f32; channels * 256];
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        engine.turn_handle(&mut block);
        if predicate(&block) {
            return true;
        }
        if Instant::now() > deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn empty_engine_renders_silence() {
    let (mut engine, _commander, _warnings) =
        Engine::new(test_delegate(), Box::new(DefaultTextParser), test_config()).unwrap();

    let channels = engine.channels() as usize;
    let mut block = vec![0.0_f32; channels * 256];
    engine.turn_handle(&mut block);

    assert!(block.iter().all(|&s| s == 0.0));
}

#[test]
fn turn_handle_adds_to_the_buffer_instead_of_overwriting_it() {
    let (mut engine, _commander, _warnings) =
        Engine::new(test_delegate(), Box::new(DefaultTextParser), test_config()).unwrap();

    // No flows running, so the engine contributes nothing; a caller that
    // pre-mixed other audio into `out` must find it untouched.
    let channels = engine.channels() as usize;
    let mut block = vec![0.25_f32; channels * 256];
    engine.turn_handle(&mut block);

    assert!(block.iter().all(|&s| s == 0.25), "turn_handle must not overwrite a caller-seeded buffer");
}

#[test]
fn starting_a_flow_produces_energy_then_killing_it_goes_silent() {
    let (mut engine, commander, _warnings) =
        Engine::new(test_delegate(), Box::new(DefaultTextParser), test_config()).unwrap();

    let soundtrack = Engine::parse_soundtrack(
        &DefaultTextParser,
        "sound lead tone_a loop\nnode melody sound lead\nflow bgm melody bus=music\n",
    )
    .unwrap();
    commander.replace_soundtrack(Arc::new(soundtrack));
    commander.send(Command::StartFlow { flow_name: "bgm".into(), gain: 1.0, duration_frames: 0, curve: FadeCurve::Exponential });

    let became_audible = wait_until(&mut engine, |block| block_energy(block) > 0.0);
    assert!(became_audible, "flow never produced audible output");

    commander.send(Command::FadeFlow {
        target: FlowSelector::NamePrefixed("bgm".into()),
        gain: 0.0,
        duration_frames: 0,
        curve: FadeCurve::Exponential,
    });

    let channels = engine.channels() as usize;
    let mut block = vec![0.0_f32; channels * 256];
    engine.turn_handle(&mut block);
    assert_eq!(block_energy(&block), 0.0);
}

#[test]
fn transaction_applies_its_commands_atomically_on_the_next_tick() {
    let (mut engine, commander, _warnings) =
        Engine::new(test_delegate(), Box::new(DefaultTextParser), test_config()).unwrap();

    // "dark" names no node or sound, so a conditional that reads `gate`
    // as zero resolves to silence; only the atomically-set nonzero value
    // reaching the scheduler before its first tick makes this audible.
    let soundtrack = Engine::parse_soundtrack(
        &DefaultTextParser,
        "sound lead tone_a loop\n\
         node pick conditional gate lit dark\n\
         node lit sound lead\n\
         flow bgm pick bus=music\n",
    )
    .unwrap();
    commander.replace_soundtrack(Arc::new(soundtrack));

    let mut txn = commander.begin_transaction(2);
    txn.push(Command::SetFlowControlNumber { name: b"gate".to_vec(), value: 1.0 });
    txn.push(Command::StartFlow { flow_name: "bgm".into(), gain: 1.0, duration_frames: 0, curve: FadeCurve::Exponential });
    assert!(txn.commit());

    let became_audible = wait_until(&mut engine, |block| block_energy(block) > 0.0);
    assert!(became_audible, "conditional flow never produced audible output");
}

#[test]
fn prefixed_mix_bus_fade_leaves_other_buses_untouched() {
    let mut tree = MixBusTree::new();
    tree.ensure_bus("sfx.explosion", "main");
    tree.ensure_bus("sfx.footsteps", "main");
    tree.ensure_bus("music.theme", "main");

    tree.fade_prefixed("sfx.", 0.0, 0, FadeCurve::Linear);

    assert_eq!(tree.effective_gain("sfx.explosion"), 0.0);
    assert_eq!(tree.effective_gain("sfx.footsteps"), 0.0);
    assert_eq!(tree.effective_gain("music.theme"), 1.0);
    assert_eq!(tree.effective_gain("main"), 1.0);
}

#[test]
fn named_bus_fade_via_bus_selector_does_not_affect_siblings() {
    let (mut engine, commander, _warnings) =
        Engine::new(test_delegate(), Box::new(DefaultTextParser), test_config()).unwrap();

    let soundtrack = Engine::parse_soundtrack(
        &DefaultTextParser,
        "sound lead tone_a loop\n\
         sound bass tone_b loop\n\
         node melody sound lead\n\
         node low sound bass\n\
         flow music_flow melody bus=music.theme\n\
         flow sfx_flow low bus=sfx.blast\n",
    )
    .unwrap();
    commander.replace_soundtrack(Arc::new(soundtrack));
    commander.send(Command::StartFlow { flow_name: "music_flow".into(), gain: 1.0, duration_frames: 0, curve: FadeCurve::Exponential });
    commander.send(Command::StartFlow { flow_name: "sfx_flow".into(), gain: 1.0, duration_frames: 0, curve: FadeCurve::Exponential });

    let became_audible = wait_until(&mut engine, |block| block_energy(block) > 0.0);
    assert!(became_audible, "flows never produced audible output");

    commander.send(Command::KillMixBus { target: BusSelector::Prefixed("sfx.".into()) });

    // Give the fade a tick to apply, then confirm only the sfx bus is silenced.
    let channels = engine.channels() as usize;
    let mut block = vec![0.0_f32; channels * 256];
    engine.turn_handle(&mut block);
    assert!(block_energy(&block) > 0.0, "music bus should still be audible");
}

#[test]
fn precache_then_unprecache_all_before_start_does_not_crash_or_leak_refs() {
    let (mut engine, commander, _warnings) =
        Engine::new(test_delegate(), Box::new(DefaultTextParser), test_config()).unwrap();

    let soundtrack = Engine::parse_soundtrack(
        &DefaultTextParser,
        "sound lead tone_a loop\nnode melody sound lead\nflow bgm melody bus=music\n",
    )
    .unwrap();
    commander.replace_soundtrack(Arc::new(soundtrack));

    // Precaching the flow, not a raw sound name, must walk its node graph
    // down to the sound it actually plays ("tone_a").
    commander.send(Command::Precache { flow_name: "bgm".into() });

    let channels = engine.channels() as usize;
    let mut block = vec![0.0_f32; channels * 256];
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        engine.turn_handle(&mut block);
        if engine.query_precache_state("tone_a") == PrecacheState::Ready {
            break;
        }
        assert!(Instant::now() < deadline, "precache never became ready");
        std::thread::sleep(Duration::from_millis(2));
    }

    commander.send(Command::UnprecacheAll);
    engine.turn_handle(&mut block);

    commander.send(Command::StartFlow { flow_name: "bgm".into(), gain: 1.0, duration_frames: 0, curve: FadeCurve::Exponential });

    let became_audible = wait_until(&mut engine, |block| block_energy(block) > 0.0);
    assert!(became_audible, "flow should still start and decode on demand after unprecache_all");
}

#[test]
fn precache_refcount_only_walks_the_graph_on_the_rising_edge() {
    let (mut engine, commander, _warnings) =
        Engine::new(test_delegate(), Box::new(DefaultTextParser), test_config()).unwrap();

    let soundtrack = Engine::parse_soundtrack(
        &DefaultTextParser,
        "sound lead tone_a loop\nnode melody sound lead\nflow bgm melody bus=music\n",
    )
    .unwrap();
    commander.replace_soundtrack(Arc::new(soundtrack));

    commander.send(Command::Precache { flow_name: "bgm".into() });
    commander.send(Command::Precache { flow_name: "bgm".into() });

    let channels = engine.channels() as usize;
    let mut block = vec![0.0_f32; channels * 256];
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        engine.turn_handle(&mut block);
        if engine.query_precache_state("tone_a") == PrecacheState::Ready {
            break;
        }
        assert!(Instant::now() < deadline, "precache never became ready");
        std::thread::sleep(Duration::from_millis(2));
    }

    // One of the two nested precache refs is dropped; the sound must stay
    // pinned until the refcount actually reaches zero.
    commander.send(Command::Unprecache { flow_name: "bgm".into() });
    engine.turn_handle(&mut block);
    assert_eq!(engine.query_precache_state("tone_a"), PrecacheState::Ready, "nested precache must not unpin on the first unprecache");

    commander.send(Command::Unprecache { flow_name: "bgm".into() });
    engine.turn_handle(&mut block);
}

#[test]
fn starting_an_already_live_flow_degenerates_to_a_fade_instead_of_a_second_instance() {
    let (mut engine, commander, _warnings) =
        Engine::new(test_delegate(), Box::new(DefaultTextParser), test_config()).unwrap();

    let soundtrack = Engine::parse_soundtrack(
        &DefaultTextParser,
        "sound lead tone_a loop\nnode melody sound lead\nflow bgm melody bus=music\n",
    )
    .unwrap();
    commander.replace_soundtrack(Arc::new(soundtrack));
    commander.send(Command::StartFlow { flow_name: "bgm".into(), gain: 1.0, duration_frames: 0, curve: FadeCurve::Exponential });
    assert!(wait_until(&mut engine, |block| block_energy(block) > 0.0), "flow never produced audible output");

    // Re-starting the same flow name at zero gain should fade the
    // existing instance's bus to silence rather than layering a second
    // instance on top (which would keep the bus audible).
    commander.send(Command::StartFlow { flow_name: "bgm".into(), gain: 0.0, duration_frames: 0, curve: FadeCurve::Exponential });

    let channels = engine.channels() as usize;
    let mut block = vec![0.0_f32; channels * 256];
    engine.turn_handle(&mut block);
    assert_eq!(block_energy(&block), 0.0, "re-starting a live flow should fade it, not double it");
}

#[test]
fn fade_flow_out_tears_the_flow_down_once_its_bus_settles() {
    let (mut engine, commander, _warnings) =
        Engine::new(test_delegate(), Box::new(DefaultTextParser), test_config()).unwrap();

    let soundtrack = Engine::parse_soundtrack(
        &DefaultTextParser,
        "sound lead tone_a loop\nnode melody sound lead\nflow bgm melody bus=music\n",
    )
    .unwrap();
    commander.replace_soundtrack(Arc::new(soundtrack));
    commander.send(Command::StartFlow { flow_name: "bgm".into(), gain: 1.0, duration_frames: 0, curve: FadeCurve::Exponential });
    assert!(wait_until(&mut engine, |block| block_energy(block) > 0.0), "flow never produced audible output");

    commander.send(Command::FadeFlowOut {
        target: FlowSelector::NamePrefixed("".into()),
        duration_frames: 0,
        curve: FadeCurve::Exponential,
    });

    let channels = engine.channels() as usize;
    let mut block = vec![0.0_f32; channels * 256];
    engine.turn_handle(&mut block);
    assert_eq!(block_energy(&block), 0.0, "faded-out flow's bus should be silent");

    // Starting "bgm" again should spin up a fresh instance rather than
    // being mistaken for the one that just tore down.
    commander.send(Command::StartFlow { flow_name: "bgm".into(), gain: 1.0, duration_frames: 0, curve: FadeCurve::Exponential });
    assert!(
        wait_until(&mut engine, |block| block_energy(block) > 0.0),
        "flow should be restartable after fading out"
    );
}

#[test]
fn stream_that_cannot_seek_on_first_loop_reopens_instead_of_stalling() {
    use second_music_system::voice::Voice;
    use second_music_system::warning::warning_channel;
    use second_music_system::{FormattedSoundStream, StreamOutcome, VoiceId};

    struct OneShotThenSilent {
        inner: SineWaveStream,
        seek_attempted: bool,
    }

    impl FormattedSoundStream for OneShotThenSilent {
        fn format(&self) -> second_music_system::SampleFormat {
            self.inner.format()
        }
        fn channels(&self) -> u16 {
            self.inner.channels()
        }
        fn sample_rate(&self) -> u32 {
            self.inner.sample_rate()
        }
        fn estimate_len_frames(&self) -> Option<u64> {
            None
        }
        fn read(&mut self, _out: &mut [f32]) -> (usize, StreamOutcome) {
            (0, StreamOutcome::EndOfStream)
        }
        fn skip_precise(&mut self, frame: u64) -> bool {
            self.inner.skip_precise(frame)
        }
        fn skip_coarse(&mut self, _frame: u64) -> bool {
            if !self.seek_attempted {
                self.seek_attempted = true;
                false
            } else {
                true
            }
        }
        fn has_looped(&self) -> bool {
            false
        }
        fn try_clone_stream(&self) -> Option<Box<dyn FormattedSoundStream>> {
            None
        }
    }

    let delegate = InMemoryDelegate::new();
    delegate.register("flaky", || Box::new(SineWaveStream::new(44100, 1, 330.0)));
    let shared = SharedDelegate::new(delegate);

    let stream = Box::new(OneShotThenSilent {
        inner: SineWaveStream::new(44100, 1, 330.0),
        seek_attempted: false,
    });
    let mut voice = Voice::with_reopen_delegate(
        VoiceId(0),
        "flaky".into(),
        "main".into(),
        stream,
        44100,
        1,
        1.0,
        true,
        256,
        Some(shared),
    )
    .unwrap();

    let (sink, _drain) = warning_channel();
    let mut decode = vec![0.0_f32; 4096];
    let mut resample = vec![0.0_f32; 4096];
    let mut accum = vec![0.0_f32; 256];

    // First tick hits end-of-stream immediately, fails the loop-back seek,
    // and must recover by reopening rather than leaving the voice stuck.
    assert!(voice.process(&mut decode, &mut resample, &mut accum, 1, &sink));
    assert!(!voice.is_finished());

    // Second tick now decodes real audio from the freshly reopened stream.
    assert!(voice.process(&mut decode, &mut resample, &mut accum, 1, &sink));
    assert!(accum.iter().any(|&s| s != 0.0));
}

#[test]
fn clear_prefixed_flow_controls_leaves_other_namespaces_alone() {
    let (mut engine, commander, _warnings) =
        Engine::new(test_delegate(), Box::new(DefaultTextParser), test_config()).unwrap();

    commander.set_flow_control_number(b"combat.intensity", 1.0);
    commander.set_flow_control_number(b"combat.heat", 2.0);
    commander.set_flow_control_string(b"ambient.weather", b"rain".to_vec());
    engine.turn_handle(&mut vec![0.0_f32; engine.channels() as usize * 256]);

    commander.clear_prefixed_flow_controls(b"combat.");
    let mut block = vec![0.0_f32; engine.channels() as usize * 256];
    engine.turn_handle(&mut block);

    assert!(!engine.flow_controls().is_truthy(b"combat.intensity"));
    assert!(!engine.flow_controls().is_truthy(b"combat.heat"));
    assert!(engine.flow_controls().is_truthy(b"ambient.weather"));
}

#[test]
fn ergonomic_commander_and_transaction_methods_reach_the_engine() {
    let (mut engine, commander, _warnings) =
        Engine::new(test_delegate(), Box::new(DefaultTextParser), test_config()).unwrap();

    let soundtrack = Engine::parse_soundtrack(
        &DefaultTextParser,
        "sound lead tone_a loop\nnode melody sound lead\nflow bgm melody bus=music\n",
    )
    .unwrap();
    commander.replace_soundtrack(Arc::new(soundtrack));

    let mut txn = commander.begin_transaction(2);
    txn.set_flow_control_number(b"gate", 1.0);
    txn.start_flow("bgm", 1.0, 0, FadeCurve::Exponential);
    assert!(txn.commit());

    let became_audible = wait_until(&mut engine, |block| block_energy(block) > 0.0);
    assert!(became_audible, "flow started via the ergonomic method never produced audible output");

    assert!(commander.fade_flow_out(FlowSelector::NamePrefixed("bgm".into()), 0, FadeCurve::Exponential));
    let channels = engine.channels() as usize;
    let mut block = vec![0.0_f32; channels * 256];
    engine.turn_handle(&mut block);
    assert_eq!(block_energy(&block), 0.0, "fade_flow_out via the ergonomic method should have silenced the bus");
}
