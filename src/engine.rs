//! The engine: owns every piece of realtime and non-realtime state and
//! exposes the single `turn_handle` entry point a host calls once per
//! audio block.

use std::collections::HashMap;
use std::sync::Arc;

use thread_priority::{ThreadBuilder, ThreadPriority};

use crate::command::{BusSelector, Command, Commander, FlowSelector, QueuedCommand, Transaction};
use crate::constants::{
    DEFAULT_BLOCK_SIZE, DEFAULT_HORIZON_FRAMES, DEFAULT_LOADER_WORKER_COUNT, DEFAULT_MAX_VOICES,
    DEFAULT_MEMORY_SIZE, DEFAULT_PREROLL_CACHE_CAPACITY, DEFAULT_SAMPLE_RATE, ENGINE_TX_CHANNEL_BOUND,
};
use crate::delegate::SharedDelegate;
use crate::flow_controls::FlowControls;
use crate::memory::loader::{LoadPriority, LoaderPool};
use crate::memory::preroll::{PrecacheState, PrerollCache};
use crate::memory::voice::VoiceScratchPool;
use crate::mix_bus::MixBusTree;
use crate::parser::SoundtrackParser;
use crate::resample::{remap_channels, StreamResampler};
use crate::scheduler::flow::{FlowHost, FlowInstance, FlowState};
use crate::soundtrack::Soundtrack;
use crate::stream::FormattedSoundStream;
use crate::timing::HighPrecisionTimer;
use crate::types::{EngineWarning, FlowInstanceId, SmsError, SpeakerLayout, VoiceId};
use crate::voice::Voice;
use crate::warning::{warning_channel, WarningDrain, WarningSink};

/// Immutable construction-time configuration. Everything here is fixed
/// for the engine's lifetime; change it by building a new `Engine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub speaker_layout: SpeakerLayout,
    pub block_size: u32,
    pub max_voices: usize,
    pub memory_pool_size: usize,
    pub preroll_cache_capacity: usize,
    pub loader_worker_count: usize,
    pub horizon_frames: u64,
    pub engine_seed: u64,
    pub use_realtime_thread_priority: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            speaker_layout: SpeakerLayout::Stereo,
            block_size: DEFAULT_BLOCK_SIZE,
            max_voices: DEFAULT_MAX_VOICES,
            memory_pool_size: DEFAULT_MEMORY_SIZE,
            preroll_cache_capacity: DEFAULT_PREROLL_CACHE_CAPACITY,
            loader_worker_count: DEFAULT_LOADER_WORKER_COUNT,
            horizon_frames: DEFAULT_HORIZON_FRAMES,
            engine_seed: 0x5E_C0_5D_00,
            use_realtime_thread_priority: false,
        }
    }
}

pub struct Engine {
    config: EngineConfig,
    channels: u16,

    command_rx: crossbeam_channel::Receiver<QueuedCommand>,
    parser: Box<dyn SoundtrackParser + Send>,

    soundtrack: Soundtrack,
    flow_controls: FlowControls,
    mix_bus_tree: MixBusTree,

    voices: Vec<Option<Voice>>,
    free_voice_slots: Vec<usize>,
    next_voice_id: u64,
    voice_scratch: VoiceScratchPool,

    preroll_cache: Arc<PrerollCache>,
    loader_pool: LoaderPool,
    /// Precache registry keyed by flow name (spec §3), refcounted so
    /// nested precache/unprecache pairs compose; the rising/falling edge
    /// (0->1, 1->0) gates walking the flow's reachable sounds.
    pending_precache_refs: HashMap<String, usize>,

    flow_instances: HashMap<FlowInstanceId, FlowInstance>,
    next_flow_instance_id: u64,
    pending_flow_teardown: HashMap<FlowInstanceId, String>,

    delegate: SharedDelegate,
    warning_sink: WarningSink,

    timer: HighPrecisionTimer,
    bus_accum_scratch: HashMap<String, Vec<f32>>,
}

struct EngineFlowHost<'a> {
    voices: &'a mut Vec<Option<Voice>>,
    free_voice_slots: &'a mut Vec<usize>,
    next_voice_id: &'a mut u64,
    preroll_cache: &'a PrerollCache,
    loader_pool: &'a LoaderPool,
    config: &'a EngineConfig,
    channels: u16,
    warning_sink: &'a WarningSink,
    delegate: &'a SharedDelegate,
    current_sample: u64,
}

impl FlowHost for EngineFlowHost<'_> {
    fn start_voice(
        &mut self,
        sound_name: &str,
        bus_name: &str,
        instance: FlowInstanceId,
        looping: bool,
        base_gain: f32,
    ) -> Option<VoiceId> {
        if self.free_voice_slots.is_empty() && self.voices.len() >= self.config.max_voices {
            self.warning_sink.push(EngineWarning::VoicePoolExhausted);
            return None;
        }

        if let Some((samples, cached_channels)) = self.preroll_cache.get_owned(sound_name) {
            let stream: Box<dyn FormattedSoundStream> = Box::new(crate::stream::CachedSoundStream::new(
                samples,
                cached_channels,
                self.config.sample_rate,
            ));
            let id = VoiceId(*self.next_voice_id);
            *self.next_voice_id += 1;

            let Some(mut voice) = Voice::with_reopen_delegate(
                id,
                sound_name.to_string(),
                bus_name.to_string(),
                stream,
                self.config.sample_rate,
                self.channels,
                base_gain,
                looping,
                self.config.block_size as usize,
                Some(self.delegate.clone()),
            ) else {
                self.warning_sink.push(EngineWarning::StreamReopenFailed(sound_name.to_string()));
                return None;
            };
            voice.flow_instance = Some(instance);

            let slot = self.free_voice_slots.pop();
            match slot {
                Some(index) => {
                    self.voices[index] = Some(voice);
                }
                None => {
                    self.voices.push(Some(voice));
                }
            }
            Some(id)
        } else {
            self.loader_pool.request_load(sound_name, LoadPriority::Immediate, None);
            None
        }
    }

    fn is_voice_alive(&self, voice: VoiceId) -> bool {
        self.voices
            .iter()
            .flatten()
            .any(|v| v.id == voice && !v.is_finished())
    }

    fn fade_voice(&mut self, voice: VoiceId, target_gain: f32, duration_frames: u64) {
        if let Some(v) = self.voices.iter_mut().flatten().find(|v| v.id == voice) {
            v.start_fade(target_gain, duration_frames, crate::types::FadeCurve::Linear);
        }
    }

    fn request_horizon_load(&mut self, sound_name: &str) {
        if self.preroll_cache.contains(sound_name) {
            return;
        }
        let deadline = self.current_sample + self.config.horizon_frames;
        self.loader_pool.request_load(sound_name, LoadPriority::Horizon, Some(deadline));
    }
}

impl Engine {
    pub fn new(
        delegate: SharedDelegate,
        parser: Box<dyn SoundtrackParser + Send>,
        config: EngineConfig,
    ) -> Result<(Engine, Commander, WarningDrain), SmsError> {
        let channels = config.speaker_layout.channel_count() as u16;
        if config.max_voices == 0 {
            return Err(SmsError::InvalidConfig("max_voices must be nonzero".into()));
        }

        let (command_tx, command_rx) = crossbeam_channel::bounded(ENGINE_TX_CHANNEL_BOUND);
        let (warning_sink, warning_drain) = warning_channel();

        let preroll_cache = Arc::new(PrerollCache::new(config.preroll_cache_capacity, config.memory_pool_size));

        let decode_delegate = delegate.clone();
        let decode_sample_rate = config.sample_rate;
        let decode_channels = channels;
        let decode_fn: Arc<crate::memory::loader::DecodeFn> = Arc::new(move |name: &str| {
            let mut stream = decode_delegate.open(name).ok()?;
            let mut pcm = Vec::new();
            let mut scratch = vec![0.0_f32; 8192 * stream.channels().max(1) as usize];
            loop {
                let (frames, outcome) = stream.read(&mut scratch);
                pcm.extend_from_slice(&scratch[..frames * stream.channels() as usize]);
                if frames == 0 || outcome == crate::stream::StreamOutcome::EndOfStream {
                    break;
                }
            }

            let source_channels = stream.channels().max(1) as usize;
            let chunk_frames = (pcm.len() / source_channels).max(1);
            let mut resampler =
                StreamResampler::new(stream.sample_rate(), decode_sample_rate, stream.channels(), chunk_frames)?;
            let mut resampled = vec![0.0_f32; pcm.len() * 4 + 64];
            let written = resampler.process(&pcm, &mut resampled);
            resampled.truncate(written * stream.channels() as usize);

            let mut remapped = Vec::new();
            remap_channels(&resampled, stream.channels(), decode_channels, &mut remapped);
            Some((remapped, decode_channels))
        });

        let loader_pool = LoaderPool::new(preroll_cache.clone(), decode_fn, config.loader_worker_count);

        let voice_scratch = VoiceScratchPool::new(config.max_voices, channels as usize);

        let engine = Engine {
            channels,
            command_rx,
            parser,
            soundtrack: Soundtrack::new(),
            flow_controls: FlowControls::new(),
            mix_bus_tree: MixBusTree::new(),
            voices: Vec::with_capacity(config.max_voices),
            free_voice_slots: Vec::new(),
            next_voice_id: 0,
            voice_scratch,
            preroll_cache,
            loader_pool,
            pending_precache_refs: HashMap::new(),
            flow_instances: HashMap::new(),
            next_flow_instance_id: 0,
            pending_flow_teardown: HashMap::new(),
            delegate,
            warning_sink,
            timer: {
                let mut t = HighPrecisionTimer::new(config.sample_rate as f32);
                t.initialize_stream_timing();
                t
            },
            bus_accum_scratch: HashMap::new(),
            config,
        };

        let commander = Commander::new(command_tx);
        Ok((engine, commander, warning_drain))
    }

    /// Parse soundtrack text off the audio thread, ready to hand to
    /// [`Command::ReplaceSoundtrack`].
    pub fn parse_soundtrack(parser: &dyn SoundtrackParser, source: &str) -> Result<Soundtrack, SmsError> {
        parser.parse(source)
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Read-only view of the flow control table, for hosts that need to
    /// inspect a control's current value (e.g. for UI) rather than just
    /// setting it.
    pub fn flow_controls(&self) -> &FlowControls {
        &self.flow_controls
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn query_precache_state(&self, sound_name: &str) -> PrecacheState {
        let pending_loader = self.loader_pool.pending_count() > 0;
        self.preroll_cache.state_of(sound_name, |_| pending_loader)
    }

    /// Render one block. `out` must be interleaved at this engine's
    /// channel count; its length must be a multiple of `channels()`.
    /// The block is *added to* `out`, never overwritten — callers control
    /// whether `out` starts zeroed (spec §4.6: mixing SMS output into a
    /// buffer that already carries other audio must stay possible).
    pub fn turn_handle(&mut self, out: &mut [f32]) {
        let channels = self.channels as usize;
        if channels == 0 || out.len() % channels != 0 {
            self.warning_sink.push(EngineWarning::InvalidBlockSize(out.len()));
            return;
        }

        let frames = (out.len() / channels) as u64;

        self.drain_commands();
        self.reap_settled_flow_teardowns();
        self.tick_flows(frames);
        self.render_voices(out);
        self.mix_buses_into(out);

        self.mix_bus_tree.advance(frames);
        self.timer.advance_samples(frames);
    }

    fn drain_commands(&mut self) {
        while let Ok(queued) = self.command_rx.try_recv() {
            match queued {
                QueuedCommand::Single(command) => self.apply_command(command),
                QueuedCommand::Batch(batch) => {
                    for command in batch {
                        self.apply_command(command);
                    }
                }
            }
        }
    }

    fn apply_command(&mut self, command: Command) {
        match command {
            Command::ReplaceSoundtrack { soundtrack } => {
                self.soundtrack.merge_replace((*soundtrack).clone());
            }
            Command::Precache { flow_name } => {
                let refcount = self.pending_precache_refs.entry(flow_name.clone()).or_insert(0);
                *refcount += 1;
                if *refcount == 1 {
                    // Rising edge 0->1: submit one load per sound reachable
                    // from the flow's node graph (spec §3/§4.7).
                    for resource_name in self.soundtrack.reachable_sounds(&flow_name) {
                        self.preroll_cache.precache(&resource_name);
                        self.preroll_cache.bump_refcount_on_insert(&resource_name, 0);
                        self.loader_pool.request_load(&resource_name, LoadPriority::Precache, None);
                    }
                }
            }
            Command::Unprecache { flow_name } => {
                let Some(count) = self.pending_precache_refs.get_mut(&flow_name) else {
                    return;
                };
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.pending_precache_refs.remove(&flow_name);
                    for resource_name in self.soundtrack.reachable_sounds(&flow_name) {
                        self.preroll_cache.unprecache(&resource_name);
                    }
                }
            }
            Command::UnprecacheAll => {
                self.preroll_cache.unprecache_all();
                self.pending_precache_refs.clear();
            }
            Command::SetFlowControlNumber { name, value } => {
                self.flow_controls.set_number(&name, value);
            }
            Command::SetFlowControlString { name, value } => {
                self.flow_controls.set_string(&name, value);
            }
            Command::ClearFlowControl { name } => {
                self.flow_controls.clear(&name);
            }
            Command::ClearPrefixedFlowControls { prefix } => {
                self.flow_controls.clear_prefixed(&prefix);
            }
            Command::ClearAllFlowControls => {
                self.flow_controls.clear_all();
            }
            Command::StartFlow { flow_name, gain, duration_frames, curve } => {
                self.start_flow(&flow_name, gain, duration_frames, curve);
            }
            Command::FadeMixBus { target, gain, duration_frames, curve } => {
                self.fade_bus_selector(&target, gain, duration_frames, curve);
            }
            Command::FadeOutMixBus { target, duration_frames, curve } => {
                self.fade_out_bus_selector(&target, duration_frames, curve);
            }
            Command::KillMixBus { target } => {
                self.kill_bus_selector(&target);
            }
            Command::FadeFlow { target, gain, duration_frames, curve } => {
                self.apply_flow_selector(&target, |tree, bus_name| {
                    tree.fade_to(bus_name, gain, duration_frames, curve);
                });
            }
            Command::FadeFlowOut { target, duration_frames, curve } => {
                for id in self.matching_flow_instance_ids(&target) {
                    if let Some(instance) = self.flow_instances.get(&id) {
                        let bus_name = instance.bus_name.clone();
                        self.mix_bus_tree.fade_out(&bus_name, duration_frames, curve);
                        self.pending_flow_teardown.insert(id, bus_name);
                    }
                }
            }
            Command::KillFlow { target } => {
                self.kill_flow_selector(&target);
            }
        }
    }

    /// Starting a flow that is already live (by flow name, not instance
    /// id) degenerates to fading its existing bus to `gain`, per spec
    /// §4.5 ("If already live, degenerate to fade_flow_to").
    fn start_flow(&mut self, flow_name: &str, gain: f32, duration_frames: u64, curve: crate::types::FadeCurve) {
        if let Some(existing_bus) = self
            .flow_instances
            .values()
            .find(|i| i.flow_name == flow_name && i.state() == FlowState::Running)
            .map(|i| i.bus_name.clone())
        {
            self.mix_bus_tree.fade_to(&existing_bus, gain, duration_frames, curve);
            return;
        }

        let Some(flow_def) = self.soundtrack.resolve_flow(flow_name).cloned() else {
            self.warning_sink.push(EngineWarning::SoundNotFound(flow_name.to_string()));
            return;
        };

        let bus_already_existed = self.mix_bus_tree.bus_exists(&flow_def.bus_name);
        self.mix_bus_tree.ensure_bus(&flow_def.bus_name, crate::constants::BUS_NAME_MAIN);
        if !bus_already_existed {
            self.mix_bus_tree.fade_to(&flow_def.bus_name, 0.0, 0, crate::types::FadeCurve::Linear);
        }
        self.mix_bus_tree.fade_to(&flow_def.bus_name, gain, duration_frames, curve);

        let id = FlowInstanceId(self.next_flow_instance_id);
        self.next_flow_instance_id += 1;

        let instance = FlowInstance::start(
            id,
            flow_name.to_string(),
            &flow_def.root_node,
            flow_def.bus_name,
            &self.soundtrack,
            self.config.engine_seed,
        );
        self.flow_instances.insert(id, instance);
    }

    fn fade_bus_selector(&mut self, target: &BusSelector, gain: f32, duration_frames: u64, curve: crate::types::FadeCurve) {
        match target {
            BusSelector::Named(name) => self.mix_bus_tree.fade_to(name, gain, duration_frames, curve),
            BusSelector::Prefixed(prefix) => self.mix_bus_tree.fade_prefixed(prefix, gain, duration_frames, curve),
            BusSelector::AllExceptMain => self.mix_bus_tree.fade_all_except_main(gain, duration_frames, curve),
        }
    }

    fn fade_out_bus_selector(&mut self, target: &BusSelector, duration_frames: u64, curve: crate::types::FadeCurve) {
        match target {
            BusSelector::Named(name) => self.mix_bus_tree.fade_out(name, duration_frames, curve),
            BusSelector::Prefixed(prefix) => self.mix_bus_tree.fade_out_prefixed(prefix, duration_frames, curve),
            BusSelector::AllExceptMain => self.mix_bus_tree.fade_out_all_except_main(duration_frames, curve),
        }
    }

    fn kill_bus_selector(&mut self, target: &BusSelector) {
        match target {
            BusSelector::Named(name) => self.mix_bus_tree.kill(name),
            BusSelector::Prefixed(prefix) => self.mix_bus_tree.kill_prefixed(prefix),
            BusSelector::AllExceptMain => self.mix_bus_tree.kill_all_except_main(),
        }
    }

    fn apply_flow_selector(&mut self, target: &FlowSelector, apply_bus: impl Fn(&mut MixBusTree, &str)) {
        match target {
            FlowSelector::Instance(id) => {
                if let Some(instance) = self.flow_instances.get(id) {
                    apply_bus(&mut self.mix_bus_tree, &instance.bus_name.clone());
                }
            }
            FlowSelector::NamePrefixed(prefix) => {
                let buses: Vec<String> = self
                    .flow_instances
                    .values()
                    .filter(|i| i.flow_name.starts_with(prefix.as_str()))
                    .map(|i| i.bus_name.clone())
                    .collect();
                for bus in buses {
                    apply_bus(&mut self.mix_bus_tree, &bus);
                }
            }
            FlowSelector::All => {
                let buses: Vec<String> = self.flow_instances.values().map(|i| i.bus_name.clone()).collect();
                for bus in buses {
                    apply_bus(&mut self.mix_bus_tree, &bus);
                }
            }
        }
    }

    fn matching_flow_instance_ids(&self, target: &FlowSelector) -> Vec<FlowInstanceId> {
        match target {
            FlowSelector::Instance(id) => {
                if self.flow_instances.contains_key(id) {
                    vec![*id]
                } else {
                    Vec::new()
                }
            }
            FlowSelector::NamePrefixed(prefix) => self
                .flow_instances
                .iter()
                .filter(|(_, instance)| instance.flow_name.starts_with(prefix.as_str()))
                .map(|(id, _)| *id)
                .collect(),
            FlowSelector::All => self.flow_instances.keys().copied().collect(),
        }
    }

    /// A `FadeFlowOut` instance is torn down once its bus's fade has
    /// actually settled, not at command time — spec §4.5's "schedules
    /// the flow for teardown when envelope reaches zero".
    fn reap_settled_flow_teardowns(&mut self) {
        self.pending_flow_teardown.retain(|id, bus_name| {
            if !self.mix_bus_tree.is_settled(bus_name) {
                return true;
            }
            if let Some(instance) = self.flow_instances.get_mut(id) {
                instance.mark_fading();
            }
            false
        });
    }

    /// Kill is fade-to-zero with `mark_fading` so the instance stops
    /// advancing its node tree at the same time its bus goes silent;
    /// `FadeFlow` with an explicit zero gain can still be used for an
    /// audible fade-out that keeps the flow running meanwhile.
    fn kill_flow_selector(&mut self, target: &FlowSelector) {
        match target {
            FlowSelector::Instance(id) => {
                if let Some(instance) = self.flow_instances.get_mut(id) {
                    instance.mark_fading();
                    self.mix_bus_tree.kill(&instance.bus_name.clone());
                }
            }
            FlowSelector::NamePrefixed(prefix) => {
                let buses: Vec<String> = self
                    .flow_instances
                    .values_mut()
                    .filter(|i| i.flow_name.starts_with(prefix.as_str()))
                    .map(|i| {
                        i.mark_fading();
                        i.bus_name.clone()
                    })
                    .collect();
                for bus in buses {
                    self.mix_bus_tree.kill(&bus);
                }
            }
            FlowSelector::All => {
                let buses: Vec<String> = self.flow_instances.values().map(|i| i.bus_name.clone()).collect();
                for instance in self.flow_instances.values_mut() {
                    instance.mark_fading();
                }
                for bus in buses {
                    self.mix_bus_tree.kill(&bus);
                }
            }
        }
    }

    fn tick_flows(&mut self, block_frames: u64) {
        let Engine {
            flow_instances,
            voices,
            free_voice_slots,
            next_voice_id,
            preroll_cache,
            loader_pool,
            config,
            channels,
            soundtrack,
            flow_controls,
            warning_sink,
            delegate,
            timer,
            ..
        } = self;

        let mut host = EngineFlowHost {
            voices,
            free_voice_slots,
            next_voice_id,
            preroll_cache: preroll_cache.as_ref(),
            loader_pool: &*loader_pool,
            config: &*config,
            channels: *channels,
            warning_sink: &*warning_sink,
            delegate: &*delegate,
            current_sample: timer.get_current_sample_count(),
        };

        for instance in flow_instances.values_mut() {
            instance.tick(soundtrack, flow_controls, &mut host, block_frames);
        }

        flow_instances.retain(|_, instance| !instance.is_finished());
    }

    fn render_voices(&mut self, out: &mut [f32]) {
        let block_frames = out.len() / self.channels as usize;
        self.bus_accum_scratch.values_mut().for_each(|buf| {
            buf.clear();
            buf.resize(out.len(), 0.0);
        });

        for slot in 0..self.voices.len() {
            let Some(voice) = self.voices[slot].as_mut() else { continue };

            let decode_buf = self
                .voice_scratch
                .decode_buffer(slot)
                .map(|b| &mut b[..block_frames * self.channels as usize])
                .unwrap_or(&mut []);
            let resample_buf = self
                .voice_scratch
                .resample_buffer(slot)
                .map(|b| &mut b[..block_frames * self.channels as usize])
                .unwrap_or(&mut []);

            let bus_name = voice.bus_name.clone();
            let accum = self
                .bus_accum_scratch
                .entry(bus_name)
                .or_insert_with(|| vec![0.0; out.len()]);

            let alive = voice.process(decode_buf, resample_buf, accum, self.channels, &self.warning_sink);

            if !alive {
                self.voices[slot] = None;
                self.free_voice_slots.push(slot);
            }
        }
    }

    fn mix_buses_into(&mut self, out: &mut [f32]) {
        for (bus_name, buf) in self.bus_accum_scratch.iter() {
            let gain = self.mix_bus_tree.effective_gain(bus_name);
            if gain == 0.0 {
                continue;
            }
            for (o, s) in out.iter_mut().zip(buf.iter()) {
                *o += s * gain;
            }
        }
    }

    /// Spawn the audio callback thread at elevated priority, when
    /// `use_realtime_thread_priority` was requested. Returns the join
    /// handle; the engine itself is moved into the closure, so callers
    /// drive rendering entirely from inside `body`.
    pub fn spawn_realtime_thread<F>(config: &EngineConfig, body: F) -> std::thread::JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if config.use_realtime_thread_priority {
            ThreadBuilder::default()
                .name("sms-audio")
                .priority(ThreadPriority::Max)
                .spawn(move |_| body())
                .expect("unable to start realtime audio thread")
        } else {
            std::thread::Builder::new()
                .name("sms-audio".into())
                .spawn(body)
                .expect("unable to start audio thread")
        }
    }
}

impl Commander {
    pub fn replace_soundtrack(&self, soundtrack: Arc<Soundtrack>) -> bool {
        self.send(Command::ReplaceSoundtrack { soundtrack })
    }

    pub fn precache(&self, flow_name: impl Into<String>) -> bool {
        self.send(Command::Precache { flow_name: flow_name.into() })
    }

    pub fn unprecache(&self, flow_name: impl Into<String>) -> bool {
        self.send(Command::Unprecache { flow_name: flow_name.into() })
    }

    pub fn unprecache_all(&self) -> bool {
        self.send(Command::UnprecacheAll)
    }

    pub fn set_flow_control_number(&self, name: &[u8], value: f32) -> bool {
        self.send(Command::SetFlowControlNumber { name: name.to_vec(), value })
    }

    pub fn set_flow_control_string(&self, name: &[u8], value: Vec<u8>) -> bool {
        self.send(Command::SetFlowControlString { name: name.to_vec(), value })
    }

    pub fn clear_flow_control(&self, name: &[u8]) -> bool {
        self.send(Command::ClearFlowControl { name: name.to_vec() })
    }

    pub fn clear_prefixed_flow_controls(&self, prefix: &[u8]) -> bool {
        self.send(Command::ClearPrefixedFlowControls { prefix: prefix.to_vec() })
    }

    pub fn clear_all_flow_controls(&self) -> bool {
        self.send(Command::ClearAllFlowControls)
    }

    pub fn start_flow(
        &self,
        flow_name: impl Into<String>,
        gain: f32,
        duration_frames: u64,
        curve: crate::types::FadeCurve,
    ) -> bool {
        self.send(Command::StartFlow { flow_name: flow_name.into(), gain, duration_frames, curve })
    }

    pub fn fade_mix_bus(
        &self,
        target: BusSelector,
        gain: f32,
        duration_frames: u64,
        curve: crate::types::FadeCurve,
    ) -> bool {
        self.send(Command::FadeMixBus { target, gain, duration_frames, curve })
    }

    pub fn fade_out_mix_bus(&self, target: BusSelector, duration_frames: u64, curve: crate::types::FadeCurve) -> bool {
        self.send(Command::FadeOutMixBus { target, duration_frames, curve })
    }

    pub fn kill_mix_bus(&self, target: BusSelector) -> bool {
        self.send(Command::KillMixBus { target })
    }

    pub fn fade_flow(
        &self,
        target: FlowSelector,
        gain: f32,
        duration_frames: u64,
        curve: crate::types::FadeCurve,
    ) -> bool {
        self.send(Command::FadeFlow { target, gain, duration_frames, curve })
    }

    pub fn fade_flow_out(&self, target: FlowSelector, duration_frames: u64, curve: crate::types::FadeCurve) -> bool {
        self.send(Command::FadeFlowOut { target, duration_frames, curve })
    }

    pub fn kill_flow(&self, target: FlowSelector) -> bool {
        self.send(Command::KillFlow { target })
    }
}

impl Transaction {
    pub fn replace_soundtrack(&mut self, soundtrack: Arc<Soundtrack>) -> &mut Self {
        self.push(Command::ReplaceSoundtrack { soundtrack })
    }

    pub fn precache(&mut self, flow_name: impl Into<String>) -> &mut Self {
        self.push(Command::Precache { flow_name: flow_name.into() })
    }

    pub fn unprecache(&mut self, flow_name: impl Into<String>) -> &mut Self {
        self.push(Command::Unprecache { flow_name: flow_name.into() })
    }

    pub fn unprecache_all(&mut self) -> &mut Self {
        self.push(Command::UnprecacheAll)
    }

    pub fn set_flow_control_number(&mut self, name: &[u8], value: f32) -> &mut Self {
        self.push(Command::SetFlowControlNumber { name: name.to_vec(), value })
    }

    pub fn set_flow_control_string(&mut self, name: &[u8], value: Vec<u8>) -> &mut Self {
        self.push(Command::SetFlowControlString { name: name.to_vec(), value })
    }

    pub fn clear_flow_control(&mut self, name: &[u8]) -> &mut Self {
        self.push(Command::ClearFlowControl { name: name.to_vec() })
    }

    pub fn clear_prefixed_flow_controls(&mut self, prefix: &[u8]) -> &mut Self {
        self.push(Command::ClearPrefixedFlowControls { prefix: prefix.to_vec() })
    }

    pub fn clear_all_flow_controls(&mut self) -> &mut Self {
        self.push(Command::ClearAllFlowControls)
    }

    pub fn start_flow(
        &mut self,
        flow_name: impl Into<String>,
        gain: f32,
        duration_frames: u64,
        curve: crate::types::FadeCurve,
    ) -> &mut Self {
        self.push(Command::StartFlow { flow_name: flow_name.into(), gain, duration_frames, curve })
    }

    pub fn fade_mix_bus(
        &mut self,
        target: BusSelector,
        gain: f32,
        duration_frames: u64,
        curve: crate::types::FadeCurve,
    ) -> &mut Self {
        self.push(Command::FadeMixBus { target, gain, duration_frames, curve })
    }

    pub fn fade_out_mix_bus(
        &mut self,
        target: BusSelector,
        duration_frames: u64,
        curve: crate::types::FadeCurve,
    ) -> &mut Self {
        self.push(Command::FadeOutMixBus { target, duration_frames, curve })
    }

    pub fn kill_mix_bus(&mut self, target: BusSelector) -> &mut Self {
        self.push(Command::KillMixBus { target })
    }

    pub fn fade_flow(
        &mut self,
        target: FlowSelector,
        gain: f32,
        duration_frames: u64,
        curve: crate::types::FadeCurve,
    ) -> &mut Self {
        self.push(Command::FadeFlow { target, gain, duration_frames, curve })
    }

    pub fn fade_flow_out(
        &mut self,
        target: FlowSelector,
        duration_frames: u64,
        curve: crate::types::FadeCurve,
    ) -> &mut Self {
        self.push(Command::FadeFlowOut { target, duration_frames, curve })
    }

    pub fn kill_flow(&mut self, target: FlowSelector) -> &mut Self {
        self.push(Command::KillFlow { target })
    }
}
