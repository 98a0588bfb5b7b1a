//! Standalone demo: opens a real output device and plays a tiny
//! soundtrack built entirely from in-memory synthetic tones, so the
//! crate is exercisable without shipping audio assets.

use clap::Parser;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use second_music_system::{
    DefaultTextParser, Engine, EngineConfig, FadeCurve, InMemoryDelegate, SharedDelegate, SineWaveStream,
    SoundtrackParser, WarningDrain,
};
use std::sync::Arc;
use std::thread;

use second_music_system::device_selector::{DeviceSelector, SelectionResult};

/// Command line arguments for the Second Music System demo player.
#[derive(Parser)]
#[command(name = "sms-demo")]
#[command(about = "Plays a tiny synthetic soundtrack through a real output device")]
struct Args {
    /// Audio sample rate in Hz
    #[arg(short, long, default_value_t = second_music_system::constants::DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,

    /// Audio processing block size in samples
    #[arg(short, long, default_value_t = second_music_system::constants::DEFAULT_BLOCK_SIZE)]
    block_size: u32,

    /// Specific audio output device name
    #[arg(long)]
    output_device: Option<String>,

    /// Audio thread priority (0 disables realtime scheduling)
    #[arg(long, default_value_t = second_music_system::constants::DEFAULT_AUDIO_PRIORITY)]
    audio_priority: u8,

    /// List available audio output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// How many seconds to play before exiting
    #[arg(long, default_value_t = 6)]
    seconds: u64,
}

const DEMO_SOUNDTRACK: &str = "\
sound lead tone_a loop gain=0.6
sound bass tone_b loop gain=0.4
node melody sound lead
node low sound bass
node both parallel melody low
flow main both bus=music
";

fn main() {
    let args = Args::parse();

    if args.list_devices {
        second_music_system::list_audio_devices();
        return;
    }

    let delegate = InMemoryDelegate::new();
    delegate.register("tone_a", || Box::new(SineWaveStream::new(44100, 2, 440.0)));
    delegate.register("tone_b", || Box::new(SineWaveStream::new(44100, 2, 220.0)));
    let shared_delegate = SharedDelegate::new(delegate);

    let soundtrack = Engine::parse_soundtrack(&DefaultTextParser, DEMO_SOUNDTRACK)
        .expect("demo soundtrack failed to parse");

    let config = EngineConfig {
        sample_rate: args.sample_rate,
        block_size: args.block_size,
        use_realtime_thread_priority: args.audio_priority > 0,
        ..EngineConfig::default()
    };

    let (mut engine, commander, warning_drain) =
        Engine::new(shared_delegate, Box::new(DefaultTextParser), config)
            .expect("engine construction failed");

    commander.replace_soundtrack(Arc::new(soundtrack));
    commander.send(second_music_system::Command::StartFlow { flow_name: "main".into(), gain: 1.0, duration_frames: 0, curve: FadeCurve::Exponential });

    spawn_warning_logger(warning_drain);

    let selector = DeviceSelector::new(args.sample_rate);
    let device_info = match selector.select_output_device(args.output_device) {
        SelectionResult::Success(info) | SelectionResult::Fallback(info, _) => info,
        SelectionResult::Error(err) => {
            eprintln!("failed to select audio device: {err}");
            std::process::exit(1);
        }
    };

    println!("playing through: {}", device_info.name);

    let channels = engine.channels();
    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(args.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device_info
        .device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                // turn_handle accumulates into the buffer rather than
                // overwriting it, so cpal's (possibly uninitialized)
                // buffer must be silenced first.
                data.fill(0.0);
                engine.turn_handle(data);
            },
            move |err| eprintln!("output stream error: {err}"),
            None,
        )
        .expect("failed to build output stream");

    stream.play().expect("failed to start output stream");
    thread::sleep(std::time::Duration::from_secs(args.seconds));
}

fn spawn_warning_logger(drain: WarningDrain) {
    thread::Builder::new()
        .name("sms-warnings".into())
        .spawn(move || loop {
            for warning in drain.drain() {
                tracing::warn!(%warning, "engine warning");
            }
            thread::sleep(std::time::Duration::from_millis(50));
        })
        .expect("failed to spawn warning-drain thread");
}
