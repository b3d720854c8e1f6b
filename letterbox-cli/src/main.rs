//! `letterbox`: capture a clip and run it through the recognizer worker.
//!
//! ```text
//! letterbox --wav clip.wav            record from a file via record_from_buffer
//! letterbox --mic                     pre-record, press Enter, record until full
//! ```
//!
//! Either way the captured samples go to a `TaskDispatcher` worker serving the
//! stub letter model, and the response is printed as JSON.

mod settings;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use letterbox_core::audio::wav::load_wav;
use letterbox_core::inference::stub::StubModel;
use letterbox_core::{
    greedy_decode, register_model, AudioCaptureSession, CaptureConfig, InferenceRequest,
    InferenceResponse, MethodCatalog, ModelHandle, Recognizer, TaskDispatcher,
};
use serde::Serialize;
use settings::{default_settings_path, load_settings, save_settings, AppSettings};
use tracing::{info, warn};

const USAGE: &str = "Usage: letterbox (--wav <file.wav> | --mic) [--language <en|de>] \
[--settings <file.json>] [--save-settings]";

/// Rate the letter model expects.
const MODEL_SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, Default)]
struct Args {
    wav: Option<PathBuf>,
    mic: bool,
    language: Option<String>,
    settings: Option<PathBuf>,
    save_settings: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args::default();

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--wav" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --wav".into());
                };
                args.wav = Some(PathBuf::from(v));
            }
            "--mic" => args.mic = true,
            "--language" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --language".into());
                };
                args.language = Some(v);
            }
            "--settings" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --settings".into());
                };
                args.settings = Some(PathBuf::from(v));
            }
            "--save-settings" => args.save_settings = true,
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    Ok(args)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Output {
    language: String,
    sample_rate: u32,
    samples: usize,
    text: String,
    response: InferenceResponse,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("letterbox=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            std::process::exit(2);
        }
    };

    if let Err(e) = run(args).await {
        eprintln!("letterbox failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let settings_path = args.settings.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    settings.apply_env_overrides(|key| std::env::var(key).ok());
    if let Some(language) = &args.language {
        settings.language = language.clone();
        settings.normalize();
    }
    info!(
        path = %settings_path.display(),
        language = settings.language.as_str(),
        duration_ms = settings.duration_ms,
        "settings loaded"
    );

    if args.save_settings {
        save_settings(&settings_path, &settings)
            .with_context(|| format!("saving settings to {}", settings_path.display()))?;
        info!(path = %settings_path.display(), "settings saved");
    }

    let (waveform, sample_rate) = match (&args.wav, args.mic) {
        (Some(_), true) => bail!("--wav and --mic cannot be combined"),
        (Some(path), false) => capture_from_wav(path, &settings)?,
        (None, true) => capture_from_microphone(&settings).await?,
        (None, false) if args.save_settings => return Ok(()),
        (None, false) => bail!("nothing to capture\n{USAGE}"),
    };
    if sample_rate != MODEL_SAMPLE_RATE {
        warn!(
            sample_rate,
            expected = MODEL_SAMPLE_RATE,
            "captured audio is not at the model rate; results will be off"
        );
    }

    let mut catalog = MethodCatalog::new();
    register_model(&mut catalog, ModelHandle::new(StubModel::new()));
    let dispatcher = TaskDispatcher::spawn(catalog)?;
    let recognizer = Recognizer::register(&dispatcher).await?;

    let request = InferenceRequest {
        waveform,
        language: settings.language.clone(),
    };
    let response = recognizer.predict(&request).await?;
    let output = Output {
        language: request.language,
        sample_rate,
        samples: request.waveform.len(),
        text: greedy_decode(&response),
        response,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    let code = dispatcher.terminate().await;
    info!(code, "recognizer worker stopped");
    Ok(())
}

fn capture_from_wav(path: &Path, settings: &AppSettings) -> anyhow::Result<(Vec<f32>, u32)> {
    let clip = load_wav(path).with_context(|| format!("loading {}", path.display()))?;
    let mut session = AudioCaptureSession::new(CaptureConfig {
        sample_rate: clip.sample_rate,
        pre_recording_duration_ms: 0,
        ..settings.capture_config()
    });

    session.record_from_buffer(&clip.samples);
    let samples = session.take_samples();
    if samples.len() < clip.samples.len() {
        warn!(
            clip_ms = clip.duration_ms(),
            kept_ms = session.duration_ms(),
            "clip longer than the recording buffer, tail dropped"
        );
    }
    info!(samples = samples.len(), sample_rate = clip.sample_rate, "recorded from file");
    Ok((samples, clip.sample_rate))
}

#[cfg(feature = "microphone")]
async fn capture_from_microphone(settings: &AppSettings) -> anyhow::Result<(Vec<f32>, u32)> {
    use letterbox_core::{CaptureEngine, CaptureEvent, EngineConfig};
    use tokio::sync::broadcast::error::RecvError;

    let engine = CaptureEngine::new(EngineConfig {
        capture: settings.capture_config(),
        ..EngineConfig::default()
    });
    let session = engine.session();
    session.lock().start_pre_recording();
    engine.start_microphone(settings.input_device.clone())?;

    eprintln!(
        "Listening ({} ms lookback). Press Enter to record {} ms.",
        settings.pre_recording_duration_ms, settings.duration_ms
    );
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| ())
    })
    .await??;

    let mut events = {
        let mut session = session.lock();
        let events = session.subscribe();
        session.start_recording();
        events
    };
    loop {
        match events.recv().await {
            Ok(CaptureEvent::RecordingStopped) => break,
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => bail!("capture session went away while recording"),
        }
    }
    engine.stop()?;

    let samples = session.lock().take_samples();
    info!(samples = samples.len(), "recorded from microphone");
    Ok((samples, settings.sample_rate))
}

#[cfg(not(feature = "microphone"))]
async fn capture_from_microphone(_settings: &AppSettings) -> anyhow::Result<(Vec<f32>, u32)> {
    bail!("letterbox was built without microphone support (enable the `microphone` feature)")
}
