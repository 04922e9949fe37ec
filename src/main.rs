use argh::FromArgs;
use kornia_narrator::{
    AudioStore, DEFAULT_LANGUAGE, DEFAULT_SAMPLE_LEN, GoogleSpeech, InferenceEngine, Narrator,
    PaligemmaCaptioner,
    server::{self, AppState, DEFAULT_MAX_UPLOAD_BYTES},
};
use std::{path::PathBuf, sync::Arc, time::Duration};

// defaults for the server
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;

#[derive(FromArgs)]
/// Narrator captions uploaded images and reads the caption out loud.
struct NarratorArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// directory where generated audio is kept
    #[argh(option, default = "PathBuf::from(\".\")")]
    audio_dir: PathBuf,

    /// language code used for speech
    #[argh(option, default = "DEFAULT_LANGUAGE.to_string()")]
    lang: String,

    /// number of tokens sampled for a caption
    #[argh(option, default = "DEFAULT_SAMPLE_LEN")]
    sample_len: usize,

    /// path to an ONNX object detector; enables /analyze
    #[argh(option)]
    detector: Option<PathBuf>,

    /// seconds after which generated audio is deleted
    #[argh(option)]
    audio_ttl: Option<u64>,

    /// maximum request body size in bytes
    #[argh(option, default = "DEFAULT_MAX_UPLOAD_BYTES")]
    max_upload: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();
    let args: NarratorArgs = argh::from_env();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    // model loading blocks, keep it off the async workers
    let (sample_len, lang, detector) = (args.sample_len, args.lang, args.detector);
    let narrator =
        tokio::task::spawn_blocking(move || load_narrator(sample_len, lang, detector)).await??;
    let detection_enabled = narrator.has_detector();

    let store = AudioStore::open(&args.audio_dir).await?;
    let removed = store.clear().await;
    log::info!("Removed {removed} old audio file(s) from {}", store.dir().display());

    if let Some(ttl) = args.audio_ttl {
        spawn_eviction(store.clone(), Duration::from_secs(ttl));
    }

    let state = AppState {
        engine: Arc::new(InferenceEngine::new(narrator)),
        store,
    };
    let app = server::router(state, detection_enabled, args.max_upload);

    log::info!("🚀 Starting the server");
    log::info!("🔥 Listening on: {}", addr);
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

fn load_narrator(
    sample_len: usize,
    lang: String,
    detector: Option<PathBuf>,
) -> Result<Narrator, Box<dyn std::error::Error + Send + Sync>> {
    log::info!("Loading caption model...");
    let captioner = PaligemmaCaptioner::new(sample_len)?;
    log::info!("Model loaded successfully!");

    let narrator =
        Narrator::new(Box::new(captioner), Box::new(GoogleSpeech::new())).with_language(lang);
    with_detector(narrator, detector)
}

#[cfg(feature = "onnx")]
fn with_detector(
    narrator: Narrator,
    path: Option<PathBuf>,
) -> Result<Narrator, Box<dyn std::error::Error + Send + Sync>> {
    match path {
        Some(path) => {
            let detector = kornia_narrator::OnnxDetector::new(path)?;
            Ok(narrator.with_detector(Box::new(detector)))
        }
        None => Ok(narrator),
    }
}

#[cfg(not(feature = "onnx"))]
fn with_detector(
    narrator: Narrator,
    path: Option<PathBuf>,
) -> Result<Narrator, Box<dyn std::error::Error + Send + Sync>> {
    match path {
        Some(_) => Err("--detector requires the `onnx` feature".into()),
        None => Ok(narrator),
    }
}

/// Periodically deletes audio older than `ttl`.
fn spawn_eviction(store: AudioStore, ttl: Duration) {
    let period = (ttl / 2).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let removed = store.evict_older_than(ttl).await;
            if removed > 0 {
                log::info!("Evicted {removed} expired audio file(s)");
            }
        }
    });
}
