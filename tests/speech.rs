use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    routing::get,
};
use kornia_narrator::{
    CaptionModel, GoogleSpeech, InferenceEngine, ModelError, NarrationMode, NarrationRequest,
    Narrator, RgbImage, SpeechSynthesizer, decode_rgb8,
};

type Seen = Arc<Mutex<Vec<HashMap<String, String>>>>;

async fn fake_tts(
    State(seen): State<Seen>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Vec<u8>, StatusCode> {
    if params.get("tl").map(String::as_str) == Some("xx") {
        return Err(StatusCode::BAD_REQUEST);
    }
    let idx = params.get("idx").cloned().unwrap_or_default();
    seen.lock().unwrap().push(params);
    Ok(format!("[chunk {idx}]").into_bytes())
}

async fn serve() -> (String, Seen) {
    let seen: Seen = Arc::default();
    let app = Router::new()
        .route("/translate_tts", get(fake_tts))
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/translate_tts"), seen)
}

#[tokio::test(flavor = "multi_thread")]
async fn long_text_is_spoken_in_chunks() {
    let (url, seen) = serve().await;
    let text = "word ".repeat(30);

    let audio = tokio::task::spawn_blocking(move || {
        GoogleSpeech::with_url(url).synthesize(&text, "en")
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(audio, b"[chunk 0][chunk 1]");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    for params in seen.iter() {
        assert_eq!(params["tl"], "en");
        assert_eq!(params["client"], "tw-ob");
        assert_eq!(params["total"], "2");
        assert!(params["q"].chars().count() <= 100);
        assert_eq!(params["textlen"], params["q"].chars().count().to_string());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_requests_are_errors() {
    let (url, _) = serve().await;

    let result = tokio::task::spawn_blocking(move || {
        GoogleSpeech::with_url(url).synthesize("hello", "xx")
    })
    .await
    .unwrap();
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_text_is_an_error() {
    let (url, seen) = serve().await;

    let result = tokio::task::spawn_blocking(move || {
        GoogleSpeech::with_url(url).synthesize("  ", "en")
    })
    .await
    .unwrap();
    assert!(result.is_err());
    assert!(seen.lock().unwrap().is_empty());
}

struct FixedCaption;

impl CaptionModel for FixedCaption {
    fn caption(&mut self, _image: &RgbImage) -> Result<String, ModelError> {
        Ok("a lighthouse at dusk".to_string())
    }
}

fn png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(3, 3, image::Rgb([1, 2, 3]));
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

// Mirrors the server start: everything is built on the async runtime thread.
#[tokio::test]
async fn narrator_can_be_assembled_inside_the_runtime() {
    let (url, seen) = serve().await;

    let _default = GoogleSpeech::new();
    let narrator = Narrator::new(Box::new(FixedCaption), Box::new(GoogleSpeech::with_url(url)));
    let engine = Arc::new(InferenceEngine::new(narrator));

    let pending = engine
        .submit(NarrationRequest {
            image: decode_rgb8(&png()).unwrap(),
            mode: NarrationMode::Caption,
        })
        .unwrap();
    let narration = tokio::task::spawn_blocking(move || pending.wait())
        .await
        .unwrap()
        .unwrap()
        .response;

    assert_eq!(narration.caption, "a lighthouse at dusk");
    assert_eq!(narration.audio.as_deref(), Some(&b"[chunk 0]"[..]));
    assert_eq!(seen.lock().unwrap()[0]["q"], "a lighthouse at dusk");

    drop(engine);
}
