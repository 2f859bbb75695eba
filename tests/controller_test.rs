//! Integration tests for the screen controller using mock collaborators.
//! Fully deterministic — no camera, no network.
//!
//! Run: cargo test --test controller_test

use async_trait::async_trait;
use plate_reader_lib::ai::{AnalysisClient, AnalysisError};
use plate_reader_lib::capture::{
    CameraDevice, CaptureError, CaptureOptions, CaptureOutcome, ImageCapture, ImageRef,
    PermissionStatus,
};
use plate_reader_lib::controller::{
    AnalyzeOutcome, Notifier, ScreenController, ScreenState, ANALYSIS_FAILED_TITLE,
    CAPTURE_FAILED_TITLE, FALLBACK_DESCRIPTION,
};
use plate_reader_lib::encode::{EncodedPayload, EncodingError, ImageEncoder};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Mock implementations
// ---------------------------------------------------------------------------

struct MockCamera {
    permission: PermissionStatus,
    shots: Mutex<VecDeque<Option<ImageRef>>>,
    device_error: Option<String>,
    released: Arc<Mutex<Vec<ImageRef>>>,
}

impl MockCamera {
    fn with_shots(shots: &[Option<&str>]) -> Self {
        Self {
            permission: PermissionStatus::Granted,
            shots: Mutex::new(shots.iter().map(|s| s.map(ImageRef::new)).collect()),
            device_error: None,
            released: Arc::default(),
        }
    }

    fn denied() -> Self {
        Self {
            permission: PermissionStatus::Denied,
            ..Self::with_shots(&[])
        }
    }

    fn broken(detail: &str) -> Self {
        Self {
            device_error: Some(detail.to_string()),
            ..Self::with_shots(&[])
        }
    }

    fn released(&self) -> Arc<Mutex<Vec<ImageRef>>> {
        Arc::clone(&self.released)
    }
}

#[async_trait]
impl CameraDevice for MockCamera {
    async fn request_permission(&self) -> PermissionStatus {
        self.permission
    }

    async fn launch(&self, _options: CaptureOptions) -> Result<Option<ImageRef>, CaptureError> {
        if let Some(ref detail) = self.device_error {
            return Err(CaptureError::Device(detail.clone()));
        }
        Ok(self.shots.lock().unwrap().pop_front().flatten())
    }

    fn release(&self, image: &ImageRef) {
        self.released.lock().unwrap().push(image.clone());
    }

    fn name(&self) -> &str {
        "mock-camera"
    }
}

struct MockEncoder {
    fail: bool,
}

#[async_trait]
impl ImageEncoder for MockEncoder {
    async fn encode(&self, _image: &ImageRef) -> Result<EncodedPayload, EncodingError> {
        if self.fail {
            return Err(EncodingError {
                detail: "no base64".into(),
            });
        }
        Ok(EncodedPayload {
            mime_type: "image/jpeg".into(),
            base64: "QUJD".into(),
        })
    }
}

type Reply = Box<dyn Fn() -> Result<String, AnalysisError> + Send + Sync>;

struct MockClient {
    reply: Reply,
    gate: Option<Arc<Notify>>,
    calls: Arc<AtomicUsize>,
    seen_instruction: Arc<Mutex<Option<String>>>,
}

impl MockClient {
    fn replying(reply: impl Fn() -> Result<String, AnalysisError> + Send + Sync + 'static) -> Self {
        Self {
            reply: Box::new(reply),
            gate: None,
            calls: Arc::new(AtomicUsize::new(0)),
            seen_instruction: Arc::new(Mutex::new(None)),
        }
    }

    fn body(raw: &'static str) -> Self {
        Self::replying(move || Ok(raw.to_string()))
    }

    /// Hold every request until `gate` is notified.
    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl AnalysisClient for MockClient {
    async fn submit(
        &self,
        payload: &EncodedPayload,
        instruction: &str,
    ) -> Result<String, AnalysisError> {
        assert_eq!(payload.data_uri(), "data:image/jpeg;base64,QUJD");
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_instruction.lock().unwrap() = Some(instruction.to_string());
        if let Some(ref gate) = self.gate {
            gate.notified().await;
        }
        (self.reply)()
    }

    fn name(&self) -> &str {
        "mock-client"
    }
}

#[derive(Clone, Default)]
struct RecordingNotifier {
    alerts: Arc<Mutex<Vec<(Option<String>, String)>>>,
}

impl RecordingNotifier {
    fn alerts(&self) -> Vec<(Option<String>, String)> {
        self.alerts.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn alert(&self, title: Option<&str>, message: &str) {
        self.alerts
            .lock()
            .unwrap()
            .push((title.map(str::to_string), message.to_string()));
    }
}

fn controller(
    camera: MockCamera,
    encoder: MockEncoder,
    client: MockClient,
) -> (ScreenController, RecordingNotifier) {
    let notifier = RecordingNotifier::default();
    let controller = ScreenController::new(
        ImageCapture::new(Box::new(camera), CaptureOptions::default()),
        Box::new(encoder),
        Box::new(client),
        Box::new(notifier.clone()),
        "List the food.",
    );
    (controller, notifier)
}

fn ok_encoder() -> MockEncoder {
    MockEncoder { fail: false }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn starts_idle_and_analyze_needs_a_picture() {
    let client = MockClient::body(r#"{"text":"peas"}"#);
    let calls = Arc::clone(&client.calls);
    let (c, _) = controller(MockCamera::with_shots(&[]), ok_encoder(), client);

    assert_eq!(c.state(), ScreenState::Idle);
    assert!(matches!(c.analyze().await, AnalyzeOutcome::NoImage));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn capture_then_analyze_completes_with_text() {
    let client = MockClient::body(r#"{"text":"peas","description":"ignored"}"#);
    let seen = Arc::clone(&client.seen_instruction);
    let (c, notifier) = controller(
        MockCamera::with_shots(&[Some("file:///tmp/a.jpg")]),
        ok_encoder(),
        client,
    );

    let outcome = c.take_picture().await.unwrap();
    assert_eq!(outcome, CaptureOutcome::Captured(ImageRef::new("file:///tmp/a.jpg")));
    assert_eq!(c.state(), ScreenState::Captured);

    assert!(matches!(c.analyze().await, AnalyzeOutcome::Completed(ref t) if t == "peas"));
    let snap = c.snapshot();
    assert_eq!(snap.state(), ScreenState::Completed);
    assert_eq!(snap.result.as_deref(), Some("peas"));
    assert!(!snap.analyzing);
    assert!(notifier.alerts().is_empty());
    assert_eq!(seen.lock().unwrap().as_deref(), Some("List the food."));
}

#[tokio::test]
async fn missing_description_shows_fallback() {
    let (c, notifier) = controller(
        MockCamera::with_shots(&[Some("file:///tmp/a.jpg")]),
        ok_encoder(),
        MockClient::body("{}"),
    );
    c.take_picture().await.unwrap();

    assert!(matches!(c.analyze().await, AnalyzeOutcome::Completed(ref t) if t == FALLBACK_DESCRIPTION));
    assert_eq!(c.snapshot().result.as_deref(), Some("No description returned."));
    assert!(notifier.alerts().is_empty());
}

#[tokio::test]
async fn server_error_returns_to_captured_with_alert() {
    let (c, notifier) = controller(
        MockCamera::with_shots(&[Some("file:///tmp/a.jpg")]),
        ok_encoder(),
        MockClient::replying(|| {
            Err(AnalysisError::Network {
                status: 500,
                detail: "server error".into(),
            })
        }),
    );
    c.take_picture().await.unwrap();

    assert!(matches!(c.analyze().await, AnalyzeOutcome::Failed(AnalysisError::Network { status: 500, .. })));
    let snap = c.snapshot();
    assert_eq!(snap.state(), ScreenState::Captured);
    assert!(!snap.analyzing);
    assert!(snap.result.is_none());
    assert_eq!(
        notifier.alerts(),
        vec![(Some(ANALYSIS_FAILED_TITLE.to_string()), "server error".to_string())]
    );
}

#[tokio::test]
async fn malformed_body_after_success_still_clears_in_flight() {
    let (c, notifier) = controller(
        MockCamera::with_shots(&[Some("file:///tmp/a.jpg")]),
        ok_encoder(),
        MockClient::body("<html>oops</html>"),
    );
    c.take_picture().await.unwrap();

    assert!(matches!(
        c.analyze().await,
        AnalyzeOutcome::Failed(AnalysisError::MalformedJson { .. })
    ));
    assert!(!c.snapshot().analyzing);
    assert_eq!(c.state(), ScreenState::Captured);
    let alerts = notifier.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(
        alerts[0].1,
        "Server did not return valid JSON. Response: <html>oops</html>"
    );
}

#[tokio::test]
async fn empty_body_is_alerted() {
    let (c, notifier) = controller(
        MockCamera::with_shots(&[Some("file:///tmp/a.jpg")]),
        ok_encoder(),
        MockClient::body("   "),
    );
    c.take_picture().await.unwrap();

    assert!(matches!(c.analyze().await, AnalyzeOutcome::Failed(AnalysisError::EmptyResponse)));
    assert!(notifier.alerts()[0].1.starts_with("Server returned an empty response."));
}

#[tokio::test]
async fn encoding_failure_skips_request() {
    let client = MockClient::body(r#"{"text":"never"}"#);
    let calls = Arc::clone(&client.calls);
    let (c, notifier) = controller(
        MockCamera::with_shots(&[Some("file:///tmp/a.jpg")]),
        MockEncoder { fail: true },
        client,
    );
    c.take_picture().await.unwrap();

    assert!(matches!(c.analyze().await, AnalyzeOutcome::Failed(AnalysisError::Encoding(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        notifier.alerts()[0].1,
        "Failed to encode image to base64 after compression."
    );
    assert!(!c.snapshot().analyzing);
}

#[tokio::test]
async fn second_analyze_while_in_flight_is_ignored() {
    let gate = Arc::new(Notify::new());
    let client = MockClient::body(r#"{"description":"rice"}"#).gated(Arc::clone(&gate));
    let calls = Arc::clone(&client.calls);
    let (c, _) = controller(
        MockCamera::with_shots(&[Some("file:///tmp/a.jpg")]),
        ok_encoder(),
        client,
    );
    c.take_picture().await.unwrap();

    let (first, second) = tokio::join!(c.analyze(), async {
        while !c.snapshot().analyzing {
            tokio::task::yield_now().await;
        }
        assert_eq!(c.state(), ScreenState::Analyzing);
        assert_eq!(c.snapshot().analyze_label(), "Analyzing…");
        let second = c.analyze().await;
        gate.notify_one();
        second
    });

    assert!(matches!(second, AnalyzeOutcome::Ignored));
    assert!(matches!(first, AnalyzeOutcome::Completed(ref t) if t == "rice"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(c.state(), ScreenState::Completed);
}

#[tokio::test]
async fn dropped_analysis_clears_in_flight() {
    let gate = Arc::new(Notify::new());
    let (c, _) = controller(
        MockCamera::with_shots(&[Some("file:///tmp/a.jpg")]),
        ok_encoder(),
        MockClient::body("{}").gated(gate),
    );
    c.take_picture().await.unwrap();

    let timed_out = tokio::time::timeout(Duration::from_millis(20), c.analyze()).await;
    assert!(timed_out.is_err());
    assert!(!c.snapshot().analyzing);
    assert_eq!(c.state(), ScreenState::Captured);
}

#[tokio::test]
async fn new_capture_discards_previous_result() {
    let (c, _) = controller(
        MockCamera::with_shots(&[Some("file:///tmp/a.jpg"), Some("file:///tmp/b.jpg")]),
        ok_encoder(),
        MockClient::body(r#"{"text":"peas"}"#),
    );
    c.take_picture().await.unwrap();
    c.analyze().await;
    assert_eq!(c.state(), ScreenState::Completed);

    c.take_picture().await.unwrap();
    let snap = c.snapshot();
    assert_eq!(snap.state(), ScreenState::Captured);
    assert_eq!(snap.image, Some(ImageRef::new("file:///tmp/b.jpg")));
    assert!(snap.result.is_none());
}

#[tokio::test]
async fn cancelled_capture_changes_nothing() {
    let (c, notifier) = controller(
        MockCamera::with_shots(&[Some("file:///tmp/a.jpg"), None]),
        ok_encoder(),
        MockClient::body(r#"{"text":"peas"}"#),
    );
    c.take_picture().await.unwrap();
    c.analyze().await;
    let before = c.snapshot();

    assert_eq!(c.take_picture().await.unwrap(), CaptureOutcome::Cancelled);
    assert_eq!(c.snapshot(), before);
    assert!(notifier.alerts().is_empty());
}

#[tokio::test]
async fn denied_permission_is_alerted_but_not_stored() {
    let (c, notifier) = controller(
        MockCamera::denied(),
        ok_encoder(),
        MockClient::body("{}"),
    );

    let err = c.take_picture().await.unwrap_err();
    assert!(matches!(err, CaptureError::PermissionDenied));
    assert_eq!(c.state(), ScreenState::Idle);
    assert_eq!(
        notifier.alerts(),
        vec![(None, "Camera permission is required to take a picture.".to_string())]
    );
}

#[tokio::test]
async fn device_failure_is_alerted_as_capture_failure() {
    let (c, notifier) = controller(
        MockCamera::broken("cannot create capture directory"),
        ok_encoder(),
        MockClient::body("{}"),
    );

    let err = c.take_picture().await.unwrap_err();
    assert!(matches!(err, CaptureError::Device(_)));
    assert_eq!(c.state(), ScreenState::Idle);
    assert_eq!(
        notifier.alerts(),
        vec![(
            Some(CAPTURE_FAILED_TITLE.to_string()),
            "Camera failed: cannot create capture directory".to_string()
        )]
    );
}

#[tokio::test]
async fn replaced_picture_is_released() {
    let camera = MockCamera::with_shots(&[
        Some("file:///tmp/a.jpg"),
        None,
        Some("file:///tmp/b.jpg"),
    ]);
    let released = camera.released();
    let (c, _) = controller(camera, ok_encoder(), MockClient::body("{}"));

    c.take_picture().await.unwrap();
    assert!(released.lock().unwrap().is_empty());

    // Cancelling keeps the current picture.
    c.take_picture().await.unwrap();
    assert!(released.lock().unwrap().is_empty());

    c.take_picture().await.unwrap();
    assert_eq!(*released.lock().unwrap(), vec![ImageRef::new("file:///tmp/a.jpg")]);
}

#[tokio::test]
async fn result_for_replaced_picture_is_discarded() {
    let gate = Arc::new(Notify::new());
    let camera = MockCamera::with_shots(&[Some("file:///tmp/a.jpg"), Some("file:///tmp/b.jpg")]);
    let released = camera.released();
    let (c, _) = controller(
        camera,
        ok_encoder(),
        MockClient::body(r#"{"text":"for a"}"#).gated(Arc::clone(&gate)),
    );
    c.take_picture().await.unwrap();

    let (first, _) = tokio::join!(c.analyze(), async {
        while !c.snapshot().analyzing {
            tokio::task::yield_now().await;
        }
        c.take_picture().await.unwrap();
        // Still being read by the request.
        assert!(released.lock().unwrap().is_empty());
        gate.notify_one();
    });

    assert!(matches!(first, AnalyzeOutcome::Discarded(ref t) if t == "for a"));
    assert_eq!(*released.lock().unwrap(), vec![ImageRef::new("file:///tmp/a.jpg")]);
    let snap = c.snapshot();
    assert_eq!(snap.image, Some(ImageRef::new("file:///tmp/b.jpg")));
    assert!(snap.result.is_none());
    assert_eq!(snap.state(), ScreenState::Captured);
}
