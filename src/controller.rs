// controller.rs — Owns the screen state and drives
// capture → encode → request → normalize → display.
//
// All state lives in one `UiState` behind a mutex that is never held across
// an `.await`. Only the controller's own transitions mutate it.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::ai::{normalize, AnalysisClient, AnalysisError};
use crate::capture::{CaptureError, CaptureOutcome, ImageCapture, ImageRef};
use crate::encode::ImageEncoder;

/// Shown when the agent answered with JSON but no description field.
pub const FALLBACK_DESCRIPTION: &str = "No description returned.";
pub const ANALYSIS_FAILED_TITLE: &str = "Analysis failed";
pub const CAPTURE_FAILED_TITLE: &str = "Capture failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenState {
    /// No image yet.
    Idle,
    /// Image present, no result.
    Captured,
    /// Request in flight.
    Analyzing,
    /// Image and result present.
    Completed,
}

/// Read-only copy of what the screen shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenSnapshot {
    pub image: Option<ImageRef>,
    pub result: Option<String>,
    pub analyzing: bool,
}

impl ScreenSnapshot {
    pub fn state(&self) -> ScreenState {
        match (&self.image, self.analyzing, &self.result) {
            (None, _, _) => ScreenState::Idle,
            (Some(_), true, _) => ScreenState::Analyzing,
            (Some(_), false, Some(_)) => ScreenState::Completed,
            (Some(_), false, None) => ScreenState::Captured,
        }
    }

    pub fn can_analyze(&self) -> bool {
        self.image.is_some() && !self.analyzing
    }

    pub fn analyze_label(&self) -> &'static str {
        if self.analyzing {
            "Analyzing…"
        } else {
            "Analyze"
        }
    }

    /// The result box is hidden while a request is running.
    pub fn visible_result(&self) -> Option<&str> {
        if self.analyzing {
            None
        } else {
            self.result.as_deref()
        }
    }
}

impl fmt::Display for ScreenSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Take a picture")?;
        let Some(ref image) = self.image else {
            return Ok(());
        };
        writeln!(f, "  image: {image}")?;
        let disabled = if self.can_analyze() { "" } else { " (disabled)" };
        writeln!(f, "  [{}]{}", self.analyze_label(), disabled)?;
        if let Some(text) = self.visible_result() {
            writeln!(f, "  Description")?;
            for line in text.lines() {
                writeln!(f, "    {line}")?;
            }
        }
        Ok(())
    }
}

/// Surfaces blocking alerts to the user.
pub trait Notifier: Send + Sync {
    fn alert(&self, title: Option<&str>, message: &str);
}

/// Writes alerts to stderr.
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn alert(&self, title: Option<&str>, message: &str) {
        match title {
            Some(title) => eprintln!("[{title}] {message}"),
            None => eprintln!("{message}"),
        }
    }
}

#[derive(Debug)]
pub enum AnalyzeOutcome {
    /// Analysis finished; holds the text now on screen.
    Completed(String),
    /// Analysis finished after a newer picture was taken. The text was not
    /// shown.
    Discarded(String),
    /// Analysis failed and the user was alerted.
    Failed(AnalysisError),
    /// Nothing to analyze yet.
    NoImage,
    /// Another analysis is still in flight.
    Ignored,
}

#[derive(Default)]
struct UiState {
    image: Option<ImageRef>,
    result: Option<String>,
    analyzing: bool,
    /// Bumped on every capture so a late result never lands on a newer image.
    generation: u64,
    /// Replaced pictures still being read by the in-flight analysis.
    retired: Vec<ImageRef>,
}

/// Clears the in-flight flag on every exit path, including panics and
/// dropped futures, then releases pictures replaced meanwhile.
struct InFlightGuard<'a> {
    controller: &'a ScreenController,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let retired = {
            let mut ui = self.controller.ui();
            ui.analyzing = false;
            std::mem::take(&mut ui.retired)
        };
        for image in &retired {
            self.controller.capture.release(image);
        }
    }
}

pub struct ScreenController {
    capture: ImageCapture,
    encoder: Box<dyn ImageEncoder>,
    client: Box<dyn AnalysisClient>,
    notifier: Box<dyn Notifier>,
    instruction: String,
    ui: Mutex<UiState>,
}

impl ScreenController {
    pub fn new(
        capture: ImageCapture,
        encoder: Box<dyn ImageEncoder>,
        client: Box<dyn AnalysisClient>,
        notifier: Box<dyn Notifier>,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            capture,
            encoder,
            client,
            notifier,
            instruction: instruction.into(),
            ui: Mutex::new(UiState::default()),
        }
    }

    fn ui(&self) -> MutexGuard<'_, UiState> {
        self.ui.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> ScreenSnapshot {
        let ui = self.ui();
        ScreenSnapshot {
            image: ui.image.clone(),
            result: ui.result.clone(),
            analyzing: ui.analyzing,
        }
    }

    pub fn state(&self) -> ScreenState {
        self.snapshot().state()
    }

    /// Ask for camera permission and take a picture. A new picture replaces
    /// the old one and clears any result; cancelling changes nothing.
    /// Failures are alerted before being returned.
    pub async fn take_picture(&self) -> Result<CaptureOutcome, CaptureError> {
        match self.capture.capture().await {
            Ok(CaptureOutcome::Captured(image)) => {
                let replaced = {
                    let mut ui = self.ui();
                    let old = ui.image.replace(image.clone());
                    ui.result = None;
                    ui.generation += 1;
                    match old {
                        Some(old) if ui.analyzing => {
                            ui.retired.push(old);
                            None
                        }
                        old => old,
                    }
                };
                if let Some(old) = replaced {
                    self.capture.release(&old);
                }
                Ok(CaptureOutcome::Captured(image))
            }
            Ok(CaptureOutcome::Cancelled) => Ok(CaptureOutcome::Cancelled),
            Err(e @ CaptureError::PermissionDenied) => {
                self.notifier.alert(None, &e.to_string());
                Err(e)
            }
            Err(e) => {
                log::error!("Capture error: {}", e);
                self.notifier.alert(Some(CAPTURE_FAILED_TITLE), &e.to_string());
                Err(e)
            }
        }
    }

    /// Analyze the current picture. A no-op while another analysis runs.
    pub async fn analyze(&self) -> AnalyzeOutcome {
        let (image, generation) = {
            let mut ui = self.ui();
            let Some(image) = ui.image.clone() else {
                return AnalyzeOutcome::NoImage;
            };
            if ui.analyzing {
                log::debug!("Analyze ignored: already in flight");
                return AnalyzeOutcome::Ignored;
            }
            ui.analyzing = true;
            ui.result = None;
            (image, ui.generation)
        };
        let _in_flight = InFlightGuard { controller: self };

        log::info!("Analyzing {} via {}", image, self.client.name());

        match self.run_pipeline(&image).await {
            Ok(description) => {
                let text = description.unwrap_or_else(|| FALLBACK_DESCRIPTION.to_string());
                let mut ui = self.ui();
                if ui.generation == generation {
                    ui.result = Some(text.clone());
                    AnalyzeOutcome::Completed(text)
                } else {
                    log::warn!("Discarding result for {}: a newer picture was taken", image);
                    AnalyzeOutcome::Discarded(text)
                }
            }
            Err(e) => {
                log::error!("Analysis failed: {}", e);
                self.notifier.alert(Some(ANALYSIS_FAILED_TITLE), &e.to_string());
                AnalyzeOutcome::Failed(e)
            }
        }
    }

    async fn run_pipeline(&self, image: &ImageRef) -> Result<Option<String>, AnalysisError> {
        let payload = self.encoder.encode(image).await.map_err(|e| {
            log::debug!("Encoding {} failed: {}", image, e.detail);
            e
        })?;
        let raw = self.client.submit(&payload, &self.instruction).await?;
        normalize(&raw)
    }
}
