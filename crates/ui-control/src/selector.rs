use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::intent::{ControlPath, UiIntent};
use crate::strategy::{
    AccessibilityBridge, InputDriver, ScreenOracle, ShortcutRegistry, StrategyError, WindowServer,
};

/// One failed strategy attempt, kept so the caller can see why the selector
/// fell through to a costlier path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub path: ControlPath,
    pub reason: String,
}

/// Outcome of a successful interaction: which path carried it, the payload it
/// produced, and the failures accumulated on the way there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPathReport {
    pub path: ControlPath,
    pub payload: Value,
    pub attempts: Vec<AttemptFailure>,
    /// Only the vision path is billed.
    pub billed: bool,
}

#[derive(Debug, Error)]
pub enum UiControlError {
    #[error("{app} could not be brought to the foreground")]
    ForegroundLockFailed { app: String },
    #[error("every control path failed: {intent}")]
    Exhausted {
        intent: String,
        attempts: Vec<AttemptFailure>,
    },
    #[error("cancelled before the interaction completed")]
    Cancelled,
}

/// Picks the cheapest strategy expected to succeed for a UI-interaction call,
/// tries it, and falls through an explicit ordered list on failure. The
/// vision path is the slowest and the only billed one; it is never tried
/// first.
pub struct ControlPathSelector {
    ax: Arc<dyn AccessibilityBridge>,
    shortcuts: Arc<dyn ShortcutRegistry>,
    input: Arc<dyn InputDriver>,
    screen: Arc<dyn ScreenOracle>,
    windows: Arc<dyn WindowServer>,
    /// (app, element role) pairs whose tree proved unusable this turn.
    degraded: Mutex<HashSet<(String, String)>>,
}

impl ControlPathSelector {
    pub fn new(
        ax: Arc<dyn AccessibilityBridge>,
        shortcuts: Arc<dyn ShortcutRegistry>,
        input: Arc<dyn InputDriver>,
        screen: Arc<dyn ScreenOracle>,
        windows: Arc<dyn WindowServer>,
    ) -> Self {
        Self {
            ax,
            shortcuts,
            input,
            screen,
            windows,
            degraded: Mutex::new(HashSet::new()),
        }
    }

    /// Forget which trees proved unusable. Called at turn start; the memory
    /// spans rounds within a turn but never leaks across turns.
    pub async fn begin_turn(&self) {
        self.degraded.lock().await.clear();
    }

    pub async fn perform(
        &self,
        intent: &UiIntent,
        cancel: &CancellationToken,
    ) -> Result<ControlPathReport, UiControlError> {
        let mut attempts = Vec::new();

        for path in self.plan(intent).await {
            if cancel.is_cancelled() {
                return Err(UiControlError::Cancelled);
            }
            if intent.is_mutating() {
                self.ensure_frontmost(intent.app()).await?;
            }

            match self.attempt(path, intent).await {
                Ok(payload) => {
                    return Ok(ControlPathReport {
                        path,
                        payload,
                        attempts,
                        billed: path == ControlPath::VisionPointer,
                    });
                }
                Err(err) => {
                    if path == ControlPath::Accessibility && err.marks_tree_unusable() {
                        self.mark_degraded(intent).await;
                    }
                    debug!(
                        target: "ui_control::selector",
                        path = path.as_str(),
                        error = %err,
                        "control path failed, falling through"
                    );
                    attempts.push(AttemptFailure {
                        path,
                        reason: err.to_string(),
                    });
                }
            }
        }

        Err(UiControlError::Exhausted {
            intent: intent.describe(),
            attempts,
        })
    }

    /// Ordered strategy list, front-to-back. Accessibility leads unless this
    /// turn already showed the app has no usable tree for the element class;
    /// the shortcut path only appears when a documented shortcut exists.
    async fn plan(&self, intent: &UiIntent) -> Vec<ControlPath> {
        let mut plan = Vec::with_capacity(3);
        if !self.is_degraded(intent).await {
            plan.push(ControlPath::Accessibility);
        }
        if self
            .shortcuts
            .shortcut_for(intent.app(), intent)
            .is_some()
        {
            plan.push(ControlPath::KeyboardShortcut);
        }
        plan.push(ControlPath::VisionPointer);
        plan
    }

    async fn attempt(&self, path: ControlPath, intent: &UiIntent) -> Result<Value, StrategyError> {
        match path {
            ControlPath::Accessibility => self.attempt_accessibility(intent).await,
            ControlPath::KeyboardShortcut => {
                let chord = self
                    .shortcuts
                    .shortcut_for(intent.app(), intent)
                    .ok_or(StrategyError::NoShortcut)?;
                self.input.press_chord(&chord).await
            }
            ControlPath::VisionPointer => self.attempt_vision(intent).await,
        }
    }

    async fn attempt_accessibility(&self, intent: &UiIntent) -> Result<Value, StrategyError> {
        match intent {
            UiIntent::Click { app, element } => {
                let snapshot = self.ax.snapshot(app).await?;
                let resolved = snapshot
                    .resolve(element)
                    .ok_or_else(|| StrategyError::ElementNotFound(element.describe()))?;
                self.ax.press(resolved).await
            }
            UiIntent::TypeText { app, element, text } => {
                let snapshot = self.ax.snapshot(app).await?;
                let resolved = snapshot
                    .resolve(element)
                    .ok_or_else(|| StrategyError::ElementNotFound(element.describe()))?;
                self.ax.set_value(resolved, text).await
            }
            UiIntent::ReadScreen { app } => self.ax.read(app).await,
        }
    }

    async fn attempt_vision(&self, intent: &UiIntent) -> Result<Value, StrategyError> {
        match intent {
            UiIntent::Click { app, element } => {
                let point = self.screen.locate(app, &element.describe()).await?;
                self.input.click_at(point).await
            }
            UiIntent::TypeText { app, element, text } => {
                let point = self.screen.locate(app, &element.describe()).await?;
                self.input.type_at(point, text).await
            }
            UiIntent::ReadScreen { app } => self.screen.read(app).await,
        }
    }

    /// The foreground lock: mutating strategies only ever act on the
    /// verified-frontmost application. One re-activation attempt, then abort.
    async fn ensure_frontmost(&self, app: &str) -> Result<(), UiControlError> {
        let lock_failed = |_: StrategyError| UiControlError::ForegroundLockFailed {
            app: app.to_string(),
        };
        if self.windows.frontmost().await.map_err(lock_failed)? == app {
            return Ok(());
        }
        self.windows.activate(app).await.map_err(lock_failed)?;
        if self.windows.frontmost().await.map_err(lock_failed)? == app {
            return Ok(());
        }
        Err(UiControlError::ForegroundLockFailed {
            app: app.to_string(),
        })
    }

    async fn is_degraded(&self, intent: &UiIntent) -> bool {
        self.degraded
            .lock()
            .await
            .contains(&degrade_key(intent))
    }

    async fn mark_degraded(&self, intent: &UiIntent) {
        self.degraded.lock().await.insert(degrade_key(intent));
    }
}

fn degrade_key(intent: &UiIntent) -> (String, String) {
    let class = intent
        .element()
        .map(|element| element.role.clone())
        .unwrap_or_else(|| "screen".to_string());
    (intent.app().to_string(), class)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::ElementQuery;
    use crate::strategy::{AxElement, AxSnapshot, ScreenPoint, ShortcutChord};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeAx {
        snapshot: AxSnapshot,
        snapshot_calls: AtomicUsize,
    }

    impl FakeAx {
        fn with_elements(app: &str, elements: Vec<AxElement>) -> Arc<Self> {
            Arc::new(Self {
                snapshot: AxSnapshot {
                    app: app.to_string(),
                    elements,
                },
                snapshot_calls: AtomicUsize::new(0),
            })
        }

        fn empty(app: &str) -> Arc<Self> {
            Self::with_elements(app, Vec::new())
        }
    }

    #[async_trait]
    impl AccessibilityBridge for FakeAx {
        async fn snapshot(&self, _app: &str) -> Result<AxSnapshot, StrategyError> {
            self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.snapshot.clone())
        }

        async fn press(&self, element: &AxElement) -> Result<Value, StrategyError> {
            Ok(json!({ "pressed": element.reference }))
        }

        async fn set_value(&self, element: &AxElement, text: &str) -> Result<Value, StrategyError> {
            Ok(json!({ "set": element.reference, "chars": text.chars().count() }))
        }

        async fn read(&self, app: &str) -> Result<Value, StrategyError> {
            Ok(json!({ "app": app, "text": "visible content" }))
        }
    }

    struct StaticShortcuts(Option<ShortcutChord>);

    impl ShortcutRegistry for StaticShortcuts {
        fn shortcut_for(&self, _app: &str, _intent: &UiIntent) -> Option<ShortcutChord> {
            self.0.clone()
        }
    }

    struct RecordingInput {
        chords_fail: bool,
        clicks: Mutex<Vec<ScreenPoint>>,
    }

    impl RecordingInput {
        fn new(chords_fail: bool) -> Arc<Self> {
            Arc::new(Self {
                chords_fail,
                clicks: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl InputDriver for RecordingInput {
        async fn press_chord(&self, chord: &ShortcutChord) -> Result<Value, StrategyError> {
            if self.chords_fail {
                return Err(StrategyError::Driver("event tap rejected chord".into()));
            }
            Ok(json!({ "chord": chord.0 }))
        }

        async fn click_at(&self, point: ScreenPoint) -> Result<Value, StrategyError> {
            self.clicks.lock().await.push(point);
            Ok(json!({ "clicked": [point.x, point.y] }))
        }

        async fn type_at(&self, point: ScreenPoint, text: &str) -> Result<Value, StrategyError> {
            Ok(json!({ "typed_at": [point.x, point.y], "chars": text.chars().count() }))
        }
    }

    struct FakeScreen;

    #[async_trait]
    impl ScreenOracle for FakeScreen {
        async fn locate(&self, _app: &str, _description: &str) -> Result<ScreenPoint, StrategyError> {
            Ok(ScreenPoint { x: 640.0, y: 360.0 })
        }

        async fn read(&self, app: &str) -> Result<Value, StrategyError> {
            Ok(json!({ "app": app, "ocr": "screen text" }))
        }
    }

    struct FakeWindows {
        frontmost: Mutex<String>,
        honor_activate: AtomicBool,
        activations: Mutex<Vec<String>>,
    }

    impl FakeWindows {
        fn new(frontmost: &str, honor_activate: bool) -> Arc<Self> {
            Arc::new(Self {
                frontmost: Mutex::new(frontmost.to_string()),
                honor_activate: AtomicBool::new(honor_activate),
                activations: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl WindowServer for FakeWindows {
        async fn frontmost(&self) -> Result<String, StrategyError> {
            Ok(self.frontmost.lock().await.clone())
        }

        async fn activate(&self, app: &str) -> Result<(), StrategyError> {
            self.activations.lock().await.push(app.to_string());
            if self.honor_activate.load(Ordering::SeqCst) {
                *self.frontmost.lock().await = app.to_string();
            }
            Ok(())
        }
    }

    fn click_intent() -> UiIntent {
        UiIntent::Click {
            app: "Notes".to_string(),
            element: ElementQuery::new("button", "Done"),
        }
    }

    fn selector_with(
        ax: Arc<FakeAx>,
        shortcut: Option<ShortcutChord>,
        input: Arc<RecordingInput>,
        windows: Arc<FakeWindows>,
    ) -> ControlPathSelector {
        ControlPathSelector::new(
            ax,
            Arc::new(StaticShortcuts(shortcut)),
            input,
            Arc::new(FakeScreen),
            windows,
        )
    }

    #[tokio::test]
    async fn accessibility_wins_when_element_resolves() {
        let ax = FakeAx::with_elements(
            "Notes",
            vec![AxElement {
                reference: "ax://notes/done".into(),
                role: "button".into(),
                label: "Done".into(),
            }],
        );
        let selector = selector_with(
            ax,
            Some(ShortcutChord("cmd+d".into())),
            RecordingInput::new(false),
            FakeWindows::new("Notes", true),
        );

        let report = selector
            .perform(&click_intent(), &CancellationToken::new())
            .await
            .expect("accessibility path should succeed");
        assert_eq!(report.path, ControlPath::Accessibility);
        assert!(report.attempts.is_empty());
        assert!(!report.billed);
    }

    #[tokio::test]
    async fn falls_back_through_shortcut_to_vision() {
        // Tree has no such element, the chord bounces off the event tap, so
        // only the billed vision path is left.
        let input = RecordingInput::new(true);
        let selector = selector_with(
            FakeAx::empty("Notes"),
            Some(ShortcutChord("cmd+d".into())),
            input.clone(),
            FakeWindows::new("Notes", true),
        );

        let report = selector
            .perform(&click_intent(), &CancellationToken::new())
            .await
            .expect("vision fallback should succeed");
        assert_eq!(report.path, ControlPath::VisionPointer);
        assert!(report.billed);
        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.attempts[0].path, ControlPath::Accessibility);
        assert_eq!(report.attempts[1].path, ControlPath::KeyboardShortcut);
        assert_eq!(input.clicks.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn unusable_tree_is_skipped_for_the_rest_of_the_turn() {
        let ax = FakeAx::empty("Notes");
        let selector = selector_with(
            ax.clone(),
            None,
            RecordingInput::new(false),
            FakeWindows::new("Notes", true),
        );
        let cancel = CancellationToken::new();

        let first = selector.perform(&click_intent(), &cancel).await.unwrap();
        assert_eq!(first.path, ControlPath::VisionPointer);
        assert_eq!(ax.snapshot_calls.load(Ordering::SeqCst), 1);

        // Second call in the same turn goes straight to vision.
        let second = selector.perform(&click_intent(), &cancel).await.unwrap();
        assert!(second.attempts.is_empty());
        assert_eq!(ax.snapshot_calls.load(Ordering::SeqCst), 1);

        // A new turn gets a fresh look at the tree.
        selector.begin_turn().await;
        let third = selector.perform(&click_intent(), &cancel).await.unwrap();
        assert_eq!(third.attempts.len(), 1);
        assert_eq!(ax.snapshot_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn foreground_lock_aborts_when_reactivation_fails() {
        let windows = FakeWindows::new("Finder", false);
        let selector = selector_with(
            FakeAx::empty("Notes"),
            None,
            RecordingInput::new(false),
            windows.clone(),
        );

        let err = selector
            .perform(&click_intent(), &CancellationToken::new())
            .await
            .expect_err("lock should fail");
        assert!(matches!(err, UiControlError::ForegroundLockFailed { .. }));
        assert_eq!(windows.activations.lock().await.as_slice(), ["Notes"]);
    }

    #[tokio::test]
    async fn foreground_lock_reactivates_once_then_proceeds() {
        let windows = FakeWindows::new("Finder", true);
        let ax = FakeAx::with_elements(
            "Notes",
            vec![AxElement {
                reference: "ax://notes/done".into(),
                role: "button".into(),
                label: "Done".into(),
            }],
        );
        let selector = selector_with(ax, None, RecordingInput::new(false), windows.clone());

        let report = selector
            .perform(&click_intent(), &CancellationToken::new())
            .await
            .expect("click should proceed after activation");
        assert_eq!(report.path, ControlPath::Accessibility);
        assert_eq!(windows.activations.lock().await.as_slice(), ["Notes"]);
    }

    #[tokio::test]
    async fn reads_ignore_the_foreground_lock() {
        // Another app is frontmost; reading must neither activate nor abort.
        let windows = FakeWindows::new("Finder", false);
        let selector = selector_with(
            FakeAx::empty("Notes"),
            None,
            RecordingInput::new(false),
            windows.clone(),
        );

        let report = selector
            .perform(
                &UiIntent::ReadScreen {
                    app: "Notes".to_string(),
                },
                &CancellationToken::new(),
            )
            .await
            .expect("read should succeed without focus");
        assert_eq!(report.path, ControlPath::Accessibility);
        assert!(windows.activations.lock().await.is_empty());
    }

    #[tokio::test]
    async fn cancellation_preempts_any_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let selector = selector_with(
            FakeAx::empty("Notes"),
            None,
            RecordingInput::new(false),
            FakeWindows::new("Notes", true),
        );

        let err = selector
            .perform(&click_intent(), &cancel)
            .await
            .expect_err("cancelled before first attempt");
        assert!(matches!(err, UiControlError::Cancelled));
    }
}
