//! Single-flight submission of gameplay commands
//!
//! The gateway never touches the mirror: the effect of an action shows up once
//! the synchronizer fetches the next snapshot.

use crate::mirror::Mirror;
use crate::network::{ActionRequest, GameApi};
use log::{debug, info, warn};
use shared::PlayerId;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

pub const NO_TARGET_REASON: &str = "Select a player first";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Sent,
    /// Another submission is still in flight; nothing was sent
    Busy,
    /// The controls offer no action right now
    NothingToSubmit,
    Failed(String),
}

/// Clears the busy flag however the submission ends, cancellation included
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ActionGateway {
    api: Arc<dyn GameApi>,
    mirror: Mirror,
    busy: AtomicBool,
    selection: Mutex<Option<PlayerId>>,
    error: Arc<watch::Sender<Option<String>>>,
    error_generation: Arc<AtomicU64>,
    error_flash: Duration,
}

impl ActionGateway {
    pub fn new(api: Arc<dyn GameApi>, mirror: Mirror, error_flash: Duration) -> Self {
        let (error, _rx) = watch::channel(None);
        Self {
            api,
            mirror,
            busy: AtomicBool::new(false),
            selection: Mutex::new(None),
            error: Arc::new(error),
            error_generation: Arc::new(AtomicU64::new(0)),
            error_flash,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Reason shown by the error indicator, if it is currently lit
    pub fn error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    pub fn subscribe_error(&self) -> watch::Receiver<Option<String>> {
        self.error.subscribe()
    }

    pub fn selection(&self) -> Option<PlayerId> {
        *self.selected()
    }

    pub fn select(&self, id: PlayerId) {
        *self.selected() = Some(id);
    }

    /// Selects `id`, or deselects it when it is already selected
    pub fn toggle_selection(&self, id: PlayerId) -> Option<PlayerId> {
        let mut selected = self.selected();
        *selected = if *selected == Some(id) { None } else { Some(id) };
        *selected
    }

    pub fn clear_selection(&self) {
        self.selected().take();
    }

    /// Submits whatever action the controls currently offer, targeting the
    /// selected player when the action needs one.
    pub async fn submit(&self) -> Submission {
        if self.is_busy() {
            return Submission::Busy;
        }

        let Some(controls) = self.mirror.controls() else {
            return Submission::NothingToSubmit;
        };
        let Some(action) = controls.action() else {
            return Submission::NothingToSubmit;
        };

        let target = if controls.requires_target() {
            match self.selection() {
                Some(id) => Some(id),
                None => {
                    self.flash_error(NO_TARGET_REASON.to_string());
                    return Submission::Failed(NO_TARGET_REASON.to_string());
                }
            }
        } else {
            None
        };

        self.dispatch(ActionRequest::new(action, target)).await
    }

    pub async fn end_game(&self) -> Submission {
        self.dispatch(ActionRequest::new("end_game", None)).await
    }

    async fn dispatch(&self, request: ActionRequest) -> Submission {
        // Claimed before the first await so two rapid calls cannot both pass
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Dropping {} while another submission is in flight", request.action);
            return Submission::Busy;
        }
        let _busy = BusyGuard(&self.busy);
        let sent_with = self.selection();

        match self.api.submit_action(&request).await {
            Ok(()) => {
                info!("Submitted {}", request.action);
                self.clear_selection_if(sent_with);
                self.clear_error();
                Submission::Sent
            }
            Err(e) => {
                let reason = e.reason();
                warn!("Submitting {} failed: {}", request.action, e);
                self.flash_error(reason.clone());
                Submission::Failed(reason)
            }
        }
    }

    /// Clears the selection unless the user picked another player meanwhile
    fn clear_selection_if(&self, expected: Option<PlayerId>) {
        let mut selected = self.selected();
        if *selected == expected {
            selected.take();
        }
    }

    fn clear_error(&self) {
        self.error_generation.fetch_add(1, Ordering::SeqCst);
        self.error.send_replace(None);
    }

    /// Lights the error indicator and schedules it to go out again. A later
    /// flash supersedes the pending clear of an earlier one.
    fn flash_error(&self, reason: String) {
        let generation = self.error_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.error.send_replace(Some(reason));

        let error = Arc::clone(&self.error);
        let current = Arc::clone(&self.error_generation);
        let flash = self.error_flash;
        tokio::spawn(async move {
            sleep(flash).await;
            if current.load(Ordering::SeqCst) == generation {
                error.send_replace(None);
            }
        });
    }

    fn selected(&self) -> MutexGuard<'_, Option<PlayerId>> {
        self.selection.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::fixtures::snapshot;
    use crate::network::mock::{Call, MockApi};
    use crate::network::ApiError;
    use tokio::sync::Notify;
    use tokio_test::{assert_pending, assert_ready_eq};
    use uuid::Uuid;

    const FLASH: Duration = Duration::from_secs(1);

    fn mirror() -> Mirror {
        let mirror = Mirror::new();
        mirror.replace(snapshot(1));
        mirror
    }

    fn gateway(api: &Arc<MockApi>) -> ActionGateway {
        ActionGateway::new(api.clone(), mirror(), FLASH)
    }

    fn target() -> PlayerId {
        Uuid::from_u128(2)
    }

    fn is_action(call: &Call) -> bool {
        matches!(call, Call::Action(_))
    }

    #[tokio::test]
    async fn test_submit_sends_selected_target() {
        let api = Arc::new(MockApi::new());
        let gw = gateway(&api);
        gw.select(target());

        assert_eq!(gw.submit().await, Submission::Sent);
        assert_eq!(
            api.calls(),
            vec![Call::Action(ActionRequest::new("vote", Some(target())))]
        );
        assert_eq!(gw.selection(), None);
        assert_eq!(gw.error(), None);
        assert!(!gw.is_busy());
    }

    #[tokio::test]
    async fn test_single_flight() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(MockApi::with_action_gate(gate.clone()));
        let gw = gateway(&api);
        gw.select(target());

        let mut first = tokio_test::task::spawn(gw.submit());
        assert_pending!(first.poll());
        assert!(gw.is_busy());

        assert_eq!(gw.submit().await, Submission::Busy);
        assert_eq!(gw.end_game().await, Submission::Busy);
        assert_eq!(api.count(is_action), 1);

        gate.notify_one();
        assert_ready_eq!(first.poll(), Submission::Sent);
        assert!(!gw.is_busy());
    }

    #[tokio::test]
    async fn test_selection_made_in_flight_survives_success() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(MockApi::with_action_gate(gate.clone()));
        let gw = gateway(&api);
        gw.select(target());

        let mut first = tokio_test::task::spawn(gw.submit());
        assert_pending!(first.poll());

        let next = Uuid::from_u128(3);
        gw.select(next);
        gate.notify_one();
        assert_ready_eq!(first.poll(), Submission::Sent);

        assert_eq!(gw.selection(), Some(next));
    }

    #[tokio::test]
    async fn test_busy_cleared_after_failure() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(MockApi::with_action_gate(gate.clone()));
        api.push_action(Err(ApiError::Network("offline".to_string())));
        let gw = gateway(&api);
        gw.select(target());

        let mut first = tokio_test::task::spawn(gw.submit());
        assert_pending!(first.poll());
        gate.notify_one();
        assert!(matches!(first.poll(), std::task::Poll::Ready(Submission::Failed(_))));
        assert!(!gw.is_busy());
    }

    #[tokio::test]
    async fn test_cancelled_submission_releases_busy_flag() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(MockApi::with_action_gate(gate));
        let gw = gateway(&api);
        gw.select(target());

        let mut first = tokio_test::task::spawn(gw.submit());
        assert_pending!(first.poll());
        drop(first);

        assert!(!gw.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_flashes_then_clears() {
        let api = Arc::new(MockApi::new());
        api.push_action(Err(ApiError::Rejected {
            status: 400,
            detail: Some("You can't vote for yourself".to_string()),
        }));
        let gw = gateway(&api);
        gw.select(target());

        assert_eq!(
            gw.submit().await,
            Submission::Failed("You can't vote for yourself".to_string())
        );
        assert_eq!(gw.error(), Some("You can't vote for yourself".to_string()));
        assert_eq!(gw.selection(), Some(target()));

        sleep(Duration::from_millis(999)).await;
        assert!(gw.error().is_some());

        sleep(Duration::from_millis(2)).await;
        assert_eq!(gw.error(), None);

        // No automatic retry, but the user may try again
        assert_eq!(api.count(is_action), 1);
        assert_eq!(gw.submit().await, Submission::Sent);
        assert_eq!(api.count(is_action), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_error_outlives_older_timer() {
        let api = Arc::new(MockApi::new());
        api.push_action(Err(ApiError::Network("offline".to_string())));
        api.push_action(Err(ApiError::Rejected {
            status: 409,
            detail: Some("Already voted".to_string()),
        }));
        let gw = gateway(&api);
        gw.select(target());

        gw.submit().await;
        sleep(Duration::from_millis(600)).await;
        gw.submit().await;

        sleep(Duration::from_millis(500)).await;
        assert_eq!(gw.error(), Some("Already voted".to_string()));

        sleep(Duration::from_millis(501)).await;
        assert_eq!(gw.error(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_target_flashes_without_request() {
        let api = Arc::new(MockApi::new());
        let gw = gateway(&api);

        assert_eq!(
            gw.submit().await,
            Submission::Failed(NO_TARGET_REASON.to_string())
        );
        assert_eq!(gw.error(), Some(NO_TARGET_REASON.to_string()));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_nothing_to_submit() {
        let api = Arc::new(MockApi::new());
        let gw = ActionGateway::new(api.clone(), Mirror::new(), FLASH);
        assert_eq!(gw.submit().await, Submission::NothingToSubmit);

        let mirror = Mirror::new();
        let mut snap = snapshot(1);
        snap.controls.button_enabled = false;
        mirror.replace(snap);
        let gw = ActionGateway::new(api.clone(), mirror, FLASH);
        assert_eq!(gw.submit().await, Submission::NothingToSubmit);

        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_untargeted_action_ignores_selection() {
        let api = Arc::new(MockApi::new());
        let mirror = Mirror::new();
        let mut snap = snapshot(1);
        snap.controls.button_submit_func = Some("ready".to_string());
        snap.controls.button_submit_person = Some(false);
        mirror.replace(snap);

        let gw = ActionGateway::new(api.clone(), mirror, FLASH);
        gw.select(target());

        assert_eq!(gw.submit().await, Submission::Sent);
        assert_eq!(
            api.calls(),
            vec![Call::Action(ActionRequest::new("ready", None))]
        );
    }

    #[test]
    fn test_toggle_selection() {
        let api = Arc::new(MockApi::new());
        let gw = gateway(&api);

        assert_eq!(gw.toggle_selection(target()), Some(target()));
        let other = Uuid::from_u128(3);
        assert_eq!(gw.toggle_selection(other), Some(other));
        assert_eq!(gw.toggle_selection(other), None);

        gw.select(target());
        gw.clear_selection();
        assert_eq!(gw.selection(), None);
    }

    #[tokio::test]
    async fn test_end_game() {
        let api = Arc::new(MockApi::new());
        let gw = gateway(&api);

        assert_eq!(gw.end_game().await, Submission::Sent);
        assert_eq!(
            api.calls(),
            vec![Call::Action(ActionRequest::new("end_game", None))]
        );
    }
}
