//! Frame-exit navigation handshake.
//!
//! Some flows (OAuth grants, billing confirmations) cannot complete inside
//! the platform's iframe: the app must ask the hosting shell to navigate the
//! top-level frame out, and must only do so for targets on its own host.
//! The platform redirects the app to a dedicated page carrying the target in
//! the `redirectUri` query parameter; an [`ExitController`] owns that page
//! view.
//!
//! # Behavior
//!
//! - The redirect target arrives percent-encoded; the controller decodes it,
//!   parses it as a URL, and compares its host against the document host.
//!   An exact match hands the decoded target to the shell's `navigate`
//!   capability; anything else (cross-origin, undecodable, unparseable) is
//!   rejected with no action taken. Rejection is silent: there is no error
//!   channel here, and staying put inside the frame is the safe outcome.
//! - A missing `redirectUri` leaves the controller idle. The page keeps
//!   showing its neutral loading placeholder indefinitely; that degraded
//!   terminal state is the long-standing observed behavior and is kept
//!   as-is.
//! - The shell's loading indicator is turned on as soon as the shell handle
//!   is available and turned off exactly once when the controller is torn
//!   down, on every exit path, including teardown before any navigation
//!   decision was made.
//!
//! Both the shell handle and the navigation context may arrive late (the
//! bridge connects asynchronously), so the check re-runs whenever either
//! input lands. Validation itself is a pure synchronous function of the
//! inputs, so re-evaluation with unchanged inputs is idempotent.

use log::debug;
use percent_encoding::percent_decode_str;
use url::Url;

use gangway_common::{NavContext, SharedShell};

/// Where the controller's navigation decision stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitPhase {
    /// No decision yet: inputs missing, or no redirect parameter present.
    #[default]
    Idle,
    /// The target validated same-origin and was handed to the shell.
    Navigating,
    /// The target was cross-origin or malformed; no action was taken.
    Rejected,
}

/// The intent to navigate the shell to an external target.
///
/// Wraps the raw, still-encoded `redirectUri` value and validates it against
/// a host. Validation is pure: re-evaluating the same directive against the
/// same host always yields the same answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitDirective {
    raw: String,
}

impl ExitDirective {
    /// Wraps a raw redirect target as it appeared in the query string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Percent-decodes the raw target.
    ///
    /// The platform double-encodes the parameter (once as form data, once on
    /// the value itself), so one more decoding pass happens here on top of
    /// the form parser's.
    #[must_use]
    pub fn decode(&self) -> Option<String> {
        percent_decode_str(&self.raw)
            .decode_utf8()
            .ok()
            .map(|decoded| decoded.into_owned())
    }

    /// Validates the target against the current document host.
    ///
    /// Returns the decoded target only when it parses as a URL whose host
    /// exactly equals `current_host`. Cross-origin and malformed targets
    /// yield `None`; they are never navigated to automatically.
    #[must_use]
    pub fn validate(&self, current_host: &str) -> Option<String> {
        let decoded = self.decode()?;
        let url = Url::parse(&decoded).ok()?;
        (url.host_str() == Some(current_host)).then_some(decoded)
    }
}

/// Controller for a frame-exit page view.
///
/// Create one on page activation, feed it the shell handle and navigation
/// context as they become available, and drop it on deactivation. Dropping
/// is what releases the shell's loading indicator, so the controller must
/// live exactly as long as the page view.
///
/// # Examples
///
/// ```
/// use gangway::exit::{ExitController, ExitPhase};
/// use gangway_common::NavContext;
///
/// let mut controller = ExitController::new();
/// controller.location_changed(NavContext::new("shop.example", ""));
/// // No shell yet, no redirect parameter: nothing happens, nothing crashes.
/// assert_eq!(controller.phase(), ExitPhase::Idle);
/// ```
#[derive(Default)]
pub struct ExitController {
    shell: Option<SharedShell>,
    nav: Option<NavContext>,
    phase: ExitPhase,
    loading_shown: bool,
}

impl ExitController {
    /// Creates an inactive controller with no inputs yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current navigation decision.
    #[must_use]
    pub const fn phase(&self) -> ExitPhase {
        self.phase
    }

    /// Whether the shell loading indicator is currently shown by us.
    #[must_use]
    pub const fn loading_shown(&self) -> bool {
        self.loading_shown
    }

    /// Supplies the shell handle once the bridge has connected.
    ///
    /// Signals loading immediately and re-runs the navigation check.
    pub fn shell_connected(&mut self, shell: SharedShell) {
        if !self.loading_shown {
            shell.loading(true);
            self.loading_shown = true;
        }
        self.shell = Some(shell);
        self.evaluate();
    }

    /// Supplies or replaces the navigation context.
    ///
    /// A changed search string is a new input, so a previous decision is
    /// discarded and the check re-runs.
    pub fn location_changed(&mut self, nav: NavContext) {
        self.nav = Some(nav);
        self.phase = ExitPhase::Idle;
        self.evaluate();
    }

    fn evaluate(&mut self) {
        if self.phase != ExitPhase::Idle {
            return;
        }
        let (Some(shell), Some(nav)) = (&self.shell, &self.nav) else {
            return;
        };
        // No redirect parameter: stay Idle behind the loading placeholder.
        let Some(raw) = nav.redirect_target() else {
            return;
        };

        let directive = ExitDirective::new(raw);
        if let Some(target) = directive.validate(nav.host()) {
            shell.navigate(&target);
            self.phase = ExitPhase::Navigating;
        } else {
            debug!("rejected frame-exit target for host '{}'", nav.host());
            self.phase = ExitPhase::Rejected;
        }
    }
}

impl Drop for ExitController {
    fn drop(&mut self) {
        if self.loading_shown
            && let Some(shell) = &self.shell
        {
            shell.loading(false);
        }
    }
}

impl std::fmt::Debug for ExitController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitController")
            .field("phase", &self.phase)
            .field("loading_shown", &self.loading_shown)
            .field("has_shell", &self.shell.is_some())
            .field("nav", &self.nav)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::{Arc, Mutex};

    use gangway_common::ShellBridge;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum ShellEvent {
        Navigate(String),
        Loading(bool),
        Toast(String, bool),
    }

    #[derive(Default)]
    struct RecordingShell {
        events: Mutex<Vec<ShellEvent>>,
    }

    impl RecordingShell {
        fn events(&self) -> Vec<ShellEvent> {
            self.events
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        }

        fn push(&self, event: ShellEvent) {
            self.events
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(event);
        }
    }

    impl ShellBridge for RecordingShell {
        fn navigate(&self, url: &str) {
            self.push(ShellEvent::Navigate(url.to_owned()));
        }

        fn loading(&self, shown: bool) {
            self.push(ShellEvent::Loading(shown));
        }

        fn toast(&self, message: &str, is_error: bool) {
            self.push(ShellEvent::Toast(message.to_owned(), is_error));
        }
    }

    fn navigations(events: &[ShellEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|event| match event {
                ShellEvent::Navigate(url) => Some(url.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn same_host_target_navigates_once_with_decoded_target() {
        let shell = Arc::new(RecordingShell::default());
        let mut controller = ExitController::new();
        controller.shell_connected(shell.clone());
        controller.location_changed(NavContext::new(
            "shop.example",
            "redirectUri=https%3A%2F%2Fshop.example%2Fauth%2Fcallback",
        ));

        assert_eq!(controller.phase(), ExitPhase::Navigating);
        assert_eq!(
            navigations(&shell.events()),
            vec!["https://shop.example/auth/callback"]
        );
    }

    #[test]
    fn double_encoded_target_is_fully_decoded() {
        let shell = Arc::new(RecordingShell::default());
        let mut controller = ExitController::new();
        controller.shell_connected(shell.clone());
        controller.location_changed(NavContext::new(
            "shop.example",
            "redirectUri=https%253A%252F%252Fshop.example%252Fapp",
        ));

        assert_eq!(controller.phase(), ExitPhase::Navigating);
        assert_eq!(navigations(&shell.events()), vec!["https://shop.example/app"]);
    }

    #[test]
    fn cross_host_target_is_rejected_without_action() {
        let shell = Arc::new(RecordingShell::default());
        let mut controller = ExitController::new();
        controller.shell_connected(shell.clone());
        controller.location_changed(NavContext::new(
            "shop.example",
            "redirectUri=https%3A%2F%2Fevil.example%2Fx",
        ));

        assert_eq!(controller.phase(), ExitPhase::Rejected);
        assert!(navigations(&shell.events()).is_empty());
    }

    #[test]
    fn unparseable_target_is_rejected() {
        let shell = Arc::new(RecordingShell::default());
        let mut controller = ExitController::new();
        controller.shell_connected(shell.clone());
        controller.location_changed(NavContext::new("shop.example", "redirectUri=not%20a%20url"));

        assert_eq!(controller.phase(), ExitPhase::Rejected);
        assert!(navigations(&shell.events()).is_empty());
    }

    #[test]
    fn missing_parameter_stays_idle_indefinitely() {
        let shell = Arc::new(RecordingShell::default());
        let mut controller = ExitController::new();
        controller.shell_connected(shell.clone());
        controller.location_changed(NavContext::new("shop.example", "embedded=1"));

        assert_eq!(controller.phase(), ExitPhase::Idle);
        assert!(navigations(&shell.events()).is_empty());
        // Loading stays on: the degraded state keeps the placeholder visible.
        assert!(controller.loading_shown());
    }

    #[test]
    fn loading_toggles_on_connect_and_off_on_teardown() {
        let shell = Arc::new(RecordingShell::default());
        {
            let mut controller = ExitController::new();
            controller.shell_connected(shell.clone());
            controller.location_changed(NavContext::new(
                "shop.example",
                "redirectUri=https%3A%2F%2Fshop.example%2Fapp",
            ));
        }

        let loadings: Vec<_> = shell
            .events()
            .into_iter()
            .filter(|event| matches!(event, ShellEvent::Loading(_)))
            .collect();
        assert_eq!(loadings, vec![ShellEvent::Loading(true), ShellEvent::Loading(false)]);
    }

    #[test]
    fn early_teardown_still_releases_loading_exactly_once() {
        let shell = Arc::new(RecordingShell::default());
        {
            let mut controller = ExitController::new();
            controller.shell_connected(shell.clone());
            // Torn down before any navigation context arrives.
        }

        assert_eq!(
            shell.events(),
            vec![ShellEvent::Loading(true), ShellEvent::Loading(false)]
        );
    }

    #[test]
    fn absent_shell_degrades_to_no_action() {
        let mut controller = ExitController::new();
        controller.location_changed(NavContext::new(
            "shop.example",
            "redirectUri=https%3A%2F%2Fshop.example%2Fapp",
        ));

        assert_eq!(controller.phase(), ExitPhase::Idle);
        assert!(!controller.loading_shown());
        // Dropping without a shell must not do anything either.
        drop(controller);
    }

    #[test]
    fn late_shell_arrival_completes_the_handshake() {
        let shell = Arc::new(RecordingShell::default());
        let mut controller = ExitController::new();
        controller.location_changed(NavContext::new(
            "shop.example",
            "redirectUri=https%3A%2F%2Fshop.example%2Fapp",
        ));
        assert_eq!(controller.phase(), ExitPhase::Idle);

        controller.shell_connected(shell.clone());
        assert_eq!(controller.phase(), ExitPhase::Navigating);
        assert_eq!(navigations(&shell.events()), vec!["https://shop.example/app"]);
    }

    #[test]
    fn directive_validation_is_pure_and_repeatable() {
        let directive = ExitDirective::new("https%3A%2F%2Fshop.example%2Fapp");
        let first = directive.validate("shop.example");
        let second = directive.validate("shop.example");
        assert_eq!(first, second);
        assert_eq!(first.as_deref(), Some("https://shop.example/app"));
        assert_eq!(directive.validate("other.example"), None);
    }
}
