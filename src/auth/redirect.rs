//! Redirect guards.
//!
//! Keeps role-based redirection from looping: a landed redirect resets the
//! guard, repeats inside the rate window are suppressed, and the number of
//! redirects per session is capped.

use tokio::time::Instant;

use super::AuthConfig;
use crate::domain::value_objects::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedirectDecision {
    /// A navigation to the destination was scheduled.
    Scheduled(&'static str),
    /// The location already belongs to the role.
    AlreadyThere,
    /// The per-session redirect bound was hit.
    CapReached,
    /// A redirect happened inside the rate window.
    TooSoon,
    /// No authenticated role, or not on an entry page.
    NotApplicable,
}

#[derive(Debug, Default)]
pub struct RedirectGuard {
    redirected: bool,
    count: u32,
    last_at: Option<Instant>,
    last_destination: Option<&'static str>,
}

impl RedirectGuard {
    pub fn count(&self) -> u32 { self.count }
    pub fn redirected(&self) -> bool { self.redirected }

    /// Decides whether a redirect for `role` may leave `current_path` at `now`,
    /// recording it when it may.
    pub fn decide(&mut self, role: Role, current_path: &str, now: Instant, config: &AuthConfig) -> RedirectDecision {
        if role.owns_path(current_path) {
            self.redirected = false;
            self.count = 0;
            return RedirectDecision::AlreadyThere;
        }

        if self.count >= config.max_redirects {
            self.redirected = false;
            return RedirectDecision::CapReached;
        }

        let within_window = self.last_at.is_some_and(|at| now.saturating_duration_since(at) < config.redirect_window);
        let landed = self.last_destination == Some(current_path);
        if self.redirected && within_window && !landed {
            return RedirectDecision::TooSoon;
        }

        let destination = role.landing_path();
        self.redirected = true;
        self.count += 1;
        self.last_at = Some(now);
        self.last_destination = Some(destination);
        RedirectDecision::Scheduled(destination)
    }
}
