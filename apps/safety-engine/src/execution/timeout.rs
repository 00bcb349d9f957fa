//! Wall-clock deadline enforcement for one execution attempt window.

use std::time::Duration;

use tokio::time::Instant;

/// Absolute deadline for an in-flight execution flow.
///
/// The deadline is computed once, at submission, as an absolute instant.
/// Every check and every sleep derives from that single instant, so repeated
/// checks cannot drift under load the way re-armed relative sleeps do.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutController {
    started_at: Instant,
    deadline: Instant,
}

impl TimeoutController {
    /// Start a window of `duration` from now.
    #[must_use]
    pub fn start(duration: Duration) -> Self {
        let started_at = Instant::now();
        Self {
            started_at,
            deadline: started_at + duration,
        }
    }

    /// Whether the deadline has elapsed.
    #[must_use]
    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Time left until the deadline (zero once expired).
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Time elapsed since the window started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// The absolute deadline instant, for use in `tokio::select!` arms.
    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Sleep until the deadline. Returns immediately if already expired.
    pub async fn sleep_until_deadline(&self) {
        tokio::time::sleep_until(self.deadline).await;
    }
}
