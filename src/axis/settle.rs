use tokio::time::{Duration, Instant};

/// Hardware settle period after a command. While a window is active the axis
/// accepts no new commands; callers get a typed rejection instead of a
/// blocking wait. Reads (`refresh`) are exempt.
#[derive(Debug, Clone, Copy)]
pub struct SettleWindow {
    deadline: Instant,
}

impl SettleWindow {
    pub fn after(duration: Duration) -> Self {
        Self {
            deadline: Instant::now() + duration,
        }
    }

    pub fn is_active(&self) -> bool {
        Instant::now() < self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_window_expires_after_duration() {
        let window = SettleWindow::after(Duration::from_millis(250));
        assert!(window.is_active());

        tokio::time::advance(Duration::from_millis(251)).await;
        assert!(!window.is_active());
    }
}
