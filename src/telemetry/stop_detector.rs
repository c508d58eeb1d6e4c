use std::time::Duration;

use log::debug;

/// Speed below which the vehicle is considered stationary
pub const STOP_SPEED_THRESHOLD_KMH: f64 = 1.0;
/// How long the vehicle has to stay below the threshold before a notification fires
pub const STOP_WINDOW: Duration = Duration::from_secs(15);

pub const STOP_NOTIFICATION_TITLE: &str = "Bike Stopped";

/// Notification intent produced once per sustained low-speed run
#[derive(Clone, Debug, PartialEq)]
pub struct StopNotification {
    pub title: String,
    pub body: String,
    /// When the low-speed run started, ms since epoch
    pub stopped_since_ms: i64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StopState {
    Moving,
    /// A low-speed sample armed the timer and no faster sample arrived since
    PendingStop { since_ms: i64, deadline_ms: i64 },
}

/// Debounces the live speed stream into a single "stopped" notification.
///
/// The timer is a deadline polled by the owner, so cancelling it is exact: once
/// `cancel` returns nothing can fire until a new low-speed sample re-arms it.
pub struct StopDetector {
    threshold_kmh: f64,
    window: Duration,
    state: StopState,
}

impl Default for StopDetector {
    fn default() -> Self {
        Self::new(STOP_SPEED_THRESHOLD_KMH, STOP_WINDOW)
    }
}

impl StopDetector {
    pub fn new(threshold_kmh: f64, window: Duration) -> Self {
        Self {
            threshold_kmh,
            window,
            state: StopState::Moving,
        }
    }

    pub fn state(&self) -> StopState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, StopState::PendingStop { .. })
    }

    /// Feed the speed of a new sample received at `now_ms`.
    ///
    /// A timer that expired before this sample arrived fires first, then the sample
    /// is evaluated against an idle detector.
    pub fn on_speed(&mut self, speed_kmh: f64, now_ms: i64) -> Option<StopNotification> {
        let overdue = self.poll(now_ms);
        let speed_kmh = if speed_kmh.is_finite() && speed_kmh > 0. {
            speed_kmh
        } else {
            0.
        };

        if speed_kmh < self.threshold_kmh {
            if !self.is_armed() {
                let window_ms = i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX);
                debug!("Speed {:.2} km/h below threshold, arming stop timer", speed_kmh);
                self.state = StopState::PendingStop {
                    since_ms: now_ms,
                    deadline_ms: now_ms.saturating_add(window_ms),
                };
            }
        } else if self.is_armed() {
            debug!("Moving again at {:.2} km/h, stop timer cancelled", speed_kmh);
            self.state = StopState::Moving;
        }

        overdue
    }

    /// Fire the pending notification if its window elapsed by `now_ms`
    pub fn poll(&mut self, now_ms: i64) -> Option<StopNotification> {
        match self.state {
            StopState::PendingStop {
                since_ms,
                deadline_ms,
            } if now_ms >= deadline_ms => {
                self.state = StopState::Moving;
                Some(StopNotification {
                    title: STOP_NOTIFICATION_TITLE.to_string(),
                    body: format!(
                        "Your bike has been stationary for {} seconds.",
                        self.window.as_secs()
                    ),
                    stopped_since_ms: since_ms,
                })
            }
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        self.state = StopState::Moving;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_low_speed_arms_timer() {
        let mut detector = StopDetector::default();
        assert!(detector.on_speed(0.5, 0).is_none());
        assert_eq!(
            detector.state(),
            StopState::PendingStop {
                since_ms: 0,
                deadline_ms: 15_000
            }
        );
    }

    #[test]
    fn test_further_low_speed_does_not_rearm() {
        let mut detector = StopDetector::default();
        detector.on_speed(0., 0);
        detector.on_speed(0.2, 10_000);
        assert!(detector.poll(14_999).is_none());
        let notification = detector.poll(15_000).unwrap();
        assert_eq!(notification.title, "Bike Stopped");
        assert_eq!(
            notification.body,
            "Your bike has been stationary for 15 seconds."
        );
        assert_eq!(notification.stopped_since_ms, 0);
    }

    #[test]
    fn test_fires_once_then_idle() {
        let mut detector = StopDetector::default();
        detector.on_speed(0., 0);
        assert!(detector.poll(20_000).is_some());
        assert!(detector.poll(40_000).is_none());
        assert!(!detector.is_armed());

        // next low-speed sample starts a fresh window
        detector.on_speed(0., 50_000);
        assert!(detector.poll(60_000).is_none());
        assert!(detector.poll(65_000).is_some());
    }

    #[test]
    fn test_huge_window_never_wraps() {
        let mut detector = StopDetector::new(1.0, Duration::from_secs(u64::MAX));
        detector.on_speed(0., 1_000);
        assert_eq!(
            detector.state(),
            StopState::PendingStop {
                since_ms: 1_000,
                deadline_ms: i64::MAX
            }
        );
        assert!(detector.poll(1_000_000_000_000).is_none());
        assert!(detector.is_armed());
    }

    #[test]
    fn test_moving_sample_cancels() {
        let mut detector = StopDetector::default();
        detector.on_speed(0., 0);
        detector.on_speed(1.0, 5_000);
        assert!(!detector.is_armed());
        assert!(detector.poll(30_000).is_none());
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let mut detector = StopDetector::default();
        detector.on_speed(0., 0);
        detector.cancel();
        assert!(detector.poll(60_000).is_none());
    }

    #[test]
    fn test_overdue_timer_fires_on_next_sample() {
        let mut detector = StopDetector::default();
        detector.on_speed(0., 0);
        let fired = detector.on_speed(30., 16_000);
        assert!(fired.is_some());
        assert!(!detector.is_armed());
    }

    #[test]
    fn test_invalid_speed_counts_as_stopped() {
        let mut detector = StopDetector::default();
        detector.on_speed(f64::NAN, 0);
        assert!(detector.is_armed());

        let mut detector = StopDetector::default();
        detector.on_speed(-10., 0);
        assert!(detector.is_armed());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_sustained_low_speed_notifies_once(
            speeds in proptest::collection::vec(0.0f64..0.99, 2..40),
            step_ms in 500i64..2_000,
        ) {
            let mut detector = StopDetector::default();
            let mut fired = 0;
            let mut now = 0;
            for speed in speeds.iter() {
                if detector.on_speed(*speed, now).is_some() {
                    fired += 1;
                }
                now += step_ms;
                if now > 15_000 {
                    break;
                }
            }
            if detector.poll(15_000).is_some() {
                fired += 1;
            }
            prop_assert_eq!(fired, 1);
        }

        #[test]
        fn prop_moving_sample_within_window_suppresses_notification(
            low_samples in 1usize..10,
            moving_at_ms in 0i64..14_999,
            moving_speed in 1.0f64..200.0,
        ) {
            let mut detector = StopDetector::default();
            let step = (moving_at_ms / low_samples as i64).max(1);
            let mut fired = 0;
            for i in 0..low_samples {
                let now = (i as i64 * step).min(moving_at_ms);
                if detector.on_speed(0., now).is_some() {
                    fired += 1;
                }
            }
            if detector.on_speed(moving_speed, moving_at_ms).is_some() {
                fired += 1;
            }
            if detector.poll(60_000).is_some() {
                fired += 1;
            }
            prop_assert_eq!(fired, 0);
        }
    }
}
