//! Fall confirmation state machine.
//!
//! A single detection is too noise-prone to act on. The monitor requires a
//! second, independent detection inside a bounded window after the first:
//! close enough to be the same person still down, but not so close that it is
//! the same continuous event double-counted. The machine is a pure function
//! of `(fell, now)` and its own state; no frame data is inspected.

use std::time::{Duration, Instant};

/// Confirmation window bounds.
///
/// A second rising edge earlier than `min_gap` after the candidate is noise
/// from the same incident; later than `max_gap`, the candidate has expired
/// and the edge starts a fresh window.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmWindow {
    pub min_gap: Duration,
    pub max_gap: Duration,
}

impl Default for ConfirmWindow {
    fn default() -> Self {
        Self {
            min_gap: Duration::from_secs(7),
            max_gap: Duration::from_secs(15),
        }
    }
}

/// Where the monitor currently is in its confirmation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallPhase {
    /// No candidate fall on record.
    Idle,
    /// A candidate fall was seen; waiting for a confirming detection.
    AwaitingConfirmation,
}

/// A confirmed fall incident, the one observable output of the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallAlert {
    /// Time between the candidate detection and the confirming one.
    pub elapsed: Duration,
}

/// Edge-triggered fall confirmation monitor.
///
/// Driven once per processed detection cycle from the pipeline thread; it is
/// the only writer of its own state, so no locking is involved.
pub struct FallMonitor {
    window: ConfirmWindow,
    first_fall_at: Option<Instant>,
    alert_sent: bool,
    was_fallen: bool,
}

impl FallMonitor {
    pub fn new(window: ConfirmWindow) -> Self {
        Self {
            window,
            first_fall_at: None,
            alert_sent: false,
            was_fallen: false,
        }
    }

    /// Current phase, for logging and stats.
    pub fn phase(&self) -> FallPhase {
        match self.first_fall_at {
            Some(_) => FallPhase::AwaitingConfirmation,
            None => FallPhase::Idle,
        }
    }

    /// Feed one cycle's `fell` signal into the machine.
    ///
    /// Only a rising edge (false -> true across cycles) can change state;
    /// a sustained `true` across consecutive cycles is the same continuous
    /// event and is counted once. Returns the confirmed alert when the edge
    /// lands inside the window and none was emitted for this candidate yet.
    pub fn observe(&mut self, fell: bool, now: Instant) -> Option<FallAlert> {
        let rising_edge = fell && !self.was_fallen;
        let mut alert = None;

        if rising_edge {
            match self.first_fall_at {
                None => {
                    // Candidate fall: start the window.
                    self.first_fall_at = Some(now);
                    self.alert_sent = false;
                }
                Some(first) => {
                    let elapsed = now.duration_since(first);
                    if elapsed < self.window.min_gap {
                        // Re-detection of the same incident; ignore.
                    } else if elapsed <= self.window.max_gap {
                        if !self.alert_sent {
                            self.alert_sent = true;
                            alert = Some(FallAlert { elapsed });
                        }
                    } else {
                        // Window expired without confirmation; this edge is a
                        // brand-new candidate.
                        self.first_fall_at = Some(now);
                        self.alert_sent = false;
                    }
                }
            }
        }

        self.was_fallen = fell;
        alert
    }
}

impl Default for FallMonitor {
    fn default() -> Self {
        Self::new(ConfirmWindow::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, secs: u64) -> Instant {
        base + Duration::from_secs(secs)
    }

    /// Drive a rising edge at the given time: one false cycle to arm the
    /// edge detector, then the true cycle under test.
    fn edge(monitor: &mut FallMonitor, base: Instant, secs: u64) -> Option<FallAlert> {
        monitor.observe(false, at(base, secs));
        monitor.observe(true, at(base, secs))
    }

    #[test]
    fn test_first_edge_is_candidate_not_alert() {
        let mut monitor = FallMonitor::default();
        let base = Instant::now();
        assert_eq!(edge(&mut monitor, base, 0), None);
        assert_eq!(monitor.phase(), FallPhase::AwaitingConfirmation);
    }

    #[test]
    fn test_scenario_a_confirmation_inside_window() {
        let mut monitor = FallMonitor::default();
        let base = Instant::now();

        // Candidate at t=0.
        assert_eq!(edge(&mut monitor, base, 0), None);
        // t=3: too soon, noise from the same incident.
        assert_eq!(edge(&mut monitor, base, 3), None);
        // t=9: inside [7, 15], confirmed.
        let alert = edge(&mut monitor, base, 9).expect("alert should fire");
        assert_eq!(alert.elapsed, Duration::from_secs(9));
        // t=11: alert already sent for this candidate.
        assert_eq!(edge(&mut monitor, base, 11), None);
    }

    #[test]
    fn test_scenario_b_window_expiry_restarts_candidate() {
        let mut monitor = FallMonitor::default();
        let base = Instant::now();

        assert_eq!(edge(&mut monitor, base, 0), None);
        // t=20 is past the 15s bound: no alert, new candidate.
        assert_eq!(edge(&mut monitor, base, 20), None);
        // The new candidate confirms at t=20+9.
        let alert = edge(&mut monitor, base, 29).expect("alert should fire");
        assert_eq!(alert.elapsed, Duration::from_secs(9));
    }

    #[test]
    fn test_sustained_fall_is_one_transition() {
        let mut monitor = FallMonitor::default();
        let base = Instant::now();

        // true, true, true... with no intervening false: only the first
        // cycle is an edge, even with confirmation-range gaps between them.
        assert_eq!(monitor.observe(true, at(base, 0)), None);
        assert_eq!(monitor.observe(true, at(base, 8)), None);
        assert_eq!(monitor.observe(true, at(base, 14)), None);
        assert_eq!(monitor.phase(), FallPhase::AwaitingConfirmation);
    }

    #[test]
    fn test_too_soon_edges_do_not_move_the_window() {
        let mut monitor = FallMonitor::default();
        let base = Instant::now();

        assert_eq!(edge(&mut monitor, base, 0), None);
        // Repeated noise inside 7s never shifts first_fall_at: the window
        // still confirms relative to t=0.
        assert_eq!(edge(&mut monitor, base, 2), None);
        assert_eq!(edge(&mut monitor, base, 4), None);
        assert_eq!(edge(&mut monitor, base, 6), None);
        let alert = edge(&mut monitor, base, 8).expect("alert should fire");
        assert_eq!(alert.elapsed, Duration::from_secs(8));
    }

    #[test]
    fn test_expiry_resets_even_after_alert_sent() {
        let mut monitor = FallMonitor::default();
        let base = Instant::now();

        assert_eq!(edge(&mut monitor, base, 0), None);
        assert!(edge(&mut monitor, base, 10).is_some());

        // Well past the window: a fresh candidate, alert flag cleared.
        assert_eq!(edge(&mut monitor, base, 40), None);
        let alert = edge(&mut monitor, base, 50).expect("new incident should alert");
        assert_eq!(alert.elapsed, Duration::from_secs(10));
    }

    #[test]
    fn test_window_boundaries_inclusive() {
        let base = Instant::now();

        // Exactly min_gap confirms.
        let mut monitor = FallMonitor::default();
        assert_eq!(edge(&mut monitor, base, 0), None);
        assert!(edge(&mut monitor, base, 7).is_some());

        // Exactly max_gap confirms.
        let mut monitor = FallMonitor::default();
        assert_eq!(edge(&mut monitor, base, 0), None);
        assert!(edge(&mut monitor, base, 15).is_some());

        // Just past max_gap restarts instead.
        let mut monitor = FallMonitor::default();
        assert_eq!(edge(&mut monitor, base, 0), None);
        assert_eq!(edge(&mut monitor, base, 16), None);
        assert_eq!(monitor.phase(), FallPhase::AwaitingConfirmation);
    }

    #[test]
    fn test_false_cycles_leave_state_untouched() {
        let mut monitor = FallMonitor::default();
        let base = Instant::now();

        assert_eq!(edge(&mut monitor, base, 0), None);
        for s in 1..6 {
            assert_eq!(monitor.observe(false, at(base, s)), None);
        }
        // Window is still anchored at t=0.
        let alert = edge(&mut monitor, base, 9).expect("alert should fire");
        assert_eq!(alert.elapsed, Duration::from_secs(9));
    }

    #[test]
    fn test_custom_window() {
        let window = ConfirmWindow {
            min_gap: Duration::from_secs(1),
            max_gap: Duration::from_secs(3),
        };
        let mut monitor = FallMonitor::new(window);
        let base = Instant::now();

        assert_eq!(edge(&mut monitor, base, 0), None);
        assert!(edge(&mut monitor, base, 2).is_some());
    }
}
