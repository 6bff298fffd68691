use std::collections::VecDeque;

use regime_core::{Bar, MarketEvent, OrderBook, RegimeState, RegimeTransition, Tick};

use crate::detector::RegimeDetector;

type TransitionObserver = Box<dyn Fn(&RegimeTransition) + Send>;

/// Converts a detector's state stream into a transition stream.
///
/// A transition is emitted iff the detected regime differs from the
/// current one; observers are notified synchronously, in registration
/// order, before the next event is processed. History is a bounded ring:
/// the oldest state is dropped once capacity is reached.
pub struct RegimeTracker {
    detector: Box<dyn RegimeDetector>,
    current_state: Option<RegimeState>,
    history: VecDeque<RegimeState>,
    history_size: usize,
    observers: Vec<TransitionObserver>,
}

impl RegimeTracker {
    pub const DEFAULT_HISTORY_SIZE: usize = 256;

    pub fn new(detector: Box<dyn RegimeDetector>) -> Self {
        Self {
            detector,
            current_state: None,
            history: VecDeque::new(),
            history_size: Self::DEFAULT_HISTORY_SIZE,
            observers: Vec::new(),
        }
    }

    pub fn set_history_size(&mut self, size: usize) {
        self.history_size = size;
    }

    pub fn current_state(&self) -> Option<&RegimeState> {
        self.current_state.as_ref()
    }

    pub fn history(&self) -> &VecDeque<RegimeState> {
        &self.history
    }

    pub fn detector(&self) -> &dyn RegimeDetector {
        self.detector.as_ref()
    }

    pub fn detector_mut(&mut self) -> &mut dyn RegimeDetector {
        self.detector.as_mut()
    }

    pub fn register_transition_observer(
        &mut self,
        observer: impl Fn(&RegimeTransition) + Send + 'static,
    ) {
        self.observers.push(Box::new(observer));
    }

    pub fn on_bar(&mut self, bar: &Bar) -> Option<RegimeTransition> {
        let next = self.detector.on_bar(bar);
        self.advance(next)
    }

    pub fn on_tick(&mut self, tick: &Tick) -> Option<RegimeTransition> {
        let next = self.detector.on_tick(tick);
        self.advance(next)
    }

    pub fn on_book(&mut self, book: &OrderBook) -> Option<RegimeTransition> {
        let next = self.detector.on_book(book);
        self.advance(next)
    }

    pub fn on_event(&mut self, event: &MarketEvent) -> Option<RegimeTransition> {
        let next = self.detector.on_event(event);
        self.advance(next)
    }

    fn advance(&mut self, next: RegimeState) -> Option<RegimeTransition> {
        let transition = match &self.current_state {
            None => None,
            Some(current) if next.regime != current.regime => {
                let elapsed = next
                    .timestamp
                    .signed_duration_since(current.timestamp)
                    .num_milliseconds() as f64
                    / 1_000.0;
                Some(RegimeTransition {
                    from: current.regime,
                    to: next.regime,
                    timestamp: next.timestamp,
                    confidence: next.confidence,
                    duration_in_from_secs: elapsed,
                })
            }
            Some(_) => None,
        };

        self.record_state(next);
        if let Some(transition) = &transition {
            tracing::debug!(
                from = transition.from.label(),
                to = transition.to.label(),
                confidence = transition.confidence,
                "regime transition"
            );
            for observer in &self.observers {
                observer(transition);
            }
        }
        transition
    }

    fn record_state(&mut self, state: RegimeState) {
        self.current_state = Some(state.clone());
        if self.history_size > 0 && self.history.len() >= self.history_size {
            self.history.pop_front();
        }
        self.history.push_back(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::ConstantDetector;
    use chrono::{TimeZone, Utc};
    use regime_core::RegimeType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Detector that replays a scripted regime sequence.
    struct Scripted {
        regimes: Vec<RegimeType>,
        next: usize,
    }

    impl RegimeDetector for Scripted {
        fn on_bar(&mut self, bar: &Bar) -> RegimeState {
            let regime = self.regimes[self.next.min(self.regimes.len() - 1)];
            self.next += 1;
            let mut probs = vec![0.0; 4];
            probs[regime.index()] = 1.0;
            RegimeState::from_probabilities(bar.timestamp, probs)
        }
    }

    fn bar(ts: i64) -> Bar {
        Bar::flat(Utc.timestamp_opt(ts, 0).unwrap(), "TST", 100.0, 1.0)
    }

    #[test]
    fn first_state_emits_no_transition() {
        let mut tracker = RegimeTracker::new(Box::new(ConstantDetector::new(RegimeType::Bull)));
        assert!(tracker.on_bar(&bar(0)).is_none());
        assert_eq!(tracker.current_state().unwrap().regime, RegimeType::Bull);
        assert_eq!(tracker.history().len(), 1);
    }

    #[test]
    fn transition_emitted_iff_regime_changes() {
        let detector = Scripted {
            regimes: vec![
                RegimeType::Bull,
                RegimeType::Bull,
                RegimeType::Bear,
                RegimeType::Bear,
                RegimeType::Crisis,
            ],
            next: 0,
        };
        let mut tracker = RegimeTracker::new(Box::new(detector));

        assert!(tracker.on_bar(&bar(0)).is_none());
        assert!(tracker.on_bar(&bar(60)).is_none());

        let transition = tracker.on_bar(&bar(120)).expect("bull -> bear");
        assert_eq!(transition.from, RegimeType::Bull);
        assert_eq!(transition.to, RegimeType::Bear);
        assert_eq!(transition.duration_in_from_secs, 60.0);

        assert!(tracker.on_bar(&bar(180)).is_none());
        let transition = tracker.on_bar(&bar(240)).expect("bear -> crisis");
        assert_eq!(transition.from, RegimeType::Bear);
        assert_eq!(transition.duration_in_from_secs, 60.0);
    }

    #[test]
    fn duration_measured_from_previous_state_update() {
        let detector = Scripted {
            regimes: vec![RegimeType::Bull, RegimeType::Bull, RegimeType::Bear],
            next: 0,
        };
        let mut tracker = RegimeTracker::new(Box::new(detector));
        tracker.on_bar(&bar(0));
        tracker.on_bar(&bar(100));
        // Duration counts from the last state update at t=100, not t=0.
        let transition = tracker.on_bar(&bar(130)).unwrap();
        assert_eq!(transition.duration_in_from_secs, 30.0);
    }

    #[test]
    fn history_is_bounded() {
        let mut tracker = RegimeTracker::new(Box::new(ConstantDetector::new(RegimeType::Bull)));
        tracker.set_history_size(4);
        for i in 0..10 {
            tracker.on_bar(&bar(i));
        }
        assert_eq!(tracker.history().len(), 4);
        // Oldest entries dropped from the front.
        assert_eq!(
            tracker.history().front().unwrap().timestamp,
            Utc.timestamp_opt(6, 0).unwrap()
        );
    }

    #[test]
    fn observers_fire_in_registration_order() {
        let detector = Scripted {
            regimes: vec![RegimeType::Bull, RegimeType::Bear],
            next: 0,
        };
        let mut tracker = RegimeTracker::new(Box::new(detector));

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            let calls = Arc::clone(&calls);
            tracker.register_transition_observer(move |_| {
                order.lock().unwrap().push(tag);
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        tracker.on_bar(&bar(0));
        tracker.on_bar(&bar(1));

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }
}
