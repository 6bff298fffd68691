use std::path::Path;

use regime_core::{Bar, Config, MarketEvent, OrderBook, RegimeState, Tick};

use crate::features::FeatureVector;

/// A regime inference model driven by market events.
///
/// Ticks and order books default to the bar path through synthetic flat
/// bars; detectors that consume microstructure directly override
/// [`RegimeDetector::on_book`]. Persistence swallows I/O errors by design:
/// the only contract is that a successful save/load round-trips the model.
pub trait RegimeDetector: Send {
    fn on_bar(&mut self, bar: &Bar) -> RegimeState;

    fn on_tick(&mut self, tick: &Tick) -> RegimeState {
        let bar = Bar::flat(tick.timestamp, tick.symbol.clone(), tick.price, tick.quantity);
        self.on_bar(&bar)
    }

    fn on_book(&mut self, book: &OrderBook) -> RegimeState {
        let bar = Bar::flat(book.timestamp, book.symbol.clone(), book.mid(), 0.0);
        self.on_bar(&bar)
    }

    fn on_event(&mut self, event: &MarketEvent) -> RegimeState {
        match event {
            MarketEvent::Bar(bar) => self.on_bar(bar),
            MarketEvent::Tick(tick) => self.on_tick(tick),
            MarketEvent::Book(book) => self.on_book(book),
        }
    }

    fn train(&mut self, _data: &[FeatureVector]) {}

    fn save(&self, _path: &Path) {}

    fn load(&mut self, _path: &Path) {}

    fn configure(&mut self, _config: &Config) {}

    fn num_states(&self) -> usize {
        0
    }

    fn state_names(&self) -> Vec<String> {
        Vec::new()
    }
}

impl std::fmt::Debug for dyn RegimeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dyn RegimeDetector")
    }
}
