// Strategy seam: the engine consuming the feed is opaque to the bridge and
// only talks through this trait.

use std::collections::VecDeque;

use crate::models::{Candle, Signal};

/// Consumer of the candle stream, producer of trading signals
pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// React to the next candle in the stream
    fn on_candle(&mut self, candle: &Candle) -> Signal;
}

/// Minimal moving-average crossover, mostly useful as a wiring check
pub struct SmaCrossStrategy {
    fast: usize,
    slow: usize,
    closes: VecDeque<f64>,
    was_above: Option<bool>,
}

impl SmaCrossStrategy {
    pub fn new(fast: usize, slow: usize) -> Self {
        assert!(fast < slow, "fast period must be shorter than slow");
        Self {
            fast,
            slow,
            closes: VecDeque::new(),
            was_above: None,
        }
    }

    fn sma(&self, period: usize) -> f64 {
        self.closes.iter().rev().take(period).sum::<f64>() / period as f64
    }
}

impl Strategy for SmaCrossStrategy {
    fn name(&self) -> &str {
        "sma_cross"
    }

    fn on_candle(&mut self, candle: &Candle) -> Signal {
        self.closes.push_back(candle.close);
        while self.closes.len() > self.slow {
            self.closes.pop_front();
        }
        if self.closes.len() < self.slow {
            return Signal::Hold;
        }

        let above = self.sma(self.fast) > self.sma(self.slow);
        let signal = match self.was_above {
            Some(false) if above => Signal::Buy,
            Some(true) if !above => Signal::Sell,
            _ => Signal::Hold,
        };
        self.was_above = Some(above);
        signal
    }
}
