use crate::rolling_window::{RollingWindow, WindowError};

/// One [`RollingWindow`] in an indicator pipeline.
///
/// A stage is fed at most one value per bar. The first feed after
/// [`begin_bar`](Stage::begin_bar) pushes; later feeds for the same bar revise the
/// newest entry. A stage that was not fed on a bar (its input was still warming up)
/// stays untouched.
#[derive(Debug, Clone)]
pub struct Stage {
    window: RollingWindow<f64>,
    fed_this_bar: bool,
}

impl Stage {
    /// Stage over a window of `capacity` values.
    pub fn new(capacity: usize) -> Result<Self, WindowError> {
        Ok(Self {
            window: RollingWindow::new(capacity)?,
            fed_this_bar: false,
        })
    }

    /// Mark the start of a new bar.
    pub fn begin_bar(&mut self) {
        self.fed_this_bar = false;
    }

    /// Push or revise the value for the current bar.
    pub fn feed(&mut self, value: f64) {
        if self.fed_this_bar {
            self.window.replace_last(value);
        } else {
            self.window.push(value);
            self.fed_this_bar = true;
        }
    }

    /// Underlying window.
    pub fn window(&self) -> &RollingWindow<f64> {
        &self.window
    }

    /// `true` once the window holds `capacity` values.
    pub fn is_full(&self) -> bool {
        self.window.is_full()
    }

    /// Mean of the window, only once full.
    pub fn full_mean(&self) -> Option<f64> {
        if self.window.is_full() {
            self.window.mean()
        } else {
            None
        }
    }

    /// Forget every value.
    pub fn reset(&mut self) {
        self.window.clear();
        self.fed_this_bar = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_feed_on_same_bar_revises() {
        let mut s = Stage::new(2).unwrap();
        s.begin_bar();
        s.feed(1.0);
        s.begin_bar();
        s.feed(3.0);
        s.feed(5.0);
        assert_eq!(s.window().iter().copied().collect::<Vec<_>>(), vec![1.0, 5.0]);
        assert_eq!(s.full_mean(), Some(3.0));
    }

    #[test]
    fn unfed_bar_leaves_window_alone() {
        let mut s = Stage::new(3).unwrap();
        s.begin_bar();
        s.feed(2.0);
        s.begin_bar();
        assert_eq!(s.window().len(), 1);
        assert_eq!(s.full_mean(), None);
    }
}
