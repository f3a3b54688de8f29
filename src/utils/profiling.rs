use log::{debug, log_enabled, trace, Level};
use std::time::{Duration, Instant};

/// One named stopwatch. Totals accumulate until [`TimerRegistry::reset`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Timer {
    total: Duration,
    calls: u32,
    started: Option<Instant>,
}

impl Timer {
    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn calls(&self) -> u32 {
        self.calls
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }
}

/// Named timers used to profile each phase of a step.
///
/// Timers are kept in registration order so reports always list phases the
/// same way. Starting or stopping an unregistered timer registers it.
#[derive(Debug, Default, Clone)]
pub struct TimerRegistry {
    timers: Vec<(String, Timer)>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_timer(&mut self, name: &str) {
        if self.position(name).is_none() {
            self.timers.push((name.to_string(), Timer::default()));
        }
    }

    pub fn start(&mut self, name: &str) {
        let timer = self.entry(name);
        timer.started = Some(Instant::now());
        if log_enabled!(Level::Trace) {
            trace!("timer start {name}");
        }
    }

    /// Stops `name` and adds the elapsed span to its total. Stopping a timer
    /// that is not running is a no-op.
    pub fn stop(&mut self, name: &str) {
        let timer = self.entry(name);
        if let Some(started) = timer.started.take() {
            let elapsed = started.elapsed();
            timer.total += elapsed;
            timer.calls += 1;
            if log_enabled!(Level::Trace) {
                trace!("timer stop {name} ({} µs)", elapsed.as_micros());
            }
        }
    }

    /// Clears totals and call counts while keeping registrations.
    pub fn reset(&mut self) {
        for (_, timer) in &mut self.timers {
            *timer = Timer::default();
        }
    }

    /// Cumulative time of `name` in seconds, zero when unknown.
    pub fn get_time(&self, name: &str) -> f64 {
        self.get(name)
            .map(|timer| timer.total.as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn get(&self, name: &str) -> Option<&Timer> {
        self.position(name).map(|index| &self.timers[index].1)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.timers.iter().map(|(name, _)| name.as_str())
    }

    pub fn report(&self) {
        if !log_enabled!(Level::Debug) {
            return;
        }
        for (name, timer) in &self.timers {
            debug!(
                "{name:>10}: {:.3} ms over {} call(s)",
                timer.total.as_secs_f64() * 1000.0,
                timer.calls
            );
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.timers.iter().position(|(existing, _)| existing == name)
    }

    fn entry(&mut self, name: &str) -> &mut Timer {
        let index = match self.position(name) {
            Some(index) => index,
            None => {
                self.timers.push((name.to_string(), Timer::default()));
                self.timers.len() - 1
            }
        };
        &mut self.timers[index].1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_accumulate_and_reset() {
        let mut timers = TimerRegistry::new();
        timers.add_timer("step");
        timers.add_timer("solve");
        timers.add_timer("step");

        for _ in 0..3 {
            timers.start("step");
            std::thread::sleep(Duration::from_millis(1));
            timers.stop("step");
        }
        assert_eq!(timers.get("step").map(Timer::calls), Some(3));
        assert!(timers.get_time("step") >= 0.003);
        assert_eq!(timers.get_time("solve"), 0.0);
        assert_eq!(timers.names().collect::<Vec<_>>(), vec!["step", "solve"]);

        timers.reset();
        assert_eq!(timers.get_time("step"), 0.0);
        assert_eq!(timers.get("step").map(Timer::calls), Some(0));
    }

    #[test]
    fn stopping_an_idle_timer_is_ignored() {
        let mut timers = TimerRegistry::new();
        timers.stop("update");
        assert_eq!(timers.get("update").map(Timer::calls), Some(0));
        assert_eq!(timers.get_time("missing"), 0.0);
    }
}
