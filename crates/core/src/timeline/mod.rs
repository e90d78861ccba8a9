//! Step timing and the transport that walks the step grid.

pub const STEPS_PER_BAR: usize = 16;

/// Milliseconds per sixteenth note.
pub fn step_duration_ms(bpm: f32) -> f64 {
    60_000.0 / bpm.max(f32::EPSILON) as f64 / 4.0
}

/// How far swing pushes every odd step back.
pub fn swing_offset_ms(bpm: f32, swing: f32) -> f64 {
    step_duration_ms(bpm) * (swing as f64 / 100.0) * 0.33
}

/// Interval between step `step` and the one after it.
pub fn step_delay_ms(step: usize, bpm: f32, swing: f32) -> f64 {
    let base = step_duration_ms(bpm);
    let offset = swing_offset_ms(bpm, swing);
    if step % 2 == 0 {
        base + offset
    } else {
        base - offset
    }
}

/// Offsets of every step from the start of the loop.
pub fn step_times_ms(total_steps: usize, bpm: f32, swing: f32) -> Vec<f64> {
    let mut times = Vec::with_capacity(total_steps);
    let mut at = 0.0;
    for step in 0..total_steps {
        times.push(at);
        at += step_delay_ms(step, bpm, swing);
    }
    times
}

/// Host-side clock in milliseconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaybackClock {
    pub now_ms: f64,
}

impl PlaybackClock {
    pub fn reset(&mut self) {
        self.now_ms = 0.0;
    }

    pub fn advance(&mut self, delta_secs: f32) {
        self.now_ms = (self.now_ms + delta_secs as f64 * 1000.0).max(0.0);
    }
}

/// The step that just fired and when the host should call back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiredStep {
    pub step: usize,
    pub next_fire_ms: f64,
}

/// Self-rescheduling step cursor. Tempo and swing are read on every fire so
/// edits apply from the next step on.
#[derive(Debug, Default, Clone)]
pub struct Transport {
    cursor: Option<usize>,
    next_fire_ms: Option<f64>,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.cursor.is_some()
    }

    /// Step that fired last; `None` when stopped.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn next_fire_ms(&self) -> Option<f64> {
        self.next_fire_ms
    }

    /// Fires step 0 at `now_ms`.
    pub fn start(&mut self, now_ms: f64, bpm: f32, swing: f32) -> FiredStep {
        self.fire_at(0, now_ms, bpm, swing)
    }

    pub fn is_due(&self, now_ms: f64) -> bool {
        self.next_fire_ms.map_or(false, |at| now_ms >= at)
    }

    /// Advances to the next step, wrapping at `total_steps`.
    pub fn fire(
        &mut self,
        now_ms: f64,
        total_steps: usize,
        bpm: f32,
        swing: f32,
    ) -> Option<FiredStep> {
        let current = self.cursor?;
        let step = (current + 1) % total_steps.max(1);
        Some(self.fire_at(step, now_ms, bpm, swing))
    }

    fn fire_at(&mut self, step: usize, now_ms: f64, bpm: f32, swing: f32) -> FiredStep {
        let next_fire_ms = now_ms + step_delay_ms(step, bpm, swing);
        self.cursor = Some(step);
        self.next_fire_ms = Some(next_fire_ms);
        FiredStep { step, next_fire_ms }
    }

    pub fn stop(&mut self) {
        self.cursor = None;
        self.next_fire_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_delays_sum_to_two_steps() {
        for bpm in [40.0, 93.0, 120.0, 174.0, 300.0] {
            for swing in [0.0, 12.5, 50.0, 100.0] {
                for step in 0..4 {
                    let pair =
                        step_delay_ms(step, bpm, swing) + step_delay_ms(step + 1, bpm, swing);
                    assert!((pair - 2.0 * step_duration_ms(bpm)).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn swing_delays_odd_steps() {
        let times = step_times_ms(4, 120.0, 100.0);
        assert_eq!(times[0], 0.0);
        assert!((times[1] - (125.0 + 41.25)).abs() < 1e-9);
        assert!((times[2] - 250.0).abs() < 1e-9);
    }

    #[test]
    fn quarter_notes_at_120_bpm_fire_every_half_second() {
        let mut transport = Transport::new();
        let mut fired_at = Vec::new();
        let pattern = [0, 4, 8, 12];

        let mut clock = PlaybackClock::default();
        let first = transport.start(clock.now_ms, 120.0, 0.0);
        if pattern.contains(&first.step) {
            fired_at.push(clock.now_ms);
        }
        while clock.now_ms < 1_900.0 {
            clock.advance(0.001);
            if transport.is_due(clock.now_ms) {
                let at = transport.next_fire_ms().unwrap();
                let fired = transport.fire(at, 16, 120.0, 0.0).unwrap();
                if pattern.contains(&fired.step) {
                    fired_at.push(at);
                }
            }
        }

        assert_eq!(fired_at.len(), 4);
        for (got, want) in fired_at.iter().zip([0.0, 500.0, 1000.0, 1500.0]) {
            assert!((got - want).abs() < 1e-6, "{got} != {want}");
        }
    }

    #[test]
    fn stop_clears_cursor_and_wraps_on_restart() {
        let mut transport = Transport::new();
        transport.start(0.0, 120.0, 0.0);
        for i in 1..16 {
            transport.fire(i as f64 * 125.0, 16, 120.0, 0.0);
        }
        assert_eq!(transport.cursor(), Some(15));
        assert_eq!(transport.fire(2000.0, 16, 120.0, 0.0).unwrap().step, 0);

        transport.stop();
        assert_eq!(transport.cursor(), None);
        assert!(!transport.is_due(1e9));
        assert_eq!(transport.fire(3000.0, 16, 120.0, 0.0), None);
    }
}
