use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use msdsim::engine::progress::{Progress, ProgressCallback};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

const SPINNER_TICK_MS: u64 = 80;

/// The bar plus what it is currently showing.
struct Display {
    bar: ProgressBar,
    phase: &'static str,
    points: usize,
}

impl Display {
    fn start_phase(&mut self, name: &'static str) {
        self.phase = name;
        self.points = 0;
        self.bar.reset();
        self.bar.set_length(0);
        self.bar.set_style(spinner_style());
        self.bar.set_prefix(name);
        self.bar.set_message("");
        self.bar.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
    }

    fn start_task(&mut self, total_steps: u64) {
        self.bar.disable_steady_tick();
        self.bar.reset();
        self.bar.set_style(steps_style());
        self.bar.set_length(total_steps);
        self.bar.set_position(0);
    }

    fn finish_task(&mut self) {
        let total = self.bar.length().unwrap_or(0);
        if self.bar.position() < total {
            self.bar.set_position(total);
        }
        self.bar.finish();
    }

    fn finish_phase(&mut self) {
        self.bar.disable_steady_tick();
        let summary = match self.points {
            0 => format!("✓ {} done", self.phase),
            n => format!("✓ {} done ({} points)", self.phase, n),
        };
        self.bar.finish_with_message(summary);
    }
}

/// Renders Monte Carlo progress on stderr: a spinner per phase and a step bar per task.
#[derive(Clone)]
pub struct CliProgressHandler {
    display: Arc<Mutex<Display>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr())
            .with_style(spinner_style());
        bar.finish_and_clear();

        Self {
            display: Arc::new(Mutex::new(Display {
                bar,
                phase: "",
                points: 0,
            })),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let display = Arc::clone(&self.display);

        Box::new(move |progress: Progress| {
            let Ok(mut display) = display.lock() else {
                warn!("Progress display lock was poisoned; dropping update.");
                return;
            };

            match progress {
                Progress::PhaseStart { name } => display.start_phase(name),
                Progress::PhaseFinish => display.finish_phase(),
                Progress::TaskStart { total_steps } => display.start_task(total_steps),
                Progress::TaskAdvance { steps } => display.bar.inc(steps),
                Progress::TaskFinish => display.finish_task(),
                Progress::PointFinish { index, completed } => {
                    debug!(index, completed, "Sweep point finished.");
                    display.points = completed;
                    display.bar.set_message(format!("{} points", completed));
                }
                Progress::Message(msg) => {
                    if display.bar.is_finished() {
                        display.bar.set_message(msg);
                    } else {
                        display.bar.println(format!("  {}", msg));
                    }
                }
            }
        })
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {prefix:.bold} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn steps_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:<10.bold} [{bar:40.cyan/blue}] {human_pos}/{human_len} steps, {rate} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .with_key("rate", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
        let per_second = state.per_sec();
        let _ = if per_second >= 1e6 {
            write!(w, "{:.1}M/s", per_second / 1e6)
        } else {
            write!(w, "{:.0}/s", per_second)
        };
    })
    .progress_chars("=>-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn handler_starts_hidden_and_empty() {
        let handler = CliProgressHandler::new();
        let display = handler.display.lock().unwrap();
        assert_eq!(display.bar.length(), Some(0));
        assert!(display.bar.is_finished());
        assert_eq!(display.points, 0);
    }

    #[test]
    fn steps_accumulate_through_a_phase() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        callback(Progress::PhaseStart { name: "Burn-in" });
        {
            let display = handler.display.lock().unwrap();
            assert_eq!(display.bar.prefix(), "Burn-in");
            assert!(!display.bar.is_finished());
        }

        callback(Progress::TaskStart { total_steps: 2_500 });
        callback(Progress::TaskAdvance { steps: 1_000 });
        callback(Progress::TaskAdvance { steps: 1_000 });
        {
            let display = handler.display.lock().unwrap();
            assert_eq!(display.bar.length(), Some(2_500));
            assert_eq!(display.bar.position(), 2_000);
        }

        // A cancelled run finishes early; the bar still shows as complete.
        callback(Progress::TaskFinish);
        {
            let display = handler.display.lock().unwrap();
            assert!(display.bar.is_finished());
            assert_eq!(display.bar.position(), 2_500);
        }

        callback(Progress::PhaseFinish);
        assert_eq!(handler.display.lock().unwrap().bar.message(), "✓ Burn-in done");
    }

    #[test]
    fn sweep_points_are_counted_without_moving_the_bar() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();
        callback(Progress::PhaseStart { name: "Sweep" });
        callback(Progress::TaskStart { total_steps: 4 });
        callback(Progress::PointFinish {
            index: 2,
            completed: 1,
        });
        callback(Progress::TaskAdvance { steps: 1 });
        {
            let display = handler.display.lock().unwrap();
            assert_eq!(display.bar.position(), 1);
            assert_eq!(display.bar.message(), "1 points");
        }
        callback(Progress::TaskFinish);
        callback(Progress::PhaseFinish);
        assert_eq!(
            handler.display.lock().unwrap().bar.message(),
            "✓ Sweep done (1 points)"
        );
    }

    #[test]
    fn callback_can_be_driven_from_another_thread() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        thread::spawn(move || {
            callback(Progress::PhaseStart { name: "Measure" });
            callback(Progress::TaskAdvance { steps: 1 });
            callback(Progress::PhaseFinish);
        })
        .join()
        .unwrap();

        let display = handler.display.lock().unwrap();
        assert!(display.bar.is_finished());
        assert_eq!(display.bar.message(), "✓ Measure done");
    }
}
