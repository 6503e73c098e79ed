use super::CancelToken;
use crate::core::models::results::Results;
use crate::engine::Lattice;
use crate::engine::progress::{Progress, ProgressReporter};
use serde::Serialize;
use tracing::{info, instrument};

/// Steps run between cancellation checks when no recording frequency sets the pace.
const DEFAULT_CHUNK: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationPlan {
    /// Equilibration steps, never recorded.
    pub burn_in: u64,
    pub steps: u64,
    /// Steps between recorded samples; zero disables recording.
    pub record_frequency: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimulationSummary {
    /// Aggregates at the end of the run.
    pub results: Results,
    /// Arithmetic means over the recorded samples.
    pub means: Results,
    pub specific_heat: f64,
    pub susceptibility: f64,
    pub samples: usize,
    pub cancelled: bool,
}

impl SimulationSummary {
    pub fn of(lattice: &Lattice, cancelled: bool) -> Self {
        Self {
            results: lattice.results(),
            means: lattice.mean_results(),
            specific_heat: lattice.specific_heat(),
            susceptibility: lattice.magnetic_susceptibility(),
            samples: lattice.record().len(),
            cancelled,
        }
    }
}

/// Equilibrates the lattice, then measures with recording and summarizes the record.
///
/// The record is cleared between the two phases. Cancellation is checked between chunks; a
/// cancelled run returns the summary of whatever was measured so far.
#[instrument(skip_all, name = "simulation_workflow")]
pub fn run(
    lattice: &mut Lattice,
    plan: &SimulationPlan,
    cancel: &CancelToken,
    reporter: &ProgressReporter,
) -> SimulationSummary {
    info!(
        burn_in = plan.burn_in,
        steps = plan.steps,
        frequency = plan.record_frequency,
        "Starting simulation."
    );
    let chunk = if plan.record_frequency > 0 {
        plan.record_frequency
    } else {
        DEFAULT_CHUNK
    };

    // === Phase 1: Burn-in ===
    reporter.report(Progress::PhaseStart { name: "Burn-in" });
    reporter.report(Progress::TaskStart {
        total_steps: plan.burn_in,
    });
    let mut remaining = plan.burn_in;
    while remaining > 0 {
        if cancel.is_cancelled() {
            info!("Simulation cancelled during burn-in.");
            reporter.report(Progress::TaskFinish);
            reporter.report(Progress::PhaseFinish);
            return SimulationSummary::of(lattice, true);
        }
        let steps = remaining.min(chunk);
        lattice.metropolis(steps);
        reporter.report(Progress::TaskAdvance { steps });
        remaining -= steps;
    }
    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    // === Phase 2: Measurement ===
    reporter.report(Progress::PhaseStart { name: "Measurement" });
    reporter.report(Progress::TaskStart {
        total_steps: plan.steps,
    });
    lattice.clear_record();
    let recording = plan.record_frequency > 0;
    if recording {
        lattice.record_sample();
    }
    let mut cancelled = false;
    let mut remaining = plan.steps;
    while remaining > 0 {
        if cancel.is_cancelled() {
            cancelled = true;
            info!(remaining, "Simulation cancelled during measurement.");
            break;
        }
        let steps = remaining.min(chunk);
        lattice.metropolis(steps);
        if recording {
            lattice.record_sample();
        }
        reporter.report(Progress::TaskAdvance { steps });
        remaining -= steps;
    }
    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    let summary = SimulationSummary::of(lattice, cancelled);
    info!(
        energy = summary.results.u,
        samples = summary.samples,
        "Simulation finished."
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::parameters::Parameters;
    use crate::engine::config::LatticeConfigBuilder;
    use std::sync::Mutex;

    fn setup(seed: u64) -> Lattice {
        let mut p = Parameters::default();
        p.kt = 1.5;
        let config = LatticeConfigBuilder::new()
            .dimensions(6, 2, 2)
            .parameters(p)
            .seed(seed)
            .build()
            .unwrap();
        Lattice::new(&config).unwrap()
    }

    const PLAN: SimulationPlan = SimulationPlan {
        burn_in: 500,
        steps: 2_050,
        record_frequency: 100,
    };

    #[test]
    fn burn_in_is_not_recorded() {
        let mut lattice = setup(1);
        let summary = run(&mut lattice, &PLAN, &CancelToken::new(), &ProgressReporter::new());
        assert!(!summary.cancelled);
        assert_eq!(summary.results.t, 2_550);
        let times: Vec<u64> = lattice.record().iter().map(|r| r.t).collect();
        assert_eq!(times.first(), Some(&500));
        assert_eq!(times.last(), Some(&2_550));
        assert_eq!(summary.samples, 22);
        assert_eq!(summary.means, lattice.mean_results());
    }

    #[test]
    fn matches_manual_driving() {
        let mut by_workflow = setup(7);
        let summary = run(
            &mut by_workflow,
            &PLAN,
            &CancelToken::new(),
            &ProgressReporter::new(),
        );

        let mut by_hand = setup(7);
        by_hand.metropolis(PLAN.burn_in);
        by_hand.clear_record();
        by_hand.metropolis_recorded(PLAN.steps, PLAN.record_frequency);
        assert_eq!(summary, SimulationSummary::of(&by_hand, false));
    }

    #[test]
    fn zero_frequency_runs_without_samples() {
        let mut lattice = setup(2);
        let plan = SimulationPlan {
            record_frequency: 0,
            ..PLAN
        };
        let summary = run(&mut lattice, &plan, &CancelToken::new(), &ProgressReporter::new());
        assert_eq!(summary.samples, 0);
        assert_eq!(summary.means, summary.results);
        assert_eq!(summary.specific_heat, 0.0);
    }

    #[test]
    fn cancelled_token_stops_before_any_step() {
        let mut lattice = setup(3);
        let cancel = CancelToken::new();
        cancel.cancel();
        let summary = run(&mut lattice, &PLAN, &cancel, &ProgressReporter::new());
        assert!(summary.cancelled);
        assert_eq!(summary.results.t, 0);
    }

    #[test]
    fn cancelling_mid_run_stops_at_the_next_chunk() {
        let mut lattice = setup(4);
        let cancel = CancelToken::new();
        let advanced = Mutex::new(0u64);
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::TaskAdvance { steps } = event {
                let mut total = advanced.lock().unwrap();
                *total += steps;
                if *total >= 1_000 {
                    cancel.cancel();
                }
            }
        }));
        let summary = run(&mut lattice, &PLAN, &cancel, &reporter);
        assert!(summary.cancelled);
        assert_eq!(summary.results.t, 1_000);
        assert_eq!(summary.samples, 6);
    }

    #[test]
    fn reports_both_phases() {
        let mut lattice = setup(5);
        let phases = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::PhaseStart { name } = event {
                phases.lock().unwrap().push(name);
            }
        }));
        run(&mut lattice, &PLAN, &CancelToken::new(), &reporter);
        drop(reporter);
        assert_eq!(phases.into_inner().unwrap(), ["Burn-in", "Measurement"]);
    }
}
