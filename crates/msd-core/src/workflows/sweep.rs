use super::CancelToken;
use super::simulate::{self, SimulationPlan, SimulationSummary};
use crate::engine::Lattice;
use crate::engine::config::{ConfigError, LatticeConfig};
use crate::engine::error::MsdError;
use crate::engine::metropolis::derive_seed;
use crate::engine::progress::{Progress, ProgressReporter};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct SweepPlan {
    /// A coefficient key such as `kT`, `B.y` or the molecule's `Jm`, as accepted by
    /// [`Lattice::set_parameter_by_name`].
    pub parameter: String,
    pub values: Vec<f64>,
    /// Worker threads; zero lets the pool decide.
    pub slots: usize,
    pub base_seed: u64,
    pub simulation: SimulationPlan,
    /// Start each chain from a random configuration instead of the aligned one.
    pub randomize: bool,
}

impl SweepPlan {
    /// `points` evenly spaced values from `start` to `stop`, both included.
    pub fn linspace(start: f64, stop: f64, points: usize) -> Vec<f64> {
        match points {
            0 => Vec::new(),
            1 => vec![start],
            _ => {
                let step = (stop - start) / (points - 1) as f64;
                (0..points).map(|i| start + step * i as f64).collect()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SweepPoint {
    pub index: usize,
    pub value: f64,
    pub seed: u64,
    pub summary: SimulationSummary,
}

/// Runs one independent chain per value of the swept parameter and returns the points in order.
#[instrument(skip_all, name = "sweep_workflow", fields(parameter = %plan.parameter, points = plan.values.len()))]
pub fn run(
    config: &LatticeConfig,
    plan: &SweepPlan,
    cancel: &CancelToken,
    reporter: &ProgressReporter,
) -> Result<Vec<SweepPoint>, MsdError> {
    if !Lattice::is_parameter_key(&plan.parameter) {
        return Err(ConfigError::InvalidValue {
            name: "sweep.parameter",
            value: plan.parameter.clone(),
        }
        .into());
    }
    info!(slots = plan.slots, "Starting parameter sweep.");
    reporter.report(Progress::PhaseStart { name: "Sweep" });
    reporter.report(Progress::TaskStart {
        total_steps: plan.values.len() as u64,
    });

    let completed = AtomicUsize::new(0);
    let job = |(index, &value): (usize, &f64)| -> Result<SweepPoint, MsdError> {
        let point = run_point(config, plan, index, value, cancel)?;
        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
        reporter.report(Progress::PointFinish {
            index,
            completed: done,
        });
        reporter.report(Progress::TaskAdvance { steps: 1 });
        Ok(point)
    };

    #[cfg(not(feature = "parallel"))]
    let points = plan
        .values
        .iter()
        .enumerate()
        .map(job)
        .collect::<Result<Vec<_>, _>>();

    #[cfg(feature = "parallel")]
    let points = {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(plan.slots)
            .build()
            .map_err(|e| MsdError::Internal(format!("Failed to build sweep thread pool: {e}")))?;
        pool.install(|| {
            plan.values
                .par_iter()
                .enumerate()
                .map(job)
                .collect::<Result<Vec<_>, _>>()
        })
    };

    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);
    let points = points?;
    info!(points = points.len(), "Parameter sweep finished.");
    Ok(points)
}

fn run_point(
    config: &LatticeConfig,
    plan: &SweepPlan,
    index: usize,
    value: f64,
    cancel: &CancelToken,
) -> Result<SweepPoint, MsdError> {
    let seed = derive_seed(plan.base_seed, index as u64);
    let mut config = config.clone();
    config.seed = Some(seed);

    let mut lattice = Lattice::new(&config)?;
    lattice.set_parameter_by_name(&plan.parameter, value)?;
    if plan.randomize {
        lattice.randomize(false);
    }
    debug!(index, value, seed, "Running sweep point.");
    let summary = simulate::run(&mut lattice, &plan.simulation, cancel, &ProgressReporter::new());
    Ok(SweepPoint {
        index,
        value,
        seed,
        summary,
    })
}
