use crate::cli::SweepArgs;
use crate::config::builder::build_config;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use msdsim::engine::metropolis::gen_seed;
use msdsim::engine::progress::ProgressReporter;
use msdsim::workflows::CancelToken;
use msdsim::workflows::sweep::{self, SweepPlan, SweepPoint};
use tracing::{info, warn};

pub fn run(args: &SweepArgs) -> Result<()> {
    let app = build_config(&args.run, args.slots)?;
    if !app.overrides.is_empty() {
        warn!(
            "Ignoring {} site override(s): sweeps start every chain from a fresh lattice.",
            app.overrides.len()
        );
    }

    let plan = SweepPlan {
        parameter: app.sweep.parameter,
        values: app.sweep.values,
        slots: app.sweep.slots,
        base_seed: app.lattice.seed.unwrap_or_else(gen_seed),
        simulation: app.simulation,
        randomize: app.randomize,
    };
    info!(
        parameter = %plan.parameter,
        points = plan.values.len(),
        base_seed = plan.base_seed,
        "Sweep planned."
    );

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    let points = sweep::run(&app.lattice, &plan, &CancelToken::new(), &reporter)?;

    if args.run.json {
        println!("{}", serde_json::to_string_pretty(&points)?);
    } else {
        println!("{}", header(&plan.parameter));
        for point in &points {
            println!("{}", format_point(point));
        }
    }
    Ok(())
}

fn header(parameter: &str) -> String {
    format!(
        "{:>5} {:>12} {:>20} {:>16} {:>16} {:>14} {:>14}",
        "#", parameter, "seed", "<U>", "<|M|>", "C", "chi"
    )
}

fn format_point(point: &SweepPoint) -> String {
    let s = &point.summary;
    format!(
        "{:>5} {:>12.6} {:>20} {:>16.6} {:>16.6} {:>14.6e} {:>14.6e}",
        point.index,
        point.value,
        point.seed,
        s.means.u,
        s.means.m.norm(),
        s.specific_heat,
        s.susceptibility
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use msdsim::engine::Lattice;
    use msdsim::workflows::simulate::SimulationSummary;
    use msdsim::engine::config::LatticeConfigBuilder;

    #[test]
    fn point_lines_line_up_with_the_header() {
        let config = LatticeConfigBuilder::new()
            .dimensions(3, 2, 2)
            .seed(1)
            .build()
            .unwrap();
        let lattice = Lattice::new(&config).unwrap();
        let point = SweepPoint {
            index: 3,
            value: 0.25,
            seed: 12345,
            summary: SimulationSummary::of(&lattice, false),
        };
        let line = format_point(&point);
        assert_eq!(line.len(), header("kT").len());
        let fields: Vec<&str> = line.split_whitespace().collect();
        assert_eq!(fields[0], "3");
        assert_eq!(fields[1], "0.250000");
        assert_eq!(fields[2], "12345");
    }
}
