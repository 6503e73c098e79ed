use crate::cli::RunArgs;
use crate::config::builder::build_config;
use crate::config::models::SiteOverride;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use msdsim::core::models::region::Region;
use msdsim::core::vector::Vector;
use msdsim::engine::Lattice;
use msdsim::engine::progress::ProgressReporter;
use msdsim::workflows::CancelToken;
use msdsim::workflows::simulate::{self, SimulationSummary};
use serde::Serialize;
use std::fmt::Write as _;
use tracing::{info, warn};

#[derive(Serialize)]
struct RunReport {
    seed: u64,
    sites: usize,
    #[serde(flatten)]
    summary: SimulationSummary,
}

pub fn run(args: &RunArgs) -> Result<()> {
    let app = build_config(args, None)?;

    info!("Building lattice...");
    let mut lattice = Lattice::new(&app.lattice)?;
    if app.randomize {
        lattice.randomize(false);
    }
    let applied = apply_overrides(&mut lattice, &app.overrides);
    info!(
        sites = lattice.n(),
        seed = lattice.seed(),
        overrides = applied,
        "Lattice ready."
    );

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    if !args.json {
        println!("Starting simulation of {} sites...", lattice.n());
    }
    let summary = simulate::run(&mut lattice, &app.simulation, &CancelToken::new(), &reporter);
    info!(samples = summary.samples, "Simulation finished.");

    let report = RunReport {
        seed: lattice.seed(),
        sites: lattice.n(),
        summary,
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", format_report(&report));
    }
    Ok(())
}

/// Writes each override into the lattice. Overrides aimed at vacant or out-of-range positions are
/// skipped with a warning. Returns how many were applied.
pub fn apply_overrides(lattice: &mut Lattice, overrides: &[SiteOverride]) -> usize {
    overrides
        .iter()
        .filter(|o| match o.apply(lattice) {
            Ok(()) => true,
            Err(e) => {
                warn!("Skipping site override at ({}, {}, {}): {}", o.x, o.y, o.z, e);
                false
            }
        })
        .count()
}

fn vector(v: Vector) -> String {
    format!("[{:+.6}, {:+.6}, {:+.6}]", v.x, v.y, v.z)
}

fn format_report(report: &RunReport) -> String {
    let summary = &report.summary;
    let (last, mean) = (&summary.results, &summary.means);
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Seed: {}   Sites: {}   Steps: {}   Samples: {}{}",
        report.seed,
        report.sites,
        last.t,
        summary.samples,
        if summary.cancelled { "   (cancelled)" } else { "" }
    );
    let _ = writeln!(out, "{:<6} {:>42} {:>42}", "", "final", "mean");
    let _ = writeln!(out, "{:<6} {:>42.6} {:>42.6}", "U", last.u, mean.u);
    for region in Region::ALL {
        let name = format!("U{}", region.label());
        let _ = writeln!(
            out,
            "{:<6} {:>42.6} {:>42.6}",
            name,
            last.energy(region),
            mean.energy(region)
        );
    }
    let _ = writeln!(out, "{:<6} {:>42} {:>42}", "M", vector(last.m), vector(mean.m));
    for zone in Region::ZONES {
        let name = format!("M{}", zone.label());
        let (Some(a), Some(b)) = (last.magnetization(zone), mean.magnetization(zone)) else {
            continue;
        };
        let _ = writeln!(out, "{:<6} {:>42} {:>42}", name, vector(a), vector(b));
    }
    let _ = writeln!(out, "Specific heat:  {:.6e}", summary.specific_heat);
    let _ = writeln!(out, "Susceptibility: {:.6e}", summary.susceptibility);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use msdsim::core::error::RangeError;
    use msdsim::engine::config::LatticeConfigBuilder;

    fn setup() -> Lattice {
        let config = LatticeConfigBuilder::new()
            .dimensions(5, 3, 3)
            .seed(4)
            .build()
            .unwrap();
        Lattice::new(&config).unwrap()
    }

    #[test]
    fn overrides_skip_vacant_and_out_of_range_sites() {
        let mut lattice = setup();
        let overrides = [
            SiteOverride {
                x: 0,
                y: 1,
                z: 1,
                spin: Some(Vector::x()),
                flux: None,
            },
            // Interior of the molecule frame; vacant.
            SiteOverride {
                x: 2,
                y: 1,
                z: 1,
                spin: Some(Vector::x()),
                flux: None,
            },
            SiteOverride {
                x: 9,
                y: 0,
                z: 0,
                spin: Some(Vector::x()),
                flux: None,
            },
        ];
        assert!(matches!(
            overrides[1].apply(&mut lattice.clone()),
            Err(RangeError::Vacant { .. })
        ));
        assert_eq!(apply_overrides(&mut lattice, &overrides), 1);
        assert_eq!(lattice.spin_at(0, 1, 1).unwrap(), Vector::x());
    }

    #[test]
    fn report_lists_every_region() {
        let mut lattice = setup();
        lattice.metropolis_recorded(100, 10);
        let report = RunReport {
            seed: lattice.seed(),
            sites: lattice.n(),
            summary: SimulationSummary::of(&lattice, false),
        };
        let text = format_report(&report);
        for name in ["UL", "UR", "Um", "UmL", "UmR", "ULR", "ML", "MR", "Mm"] {
            assert!(
                text.lines().any(|l| l.split_whitespace().next() == Some(name)),
                "missing {name}"
            );
        }
        assert!(text.starts_with("Seed: 4"));
        assert!(!text.contains("cancelled"));
    }

    #[test]
    fn json_report_flattens_the_summary() {
        let lattice = setup();
        let report = RunReport {
            seed: 4,
            sites: lattice.n(),
            summary: SimulationSummary::of(&lattice, true),
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["seed"], 4);
        assert_eq!(value["cancelled"], true);
        assert!(value["results"]["U"].is_number());
        assert!(value["means"]["M"].is_array());
    }
}
