use super::defaults::DefaultsConfig;
use super::file::{FileConfig, FileGeometry, ParameterValue};
use super::models::{AppConfig, SiteOverride, SweepSettings};
use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use msdsim::core::io::read_molecule;
use msdsim::core::models::molecule::{EdgeParameters, NodeParameters};
use msdsim::core::models::parameters::Parameters;
use msdsim::engine::config::{
    FlipModel, GeometrySpec, LatticeConfigBuilder, SiteSelection, Topology,
};
use msdsim::engine::Lattice;
use msdsim::engine::geometry::Geometry;
use msdsim::workflows::simulate::SimulationPlan;
use msdsim::workflows::sweep::SweepPlan;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Merges defaults, the run file, CLI flags and `--set` values, in increasing precedence.
pub fn build_config(args: &RunArgs, slots: Option<usize>) -> Result<AppConfig> {
    let file_config = FileConfig::from_file(&args.config)?;
    let file_config = apply_cli_flags(file_config, args);
    let mut file_config = apply_set_values(file_config, &args.set_values)?;
    if let Some(slots) = slots {
        file_config.sweep.get_or_insert_with(Default::default).slots = Some(slots);
    }
    resolve(file_config, args.config.parent())
}

fn apply_cli_flags(mut config: FileConfig, args: &RunArgs) -> FileConfig {
    let simulation = config.simulation.get_or_insert_with(Default::default);
    simulation.steps = args.steps.or(simulation.steps);
    simulation.burn_in = args.burn_in.or(simulation.burn_in);
    simulation.record_frequency = args.freq.or(simulation.record_frequency);
    simulation.seed = args.seed.or(simulation.seed);
    config
}

/// Turns a fully layered file configuration into engine configuration. Relative molecule paths
/// resolve against `base_dir`.
pub fn resolve(file_config: FileConfig, base_dir: Option<&Path>) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();
    let FileConfig {
        geometry,
        molecule,
        parameters: parameter_values,
        simulation,
        sweep,
        overrides,
    } = file_config;

    let molecule = molecule.unwrap_or_default();
    let molecule_overrides = molecule.overrides();
    let topology_name = molecule.topology.as_deref().unwrap_or(&defaults.topology);
    let topology = match topology_name {
        "linear" => Topology::Linear,
        "circular" => Topology::Circular,
        path => {
            let path = match base_dir {
                Some(dir) if Path::new(path).is_relative() => dir.join(path),
                _ => Path::new(path).to_path_buf(),
            };
            debug!("Loading molecule from {:?}", path);
            let mut graph = read_molecule(&path).map_err(|e| CliError::FileParsing {
                path: path.clone(),
                source: e.into(),
            })?;
            molecule_overrides.apply_graph(&mut graph);
            Topology::Graph(graph)
        }
    };

    let mut node_parameters = NodeParameters::default();
    molecule_overrides.apply_node(&mut node_parameters);
    let mut edge_parameters = EdgeParameters::default();
    molecule_overrides.apply_edge(&mut edge_parameters);

    let geometry = resolve_geometry(&geometry.unwrap_or_default(), &topology, &defaults);

    let mut parameters = Parameters::default();
    for (key, value) in parameter_values.unwrap_or_default() {
        value.apply(&mut parameters, &key)?;
    }

    let simulation = simulation.unwrap_or_default();
    let flip_model = FlipModel::from_str(
        simulation
            .flipping_algorithm
            .as_deref()
            .unwrap_or(&defaults.flipping_algorithm),
    )
    .map_err(|e| CliError::Config(e.to_string()))?;
    let site_selection = SiteSelection::from_str(
        simulation
            .site_selection
            .as_deref()
            .unwrap_or(&defaults.site_selection),
    )
    .map_err(|e| CliError::Config(e.to_string()))?;

    let mut builder = LatticeConfigBuilder::new()
        .geometry(geometry)
        .topology(topology)
        .node_parameters(node_parameters)
        .edge_parameters(edge_parameters)
        .parameters(parameters)
        .flip_model(flip_model)
        .site_selection(site_selection);
    if let Some(seed) = simulation.seed {
        builder = builder.seed(seed);
    }
    let lattice = builder
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    let plan = SimulationPlan {
        burn_in: simulation.burn_in.unwrap_or(defaults.burn_in),
        steps: simulation.steps.unwrap_or(defaults.steps),
        record_frequency: simulation
            .record_frequency
            .unwrap_or(defaults.record_frequency),
    };

    let sweep = sweep.unwrap_or_default();
    let sweep_parameter = sweep.parameter.unwrap_or(defaults.sweep_parameter);
    if !Lattice::is_parameter_key(&sweep_parameter) {
        return Err(CliError::Config(format!(
            "Unsupported sweep parameter: '{}'",
            sweep_parameter
        )));
    }
    let sweep = SweepSettings {
        parameter: sweep_parameter,
        values: SweepPlan::linspace(
            sweep.start.unwrap_or(defaults.sweep_start),
            sweep.stop.unwrap_or(defaults.sweep_stop),
            sweep.points.unwrap_or(defaults.sweep_points),
        ),
        slots: sweep.slots.unwrap_or(defaults.sweep_slots),
    };

    let overrides = overrides
        .into_iter()
        .map(|o| SiteOverride {
            x: o.x,
            y: o.y,
            z: o.z,
            spin: o.spin,
            flux: o.flux,
        })
        .collect();

    Ok(AppConfig {
        lattice,
        simulation: plan,
        randomize: simulation.randomize.unwrap_or(defaults.randomize),
        overrides,
        sweep,
    })
}

/// Picks the geometry form from the keys present.
///
/// Any explicit bound yields an explicit geometry built on top of the centered (or lead-band)
/// layout. A molecule graph without explicit bounds is centered with its own width.
fn resolve_geometry(g: &FileGeometry, topology: &Topology, defaults: &DefaultsConfig) -> GeometrySpec {
    let width = g.width.unwrap_or(defaults.width);
    let height = g.height.unwrap_or(defaults.height);
    let depth = g.depth.unwrap_or(defaults.depth);
    let graph_nodes = match topology {
        Topology::Graph(graph) => Some(graph.node_count()),
        _ => None,
    };
    let banded = g.height_l.is_some() || g.depth_r.is_some();
    let bands_given =
        g.top_l.is_some() || g.bottom_l.is_some() || g.front_r.is_some() || g.back_r.is_some();

    if let Some(nodes) = graph_nodes {
        if g.mol_pos_r.is_none() && !bands_given && !banded {
            let mol_pos_l = g
                .mol_pos_l
                .unwrap_or_else(|| width.saturating_sub(nodes) / 2);
            return GeometrySpec::Anchored {
                width,
                height,
                depth,
                mol_pos_l,
            };
        }
    }

    if g.mol_pos_l.is_none() && g.mol_pos_r.is_none() && !bands_given {
        return if banded {
            GeometrySpec::Leads {
                width,
                height,
                depth,
                height_l: g.height_l.unwrap_or(height),
                depth_r: g.depth_r.unwrap_or(depth),
            }
        } else {
            GeometrySpec::Centered {
                width,
                height,
                depth,
            }
        };
    }

    let base = if banded {
        Geometry::with_leads(
            width,
            height,
            depth,
            g.height_l.unwrap_or(height),
            g.depth_r.unwrap_or(depth),
        )
    } else {
        Geometry::centered(width, height, depth)
    };
    let mol_pos_l = g.mol_pos_l.unwrap_or(base.mol_pos_l);
    let mol_pos_r = g.mol_pos_r.unwrap_or(match graph_nodes {
        Some(nodes) => (mol_pos_l + nodes).saturating_sub(1),
        None => base.mol_pos_r.max(mol_pos_l),
    });
    GeometrySpec::Explicit(Geometry::full(
        width,
        height,
        depth,
        mol_pos_l,
        mol_pos_r,
        g.top_l.unwrap_or(base.top_l),
        g.bottom_l.unwrap_or(base.bottom_l),
        g.front_r.unwrap_or(base.front_r),
        g.back_r.unwrap_or(base.back_r),
    ))
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        CliError::Config(format!("Invalid value for {}: {}", key, value))
    })
}

/// Applies repeated `SECTION.KEY=VALUE` assignments on top of the file configuration.
pub fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let Some((key, value)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };
        let Some((section, name)) = key.split_once('.') else {
            return Err(CliError::Config(format!(
                "Unsupported configuration key for --set: '{}'",
                key
            )));
        };

        match section {
            "geometry" => {
                let g = config.geometry.get_or_insert_with(Default::default);
                let v = Some(parse_value(key, value)?);
                match name {
                    "width" => g.width = v,
                    "height" => g.height = v,
                    "depth" => g.depth = v,
                    "mol-pos-l" => g.mol_pos_l = v,
                    "mol-pos-r" => g.mol_pos_r = v,
                    "top-l" => g.top_l = v,
                    "bottom-l" => g.bottom_l = v,
                    "front-r" => g.front_r = v,
                    "back-r" => g.back_r = v,
                    "height-l" => g.height_l = v,
                    "depth-r" => g.depth_r = v,
                    _ => return Err(unsupported(key)),
                }
            }
            "molecule" => {
                let m = config.molecule.get_or_insert_with(Default::default);
                if name == "topology" {
                    m.topology = Some(value.trim().to_string());
                } else {
                    let mut overrides = m.overrides();
                    overrides.set_from_str(name, value)?;
                    m.set_overrides(overrides);
                }
            }
            "parameters" => {
                let parsed = ParameterValue::from_str_value(key, value)?;
                parsed.apply(&mut Parameters::default(), name)?;
                config
                    .parameters
                    .get_or_insert_with(Default::default)
                    .insert(name.to_string(), parsed);
            }
            "simulation" => {
                let s = config.simulation.get_or_insert_with(Default::default);
                match name {
                    "flipping-algorithm" => s.flipping_algorithm = Some(value.trim().to_string()),
                    "site-selection" => s.site_selection = Some(value.trim().to_string()),
                    "seed" => s.seed = Some(parse_value(key, value)?),
                    "randomize" => s.randomize = Some(parse_value(key, value)?),
                    "burn-in" => s.burn_in = Some(parse_value(key, value)?),
                    "steps" => s.steps = Some(parse_value(key, value)?),
                    "record-frequency" => s.record_frequency = Some(parse_value(key, value)?),
                    _ => return Err(unsupported(key)),
                }
            }
            "sweep" => {
                let s = config.sweep.get_or_insert_with(Default::default);
                match name {
                    "parameter" => s.parameter = Some(value.trim().to_string()),
                    "start" => s.start = Some(parse_value(key, value)?),
                    "stop" => s.stop = Some(parse_value(key, value)?),
                    "points" => s.points = Some(parse_value(key, value)?),
                    "slots" => s.slots = Some(parse_value(key, value)?),
                    _ => return Err(unsupported(key)),
                }
            }
            _ => return Err(unsupported(key)),
        }
    }
    Ok(config)
}

fn unsupported(key: &str) -> CliError {
    CliError::Config(format!("Unsupported configuration key for --set: '{}'", key))
}
