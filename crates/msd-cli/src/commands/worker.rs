use crate::config::builder::{apply_set_values, resolve};
use crate::config::file::{
    FileConfig, FileGeometry, FileSimulation, MoleculeOverrides, ParameterValue,
};
use crate::error::{CliError, Result};
use crate::protocol::{
    CANCEL, DONE, EdgeState, GOODBYE, MoleculeState, NodeState, READY, ResetRequest, RunRequest,
    SECTIONS, SiteState, WorkerState,
};
use msdsim::core::vector::Vector;
use msdsim::engine::Lattice;
use serde_json::{Map, Value};
use std::io::{self, BufRead, Write};
use tracing::{debug, info, instrument, warn};

pub fn run() -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(stdin.lock(), stdout.lock())
}

/// Serves one session: an init line, then commands until `EXIT` or end of input.
#[instrument(skip_all, name = "worker")]
pub fn serve<R: BufRead, W: Write>(mut reader: R, mut writer: W) -> Result<()> {
    let Some(line) = read_line(&mut reader)? else {
        debug!("Input closed before initialization.");
        return Ok(());
    };
    let init: Map<String, Value> = serde_json::from_str(&line)?;
    let mut lattice = build_lattice(init)?;
    info!(sites = lattice.n(), seed = lattice.seed(), "Worker lattice ready.");
    reply(&mut writer, READY)?;

    while let Some(line) = read_line(&mut reader)? {
        let command = line.trim().to_uppercase();
        let outcome = match command.as_str() {
            "" => continue,
            "EXIT" => {
                reply(&mut writer, GOODBYE)?;
                return Ok(());
            }
            "SET" => {
                let Some(payload) = read_line(&mut reader)? else {
                    break;
                };
                set_values(&mut lattice, &payload).and_then(|()| reply(&mut writer, DONE))
            }
            "RUN" => {
                let Some(payload) = read_line(&mut reader)? else {
                    break;
                };
                match serde_json::from_str::<RunRequest>(&payload) {
                    Ok(request) => {
                        if !run_request(&mut reader, &mut writer, &mut lattice, &request)? {
                            break;
                        }
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                }
            }
            "GET" => {
                let Some(payload) = read_line(&mut reader)? else {
                    break;
                };
                serde_json::from_str::<Vec<String>>(&payload)
                    .map_err(CliError::from)
                    .and_then(|names| {
                        let names: Vec<&str> = names.iter().map(String::as_str).collect();
                        send_state(&mut writer, &state(&lattice, &names))
                    })
            }
            "RESET" => {
                let Some(payload) = read_line(&mut reader)? else {
                    break;
                };
                serde_json::from_str::<ResetRequest>(&payload)
                    .map_err(CliError::from)
                    .and_then(|request| {
                        reset(&mut lattice, &request);
                        send_state(&mut writer, &state(&lattice, &["seed"]))
                    })
            }
            other => Err(CliError::Config(format!("Unrecognized command: {}", other))),
        };

        if let Err(e) = outcome {
            match e {
                CliError::Io(e) => return Err(e.into()),
                e => {
                    warn!("Worker command '{}' failed: {}", command, e);
                    reply(&mut writer, &format!("ERROR {}", e))?;
                }
            }
        }
    }
    debug!("Input closed; worker stopping.");
    Ok(())
}

fn read_line(reader: &mut impl BufRead) -> Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn reply(writer: &mut impl Write, line: &str) -> Result<()> {
    writeln!(writer, "{}", line)?;
    writer.flush()?;
    Ok(())
}

fn send_state(writer: &mut impl Write, state: &WorkerState) -> Result<()> {
    reply(writer, &serde_json::to_string(state)?)
}

/// Routes the flat init object into run-file sections and builds the lattice from them.
fn build_lattice(init: Map<String, Value>) -> Result<Lattice> {
    let assignments: Vec<String> = init
        .into_iter()
        .map(|(key, value)| {
            let section = if FileGeometry::KEYS.contains(&key.as_str()) {
                "geometry"
            } else if key == "topology" || MoleculeOverrides::KEYS.contains(&key.as_str()) {
                "molecule"
            } else if FileSimulation::KEYS.contains(&key.as_str()) {
                "simulation"
            } else {
                "parameters"
            };
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            format!("{}.{}={}", section, key, value)
        })
        .collect();
    let file = apply_set_values(FileConfig::default(), &assignments)?;
    let app = resolve(file, None)?;
    let mut lattice = Lattice::new(&app.lattice)?;
    if app.randomize {
        lattice.randomize(false);
    }
    Ok(lattice)
}

/// Applies a partial update. A payload touching only `kT` and `B` takes the cheap refresh;
/// anything else replaces the parameters and rebuilds the aggregates. Nothing is committed
/// unless every key is valid.
fn set_values(lattice: &mut Lattice, payload: &str) -> Result<()> {
    let values: Map<String, Value> = serde_json::from_str(payload)?;
    let mut parameters = lattice.parameters();
    let mut molecule_values = Map::new();
    let mut touched = Vec::new();

    for (key, value) in values {
        if MoleculeOverrides::KEYS.contains(&key.as_str()) {
            molecule_values.insert(key, value);
            continue;
        }
        let value: ParameterValue = serde_json::from_value(value)?;
        value.apply(&mut parameters, &key)?;
        touched.push(key);
    }
    let overrides: MoleculeOverrides = serde_json::from_value(Value::Object(molecule_values))?;

    if overrides.is_empty() && touched.iter().all(|k| k == "kT" || k == "B") {
        debug!(?touched, "Refreshing kT/B.");
        lattice.set_b(parameters.b);
        lattice.set_kt(parameters.kt);
        return Ok(());
    }
    if !touched.is_empty() {
        lattice.set_parameters(parameters);
    }
    if !overrides.is_empty() {
        let mut molecule = lattice.molecule().clone();
        overrides.apply_graph(&mut molecule);
        lattice.set_molecule(molecule)?;
    }
    Ok(())
}

/// Runs a `RUN` request, reporting state before the first chunk and after each one. Returns
/// `false` if the input closed mid-run.
fn run_request<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    lattice: &mut Lattice,
    request: &RunRequest,
) -> Result<bool> {
    let freq = if request.freq == 0 {
        request.steps
    } else {
        request.freq
    };
    let db = request.db.unwrap_or_else(Vector::zeros);
    debug!(steps = request.steps, freq, "Worker run starting.");

    send_state(writer, &state(lattice, &[]))?;
    let mut remaining = request.steps;
    loop {
        let Some(answer) = read_line(reader)? else {
            return Ok(false);
        };
        if answer.trim().eq_ignore_ascii_case(CANCEL) {
            info!(remaining, "Worker run cancelled.");
            break;
        }
        if remaining == 0 {
            break;
        }
        let chunk = remaining.min(freq);
        advance(lattice, chunk, request.dkt, db);
        remaining -= chunk;
        send_state(writer, &state(lattice, &[]))?;
    }
    reply(writer, DONE)?;
    Ok(true)
}

fn advance(lattice: &mut Lattice, steps: u64, dkt: f64, db: Vector) {
    if dkt == 0.0 && db == Vector::zeros() {
        lattice.metropolis(steps);
        return;
    }
    for _ in 0..steps {
        lattice.metropolis(1);
        let p = lattice.parameters();
        lattice.set_kt(p.kt + dkt);
        lattice.set_b(p.b + db);
    }
}

fn reset(lattice: &mut Lattice, request: &ResetRequest) {
    let reseed = match request.seed {
        Some(seed) => {
            lattice.set_seed(seed);
            false
        }
        None => request.reseed.unwrap_or(true),
    };
    if request.randomize {
        lattice.randomize(reseed);
    } else {
        lattice.reinitialize(reseed);
    }
    debug!(seed = lattice.seed(), "Worker lattice reset.");
}

/// Collects the named sections; an empty list selects all of them.
fn state(lattice: &Lattice, names: &[&str]) -> WorkerState {
    for name in names {
        if !SECTIONS.contains(name) {
            warn!("Ignoring unknown state section '{}'.", name);
        }
    }
    let wants = |section: &str| names.is_empty() || names.contains(&section);

    WorkerState {
        results: wants("results").then(|| lattice.results()),
        parameters: wants("parameters").then(|| lattice.parameters()),
        seed: wants("seed").then(|| lattice.seed()),
        msd: wants("msd").then(|| {
            lattice
                .sites()
                .map(|s| SiteState {
                    index: s.index,
                    pos: [s.x, s.y, s.z],
                    spin: s.spin,
                    flux: s.flux,
                    local_m: s.local_m(),
                })
                .collect()
        }),
        mol: wants("mol").then(|| {
            let molecule = lattice.molecule();
            let (left, right) = molecule.leads();
            MoleculeState {
                nodes: molecule
                    .nodes()
                    .map(|(index, p)| NodeState {
                        index,
                        parameters: *p,
                    })
                    .collect(),
                edges: molecule
                    .edges()
                    .map(|(index, e)| EdgeState {
                        index,
                        src: e.src,
                        dest: e.dest,
                        parameters: e.parameters,
                    })
                    .collect(),
                leads: [left, right],
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msdsim::core::models::parameters::Parameters;
    use msdsim::engine::config::LatticeConfigBuilder;
    use std::io::Cursor;

    const INIT: &str = r#"{"width": 5, "height": 2, "depth": 2, "kT": 0.5, "B": [0, 0.1, 0], "seed": 21}"#;

    fn transcript(input: &str) -> Vec<String> {
        let mut output = Vec::new();
        serve(Cursor::new(input.as_bytes()), &mut output).unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn parse(line: &str) -> WorkerState {
        serde_json::from_str(line).unwrap()
    }

    fn reference() -> Lattice {
        let mut p = Parameters::default();
        p.kt = 0.5;
        p.b = Vector::new(0.0, 0.1, 0.0);
        let config = LatticeConfigBuilder::new()
            .dimensions(5, 2, 2)
            .parameters(p)
            .seed(21)
            .build()
            .unwrap();
        Lattice::new(&config).unwrap()
    }

    #[test]
    fn init_builds_the_configured_lattice() {
        let lines = transcript(&format!("{INIT}\nGET\n[]\nEXIT\n"));
        assert_eq!(lines[0], READY);
        let state = parse(&lines[1]);
        let expected = reference();
        assert_eq!(state.results, Some(expected.results()));
        assert_eq!(state.parameters, Some(expected.parameters()));
        assert_eq!(state.seed, Some(21));
        assert_eq!(state.msd.as_ref().map(Vec::len), Some(expected.n()));
        assert_eq!(state.mol.unwrap().nodes.len(), expected.molecule().node_count());
        assert_eq!(lines[2], GOODBYE);
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn end_of_input_stops_silently() {
        assert!(transcript("").is_empty());
        assert_eq!(transcript(&format!("{INIT}\n")), [READY]);
        assert_eq!(transcript(&format!("{INIT}\nSET\n")), [READY]);
    }

    #[test]
    fn set_refreshes_temperature_and_field() {
        let lines = transcript(&format!(
            "{INIT}\nSET\n{{\"kT\": 1.5, \"B\": [0, 0, 1]}}\nGET\n[\"parameters\", \"results\"]\n"
        ));
        assert_eq!(lines[1], DONE);
        let state = parse(&lines[2]);
        let mut expected = reference();
        expected.set_b(Vector::z());
        expected.set_kt(1.5);
        assert_eq!(state.parameters, Some(expected.parameters()));
        assert_eq!(state.results.unwrap().u, expected.results().u);
        assert!(state.seed.is_none());
    }

    #[test]
    fn set_with_other_keys_recomputes() {
        let lines = transcript(&format!(
            "{INIT}\nset\n{{\"JmL\": 0.3, \"B.x\": 0.2}}\nGET\n[\"results\"]\n"
        ));
        assert_eq!(lines[1], DONE);
        let mut expected = reference();
        let mut p = expected.parameters();
        p.j_ml = 0.3;
        p.b.x = 0.2;
        expected.set_parameters(p);
        let u = parse(&lines[2]).results.unwrap().u;
        assert!((u - expected.results().u).abs() < 1e-9 * u.abs().max(1.0));
    }

    #[test]
    fn molecule_keys_update_every_edge() {
        let lines = transcript(&format!(
            "{INIT}\nSET\n{{\"Jm\": 0.25, \"Fm\": 0.1}}\nGET\n[\"mol\"]\n"
        ));
        assert_eq!(lines[1], DONE);
        let mol = parse(&lines[2]).mol.unwrap();
        assert!(mol.edges.iter().all(|e| e.parameters.j == 0.25));
        assert!(mol.nodes.iter().all(|n| n.parameters.f == 0.1));
    }

    #[test]
    fn invalid_set_commits_nothing() {
        let lines = transcript(&format!(
            "{INIT}\nSET\n{{\"kT\": 2.0, \"Temperature\": 1.0}}\nGET\n[\"parameters\"]\n"
        ));
        assert!(lines[1].starts_with("ERROR "));
        assert_eq!(parse(&lines[2]).parameters.unwrap().kt, 0.5);
    }

    #[test]
    fn run_reports_each_chunk_and_ends_with_done() {
        let lines = transcript(&format!(
            "{INIT}\nRUN\n{{\"steps\": 25, \"freq\": 10}}\nok\nok\nok\nok\nEXIT\n"
        ));
        let times: Vec<u64> = lines[1..5]
            .iter()
            .map(|l| parse(l).results.unwrap().t)
            .collect();
        assert_eq!(times, [0, 10, 20, 25]);
        assert_eq!(lines[5], DONE);
        assert_eq!(lines[6], GOODBYE);

        let mut expected = reference();
        expected.metropolis(10);
        expected.metropolis(10);
        expected.metropolis(5);
        assert_eq!(parse(&lines[4]).results, Some(expected.results()));
    }

    #[test]
    fn cancel_stops_the_run_at_the_next_report() {
        let lines = transcript(&format!(
            "{INIT}\nRUN\n{{\"simCount\": 100, \"freq\": 10}}\ncontinue\nCANCEL\nGET\n[\"results\"]\n"
        ));
        assert_eq!(parse(&lines[2]).results.unwrap().t, 10);
        assert_eq!(lines[3], DONE);
        assert_eq!(parse(&lines[4]).results.unwrap().t, 10);
    }

    #[test]
    fn ramps_apply_after_every_step() {
        let lines = transcript(&format!(
            "{INIT}\nRUN\n{{\"steps\": 4, \"dkT\": 0.25, \"dB\": [0, 0, 0.5]}}\nok\nok\nGET\n[\"parameters\"]\n"
        ));
        assert_eq!(lines[3], DONE);
        let p = parse(&lines[4]).parameters.unwrap();
        assert_eq!(p.kt, 1.5);
        assert_eq!(p.b, Vector::new(0.0, 0.1, 2.0));
    }

    #[test]
    fn reset_with_seed_restarts_the_chain() {
        let lines = transcript(&format!(
            "{INIT}\nRUN\n{{\"steps\": 50}}\nok\nok\nRESET\n{{\"seed\": 7}}\nGET\n[\"results\"]\n"
        ));
        assert_eq!(lines[4], r#"{"seed":7}"#);
        let results = parse(&lines[5]).results.unwrap();
        assert_eq!(results.t, 0);
        assert_eq!(results, reference().results());
    }

    #[test]
    fn unknown_commands_reply_with_an_error_and_continue() {
        let lines = transcript(&format!("{INIT}\nFLY\nRUN\nnot json\nEXIT\n"));
        assert_eq!(lines[1], "ERROR Configuration error: Unrecognized command: FLY");
        assert!(lines[2].starts_with("ERROR Malformed JSON"));
        assert_eq!(lines[3], GOODBYE);
    }

    #[test]
    fn malformed_init_fails_the_session() {
        let mut output = Vec::new();
        let result = serve(Cursor::new("{\"widht\": 3}\n".as_bytes()), &mut output);
        assert!(matches!(result, Err(CliError::Config(_))));
        assert!(output.is_empty());
    }
}
