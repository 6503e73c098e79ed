//! Line protocol spoken between a controlling process and `msd worker`.
//!
//! Every message is one UTF-8 line. Commands are bare words (`SET`, `RUN`, `GET`, `RESET`,
//! `EXIT`) followed by a one-line JSON payload where they take one; the worker acknowledges with
//! `READY`, `DONE` or `GOODBYE`, or answers with a JSON state line. [`WorkerSession`] is the
//! client side used by the tests and fails with [`DesyncError`] whenever a reply is missing or
//! unexpected.

use crate::error::Result;
use msdsim::core::models::molecule::{EdgeParameters, NodeParameters};
use msdsim::core::models::parameters::Parameters;
use msdsim::core::models::results::Results;
use msdsim::core::vector::Vector;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use thiserror::Error;
use tracing::{debug, trace};

pub const READY: &str = "READY";
pub const DONE: &str = "DONE";
pub const GOODBYE: &str = "GOODBYE";
pub const CANCEL: &str = "CANCEL";
pub const CONTINUE: &str = "CONTINUE";

/// A reply that did not match the protocol. `received` is `None` when the stream ended.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Worker protocol desynchronized: expected {expected}, received {}", received.as_deref().unwrap_or("end of stream"))]
pub struct DesyncError {
    pub expected: String,
    pub received: Option<String>,
}

/// State sections a `GET` may ask for.
pub const SECTIONS: [&str; 5] = ["results", "parameters", "seed", "msd", "mol"];

/// Payload of `RUN`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct RunRequest {
    #[serde(alias = "simCount")]
    pub steps: u64,
    /// Steps between state reports; zero reports only before and after the whole run.
    #[serde(default)]
    pub freq: u64,
    /// Added to `kT` after every step.
    #[serde(default, rename = "dkT")]
    pub dkt: f64,
    /// Added to `B` after every step.
    #[serde(default, rename = "dB")]
    pub db: Option<Vector>,
}

/// Payload of `RESET`. Reseeding is the default unless a seed is given.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct ResetRequest {
    #[serde(default)]
    pub randomize: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reseed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// One state line. Sections that were not asked for are absent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct WorkerState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Results>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msd: Option<Vec<SiteState>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mol: Option<MoleculeState>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SiteState {
    pub index: usize,
    pub pos: [usize; 3],
    pub spin: Vector,
    pub flux: Vector,
    pub local_m: Vector,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct MoleculeState {
    pub nodes: Vec<NodeState>,
    pub edges: Vec<EdgeState>,
    pub leads: [usize; 2],
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct NodeState {
    pub index: usize,
    pub parameters: NodeParameters,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct EdgeState {
    pub index: usize,
    pub src: usize,
    pub dest: usize,
    pub parameters: EdgeParameters,
}

/// Client side of a worker connection.
///
/// The `msd` binary only ever plays the worker; this half exists to drive
/// [`serve`](crate::commands::worker::serve) over in-memory pipes in the protocol tests.
#[cfg_attr(not(test), allow(dead_code))]
pub(crate) struct WorkerSession<R: BufRead, W: Write> {
    reader: R,
    writer: W,
}

#[cfg_attr(not(test), allow(dead_code))]
impl<R: BufRead, W: Write> WorkerSession<R, W> {
    pub(crate) fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Sends the init line and waits for `READY`.
    pub(crate) fn start(&mut self, init: &serde_json::Value) -> Result<()> {
        self.send(&serde_json::to_string(init)?)?;
        self.expect(READY)
    }

    /// Sends a partial parameter update.
    pub(crate) fn set(&mut self, values: &serde_json::Value) -> Result<()> {
        self.send("SET")?;
        self.send(&serde_json::to_string(values)?)?;
        self.expect(DONE)
    }

    /// Runs `request` on the worker. `on_state` sees every reported state and returns `false` to
    /// cancel. Returns the number of states received.
    pub(crate) fn run(
        &mut self,
        request: &RunRequest,
        mut on_state: impl FnMut(&WorkerState) -> bool,
    ) -> Result<usize> {
        self.send("RUN")?;
        self.send(&serde_json::to_string(request)?)?;
        let mut states = 0;
        loop {
            let line = self.receive(DONE)?;
            if line == DONE {
                debug!(states, "Worker run finished.");
                return Ok(states);
            }
            let state = self.parse_state(line, DONE)?;
            states += 1;
            let answer = if on_state(&state) { CONTINUE } else { CANCEL };
            self.send(answer)?;
        }
    }

    /// Fetches the named sections; an empty list asks for all of them.
    pub(crate) fn get(&mut self, sections: &[&str]) -> Result<WorkerState> {
        self.send("GET")?;
        self.send(&serde_json::to_string(sections)?)?;
        let line = self.receive("state")?;
        self.parse_state(line, "state")
    }

    /// Resets the worker's lattice and returns the seed now in use.
    pub(crate) fn reset(&mut self, request: &ResetRequest) -> Result<u64> {
        self.send("RESET")?;
        self.send(&serde_json::to_string(request)?)?;
        let line = self.receive("seed")?;
        let state = self.parse_state(line, "seed")?;
        let seed = state.seed.ok_or_else(|| DesyncError {
            expected: "seed".to_string(),
            received: Some("state without seed".to_string()),
        })?;
        Ok(seed)
    }

    /// Asks the worker to stop and waits for `GOODBYE`.
    pub(crate) fn exit(mut self) -> Result<()> {
        self.send("EXIT")?;
        self.expect(GOODBYE)
    }

    fn send(&mut self, line: &str) -> Result<()> {
        trace!(line, "-> worker");
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }

    fn receive(&mut self, expected: &str) -> Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(DesyncError {
                expected: expected.to_string(),
                received: None,
            }
            .into());
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        trace!(line, "<- worker");
        Ok(line)
    }

    fn expect(&mut self, expected: &str) -> Result<()> {
        let line = self.receive(expected)?;
        if line == expected {
            Ok(())
        } else {
            Err(DesyncError {
                expected: expected.to_string(),
                received: Some(line),
            }
            .into())
        }
    }

    fn parse_state(&self, line: String, expected: &str) -> Result<WorkerState> {
        match serde_json::from_str(&line) {
            Ok(state) => Ok(state),
            Err(_) => Err(DesyncError {
                expected: expected.to_string(),
                received: Some(line),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::worker::serve;
    use crate::error::CliError;
    use serde_json::json;
    use std::io::{BufReader, Cursor, Read};
    use std::sync::mpsc::{Receiver, Sender, channel};
    use std::thread;

    fn scripted(replies: &str) -> WorkerSession<Cursor<Vec<u8>>, Vec<u8>> {
        WorkerSession::new(Cursor::new(replies.as_bytes().to_vec()), Vec::new())
    }

    fn desync(result: Result<impl std::fmt::Debug>) -> DesyncError {
        match result {
            Err(CliError::Desync(e)) => e,
            other => panic!("expected a desync, got {:?}", other),
        }
    }

    struct ChannelWriter(Sender<Vec<u8>>);

    impl Write for ChannelWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0
                .send(buf.to_vec())
                .map_err(|_| std::io::ErrorKind::BrokenPipe)?;
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ChannelReader {
        rx: Receiver<Vec<u8>>,
        pending: Cursor<Vec<u8>>,
    }

    impl Read for ChannelReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            loop {
                let n = self.pending.read(buf)?;
                if n > 0 {
                    return Ok(n);
                }
                match self.rx.recv() {
                    Ok(chunk) => self.pending = Cursor::new(chunk),
                    Err(_) => return Ok(0),
                }
            }
        }
    }

    fn pipe() -> (ChannelWriter, BufReader<ChannelReader>) {
        let (tx, rx) = channel();
        (
            ChannelWriter(tx),
            BufReader::new(ChannelReader {
                rx,
                pending: Cursor::new(Vec::new()),
            }),
        )
    }

    fn init() -> serde_json::Value {
        json!({
            "width": 5, "height": 2, "depth": 2,
            "kT": 0.5, "B": [0.0, 0.1, 0.0],
            "flipping-algorithm": "continuous",
            "seed": 21,
        })
    }

    #[test]
    fn session_reports_desync_on_wrong_acknowledgement() {
        let mut session = scripted("DONE\n");
        let error = desync(session.start(&init()));
        assert_eq!(error.expected, READY);
        assert_eq!(error.received.as_deref(), Some("DONE"));
    }

    #[test]
    fn session_reports_desync_at_end_of_stream() {
        let mut session = scripted("READY\n");
        session.start(&init()).unwrap();
        let error = desync(session.set(&json!({"kT": 1.0})));
        assert_eq!(error.expected, DONE);
        assert_eq!(error.received, None);
    }

    #[test]
    fn session_rejects_garbage_in_place_of_state() {
        let mut session = scripted("READY\nnot json\n");
        session.start(&init()).unwrap();
        let error = desync(session.get(&[]));
        assert_eq!(error.received.as_deref(), Some("not json"));
    }

    #[test]
    fn session_writes_commands_as_lines() {
        let mut session = scripted("READY\nDONE\n");
        session.start(&json!({"width": 3})).unwrap();
        session.set(&json!({"kT": 0.2})).unwrap();
        let sent = String::from_utf8(session.writer.clone()).unwrap();
        assert_eq!(sent, "{\"width\":3}\nSET\n{\"kT\":0.2}\n");
    }

    #[test]
    fn session_drives_a_live_worker() {
        let (to_worker, worker_in) = pipe();
        let (worker_out, from_worker) = pipe();
        let handle = thread::spawn(move || serve(worker_in, worker_out));

        let mut session = WorkerSession::new(from_worker, to_worker);
        session.start(&init()).unwrap();

        let state = session.get(&["parameters", "seed"]).unwrap();
        assert_eq!(state.seed, Some(21));
        assert_eq!(state.parameters.unwrap().kt, 0.5);
        assert!(state.results.is_none());

        session.set(&json!({"kT": 0.25})).unwrap();
        let state = session.get(&["parameters"]).unwrap();
        assert_eq!(state.parameters.unwrap().kt, 0.25);

        let mut times = Vec::new();
        let states = session
            .run(
                &RunRequest {
                    steps: 250,
                    freq: 100,
                    ..RunRequest::default()
                },
                |state| {
                    times.push(state.results.map(|r| r.t));
                    true
                },
            )
            .unwrap();
        assert_eq!(states, 4);
        assert_eq!(times, [Some(0), Some(100), Some(200), Some(250)]);

        let mut seen = 0;
        let states = session
            .run(
                &RunRequest {
                    steps: 1_000,
                    freq: 10,
                    ..RunRequest::default()
                },
                |_| {
                    seen += 1;
                    seen < 2
                },
            )
            .unwrap();
        assert_eq!(states, 2);
        assert_eq!(session.get(&["results"]).unwrap().results.unwrap().t, 260);

        let seed = session
            .reset(&ResetRequest {
                seed: Some(99),
                ..ResetRequest::default()
            })
            .unwrap();
        assert_eq!(seed, 99);
        assert_eq!(session.get(&["results"]).unwrap().results.unwrap().t, 0);

        session.exit().unwrap();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn live_worker_applies_molecule_coefficients() {
        let (to_worker, worker_in) = pipe();
        let (worker_out, from_worker) = pipe();
        let handle = thread::spawn(move || serve(worker_in, worker_out));

        let mut session = WorkerSession::new(from_worker, to_worker);
        session.start(&json!({"width": 8, "height": 1, "depth": 1, "seed": 3})).unwrap();
        session.set(&json!({"Jm": -0.5, "Sm": 2.0})).unwrap();

        let mol = session.get(&["mol"]).unwrap().mol.unwrap();
        assert_eq!(mol.nodes.len(), 2);
        assert!(mol.nodes.iter().all(|n| n.parameters.s == 2.0));
        assert!(mol.edges.iter().all(|e| e.parameters.j == -0.5));

        session.exit().unwrap();
        handle.join().unwrap().unwrap();
    }
}
