use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chess::Color;

use crate::errors::{Result, TunerError};

/// Closed set of engine options the tuner is allowed to set.
///
/// Unknown option names never cross the process boundary; anything the
/// pipeline needs from the engine has a variant here.
#[derive(Debug, Clone)]
pub enum EngineOption {
    UseNnue(bool),
    WeightFile(PathBuf),
    HashMb(u32),
    Threads(u32),
}

impl EngineOption {
    pub fn name(&self) -> &'static str {
        match self {
            EngineOption::UseNnue(_) => "UseNNUE",
            EngineOption::WeightFile(_) => "HCEWeightFile",
            EngineOption::HashMb(_) => "Hash",
            EngineOption::Threads(_) => "Threads",
        }
    }

    pub fn value(&self) -> String {
        match self {
            EngineOption::UseNnue(v) => v.to_string(),
            EngineOption::WeightFile(path) => path.display().to_string(),
            EngineOption::HashMb(v) => v.to_string(),
            EngineOption::Threads(v) => v.to_string(),
        }
    }
}

/// Per-move search limit, uniform for both sides within a match.
#[derive(Debug, Clone, Copy)]
pub enum SearchLimit {
    /// `go movetime <ms>`
    MoveTime(u64),
    /// `go depth <plies>`
    Depth(u8),
}

/// Result of one `search()` round-trip.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Best move in coordinate notation, e.g. `e2e4` or `e7e8q`
    pub best_move: String,
    /// Whether the last reported score was a forced mate
    pub mate: bool,
}

/// Game-end state as reported by the engine's non-standard `ischeckmate` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndgameReport {
    Ongoing,
    Stalemate,
    Checkmate(Color),
}

/// Handle to one external UCI engine subprocess.
///
/// Every request is a newline-terminated line on the child's stdin; responses
/// are consumed line by line until the expected terminator appears.
/// Unrecognized lines are skipped, which tolerates engine log chatter. A
/// dedicated reader thread feeds stdout lines through a channel so every read
/// is bounded by `read_timeout` — a silent or wedged engine surfaces as a
/// `Protocol` error instead of blocking its worker forever.
pub struct EngineHandle {
    child: Child,
    stdin: BufWriter<std::process::ChildStdin>,
    lines: Receiver<String>,
    reader: Option<JoinHandle<()>>,
    read_timeout: Duration,
    closed: bool,
}

impl EngineHandle {
    /// Start the engine process and complete the UCI handshake.
    pub fn spawn<P: AsRef<Path>>(engine_path: P, read_timeout: Duration) -> Result<Self> {
        let path = engine_path.as_ref();
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                TunerError::Resource(format!("failed to start engine {}: {}", path.display(), e))
            })?;

        let stdin = BufWriter::new(
            child
                .stdin
                .take()
                .ok_or_else(|| TunerError::Protocol("failed to get engine stdin".to_string()))?,
        );
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TunerError::Protocol("failed to get engine stdout".to_string()))?;

        let (tx, rx) = mpsc::channel();
        let reader = thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let mut handle = Self {
            child,
            stdin,
            lines: rx,
            reader: Some(reader),
            read_timeout,
            closed: false,
        };

        handle.send_command("uci")?;
        handle.wait_for("uciok")?;
        handle.send_command("isready")?;
        handle.wait_for("readyok")?;

        Ok(handle)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(TunerError::ClosedHandle)
        } else {
            Ok(())
        }
    }

    fn send_command(&mut self, command: &str) -> Result<()> {
        writeln!(self.stdin, "{}", command)
            .and_then(|_| self.stdin.flush())
            .map_err(|e| TunerError::Protocol(format!("failed to send '{}': {}", command, e)))
    }

    fn read_line(&mut self) -> Result<String> {
        match self.lines.recv_timeout(self.read_timeout) {
            Ok(line) => Ok(line),
            Err(RecvTimeoutError::Timeout) => Err(TunerError::Protocol(format!(
                "no response from engine within {}ms",
                self.read_timeout.as_millis()
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(TunerError::Protocol(
                "engine closed its output stream".to_string(),
            )),
        }
    }

    fn wait_for(&mut self, terminator: &str) -> Result<()> {
        loop {
            if self.read_line()?.trim() == terminator {
                return Ok(());
            }
        }
    }

    /// Send one `setoption` line per option.
    ///
    /// UCI engines drop unknown options silently, so rejection is not
    /// observable here; the closed `EngineOption` set keeps typos out.
    pub fn configure(&mut self, options: &[EngineOption]) -> Result<()> {
        self.ensure_open()?;
        for option in options {
            self.send_command(&format!(
                "setoption name {} value {}",
                option.name(),
                option.value()
            ))?;
        }
        Ok(())
    }

    /// Establish board state from a FEN, optionally followed by a move list,
    /// or from the start position when `fen` is `None`.
    pub fn set_position(&mut self, fen: Option<&str>, moves: &[String]) -> Result<()> {
        self.ensure_open()?;
        let mut command = match fen {
            Some(fen) => format!("position fen {}", fen),
            None => "position startpos".to_string(),
        };
        if !moves.is_empty() {
            command.push_str(" moves ");
            command.push_str(&moves.join(" "));
        }
        self.send_command(&command)
    }

    /// Request a static evaluation of the current position, in centipawns.
    pub fn evaluate(&mut self) -> Result<i32> {
        self.ensure_open()?;
        self.send_command("eval")?;
        loop {
            let line = self.read_line()?;
            if let Some(score) = parse_eval_line(&line) {
                return Ok(score);
            }
        }
    }

    /// Run a search under the given limit and block until `bestmove` arrives.
    pub fn search(&mut self, limit: SearchLimit) -> Result<SearchOutcome> {
        self.ensure_open()?;
        let command = match limit {
            SearchLimit::MoveTime(ms) => format!("go movetime {}", ms),
            SearchLimit::Depth(plies) => format!("go depth {}", plies),
        };
        self.send_command(&command)?;

        let mut mate = false;
        loop {
            let line = self.read_line()?;
            let line = line.trim();
            if line.starts_with("info") && line.contains("score ") {
                mate = line.contains("score mate");
            } else if let Some(rest) = line.strip_prefix("bestmove") {
                let best_move = rest
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .to_string();
                if best_move.is_empty() || best_move == "(none)" {
                    return Err(TunerError::Protocol(format!(
                        "engine returned no best move: '{}'",
                        line
                    )));
                }
                return Ok(SearchOutcome { best_move, mate });
            }
        }
    }

    /// Query the engine's non-standard `ischeckmate` extension.
    pub fn terminal_status(&mut self) -> Result<EndgameReport> {
        self.ensure_open()?;
        self.send_command("ischeckmate")?;
        loop {
            let line = self.read_line()?;
            if let Some(report) = parse_checkmate_line(&line) {
                return Ok(report);
            }
        }
    }

    /// Send `quit` and release the process. Must be called exactly once;
    /// every later operation on this handle fails with `ClosedHandle`.
    pub fn shutdown(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        // The engine may already be gone; the wait below is what matters.
        let _ = self.send_command("quit");
        self.child
            .wait()
            .map_err(|e| TunerError::Io(format!("failed to reap engine process: {}", e)))?;
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        Ok(())
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if !self.closed {
            let _ = writeln!(self.stdin, "quit");
            let _ = self.stdin.flush();
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Extract a centipawn score from an `eval` response line.
///
/// Accepts a bare integer (the tuner-facing engine's format) or a labeled
/// line such as `Classical evaluation ... +0.35`, whose trailing float is in
/// pawns.
fn parse_eval_line(line: &str) -> Option<i32> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(cp) = trimmed.parse::<i32>() {
        return Some(cp);
    }
    if trimmed.to_ascii_lowercase().contains("evaluation") {
        for token in trimmed.split_whitespace().rev() {
            let cleaned =
                token.trim_matches(|c: char| !(c.is_ascii_digit() || c == '-' || c == '+' || c == '.'));
            if cleaned.is_empty() || cleaned == "-" || cleaned == "+" {
                continue;
            }
            if let Ok(pawns) = cleaned.parse::<f64>() {
                return Some((pawns * 100.0).round() as i32);
            }
        }
    }
    None
}

fn parse_checkmate_line(line: &str) -> Option<EndgameReport> {
    let trimmed = line.trim();
    if trimmed.starts_with("nocheckmate") {
        return Some(EndgameReport::Ongoing);
    }
    if trimmed.starts_with("stalemate") {
        return Some(EndgameReport::Stalemate);
    }
    if let Some(rest) = trimmed.strip_prefix("checkmate") {
        return match rest.split_whitespace().next() {
            Some("white") => Some(EndgameReport::Checkmate(Color::White)),
            Some("black") => Some(EndgameReport::Checkmate(Color::Black)),
            _ => None,
        };
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_formatting() {
        let option = EngineOption::WeightFile(PathBuf::from("/tmp/model_3.txt"));
        assert_eq!(option.name(), "HCEWeightFile");
        assert_eq!(option.value(), "/tmp/model_3.txt");

        let option = EngineOption::UseNnue(false);
        assert_eq!(option.name(), "UseNNUE");
        assert_eq!(option.value(), "false");

        assert_eq!(EngineOption::HashMb(1).value(), "1");
    }

    #[test]
    fn test_parse_bare_eval() {
        assert_eq!(parse_eval_line("400"), Some(400));
        assert_eq!(parse_eval_line("  -25 "), Some(-25));
        assert_eq!(parse_eval_line("info string loaded weights"), None);
        assert_eq!(parse_eval_line(""), None);
    }

    #[test]
    fn test_parse_labeled_eval() {
        assert_eq!(
            parse_eval_line("Classical evaluation       +0.35 (white side)"),
            Some(35)
        );
        assert_eq!(
            parse_eval_line("Final evaluation -1.02 (white side)"),
            Some(-102)
        );
        // A label with no number must not produce a score
        assert_eq!(parse_eval_line("NNUE evaluation unavailable"), None);
    }

    #[test]
    fn test_parse_checkmate_line() {
        assert_eq!(
            parse_checkmate_line("nocheckmate"),
            Some(EndgameReport::Ongoing)
        );
        assert_eq!(
            parse_checkmate_line("stalemate"),
            Some(EndgameReport::Stalemate)
        );
        assert_eq!(
            parse_checkmate_line("checkmate white"),
            Some(EndgameReport::Checkmate(Color::White))
        );
        assert_eq!(
            parse_checkmate_line("checkmate black"),
            Some(EndgameReport::Checkmate(Color::Black))
        );
        assert_eq!(parse_checkmate_line("info depth 3"), None);
        assert_eq!(parse_checkmate_line("checkmate"), None);
    }
}
