//! End-to-end exercises of the engine subprocess plumbing against small
//! scripted stand-ins for a real UCI engine.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chess::Color;
use hce_tuner::engine::{EngineHandle, EngineOption, SearchLimit};
use hce_tuner::match_runner::{MatchOutcome, MatchRunner};
use hce_tuner::errors::TunerError;

const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Minimal well-behaved engine: fixed eval, fixed best move.
fn responder_script(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "responder.sh",
        r#"#!/bin/sh
while IFS= read -r line; do
  case "$line" in
    uci) echo "id name responder"; echo "uciok" ;;
    isready) echo "readyok" ;;
    eval) echo "400" ;;
    go*) echo "info depth 1 score cp 40"; echo "bestmove e2e4" ;;
    ischeckmate) echo "nocheckmate" ;;
    quit) exit 0 ;;
  esac
done
"#,
    )
}

#[test]
fn test_handshake_and_full_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let script = responder_script(dir.path());
    let weights = dir.path().join("weights.txt");
    fs::write(&weights, "0").unwrap();

    let mut engine = EngineHandle::spawn(&script, Duration::from_secs(5)).unwrap();
    engine
        .configure(&[
            EngineOption::HashMb(1),
            EngineOption::UseNnue(false),
            EngineOption::WeightFile(weights),
        ])
        .unwrap();

    engine.set_position(Some(START_FEN), &[]).unwrap();
    assert_eq!(engine.evaluate().unwrap(), 400);

    let outcome = engine.search(SearchLimit::Depth(1)).unwrap();
    assert_eq!(outcome.best_move, "e2e4");
    assert!(!outcome.mate);

    assert_eq!(
        engine.terminal_status().unwrap(),
        hce_tuner::engine::EndgameReport::Ongoing
    );

    engine.shutdown().unwrap();
    match engine.evaluate() {
        Err(TunerError::ClosedHandle) => {}
        other => panic!("expected ClosedHandle after shutdown, got {:?}", other),
    }
}

#[test]
fn test_silent_engine_times_out() {
    let dir = tempfile::tempdir().unwrap();
    // Consumes stdin forever, never writes a byte.
    let script = write_script(
        dir.path(),
        "mute.sh",
        "#!/bin/sh\nwhile IFS= read -r line; do :; done\n",
    );

    let started = Instant::now();
    match EngineHandle::spawn(&script, Duration::from_millis(200)) {
        Err(TunerError::Protocol(msg)) => assert!(msg.contains("no response")),
        other => panic!("expected Protocol timeout, got {:?}", other.err()),
    }
    // The read deadline, not a wedged pipe, must bound the wait.
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_bestmove_none_is_protocol_error() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "noneplayer.sh",
        r#"#!/bin/sh
while IFS= read -r line; do
  case "$line" in
    uci) echo "uciok" ;;
    isready) echo "readyok" ;;
    go*) echo "bestmove (none)" ;;
    quit) exit 0 ;;
  esac
done
"#,
    );

    let mut engine = EngineHandle::spawn(&script, Duration::from_secs(5)).unwrap();
    match engine.search(SearchLimit::MoveTime(10)) {
        Err(TunerError::Protocol(msg)) => assert!(msg.contains("no best move")),
        other => panic!("expected Protocol error, got {:?}", other.err()),
    }
    engine.shutdown().unwrap();
}

/// Engine that replays a fixed move list, one move per `go`.
fn scripted_player(dir: &Path, name: &str, moves: &str) -> PathBuf {
    write_script(
        dir,
        name,
        &format!(
            r#"#!/bin/sh
set -- {}
while IFS= read -r line; do
  case "$line" in
    uci) echo "uciok" ;;
    isready) echo "readyok" ;;
    go*) echo "bestmove $1"; shift ;;
    quit) exit 0 ;;
  esac
done
"#,
            moves
        ),
    )
}

#[test]
fn test_match_runner_plays_fools_mate() {
    let dir = tempfile::tempdir().unwrap();
    let white_script = scripted_player(dir.path(), "white.sh", "f2f3 g2g4");
    let black_script = scripted_player(dir.path(), "black.sh", "e7e5 d8h4");

    let mut white = EngineHandle::spawn(&white_script, Duration::from_secs(5)).unwrap();
    let mut black = EngineHandle::spawn(&black_script, Duration::from_secs(5)).unwrap();

    let runner = MatchRunner::new(SearchLimit::Depth(1), 20);
    let (result, fens) = runner.play_traced(&mut white, &mut black, START_FEN).unwrap();

    assert_eq!(result.outcome, MatchOutcome::Checkmate(Color::Black));
    assert_eq!(result.moves, vec!["f2f3", "e7e5", "g2g4", "d8h4"]);
    // One recorded position per searched move; no mate score was ever
    // announced, so none are filtered.
    assert_eq!(fens.len(), 4);
    assert_eq!(fens[0], START_FEN);

    white.shutdown().unwrap();
    black.shutdown().unwrap();
}

#[test]
fn test_illegal_scripted_move_is_contract_violation() {
    let dir = tempfile::tempdir().unwrap();
    let white_script = scripted_player(dir.path(), "white.sh", "e2e5");
    let black_script = scripted_player(dir.path(), "black.sh", "e7e5");

    let mut white = EngineHandle::spawn(&white_script, Duration::from_secs(5)).unwrap();
    let mut black = EngineHandle::spawn(&black_script, Duration::from_secs(5)).unwrap();

    let runner = MatchRunner::new(SearchLimit::Depth(1), 20);
    match runner.play(&mut white, &mut black, START_FEN) {
        Err(TunerError::ContractViolation(msg)) => assert!(msg.contains("illegal")),
        other => panic!("expected ContractViolation, got {:?}", other.err()),
    }
}
