//! Tests for CLI parsing and command execution against a temporary database.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use clap::Parser;
use linetrack::cli::{Cli, Commands, execute, open_recorder};
use linetrack::config::{BackendKind, CliOverrides, load_config};
use linetrack_core::{CycleStore, EfficiencyAnalyzer, StageId};
use std::path::{Path, PathBuf};

fn args(db: &Path, rest: &[&str]) -> Vec<String> {
    let mut args = vec![
        "linetrack".to_string(),
        "--quiet".to_string(),
        "--config".to_string(),
        db.with_extension("toml").to_string_lossy().into_owned(),
        "-D".to_string(),
        db.to_string_lossy().into_owned(),
    ];
    args.extend(rest.iter().map(|s| (*s).to_string()));
    args
}

async fn run(db: &Path, rest: &[&str]) -> Result<(), linetrack_core::LineError> {
    execute(Cli::try_parse_from(args(db, rest)).unwrap()).await
}

// =============================================================================
// PARSING
// =============================================================================

#[test]
fn test_parse_run_flags() {
    let cli = Cli::try_parse_from(["linetrack", "run", "--realtime", "--keep"]).unwrap();
    match cli.command {
        Some(Commands::Run { realtime, keep }) => assert!(realtime && keep),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_parse_report_filters() {
    let cli = Cli::try_parse_from(["linetrack", "report", "--stage", "2", "--since", "1500"]).unwrap();
    match cli.command {
        Some(Commands::Report { stage, since }) => {
            assert_eq!(stage, Some(2));
            assert_eq!(since, Some(1500));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_parse_monitor_requires_stage() {
    assert!(Cli::try_parse_from(["linetrack", "monitor"]).is_err());
    let cli = Cli::try_parse_from(["linetrack", "monitor", "-s", "0", "-i", "events.jsonl"]).unwrap();
    match cli.command {
        Some(Commands::Monitor { stage, input }) => {
            assert_eq!(stage, 0);
            assert_eq!(input, Some(PathBuf::from("events.jsonl")));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_parse_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["linetrack", "status", "-B", "memory", "--json-mode"]).unwrap();
    assert_eq!(cli.backend, Some(BackendKind::Memory));
    assert!(cli.json_mode);
    assert!(matches!(cli.command, Some(Commands::Status)));
}

#[test]
fn test_no_subcommand_is_allowed() {
    let cli = Cli::try_parse_from(["linetrack"]).unwrap();
    assert!(cli.command.is_none());
    assert_eq!(cli.config, PathBuf::from("linetrack.toml"));
}

#[test]
fn test_unknown_backend_rejected() {
    assert!(Cli::try_parse_from(["linetrack", "-B", "sqlite", "status"]).is_err());
}

// =============================================================================
// EXECUTION
// =============================================================================

#[tokio::test]
async fn test_init_refuses_existing_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("line.redb");

    run(&db, &["init"]).await.unwrap();
    assert!(db.exists());
    assert!(run(&db, &["init"]).await.is_err());
    run(&db, &["init", "--force"]).await.unwrap();
}

#[tokio::test]
async fn test_run_then_report_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("line.redb");

    run(&db, &["init"]).await.unwrap();
    run(&db, &["run"]).await.unwrap();

    let config = load_config(
        &db.with_extension("toml"),
        &CliOverrides {
            database: Some(db.clone()),
            backend: None,
        },
    )
    .unwrap();

    {
        let recorder = open_recorder(&config.storage).unwrap();
        assert_eq!(recorder.stages().unwrap().len(), 3);
        assert_eq!(recorder.record_count(None).unwrap(), 15);

        // Default line: three ideal 1 s stages, five items.
        let since = recorder.run_start().unwrap().unwrap();
        let report = EfficiencyAnalyzer::new(&recorder)
            .analyze(StageId(2), since)
            .unwrap();
        assert_eq!(report.cycle_count, 5);
        assert!((report.cycle_efficiency.unwrap() - 100.0).abs() < 1e-9);
    }

    run(&db, &["report"]).await.unwrap();
    run(&db, &["--json-mode", "report", "--stage", "1"]).await.unwrap();
    run(&db, &["status"]).await.unwrap();

    run(&db, &["clear", "--stage", "0"]).await.unwrap();
    {
        let recorder = open_recorder(&config.storage).unwrap();
        assert_eq!(recorder.record_count(Some(StageId(0))).unwrap(), 0);
        assert_eq!(recorder.record_count(None).unwrap(), 10);
    }

    run(&db, &["clear"]).await.unwrap();
    let recorder = open_recorder(&config.storage).unwrap();
    assert_eq!(recorder.record_count(None).unwrap(), 0);
}

#[tokio::test]
async fn test_keep_accumulates_records() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("line.redb");

    run(&db, &["run"]).await.unwrap();
    run(&db, &["run", "--keep"]).await.unwrap();

    let config = load_config(
        &db.with_extension("toml"),
        &CliOverrides {
            database: Some(db.clone()),
            backend: None,
        },
    )
    .unwrap();
    let recorder = open_recorder(&config.storage).unwrap();
    assert_eq!(recorder.record_count(None).unwrap(), 30);
}

#[tokio::test]
async fn test_report_unknown_stage_fails() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("line.redb");

    let result = run(&db, &["report", "--stage", "9"]).await;
    assert!(matches!(
        result,
        Err(linetrack_core::LineError::UnknownStage(StageId(9)))
    ));
}

#[tokio::test]
async fn test_memory_backend_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("line.redb");

    run(&db, &["-B", "memory", "run"]).await.unwrap();
    run(&db, &["-B", "memory", "status"]).await.unwrap();
    assert!(!db.exists());
}

#[tokio::test]
async fn test_config_file_shapes_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("line.redb");
    std::fs::write(
        db.with_extension("toml"),
        "[line]\nitems = 2\n\n[[stages]]\nideal_cycle_time = 0.5\n",
    )
    .unwrap();

    run(&db, &["run"]).await.unwrap();

    let config = load_config(
        &db.with_extension("toml"),
        &CliOverrides {
            database: Some(db.clone()),
            backend: None,
        },
    )
    .unwrap();
    let recorder = open_recorder(&config.storage).unwrap();
    assert_eq!(recorder.stages().unwrap().len(), 1);
    assert_eq!(recorder.record_count(None).unwrap(), 2);
}

#[tokio::test]
async fn test_monitor_command_records_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("line.redb");
    let events = dir.path().join("events.jsonl");
    std::fs::write(
        &events,
        "{\"channel\":\"enter\",\"value\":true,\"timestamp\":1000}\n\
         {\"channel\":\"exit\",\"value\":true,\"timestamp\":1800}\n",
    )
    .unwrap();

    let input = events.to_string_lossy().into_owned();

    // Stage 1 is not registered yet; its definition comes from the default line.
    run(&db, &["monitor", "--stage", "1", "--input", input.as_str()])
        .await
        .unwrap();

    let config = load_config(
        &db.with_extension("toml"),
        &CliOverrides {
            database: Some(db.clone()),
            backend: None,
        },
    )
    .unwrap();
    let recorder = open_recorder(&config.storage).unwrap();
    let stage = recorder.stage(StageId(1)).unwrap().unwrap();
    assert!((stage.ideal_cycle_time - 1.0).abs() < 1e-12);
    assert_eq!(recorder.record_count(Some(StageId(1))).unwrap(), 1);
}
