//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::{AppConfig, BackendKind, StorageConfig};
use crate::monitor::{EventSource, ctrl_c_shutdown, format_update, run_monitor};
use linetrack_core::{
    ClearScope, CycleStore, CycleTimeRecorder, EfficiencyAnalyzer, EfficiencyReport, LineError,
    MachineMonitor, RateEstimator, RunSummary, SimulatedClock, Stage, StageId, StageScheduler,
    Timestamp, WallClock, epoch_millis, render_all, render_text,
};
use std::path::PathBuf;

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database and register the configured stages.
pub fn cmd_init(config: &AppConfig, force: bool) -> Result<(), LineError> {
    let storage = &config.storage;

    if storage.backend == BackendKind::Memory {
        println!("Memory backend selected; nothing to initialize.");
        return Ok(());
    }

    if storage.database.exists() {
        if !force {
            return Err(LineError::StorageError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&storage.database).map_err(|e| {
            LineError::IoError(format!(
                "Cannot remove {}: {}",
                storage.database.display(),
                e
            ))
        })?;
    }

    let mut recorder = open_recorder(storage)?;
    let stages = config.line.stage_definitions();
    recorder.register_stages(&stages)?;

    println!(
        "Initialized new redb database at {:?} with {} stages",
        storage.database,
        stages.len()
    );
    Ok(())
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Run the configured items through the line, then report on the run.
pub async fn cmd_run(
    config: &AppConfig,
    json_mode: bool,
    realtime: bool,
    keep: bool,
) -> Result<(), LineError> {
    let mut recorder = open_recorder(&config.storage)?;
    recorder.register_stages(&config.line.stage_definitions())?;

    let start = epoch_millis();
    if keep {
        recorder.set_run_start(start)?;
    } else {
        recorder.start_run(ClearScope::All, start)?;
    }

    let items = config.line.items;
    let (recorder, summary) = if realtime {
        let mut scheduler = StageScheduler::from_config(&config.line, WallClock)?;
        let (recorder, result) = tokio::task::spawn_blocking(move || {
            let mut recorder = recorder;
            let result = scheduler.run(&mut recorder, items);
            (recorder, result)
        })
        .await
        .map_err(|e| LineError::IoError(format!("run task failed: {e}")))?;
        (recorder, result?)
    } else {
        let mut scheduler =
            StageScheduler::from_config(&config.line, SimulatedClock::starting_at(start))?;
        let summary = scheduler.run(&mut recorder, items)?;
        (recorder, summary)
    };

    let reports = EfficiencyAnalyzer::new(&recorder).analyze_all(summary.started_at)?;
    print_run(&summary, &reports, json_mode);
    Ok(())
}

fn print_run(summary: &RunSummary, reports: &[EfficiencyReport], json_mode: bool) {
    if json_mode {
        let output = serde_json::json!({
            "run": summary,
            "reports": reports,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return;
    }

    println!("Line Run");
    println!("========");
    println!("Started:  {}", summary.started_at);
    println!("Finished: {}", summary.finished_at);
    println!("Cycles:   {}", summary.cycles);
    println!();
    println!("{}", render_all(reports));
}

// =============================================================================
// REPORT COMMAND
// =============================================================================

/// Print efficiency reports for recorded cycles.
pub fn cmd_report(
    config: &AppConfig,
    json_mode: bool,
    stage: Option<u32>,
    since: Option<Timestamp>,
) -> Result<(), LineError> {
    let recorder = open_recorder(&config.storage)?;
    let since = match since {
        Some(since) => since,
        None => recorder.run_start()?.unwrap_or(0),
    };

    let analyzer = EfficiencyAnalyzer::new(&recorder);
    let reports = match stage {
        Some(id) => {
            let stage = resolve_stage(&recorder, config, StageId(id))?;
            vec![analyzer.analyze_stage(&stage, since)?]
        }
        None => known_stages(&recorder, config)?
            .iter()
            .map(|stage| analyzer.analyze_stage(stage, since))
            .collect::<Result<Vec<_>, _>>()?,
    };

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&reports).unwrap_or_default()
        );
        return Ok(());
    }

    match reports.as_slice() {
        [single] => println!("{}", render_text(single)),
        all => println!("{}", render_all(all)),
    }
    Ok(())
}

// =============================================================================
// MONITOR COMMAND
// =============================================================================

/// Monitor a stage from JSON-lines sensor events until input ends or Ctrl-C.
pub async fn cmd_monitor(
    config: &AppConfig,
    json_mode: bool,
    stage: u32,
    input: Option<PathBuf>,
) -> Result<(), LineError> {
    let stage_id = StageId(stage);
    let mut recorder = open_recorder(&config.storage)?;
    let definition = resolve_stage(&recorder, config, stage_id)?;
    recorder.register_stage(definition)?;

    let mut source = input.map_or(EventSource::Stdin, EventSource::File);
    let monitor_config = &config.line.monitor;
    let mut monitor = MachineMonitor::new(stage_id, monitor_config);
    let shutdown = ctrl_c_shutdown();

    let stats = run_monitor(
        &mut monitor,
        &mut recorder,
        &mut source,
        monitor_config,
        shutdown,
        |update| {
            if json_mode {
                println!("{}", serde_json::to_string(update).unwrap_or_default());
            } else {
                println!("{}", format_update(update));
            }
        },
    )
    .await?;

    if json_mode {
        let output = serde_json::json!({
            "stage_id": stage_id,
            "source": source.to_string(),
            "stats": stats,
            "dropped_events": monitor.dropped_events(),
            "input_rate": monitor.entry().current_rate(),
            "output_rate": monitor.exit().current_rate(),
        });
        println!("{}", serde_json::to_string(&output).unwrap_or_default());
        return Ok(());
    }

    println!();
    println!("Monitor Summary");
    println!("===============");
    println!("Source:          {}", source);
    println!("Lines:           {}", stats.lines);
    println!("Unparsable:      {}", stats.unparsable);
    println!("Dropped events:  {}", monitor.dropped_events());
    println!("Updates:         {}", stats.updates);
    println!("Cycles recorded: {}", stats.cycles_recorded);
    println!("Reconnects:      {}", stats.reconnects);
    println!("Input rate:      {}", describe_rate(monitor.entry()));
    println!("Output rate:     {}", describe_rate(monitor.exit()));
    Ok(())
}

// =============================================================================
// CLEAR COMMAND
// =============================================================================

/// Delete recorded cycles for one stage or the whole line.
pub fn cmd_clear(config: &AppConfig, json_mode: bool, stage: Option<u32>) -> Result<(), LineError> {
    let mut recorder = open_recorder(&config.storage)?;
    let scope = stage.map_or(ClearScope::All, |id| ClearScope::Stage(StageId(id)));

    let removed = recorder.clear_run(scope)?;
    if recorder.is_persistent() {
        recorder.compact()?;
    }

    if json_mode {
        let output = serde_json::json!({
            "stage_id": stage,
            "removed": removed,
        });
        println!("{}", serde_json::to_string(&output).unwrap_or_default());
        return Ok(());
    }

    match stage {
        Some(id) => println!("Removed {} records of stage {}", removed, id),
        None => println!("Removed {} records", removed),
    }
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show registered stages and record counts.
pub fn cmd_status(config: &AppConfig, json_mode: bool) -> Result<(), LineError> {
    let recorder = open_recorder(&config.storage)?;
    let stages = recorder.stages()?;
    let total = recorder.record_count(None)?;
    let run_start = recorder.run_start()?;

    let mut rows = Vec::with_capacity(stages.len());
    for stage in &stages {
        rows.push((*stage, recorder.record_count(Some(stage.id))?));
    }

    if json_mode {
        let stage_rows: Vec<_> = rows
            .iter()
            .map(|(stage, count)| {
                serde_json::json!({
                    "stage_id": stage.id,
                    "ideal_cycle_time": stage.ideal_cycle_time,
                    "records": count,
                })
            })
            .collect();
        let output = serde_json::json!({
            "database": config.storage.database.to_string_lossy(),
            "backend": config.storage.backend.to_string(),
            "run_start": run_start,
            "record_count": total,
            "stages": stage_rows,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("linetrack Status");
    println!("================");
    println!("Database:  {:?}", config.storage.database);
    println!("Backend:   {}", config.storage.backend);
    match run_start {
        Some(start) => println!("Run start: {}", start),
        None => println!("Run start: none"),
    }
    println!("Records:   {}", total);
    println!();
    if rows.is_empty() {
        println!("No stages registered. Run `linetrack init` first.");
    }
    for (stage, count) in rows {
        println!(
            "  stage {}: ideal {:.3} s, {} records",
            stage.id, stage.ideal_cycle_time, count
        );
    }
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open a recorder over the configured backend.
pub fn open_recorder(storage: &StorageConfig) -> Result<CycleTimeRecorder, LineError> {
    match storage.backend {
        BackendKind::Redb => CycleTimeRecorder::with_redb(&storage.database),
        BackendKind::Memory => Ok(CycleTimeRecorder::new()),
    }
}

/// Registered stage `id`, falling back to the configured line.
fn resolve_stage(
    recorder: &CycleTimeRecorder,
    config: &AppConfig,
    id: StageId,
) -> Result<Stage, LineError> {
    match recorder.require_stage(id) {
        Err(LineError::UnknownStage(_)) => {
            let spec = config.line.stage_spec(id)?;
            Ok(Stage::new(id, spec.ideal_cycle_time))
        }
        other => other,
    }
}

/// Final rate of an estimator, or why there is none.
fn describe_rate(estimator: &RateEstimator) -> String {
    match estimator.rate() {
        Ok(rate) => format!("{rate:.4}/s"),
        Err(e) => e.to_string(),
    }
}

/// Registered stages, or the configured ones when nothing is registered yet.
fn known_stages(recorder: &CycleTimeRecorder, config: &AppConfig) -> Result<Vec<Stage>, LineError> {
    let stages = recorder.stages()?;
    if stages.is_empty() {
        Ok(config.line.stage_definitions())
    } else {
        Ok(stages)
    }
}
