use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use approval_core::{
    build_headless_app, load_approval_config_from_env, run_turn, ActionInbox, ApprovalAction,
    ApprovalEngine, ApprovalTurn, ReachScope, SegmentRegistry, TurnReports,
};
use approval_schema::{decode_script_json, encode_snapshot, ScriptStep};

#[derive(Parser, Debug)]
#[command(author, version, about = "Replays a scripted approval session", long_about = None)]
struct Args {
    /// Segment dataset JSON
    segments: PathBuf,

    /// Action script JSON (list of `{ turn, action }` steps)
    script: PathBuf,

    /// Write the final bincode snapshot to this path
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn load_script(path: &Path) -> Result<Vec<ScriptStep>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut steps = decode_script_json(&contents)
        .with_context(|| format!("parsing action script {}", path.display()))?;
    steps.sort_by_key(|step| step.turn);
    Ok(steps)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = load_approval_config_from_env();
    let registry = SegmentRegistry::from_file(&args.segments)
        .with_context(|| format!("loading segments from {}", args.segments.display()))?;
    let steps = load_script(&args.script)?;

    let engine = Arc::new(ApprovalEngine::new(Arc::new(registry), config));
    let mut app = build_headless_app(Arc::clone(&engine));
    let sender = app.world.resource::<ActionInbox>().sender();
    let last_turn = steps.last().map_or(0, |step| step.turn);

    let mut pending = steps.iter().peekable();
    loop {
        let turn = app.world.resource::<ApprovalTurn>().0;
        if turn > last_turn {
            break;
        }
        while let Some(step) = pending.next_if(|step| step.turn <= turn) {
            match ApprovalAction::from_record(&step.action) {
                Ok(action) => {
                    if let Err(err) = sender.submit(action) {
                        warn!(turn, error = %err, "replay.submit_failed");
                    }
                }
                Err(err) => warn!(turn, error = %err, "replay.action_invalid"),
            }
        }
        run_turn(&mut app);
    }

    if let Some(report) = app.world.resource::<TurnReports>().latest() {
        info!(
            turn = report.turn,
            audit_entries = engine.audit().len(),
            "replay.finished"
        );
    }
    for actor in engine.actor_ids() {
        match engine.approval_summary(actor, &ReachScope::All) {
            Ok(summary) => info!(
                actor = %actor,
                approval = summary.weighted_approval,
                voter_approval = summary.voter_weighted_approval,
                population = summary.population,
                "replay.summary"
            ),
            Err(err) => warn!(actor = %actor, error = %err, "replay.summary_failed"),
        }
    }

    if let Some(path) = args.snapshot {
        let bytes = encode_snapshot(&engine.snapshot(last_turn))
            .context("encoding approval snapshot")?;
        fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "replay.snapshot_written");
    }
    Ok(())
}
