//! Batch scripts of workflow commands.
//!
//! A script is a list of steps read from JSON or TOML. `report` steps create a
//! case and bind it to an alias; later steps name cases by alias. A `race`
//! step fires concurrent claims at the same case.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::engine::WorkflowEngine;
use crate::error::WorkflowError;
use crate::notify::NotificationDispatcher;
use crate::state_machine::{ActorId, CaseId, CaseReport, CaseStatus, Command};
use crate::store::CaseStore;

/// Script bundled with the binary for `rescue-workflow demo`.
pub const DEMO_SCRIPT: &str = include_str!("../demos/rescue_demo.toml");

/// An ordered list of steps, executed one after another by [`run_script`].
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One script entry, selected by its `action` key.
///
/// `case` is an alias bound by an earlier `report` step, or a raw case id.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Files a new case and binds its generated id to `alias`.
    Report { alias: String, report: CaseReport },
    Claim { case: String, responder: ActorId },
    BeginWork { case: String, responder: ActorId },
    StatusUpdate {
        case: String,
        responder: ActorId,
        note: String,
        #[serde(default)]
        photo_urls: Vec<String>,
    },
    Transfer {
        case: String,
        responder: ActorId,
        reason: String,
    },
    Resolve { case: String, responder: ActorId },
    ReporterApprove { case: String, reporter: ActorId },
    ReporterReject {
        case: String,
        reporter: ActorId,
        reason: String,
    },
    /// Every responder claims `case` at the same time, each on its own task.
    /// Produces one outcome per responder.
    Race {
        case: String,
        responders: Vec<ActorId>,
    },
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Step::Report { .. } => "report",
            Step::Claim { .. } => "claim",
            Step::BeginWork { .. } => "begin_work",
            Step::StatusUpdate { .. } => "status_update",
            Step::Transfer { .. } => "transfer",
            Step::Resolve { .. } => "resolve",
            Step::ReporterApprove { .. } => "reporter_approve",
            Step::ReporterReject { .. } => "reporter_reject",
            Step::Race { .. } => "race",
        }
    }

    /// Alias and command for steps that map onto a single workflow command.
    fn into_command(self) -> Option<(String, Command)> {
        let pair = match self {
            Step::Claim { case, responder } => (case, Command::Claim { responder }),
            Step::BeginWork { case, responder } => (case, Command::BeginWork { responder }),
            Step::StatusUpdate {
                case,
                responder,
                note,
                photo_urls,
            } => (
                case,
                Command::StatusUpdate {
                    responder,
                    note,
                    photo_urls,
                },
            ),
            Step::Transfer {
                case,
                responder,
                reason,
            } => (case, Command::Transfer { responder, reason }),
            Step::Resolve { case, responder } => (case, Command::Resolve { responder }),
            Step::ReporterApprove { case, reporter } => {
                (case, Command::ReporterApprove { reporter })
            }
            Step::ReporterReject {
                case,
                reporter,
                reason,
            } => (case, Command::ReporterReject { reporter, reason }),
            Step::Report { .. } | Step::Race { .. } => return None,
        };
        Some(pair)
    }
}

impl Script {
    /// Loads a script, picking the format from the file extension.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path.display()))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)
                .with_context(|| format!("parsing JSON script {}", path.display())),
            Some("toml") => toml::from_str(&contents)
                .with_context(|| format!("parsing TOML script {}", path.display())),
            _ => bail!(
                "unsupported script format for {}: expected .json or .toml",
                path.display()
            ),
        }
    }

    pub fn demo() -> Result<Self> {
        toml::from_str(DEMO_SCRIPT).context("parsing bundled demo script")
    }
}

/// What a step achieved.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSuccess {
    /// Case status after the step.
    pub status: CaseStatus,
    /// Timeline sequence of the event the step appended.
    pub sequence: u64,
    /// Compare-and-swap attempts the engine needed.
    pub attempts: u32,
}

/// Result of one step, or of one claimant within a `race` step.
#[derive(Debug)]
pub struct StepOutcome {
    /// Zero-based position of the step in the script.
    pub index: usize,
    pub action: &'static str,
    pub alias: String,
    pub actor: ActorId,
    pub result: Result<StepSuccess, WorkflowError>,
}

/// Every outcome of a script run plus the alias table it built.
#[derive(Debug, Default)]
pub struct ScriptRun {
    pub outcomes: Vec<StepOutcome>,
    pub aliases: BTreeMap<String, CaseId>,
}

impl ScriptRun {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }
}

/// Runs `script` step by step, calling `on_outcome` as each result arrives.
///
/// Workflow errors are recorded per step and do not stop the run.
pub async fn run_script<S, N, F>(
    engine: Arc<WorkflowEngine<S, N>>,
    script: Script,
    mut on_outcome: F,
) -> Result<ScriptRun>
where
    S: CaseStore + 'static,
    N: NotificationDispatcher + 'static,
    F: FnMut(&StepOutcome),
{
    let mut run = ScriptRun::default();

    for (index, step) in script.steps.into_iter().enumerate() {
        let action = step.action();
        let outcomes = match step {
            Step::Report { alias, report } => {
                let actor = report.reporter_id.clone();
                let result = engine.report_case(report).await.map(|case_id| {
                    run.aliases.insert(alias.clone(), case_id);
                    StepSuccess {
                        status: CaseStatus::Open,
                        sequence: 0,
                        attempts: 1,
                    }
                });
                vec![StepOutcome {
                    index,
                    action,
                    alias,
                    actor,
                    result,
                }]
            }
            Step::Race { case, responders } => {
                let case_id = resolve_alias(&run.aliases, &case);
                let mut handles = Vec::with_capacity(responders.len());
                for responder in responders {
                    let engine = engine.clone();
                    let case_id = case_id.clone();
                    let actor = responder.clone();
                    handles.push((
                        actor,
                        tokio::spawn(async move { engine.claim(&case_id, responder).await }),
                    ));
                }
                let mut outcomes = Vec::with_capacity(handles.len());
                for (actor, handle) in handles {
                    let result = handle.await.context("race claim task failed")?;
                    outcomes.push(StepOutcome {
                        index,
                        action,
                        alias: case.clone(),
                        actor,
                        result: result.map(|c| StepSuccess {
                            status: c.case.status(),
                            sequence: c.event.sequence,
                            attempts: c.attempts,
                        }),
                    });
                }
                outcomes
            }
            other => {
                let Some((alias, command)) = other.into_command() else {
                    continue;
                };
                let actor = command.actor().clone();
                let case_id = resolve_alias(&run.aliases, &alias);
                let result = engine
                    .submit(&case_id, command, None)
                    .await
                    .map(|c| StepSuccess {
                        status: c.case.status(),
                        sequence: c.event.sequence,
                        attempts: c.attempts,
                    });
                vec![StepOutcome {
                    index,
                    action,
                    alias,
                    actor,
                    result,
                }]
            }
        };

        for outcome in outcomes {
            on_outcome(&outcome);
            run.outcomes.push(outcome);
        }
    }

    Ok(run)
}

// Unknown aliases are passed through as raw case ids so scripts can also
// target cases loaded from a snapshot.
fn resolve_alias(aliases: &BTreeMap<String, CaseId>, alias: &str) -> CaseId {
    aliases
        .get(alias)
        .cloned()
        .unwrap_or_else(|| CaseId::from(alias))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineOptions;
    use crate::error::ErrorKind;
    use crate::notify::NoopDispatcher;
    use crate::state_machine::{EventType, event_types};
    use crate::store::InMemoryCaseStore;

    fn engine() -> Arc<WorkflowEngine<InMemoryCaseStore, NoopDispatcher>> {
        Arc::new(WorkflowEngine::new(
            InMemoryCaseStore::new(),
            NoopDispatcher,
            EngineOptions {
                retry_base_delay_ms: 0,
                ..Default::default()
            },
        ))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn demo_script_runs_cleanly() {
        let engine = engine();
        let mut seen = 0;
        let run = run_script(engine.clone(), Script::demo().unwrap(), |_| seen += 1)
            .await
            .unwrap();
        assert_eq!(run.failures(), 0, "{:?}", run.outcomes);
        assert_eq!(seen, run.outcomes.len());
        assert_eq!(run.aliases.len(), 4);

        let cat = engine.get_case(&run.aliases["stray-cat"]).await.unwrap();
        assert_eq!(cat.status(), CaseStatus::Assigned);
        assert_eq!(cat.assigned_helpers(), &[ActorId::from("bruno")]);

        let owl = engine.get_case(&run.aliases["trapped-owl"]).await.unwrap();
        assert_eq!(owl.status(), CaseStatus::Open);
        assert!(owl.assigned_helpers().is_empty());

        let horse = engine.get_case(&run.aliases["horse-on-road"]).await.unwrap();
        assert_eq!(horse.status(), CaseStatus::Assigned);
        assert_eq!(horse.assigned_helpers().len(), 2);
        let timeline = engine.get_timeline(&run.aliases["horse-on-road"]).await.unwrap();
        assert_eq!(
            event_types(&timeline),
            vec![EventType::Created, EventType::Assigned, EventType::Assigned]
        );
    }

    #[tokio::test]
    async fn failed_steps_are_recorded_and_run_continues() {
        let script: Script = serde_json::from_value(serde_json::json!({
            "steps": [
                { "action": "claim", "case": "missing", "responder": "r1" },
                {
                    "action": "report",
                    "alias": "pup",
                    "report": {
                        "reporter_id": "ana",
                        "urgency_level": "low",
                        "animal_type": "dog",
                        "location": { "latitude": 1.0, "longitude": 2.0 },
                        "description": "puppy in a box"
                    }
                },
                { "action": "resolve", "case": "pup", "responder": "r1" },
                { "action": "claim", "case": "pup", "responder": "r1" }
            ]
        }))
        .unwrap();

        let run = run_script(engine(), script, |_| {}).await.unwrap();
        assert_eq!(run.outcomes.len(), 4);
        assert_eq!(run.failures(), 2);
        assert_eq!(
            run.outcomes[0].result.as_ref().unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            run.outcomes[2].result.as_ref().unwrap_err().kind(),
            ErrorKind::IllegalTransition
        );
        let last = run.outcomes[3].result.as_ref().unwrap();
        assert_eq!(last.status, CaseStatus::Assigned);
        assert_eq!(last.sequence, 1);
    }

    #[test]
    fn load_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("steps.json");
        std::fs::write(
            &json,
            r#"{"steps":[{"action":"claim","case":"c-1","responder":"r1"}]}"#,
        )
        .unwrap();
        assert_eq!(Script::load(&json).unwrap().steps.len(), 1);

        let toml_path = dir.path().join("steps.toml");
        std::fs::write(
            &toml_path,
            "[[steps]]\naction = \"resolve\"\ncase = \"c-1\"\nresponder = \"r1\"\n",
        )
        .unwrap();
        let script = Script::load(&toml_path).unwrap();
        assert_eq!(script.steps[0].action(), "resolve");

        let yaml = dir.path().join("steps.yaml");
        std::fs::write(&yaml, "steps: []").unwrap();
        assert!(Script::load(&yaml).is_err());
    }
}
