//! Per-stage results of a backup run

use crate::utils::timestamp::RunStamp;
use serde::Serialize;
use std::fmt;

/// Steps of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    NotifyStart,
    MaintenanceOn,
    DumpDatabases,
    Archive,
    Transfer,
    PruneRemote,
    ClearLocalDirs,
    MirrorSync,
    MaintenanceOff,
    NotifyComplete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::NotifyStart => "notify start",
            Stage::MaintenanceOn => "maintenance mode on",
            Stage::DumpDatabases => "dump databases",
            Stage::Archive => "archive",
            Stage::Transfer => "transfer",
            Stage::PruneRemote => "prune remote",
            Stage::ClearLocalDirs => "clear local directories",
            Stage::MirrorSync => "mirror sync",
            Stage::MaintenanceOff => "maintenance mode off",
            Stage::NotifyComplete => "notify complete",
        };
        f.write_str(name)
    }
}

/// What happened in a stage that did not abort the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    Succeeded,
    Skipped { reason: String },
    /// The stage failed and the run carried on
    Recovered { cause: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    #[serde(flatten)]
    pub outcome: StageOutcome,
}

/// Ordered record of every stage a run went through
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub server: String,
    pub stamp: RunStamp,
    pub stages: Vec<StageRecord>,
}

impl RunReport {
    pub fn new(server: &str, stamp: RunStamp) -> Self {
        Self {
            server: server.to_string(),
            stamp,
            stages: Vec::new(),
        }
    }

    pub fn record(&mut self, stage: Stage, outcome: StageOutcome) {
        self.stages.push(StageRecord { stage, outcome });
    }

    pub fn succeeded(&mut self, stage: Stage) {
        self.record(stage, StageOutcome::Succeeded);
    }

    pub fn skipped(&mut self, stage: Stage, reason: impl Into<String>) {
        self.record(stage, StageOutcome::Skipped { reason: reason.into() });
    }

    pub fn recovered(&mut self, stage: Stage, cause: impl Into<String>) {
        self.record(stage, StageOutcome::Recovered { cause: cause.into() });
    }

    /// Outcome of the first record for `stage`
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages.iter().find(|r| r.stage == stage).map(|r| &r.outcome)
    }

    /// Stages in the order they were recorded
    pub fn stage_order(&self) -> Vec<Stage> {
        self.stages.iter().map(|r| r.stage).collect()
    }

    /// Records of stages that failed and were recovered from
    pub fn failures(&self) -> Vec<&StageRecord> {
        self.stages
            .iter()
            .filter(|r| matches!(r.outcome, StageOutcome::Recovered { .. }))
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failures().is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
