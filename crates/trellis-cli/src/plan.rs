//! Plan - JSON の計画ファイルと、それに対するレポート
//!
//! ```json
//! {
//!   "tasks": [
//!     { "key": "design", "title": "Design schema" },
//!     { "key": "build", "title": "Build API", "status": "in_progress" }
//!   ],
//!   "dependencies": [["design", "build"]]
//! }
//! ```
//!
//! 依存 `[a, b]` は「`b` は `a` を待つ」を意味する。

use std::collections::HashMap;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use tracing::warn;
use trellis_core::{
    CoordinatorBuilder, GraphStatus, ProjectId, Task, TaskId, TaskStatus, TrellisConfig,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    /// `project-<ULID>` or a bare ULID
    #[serde(default)]
    pub project: Option<String>,
    pub tasks: Vec<PlanTask>,
    #[serde(default)]
    pub dependencies: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanTask {
    pub key: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Serialize)]
pub struct PlanReport {
    pub order: Vec<String>,
    pub ready: Vec<String>,
    pub unlinked: Vec<String>,
    pub status: GraphStatus,
    pub rejected: Vec<RejectedDependency>,
}

/// A dependency the graph refused, with the reason.
#[derive(Debug, Serialize)]
pub struct RejectedDependency {
    pub from: String,
    pub to: String,
    pub error: String,
}

/// Load `plan` into a fresh coordinator, mark `done` keys done and report.
pub async fn run(config: TrellisConfig, plan: Plan, done: &[String]) -> anyhow::Result<PlanReport> {
    let coordinator = CoordinatorBuilder::new(config).build()?;
    let project = match &plan.project {
        Some(raw) => raw
            .parse::<ProjectId>()
            .with_context(|| format!("invalid project id {raw:?}"))?,
        None => ProjectId::from_u128(0),
    };

    let mut ids: HashMap<String, TaskId> = HashMap::with_capacity(plan.tasks.len());
    let mut keys: HashMap<TaskId, String> = HashMap::with_capacity(plan.tasks.len());
    for (n, entry) in plan.tasks.iter().enumerate() {
        if ids.contains_key(&entry.key) {
            bail!("duplicate task key {:?}", entry.key);
        }
        // ids follow file order so reports are reproducible
        let id = TaskId::from_u128(n as u128 + 1);
        let title = entry.title.clone().unwrap_or_else(|| entry.key.clone());
        coordinator.insert_task(Task::new(id, project, title)).await?;
        ids.insert(entry.key.clone(), id);
        keys.insert(id, entry.key.clone());
    }

    let mut rejected = Vec::new();
    for (from, to) in &plan.dependencies {
        let outcome = match (ids.get(from), ids.get(to)) {
            (Some(&a), Some(&b)) => coordinator
                .add_dependency(a, b)
                .await
                .map_err(|err| err.to_string()),
            (None, _) => Err(format!("unknown task key {from:?}")),
            (_, None) => Err(format!("unknown task key {to:?}")),
        };
        if let Err(error) = outcome {
            warn!(%from, %to, %error, "dependency rejected");
            rejected.push(RejectedDependency {
                from: from.clone(),
                to: to.clone(),
                error,
            });
        }
    }

    for entry in &plan.tasks {
        if let (Some(status), Some(&id)) = (entry.status, ids.get(&entry.key)) {
            coordinator.set_status(id, status).await?;
        }
    }
    for key in done {
        let Some(&id) = ids.get(key) else {
            bail!("--done names unknown task key {key:?}");
        };
        coordinator.set_status(id, TaskStatus::Done).await?;
    }

    let name = |id: &TaskId| keys.get(id).cloned().unwrap_or_else(|| id.to_string());
    Ok(PlanReport {
        order: coordinator.topological_order().await?.iter().map(name).collect(),
        ready: coordinator.ready_tasks().await.iter().map(name).collect(),
        unlinked: coordinator.unlinked_tasks().await.iter().map(name).collect(),
        status: coordinator.status().await,
        rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Plan {
        serde_json::from_str(raw).unwrap()
    }

    const BOARD: &str = r#"{
        "tasks": [
            { "key": "T1" }, { "key": "T2" }, { "key": "T3" },
            { "key": "T4" }, { "key": "T5" }
        ],
        "dependencies": [["T1", "T2"], ["T2", "T3"], ["T1", "T4"], ["T3", "T1"]]
    }"#;

    #[tokio::test]
    async fn cycle_is_reported_not_fatal() {
        let report = run(TrellisConfig::default(), parse(BOARD), &[]).await.unwrap();

        assert_eq!(report.order, vec!["T1", "T2", "T3", "T4", "T5"]);
        assert_eq!(report.ready, vec!["T1"]);
        assert_eq!(report.unlinked, vec!["T5"]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].from, "T3");
        assert!(report.rejected[0].error.contains("cycle"));
        assert_eq!(report.status.dependencies, 3);
    }

    #[tokio::test]
    async fn done_keys_release_dependents() {
        let report = run(TrellisConfig::default(), parse(BOARD), &["T1".to_string()])
            .await
            .unwrap();
        assert_eq!(report.ready, vec!["T2", "T4"]);
        assert_eq!(report.status.done, 1);
    }

    #[tokio::test]
    async fn unknown_keys() {
        let plan = parse(r#"{ "tasks": [{ "key": "a" }], "dependencies": [["a", "b"]] }"#);
        let report = run(TrellisConfig::default(), plan, &[]).await.unwrap();
        assert!(report.rejected[0].error.contains("\"b\""));

        let plan = parse(r#"{ "tasks": [{ "key": "a" }] }"#);
        assert!(run(TrellisConfig::default(), plan, &["zzz".to_string()]).await.is_err());
    }

    #[tokio::test]
    async fn project_id_is_parsed() {
        let plan = parse(r#"{ "project": "project-01ARZ3NDEKTSV4RRFFQ69G5FAV", "tasks": [] }"#);
        assert!(run(TrellisConfig::default(), plan, &[]).await.is_ok());

        let plan = parse(r#"{ "project": "nope", "tasks": [] }"#);
        assert!(run(TrellisConfig::default(), plan, &[]).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_keys_are_fatal() {
        let plan = parse(r#"{ "tasks": [{ "key": "a" }, { "key": "a" }] }"#);
        assert!(run(TrellisConfig::default(), plan, &[]).await.is_err());
    }
}
