//! Pipeline (spec §2): wires Preprocessor -> IntentExtractor ->
//! SkillGenerator -> CommandPlanner -> Executor -> KnowledgeBase.learn_from_job
//! into a single recording-to-learned-outcome path.

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::browser_driver::Page;
use crate::command_planner::{selector_to_target, Command, CommandPlanner};
use crate::error::Result;
use crate::executor::{self, Executor};
use crate::intent::IntentExtractor;
use crate::knowledge_base::{KnowledgeBase, SelectorOutcome};
use crate::preprocessor::Preprocessor;
use crate::skill_generator::SkillGenerator;
use crate::types::{CanonicalAction, CommandStatus, ExecutionResult, SkillSpec};

/// Output of one end-to-end pipeline run: the execution result plus the
/// generated skill specs, for callers that want to persist or inspect them
/// beyond what `KnowledgeBase` retains.
pub struct PipelineRun {
    pub transcript_title: Option<String>,
    pub actions: Vec<CanonicalAction>,
    pub skills: Vec<SkillSpec>,
    pub result: ExecutionResult,
}

pub struct Pipeline {
    preprocessor: Preprocessor,
    intent_extractor: IntentExtractor,
    skill_generator: SkillGenerator,
    command_planner: CommandPlanner,
    executor: Arc<Executor>,
    knowledge_base: Arc<KnowledgeBase>,
}

impl Pipeline {
    pub fn new(executor: Arc<Executor>, knowledge_base: Arc<KnowledgeBase>) -> Self {
        Self {
            preprocessor: Preprocessor::new(),
            intent_extractor: IntentExtractor::new(),
            skill_generator: SkillGenerator::new(),
            command_planner: CommandPlanner::new(),
            executor,
            knowledge_base,
        }
    }

    /// Run a raw recorder transcript through the full pipeline against an
    /// already-navigated page and persist what was learned.
    pub async fn run_recording(&self, raw_transcript: &serde_json::Value, page: &dyn Page, site: &str, job_id: Uuid) -> Result<PipelineRun> {
        let transcript = self.preprocessor.normalize(raw_transcript)?;
        let actions = self.intent_extractor.extract(&transcript, Some(site));

        let skills: Vec<SkillSpec> = actions.iter().map(|action| self.skill_generator.generate(action, None)).collect();

        let commands: Vec<Command> = actions.iter().flat_map(|action| self.command_planner.plan(action)).collect();

        let started = Instant::now();
        let result = self.executor.execute(page, commands.clone(), site, job_id).await;
        let _ = started.elapsed();

        let outcomes = correlate_outcomes(&commands, &result);
        let overall_success = result.status == crate::types::JobStatus::Success;
        self.knowledge_base
            .learn_from_job(site, &actions, &outcomes, overall_success, &transcript)
            .await;

        Ok(PipelineRun {
            transcript_title: transcript.title.clone(),
            actions,
            skills,
            result,
        })
    }
}

/// Zips planned commands against their execution records to build the
/// selector-outcome list `learn_from_job` needs. Selector healing already
/// records its own original/healed pair live inside the Executor; this
/// correlation additionally captures the plain (unhealed) success/failure
/// of every selector-bearing command so site-pattern/url-pattern learning
/// sees the full picture, not just healed selectors.
fn correlate_outcomes(commands: &[Command], result: &ExecutionResult) -> Vec<SelectorOutcome> {
    commands
        .iter()
        .zip(result.commands.iter())
        .filter_map(|(command, record)| {
            let selector = executor::selector_of(command)?;
            let strategy = selector_to_target(&selector).strategy;
            Some(SelectorOutcome {
                original_selector: selector.clone(),
                healed_selector: selector,
                strategy,
                success: record.status == CommandStatus::Success,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser_driver::{MockElement, MockPage};
    use crate::knowledge_base::FileStorageAdapter;
    use crate::performance_monitor::PerformanceMonitor;
    use crate::selector_healer::SelectorHealer;
    use crate::strategy::StrategyManager;
    use serde_json::json;
    use tempfile::tempdir;

    async fn pipeline() -> Pipeline {
        let dir = tempdir().unwrap();
        let adapter = Arc::new(FileStorageAdapter::new(dir.path().join("kb.json")));
        let kb = Arc::new(KnowledgeBase::new(adapter));
        kb.load().await.unwrap();
        let healer = Arc::new(SelectorHealer::new(kb.clone()));
        let strategy = Arc::new(StrategyManager::new());
        let performance = Arc::new(PerformanceMonitor::new());
        let executor = Arc::new(Executor::new(kb.clone(), healer, strategy, performance));
        Pipeline::new(executor, kb)
    }

    #[tokio::test]
    async fn full_recording_runs_and_learns() {
        let pipeline = pipeline().await;
        let page = MockPage::new();
        page.set_element("#email", MockElement { visible: true, ..Default::default() }).await;

        let transcript = json!({
            "title": "fill email",
            "steps": [
                {"type": "navigate", "url": "https://x.test/login"},
                {"type": "input", "selectors": [["#email"]], "value": "a@b.com"}
            ]
        });

        let run = pipeline.run_recording(&transcript, page.as_ref(), "x.test", Uuid::new_v4()).await.unwrap();
        assert!(!run.actions.is_empty());
        assert!(!run.skills.is_empty());
        assert_eq!(run.result.status, crate::types::JobStatus::Success);
    }
}
