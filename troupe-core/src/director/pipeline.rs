//! The directed round pipeline.
//!
//! Four strictly sequential stages per round: plan (writer sets a plot
//! goal), assign (director casts speakers), perform (each cast
//! character speaks once), review (critic gates quality, with a
//! bounded perform-retry budget). Any collaborator failure aborts the
//! pipeline; the session then degrades the round to the single-pass
//! fallback.

use super::plan::{DirectorPlan, PlotGoal};
use super::review::ReviewVerdict;
use crate::character::{describe_roster, Character};
use crate::llm::{AgentProvider, GenerationError};
use crate::memory::MemoryStore;
use crate::message::Message;
use crate::retrieval::HybridRetriever;
use thiserror::Error;
use tracing::{debug, warn};

/// Sentinel for a deliberate abstention, matched case-insensitively
/// within the opening characters of a reply.
const ABSTAIN_SENTINEL: &str = "PASS";

/// How many opening characters of a reply are checked for the sentinel.
const ABSTAIN_WINDOW: usize = 10;

/// Role preambles, one per pipeline role.
const WRITER_PREAMBLE: &str = include_str!("prompts/writer.txt");
const DIRECTOR_PREAMBLE: &str = include_str!("prompts/director.txt");
const REVIEWER_PREAMBLE: &str = include_str!("prompts/reviewer.txt");
const CHARACTER_PREAMBLE: &str = include_str!("prompts/character.txt");

/// A collaborator failure that aborted a directed round.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    /// Which stage was running when the collaborator failed.
    pub stage: &'static str,
    /// The underlying generation failure.
    #[source]
    pub source: GenerationError,
}

/// One accepted line of dialogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    /// The character who spoke.
    pub speaker: String,
    /// What they said.
    pub content: String,
}

/// One character's contribution to a perform pass.
#[derive(Debug, Clone)]
pub enum Performance {
    /// The character spoke a line.
    Spoken(Utterance),
    /// The character deliberately stayed silent.
    Abstained {
        /// The silent character.
        speaker: String,
    },
}

/// Tunables for the directed pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Perform retries allowed before a review verdict is forced.
    pub max_retries: usize,
    /// Recency window size for per-character memory retrieval.
    pub recent_k: usize,
    /// Semantic top-k for per-character memory retrieval.
    pub relevant_k: usize,
    /// Shared-history lines handed to the writer and director.
    pub history_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            recent_k: 10,
            relevant_k: 5,
            history_window: 10,
        }
    }
}

impl PipelineConfig {
    /// Set the perform-retry budget.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the retrieval window sizes.
    pub fn with_retrieval(mut self, recent_k: usize, relevant_k: usize) -> Self {
        self.recent_k = recent_k;
        self.relevant_k = relevant_k;
        self
    }
}

/// Borrowed view of session state for one round.
#[derive(Debug, Clone, Copy)]
pub struct RoundContext<'a> {
    /// Scene description.
    pub scene: &'a str,
    /// Full character roster, for planning context.
    pub roster: &'a [Character],
    /// Characters eligible to speak this round.
    pub candidates: &'a [Character],
    /// What the user just said, if anything.
    pub user_input: Option<&'a str>,
}

/// Product of a completed directed round.
#[derive(Debug)]
pub struct DirectedRound {
    /// The writer's goal for the round.
    pub plot_goal: PlotGoal,
    /// The director's casting plan.
    pub plan: DirectorPlan,
    /// What each cast character did.
    pub performances: Vec<Performance>,
    /// The reviewer's final verdict.
    pub review: ReviewVerdict,
    /// Perform retries executed before the verdict.
    pub retry_count: usize,
}

/// Drives the plan/assign/perform/review cycle.
#[derive(Debug, Clone, Default)]
pub struct DirectorPipeline {
    config: PipelineConfig,
}

impl DirectorPipeline {
    /// Create a pipeline with the given tunables.
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// The pipeline's tunables.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one directed round.
    ///
    /// Returns an error only for collaborator failures; malformed
    /// plan or review payloads resolve to their default variants
    /// instead.
    pub async fn run_round(
        &self,
        agent: &dyn AgentProvider,
        store: &MemoryStore,
        retriever: &mut HybridRetriever,
        ctx: &RoundContext<'_>,
    ) -> Result<DirectedRound, PipelineError> {
        let plot_goal = self.plan(agent, store, ctx).await?;
        debug!(goal = %plot_goal, "writer set the plot goal");

        let plan = self.assign(agent, store, ctx, &plot_goal).await?;

        let mut retry_count = 0;
        loop {
            let performances = self
                .perform(agent, store, retriever, ctx, &plot_goal, &plan)
                .await?;
            let review = self.review(agent, ctx, &plot_goal, &plan, &performances).await?;

            if review.passed() {
                return Ok(DirectedRound {
                    plot_goal,
                    plan,
                    performances,
                    review,
                    retry_count,
                });
            }
            if retry_count >= self.config.max_retries {
                warn!(
                    retries = retry_count,
                    "review retry budget exhausted; keeping the last round"
                );
                return Ok(DirectedRound {
                    plot_goal,
                    plan,
                    performances,
                    review: ReviewVerdict::Forced,
                    retry_count,
                });
            }
            retry_count += 1;
            debug!(
                retry = retry_count,
                feedback = review.feedback().unwrap_or(""),
                "review rejected the round; performing again"
            );
        }
    }

    async fn plan(
        &self,
        agent: &dyn AgentProvider,
        store: &MemoryStore,
        ctx: &RoundContext<'_>,
    ) -> Result<PlotGoal, PipelineError> {
        let instructions = format!(
            "{}\n\nDesign the goal for the next beat of this conversation. \
             Reply with one or two sentences describing what should happen.",
            scene_context(ctx)
        );
        let reply = agent
            .generate(
                WRITER_PREAMBLE,
                &instructions,
                store.recent_shared(self.config.history_window),
            )
            .await
            .map_err(|source| PipelineError {
                stage: "plan",
                source,
            })?;
        Ok(PlotGoal(reply.trim().to_string()))
    }

    async fn assign(
        &self,
        agent: &dyn AgentProvider,
        store: &MemoryStore,
        ctx: &RoundContext<'_>,
        plot_goal: &PlotGoal,
    ) -> Result<DirectorPlan, PipelineError> {
        let instructions = format!(
            "{}\n\nEligible speakers this round: {}\n\
             Plot goal for this round: {}\n\n\
             Cast the round and direct each chosen speaker.",
            scene_context(ctx),
            name_list(ctx.candidates),
            plot_goal
        );
        let reply = agent
            .generate(
                DIRECTOR_PREAMBLE,
                &instructions,
                store.recent_shared(self.config.history_window),
            )
            .await
            .map_err(|source| PipelineError {
                stage: "assign",
                source,
            })?;
        Ok(DirectorPlan::parse(&reply))
    }

    async fn perform(
        &self,
        agent: &dyn AgentProvider,
        store: &MemoryStore,
        retriever: &mut HybridRetriever,
        ctx: &RoundContext<'_>,
        plot_goal: &PlotGoal,
        plan: &DirectorPlan,
    ) -> Result<Vec<Performance>, PipelineError> {
        let cast = plan.cast(ctx.candidates);
        let query = ctx.user_input.unwrap_or_else(|| plot_goal.as_str());

        let mut performances = Vec::with_capacity(cast.len());
        for character in cast {
            let memory: Vec<Message> = retriever
                .hybrid(
                    store,
                    &character.name,
                    query,
                    self.config.recent_k,
                    self.config.relevant_k,
                )
                .await
                .into_iter()
                .cloned()
                .collect();

            let mut instructions = format!(
                "Director's instruction: {}",
                plan.instruction_for(&character.name)
            );
            if let Some(line) = ctx.user_input {
                instructions.push_str(&format!("\nThe user just said: {line}"));
            }
            instructions.push_str("\n\nSpeak your next line.");

            let reply = agent
                .generate(&character_role(ctx.scene, character), &instructions, &memory)
                .await
                .map_err(|source| PipelineError {
                    stage: "perform",
                    source,
                })?;
            performances.push(classify_reply(&character.name, &reply));
        }
        Ok(performances)
    }

    async fn review(
        &self,
        agent: &dyn AgentProvider,
        ctx: &RoundContext<'_>,
        plot_goal: &PlotGoal,
        plan: &DirectorPlan,
        performances: &[Performance],
    ) -> Result<ReviewVerdict, PipelineError> {
        let instructions = format!(
            "{}\n\nPlot goal: {}\nCasting: {}\n\nDialogue produced this round:\n{}\n\n\
             Judge this round.",
            scene_context(ctx),
            plot_goal,
            describe_plan(plan),
            describe_performances(performances)
        );
        let reply = agent
            .generate(REVIEWER_PREAMBLE, &instructions, &[])
            .await
            .map_err(|source| PipelineError {
                stage: "review",
                source,
            })?;
        Ok(ReviewVerdict::parse(&reply))
    }
}

/// Role context for one character: shared preamble plus persona.
pub(crate) fn character_role(scene: &str, character: &Character) -> String {
    format!(
        "{}\n\nScene: {}\nYou are {}. Personality: {}",
        CHARACTER_PREAMBLE.trim(),
        scene,
        character.name,
        character.personality
    )
}

/// Scene and roster context shared by the management roles.
fn scene_context(ctx: &RoundContext<'_>) -> String {
    let mut context = format!("Scene: {}\nCharacters:\n{}", ctx.scene, describe_roster(ctx.roster));
    if let Some(line) = ctx.user_input {
        context.push_str(&format!("\n\nThe user just said: {line}"));
    }
    context
}

fn name_list(characters: &[Character]) -> String {
    characters
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_plan(plan: &DirectorPlan) -> String {
    match plan {
        DirectorPlan::Parsed { selected, .. } => selected.join(", "),
        DirectorPlan::Default => "all eligible speakers (default casting)".to_string(),
    }
}

fn describe_performances(performances: &[Performance]) -> String {
    if performances.is_empty() {
        return "(silence)".to_string();
    }
    performances
        .iter()
        .map(|performance| match performance {
            Performance::Spoken(utterance) => {
                format!("{}: {}", utterance.speaker, utterance.content)
            }
            Performance::Abstained { speaker } => format!("({speaker} stayed silent)"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Detect a deliberate abstention in raw model output.
///
/// Case-insensitive: the sentinel anywhere in the first
/// [`ABSTAIN_WINDOW`] characters of the trimmed reply counts.
pub(crate) fn is_abstention(reply: &str) -> bool {
    let window: String = reply
        .trim()
        .chars()
        .take(ABSTAIN_WINDOW)
        .collect::<String>()
        .to_uppercase();
    window.contains(ABSTAIN_SENTINEL)
}

/// Turn raw model output into a performance.
///
/// Empty replies count as silence rather than empty lines.
pub(crate) fn classify_reply(speaker: &str, reply: &str) -> Performance {
    let content = reply.trim();
    if content.is_empty() || is_abstention(content) {
        Performance::Abstained {
            speaker: speaker.to_string(),
        }
    } else {
        Performance::Spoken(Utterance {
            speaker: speaker.to_string(),
            content: content.to_string(),
        })
    }
}
