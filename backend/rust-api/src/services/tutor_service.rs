//! Live tutoring orchestration.
//!
//! Owns every open [`Attempt`] in memory, enforces one in-flight call per
//! attempt and routes terminal transitions to finalization and the mastery
//! check. Reads (views, diagnostics) go through a published snapshot and never
//! wait on an in-flight evaluation.
//!
//! Lock order is attempt machine, then registry. Starting an attempt takes the
//! session gate before either and nothing else takes the gate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::{Result, TutorError};
use crate::metrics::{ATTEMPTS_ACTIVE, ATTEMPTS_FINALIZED_TOTAL, MASTERY_CHECKS_TOTAL};
use crate::models::{
    AttemptPhase, AttemptRecord, AttemptView, DiagnosticReport, MasteryOffer, Problem,
    ProblemFilter, Role, TurnOutcome, TurnRecord,
};
use crate::services::attempt_machine::{Attempt, Transition};
use crate::services::diagnostic::DiagnosticComposer;
use crate::services::evaluation_gateway::EvaluationGateway;
use crate::services::mastery::MasteryCheckOrchestrator;
use crate::services::persistence::{PersistenceWriter, StoreCommand};
use crate::services::problem_repository::ProblemRepository;
use crate::services::Collaborators;

struct LiveAttempt {
    id: Uuid,
    machine: Mutex<Attempt>,
    snapshot: StdRwLock<AttemptView>,
    touched: StdMutex<Instant>,
}

impl LiveAttempt {
    fn new(attempt: Attempt) -> Self {
        let view = attempt.view();
        Self {
            id: attempt.id(),
            machine: Mutex::new(attempt),
            snapshot: StdRwLock::new(view),
            touched: StdMutex::new(Instant::now()),
        }
    }

    fn publish(&self, attempt: &Attempt) {
        let mut snapshot = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *snapshot = attempt.view();
        *self
            .touched
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Instant::now();
    }

    fn view(&self) -> AttemptView {
        let mut view = self
            .snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if !view.phase.is_terminal() && self.machine.try_lock().is_err() {
            view.phase = AttemptPhase::AwaitingEvaluation;
            view.show_solution_button = false;
        }
        view
    }

    fn idle_for(&self) -> Duration {
        self.touched
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .elapsed()
    }
}

#[derive(Default)]
struct Session {
    gate: Arc<Mutex<()>>,
    attempts: Vec<Uuid>,
}

impl Session {
    /// Only clones taken under the registry write lock hold the gate.
    fn is_vacant(&self) -> bool {
        self.attempts.is_empty() && Arc::strong_count(&self.gate) == 1
    }
}

#[derive(Default)]
struct Registry {
    attempts: HashMap<Uuid, Arc<LiveAttempt>>,
    sessions: HashMap<String, Session>,
}

/// How long attempts stay in memory once nothing happens to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Terminal attempts are released this long after their last change.
    pub closed_retention: Duration,
    /// Open attempts untouched this long are abandoned.
    pub idle_timeout: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            closed_retention: Duration::from_secs(15 * 60),
            idle_timeout: Duration::from_secs(60 * 60),
        }
    }
}

pub struct TutorService {
    problems: Arc<dyn ProblemRepository>,
    gateway: EvaluationGateway,
    mastery: MasteryCheckOrchestrator,
    diagnostics: DiagnosticComposer,
    writer: PersistenceWriter,
    registry: RwLock<Registry>,
    retention: RetentionPolicy,
}

impl TutorService {
    /// Builds the service. With `write_async` a persistence worker is spawned,
    /// so this must then run inside a Tokio runtime.
    pub fn new(collaborators: Collaborators, write_async: bool) -> Self {
        let writer = if write_async {
            PersistenceWriter::spawn(collaborators.store)
        } else {
            PersistenceWriter::inline(collaborators.store)
        };

        Self {
            problems: collaborators.problems,
            gateway: EvaluationGateway::new(collaborators.evaluator),
            mastery: MasteryCheckOrchestrator::new(collaborators.generator),
            diagnostics: DiagnosticComposer::new(collaborators.diagnostics),
            writer,
            registry: RwLock::new(Registry::default()),
            retention: RetentionPolicy::default(),
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Presents `problem_id` to the learner. Any attempt still open in the
    /// same session is abandoned first.
    pub async fn start_attempt(
        &self,
        session_id: &str,
        problem_id: &str,
        learner_age: Option<u8>,
    ) -> Result<AttemptView> {
        let problem = self.find_problem(problem_id).await?;

        let gate = self.session_gate(session_id).await;
        let _starting = gate.lock().await;
        self.close_session(session_id).await;

        let attempt = Attempt::new_original(session_id, problem, learner_age);
        let view = attempt.view();

        tracing::info!(
            attempt_id = %attempt.id(),
            session_id,
            problem_id,
            "Attempt started"
        );

        self.writer
            .submit(StoreCommand::CreateAttempt(attempt.to_record()))
            .await;
        self.register(attempt).await;

        Ok(view)
    }

    pub async fn submit_answer(&self, attempt_id: Uuid, answer: &str) -> Result<TurnOutcome> {
        let live = self.live(attempt_id).await?;
        let mut attempt = live
            .machine
            .try_lock()
            .map_err(|_| TutorError::ConcurrentSubmission(attempt_id))?;

        let transition = attempt.submit_answer(&self.gateway, answer).await?;
        Ok(self.commit(&live, &mut attempt, transition).await)
    }

    pub async fn request_solution(&self, attempt_id: Uuid) -> Result<TurnOutcome> {
        let live = self.live(attempt_id).await?;
        let mut attempt = live
            .machine
            .try_lock()
            .map_err(|_| TutorError::ConcurrentSubmission(attempt_id))?;

        let transition = attempt.request_solution(&self.gateway).await?;
        Ok(self.commit(&live, &mut attempt, transition).await)
    }

    /// Learner navigated away. Waits for an in-flight call to resolve first.
    pub async fn abandon(&self, attempt_id: Uuid) -> Result<TurnOutcome> {
        let live = self.live(attempt_id).await?;
        let mut attempt = live.machine.lock().await;

        let transition = attempt.abandon()?;
        Ok(self.commit(&live, &mut attempt, transition).await)
    }

    pub async fn attempt_view(&self, attempt_id: Uuid) -> Result<AttemptView> {
        Ok(self.live(attempt_id).await?.view())
    }

    /// Misconception analysis over every answer given so far. Works on the
    /// published snapshot, so it neither blocks nor alters the attempt.
    pub async fn diagnose(&self, attempt_id: Uuid) -> Result<DiagnosticReport> {
        let view = self.live(attempt_id).await?.view();
        let answers = view
            .conversation
            .iter()
            .filter(|turn| turn.role == Role::Learner)
            .map(|turn| turn.text.clone())
            .collect();

        Ok(self
            .diagnostics
            .compose(view.problem, answers, view.hint_count)
            .await)
    }

    pub async fn session_attempts(&self, session_id: &str) -> Result<Vec<AttemptRecord>> {
        Ok(self.writer.store().attempts_for_session(session_id).await?)
    }

    pub async fn attempt_turns(&self, attempt_id: Uuid) -> Result<Vec<TurnRecord>> {
        Ok(self
            .writer
            .store()
            .turns_for_attempt(&attempt_id.to_string())
            .await?)
    }

    pub async fn find_problem(&self, problem_id: &str) -> Result<Problem> {
        self.problems
            .find_by_id(problem_id)
            .await?
            .ok_or_else(|| TutorError::ProblemNotFound(problem_id.to_string()))
    }

    pub async fn list_problems(&self, filter: &ProblemFilter) -> Result<Vec<Problem>> {
        Ok(self.problems.find_filtered(filter).await?)
    }

    async fn live(&self, attempt_id: Uuid) -> Result<Arc<LiveAttempt>> {
        self.registry
            .read()
            .await
            .attempts
            .get(&attempt_id)
            .cloned()
            .ok_or(TutorError::AttemptNotFound(attempt_id))
    }

    async fn session_gate(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.registry
            .write()
            .await
            .sessions
            .entry(session_id.to_string())
            .or_default()
            .gate
            .clone()
    }

    async fn register(&self, attempt: Attempt) {
        let session_id = attempt.session_id().to_string();
        let live = Arc::new(LiveAttempt::new(attempt));
        let mut registry = self.registry.write().await;
        Self::insert(&mut registry, session_id, live);
    }

    /// Registers a mastery check unless its original has already left the
    /// registry, which means the session moved on while the check was built.
    async fn register_mastery(
        &self,
        original_id: Uuid,
        session_id: &str,
        live: Arc<LiveAttempt>,
    ) -> bool {
        let mut registry = self.registry.write().await;
        if !registry.attempts.contains_key(&original_id) {
            return false;
        }
        Self::insert(&mut registry, session_id.to_string(), live);
        true
    }

    fn insert(registry: &mut Registry, session_id: String, live: Arc<LiveAttempt>) {
        let id = live.id;
        registry.attempts.insert(id, live);
        registry.sessions.entry(session_id).or_default().attempts.push(id);
        ATTEMPTS_ACTIVE.inc();
    }

    /// Abandons what is still open in `session_id` and drops the session's
    /// attempts from memory. Their durable records stay in the store.
    async fn close_session(&self, session_id: &str) {
        let released: Vec<Arc<LiveAttempt>> = {
            let mut registry = self.registry.write().await;
            let ids = registry
                .sessions
                .get_mut(session_id)
                .map(|session| std::mem::take(&mut session.attempts))
                .unwrap_or_default();
            ids.iter()
                .filter_map(|id| registry.attempts.remove(id))
                .collect()
        };

        for live in released {
            let mut attempt = live.machine.lock().await;
            if attempt.is_open() {
                if let Ok(transition) = attempt.abandon() {
                    self.commit(&live, &mut attempt, transition).await;
                }
            }
        }
    }

    /// Abandons open attempts idle past the timeout and releases terminal
    /// ones past their retention. Attempts with a call in flight are left
    /// alone. Returns how many attempts left memory.
    pub async fn sweep(&self) -> usize {
        let candidates: Vec<(Uuid, Arc<LiveAttempt>)> = self
            .registry
            .read()
            .await
            .attempts
            .iter()
            .map(|(id, live)| (*id, live.clone()))
            .collect();

        let mut released = 0;
        for (attempt_id, live) in candidates {
            let idle_for = live.idle_for();
            let Ok(mut attempt) = live.machine.try_lock() else {
                continue;
            };

            if attempt.is_open() {
                if idle_for < self.retention.idle_timeout {
                    continue;
                }
                tracing::info!(
                    %attempt_id,
                    idle_secs = idle_for.as_secs(),
                    "Abandoning idle attempt"
                );
                if let Ok(transition) = attempt.abandon() {
                    self.commit(&live, &mut attempt, transition).await;
                }
            } else if idle_for >= self.retention.closed_retention
                && self.evict(attempt_id, attempt.session_id()).await
            {
                released += 1;
            }
        }

        if released > 0 {
            tracing::debug!(released, "Released closed attempts");
        }
        released
    }

    /// Sweeps the registry every `every` until the task is dropped.
    pub async fn run_sweeper(&self, every: Duration) {
        tracing::info!("Starting attempt sweeper (interval {}s)", every.as_secs());
        loop {
            tokio::time::sleep(every).await;
            self.sweep().await;
        }
    }

    async fn evict(&self, attempt_id: Uuid, session_id: &str) -> bool {
        let mut registry = self.registry.write().await;
        let removed = registry.attempts.remove(&attempt_id).is_some();
        let vacant = match registry.sessions.get_mut(session_id) {
            Some(session) => {
                session.attempts.retain(|id| *id != attempt_id);
                session.is_vacant()
            }
            None => false,
        };
        if vacant {
            registry.sessions.remove(session_id);
        }
        removed
    }

    async fn commit(
        &self,
        live: &LiveAttempt,
        attempt: &mut Attempt,
        transition: Transition,
    ) -> TurnOutcome {
        let attempt_id = attempt.id();
        if let (Some(terminal), true) = (transition.terminal, attempt.is_mastery_check()) {
            attempt.set_mastery_outcome(MasteryCheckOrchestrator::classify(terminal));
        }
        live.publish(attempt);

        for (sequence, turn) in &transition.committed {
            self.writer
                .submit(StoreCommand::AppendTurn(TurnRecord {
                    attempt_id: attempt_id.to_string(),
                    sequence: *sequence,
                    turn: turn.clone(),
                }))
                .await;
        }

        let mut mastery_check = None;
        if transition.terminal.is_some() {
            self.finalize(attempt).await;

            if attempt.take_mastery_trigger() {
                if let Some(mastery_attempt) = self.mastery.begin(attempt).await {
                    let offer = MasteryOffer {
                        attempt_id: mastery_attempt.id(),
                        problem: mastery_attempt.problem().summary(),
                    };
                    let session_id = mastery_attempt.session_id().to_string();
                    let mastery_live = Arc::new(LiveAttempt::new(mastery_attempt));
                    // Held until the record is queued so a concurrent close
                    // cannot finalize it first.
                    let pending = mastery_live.machine.lock().await;
                    if self
                        .register_mastery(attempt_id, &session_id, mastery_live.clone())
                        .await
                    {
                        self.writer
                            .submit(StoreCommand::CreateAttempt(pending.to_record()))
                            .await;
                        drop(pending);
                        attempt.link_mastery_attempt(offer.attempt_id);
                        live.publish(attempt);
                        mastery_check = Some(offer);
                    } else {
                        MASTERY_CHECKS_TOTAL
                            .with_label_values(&["session_closed"])
                            .inc();
                        tracing::info!(
                            original_attempt_id = %attempt_id,
                            "Session moved on, dropping mastery check"
                        );
                    }
                }
            }
        }

        TurnOutcome {
            attempt_id,
            phase: attempt.phase(),
            tutor_turn: transition.tutor_turn,
            hint_count: attempt.hint_count(),
            hints_remaining: attempt.hints_remaining(),
            show_solution_button: attempt.solution_offered() && attempt.is_open(),
            terminal: transition.terminal,
            final_status: attempt.final_status(),
            mastery_check,
            mastery_outcome: attempt.mastery_outcome(),
        }
    }

    async fn finalize(&self, attempt: &Attempt) {
        let Some(finalization) = attempt.finalization() else {
            return;
        };

        let kind = if attempt.is_mastery_check() {
            "mastery"
        } else {
            "original"
        };
        ATTEMPTS_FINALIZED_TOTAL
            .with_label_values(&[finalization.final_status.as_str(), kind])
            .inc();
        ATTEMPTS_ACTIVE.dec();

        tracing::info!(
            attempt_id = %attempt.id(),
            final_status = finalization.final_status.as_str(),
            hint_count = finalization.hint_count,
            mastery_outcome = finalization.mastery_outcome.map(|o| o.as_str()),
            "Attempt finalized"
        );

        self.writer
            .submit(StoreCommand::Finalize {
                attempt_id: attempt.id().to_string(),
                finalization,
            })
            .await;
    }
}
