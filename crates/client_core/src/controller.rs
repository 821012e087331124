//! Round and session controller for one workout.
//!
//! A workout runs as a single task that owns every piece of round state. The
//! task multiplexes a one second round clock, the pending move timer, results
//! coming back from collaborators and cancellation. Move and speech results
//! carry the epoch they were requested in; the epoch changes on every phase
//! transition so a result that arrives late is dropped instead of acted on.
//! Session bookkeeping goes through a sequential recorder worker so the server
//! always sees start, rounds and completion in order.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use shared::{
    domain::{
        score_from_steps, MoveCommand, SessionId, UserId, Voice, WorkoutSession, BREAK_SECONDS,
        COMPLEXITY_RAMP_SECONDS, INTENSITY_SEED_STEPS, ROUND_SECONDS, SCORE_STEPS, TOTAL_ROUNDS,
    },
    protocol::SpeechRequest,
};
use speech::{MissingSpeech, SpeechClip, SpeechError, SpeechSynthesizer};
use tokio::{
    sync::{broadcast, mpsc, watch, Mutex},
    task::JoinHandle,
    time::{interval_at, sleep_until, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    error::WorkoutError, AlwaysGranted, LocalMoveSource, MissingSessionRecorder, MoveSource,
    PermissionGate, SessionRecorder,
};

pub const WELCOME_TEXT: &str =
    "Welcome to Brutality, an exercise routine not for the faint of heart.";
pub const BREAK_TEXT: &str = "Rest and hydrate";
pub const COMPLETE_TEXT: &str = "Workout complete. Outstanding work.";

const EVENT_CAPACITY: usize = 1024;
/// Every second consecutive failure is surfaced; retries keep going afterwards.
const FAILURES_BEFORE_SURFACING: u32 = 2;

/// Timing of a workout. The defaults are the real workout; tests and the
/// desktop trainer shorten them.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutPlan {
    pub round_secs: u32,
    pub break_secs: u32,
    pub ramp_secs: u32,
    pub retry_delay: Duration,
    /// A move request still pending after this long counts as a failure.
    pub move_timeout: Duration,
    pub welcome_lead_in: Duration,
    pub first_move_delay: Duration,
    /// Upper bound on waiting for the final round and completion to be recorded.
    pub finalize_timeout: Duration,
}

impl Default for WorkoutPlan {
    fn default() -> Self {
        Self {
            round_secs: ROUND_SECONDS,
            break_secs: BREAK_SECONDS,
            ramp_secs: COMPLEXITY_RAMP_SECONDS,
            retry_delay: Duration::from_secs(3),
            move_timeout: Duration::from_secs(5),
            welcome_lead_in: Duration::from_secs(3),
            first_move_delay: Duration::from_secs(1),
            finalize_timeout: Duration::from_secs(10),
        }
    }
}

impl WorkoutPlan {
    fn sanitized(mut self) -> Self {
        self.round_secs = self.round_secs.max(1);
        self.break_secs = self.break_secs.max(1);
        self.ramp_secs = self.ramp_secs.max(1);
        self.move_timeout = self.move_timeout.max(Duration::from_millis(100));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceSettings {
    pub voice: Voice,
    pub speed: f64,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            voice: Voice::default(),
            speed: 1.0,
        }
    }
}

#[derive(Clone)]
pub struct WorkoutDependencies {
    pub moves: Arc<dyn MoveSource>,
    pub recorder: Arc<dyn SessionRecorder>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub permission: Arc<dyn PermissionGate>,
}

impl WorkoutDependencies {
    /// Local move generation with no remote services behind it.
    pub fn offline(seed: Option<u64>) -> Self {
        let moves = match seed {
            Some(seed) => LocalMoveSource::seeded(seed),
            None => LocalMoveSource::from_entropy(),
        };
        Self {
            moves: Arc::new(moves),
            recorder: Arc::new(MissingSessionRecorder),
            speech: Arc::new(MissingSpeech),
            permission: Arc::new(AlwaysGranted),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkoutPhase {
    Idle,
    RoundActive,
    BreakActive,
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundState {
    pub round: u8,
    pub seconds_remaining: u32,
    pub on_break: bool,
    pub complexity: f64,
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutSnapshot {
    pub phase: WorkoutPhase,
    pub round: RoundState,
    pub current_move: Option<MoveCommand>,
    pub session_id: Option<SessionId>,
    pub rounds_completed: u8,
    /// Set once speech synthesis has failed; moves are still called as text.
    pub speech_degraded: bool,
}

impl Default for WorkoutSnapshot {
    fn default() -> Self {
        Self {
            phase: WorkoutPhase::Idle,
            round: RoundState {
                round: 1,
                seconds_remaining: ROUND_SECONDS,
                on_break: false,
                complexity: 0.0,
                intensity: score_from_steps(INTENSITY_SEED_STEPS),
            },
            current_move: None,
            session_id: None,
            rounds_completed: 0,
            speech_degraded: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    PhaseChanged { phase: WorkoutPhase, round: u8 },
    Announcement(String),
    MoveCalled(MoveCommand),
    ComplexityRaised { round: u8, complexity: f64 },
    SpeechReady(SpeechClip),
    SessionStarted(SessionId),
    RoundRecorded { round: u8, complexity: f64, intensity: f64 },
    Error(WorkoutError),
}

/// What a workout left behind once its task ended.
#[derive(Debug, Clone)]
pub struct WorkoutSummary {
    pub phase: WorkoutPhase,
    pub session: WorkoutSession,
}

enum Control {
    Cancel,
}

enum RunSlot {
    Ready,
    Running(mpsc::Sender<Control>),
    Closed,
}

/// Owns one workout from start to completion or cancellation. Presentation
/// code observes it through [`subscribe_events`](Self::subscribe_events) and
/// [`watch_state`](Self::watch_state).
pub struct WorkoutController {
    deps: WorkoutDependencies,
    plan: WorkoutPlan,
    voice: VoiceSettings,
    events: broadcast::Sender<ControllerEvent>,
    state: Arc<watch::Sender<WorkoutSnapshot>>,
    slot: Mutex<RunSlot>,
    task: Mutex<Option<JoinHandle<WorkoutSummary>>>,
}

impl WorkoutController {
    pub fn new(deps: WorkoutDependencies, plan: WorkoutPlan, voice: VoiceSettings) -> Self {
        let plan = plan.sanitized();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut initial = WorkoutSnapshot::default();
        initial.round.seconds_remaining = plan.round_secs;
        let (state, _) = watch::channel(initial);
        Self {
            deps,
            plan,
            voice,
            events,
            state: Arc::new(state),
            slot: Mutex::new(RunSlot::Ready),
            task: Mutex::new(None),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<WorkoutSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> WorkoutSnapshot {
        self.state.borrow().clone()
    }

    /// Asks for audio permission and starts round 1. A refused permission
    /// leaves the controller idle and startable again.
    pub async fn start(&self, user_id: UserId) -> Result<(), WorkoutError> {
        let mut slot = self.slot.lock().await;
        if !matches!(*slot, RunSlot::Ready) {
            return Err(WorkoutError::Closed);
        }

        match self.deps.permission.request_audio_permission().await {
            Ok(true) => {}
            Ok(false) => {
                info!("audio permission refused");
                return Err(WorkoutError::PermissionDenied);
            }
            Err(err) => {
                warn!(error = %err, "audio permission request failed");
                return Err(WorkoutError::PermissionDenied);
            }
        }

        let (control_tx, control_rx) = mpsc::channel(4);
        let run = WorkoutRun::new(
            self.deps.clone(),
            self.plan.clone(),
            self.voice,
            self.events.clone(),
            Arc::clone(&self.state),
            user_id,
        );
        let handle = tokio::spawn(run.run(control_rx));
        *self.task.lock().await = Some(handle);
        *slot = RunSlot::Running(control_tx);
        Ok(())
    }

    /// Stops the workout, returning to `Idle`. Returns the summary if this
    /// call was the one to observe the task ending.
    pub async fn cancel(&self) -> Option<WorkoutSummary> {
        let control = {
            let mut slot = self.slot.lock().await;
            match std::mem::replace(&mut *slot, RunSlot::Closed) {
                RunSlot::Running(control) => Some(control),
                RunSlot::Ready | RunSlot::Closed => None,
            }
        };
        if let Some(control) = control {
            let _ = control.send(Control::Cancel).await;
        }
        self.join().await
    }

    /// Waits for the workout task to end on its own.
    pub async fn finished(&self) -> Option<WorkoutSummary> {
        self.join().await
    }

    async fn join(&self) -> Option<WorkoutSummary> {
        // The handle stays in place until the task ends, so a waiter dropped
        // mid-await leaves it for the next caller.
        let mut task = self.task.lock().await;
        let handle = task.as_mut()?;
        let result = handle.await;
        task.take();
        match result {
            Ok(summary) => Some(summary),
            Err(err) => {
                warn!(error = %err, "workout task ended abnormally");
                None
            }
        }
    }
}

impl Drop for WorkoutController {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.try_lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpeechKind {
    Move,
    Announcement,
}

enum Outcome {
    Move {
        epoch: u64,
        result: anyhow::Result<MoveCommand>,
    },
    Speech {
        epoch: u64,
        kind: SpeechKind,
        result: Result<SpeechClip, SpeechError>,
    },
    SessionStarted(anyhow::Result<WorkoutSession>),
    RoundRecorded {
        round: u8,
        complexity: f64,
        intensity: f64,
        result: anyhow::Result<()>,
    },
    SessionCompleted(anyhow::Result<()>),
}

enum RecorderJob {
    Round {
        round: u8,
        complexity: f64,
        intensity: f64,
    },
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Finished,
}

struct WorkoutRun {
    deps: WorkoutDependencies,
    plan: WorkoutPlan,
    voice: VoiceSettings,
    events: broadcast::Sender<ControllerEvent>,
    state: Arc<watch::Sender<WorkoutSnapshot>>,
    outcomes_tx: mpsc::UnboundedSender<Outcome>,
    outcomes_rx: mpsc::UnboundedReceiver<Outcome>,
    recorder_tx: Option<mpsc::UnboundedSender<RecorderJob>>,
    recorder_task: Option<JoinHandle<()>>,
    user_id: UserId,

    phase: WorkoutPhase,
    round: u8,
    seconds_remaining: u32,
    /// Seconds of the current round already played.
    elapsed: u32,
    next_ramp_at: u32,
    complexity_steps: u8,
    intensity_steps: u8,
    epoch: u64,
    next_move_at: Option<Instant>,
    current_move: Option<MoveCommand>,
    consecutive_failures: u32,
    speech_degraded: bool,
    session: WorkoutSession,
    remote_session: Option<SessionId>,
}

impl WorkoutRun {
    fn new(
        deps: WorkoutDependencies,
        plan: WorkoutPlan,
        voice: VoiceSettings,
        events: broadcast::Sender<ControllerEvent>,
        state: Arc<watch::Sender<WorkoutSnapshot>>,
        user_id: UserId,
    ) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        Self {
            session: WorkoutSession::new(user_id.clone()),
            deps,
            seconds_remaining: plan.round_secs,
            next_ramp_at: plan.ramp_secs,
            plan,
            voice,
            events,
            state,
            outcomes_tx,
            outcomes_rx,
            recorder_tx: None,
            recorder_task: None,
            user_id,
            phase: WorkoutPhase::Idle,
            round: 1,
            elapsed: 0,
            complexity_steps: 0,
            intensity_steps: INTENSITY_SEED_STEPS,
            epoch: 0,
            next_move_at: None,
            current_move: None,
            consecutive_failures: 0,
            speech_degraded: false,
            remote_session: None,
        }
    }

    async fn run(mut self, mut control_rx: mpsc::Receiver<Control>) -> WorkoutSummary {
        let started = Instant::now();
        self.spawn_recorder();
        self.begin_workout(started);

        let tick = Duration::from_secs(1);
        let mut ticker = interval_at(started + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        loop {
            let move_deadline = self.next_move_at;
            tokio::select! {
                biased;
                control = control_rx.recv() => {
                    match control {
                        Some(Control::Cancel) | None => {
                            self.abandon();
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if self.on_tick() == Flow::Finished {
                        break;
                    }
                }
                _ = sleep_until(move_deadline.unwrap_or_else(Instant::now)), if move_deadline.is_some() => {
                    self.next_move_at = None;
                    self.request_move();
                }
                Some(outcome) = self.outcomes_rx.recv() => {
                    self.on_outcome(outcome);
                }
            }
        }

        if self.phase == WorkoutPhase::Complete {
            self.finalize().await;
        }

        WorkoutSummary {
            phase: self.phase,
            session: self.session,
        }
    }

    fn begin_workout(&mut self, now: Instant) {
        info!(user_id = %self.user_id, "workout started");
        self.enter_round(1, now + self.plan.welcome_lead_in);
        self.announce(WELCOME_TEXT.to_string());
        self.announce(format!("Round {}", self.round));
    }

    fn spawn_recorder(&mut self) {
        let (jobs_tx, mut jobs_rx) = mpsc::unbounded_channel();
        let recorder = Arc::clone(&self.deps.recorder);
        let outcomes = self.outcomes_tx.clone();
        let user_id = self.user_id.clone();

        let handle = tokio::spawn(async move {
            let started = recorder.start_session(&user_id).await;
            let session_id = started.as_ref().ok().map(|session| session.id);
            let _ = outcomes.send(Outcome::SessionStarted(started));

            while let Some(job) = jobs_rx.recv().await {
                let Some(session_id) = session_id else {
                    continue;
                };
                match job {
                    RecorderJob::Round {
                        round,
                        complexity,
                        intensity,
                    } => {
                        let result = recorder
                            .record_round(session_id, complexity, intensity)
                            .await
                            .map(|_| ());
                        let _ = outcomes.send(Outcome::RoundRecorded {
                            round,
                            complexity,
                            intensity,
                            result,
                        });
                    }
                    RecorderJob::Complete => {
                        let result = recorder.complete_session(session_id).await;
                        let _ = outcomes.send(Outcome::SessionCompleted(result));
                    }
                }
            }
        });

        self.recorder_tx = Some(jobs_tx);
        self.recorder_task = Some(handle);
    }

    fn enter_round(&mut self, round: u8, first_move_at: Instant) {
        self.epoch += 1;
        self.phase = WorkoutPhase::RoundActive;
        self.round = round;
        self.seconds_remaining = self.plan.round_secs;
        self.elapsed = 0;
        self.next_ramp_at = self.plan.ramp_secs;
        self.complexity_steps = 0;
        self.current_move = None;
        self.next_move_at = Some(first_move_at);
        self.emit(ControllerEvent::PhaseChanged {
            phase: self.phase,
            round,
        });
        self.publish();
    }

    fn on_tick(&mut self) -> Flow {
        match self.phase {
            WorkoutPhase::RoundActive => {
                self.seconds_remaining = self.seconds_remaining.saturating_sub(1);
                self.elapsed += 1;
                if self.seconds_remaining == 0 {
                    return self.end_round();
                }
                if self.elapsed >= self.next_ramp_at {
                    self.next_ramp_at += self.plan.ramp_secs;
                    self.raise_complexity();
                }
                self.publish();
                Flow::Continue
            }
            WorkoutPhase::BreakActive => {
                self.seconds_remaining = self.seconds_remaining.saturating_sub(1);
                if self.seconds_remaining == 0 {
                    let next = self.round + 1;
                    self.intensity_steps = (self.intensity_steps + 1).min(SCORE_STEPS);
                    self.enter_round(next, Instant::now() + self.plan.first_move_delay);
                    self.announce(format!("Round {next}"));
                } else {
                    self.publish();
                }
                Flow::Continue
            }
            WorkoutPhase::Idle | WorkoutPhase::Complete => Flow::Finished,
        }
    }

    fn raise_complexity(&mut self) {
        if self.complexity_steps >= SCORE_STEPS {
            return;
        }
        self.complexity_steps += 1;
        let complexity = score_from_steps(self.complexity_steps);
        debug!(round = self.round, complexity, "complexity raised");
        self.emit(ControllerEvent::ComplexityRaised {
            round: self.round,
            complexity,
        });
    }

    fn end_round(&mut self) -> Flow {
        let complexity = score_from_steps(self.complexity_steps);
        let intensity = score_from_steps(self.intensity_steps);
        let round = self.round;
        if let Err(err) = self.session.record_round(complexity, intensity) {
            warn!(round, error = %err, "local session rejected round");
        }
        self.send_recorder_job(RecorderJob::Round {
            round,
            complexity,
            intensity,
        });
        info!(round, complexity, intensity, "round finished");

        self.epoch += 1;
        self.next_move_at = None;
        self.current_move = None;

        if round >= TOTAL_ROUNDS {
            self.phase = WorkoutPhase::Complete;
            self.seconds_remaining = 0;
            self.session.close(Utc::now());
            self.send_recorder_job(RecorderJob::Complete);
            self.emit(ControllerEvent::PhaseChanged {
                phase: self.phase,
                round,
            });
            self.emit(ControllerEvent::Announcement(COMPLETE_TEXT.to_string()));
            self.publish();
            info!(session_id = %self.session.id, "workout complete");
            return Flow::Finished;
        }

        self.phase = WorkoutPhase::BreakActive;
        self.seconds_remaining = self.plan.break_secs;
        self.emit(ControllerEvent::PhaseChanged {
            phase: self.phase,
            round,
        });
        self.announce(BREAK_TEXT.to_string());
        self.publish();
        Flow::Continue
    }

    fn abandon(&mut self) {
        info!(round = self.round, phase = ?self.phase, "workout cancelled");
        self.epoch += 1;
        self.phase = WorkoutPhase::Idle;
        self.next_move_at = None;
        self.current_move = None;
        self.session.close(Utc::now());
        self.recorder_tx = None;
        self.emit(ControllerEvent::PhaseChanged {
            phase: self.phase,
            round: self.round,
        });
        self.publish();
    }

    /// Speaks the closing line and waits, bounded, for the recorder to
    /// persist the last round and the completion.
    async fn finalize(&mut self) {
        self.recorder_tx = None;
        let limit = self.plan.finalize_timeout;
        let speech = Arc::clone(&self.deps.speech);
        let request = SpeechRequest::new(COMPLETE_TEXT, self.voice.voice, self.voice.speed);
        let recorder_task = self.recorder_task.take();

        let (closing, _) = tokio::join!(
            tokio::time::timeout(limit, speech.synthesize(&request)),
            async move {
                if let Some(handle) = recorder_task {
                    if tokio::time::timeout(limit, handle).await.is_err() {
                        warn!("timed out waiting for session recorder");
                    }
                }
            }
        );
        let closing = closing.unwrap_or(Err(SpeechError::Timeout));
        self.on_speech(self.epoch, SpeechKind::Announcement, closing);

        while let Ok(outcome) = self.outcomes_rx.try_recv() {
            self.on_outcome(outcome);
        }
    }

    fn request_move(&mut self) {
        if self.phase != WorkoutPhase::RoundActive {
            return;
        }
        let moves = Arc::clone(&self.deps.moves);
        let outcomes = self.outcomes_tx.clone();
        let epoch = self.epoch;
        let complexity = score_from_steps(self.complexity_steps);
        let intensity = score_from_steps(self.intensity_steps);
        let round = self.round;
        let limit = self.plan.move_timeout;
        tokio::spawn(async move {
            let result = tokio::time::timeout(limit, moves.next_move(complexity, intensity, round))
                .await
                .unwrap_or_else(|_| Err(anyhow::anyhow!("move request timed out after {limit:?}")));
            let _ = outcomes.send(Outcome::Move { epoch, result });
        });
    }

    fn on_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Move { epoch, result } => self.on_move(epoch, result),
            Outcome::Speech {
                epoch,
                kind,
                result,
            } => self.on_speech(epoch, kind, result),
            Outcome::SessionStarted(Ok(remote)) => {
                info!(session_id = %remote.id, "session recorded remotely");
                self.remote_session = Some(remote.id);
                self.session.id = remote.id;
                self.session.start_time = remote.start_time;
                self.emit(ControllerEvent::SessionStarted(remote.id));
                self.publish();
            }
            Outcome::SessionStarted(Err(err)) => {
                self.report_recorder_failure("start", err);
            }
            Outcome::RoundRecorded {
                round,
                complexity,
                intensity,
                result,
            } => match result {
                Ok(()) => self.emit(ControllerEvent::RoundRecorded {
                    round,
                    complexity,
                    intensity,
                }),
                Err(err) => self.report_recorder_failure("round", err),
            },
            Outcome::SessionCompleted(Ok(())) => {
                debug!(session_id = %self.session.id, "completion recorded");
            }
            Outcome::SessionCompleted(Err(err)) => {
                self.report_recorder_failure("completion", err);
            }
        }
    }

    fn on_move(&mut self, epoch: u64, result: anyhow::Result<MoveCommand>) {
        if epoch != self.epoch || self.phase != WorkoutPhase::RoundActive {
            debug!(epoch, current = self.epoch, "dropping stale move result");
            return;
        }

        let failure = match result {
            Ok(command) if command.is_playable() => {
                self.consecutive_failures = 0;
                self.next_move_at = Some(Instant::now() + command.duration());
                self.current_move = Some(command.clone());
                self.speak(command.command.clone(), SpeechKind::Move);
                self.emit(ControllerEvent::MoveCalled(command));
                self.publish();
                return;
            }
            Ok(command) => format!("unplayable command {:?}", command.command),
            Err(err) => err.to_string(),
        };

        self.consecutive_failures += 1;
        warn!(
            round = self.round,
            failures = self.consecutive_failures,
            error = %failure,
            "move generation failed"
        );
        if self.consecutive_failures >= FAILURES_BEFORE_SURFACING {
            self.consecutive_failures = 0;
            self.emit(ControllerEvent::Error(WorkoutError::GenerationFailure(
                failure,
            )));
        }
        self.next_move_at = Some(Instant::now() + self.plan.retry_delay);
    }

    fn announce(&mut self, text: String) {
        self.speak(text.clone(), SpeechKind::Announcement);
        self.emit(ControllerEvent::Announcement(text));
    }

    fn speak(&self, text: String, kind: SpeechKind) {
        let speech = Arc::clone(&self.deps.speech);
        let outcomes = self.outcomes_tx.clone();
        let epoch = self.epoch;
        let request = SpeechRequest::new(text, self.voice.voice, self.voice.speed);
        tokio::spawn(async move {
            let result = speech.synthesize(&request).await;
            let _ = outcomes.send(Outcome::Speech {
                epoch,
                kind,
                result,
            });
        });
    }

    fn on_speech(&mut self, epoch: u64, kind: SpeechKind, result: Result<SpeechClip, SpeechError>) {
        match result {
            Ok(clip) => {
                if kind == SpeechKind::Move && epoch != self.epoch {
                    debug!(text = %clip.text, "dropping stale move speech");
                    return;
                }
                self.emit(ControllerEvent::SpeechReady(clip));
            }
            Err(err) => {
                if self.speech_degraded {
                    debug!(error = %err, "speech still unavailable");
                    return;
                }
                warn!(error = %err, "speech unavailable; continuing with text only");
                self.speech_degraded = true;
                self.emit(ControllerEvent::Error(WorkoutError::unavailable(
                    "speech",
                    err.to_string(),
                )));
                self.publish();
            }
        }
    }

    fn report_recorder_failure(&self, operation: &'static str, err: anyhow::Error) {
        warn!(operation, error = %err, "session recorder failed");
        self.emit(ControllerEvent::Error(WorkoutError::unavailable(
            "session recorder",
            format!("{operation}: {err}"),
        )));
    }

    fn send_recorder_job(&self, job: RecorderJob) {
        if let Some(jobs) = &self.recorder_tx {
            let _ = jobs.send(job);
        }
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        self.state.send_replace(WorkoutSnapshot {
            phase: self.phase,
            round: RoundState {
                round: self.round,
                seconds_remaining: self.seconds_remaining,
                on_break: self.phase == WorkoutPhase::BreakActive,
                complexity: score_from_steps(self.complexity_steps),
                intensity: score_from_steps(self.intensity_steps),
            },
            current_move: self.current_move.clone(),
            session_id: self.remote_session,
            rounds_completed: self.session.rounds_completed,
            speech_degraded: self.speech_degraded,
        });
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
