//! The chained background writing driver.
//!
//! A job is a sequence of independent steps. Each step writes exactly one
//! scene, charges the words to the owner, and schedules the next step
//! through a [`Continuation`]. The project row is the only state: a step
//! re-reads it, so a duplicate or late delivery is a no-op and a lost one
//! is picked up again by [`Driver::sweep_stalled`].

use std::{
  collections::HashSet,
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use folio_ai::TextGenerator;
use folio_core::{project::WritingStatus, store::WritingStore, words::count_words};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::{
  Error, Result,
  continuation::{Continuation, ContinuationReceiver},
  ledger::Ledger,
  prompt::scene_request,
};

/// Response to a successful [`Driver::start`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartReceipt {
  pub success:    bool,
  pub message:    String,
  pub project_id: Uuid,
}

/// What a single [`Driver::process_next_scene`] call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StepOutcome {
  /// The project has no active job; nothing was touched.
  Idle,
  /// Another step for this project is running in this process.
  Busy,
  /// No scenes were left; the job is finished.
  Completed,
  /// Generation failed; the job stopped with an error.
  Failed { message: String },
  /// A scene was written and the next step was scheduled.
  Advanced { scene_id: Uuid, words: i64, remaining: u64 },
}

// ─── In-flight guard ─────────────────────────────────────────────────────────

type InFlightSet = Arc<Mutex<HashSet<Uuid>>>;

/// Marks a project as having a step running; released on drop.
struct InFlight {
  set:        InFlightSet,
  project_id: Uuid,
}

impl InFlight {
  fn acquire(set: &InFlightSet, project_id: Uuid) -> Option<Self> {
    let inserted = set
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(project_id);
    inserted.then(|| Self { set: set.clone(), project_id })
  }
}

impl Drop for InFlight {
  fn drop(&mut self) {
    self
      .set
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&self.project_id);
  }
}

// ─── Driver ──────────────────────────────────────────────────────────────────

pub struct Driver<S, G> {
  store:        Arc<S>,
  generator:    Arc<G>,
  continuation: Arc<dyn Continuation>,
  ledger:       Ledger<S>,
  in_flight:    InFlightSet,
}

impl<S, G> Clone for Driver<S, G> {
  fn clone(&self) -> Self {
    Self {
      store:        self.store.clone(),
      generator:    self.generator.clone(),
      continuation: self.continuation.clone(),
      ledger:       self.ledger.clone(),
      in_flight:    self.in_flight.clone(),
    }
  }
}

impl<S, G> Driver<S, G>
where
  S: WritingStore,
  G: TextGenerator,
{
  pub fn new(
    store: Arc<S>,
    generator: Arc<G>,
    continuation: Arc<dyn Continuation>,
    ledger: Ledger<S>,
  ) -> Self {
    Self { store, generator, continuation, ledger, in_flight: InFlightSet::default() }
  }

  pub fn ledger(&self) -> &Ledger<S> { &self.ledger }

  pub fn store(&self) -> &Arc<S> { &self.store }

  /// Begin background writing for a project and schedule its first step.
  #[tracing::instrument(skip(self))]
  pub async fn start(&self, project_id: Uuid) -> Result<StartReceipt> {
    let project = self
      .store
      .get_project(project_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::ProjectNotFound(project_id))?;

    if project.writing_status.is_active() {
      return Err(Error::AlreadyRunning(project_id));
    }

    let pending = self
      .store
      .unfinished_scene_count(project_id)
      .await
      .map_err(Error::store)?;
    if pending == 0 {
      return Err(Error::NothingToWrite(project_id));
    }

    // Lost a race with another start between the read and the update.
    if !self
      .store
      .begin_background_write(project_id, Utc::now())
      .await
      .map_err(Error::store)?
    {
      return Err(Error::AlreadyRunning(project_id));
    }

    self.continuation.schedule(project_id)?;
    tracing::info!(%project_id, pending, "background writing started");

    Ok(StartReceipt {
      success: true,
      message: format!("Background writing started for {pending} scene(s)"),
      project_id,
    })
  }

  /// Run one step of a project's job.
  #[tracing::instrument(skip(self))]
  pub async fn process_next_scene(&self, project_id: Uuid) -> Result<StepOutcome> {
    let Some(_guard) = InFlight::acquire(&self.in_flight, project_id) else {
      tracing::debug!("step already running");
      return Ok(StepOutcome::Busy);
    };

    let project = self
      .store
      .get_project(project_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::ProjectNotFound(project_id))?;

    if !project.writing_status.is_active() {
      tracing::debug!(status = %project.writing_status, "no active job");
      return Ok(StepOutcome::Idle);
    }

    let Some(task) = self.store.next_scene(project_id).await.map_err(Error::store)? else {
      self.finish(project_id).await?;
      return Ok(StepOutcome::Completed);
    };
    let scene_id = task.scene.scene_id;

    self
      .store
      .claim_scene(project_id, scene_id)
      .await
      .map_err(Error::store)?;

    let text = match self.generator.generate(&scene_request(&task)).await {
      Ok(text) => text,
      Err(e) => {
        let message = e.to_string();
        tracing::error!(%scene_id, error = %message, "scene generation failed");
        self
          .store
          .set_writing_status(project_id, WritingStatus::Error, Some(message.clone()))
          .await
          .map_err(Error::store)?;
        return Ok(StepOutcome::Failed { message });
      }
    };

    let words = count_words(&text);
    let Some(project_words) = self
      .store
      .complete_scene(scene_id, &text, words)
      .await
      .map_err(Error::store)?
    else {
      tracing::debug!(%scene_id, "scene already written");
      return Ok(StepOutcome::Idle);
    };

    self.ledger.consume(project.user_id, words).await?;

    let remaining = self
      .store
      .unfinished_scene_count(project_id)
      .await
      .map_err(Error::store)?;

    if remaining == 0 {
      self.finish(project_id).await?;
      return Ok(StepOutcome::Completed);
    }

    self.continuation.schedule(project_id)?;
    tracing::info!(%scene_id, words, project_words, remaining, "scene written");
    Ok(StepOutcome::Advanced { scene_id, words, remaining })
  }

  async fn finish(&self, project_id: Uuid) -> Result<()> {
    self
      .store
      .set_writing_status(project_id, WritingStatus::Completed, None)
      .await
      .map_err(Error::store)?;
    tracing::info!(%project_id, "background writing completed");
    Ok(())
  }

  /// Reschedule every active project untouched for longer than
  /// `stall_after`. Returns how many were rescheduled.
  pub async fn sweep_stalled(&self, stall_after: Duration) -> Result<usize> {
    let before = stalled_before(Utc::now(), stall_after);
    let stalled = self
      .store
      .stalled_projects(before)
      .await
      .map_err(Error::store)?;

    for project_id in &stalled {
      tracing::warn!(%project_id, "rescheduling stalled writing job");
      self.continuation.schedule(*project_id)?;
    }
    Ok(stalled.len())
  }
}

impl<S, G> Driver<S, G>
where
  S: WritingStore + 'static,
  G: TextGenerator + 'static,
{
  /// Drain the continuation queue, running each step on its own task.
  ///
  /// Returns once every queue sender has been dropped.
  pub async fn run_worker(self, mut receiver: ContinuationReceiver) {
    while let Some(project_id) = receiver.next().await {
      let driver = self.clone();
      tokio::spawn(async move {
        match driver.process_next_scene(project_id).await {
          Ok(outcome) => tracing::debug!(%project_id, ?outcome, "writing step finished"),
          Err(e) => tracing::error!(%project_id, error = %e, "writing step failed"),
        }
      });
    }
    tracing::info!("continuation queue closed; worker exiting");
  }

  /// Run [`Driver::sweep_stalled`] every `interval`, starting immediately.
  pub async fn run_sweeper(self, interval: Duration, stall_after: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      match self.sweep_stalled(stall_after).await {
        Ok(0) => {}
        Ok(n) => tracing::info!(rescheduled = n, "reconciliation sweep"),
        Err(e) => tracing::error!(error = %e, "reconciliation sweep failed"),
      }
    }
  }
}

fn stalled_before(now: DateTime<Utc>, stall_after: Duration) -> DateTime<Utc> {
  TimeDelta::from_std(stall_after)
    .ok()
    .and_then(|d| now.checked_sub_signed(d))
    .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
  use std::collections::VecDeque;

  use folio_ai::GenerationRequest;
  use folio_core::{
    ledger::{WordLimit, month_key},
    project::{NewChapter, NewProject, NewScene, SceneStatus},
  };
  use folio_store_sqlite::SqliteStore;

  use super::*;
  use crate::continuation::continuation_queue;

  /// Replies with canned results in order and records every request.
  #[derive(Default)]
  struct ScriptedGenerator {
    replies:  Mutex<VecDeque<folio_ai::Result<String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
  }

  impl ScriptedGenerator {
    fn new(replies: impl IntoIterator<Item = folio_ai::Result<String>>) -> Self {
      Self { replies: Mutex::new(replies.into_iter().collect()), ..Default::default() }
    }

    fn requests(&self) -> Vec<GenerationRequest> { self.requests.lock().unwrap().clone() }
  }

  impl TextGenerator for ScriptedGenerator {
    async fn generate<'a>(&'a self, request: &'a GenerationRequest) -> folio_ai::Result<String> {
      self.requests.lock().unwrap().push(request.clone());
      self
        .replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(Err(folio_ai::Error::EmptyCompletion))
    }
  }

  #[derive(Default)]
  struct RecordingContinuation {
    scheduled: Mutex<Vec<Uuid>>,
  }

  impl RecordingContinuation {
    fn take(&self) -> Vec<Uuid> { std::mem::take(&mut *self.scheduled.lock().unwrap()) }
  }

  impl Continuation for RecordingContinuation {
    fn schedule(&self, project_id: Uuid) -> Result<()> {
      self.scheduled.lock().unwrap().push(project_id);
      Ok(())
    }
  }

  struct Harness {
    driver:       Driver<SqliteStore, ScriptedGenerator>,
    store:        Arc<SqliteStore>,
    generator:    Arc<ScriptedGenerator>,
    continuation: Arc<RecordingContinuation>,
  }

  async fn harness(replies: Vec<folio_ai::Result<String>>) -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let generator = Arc::new(ScriptedGenerator::new(replies));
    let continuation = Arc::new(RecordingContinuation::default());
    let ledger = Ledger::new(store.clone(), WordLimit::Monthly(5000));
    let driver = Driver::new(store.clone(), generator.clone(), continuation.clone(), ledger);
    Harness { driver, store, generator, continuation }
  }

  /// A project with one chapter of `scenes` scenes.
  async fn project(store: &SqliteStore, scenes: usize) -> (Uuid, Uuid) {
    let user = Uuid::new_v4();
    let project = store
      .create_project(NewProject {
        user_id:     user,
        title:       "Salt and Iron".into(),
        genre:       Some("fantasy".into()),
        description: Some("A smith's apprentice goes to sea.".into()),
      })
      .await
      .unwrap();
    store
      .add_chapter(project.project_id, NewChapter {
        title:  "The Forge".into(),
        scenes: (1..=scenes)
          .map(|n| NewScene { summary: format!("Scene {n}"), target_words: 800 })
          .collect(),
      })
      .await
      .unwrap();
    (project.project_id, user)
  }

  fn ok(text: &str) -> folio_ai::Result<String> { Ok(text.to_owned()) }

  #[tokio::test]
  async fn start_schedules_one_step() {
    let h = harness(vec![]).await;
    let (id, _) = project(&h.store, 2).await;

    let receipt = h.driver.start(id).await.unwrap();
    assert!(receipt.success);
    assert_eq!(receipt.project_id, id);
    assert_eq!(h.continuation.take(), vec![id]);

    let project = h.store.get_project(id).await.unwrap().unwrap();
    assert_eq!(project.writing_status, WritingStatus::BackgroundWriting);
    assert!(project.writing_started_at.is_some());
  }

  #[tokio::test]
  async fn start_on_active_project_changes_nothing() {
    let h = harness(vec![]).await;
    let (id, _) = project(&h.store, 1).await;
    h.driver.start(id).await.unwrap();
    h.continuation.take();
    let before = h.store.get_project(id).await.unwrap().unwrap();

    let err = h.driver.start(id).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRunning(p) if p == id));
    assert!(h.continuation.take().is_empty());

    let after = h.store.get_project(id).await.unwrap().unwrap();
    assert_eq!(after.writing_status, before.writing_status);
    assert_eq!(after.writing_started_at, before.writing_started_at);
    assert_eq!(after.updated_at, before.updated_at);
  }

  #[tokio::test]
  async fn start_rejects_missing_and_empty_projects() {
    let h = harness(vec![]).await;
    assert!(matches!(
      h.driver.start(Uuid::new_v4()).await,
      Err(Error::ProjectNotFound(_))
    ));

    let (id, _) = project(&h.store, 0).await;
    assert!(matches!(h.driver.start(id).await, Err(Error::NothingToWrite(_))));
    assert!(h.continuation.take().is_empty());
  }

  #[tokio::test]
  async fn writes_every_scene_then_completes() {
    let h = harness(vec![ok("One two three."), ok("Four five.")]).await;
    let (id, user) = project(&h.store, 2).await;
    h.driver.start(id).await.unwrap();
    h.continuation.take();

    let first = h.driver.process_next_scene(id).await.unwrap();
    assert!(matches!(first, StepOutcome::Advanced { words: 3, remaining: 1, .. }));
    assert_eq!(h.continuation.take(), vec![id]);
    assert_eq!(
      h.store.get_project(id).await.unwrap().unwrap().writing_status,
      WritingStatus::InProgress
    );

    let second = h.driver.process_next_scene(id).await.unwrap();
    assert_eq!(second, StepOutcome::Completed);
    assert!(h.continuation.take().is_empty());

    let view = h.store.project_view(id).await.unwrap().unwrap();
    assert_eq!(view.project.writing_status, WritingStatus::Completed);
    assert_eq!(view.project.word_count, 5);
    let chapter = &view.chapters[0];
    assert_eq!(chapter.chapter.content, "One two three.\n\nFour five.");
    assert!(chapter.scenes.iter().all(|s| s.status == SceneStatus::Done));

    let used = h.store.words_generated(user, &month_key(Utc::now())).await.unwrap();
    assert_eq!(used, 5);

    // The second prompt carries the end of the first scene.
    let requests = h.generator.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].prompt.contains("One two three."));
  }

  #[tokio::test]
  async fn generation_failure_stops_the_job() {
    let h = harness(vec![Err(folio_ai::Error::Upstream {
      status:  500,
      message: "model overloaded".into(),
    })])
    .await;
    let (id, user) = project(&h.store, 2).await;
    h.driver.start(id).await.unwrap();
    h.continuation.take();

    let outcome = h.driver.process_next_scene(id).await.unwrap();
    let StepOutcome::Failed { message } = outcome else {
      panic!("expected failure, got {outcome:?}");
    };
    assert!(message.contains("model overloaded"));
    assert!(h.continuation.take().is_empty());

    let project = h.store.get_project(id).await.unwrap().unwrap();
    assert_eq!(project.writing_status, WritingStatus::Error);
    assert_eq!(project.writing_error.as_deref(), Some(message.as_str()));
    assert_eq!(h.store.words_generated(user, &month_key(Utc::now())).await.unwrap(), 0);

    // An errored project can be started again.
    h.driver.start(id).await.unwrap();
    let project = h.store.get_project(id).await.unwrap().unwrap();
    assert_eq!(project.writing_error, None);
  }

  #[tokio::test]
  async fn inactive_project_is_a_no_op() {
    let h = harness(vec![ok("never used")]).await;
    let (id, _) = project(&h.store, 1).await;

    assert_eq!(h.driver.process_next_scene(id).await.unwrap(), StepOutcome::Idle);
    assert!(h.generator.requests().is_empty());
    assert!(h.continuation.take().is_empty());
    assert!(matches!(
      h.driver.process_next_scene(Uuid::new_v4()).await,
      Err(Error::ProjectNotFound(_))
    ));
  }

  #[tokio::test]
  async fn duplicate_delivery_after_completion_is_harmless() {
    let h = harness(vec![ok("Only scene.")]).await;
    let (id, user) = project(&h.store, 1).await;
    h.driver.start(id).await.unwrap();

    assert_eq!(h.driver.process_next_scene(id).await.unwrap(), StepOutcome::Completed);
    assert_eq!(h.driver.process_next_scene(id).await.unwrap(), StepOutcome::Idle);
    assert_eq!(h.store.words_generated(user, &month_key(Utc::now())).await.unwrap(), 2);
  }

  #[tokio::test]
  async fn concurrent_step_reports_busy() {
    let h = harness(vec![]).await;
    let id = Uuid::new_v4();
    let _held = InFlight::acquire(&h.driver.in_flight, id).unwrap();
    assert_eq!(h.driver.process_next_scene(id).await.unwrap(), StepOutcome::Busy);
  }

  #[tokio::test]
  async fn sweep_reschedules_only_stalled_jobs() {
    let h = harness(vec![]).await;
    let (active, _) = project(&h.store, 1).await;
    let (idle, _) = project(&h.store, 1).await;
    h.driver.start(active).await.unwrap();
    h.continuation.take();

    assert_eq!(h.driver.sweep_stalled(Duration::from_secs(3600)).await.unwrap(), 0);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.driver.sweep_stalled(Duration::from_millis(5)).await.unwrap(), 1);
    let scheduled = h.continuation.take();
    assert_eq!(scheduled, vec![active]);
    assert!(!scheduled.contains(&idle));
  }

  #[tokio::test]
  async fn charges_overflow_to_extra_balance() {
    let h = harness(vec![ok("a b c d e f g h i j")]).await;
    let (id, user) = project(&h.store, 1).await;
    h.store.ensure_profile(user, WordLimit::Monthly(4)).await.unwrap();
    h.driver
      .ledger()
      .add_extra_credits(
        folio_core::ledger::NewCreditGrant::top_up(
          user,
          folio_core::ledger::CreditKind::Purchase,
          100,
          None,
        )
        .unwrap(),
      )
      .await
      .unwrap();
    h.driver.start(id).await.unwrap();

    h.driver.process_next_scene(id).await.unwrap();
    let summary = h.driver.ledger().usage_summary(user).await.unwrap();
    assert_eq!(summary.words_generated, 4);
    assert_eq!(summary.extra_words_balance, 94);
  }

  #[tokio::test]
  async fn worker_chains_steps_until_complete() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let generator =
      Arc::new(ScriptedGenerator::new([ok("First."), ok("Second scene."), ok("Third and last.")]));
    let (queue, receiver) = continuation_queue();
    let ledger = Ledger::new(store.clone(), WordLimit::Monthly(5000));
    let driver = Driver::new(store.clone(), generator.clone(), Arc::new(queue), ledger);
    let (id, user) = project(&store, 3).await;

    let worker = tokio::spawn(driver.clone().run_worker(receiver));
    driver.start(id).await.unwrap();

    let mut status = WritingStatus::BackgroundWriting;
    for _ in 0..300 {
      status = store.get_project(id).await.unwrap().unwrap().writing_status;
      if status == WritingStatus::Completed {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, WritingStatus::Completed);
    assert_eq!(store.unfinished_scene_count(id).await.unwrap(), 0);
    assert_eq!(store.words_generated(user, &month_key(Utc::now())).await.unwrap(), 6);

    // Nothing is scheduled after the last scene.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(generator.requests().len(), 3);
    assert!(!worker.is_finished());
    worker.abort();
  }

  #[tokio::test]
  async fn huge_scene_target_is_capped() {
    let h = harness(vec![ok("Brief.")]).await;
    let user = Uuid::new_v4();
    let project = h
      .store
      .create_project(NewProject {
        user_id:     user,
        title:       "Everything".into(),
        genre:       None,
        description: None,
      })
      .await
      .unwrap();
    h.store
      .add_chapter(project.project_id, NewChapter {
        title:  "All of it".into(),
        scenes: vec![NewScene { summary: "The rest".into(), target_words: i64::MAX }],
      })
      .await
      .unwrap();
    h.driver.start(project.project_id).await.unwrap();

    let outcome = h.driver.process_next_scene(project.project_id).await.unwrap();
    assert_eq!(outcome, StepOutcome::Completed);
    assert_eq!(h.generator.requests()[0].max_tokens, 8192);
  }

  #[test]
  fn stall_cutoff_saturates() {
    let now = Utc::now();
    assert_eq!(stalled_before(now, Duration::from_secs(60)), now - TimeDelta::seconds(60));
    assert_eq!(stalled_before(now, Duration::MAX), DateTime::<Utc>::MIN_UTC);
  }
}
