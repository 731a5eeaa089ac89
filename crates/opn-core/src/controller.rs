//! Task view-state controller.
//!
//! Owns everything the task screen renders: the current task, the completed
//! list, the ranking, which of those is shown, and the loading/error/
//! notification overlays. Every API outcome is mapped to a state transition
//! here; failures never leave the controller.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use opn_shared::{RankingEntry, Task};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::api::{NetworkError, TaskApi};
use crate::schedule::ScheduledTask;
use crate::session::{self, Session, SessionStore};

pub const RETRY_DELAY: Duration = Duration::from_millis(1000);
pub const NOTIFICATION_TTL: Duration = Duration::from_millis(3000);

pub mod messages {
    pub const FETCH_FAILED: &str = "Falha ao buscar tarefas. Tente novamente mais tarde.";
    pub const COMPLETED: &str = "Tarefa completada!";
    pub const COMPLETE_FAILED: &str = "Falha ao completar tarefa.";
    pub const CANCELLED: &str = "Tarefa cancelada.";
    pub const CANCEL_FAILED: &str = "Falha ao cancelar tarefa.";
    pub const COMPLETED_LIST_FAILED: &str = "Falha ao buscar tarefas completadas.";
    pub const RANKING_FAILED: &str = "Falha ao buscar ranking.";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    #[default]
    Unmounted,
    Login,
    Tasks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewState {
    #[default]
    Task,
    CompletedList,
    Ranking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default)]
pub struct TaskViewState {
    pub route: Route,
    pub session: Option<Session>,
    pub task: Option<Task>,
    pub completed_tasks: Vec<Task>,
    pub ranking: Vec<RankingEntry>,
    pub active_view: ViewState,
    pub loading: bool,
    pub error: Option<String>,
    pub notification: Option<Notification>,
}

/// Categories guarded against concurrent duplicates. Task fetches are
/// guarded by the `loading` flag instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Complete,
    Cancel,
    CompletedList,
    Ranking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    RetryScheduled,
    Failed,
    Busy,
    Unauthenticated,
    Disposed,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub autoload: bool,
    pub retry_delay: Duration,
    pub notification_ttl: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            autoload: true,
            retry_delay: RETRY_DELAY,
            notification_ttl: NOTIFICATION_TTL,
        }
    }
}

#[derive(Default)]
struct Timers {
    retry: Option<ScheduledTask>,
    notification: Option<ScheduledTask>,
}

struct Shared {
    api: Arc<dyn TaskApi>,
    store: Arc<dyn SessionStore>,
    options: ControllerOptions,
    state: watch::Sender<TaskViewState>,
    timers: Mutex<Timers>,
    in_flight: Mutex<HashSet<ActionKind>>,
    disposed: AtomicBool,
}

pub struct TaskController {
    shared: Arc<Shared>,
}

struct InFlight<'a> {
    shared: &'a Shared,
    kind: ActionKind,
}

impl<'a> InFlight<'a> {
    fn acquire(shared: &'a Shared, kind: ActionKind) -> Option<Self> {
        if shared.in_flight.lock().insert(kind) {
            Some(Self { shared, kind })
        } else {
            debug!(?kind, "action already in flight");
            None
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.shared.in_flight.lock().remove(&self.kind);
    }
}

#[derive(Debug, Clone, Copy)]
enum Finish {
    Complete,
    Cancel,
}

impl Finish {
    fn kind(self) -> ActionKind {
        match self {
            Finish::Complete => ActionKind::Complete,
            Finish::Cancel => ActionKind::Cancel,
        }
    }

    fn messages(self) -> (&'static str, &'static str) {
        match self {
            Finish::Complete => (messages::COMPLETED, messages::COMPLETE_FAILED),
            Finish::Cancel => (messages::CANCELLED, messages::CANCEL_FAILED),
        }
    }
}

impl TaskController {
    pub fn new(
        api: Arc<dyn TaskApi>,
        store: Arc<dyn SessionStore>,
        options: ControllerOptions,
    ) -> Self {
        let (state, _) = watch::channel(TaskViewState::default());
        Self {
            shared: Arc::new(Shared {
                api,
                store,
                options,
                state,
                timers: Mutex::new(Timers::default()),
                in_flight: Mutex::new(HashSet::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn snapshot(&self) -> TaskViewState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskViewState> {
        self.shared.state.subscribe()
    }

    /// Waits until no task fetch (or its pending retry) is outstanding.
    pub async fn settled(&self) -> TaskViewState {
        let mut rx = self.shared.state.subscribe();
        let settled = match rx.wait_for(|state| !state.loading).await {
            Ok(state) => Some(state.clone()),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| self.snapshot())
    }

    /// Reads the session and, when one is present, enters the task screen.
    #[instrument(skip(self))]
    pub async fn mount(&self) -> Outcome {
        if self.shared.is_disposed() {
            return Outcome::Disposed;
        }

        let session = match session::read_session(self.shared.store.as_ref()) {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed reading session; treating as logged out");
                None
            }
        };

        let Some(session) = session.filter(Session::is_authenticated) else {
            info!("no session; redirecting to login");
            self.shared.state.send_modify(|state| {
                state.route = Route::Login;
                state.session = None;
            });
            return Outcome::Unauthenticated;
        };

        let cached = match session::stored_task(self.shared.store.as_ref()) {
            Ok(task) => task.filter(Task::is_pending),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed reading stored task");
                None
            }
        };

        info!(user_id = %session.user_id, has_cached_task = cached.is_some(), "mounted task screen");
        self.shared.state.send_modify(|state| {
            state.route = Route::Tasks;
            state.session = Some(session);
            if state.task.is_none() {
                state.task = cached;
            }
        });

        if self.shared.options.autoload {
            self.load_task().await
        } else {
            Outcome::Applied
        }
    }

    /// Fetches (or creates) the volunteer's task. A failed first attempt is
    /// retried exactly once after the retry delay.
    #[instrument(skip(self))]
    pub async fn load_task(&self) -> Outcome {
        let shared = &self.shared;
        if shared.is_disposed() {
            return Outcome::Disposed;
        }
        let Some(session) = shared.session() else {
            return Outcome::Unauthenticated;
        };
        if !shared.begin_loading() {
            debug!("task fetch already in flight");
            return Outcome::Busy;
        }

        match shared.fetch(&session).await {
            Ok(task) => shared.apply_fetched(task),
            Err(err) => {
                warn!(error = %err, delay_ms = shared.options.retry_delay.as_millis() as u64, "task fetch failed; scheduling retry");
                Shared::schedule_retry(shared, session);
                Outcome::RetryScheduled
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn complete_task(&self) -> Outcome {
        Shared::finish_task(&self.shared, Finish::Complete).await
    }

    #[instrument(skip(self))]
    pub async fn cancel_task(&self) -> Outcome {
        Shared::finish_task(&self.shared, Finish::Cancel).await
    }

    #[instrument(skip(self))]
    pub async fn load_completed_tasks(&self) -> Outcome {
        let shared = &self.shared;
        if shared.is_disposed() {
            return Outcome::Disposed;
        }
        let Some(session) = shared.session() else {
            return Outcome::Unauthenticated;
        };
        let Some(_guard) = InFlight::acquire(shared, ActionKind::CompletedList) else {
            return Outcome::Busy;
        };

        match shared.api.list_completed_tasks(&session.user_id).await {
            Ok(tasks) => {
                if shared.is_disposed() {
                    return Outcome::Disposed;
                }
                debug!(count = tasks.len(), "loaded completed tasks");
                shared.state.send_modify(|state| {
                    state.completed_tasks = tasks;
                    state.active_view = ViewState::CompletedList;
                });
                Outcome::Applied
            }
            Err(err) => {
                warn!(error = %err, "loading completed tasks failed");
                Shared::notify(shared, Severity::Error, messages::COMPLETED_LIST_FAILED);
                Outcome::Failed
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn load_ranking(&self) -> Outcome {
        let shared = &self.shared;
        if shared.is_disposed() {
            return Outcome::Disposed;
        }
        if shared.session().is_none() {
            return Outcome::Unauthenticated;
        }
        let Some(_guard) = InFlight::acquire(shared, ActionKind::Ranking) else {
            return Outcome::Busy;
        };

        match shared.api.get_ranking().await {
            Ok(ranking) => {
                if shared.is_disposed() {
                    return Outcome::Disposed;
                }
                debug!(count = ranking.len(), "loaded ranking");
                shared.state.send_modify(|state| {
                    state.ranking = ranking;
                    state.active_view = ViewState::Ranking;
                });
                Outcome::Applied
            }
            Err(err) => {
                warn!(error = %err, "loading ranking failed");
                Shared::notify(shared, Severity::Error, messages::RANKING_FAILED);
                Outcome::Failed
            }
        }
    }

    /// Switches the visible dataset without calling the API.
    pub fn select_view(&self, view: ViewState) {
        if self.shared.is_disposed() {
            return;
        }
        self.shared.state.send_if_modified(|state| {
            if state.active_view == view {
                return false;
            }
            state.active_view = view;
            true
        });
    }

    /// Clears the session and routes back to login. No API call is made.
    #[instrument(skip(self))]
    pub fn logout(&self) -> Outcome {
        let shared = &self.shared;
        if let Some(retry) = shared.timers.lock().retry.take() {
            retry.cancel();
        }

        let cleared = session::clear_session(shared.store.as_ref());
        shared.state.send_modify(|state| {
            let notification = state.notification.take();
            *state = TaskViewState {
                route: Route::Login,
                notification,
                ..TaskViewState::default()
            };
        });

        match cleared {
            Ok(()) => Outcome::Applied,
            Err(err) => {
                error!(error = %format!("{err:#}"), "failed clearing session store");
                Outcome::Failed
            }
        }
    }

    /// Removes the current notification and its pending auto-dismiss.
    pub fn dismiss_notification(&self) -> bool {
        if let Some(timer) = self.shared.timers.lock().notification.take() {
            timer.cancel();
        }
        self.shared
            .state
            .send_if_modified(|state| state.notification.take().is_some())
    }

    /// Cancels every scheduled retry and dismissal. After this no scheduled
    /// work touches the state.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let timers = std::mem::take(&mut *self.shared.timers.lock());
        let pending = [timers.retry.is_some(), timers.notification.is_some()];
        drop(timers);
        debug!(retry_pending = pending[0], notification_pending = pending[1], "controller disposed");

        self.shared.state.send_if_modified(|state| {
            let was_loading = state.loading;
            state.loading = false;
            was_loading
        });
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }
}

impl Drop for TaskController {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Shared {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn session(&self) -> Option<Session> {
        let state = self.state.borrow();
        if state.route != Route::Tasks {
            return None;
        }
        state.session.clone()
    }

    fn begin_loading(&self) -> bool {
        let mut started = false;
        self.state.send_if_modified(|state| {
            if state.loading {
                return false;
            }
            state.loading = true;
            started = true;
            true
        });
        started
    }

    async fn fetch(&self, session: &Session) -> Result<Task, NetworkError> {
        let marker = session.session_marker.as_deref().unwrap_or_default();
        self.api.fetch_task(marker, &session.user_id).await
    }

    fn apply_fetched(&self, task: Task) -> Outcome {
        if self.is_disposed() {
            return Outcome::Disposed;
        }
        info!(task_id = task.id, product = %task.product.name, "task loaded");
        if let Err(err) = session::store_task(self.store.as_ref(), &task) {
            warn!(error = %format!("{err:#}"), "failed caching task in session store");
        }
        self.state.send_modify(|state| {
            state.task = Some(task);
            state.active_view = ViewState::Task;
            state.error = None;
            state.loading = false;
        });
        Outcome::Applied
    }

    fn apply_fetch_exhausted(&self, err: &NetworkError) -> Outcome {
        if self.is_disposed() {
            return Outcome::Disposed;
        }
        error!(error = %err, "task fetch retry failed");
        self.state.send_modify(|state| {
            state.error = Some(messages::FETCH_FAILED.to_string());
            state.loading = false;
        });
        Outcome::Failed
    }

    fn schedule_retry(shared: &Arc<Shared>, session: Session) {
        let worker = Arc::clone(shared);
        let retry = ScheduledTask::after("task fetch retry", shared.options.retry_delay, async move {
            if worker.is_disposed() {
                return;
            }
            debug!(attempt = 2, "retrying task fetch");
            match worker.fetch(&session).await {
                Ok(task) => {
                    worker.apply_fetched(task);
                }
                Err(err) => {
                    worker.apply_fetch_exhausted(&err);
                }
            }
        });

        if let Some(previous) = shared.timers.lock().retry.replace(retry) {
            previous.cancel();
        }
    }

    async fn finish_task(shared: &Arc<Shared>, finish: Finish) -> Outcome {
        if shared.is_disposed() {
            return Outcome::Disposed;
        }
        let Some(session) = shared.session() else {
            return Outcome::Unauthenticated;
        };
        let Some(_guard) = InFlight::acquire(shared, finish.kind()) else {
            return Outcome::Busy;
        };

        let (success, failure) = finish.messages();
        let result = match finish {
            Finish::Complete => shared.api.complete_task(&session.user_id).await,
            Finish::Cancel => shared.api.cancel_task(&session.user_id).await,
        };

        match result {
            Ok(()) => {
                if shared.is_disposed() {
                    return Outcome::Disposed;
                }
                info!(?finish, user_id = %session.user_id, "task finished");
                if let Err(err) = shared.store.remove(session::TASK_KEY) {
                    warn!(error = %format!("{err:#}"), "failed dropping cached task");
                }
                shared.state.send_modify(|state| state.task = None);
                Shared::notify(shared, Severity::Success, success);
                Outcome::Applied
            }
            Err(err) => {
                warn!(?finish, error = %err, "finishing task failed");
                Shared::notify(shared, Severity::Error, failure);
                Outcome::Failed
            }
        }
    }

    fn notify(shared: &Arc<Shared>, severity: Severity, message: &str) {
        if shared.is_disposed() {
            return;
        }
        let notification = Notification {
            id: Uuid::new_v4(),
            message: message.to_string(),
            severity,
        };
        let id = notification.id;
        shared
            .state
            .send_modify(|state| state.notification = Some(notification));

        let worker = Arc::clone(shared);
        let timer = ScheduledTask::after("notification dismiss", shared.options.notification_ttl, async move {
            worker.expire_notification(id);
        });
        if let Some(previous) = shared.timers.lock().notification.replace(timer) {
            previous.cancel();
        }
    }

    fn expire_notification(&self, id: Uuid) {
        if self.is_disposed() {
            return;
        }
        self.state.send_if_modified(|state| {
            if state.notification.as_ref().is_some_and(|n| n.id == id) {
                state.notification = None;
                true
            } else {
                false
            }
        });
    }
}
