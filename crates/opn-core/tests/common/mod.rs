#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use opn_core::api::{NetworkError, TaskApi};
use opn_core::controller::{ControllerOptions, TaskController};
use opn_core::session::{self, MemorySessionStore, SessionStore};
use opn_shared::{
    Institution, LoginRequest, LoginResponse, Product, RankingEntry, Task, TaskStatus,
};
use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Login { idn: String, user_name: String },
    FetchTask { marker: String, user_id: String },
    Complete(String),
    Cancel(String),
    Completed(String),
    Ranking,
}

/// Scripted `TaskApi`. Every call is recorded with the (virtual) time it
/// was made; unscripted fetches fail.
#[derive(Default)]
pub struct FakeApi {
    pub login_response: Mutex<Option<LoginResponse>>,
    pub fetches: Mutex<VecDeque<Result<Task, String>>>,
    pub latency: Mutex<Duration>,
    pub finish_results: Mutex<VecDeque<bool>>,
    pub completed: Mutex<Option<Vec<Task>>>,
    pub ranking: Mutex<Option<Vec<RankingEntry>>>,
    calls: Mutex<Vec<(Call, Instant)>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_fetch_ok(&self, task: Task) {
        self.fetches.lock().push_back(Ok(task));
    }

    pub fn push_fetch_err(&self) {
        self.fetches
            .lock()
            .push_back(Err("connection refused".to_string()));
    }

    pub fn push_finish(&self, ok: bool) {
        self.finish_results.lock().push_back(ok);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|(_, at)| *at).collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::FetchTask { .. }))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push((call, Instant::now()));
    }

    async fn wait(&self) {
        let delay = *self.latency.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn finish_result(&self, operation: &'static str) -> Result<(), NetworkError> {
        let ok = self.finish_results.lock().pop_front().unwrap_or(true);
        if ok {
            Ok(())
        } else {
            Err(NetworkError::Status {
                operation,
                status: 500,
            })
        }
    }
}

#[async_trait]
impl TaskApi for FakeApi {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, NetworkError> {
        self.record(Call::Login {
            idn: request.idn.clone(),
            user_name: request.user_name.clone(),
        });
        self.login_response
            .lock()
            .clone()
            .ok_or_else(|| NetworkError::Status {
                operation: "login",
                status: 400,
            })
    }

    async fn fetch_task(&self, session_marker: &str, user_id: &str) -> Result<Task, NetworkError> {
        self.record(Call::FetchTask {
            marker: session_marker.to_string(),
            user_id: user_id.to_string(),
        });
        self.wait().await;
        match self.fetches.lock().pop_front() {
            Some(Ok(task)) => Ok(task),
            Some(Err(detail)) => Err(NetworkError::other("fetch task", detail)),
            None => Err(NetworkError::other("fetch task", "unscripted fetch")),
        }
    }

    async fn complete_task(&self, user_id: &str) -> Result<(), NetworkError> {
        self.record(Call::Complete(user_id.to_string()));
        self.wait().await;
        self.finish_result("complete task")
    }

    async fn cancel_task(&self, user_id: &str) -> Result<(), NetworkError> {
        self.record(Call::Cancel(user_id.to_string()));
        self.wait().await;
        self.finish_result("cancel task")
    }

    async fn list_completed_tasks(&self, user_id: &str) -> Result<Vec<Task>, NetworkError> {
        self.record(Call::Completed(user_id.to_string()));
        self.completed
            .lock()
            .clone()
            .ok_or_else(|| NetworkError::other("list completed tasks", "timed out"))
    }

    async fn get_ranking(&self) -> Result<Vec<RankingEntry>, NetworkError> {
        self.record(Call::Ranking);
        self.ranking
            .lock()
            .clone()
            .ok_or_else(|| NetworkError::other("get ranking", "timed out"))
    }
}

pub fn sample_task(id: u64) -> Task {
    Task {
        id,
        user_id: Some("123".to_string()),
        amount: 5,
        status: TaskStatus::Pending,
        creation_time: Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp"),
        conclusion_time: None,
        cancel_time: None,
        product_id: Some(7),
        product: Product {
            id: 7,
            name: "Arroz".to_string(),
            initial_amount: 100,
            current_amount: 40,
        },
        institution_id: Some(3),
        institution: Institution {
            id: 3,
            name: "Lar Esperança".to_string(),
        },
    }
}

pub fn logged_in_store() -> Arc<MemorySessionStore> {
    Arc::new(MemorySessionStore::with_entries([
        (session::TOKEN_KEY, "marker-abc"),
        (session::USER_NAME_KEY, "Ana"),
        (session::IDN_KEY, "123"),
    ]))
}

pub fn controller(
    api: &Arc<FakeApi>,
    store: &Arc<MemorySessionStore>,
    autoload: bool,
) -> TaskController {
    let api: Arc<dyn TaskApi> = api.clone();
    let store: Arc<dyn SessionStore> = store.clone();
    TaskController::new(
        api,
        store,
        ControllerOptions {
            autoload,
            ..ControllerOptions::default()
        },
    )
}
