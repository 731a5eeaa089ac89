use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, info, instrument};

use crate::api::{HttpTaskApi, TaskApi};
use crate::auth::{self, LoginForm};
use crate::cli::Command;
use crate::config::Config;
use crate::controller::{ControllerOptions, Outcome, TaskController};
use crate::render::Renderer;
use crate::session::{self, Session, SessionStore};
use crate::shell;

pub(crate) const NOT_LOGGED_IN: &str =
    "not logged in; run `opn login --idn <IDN> --name <NAME>` first";

pub(crate) const CONFIRM_COMPLETE: &str = "Terminou a tarefa? Mesmo? Checou?";
pub(crate) const CONFIRM_CANCEL: &str = "Você tem certeza que quer cancelar esta tarefa?";
pub(crate) const CONFIRM_LOGOUT: &str = "Você tem certeza que quer fazer logout?";

/// Line-oriented stdin shared by confirmation prompts and the shell.
pub struct Console {
    lines: Lines<BufReader<Stdin>>,
}

impl Console {
    pub fn stdin() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    pub async fn read_line(&mut self) -> anyhow::Result<Option<String>> {
        self.lines.next_line().await.context("failed reading stdin")
    }

    pub async fn confirm(&mut self, question: &str) -> anyhow::Result<bool> {
        {
            let mut out = std::io::stdout().lock();
            write!(out, "{question} [s/N] ")?;
            out.flush()?;
        }
        let answer = self.read_line().await?.unwrap_or_default();
        Ok(is_yes(&answer))
    }
}

pub(crate) fn is_yes(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "s" | "sim" | "y" | "yes"
    )
}

pub(crate) fn outcome_result(outcome: Outcome, action: &str) -> anyhow::Result<()> {
    match outcome {
        Outcome::Applied | Outcome::RetryScheduled => Ok(()),
        Outcome::Unauthenticated => Err(anyhow!(NOT_LOGGED_IN)),
        Outcome::Failed => Err(anyhow!("{action} failed")),
        Outcome::Busy => Err(anyhow!("{action} is already in progress")),
        Outcome::Disposed => Err(anyhow!("{action} was interrupted")),
    }
}

#[instrument(skip_all, fields(command = ?command))]
pub async fn dispatch(
    store: Arc<dyn SessionStore>,
    cfg: &Config,
    renderer: &Renderer,
    command: Command,
) -> anyhow::Result<()> {
    let session = session::read_session(store.as_ref())?;
    let http = Arc::new(
        HttpTaskApi::new(&cfg.api_url(), cfg.api_timeout()?)?
            .with_session_marker(session.as_ref().and_then(|s| s.session_marker.clone())),
    );
    let api: Arc<dyn TaskApi> = http.clone();
    let mut console = Console::stdin();

    debug!(api_url = %cfg.api_url(), logged_in = session.is_some(), "dispatching command");

    match command {
        Command::Login { idn, user_name } => {
            let form = LoginForm::new(idn, user_name);
            let session = auth::login(api.as_ref(), store.as_ref(), &form).await?;
            http.set_session_marker(session.session_marker.clone());
            println!("Bem-vindo, {}!", session.display_name);
            if let Some(task) = session::stored_task(store.as_ref())? {
                println!();
                renderer.write_task(&mut std::io::stdout().lock(), Some(&task))?;
            }
            Ok(())
        }
        Command::Whoami => whoami(session.as_ref()),
        Command::Shell => shell::run(api, store, cfg, renderer, console).await,
        Command::Task => {
            let controller = open_controller(api, store, true).await?;
            let state = controller.settled().await;
            renderer.print_state(&state)?;
            if state.error.is_some() {
                bail!("could not fetch a task");
            }
            Ok(())
        }
        Command::Complete { yes } => {
            let controller = open_controller(api, store, false).await?;
            renderer.write_task(&mut std::io::stdout().lock(), controller.snapshot().task.as_ref())?;
            if !yes && !console.confirm(CONFIRM_COMPLETE).await? {
                println!("Nada foi alterado.");
                return Ok(());
            }
            let outcome = controller.complete_task().await;
            renderer.print_state(&controller.snapshot())?;
            outcome_result(outcome, "completing the task")
        }
        Command::Cancel { yes } => {
            let controller = open_controller(api, store, false).await?;
            renderer.write_task(&mut std::io::stdout().lock(), controller.snapshot().task.as_ref())?;
            if !yes && !console.confirm(CONFIRM_CANCEL).await? {
                println!("Nada foi alterado.");
                return Ok(());
            }
            let outcome = controller.cancel_task().await;
            renderer.print_state(&controller.snapshot())?;
            outcome_result(outcome, "cancelling the task")
        }
        Command::Completed => {
            let controller = open_controller(api, store, false).await?;
            let outcome = controller.load_completed_tasks().await;
            renderer.print_state(&controller.snapshot())?;
            outcome_result(outcome, "listing completed tasks")
        }
        Command::Ranking => {
            let controller = open_controller(api, store, false).await?;
            let outcome = controller.load_ranking().await;
            renderer.print_state(&controller.snapshot())?;
            outcome_result(outcome, "loading the ranking")
        }
        Command::Logout { yes } => {
            if session.is_none() {
                println!("Nenhuma sessão ativa.");
                return Ok(());
            }
            if !yes && !console.confirm(CONFIRM_LOGOUT).await? {
                println!("Nada foi alterado.");
                return Ok(());
            }
            let controller = open_controller(api, store, false).await?;
            let outcome = controller.logout();
            println!("Sessão encerrada.");
            outcome_result(outcome, "logging out")
        }
    }
}

pub(crate) async fn open_controller(
    api: Arc<dyn TaskApi>,
    store: Arc<dyn SessionStore>,
    autoload: bool,
) -> anyhow::Result<TaskController> {
    let options = ControllerOptions {
        autoload,
        ..ControllerOptions::default()
    };
    let controller = TaskController::new(api, store, options);
    if controller.mount().await == Outcome::Unauthenticated {
        bail!(NOT_LOGGED_IN);
    }
    Ok(controller)
}

fn whoami(session: Option<&Session>) -> anyhow::Result<()> {
    let session = session.ok_or_else(|| anyhow!(NOT_LOGGED_IN))?;
    info!(user_id = %session.user_id, "session present");
    println!("{} (IDN {})", session.display_name, session.user_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_answers_accept_portuguese_and_english() {
        for answer in ["s", "Sim", " y ", "YES"] {
            assert!(is_yes(answer), "{answer:?} should confirm");
        }
        for answer in ["", "n", "não", "maybe"] {
            assert!(!is_yes(answer), "{answer:?} should not confirm");
        }
    }

    #[test]
    fn outcomes_map_to_cli_errors() {
        assert!(outcome_result(Outcome::Applied, "x").is_ok());
        let err = outcome_result(Outcome::Unauthenticated, "x").expect_err("unauthenticated");
        assert!(err.to_string().contains("opn login"));
        let err = outcome_result(Outcome::Failed, "loading the ranking").expect_err("failed");
        assert_eq!(err.to_string(), "loading the ranking failed");
    }
}
