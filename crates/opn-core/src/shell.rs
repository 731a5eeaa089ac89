use std::io::Write;
use std::sync::Arc;

use anyhow::bail;
use tracing::{debug, warn};

use crate::api::TaskApi;
use crate::commands::{
    CONFIRM_CANCEL, CONFIRM_COMPLETE, CONFIRM_LOGOUT, Console, NOT_LOGGED_IN, outcome_result,
};
use crate::config::Config;
use crate::controller::{ControllerOptions, Outcome, Route, TaskController, ViewState};
use crate::render::Renderer;
use crate::session::SessionStore;

const HELP: &str = "\
comandos:
  task                  receber/atualizar a tarefa
  complete              marcar a tarefa como concluída
  cancel                cancelar a tarefa
  completed             listar tarefas completadas
  ranking               ver o ranking
  view task|completed|ranking
                        voltar a uma tela já carregada
  dismiss               fechar a notificação
  logout                encerrar a sessão
  help                  esta ajuda
  quit                  sair";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellCommand {
    Task,
    Complete,
    Cancel,
    Completed,
    Ranking,
    View(ViewState),
    Show,
    Dismiss,
    Logout,
    Help,
    Quit,
}

impl ShellCommand {
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let arg = words.next();

        let command = match head.to_ascii_lowercase().as_str() {
            "task" | "t" => ShellCommand::Task,
            "complete" | "done" => ShellCommand::Complete,
            "cancel" => ShellCommand::Cancel,
            "completed" | "history" => ShellCommand::Completed,
            "ranking" | "rank" => ShellCommand::Ranking,
            "view" => match arg.map(|a| a.to_ascii_lowercase()) {
                None => ShellCommand::Show,
                Some(name) => ShellCommand::View(parse_view(&name)?),
            },
            "dismiss" => ShellCommand::Dismiss,
            "logout" => ShellCommand::Logout,
            "help" | "?" => ShellCommand::Help,
            "quit" | "exit" | "q" => ShellCommand::Quit,
            other => return Err(format!("comando desconhecido: {other} (use `help`)")),
        };
        Ok(Some(command))
    }
}

fn parse_view(name: &str) -> Result<ViewState, String> {
    match name {
        "task" => Ok(ViewState::Task),
        "completed" => Ok(ViewState::CompletedList),
        "ranking" => Ok(ViewState::Ranking),
        other => Err(format!("tela desconhecida: {other}")),
    }
}

/// Interactive loop over a single controller, so every loaded view stays
/// cached while the volunteer moves between them.
pub async fn run(
    api: Arc<dyn TaskApi>,
    store: Arc<dyn SessionStore>,
    cfg: &Config,
    renderer: &Renderer,
    mut console: Console,
) -> anyhow::Result<()> {
    let options = ControllerOptions {
        autoload: cfg.autoload(),
        ..ControllerOptions::default()
    };
    let controller = TaskController::new(api, store, options);
    if controller.mount().await == Outcome::Unauthenticated {
        bail!(NOT_LOGGED_IN);
    }
    renderer.print_state(&controller.settled().await)?;
    println!("\n{HELP}");

    loop {
        prompt()?;
        let line = tokio::select! {
            line = console.read_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                warn!("received interrupt; leaving shell");
                None
            }
        };
        let Some(line) = line else {
            break;
        };

        let command = match ShellCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        debug!(?command, "shell command");

        let outcome = match command {
            ShellCommand::Quit => break,
            ShellCommand::Help => {
                println!("{HELP}");
                continue;
            }
            ShellCommand::Task => controller.load_task().await,
            ShellCommand::Complete => {
                if !console.confirm(CONFIRM_COMPLETE).await? {
                    continue;
                }
                controller.complete_task().await
            }
            ShellCommand::Cancel => {
                if !console.confirm(CONFIRM_CANCEL).await? {
                    continue;
                }
                controller.cancel_task().await
            }
            ShellCommand::Completed => controller.load_completed_tasks().await,
            ShellCommand::Ranking => controller.load_ranking().await,
            ShellCommand::View(view) => {
                controller.select_view(view);
                Outcome::Applied
            }
            ShellCommand::Show => Outcome::Applied,
            ShellCommand::Dismiss => {
                controller.dismiss_notification();
                Outcome::Applied
            }
            ShellCommand::Logout => {
                if !console.confirm(CONFIRM_LOGOUT).await? {
                    continue;
                }
                controller.logout()
            }
        };

        let state = controller.settled().await;
        renderer.print_state(&state)?;
        if let Err(err) = outcome_result(outcome, "the last action") {
            debug!(error = %err, "shell action did not apply");
        }
        if state.route == Route::Login {
            break;
        }
    }

    controller.dispose();
    Ok(())
}

fn prompt() -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    write!(out, "\nopn> ")?;
    out.flush()?;
    Ok(())
}
