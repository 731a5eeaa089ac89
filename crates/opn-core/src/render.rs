use std::io::{self, IsTerminal, Write};

use chrono::Local;
use opn_shared::{RankingEntry, Task};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::controller::{Notification, Route, Severity, TaskViewState, ViewState};
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self::for_terminal(cfg, io::stdout().is_terminal())
    }

    fn for_terminal(cfg: &Config, is_tty: bool) -> Self {
        let color = cfg.get_bool("color").unwrap_or(true);
        Self {
            color: color && is_tty,
        }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, state))]
    pub fn print_state(&self, state: &TaskViewState) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_state(&mut out, state)?;
        out.flush()?;
        Ok(())
    }

    /// Loading and error screens replace the active view; the notification
    /// is overlaid on whatever is shown.
    pub fn write_state<W: Write>(&self, out: &mut W, state: &TaskViewState) -> anyhow::Result<()> {
        match state.route {
            Route::Login | Route::Unmounted => {
                writeln!(
                    out,
                    "Você não está logado. Use `opn login --idn <IDN> --name <NOME>`."
                )?;
            }
            Route::Tasks if state.loading => {
                writeln!(out, "Carregando tarefas...")?;
            }
            Route::Tasks if state.error.is_some() => {
                let message = state.error.clone().unwrap_or_default();
                writeln!(out, "{}", self.paint(&message, "31"))?;
            }
            Route::Tasks => {
                if let Some(session) = state.session.as_ref() {
                    self.write_greeting(out, session)?;
                }
                match state.active_view {
                    ViewState::Task => self.write_task(out, state.task.as_ref())?,
                    ViewState::CompletedList => self.write_completed(out, &state.completed_tasks)?,
                    ViewState::Ranking => self.write_ranking(out, &state.ranking)?,
                }
            }
        }

        if let Some(notification) = state.notification.as_ref() {
            writeln!(out)?;
            self.write_notification(out, notification)?;
        }
        Ok(())
    }

    pub fn write_greeting<W: Write>(&self, out: &mut W, session: &Session) -> anyhow::Result<()> {
        if session.display_name.is_empty() {
            writeln!(out, "Bem-vindo! (IDN {})", session.user_id)?;
        } else {
            writeln!(out, "Bem-vindo, {} (IDN {})", session.display_name, session.user_id)?;
        }
        writeln!(out)?;
        Ok(())
    }

    pub fn write_task<W: Write>(&self, out: &mut W, task: Option<&Task>) -> anyhow::Result<()> {
        let Some(task) = task else {
            writeln!(out, "Nenhuma tarefa no momento. Use `opn task` para receber uma.")?;
            return Ok(());
        };

        writeln!(out, "{}", self.paint("Você tem que levar", "1"))?;
        writeln!(
            out,
            "  {}: {} unidades",
            self.paint(&task.product.name, "33"),
            task.amount
        )?;
        writeln!(out, "  Para a Instituição: {}", task.institution.name)?;
        writeln!(
            out,
            "  Tarefa #{} criada em {}",
            task.id,
            task.creation_time
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
        )?;
        Ok(())
    }

    pub fn write_completed<W: Write>(&self, out: &mut W, tasks: &[Task]) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint("Tarefas Completadas", "1"))?;
        if tasks.is_empty() {
            writeln!(out, "Nenhuma tarefa completada ainda.")?;
            return Ok(());
        }

        let headers = ["Produto", "Unidades", "Instituição", "Concluída"];
        let rows = tasks
            .iter()
            .map(|task| {
                vec![
                    task.product.name.clone(),
                    task.amount.to_string(),
                    task.institution.name.clone(),
                    task.conclusion_time
                        .map(|at| at.with_timezone(&Local).format("%Y-%m-%d").to_string())
                        .unwrap_or_default(),
                ]
            })
            .collect();
        write_table(out, &headers, rows)
    }

    pub fn write_ranking<W: Write>(
        &self,
        out: &mut W,
        ranking: &[RankingEntry],
    ) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint("Ranking", "1"))?;
        if ranking.is_empty() {
            writeln!(out, "Ranking vazio.")?;
            return Ok(());
        }

        let headers = ["#", "Nome", "Tarefas"];
        let rows = ranking
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                vec![
                    self.paint(&(idx + 1).to_string(), "33"),
                    entry.name.clone(),
                    entry.completed_tasks.to_string(),
                ]
            })
            .collect();
        write_table(out, &headers, rows)
    }

    pub fn write_notification<W: Write>(
        &self,
        out: &mut W,
        notification: &Notification,
    ) -> anyhow::Result<()> {
        let (code, marker) = match notification.severity {
            Severity::Success => ("32", "ok"),
            Severity::Error => ("31", "erro"),
            Severity::Info => ("34", "info"),
        };
        writeln!(
            out,
            "{} {}",
            self.paint(&format!("[{marker}]"), code),
            notification.message
        )?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(out: &mut W, headers: &[&str], rows: Vec<Vec<String>>) -> anyhow::Result<()> {
    let mut widths: Vec<usize> = headers.iter().map(|h| UnicodeWidthStr::width(*h)).collect();

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            widths[idx] = widths[idx].max(visible);
        }
    }

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    write_row(out, &header_cells, &widths)?;
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_row(out, &rule, &widths)?;
    for row in &rows {
        write_row(out, row, &widths)?;
    }
    Ok(())
}

fn write_row<W: Write>(out: &mut W, cells: &[String], widths: &[usize]) -> anyhow::Result<()> {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let visible = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            format!("{cell}{}", " ".repeat(width.saturating_sub(visible)))
        })
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(out, "{}", line.trim_end())?;
    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }
        if ch == '\x1b' {
            escaped = true;
            continue;
        }
        out.push(ch);
    }

    out
}
