use anyhow::Result;
use crossterm::{
    ExecutableCommand,
    event::{Event, EventStream, KeyCode, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::debug;

use crate::api::JobBackend;
use crate::app::{Mutation, Notice, NoticeLevel, Tracker};
use crate::error::RequestError;
use crate::filter::status_counts;
use crate::models::{JobApplication, Status};
use crate::store::FetchTicket;

/// A finished network call, handed back to the event loop.
enum Completion {
    Fetched {
        ticket: FetchTicket,
        result: Result<Vec<JobApplication>, RequestError>,
    },
    Mutated {
        mutation: Mutation,
        result: Result<(), RequestError>,
    },
}

#[derive(Default)]
struct UiState {
    selected: usize,
    pending: usize,
    notice: Option<Notice>,
}

impl UiState {
    fn clamp(&mut self, len: usize) {
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }

    fn next(&mut self, len: usize) {
        if len > 0 && self.selected < len - 1 {
            self.selected += 1;
        }
    }

    fn prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }
}

pub async fn run_browse<B>(tracker: &mut Tracker<B>) -> Result<()>
where
    B: JobBackend + Clone + 'static,
{
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, tracker).await;

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

async fn run_loop<B>(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    tracker: &mut Tracker<B>,
) -> Result<()>
where
    B: JobBackend + Clone + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut events = EventStream::new();
    let mut ui = UiState::default();
    let mut list_state = ListState::default();

    loop {
        let view = tracker.view();
        ui.clamp(view.len());
        list_state.select((!view.is_empty()).then_some(ui.selected));
        terminal.draw(|frame| draw(frame, tracker, &view, &ui, &mut list_state))?;

        tokio::select! {
            maybe_event = events.next() => {
                let Some(event) = maybe_event else { break };
                let Event::Key(key) = event? else { continue };
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let selected = view.get(ui.selected);
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    KeyCode::Down | KeyCode::Char('j') => ui.next(view.len()),
                    KeyCode::Up | KeyCode::Char('k') => ui.prev(),
                    KeyCode::Char('f') => {
                        let criteria = tracker.criteria_mut();
                        criteria.status = criteria.status.cycle();
                        ui.selected = 0;
                    }
                    KeyCode::Char('s') => {
                        let criteria = tracker.criteria_mut();
                        criteria.sort = criteria.sort.toggle();
                    }
                    KeyCode::Char('c') => tracker.criteria_mut().date_range.clear(),
                    KeyCode::Char('r') => spawn_fetch(tracker, &tx, &mut ui),
                    KeyCode::Char(c @ ('a' | 'i' | 'o' | 'x')) => {
                        if let Some(job) = selected {
                            if let Ok(mutation) = tracker.prepare_status_update(&job.id, status_for_key(c)) {
                                spawn_mutation(tracker, &tx, &mut ui, mutation);
                            }
                        }
                    }
                    KeyCode::Char('d') => {
                        if let Some(job) = selected {
                            if let Ok(mutation) = tracker.prepare_delete(&job.id) {
                                spawn_mutation(tracker, &tx, &mut ui, mutation);
                            }
                        }
                    }
                    KeyCode::Char('L') => {
                        let _ = tracker.logout().await;
                    }
                    _ => {}
                }
            }
            Some(done) = rx.recv() => {
                ui.pending = ui.pending.saturating_sub(1);
                match done {
                    Completion::Fetched { ticket, result } => {
                        if let Err(e) = tracker.finish_fetch(ticket, result) {
                            debug!(error = %e, "refresh failed");
                        }
                    }
                    Completion::Mutated { mutation, result } => {
                        if tracker.finish_mutation(&mutation, result).is_ok() {
                            spawn_fetch(tracker, &tx, &mut ui);
                        }
                    }
                }
            }
        }

        if let Some(notice) = tracker.drain_notices().pop() {
            ui.notice = Some(notice);
        }
    }
    Ok(())
}

fn status_for_key(c: char) -> Status {
    match c {
        'i' => Status::Interview,
        'o' => Status::Offer,
        'x' => Status::Rejected,
        _ => Status::Applied,
    }
}

fn spawn_fetch<B>(tracker: &mut Tracker<B>, tx: &UnboundedSender<Completion>, ui: &mut UiState)
where
    B: JobBackend + Clone + 'static,
{
    let ticket = tracker.issue_fetch();
    let backend = tracker.backend().clone();
    let tx = tx.clone();
    ui.pending += 1;
    tokio::spawn(async move {
        let result = backend.list().await;
        let _ = tx.send(Completion::Fetched { ticket, result });
    });
}

fn spawn_mutation<B>(
    tracker: &Tracker<B>,
    tx: &UnboundedSender<Completion>,
    ui: &mut UiState,
    mutation: Mutation,
) where
    B: JobBackend + Clone + 'static,
{
    debug!(?mutation, "sending mutation");
    let backend = tracker.backend().clone();
    let tx = tx.clone();
    ui.pending += 1;
    tokio::spawn(async move {
        let result = mutation.execute(&backend).await;
        let _ = tx.send(Completion::Mutated { mutation, result });
    });
}

fn status_style(status: Status) -> Style {
    match status {
        Status::Applied => Style::default().fg(Color::Blue),
        Status::Interview => Style::default().fg(Color::Yellow),
        Status::Offer => Style::default().fg(Color::Green),
        Status::Rejected => Style::default().fg(Color::Red),
    }
}

fn draw<B: JobBackend>(
    frame: &mut Frame,
    tracker: &Tracker<B>,
    view: &[JobApplication],
    ui: &UiState,
    list_state: &mut ListState,
) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(frame.area());

    // Header: session and active criteria
    let session = tracker.session();
    let who = match (&session.user_email, session.authenticated) {
        (Some(email), true) => email.clone(),
        (None, true) => "logged in".to_string(),
        _ => "not logged in".to_string(),
    };
    let criteria = tracker.criteria();
    let range = match criteria.date_range.bounds() {
        Some((start, end)) => format!("{} .. {}", start, end),
        None if criteria.date_range.is_set() => "incomplete, ignored".to_string(),
        None => "any date".to_string(),
    };
    let loading = if ui.pending > 0 { "  [loading]" } else { "" };
    let header = Paragraph::new(format!(
        " {}  |  status: {}  sort: {}  range: {}{}",
        who, criteria.status, criteria.sort, range, loading
    ))
    .style(Style::default().add_modifier(Modifier::BOLD));
    frame.render_widget(header, rows[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[1]);

    // Left panel: derived view
    let items: Vec<ListItem> = view
        .iter()
        .map(|job| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:<10}", job.status), status_style(job.status)),
                Span::raw(format!("{} {} | {}", job.application_date, job.company, job.role)),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!(
            " Applications ({}/{}) ",
            view.len(),
            tracker.store().collection().len()
        )))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    if view.is_empty() {
        let empty = Paragraph::new(
            "No applications found. Start by adding your first job application!",
        )
        .block(Block::default().borders(Borders::ALL).title(" Applications "))
        .wrap(Wrap { trim: true });
        frame.render_widget(empty, body[0]);
    } else {
        frame.render_stateful_widget(list, body[0], list_state);
    }

    // Right panel: detail
    let detail = Paragraph::new(build_detail(tracker, view.get(ui.selected)))
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false });
    frame.render_widget(detail, body[1]);

    // Notice line
    if let Some(notice) = &ui.notice {
        let style = match notice.level {
            NoticeLevel::Success => Style::default().fg(Color::Green),
            NoticeLevel::Error => Style::default().fg(Color::Red),
        };
        frame.render_widget(Paragraph::new(format!(" {}", notice.message)).style(style), rows[2]);
    }

    let help = Paragraph::new(
        " j/k:navigate  f:status filter  s:sort  c:clear dates  a/i/o/x:set status  d:delete  r:refresh  L:logout  q:quit",
    )
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, rows[3]);
}

fn build_detail<'a, B: JobBackend>(tracker: &Tracker<B>, job: Option<&'a JobApplication>) -> Text<'a> {
    let mut lines: Vec<Line> = Vec::new();

    if let Some(job) = job {
        lines.push(Line::from(Span::styled(
            job.role.as_str(),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(format!("at {}", job.company)));
        lines.push(Line::from(Span::styled(
            format!("Status: {}", job.status),
            status_style(job.status),
        )));
        lines.push(Line::from(format!("Applied: {}", job.application_date.format("%b %d, %Y"))));
        lines.push(Line::from(format!("Link: {}", job.link)));
        lines.push(Line::from(Span::styled(
            format!("id {}", job.id),
            Style::default().fg(Color::DarkGray),
        )));
    } else {
        lines.push(Line::from("No application selected"));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Totals",
        Style::default().add_modifier(Modifier::BOLD),
    )));
    for (status, count) in status_counts(tracker.store().collection()) {
        lines.push(Line::from(vec![
            Span::styled(format!("  {:<10}", status), status_style(status)),
            Span::raw(count.to_string()),
        ]));
    }

    Text::from(lines)
}
