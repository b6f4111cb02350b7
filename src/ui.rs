pub mod screen;

use itertools::Itertools;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
};
use skilltest::{
    assessment::{AnswerOption, AnswerSheet, Question},
    clock::Clock,
    controller::TestController,
    session::{SessionOutcome, SessionPhase},
    store::KvStore,
};
use unicode_width::UnicodeWidthStr;

use crate::App;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

const BACK_HINT: &str = "(enter) back to My Applications";

/// Below this many seconds the timer badge turns red
const LOW_TIME_SECS: u64 = 60;

/// Left title and right badge on one line, padded to `width` columns
pub fn header_line(title: &str, badge: &str, width: usize) -> String {
    let used = title.width() + badge.width();
    if used >= width {
        return format!("{title} {badge}");
    }
    format!("{title}{}{badge}", " ".repeat(width - used))
}

/// Question strip: `[3]` marks the focused question, `●` an answered one
pub fn navigator(questions: &[Question], answers: &AnswerSheet, cursor: usize) -> String {
    questions
        .iter()
        .enumerate()
        .map(|(idx, q)| {
            let mark = if answers.selected(q.id).is_some() { "●" } else { "○" };
            if idx == cursor {
                format!("[{}{mark}]", idx + 1)
            } else {
                format!(" {}{mark} ", idx + 1)
            }
        })
        .join("")
}

impl<S: KvStore + Clone, C: Clock + Clone> Widget for &App<S, C> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(controller) = self.controller.as_ref() else {
            return;
        };

        match controller.phase() {
            SessionPhase::Active | SessionPhase::Submitting | SessionPhase::NotStarted => {
                render_questions(self, controller, area, buf)
            }
            SessionPhase::Submitted | SessionPhase::SubmitFailed | SessionPhase::AlreadySubmitted => {
                render_outcome(controller, area, buf)
            }
        }
    }
}

fn render_questions<S: KvStore + Clone, C: Clock + Clone>(
    app: &App<S, C>,
    controller: &TestController<S, C>,
    area: Rect,
    buf: &mut Buffer,
) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let dim_style = Style::default().add_modifier(Modifier::DIM);
    let italic_style = Style::default().add_modifier(Modifier::ITALIC);

    let session = controller.session();
    let questions = &session.test.questions;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(1)
        .constraints([
            Constraint::Length(1), // header
            Constraint::Length(1), // progress
            Constraint::Length(1),
            Constraint::Min(6),    // question
            Constraint::Length(1), // navigator
            Constraint::Length(1), // notice
            Constraint::Length(1), // legend
        ])
        .split(area);

    let badge = if controller.phase() == SessionPhase::Submitting {
        "Submitting...".to_string()
    } else {
        format!("⏱ {}", controller.remaining_display())
    };
    let badge_style = if controller.remaining_secs() <= LOW_TIME_SECS {
        bold_style.fg(Color::Red)
    } else {
        bold_style.fg(Color::Cyan)
    };

    let title = format!("Skill Assessment · Application {}", app.application_id);
    let header = header_line(&title, &badge, chunks[0].width as usize);
    let split_at = header.len() - badge.len();
    Paragraph::new(Line::from(vec![
        Span::styled(header[..split_at].to_string(), bold_style),
        Span::styled(badge, badge_style),
    ]))
    .render(chunks[0], buf);

    Paragraph::new(Span::styled(
        format!(
            "Answered {} of {} · total marks {}",
            session.answers().answered_count(),
            questions.len(),
            session.test.total_marks
        ),
        dim_style,
    ))
    .render(chunks[1], buf);

    match questions.get(app.cursor) {
        Some(question) => {
            let selected = session.answers().selected(question.id);
            let mut lines = vec![
                Line::from(Span::styled(
                    format!("{}. {}", app.cursor + 1, question.text),
                    bold_style,
                )),
                Line::from(""),
            ];
            lines.extend(AnswerOption::ALL.iter().map(|&option| {
                let chosen = selected == Some(option);
                let marker = if chosen { "(•)" } else { "( )" };
                let style = if chosen {
                    bold_style.fg(Color::Green)
                } else {
                    Style::default()
                };
                Line::from(Span::styled(
                    format!("  {marker} {option}. {}", question.option_text(option)),
                    style,
                ))
            }));

            Paragraph::new(lines)
                .wrap(Wrap { trim: false })
                .render(chunks[3], buf);
        }
        None => {
            Paragraph::new(Span::styled("This test has no questions.", italic_style))
                .alignment(Alignment::Center)
                .render(chunks[3], buf);
        }
    }

    Paragraph::new(navigator(questions, session.answers(), app.cursor))
        .style(dim_style)
        .render(chunks[4], buf);

    if let Some(notice) = &app.notice {
        Paragraph::new(Span::styled(notice.as_str(), bold_style.fg(Color::Yellow))).render(chunks[5], buf);
    }

    Paragraph::new(Span::styled(
        "(↑/↓) question / (a-d) answer / (⌫) clear / (s)ubmit / (esc)ape",
        italic_style,
    ))
    .render(chunks[6], buf);
}

fn render_outcome<S: KvStore, C: Clock>(controller: &TestController<S, C>, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let italic_style = Style::default().add_modifier(Modifier::ITALIC);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(area);

    let session = controller.session();
    let lines = match session.outcome() {
        Some(SessionOutcome::Submitted(result)) => {
            let mut lines = vec![
                Line::from(Span::styled("Test submitted", bold_style)),
                Line::from(""),
                Line::from(Span::styled(format!("Score: {} / {}", result.score, result.total), bold_style)),
                if result.passed {
                    Line::from(Span::styled("Shortlist criteria met", bold_style.fg(Color::Green)))
                } else {
                    Line::from(Span::styled("Shortlist criteria not met", bold_style.fg(Color::Red)))
                },
            ];
            if let Some(status) = &result.application_status {
                lines.push(Line::from(format!("Application status: {status}")));
            }
            if let Some(trigger) = session.fired_by() {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    format!("Submitted by: {}", trigger.reason()),
                    italic_style,
                )));
            }
            lines
        }
        Some(SessionOutcome::Failed(message)) => vec![
            Line::from(Span::styled("Submission failed", bold_style.fg(Color::Red))),
            Line::from(""),
            Line::from(message.as_str()),
        ],
        Some(SessionOutcome::AlreadySubmitted(message)) => vec![
            Line::from(Span::styled("Already submitted", bold_style)),
            Line::from(""),
            Line::from(message.as_str()),
        ],
        None => vec![],
    };

    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .render(chunks[0], buf);

    Paragraph::new(Span::styled(BACK_HINT, italic_style))
        .alignment(Alignment::Center)
        .render(chunks[1], buf);
}

/// Pre-start confirmation with the rules of the attempt
pub fn render_confirm(duration_ms: i64, now_ms: i64, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let italic_style = Style::default().add_modifier(Modifier::ITALIC);

    let fmt_clock = |ms: i64| {
        chrono::DateTime::from_timestamp_millis(ms)
            .map(|t| t.with_timezone(&chrono::Local).format("%H:%M").to_string())
            .unwrap_or_else(|| "--:--".to_string())
    };

    let minutes = duration_ms / 60_000;
    let lines = vec![
        Line::from(Span::styled("Ready to start the skill test?", bold_style)),
        Line::from(""),
        Line::from(format!("Current time: {}", fmt_clock(now_ms))),
        Line::from(format!(
            "Time limit: {minutes} minutes (ends around {})",
            fmt_clock(now_ms + duration_ms)
        )),
        Line::from(""),
        Line::from("The timer keeps running if you close the terminal."),
        Line::from("Switching away from this terminal submits the test automatically."),
        Line::from("Copy / paste is disabled during the test."),
        Line::from(Span::styled("The test can be taken only once.", bold_style.fg(Color::Yellow))),
        Line::from(""),
        Line::from(Span::styled("(enter) Start Now / (esc) Cancel", italic_style)),
    ];

    let block = Block::default().borders(Borders::ALL).title(" Skill Assessment ");
    Paragraph::new(lines)
        .block(block)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .render(centered(area, 72, 15), buf);
}

pub fn render_unavailable(message: &str, area: Rect, buf: &mut Buffer) {
    let lines = vec![
        Line::from(Span::styled(
            message,
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            BACK_HINT,
            Style::default().add_modifier(Modifier::ITALIC),
        )),
    ];

    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .render(centered(area, area.width.saturating_sub(HORIZONTAL_MARGIN * 2), 3), buf);
}

/// Overlay shown when quitting would abandon a live attempt
pub fn render_leave_warning(area: Rect, buf: &mut Buffer) {
    let popup = centered(area, 56, 6);
    Clear.render(popup, buf);

    let lines = vec![
        Line::from(Span::styled("Leave the test?", Style::default().add_modifier(Modifier::BOLD))),
        Line::from("Your attempt stays locked and the timer keeps running."),
        Line::from(""),
        Line::from(Span::styled("(y) leave / (n) stay", Style::default().add_modifier(Modifier::ITALIC))),
    ];

    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Red)))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .render(popup, buf);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
