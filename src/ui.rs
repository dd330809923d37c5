use chrono::Utc;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Widget, Wrap},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};
use webbrowser::Browser;

use crate::{App, Notice, NoticeLevel};
use studyhall::assignment::{AnswerSheet, Assignment, AssignmentKind, SubmissionStatus};
use studyhall::workspace::{Confirm, Stage, Workspace};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match &self.workspace {
            None => render_roster(self, area, buf),
            Some(workspace) => match workspace.stage {
                Stage::NotStarted => render_briefing(workspace, area, buf),
                Stage::InProgress => render_editor(workspace, area, buf),
                Stage::Submitted | Stage::Graded => render_closed(workspace, area, buf),
            },
        }

        if let Some(notice) = &self.notice {
            render_notice(notice, area, buf);
        }

        // The overlay goes on last so it sits above everything else.
        if let Some(confirm) = &self.confirm {
            render_confirm(confirm, area, buf);
        }
    }
}

fn render_roster(app: &App, area: Rect, buf: &mut Buffer) {
    let italic_style = Style::default().add_modifier(Modifier::ITALIC);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(area);

    if app.roster.is_empty() {
        let text = if app.fetching {
            "Fetching your assignments..."
        } else {
            "Nothing due right now.\nPress (r) to check again."
        };
        let empty = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title("Assignments"))
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center);
        empty.render(chunks[0], buf);
    } else {
        let header = Row::new(vec![
            Cell::from("Assignment"),
            Cell::from("Kind"),
            Cell::from("Status"),
            Cell::from("Score"),
            Cell::from("Due"),
        ])
        .style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

        let now = Utc::now();
        let rows: Vec<Row> = app
            .roster
            .assignments
            .iter()
            .enumerate()
            .map(|(idx, assignment)| {
                let selected = idx == app.roster.selected;
                let marker = if selected { "› " } else { "  " };

                let status = assignment.submission.status;
                let status_color = match status {
                    SubmissionStatus::Pending => Color::Yellow,
                    SubmissionStatus::Submitted => Color::Cyan,
                    SubmissionStatus::Graded => Color::Green,
                };

                let score = match (status, assignment.submission.score) {
                    (SubmissionStatus::Graded, Some(score)) => {
                        format!("{}/{}", fmt_score(score), assignment.total_points)
                    }
                    _ => String::new(),
                };

                let row = Row::new(vec![
                    Cell::from(format!("{}{}", marker, assignment.title)),
                    Cell::from(kind_cell(assignment)),
                    Cell::from(Span::styled(
                        status.label(),
                        Style::default().fg(status_color),
                    )),
                    Cell::from(score),
                    Cell::from(assignment.due_label(now).unwrap_or_default()),
                ]);
                if selected {
                    row.style(
                        Style::default()
                            .bg(Color::DarkGray)
                            .add_modifier(Modifier::BOLD),
                    )
                } else {
                    row
                }
            })
            .collect();

        let table = Table::new(
            rows,
            [
                Constraint::Min(24),
                Constraint::Length(14),
                Constraint::Length(10),
                Constraint::Length(9),
                Constraint::Length(20),
            ],
        )
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Assignments ({})", app.roster.len())),
        );

        table.render(chunks[0], buf);
    }

    let legend = Paragraph::new(Span::styled(
        "(↑/↓) move / (enter) open / (r)efresh / (esc)ape",
        italic_style,
    ));
    legend.render(chunks[1], buf);
}

fn render_briefing(workspace: &Workspace, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let dim_style = Style::default().add_modifier(Modifier::DIM);
    let italic_style = Style::default().add_modifier(Modifier::ITALIC);

    let assignment = &workspace.assignment;
    let now = Utc::now();

    let mut meta = format!(
        "{} | {} points",
        assignment.kind.label(),
        assignment.total_points
    );
    if let Some(due) = assignment.due_label(now) {
        meta.push_str(" | ");
        meta.push_str(&due);
    }

    let mut lines: Vec<Line> = vec![
        Line::from(Span::styled(assignment.title.clone(), bold_style)),
        Line::from(Span::styled(meta, dim_style)),
        Line::from(""),
    ];

    if !assignment.brief.is_empty() {
        for text in assignment.brief.split('\n') {
            lines.push(Line::from(text.to_string()));
        }
        lines.push(Line::from(""));
    }

    if let AssignmentKind::Quiz { questions } = &assignment.kind {
        lines.push(Line::from(format!("{} questions to answer.", questions.len())));
    }

    if let Some(allowance) = assignment.allowance_secs() {
        lines.push(Line::from(Span::styled(
            format!(
                "This is a timed assignment. You will have {} minutes once you begin.",
                allowance / 60
            ),
            Style::default().fg(Color::Yellow).patch(bold_style),
        )));
        lines.push(Line::from(Span::styled(
            "Automatic submission occurs when the session expires.",
            italic_style,
        )));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "(b)egin assessment / (esc) back",
        italic_style,
    )));

    let occupied = lines.len() as u16;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .constraints([
            Constraint::Length(area.height.saturating_sub(occupied) / 2),
            Constraint::Min(1),
        ])
        .split(area);

    let card = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    card.render(chunks[1], buf);
}

fn render_editor(workspace: &Workspace, area: Rect, buf: &mut Buffer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(area);

    render_editor_header(workspace, chunks[0], buf);

    match &workspace.assignment.kind {
        AssignmentKind::Quiz { .. } => {
            render_quiz_body(workspace, chunks[2], buf);
            render_quiz_footer(workspace, chunks[3], buf);
            let legend = Paragraph::new(Span::styled(
                "(↑/↓) question / (1-9) pick / (x) clear / (ctrl+s) submit / (esc) save and close",
                Style::default().add_modifier(Modifier::ITALIC),
            ));
            legend.render(chunks[4], buf);
        }
        AssignmentKind::Essay { .. } | AssignmentKind::CourseWork => {
            render_essay_body(workspace, chunks[2], buf);
            render_essay_footer(workspace, chunks[3], buf);
            let legend = Paragraph::new(Span::styled(
                "(ctrl+s) submit / (esc) save and close",
                Style::default().add_modifier(Modifier::ITALIC),
            ));
            legend.render(chunks[4], buf);
        }
    }
}

fn render_editor_header(workspace: &Workspace, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let dim_bold_style = Style::default()
        .patch(bold_style)
        .add_modifier(Modifier::DIM);

    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(10), Constraint::Length(14)])
        .split(area);

    let title = fit(&workspace.assignment.title, halves[0].width as usize);
    Paragraph::new(Span::styled(title, bold_style)).render(halves[0], buf);

    let (clock_text, clock_style) = if workspace.submitting {
        (
            "sending...".to_string(),
            Style::default().add_modifier(Modifier::ITALIC),
        )
    } else {
        match workspace.clock() {
            Some(clock) => {
                // Under five minutes the clock goes red.
                let style = if workspace.low_time() || workspace.expired() {
                    Style::default().fg(Color::Red).patch(bold_style)
                } else {
                    dim_bold_style
                };
                (clock, style)
            }
            None => (String::new(), dim_bold_style),
        }
    };
    Paragraph::new(Span::styled(clock_text, clock_style))
        .alignment(Alignment::Right)
        .render(halves[1], buf);
}

fn render_essay_body(workspace: &Workspace, area: Rect, buf: &mut Buffer) {
    let text = match &workspace.sheet {
        AnswerSheet::Essay(text) => text.as_str(),
        AnswerSheet::Choices(_) => "",
    };

    let mut lines: Vec<Line> = text
        .split('\n')
        .map(|line| Line::from(line.to_string()))
        .collect();
    if !workspace.submitting {
        if let Some(last) = lines.last_mut() {
            last.spans.push(Span::styled(
                "▏",
                Style::default()
                    .add_modifier(Modifier::BOLD)
                    .add_modifier(Modifier::DIM),
            ));
        }
    }

    // Keep the tail of the text in view once it outgrows the area.
    let width = area.width.max(1) as usize;
    let mut occupied = 0usize;
    for line in text.split('\n') {
        occupied += line.width() / width + 1;
    }
    let scroll = occupied.saturating_sub(area.height as usize) as u16;

    let body = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    body.render(area, buf);
}

fn render_essay_footer(workspace: &Workspace, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);

    let mut spans = vec![Span::styled(
        format!("{} words", workspace.word_count()),
        bold_style,
    )];

    if let AssignmentKind::Essay {
        word_target: Some(target),
    } = workspace.assignment.kind
    {
        let met = workspace.word_target_met() == Some(true);
        let tone = if met { Color::Green } else { Color::Yellow };
        spans.push(Span::styled(
            format!(" / target {}", target),
            Style::default().fg(tone),
        ));
    }

    Paragraph::new(Line::from(spans)).render(area, buf);
}

fn render_quiz_body(workspace: &Workspace, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let dim_style = Style::default().add_modifier(Modifier::DIM);

    let questions = match &workspace.assignment.kind {
        AssignmentKind::Quiz { questions } => questions,
        _ => return,
    };
    let picks = match &workspace.sheet {
        AnswerSheet::Choices(picks) => picks,
        AnswerSheet::Essay(_) => return,
    };

    let mut lines: Vec<Line> = Vec::new();
    for (idx, question) in questions.iter().enumerate() {
        let focused = idx == workspace.focused_question;
        let marker = if focused { "› " } else { "  " };
        let prompt_style = if focused {
            Style::default().fg(Color::Cyan).patch(bold_style)
        } else {
            bold_style
        };

        lines.push(Line::from(vec![
            Span::styled(marker.to_string(), prompt_style),
            Span::styled(
                format!("{}. {}", idx + 1, question.prompt),
                prompt_style,
            ),
            Span::styled(format!("  ({} pts)", question.points), dim_style),
        ]));

        let picked = picks.get(&idx);
        for (opt_idx, option) in question.options.iter().enumerate() {
            let chosen = picked == Some(option);
            let line = if chosen {
                Line::from(Span::styled(
                    format!("    ✓ {}) {}", opt_idx + 1, option),
                    Style::default().fg(Color::Green).patch(bold_style),
                ))
            } else {
                Line::from(format!("      {}) {}", opt_idx + 1, option))
            };
            lines.push(line);
        }
        lines.push(Line::from(""));
    }

    // Scroll so the focused question stays on screen.
    let mut focus_row = 0usize;
    for (idx, question) in questions.iter().enumerate() {
        if idx == workspace.focused_question {
            break;
        }
        focus_row += question.options.len() + 2;
    }
    let scroll = focus_row.saturating_sub(area.height.saturating_sub(4) as usize) as u16;

    let body = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    body.render(area, buf);
}

fn render_quiz_footer(workspace: &Workspace, area: Rect, buf: &mut Buffer) {
    let progress = format!(
        "{}/{} answered",
        workspace.answered_count(),
        workspace.total_questions()
    );
    let done = workspace.answered_count() == workspace.total_questions();
    let tone = if done { Color::Green } else { Color::Yellow };
    Paragraph::new(Span::styled(
        progress,
        Style::default().fg(tone).add_modifier(Modifier::BOLD),
    ))
    .render(area, buf);
}

fn render_closed(workspace: &Workspace, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let dim_style = Style::default().add_modifier(Modifier::DIM);
    let italic_style = Style::default().add_modifier(Modifier::ITALIC);

    let assignment = &workspace.assignment;
    let submission = &assignment.submission;

    let mut lines: Vec<Line> = vec![
        Line::from(Span::styled(assignment.title.clone(), bold_style)),
        Line::from(""),
    ];

    match workspace.stage {
        Stage::Graded => {
            let score_line = match submission.score {
                Some(score) => format!("Score: {} / {}", fmt_score(score), assignment.total_points),
                None => "Graded.".to_string(),
            };
            lines.push(Line::from(Span::styled(
                score_line,
                Style::default().fg(Color::Green).patch(bold_style),
            )));
        }
        _ => {
            lines.push(Line::from(Span::styled(
                "Submitted. Waiting to be graded.",
                Style::default().fg(Color::Cyan).patch(bold_style),
            )));
        }
    }
    lines.push(Line::from(""));

    if let Some(feedback) = &submission.feedback {
        lines.push(Line::from(Span::styled(
            "Instructor feedback:",
            bold_style,
        )));
        for text in feedback.split('\n') {
            lines.push(Line::from(text.to_string()));
        }
        lines.push(Line::from(""));
    }

    match &workspace.sheet {
        AnswerSheet::Essay(text) if !text.trim().is_empty() => {
            lines.push(Line::from(Span::styled("Your submission:", bold_style)));
            for line in text.split('\n') {
                lines.push(Line::from(Span::styled(line.to_string(), dim_style)));
            }
            lines.push(Line::from(""));
        }
        AnswerSheet::Choices(picks) if !picks.is_empty() => {
            lines.push(Line::from(Span::styled("Your answers:", bold_style)));
            for (question_idx, option) in picks {
                lines.push(Line::from(Span::styled(
                    format!("{}. {}", question_idx + 1, option),
                    dim_style,
                )));
            }
            lines.push(Line::from(""));
        }
        _ => {}
    }

    let mut keys: Vec<&str> = Vec::new();
    if matches!(&workspace.sheet, AnswerSheet::Essay(_)) {
        keys.push("(s)ave a copy");
    }
    if submission.feedback_url.is_some() && Browser::is_available() {
        keys.push("(o)pen feedback");
    }
    keys.push("(esc) back");
    lines.push(Line::from(Span::styled(keys.join(" / "), italic_style)));

    let occupied = lines.len() as u16;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .constraints([
            Constraint::Length(area.height.saturating_sub(occupied) / 2),
            Constraint::Min(1),
        ])
        .split(area);

    let card = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    card.render(chunks[1], buf);
}

fn render_notice(notice: &Notice, area: Rect, buf: &mut Buffer) {
    if area.height == 0 || area.width == 0 {
        return;
    }
    let style = match notice.level {
        NoticeLevel::Info => Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::ITALIC),
        NoticeLevel::Success => Style::default()
            .fg(Color::Green)
            .add_modifier(Modifier::BOLD),
        NoticeLevel::Error => Style::default()
            .fg(Color::Red)
            .add_modifier(Modifier::BOLD),
    };

    let line = Rect::new(area.x, area.y + area.height - 1, area.width, 1);
    Paragraph::new(Span::styled(notice.text.clone(), style))
        .alignment(Alignment::Center)
        .render(line, buf);
}

fn render_confirm(confirm: &Confirm, area: Rect, buf: &mut Buffer) {
    let message = confirm.message();

    let box_width = 64.min(area.width);
    let inner_width = box_width.saturating_sub(4).max(1) as usize;
    let message_rows = (message.width() / inner_width + 1) as u16;
    let box_height = (message_rows + 4).min(area.height);

    let rect = centered_rect(area, box_width, box_height);
    Clear.render(rect, buf);

    let text = vec![
        Line::from(message),
        Line::from(""),
        Line::from(Span::styled(
            "(y)es / (n)o",
            Style::default().add_modifier(Modifier::ITALIC),
        )),
    ];
    let card = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Confirm submission"),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    card.render(rect, buf);
}

fn kind_cell(assignment: &Assignment) -> String {
    match assignment.duration_minutes.filter(|mins| *mins > 0) {
        Some(mins) => format!("{} ({}m)", assignment.kind.label(), mins),
        None => assignment.kind.label().to_string(),
    }
}

fn fmt_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{:.0}", score)
    } else {
        format!("{:.1}", score)
    }
}

fn fit(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push('…');
    out
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    let x = area.x + (area.width - width) / 2;
    let y = area.y + (area.height - height) / 2;
    Rect::new(x, y, width, height)
}
