use std::io::{self, Stdout};
use std::ops::Range;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use tracing::debug;

use crate::record::{ImageRecord, SourceState, format_size};
use crate::state::{EndReason, InputIntent, Notification, Session};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Confirm {
    Process,
    Reset,
}

pub struct TuiApp {
    session: Session,
    list_state: ListState,
    view_height: usize,
    visible: Range<usize>,
    confirm: Option<Confirm>,
    status_message: Option<(String, bool)>,
    error_popup: Option<String>,
    end_screen: Option<(&'static str, String)>,
    quit: bool,
}

impl TuiApp {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            list_state: ListState::default(),
            view_height: 0,
            visible: 0..0,
            confirm: None,
            status_message: None,
            error_popup: None,
            end_screen: None,
            quit: false,
        }
    }

    pub fn run(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let res = self.run_loop(&mut stdout);

        disable_raw_mode()?;
        execute!(stdout, LeaveAlternateScreen)?;
        res
    }

    fn run_loop(&mut self, terminal: &mut Stdout) -> io::Result<()> {
        let mut tui = Terminal::new(CrosstermBackend::new(terminal))?;
        self.session.load();

        while !self.quit && !self.session.exit_requested() {
            tui.draw(|frame| self.render(frame))?;
            self.sync_thumbnails();

            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code);
                    }
                }
            }

            for note in self.session.pump() {
                self.handle_notification(note);
            }
            self.list_state.select(self.session.current());
        }
        Ok(())
    }

    fn handle_notification(&mut self, note: Notification) {
        match note {
            Notification::Processed(report) => {
                if report.errors.is_empty() {
                    let msg = format!("Successfully {} {} files.", self.session.trash_verb(), report.moved);
                    self.status_message = Some((msg, false));
                } else {
                    let mut full_msg = format!("Failed to move {} files:\n\n", report.errors.len());
                    let details: Vec<String> = report.errors.iter().take(5)
                        .map(|e| format!("• {:?}: {}", e.path.file_name().unwrap_or_default(), e.reason))
                        .collect();
                    full_msg.push_str(&details.join("\n"));
                    if report.errors.len() > 5 { full_msg.push_str("\n...and others."); }
                    if report.moved > 0 {
                        full_msg.push_str(&format!("\n\n({} files moved successfully)", report.moved));
                    }
                    full_msg.push_str("\n\n(Press any key to dismiss)");
                    self.error_popup = Some(full_msg);
                }
                self.visible = 0..0;
            }
            Notification::Ended(reason) => {
                let text = format!("{}\n\n(Press any key to exit)", self.session.end_message(&reason));
                self.end_screen = Some((end_title(&reason), text));
            }
            Notification::Loaded { count } => {
                self.status_message = Some((format!("Loaded {} images", count), false));
                self.visible = 0..0;
            }
            Notification::SourceReady(_) | Notification::ThumbnailReady(_) => {}
        }
    }

    /// Requests thumbnails for rows entering the list viewport and cancels
    /// the ones leaving it.
    fn sync_thumbnails(&mut self) {
        let len = self.session.images().len();
        let start = self.list_state.offset().min(len);
        let end = (start + self.view_height).min(len);
        let now = start..end;
        if now == self.visible {
            return;
        }
        let prev = std::mem::replace(&mut self.visible, now.clone());
        for i in prev.clone().filter(|i| !now.contains(i)) {
            self.session.cancel_thumbnail(i);
        }
        for i in now.filter(|i| !prev.contains(i)) {
            self.session.request_thumbnail(i);
        }
        debug!("Visible rows now {:?}", self.visible);
    }

    fn handle_key(&mut self, key: KeyCode) {
        if self.end_screen.is_some() {
            self.quit = true;
            return;
        }

        // Error popup - dismiss on any key
        if self.error_popup.is_some() {
            self.error_popup = None;
            return;
        }

        // Modal / Confirmation Override
        if let Some(confirm) = self.confirm {
            match (confirm, key) {
                (Confirm::Process, KeyCode::Char('k')) => {
                    self.confirm = None;
                    self.session.handle_input(InputIntent::Process { keep_selected: true });
                }
                (Confirm::Process, KeyCode::Char('t')) => {
                    self.confirm = None;
                    self.session.handle_input(InputIntent::Process { keep_selected: false });
                }
                (Confirm::Reset, KeyCode::Char('y') | KeyCode::Char('Y')) => {
                    self.confirm = None;
                    self.session.handle_input(InputIntent::ResetSelection);
                }
                (_, KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc) => self.confirm = None,
                _ => {}
            }
            return;
        }

        // Standard Mapping
        let intent = match key {
            KeyCode::Char('q') | KeyCode::Esc => Some(InputIntent::Quit),
            KeyCode::Right | KeyCode::Down => Some(InputIntent::NextItem),
            KeyCode::Left | KeyCode::Up => Some(InputIntent::PrevItem),
            KeyCode::Home => Some(InputIntent::Home),
            KeyCode::End => Some(InputIntent::End),
            KeyCode::PageDown => self.session.current().map(|i| InputIntent::GoTo((i + self.view_height.max(1)).min(self.session.images().len().saturating_sub(1)))),
            KeyCode::PageUp => self.session.current().map(|i| InputIntent::GoTo(i.saturating_sub(self.view_height.max(1)))),
            KeyCode::Char(' ') => Some(InputIntent::ToggleSelected),
            KeyCode::F(5) => Some(InputIntent::ReloadList),
            KeyCode::Char('p') => {
                if self.session.busy().is_none() && !self.session.images().is_empty() {
                    self.confirm = Some(Confirm::Process);
                }
                None
            }
            KeyCode::Char('r') => {
                self.confirm = Some(Confirm::Reset);
                None
            }
            _ => None,
        };

        if let Some(i) = intent {
            self.status_message = None;
            self.session.handle_input(i);
        }
    }

    fn render(&mut self, frame: &mut Frame) {
        let area = frame.area();

        let main_layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints(vec![
                Constraint::Min(0),
                Constraint::Length(1), // Status Bar
            ])
            .split(area);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(vec![Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(main_layout[0]);

        // One line per row, minus the borders
        self.view_height = body[0].height.saturating_sub(2) as usize;

        // --- Status Bar ---
        frame.render_widget(self.status_widget(), main_layout[1]);

        // --- File List ---
        let root = self.session.root().to_path_buf();
        let list_items: Vec<ListItem> = self.session.images().iter().map(|rec| {
            let style = if rec.highlighted {
                Style::default().fg(Color::Blue)
            } else if rec.selected {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            };
            let marker = if rec.selected { "*" } else { " " };
            let marker_style = if rec.selected { Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD) } else { Style::default() };
            let shown = rec.path.strip_prefix(&root).unwrap_or(&rec.path);

            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", marker), marker_style),
                Span::styled(shown.display().to_string(), style.add_modifier(Modifier::BOLD)),
                Span::styled(format!("  {}", format_size(rec.bytes)), style),
            ]))
        }).collect();

        let title = format!("{}", root.display());
        let list = List::new(list_items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_symbol(">> ");
        self.list_state.select(self.session.current());
        frame.render_stateful_widget(list, body[0], &mut self.list_state);

        // --- Info Panel ---
        frame.render_widget(info_panel(self.session.current_image()), body[1]);

        // --- Popups ---
        if let Some(confirm) = self.confirm {
            let text = match confirm {
                Confirm::Process => format!(
                    "What would you like to do with {} selected images?\n\n(k) Keep only selected / (t) Trash selected / (n) Cancel",
                    self.session.selected_count()
                ),
                Confirm::Reset => "Reset the selection state for all images?\n\n(y) Yes / (n) No".to_string(),
            };
            let block = Block::default().title("Confirmation").borders(Borders::ALL).style(Style::default().bg(Color::DarkGray));
            let paragraph = Paragraph::new(text).block(block).wrap(Wrap { trim: true }).alignment(Alignment::Center);
            let area = centered_rect(60, 25, area);
            frame.render_widget(Clear, area);
            frame.render_widget(paragraph, area);
        }

        let popup = self.end_screen.as_ref().map(|(title, t)| (*title, t))
            .or_else(|| self.error_popup.as_ref().map(|t| ("ERROR", t)));
        if let Some((title, text)) = popup {
            let block = Block::default().title(title).borders(Borders::ALL).style(Style::default().bg(Color::Red).fg(Color::White));
            let paragraph = Paragraph::new(text.clone()).block(block).wrap(Wrap { trim: true }).alignment(Alignment::Left);
            let area = centered_rect(80, 40, area);
            frame.render_widget(Clear, area);
            frame.render_widget(paragraph, area);
        }
    }

    fn status_widget(&self) -> Paragraph<'static> {
        if let Some(busy) = self.session.busy() {
            let (done, total) = self.session.progress();
            let text = if total > 0 { format!("{} ({}/{})", busy.message(), done, total) } else { busy.message().to_string() };
            return Paragraph::new(Span::styled(text, Style::default().fg(Color::Cyan)));
        }
        if let Some((msg, is_error)) = &self.status_message {
            let color = if *is_error { Color::Red } else { Color::Green };
            return Paragraph::new(Span::styled(msg.clone(), Style::default().fg(color)));
        }
        let status = self.session.status().unwrap_or_default();
        Paragraph::new(Span::raw(format!(
            "{} | [Space]: Select | [p]: Process | [r]: Reset | [F5]: Reload | [q]: Quit",
            status
        )))
    }
}

fn end_title(reason: &EndReason) -> &'static str {
    match reason {
        EndReason::NoImages => "No Images",
        EndReason::AllTrashed => "No Image Left",
        EndReason::ScanFailed(_) => "Error",
    }
}

fn info_panel(rec: Option<&ImageRecord>) -> Paragraph<'static> {
    let Some(rec) = rec else {
        return Paragraph::new("").block(Block::default().borders(Borders::ALL).title("Info"));
    };

    let decoded = match rec.source_state() {
        SourceState::Unloaded => "no".to_string(),
        SourceState::Pending(_) => "pending".to_string(),
        SourceState::Loaded(img) => format!("{}x{}", img.width(), img.height()),
    };
    let thumb = match (rec.thumbnail(), rec.thumbnail_in_flight()) {
        (Some(t), _) => format!("{}x{}", t.width(), t.height()),
        (None, true) => "pending".to_string(),
        (None, false) => "-".to_string(),
    };

    let mut style = Style::default();
    let mut color_line = "-".to_string();
    if let Some(avg) = rec.average_color() {
        let [r, g, b, _] = avg.0;
        color_line = format!("#{:02x}{:02x}{:02x}", r, g, b);
        // Background themed on the image; text flips on bright colors
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        let fg = if luma > 140.0 { Color::Black } else { Color::White };
        style = style.bg(Color::Rgb(r, g, b)).fg(fg);
    }

    let lines = vec![
        Line::from(Span::styled(rec.name.clone(), Style::default().add_modifier(Modifier::BOLD))),
        Line::from(""),
        Line::from(format!("Format:     {:?}", rec.format)),
        Line::from(format!("Dimensions: {}x{}", rec.dimensions.0, rec.dimensions.1)),
        Line::from(format!("Size:       {} ({} bytes)", format_size(rec.bytes), rec.bytes)),
        Line::from(format!("Modified:   {}", rec.modified.format("%Y-%m-%d %H:%M:%S"))),
        Line::from(format!("Selected:   {}", if rec.selected { "yes" } else { "no" })),
        Line::from(format!("Decoded:    {}", decoded)),
        Line::from(format!("Thumbnail:  {}", thumb)),
        Line::from(format!("Average:    {}", color_line)),
    ];

    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Info"))
        .style(style)
        .wrap(Wrap { trim: false })
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default().direction(Direction::Vertical).constraints(vec![
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ]).split(r);
    Layout::default().direction(Direction::Horizontal).constraints(vec![
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ]).split(popup_layout[1])[1]
}
