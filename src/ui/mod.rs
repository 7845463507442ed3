//! Terminal presentation shell
//!
//! Renders the chat transcript, the input line, and a state-driven activity
//! indicator. The shell owns the terminal and runs a synchronous event loop:
//! each tick it drains the coordinator's event channel, redraws, and polls
//! for key input. It never mutates coordinator state directly — every user
//! action becomes a [`Command`] on the coordinator's channel.

use std::io;
use std::time::{Duration, Instant};

use crossterm::event::{Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, error::TryRecvError};

use crate::coordinator::{Command, ConversationState, UiEvent};
use crate::persona;

/// Render/poll cadence
const TICK: Duration = Duration::from_millis(100);

/// How long a status toast stays visible
const TOAST_TTL: Duration = Duration::from_secs(3);

/// Spinner frames shown while thinking
const THINKING_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Waveform frames shown while talking
const TALKING_FRAMES: &[&str] = &["▁▃▅▇", "▃▅▇▅", "▅▇▅▃", "▇▅▃▁", "▅▃▁▃", "▃▁▃▅"];

/// A rendered transcript entry
struct ChatLine {
    label: &'static str,
    text: String,
}

/// Shell state, driven entirely by coordinator events and key input
struct App {
    lines: Vec<ChatLine>,
    input: String,
    state: ConversationState,
    listening: bool,
    voice_mode: bool,
    toast: Option<(String, Instant)>,
    tick: usize,
    quit: bool,
}

impl App {
    const fn new() -> Self {
        Self {
            lines: Vec::new(),
            input: String::new(),
            state: ConversationState::Waiting,
            listening: true,
            voice_mode: false,
            toast: None,
            tick: 0,
            quit: false,
        }
    }

    fn apply(&mut self, event: UiEvent) {
        match event {
            UiEvent::State(state) => self.state = state,
            UiEvent::UserTurn(text) => self.lines.push(ChatLine { label: "You", text }),
            UiEvent::AssistantTurn(text) => self.lines.push(ChatLine {
                label: persona::NAME,
                text,
            }),
            UiEvent::Listening(on) => self.listening = on,
            UiEvent::VoiceMode(on) => self.voice_mode = on,
            UiEvent::Status(message) => self.toast = Some((message, Instant::now())),
            UiEvent::Quit => self.quit = true,
        }
    }

    fn indicator(&self) -> (&'static str, Color) {
        match self.state {
            ConversationState::Waiting => ("●", Color::DarkGray),
            ConversationState::Thinking => (
                THINKING_FRAMES[self.tick % THINKING_FRAMES.len()],
                Color::Magenta,
            ),
            ConversationState::Talking => (
                TALKING_FRAMES[self.tick % TALKING_FRAMES.len()],
                Color::LightMagenta,
            ),
        }
    }

    const fn state_label(&self) -> &'static str {
        match self.state {
            ConversationState::Waiting => "waiting",
            ConversationState::Thinking => "thinking",
            ConversationState::Talking => "talking",
        }
    }
}

/// Run the shell until the coordinator reports quit
///
/// Blocking; call from a dedicated thread. `commands` feeds the
/// coordinator, `events` is drained every tick.
///
/// # Errors
///
/// Returns error if the terminal cannot be initialized or drawn to
pub fn run(
    commands: &UnboundedSender<Command>,
    mut events: UnboundedReceiver<UiEvent>,
) -> anyhow::Result<()> {
    let mut terminal = init_terminal()?;
    let mut app = App::new();

    let result = event_loop(&mut terminal, &mut app, commands, &mut events);
    restore_terminal(terminal)?;
    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    commands: &UnboundedSender<Command>,
    events: &mut UnboundedReceiver<UiEvent>,
) -> anyhow::Result<()> {
    loop {
        // Drain coordinator events accumulated since the last tick
        loop {
            match events.try_recv() {
                Ok(event) => app.apply(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    app.quit = true;
                    break;
                }
            }
        }

        if app.quit {
            return Ok(());
        }

        // Expire stale toasts
        if let Some((_, since)) = &app.toast {
            if since.elapsed() > TOAST_TTL {
                app.toast = None;
            }
        }

        terminal.draw(|frame| render(frame, app))?;

        if crossterm::event::poll(TICK)? {
            if let Event::Key(key) = crossterm::event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(app, commands, key.code, key.modifiers);
                }
            }
        }

        app.tick = app.tick.wrapping_add(1);
    }
}

fn handle_key(
    app: &mut App,
    commands: &UnboundedSender<Command>,
    code: KeyCode,
    modifiers: KeyModifiers,
) {
    if modifiers.contains(KeyModifiers::CONTROL) {
        match code {
            KeyCode::Char('c') | KeyCode::Char('q') => {
                let _ = commands.send(Command::Quit);
            }
            KeyCode::Char('l') => {
                let _ = commands.send(Command::ToggleListening);
            }
            KeyCode::Char('t') => {
                let _ = commands.send(Command::ToggleVoiceMode);
            }
            _ => {}
        }
        return;
    }

    match code {
        KeyCode::Enter => {
            let text = std::mem::take(&mut app.input);
            if !text.trim().is_empty() {
                let _ = commands.send(Command::SubmitText(text));
            }
        }
        KeyCode::Backspace => {
            app.input.pop();
        }
        KeyCode::Esc => {
            let _ = commands.send(Command::Quit);
        }
        KeyCode::Char(c) => {
            app.input.push(c);
        }
        _ => {}
    }
}

fn render(frame: &mut ratatui::Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_transcript(frame, app, chunks[0]);
    render_status(frame, app, chunks[1]);
    render_input(frame, app, chunks[2]);
}

fn render_transcript(frame: &mut ratatui::Frame, app: &App, area: Rect) {
    let mut lines: Vec<Line> = Vec::new();
    for entry in &app.lines {
        let color = if entry.label == persona::NAME {
            Color::LightMagenta
        } else {
            Color::White
        };
        lines.push(Line::from(vec![
            Span::styled(
                format!("{}: ", entry.label),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
            Span::styled(entry.text.clone(), Style::default().fg(color)),
        ]));
        lines.push(Line::default());
    }

    // Keep the tail in view: drop lines that cannot fit above the fold
    let visible = area.height.saturating_sub(2) as usize;
    let skip = lines.len().saturating_sub(visible);
    let lines: Vec<Line> = lines.into_iter().skip(skip).collect();

    let transcript = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Magenta))
                .title(persona::NAME),
        );
    frame.render_widget(transcript, area);
}

fn render_status(frame: &mut ratatui::Frame, app: &App, area: Rect) {
    let (glyph, color) = app.indicator();

    let mut spans = vec![
        Span::styled(format!(" {glyph} "), Style::default().fg(color)),
        Span::styled(app.state_label(), Style::default().fg(color)),
        Span::raw("  "),
        flag_span("voice", app.voice_mode),
        Span::raw(" "),
        flag_span("listening", app.listening),
    ];

    if let Some((message, _)) = &app.toast {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            message.clone(),
            Style::default().fg(Color::Yellow),
        ));
    }

    spans.push(Span::styled(
        "  enter: send · ctrl+t: voice · ctrl+l: listening · ctrl+q: quit",
        Style::default().fg(Color::DarkGray),
    ));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn flag_span(name: &str, on: bool) -> Span<'static> {
    let (marker, color) = if on {
        ("◉", Color::Green)
    } else {
        ("○", Color::DarkGray)
    };
    Span::styled(format!("[{marker} {name}]"), Style::default().fg(color))
}

fn render_input(frame: &mut ratatui::Frame, app: &App, area: Rect) {
    let input = Paragraph::new(app.input.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta))
            .title("Message"),
    );
    frame.render_widget(input, area);

    // Place the cursor at the end of the input text
    #[allow(clippy::cast_possible_truncation)]
    let cursor_x = area.x
        + 1
        + app
            .input
            .chars()
            .count()
            .min((area.width as usize).saturating_sub(2)) as u16;
    frame.set_cursor_position((cursor_x, area.y + 1));
}

/// Initialize the terminal in raw mode on the alternate screen
fn init_terminal() -> anyhow::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Restore the terminal to its normal state
fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> anyhow::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
