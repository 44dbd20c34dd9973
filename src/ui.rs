use std::io::{self, Stdout};
use std::mem;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Local};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use log::{debug, error, info};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction as LayoutDirection, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use unicode_width::UnicodeWidthStr;

use crate::backend::LinkMap;
use crate::data::{FrameService, LinkService};
use crate::frame::{FrameContent, Viewer, ViewerStatus};
use crate::state::{self, ClientState, Direction, Effect, Settings};

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const FOOTER_HINT: &str = "←/→ switch display · 1-9 jump · r refresh · q quit";

pub struct Options {
    pub status_message: String,
    pub settings: Settings,
    pub link_service: Arc<dyn LinkService + Send + Sync>,
    pub frame_service: Arc<dyn FrameService + Send + Sync>,
    pub refresh_interval: Duration,
    pub reconcile_interval: Duration,
    pub config_path: String,
}

enum AsyncResponse {
    Links {
        seq: u64,
        force_update: bool,
        force_reload: bool,
        result: Result<LinkMap>,
    },
    Frame {
        load: u64,
        result: Result<FrameContent>,
    },
    Preload {
        token: u64,
        result: Result<FrameContent>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub id: String,
    pub active: bool,
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index]
    }
}

pub struct Model {
    state: ClientState,
    selector: Vec<Button>,
    selector_generation: u64,
    notice: Option<String>,
    viewer: Viewer,
    link_service: Arc<dyn LinkService + Send + Sync>,
    frame_service: Arc<dyn FrameService + Send + Sync>,
    refresh_interval: Duration,
    reconcile_interval: Duration,
    next_refresh: Instant,
    next_reconcile: Instant,
    preload_deadlines: Vec<(u64, Instant)>,
    fetches_in_flight: usize,
    last_sync: Option<DateTime<Local>>,
    status_message: String,
    config_path: String,
    spinner: Spinner,
    needs_redraw: bool,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
}

impl Model {
    pub fn new(options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let now = Instant::now();
        Self {
            state: ClientState::new(options.settings),
            selector: Vec::new(),
            selector_generation: 0,
            notice: None,
            viewer: Viewer::new(),
            link_service: options.link_service,
            frame_service: options.frame_service,
            refresh_interval: options.refresh_interval,
            reconcile_interval: options.reconcile_interval,
            next_refresh: now + options.refresh_interval,
            next_reconcile: now + options.reconcile_interval,
            preload_deadlines: Vec::new(),
            fetches_in_flight: 0,
            last_sync: None,
            status_message: options.status_message,
            config_path: options.config_path,
            spinner: Spinner::new(),
            needs_redraw: true,
            response_tx,
            response_rx,
        }
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    pub fn selector(&self) -> &[Button] {
        &self.selector
    }

    /// Bumped every time the button row is rebuilt from scratch.
    pub fn selector_generation(&self) -> u64 {
        self.selector_generation
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    pub fn dispatch(&mut self, event: state::Event) {
        let current = mem::take(&mut self.state);
        let (next, effects) = state::update(current, event);
        self.state = next;
        if effects.is_empty() {
            return;
        }
        for effect in effects {
            self.perform(effect);
        }
        self.mark_dirty();
    }

    fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::FetchLinks {
                seq,
                force_update,
                force_reload,
            } => {
                self.fetches_in_flight += 1;
                let service = self.link_service.clone();
                let tx = self.response_tx.clone();
                thread::spawn(move || {
                    let result = service.load_links();
                    let _ = tx.send(AsyncResponse::Links {
                        seq,
                        force_update,
                        force_reload,
                        result,
                    });
                });
            }
            Effect::RenderSelector { ids, active } => {
                self.selector = ids
                    .into_iter()
                    .map(|id| Button {
                        active: active.as_deref() == Some(id.as_str()),
                        id,
                    })
                    .collect();
                self.selector_generation += 1;
                self.notice = None;
            }
            Effect::Highlight { active } => {
                for button in &mut self.selector {
                    button.active = active.as_deref() == Some(button.id.as_str());
                }
            }
            Effect::ShowNotice(message) => {
                self.selector.clear();
                self.notice = Some(message);
            }
            Effect::LoadFrame { url } => {
                let load = self.viewer.begin_load(&url);
                self.spawn_frame_load(url, move |result| AsyncResponse::Frame { load, result });
            }
            Effect::ClearFrame => self.viewer.clear(),
            Effect::FadeOut => self.viewer.set_faded(true),
            Effect::FadeIn => self.viewer.set_faded(false),
            Effect::Preload { token, url } => {
                self.spawn_frame_load(url, move |result| AsyncResponse::Preload { token, result });
            }
            Effect::ScheduleTimeout { token, after } => {
                self.preload_deadlines.push((token, Instant::now() + after));
            }
            Effect::SwapPreloaded { token } => {
                self.viewer.swap(token);
                self.preload_deadlines.retain(|(pending, _)| *pending != token);
            }
            Effect::DiscardPreload { token } => {
                self.viewer.discard(token);
                self.preload_deadlines.retain(|(pending, _)| *pending != token);
            }
        }
    }

    fn spawn_frame_load<F>(&self, url: String, respond: F)
    where
        F: FnOnce(Result<FrameContent>) -> AsyncResponse + Send + 'static,
    {
        let service = self.frame_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service
                .load_frame(&url)
                .and_then(|payload| FrameContent::decode(&payload));
            let _ = tx.send(respond(result));
        });
    }

    /// Drains finished background work.
    pub fn poll_async(&mut self) {
        while let Ok(response) = self.response_rx.try_recv() {
            self.handle_response(response);
        }
    }

    fn handle_response(&mut self, response: AsyncResponse) {
        match response {
            AsyncResponse::Links {
                seq,
                force_update,
                force_reload,
                result,
            } => {
                if self.fetches_in_flight == 1 {
                    // Spinner goes away.
                    self.mark_dirty();
                }
                self.fetches_in_flight = self.fetches_in_flight.saturating_sub(1);
                match result {
                    Ok(links) => {
                        // The clock alone never forces a redraw.
                        self.last_sync = Some(Local::now());
                        let status = format!("{} displays available.", links.len());
                        if status != self.status_message {
                            self.status_message = status;
                            self.mark_dirty();
                        }
                        self.dispatch(state::Event::LinksLoaded {
                            seq,
                            links,
                            force_update,
                            force_reload,
                        });
                    }
                    Err(err) => {
                        error!("links request {seq} failed: {err:#}");
                        self.status_message = "Backend unreachable, retrying on next tick.".into();
                        self.dispatch(state::Event::LinksFailed {
                            seq,
                            error: format!("{err:#}"),
                        });
                    }
                }
            }
            AsyncResponse::Frame { load, result } => {
                if let Err(err) = &result {
                    error!("frame load failed: {err:#}");
                }
                if self.viewer.finish_load(load, result) {
                    self.mark_dirty();
                } else {
                    debug!("dropping superseded frame load {load}");
                }
            }
            AsyncResponse::Preload { token, result } => match result {
                Ok(content) => {
                    self.viewer.store_offscreen(token, content);
                    self.dispatch(state::Event::PreloadLoaded { token });
                }
                Err(err) => {
                    self.dispatch(state::Event::PreloadFailed {
                        token,
                        error: format!("{err:#}"),
                    });
                }
            },
        }
    }

    /// Fires the refresh and reconcile timers and expired preload deadlines.
    pub fn run_timers(&mut self, now: Instant) {
        if now >= self.next_refresh {
            self.next_refresh = now + self.refresh_interval;
            self.dispatch(state::Event::RefreshTick);
        }
        if now >= self.next_reconcile {
            self.next_reconcile = now + self.reconcile_interval;
            self.dispatch(state::Event::ReconcileTick);
        }

        let mut expired = Vec::new();
        self.preload_deadlines.retain(|(token, deadline)| {
            if now >= *deadline {
                expired.push(*token);
                false
            } else {
                true
            }
        });
        for token in expired {
            self.dispatch(state::Event::PreloadTimedOut { token });
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        info!("starting display client");
        self.dispatch(state::Event::FetchRequested {
            force_update: true,
            force_reload: false,
        });

        let tick_rate = Duration::from_millis(120);
        let mut last_tick = Instant::now();

        loop {
            self.poll_async();

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if self.handle_key(key) {
                            break;
                        }
                    }
                    Event::Resize(_, _) => self.mark_dirty(),
                    _ => {}
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                self.run_timers(last_tick);
                if self.fetches_in_flight > 0 && self.spinner.advance() {
                    self.mark_dirty();
                }
            }
        }

        info!("display client stopped");
        Ok(())
    }

    /// Returns true when the client should exit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
            KeyCode::Left | KeyCode::Char('h') => {
                self.dispatch(state::Event::Navigate(Direction::Left));
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.dispatch(state::Event::Navigate(Direction::Right));
            }
            KeyCode::Char('r') => {
                self.status_message = "Refreshing displays…".into();
                self.dispatch(state::Event::FetchRequested {
                    force_update: true,
                    force_reload: true,
                });
            }
            KeyCode::Char(ch @ '1'..='9') => {
                let index = ch as usize - '1' as usize;
                if let Some(button) = self.selector.get(index) {
                    let id = button.id.clone();
                    self.dispatch(state::Event::Select(id));
                }
            }
            _ => {}
        }
        false
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let layout = Layout::default()
            .direction(LayoutDirection::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        let status_line = Paragraph::new(self.status_text()).style(
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .bg(COLOR_PANEL_FOCUSED_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, layout[0]);

        self.draw_selector(frame, layout[1]);
        self.draw_viewer(frame, layout[2]);

        let footer = Paragraph::new(FOOTER_HINT)
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center);
        frame.render_widget(footer, layout[3]);
    }

    fn status_text(&self) -> String {
        let mut text = String::new();
        if self.fetches_in_flight > 0 {
            text.push_str(self.spinner.frame());
            text.push(' ');
        }
        text.push_str(&self.status_message);
        if let Some(synced) = self.last_sync {
            text.push_str(&format!(" · last sync {}", synced.format("%H:%M:%S")));
        }
        text.push_str(&format!(" · {}", self.config_path));
        text
    }

    fn draw_selector(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(COLOR_BORDER_IDLE))
            .style(Style::default().bg(COLOR_PANEL_BG))
            .title("Displays");

        let content = match &self.notice {
            Some(message) => Paragraph::new(message.clone())
                .style(Style::default().fg(COLOR_ERROR))
                .wrap(Wrap { trim: true }),
            None => {
                let width = area.width.saturating_sub(2);
                Paragraph::new(selector_line(&self.selector))
                    .scroll((0, selector_scroll(&self.selector, width)))
            }
        };
        frame.render_widget(content.block(block), area);
    }

    fn draw_viewer(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let title = match self.state.active() {
            Some(id) if self.viewer.is_faded() => format!("{id} (refreshing)"),
            Some(id) => id.to_string(),
            None => "No display".to_string(),
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(COLOR_BORDER_FOCUSED))
            .style(Style::default().bg(COLOR_BG))
            .title(title);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let body = self.viewer.render(inner.width, inner.height);
        if !body.lines.is_empty() {
            frame.render_widget(Paragraph::new(body), inner);
            return;
        }

        let (message, color) = match self.viewer.status() {
            ViewerStatus::Empty => ("Waiting for a display…".to_string(), COLOR_TEXT_SECONDARY),
            ViewerStatus::Loading { url } => (format!("Loading {url}…"), COLOR_TEXT_SECONDARY),
            ViewerStatus::Ready { url } => (format!("{url} returned no content."), COLOR_TEXT_SECONDARY),
            ViewerStatus::Failed { url, error } => {
                (format!("Could not load {url}: {error}"), COLOR_ERROR)
            }
        };
        let placeholder = Paragraph::new(Text::from(message))
            .style(Style::default().fg(color))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(placeholder, inner);
    }
}

/// One button per display, numbered for the digit shortcuts.
pub fn selector_line(buttons: &[Button]) -> Line<'static> {
    let mut spans = Vec::with_capacity(buttons.len() * 2);
    for (index, button) in buttons.iter().enumerate() {
        if index > 0 {
            spans.push(Span::raw(" "));
        }
        let label = button_label(index, &button.id);
        let style = if button.active {
            Style::default()
                .fg(COLOR_BG)
                .bg(COLOR_ACCENT)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .bg(COLOR_PANEL_SELECTED_BG)
        };
        spans.push(Span::styled(label, style));
    }
    Line::from(spans)
}

fn button_label(index: usize, id: &str) -> String {
    if index < 9 {
        format!(" {} {} ", index + 1, id)
    } else {
        format!(" {id} ")
    }
}

/// Horizontal scroll that keeps the active button inside `width` columns.
pub fn selector_scroll(buttons: &[Button], width: u16) -> u16 {
    let mut end = 0usize;
    for (index, button) in buttons.iter().enumerate() {
        if index > 0 {
            end += 1;
        }
        end += UnicodeWidthStr::width(button_label(index, &button.id).as_str());
        if button.active {
            return end.saturating_sub(width as usize).min(u16::MAX as usize) as u16;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FramePayload;
    use anyhow::{anyhow, bail};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Hands out queued link responses in order, then repeats the last one.
    struct Script {
        responses: Mutex<VecDeque<Result<LinkMap, String>>>,
    }

    impl Script {
        fn new(responses: Vec<Result<LinkMap, String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    impl LinkService for Script {
        fn load_links(&self) -> Result<LinkMap> {
            let mut queue = self.responses.lock().unwrap();
            let response = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            match response {
                Some(Ok(links)) => Ok(links),
                Some(Err(message)) => Err(anyhow!(message)),
                None => Err(anyhow!("no scripted response")),
            }
        }
    }

    struct TextFrames;

    impl FrameService for TextFrames {
        fn load_frame(&self, url: &str) -> Result<FramePayload> {
            if url.ends_with("/broken") {
                bail!("502 from proxy");
            }
            Ok(FramePayload {
                url: url.to_string(),
                content_type: Some("text/plain".into()),
                bytes: format!("content of {url}").into_bytes(),
            })
        }
    }

    fn model(responses: Vec<Result<LinkMap, String>>) -> Model {
        Model::new(Options {
            status_message: String::new(),
            settings: Settings {
                base_url: "http://backend".into(),
                ..Settings::default()
            },
            link_service: Arc::new(Script::new(responses)),
            frame_service: Arc::new(TextFrames),
            refresh_interval: Duration::from_secs(30),
            reconcile_interval: Duration::from_secs(30),
            config_path: "config.yaml".into(),
        })
    }

    fn settle(model: &mut Model) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match model.response_rx.recv_timeout(Duration::from_millis(200)) {
                Ok(response) => model.handle_response(response),
                Err(_) => return,
            }
            if Instant::now() > deadline {
                panic!("background work did not settle");
            }
        }
    }

    fn pair() -> LinkMap {
        LinkMap::from_pairs([("tv1", "http://x"), ("tv2", "http://y")])
    }

    fn fetch(model: &mut Model, force_update: bool, force_reload: bool) {
        model.dispatch(state::Event::FetchRequested {
            force_update,
            force_reload,
        });
        settle(model);
    }

    #[test]
    fn first_fetch_builds_buttons_and_loads_first_display() {
        let mut model = model(vec![Ok(pair())]);
        fetch(&mut model, true, false);
        assert_eq!(
            model.selector(),
            &[
                Button {
                    id: "tv1".into(),
                    active: true,
                },
                Button {
                    id: "tv2".into(),
                    active: false,
                },
            ]
        );
        assert_eq!(
            model.viewer().status(),
            &ViewerStatus::Ready {
                url: "http://backend/proxy/tv1".into()
            }
        );
    }

    #[test]
    fn identical_refetch_keeps_selector() {
        let mut model = model(vec![Ok(pair())]);
        fetch(&mut model, true, false);
        let generation = model.selector_generation();
        fetch(&mut model, false, false);
        assert_eq!(model.selector_generation(), generation);
        assert_eq!(
            model.viewer().status(),
            &ViewerStatus::Ready {
                url: "http://backend/proxy/tv1".into()
            }
        );
    }

    #[test]
    fn unchanged_links_do_not_trigger_redraw() {
        let mut model = model(vec![Ok(pair())]);
        fetch(&mut model, true, false);
        let generation = model.selector_generation();
        model.needs_redraw = false;
        model.handle_response(AsyncResponse::Links {
            seq: 2,
            force_update: false,
            force_reload: false,
            result: Ok(pair()),
        });
        assert!(!model.needs_redraw);
        assert!(model.last_sync.is_some());
        assert_eq!(model.selector_generation(), generation);
    }

    #[test]
    fn broken_frame_fails_inline_and_survives_soft_refresh() {
        let links = LinkMap::from_pairs([("tv1", "http://x"), ("broken", "http://z")]);
        let mut model = model(vec![Ok(links)]);
        fetch(&mut model, true, false);
        let buttons = model.selector().to_vec();
        let generation = model.selector_generation();

        model.dispatch(state::Event::Select("broken".into()));
        settle(&mut model);
        assert!(matches!(
            model.viewer().status(),
            ViewerStatus::Failed { url, error }
                if url == "http://backend/proxy/broken" && error.contains("502")
        ));
        assert_eq!(model.selector_generation(), generation);
        assert_eq!(model.selector()[0].id, buttons[0].id);
        assert!(model.selector()[1].active);
        assert!(model.notice().is_none());

        model.dispatch(state::Event::RefreshTick);
        assert!(model.viewer().is_faded());
        settle(&mut model);
        assert!(!model.viewer().is_faded());
        assert!(!model.viewer().has_offscreen());
        assert!(model.preload_deadlines.is_empty());
        assert!(matches!(
            model.viewer().status(),
            ViewerStatus::Failed { .. }
        ));
        assert_eq!(model.selector_generation(), generation);
        assert_eq!(model.state().active(), Some("broken"));
    }

    #[test]
    fn failures_clear_buttons_and_show_error() {
        let mut model = model(vec![Ok(pair()), Err("connection refused".into())]);
        fetch(&mut model, true, false);
        fetch(&mut model, false, false);
        assert!(model.selector().is_empty());
        assert!(model.state().display_ids().is_empty());
        assert_eq!(model.state().active(), None);
        assert_eq!(model.viewer().status(), &ViewerStatus::Empty);
        assert!(model
            .notice()
            .is_some_and(|notice| notice.contains("connection refused")));
    }

    #[test]
    fn arrow_keys_move_highlight() {
        let mut model = model(vec![Ok(pair())]);
        fetch(&mut model, true, false);
        let quit = model.handle_key(KeyEvent::new(KeyCode::Left, KeyModifiers::NONE));
        assert!(!quit);
        assert_eq!(model.state().active(), Some("tv2"));
        assert!(model.selector()[1].active);
        assert!(!model.selector()[0].active);
    }

    #[test]
    fn digit_key_selects_button() {
        let mut model = model(vec![Ok(pair())]);
        fetch(&mut model, true, false);
        model.handle_key(KeyEvent::new(KeyCode::Char('2'), KeyModifiers::NONE));
        assert_eq!(model.state().active(), Some("tv2"));
        model.handle_key(KeyEvent::new(KeyCode::Char('9'), KeyModifiers::NONE));
        assert_eq!(model.state().active(), Some("tv2"));
    }

    #[test]
    fn quit_keys() {
        let mut model = model(vec![Ok(pair())]);
        assert!(model.handle_key(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE)));
        assert!(model.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)));
    }

    #[test]
    fn soft_refresh_swaps_without_blanking() {
        let mut model = model(vec![Ok(pair())]);
        fetch(&mut model, true, false);
        model.dispatch(state::Event::RefreshTick);
        assert!(model.viewer().is_faded());
        assert!(matches!(model.viewer().status(), ViewerStatus::Ready { .. }));
        settle(&mut model);
        assert!(!model.viewer().is_faded());
        assert!(!model.viewer().has_offscreen());
        assert!(model.preload_deadlines.is_empty());
    }

    #[test]
    fn expired_preload_deadline_reloads_directly() {
        let mut model = model(vec![Ok(pair())]);
        fetch(&mut model, true, false);
        model.dispatch(state::Event::RefreshTick);
        model.run_timers(Instant::now() + Duration::from_secs(16));
        assert!(!model.viewer().is_faded());
        assert!(model.preload_deadlines.is_empty());
        settle(&mut model);
        assert!(matches!(model.viewer().status(), ViewerStatus::Ready { .. }));
    }

    #[test]
    fn selector_line_numbers_buttons() {
        let buttons = vec![
            Button {
                id: "tv1".into(),
                active: false,
            },
            Button {
                id: "tv2".into(),
                active: true,
            },
        ];
        let line = selector_line(&buttons);
        assert_eq!(line.spans[0].content.as_ref(), " 1 tv1 ");
        assert_eq!(line.spans[2].content.as_ref(), " 2 tv2 ");
        assert_eq!(line.spans[2].style.bg, Some(COLOR_ACCENT));
    }

    #[test]
    fn selector_scrolls_to_active_button() {
        let mut buttons: Vec<Button> = ["tv1", "tv2", "tv3"]
            .iter()
            .map(|id| Button {
                id: id.to_string(),
                active: false,
            })
            .collect();
        assert_eq!(selector_scroll(&buttons, 10), 0);
        buttons[0].active = true;
        assert_eq!(selector_scroll(&buttons, 10), 0);
        buttons[0].active = false;
        buttons[2].active = true;
        assert_eq!(selector_scroll(&buttons, 10), 13);
        assert_eq!(selector_scroll(&buttons, 80), 0);
    }
}
