//! Display client state machine.
//!
//! [`update`] consumes the current [`ClientState`] and one [`Event`] and
//! returns the next state together with the [`Effect`]s the runtime has to
//! carry out. Nothing in this module performs I/O, so every transition can be
//! exercised without a terminal or a backend.

use std::time::Duration;

use log::{debug, info, warn};

use crate::backend::{self, LinkMap};

pub const NO_DISPLAYS_NOTICE: &str = "No displays available.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub reload_every: u64,
    pub preload_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            reload_every: 3,
            preload_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preload {
    pub token: u64,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameState {
    pub source: Option<String>,
    pub faded: bool,
    pub preload: Option<Preload>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Error(String),
    Empty,
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::Error(message) => message.clone(),
            Notice::Empty => NO_DISPLAYS_NOTICE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    FetchRequested {
        force_update: bool,
        force_reload: bool,
    },
    LinksLoaded {
        seq: u64,
        links: LinkMap,
        force_update: bool,
        force_reload: bool,
    },
    LinksFailed {
        seq: u64,
        error: String,
    },
    Select(String),
    Navigate(Direction),
    RefreshTick,
    ReconcileTick,
    PreloadLoaded {
        token: u64,
    },
    PreloadFailed {
        token: u64,
        error: String,
    },
    PreloadTimedOut {
        token: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchLinks {
        seq: u64,
        force_update: bool,
        force_reload: bool,
    },
    /// Throw away the selector and build one button per id, in order.
    RenderSelector {
        ids: Vec<String>,
        active: Option<String>,
    },
    Highlight {
        active: Option<String>,
    },
    /// Replaces the selector buttons with inline text.
    ShowNotice(String),
    LoadFrame {
        url: String,
    },
    ClearFrame,
    FadeOut,
    FadeIn,
    Preload {
        token: u64,
        url: String,
    },
    ScheduleTimeout {
        token: u64,
        after: Duration,
    },
    SwapPreloaded {
        token: u64,
    },
    DiscardPreload {
        token: u64,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ClientState {
    settings: Settings,
    links: LinkMap,
    display_ids: Vec<String>,
    active: Option<String>,
    frame: FrameState,
    notice: Option<Notice>,
    last_fetch_seq: u64,
    applied_fetch_seq: u64,
    last_token: u64,
    reconcile_ticks: u64,
}

pub fn update(mut state: ClientState, event: Event) -> (ClientState, Vec<Effect>) {
    let mut effects = Vec::new();
    state.apply(event, &mut effects);
    (state, effects)
}

impl ClientState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn links(&self) -> &LinkMap {
        &self.links
    }

    pub fn display_ids(&self) -> &[String] {
        &self.display_ids
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn frame(&self) -> &FrameState {
        &self.frame
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn reconcile_ticks(&self) -> u64 {
        self.reconcile_ticks
    }

    fn apply(&mut self, event: Event, effects: &mut Vec<Effect>) {
        match event {
            Event::FetchRequested {
                force_update,
                force_reload,
            } => self.request_fetch(force_update, force_reload, effects),
            Event::LinksLoaded {
                seq,
                links,
                force_update,
                force_reload,
            } => self.links_loaded(seq, links, force_update, force_reload, effects),
            Event::LinksFailed { seq, error } => self.links_failed(seq, error, effects),
            Event::Select(id) => {
                if self.display_ids.contains(&id) {
                    self.load_tv(id, effects);
                } else {
                    warn!("ignoring selection of unknown display {id}");
                }
            }
            Event::Navigate(direction) => self.navigate(direction, effects),
            Event::RefreshTick => self.soft_refresh(effects),
            Event::ReconcileTick => {
                self.reconcile_ticks += 1;
                let force_reload = self.reconcile_ticks % self.settings.reload_every.max(1) == 0;
                self.request_fetch(false, force_reload, effects);
            }
            Event::PreloadLoaded { token } => self.preload_loaded(token, effects),
            Event::PreloadFailed { token, error } => {
                warn!("soft refresh preload {token} failed: {error}");
                self.abort_preload(token, effects);
            }
            Event::PreloadTimedOut { token } => {
                if self.pending_token() == Some(token) {
                    warn!(
                        "soft refresh preload {token} did not finish within {:?}",
                        self.settings.preload_timeout
                    );
                }
                self.abort_preload(token, effects);
            }
        }
    }

    fn request_fetch(&mut self, force_update: bool, force_reload: bool, effects: &mut Vec<Effect>) {
        self.last_fetch_seq += 1;
        effects.push(Effect::FetchLinks {
            seq: self.last_fetch_seq,
            force_update,
            force_reload,
        });
    }

    fn links_loaded(
        &mut self,
        seq: u64,
        links: LinkMap,
        force_update: bool,
        force_reload: bool,
        effects: &mut Vec<Effect>,
    ) {
        if seq <= self.applied_fetch_seq {
            debug!("dropping stale links response {seq}");
            return;
        }
        self.applied_fetch_seq = seq;

        let ids = links.ids();
        let changed = ids != self.display_ids;
        let recovering = matches!(self.notice, Some(Notice::Error(_)));
        self.links = links;

        if !(changed || force_update || recovering) {
            if force_reload {
                self.reload_active(effects);
            } else {
                debug!("links unchanged ({} displays)", self.display_ids.len());
            }
            return;
        }

        info!("rendering {} displays", ids.len());
        self.display_ids = ids;
        self.notice = None;
        let active = self
            .active
            .clone()
            .filter(|id| self.display_ids.contains(id));
        effects.push(Effect::RenderSelector {
            ids: self.display_ids.clone(),
            active: active.clone(),
        });

        if active.is_some() {
            if force_reload {
                self.reload_active(effects);
            }
            return;
        }

        match self.display_ids.first().cloned() {
            Some(first) => self.load_tv(first, effects),
            None => {
                self.clear_view(effects);
                self.notice = Some(Notice::Empty);
                effects.push(Effect::ShowNotice(NO_DISPLAYS_NOTICE.to_string()));
            }
        }
    }

    fn links_failed(&mut self, seq: u64, error: String, effects: &mut Vec<Effect>) {
        if seq <= self.applied_fetch_seq {
            debug!("dropping stale links failure {seq}");
            return;
        }
        self.applied_fetch_seq = seq;

        warn!("links fetch failed, clearing displays: {error}");
        self.links = LinkMap::new();
        self.display_ids.clear();
        self.clear_view(effects);
        effects.push(Effect::RenderSelector {
            ids: Vec::new(),
            active: None,
        });
        let notice = Notice::Error(format!("Failed to fetch links: {error}"));
        effects.push(Effect::ShowNotice(notice.message()));
        self.notice = Some(notice);
    }

    fn load_tv(&mut self, id: String, effects: &mut Vec<Effect>) {
        self.cancel_preload(effects);
        let url = backend::proxy_url(&self.settings.base_url, &id);
        info!("loading display {id} from {url}");
        self.active = Some(id);
        self.frame.source = Some(url.clone());
        effects.push(Effect::Highlight {
            active: self.active.clone(),
        });
        effects.push(Effect::LoadFrame { url });
    }

    fn reload_active(&mut self, effects: &mut Vec<Effect>) {
        if let Some(id) = self.active.clone() {
            self.load_tv(id, effects);
        }
    }

    fn clear_view(&mut self, effects: &mut Vec<Effect>) {
        self.cancel_preload(effects);
        self.active = None;
        self.frame.source = None;
        effects.push(Effect::ClearFrame);
    }

    fn navigate(&mut self, direction: Direction, effects: &mut Vec<Effect>) {
        let len = self.display_ids.len();
        if len == 0 {
            return;
        }
        let current = self
            .active
            .as_ref()
            .and_then(|active| self.display_ids.iter().position(|id| id == active));
        let next = match (direction, current) {
            (Direction::Right, Some(index)) => (index + 1) % len,
            (Direction::Left, Some(index)) => (index + len - 1) % len,
            (Direction::Right, None) => 0,
            (Direction::Left, None) => len - 1,
        };
        let id = self.display_ids[next].clone();
        self.load_tv(id, effects);
    }

    fn soft_refresh(&mut self, effects: &mut Vec<Effect>) {
        if self.active.is_none() {
            return;
        }
        let Some(url) = self.frame.source.clone() else {
            return;
        };
        if let Some(pending) = &self.frame.preload {
            debug!("soft refresh {} still pending", pending.token);
            return;
        }

        self.last_token += 1;
        let token = self.last_token;
        debug!("soft refresh {token} of {url}");
        self.frame.preload = Some(Preload {
            token,
            url: url.clone(),
        });
        self.frame.faded = true;
        effects.push(Effect::FadeOut);
        effects.push(Effect::Preload { token, url });
        effects.push(Effect::ScheduleTimeout {
            token,
            after: self.settings.preload_timeout,
        });
    }

    fn preload_loaded(&mut self, token: u64, effects: &mut Vec<Effect>) {
        if self.pending_token() != Some(token) {
            effects.push(Effect::DiscardPreload { token });
            return;
        }
        self.frame.preload = None;
        self.frame.faded = false;
        effects.push(Effect::SwapPreloaded { token });
        effects.push(Effect::FadeIn);
    }

    fn abort_preload(&mut self, token: u64, effects: &mut Vec<Effect>) {
        if self.pending_token() != Some(token) {
            return;
        }
        let Some(preload) = self.frame.preload.take() else {
            return;
        };
        self.frame.faded = false;
        effects.push(Effect::DiscardPreload { token });
        effects.push(Effect::FadeIn);
        effects.push(Effect::LoadFrame { url: preload.url });
    }

    fn cancel_preload(&mut self, effects: &mut Vec<Effect>) {
        if let Some(preload) = self.frame.preload.take() {
            effects.push(Effect::DiscardPreload {
                token: preload.token,
            });
        }
        if self.frame.faded {
            self.frame.faded = false;
            effects.push(Effect::FadeIn);
        }
    }

    fn pending_token(&self) -> Option<u64> {
        self.frame.preload.as_ref().map(|preload| preload.token)
    }
}
