use std::borrow::Cow;

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{ImageFormat, RgbImage};
use once_cell::sync::Lazy;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use regex::Regex;
use textwrap::{wrap, Options as WrapOptions};

use crate::backend::FramePayload;

const MAX_TEXT_CHARS: usize = 8 * 1024;
const HALF_BLOCK: &str = "▀";

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>|<[^>]+>").unwrap()
});
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\r\f]+").unwrap());
static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n+").unwrap());

/// Decoded content of one proxied display.
#[derive(Debug, Clone)]
pub enum FrameContent {
    Image(RgbImage),
    Text(String),
}

impl FrameContent {
    pub fn decode(payload: &FramePayload) -> Result<Self> {
        let declared_image = payload
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"));

        let sniffed_image = matches!(
            image::guess_format(&payload.bytes),
            Ok(ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif | ImageFormat::WebP)
        );
        if declared_image || sniffed_image {
            let image = image::load_from_memory(&payload.bytes)
                .with_context(|| format!("decode image from {}", payload.url))?;
            return Ok(FrameContent::Image(image.to_rgb8()));
        }

        let raw = String::from_utf8_lossy(&payload.bytes);
        let is_html = payload
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("html"))
            || raw.trim_start().starts_with('<');
        let text = if is_html {
            html_to_text(&raw)
        } else {
            raw.trim().to_string()
        };
        Ok(FrameContent::Text(truncate_chars(text, MAX_TEXT_CHARS)))
    }

    pub fn render(&self, cols: u16, rows: u16, faded: bool) -> Text<'static> {
        match self {
            FrameContent::Image(image) => half_blocks(image, cols, rows, faded),
            FrameContent::Text(text) => text_block(text, cols, rows, faded),
        }
    }
}

fn html_to_text(html: &str) -> String {
    let stripped = TAG_RE.replace_all(html, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let collapsed = SPACE_RE.replace_all(&decoded, " ");
    let lines: Vec<&str> = collapsed.lines().map(str::trim).collect();
    BLANK_LINES_RE
        .replace_all(lines.join("\n").trim(), "\n\n")
        .into_owned()
}

fn truncate_chars(text: String, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((index, _)) => format!("{}…", &text[..index]),
        None => text,
    }
}

/// Draws `image` with one half-block glyph per two vertical pixels, scaled to
/// fit `cols` x `rows` cells while keeping the aspect ratio.
pub fn half_blocks(image: &RgbImage, cols: u16, rows: u16, faded: bool) -> Text<'static> {
    let (width, height) = image.dimensions();
    if cols == 0 || rows == 0 || width == 0 || height == 0 {
        return Text::default();
    }

    let max_w = cols as f64;
    let max_h = rows as f64 * 2.0;
    let scale = (max_w / width as f64).min(max_h / height as f64);
    let target_w = ((width as f64 * scale).floor() as u32).clamp(1, cols as u32);
    let target_h = ((height as f64 * scale).floor() as u32).clamp(1, rows as u32 * 2);

    let scaled: Cow<'_, RgbImage> = if (target_w, target_h) == (width, height) {
        Cow::Borrowed(image)
    } else {
        Cow::Owned(image::imageops::resize(
            image,
            target_w,
            target_h,
            FilterType::Triangle,
        ))
    };

    let mut lines = Vec::with_capacity(target_h.div_ceil(2) as usize);
    for y in (0..target_h).step_by(2) {
        let spans: Vec<Span<'static>> = (0..target_w)
            .map(|x| {
                let top = scaled.get_pixel(x, y);
                let style = Style::default().fg(cell_color(top.0, faded));
                let style = if y + 1 < target_h {
                    style.bg(cell_color(scaled.get_pixel(x, y + 1).0, faded))
                } else {
                    style
                };
                Span::styled(HALF_BLOCK, style)
            })
            .collect();
        lines.push(Line::from(spans));
    }
    Text::from(lines)
}

fn cell_color([r, g, b]: [u8; 3], faded: bool) -> Color {
    if faded {
        Color::Rgb(r / 4, g / 4, b / 4)
    } else {
        Color::Rgb(r, g, b)
    }
}

fn text_block(text: &str, cols: u16, rows: u16, faded: bool) -> Text<'static> {
    let width = cols.max(1) as usize;
    let style = if faded {
        Style::default().add_modifier(Modifier::DIM)
    } else {
        Style::default()
    };
    let lines: Vec<Line<'static>> = text
        .lines()
        .flat_map(|line| {
            if line.is_empty() {
                vec![Cow::Borrowed("")]
            } else {
                wrap(line, WrapOptions::new(width))
            }
        })
        .take(rows as usize)
        .map(|line| Line::from(Span::styled(line.into_owned(), style)))
        .collect();
    Text::from(lines)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerStatus {
    Empty,
    Loading { url: String },
    Ready { url: String },
    Failed { url: String, error: String },
}

/// The visible frame plus at most one off-screen buffer used by soft refresh.
pub struct Viewer {
    status: ViewerStatus,
    visible: Option<FrameContent>,
    offscreen: Option<(u64, FrameContent)>,
    faded: bool,
    load_seq: u64,
    cache: Option<((u16, u16, bool), Text<'static>)>,
}

impl Default for Viewer {
    fn default() -> Self {
        Self::new()
    }
}

impl Viewer {
    pub fn new() -> Self {
        Self {
            status: ViewerStatus::Empty,
            visible: None,
            offscreen: None,
            faded: false,
            load_seq: 0,
            cache: None,
        }
    }

    pub fn status(&self) -> &ViewerStatus {
        &self.status
    }

    pub fn is_faded(&self) -> bool {
        self.faded
    }

    pub fn has_offscreen(&self) -> bool {
        self.offscreen.is_some()
    }

    /// Direct load: the current content is dropped right away. Returns the
    /// load number that `finish_load` must be called with.
    pub fn begin_load(&mut self, url: &str) -> u64 {
        self.load_seq += 1;
        self.visible = None;
        self.cache = None;
        self.status = ViewerStatus::Loading {
            url: url.to_string(),
        };
        self.load_seq
    }

    /// Results of superseded loads are dropped.
    pub fn finish_load(&mut self, load: u64, result: Result<FrameContent>) -> bool {
        let url = match &self.status {
            ViewerStatus::Loading { url } if load == self.load_seq => url.clone(),
            _ => return false,
        };
        self.cache = None;
        match result {
            Ok(content) => {
                self.visible = Some(content);
                self.status = ViewerStatus::Ready { url };
            }
            Err(err) => {
                self.visible = None;
                self.status = ViewerStatus::Failed {
                    url,
                    error: format!("{err:#}"),
                };
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.visible = None;
        self.offscreen = None;
        self.faded = false;
        self.cache = None;
        self.status = ViewerStatus::Empty;
    }

    pub fn set_faded(&mut self, faded: bool) {
        if self.faded != faded {
            self.faded = faded;
            self.cache = None;
        }
    }

    pub fn store_offscreen(&mut self, token: u64, content: FrameContent) {
        self.offscreen = Some((token, content));
    }

    /// Moves the off-screen buffer for `token` into view.
    pub fn swap(&mut self, token: u64) -> bool {
        match self.offscreen.take() {
            Some((stored, content)) if stored == token => {
                let url = match &self.status {
                    ViewerStatus::Ready { url }
                    | ViewerStatus::Loading { url }
                    | ViewerStatus::Failed { url, .. } => url.clone(),
                    ViewerStatus::Empty => String::new(),
                };
                self.visible = Some(content);
                self.status = ViewerStatus::Ready { url };
                self.cache = None;
                true
            }
            other => {
                self.offscreen = other;
                false
            }
        }
    }

    pub fn discard(&mut self, token: u64) {
        if matches!(self.offscreen, Some((stored, _)) if stored == token) {
            self.offscreen = None;
        }
    }

    pub fn render(&mut self, cols: u16, rows: u16) -> Text<'static> {
        let key = (cols, rows, self.faded);
        if let Some((cached_key, text)) = &self.cache {
            if *cached_key == key {
                return text.clone();
            }
        }
        let text = match &self.visible {
            Some(content) => content.render(cols, rows, self.faded),
            None => return Text::default(),
        };
        self.cache = Some((key, text.clone()));
        text
    }
}
