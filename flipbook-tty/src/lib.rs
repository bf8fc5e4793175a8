use std::io::{self, Write};

use anyhow::Result;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyModifiers},
    style::Print,
};
use flipbook_core::{Command, PageVisual};
use tracing::trace;

#[derive(Debug, Clone)]
pub enum UiEvent {
    Command(Command),
    OpenTableOfContents,
    OpenComposer,
    CloseOverlay,
    TocMoveSelection { delta: isize },
    TocActivateSelection,
    ComposerInput { ch: char },
    ComposerBackspace,
    ComposerEnter,
    ComposerNextField,
    ComposerPrevField,
    ComposerSubmit,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Toc,
    Compose,
}

/// Translates terminal key events into [`UiEvent`]s, keeping vi-style numeric
/// prefixes between events while in normal mode.
#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            trace!(?mode, "input mode changed");
            self.reset_count();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match self.mode {
            InputMode::Normal => self.map_event_normal(event),
            InputMode::Toc => self.map_event_toc(event),
            InputMode::Compose => self.map_event_compose(event),
        }
    }

    fn map_event_normal(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                    if let Some(digit) = c.to_digit(10) {
                        self.push_digit(digit as usize);
                    }
                    UiEvent::None
                }
                (KeyCode::Char('j'), KeyModifiers::NONE)
                | (KeyCode::Char('l'), KeyModifiers::NONE)
                | (KeyCode::Char(' '), KeyModifiers::NONE)
                | (KeyCode::Right, KeyModifiers::NONE)
                | (KeyCode::Down, KeyModifiers::NONE)
                | (KeyCode::PageDown, _) => {
                    let count = self.take_count();
                    UiEvent::Command(Command::NextPage { count })
                }
                (KeyCode::Char('k'), KeyModifiers::NONE)
                | (KeyCode::Char('h'), KeyModifiers::NONE)
                | (KeyCode::Left, KeyModifiers::NONE)
                | (KeyCode::Up, KeyModifiers::NONE)
                | (KeyCode::PageUp, _) => {
                    let count = self.take_count();
                    UiEvent::Command(Command::PrevPage { count })
                }
                (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                    self.reset_count();
                    UiEvent::Command(Command::GotoPage { page: 0 })
                }
                (KeyCode::Char('G'), KeyModifiers::SHIFT) | (KeyCode::End, _) => {
                    self.reset_count();
                    UiEvent::Command(Command::GotoPage { page: usize::MAX })
                }
                (KeyCode::Char('t'), _) | (KeyCode::Char('T'), _) => {
                    self.reset_count();
                    UiEvent::OpenTableOfContents
                }
                (KeyCode::Char('a'), _) | (KeyCode::Char('A'), _) => {
                    self.reset_count();
                    UiEvent::OpenComposer
                }
                (KeyCode::Char('q'), _) => {
                    self.reset_count();
                    UiEvent::Quit
                }
                _ => {
                    self.reset_count();
                    UiEvent::None
                }
            },
            _ => UiEvent::None,
        }
    }

    fn map_event_toc(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Esc, _) => UiEvent::CloseOverlay,
                (KeyCode::Char('t'), _) | (KeyCode::Char('T'), _) => UiEvent::CloseOverlay,
                (KeyCode::Enter, _) => UiEvent::TocActivateSelection,
                (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                    UiEvent::TocMoveSelection { delta: 1 }
                }
                (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                    UiEvent::TocMoveSelection { delta: -1 }
                }
                (KeyCode::Char('q'), _) => UiEvent::Quit,
                _ => UiEvent::None,
            },
            _ => UiEvent::None,
        }
    }

    fn map_event_compose(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Esc, _) => UiEvent::CloseOverlay,
                (KeyCode::Tab, _) => UiEvent::ComposerNextField,
                (KeyCode::BackTab, _) => UiEvent::ComposerPrevField,
                (KeyCode::Enter, _) => UiEvent::ComposerEnter,
                (KeyCode::Backspace, _) => UiEvent::ComposerBackspace,
                (KeyCode::Char('s'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                    UiEvent::ComposerSubmit
                }
                (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                    UiEvent::ComposerInput { ch: c }
                }
                _ => UiEvent::None,
            },
            _ => UiEvent::None,
        }
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    pub fn pending_input(&self) -> Option<String> {
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}

/// Greedy word wrap; words longer than the width are hard-split.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return Vec::new();
    }
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        let mut word = word;
        while word.chars().count() > width {
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            let split: usize = word.char_indices().nth(width).map(|(i, _)| i).unwrap_or(word.len());
            lines.push(word[..split].to_string());
            word = &word[split..];
        }
        let line_len = line.chars().count();
        let word_len = word.chars().count();
        if line.is_empty() {
            line.push_str(word);
        } else if line_len + 1 + word_len <= width {
            line.push(' ');
            line.push_str(word);
        } else {
            lines.push(std::mem::take(&mut line));
            line.push_str(word);
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

pub fn truncate_with_ellipsis(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len <= width {
        return text.to_string();
    }
    if width <= 3 {
        return text.chars().take(width).collect();
    }
    let mut truncated: String = text.chars().take(width - 3).collect();
    truncated.push_str("...");
    truncated
}

fn center(text: &str, width: usize) -> String {
    let text = truncate_with_ellipsis(text, width);
    let len = text.chars().count();
    let left = (width - len) / 2;
    let right = width - len - left;
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(right))
}

fn pad(text: &str, width: usize) -> String {
    let text = truncate_with_ellipsis(text, width);
    let len = text.chars().count();
    format!("{}{}", text, " ".repeat(width - len))
}

const MIN_PAGE_WIDTH: u16 = 12;
const MIN_PAGE_HEIGHT: u16 = 6;

/// Lays a page visual out as bordered text lines, `width` columns by
/// `height` rows. Returns nothing when the area is too small to hold a page.
pub fn render_page_lines(
    visual: &PageVisual,
    width: u16,
    height: u16,
    folio: Option<&str>,
) -> Vec<String> {
    if width < MIN_PAGE_WIDTH || height < MIN_PAGE_HEIGHT {
        return Vec::new();
    }
    let inner_width = usize::from(width) - 2;
    let inner_height = usize::from(height) - 2;

    let mut body = match visual {
        PageVisual::Cover { title, author } => {
            let mut lines = Vec::new();
            let drop = inner_height / 3;
            lines.resize(drop, String::new());
            lines.push(center(title, inner_width));
            if let Some(author) = author {
                lines.push(String::new());
                lines.push(center(&format!("by {}", author), inner_width));
            }
            lines.push(String::new());
            lines.push(center("a memoir", inner_width));
            lines
        }
        PageVisual::TableOfContents { entries } => {
            let mut lines = vec![center("Contents", inner_width), String::new()];
            for entry in entries {
                let label = format!("{:>2}  {}", entry.chapter + 1, entry.title);
                let page = format!("{}", entry.page + 1);
                let label_width = inner_width.saturating_sub(page.len() + 2);
                let mut line = pad(&label, label_width);
                line.push_str("  ");
                line.push_str(&page);
                lines.push(line);
            }
            if entries.is_empty() {
                lines.push(center("(no chapters yet)", inner_width));
            }
            lines
        }
        PageVisual::Chapter {
            number,
            title,
            tagline,
            image,
            paragraphs,
        } => {
            let mut lines = vec![
                center(&format!("Chapter {}", number), inner_width),
                center(title, inner_width),
            ];
            if let Some(tagline) = tagline {
                lines.push(center(tagline, inner_width));
            }
            if let Some(image) = image {
                lines.push(String::new());
                lines.push(center(&format!("[photo: {}]", image), inner_width));
            }
            for paragraph in paragraphs {
                lines.push(String::new());
                lines.extend(wrap_text(paragraph, inner_width));
            }
            lines
        }
        PageVisual::BackCover { title } => {
            let mut lines = Vec::new();
            lines.resize(inner_height / 3, String::new());
            lines.push(center("The End", inner_width));
            lines.push(String::new());
            lines.push(center(title, inner_width));
            lines
        }
    };

    body.truncate(inner_height);
    body.resize(inner_height, String::new());
    if let Some(folio) = folio {
        body[inner_height - 1] = center(folio, inner_width);
    }

    let horizontal = "-".repeat(inner_width);
    let mut lines = Vec::with_capacity(usize::from(height));
    lines.push(format!("+{}+", horizontal));
    for line in body {
        lines.push(format!("|{}|", pad(&line, inner_width)));
    }
    lines.push(format!("+{}+", horizontal));
    lines
}

/// Mid-turn frame: the incoming page is revealed from the right edge, the
/// fold column marking how far the turn has progressed.
pub fn compose_transition_lines(from: &[String], to: &[String], progress: f32) -> Vec<String> {
    let rows = from.len().min(to.len());
    if rows == 0 {
        return Vec::new();
    }
    let width = from[0].chars().count();
    let progress = progress.clamp(0.0, 1.0);
    let reveal = ((width as f32) * progress).round() as usize;
    let reveal = reveal.min(width);
    let fold = width - reveal;

    (0..rows)
        .map(|row| {
            if reveal == 0 {
                return from[row].clone();
            }
            if reveal >= width {
                return to[row].clone();
            }
            let from_chars: Vec<char> = from[row].chars().collect();
            let to_chars: Vec<char> = to[row].chars().collect();
            let mut line = String::with_capacity(width);
            for col in 0..width {
                if col < fold {
                    line.push(*from_chars.get(col).unwrap_or(&' '));
                } else if col == fold {
                    line.push('/');
                } else {
                    line.push(*to_chars.get(col).unwrap_or(&' '));
                }
            }
            line
        })
        .collect()
}

pub fn draw_lines<W: Write>(writer: &mut W, col: u16, row: u16, lines: &[String]) -> Result<()> {
    for (offset, line) in lines.iter().enumerate() {
        crossterm::execute!(
            writer,
            cursor::MoveTo(col, row.saturating_add(offset as u16)),
            Print(line)
        )?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}
