use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event;
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use flipbook_core::{
    BookEvent, Command, DraftBuffer, DraftField, FileBookProvider, Page, Session, TocEntry,
    chapter_to_page,
};
use flipbook_engine::{PageTurnEngine, DEFAULT_FLIP_STEPS};
use flipbook_tty::{
    compose_transition_lines, draw_lines, render_page_lines, truncate_with_ellipsis, wrap_text,
    write_status_line, EventMapper, InputMode, UiEvent,
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "flipbook",
    version,
    about = "page-turning memoir viewer for the terminal"
)]
struct Args {
    /// Page to open the book on (0-based)
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,

    /// Chapter to open the book on (0-based)
    #[arg(short = 'c', long = "chapter")]
    chapter: Option<usize>,

    /// Path to a TOML book file; the built-in memoir is used when omitted
    book: Option<PathBuf>,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

const IDLE_POLL: Duration = Duration::from_millis(100);
const ANIMATION_POLL: Duration = Duration::from_millis(33);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "flipbook", "flipbook")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let mut session = Session::with_default_book();
    if let Some(path) = &args.book {
        session.open_with(&FileBookProvider, path.clone()).await?;
    }
    session.mount_engine(Box::new(PageTurnEngine::new(DEFAULT_FLIP_STEPS)));

    if let Some(chapter) = args.chapter {
        session.apply(Command::GotoChapter { index: chapter })?;
    } else if let Some(page) = args.page {
        session.apply(Command::GotoPage { page })?;
    }
    // Skip the opening animation and land directly on the requested page.
    while session.is_animating() {
        session.tick();
    }

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide)?;
    let mut event_mapper = EventMapper::new();
    let mut overlay = OverlayState::None;
    let mut dirty = true;
    let mut needs_initial_clear = true;

    loop {
        let desired_mode = overlay.input_mode();
        if event_mapper.mode() != desired_mode {
            event_mapper.set_mode(desired_mode);
        }

        drain_events(&mut session, &mut dirty, &mut needs_initial_clear);

        if dirty {
            if needs_initial_clear {
                crossterm::execute!(stdout, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
                needs_initial_clear = false;
            }
            let pending = event_mapper.pending_input();
            redraw(&mut stdout, &session, pending.as_deref(), &mut overlay)?;
            dirty = false;
        }

        let timeout = if session.is_animating() {
            ANIMATION_POLL
        } else {
            IDLE_POLL
        };
        if event::poll(timeout)? {
            let ev = event::read()?;
            let ui_event = event_mapper.map_event(ev);
            let overlay_was_active = overlay.is_active();
            match handle_event(ui_event, &mut session, &mut overlay, &mut event_mapper)? {
                LoopAction::ContinueRedraw => dirty = true,
                LoopAction::Continue => {}
                LoopAction::Quit => break,
            }
            if overlay.is_active() != overlay_was_active {
                needs_initial_clear = true;
                dirty = true;
            }
        }

        if session.is_animating() {
            session.tick();
            dirty = true;
        }
    }

    crossterm::execute!(stdout, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    Ok(())
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

enum OverlayState {
    None,
    Toc(TocWindow),
    Compose(ComposeWindow),
}

impl OverlayState {
    fn deactivate(&mut self) {
        *self = OverlayState::None;
    }

    fn is_active(&self) -> bool {
        !matches!(self, OverlayState::None)
    }

    fn input_mode(&self) -> InputMode {
        match self {
            OverlayState::None => InputMode::Normal,
            OverlayState::Toc(_) => InputMode::Toc,
            OverlayState::Compose(_) => InputMode::Compose,
        }
    }
}

struct TocWindow {
    entries: Vec<TocEntry>,
    selected: usize,
    scroll_offset: usize,
}

impl TocWindow {
    fn from_session(session: &Session) -> Self {
        let entries = session
            .chapters()
            .iter()
            .enumerate()
            .map(|(index, chapter)| TocEntry {
                chapter: index,
                title: chapter.title.clone(),
                page: chapter_to_page(index),
            })
            .collect();
        let mut window = Self {
            entries,
            selected: 0,
            scroll_offset: 0,
        };
        window.update_selection_for_page(session.current_page());
        window
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn selected_entry(&self) -> Option<&TocEntry> {
        self.entries.get(self.selected)
    }

    fn move_selection(&mut self, delta: isize) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let len = self.entries.len() as isize;
        let next = (self.selected as isize + delta).clamp(0, len - 1) as usize;
        if next != self.selected {
            self.selected = next;
            true
        } else {
            false
        }
    }

    fn ensure_visible(&mut self, viewport_height: usize) {
        if viewport_height == 0 || self.entries.is_empty() {
            self.scroll_offset = 0;
            return;
        }
        let max_offset = self.entries.len().saturating_sub(viewport_height.max(1));
        if self.scroll_offset > max_offset {
            self.scroll_offset = max_offset;
        }
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
            return;
        }
        let bottom = self.scroll_offset + viewport_height;
        if self.selected >= bottom {
            self.scroll_offset = self
                .selected
                .saturating_sub(viewport_height.saturating_sub(1));
        }
    }

    fn update_selection_for_page(&mut self, current_page: usize) {
        if self.entries.is_empty() {
            self.selected = 0;
            self.scroll_offset = 0;
            return;
        }
        let mut next = 0;
        for (idx, entry) in self.entries.iter().enumerate() {
            if entry.page <= current_page {
                next = idx;
            } else {
                break;
            }
        }
        self.selected = next;
    }
}

struct ComposeWindow {
    focused: DraftField,
}

impl ComposeWindow {
    fn new() -> Self {
        Self {
            focused: DraftField::Title,
        }
    }

    fn focus_next(&mut self) {
        self.focused = self.focused.next();
    }

    fn focus_prev(&mut self) {
        self.focused = self.focused.prev();
    }
}

fn drain_events(session: &mut Session, dirty: &mut bool, needs_initial_clear: &mut bool) {
    let events = session.events();
    let drained: Vec<BookEvent> = std::mem::take(&mut *events.lock());
    for event in drained {
        match event {
            BookEvent::BookOpened => {
                *needs_initial_clear = true;
                *dirty = true;
            }
            BookEvent::PagesRecomposed { .. } => {
                *needs_initial_clear = true;
                *dirty = true;
            }
            BookEvent::ChapterAppended { index } => {
                info!(chapter = index, "chapter appended");
                *dirty = true;
            }
            BookEvent::RedrawNeeded => {
                *dirty = true;
            }
        }
    }
}

fn handle_event(
    event: UiEvent,
    session: &mut Session,
    overlay: &mut OverlayState,
    mapper: &mut EventMapper,
) -> Result<LoopAction> {
    match event {
        UiEvent::Command(cmd) => {
            session.apply(cmd)?;
            if let OverlayState::Toc(toc) = overlay {
                toc.update_selection_for_page(session.current_page());
            }
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::OpenTableOfContents => {
            *overlay = OverlayState::Toc(TocWindow::from_session(session));
            mapper.set_mode(InputMode::Toc);
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::OpenComposer => {
            *overlay = OverlayState::Compose(ComposeWindow::new());
            mapper.set_mode(InputMode::Compose);
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::CloseOverlay => {
            if overlay.is_active() {
                overlay.deactivate();
                mapper.set_mode(InputMode::Normal);
                Ok(LoopAction::ContinueRedraw)
            } else {
                Ok(LoopAction::Continue)
            }
        }
        UiEvent::TocMoveSelection { delta } => {
            if let OverlayState::Toc(toc) = overlay {
                if toc.move_selection(delta) {
                    return Ok(LoopAction::ContinueRedraw);
                }
            }
            Ok(LoopAction::Continue)
        }
        UiEvent::TocActivateSelection => {
            if let OverlayState::Toc(toc) = overlay {
                if let Some(entry) = toc.selected_entry() {
                    session.apply(Command::GotoChapter {
                        index: entry.chapter,
                    })?;
                    overlay.deactivate();
                    mapper.set_mode(InputMode::Normal);
                    return Ok(LoopAction::ContinueRedraw);
                }
            }
            Ok(LoopAction::Continue)
        }
        UiEvent::ComposerInput { ch } => {
            if let OverlayState::Compose(window) = overlay {
                session.draft_mut().push_char(window.focused, ch);
                return Ok(LoopAction::ContinueRedraw);
            }
            Ok(LoopAction::Continue)
        }
        UiEvent::ComposerBackspace => {
            if let OverlayState::Compose(window) = overlay {
                session.draft_mut().pop_char(window.focused);
                return Ok(LoopAction::ContinueRedraw);
            }
            Ok(LoopAction::Continue)
        }
        UiEvent::ComposerEnter => {
            if let OverlayState::Compose(window) = overlay {
                if window.focused == DraftField::Content {
                    session.draft_mut().push_char(DraftField::Content, '\n');
                } else {
                    window.focus_next();
                }
                return Ok(LoopAction::ContinueRedraw);
            }
            Ok(LoopAction::Continue)
        }
        UiEvent::ComposerNextField => {
            if let OverlayState::Compose(window) = overlay {
                window.focus_next();
                return Ok(LoopAction::ContinueRedraw);
            }
            Ok(LoopAction::Continue)
        }
        UiEvent::ComposerPrevField => {
            if let OverlayState::Compose(window) = overlay {
                window.focus_prev();
                return Ok(LoopAction::ContinueRedraw);
            }
            Ok(LoopAction::Continue)
        }
        UiEvent::ComposerSubmit => {
            if matches!(overlay, OverlayState::Compose(_)) {
                let before = session.chapter_count();
                session.apply(Command::SubmitDraft)?;
                if session.chapter_count() > before {
                    overlay.deactivate();
                    mapper.set_mode(InputMode::Normal);
                }
                return Ok(LoopAction::ContinueRedraw);
            }
            Ok(LoopAction::Continue)
        }
        UiEvent::Quit => Ok(LoopAction::Quit),
        UiEvent::None => Ok(LoopAction::Continue),
    }
}

fn redraw(
    stdout: &mut io::Stdout,
    session: &Session,
    pending_input: Option<&str>,
    overlay: &mut OverlayState,
) -> Result<()> {
    let (total_cols, total_rows) = terminal::size()?;
    let total_cols = total_cols.max(1);
    let total_rows = total_rows.max(1);
    let book_rows = total_rows.saturating_sub(1).max(1);

    match overlay {
        OverlayState::Toc(toc) => {
            crossterm::execute!(stdout, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
            draw_toc_overlay(stdout, toc, total_cols, book_rows)?;
            return Ok(());
        }
        OverlayState::Compose(window) => {
            crossterm::execute!(stdout, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
            draw_compose_overlay(stdout, window, session.draft(), total_cols, book_rows)?;
            return Ok(());
        }
        OverlayState::None => {}
    }

    let page_width = total_cols.saturating_sub(4).min(64).max(1);
    let page_height = book_rows.saturating_sub(2).max(1);
    let start_col = (total_cols - page_width) / 2;
    let start_row = (book_rows - page_height) / 2;

    let frame = session.frame();
    let lines = match frame.transition {
        Some(transition) => {
            let from = page_lines(session, transition.from, page_width, page_height);
            let to = page_lines(session, transition.to, page_width, page_height);
            compose_transition_lines(&from, &to, transition.progress)
        }
        None => page_lines(session, frame.current, page_width, page_height),
    };
    draw_lines(stdout, start_col, start_row, &lines)?;

    let status = format_book_status(session);
    if let Some(status) = combine_status(Some(status), pending_input) {
        draw_status_line(stdout, &status)?;
    }

    Ok(())
}

fn page_lines(session: &Session, page: usize, width: u16, height: u16) -> Vec<String> {
    let Some(visual) = session.visual(page) else {
        return Vec::new();
    };
    let folio = if page == 0 {
        None
    } else {
        Some(format!("{} / {}", page + 1, session.page_count()))
    };
    render_page_lines(visual, width, height, folio.as_deref())
}

fn format_book_status(session: &Session) -> String {
    let current = session.current_page();
    let mut status = format!(
        "{} — page {}/{}",
        session.info().title,
        current + 1,
        session.page_count()
    );
    if let Some(Page::Chapter(index)) = session.pages().get(current) {
        if let Some(chapter) = session.chapters().get(*index) {
            status.push_str(&format!(" — Chapter {}: {}", index + 1, chapter.title));
        }
    }
    status
}

fn combine_status(base: Option<String>, pending_input: Option<&str>) -> Option<String> {
    match (base, pending_input.filter(|s| !s.is_empty())) {
        (Some(mut base), Some(pending)) => {
            base.push_str(" | ");
            base.push_str(pending);
            Some(base)
        }
        (Some(base), None) => Some(base),
        (None, Some(pending)) => Some(pending.to_string()),
        (None, None) => None,
    }
}

fn draw_status_line(stdout: &mut io::Stdout, status: &str) -> Result<()> {
    let (_, total_rows) = terminal::size()?;
    let status_row = total_rows.saturating_sub(1);
    crossterm::execute!(
        stdout,
        cursor::MoveTo(0, status_row),
        Clear(ClearType::CurrentLine)
    )?;
    write_status_line(stdout, status)?;
    Ok(())
}

fn draw_toc_overlay(
    stdout: &mut io::Stdout,
    toc: &mut TocWindow,
    total_cols: u16,
    book_rows: u16,
) -> Result<()> {
    const TITLE: &str = "Table of Contents";
    const EMPTY_MESSAGE: &str = "No chapters yet";

    let total_cols = u32::from(total_cols);
    let book_rows = u32::from(book_rows);
    if total_cols < 20 || book_rows < 6 {
        return Ok(());
    }

    let max_inner_width = total_cols.saturating_sub(6) as usize;
    if max_inner_width < 10 {
        return Ok(());
    }

    let base_width = if toc.is_empty() {
        EMPTY_MESSAGE.len() + 2
    } else {
        toc.entries
            .iter()
            .map(toc_line_length)
            .max()
            .unwrap_or(0)
            .max(TITLE.len())
    };

    let inner_width = base_width.clamp(20.min(max_inner_width), max_inner_width);

    let max_window_height = book_rows.saturating_sub(2);
    if max_window_height < 6 {
        return Ok(());
    }
    let max_content_height = max_window_height.saturating_sub(4) as usize;
    if max_content_height == 0 {
        return Ok(());
    }

    let total_entries = if toc.is_empty() { 1 } else { toc.entries.len() };
    let content_height = total_entries.min(max_content_height).max(1);
    toc.ensure_visible(content_height);
    let max_scroll = total_entries.saturating_sub(content_height);
    if toc.scroll_offset > max_scroll {
        toc.scroll_offset = max_scroll;
    }

    let window_height = (content_height + 4) as u32;
    let window_width = (inner_width + 2) as u32;
    if window_height > max_window_height || window_width > total_cols {
        return Ok(());
    }

    let start_col = ((total_cols - window_width) / 2) as u16;
    let mut current_row = ((book_rows - window_height) / 2) as u16;
    let horizontal_border = "-".repeat(inner_width);

    print_inverted(stdout, start_col, current_row, &format!("+{}+", horizontal_border))?;
    current_row = current_row.saturating_add(1);

    let title_line = format!("|{: ^inner_width$}|", TITLE, inner_width = inner_width);
    print_inverted(stdout, start_col, current_row, &title_line)?;
    current_row = current_row.saturating_add(1);

    let divider = format!("|{}|", horizontal_border);
    print_inverted(stdout, start_col, current_row, &divider)?;
    current_row = current_row.saturating_add(1);

    if toc.is_empty() {
        let content = pad_line(&format!("  {}", EMPTY_MESSAGE), inner_width);
        print_inverted(stdout, start_col, current_row, &format!("|{}|", content))?;
        current_row = current_row.saturating_add(1);
    } else {
        let start_index = toc.scroll_offset;
        let end_index = (start_index + content_height).min(toc.entries.len());
        for idx in start_index..end_index {
            let entry = &toc.entries[idx];
            let selected = idx == toc.selected;
            let content = format_toc_line(entry, selected, inner_width);
            print_inverted(stdout, start_col, current_row, &format!("|{}|", content))?;
            current_row = current_row.saturating_add(1);
        }

        let rendered = end_index - start_index;
        for _ in rendered..content_height {
            let blank = format!("|{}|", " ".repeat(inner_width));
            print_inverted(stdout, start_col, current_row, &blank)?;
            current_row = current_row.saturating_add(1);
        }
    }

    print_inverted(stdout, start_col, current_row, &format!("+{}+", horizontal_border))?;
    Ok(())
}

fn draw_compose_overlay(
    stdout: &mut io::Stdout,
    window: &ComposeWindow,
    draft: &DraftBuffer,
    total_cols: u16,
    book_rows: u16,
) -> Result<()> {
    const TITLE: &str = "Add a Chapter";
    const FOOTER: &str = "Tab fields · Enter next/newline · Ctrl-S save · Esc close";

    let total_cols = usize::from(total_cols);
    let book_rows = usize::from(book_rows);
    if total_cols < 30 || book_rows < 14 {
        return Ok(());
    }

    let inner_width = (total_cols - 6).min(58);
    let value_width = inner_width.saturating_sub(4);

    let mut body: Vec<String> = Vec::new();
    for field in DraftField::ALL {
        let focused = field == window.focused;
        let marker = if focused { '>' } else { ' ' };
        body.push(format!("{} {}:", marker, field.label()));
        if field == DraftField::Content {
            let mut content_lines: Vec<String> = Vec::new();
            for paragraph in draft.field(field).split('\n') {
                if paragraph.is_empty() {
                    content_lines.push(String::new());
                } else {
                    content_lines.extend(wrap_text(paragraph, value_width));
                }
            }
            if content_lines.is_empty() {
                content_lines.push(String::new());
            }
            if focused {
                let last = content_lines.last_mut().expect("at least one line");
                last.push('_');
            }
            let keep = content_lines.len().saturating_sub(4);
            for line in content_lines.into_iter().skip(keep) {
                body.push(format!("    {}", truncate_with_ellipsis(&line, value_width)));
            }
        } else {
            let value = draft.field(field);
            // Show the tail of a value that outgrew the field.
            let tail: String = value
                .chars()
                .rev()
                .take(value_width.saturating_sub(1))
                .collect::<Vec<char>>()
                .into_iter()
                .rev()
                .collect();
            let cursor = if focused { "_" } else { "" };
            body.push(format!("    {}{}", tail, cursor));
        }
        body.push(String::new());
    }
    body.push(truncate_with_ellipsis(FOOTER, inner_width));

    let window_height = body.len() + 4;
    if window_height > book_rows {
        return Ok(());
    }
    let window_width = inner_width + 2;

    let start_col = ((total_cols - window_width) / 2) as u16;
    let mut current_row = ((book_rows - window_height) / 2) as u16;
    let horizontal_border = "-".repeat(inner_width);

    print_inverted(stdout, start_col, current_row, &format!("+{}+", horizontal_border))?;
    current_row = current_row.saturating_add(1);

    let title_line = format!("|{: ^inner_width$}|", TITLE, inner_width = inner_width);
    print_inverted(stdout, start_col, current_row, &title_line)?;
    current_row = current_row.saturating_add(1);

    print_inverted(stdout, start_col, current_row, &format!("|{}|", horizontal_border))?;
    current_row = current_row.saturating_add(1);

    for line in &body {
        let content = pad_line(line, inner_width);
        print_inverted(stdout, start_col, current_row, &format!("|{}|", content))?;
        current_row = current_row.saturating_add(1);
    }

    print_inverted(stdout, start_col, current_row, &format!("+{}+", horizontal_border))?;
    Ok(())
}

fn print_inverted(writer: &mut impl Write, col: u16, row: u16, content: &str) -> Result<()> {
    crossterm::execute!(
        writer,
        cursor::MoveTo(col, row),
        SetAttribute(Attribute::Reverse),
        Print(content),
        SetAttribute(Attribute::Reset)
    )?;
    Ok(())
}

fn toc_line_length(entry: &TocEntry) -> usize {
    let page_suffix = format!(" (p{})", entry.page + 1);
    2 + entry.title.chars().count() + page_suffix.len()
}

fn format_toc_line(entry: &TocEntry, selected: bool, inner_width: usize) -> String {
    let marker = if selected { '>' } else { ' ' };
    let page_suffix = format!(" (p{})", entry.page + 1);

    let mut text = String::new();
    text.push(marker);
    text.push(' ');
    text.push_str(&entry.title);
    text.push_str(&page_suffix);

    pad_line(&text, inner_width)
}

fn pad_line(text: &str, width: usize) -> String {
    let mut text = truncate_with_ellipsis(text, width);
    let len = text.chars().count();
    if len < width {
        text.push_str(&" ".repeat(width - len));
    }
    text
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "flipbook.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
