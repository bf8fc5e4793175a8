use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

/// Pages that precede the first chapter: the cover and the table of contents.
pub const FRONT_MATTER_PAGES: usize = 2;

/// Maps a logical chapter index to its physical page index in the composed book.
pub fn chapter_to_page(chapter: usize) -> usize {
    chapter + FRONT_MATTER_PAGES
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookInfo {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
}

/// On-disk shape of a book file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read book file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid book file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("book file declares no chapters")]
    Empty,
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = toml::from_str(text)?;
        if manifest.chapters.is_empty() {
            return Err(ManifestError::Empty);
        }
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn into_parts(self) -> (BookInfo, Vec<Chapter>) {
        (
            BookInfo {
                title: self.title,
                author: self.author,
            },
            self.chapters,
        )
    }
}

static DEFAULT_BOOK: Lazy<Manifest> =
    Lazy::new(|| Manifest::parse(include_str!("memoir.toml")).expect("valid embedded memoir"));

/// The memoir shipped with the binary.
pub fn default_manifest() -> Manifest {
    DEFAULT_BOOK.clone()
}

#[derive(Debug, Default)]
pub struct ChapterStore {
    chapters: Vec<Chapter>,
}

impl ChapterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_chapters(chapters: Vec<Chapter>) -> Self {
        Self { chapters }
    }

    pub fn append(&mut self, chapter: Chapter) {
        self.chapters.push(chapter);
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Chapter> {
        self.chapters.get(index)
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Title,
    Tagline,
    Image,
    Content,
}

impl DraftField {
    pub const ALL: [DraftField; 4] = [
        DraftField::Title,
        DraftField::Tagline,
        DraftField::Image,
        DraftField::Content,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DraftField::Title => "Title",
            DraftField::Tagline => "Tagline",
            DraftField::Image => "Image URL",
            DraftField::Content => "Content",
        }
    }

    pub fn next(self) -> Self {
        match self {
            DraftField::Title => DraftField::Tagline,
            DraftField::Tagline => DraftField::Image,
            DraftField::Image => DraftField::Content,
            DraftField::Content => DraftField::Title,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            DraftField::Title => DraftField::Content,
            DraftField::Tagline => DraftField::Title,
            DraftField::Image => DraftField::Tagline,
            DraftField::Content => DraftField::Image,
        }
    }
}

/// The chapter being composed in the add-chapter form. Reset only after a
/// successful append.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftBuffer {
    title: String,
    tagline: String,
    image: String,
    content: String,
}

impl DraftBuffer {
    pub fn field(&self, field: DraftField) -> &str {
        match field {
            DraftField::Title => &self.title,
            DraftField::Tagline => &self.tagline,
            DraftField::Image => &self.image,
            DraftField::Content => &self.content,
        }
    }

    fn field_mut(&mut self, field: DraftField) -> &mut String {
        match field {
            DraftField::Title => &mut self.title,
            DraftField::Tagline => &mut self.tagline,
            DraftField::Image => &mut self.image,
            DraftField::Content => &mut self.content,
        }
    }

    pub fn set(&mut self, field: DraftField, value: impl Into<String>) {
        *self.field_mut(field) = value.into();
    }

    pub fn push_char(&mut self, field: DraftField, ch: char) {
        self.field_mut(field).push(ch);
    }

    pub fn pop_char(&mut self, field: DraftField) {
        self.field_mut(field).pop();
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// A chapter ready to append, or `None` while the title is blank.
    pub fn snapshot(&self) -> Option<Chapter> {
        let title = self.title.trim();
        if title.is_empty() {
            return None;
        }
        Some(Chapter {
            title: title.to_string(),
            tagline: non_empty(&self.tagline),
            image: non_empty(&self.image),
            content: self.content.clone(),
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// A position in the composed book. Physical index is the position in the
/// sequence returned by [`compose_pages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Cover,
    TableOfContents,
    Chapter(usize),
    BackCover,
}

pub fn compose_pages(chapters: &[Chapter]) -> Vec<Page> {
    let mut pages = Vec::with_capacity(chapters.len() + FRONT_MATTER_PAGES + 1);
    pages.push(Page::Cover);
    pages.push(Page::TableOfContents);
    pages.extend((0..chapters.len()).map(Page::Chapter));
    pages.push(Page::BackCover);
    pages
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub chapter: usize,
    pub title: String,
    pub page: usize,
}

/// Owned projection of a page, the form the flip engine consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageVisual {
    Cover {
        title: String,
        author: Option<String>,
    },
    TableOfContents {
        entries: Vec<TocEntry>,
    },
    Chapter {
        number: usize,
        title: String,
        tagline: Option<String>,
        image: Option<String>,
        paragraphs: Vec<String>,
    },
    BackCover {
        title: String,
    },
}

/// Embedded line breaks in chapter content separate paragraphs; blank lines
/// carry no extra meaning.
pub fn split_paragraphs(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn compose_visuals(info: &BookInfo, chapters: &[Chapter]) -> Vec<PageVisual> {
    compose_pages(chapters)
        .into_iter()
        .map(|page| match page {
            Page::Cover => PageVisual::Cover {
                title: info.title.clone(),
                author: info.author.clone(),
            },
            Page::TableOfContents => PageVisual::TableOfContents {
                entries: chapters
                    .iter()
                    .enumerate()
                    .map(|(index, chapter)| TocEntry {
                        chapter: index,
                        title: chapter.title.clone(),
                        page: chapter_to_page(index),
                    })
                    .collect(),
            },
            Page::Chapter(index) => {
                let chapter = &chapters[index];
                PageVisual::Chapter {
                    number: index + 1,
                    title: chapter.title.clone(),
                    tagline: chapter.tagline.clone(),
                    image: chapter.image.clone(),
                    paragraphs: split_paragraphs(&chapter.content),
                }
            }
            Page::BackCover => PageVisual::BackCover {
                title: info.title.clone(),
            },
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageTransition {
    pub from: usize,
    pub to: usize,
    pub progress: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlipFrame {
    pub current: usize,
    pub transition: Option<PageTransition>,
}

/// The page-flip rendering engine. The session treats it as an opaque
/// collaborator: every call is a best-effort request with no acknowledgment.
pub trait FlipEngine: Send {
    /// Replaces the engine's page layout with a freshly composed one.
    fn present(&mut self, visuals: Vec<PageVisual>);
    fn flip(&mut self, page: usize);
    fn flip_next(&mut self);
    fn flip_prev(&mut self);
    /// Advances any in-flight flip by one step.
    fn tick(&mut self) -> FlipFrame;
    fn frame(&self) -> FlipFrame;
    fn is_animating(&self) -> bool;
    fn visual(&self, page: usize) -> Option<&PageVisual>;
    fn page_count(&self) -> usize;
}

/// Issues flip requests against a possibly-unmounted engine and sequences
/// append-then-navigate: a focus armed with [`Navigator::focus_after_commit`]
/// is only delivered once the engine has observed the new page layout, so a
/// flip is never requested for a page the engine has not seen.
#[derive(Default)]
pub struct Navigator {
    engine: Option<Box<dyn FlipEngine>>,
    page_count: usize,
    pending_focus: Option<usize>,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_mounted(&self) -> bool {
        self.engine.is_some()
    }

    pub fn mount(&mut self, engine: Box<dyn FlipEngine>) {
        self.engine = Some(engine);
    }

    /// Hands the composed visuals to the engine and flushes any pending
    /// focus. While unmounted the focus stays armed for the first commit
    /// after mounting.
    pub fn commit(&mut self, visuals: Vec<PageVisual>) {
        self.page_count = visuals.len();
        if let Some(engine) = self.engine.as_mut() {
            engine.present(visuals);
            if let Some(page) = self.pending_focus.take() {
                engine.flip(page.min(self.page_count.saturating_sub(1)));
            }
        }
    }

    pub fn focus_after_commit(&mut self, page: usize) {
        self.pending_focus = Some(page);
    }

    pub fn go_to(&mut self, page: usize) {
        let target = page.min(self.page_count.saturating_sub(1));
        if let Some(engine) = self.engine.as_mut() {
            engine.flip(target);
        }
    }

    pub fn next(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.flip_next();
        }
    }

    pub fn previous(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.flip_prev();
        }
    }

    pub fn current_page(&self) -> usize {
        self.engine
            .as_ref()
            .map(|engine| engine.frame().current)
            .unwrap_or(0)
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn tick(&mut self) -> FlipFrame {
        self.engine
            .as_mut()
            .map(|engine| engine.tick())
            .unwrap_or_default()
    }

    pub fn frame(&self) -> FlipFrame {
        self.engine
            .as_ref()
            .map(|engine| engine.frame())
            .unwrap_or_default()
    }

    pub fn is_animating(&self) -> bool {
        self.engine
            .as_ref()
            .map(|engine| engine.is_animating())
            .unwrap_or(false)
    }

    pub fn visual(&self, page: usize) -> Option<&PageVisual> {
        self.engine.as_ref().and_then(|engine| engine.visual(page))
    }
}

#[derive(Debug, Clone)]
pub enum Command {
    NextPage { count: usize },
    PrevPage { count: usize },
    GotoPage { page: usize },
    GotoChapter { index: usize },
    SubmitDraft,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookEvent {
    BookOpened,
    PagesRecomposed { page_count: usize },
    ChapterAppended { index: usize },
    RedrawNeeded,
}

#[async_trait::async_trait]
pub trait BookProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Manifest>;
}

pub struct FileBookProvider;

#[async_trait::async_trait]
impl BookProvider for FileBookProvider {
    async fn open(&self, path: &Path) -> Result<Manifest> {
        let manifest =
            Manifest::load(path).with_context(|| format!("failed to open book {:?}", path))?;
        Ok(manifest)
    }
}

pub struct Session {
    info: BookInfo,
    store: ChapterStore,
    draft: DraftBuffer,
    pages: Vec<Page>,
    navigator: Navigator,
    events: Arc<Mutex<Vec<BookEvent>>>,
}

impl Session {
    pub fn new(manifest: Manifest) -> Self {
        let (info, chapters) = manifest.into_parts();
        let store = ChapterStore::from_chapters(chapters);
        let pages = compose_pages(store.chapters());
        let mut session = Self {
            info,
            store,
            draft: DraftBuffer::default(),
            pages,
            navigator: Navigator::new(),
            events: Arc::new(Mutex::new(Vec::new())),
        };
        session
            .navigator
            .commit(compose_visuals(&session.info, session.store.chapters()));
        session
    }

    pub fn with_default_book() -> Self {
        Self::new(default_manifest())
    }

    pub fn events(&self) -> Arc<Mutex<Vec<BookEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn info(&self) -> &BookInfo {
        &self.info
    }

    pub fn chapters(&self) -> &[Chapter] {
        self.store.chapters()
    }

    pub fn chapter_count(&self) -> usize {
        self.store.len()
    }

    pub fn draft(&self) -> &DraftBuffer {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut DraftBuffer {
        &mut self.draft
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn current_page(&self) -> usize {
        self.navigator.current_page()
    }

    pub fn tick(&mut self) -> FlipFrame {
        self.navigator.tick()
    }

    pub fn frame(&self) -> FlipFrame {
        self.navigator.frame()
    }

    pub fn is_animating(&self) -> bool {
        self.navigator.is_animating()
    }

    pub fn visual(&self, page: usize) -> Option<&PageVisual> {
        self.navigator.visual(page)
    }

    pub fn mount_engine(&mut self, engine: Box<dyn FlipEngine>) {
        self.navigator.mount(engine);
        self.navigator
            .commit(compose_visuals(&self.info, self.store.chapters()));
        self.events.lock().push(BookEvent::RedrawNeeded);
    }

    #[instrument(skip(self, provider))]
    pub async fn open_with<P: BookProvider>(
        &mut self,
        provider: &P,
        path: PathBuf,
    ) -> Result<()> {
        let manifest = provider.open(&path).await?;
        let (info, chapters) = manifest.into_parts();
        self.info = info;
        self.store = ChapterStore::from_chapters(chapters);
        self.draft.clear();
        self.recompose();
        self.navigator.go_to(0);
        self.events.lock().push(BookEvent::BookOpened);
        Ok(())
    }

    pub fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::NextPage { count } => {
                if count <= 1 {
                    self.navigator.next();
                } else {
                    let target = self.navigator.current_page().saturating_add(count);
                    self.navigator.go_to(target);
                }
                self.events.lock().push(BookEvent::RedrawNeeded);
            }
            Command::PrevPage { count } => {
                if count <= 1 {
                    self.navigator.previous();
                } else {
                    let target = self.navigator.current_page().saturating_sub(count);
                    self.navigator.go_to(target);
                }
                self.events.lock().push(BookEvent::RedrawNeeded);
            }
            Command::GotoPage { page } => {
                self.navigator.go_to(page);
                self.events.lock().push(BookEvent::RedrawNeeded);
            }
            Command::GotoChapter { index } => {
                if self.store.is_empty() {
                    return Ok(());
                }
                let index = index.min(self.store.len() - 1);
                self.navigator.go_to(chapter_to_page(index));
                self.events.lock().push(BookEvent::RedrawNeeded);
            }
            Command::SubmitDraft => {
                self.append_draft();
            }
        }
        Ok(())
    }

    /// Appends the drafted chapter and focuses its page. A blank title is a
    /// silent no-op that leaves the draft untouched.
    #[instrument(skip(self))]
    fn append_draft(&mut self) {
        let Some(chapter) = self.draft.snapshot() else {
            return;
        };
        let index = self.store.len();
        self.store.append(chapter);
        self.draft.clear();
        self.navigator.focus_after_commit(chapter_to_page(index));
        self.recompose();
        let mut events = self.events.lock();
        events.push(BookEvent::ChapterAppended { index });
        events.push(BookEvent::RedrawNeeded);
    }

    fn recompose(&mut self) {
        self.pages = compose_pages(self.store.chapters());
        self.navigator
            .commit(compose_visuals(&self.info, self.store.chapters()));
        self.events.lock().push(BookEvent::PagesRecomposed {
            page_count: self.pages.len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeEngineState {
        flips: Vec<usize>,
        presented: Vec<usize>,
    }

    struct FakeEngine {
        state: Arc<Mutex<FakeEngineState>>,
        visuals: Vec<PageVisual>,
        current: usize,
    }

    impl FakeEngine {
        fn new(state: Arc<Mutex<FakeEngineState>>) -> Self {
            Self {
                state,
                visuals: Vec::new(),
                current: 0,
            }
        }
    }

    impl FlipEngine for FakeEngine {
        fn present(&mut self, visuals: Vec<PageVisual>) {
            self.state.lock().presented.push(visuals.len());
            self.visuals = visuals;
        }

        fn flip(&mut self, page: usize) {
            self.state.lock().flips.push(page);
            self.current = page;
        }

        fn flip_next(&mut self) {
            self.flip(self.current + 1);
        }

        fn flip_prev(&mut self) {
            self.flip(self.current.saturating_sub(1));
        }

        fn tick(&mut self) -> FlipFrame {
            self.frame()
        }

        fn frame(&self) -> FlipFrame {
            FlipFrame {
                current: self.current,
                transition: None,
            }
        }

        fn is_animating(&self) -> bool {
            false
        }

        fn visual(&self, page: usize) -> Option<&PageVisual> {
            self.visuals.get(page)
        }

        fn page_count(&self) -> usize {
            self.visuals.len()
        }
    }

    fn mounted_session() -> (Session, Arc<Mutex<FakeEngineState>>) {
        let state = Arc::new(Mutex::new(FakeEngineState::default()));
        let mut session = Session::with_default_book();
        session.mount_engine(Box::new(FakeEngine::new(Arc::clone(&state))));
        (session, state)
    }

    fn chapter(title: &str) -> Chapter {
        Chapter {
            title: title.to_string(),
            tagline: None,
            image: None,
            content: String::new(),
        }
    }

    #[test]
    fn compose_wraps_chapters_in_cover_toc_and_back_cover() {
        let empty = compose_pages(&[]);
        assert_eq!(empty, vec![Page::Cover, Page::TableOfContents, Page::BackCover]);

        let chapters = vec![chapter("A"), chapter("B"), chapter("C"), chapter("D")];
        let pages = compose_pages(&chapters);
        assert_eq!(pages.len(), chapters.len() + 3);
        assert_eq!(pages[0], Page::Cover);
        assert_eq!(pages[1], Page::TableOfContents);
        assert_eq!(*pages.last().unwrap(), Page::BackCover);
        for index in 0..chapters.len() {
            assert_eq!(pages[chapter_to_page(index)], Page::Chapter(index));
        }
    }

    #[test]
    fn chapter_to_page_offsets_front_matter() {
        assert_eq!(chapter_to_page(0), 2);
        assert_eq!(chapter_to_page(10), 12);
    }

    #[test]
    fn shipped_memoir_has_eleven_chapters() {
        let session = Session::with_default_book();
        assert_eq!(session.chapter_count(), 11);
        assert_eq!(session.page_count(), 14);
    }

    #[test]
    fn goto_chapter_flips_to_physical_page() {
        let (mut session, state) = mounted_session();

        session.apply(Command::GotoChapter { index: 0 }).unwrap();
        session.apply(Command::GotoChapter { index: 10 }).unwrap();

        assert_eq!(state.lock().flips, vec![2, 12]);
    }

    #[test]
    fn goto_chapter_clamps_out_of_range_index() {
        let (mut session, state) = mounted_session();

        session.apply(Command::GotoChapter { index: 99 }).unwrap();

        assert_eq!(state.lock().flips, vec![12]);
    }

    #[test]
    fn submitting_draft_appends_and_clears() {
        let (mut session, state) = mounted_session();
        session.draft_mut().set(DraftField::Title, "Reunion");

        session.apply(Command::SubmitDraft).unwrap();

        assert_eq!(session.chapter_count(), 12);
        let appended = session.chapters().last().unwrap();
        assert_eq!(appended.title, "Reunion");
        assert_eq!(appended.tagline, None);
        assert_eq!(appended.image, None);
        assert_eq!(appended.content, "");
        assert!(session.draft().is_empty());
        // The flip lands on the new chapter and only after the recomposed
        // layout reached the engine.
        let state = state.lock();
        assert_eq!(state.flips.last(), Some(&chapter_to_page(11)));
        assert_eq!(state.presented.last(), Some(&15));
    }

    #[test]
    fn blank_title_submission_is_a_silent_no_op() {
        let (mut session, state) = mounted_session();
        session.draft_mut().set(DraftField::Title, "   ");
        session.draft_mut().set(DraftField::Content, "kept");

        session.apply(Command::SubmitDraft).unwrap();

        assert_eq!(session.chapter_count(), 11);
        assert_eq!(session.draft().field(DraftField::Title), "   ");
        assert_eq!(session.draft().field(DraftField::Content), "kept");
        assert!(state.lock().flips.is_empty());
    }

    #[test]
    fn sequential_appends_preserve_insertion_order() {
        let (mut session, _state) = mounted_session();

        session.draft_mut().set(DraftField::Title, "A");
        session.apply(Command::SubmitDraft).unwrap();
        session.draft_mut().set(DraftField::Title, "B");
        session.apply(Command::SubmitDraft).unwrap();

        let titles: Vec<&str> = session
            .chapters()
            .iter()
            .skip(11)
            .map(|chapter| chapter.title.as_str())
            .collect();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[test]
    fn navigation_without_engine_is_tolerated() {
        let mut session = Session::with_default_book();

        session.apply(Command::NextPage { count: 3 }).unwrap();
        session.apply(Command::GotoChapter { index: 4 }).unwrap();
        session.apply(Command::PrevPage { count: 1 }).unwrap();

        assert_eq!(session.current_page(), 0);
    }

    #[test]
    fn focus_armed_while_unmounted_flushes_on_first_commit() {
        let mut session = Session::with_default_book();
        session.draft_mut().set(DraftField::Title, "Late Arrival");
        session.apply(Command::SubmitDraft).unwrap();

        let state = Arc::new(Mutex::new(FakeEngineState::default()));
        session.mount_engine(Box::new(FakeEngine::new(Arc::clone(&state))));

        let state = state.lock();
        assert_eq!(state.presented, vec![15]);
        assert_eq!(state.flips, vec![chapter_to_page(11)]);
    }

    #[test]
    fn goto_page_clamps_to_back_cover() {
        let (mut session, state) = mounted_session();

        session.apply(Command::GotoPage { page: usize::MAX }).unwrap();

        assert_eq!(state.lock().flips, vec![13]);
    }

    #[test]
    fn multi_page_steps_jump_from_current_position() {
        let (mut session, state) = mounted_session();

        session.apply(Command::NextPage { count: 5 }).unwrap();
        session.apply(Command::PrevPage { count: 2 }).unwrap();

        assert_eq!(state.lock().flips, vec![5, 3]);
    }

    #[test]
    fn snapshot_trims_and_drops_empty_optional_fields() {
        let mut draft = DraftBuffer::default();
        draft.set(DraftField::Title, "  Reunion  ");
        draft.set(DraftField::Tagline, "   ");
        draft.set(DraftField::Image, " https://example.net/a.jpg ");
        draft.set(DraftField::Content, "first\nsecond");

        let chapter = draft.snapshot().unwrap();
        assert_eq!(chapter.title, "Reunion");
        assert_eq!(chapter.tagline, None);
        assert_eq!(chapter.image.as_deref(), Some("https://example.net/a.jpg"));
        assert_eq!(chapter.content, "first\nsecond");
    }

    #[test]
    fn draft_edits_are_per_field() {
        let mut draft = DraftBuffer::default();
        draft.push_char(DraftField::Title, 'H');
        draft.push_char(DraftField::Title, 'i');
        draft.push_char(DraftField::Content, 'x');
        draft.pop_char(DraftField::Content);

        assert_eq!(draft.field(DraftField::Title), "Hi");
        assert_eq!(draft.field(DraftField::Content), "");
        draft.clear();
        assert!(draft.is_empty());
    }

    #[test]
    fn split_paragraphs_drops_blank_lines() {
        let paragraphs = split_paragraphs("one\n\n  \ntwo  \nthree");
        assert_eq!(paragraphs, vec!["one", "two", "three"]);
    }

    #[test]
    fn compose_visuals_mirrors_page_order() {
        let info = BookInfo {
            title: "Memoir".to_string(),
            author: Some("A. Writer".to_string()),
        };
        let chapters = vec![chapter("First"), chapter("Second")];

        let visuals = compose_visuals(&info, &chapters);
        assert_eq!(visuals.len(), 5);
        assert!(matches!(visuals[0], PageVisual::Cover { .. }));
        match &visuals[1] {
            PageVisual::TableOfContents { entries } => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].page, 2);
                assert_eq!(entries[1].title, "Second");
            }
            other => panic!("unexpected visual: {:?}", other),
        }
        match &visuals[2] {
            PageVisual::Chapter { number, title, .. } => {
                assert_eq!(*number, 1);
                assert_eq!(title, "First");
            }
            other => panic!("unexpected visual: {:?}", other),
        }
        assert!(matches!(visuals[4], PageVisual::BackCover { .. }));
    }

    #[test]
    fn manifest_rejects_books_without_chapters() {
        let err = Manifest::parse("title = \"Empty\"\n").unwrap_err();
        assert!(matches!(err, ManifestError::Empty));
    }

    #[tokio::test]
    async fn file_provider_replaces_session_book() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memoir.toml");
        std::fs::write(
            &path,
            "title = \"Short Book\"\nauthor = \"Me\"\n\n[[chapters]]\ntitle = \"Only\"\ncontent = \"hello\"\n",
        )
        .unwrap();

        let (mut session, _state) = mounted_session();
        session.open_with(&FileBookProvider, path).await.unwrap();

        assert_eq!(session.info().title, "Short Book");
        assert_eq!(session.chapter_count(), 1);
        assert_eq!(session.page_count(), 4);
    }

    #[tokio::test]
    async fn file_provider_reports_missing_file() {
        let dir = tempdir().unwrap();
        let mut session = Session::with_default_book();
        let result = session
            .open_with(&FileBookProvider, dir.path().join("absent.toml"))
            .await;
        assert!(result.is_err());
        assert_eq!(session.chapter_count(), 11);
    }
}
