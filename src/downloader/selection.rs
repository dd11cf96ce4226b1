// Selection state machine - menu tokens in, views and targets out
//
// Tokens are decoded once into a `MenuAction`; `apply` then moves a session
// through BROWSING → CATEGORY_FILTERED → DETAIL, or through the two combine
// picks, until a target is resolved. Every transition hands back a
// structured `MenuView`; wording is the front end's job.

use serde::Serialize;
use std::str::FromStr;

use super::errors::SelectionError;
use super::format_selector::{CodecFamily, FormatSelector};
use super::models::{AcquisitionTarget, Catalog, Category, FormatKind, FormatRecord};
use super::session::{NavigationState, Session};

/// A decoded menu token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    /// `category:<name>`
    Category(Category),
    /// `pick:<format id>`
    Pick(String),
    /// `acquire:video`
    AcquireVideo,
    /// `acquire:audio`
    AcquireAudio,
    /// `page:<n>`, zero-based
    Page(usize),
    Back,
    Cancel,
}

fn invalid(reason: impl Into<String>) -> SelectionError {
    SelectionError::InvalidAction {
        reason: reason.into(),
    }
}

impl FromStr for MenuAction {
    type Err = SelectionError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        match token {
            "back" => return Ok(Self::Back),
            "cancel" => return Ok(Self::Cancel),
            "acquire:video" => return Ok(Self::AcquireVideo),
            "acquire:audio" => return Ok(Self::AcquireAudio),
            _ => {}
        }

        let (verb, arg) = token
            .split_once(':')
            .ok_or_else(|| invalid(format!("unknown token '{}'", token)))?;
        match verb {
            "category" => Category::parse(arg)
                .map(Self::Category)
                .ok_or_else(|| invalid(format!("unknown category '{}'", arg))),
            "pick" if !arg.trim().is_empty() => Ok(Self::Pick(arg.trim().to_string())),
            "page" => arg
                .parse()
                .map(Self::Page)
                .map_err(|_| invalid(format!("bad page '{}'", arg))),
            _ => Err(invalid(format!("unknown token '{}'", token))),
        }
    }
}

/// One category button with its record count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: Category,
    pub count: usize,
    /// `category:<name>`
    pub token: String,
}

/// What a listing is offering
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ListingStage {
    Category { category: Category },
    CombineVideo,
    CombineAudio { video_id: String },
}

/// Actions available on a detail view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailAction {
    AcquireVideo,
    AcquireAudio,
}

impl DetailAction {
    pub fn token(&self) -> &'static str {
        match self {
            Self::AcquireVideo => "acquire:video",
            Self::AcquireAudio => "acquire:audio",
        }
    }
}

/// Structured result of a menu transition
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum MenuView {
    Categories {
        title: String,
        duration_seconds: Option<f64>,
        counts: Vec<CategoryCount>,
    },
    Listing {
        #[serde(flatten)]
        stage: ListingStage,
        page: usize,
        total_pages: usize,
        total: usize,
        entries: Vec<FormatRecord>,
    },
    Detail {
        record: FormatRecord,
        codec_family: Option<CodecFamily>,
        actions: Vec<DetailAction>,
    },
    /// Acquisition will start with `target`
    Resolved {
        target: AcquisitionTarget,
        record: FormatRecord,
    },
}

/// Category menu for a fresh (or reset) session
pub fn categories_view(catalog: &Catalog) -> MenuView {
    let counts = Category::ALL
        .into_iter()
        .map(|category| CategoryCount {
            category,
            count: candidates(catalog, category).len(),
            token: format!("category:{}", category),
        })
        .collect();

    MenuView::Categories {
        title: catalog.title.clone(),
        duration_seconds: catalog.duration_seconds,
        counts,
    }
}

/// Records selectable under `category`. Combine offers nothing when there is
/// no audio to pair with.
fn candidates(catalog: &Catalog, category: Category) -> Vec<&FormatRecord> {
    if category == Category::Combine && catalog.count(FormatKind::AudioOnly) == 0 {
        return Vec::new();
    }
    catalog.filter(category)
}

fn total_pages(len: usize, page_size: usize) -> usize {
    let page_size = page_size.max(1);
    len.div_ceil(page_size).max(1)
}

fn listing(records: &[&FormatRecord], stage: ListingStage, page: usize, page_size: usize) -> MenuView {
    let page_size = page_size.max(1);
    let entries = records
        .iter()
        .skip(page * page_size)
        .take(page_size)
        .map(|r| (*r).clone())
        .collect();

    MenuView::Listing {
        stage,
        page,
        total_pages: total_pages(records.len(), page_size),
        total: records.len(),
        entries,
    }
}

fn find<'a>(records: &[&'a FormatRecord], id: &str) -> Result<&'a FormatRecord, SelectionError> {
    records
        .iter()
        .find(|r| r.id == id)
        .copied()
        .ok_or_else(|| SelectionError::FormatNotFound { id: id.to_string() })
}

fn detail_view(record: &FormatRecord) -> MenuView {
    let mut actions = Vec::new();
    if record.has_video() {
        actions.push(DetailAction::AcquireVideo);
    }
    if record.has_audio() {
        actions.push(DetailAction::AcquireAudio);
    }
    MenuView::Detail {
        record: record.clone(),
        codec_family: FormatSelector::video_family(record),
        actions,
    }
}

/// Menu layout knobs
#[derive(Debug, Clone)]
pub struct MenuSettings {
    pub page_size: usize,
    /// Container of synthesized combine records
    pub merge_container: String,
}

/// Apply one action to `session`. On error the session is left untouched.
///
/// `Cancel` is not handled here; destroying the session is the store's job.
pub fn apply(
    session: &mut Session,
    action: MenuAction,
    settings: &MenuSettings,
) -> Result<MenuView, SelectionError> {
    let page_size = settings.page_size;

    if action == MenuAction::Back {
        if session.state == NavigationState::Resolved {
            return Err(invalid("acquisition in progress"));
        }
        session.reset();
        return Ok(categories_view(&session.catalog));
    }

    match (session.state.clone(), action) {
        (NavigationState::Resolved, _) => Err(invalid("acquisition in progress")),

        (NavigationState::Browsing, MenuAction::Category(category)) => {
            let records = candidates(&session.catalog, category);
            if records.is_empty() {
                return Err(SelectionError::NoCandidatesInCategory { category });
            }
            let (state, stage) = if category == Category::Combine {
                (NavigationState::CombinePickVideo { page: 0 }, ListingStage::CombineVideo)
            } else {
                (
                    NavigationState::CategoryFiltered { category, page: 0 },
                    ListingStage::Category { category },
                )
            };
            let view = listing(&records, stage, 0, page_size);
            session.state = state;
            Ok(view)
        }

        (NavigationState::CategoryFiltered { category, .. }, MenuAction::Page(page)) => {
            let records = candidates(&session.catalog, category);
            check_page(page, records.len(), page_size)?;
            let view = listing(&records, ListingStage::Category { category }, page, page_size);
            session.state = NavigationState::CategoryFiltered { category, page };
            Ok(view)
        }

        (NavigationState::CategoryFiltered { category, .. }, MenuAction::Pick(id)) => {
            let records = candidates(&session.catalog, category);
            let record = find(&records, &id)?;
            let view = detail_view(record);
            session.state = NavigationState::Detail {
                category,
                format_id: id,
            };
            Ok(view)
        }

        (NavigationState::Detail { format_id, .. }, action @ (MenuAction::AcquireVideo | MenuAction::AcquireAudio)) => {
            let record = session
                .catalog
                .get(&format_id)
                .ok_or_else(|| SelectionError::FormatNotFound { id: format_id.clone() })?;
            let target = match action {
                MenuAction::AcquireVideo if record.has_video() => AcquisitionTarget::video(&format_id),
                MenuAction::AcquireAudio if record.has_audio() => AcquisitionTarget::audio_extract(&format_id),
                _ => return Err(invalid("action not offered for this format")),
            };
            let view = MenuView::Resolved {
                target,
                record: record.clone(),
            };
            session.state = NavigationState::Resolved;
            Ok(view)
        }

        (NavigationState::CombinePickVideo { .. }, MenuAction::Page(page)) => {
            let records = candidates(&session.catalog, Category::Combine);
            check_page(page, records.len(), page_size)?;
            let view = listing(&records, ListingStage::CombineVideo, page, page_size);
            session.state = NavigationState::CombinePickVideo { page };
            Ok(view)
        }

        (NavigationState::CombinePickVideo { .. }, MenuAction::Pick(id)) => {
            let videos = candidates(&session.catalog, Category::Combine);
            find(&videos, &id)?;
            let audio = session.catalog.filter(Category::AudioOnly);
            let view = listing(
                &audio,
                ListingStage::CombineAudio { video_id: id.clone() },
                0,
                page_size,
            );
            session.pending_video_pick = Some(id);
            session.state = NavigationState::CombinePickAudio { page: 0 };
            Ok(view)
        }

        (NavigationState::CombinePickAudio { .. }, MenuAction::Page(page)) => {
            let video_id = session
                .pending_video_pick
                .clone()
                .ok_or_else(|| invalid("no video format picked"))?;
            let audio = session.catalog.filter(Category::AudioOnly);
            check_page(page, audio.len(), page_size)?;
            let view = listing(&audio, ListingStage::CombineAudio { video_id }, page, page_size);
            session.state = NavigationState::CombinePickAudio { page };
            Ok(view)
        }

        (NavigationState::CombinePickAudio { .. }, MenuAction::Pick(id)) => {
            let video_id = session
                .pending_video_pick
                .clone()
                .ok_or_else(|| invalid("no video format picked"))?;
            let audio_records = session.catalog.filter(Category::AudioOnly);
            let audio = find(&audio_records, &id)?;
            let video = session
                .catalog
                .get(&video_id)
                .ok_or_else(|| SelectionError::FormatNotFound { id: video_id.clone() })?;

            let record = FormatRecord::combine(video, audio, &settings.merge_container);
            let view = MenuView::Resolved {
                target: AcquisitionTarget::combined(&video_id, &id),
                record,
            };
            session.pending_video_pick = None;
            session.state = NavigationState::Resolved;
            Ok(view)
        }

        (_, MenuAction::Cancel) => Err(invalid("cancel is handled by the engine")),
        (state, action) => Err(invalid(format!("{:?} not accepted in {:?}", action, state))),
    }
}

fn check_page(page: usize, len: usize, page_size: usize) -> Result<(), SelectionError> {
    if page >= total_pages(len, page_size) {
        return Err(invalid(format!("page {} out of range", page)));
    }
    Ok(())
}
