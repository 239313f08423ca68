//! HTML extraction for Foroactivo section listings and thread pages.
//!
//! Two layouts are understood for section listings: the `unr-*` custom theme
//! and the stock phpBB `dl` rows. Thread pages are read by locating post
//! containers through their `p<N>` element ids.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, trace};
use url::Url;

use super::FetchError;
use crate::constants::{truncate_chars, POST_PREVIEW_CHARS};
use crate::snapshot::{PostSummary, ThreadSummary};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("Invalid selector")
}

fn selectors(css: &[&str]) -> Vec<Selector> {
    css.iter().map(|s| selector(s)).collect()
}

static CUSTOM_ROW: LazyLock<Selector> = LazyLock::new(|| selector("div.unr-wtp"));
static CUSTOM_TOPIC: LazyLock<Selector> = LazyLock::new(|| selector("div.unr-listopic-topic"));
static CUSTOM_INFO: LazyLock<Selector> = LazyLock::new(|| selector("div.unr-listopic-info"));
static PHPBB_ROW: LazyLock<Selector> = LazyLock::new(|| selector("dl"));
static PHPBB_TITLE: LazyLock<Selector> = LazyLock::new(|| selector("a.topictitle"));
static PHPBB_AUTHOR_CELL: LazyLock<Selector> = LazyLock::new(|| selector("dt"));
static STRONG: LazyLock<Selector> = LazyLock::new(|| selector("strong"));
static LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static PROFILE_LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[href*=\"/u\"]"));
static DATETIME: LazyLock<Selector> = LazyLock::new(|| selector("time[datetime]"));
static WITH_ID: LazyLock<Selector> = LazyLock::new(|| selector("[id]"));

static AUTHOR: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        ".postprofile-name",
        "[class*=\"author\"]",
        "[class*=\"username\"]",
        "[class*=\"postername\"]",
    ])
});
static BODY: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        ".content",
        "[class*=\"postbody\"]",
        "[class*=\"message-text\"]",
        "[class*=\"content\"]",
    ])
});
static TIMESTAMP: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        "time",
        "[class*=\"postdate\"]",
        "[class*=\"date\"]",
        "[class*=\"time\"]",
    ])
});

static THREAD_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/t(\d+)(?:p\d+)?-").expect("Invalid regex"));
static POST_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^p\d+$").expect("Invalid regex"));
static BYLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:by|par|por)\s+(.+?)(?:\s+»|\s*$)").expect("Invalid regex")
});

/// Prefixes the forum puts in front of pinned topic titles.
const PIN_MARKERS: &[&str] = &["Nota", "Anuncio", "Importante", "Sticky", "Announcement"];

const UNKNOWN_AUTHOR: &str = "Unknown";

/// Extract the thread rows of a section listing, in page order.
///
/// Pinned rows are kept and flagged; rows without a recognisable thread id
/// are dropped.
///
/// # Errors
///
/// Returns an error if `page_url` is not an absolute URL.
pub fn parse_section_threads(html: &str, page_url: &str) -> Result<Vec<ThreadSummary>, FetchError> {
    let base = parse_base(page_url)?;
    let document = Html::parse_document(html);

    let custom_rows: Vec<ElementRef> = document.select(&CUSTOM_ROW).collect();
    let threads: Vec<ThreadSummary> = if custom_rows.is_empty() {
        document
            .select(&PHPBB_ROW)
            .filter(|row| has_class_containing(*row, "topic"))
            .filter_map(|row| parse_phpbb_row(row, &base))
            .collect()
    } else {
        custom_rows
            .into_iter()
            .filter_map(|row| parse_custom_row(row, &base))
            .collect()
    };

    debug!(
        url = %page_url,
        threads = threads.len(),
        pinned = threads.iter().filter(|t| t.is_pinned).count(),
        "Parsed section listing"
    );
    Ok(threads)
}

fn parse_custom_row(row: ElementRef, base: &Url) -> Option<ThreadSummary> {
    let topic = row.select(&CUSTOM_TOPIC).next()?;
    let is_pinned = topic
        .select(&STRONG)
        .any(|strong| is_pin_marker(&text_of(strong)));

    let link = topic.select(&LINK).next()?;
    let (thread_id, url) = thread_link(link, base)?;

    let author_name = row
        .select(&CUSTOM_INFO)
        .next()
        .and_then(|info| info.select(&LINK).next())
        .map(text_of)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    Some(ThreadSummary {
        thread_id,
        title: text_of(link),
        author_name,
        url,
        is_pinned,
        created_at: created_at_of(row),
    })
}

fn parse_phpbb_row(row: ElementRef, base: &Url) -> Option<ThreadSummary> {
    let link = row.select(&PHPBB_TITLE).next()?;
    let (thread_id, url) = thread_link(link, base)?;

    let is_pinned = has_class_containing(row, "sticky") || has_class_containing(row, "announce");

    let author_name = row
        .select(&PHPBB_AUTHOR_CELL)
        .next()
        .and_then(|cell| {
            cell.select(&PROFILE_LINK)
                .next()
                .map(text_of)
                .filter(|name| !name.is_empty())
                .or_else(|| {
                    BYLINE
                        .captures(&text_of(cell))
                        .map(|caps| caps[1].trim().to_string())
                })
        })
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    Some(ThreadSummary {
        thread_id,
        title: text_of(link),
        author_name,
        url,
        is_pinned,
        created_at: created_at_of(row),
    })
}

fn thread_link(link: ElementRef, base: &Url) -> Option<(String, String)> {
    let href = link.value().attr("href")?;
    let url = base.join(href).ok()?.to_string();
    let Some(thread_id) = thread_id_from_url(&url) else {
        trace!(href = %href, "Skipping row without thread id");
        return None;
    };
    Some((thread_id, url))
}

/// Extract the `t<N>` thread id from a Foroactivo thread URL.
#[must_use]
pub fn thread_id_from_url(url: &str) -> Option<String> {
    THREAD_ID
        .captures(url)
        .map(|caps| format!("t{}", &caps[1]))
}

fn is_pin_marker(text: &str) -> bool {
    PIN_MARKERS.iter().any(|marker| text.contains(marker))
}

fn created_at_of(row: ElementRef) -> Option<DateTime<Utc>> {
    row.select(&DATETIME)
        .filter_map(|time| time.value().attr("datetime"))
        .find_map(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Extract the posts of a thread page, in page order.
///
/// # Errors
///
/// Returns an error if `thread_url` is not an absolute URL.
pub fn parse_thread_posts(html: &str, thread_url: &str) -> Result<Vec<PostSummary>, FetchError> {
    let mut base = parse_base(thread_url)?;
    base.set_fragment(None);

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut posts = Vec::new();

    for marker in document.select(&WITH_ID) {
        let Some(post_id) = marker.value().id() else {
            continue;
        };
        if !POST_ID.is_match(post_id) || !seen.insert(post_id.to_string()) {
            continue;
        }

        // Some templates only tag an empty anchor; the post is its enclosing block.
        let container = if marker.value().name() == "a" {
            enclosing_post(marker).unwrap_or(marker)
        } else {
            marker
        };

        posts.push(parse_post(container, post_id, &base));
    }

    debug!(url = %thread_url, posts = posts.len(), "Parsed thread page");
    Ok(posts)
}

fn parse_post(container: ElementRef, post_id: &str, base: &Url) -> PostSummary {
    let author_name = AUTHOR
        .iter()
        .find_map(|sel| container.select(sel).next())
        .map(|el| {
            el.select(&PROFILE_LINK)
                .next()
                .map(text_of)
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| text_of(el))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    let body_preview = BODY
        .iter()
        .find_map(|sel| container.select(sel).next())
        .map(|el| truncate_chars(&text_of(el), POST_PREVIEW_CHARS))
        .unwrap_or_default();

    let posted_at = TIMESTAMP
        .iter()
        .find_map(|sel| container.select(sel).next())
        .map(text_of)
        .filter(|label| !label.is_empty());

    PostSummary {
        post_id: post_id.to_string(),
        author_name,
        body_preview,
        url: format!("{base}#{post_id}"),
        posted_at,
    }
}

fn enclosing_post(element: ElementRef) -> Option<ElementRef> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| has_class_containing(*ancestor, "post"))
}

fn has_class_containing(element: ElementRef, needle: &str) -> bool {
    element.value().classes().any(|class| class.contains(needle))
}

/// Element text with whitespace runs collapsed.
fn text_of(element: ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_base(url: &str) -> Result<Url, FetchError> {
    Url::parse(url).map_err(|e| FetchError::Parse(format!("invalid URL {url}: {e}")))
}
