//!
//! src/parser.rs  Andrew Belles  Oct 2nd, 2025
//!
//! Turns raw timestamp.trade markup into typed records. Scene pages are
//! loosely structured, every list lives under an <h4> label and the
//! first <ul> that follows it, so sections are read from a table of
//! (label, item mapper) pairs in a single pass over the headers.
//!

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::types::{
    Marker, NamedLink, OtherId, SceneHash, SceneRecord, StashId, StudioId, Tag
};

pub const STUDIO_PREFIX: &str = "/studio/";

static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h3").unwrap());
static HEADER: Lazy<Selector> = Lazy::new(|| Selector::parse("h4").unwrap());
static ITEM: Lazy<Selector> = Lazy::new(|| Selector::parse("li").unwrap());
static MAIN: Lazy<Selector> = Lazy::new(|| Selector::parse("div.main").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

/// Studio identifiers from the /studios listing, in document order
pub fn studio_ids(html: &str) -> Vec<StudioId> {
    let document = Html::parse_document(html);
    document.select(&LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| href.starts_with(STUDIO_PREFIX))
        .map(|href| StudioId(href.rsplit('/').next().unwrap_or(href).to_string()))
        .collect()
}

/// Text nodes trimmed, blanks dropped, joined without a separator
fn stripped_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// (text, href) of the first link in an item, None if there is no link
fn first_link(li: ElementRef<'_>) -> Option<(String, String)> {
    let a = li.select(&ANCHOR).next()?;
    let href = a.value().attr("href").unwrap_or_default().to_string();
    Some((stripped_text(a), href))
}

fn link_or_blank(li: ElementRef<'_>) -> (String, String) {
    first_link(li).unwrap_or_default()
}

// Item mappers. Returning None drops the item from its list

fn marker(li: ElementRef<'_>) -> Option<Marker> {
    let text = stripped_text(li);
    let parts: Vec<&str> = text.split('-').collect();
    let description = parts[0].trim().to_string();
    let time = match parts.len() {
        0 | 1 => String::new(),
        _ => parts[parts.len() - 1].trim().to_string()
    };
    let (tag_name, tag_href) = link_or_blank(li);
    Some( Marker { description, tag_name, tag_href, time } )
}

fn tag(li: ElementRef<'_>) -> Option<Tag> {
    let (tag_name, tag_href) = link_or_blank(li);
    Some( Tag { tag_name, tag_href } )
}

fn stash_id(li: ElementRef<'_>) -> Option<StashId> {
    let (id, url) = link_or_blank(li);
    Some( StashId { id, url } )
}

fn other_id(li: ElementRef<'_>) -> Option<OtherId> {
    let text: String = li.text().collect();
    let (id_type, id_value) = text.split_once(" - ")?;
    Some( OtherId {
        id_type: id_type.trim().to_string(),
        id_value: id_value.trim().to_string()
    })
}

fn url(li: ElementRef<'_>) -> Option<String> {
    let (_, href) = first_link(li)?;
    (!href.is_empty()).then_some(href)
}

fn named_link(li: ElementRef<'_>) -> Option<NamedLink> {
    let (name, href) = link_or_blank(li);
    Some( NamedLink { name, href } )
}

fn movie(li: ElementRef<'_>) -> Option<NamedLink> {
    let (name, href) = first_link(li)?;
    Some( NamedLink { name, href } )
}

fn scene_hash(li: ElementRef<'_>) -> Option<SceneHash> {
    let text = stripped_text(li);
    let parts: Vec<&str> = text.split(" - ").collect();
    match parts.as_slice() {
        [hash, value, kind] => Some( SceneHash {
            hash: hash.to_string(),
            value: value.to_string(),
            kind: kind.to_string()
        }),
        _ => None
    }
}

#[derive(Debug, Clone, Copy)]
enum Header {
    Exact(&'static str),
    Contains(&'static str)
}

impl Header {
    fn matches(self, label: &str) -> bool {
        match self {
            Header::Exact(s) => label.trim() == s,
            Header::Contains(s) => label.contains(s)
        }
    }
}

struct Section {
    header: Header,
    apply: fn(ElementRef<'_>, &mut SceneRecord)
}

static SECTIONS: [Section; 9] = [
    Section {
        header: Header::Exact("markers:"),
        apply: |li, r| r.markers.extend(marker(li))
    },
    Section {
        header: Header::Exact("tags"),
        apply: |li, r| r.tags.extend(tag(li))
    },
    Section {
        header: Header::Exact("stashid:"),
        apply: |li, r| r.stash_ids.extend(stash_id(li))
    },
    Section {
        header: Header::Contains("Other id's"),
        apply: |li, r| r.other_ids.extend(other_id(li))
    },
    Section {
        header: Header::Exact("urls:"),
        apply: |li, r| r.urls.extend(url(li))
    },
    Section {
        header: Header::Exact("performers:"),
        apply: |li, r| r.performers.extend(named_link(li))
    },
    Section {
        header: Header::Exact("hashes:"),
        apply: |li, r| r.hashes.extend(scene_hash(li))
    },
    Section {
        header: Header::Exact("galleries:"),
        apply: |li, r| r.galleries.extend(named_link(li))
    },
    Section {
        header: Header::Exact("movies:"),
        apply: |li, r| r.movies.extend(movie(li))
    },
];

/// First <ul> among the siblings following a header
fn following_list<'a>(header: ElementRef<'a>) -> Option<ElementRef<'a>> {
    header.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "ul")
}

fn description(document: &Html) -> String {
    document.select(&MAIN)
        .next()
        .and_then(|main| main.select(&PARAGRAPH).last())
        .map(stripped_text)
        .unwrap_or_default()
}

pub fn parse_scene(html: &str) -> SceneRecord {
    let document = Html::parse_document(html);
    let mut record = SceneRecord::default();

    if let Some(h3) = document.select(&TITLE).next() {
        record.title = stripped_text(h3);
    }

    // each section takes the first header it matches
    let mut claimed = vec![false; SECTIONS.len()];
    for header in document.select(&HEADER) {
        let label: String = header.text().collect();
        for (i, section) in SECTIONS.iter().enumerate() {
            if claimed[i] || !section.header.matches(&label) {
                continue;
            }
            claimed[i] = true;
            if let Some(list) = following_list(header) {
                for li in list.select(&ITEM) {
                    (section.apply)(li, &mut record);
                }
            }
        }
    }

    record.description = description(&document);
    record
}
