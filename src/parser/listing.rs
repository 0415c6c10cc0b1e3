use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::cli::config::SelectorSettings;
use crate::crawler::task::SessionEntry;
use crate::error::ScrapeError;
use crate::parser::text::{extract_remaining_count, squash_whitespace};

/// One way of finding the event title, tried in order.
#[derive(Debug, Clone)]
enum TitleSource {
    /// `content` attribute of the matched element
    Attribute(Selector, &'static str),
    /// Text of the first matched element
    Text(Selector),
}

/// Parser for rendered OPENTIX event pages.
///
/// Selectors are compiled once and reused for every page in a batch.
#[derive(Debug, Clone)]
pub struct ListingParser {
    listing: Selector,
    rows: Selector,
    date: Selector,
    description: Selector,
    remaining: Selector,
    title_sources: Vec<TitleSource>,
}

/// Everything read from one page
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub entries: Vec<SessionEntry>,
}

fn compile(selector: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(selector)
        .map_err(|e| ScrapeError::Config(format!("invalid selector '{}': {:?}", selector, e)))
}

impl ListingParser {
    pub fn new(selectors: &SelectorSettings) -> Result<Self, ScrapeError> {
        let mut title_sources = vec![TitleSource::Attribute(
            compile(r#"meta[property="og:title"]"#)?,
            "content",
        )];
        for heading in &selectors.title_headings {
            title_sources.push(TitleSource::Text(compile(heading)?));
        }
        title_sources.push(TitleSource::Text(compile("title")?));

        Ok(Self {
            listing: compile(&selectors.listing)?,
            rows: compile(&selectors.row)?,
            date: compile(&selectors.date)?,
            description: compile(&selectors.description)?,
            remaining: compile(&selectors.remaining)?,
            title_sources,
        })
    }

    /// Parse a full page source
    pub fn parse_page(&self, html: &str) -> ParsedPage {
        let document = Html::parse_document(html);
        ParsedPage {
            title: self.extract_title(&document),
            entries: self.parse_rows(&document),
        }
    }

    /// Every session row under the first listing container, in document order.
    ///
    /// No rows is a valid outcome: the page simply has nothing detectable.
    pub fn parse_rows(&self, document: &Html) -> Vec<SessionEntry> {
        let entries: Vec<SessionEntry> = match document.select(&self.listing).next() {
            Some(listing) => listing.select(&self.rows).map(|row| self.parse_row(row)).collect(),
            None => Vec::new(),
        };
        debug!("Parsed {} session rows", entries.len());
        entries
    }

    /// Extract one row. Missing sub-elements leave their field empty.
    pub fn parse_row(&self, row: ElementRef<'_>) -> SessionEntry {
        let date = first_text(row, &self.date);
        let description = first_text(row, &self.description);
        let raw_remaining_text = first_text(row, &self.remaining);

        let label = squash_whitespace(&format!("{} {}", date, description));
        let remaining = extract_remaining_count(&raw_remaining_text);

        SessionEntry {
            label: if label.is_empty() { None } else { Some(label) },
            remaining,
            raw_remaining_text,
            date,
            description,
        }
    }

    /// First non-empty title among og:title, the heading selectors, and `<title>`.
    pub fn extract_title(&self, document: &Html) -> Option<String> {
        self.title_sources.iter().find_map(|source| {
            let text = match source {
                TitleSource::Attribute(selector, attr) => document
                    .select(selector)
                    .find_map(|el| el.value().attr(attr))
                    .map(squash_whitespace),
                TitleSource::Text(selector) => document
                    .select(selector)
                    .map(element_text)
                    .find(|text| !text.is_empty()),
            };
            text.filter(|t| !t.is_empty())
        })
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    squash_whitespace(&element.text().collect::<String>())
}

fn first_text(row: ElementRef<'_>, selector: &Selector) -> String {
    row.select(selector).next().map(element_text).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ListingParser {
        ListingParser::new(&SelectorSettings::default()).unwrap()
    }

    fn row(date: &str, description: Option<&str>, remaining: Option<&str>) -> String {
        let description = description
            .map(|d| format!(r#"<span class="description">{}</span>"#, d))
            .unwrap_or_default();
        let remaining = remaining
            .map(|r| {
                format!(
                    r#"<div class="priceplans_wrapper"><div class="remain_infos"><span>{}</span></div></div>"#,
                    r
                )
            })
            .unwrap_or_default();
        format!(
            r#"<div class="column__body"><div class="date"><span class="mr-2">{}</span>{}</div>{}</div>"#,
            date, description, remaining
        )
    }

    fn page(title: &str, rows: &[String]) -> String {
        format!(
            r#"<html><head><title>{} | OPENTIX</title><meta property="og:title" content="{}"></head>
            <body><div class="events__list__table">{}</div></body></html>"#,
            title,
            title,
            rows.join("\n")
        )
    }

    #[test]
    fn test_parse_rows() {
        let html = page(
            "夏日音樂會",
            &[
                row("2025/8/29 (五) 19:30", Some("彩蛋場"), Some("剩：91")),
                row("2025/8/30 (六) 14:30", None, Some("剩：１，２０４")),
            ],
        );
        let parsed = parser().parse_page(&html);

        assert_eq!(parsed.title.as_deref(), Some("夏日音樂會"));
        assert_eq!(parsed.entries.len(), 2);

        let first = &parsed.entries[0];
        assert_eq!(first.label.as_deref(), Some("2025/8/29 (五) 19:30 彩蛋場"));
        assert_eq!(first.remaining.as_deref(), Some("91"));
        assert_eq!(first.raw_remaining_text, "剩：91");
        assert_eq!(first.date, "2025/8/29 (五) 19:30");
        assert_eq!(first.description, "彩蛋場");

        let second = &parsed.entries[1];
        assert_eq!(second.label.as_deref(), Some("2025/8/30 (六) 14:30"));
        assert_eq!(second.remaining.as_deref(), Some("1,204"));
    }

    #[test]
    fn test_row_without_remaining_is_kept() {
        let html = page("Show", &[row("2025/9/1 19:30", None, None)]);
        let parsed = parser().parse_page(&html);

        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].remaining, None);
        assert_eq!(parsed.entries[0].raw_remaining_text, "");
        assert_eq!(parsed.entries[0].label.as_deref(), Some("2025/9/1 19:30"));
    }

    #[test]
    fn test_unparseable_remaining_keeps_raw_text() {
        let html = page("Show", &[row("", None, Some("已售完"))]);
        let parsed = parser().parse_page(&html);

        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].label, None);
        assert_eq!(parsed.entries[0].remaining, None);
        assert_eq!(parsed.entries[0].raw_remaining_text, "已售完");
    }

    #[test]
    fn test_zero_rows() {
        let parsed = parser().parse_page(&page("Empty", &[]));
        assert!(parsed.entries.is_empty());

        let parsed = parser().parse_page("<html><body><p>loading…</p></body></html>");
        assert!(parsed.entries.is_empty());
        assert_eq!(parsed.title, None);
    }

    #[test]
    fn test_rows_outside_listing_are_ignored() {
        let html = format!(
            r#"<html><body>{}<div class="events__list__table">{}</div></body></html>"#,
            row("stray", None, Some("剩：1")),
            row("2025/9/2", None, Some("剩：2"))
        );
        let parsed = parser().parse_page(&html);
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].remaining.as_deref(), Some("2"));
    }

    #[test]
    fn test_nested_listings_yield_each_row_once() {
        let html = format!(
            r#"<html><body><div class="events__list__table"><div class="events__list__table">{}{}</div></div></body></html>"#,
            row("2025/9/3", None, Some("剩：3")),
            row("2025/9/4", None, Some("剩：4"))
        );
        let parsed = parser().parse_page(&html);

        let remaining: Vec<_> = parsed.entries.iter().map(|e| e.remaining.as_deref()).collect();
        assert_eq!(remaining, vec![Some("3"), Some("4")]);
    }

    #[test]
    fn test_title_fallback_order() {
        let p = parser();

        let html = r#"<html><head><title>Doc Title</title><meta property="og:title" content="  "></head>
            <body><h1> </h1><div class="event-title">Event  Name</div></body></html>"#;
        assert_eq!(p.extract_title(&Html::parse_document(html)).as_deref(), Some("Event Name"));

        let html = r#"<html><head><title>Doc Title</title></head><body></body></html>"#;
        assert_eq!(p.extract_title(&Html::parse_document(html)).as_deref(), Some("Doc Title"));
    }
}
