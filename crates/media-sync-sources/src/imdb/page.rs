// HTML extraction for IMDb list, watchlist and profile pages

use scraper::{Html, Selector};

/// Every distinct `ls…` id linked from a page, in page order
pub fn extract_list_ids(html: &str) -> Vec<String> {
    let Ok(links) = Selector::parse("a[href*='/list/ls']") else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    let mut ids: Vec<String> = Vec::new();
    for href in document.select(&links).filter_map(|a| a.value().attr("href")) {
        if let Some(id) = list_id_from_href(href) {
            if !ids.iter().any(|known| known == id) {
                ids.push(id.to_string());
            }
        }
    }
    ids
}

/// Page `<title>` without the "- IMDb" suffix
pub fn extract_title(html: &str) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let document = Html::parse_document(html);
    let text: String = document.select(&selector).next()?.text().collect();

    let text = text.trim();
    let title = text.strip_suffix("- IMDb").unwrap_or(text).trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// List id from `<meta property="pageId" content="ls…">`
pub fn extract_page_id(html: &str) -> Option<String> {
    let selector = Selector::parse(r#"meta[property="pageId"]"#).ok()?;
    let document = Html::parse_document(html);
    let content = document.select(&selector).next()?.value().attr("content")?.trim();
    is_list_id(content).then(|| content.to_string())
}

fn list_id_from_href(href: &str) -> Option<&str> {
    let path = href.split(['?', '#']).next()?;
    let mut segments = path.split('/');
    segments.find(|s| *s == "list")?;
    segments.next().filter(|id| is_list_id(id))
}

fn is_list_id(id: &str) -> bool {
    id.len() > 2 && id.starts_with("ls") && id[2..].bytes().all(|b| b.is_ascii_digit())
}
