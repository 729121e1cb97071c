use chrono::{DateTime, NaiveDate, Utc};
use csv::{Reader, StringRecord};
use media_sync_models::{Item, MediaKind};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::SourceError;

/// Column lookup by header name
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord, required: &[&str]) -> Result<Self, SourceError> {
        let index: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_string(), i))
            .collect();

        for col in required {
            if !index.contains_key(*col) {
                let available: Vec<&str> = headers.iter().collect();
                return Err(SourceError::Parse(format!(
                    "Missing required column: {}. Available columns: {:?}",
                    col, available
                )));
            }
        }
        Ok(Self { index })
    }

    fn get<'r>(&self, record: &'r StringRecord, name: &str) -> Option<&'r str> {
        self.index
            .get(name)
            .and_then(|&i| record.get(i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// IMDb `Title Type` (or an `nm…` id) to our kind.
pub fn media_kind(id: &str, title_type: Option<&str>) -> MediaKind {
    if id.starts_with("nm") {
        return MediaKind::Person;
    }
    match title_type {
        Some("TV Series") | Some("TV Mini Series") => MediaKind::Show,
        Some("TV Episode") => MediaKind::Episode,
        _ => MediaKind::Movie,
    }
}

/// `YYYY-MM-DD` at midnight UTC
pub fn parse_date(value: &str) -> Result<DateTime<Utc>, SourceError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| SourceError::Parse(format!("Failed to parse date '{}': {}", value, e)))?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| SourceError::Parse(format!("Failed to create time from date '{}'", value)))
}

/// Parse a list or watchlist export (titles or people)
pub fn parse_list_csv<R: Read>(input: R) -> Result<Vec<Item>, SourceError> {
    let mut reader = Reader::from_reader(input);
    let columns = Columns::from_headers(reader.headers()?, &["Const"])?;
    let mut items = Vec::new();
    let mut row_count = 0;

    for result in reader.records() {
        let record = result?;
        row_count += 1;

        let Some(id) = columns.get(&record, "Const") else {
            debug!(row = row_count, "Skipping row with empty IMDb id");
            continue;
        };

        let created = match columns.get(&record, "Created") {
            Some(value) => parse_date(value)?,
            None => {
                warn!(row = row_count, id = %id, "Row has no 'Created' date, using the epoch");
                DateTime::<Utc>::default()
            }
        };

        let kind = media_kind(id, columns.get(&record, "Title Type"));
        let mut item = Item::new(id, kind, created);
        if let Some(title) = columns
            .get(&record, "Title")
            .or_else(|| columns.get(&record, "Name"))
        {
            item = item.with_title(title);
        }
        items.push(item);
    }

    info!(rows = row_count, items = items.len(), "Parsed IMDb list export");
    Ok(items)
}

/// Parse a ratings export
pub fn parse_ratings_csv<R: Read>(input: R) -> Result<Vec<Item>, SourceError> {
    let mut reader = Reader::from_reader(input);
    let columns = Columns::from_headers(reader.headers()?, &["Const", "Your Rating", "Date Rated"])?;
    let mut ratings = Vec::new();
    let mut row_count = 0;

    for result in reader.records() {
        let record = result?;
        row_count += 1;

        let Some(id) = columns.get(&record, "Const") else {
            debug!(row = row_count, "Skipping row with empty IMDb id");
            continue;
        };

        let rating_str = columns.get(&record, "Your Rating").unwrap_or("");
        let rating = rating_str
            .parse::<u8>()
            .map_err(|e| SourceError::Parse(format!("Failed to parse rating '{}': {}", rating_str, e)))?;
        let date_rated = columns.get(&record, "Date Rated").unwrap_or("");
        let created = parse_date(date_rated)?;

        let kind = media_kind(id, columns.get(&record, "Title Type"));
        let mut item = Item::new(id, kind, created).with_rating(rating);
        if let Some(title) = columns.get(&record, "Title") {
            item = item.with_title(title);
        }
        ratings.push(item);
    }

    info!(rows = row_count, ratings = ratings.len(), "Parsed IMDb ratings export");
    Ok(ratings)
}

pub fn parse_list_file<P: AsRef<Path>>(path: P) -> Result<Vec<Item>, SourceError> {
    parse_list_csv(File::open(path)?)
}
