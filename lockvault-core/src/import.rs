//! CSV import from other password managers.
//!
//! The exporting tool is recognized from the header row and each row is mapped
//! onto a [`VaultEntry`]. Rows without a password, or without anything usable
//! as a site name, are counted as skipped.

use crate::crypto::new_id;
use crate::vault::model::{Category, VaultEntry};
use crate::vault::ops::url_host;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tool that produced a CSV export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CsvSource {
    Chrome,
    Firefox,
    LastPass,
    Bitwarden,
    OnePassword,
    KeePass,
    Unknown,
}

impl CsvSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Firefox => "firefox",
            Self::LastPass => "lastpass",
            Self::Bitwarden => "bitwarden",
            Self::OnePassword => "onepassword",
            Self::KeePass => "keepass",
            Self::Unknown => "unknown",
        }
    }

    /// Recognize the source from normalized header names
    pub fn detect(headers: &[String]) -> Self {
        let has = |name: &str| headers.iter().any(|h| h == name);

        if has("login_uri") || has("login_password") {
            Self::Bitwarden
        } else if has("grouping") && has("extra") {
            Self::LastPass
        } else if has("httprealm") || has("formactionorigin") {
            Self::Firefox
        } else if has("group") && has("title") && has("totp") {
            Self::KeePass
        } else if has("title") && has("url") && has("username") {
            Self::OnePassword
        } else {
            Self::Chrome
        }
    }

    fn columns(&self) -> &'static [(&'static str, Field)] {
        use Field::*;
        match self {
            Self::Firefox => &[("url", Url), ("username", Username), ("password", Password)],
            Self::LastPass => &[
                ("name", SiteName),
                ("url", Url),
                ("username", Username),
                ("password", Password),
                ("extra", Notes),
                ("fav", Favorite),
            ],
            Self::Bitwarden => &[
                ("login_name", SiteName),
                ("name", SiteName),
                ("login_uri", Url),
                ("login_username", Username),
                ("login_password", Password),
                ("notes", Notes),
            ],
            Self::OnePassword | Self::KeePass => &[
                ("title", SiteName),
                ("url", Url),
                ("username", Username),
                ("password", Password),
                ("notes", Notes),
            ],
            Self::Chrome | Self::Unknown => &[
                ("name", SiteName),
                ("url", Url),
                ("username", Username),
                ("password", Password),
            ],
        }
    }

    /// Column holding the folder/group name, if the source has one
    fn group_column(&self) -> &'static str {
        match self {
            Self::LastPass => "grouping",
            _ => "group",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    SiteName,
    Url,
    Username,
    Password,
    Notes,
    Favorite,
}

/// Outcome of an import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvImport {
    pub entries: Vec<VaultEntry>,
    pub source: CsvSource,
    pub skipped: usize,
}

/// Parse a CSV export into vault entries stamped with `now`
pub fn import_from_csv(text: &str, now: DateTime<Utc>) -> CsvImport {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() < 2 {
        return CsvImport {
            entries: Vec::new(),
            source: CsvSource::Unknown,
            skipped: 0,
        };
    }

    let headers: Vec<String> = parse_csv_line(lines[0])
        .iter()
        .map(|h| normalize_header(h))
        .collect();
    let source = CsvSource::detect(&headers);

    let mut entries = Vec::new();
    let mut skipped = 0;

    for line in &lines[1..] {
        let values = parse_csv_line(line);
        let row: HashMap<&str, &str> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.as_str(), values.get(i).map_or("", String::as_str)))
            .collect();

        match row_to_entry(&row, source, now) {
            Some(entry) => entries.push(entry),
            None => skipped += 1,
        }
    }

    CsvImport {
        entries,
        source,
        skipped,
    }
}

fn row_to_entry(
    row: &HashMap<&str, &str>,
    source: CsvSource,
    now: DateTime<Utc>,
) -> Option<VaultEntry> {
    let mut site_name = String::new();
    let mut url = String::new();
    let mut username = String::new();
    let mut password = String::new();
    let mut notes = String::new();
    let mut favorite = false;

    for (column, field) in source.columns() {
        let value = row.get(column).copied().unwrap_or("");
        if value.is_empty() {
            continue;
        }
        match field {
            // First non-empty mapping wins for name and URL
            Field::SiteName if site_name.is_empty() => site_name = value.to_string(),
            Field::Url if url.is_empty() => url = value.to_string(),
            Field::SiteName | Field::Url => {}
            Field::Username => username = value.to_string(),
            Field::Password => password = value.to_string(),
            Field::Notes => notes = value.to_string(),
            Field::Favorite => favorite = value == "1" || value.eq_ignore_ascii_case("true"),
        }
    }

    if password.is_empty() {
        return None;
    }

    if site_name.is_empty() && !url.is_empty() {
        site_name = match url_host(&url) {
            Some(host) => host.strip_prefix("www.").unwrap_or(&host).to_string(),
            None => url.clone(),
        };
    }
    if site_name.is_empty() {
        return None;
    }

    let group = row.get(source.group_column()).copied().unwrap_or("");

    Some(VaultEntry {
        id: new_id(),
        site_name,
        url,
        username,
        password,
        category: guess_category(group),
        favorite,
        notes: (!notes.is_empty()).then_some(notes),
        created_at: now,
        updated_at: now,
    })
}

/// Map a folder/group name onto a category
pub fn guess_category(group: &str) -> Category {
    let g = group.to_lowercase();
    if g.is_empty() {
        Category::Other
    } else if g.contains("work") || g.contains("business") {
        Category::Work
    } else if g.contains("finance") || g.contains("bank") || g.contains("pay") {
        Category::Finance
    } else if g.contains("social") {
        Category::Social
    } else if g.contains("personal") {
        Category::Personal
    } else {
        Category::Other
    }
}

fn normalize_header(header: &str) -> String {
    header
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Split one CSV line into trimmed fields, honoring quotes and `""` escapes
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                // Escaped quote ("")
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }

    fields.push(current.trim().to_string());
    fields
}
