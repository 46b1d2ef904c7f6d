use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicBand {
    pub id: i64,
    pub name: String,
    pub coordinates: Option<Coordinates>,
    pub genre: Option<MusicGenre>,
    #[serde(rename = "numberOfParticipants")]
    pub number_of_participants: Option<i64>,
    #[serde(rename = "singlesCount")]
    pub singles_count: Option<i64>,
    pub description: Option<String>,
    #[serde(rename = "bestAlbum")]
    pub best_album: Option<Album>,
    #[serde(rename = "albumsCount")]
    pub albums_count: Option<i64>,
    #[serde(
        rename = "establishmentDate",
        default,
        deserialize_with = "lenient_date"
    )]
    pub establishment_date: Option<NaiveDate>,
    #[serde(rename = "frontMan")]
    pub front_man: Option<Person>,
    #[serde(rename = "createdBy")]
    pub created_by: Option<String>,
    #[serde(rename = "createdDate")]
    pub created_date: Option<NaiveDateTime>,
}

impl MusicBand {
    pub fn genre_display(&self) -> &'static str {
        self.genre.map(|g| g.label()).unwrap_or("Unknown")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coordinates {
    pub id: Option<i64>,
    pub x: i32,
    pub y: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    pub id: Option<i64>,
    pub name: String,
    pub tracks: Option<i64>,
    pub sales: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: Option<i64>,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MusicGenre {
    ProgressiveRock,
    Soul,
    Rock,
    PostRock,
    PunkRock,
    PostPunk,
}

impl MusicGenre {
    pub fn label(&self) -> &'static str {
        match self {
            MusicGenre::ProgressiveRock => "Prog Rock",
            MusicGenre::Soul => "Soul",
            MusicGenre::Rock => "Rock",
            MusicGenre::PostRock => "Post Rock",
            MusicGenre::PunkRock => "Punk Rock",
            MusicGenre::PostPunk => "Post Punk",
        }
    }
}

/// Accepts `2020-05-01`, an ISO date-time, or epoch milliseconds.
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    let raw = Option::<Raw>::deserialize(deserializer)?;
    let date = match raw {
        None => None,
        Some(Raw::Millis(ms)) => DateTime::from_timestamp_millis(ms).map(|dt| dt.date_naive()),
        Some(Raw::Text(text)) => {
            let date_part = text.get(..10).unwrap_or(&text);
            NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
        }
    };
    Ok(date)
}

/// One page of results as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    #[serde(rename = "totalElements", default)]
    pub total_elements: u64,
    #[serde(rename = "totalPages", default)]
    pub total_pages: u32,
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => f.write_str("ASC"),
            SortDirection::Desc => f.write_str("DESC"),
        }
    }
}

/// Paging and sorting parameters.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
    pub sort: Vec<String>,
    pub direction: Option<SortDirection>,
}

/// Default page size used by the catalog tables
const DEFAULT_PAGE_SIZE: u32 = 10;

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
            sort: Vec::new(),
            direction: None,
        }
    }
}

impl PageRequest {
    /// Query pairs; `sort` repeats once per field.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("page", self.page.to_string()), ("size", self.size.to_string())];
        pairs.extend(self.sort.iter().map(|field| ("sort", field.clone())));
        if let Some(direction) = self.direction {
            pairs.push(("direction", direction.to_string()));
        }
        pairs
    }
}

/// Optional filters for the band listing. Unset fields are not sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MusicBandFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<MusicGenre>,
    #[serde(rename = "frontManName", skip_serializing_if = "Option::is_none")]
    pub front_man_name: Option<String>,
    #[serde(rename = "bestAlbumName", skip_serializing_if = "Option::is_none")]
    pub best_album_name: Option<String>,
    #[serde(rename = "minParticipants", skip_serializing_if = "Option::is_none")]
    pub min_participants: Option<i64>,
    #[serde(rename = "maxParticipants", skip_serializing_if = "Option::is_none")]
    pub max_participants: Option<i64>,
    #[serde(rename = "establishmentDateBefore", skip_serializing_if = "Option::is_none")]
    pub established_before: Option<NaiveDate>,
    #[serde(rename = "establishmentDateAfter", skip_serializing_if = "Option::is_none")]
    pub established_after: Option<NaiveDate>,
    #[serde(rename = "createdBy", skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}
