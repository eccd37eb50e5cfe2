// Search filters for repository discovery.
// Turns a filter value into a repository search query string.

use std::fmt;
use std::str::FromStr;

use chrono::{Months, NaiveDate, Utc};

use crate::error::Error;

/// Default recency window: activity within the last 3 years.
pub const DEFAULT_WINDOW_MONTHS: u32 = 36;

/// Ordering requested from the search API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchSort {
    #[default]
    BestMatch,
    Stars,
    Forks,
    Updated,
}

impl SearchSort {
    /// Value for the `sort` query parameter; best match sends none.
    pub fn api_key(&self) -> Option<&'static str> {
        match self {
            SearchSort::BestMatch => None,
            SearchSort::Stars => Some("stars"),
            SearchSort::Forks => Some("forks"),
            SearchSort::Updated => Some("updated"),
        }
    }
}

impl fmt::Display for SearchSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_key().unwrap_or("best-match"))
    }
}

impl FromStr for SearchSort {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "best-match" | "best_match" | "best" => Ok(SearchSort::BestMatch),
            "stars" => Ok(SearchSort::Stars),
            "forks" => Ok(SearchSort::Forks),
            "updated" => Ok(SearchSort::Updated),
            other => Err(Error::Config(format!("Unknown sort: {}", other))),
        }
    }
}

/// Shapes the filtered-search discovery strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilters {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub min_stars: u64,
    pub language: Option<String>,
    pub sort: SearchSort,
    /// Prefer repositories whose readme mentions documentation.
    pub only_with_docs: bool,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self::recent(DEFAULT_WINDOW_MONTHS)
    }
}

impl SearchFilters {
    /// Filters covering activity within the last `months` months.
    pub fn recent(months: u32) -> Self {
        let end_date = Utc::now().date_naive();
        let start_date = end_date
            .checked_sub_months(Months::new(months))
            .unwrap_or(NaiveDate::MIN);

        Self {
            start_date,
            end_date,
            min_stars: 1,
            language: None,
            sort: SearchSort::default(),
            only_with_docs: false,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_min_stars(mut self, min_stars: u64) -> Self {
        self.min_stars = min_stars;
        self
    }

    pub fn with_sort(mut self, sort: SearchSort) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_docs(mut self, only_with_docs: bool) -> Self {
        self.only_with_docs = only_with_docs;
        self
    }

    /// Repository search query for these filters.
    pub fn query(&self) -> String {
        let mut terms = vec![
            format!(
                "pushed:{}..{}",
                self.start_date.format("%Y-%m-%d"),
                self.end_date.format("%Y-%m-%d")
            ),
            format!("stars:>={}", self.min_stars),
            "archived:false".to_string(),
            "is:public".to_string(),
        ];

        if let Some(language) = self.language.as_deref().map(str::trim)
            && !language.is_empty()
        {
            if language.contains(' ') {
                terms.push(format!("language:\"{}\"", language));
            } else {
                terms.push(format!("language:{}", language));
            }
        }

        if self.only_with_docs {
            terms.push("documentation in:readme".to_string());
        }

        terms.join(" ")
    }
}
