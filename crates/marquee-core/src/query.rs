//! Filter and sort evaluation over a snapshot of tracked titles.
//!
//! [`evaluate`] is pure: it never touches storage, never mutates its input and
//! takes "today" as a parameter, so the same inputs always yield the same
//! sequence.

use std::cmp::{Ordering, Reverse};

use chrono::{Duration, Local, NaiveDate};
use unicode_normalization::UnicodeNormalization;

use crate::filter::{DateFilter, FilterCriteria, SortOrder};
use crate::genres::GenreSnapshot;
use crate::models::ShowRecord;

/// Length of the "currently in theaters" window, counted back from today.
const IN_THEATERS_DAYS: i64 = 31;

/// Inputs to an evaluation that don't come from the records or the criteria.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub genres: GenreSnapshot,
    pub today: NaiveDate,
}

impl QueryContext {
    pub fn new(genres: GenreSnapshot, today: NaiveDate) -> Self {
        Self { genres, today }
    }

    /// Context for "now", in the local time zone.
    pub fn now(genres: GenreSnapshot) -> Self {
        Self::new(genres, Local::now().date_naive())
    }
}

/// Filter `records` by `criteria` and order them by `sort`.
///
/// Steps, in order: category, media type, genre, keyword, release date,
/// then a stable sort.
pub fn evaluate(
    records: &[ShowRecord],
    criteria: &FilterCriteria,
    sort: SortOrder,
    ctx: &QueryContext,
) -> Vec<ShowRecord> {
    let plan = Plan::new(criteria, ctx);
    let mut kept: Vec<&ShowRecord> = records.iter().filter(|r| plan.matches(r)).collect();
    sort_records(&mut kept, sort);

    tracing::trace!(
        total = records.len(),
        kept = kept.len(),
        %sort,
        "Evaluated library query"
    );
    kept.into_iter().cloned().collect()
}

/// Criteria pre-processed once per evaluation.
struct Plan<'a> {
    criteria: &'a FilterCriteria,
    ctx: &'a QueryContext,
    required_genres: std::collections::BTreeSet<u32>,
    include_keywords: Vec<String>,
    exclude_keywords: Vec<String>,
}

impl<'a> Plan<'a> {
    fn new(criteria: &'a FilterCriteria, ctx: &'a QueryContext) -> Self {
        Self {
            criteria,
            ctx,
            required_genres: criteria.effective_required_genres(),
            include_keywords: fold_keywords(&criteria.include_keywords),
            exclude_keywords: fold_keywords(&criteria.exclude_keywords),
        }
    }

    fn matches(&self, record: &ShowRecord) -> bool {
        self.category_ok(record)
            && self.media_ok(record)
            && self.genres_ok(record)
            && self.keywords_ok(record)
            && self.dates_ok(record)
    }

    fn category_ok(&self, record: &ShowRecord) -> bool {
        self.criteria.categories.is_empty() || self.criteria.categories.contains(&record.category)
    }

    fn media_ok(&self, record: &ShowRecord) -> bool {
        self.criteria.media_kinds.is_empty() || self.criteria.media_kinds.contains(&record.kind())
    }

    /// Any excluded genre drops the record; otherwise it needs any one required genre.
    fn genres_ok(&self, record: &ShowRecord) -> bool {
        let genres = &record.metadata.genre_ids;
        if genres
            .iter()
            .any(|g| self.criteria.excluded_genres.contains(g))
        {
            return false;
        }
        self.required_genres.is_empty() || genres.iter().any(|g| self.required_genres.contains(g))
    }

    fn keywords_ok(&self, record: &ShowRecord) -> bool {
        if self.include_keywords.is_empty() && self.exclude_keywords.is_empty() {
            return true;
        }
        let haystack = self.haystack(record);
        if self
            .exclude_keywords
            .iter()
            .any(|k| haystack.contains(k.as_str()))
        {
            return false;
        }
        self.include_keywords.is_empty()
            || self
                .include_keywords
                .iter()
                .any(|k| haystack.contains(k.as_str()))
    }

    /// Folded title, summary and resolved genre names, newline separated.
    fn haystack(&self, record: &ShowRecord) -> String {
        let meta = &record.metadata;
        let mut parts = vec![meta.title.as_str()];
        if let Some(summary) = meta.summary.as_deref() {
            parts.push(summary);
        }
        parts.extend(self.ctx.genres.names(record.kind(), &meta.genre_ids));
        fold(&parts.join("\n"))
    }

    fn dates_ok(&self, record: &ShowRecord) -> bool {
        match self.criteria.dates {
            DateFilter::Any => true,
            DateFilter::Between { start, end } => {
                let (lo, hi) = if start <= end {
                    (start, end)
                } else {
                    (end, start)
                };
                release_date(record).is_some_and(|d| lo <= d && d <= hi)
            }
            DateFilter::InTheaters => {
                let today = self.ctx.today;
                let earliest = today - Duration::days(IN_THEATERS_DAYS);
                record.is_movie()
                    && release_date(record).is_some_and(|d| earliest <= d && d <= today)
            }
        }
    }
}

/// Stable sort. Records lacking the sort field are the minimum value.
fn sort_records(records: &mut [&ShowRecord], sort: SortOrder) {
    match sort {
        SortOrder::Default => {}
        SortOrder::BestRated => records.sort_by(|a, b| cmp_rating_desc(rating(a), rating(b))),
        SortOrder::ReleaseDate => records.sort_by_cached_key(|r| Reverse(release_date(r))),
        SortOrder::Alphabetical => records.sort_by_cached_key(|r| fold(&r.metadata.title)),
    }
}

fn rating(record: &ShowRecord) -> Option<f32> {
    record.metadata.public_rating.filter(|v| !v.is_nan())
}

fn cmp_rating_desc(a: Option<f32>, b: Option<f32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Parsed release date, or `None` when missing or unreadable.
pub fn release_date(record: &ShowRecord) -> Option<NaiveDate> {
    let raw = record.metadata.release_date.as_deref()?;
    let parsed = parse_release_date(raw);
    if parsed.is_none() && !raw.trim().is_empty() {
        tracing::debug!(
            key = %record.key(),
            value = raw,
            "Unreadable release date, treating as missing"
        );
    }
    parsed
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM` (first of month) and `YYYY` (January 1st).
pub fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    match s.len() {
        4 => NaiveDate::from_ymd_opt(s.parse().ok()?, 1, 1),
        7 => NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d").ok(),
        _ => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok(),
    }
}

/// NFKC + lowercase, for case-insensitive comparisons.
fn fold(s: &str) -> String {
    s.nfkc().collect::<String>().to_lowercase()
}

fn fold_keywords(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| fold(k.trim()))
        .filter(|k| !k.is_empty())
        .collect()
}
