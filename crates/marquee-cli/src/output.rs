use serde::Serialize;

use marquee_api::traits::{RemoteTitle, SearchPage};
use marquee_core::genres::GenreCatalogCache;
use marquee_core::models::ShowRecord;
use marquee_runtime::{SlotValue, SyncOutcome};

/// Prints command results as plain text or JSON.
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn message(&self, msg: impl AsRef<str>) {
        if self.json {
            self.value(&serde_json::json!({ "message": msg.as_ref() }));
        } else {
            println!("{}", msg.as_ref());
        }
    }

    pub fn value<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("failed to encode output: {e}"),
        }
    }

    pub fn records(&self, records: &[ShowRecord], genres: &GenreCatalogCache) {
        if self.json {
            return self.value(records);
        }
        if records.is_empty() {
            println!("No titles.");
            return;
        }
        for record in records {
            println!("{}", record_line(record, genres));
        }
    }

    pub fn record(&self, record: &ShowRecord, genres: &GenreCatalogCache) {
        if self.json {
            self.value(record);
        } else {
            println!("{}", record_line(record, genres));
        }
    }

    pub fn search(&self, page: &SearchPage) {
        if self.json {
            return self.value(&page.items);
        }
        for title in &page.items {
            println!("{}", title_line(title));
        }
        println!("page {} of {}", page.page, page.total_pages.max(1));
        if page.has_next() {
            println!("more results with --page {}", page.page + 1);
        }
    }

    pub fn outcome(&self, what: &str, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::Confirmed(value) => {
                self.message(format!("{what}: {}", describe(*value)));
            }
            SyncOutcome::RolledBack { failure, restored } => {
                let mut msg = format!("{what} failed ({failure}), reverted to {}", describe(*restored));
                if failure.is_auth() {
                    msg.push_str("; set MARQUEE_ACCESS_TOKEN and MARQUEE_ACCOUNT_ID");
                }
                self.message(msg);
            }
        }
    }
}

fn describe(value: SlotValue) -> String {
    match value {
        SlotValue::Included(true) => "included".into(),
        SlotValue::Included(false) => "not included".into(),
        SlotValue::Rating(Some(r)) => format!("rated {r}"),
        SlotValue::Rating(None) => "unrated".into(),
    }
}

fn record_line(record: &ShowRecord, genres: &GenreCatalogCache) -> String {
    let key = record.key();
    let mut line = format!(
        "{:>8} {:<6} [{}] {}",
        key.external_id,
        if key.is_movie { "movie" } else { "tv" },
        record.category,
        record.title()
    );
    if let Some(date) = &record.metadata.release_date {
        line.push_str(&format!(" ({date})"));
    }
    if !record.is_movie() {
        match record.metadata.total_episodes {
            Some(total) => line.push_str(&format!(" {}/{total} eps", record.episodes_seen)),
            None => line.push_str(&format!(" {} eps", record.episodes_seen)),
        }
    }
    if let Some(rating) = record.personal_rating {
        line.push_str(&format!(" mine {rating}/10"));
    }
    let names: Vec<String> = record
        .metadata
        .genre_ids
        .iter()
        .map(|id| genres.label(*id))
        .filter(|name| !name.is_empty())
        .collect();
    if !names.is_empty() {
        line.push_str(&format!(" - {}", names.join(", ")));
    }
    line
}

fn title_line(title: &RemoteTitle) -> String {
    let mut line = format!("{:>8} {:<6} {}", title.id, title.media_type.as_str(), title.title);
    if let Some(date) = title.release_date.as_deref().filter(|d| !d.is_empty()) {
        line.push_str(&format!(" ({date})"));
    }
    if let Some(vote) = title.vote_average {
        line.push_str(&format!(" {vote:.1}"));
    }
    line
}
