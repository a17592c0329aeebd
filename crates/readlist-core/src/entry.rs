//! Reading list entries
//!
//! Defines `ReadingListEntry`, the value stored by every reading list model,
//! together with its read state, distillation state and the merge rule used
//! both when sync data meets a local entry and when the dual model presents
//! two per-store views of the same URL.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// First delay before retrying a failed distillation
const DISTILLATION_BACKOFF_INITIAL: Duration = Duration::from_secs(2);
/// Upper bound for the distillation retry delay
const DISTILLATION_BACKOFF_MAX: Duration = Duration::from_secs(60 * 60);

/// Where an added entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    /// Added by a local user action
    AddedViaCurrentApp,
    /// Added while applying remote sync data
    AddedViaSync,
}

/// Read state of an entry
///
/// `Unseen` entries have never been surfaced to the user. Marking an entry
/// seen moves it to `Unread` without touching its position in the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadState {
    Unseen,
    Unread,
    Read,
}

/// Offline rendering state of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistillationState {
    #[default]
    NotProcessed,
    Processing,
    WillRetry,
    Processed,
    DistillationError,
}

impl DistillationState {
    fn is_failure(self) -> bool {
        matches!(
            self,
            DistillationState::WillRetry | DistillationState::DistillationError
        )
    }
}

/// A single reading list item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingListEntry {
    url: Url,
    title: String,
    state: ReadState,
    creation_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
    update_title_time: DateTime<Utc>,
    first_read_time: Option<DateTime<Utc>>,
    estimated_read_time: Option<Duration>,
    distilled_state: DistillationState,
    distilled_path: Option<PathBuf>,
    distilled_url: Option<Url>,
    distillation_size: u64,
    distillation_time: Option<DateTime<Utc>>,
    failed_download_counter: u32,
}

impl ReadingListEntry {
    /// Create a new unseen entry
    ///
    /// The title is whitespace-collapsed.
    pub fn new(url: Url, title: &str, now: DateTime<Utc>) -> Self {
        Self {
            url,
            title: collapse_whitespace(title),
            state: ReadState::Unseen,
            creation_time: now,
            update_time: now,
            update_title_time: now,
            first_read_time: None,
            estimated_read_time: None,
            distilled_state: DistillationState::NotProcessed,
            distilled_path: None,
            distilled_url: None,
            distillation_size: 0,
            distillation_time: None,
            failed_download_counter: 0,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn state(&self) -> ReadState {
        self.state
    }

    pub fn is_read(&self) -> bool {
        self.state == ReadState::Read
    }

    pub fn has_been_seen(&self) -> bool {
        self.state != ReadState::Unseen
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    pub fn update_time(&self) -> DateTime<Utc> {
        self.update_time
    }

    pub fn update_title_time(&self) -> DateTime<Utc> {
        self.update_title_time
    }

    pub fn first_read_time(&self) -> Option<DateTime<Utc>> {
        self.first_read_time
    }

    pub fn estimated_read_time(&self) -> Option<Duration> {
        self.estimated_read_time
    }

    pub fn distilled_state(&self) -> DistillationState {
        self.distilled_state
    }

    pub fn distilled_path(&self) -> Option<&Path> {
        self.distilled_path.as_deref()
    }

    pub fn distilled_url(&self) -> Option<&Url> {
        self.distilled_url.as_ref()
    }

    pub fn distillation_size(&self) -> u64 {
        self.distillation_size
    }

    pub fn distillation_time(&self) -> Option<DateTime<Utc>> {
        self.distillation_time
    }

    pub fn failed_download_counter(&self) -> u32 {
        self.failed_download_counter
    }

    /// Delay before the next distillation attempt
    ///
    /// Zero when no attempt has failed; doubles with every failure after
    /// that, up to one hour.
    pub fn time_until_next_try(&self) -> Duration {
        if self.failed_download_counter == 0 {
            return Duration::ZERO;
        }
        let exponent = (self.failed_download_counter - 1).min(16);
        DISTILLATION_BACKOFF_INITIAL
            .saturating_mul(1 << exponent)
            .min(DISTILLATION_BACKOFF_MAX)
    }

    /// Update the title (whitespace-collapsed)
    pub fn set_title(&mut self, title: &str, now: DateTime<Utc>) {
        self.title = collapse_whitespace(title);
        self.update_title_time = now;
    }

    /// Change the read status
    ///
    /// Does nothing if the status is unchanged. The first transition to read
    /// records `first_read_time`. Going from unseen to unread does not bump
    /// `update_time`, so marking an entry seen keeps its place in the list.
    pub fn set_read(&mut self, read: bool, now: DateTime<Utc>) {
        let previous = self.state;
        self.state = if read {
            ReadState::Read
        } else {
            ReadState::Unread
        };
        if self.state == previous {
            return;
        }
        if read && self.first_read_time.is_none() {
            self.first_read_time = Some(now);
        }
        if !(previous == ReadState::Unseen && self.state == ReadState::Unread) {
            self.mark_entry_updated(now);
        }
    }

    pub fn mark_entry_updated(&mut self, now: DateTime<Utc>) {
        self.update_time = now;
    }

    pub fn set_estimated_read_time(&mut self, estimated_read_time: Option<Duration>) {
        self.estimated_read_time = estimated_read_time;
    }

    /// Record a distillation state change other than success
    ///
    /// Entering a failure state from a non-failure state counts as one failed
    /// download. Any previous artifact is dropped.
    ///
    /// # Panics
    ///
    /// `Processed` must go through [`set_distilled_info`](Self::set_distilled_info),
    /// and `NotProcessed` is only the initial state.
    pub fn set_distilled_state(&mut self, state: DistillationState) {
        assert!(
            !matches!(
                state,
                DistillationState::Processed | DistillationState::NotProcessed
            ),
            "use set_distilled_info to mark an entry processed"
        );
        if state.is_failure() && !self.distilled_state.is_failure() {
            self.failed_download_counter += 1;
        }
        self.distilled_state = state;
        self.distilled_path = None;
        self.distilled_url = None;
    }

    /// Record a successful distillation
    pub fn set_distilled_info(
        &mut self,
        path: &Path,
        distilled_url: &Url,
        size: u64,
        time: DateTime<Utc>,
    ) {
        self.distilled_state = DistillationState::Processed;
        self.distilled_path = Some(path.to_path_buf());
        self.distilled_url = Some(distilled_url.clone());
        self.distillation_size = size;
        self.distillation_time = Some(time);
        self.failed_download_counter = 0;
    }

    /// Whether this entry already holds the given distillation result
    pub fn has_distilled_info(&self, path: &Path, distilled_url: &Url) -> bool {
        self.distilled_state == DistillationState::Processed
            && self.distilled_path.as_deref() == Some(path)
            && self.distilled_url.as_ref() == Some(distilled_url)
    }

    /// Merge `other` (same URL) into this entry
    ///
    /// Title, creation and read state follow last-writer-wins on their own
    /// timestamps. Distillation data stays with `self` unless `self` was
    /// never processed and `other` was.
    pub fn merge_with_entry(&mut self, other: &ReadingListEntry) {
        assert_eq!(self.url, other.url, "cannot merge entries with different URLs");

        if self.update_title_time < other.update_title_time {
            self.title = other.title.clone();
            self.update_title_time = other.update_title_time;
        } else if self.update_title_time == other.update_title_time && self.title < other.title {
            self.title = other.title.clone();
        }

        if self.creation_time < other.creation_time {
            self.creation_time = other.creation_time;
            self.first_read_time = other.first_read_time;
        } else if self.creation_time == other.creation_time {
            self.first_read_time = match (self.first_read_time, other.first_read_time) {
                (Some(ours), Some(theirs)) => Some(ours.min(theirs)),
                (ours, theirs) => ours.or(theirs),
            };
        }

        if self.update_time < other.update_time {
            self.update_time = other.update_time;
            self.state = other.state;
        } else if self.update_time == other.update_time
            && (self.state == ReadState::Unseen || other.state == ReadState::Read)
        {
            self.state = other.state;
        }

        if self.estimated_read_time.is_none() {
            self.estimated_read_time = other.estimated_read_time;
        }

        if self.distilled_state == DistillationState::NotProcessed
            && other.distilled_state == DistillationState::Processed
        {
            self.take_distillation_from(other);
        }
    }

    /// Merge `other` like `merge_with_entry`, leaving this entry's
    /// distillation data untouched
    pub(crate) fn merge_keeping_distillation(&mut self, other: &ReadingListEntry) {
        let mut other = other.clone();
        other.take_distillation_from(self);
        self.merge_with_entry(&other);
    }

    fn take_distillation_from(&mut self, other: &ReadingListEntry) {
        self.distilled_state = other.distilled_state;
        self.distilled_path = other.distilled_path.clone();
        self.distilled_url = other.distilled_url.clone();
        self.distillation_size = other.distillation_size;
        self.distillation_time = other.distillation_time;
        self.failed_download_counter = 0;
    }
}

/// Trim a title and collapse every whitespace run into one space
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether the model layer accepts this URL (http and https only)
pub fn is_url_supported(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_new_entry_collapses_title() {
        let entry = ReadingListEntry::new(url("http://a.com"), "  Foo\n Bar ", at(10));
        assert_eq!(entry.title(), "Foo Bar");
        assert_eq!(entry.state(), ReadState::Unseen);
        assert!(!entry.is_read());
        assert!(!entry.has_been_seen());
        assert_eq!(entry.distilled_state(), DistillationState::NotProcessed);
        assert_eq!(entry.creation_time(), at(10));
        assert_eq!(entry.update_time(), at(10));
    }

    #[test]
    fn test_url_support() {
        assert!(is_url_supported(&url("http://a.com")));
        assert!(is_url_supported(&url("https://a.com/path")));
        assert!(!is_url_supported(&url("ftp://a.com")));
        assert!(!is_url_supported(&url("chrome://settings")));
        assert!(!is_url_supported(&url("file:///tmp/x.html")));
    }

    #[test]
    fn test_mark_seen_keeps_update_time() {
        let mut entry = ReadingListEntry::new(url("http://a.com"), "A", at(10));
        entry.set_read(false, at(20));
        assert_eq!(entry.state(), ReadState::Unread);
        assert!(entry.has_been_seen());
        assert_eq!(entry.update_time(), at(10));
        assert!(entry.first_read_time().is_none());
    }

    #[test]
    fn test_set_read_records_first_read() {
        let mut entry = ReadingListEntry::new(url("http://a.com"), "A", at(10));
        entry.set_read(true, at(20));
        assert!(entry.is_read());
        assert_eq!(entry.first_read_time(), Some(at(20)));
        assert_eq!(entry.update_time(), at(20));

        entry.set_read(false, at(30));
        entry.set_read(true, at(40));
        assert_eq!(entry.first_read_time(), Some(at(20)));
        assert_eq!(entry.update_time(), at(40));
    }

    #[test]
    fn test_set_read_unchanged_is_noop() {
        let mut entry = ReadingListEntry::new(url("http://a.com"), "A", at(10));
        entry.set_read(true, at(20));
        entry.set_read(true, at(30));
        assert_eq!(entry.update_time(), at(20));
    }

    #[test]
    fn test_distillation_failures_back_off() {
        let mut entry = ReadingListEntry::new(url("http://a.com"), "A", at(10));
        assert_eq!(entry.time_until_next_try(), Duration::ZERO);

        entry.set_distilled_state(DistillationState::Processing);
        entry.set_distilled_state(DistillationState::WillRetry);
        assert_eq!(entry.failed_download_counter(), 1);
        assert_eq!(entry.time_until_next_try(), Duration::from_secs(2));

        // Staying in a failure state is not a new failure
        entry.set_distilled_state(DistillationState::DistillationError);
        assert_eq!(entry.failed_download_counter(), 1);

        entry.set_distilled_state(DistillationState::Processing);
        entry.set_distilled_state(DistillationState::WillRetry);
        assert_eq!(entry.failed_download_counter(), 2);
        assert_eq!(entry.time_until_next_try(), Duration::from_secs(4));

        entry.set_distilled_info(
            Path::new("offline/a.html"),
            &url("http://a.com/distilled"),
            512,
            at(50),
        );
        assert_eq!(entry.distilled_state(), DistillationState::Processed);
        assert_eq!(entry.failed_download_counter(), 0);
        assert_eq!(entry.distillation_size(), 512);
        assert!(entry.has_distilled_info(
            Path::new("offline/a.html"),
            &url("http://a.com/distilled")
        ));
    }

    #[test]
    fn test_backoff_is_capped() {
        let mut entry = ReadingListEntry::new(url("http://a.com"), "A", at(10));
        for _ in 0..30 {
            entry.set_distilled_state(DistillationState::Processing);
            entry.set_distilled_state(DistillationState::WillRetry);
        }
        assert_eq!(entry.time_until_next_try(), DISTILLATION_BACKOFF_MAX);
    }

    #[test]
    #[should_panic]
    fn test_set_distilled_state_rejects_processed() {
        let mut entry = ReadingListEntry::new(url("http://a.com"), "A", at(10));
        entry.set_distilled_state(DistillationState::Processed);
    }

    #[test]
    fn test_merge_newer_other_wins_title_and_state() {
        let mut local = ReadingListEntry::new(url("http://a.com"), "Local", at(10));
        local.set_distilled_info(
            Path::new("offline/a.html"),
            &url("http://a.com/distilled"),
            10,
            at(11),
        );
        let mut remote = ReadingListEntry::new(url("http://a.com"), "Remote", at(20));
        remote.set_read(true, at(30));

        local.merge_with_entry(&remote);
        assert_eq!(local.title(), "Remote");
        assert!(local.is_read());
        assert_eq!(local.update_time(), at(30));
        assert_eq!(local.creation_time(), at(20));
        assert_eq!(local.distilled_state(), DistillationState::Processed);
    }

    #[test]
    fn test_merge_older_other_loses() {
        let mut local = ReadingListEntry::new(url("http://a.com"), "Local", at(50));
        let mut remote = ReadingListEntry::new(url("http://a.com"), "Remote", at(20));
        remote.set_read(true, at(30));

        local.merge_with_entry(&remote);
        assert_eq!(local.title(), "Local");
        assert!(!local.is_read());
        assert_eq!(local.update_time(), at(50));
    }

    #[test]
    fn test_merge_title_tie_takes_greater() {
        let mut a = ReadingListEntry::new(url("http://a.com"), "", at(10));
        let b = ReadingListEntry::new(url("http://a.com"), "Title", at(10));
        a.merge_with_entry(&b);
        assert_eq!(a.title(), "Title");

        let mut c = ReadingListEntry::new(url("http://a.com"), "Zed", at(10));
        c.merge_with_entry(&b);
        assert_eq!(c.title(), "Zed");
    }

    #[test]
    fn test_merge_state_tie() {
        let mut unseen = ReadingListEntry::new(url("http://a.com"), "A", at(10));
        let mut unread = ReadingListEntry::new(url("http://a.com"), "A", at(10));
        unread.set_read(false, at(10));
        unseen.merge_with_entry(&unread);
        assert_eq!(unseen.state(), ReadState::Unread);

        let mut read = ReadingListEntry::new(url("http://a.com"), "A", at(5));
        read.set_read(true, at(10));
        unread.merge_with_entry(&read);
        assert!(unread.is_read());
    }

    #[test]
    fn test_merge_adopts_missing_distillation() {
        let mut local = ReadingListEntry::new(url("http://a.com"), "A", at(10));
        let mut remote = ReadingListEntry::new(url("http://a.com"), "A", at(10));
        remote.set_distilled_info(
            Path::new("offline/a.html"),
            &url("http://a.com/distilled"),
            99,
            at(12),
        );
        local.merge_with_entry(&remote);
        assert_eq!(local.distilled_state(), DistillationState::Processed);
        assert_eq!(local.distilled_path(), Some(Path::new("offline/a.html")));
        assert_eq!(local.distillation_size(), 99);
    }

    #[test]
    fn test_merge_keeps_own_distillation_state() {
        let mut local = ReadingListEntry::new(url("http://a.com"), "A", at(10));
        local.set_distilled_state(DistillationState::Processing);
        let mut remote = ReadingListEntry::new(url("http://a.com"), "A", at(20));
        remote.set_distilled_info(
            Path::new("offline/a.html"),
            &url("http://a.com/distilled"),
            99,
            at(21),
        );
        local.merge_with_entry(&remote);
        assert_eq!(local.distilled_state(), DistillationState::Processing);
    }

    #[test]
    fn test_merge_keeping_distillation_ignores_processed_copy() {
        let mut local = ReadingListEntry::new(url("http://a.com"), "A", at(10));
        let mut remote = ReadingListEntry::new(url("http://a.com"), "B", at(20));
        remote.set_distilled_info(
            Path::new("offline/a.html"),
            &url("http://a.com/distilled"),
            99,
            at(21),
        );
        local.merge_keeping_distillation(&remote);
        assert_eq!(local.title(), "B");
        assert_eq!(local.distilled_state(), DistillationState::NotProcessed);
        assert_eq!(local.distilled_path(), None);
        assert_eq!(local.distillation_size(), 0);
    }

    #[test]
    fn test_merge_first_read_tie_takes_earliest() {
        let mut a = ReadingListEntry::new(url("http://a.com"), "A", at(10));
        a.set_read(true, at(40));
        let mut b = ReadingListEntry::new(url("http://a.com"), "A", at(10));
        b.set_read(true, at(30));
        a.merge_with_entry(&b);
        assert_eq!(a.first_read_time(), Some(at(30)));
    }

    #[test]
    fn test_entry_serialization() {
        let mut entry = ReadingListEntry::new(url("https://example.com"), "Example", at(10));
        entry.set_estimated_read_time(Some(Duration::from_secs(300)));
        let json = serde_json::to_string(&entry).unwrap();
        let deserialized: ReadingListEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, deserialized);
    }
}
