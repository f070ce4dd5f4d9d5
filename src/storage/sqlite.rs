use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::models::{
    AppendSummary, Review, ReviewMarker, StoredSpan, TaxonomyEntry, TopicAssignment, TopicCategory,
    TopicOrigin, UnmappedPhrase, UnmappedReason,
};
use crate::taxonomy::Taxonomy;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Per-app review store, taxonomy and topic assignments.
pub struct Storage {
    conn: Connection,
}

/// Raw review columns, converted after the statement is done.
type ReviewRow = (
    String,
    String,
    String,
    u8,
    String,
    String,
    Option<String>,
    u32,
    Option<String>,
    Option<String>,
);

impl Storage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| classify(e, path))?;
        let storage = Self { conn };
        storage.init_db().map_err(|e| match e {
            Error::Database(inner) => classify(inner, path),
            other => other,
        })?;
        Ok(storage)
    }

    /// Opens `{data_dir}/{app_id}/store.db`, creating the directory if needed.
    pub fn open_for_app<P: AsRef<Path>>(data_dir: P, app_id: &str) -> Result<Self> {
        let path = Self::path_for_app(data_dir, app_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    pub fn path_for_app<P: AsRef<Path>>(data_dir: P, app_id: &str) -> PathBuf {
        data_dir.as_ref().join(app_id).join("store.db")
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self { conn };
        storage.init_db()?;
        Ok(storage)
    }

    fn init_db(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS reviews (
                seq INTEGER PRIMARY KEY,
                app_id TEXT NOT NULL,
                review_id TEXT NOT NULL,
                text TEXT NOT NULL,
                rating INTEGER NOT NULL,
                posted_at TEXT NOT NULL,
                posted_on TEXT NOT NULL,
                scraped_at TEXT NOT NULL,
                user_name TEXT,
                thumbs_up_count INTEGER NOT NULL DEFAULT 0,
                app_version TEXT,
                reply_text TEXT,
                UNIQUE(app_id, review_id)
            );

            CREATE TABLE IF NOT EXISTS taxonomy_entries (
                app_id TEXT NOT NULL,
                canonical_name TEXT NOT NULL,
                aliases_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                origin TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT 'issue',
                description TEXT,
                PRIMARY KEY(app_id, canonical_name)
            );

            CREATE TABLE IF NOT EXISTS topic_assignments (
                app_id TEXT NOT NULL,
                review_id TEXT NOT NULL,
                topic_name TEXT NOT NULL,
                posted_at TEXT NOT NULL,
                posted_on TEXT NOT NULL,
                PRIMARY KEY(app_id, review_id, topic_name)
            );

            CREATE TABLE IF NOT EXISTS classified_reviews (
                app_id TEXT NOT NULL,
                review_id TEXT NOT NULL,
                classified_at TEXT NOT NULL,
                PRIMARY KEY(app_id, review_id)
            );

            CREATE TABLE IF NOT EXISTS unmapped_phrases (
                app_id TEXT NOT NULL,
                review_id TEXT NOT NULL,
                phrase TEXT NOT NULL,
                reason TEXT NOT NULL,
                PRIMARY KEY(app_id, review_id, phrase)
            );

            CREATE INDEX IF NOT EXISTS idx_reviews_app_posted ON reviews(app_id, posted_at, review_id);
            CREATE INDEX IF NOT EXISTS idx_reviews_app_day ON reviews(app_id, posted_on);
            CREATE INDEX IF NOT EXISTS idx_assignments_app_day ON topic_assignments(app_id, posted_on);
            "#,
        )?;

        // stores created before topics had a category
        let has_category: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info('taxonomy_entries') WHERE name = 'category'",
            [],
            |row| row.get(0),
        )?;
        if has_category == 0 {
            self.conn.execute(
                "ALTER TABLE taxonomy_entries ADD COLUMN category TEXT NOT NULL DEFAULT 'issue'",
                [],
            )?;
        }

        Ok(())
    }

    /// Appends reviews, skipping any `(app_id, id)` already stored.
    pub fn append_reviews(&self, reviews: &[Review]) -> Result<AppendSummary> {
        let tx = self.conn.unchecked_transaction()?;
        let mut summary = AppendSummary::default();

        let latest: Option<String> =
            tx.query_row("SELECT MAX(scraped_at) FROM reviews", [], |row| row.get(0))?;
        let mut floor = match latest {
            Some(s) => Some(parse_timestamp(&s)?),
            None => None,
        };

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO reviews (
                    app_id, review_id, text, rating, posted_at, posted_on, scraped_at,
                    user_name, thumbs_up_count, app_version, reply_text
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )?;

            for review in reviews {
                // scraped_at never goes backwards relative to stored rows
                let scraped_at = match floor {
                    Some(f) if review.scraped_at < f => f,
                    _ => review.scraped_at,
                };

                let changed = stmt.execute(params![
                    review.app_id,
                    review.id,
                    review.text,
                    review.rating,
                    format_timestamp(&review.posted_at),
                    review.posted_on().format(DATE_FORMAT).to_string(),
                    format_timestamp(&scraped_at),
                    review.user_name,
                    review.thumbs_up_count,
                    review.app_version,
                    review.reply_text,
                ])?;

                if changed == 0 {
                    summary.skipped += 1;
                } else {
                    summary.inserted += 1;
                    floor = Some(scraped_at);
                }
            }
        }

        tx.commit()?;
        Ok(summary)
    }

    pub fn latest_known_marker(&self, app_id: &str) -> Result<ReviewMarker> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                r#"
                SELECT posted_at, review_id FROM reviews
                WHERE app_id = ?1
                ORDER BY posted_at DESC, review_id DESC
                LIMIT 1
                "#,
                params![app_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((posted_at, id)) => Ok(ReviewMarker::At {
                posted_at: parse_timestamp(&posted_at)?,
                id,
            }),
            None => Ok(ReviewMarker::Empty),
        }
    }

    pub fn earliest_posted_on(&self, app_id: &str) -> Result<Option<NaiveDate>> {
        let day: Option<String> = self.conn.query_row(
            "SELECT MIN(posted_on) FROM reviews WHERE app_id = ?1",
            params![app_id],
            |row| row.get(0),
        )?;
        day.map(|d| parse_date(&d)).transpose()
    }

    pub fn stored_span(&self, app_id: &str) -> Result<StoredSpan> {
        Ok(StoredSpan {
            earliest: self.earliest_posted_on(app_id)?,
            marker: self.latest_known_marker(app_id)?,
        })
    }

    pub fn review_count(&self, app_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM reviews WHERE app_id = ?1",
            params![app_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Reviews posted on days in `[start, end]`, oldest first.
    pub fn query_range(&self, app_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Review>> {
        self.select_reviews(
            r#"
            SELECT r.review_id, r.text, r.posted_at, r.rating, r.scraped_at, r.app_id,
                   r.user_name, r.thumbs_up_count, r.app_version, r.reply_text
            FROM reviews r
            WHERE r.app_id = ?1 AND r.posted_on BETWEEN ?2 AND ?3
            ORDER BY r.posted_at ASC, r.review_id ASC
            "#,
            app_id,
            start,
            end,
        )
    }

    /// Like [`Storage::query_range`], minus reviews already classified.
    pub fn unclassified_in_range(
        &self,
        app_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Review>> {
        self.select_reviews(
            r#"
            SELECT r.review_id, r.text, r.posted_at, r.rating, r.scraped_at, r.app_id,
                   r.user_name, r.thumbs_up_count, r.app_version, r.reply_text
            FROM reviews r
            LEFT JOIN classified_reviews c
                ON c.app_id = r.app_id AND c.review_id = r.review_id
            WHERE r.app_id = ?1 AND r.posted_on BETWEEN ?2 AND ?3 AND c.review_id IS NULL
            ORDER BY r.posted_at ASC, r.review_id ASC
            "#,
            app_id,
            start,
            end,
        )
    }

    fn select_reviews(
        &self,
        sql: &str,
        app_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Review>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(
            params![
                app_id,
                start.format(DATE_FORMAT).to_string(),
                end.format(DATE_FORMAT).to_string()
            ],
            |row| -> rusqlite::Result<ReviewRow> {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                ))
            },
        )?;

        let rows: Vec<ReviewRow> = rows.collect::<std::result::Result<_, _>>()?;
        rows.into_iter().map(review_from_row).collect()
    }

    /// Loads the stored taxonomy, or `None` when the app has none yet.
    pub fn load_taxonomy(&self, app_id: &str) -> Result<Option<Taxonomy>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT canonical_name, aliases_json, created_at, origin, category, description
            FROM taxonomy_entries
            WHERE app_id = ?1
            ORDER BY created_at ASC, canonical_name ASC
            "#,
        )?;

        let rows = stmt.query_map(params![app_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;
        let rows: Vec<_> = rows.collect::<std::result::Result<_, _>>()?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut entries = Vec::with_capacity(rows.len());
        for (canonical_name, aliases_json, created_at, origin, category, description) in rows {
            let aliases: BTreeSet<String> = serde_json::from_str(&aliases_json).map_err(|e| {
                Error::CorruptState(format!("aliases of topic '{}': {}", canonical_name, e))
            })?;
            entries.push(TaxonomyEntry {
                canonical_name,
                aliases,
                created_at: parse_date(&created_at)?,
                origin: TopicOrigin::from(origin.as_str()),
                category: TopicCategory::from(category.as_str()),
                description,
            });
        }

        Ok(Some(Taxonomy::from_entries(app_id, entries)))
    }

    /// Persists the taxonomy, the assignments, the unmapped phrases and the
    /// classified marks atomically. Rows the taxonomy folded on load are
    /// removed and their assignments moved to the surviving topic.
    pub fn commit_classification(
        &self,
        taxonomy: &Taxonomy,
        assignments: &[TopicAssignment],
        unmapped: &[UnmappedPhrase],
        classified_ids: &[String],
        classified_at: DateTime<Utc>,
    ) -> Result<()> {
        let app_id = taxonomy.app_id();
        let tx = self.conn.unchecked_transaction()?;

        {
            for (folded, target) in taxonomy.folded() {
                tx.execute(
                    r#"
                    UPDATE OR IGNORE topic_assignments SET topic_name = ?3
                    WHERE app_id = ?1 AND topic_name = ?2
                    "#,
                    params![app_id, folded, target],
                )?;
                tx.execute(
                    "DELETE FROM topic_assignments WHERE app_id = ?1 AND topic_name = ?2",
                    params![app_id, folded],
                )?;
                tx.execute(
                    "DELETE FROM taxonomy_entries WHERE app_id = ?1 AND canonical_name = ?2",
                    params![app_id, folded],
                )?;
                tracing::info!("Removed duplicate topic '{}' (now '{}')", folded, target);
            }

            let mut upsert = tx.prepare(
                r#"
                INSERT INTO taxonomy_entries (app_id, canonical_name, aliases_json, created_at, origin, category, description)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(app_id, canonical_name) DO UPDATE SET
                    aliases_json = excluded.aliases_json,
                    category = excluded.category,
                    description = COALESCE(excluded.description, taxonomy_entries.description)
                "#,
            )?;
            for entry in taxonomy.entries() {
                upsert.execute(params![
                    app_id,
                    entry.canonical_name,
                    serde_json::to_string(&entry.aliases)?,
                    entry.created_at.format(DATE_FORMAT).to_string(),
                    entry.origin.to_string(),
                    entry.category.to_string(),
                    entry.description,
                ])?;
            }

            let mut assign = tx.prepare(
                r#"
                INSERT OR IGNORE INTO topic_assignments (app_id, review_id, topic_name, posted_at, posted_on)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )?;
            for assignment in assignments {
                if taxonomy.get(&assignment.topic_name).is_none() {
                    return Err(Error::CorruptState(format!(
                        "assignment of review {} references unknown topic '{}'",
                        assignment.review_id, assignment.topic_name
                    )));
                }
                assign.execute(params![
                    app_id,
                    assignment.review_id,
                    assignment.topic_name,
                    format_timestamp(&assignment.posted_at),
                    assignment.posted_on().format(DATE_FORMAT).to_string(),
                ])?;
            }

            let mut leftover = tx.prepare(
                r#"
                INSERT OR IGNORE INTO unmapped_phrases (app_id, review_id, phrase, reason)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )?;
            for phrase in unmapped {
                leftover.execute(params![
                    app_id,
                    phrase.review_id,
                    phrase.phrase,
                    phrase.reason.to_string(),
                ])?;
            }

            let mut mark = tx.prepare(
                r#"
                INSERT OR IGNORE INTO classified_reviews (app_id, review_id, classified_at)
                VALUES (?1, ?2, ?3)
                "#,
            )?;
            let classified_at = format_timestamp(&classified_at);
            for review_id in classified_ids {
                mark.execute(params![app_id, review_id, classified_at])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub fn assignments_for(&self, app_id: &str) -> Result<Vec<TopicAssignment>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT review_id, topic_name, posted_at FROM topic_assignments
            WHERE app_id = ?1
            ORDER BY posted_at ASC, review_id ASC, topic_name ASC
            "#,
        )?;
        let rows = stmt.query_map(params![app_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let rows: Vec<_> = rows.collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(|(review_id, topic_name, posted_at)| {
                Ok(TopicAssignment {
                    review_id,
                    topic_name,
                    posted_at: parse_timestamp(&posted_at)?,
                })
            })
            .collect()
    }

    /// Distinct reviews per (topic, day) for days in `[start, end]`.
    pub fn topic_counts(
        &self,
        app_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(String, NaiveDate, u32)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT topic_name, posted_on, COUNT(DISTINCT review_id)
            FROM topic_assignments
            WHERE app_id = ?1 AND posted_on BETWEEN ?2 AND ?3
            GROUP BY topic_name, posted_on
            "#,
        )?;
        let rows = stmt.query_map(
            params![
                app_id,
                start.format(DATE_FORMAT).to_string(),
                end.format(DATE_FORMAT).to_string()
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                ))
            },
        )?;
        let rows: Vec<_> = rows.collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(|(topic, day, count)| Ok((topic, parse_date(&day)?, count)))
            .collect()
    }

    /// `(review_id, topic_name)` pairs for reviews posted in `[start, end]`.
    pub fn assignments_in_range(
        &self,
        app_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT review_id, topic_name FROM topic_assignments
            WHERE app_id = ?1 AND posted_on BETWEEN ?2 AND ?3
            ORDER BY topic_name ASC, posted_at ASC, review_id ASC
            "#,
        )?;
        let rows = stmt.query_map(
            params![
                app_id,
                start.format(DATE_FORMAT).to_string(),
                end.format(DATE_FORMAT).to_string()
            ],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// Phrases left out of the taxonomy for reviews posted in `[start, end]`.
    pub fn unmapped_in_range(
        &self,
        app_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<UnmappedPhrase>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT u.review_id, u.phrase, u.reason
            FROM unmapped_phrases u
            JOIN reviews r ON r.app_id = u.app_id AND r.review_id = u.review_id
            WHERE u.app_id = ?1 AND r.posted_on BETWEEN ?2 AND ?3
            ORDER BY u.phrase ASC, r.posted_at ASC, u.review_id ASC
            "#,
        )?;
        let rows = stmt.query_map(
            params![
                app_id,
                start.format(DATE_FORMAT).to_string(),
                end.format(DATE_FORMAT).to_string()
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )?;
        let rows: Vec<_> = rows.collect::<std::result::Result<_, _>>()?;

        Ok(rows
            .into_iter()
            .map(|(review_id, phrase, reason)| UnmappedPhrase {
                review_id,
                phrase,
                reason: UnmappedReason::from(reason.as_str()),
            })
            .collect())
    }

    /// Ids of classified reviews posted in `[start, end]`.
    pub fn classified_in_range(
        &self,
        app_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeSet<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT c.review_id
            FROM classified_reviews c
            JOIN reviews r ON r.app_id = c.app_id AND r.review_id = c.review_id
            WHERE c.app_id = ?1 AND r.posted_on BETWEEN ?2 AND ?3
            "#,
        )?;
        let rows = stmt.query_map(
            params![
                app_id,
                start.format(DATE_FORMAT).to_string(),
                end.format(DATE_FORMAT).to_string()
            ],
            |row| row.get::<_, String>(0),
        )?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }
}

fn classify(e: rusqlite::Error, path: &Path) -> Error {
    match e {
        rusqlite::Error::SqliteFailure(ref inner, _)
            if matches!(inner.code, ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt) =>
        {
            Error::CorruptState(format!("{}: {}", path.display(), e))
        }
        other => Error::Database(other),
    }
}

fn review_from_row(row: ReviewRow) -> Result<Review> {
    let (id, text, posted_at, rating, scraped_at, app_id, user_name, thumbs_up_count, app_version, reply_text) =
        row;
    Ok(Review {
        id,
        app_id,
        text,
        rating,
        posted_at: parse_timestamp(&posted_at)?,
        scraped_at: parse_timestamp(&scraped_at)?,
        user_name,
        thumbs_up_count,
        app_version,
        reply_text,
    })
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::CorruptState(format!("bad timestamp '{}': {}", s, e)))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| Error::CorruptState(format!("bad date '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const APP: &str = "in.swiggy.android";

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, day, hour, 0, 0).unwrap()
    }

    fn review(id: &str, posted_at: DateTime<Utc>) -> Review {
        Review {
            id: id.to_string(),
            app_id: APP.to_string(),
            text: format!("review {}", id),
            rating: 3,
            posted_at,
            scraped_at: at(20, 0),
            user_name: None,
            thumbs_up_count: 0,
            app_version: Some("4.1.0".into()),
            reply_text: None,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    #[test]
    fn test_append_skips_duplicates() {
        let storage = Storage::in_memory().unwrap();
        let first = storage
            .append_reviews(&[review("a", at(1, 9)), review("b", at(1, 10))])
            .unwrap();
        assert_eq!(first, AppendSummary { inserted: 2, skipped: 0 });

        let second = storage
            .append_reviews(&[review("b", at(1, 10)), review("c", at(2, 8)), review("c", at(2, 8))])
            .unwrap();
        assert_eq!(second, AppendSummary { inserted: 1, skipped: 2 });

        let stored = storage.query_range(APP, day(1), day(2)).unwrap();
        let ids: Vec<_> = stored.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_query_range_orders_by_time_then_id() {
        let storage = Storage::in_memory().unwrap();
        storage
            .append_reviews(&[
                review("z", at(3, 9)),
                review("y", at(3, 9)),
                review("x", at(2, 23)),
                review("w", at(5, 1)),
            ])
            .unwrap();

        let ids: Vec<_> = storage
            .query_range(APP, day(2), day(3))
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
        assert!(storage.query_range("other.app", day(1), day(31)).unwrap().is_empty());
    }

    #[test]
    fn test_marker_is_max_time_then_id() {
        let storage = Storage::in_memory().unwrap();
        assert_eq!(storage.latest_known_marker(APP).unwrap(), ReviewMarker::Empty);

        storage
            .append_reviews(&[review("a", at(4, 12)), review("b", at(4, 12)), review("c", at(1, 0))])
            .unwrap();

        assert_eq!(
            storage.latest_known_marker(APP).unwrap(),
            ReviewMarker::At { posted_at: at(4, 12), id: "b".into() }
        );
        assert_eq!(storage.earliest_posted_on(APP).unwrap(), Some(day(1)));
        assert_eq!(storage.earliest_posted_on("other.app").unwrap(), None);
        assert_eq!(storage.stored_span(APP).unwrap().earliest, Some(day(1)));
        assert_eq!(storage.stored_span("other.app").unwrap(), StoredSpan::empty());
    }

    #[test]
    fn test_scraped_at_is_clamped_monotonic() {
        let storage = Storage::in_memory().unwrap();
        storage.append_reviews(&[review("a", at(1, 0))]).unwrap();

        let mut late = review("b", at(2, 0));
        late.scraped_at = at(20, 0) - Duration::hours(5);
        storage.append_reviews(&[late]).unwrap();

        let stored = storage.query_range(APP, day(1), day(2)).unwrap();
        assert_eq!(stored[1].scraped_at, at(20, 0));
    }

    #[test]
    fn test_taxonomy_roundtrip_and_classification_marks() {
        let storage = Storage::in_memory().unwrap();
        assert!(storage.load_taxonomy(APP).unwrap().is_none());

        storage
            .append_reviews(&[review("a", at(1, 9)), review("b", at(1, 10))])
            .unwrap();

        let mut taxonomy = Taxonomy::seeded(APP, day(1));
        taxonomy.insert(TaxonomyEntry::discovered("Dark Mode", day(1)));
        taxonomy.add_alias("Dark Mode", "night theme");

        let assignments = vec![TopicAssignment {
            review_id: "a".into(),
            topic_name: "Dark Mode".into(),
            posted_at: at(1, 9),
        }];
        storage
            .commit_classification(&taxonomy, &assignments, &[], &["a".into()], at(2, 0))
            .unwrap();

        let loaded = storage.load_taxonomy(APP).unwrap().unwrap();
        assert_eq!(loaded.len(), 11);
        assert!(loaded.get("Dark Mode").unwrap().aliases.contains("night theme"));
        assert_eq!(loaded.get("Dark Mode").unwrap().origin, TopicOrigin::Discovered);

        let pending = storage.unclassified_in_range(APP, day(1), day(1)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "b");

        let counts = storage.topic_counts(APP, day(1), day(30)).unwrap();
        assert_eq!(counts, vec![("Dark Mode".to_string(), day(1), 1)]);
    }

    #[test]
    fn test_commit_rejects_assignment_to_unknown_topic() {
        let storage = Storage::in_memory().unwrap();
        let taxonomy = Taxonomy::new(APP);
        let assignments = vec![TopicAssignment {
            review_id: "a".into(),
            topic_name: "Ghost".into(),
            posted_at: at(1, 9),
        }];

        assert!(storage
            .commit_classification(&taxonomy, &assignments, &[], &["a".into()], at(2, 0))
            .is_err());
        assert!(storage.assignments_for(APP).unwrap().is_empty());
    }

    #[test]
    fn test_unmapped_phrases_and_classified_ids_by_day() {
        let storage = Storage::in_memory().unwrap();
        storage
            .append_reviews(&[review("a", at(1, 9)), review("b", at(1, 10)), review("c", at(2, 8))])
            .unwrap();

        let mut taxonomy = Taxonomy::new(APP);
        let mut entry = TaxonomyEntry::discovered("Dark Mode", day(1));
        entry.category = TopicCategory::Request;
        taxonomy.insert(entry);
        let assignments = vec![TopicAssignment {
            review_id: "a".into(),
            topic_name: "Dark Mode".into(),
            posted_at: at(1, 9),
        }];
        let unmapped = vec![
            UnmappedPhrase {
                review_id: "b".into(),
                phrase: "great app".into(),
                reason: UnmappedReason::Rejected,
            },
            UnmappedPhrase {
                review_id: "c".into(),
                phrase: "coupon code".into(),
                reason: UnmappedReason::TooRare,
            },
        ];
        let classified: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        storage
            .commit_classification(&taxonomy, &assignments, &unmapped, &classified, at(3, 0))
            .unwrap();

        assert_eq!(
            storage.unmapped_in_range(APP, day(1), day(1)).unwrap(),
            vec![unmapped[0].clone()]
        );
        assert_eq!(
            storage.assignments_in_range(APP, day(1), day(1)).unwrap(),
            vec![("a".to_string(), "Dark Mode".to_string())]
        );
        let ids = storage.classified_in_range(APP, day(2), day(2)).unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["c"]);

        let loaded = storage.load_taxonomy(APP).unwrap().unwrap();
        assert_eq!(loaded.get("Dark Mode").unwrap().category, TopicCategory::Request);
    }

    #[test]
    fn test_commit_removes_rows_folded_on_load() {
        let storage = Storage::in_memory().unwrap();
        storage
            .append_reviews(&[review("a", at(1, 9)), review("b", at(1, 10))])
            .unwrap();

        // two rows whose names collide once normalized, as an older store could hold
        for (name, created_at) in [("Late Delivery", "2024-07-01"), ("LATE DELIVERY!", "2024-07-02")] {
            storage
                .conn
                .execute(
                    r#"
                    INSERT INTO taxonomy_entries (app_id, canonical_name, aliases_json, created_at, origin)
                    VALUES (?1, ?2, '[]', ?3, 'Discovered')
                    "#,
                    params![APP, name, created_at],
                )
                .unwrap();
        }
        for (review_id, topic) in [("a", "LATE DELIVERY!"), ("b", "LATE DELIVERY!"), ("b", "Late Delivery")] {
            storage
                .conn
                .execute(
                    r#"
                    INSERT INTO topic_assignments (app_id, review_id, topic_name, posted_at, posted_on)
                    VALUES (?1, ?2, ?3, '2024-07-01T09:00:00.000Z', '2024-07-01')
                    "#,
                    params![APP, review_id, topic],
                )
                .unwrap();
        }

        let taxonomy = storage.load_taxonomy(APP).unwrap().unwrap();
        assert_eq!(taxonomy.len(), 1);
        storage
            .commit_classification(&taxonomy, &[], &[], &[], at(3, 0))
            .unwrap();

        let names: Vec<String> = storage
            .conn
            .prepare("SELECT canonical_name FROM taxonomy_entries WHERE app_id = ?1")
            .unwrap()
            .query_map(params![APP], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(names, vec!["Late Delivery"]);
        assert_eq!(
            storage.topic_counts(APP, day(1), day(1)).unwrap(),
            vec![("Late Delivery".to_string(), day(1), 2)]
        );
        assert!(storage.load_taxonomy(APP).unwrap().unwrap().folded().is_empty());
    }

    #[test]
    fn test_category_column_added_to_older_stores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                r#"
                CREATE TABLE taxonomy_entries (
                    app_id TEXT NOT NULL,
                    canonical_name TEXT NOT NULL,
                    aliases_json TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    origin TEXT NOT NULL,
                    description TEXT,
                    PRIMARY KEY(app_id, canonical_name)
                );
                INSERT INTO taxonomy_entries VALUES ('app', 'Dark Mode', '[]', '2024-07-01', 'Discovered', NULL);
                "#,
            )
            .unwrap();
        }

        let storage = Storage::open(&path).unwrap();
        let taxonomy = storage.load_taxonomy("app").unwrap().unwrap();
        assert_eq!(taxonomy.get("Dark Mode").unwrap().category, TopicCategory::Issue);
    }

    #[test]
    fn test_unreadable_file_is_corrupt_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        std::fs::write(&path, vec![0x5a; 4096]).unwrap();

        assert!(matches!(Storage::open(&path), Err(Error::CorruptState(_))));
    }

    #[test]
    fn test_open_for_app_persists_between_handles() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = Storage::open_for_app(dir.path(), APP).unwrap();
            storage.append_reviews(&[review("a", at(1, 9))]).unwrap();
        }
        let storage = Storage::open_for_app(dir.path(), APP).unwrap();
        assert_eq!(storage.review_count(APP).unwrap(), 1);
        assert!(Storage::path_for_app(dir.path(), APP).exists());
    }
}
