use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::time::Duration;

pub mod models;

use models::{Activity, ClaimDetails, Coordinates, DonationStatus, FoodDonation};

pub type DbPool = Pool<SqliteConnectionManager>;

const SCHEMA: &str = include_str!("../../migrations/init.sql");

const DONATION_COLUMNS: &str = "id, food_type, description, donor_id, donor_name, pickup_location, \
    latitude, longitude, quantity, quantity_unit, nutrition_tags, expires_at, status, \
    claimed_by, claimer_id, pickup_date, pickup_time, claimed_at, delivered_at, created_at";

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("connection pool: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Outcome of a guarded status change.
#[derive(Debug)]
pub enum Transition {
    Applied(FoodDonation),
    NotFound,
    Rejected(DonationStatus),
    NotClaimer,
}

pub async fn init_pool(path: &str) -> anyhow::Result<DbPool> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
    });
    let pool = Pool::builder()
        .max_size(8)
        .connection_timeout(Duration::from_secs(30))
        .build(manager)
        .map_err(|e| anyhow::anyhow!("Failed to create DB pool: {}", e))?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Applies the bundled schema. Every statement is idempotent.
pub async fn migrate(pool: &DbPool) -> Result<(), DbError> {
    with_conn(pool, |conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
    })
    .await
}

async fn with_conn<T, F>(pool: &DbPool, f: F) -> Result<T, DbError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, DbError> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        f(&conn)
    })
    .await?
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

fn donation_from_row(row: &Row<'_>) -> rusqlite::Result<FoodDonation> {
    let latitude: Option<f64> = row.get(6)?;
    let longitude: Option<f64> = row.get(7)?;
    let tags_json: String = row.get(10)?;
    let nutrition_tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| conversion_error(10, e.to_string()))?;
    let expires_at: NaiveDateTime = row.get(11)?;
    let status_raw: String = row.get(12)?;
    let status = status_raw.parse::<DonationStatus>().map_err(|e| conversion_error(12, e))?;

    let claim = match (
        row.get::<_, Option<String>>(13)?,
        row.get::<_, Option<String>>(14)?,
        row.get::<_, Option<NaiveDate>>(15)?,
        row.get::<_, Option<NaiveTime>>(16)?,
        row.get::<_, Option<DateTime<Utc>>>(17)?,
    ) {
        (Some(claimed_by), Some(claimer_id), Some(pickup_date), Some(pickup_time), Some(claimed_at)) => {
            Some(ClaimDetails { claimed_by, claimer_id, pickup_date, pickup_time, claimed_at })
        }
        _ => None,
    };

    Ok(FoodDonation {
        id: row.get(0)?,
        food_type: row.get(1)?,
        description: row.get(2)?,
        donor_id: row.get(3)?,
        donor_name: row.get(4)?,
        pickup_location: row.get(5)?,
        coordinates: match (latitude, longitude) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => None,
        },
        quantity: row.get(8)?,
        quantity_unit: row.get(9)?,
        nutrition_tags,
        expiration_date: expires_at.date(),
        expiration_time: expires_at.time(),
        status,
        claim,
        delivered_at: row.get(18)?,
        created_at: row.get(19)?,
    })
}

/// `tail_sql` follows the ORDER BY clause, e.g. `LIMIT ?1`.
fn query_donations(
    conn: &Connection,
    filter_sql: &str,
    tail_sql: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<FoodDonation>, DbError> {
    let sql = format!(
        "SELECT {} FROM donations {} ORDER BY created_at DESC, rowid DESC {}",
        DONATION_COLUMNS, filter_sql, tail_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args, donation_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn fetch_donation(conn: &Connection, id: &str) -> Result<Option<FoodDonation>, DbError> {
    let sql = format!("SELECT {} FROM donations WHERE id = ?1", DONATION_COLUMNS);
    Ok(conn.query_row(&sql, params![id], donation_from_row).optional()?)
}

pub async fn add_donation(pool: &DbPool, donation: &FoodDonation) -> Result<(), DbError> {
    let d = donation.clone();
    with_conn(pool, move |conn| {
        let tags = serde_json::to_string(&d.nutrition_tags)?;
        conn.execute(
            "INSERT INTO donations (id, food_type, description, donor_id, donor_name, pickup_location, \
             latitude, longitude, quantity, quantity_unit, nutrition_tags, expires_at, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                d.id,
                d.food_type,
                d.description,
                d.donor_id,
                d.donor_name,
                d.pickup_location,
                d.coordinates.map(|c| c.lat),
                d.coordinates.map(|c| c.lng),
                d.quantity,
                d.quantity_unit,
                tags,
                d.expires_at(),
                d.status.as_str(),
                d.created_at,
            ],
        )?;
        Ok(())
    })
    .await
}

pub async fn get_donation(pool: &DbPool, id: &str) -> Result<Option<FoodDonation>, DbError> {
    let id = id.to_string();
    with_conn(pool, move |conn| fetch_donation(conn, &id)).await
}

/// Every listing, newest first.
pub async fn list_donations(pool: &DbPool) -> Result<Vec<FoodDonation>, DbError> {
    with_conn(pool, |conn| query_donations(conn, "", "", &[])).await
}

pub async fn list_donations_by_status(pool: &DbPool, status: DonationStatus) -> Result<Vec<FoodDonation>, DbError> {
    with_conn(pool, move |conn| {
        query_donations(conn, "WHERE status = ?1", "", &[&status.as_str()])
    })
    .await
}

pub async fn list_recent_donations(pool: &DbPool, limit: usize) -> Result<Vec<FoodDonation>, DbError> {
    let limit = limit as i64;
    with_conn(pool, move |conn| query_donations(conn, "", "LIMIT ?1", &[&limit])).await
}

pub async fn list_donations_by_donor(pool: &DbPool, donor_id: &str) -> Result<Vec<FoodDonation>, DbError> {
    let donor_id = donor_id.to_string();
    with_conn(pool, move |conn| {
        query_donations(conn, "WHERE donor_id = ?1", "", &[&donor_id])
    })
    .await
}

pub async fn list_donations_by_claimer(pool: &DbPool, claimer_id: &str) -> Result<Vec<FoodDonation>, DbError> {
    let claimer_id = claimer_id.to_string();
    with_conn(pool, move |conn| {
        query_donations(conn, "WHERE claimer_id = ?1", "", &[&claimer_id])
    })
    .await
}

/// Claims a listing only while it is still `available`. Concurrent claimers
/// race on the conditional update and exactly one of them wins.
pub async fn claim_donation(pool: &DbPool, id: &str, claim: &ClaimDetails) -> Result<Transition, DbError> {
    let id = id.to_string();
    let claim = claim.clone();
    with_conn(pool, move |conn| {
        let changed = conn.execute(
            "UPDATE donations SET status = 'claimed', claimed_by = ?2, claimer_id = ?3, \
             pickup_date = ?4, pickup_time = ?5, claimed_at = ?6 \
             WHERE id = ?1 AND status = 'available'",
            params![
                id,
                claim.claimed_by,
                claim.claimer_id,
                claim.pickup_date,
                claim.pickup_time,
                claim.claimed_at,
            ],
        )?;

        match fetch_donation(conn, &id)? {
            None => Ok(Transition::NotFound),
            Some(d) if changed == 1 => Ok(Transition::Applied(d)),
            Some(d) => Ok(Transition::Rejected(d.status)),
        }
    })
    .await
}

pub async fn deliver_donation(
    pool: &DbPool,
    id: &str,
    claimer_id: &str,
    delivered_at: DateTime<Utc>,
) -> Result<Transition, DbError> {
    let id = id.to_string();
    let claimer_id = claimer_id.to_string();
    with_conn(pool, move |conn| {
        let changed = conn.execute(
            "UPDATE donations SET status = 'delivered', delivered_at = ?3 \
             WHERE id = ?1 AND status = 'claimed' AND claimer_id = ?2",
            params![id, claimer_id, delivered_at],
        )?;

        match fetch_donation(conn, &id)? {
            None => Ok(Transition::NotFound),
            Some(d) if changed == 1 => Ok(Transition::Applied(d)),
            Some(d) if d.status.can_transition_to(DonationStatus::Delivered) => Ok(Transition::NotClaimer),
            Some(d) => Ok(Transition::Rejected(d.status)),
        }
    })
    .await
}

/// Marks available listings whose local expiry is before `now` as expired.
pub async fn expire_overdue(pool: &DbPool, now: NaiveDateTime) -> Result<usize, DbError> {
    with_conn(pool, move |conn| {
        let changed = conn.execute(
            "UPDATE donations SET status = 'expired' WHERE status = 'available' AND expires_at < ?1",
            params![now],
        )?;
        Ok(changed)
    })
    .await
}

pub async fn log_activity(pool: &DbPool, activity: &Activity) -> Result<(), DbError> {
    let a = activity.clone();
    with_conn(pool, move |conn| {
        conn.execute(
            "INSERT INTO activities (id, user_id, kind, description, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![a.id, a.user_id, a.kind.as_str(), a.description, a.created_at],
        )?;
        Ok(())
    })
    .await
}

pub async fn list_activities(pool: &DbPool, user_id: &str, limit: usize) -> Result<Vec<Activity>, DbError> {
    let user_id = user_id.to_string();
    with_conn(pool, move |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, kind, description, created_at FROM activities \
             WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            let kind_raw: String = row.get(2)?;
            Ok(Activity {
                id: row.get(0)?,
                user_id: row.get(1)?,
                kind: kind_raw.parse().map_err(|e| conversion_error(2, e))?,
                description: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
    .await
}
