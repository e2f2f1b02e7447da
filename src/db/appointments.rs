use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{MySql, QueryBuilder};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::DbPool;

const SLOT_COLUMNS: &str = "id, is_recurring, day_of_week, specific_date, start_time, end_time, \
                            capacity, is_active, created_at";

const APPOINTMENT_COLUMNS: &str = "a.id, a.slot_id, a.appointment_date, s.start_time, s.end_time, \
                                   a.name, a.email, a.phone, a.notes, a.status, a.created_at, \
                                   a.updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            other => Err(format!(
                "invalid status '{}', expected one of: pending, confirmed, cancelled, completed",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AppointmentSlot {
    pub id: u64,
    pub is_recurring: bool,
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: Option<u8>,
    pub specific_date: Option<NaiveDate>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

impl AppointmentSlot {
    /// Whether the slot is offered on `date`, ignoring `is_active`
    pub fn applies_to(&self, date: NaiveDate) -> bool {
        if self.is_recurring {
            self.day_of_week == Some(day_of_week(date))
        } else {
            self.specific_date == Some(date)
        }
    }
}

#[derive(Debug, Clone)]
pub struct SlotData {
    pub is_recurring: bool,
    pub day_of_week: Option<u8>,
    pub specific_date: Option<NaiveDate>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: u32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Appointment {
    pub id: u64,
    pub slot_id: u64,
    pub appointment_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub slot_id: u64,
    pub date: NaiveDate,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

/// Booking refused for a reason the caller can act on
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingRejection {
    #[error("slot {0} does not exist")]
    SlotNotFound(u64),
    #[error("slot is not offered on {0}")]
    SlotNotOffered(NaiveDate),
    #[error("cannot book a date in the past")]
    DateInPast,
    #[error("slot is fully booked")]
    SlotFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRemoval {
    Deleted,
    Deactivated,
    NotFound,
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

/// Active slots offered on `date`
pub async fn slots_for_date(
    pool: &DbPool,
    date: NaiveDate,
) -> Result<Vec<AppointmentSlot>, sqlx::Error> {
    sqlx::query_as::<_, AppointmentSlot>(&format!(
        r#"
        SELECT {SLOT_COLUMNS}
        FROM appointment_slots
        WHERE is_active = TRUE
          AND ((is_recurring = TRUE AND day_of_week = ?)
               OR (is_recurring = FALSE AND specific_date = ?))
        ORDER BY start_time
        "#
    ))
    .bind(day_of_week(date))
    .bind(date)
    .fetch_all(pool)
    .await
}

/// Active slots that can apply to any day in `from..=to`
pub async fn slots_for_range(
    pool: &DbPool,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<AppointmentSlot>, sqlx::Error> {
    sqlx::query_as::<_, AppointmentSlot>(&format!(
        r#"
        SELECT {SLOT_COLUMNS}
        FROM appointment_slots
        WHERE is_active = TRUE
          AND (is_recurring = TRUE OR specific_date BETWEEN ? AND ?)
        ORDER BY start_time
        "#
    ))
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
}

/// Non-cancelled bookings per (slot, date) in `from..=to`
pub async fn booked_counts(
    pool: &DbPool,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<HashMap<(u64, NaiveDate), u32>, sqlx::Error> {
    let rows: Vec<(u64, NaiveDate, i64)> = sqlx::query_as(
        r#"
        SELECT slot_id, appointment_date, COUNT(*)
        FROM appointments
        WHERE appointment_date BETWEEN ? AND ? AND status <> ?
        GROUP BY slot_id, appointment_date
        "#,
    )
    .bind(from)
    .bind(to)
    .bind(AppointmentStatus::Cancelled.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(slot_id, date, booked)| ((slot_id, date), booked.max(0) as u32))
        .collect())
}

pub async fn list_slots(pool: &DbPool) -> Result<Vec<AppointmentSlot>, sqlx::Error> {
    sqlx::query_as::<_, AppointmentSlot>(&format!(
        r#"
        SELECT {SLOT_COLUMNS}
        FROM appointment_slots
        ORDER BY is_recurring DESC, day_of_week, specific_date, start_time
        "#
    ))
    .fetch_all(pool)
    .await
}

pub async fn get_slot(pool: &DbPool, id: u64) -> Result<Option<AppointmentSlot>, sqlx::Error> {
    sqlx::query_as::<_, AppointmentSlot>(&format!(
        "SELECT {SLOT_COLUMNS} FROM appointment_slots WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn create_slot(pool: &DbPool, data: &SlotData) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO appointment_slots
            (is_recurring, day_of_week, specific_date, start_time, end_time, capacity, is_active)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(data.is_recurring)
    .bind(data.day_of_week)
    .bind(data.specific_date)
    .bind(data.start_time)
    .bind(data.end_time)
    .bind(data.capacity)
    .bind(data.is_active)
    .execute(pool)
    .await?;

    Ok(result.last_insert_id())
}

pub async fn update_slot(
    pool: &DbPool,
    id: u64,
    data: &SlotData,
) -> Result<Option<AppointmentSlot>, sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE appointment_slots
        SET is_recurring = ?, day_of_week = ?, specific_date = ?, start_time = ?,
            end_time = ?, capacity = ?, is_active = ?
        WHERE id = ?
        "#,
    )
    .bind(data.is_recurring)
    .bind(data.day_of_week)
    .bind(data.specific_date)
    .bind(data.start_time)
    .bind(data.end_time)
    .bind(data.capacity)
    .bind(data.is_active)
    .bind(id)
    .execute(pool)
    .await?;

    get_slot(pool, id).await
}

/// Slots with bookings are deactivated so appointment history stays intact.
pub async fn remove_slot(pool: &DbPool, id: u64) -> Result<SlotRemoval, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let exists: Option<u64> =
        sqlx::query_scalar("SELECT id FROM appointment_slots WHERE id = ? FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
    if exists.is_none() {
        return Ok(SlotRemoval::NotFound);
    }

    let references: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM appointments WHERE slot_id = ?")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

    let removal = if references > 0 {
        sqlx::query("UPDATE appointment_slots SET is_active = FALSE WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        SlotRemoval::Deactivated
    } else {
        sqlx::query("DELETE FROM appointment_slots WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        SlotRemoval::Deleted
    };

    tx.commit().await?;
    Ok(removal)
}

// ---------------------------------------------------------------------------
// Appointments
// ---------------------------------------------------------------------------

/// Books inside a transaction holding the slot row lock, so concurrent
/// requests for the last seat serialize on the slot. Returns the new
/// appointment id.
pub async fn book(
    pool: &DbPool,
    request: &BookingRequest,
    today: NaiveDate,
) -> Result<Result<u64, BookingRejection>, sqlx::Error> {
    if request.date < today {
        return Ok(Err(BookingRejection::DateInPast));
    }

    let mut tx = pool.begin().await?;

    let slot = sqlx::query_as::<_, AppointmentSlot>(&format!(
        "SELECT {SLOT_COLUMNS} FROM appointment_slots WHERE id = ? FOR UPDATE"
    ))
    .bind(request.slot_id)
    .fetch_optional(&mut *tx)
    .await?;

    let slot = match slot {
        Some(slot) if slot.is_active => slot,
        _ => return Ok(Err(BookingRejection::SlotNotFound(request.slot_id))),
    };
    if !slot.applies_to(request.date) {
        return Ok(Err(BookingRejection::SlotNotOffered(request.date)));
    }

    let booked: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM appointments
        WHERE slot_id = ? AND appointment_date = ? AND status <> ?
        "#,
    )
    .bind(slot.id)
    .bind(request.date)
    .bind(AppointmentStatus::Cancelled.as_str())
    .fetch_one(&mut *tx)
    .await?;

    if booked >= i64::from(slot.capacity) {
        return Ok(Err(BookingRejection::SlotFull));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO appointments (slot_id, appointment_date, name, email, phone, notes, status)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(slot.id)
    .bind(request.date)
    .bind(&request.name)
    .bind(&request.email)
    .bind(&request.phone)
    .bind(&request.notes)
    .bind(AppointmentStatus::Pending.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Ok(result.last_insert_id()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AppointmentFilter {
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
}

fn push_filters(qb: &mut QueryBuilder<'_, MySql>, filter: AppointmentFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(status) = filter.status {
        qb.push(" AND a.status = ").push_bind(status.as_str());
    }
    if let Some(date) = filter.date {
        qb.push(" AND a.appointment_date = ").push_bind(date);
    }
}

pub async fn list(
    pool: &DbPool,
    filter: AppointmentFilter,
    limit: u32,
    offset: u64,
) -> Result<Vec<Appointment>, sqlx::Error> {
    let mut qb = QueryBuilder::<MySql>::new(format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments a \
         JOIN appointment_slots s ON s.id = a.slot_id"
    ));
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY a.appointment_date DESC, s.start_time ASC, a.id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    qb.build_query_as::<Appointment>().fetch_all(pool).await
}

pub async fn count(pool: &DbPool, filter: AppointmentFilter) -> Result<i64, sqlx::Error> {
    let mut qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM appointments a");
    push_filters(&mut qb, filter);
    qb.build_query_scalar::<i64>().fetch_one(pool).await
}

pub async fn get(pool: &DbPool, id: u64) -> Result<Option<Appointment>, sqlx::Error> {
    sqlx::query_as::<_, Appointment>(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments a \
         JOIN appointment_slots s ON s.id = a.slot_id WHERE a.id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn update_status(
    pool: &DbPool,
    id: u64,
    status: AppointmentStatus,
) -> Result<Option<Appointment>, sqlx::Error> {
    sqlx::query("UPDATE appointments SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await?;

    get(pool, id).await
}

pub async fn delete(pool: &DbPool, id: u64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM appointments WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(is_recurring: bool, day_of_week: Option<u8>, specific_date: Option<NaiveDate>) -> AppointmentSlot {
        AppointmentSlot {
            id: 1,
            is_recurring,
            day_of_week,
            specific_date,
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            capacity: 1,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_day_of_week_starts_on_sunday() {
        // 2024-06-02 was a Sunday
        let sunday = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        assert_eq!(day_of_week(sunday), 0);
        assert_eq!(day_of_week(sunday.succ_opt().unwrap()), 1);
    }

    #[test]
    fn test_recurring_slot_applies_by_weekday() {
        let monday = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let recurring = slot(true, Some(1), None);
        assert!(recurring.applies_to(monday));
        assert!(!recurring.applies_to(monday.succ_opt().unwrap()));
    }

    #[test]
    fn test_one_off_slot_applies_to_its_date_only() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let one_off = slot(false, None, Some(date));
        assert!(one_off.applies_to(date));
        assert!(!one_off.applies_to(date.succ_opt().unwrap()));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(
            "confirmed".parse::<AppointmentStatus>(),
            Ok(AppointmentStatus::Confirmed)
        );
        assert!("done".parse::<AppointmentStatus>().is_err());
    }
}
