// ============================================================================
// Appointment Routes
// ============================================================================
//
// Endpoints:
// - GET /api/appointments/availability - ?date=YYYY-MM-DD or ?from=..&to=..
// - POST /api/appointments - Public booking
// - GET /api/appointments - Bookings (appointments:read)
// - GET /api/appointments/:id - Single booking (appointments:read)
// - PUT /api/appointments/:id - Change status (appointments:write)
// - DELETE /api/appointments/:id - Delete (appointments:write)
// - GET /api/appointments/slots - All slots (appointments:read)
// - POST /api/appointments/slots - Create slot (appointments:write)
// - PUT /api/appointments/slots/:id - Update slot (appointments:write)
// - DELETE /api/appointments/slots/:id - Delete or deactivate (appointments:write)
//
// ============================================================================

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::scopes;
use crate::availability::{self, DayAvailability};
use crate::context::AppContext;
use crate::db::appointments::{
    self, Appointment, AppointmentFilter, AppointmentSlot, AppointmentStatus, BookingRejection,
    BookingRequest, SlotData, SlotRemoval,
};
use crate::error::{AppError, AppResult};
use crate::pagination::{PageParams, Paginated};
use crate::routes::extractors::{Authenticated, JsonBody, QueryParams};
use crate::routes::{non_empty, parse_status};
use crate::utils::{is_valid_email, log_safe_id, validate_length};

const MAX_SLOT_CAPACITY: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: Option<NaiveDate>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AvailabilityResponse {
    Day(DayAvailability),
    Range(Vec<DayAvailability>),
}

#[derive(Debug, Deserialize)]
pub struct BookingInput {
    pub slot_id: u64,
    pub date: NaiveDate,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListAppointmentsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

/// Slot body. Absent fields keep their current value on update.
#[derive(Debug, Default, Deserialize)]
pub struct SlotInput {
    pub is_recurring: Option<bool>,
    pub day_of_week: Option<u8>,
    pub specific_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub capacity: Option<u32>,
    pub is_active: Option<bool>,
}

fn rejection_to_error(rejection: BookingRejection) -> AppError {
    let message = rejection.to_string();
    match rejection {
        BookingRejection::SlotNotFound(_) => AppError::NotFound(message),
        BookingRejection::SlotNotOffered(_) | BookingRejection::DateInPast => {
            AppError::Validation(message)
        }
        BookingRejection::SlotFull => AppError::Conflict(message),
    }
}

fn validate_booking(input: BookingInput) -> AppResult<BookingRequest> {
    let name = input.name.trim().to_string();
    validate_length("name", &name, 1, 100).map_err(AppError::Validation)?;

    let email = input.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::validation("email is not a valid e-mail address"));
    }

    let phone = input.phone.and_then(non_empty);
    if let Some(phone) = &phone {
        validate_length("phone", phone, 1, 30).map_err(AppError::Validation)?;
    }
    let notes = input.notes.and_then(non_empty);
    if let Some(notes) = &notes {
        validate_length("notes", notes, 1, 1000).map_err(AppError::Validation)?;
    }

    Ok(BookingRequest {
        slot_id: input.slot_id,
        date: input.date,
        name,
        email,
        phone,
        notes,
    })
}

/// Merge the input over `existing` and check the slot shape.
fn build_slot(input: SlotInput, existing: Option<&AppointmentSlot>) -> AppResult<SlotData> {
    let is_recurring = input
        .is_recurring
        .or_else(|| existing.map(|s| s.is_recurring))
        .unwrap_or(true);

    let (day_of_week, specific_date) = if is_recurring {
        let day = input.day_of_week.or_else(|| existing.and_then(|s| s.day_of_week));
        match day {
            Some(day) if day <= 6 => (Some(day), None),
            Some(_) => {
                return Err(AppError::validation(
                    "day_of_week must be between 0 (Sunday) and 6 (Saturday)",
                ));
            }
            None => {
                return Err(AppError::validation(
                    "day_of_week is required for recurring slots",
                ));
            }
        }
    } else {
        let date = input
            .specific_date
            .or_else(|| existing.and_then(|s| s.specific_date));
        match date {
            Some(date) => (None, Some(date)),
            None => {
                return Err(AppError::validation(
                    "specific_date is required for one-off slots",
                ));
            }
        }
    };

    let start_time = input
        .start_time
        .or_else(|| existing.map(|s| s.start_time))
        .ok_or_else(|| AppError::validation("start_time is required"))?;
    let end_time = input
        .end_time
        .or_else(|| existing.map(|s| s.end_time))
        .ok_or_else(|| AppError::validation("end_time is required"))?;
    if start_time >= end_time {
        return Err(AppError::validation("start_time must be before end_time"));
    }

    let capacity = input
        .capacity
        .or_else(|| existing.map(|s| s.capacity))
        .unwrap_or(1);
    if !(1..=MAX_SLOT_CAPACITY).contains(&capacity) {
        return Err(AppError::validation(format!(
            "capacity must be between 1 and {}",
            MAX_SLOT_CAPACITY
        )));
    }

    Ok(SlotData {
        is_recurring,
        day_of_week,
        specific_date,
        start_time,
        end_time,
        capacity,
        is_active: input
            .is_active
            .or_else(|| existing.map(|s| s.is_active))
            .unwrap_or(true),
    })
}

/// Resolve the query into an inclusive date range, `None` for a single day.
fn requested_range(
    query: &AvailabilityQuery,
) -> AppResult<(NaiveDate, Option<NaiveDate>)> {
    match (query.date, query.from, query.to) {
        (Some(date), None, None) => Ok((date, None)),
        (None, Some(from), Some(to)) => {
            availability::validate_range(from, to).map_err(AppError::Validation)?;
            Ok((from, Some(to)))
        }
        _ => Err(AppError::validation(
            "provide either 'date' or both 'from' and 'to'",
        )),
    }
}

// ---------------------------------------------------------------------------
// Public
// ---------------------------------------------------------------------------

/// GET /api/appointments/availability
pub async fn get_availability(
    State(ctx): State<Arc<AppContext>>,
    QueryParams(query): QueryParams<AvailabilityQuery>,
) -> AppResult<Json<AvailabilityResponse>> {
    let (from, to) = requested_range(&query)?;
    let last = to.unwrap_or(from);
    let today = Utc::now().date_naive();

    let (slots, counts) = ctx
        .db
        .run("appointments.availability", |pool| async move {
            let slots = appointments::slots_for_range(&pool, from, last).await?;
            let counts = appointments::booked_counts(&pool, from, last).await?;
            Ok((slots, counts))
        })
        .await?;

    let response = match to {
        None => AvailabilityResponse::Day(availability::compute_availability(
            from, today, &slots, &counts,
        )),
        Some(to) => AvailabilityResponse::Range(availability::compute_range(
            from, to, today, &slots, &counts,
        )),
    };
    Ok(Json(response))
}

/// POST /api/appointments
pub async fn book(
    State(ctx): State<Arc<AppContext>>,
    JsonBody(input): JsonBody<BookingInput>,
) -> AppResult<(StatusCode, Json<Appointment>)> {
    let request = validate_booking(input)?;
    let today = Utc::now().date_naive();

    let id = ctx
        .db
        .run_write("appointments.book", |pool| {
            let request = &request;
            async move { appointments::book(&pool, request, today).await }
        })
        .await?
        .map_err(rejection_to_error)?;
    let appointment = ctx
        .db
        .run("appointments.get", |pool| async move {
            appointments::get(&pool, id).await
        })
        .await?
        .ok_or_else(|| AppError::internal("appointment missing after booking"))?;

    tracing::info!(
        appointment_id = appointment.id,
        slot_id = appointment.slot_id,
        date = %appointment.appointment_date,
        email_hash = %log_safe_id(&appointment.email, &ctx.config.logging.hash_salt),
        "Appointment booked"
    );
    Ok((StatusCode::CREATED, Json(appointment)))
}

// ---------------------------------------------------------------------------
// Admin: bookings
// ---------------------------------------------------------------------------

/// GET /api/appointments
pub async fn list_appointments(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    QueryParams(query): QueryParams<ListAppointmentsQuery>,
) -> AppResult<Json<Paginated<Appointment>>> {
    principal.require_scope(scopes::APPOINTMENTS_READ)?;
    let filter = AppointmentFilter {
        status: parse_status(query.status)?,
        date: query.date,
    };
    let params = PageParams::new(query.page, query.limit);

    let (items, total) = ctx
        .db
        .run("appointments.list", |pool| async move {
            let items = appointments::list(&pool, filter, params.limit, params.offset()).await?;
            let total = appointments::count(&pool, filter).await?;
            Ok((items, total))
        })
        .await?;

    Ok(Json(Paginated::new(items, params, total)))
}

/// GET /api/appointments/:id
pub async fn get_appointment(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<u64>,
) -> AppResult<Json<Appointment>> {
    principal.require_scope(scopes::APPOINTMENTS_READ)?;
    let appointment = ctx
        .db
        .run("appointments.get", |pool| async move {
            appointments::get(&pool, id).await
        })
        .await?
        .ok_or_else(|| AppError::not_found(format!("appointment {}", id)))?;
    Ok(Json(appointment))
}

/// PUT /api/appointments/:id
pub async fn update_appointment(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<u64>,
    JsonBody(update): JsonBody<StatusUpdate>,
) -> AppResult<Json<Appointment>> {
    principal.require_scope(scopes::APPOINTMENTS_WRITE)?;
    let status: AppointmentStatus = update.status.trim().parse().map_err(AppError::Validation)?;

    let appointment = ctx
        .db
        .run("appointments.update_status", |pool| async move {
            appointments::update_status(&pool, id, status).await
        })
        .await?
        .ok_or_else(|| AppError::not_found(format!("appointment {}", id)))?;

    tracing::info!(appointment_id = id, status = %status, "Appointment status changed");
    Ok(Json(appointment))
}

/// DELETE /api/appointments/:id
pub async fn delete_appointment(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<u64>,
) -> AppResult<StatusCode> {
    principal.require_scope(scopes::APPOINTMENTS_WRITE)?;
    let deleted = ctx
        .db
        .run_write("appointments.delete", |pool| async move {
            appointments::delete(&pool, id).await
        })
        .await?;
    if !deleted {
        return Err(AppError::not_found(format!("appointment {}", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Admin: slots
// ---------------------------------------------------------------------------

/// GET /api/appointments/slots
pub async fn list_slots(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
) -> AppResult<Json<Vec<AppointmentSlot>>> {
    principal.require_scope(scopes::APPOINTMENTS_READ)?;
    let slots = ctx
        .db
        .run("appointments.list_slots", |pool| async move {
            appointments::list_slots(&pool).await
        })
        .await?;
    Ok(Json(slots))
}

/// POST /api/appointments/slots
pub async fn create_slot(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    JsonBody(input): JsonBody<SlotInput>,
) -> AppResult<(StatusCode, Json<AppointmentSlot>)> {
    principal.require_scope(scopes::APPOINTMENTS_WRITE)?;
    let data = build_slot(input, None)?;

    let id = ctx
        .db
        .run_write("appointments.create_slot", |pool| {
            let data = &data;
            async move { appointments::create_slot(&pool, data).await }
        })
        .await?;
    let slot = ctx
        .db
        .run("appointments.get_slot", |pool| async move {
            appointments::get_slot(&pool, id).await
        })
        .await?
        .ok_or_else(|| AppError::internal("slot missing after insert"))?;

    tracing::info!(slot_id = slot.id, recurring = slot.is_recurring, "Appointment slot created");
    Ok((StatusCode::CREATED, Json(slot)))
}

/// PUT /api/appointments/slots/:id
pub async fn update_slot(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<u64>,
    JsonBody(input): JsonBody<SlotInput>,
) -> AppResult<Json<AppointmentSlot>> {
    principal.require_scope(scopes::APPOINTMENTS_WRITE)?;

    let existing = ctx
        .db
        .run("appointments.get_slot", |pool| async move {
            appointments::get_slot(&pool, id).await
        })
        .await?
        .ok_or_else(|| AppError::not_found(format!("slot {}", id)))?;

    let data = build_slot(input, Some(&existing))?;

    let slot = ctx
        .db
        .run("appointments.update_slot", |pool| {
            let data = &data;
            async move { appointments::update_slot(&pool, id, data).await }
        })
        .await?
        .ok_or_else(|| AppError::not_found(format!("slot {}", id)))?;

    Ok(Json(slot))
}

/// DELETE /api/appointments/slots/:id
pub async fn delete_slot(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<u64>,
) -> AppResult<StatusCode> {
    principal.require_scope(scopes::APPOINTMENTS_WRITE)?;
    let removal = ctx
        .db
        .run_write("appointments.remove_slot", |pool| async move {
            appointments::remove_slot(&pool, id).await
        })
        .await?;

    match removal {
        SlotRemoval::NotFound => Err(AppError::not_found(format!("slot {}", id))),
        SlotRemoval::Deactivated => {
            tracing::info!(slot_id = id, "Slot has bookings, deactivated instead of deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        SlotRemoval::Deleted => {
            tracing::info!(slot_id = id, "Appointment slot deleted");
            Ok(StatusCode::NO_CONTENT)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn recurring(day: u8) -> SlotInput {
        SlotInput {
            is_recurring: Some(true),
            day_of_week: Some(day),
            start_time: Some(time(9)),
            end_time: Some(time(10)),
            ..SlotInput::default()
        }
    }

    #[test]
    fn test_recurring_slot_defaults() {
        let data = build_slot(recurring(1), None).unwrap();
        assert_eq!(data.day_of_week, Some(1));
        assert_eq!(data.specific_date, None);
        assert_eq!(data.capacity, 1);
        assert!(data.is_active);
    }

    #[test]
    fn test_slot_shape_is_checked() {
        assert!(build_slot(recurring(7), None).is_err());

        let mut backwards = recurring(1);
        backwards.end_time = Some(time(8));
        assert!(build_slot(backwards, None).is_err());

        let mut empty = recurring(1);
        empty.capacity = Some(0);
        assert!(build_slot(empty, None).is_err());

        let one_off = SlotInput {
            is_recurring: Some(false),
            ..recurring(1)
        };
        let err = build_slot(one_off, None).unwrap_err();
        assert!(err.to_string().contains("specific_date"));
    }

    #[test]
    fn test_one_off_slot_drops_weekday() {
        let input = SlotInput {
            is_recurring: Some(false),
            specific_date: Some(date(2030, 1, 7)),
            ..recurring(3)
        };
        let data = build_slot(input, None).unwrap();
        assert_eq!(data.day_of_week, None);
        assert_eq!(data.specific_date, Some(date(2030, 1, 7)));
    }

    #[test]
    fn test_rejections_map_to_statuses() {
        assert_eq!(
            rejection_to_error(BookingRejection::SlotNotFound(4)).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            rejection_to_error(BookingRejection::DateInPast).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            rejection_to_error(BookingRejection::SlotNotOffered(date(2030, 1, 8))).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            rejection_to_error(BookingRejection::SlotFull).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_requested_range() {
        let single = AvailabilityQuery {
            date: Some(date(2030, 1, 7)),
            from: None,
            to: None,
        };
        assert_eq!(requested_range(&single).unwrap(), (date(2030, 1, 7), None));

        let range = AvailabilityQuery {
            date: None,
            from: Some(date(2030, 1, 7)),
            to: Some(date(2030, 1, 13)),
        };
        assert_eq!(
            requested_range(&range).unwrap(),
            (date(2030, 1, 7), Some(date(2030, 1, 13)))
        );

        let too_long = AvailabilityQuery {
            date: None,
            from: Some(date(2030, 1, 1)),
            to: Some(date(2030, 3, 1)),
        };
        assert!(requested_range(&too_long).is_err());

        let neither = AvailabilityQuery {
            date: None,
            from: None,
            to: None,
        };
        assert!(requested_range(&neither).is_err());
    }

    #[test]
    fn test_booking_validation() {
        let input = BookingInput {
            slot_id: 1,
            date: date(2030, 1, 7),
            name: "Linus".into(),
            email: "LINUS@example.com".into(),
            phone: Some("".into()),
            notes: None,
        };
        let request = validate_booking(input).unwrap();
        assert_eq!(request.email, "linus@example.com");
        assert_eq!(request.phone, None);
    }
}
