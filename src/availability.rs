//! Appointment availability.
//!
//! Pure computation over slots and booking counts; the SQL that feeds it
//! lives in `db::appointments`.

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use std::collections::HashMap;

use crate::db::appointments::AppointmentSlot;

/// Longest range accepted by the availability endpoint, inclusive
pub const MAX_RANGE_DAYS: i64 = 31;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotAvailability {
    pub slot_id: u64,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: u32,
    pub booked: u32,
    pub available: u32,
    pub bookable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub slots: Vec<SlotAvailability>,
}

/// Availability of every active slot offered on `date`, ordered by start time.
///
/// `booked_counts` maps (slot id, date) to non-cancelled bookings. Dates
/// before `today` have no availability.
pub fn compute_availability(
    date: NaiveDate,
    today: NaiveDate,
    slots: &[AppointmentSlot],
    booked_counts: &HashMap<(u64, NaiveDate), u32>,
) -> DayAvailability {
    if date < today {
        return DayAvailability {
            date,
            slots: Vec::new(),
        };
    }

    let mut day_slots: Vec<SlotAvailability> = slots
        .iter()
        .filter(|slot| slot.is_active && slot.applies_to(date))
        .map(|slot| {
            let booked = booked_counts.get(&(slot.id, date)).copied().unwrap_or(0);
            let available = slot.capacity.saturating_sub(booked);
            SlotAvailability {
                slot_id: slot.id,
                start_time: slot.start_time,
                end_time: slot.end_time,
                capacity: slot.capacity,
                booked,
                available,
                bookable: available > 0,
            }
        })
        .collect();
    day_slots.sort_by_key(|s| (s.start_time, s.slot_id));

    DayAvailability {
        date,
        slots: day_slots,
    }
}

/// One entry per day in `from..=to`
pub fn compute_range(
    from: NaiveDate,
    to: NaiveDate,
    today: NaiveDate,
    slots: &[AppointmentSlot],
    booked_counts: &HashMap<(u64, NaiveDate), u32>,
) -> Vec<DayAvailability> {
    from.iter_days()
        .take_while(|day| *day <= to)
        .map(|day| compute_availability(day, today, slots, booked_counts))
        .collect()
}

/// Check a requested `from..=to` range
pub fn validate_range(from: NaiveDate, to: NaiveDate) -> Result<(), String> {
    if to < from {
        return Err("'to' must not be before 'from'".to_string());
    }
    let days = (to - from).num_days() + 1;
    if days > MAX_RANGE_DAYS {
        return Err(format!("date range must not exceed {} days", MAX_RANGE_DAYS));
    }
    Ok(())
}
