//! Time-interval math and overlap detection for appointment booking.
//!
//! Appointments store a time-of-day string (`HH:MM[:SS]`) and borrow their
//! duration from the referenced appointment type. Overlap is computed on
//! half-open minute intervals within a single calendar date: `[s1,e1)` and
//! `[s2,e2)` clash iff `s1 < e2 && e1 > s2`, so back-to-back bookings that
//! merely touch (one ends 10:00, the next starts 10:00) are allowed.

use uuid::Uuid;

use crate::models::AppointmentStatus;

/// Minutes since midnight for a `HH[:MM[:SS]]` string.
///
/// Deliberately permissive: missing or unparsable components count as 0 and
/// seconds are ignored. Input shape is checked at the HTTP edge; by the time
/// a stored value reaches this function we only need a best-effort reading.
pub fn time_to_minutes(time: &str) -> i32 {
    let mut parts = time.split(':');
    let hours = parts
        .next()
        .and_then(|p| p.trim().parse::<i32>().ok())
        .unwrap_or(0);
    let minutes = parts
        .next()
        .and_then(|p| p.trim().parse::<i32>().ok())
        .unwrap_or(0);
    hours * 60 + minutes
}

/// Half-open `[start, end)` minute interval for a booking.
///
/// No wraparound handling: a duration pushing past midnight yields
/// `end > 1440`, which is accepted as-is.
pub fn interval(start_time: &str, duration_minutes: i32) -> (i32, i32) {
    let start = time_to_minutes(start_time);
    (start, start + duration_minutes)
}

/// Zero-pad each numeric component of a `HH:MM[:SS]` string.
///
/// Stored times are ordered by text collation, where `"9:30"` would sort
/// after `"10:00"`; padding on the way in keeps lexicographic and temporal
/// order identical. Non-numeric components pass through untouched.
pub fn normalize_time(time: &str) -> String {
    let parts: Vec<String> = time
        .split(':')
        .map(|p| match p.trim().parse::<u32>() {
            Ok(n) => format!("{n:02}"),
            Err(_) => p.to_string(),
        })
        .collect();
    parts.join(":")
}

/// `HH:MM:00`, zero-padded, 24-hour clock. Used for the derived `end_time`
/// column and for conflict messages.
pub fn format_minutes(total_minutes: i32) -> String {
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    format!("{hours:02}:{minutes:02}:00")
}

/// An existing appointment considered by the overlap scan, joined with its
/// type's duration.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookedSlot {
    pub appointment_id: Uuid,
    pub start_time: String,
    pub status: AppointmentStatus,
    pub duration_minutes: i32,
}

/// First booked slot whose interval intersects `candidate`, if any.
///
/// Slots in a non-blocking status (cancelled, no_show) are skipped, as is
/// `exclude_id` so an update never conflicts with the appointment itself.
/// Stops at the first hit; no tie-break is defined among multiple clashes.
pub fn find_conflict<'a>(
    candidate: (i32, i32),
    exclude_id: Option<Uuid>,
    booked: &'a [BookedSlot],
) -> Option<&'a BookedSlot> {
    let (start, end) = candidate;
    booked.iter().find(|slot| {
        if Some(slot.appointment_id) == exclude_id {
            return false;
        }
        if !slot.status.blocks_schedule() {
            return false;
        }
        let (existing_start, existing_end) = interval(&slot.start_time, slot.duration_minutes);
        start < existing_end && end > existing_start
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(start_time: &str, duration: i32, status: AppointmentStatus) -> BookedSlot {
        BookedSlot {
            appointment_id: Uuid::new_v4(),
            start_time: start_time.to_string(),
            status,
            duration_minutes: duration,
        }
    }

    #[test]
    fn parses_hours_and_minutes_ignoring_seconds() {
        assert_eq!(time_to_minutes("10:30"), 630);
        assert_eq!(time_to_minutes("10:30:45"), 630);
        assert_eq!(time_to_minutes("00:05"), 5);
        assert_eq!(time_to_minutes("23:59"), 1439);
    }

    #[test]
    fn missing_components_default_to_zero() {
        assert_eq!(time_to_minutes("10"), 600);
        assert_eq!(time_to_minutes(""), 0);
        assert_eq!(time_to_minutes("abc"), 0);
        assert_eq!(time_to_minutes("10:xx"), 600);
    }

    #[test]
    fn interval_accepts_end_past_midnight() {
        // 23:30 + 60min reads as [1410, 1470); no rollover is applied.
        assert_eq!(interval("23:30", 60), (1410, 1470));
    }

    #[test]
    fn normalization_pads_single_digit_components() {
        assert_eq!(normalize_time("9:30"), "09:30");
        assert_eq!(normalize_time("9:05:00"), "09:05:00");
        assert_eq!(normalize_time("10:00"), "10:00");
        assert_eq!(normalize_time("23:59:59"), "23:59:59");
    }

    #[test]
    fn normalized_times_sort_temporally_under_text_collation() {
        // Raw strings invert the order: '9' > '1' makes "9:30" sort after
        // "10:00". Normalized forms restore date-time ordering.
        assert!("9:30" > "10:00");
        assert!(normalize_time("9:30") < normalize_time("10:00"));
        assert!(normalize_time("9:30") > normalize_time("08:45"));
    }

    #[test]
    fn formats_zero_padded() {
        assert_eq!(format_minutes(630), "10:30:00");
        assert_eq!(format_minutes(5), "00:05:00");
        assert_eq!(format_minutes(600), "10:00:00");
    }

    #[test]
    fn touching_intervals_do_not_conflict() {
        // [600,630) then [630,660): shared boundary is allowed.
        let booked = vec![slot("10:00", 30, AppointmentStatus::Pending)];
        assert!(find_conflict(interval("10:30", 30), None, &booked).is_none());
        assert!(find_conflict(interval("09:30", 30), None, &booked).is_none());
    }

    #[test]
    fn one_minute_overlap_conflicts() {
        // [600,630) vs [629,659)
        let booked = vec![slot("10:00", 30, AppointmentStatus::Confirmed)];
        let hit = find_conflict(interval("10:29", 30), None, &booked);
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().start_time, "10:00");
    }

    #[test]
    fn contained_interval_conflicts() {
        let booked = vec![slot("09:00", 120, AppointmentStatus::Pending)];
        assert!(find_conflict(interval("09:30", 15), None, &booked).is_some());
    }

    #[test]
    fn cancelled_and_no_show_never_block() {
        let booked = vec![
            slot("10:00", 30, AppointmentStatus::Cancelled),
            slot("10:00", 30, AppointmentStatus::NoShow),
        ];
        assert!(find_conflict(interval("10:00", 30), None, &booked).is_none());
    }

    #[test]
    fn completed_still_blocks() {
        let booked = vec![slot("10:00", 30, AppointmentStatus::Completed)];
        assert!(find_conflict(interval("10:15", 30), None, &booked).is_some());
    }

    #[test]
    fn excluded_appointment_is_skipped() {
        let own = slot("10:00", 30, AppointmentStatus::Pending);
        let own_id = own.appointment_id;
        let booked = vec![own];
        assert!(find_conflict(interval("10:00", 30), Some(own_id), &booked).is_none());
    }

    #[test]
    fn first_hit_wins_among_multiple() {
        let booked = vec![
            slot("10:00", 30, AppointmentStatus::Pending),
            slot("10:15", 30, AppointmentStatus::Pending),
        ];
        let hit = find_conflict(interval("10:10", 60), None, &booked).unwrap();
        assert_eq!(hit.start_time, "10:00");
    }
}
