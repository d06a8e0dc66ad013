// Student calendar: ICS download, event parsing and current-week filtering.

use std::path::{Path, PathBuf};
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use log::{debug, info};
use crate::error::{Result, ValidationError};
use crate::models::CalendarEvent;
use crate::utils::portal::PortalClient;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";
// Entries without a title are days spent at the company.
const PLACEHOLDER_SUBJECT: &str = "entreprise";
const FULL_DAY_END_HOUR: u32 = 16;

// Fields collected between BEGIN:VEVENT and END:VEVENT.
#[derive(Debug, Default)]
struct EventBuilder {
    subject: String,
    location: String,
    professor: String,
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl EventBuilder {
    fn build(self) -> CalendarEvent {
        let day = self.start.date();

        if self.subject.trim().is_empty() {
            return CalendarEvent {
                day,
                full_day: true,
                morning: false,
                afternoon: false,
                remote: false,
                location: self.location,
                professor: String::new(),
                subject: PLACEHOLDER_SUBJECT.to_string(),
            };
        }

        let start_hour = self.start.hour();
        let end_hour = self.end.hour();
        let mut event = CalendarEvent {
            day,
            full_day: false,
            morning: start_hour < 12,
            afternoon: start_hour >= 12,
            remote: self.location.is_empty(),
            location: self.location,
            professor: self.professor,
            subject: self.subject,
        };

        // Starts exactly at 09:00:00; 09:30-16:00 stays a morning event.
        if self.start.time() == full_day_start() && end_hour == FULL_DAY_END_HOUR {
            event.full_day = true;
            event.morning = false;
            event.afternoon = false;
        }
        event
    }
}

fn full_day_start() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default()
}

// Unparseable timestamps fall back to the zero time (1970-01-01 00:00).
fn parse_timestamp(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).unwrap_or_default()
}

// Parses an ICS stream into events, in file order.
//
// Unknown lines are ignored and an event is only emitted on `END:VEVENT`, so a
// truncated trailing block is dropped.
pub fn parse_calendar(content: &str) -> Vec<CalendarEvent> {
    let mut events = Vec::new();
    let mut current = EventBuilder::default();

    for line in content.lines().map(str::trim) {
        if line.starts_with("BEGIN:VEVENT") {
            current = EventBuilder::default();
        } else if let Some(value) = line.strip_prefix("SUMMARY:") {
            current.subject = value.to_string();
        } else if let Some(value) = line.strip_prefix("DTSTART:") {
            current.start = parse_timestamp(value);
        } else if let Some(value) = line.strip_prefix("DTEND:") {
            current.end = parse_timestamp(value);
        } else if let Some(value) = line.strip_prefix("LOCATION:") {
            current.location = value.to_string();
        } else if let Some(value) = line.strip_prefix("PROF:") {
            current.professor = value.to_string();
        } else if line.starts_with("END:VEVENT") {
            events.push(std::mem::take(&mut current).build());
        }
    }

    events
}

// Keeps the events falling in the same ISO week as `today`.
pub fn filter_week(events: Vec<CalendarEvent>, today: NaiveDate) -> Vec<CalendarEvent> {
    let week = today.iso_week();
    events.into_iter().filter(|event| event.day.iso_week() == week).collect()
}

pub fn filter_current_week(events: Vec<CalendarEvent>) -> Vec<CalendarEvent> {
    filter_week(events, Local::now().date_naive())
}

// The identifier names a file in the assets directory, so it must stay a single path component.
fn validate_calendar_id(calendar_id: &str) -> std::result::Result<(), ValidationError> {
    let invalid = calendar_id.is_empty()
        || calendar_id == "."
        || calendar_id.contains("..")
        || calendar_id.contains(['/', '\\'])
        || calendar_id.chars().any(char::is_control);

    if invalid {
        return Err(ValidationError::InvalidCalendarId(calendar_id.to_string()));
    }
    Ok(())
}

pub fn calendar_path(assets_dir: &Path, calendar_id: &str) -> PathBuf {
    assets_dir.join(format!("{}.ics", calendar_id))
}

// Downloads the calendar, stages it under `assets_dir` and returns this week's events.
pub async fn fetch_calendar(client: &PortalClient, assets_dir: &Path, calendar_id: &str) -> Result<Vec<CalendarEvent>> {
    validate_calendar_id(calendar_id)?;

    let document = client.fetch_calendar_document(calendar_id).await?;

    let path = calendar_path(assets_dir, calendar_id);
    tokio::fs::create_dir_all(assets_dir).await?;
    tokio::fs::write(&path, &document).await?;
    info!("Calendar {} saved to {}", calendar_id, path.display());

    let content = tokio::fs::read(&path).await?;
    let events = parse_calendar(&String::from_utf8_lossy(&content));
    debug!("Calendar {} holds {} event(s)", calendar_id, events.len());

    Ok(filter_current_week(events))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(lines: &[&str]) -> String {
        let mut text = String::from("BEGIN:VEVENT\r\n");
        for line in lines {
            text.push_str(line);
            text.push_str("\r\n");
        }
        text.push_str("END:VEVENT\r\n");
        text
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event_on(day: NaiveDate) -> CalendarEvent {
        CalendarEvent {
            day,
            full_day: false,
            morning: true,
            afternoon: false,
            remote: true,
            location: String::new(),
            professor: String::new(),
            subject: "Cours".into(),
        }
    }

    #[test]
    fn nine_to_sixteen_is_a_full_day() {
        let events = parse_calendar(&block(&[
            "SUMMARY:Rust",
            "DTSTART:20240311T090000",
            "DTEND:20240311T160000",
            "LOCATION:Salle 204",
            "PROF:M. Ferris",
        ]));
        assert_eq!(
            events,
            vec![CalendarEvent {
                day: date(2024, 3, 11),
                full_day: true,
                morning: false,
                afternoon: false,
                remote: false,
                location: "Salle 204".into(),
                professor: "M. Ferris".into(),
                subject: "Rust".into(),
            }]
        );
    }

    #[test]
    fn morning_and_afternoon_follow_start_hour() {
        let content = [
            block(&["SUMMARY:Matin", "DTSTART:20240311T080000", "DTEND:20240311T100000", "LOCATION:A1"]),
            block(&["SUMMARY:Aprem", "DTSTART:20240311T120000", "DTEND:20240311T150000", "LOCATION:A1"]),
        ]
        .concat();
        let events = parse_calendar(&content);
        assert!(events[0].morning && !events[0].afternoon && !events[0].full_day);
        assert!(!events[1].morning && events[1].afternoon && !events[1].full_day);
    }

    #[test]
    fn half_past_nine_is_not_a_full_day() {
        let events = parse_calendar(&block(&["SUMMARY:Rust", "DTSTART:20240311T093000", "DTEND:20240311T160000"]));
        assert!(!events[0].full_day);
        assert!(events[0].morning);

        let events = parse_calendar(&block(&["SUMMARY:Rust", "DTSTART:20240311T090030", "DTEND:20240311T160000"]));
        assert!(!events[0].full_day);
        assert!(events[0].morning);
    }

    #[test]
    fn empty_location_means_remote() {
        let events = parse_calendar(&block(&["SUMMARY:Visio", "DTSTART:20240311T140000", "DTEND:20240311T170000", "LOCATION:"]));
        assert!(events[0].remote);
        assert_eq!(events[0].location, "");
    }

    #[test]
    fn untitled_event_is_a_company_day() {
        let events = parse_calendar(&block(&[
            "DTSTART:20240312T080000",
            "DTEND:20240312T170000",
            "PROF:Personne",
        ]));
        let event = &events[0];
        assert_eq!(event.subject, "entreprise");
        assert_eq!(event.day, date(2024, 3, 12));
        assert!(event.full_day);
        assert!(!event.morning && !event.afternoon && !event.remote);
        assert_eq!(event.professor, "");
    }

    #[test]
    fn bad_timestamp_falls_back_to_zero_time() {
        let events = parse_calendar(&block(&["SUMMARY:Cassé", "DTSTART:demain", "DTEND:20240311T160000", "LOCATION:B2"]));
        assert_eq!(events[0].day, NaiveDateTime::default().date());
        assert!(events[0].morning);
        assert!(!events[0].full_day);
    }

    #[test]
    fn fields_do_not_leak_between_events() {
        let content = [
            block(&["SUMMARY:Premier", "DTSTART:20240311T090000", "DTEND:20240311T160000", "LOCATION:A1", "PROF:X"]),
            block(&["SUMMARY:Second", "DTSTART:20240312T140000"]),
        ]
        .concat();
        let events = parse_calendar(&content);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].professor, "");
        assert!(events[1].remote);
        assert!(events[1].afternoon);
    }

    #[test]
    fn unterminated_block_and_noise_are_ignored() {
        let content = format!(
            "BEGIN:VCALENDAR\nVERSION:2.0\n{}BEGIN:VEVENT\nSUMMARY:Tronqué\n",
            block(&["SUMMARY:Complet", "DTSTART:20240311T080000", "X-UNKNOWN:1"])
        );
        let events = parse_calendar(&content);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subject, "Complet");
    }

    #[test]
    fn week_filter_uses_iso_weeks() {
        // Wednesday 2024-03-13 is in ISO week 11 (Mon 11th - Sun 17th).
        let today = date(2024, 3, 13);
        let events = vec![
            event_on(date(2024, 3, 10)),
            event_on(date(2024, 3, 11)),
            event_on(date(2024, 3, 17)),
            event_on(date(2024, 3, 18)),
            event_on(date(2023, 3, 15)),
        ];
        let days: Vec<NaiveDate> = filter_week(events, today).into_iter().map(|e| e.day).collect();
        assert_eq!(days, vec![date(2024, 3, 11), date(2024, 3, 17)]);
    }

    #[test]
    fn week_filter_handles_year_boundaries() {
        // 2024-12-30 belongs to ISO week 1 of 2025.
        let events = vec![event_on(date(2024, 12, 30)), event_on(date(2024, 12, 29))];
        let kept = filter_week(events, date(2025, 1, 2));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].day, date(2024, 12, 30));
    }

    #[test]
    fn current_week_drops_zero_dates() {
        let today = Local::now().date_naive();
        let events = vec![event_on(today), event_on(NaiveDateTime::default().date())];
        assert_eq!(filter_current_week(events).len(), 1);
    }

    #[test]
    fn calendar_ids_must_be_single_path_components() {
        assert!(validate_calendar_id("wilson_inessa").is_ok());
        for bad in ["", ".", "..", "../etc", "a/b", "a\\b"] {
            assert!(validate_calendar_id(bad).is_err(), "{:?} should be rejected", bad);
        }
    }
}
