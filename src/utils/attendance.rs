// Courses of the day, attendance status and presence submission.

use std::sync::LazyLock;
use chrono::{NaiveTime, Timelike};
use log::{info, warn};
use regex::Regex;
use scraper::ElementRef;
use crate::error::{ExtractionError, Result, StateError, SubmissionError, ValidationError};
use crate::models::{AttendanceStatus, Course, Period, SessionToken};
use crate::utils::dom::{child_elements, parse_document, text_content, visit, visit_within, NodePredicate};
use crate::utils::portal::{contains_marker, PortalClient};

pub const COURSES_PATH: &str = "presences";
pub const STATUS_PATH_PREFIX: &str = "presences/s/";
pub const SUBMIT_PATH: &str = "student/upload.php";

const COURSE_LINK_MARKER: &str = "/presences/s/";
// Index of the course ID in `/presences/s/<id>` once split on '/'.
const COURSE_ID_SEGMENT: usize = 3;
const PANEL_BODY_CLASS: &str = "panel-body";
const RELOAD_MARKER: &str = "location.reload();";

static TIME_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2}:\d{2})\s*-\s*\d{1,2}:\d{2}").expect("time range pattern is valid")
});

// A panel's text is matched against these rules in order; the first hit wins.
struct StatusRule {
    marker: &'static str,
    classify: fn(&str) -> AttendanceStatus,
}

const STATUS_RULES: &[StatusRule] = &[
    StatusRule {
        marker: "L'appel n'est pas encore ouvert",
        classify: |_| AttendanceStatus::Closed,
    },
    StatusRule {
        marker: "L'appel est clôturé",
        classify: |text| {
            if text.contains("Vous avez été noté présent") {
                AttendanceStatus::Present
            } else {
                AttendanceStatus::Closed
            }
        },
    },
    StatusRule {
        marker: "Valider la présence en retard",
        classify: |_| AttendanceStatus::Late,
    },
    StatusRule {
        marker: "Valider la présence",
        classify: |_| AttendanceStatus::Open,
    },
];

fn classify_panel(text: &str) -> Option<AttendanceStatus> {
    STATUS_RULES
        .iter()
        .find(|rule| text.contains(rule.marker))
        .map(|rule| (rule.classify)(text))
}

// Parses the course table of the presences page.
pub fn extract_courses(html: &[u8]) -> std::result::Result<Vec<Course>, ExtractionError> {
    let document = parse_document(html)?;

    let courses: Vec<Course> = visit(&document, NodePredicate::Tag("tr"))
        .filter_map(parse_course_row)
        .collect();

    if courses.is_empty() {
        return Err(ExtractionError::NoCoursesFound);
    }
    Ok(courses)
}

fn parse_course_row(row: ElementRef<'_>) -> Option<Course> {
    let cells: Vec<ElementRef<'_>> = child_elements(row)
        .filter(|cell| NodePredicate::Tag("td").matches(cell))
        .collect();

    let time_range = text_content(*cells.first()?);
    let period = determine_period(&time_range)?;

    let id = visit_within(row, NodePredicate::Tag("a"))
        .filter_map(|link| link.value().attr("href"))
        .filter(|href| href.contains(COURSE_LINK_MARKER))
        .find_map(course_id_from_href)?;

    let name = cells.get(1).map(|cell| text_content(*cell).trim().to_string()).unwrap_or_default();

    Some(Course { id, name, period })
}

// None when the cell holds no time range at all, Unknown when the range is there
// but its start time does not parse.
fn determine_period(cell_text: &str) -> Option<Period> {
    let captures = TIME_RANGE.captures(cell_text)?;
    let start = captures.get(1)?.as_str();
    let period = match NaiveTime::parse_from_str(start, "%H:%M") {
        Ok(time) if time.hour() < 12 => Period::Morning,
        Ok(_) => Period::Afternoon,
        Err(_) => Period::Unknown,
    };
    Some(period)
}

fn course_id_from_href(href: &str) -> Option<String> {
    href.split('/')
        .nth(COURSE_ID_SEGMENT)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

// Reads the attendance status from the panels of a course's presence page.
pub fn extract_status(html: &[u8]) -> std::result::Result<AttendanceStatus, ExtractionError> {
    let document = parse_document(html)?;

    // The last matching panel decides.
    let status = visit(&document, NodePredicate::Class(PANEL_BODY_CLASS))
        .filter_map(|panel| classify_panel(&text_content(panel)))
        .last();
    status.ok_or(ExtractionError::StatusUndetermined)
}

// Only an open call accepts a presence.
pub fn can_submit(status: AttendanceStatus) -> std::result::Result<(), StateError> {
    match status {
        AttendanceStatus::Open => Ok(()),
        other => Err(StateError::SubmissionNotAllowed(other)),
    }
}

pub async fn list_courses(client: &PortalClient, token: &SessionToken) -> Result<Vec<Course>> {
    let html = client.fetch_page(token, COURSES_PATH).await?;
    let courses = extract_courses(&html)?;
    info!("Found {} course(s) for today", courses.len());
    Ok(courses)
}

pub async fn get_status(client: &PortalClient, token: &SessionToken, course_id: &str) -> Result<AttendanceStatus> {
    let courses = list_courses(client, token).await?;
    if !courses.iter().any(|course| course.id == course_id) {
        warn!("Course {} is not scheduled today", course_id);
        return Err(ValidationError::UnknownCourseId(course_id.to_string()).into());
    }

    let path = format!("{}{}", STATUS_PATH_PREFIX, urlencoding::encode(course_id));
    let html = client.fetch_page(token, &path).await?;
    let status = extract_status(&html)?;
    info!("Attendance for course {} is {}", course_id, status);
    Ok(status)
}

// Marks the session's user present. Nothing is posted unless the call is open.
pub async fn submit(client: &PortalClient, token: &SessionToken, course_id: &str) -> Result<AttendanceStatus> {
    let status = get_status(client, token, course_id).await?;
    if let Err(e) = can_submit(status) {
        warn!("Cannot set presence: {}", status);
        return Err(e.into());
    }

    let form = [("act", "set_present"), ("seance_pk", course_id)];
    let body = client.post_form(token, SUBMIT_PATH, &form).await?;

    // The portal's only success signal is a script asking the page to reload.
    if !contains_marker(&body, RELOAD_MARKER) {
        warn!("Presence not marked for course {}", course_id);
        return Err(SubmissionError::Rejected { course_id: course_id.to_string() }.into());
    }

    info!("Presence marked for course {}", course_id);
    Ok(AttendanceStatus::Present)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course_row(time: &str, name: &str, href: &str) -> String {
        format!(r#"<tr><td>{}</td><td> {} </td><td><a href="{}">Signer</a></td></tr>"#, time, name, href)
    }

    fn page(rows: &[String]) -> Vec<u8> {
        format!("<html><body><table>{}</table></body></html>", rows.concat()).into_bytes()
    }

    fn panel_page(panels: &[&str]) -> Vec<u8> {
        let panels: String = panels
            .iter()
            .map(|text| format!(r#"<div class="panel panel-default"><div class="panel-body">{}</div></div>"#, text))
            .collect();
        format!("<html><body>{}</body></html>", panels).into_bytes()
    }

    #[test]
    fn well_formed_rows_become_courses_in_order() {
        let html = page(&[
            "<tr><th>Horaire</th><th>Cours</th><th></th></tr>".to_string(),
            course_row("09:00-12:30", "Rust avancé", "/presences/s/2275021"),
            course_row("pas d'horaire", "Réunion", "/presences/s/999"),
            course_row("13:30-17:00", "Réseaux", "/presences/s/2275022"),
            course_row("14:00-15:00", "Sans lien", "/autre/page/1"),
        ]);

        let courses = extract_courses(&html).unwrap();
        assert_eq!(
            courses,
            vec![
                Course { id: "2275021".into(), name: "Rust avancé".into(), period: Period::Morning },
                Course { id: "2275022".into(), name: "Réseaux".into(), period: Period::Afternoon },
            ]
        );
    }

    #[test]
    fn noon_start_is_afternoon() {
        let html = page(&[course_row("12:00 - 13:00", "Midi", "/presences/s/1")]);
        assert_eq!(extract_courses(&html).unwrap()[0].period, Period::Afternoon);
    }

    #[test]
    fn out_of_range_start_time_is_unknown_period() {
        let html = page(&[course_row("25:00-26:00", "Nuit", "/presences/s/7")]);
        assert_eq!(extract_courses(&html).unwrap()[0].period, Period::Unknown);
    }

    #[test]
    fn link_with_too_few_segments_is_skipped() {
        let html = page(&[
            course_row("09:00-10:00", "Tronqué", "presences/s/"),
            course_row("10:00-11:00", "Complet", "/presences/s/42"),
        ]);
        let courses = extract_courses(&html).unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].id, "42");
    }

    #[test]
    fn rows_without_any_link_are_skipped() {
        let html = page(&["<tr><td>08:00-09:00</td><td>Sans émargement</td></tr>".to_string()]);
        assert!(matches!(extract_courses(&html), Err(ExtractionError::NoCoursesFound)));
    }

    #[test]
    fn no_course_rows_is_an_error() {
        let html = page(&["<tr><td>Aucun cours aujourd'hui</td></tr>".to_string()]);
        assert!(matches!(extract_courses(&html), Err(ExtractionError::NoCoursesFound)));
    }

    #[test]
    fn non_utf8_course_page_is_malformed() {
        assert!(matches!(extract_courses(&[0xff, 0xfe]), Err(ExtractionError::MalformedDocument(_))));
    }

    #[test]
    fn status_rules_follow_priority() {
        let cases = [
            ("L'appel n'est pas encore ouvert.", AttendanceStatus::Closed),
            ("L'appel est clôturé.", AttendanceStatus::Closed),
            ("L'appel est clôturé. Vous avez été noté présent.", AttendanceStatus::Present),
            ("<a class=\"btn\">Valider la présence en retard</a>", AttendanceStatus::Late),
            ("<a class=\"btn\">Valider la présence</a>", AttendanceStatus::Open),
        ];
        for (panel, expected) in cases {
            assert_eq!(extract_status(&panel_page(&[panel])).unwrap(), expected, "panel: {}", panel);
        }
    }

    #[test]
    fn closed_call_with_presence_is_present_not_closed() {
        let html = panel_page(&["<p>L'appel est clôturé</p><p><span>Vous avez été noté présent</span></p>"]);
        assert_eq!(extract_status(&html).unwrap(), AttendanceStatus::Present);
    }

    #[test]
    fn not_opened_wins_over_validate_button() {
        let html = panel_page(&["L'appel n'est pas encore ouvert. Valider la présence"]);
        assert_eq!(extract_status(&html).unwrap(), AttendanceStatus::Closed);
    }

    #[test]
    fn last_matching_panel_decides() {
        let html = panel_page(&["Informations du cours", "Valider la présence", "L'appel est clôturé"]);
        assert_eq!(extract_status(&html).unwrap(), AttendanceStatus::Closed);
        let html = panel_page(&["L'appel est clôturé", "Valider la présence", "Aucune information"]);
        assert_eq!(extract_status(&html).unwrap(), AttendanceStatus::Open);
    }

    #[test]
    fn unmatched_panels_are_undetermined() {
        let html = panel_page(&["Rien à signaler"]);
        assert!(matches!(extract_status(&html), Err(ExtractionError::StatusUndetermined)));
        let html = b"<html><body><p>Valider la presence</p></body></html>";
        assert!(matches!(extract_status(html), Err(ExtractionError::StatusUndetermined)));
    }

    #[test]
    fn only_open_status_can_submit() {
        assert!(can_submit(AttendanceStatus::Open).is_ok());
        for status in [AttendanceStatus::Closed, AttendanceStatus::Late, AttendanceStatus::Present] {
            match can_submit(status) {
                Err(StateError::SubmissionNotAllowed(current)) => assert_eq!(current, status),
                Ok(()) => panic!("{} should not accept a submission", status),
            }
        }
    }
}
