use std::sync::LazyLock;
use log::info;
use scraper::{ElementRef, Html, Selector};
use crate::error::Result;
use crate::models::{GradeRecord, SessionToken};
use crate::utils::dom::{child_elements, text_content};
use crate::utils::portal::PortalClient;

pub const GRADES_PATH: &str = "?my=notes";

const PUBLISHED_MARKER: &str = "PUBLIE";
const GROUP_HEADER_CLASSES: [&str; 2] = ["warning", "info"];

static ROW_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("table.table-bordered tbody tr").expect("grade row selector is valid")
});

// State threaded through the rows: the course named by the last header row and
// the index of the last grade pushed, which trailing comment rows attach to.
#[derive(Debug, Default)]
struct GradeFold {
    current_group: String,
    last_index: Option<usize>,
    records: Vec<GradeRecord>,
}

impl GradeFold {
    fn push_row(mut self, row: ElementRef<'_>) -> Self {
        if is_group_header(&row) {
            self.current_group = child_elements(row)
                .next()
                .map(|cell| text_content(cell).trim().to_string())
                .unwrap_or_default();
            return self;
        }

        let mut subject = String::new();
        let mut date = String::new();
        let mut grade = String::new();
        // Cell 1 is a spacer column.
        for (index, cell) in child_elements(row).enumerate() {
            let text = text_content(cell);
            match index {
                0 => subject = text.replace(PUBLISHED_MARKER, "").trim().to_string(),
                2 => date = text.trim().to_string(),
                3 => grade = text.trim().to_string(),
                _ => {}
            }
        }

        if !subject.is_empty() && !date.is_empty() && !grade.is_empty() {
            self.records.push(GradeRecord {
                course: self.current_group.clone(),
                subject,
                date,
                grade,
                comment: None,
            });
            self.last_index = Some(self.records.len() - 1);
        } else if subject.is_empty() && date.is_empty() && grade.is_empty() {
            // A comment row before any grade has nothing to attach to.
            if let Some(last) = self.last_index.and_then(|index| self.records.get_mut(index)) {
                last.comment = Some(text_content(row).trim().to_string());
            }
        }
        self
    }
}

fn is_group_header(row: &ElementRef<'_>) -> bool {
    row.value().classes().any(|class| GROUP_HEADER_CLASSES.contains(&class))
}

// Parses the grades table, grouping rows under the preceding course header.
pub fn extract_grades(html: &[u8]) -> Vec<GradeRecord> {
    let html = String::from_utf8_lossy(html);
    let document = Html::parse_document(&html);

    document
        .select(&ROW_SELECTOR)
        .fold(GradeFold::default(), GradeFold::push_row)
        .records
}

pub async fn list_grades(client: &PortalClient, token: &SessionToken) -> Result<Vec<GradeRecord>> {
    let html = client.fetch_page(token, GRADES_PATH).await?;
    let grades = extract_grades(&html);
    info!("Fetched {} grade(s)", grades.len());
    Ok(grades)
}
