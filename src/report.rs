use crate::error::Result;
use crate::inventory::Inventory;
use crate::model::{BOOKS_PER_STUDENT, IssueChannel, IssueRecord, School, SchoolStatus};
use crate::roster::records_to_csv;
use crate::store::Repository;
use crate::validate::reconcile_classes;
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

const REPORT_TITLE: &str = "FreeBooks Sekondi Distribution Report";

/// Dashboard figures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionSummary {
    pub pending: usize,
    pub approved: usize,
    pub delivered: usize,
    pub rejected: usize,
    /// Declared students across every school that was not rejected.
    pub total_declared: i64,
    pub issued_by_delivery: u64,
    pub issued_by_walk_in: u64,
    pub external_students: usize,
    pub books_total: u64,
    pub books_distributed: u64,
    pub books_remaining: u64,
}

pub fn summarize<R: Repository>(repo: &R, inventory: &Inventory) -> DistributionSummary {
    let mut summary = DistributionSummary {
        books_total: inventory.total_books(),
        books_distributed: inventory.distributed(),
        books_remaining: inventory.remaining(),
        ..Default::default()
    };
    for school in repo.schools() {
        match school.status {
            SchoolStatus::Pending => summary.pending += 1,
            SchoolStatus::Approved => summary.approved += 1,
            SchoolStatus::Delivered => summary.delivered += 1,
            SchoolStatus::Rejected => summary.rejected += 1,
        }
        if school.status != SchoolStatus::Rejected {
            summary.total_declared = summary.total_declared.saturating_add(school.total_declared);
        }
    }
    for record in repo.issue_records() {
        let students = record.books / BOOKS_PER_STUDENT;
        match record.channel {
            IssueChannel::SchoolDelivery => summary.issued_by_delivery += students,
            IssueChannel::WalkIn => summary.issued_by_walk_in += students,
        }
    }
    summary.external_students = repo.students().iter().filter(|s| s.is_external()).count();
    summary
}

pub fn schools_csv(schools: &[School]) -> Result<String> {
    let headers = [
        "id",
        "name",
        "status",
        "totalDeclared",
        "rosterCount",
        "createdAt",
        "deliveredAt",
        "notes",
    ];
    let rows: Vec<Vec<String>> = schools
        .iter()
        .map(|s| {
            vec![
                s.id.clone(),
                s.name.clone(),
                s.status.to_string(),
                s.total_declared.to_string(),
                s.students.len().to_string(),
                s.created_at.to_rfc3339(),
                s.delivered_at.map(|d| d.to_rfc3339()).unwrap_or_default(),
                s.notes.clone().unwrap_or_default(),
            ]
        })
        .collect();
    records_to_csv(&headers, &rows)
}

pub fn issue_records_csv(records: &[IssueRecord]) -> Result<String> {
    let headers = [
        "id",
        "studentId",
        "schoolId",
        "books",
        "issuedAt",
        "issuedBy",
        "channel",
    ];
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            vec![
                r.id.clone(),
                r.student_id.clone(),
                r.school_id.clone(),
                r.books.to_string(),
                r.issued_at.to_rfc3339(),
                r.issued_by.clone(),
                channel_name(r.channel).to_string(),
            ]
        })
        .collect();
    records_to_csv(&headers, &rows)
}

fn channel_name(channel: IssueChannel) -> &'static str {
    match channel {
        IssueChannel::SchoolDelivery => "school delivery",
        IssueChannel::WalkIn => "walk-in",
    }
}

/// `output` if given, otherwise `<dir>/<stem>.<ext>`.
pub fn output_path(dir: &Path, stem: &str, ext: &str, output: Option<PathBuf>) -> PathBuf {
    output.unwrap_or_else(|| {
        let mut out = dir.join(stem);
        out.set_extension(ext);
        out
    })
}

struct ReportFormats {
    title: Format,
    header: Format,
    cell: Format,
    left_align: Format,
    center_bold: Format,
    warn_cell: Format,
}

impl ReportFormats {
    fn new() -> Self {
        Self {
            title: Format::new()
                .set_bold()
                .set_font_size(18)
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter),
            header: Format::new()
                .set_bold()
                .set_border(FormatBorder::Thin)
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
                .set_text_wrap(),
            cell: Format::new()
                .set_border(FormatBorder::Thin)
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
                .set_text_wrap(),
            left_align: Format::new()
                .set_align(FormatAlign::Left)
                .set_border(FormatBorder::Thin)
                .set_bold()
                .set_align(FormatAlign::VerticalCenter),
            center_bold: Format::new()
                .set_align(FormatAlign::Center)
                .set_border(FormatBorder::Thin)
                .set_bold()
                .set_align(FormatAlign::VerticalCenter),
            warn_cell: Format::new()
                .set_border(FormatBorder::Thin)
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
                .set_bold()
                .set_font_color(rust_xlsxwriter::Color::Red),
        }
    }
}

fn merge_or_write_str(
    ws: &mut Worksheet,
    start: u32,
    end: u32,
    col: u16,
    val: &str,
    fmt: &Format,
) -> Result<()> {
    if end > start {
        ws.merge_range(start, col, end, col, val, fmt)?;
    } else {
        ws.write_string_with_format(start, col, val, fmt)?;
    }
    Ok(())
}

fn merge_or_write_num(
    ws: &mut Worksheet,
    start: u32,
    end: u32,
    col: u16,
    val: f64,
    fmt: &Format,
) -> Result<()> {
    if end > start {
        ws.merge_range(start, col, end, col, &val.to_string(), fmt)?;
    } else {
        ws.write_number_with_format(start, col, val, fmt)?;
    }
    Ok(())
}

fn write_report_header(
    ws: &mut Worksheet,
    start_row: u32,
    prepared_by: &str,
    date: &str,
    fmt: &ReportFormats,
) -> Result<u32> {
    const TITLE_ROW_HEIGHT: f64 = 30.0;

    ws.set_row_height(start_row, TITLE_ROW_HEIGHT)?;
    ws.merge_range(start_row, 0, start_row, 7, REPORT_TITLE, &fmt.title)?;
    let r = start_row + 1;
    ws.merge_range(
        r,
        0,
        r,
        4,
        &format!("Prepared by: {prepared_by}"),
        &fmt.left_align,
    )?;
    ws.merge_range(r, 5, r, 7, &format!("Date: {date}"), &fmt.center_bold)?;
    Ok(r + 1)
}

fn write_summary(
    ws: &mut Worksheet,
    start_row: u32,
    summary: &DistributionSummary,
    fmt: &ReportFormats,
) -> Result<u32> {
    let lines: [(&str, f64); 9] = [
        ("Pending submissions", summary.pending as f64),
        ("Approved, awaiting delivery", summary.approved as f64),
        ("Delivered", summary.delivered as f64),
        ("Rejected", summary.rejected as f64),
        ("Students declared", summary.total_declared as f64),
        ("Students served by delivery", summary.issued_by_delivery as f64),
        ("Students served at the desk", summary.issued_by_walk_in as f64),
        ("Books distributed", summary.books_distributed as f64),
        ("Books remaining", summary.books_remaining as f64),
    ];
    let mut row = start_row;
    for (label, value) in lines {
        ws.merge_range(row, 0, row, 4, label, &fmt.center_bold)?;
        ws.merge_range(row, 5, row, 7, &value.to_string(), &fmt.cell)?;
        row += 1;
    }
    Ok(row)
}

fn write_school_table_headers(ws: &mut Worksheet, row: u32, fmt: &Format) -> Result<()> {
    let headers = [
        "School",
        "Status",
        "Class",
        "Declared",
        "On Roster",
        "Books",
        "Delivered On",
        "Proofs",
    ];
    for (i, h) in headers.iter().enumerate() {
        ws.write_string_with_format(row, i as u16, *h, fmt)?;
    }
    Ok(())
}

/// One block per school, one row per class; school-level cells are merged down the block.
fn write_school_table(
    ws: &mut Worksheet,
    start_row: u32,
    schools: &[School],
    records: &[IssueRecord],
    fmt: &ReportFormats,
) -> Result<u32> {
    write_school_table_headers(ws, start_row, &fmt.header)?;
    let mut row = start_row + 1;

    let mut sorted: Vec<&School> = schools.iter().collect();
    sorted.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

    for school in sorted {
        let block_start = row;
        let lines = reconcile_classes(
            &school.classes,
            school.students.iter().map(|s| s.class_name.as_str()),
        );

        if lines.is_empty() {
            for col in 2..=4 {
                ws.write_string_with_format(row, col, "/", &fmt.cell)?;
            }
            row += 1;
        }
        for line in &lines {
            ws.write_string_with_format(row, 2, &line.class_name, &fmt.cell)?;
            ws.write_number_with_format(row, 3, line.declared as f64, &fmt.cell)?;
            let roster_fmt = if school.students.is_empty() || line.matches() {
                &fmt.cell
            } else {
                &fmt.warn_cell
            };
            ws.write_number_with_format(row, 4, line.actual as f64, roster_fmt)?;
            row += 1;
        }

        let end = row - 1;
        let books: u64 = records
            .iter()
            .filter(|r| r.school_id == school.id && r.channel == IssueChannel::SchoolDelivery)
            .map(|r| r.books)
            .sum();
        let delivered_on = school
            .delivered_at
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "/".to_string());
        merge_or_write_str(ws, block_start, end, 0, &school.name, &fmt.cell)?;
        merge_or_write_str(ws, block_start, end, 1, &school.status.to_string(), &fmt.cell)?;
        merge_or_write_num(ws, block_start, end, 5, books as f64, &fmt.cell)?;
        merge_or_write_str(ws, block_start, end, 6, &delivered_on, &fmt.cell)?;
        merge_or_write_num(
            ws,
            block_start,
            end,
            7,
            school.delivery_proofs.len() as f64,
            &fmt.cell,
        )?;
    }
    Ok(row)
}

fn write_inventory_table(
    ws: &mut Worksheet,
    start_row: u32,
    inventory: &Inventory,
    fmt: &ReportFormats,
) -> Result<u32> {
    ws.merge_range(start_row, 0, start_row, 2, "Year", &fmt.header)?;
    ws.merge_range(start_row, 3, start_row, 5, "Books Added", &fmt.header)?;
    ws.merge_range(start_row, 6, start_row, 7, "Budget", &fmt.header)?;
    let mut row = start_row + 1;
    for record in inventory.yearly_records() {
        ws.merge_range(row, 0, row, 2, &record.year.to_string(), &fmt.cell)?;
        ws.merge_range(row, 3, row, 5, &record.books_added.to_string(), &fmt.cell)?;
        ws.merge_range(row, 6, row, 7, &format!("{:.2}", record.budget), &fmt.cell)?;
        row += 1;
    }
    Ok(row)
}

fn write_issue_sheet(ws: &mut Worksheet, records: &[IssueRecord], fmt: &ReportFormats) -> Result<()> {
    ws.set_name("Issue Records")?;
    let headers = ["Issued At", "Student", "School", "Books", "Issued By", "Channel"];
    for (i, h) in headers.iter().enumerate() {
        ws.write_string_with_format(0, i as u16, *h, &fmt.header)?;
    }
    for (i, r) in records.iter().enumerate() {
        let row = i as u32 + 1;
        ws.write_string_with_format(row, 0, r.issued_at.format("%Y-%m-%d %H:%M").to_string(), &fmt.cell)?;
        ws.write_string_with_format(row, 1, &r.student_id, &fmt.cell)?;
        ws.write_string_with_format(row, 2, &r.school_id, &fmt.cell)?;
        ws.write_number_with_format(row, 3, r.books as f64, &fmt.cell)?;
        ws.write_string_with_format(row, 4, &r.issued_by, &fmt.cell)?;
        ws.write_string_with_format(row, 5, channel_name(r.channel), &fmt.cell)?;
    }
    for (col, w) in [18, 38, 38, 8, 14, 16].iter().enumerate() {
        ws.set_column_width(col as u16, *w)?;
    }
    Ok(())
}

fn set_column_widths(ws: &mut Worksheet) -> Result<()> {
    let widths = [28, 12, 10, 10, 10, 10, 14, 8];
    for (col, w) in widths.iter().enumerate() {
        ws.set_column_width(col as u16, *w)?;
    }
    Ok(())
}

/// Writes the distribution report workbook: summary, schools, stock by year,
/// and a second sheet listing every issue record.
pub fn write_workbook<R: Repository>(
    path: &Path,
    repo: &R,
    inventory: &Inventory,
    prepared_by: &str,
    date: &str,
) -> Result<()> {
    let summary = summarize(repo, inventory);
    let mut workbook = Workbook::new();
    let fmt = ReportFormats::new();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Distribution")?;
    let row = write_report_header(worksheet, 0, prepared_by, date, &fmt)?;
    let row = write_summary(worksheet, row, &summary, &fmt)?;
    let row = write_school_table(worksheet, row + 1, repo.schools(), repo.issue_records(), &fmt)?;
    write_inventory_table(worksheet, row + 1, inventory, &fmt)?;
    set_column_widths(worksheet)?;

    let issues = workbook.add_worksheet();
    write_issue_sheet(issues, repo.issue_records(), &fmt)?;

    workbook.save(path)?;
    info!(path = %path.display(), "report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthService;
    use crate::model::{ClassEntry, Role, StudentEntry, SubmissionDraft};
    use crate::service::{DistributionService, SubmissionService};
    use crate::store::MemoryRepository;
    use pretty_assertions::assert_eq;

    fn populated() -> (MemoryRepository, Inventory) {
        let mut repo = MemoryRepository::seeded();
        let admin = repo.user_by_username("admin").unwrap().clone();
        let staff = AuthService::new(&mut repo)
            .add_user("desk", "pw", Role::Staff, None)
            .unwrap();
        let mut inventory = Inventory::new();
        inventory.add_stock(2024, 2_000, 5_000.0);

        let draft = SubmissionDraft {
            name: "Ketan Basic".to_string(),
            classes: vec![
                ClassEntry {
                    class_name: "P1".to_string(),
                    declared_count: 2,
                },
                ClassEntry {
                    class_name: "P2".to_string(),
                    declared_count: 1,
                },
            ],
            students: vec![StudentEntry {
                name: "Adwoa Badu".to_string(),
                dob: "2017-05-05".to_string(),
                class_name: "P1".to_string(),
            }],
            ..Default::default()
        };
        let mut submissions = SubmissionService::new(&mut repo);
        let id = submissions.submit(&draft, &admin).unwrap().school.id;
        submissions.approve(&id, &admin).unwrap();
        let mut other = draft.clone();
        other.name = "Essikado Basic".to_string();
        submissions.submit(&other, &admin).unwrap();

        let mut desk = DistributionService::new(&mut repo, &mut inventory);
        desk.record_delivery(&id, &["receipt.pdf".to_string()], &staff)
            .unwrap();
        let walk_in = desk.register_external("Nana Yaw", "2013-08-08", None).unwrap();
        desk.collect(&walk_in.id, None, &staff).unwrap();
        (repo, inventory)
    }

    #[test]
    fn summary_counts() {
        let (repo, inventory) = populated();
        assert_eq!(
            summarize(&repo, &inventory),
            DistributionSummary {
                pending: 1,
                approved: 0,
                delivered: 1,
                rejected: 0,
                total_declared: 6,
                issued_by_delivery: 3,
                issued_by_walk_in: 1,
                external_students: 1,
                books_total: 2_000,
                books_distributed: 80,
                books_remaining: 1_920,
            }
        );
    }

    #[test]
    fn csv_exports_have_one_row_per_record() {
        let (repo, _) = populated();
        let schools = schools_csv(repo.schools()).unwrap();
        assert_eq!(schools.lines().count(), 3);
        assert!(schools.starts_with("id,name,status,totalDeclared"));
        let issues = issue_records_csv(repo.issue_records()).unwrap();
        assert_eq!(issues.lines().count(), 4);
        assert!(issues.contains("walk-in"));
    }

    #[test]
    fn workbook_is_written() {
        let (repo, inventory) = populated();
        let dir = tempfile::tempdir().unwrap();
        let path = output_path(dir.path(), "report", "xlsx", None);
        write_workbook(&path, &repo, &inventory, "desk", "2024-09-02").unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
