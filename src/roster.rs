//! CSV handling for student rosters: parsing, import checks, and export.

use crate::error::{FreeBooksError, Result};
use crate::model::StudentEntry;
use crate::validate::check_student;
use csv::{ReaderBuilder, Trim, Writer};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const ROSTER_HEADERS: [&str; 3] = ["name", "dob", "className"];

const REQUIRED_HEADERS: [&str; 2] = ["name", "dob"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub has_header: bool,
    pub trim: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            trim: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    fn column(&self, canonical: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| canonical_header(h) == Some(canonical))
    }
}

/// Reads delimited text into a header list and rows.
///
/// Quoted fields and doubled quotes are handled by the reader. Without a
/// header row, columns are named `column1`, `column2`, and so on.
pub fn parse_csv(text: &str, options: &CsvOptions) -> Result<CsvTable> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(if options.trim { Trim::All } else { Trim::None })
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    let headers = if options.has_header && !rows.is_empty() {
        rows.remove(0)
    } else {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        (1..=width).map(|i| format!("column{i}")).collect()
    };

    Ok(CsvTable { headers, rows })
}

/// Maps the header spellings seen in uploaded rosters onto field names.
fn canonical_header(raw: &str) -> Option<&'static str> {
    let key: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect();
    match key.as_str() {
        "name" | "studentname" | "fullname" => Some("name"),
        "dob" | "dateofbirth" | "birthdate" => Some("dob"),
        "classname" | "class" => Some("className"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowIssue {
    /// 1-based index of the data row (the header is not counted).
    pub row: usize,
    pub message: String,
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Row {}: {}", self.row, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterImport {
    pub valid_students: Vec<StudentEntry>,
    pub errors: Vec<RowIssue>,
    pub warnings: Vec<RowIssue>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub csv: CsvOptions,
    /// Class applied to every row when the file carries no class column.
    pub default_class: Option<String>,
}

/// Parses and checks a roster file.
///
/// A missing `name` or `dob` header aborts before any row is looked at. Rows
/// with blocking problems are left out of `valid_students`; warnings never
/// exclude a row. Files without a header row are read positionally as
/// `name,dob,className`.
pub fn import_roster(text: &str, options: &ImportOptions, current_year: i32) -> Result<RosterImport> {
    let table = parse_csv(text, &options.csv)?;

    let (name_col, dob_col, class_col) = if options.csv.has_header {
        let missing: Vec<String> = REQUIRED_HEADERS
            .iter()
            .filter(|h| table.column(h).is_none())
            .map(|h| h.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(FreeBooksError::MissingHeaders(missing));
        }
        (
            table.column("name").unwrap_or(0),
            table.column("dob").unwrap_or(1),
            table.column("className"),
        )
    } else {
        (0, 1, Some(2))
    };

    let mut import = RosterImport::default();
    for (i, row) in table.rows.iter().enumerate() {
        if row.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let row_no = i + 1;
        let field = |col: usize| row.get(col).cloned().unwrap_or_default();
        let class_name = class_col
            .map(field)
            .filter(|c| !c.trim().is_empty())
            .or_else(|| options.default_class.clone())
            .unwrap_or_default();

        let entry = StudentEntry {
            name: field(name_col),
            dob: field(dob_col),
            class_name,
        };
        let check = check_student(&entry, current_year);

        import.warnings.extend(check.warnings.into_iter().map(|message| RowIssue {
            row: row_no,
            message,
        }));
        if check.errors.is_empty() {
            let dob = check.dob.map(|d| d.format("%Y-%m-%d").to_string());
            import.valid_students.push(StudentEntry {
                name: entry.name.trim().to_string(),
                dob: dob.unwrap_or(entry.dob),
                class_name: entry.class_name.trim().to_string(),
            });
        } else {
            debug!(row = row_no, "roster row rejected");
            import.errors.extend(check.errors.into_iter().map(|message| RowIssue {
                row: row_no,
                message,
            }));
        }
    }

    info!(
        valid = import.valid_students.len(),
        errors = import.errors.len(),
        warnings = import.warnings.len(),
        "roster import finished"
    );
    Ok(import)
}

/// Writes a header and rows as CSV text, quoting only where needed.
pub fn records_to_csv<H: AsRef<str>>(headers: &[H], rows: &[Vec<String>]) -> Result<String> {
    let mut wtr = Writer::from_writer(Vec::new());
    let header: Vec<&str> = headers.iter().map(|h| h.as_ref()).collect();
    wtr.write_record(&header)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    let bytes = wtr.into_inner().map_err(|e| FreeBooksError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| FreeBooksError::InvalidInput(e.to_string()))
}

pub fn students_to_csv(students: &[StudentEntry]) -> Result<String> {
    let rows: Vec<Vec<String>> = students
        .iter()
        .map(|s| vec![s.name.clone(), s.dob.clone(), s.class_name.clone()])
        .collect();
    records_to_csv(&ROSTER_HEADERS, &rows)
}

/// Creates an empty roster file holding just the header row.
pub fn roster_template(filename: &str) -> Result<PathBuf> {
    let path = if filename.ends_with(".csv") {
        PathBuf::from(filename)
    } else {
        PathBuf::from(format!("{filename}.csv"))
    };

    let mut wtr = Writer::from_path(&path)?;
    wtr.write_record(ROSTER_HEADERS)?;
    wtr.flush()?;
    info!(path = %path.display(), "roster template created");
    Ok(path)
}

pub fn read_roster_file(path: &Path, options: &ImportOptions, current_year: i32) -> Result<RosterImport> {
    let text = std::fs::read_to_string(path)?;
    import_roster(&text, options, current_year)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const YEAR: i32 = 2024;

    #[test]
    fn quoted_fields_and_escaped_quotes() {
        let text = "name,dob,className\n\"Mensah, Ama\",2014-01-02,\"P4 \"\"Gold\"\"\"\n";
        let table = parse_csv(text, &CsvOptions::default()).unwrap();
        assert_eq!(table.headers, vec!["name", "dob", "className"]);
        assert_eq!(
            table.rows,
            vec![vec![
                "Mensah, Ama".to_string(),
                "2014-01-02".to_string(),
                "P4 \"Gold\"".to_string()
            ]]
        );
    }

    #[test]
    fn custom_delimiter_without_header() {
        let options = CsvOptions {
            delimiter: b';',
            has_header: false,
            trim: true,
        };
        let table = parse_csv(" Kofi ; 2013-05-05 \nAma;2012-01-01;P5\n", &options).unwrap();
        assert_eq!(table.headers, vec!["column1", "column2", "column3"]);
        assert_eq!(table.rows[0], vec!["Kofi", "2013-05-05"]);
    }

    #[test]
    fn untrimmed_keeps_whitespace() {
        let options = CsvOptions {
            trim: false,
            ..CsvOptions::default()
        };
        let table = parse_csv("name\n  Yaw  \n", &options).unwrap();
        assert_eq!(table.rows[0], vec!["  Yaw  "]);
    }

    #[test]
    fn missing_headers_abort_before_rows() {
        let err = import_roster("name,className\nAma,P1\n", &ImportOptions::default(), YEAR).unwrap_err();
        match err {
            FreeBooksError::MissingHeaders(missing) => assert_eq!(missing, vec!["dob".to_string()]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn import_splits_valid_rows_errors_and_warnings() {
        let text = "\
Name,Date Of Birth,Class,Guardian
Ama Mensah,2014-02-01,P4,Esi
K,2014-02-01,P4,
Kojo Asante,yesterday,P4,
Abena Ofori,2022-06-30,KG1,
";
        let import = import_roster(text, &ImportOptions::default(), YEAR).unwrap();
        assert_eq!(
            import.valid_students,
            vec![
                StudentEntry {
                    name: "Ama Mensah".to_string(),
                    dob: "2014-02-01".to_string(),
                    class_name: "P4".to_string(),
                },
                StudentEntry {
                    name: "Abena Ofori".to_string(),
                    dob: "2022-06-30".to_string(),
                    class_name: "KG1".to_string(),
                },
            ]
        );
        assert_eq!(
            import.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec![
                "Row 2: name must be at least 2 characters".to_string(),
                "Row 3: date of birth is invalid".to_string(),
            ]
        );
        assert_eq!(import.warnings.len(), 1);
        assert_eq!(import.warnings[0].row, 4);

        assert_eq!(
            students_to_csv(&import.valid_students).unwrap(),
            "name,dob,className\nAma Mensah,2014-02-01,P4\nAbena Ofori,2022-06-30,KG1\n"
        );
    }

    #[test]
    fn default_class_fills_missing_column() {
        let options = ImportOptions {
            default_class: Some("P6".to_string()),
            ..ImportOptions::default()
        };
        let import = import_roster("name,dob\nYaw Boateng,2012/09/09\n", &options, YEAR).unwrap();
        assert_eq!(import.valid_students[0].class_name, "P6");
        assert_eq!(import.valid_students[0].dob, "2012-09-09");

        let import = import_roster("name,dob\nYaw Boateng,2012/09/09\n", &ImportOptions::default(), YEAR).unwrap();
        assert!(import.valid_students.is_empty());
        assert_eq!(import.errors[0].message, "class name is required");
    }

    #[test]
    fn template_adds_extension() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("roster");
        let path = roster_template(base.to_str().unwrap()).unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("csv"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "name,dob,className\n");
    }

    proptest! {
        #[test]
        fn export_then_parse_round_trips(
            rows in prop::collection::vec(
                prop::collection::vec("[ a-zA-Z0-9,\"]{0,12}", 3),
                1..8,
            )
        ) {
            let text = records_to_csv(&ROSTER_HEADERS, &rows).unwrap();
            let table = parse_csv(&text, &CsvOptions::default()).unwrap();
            prop_assert_eq!(table.headers, ROSTER_HEADERS.to_vec());
            let expected: Vec<Vec<String>> = rows
                .iter()
                .map(|r| r.iter().map(|f| f.trim().to_string()).collect::<Vec<_>>())
                .filter(|r| r.iter().any(|f| !f.is_empty()))
                .collect();
            let parsed: Vec<Vec<String>> = table
                .rows
                .into_iter()
                .filter(|r| r.iter().any(|f| !f.is_empty()))
                .collect();
            prop_assert_eq!(parsed, expected);
        }
    }
}
