mod cli;

use anyhow::{Context, Result, bail};
use chrono::{Datelike, Utc};
use clap::Parser;
use cli::{Args, Command, CsvArgs, ExportFormat, RosterArgs, StockCommand, UsersCommand};
use freebooks::access::{Action, authorize};
use freebooks::auth::{AuthService, Session};
use freebooks::inventory::Inventory;
use freebooks::model::{ClaimantInfo, SubmissionDraft, User};
use freebooks::report::{self, output_path};
use freebooks::roster::{
    CsvOptions, ImportOptions, RosterImport, read_roster_file, roster_template, students_to_csv,
};
use freebooks::search::search_students;
use freebooks::service::{DistributionService, SubmissionService};
use freebooks::store::{MemoryRepository, Repository, SnapshotStore};
use freebooks::validate::validate_school_submission;
use std::path::Path;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Loaded snapshot plus the logged-in user, if any.
struct App {
    store: SnapshotStore,
    repo: MemoryRepository,
    inventory: Inventory,
    session: Option<Session>,
}

impl App {
    fn open(data_dir: &Path) -> Result<Self> {
        let store = SnapshotStore::open(data_dir)
            .with_context(|| format!("cannot open data directory {}", data_dir.display()))?;
        Ok(Self {
            repo: store.load_state()?,
            inventory: store.load_inventory()?,
            session: store.load_session()?,
            store,
        })
    }

    fn require(&mut self, action: Action) -> Result<User> {
        let user = AuthService::new(&mut self.repo).current_user(self.session.as_ref())?;
        authorize(&user, action)?;
        debug!(user = %user.username, %action, "access granted");
        Ok(user)
    }

    fn save(&self) -> Result<()> {
        self.store.save_state(&self.repo)?;
        self.store.save_inventory(&self.inventory)?;
        Ok(())
    }
}

fn csv_options(args: &CsvArgs) -> Result<ImportOptions> {
    if !args.delimiter.is_ascii() {
        bail!("delimiter must be a single ASCII character");
    }
    Ok(ImportOptions {
        csv: CsvOptions {
            delimiter: args.delimiter as u8,
            has_header: !args.no_header,
            trim: true,
        },
        default_class: args.class.clone(),
    })
}

fn print_import(import: &RosterImport) {
    for issue in &import.errors {
        println!("error   {issue}");
    }
    for issue in &import.warnings {
        println!("warning {issue}");
    }
}

fn load_draft(path: &Path, roster: &RosterArgs) -> Result<SubmissionDraft> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read draft {}", path.display()))?;
    let mut draft: SubmissionDraft =
        serde_json::from_str(&text).with_context(|| format!("invalid draft {}", path.display()))?;
    if let Some(file) = &roster.roster {
        let import = read_roster_file(file, &csv_options(&roster.csv)?, Utc::now().year())?;
        print_import(&import);
        draft.students.extend(import.valid_students);
    }
    Ok(draft)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Commands that work on local files only and never touch the data directory.
fn run_offline(command: Command) -> Result<()> {
    match command {
        Command::InitRoster { file } => {
            let path = roster_template(&file)?;
            println!("Roster template created: {}", path.display());
        }
        Command::Validate { draft, roster } => {
            let draft = load_draft(&draft, &roster)?;
            let result = validate_school_submission(&draft, Utc::now().date_naive());
            print_json(&result)?;
            if !result.is_valid {
                bail!("draft has {} blocking error(s)", result.errors.len());
            }
        }
        Command::ImportRoster { file, csv, output } => {
            let import = read_roster_file(&file, &csv_options(&csv)?, Utc::now().year())?;
            print_import(&import);
            match output {
                Some(path) => {
                    std::fs::write(&path, students_to_csv(&import.valid_students)?)?;
                    println!("Clean roster written: {}", path.display());
                }
                None => print_json(&import.valid_students)?,
            }
            println!(
                "{} valid, {} rows with errors",
                import.valid_students.len(),
                import
                    .errors
                    .iter()
                    .map(|e| e.row)
                    .collect::<std::collections::BTreeSet<_>>()
                    .len()
            );
        }
        other => bail!("{other:?} needs the data directory"),
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let data_dir = args.data_dir;
    let command = match args.command {
        command @ (Command::InitRoster { .. }
        | Command::Validate { .. }
        | Command::ImportRoster { .. }) => return run_offline(command),
        command => command,
    };
    let mut app = App::open(&data_dir)?;

    match command {
        Command::InitRoster { .. } | Command::Validate { .. } | Command::ImportRoster { .. } => {
            unreachable!("handled without the data directory")
        }
        Command::Login { username, password } => {
            let session = AuthService::new(&mut app.repo).login(&username, &password)?;
            app.store.save_session(&session)?;
            println!("Logged in as {} ({})", session.user.username, session.user.role);
        }
        Command::Logout => {
            app.store.clear_session()?;
            println!("Logged out");
        }
        Command::Whoami => {
            let user = app.require(Action::Dashboard)?;
            println!("{} ({})", user.username, user.role);
            let actions: Vec<&str> = freebooks::access::permitted_actions(user.role)
                .iter()
                .map(|a| a.route())
                .collect();
            println!("Allowed: {}", actions.join(", "));
        }
        Command::Submit { draft, roster } => {
            let user = app.require(Action::Submission)?;
            let draft = load_draft(&draft, &roster)?;
            let submission = SubmissionService::new(&mut app.repo).submit(&draft, &user)?;
            app.save()?;
            for w in &submission.warnings {
                println!("warning {w}");
            }
            println!(
                "Submitted {} ({} declared), id {}",
                submission.school.name, submission.school.total_declared, submission.school.id
            );
        }
        Command::Approve { id } => {
            let user = app.require(Action::Approvals)?;
            let school = SubmissionService::new(&mut app.repo).approve(&id, &user)?;
            app.save()?;
            println!("Approved {}", school.name);
        }
        Command::Reject { id, reason } => {
            let user = app.require(Action::Approvals)?;
            let school = SubmissionService::new(&mut app.repo).reject(&id, &user, &reason)?;
            app.save()?;
            println!("Rejected {}", school.name);
        }
        Command::Deliver { id, proofs } => {
            let user = app.require(Action::DeliveryEntry)?;
            let before = app.inventory.distributed();
            let school = DistributionService::new(&mut app.repo, &mut app.inventory)
                .record_delivery(&id, &proofs, &user)?;
            app.save()?;
            println!(
                "Delivered {} books to {}; {} remaining",
                app.inventory.distributed() - before,
                school.name,
                app.inventory.remaining()
            );
        }
        Command::Search { query, limit } => {
            app.require(Action::Collection)?;
            for hit in search_students(app.repo.students(), &query, limit) {
                let s = hit.student;
                println!(
                    "{:.2}  {}  {}  {}  {}{}",
                    hit.score,
                    s.id,
                    s.name,
                    s.dob,
                    s.school_id,
                    if s.issued { "  (issued)" } else { "" }
                );
            }
        }
        Command::Collect {
            student_id,
            voter_id,
            claimant_name,
            proofs,
        } => {
            let user = app.require(Action::Collection)?;
            let claimant = voter_id.map(|voter_id| ClaimantInfo {
                voter_id,
                proof_urls: proofs,
                claimant_name,
            });
            let record = DistributionService::new(&mut app.repo, &mut app.inventory)
                .collect(&student_id, claimant, &user)?;
            app.save()?;
            println!(
                "Issued {} books to {}; {} remaining",
                record.books,
                record.student_id,
                app.inventory.remaining()
            );
        }
        Command::RegisterExternal { name, dob, class } => {
            app.require(Action::Collection)?;
            let student = DistributionService::new(&mut app.repo, &mut app.inventory)
                .register_external(&name, &dob, class.as_deref())?;
            app.save()?;
            println!("Registered {}, id {}", student.name, student.id);
        }
        Command::Stock(StockCommand::Add {
            year,
            books,
            budget,
        }) => {
            app.require(Action::Inventory)?;
            app.inventory.add_stock(year, books, budget);
            app.save()?;
            println!(
                "Stock now {} books, {} remaining",
                app.inventory.total_books(),
                app.inventory.remaining()
            );
        }
        Command::Stock(StockCommand::Show) => {
            app.require(Action::Dashboard)?;
            println!(
                "total {}  distributed {}  remaining {}",
                app.inventory.total_books(),
                app.inventory.distributed(),
                app.inventory.remaining()
            );
            for r in app.inventory.yearly_records() {
                println!("{}  +{} books  budget {:.2}", r.year, r.books_added, r.budget);
            }
        }
        Command::Users(UsersCommand::Add {
            username,
            password,
            role,
            school_id,
        }) => {
            app.require(Action::UserManagement)?;
            let user =
                AuthService::new(&mut app.repo).add_user(&username, &password, role, school_id)?;
            app.save()?;
            println!("Added {} ({}), id {}", user.username, user.role, user.id);
        }
        Command::Users(UsersCommand::List) => {
            app.require(Action::UserManagement)?;
            for u in app.repo.users() {
                println!(
                    "{}  {}  {}  {}",
                    u.id,
                    u.username,
                    u.role,
                    u.school_id.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Schools => {
            let user = app.require(Action::Dashboard)?;
            let schools = SubmissionService::new(&mut app.repo).visible_schools(&user);
            for s in schools {
                println!(
                    "{}  {:<9}  {:>5}  {}",
                    s.id, s.status, s.total_declared, s.name
                );
            }
        }
        Command::Summary => {
            app.require(Action::Dashboard)?;
            print_json(&report::summarize(&app.repo, &app.inventory))?;
        }
        Command::Export { format, output } => {
            let user = app.require(Action::Reports)?;
            match format {
                ExportFormat::Xlsx => {
                    let path = output_path(&data_dir, "report", "xlsx", output);
                    let today = Utc::now().format("%Y-%m-%d").to_string();
                    report::write_workbook(&path, &app.repo, &app.inventory, &user.username, &today)?;
                    println!("Report written: {}", path.display());
                }
                ExportFormat::Csv => {
                    let dir = output.unwrap_or_else(|| data_dir.clone());
                    std::fs::create_dir_all(&dir)?;
                    let schools = output_path(&dir, "schools", "csv", None);
                    let issues = output_path(&dir, "issue-records", "csv", None);
                    std::fs::write(&schools, report::schools_csv(app.repo.schools())?)?;
                    std::fs::write(&issues, report::issue_records_csv(app.repo.issue_records())?)?;
                    println!("Exported {} and {}", schools.display(), issues.display());
                }
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    run(args)
}
