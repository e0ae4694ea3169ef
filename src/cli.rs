use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use freebooks::model::Role;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Free exercise book distribution tracker", long_about = None)]
pub struct Args {
    /// Where state, inventory and session files live.
    #[arg(short, long, default_value = "freebooks-data", global = true)]
    pub data_dir: PathBuf,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty roster CSV with the expected header.
    InitRoster { file: String },

    Login {
        username: String,
        #[arg(short, long)]
        password: String,
    },

    Logout,

    Whoami,

    /// Check a submission draft (JSON) without storing it.
    Validate {
        draft: PathBuf,
        #[command(flatten)]
        roster: RosterArgs,
    },

    /// Store a submission draft (JSON) as a pending school.
    Submit {
        draft: PathBuf,
        #[command(flatten)]
        roster: RosterArgs,
    },

    /// Check a roster CSV and print the rows that would be accepted.
    ImportRoster {
        file: PathBuf,
        #[command(flatten)]
        csv: CsvArgs,
        /// Write the accepted rows here as a clean roster CSV.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    Approve { id: String },

    Reject {
        id: String,
        #[arg(short, long)]
        reason: String,
    },

    /// Record a delivery to an approved school.
    Deliver {
        id: String,
        #[arg(long = "proof")]
        proofs: Vec<String>,
    },

    /// Look up students by name.
    Search {
        query: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Hand one student's books over at the desk.
    Collect {
        student_id: String,
        #[arg(long)]
        voter_id: Option<String>,
        #[arg(long)]
        claimant_name: Option<String>,
        #[arg(long = "proof")]
        proofs: Vec<String>,
    },

    /// Add a walk-in student with no school record.
    RegisterExternal {
        name: String,
        dob: String,
        #[arg(long)]
        class: Option<String>,
    },

    #[command(subcommand)]
    Stock(StockCommand),

    #[command(subcommand)]
    Users(UsersCommand),

    /// List the schools visible to the current user.
    Schools,

    Summary,

    Export {
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Xlsx)]
        format: ExportFormat,
        /// Output file (xlsx) or directory (csv).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CsvArgs {
    #[arg(long, default_value_t = ',')]
    pub delimiter: char,
    /// The file has no header row; columns are name,dob,className.
    #[arg(long)]
    pub no_header: bool,
    /// Class for rows that carry none.
    #[arg(long)]
    pub class: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RosterArgs {
    /// Roster CSV whose valid rows are added to the draft's students.
    #[arg(long)]
    pub roster: Option<PathBuf>,
    #[command(flatten)]
    pub csv: CsvArgs,
}

#[derive(Subcommand, Debug)]
pub enum StockCommand {
    Add {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        books: u64,
        #[arg(long, default_value_t = 0.0)]
        budget: f64,
    },
    Show,
}

#[derive(Subcommand, Debug)]
pub enum UsersCommand {
    Add {
        username: String,
        #[arg(short, long)]
        password: String,
        #[arg(short, long, value_enum)]
        role: Role,
        #[arg(long)]
        school_id: Option<String>,
    },
    List,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}
