use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use plannerapp::model::GoalStatus;
use serde_json::Value;

/// Returns the version string, including git hash and commit date for non-release builds.
/// Format for releases: "v0.3.2"
/// Format for dev builds: "v0.3.2\ndev: abc1234 2024-01-15 14:30"
fn get_version() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");
    const GIT_COMMIT_DATE: &str = env!("GIT_COMMIT_DATE");
    const IS_RELEASE: &str = env!("IS_RELEASE");

    use std::sync::OnceLock;
    static VERSION_STRING: OnceLock<String> = OnceLock::new();

    VERSION_STRING.get_or_init(|| {
        if IS_RELEASE == "true" {
            format!("v{}", VERSION)
        } else {
            format!("v{}\ndev: {} {}", VERSION, GIT_HASH, GIT_COMMIT_DATE)
        }
    })
}

#[derive(Parser, Debug)]
#[command(
    name = "planner",
    bin_name = "planner",
    version = get_version(),
    disable_help_subcommand = true,
    after_help = "Sign in by exporting PLANNER_USER (and PLANNER_TOKEN).\nServer and cache settings live in .planner/planner.toml or PLANNER_* variables."
)]
#[command(about = "Goals, notes and college plans, synced with your counselor", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output (debug logs on stderr)
    #[arg(short, long, global = true, help_heading = "Options")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Work with goals
    #[command(alias = "g", display_order = 1)]
    Goals {
        #[command(subcommand)]
        action: GoalCommands,
    },

    /// Work with counselor notes
    #[command(alias = "n", display_order = 2)]
    Notes {
        #[command(subcommand)]
        action: NoteCommands,
    },

    /// Work with saved college programs
    #[command(alias = "p", display_order = 3)]
    Programs {
        #[command(subcommand)]
        action: ProgramCommands,
    },

    /// Show or update the student profile
    #[command(display_order = 4)]
    Profile {
        #[command(subcommand)]
        action: ProfileCommands,
    },

    /// Inspect or clear the local cache
    #[command(display_order = 5)]
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
}

/// Options shared by every `list` command.
#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Search term
    #[arg(short, long)]
    pub search: Option<String>,

    /// Records per page
    #[arg(short = 'n', long)]
    pub limit: Option<u32>,

    /// Keep fetching until every page is shown
    #[arg(short, long)]
    pub all: bool,

    /// Skip the cache and fetch from the server
    #[arg(short, long)]
    pub refresh: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    NotStarted,
    InProgress,
    Completed,
}

impl StatusArg {
    /// The value the server stores and filters on.
    pub fn wire(&self) -> &'static str {
        match self {
            StatusArg::NotStarted => "not_started",
            StatusArg::InProgress => "in_progress",
            StatusArg::Completed => "completed",
        }
    }
}

impl From<StatusArg> for GoalStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::NotStarted => GoalStatus::NotStarted,
            StatusArg::InProgress => GoalStatus::InProgress,
            StatusArg::Completed => GoalStatus::Completed,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum GoalCommands {
    /// List goals
    #[command(alias = "ls", display_order = 1)]
    List {
        #[command(flatten)]
        list: ListArgs,

        /// Only goals in this category
        #[arg(short, long)]
        category: Option<String>,

        /// Only goals with this status
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
    },

    /// Add a goal
    #[command(display_order = 2)]
    Add {
        /// Title words (joined with spaces)
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,

        /// Category, e.g. Academic or Testing
        #[arg(short, long, default_value = "")]
        category: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Due date
        #[arg(long, value_name = "YYYY-MM-DD")]
        due: Option<NaiveDate>,
    },

    /// Change fields of a goal
    #[command(display_order = 3)]
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        category: Option<String>,

        #[arg(long, value_enum)]
        status: Option<StatusArg>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long, value_name = "YYYY-MM-DD")]
        due: Option<NaiveDate>,
    },

    /// Delete goals
    #[command(alias = "remove", display_order = 4)]
    Rm {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum NoteCommands {
    /// List notes
    #[command(alias = "ls", display_order = 1)]
    List {
        #[command(flatten)]
        list: ListArgs,
    },

    /// Add a note
    #[command(display_order = 2)]
    Add {
        /// Note text (joined with spaces)
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,

        /// Student the note is about
        #[arg(long)]
        student: Option<String>,
    },

    /// Replace the text of a note
    #[command(display_order = 3)]
    Edit {
        id: String,

        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Delete notes
    #[command(alias = "remove", display_order = 4)]
    Rm {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProgramCommands {
    /// List saved programs
    #[command(alias = "ls", display_order = 1)]
    List {
        #[command(flatten)]
        list: ListArgs,
    },

    /// Save a program
    #[command(display_order = 2)]
    Add {
        /// Program name (joined with spaces)
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,

        #[arg(short, long)]
        institution: Option<String>,

        #[arg(short, long)]
        url: Option<String>,
    },

    /// Change fields of a saved program
    #[command(display_order = 3)]
    Edit {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(short, long)]
        institution: Option<String>,

        #[arg(short, long)]
        url: Option<String>,
    },

    /// Remove saved programs
    #[command(alias = "remove", display_order = 4)]
    Rm {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// Show the profile
    #[command(display_order = 1)]
    Show,

    /// Set profile fields, e.g. `school="Lincoln High" gpa=3.8`
    #[command(display_order = 2)]
    Set {
        #[arg(required = true, num_args = 1.., value_name = "FIELD=VALUE", value_parser = parse_assignment)]
        fields: Vec<(String, Value)>,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// List cached entries and their age
    #[command(display_order = 1)]
    Status,

    /// Delete every cached entry
    #[command(display_order = 2)]
    Clear,
}

/// Profile fields `profile set` accepts, in wire spelling.
pub const PROFILE_FIELDS: [&str; 7] = [
    "firstName",
    "lastName",
    "gradeLevel",
    "school",
    "gpa",
    "intendedMajor",
    "interests",
];

fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for ch in name.chars() {
        if ch == '_' || ch == '-' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Parses `field=value`. `gpa` must be a number and `interests` is a comma-separated
/// list; every other field is text.
pub fn parse_assignment(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got '{}'", raw))?;
    let field = camel_case(name.trim());
    if !PROFILE_FIELDS.contains(&field.as_str()) {
        return Err(format!(
            "unknown profile field '{}' (expected one of: {})",
            name.trim(),
            PROFILE_FIELDS.join(", ")
        ));
    }
    let value = value.trim();
    let parsed = match field.as_str() {
        "gpa" => value
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| format!("gpa must be a number, got '{}'", value))?,
        "interests" => Value::from(
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect::<Vec<_>>(),
        ),
        _ => Value::String(value.to_string()),
    };
    Ok((field, parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["planner"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_goal_add_joins_title() {
        let cli = parse(&["goals", "add", "Finish", "FAFSA", "-c", "Academic"]);
        match cli.command {
            Commands::Goals {
                action: GoalCommands::Add {
                    title, category, ..
                },
            } => {
                assert_eq!(title.join(" "), "Finish FAFSA");
                assert_eq!(category, "Academic");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_goal_list_filters() {
        let cli = parse(&["goals", "ls", "--status", "in-progress", "--all", "-n", "5"]);
        match cli.command {
            Commands::Goals {
                action: GoalCommands::List { list, status, .. },
            } => {
                assert_eq!(status, Some(StatusArg::InProgress));
                assert!(list.all);
                assert_eq!(list.limit, Some(5));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_goal_edit_parses_due_date() {
        let cli = parse(&["goals", "edit", "12", "--due", "2026-11-01"]);
        match cli.command {
            Commands::Goals {
                action: GoalCommands::Edit { id, due, .. },
            } => {
                assert_eq!(id, "12");
                assert_eq!(due, NaiveDate::from_ymd_opt(2026, 11, 1));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_bad_due_date_is_rejected() {
        let result = Cli::try_parse_from(["planner", "goals", "edit", "1", "--due", "soon"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rm_requires_ids() {
        assert!(Cli::try_parse_from(["planner", "notes", "rm"]).is_err());
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = parse(&["cache", "status", "-v"]);
        assert!(cli.verbose);
    }

    #[test]
    fn test_parse_assignment_values() {
        assert_eq!(
            parse_assignment("gpa=3.8").unwrap(),
            ("gpa".to_string(), serde_json::json!(3.8))
        );
        assert_eq!(
            parse_assignment("school=Lincoln High").unwrap(),
            ("school".to_string(), serde_json::json!("Lincoln High"))
        );
        assert_eq!(
            parse_assignment("first_name=Ana").unwrap(),
            ("firstName".to_string(), serde_json::json!("Ana"))
        );
        assert_eq!(
            parse_assignment("interests=art, music").unwrap(),
            ("interests".to_string(), serde_json::json!(["art", "music"]))
        );
        assert_eq!(
            parse_assignment("gradeLevel=11").unwrap(),
            ("gradeLevel".to_string(), serde_json::json!("11"))
        );
    }

    #[test]
    fn test_parse_assignment_errors() {
        assert!(parse_assignment("gpa").is_err());
        assert!(parse_assignment("shoeSize=9").is_err());
        assert!(parse_assignment("gpa=high").is_err());
    }

    #[test]
    fn test_profile_set_uses_parser() {
        let cli = parse(&["profile", "set", "gpa=4.0", "school=Central"]);
        match cli.command {
            Commands::Profile {
                action: ProfileCommands::Set { fields },
            } => assert_eq!(fields.len(), 2),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
