use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sculpt", version, about = "Plan mesocycles and log training sessions")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Emit machine-readable JSON instead of colorful text.
    #[arg(global = true, long)]
    pub json: bool,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create, start and stop mesocycles
    #[command(subcommand, visible_alias = "m")]
    Mesocycle(MesocycleCmd),

    /// Edit the template days of a mesocycle
    #[command(subcommand, visible_alias = "p")]
    Plan(PlanCmd),

    /// Show and log a training day
    #[command(subcommand, visible_alias = "d")]
    Day(DayCmd),

    /// Show the whole mesocycle as a calendar
    #[command(visible_alias = "cal")]
    Calendar {
        /// Mesocycle index (from `m list`) or name; defaults to the active one
        mesocycle: Option<String>,
    },

    /// Exercise catalog
    #[command(subcommand, visible_alias = "ex")]
    Exercise(ExerciseCmd),

    /// View or edit sculpt config
    #[command(subcommand)]
    Config(ConfigCmd),
}

#[derive(Subcommand)]
pub enum MesocycleCmd {
    /// Create a draft mesocycle
    #[command(visible_alias = "n")]
    New {
        name: String,

        /// Duration in weeks
        #[arg(short, long)]
        weeks: i64,

        /// Training days per microcycle
        #[arg(short, long)]
        days: i64,

        #[arg(short, long, default_value = "")]
        goal: String,

        /// 0-based rest offsets inside the microcycle, e.g. `3,4,5,6`
        #[arg(short, long, value_delimiter = ',')]
        rest_days: Vec<i64>,

        /// Labels for the training days, e.g. `Push,Pull,Legs`
        #[arg(short, long, value_delimiter = ',')]
        labels: Vec<String>,
    },

    /// List mesocycles
    #[command(visible_alias = "l")]
    List,

    /// Show the template days of a mesocycle
    #[command(visible_alias = "s")]
    Show {
        /// Mesocycle index (from `m list`) or name
        mesocycle: String,
    },

    /// Import one or more TOML plans
    #[command(visible_alias = "i")]
    Import { files: Vec<String> },

    /// Start a run of a mesocycle
    Start {
        mesocycle: String,

        /// First day of the run (defaults to today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Stop the active mesocycle
    Stop {
        /// Defaults to the active one
        mesocycle: Option<String>,
    },

    /// Show past and current runs
    #[command(visible_alias = "h")]
    History { mesocycle: String },
}

#[derive(Subcommand)]
pub enum PlanCmd {
    /// Rename a template day
    Label { mesocycle: String, day: i64, label: String },

    /// Append an exercise to a template day
    #[command(visible_alias = "a")]
    AddEx {
        mesocycle: String,
        day: i64,
        /// Exercise name or id
        exercise: String,
        #[arg(short, long, default_value_t = 3)]
        sets: i64,
    },

    /// Remove an exercise from a template day
    #[command(visible_alias = "r")]
    RemoveEx { mesocycle: String, day: i64, exercise: i64 },

    /// Move an exercise to another position
    Move {
        mesocycle: String,
        day: i64,
        from: i64,
        to: i64,
    },

    /// Set (or clear, when omitted) an exercise's notes
    #[command(visible_alias = "n")]
    Note {
        mesocycle: String,
        day: i64,
        exercise: i64,
        note: Option<String>,
    },

    /// Add a set to a template exercise
    AddSet { mesocycle: String, day: i64, exercise: i64 },

    /// Remove a set from a template exercise
    RemoveSet {
        mesocycle: String,
        day: i64,
        exercise: i64,
        set: i64,
    },

    /// Change a template set's targets
    UpdateSet {
        mesocycle: String,
        day: i64,
        exercise: i64,
        set: i64,
        #[command(flatten)]
        targets: TargetArgs,
    },
}

/// Which day a `day` command acts on.
#[derive(Args, Clone)]
pub struct DayArgs {
    /// Date of the day (YYYY-MM-DD, `today`, `tomorrow`...); defaults to today
    #[arg(long)]
    pub date: Option<String>,

    /// Mesocycle index or name; defaults to the active one
    #[arg(short, long)]
    pub mesocycle: Option<String>,
}

#[derive(Args, Clone)]
pub struct TargetArgs {
    /// Rep range, e.g. `8-12`
    #[arg(short, long)]
    pub reps: Option<String>,

    /// Reps in reserve
    #[arg(long)]
    pub rir: Option<i64>,

    /// Weight in kg
    #[arg(short, long)]
    pub weight: Option<f64>,

    /// Forget the weight
    #[arg(long, conflicts_with = "weight")]
    pub clear_weight: bool,
}

#[derive(Subcommand)]
pub enum DayCmd {
    /// Show the day
    #[command(visible_alias = "s")]
    Show {
        #[command(flatten)]
        at: DayArgs,
    },

    /// Add a set to an exercise
    AddSet {
        exercise: i64,
        #[command(flatten)]
        at: DayArgs,
    },

    /// Remove a set; later sets move up
    RemoveSet {
        exercise: i64,
        set: i64,
        #[command(flatten)]
        at: DayArgs,
    },

    /// Change a set's targets
    UpdateSet {
        exercise: i64,
        set: i64,
        #[command(flatten)]
        targets: TargetArgs,
        #[command(flatten)]
        at: DayArgs,
    },

    /// Mark a set done - Usage: day log EXERCISE SET REPS [--weight KG]
    #[command(visible_alias = "l")]
    #[command(override_usage = "day log <EXERCISE> <SET> <REPS> [--weight <KG>]")]
    Log {
        exercise: i64,
        set: i64,
        reps: i64,
        /// Weight actually used, if different from the plan
        #[arg(short, long)]
        weight: Option<f64>,
        #[command(flatten)]
        at: DayArgs,
    },

    /// Mark a set not done
    #[command(visible_alias = "u")]
    Undo {
        exercise: i64,
        set: i64,
        #[command(flatten)]
        at: DayArgs,
    },

    /// Finish (or update) the session
    #[command(visible_alias = "f")]
    Finish {
        #[arg(short, long)]
        feedback: Option<String>,
        #[command(flatten)]
        at: DayArgs,
    },

    /// Reopen a finished session
    Reopen {
        #[command(flatten)]
        at: DayArgs,
    },
}

#[derive(Subcommand)]
pub enum ExerciseCmd {
    /// Add a new exercise
    #[command(visible_alias = "a")]
    Add {
        /// Exercise name
        name: String,

        /// Muscle groups, e.g. `chest,triceps`
        #[arg(short, long, required = true, value_delimiter = ',')]
        muscle: Vec<String>,
    },

    /// Import exercises from a TOML file
    #[command(visible_alias = "i")]
    Import {
        /// Path to TOML file
        file: String,
    },

    /// List exercises
    #[command(visible_alias = "l")]
    List {
        /// Search names and muscle groups
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Delete one or more of your exercises
    #[command(visible_alias = "d")]
    Delete {
        /// Exercise names or ids
        #[arg(required = true)]
        exercises: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Show all config keys
    List,

    /// Get the value of a key
    Get { key: String },

    /// Set or override a key
    Set { key: String, val: String },

    /// Remove a key
    Unset { key: String },
}
