//! Command line front-ends shared by `bg_setenv` and `bg_printenv`.
//!
//! Options that modify the environment are staged in the order they appear
//! on the command line, regardless of which option they belong to, so
//! `-r 3 -x a=1 -r 4` ends with revision 4.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser};
use tracing_subscriber::EnvFilter;

use crate::commit;
use crate::config::{resolve_env_file, EnvConfig, DEFAULT_PARTITIONS};
use crate::dump::{self, Fields};
use crate::error::Result;
use crate::journal::{Journal, WellKnownField};
use crate::select;
use crate::store::file::read_env_file;
use crate::store::{DirStore, RecordStore};
use crate::Error;

/// Where the redundant environment copies live.
#[derive(Args, Debug, Clone)]
pub struct BackendArgs {
    /// Directory holding one numbered sub-directory per environment partition
    #[arg(long, env = "BGENV_DIR", default_value = "/boot/bgenv", value_name = "DIR")]
    pub env_dir: PathBuf,

    /// Number of environment partitions
    #[arg(long, env = "BGENV_PARTITIONS", default_value_t = DEFAULT_PARTITIONS, value_name = "N")]
    pub partitions: usize,
}

impl BackendArgs {
    pub fn config(&self) -> EnvConfig {
        EnvConfig::new(&self.env_dir).partitions(self.partitions)
    }
}

#[derive(Parser, Debug)]
#[command(name = "bg_setenv")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Modify the boot environment")]
pub struct SetenvArgs {
    #[command(flatten)]
    pub backend: BackendArgs,

    /// Write the environment to this file instead of the partitions
    #[arg(short = 'f', long = "filepath", value_name = "ENVFILE")]
    pub filepath: Option<PathBuf>,

    /// Update the environment in partition ENV_PART
    #[arg(short = 'p', long = "part", value_name = "ENV_PART")]
    pub part: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Start from the existing content of the -f file
    #[arg(short = 'P', long)]
    pub preserve: bool,

    /// Set kernel to load
    #[arg(short = 'k', long = "kernel", value_name = "KERNEL")]
    pub kernel: Vec<String>,

    /// Set kernel arguments
    #[arg(short = 'a', long = "args", value_name = "KERNEL_ARGS")]
    pub args: Vec<String>,

    /// Set revision value
    #[arg(short = 'r', long = "revision", value_name = "REVISION")]
    pub revision: Vec<String>,

    /// Set update status: 0 (OK), 1 (INSTALLED), 2 (TESTING), 3 (FAILED) or the state name
    #[arg(short = 's', long = "ustate", value_name = "USTATE")]
    pub ustate: Vec<String>,

    /// Watchdog timeout in seconds
    #[arg(short = 'w', long = "watchdog", value_name = "WATCHDOG_TIMEOUT")]
    pub watchdog: Vec<String>,

    /// Confirm the running environment (sets the update state to OK)
    #[arg(short = 'c', long = "confirm")]
    pub confirm: bool,

    /// Clone the latest environment into the oldest one and bump its revision
    #[arg(short = 'u', long = "update")]
    pub update: bool,

    /// Set a user variable; KEY alone or KEY= deletes it
    #[arg(short = 'x', long = "uservar", value_name = "KEY=VAL")]
    pub uservar: Vec<String>,

    /// Set the in_progress variable, 0 or 1
    #[arg(short = 'i', long = "in_progress", value_name = "IN_PROGRESS")]
    pub in_progress: Vec<String>,
}

/// One modification requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Field(WellKnownField, String),
    Confirm,
    UserVar(String),
}

impl SetenvArgs {
    /// Parses `argv` and recovers the command line order of every
    /// modification.
    pub fn parse_ordered<I, T>(argv: I) -> std::result::Result<(Self, Vec<Intent>), clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(argv)?;
        let args = Self::from_arg_matches(&matches)?;
        let intents = args.intents(&matches);
        Ok((args, intents))
    }

    fn intents(&self, matches: &ArgMatches) -> Vec<Intent> {
        let fields = [
            ("kernel", WellKnownField::KernelFile, &self.kernel),
            ("args", WellKnownField::KernelParams, &self.args),
            ("revision", WellKnownField::Revision, &self.revision),
            ("ustate", WellKnownField::UpdateState, &self.ustate),
            ("watchdog", WellKnownField::WatchdogTimeout, &self.watchdog),
            ("in_progress", WellKnownField::InProgress, &self.in_progress),
        ];

        let mut ordered: Vec<(usize, Intent)> = Vec::new();
        for (id, field, values) in fields {
            ordered.extend(
                positions(matches, id)
                    .zip(values)
                    .map(|(at, value)| (at, Intent::Field(field, value.clone()))),
            );
        }
        ordered.extend(
            positions(matches, "uservar")
                .zip(&self.uservar)
                .map(|(at, value)| (at, Intent::UserVar(value.clone()))),
        );
        if self.confirm {
            if let Some(at) = matches.index_of("confirm") {
                ordered.push((at, Intent::Confirm));
            }
        }

        ordered.sort_by_key(|(at, _)| *at);
        ordered.into_iter().map(|(_, intent)| intent).collect()
    }
}

fn positions<'a>(matches: &'a ArgMatches, id: &str) -> impl Iterator<Item = usize> + 'a {
    matches.indices_of(id).into_iter().flatten()
}

/// Stages `intents` in order. The first invalid one aborts the whole
/// invocation before anything is opened.
pub fn stage_intents(journal: &mut Journal, intents: &[Intent]) -> Result<()> {
    for intent in intents {
        match intent {
            Intent::Field(field, value) => journal.stage_field(*field, value)?,
            Intent::Confirm => journal.stage_field(WellKnownField::UpdateState, "0")?,
            Intent::UserVar(arg) => journal.stage_uservar_arg(arg)?,
        }
    }
    Ok(())
}

pub fn run_setenv(args: &SetenvArgs, intents: &[Intent], out: &mut dyn Write) -> Result<()> {
    let mode = select::resolve_mode(args.part, args.update)?;
    if let Some(index) = args.part {
        select::validate_index(index, args.backend.partitions)?;
    }
    let mut journal = Journal::new();
    stage_intents(&mut journal, intents)?;

    if let Some(filepath) = &args.filepath {
        let path = resolve_env_file(filepath);
        if args.verbose {
            writeln!(out, "Processing journal...")?;
        }
        let outcome = commit::commit_file(&path, args.preserve, &mut journal)?;
        if args.verbose {
            write!(out, "{}", dump::project(&outcome.record, Fields::ALL))?;
        }
        writeln!(out, "Output written to {}.", path.display())?;
        return Ok(());
    }

    let store = DirStore::open(args.backend.config())?;
    if args.verbose {
        dump_all(&store, Fields::ALL, out)?;
        writeln!(out, "Processing journal...")?;
    }

    let outcome = commit::commit_backend(&store, mode, &mut journal)?;
    if args.verbose {
        writeln!(out, "New environment data:")?;
        writeln!(out, "---------------------")?;
        write!(out, "{}", dump::project(&outcome.record, Fields::ALL))?;
    }
    writeln!(out, "Environment update was successful.")?;
    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "bg_printenv")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Print the boot environment")]
pub struct PrintenvArgs {
    #[command(flatten)]
    pub backend: BackendArgs,

    /// Read the environment from this file
    #[arg(short = 'f', long = "filepath", value_name = "ENVFILE")]
    pub filepath: Option<PathBuf>,

    /// Only print partition ENV_PART
    #[arg(short = 'p', long = "part", value_name = "ENV_PART")]
    pub part: Option<usize>,

    /// Only print the latest environment
    #[arg(short = 'c', long = "current")]
    pub current: bool,

    /// Comma separated fields: in_progress, revision, kernel, kernelargs,
    /// watchdog_timeout, ustate, user
    #[arg(short = 'o', long = "output", value_name = "LIST")]
    pub output: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn run_printenv(args: &PrintenvArgs, out: &mut dyn Write) -> Result<()> {
    let fields = match &args.output {
        Some(list) => list.parse()?,
        None => Fields::ALL,
    };

    let selectors = [args.filepath.is_some(), args.part.is_some(), args.current];
    if selectors.iter().filter(|set| **set).count() > 1 {
        return Err(Error::validation("only one of -c/-f/-p can be set"));
    }

    if let Some(filepath) = &args.filepath {
        let record = read_env_file(filepath)?;
        write!(out, "{}", dump::project(&record, fields))?;
        return Ok(());
    }
    if let Some(index) = args.part {
        select::validate_index(index, args.backend.partitions)?;
    }

    // Readers rely on writers replacing files atomically and take no lock.
    let store = DirStore::open(args.backend.config().lock(false))?;
    if args.current {
        writeln!(out, "Using latest config partition")?;
        let handle = store.open_latest()?;
        write!(out, "{}", dump::project(&handle.record, fields))?;
        store.close(handle);
    } else if let Some(index) = args.part {
        writeln!(out, "Using config partition #{}", index)?;
        let handle = store.open_by_index(index)?;
        write!(out, "{}", dump::project(&handle.record, fields))?;
        store.close(handle);
    } else {
        dump_all(&store, fields, out)?;
    }
    Ok(())
}

fn dump_all<S: RecordStore + ?Sized>(store: &S, fields: Fields, out: &mut dyn Write) -> Result<()> {
    for index in 0..store.count() {
        writeln!(out, "\n----------------------------")?;
        write!(out, " Config Partition #{} ", index)?;
        let handle = store.open_by_index(index)?;
        write!(out, "{}", dump::project(&handle.record, fields))?;
        store.close(handle);
    }
    Ok(())
}

/// Installs the stderr subscriber. `RUST_LOG` wins over `-v`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
