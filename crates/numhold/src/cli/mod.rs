//! Command-line definition.

pub mod setup;

use clap::{builder::PossibleValuesParser, value_parser, Arg, ArgAction, ArgMatches, Command};
use numhold_core::RecordStatus;

/// Ten years, the longest hold the CLI accepts.
const MAX_HOLD_MINUTES: u64 = 60 * 24 * 365 * 10;

pub fn build_cli() -> Command {
    Command::new("numhold")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Track claimed numbers through waiting, hold and resolution")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("db")
                .long("db")
                .global(true)
                .value_name("PATH")
                .help("Database file (overrides config)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("PATH")
                .help("Extra config file, applied after global and project config"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print results as JSON"),
        )
        .arg(
            Arg::new("operator")
                .long("operator")
                .global(true)
                .value_name("ID")
                .help("Operator acting on records [default: $NUMHOLD_OPERATOR or $USER]"),
        )
        .subcommand(cmd_serve())
        .subcommand(
            Command::new("enqueue")
                .about("Add a number to the waiting list")
                .arg(number_arg()),
        )
        .subcommand(
            Command::new("hold")
                .about("Take a waiting number into hold")
                .arg(number_arg())
                .arg(
                    Arg::new("minutes")
                        .long("minutes")
                        .value_parser(value_parser!(u64).range(0..=MAX_HOLD_MINUTES))
                        .help("Hold duration; omitted uses the configured default"),
                ),
        )
        .subcommand(
            Command::new("success")
                .about("Resolve a held number as success")
                .arg(number_arg()),
        )
        .subcommand(
            Command::new("fail")
                .about("Resolve a held number as failed")
                .arg(number_arg()),
        )
        .subcommand(
            Command::new("remove")
                .about("Delete a number in any status")
                .arg(number_arg()),
        )
        .subcommand(
            Command::new("find")
                .about("Show one number")
                .arg(number_arg()),
        )
        .subcommand(cmd_list())
        .subcommand(
            Command::new("count")
                .about("Count numbers")
                .arg(status_arg())
                .arg(owner_arg()),
        )
        .subcommand(
            Command::new("clear")
                .about("Delete every number")
                .arg(
                    Arg::new("yes")
                        .long("yes")
                        .action(ArgAction::SetTrue)
                        .required(true)
                        .help("Confirm deleting everything"),
                ),
        )
}

fn cmd_serve() -> Command {
    Command::new("serve")
        .about("Run the hold sweep and stale purge until interrupted")
        .long_about(
            "Run the hold sweep and stale purge until SIGINT or SIGTERM.\n\n\
             The default hold duration is read at startup. Send SIGHUP to re-read \
             default_hold_minutes from the config files and NUMHOLD_DEFAULT_HOLD_MINUTES; \
             holds already taken keep the duration they captured.",
        )
        .arg(
            Arg::new("sweep-secs")
                .long("sweep-secs")
                .value_parser(value_parser!(u64).range(1..))
                .help("Seconds between hold sweeps"),
        )
        .arg(
            Arg::new("purge-secs")
                .long("purge-secs")
                .value_parser(value_parser!(u64).range(1..))
                .help("Seconds between stale purges"),
        )
        .arg(
            Arg::new("retention-hours")
                .long("retention-hours")
                .value_parser(value_parser!(u64).range(1..))
                .help("Age after which waiting numbers are purged"),
        )
        .arg(
            Arg::new("default-hold-minutes")
                .long("default-hold-minutes")
                .value_parser(value_parser!(u64).range(0..=MAX_HOLD_MINUTES))
                .help("Default hold duration for holds taken without one (until SIGHUP reload)"),
        )
}

fn cmd_list() -> Command {
    Command::new("list")
        .about("List numbers, oldest first")
        .arg(status_arg())
        .arg(owner_arg())
        .arg(
            Arg::new("page")
                .long("page")
                .value_parser(value_parser!(u32))
                .default_value("1"),
        )
        .arg(
            Arg::new("page-size")
                .long("page-size")
                .value_parser(value_parser!(u32))
                .default_value("20"),
        )
}

fn number_arg() -> Arg {
    Arg::new("number").required(true).value_name("NUMBER")
}

fn status_arg() -> Arg {
    Arg::new("status")
        .long("status")
        .value_parser(PossibleValuesParser::new(["waiting", "hold", "success", "failed"]))
}

fn owner_arg() -> Arg {
    Arg::new("owner")
        .long("owner")
        .value_name("ID")
        .help("Only numbers enqueued by this operator")
}

/// The `--status` filter, if given.
pub fn status_filter(matches: &ArgMatches) -> numhold_core::Result<Option<RecordStatus>> {
    matches
        .get_one::<String>("status")
        .map(|s| s.parse())
        .transpose()
}
