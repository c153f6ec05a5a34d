use anyhow::{Result, bail, format_err};
use clap::{Arg, ArgAction, Command};
use dialoguer::Confirm;
use log::LevelFilter;
use simplelog::{Config, WriteLogger};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::process::exit;

mod build_record;
mod parse_records;
mod record_document;

#[cfg(all(feature = "fast-alloc", not(windows)))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[cfg(all(feature = "fast-alloc", windows))]
#[global_allocator]
static ALLOC: rpmalloc::RpMalloc = rpmalloc::RpMalloc;

/// If `prompt` is passed, will display a confirmation prompt before overwriting files.
fn create_output_file(path: impl AsRef<Path>, prompt: bool) -> Result<File> {
    let p = path.as_ref();

    if p.is_dir() {
        bail!(
            "There is a directory at {}, refusing to overwrite",
            p.display()
        );
    }

    if p.exists() && prompt {
        match Confirm::new()
            .with_prompt(format!(
                "Are you sure you want to override output file at {}",
                p.display()
            ))
            .default(false)
            .interact()
        {
            Ok(true) => {}
            Ok(false) => bail!("Cancelled"),
            Err(e) => {
                return Err(format_err!(
                    "Failed to write confirmation prompt to term caused by\n{}",
                    e
                ));
            }
        }
    }

    // Ok to assume p is not an existing directory
    if let Some(parent) = p.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(File::create(p)?)
}

fn try_to_initialize_logging(occurrences: u8) {
    let level = match occurrences {
        0 => return,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        3 => LevelFilter::Trace,
        _ => {
            eprintln!("using more than  -vvv does not affect verbosity level");
            LevelFilter::Trace
        }
    };

    if let Err(e) = WriteLogger::init(level, Config::default(), io::stderr()) {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

fn cli() -> Command {
    Command::new("etwrec_dump")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Utility to build, decode and filter ETW event records")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .global(true)
                .help("-v - info, -vv - debug, -vvv - trace."),
        )
        .subcommand(build_record::command())
        .subcommand(parse_records::command())
}

fn main() {
    let matches = cli().get_matches();
    try_to_initialize_logging(matches.get_count("verbose"));

    let result = match matches.subcommand() {
        Some(("build", sub)) => build_record::run(sub),
        Some(("parse", sub)) => parse_records::run(sub),
        _ => Err(format_err!("unknown subcommand")),
    };

    if let Err(e) = result {
        eprintln!("{:?}", e);
        exit(1);
    }
}
