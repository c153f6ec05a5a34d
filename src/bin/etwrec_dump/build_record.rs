use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command};
use etwrec::{Guid, LayoutRegistry, RecordBuilder};
use indoc::indoc;
use log::info;
use std::fs::File;
use std::io::{self, Write};

use crate::create_output_file;
use crate::record_document::{RecordDocument, parse_literal, split_assignment};

pub fn command() -> Command {
    Command::new("build")
        .about("Build a synthetic record from a layout manifest (JSONL)")
        .long_about(indoc!(
            r#"
            Build a synthetic record from a layout manifest.

            Every `--field Name=Value` is interpreted according to the type the layout declares
            for `Name`. The packed record is written as a single JSON line which `parse` reads.

            Example:
              etwrec_dump build -l layouts.json --event-id 301 --version 4 \
                  --field TargetUserName=alice --field KeyLength=5
        "#
        ))
        .arg(
            Arg::new("layouts")
                .long("layouts")
                .short('l')
                .required(true)
                .value_name("MANIFEST")
                .help("JSON layout manifest."),
        )
        .arg(
            Arg::new("event-id")
                .long("event-id")
                .required(true)
                .value_parser(clap::value_parser!(u16))
                .value_name("ID"),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .default_value("0")
                .value_parser(clap::value_parser!(u8))
                .value_name("VERSION"),
        )
        .arg(
            Arg::new("provider")
                .long("provider")
                .default_value("00000000-0000-0000-0000-000000000000")
                .value_parser(clap::value_parser!(Guid))
                .value_name("GUID"),
        )
        .arg(
            Arg::new("field")
                .long("field")
                .short('f')
                .action(ArgAction::Append)
                .value_name("NAME=VALUE")
                .help("Field assignment. Can be passed multiple times."),
        )
        .arg(
            Arg::new("stack")
                .long("stack")
                .action(ArgAction::Append)
                .value_name("ADDRESS")
                .help("Captured return address (hex). Can be passed multiple times."),
        )
        .arg(
            Arg::new("incomplete")
                .long("incomplete")
                .action(ArgAction::SetTrue)
                .help("Pack even if the layout declares fields that were not given."),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .value_name("PATH")
                .help("Writes the record to the file specified instead of stdout. \
                       Will ask for confirmation before overwriting files, to allow overwriting, pass `--no-confirm-overwrite`"),
        )
        .arg(
            Arg::new("no-confirm-overwrite")
                .long("no-confirm-overwrite")
                .action(ArgAction::SetTrue)
                .help("When set, will not ask for confirmation before overwriting files, useful for automation"),
        )
}

pub fn run(matches: &ArgMatches) -> Result<()> {
    let manifest = matches
        .get_one::<String>("layouts")
        .expect("required argument");
    let file = File::open(manifest).with_context(|| format!("failed to open `{manifest}`"))?;
    let registry = LayoutRegistry::from_manifest_reader(io::BufReader::new(file))
        .with_context(|| format!("failed to load layouts from `{manifest}`"))?;

    let event_id = *matches.get_one::<u16>("event-id").expect("required argument");
    let version = *matches.get_one::<u8>("version").expect("has default");
    let provider = *matches.get_one::<Guid>("provider").expect("has default");

    let mut builder = RecordBuilder::from_source(&registry, provider, event_id, version)?;
    let layout = registry.get(event_id, version)?;

    for assignment in matches.get_many::<String>("field").into_iter().flatten() {
        let (name, text) = split_assignment(assignment)?;
        let Some(spec) = layout.field(name) else {
            bail!("event {event_id} v{version} has no field `{name}`");
        };
        let value = parse_literal(spec.ty, text)
            .with_context(|| format!("invalid value for `{name}` ({})", spec.ty))?;
        builder.add_field(name, value)?;
    }

    if let Some(addresses) = matches.get_many::<String>("stack") {
        let addresses = addresses
            .map(|a| {
                u64::from_str_radix(a.trim_start_matches("0x"), 16)
                    .with_context(|| format!("`{a}` is not a hex address"))
            })
            .collect::<Result<Vec<_>>>()?;
        builder.with_stack_trace(addresses)?;
    }

    let synth = if matches.get_flag("incomplete") {
        builder.pack_incomplete()?
    } else {
        builder.pack()?
    };
    info!(
        "built event {} v{} with {} byte(s) of user data",
        event_id,
        version,
        synth.record.user_data().len()
    );

    let line = serde_json::to_string(&RecordDocument::from_record(&synth.record))?;
    match matches.get_one::<String>("output") {
        Some(path) => {
            let mut f = create_output_file(path, !matches.get_flag("no-confirm-overwrite"))?;
            writeln!(f, "{line}")?;
        }
        None => writeln!(io::stdout(), "{line}")?,
    }
    Ok(())
}
