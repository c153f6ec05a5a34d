use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use encoding::{Encoding, EncodingRef};
use encoding::all::encodings;
use etwrec::{
    FieldLayout, FieldParser, FieldValue, HexdumpFormat, LayoutRegistry, LayoutSource,
    ParserSettings, Predicate, RawRecord, filter_records, hexdump,
};
use indoc::indoc;
use log::{info, warn};
use serde_json::{Map, Value as JsonValue, json};
use std::fs::File;
use std::io::{self, BufReader, Write};

use crate::record_document::{parse_literal, read_records, split_assignment};

pub fn command() -> Command {
    Command::new("parse")
        .about("Decode and filter records from a JSON lines file")
        .long_about(indoc!(
            r#"
            Decode and filter records from a JSON lines file (as written by `build`).

            Filters are combined with AND; header filters are evaluated before any field is
            decoded. Every matching record is printed as one JSON object per line.
        "#
        ))
        .arg(
            Arg::new("input")
                .required(true)
                .value_name("RECORDS")
                .help("Records file, `-` reads stdin."),
        )
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
                .value_parser(clap::value_parser!(u16))
                .value_name("ID")
                .help("Only records with this event id."),
        )
        .arg(
            Arg::new("field-eq")
                .long("field-eq")
                .action(ArgAction::Append)
                .value_name("NAME=VALUE")
                .help("Only records whose field equals the value. Can be passed multiple times."),
        )
        .arg(
            Arg::new("contains")
                .long("contains")
                .action(ArgAction::Append)
                .value_name("NAME=TEXT")
                .help("Only records whose string field contains the text (case sensitive)."),
        )
        .arg(
            Arg::new("hexdump")
                .long("hexdump")
                .action(ArgAction::SetTrue)
                .help("Print a hexdump of each matching body instead of decoded fields."),
        )
        .arg(
            Arg::new("num-threads")
                .long("threads")
                .short('t')
                .default_value("0")
                .value_parser(clap::value_parser!(usize))
                .help("Sets the number of worker threads, defaults to number of CPU cores."),
        )
        .arg(
            Arg::new("strict-terminators")
                .long("strict-terminators")
                .action(ArgAction::SetTrue)
                .help("Fail strings whose terminator is missing instead of reading to the end of the data."),
        )
        .arg(
            Arg::new("ansi-codec")
                .long("ansi-codec")
                .value_parser(
                    encodings()
                        .iter()
                        .filter(|&e| e.raw_decoder().is_ascii_compatible())
                        .map(|e| e.name())
                        .collect::<Vec<&'static str>>(),
                )
                .default_value(encoding::all::WINDOWS_1252.name())
                .help("When set, controls the codec of ansi encoded strings."),
        )
}

/// `--field-eq` leaf. The literal is read with the type the record's layout declares.
fn field_equals(name: String, text: String) -> Predicate {
    Predicate::from_fn(move |parser: &FieldParser<'_>| {
        let Some(spec) = parser.layout().field(&name) else {
            return false;
        };
        match (parse_literal(spec.ty, &text), parser.parse::<FieldValue>(&name)) {
            (Ok(expected), Ok(actual)) => actual.matches(&expected),
            _ => false,
        }
    })
}

fn build_predicate(matches: &ArgMatches) -> Result<Predicate> {
    let mut leaves = vec![];

    if let Some(event_id) = matches.get_one::<u16>("event-id") {
        leaves.push(Predicate::id_is(*event_id));
    }
    for raw in matches.get_many::<String>("field-eq").into_iter().flatten() {
        let (name, text) = split_assignment(raw)?;
        leaves.push(field_equals(name.to_owned(), text.to_owned()));
    }
    for raw in matches.get_many::<String>("contains").into_iter().flatten() {
        let (name, text) = split_assignment(raw)?;
        leaves.push(Predicate::string_contains(name, text));
    }

    Ok(Predicate::all_of(leaves))
}

fn settings_from_matches(matches: &ArgMatches) -> Result<ParserSettings> {
    let codec_name = matches
        .get_one::<String>("ansi-codec")
        .expect("has default");
    let ansi_codec: EncodingRef = *encodings()
        .iter()
        .find(|c| c.name() == codec_name.as_str())
        .context("possible values are derived from `encodings()`")?;

    Ok(ParserSettings::new()
        .num_threads(*matches.get_one::<usize>("num-threads").expect("has default"))
        .strict_terminators(matches.get_flag("strict-terminators"))
        .ansi_codec(ansi_codec))
}

fn record_to_json(record: &RawRecord, layout: &FieldLayout, settings: &ParserSettings) -> JsonValue {
    let parser = FieldParser::with_settings(record, layout, settings.clone());
    let mut fields = Map::new();
    for (spec, parsed) in layout.fields().iter().zip(parser.fields()) {
        let value = match parsed {
            Ok(field) => serde_json::to_value(&field.value).unwrap_or(JsonValue::Null),
            Err(e) => json!({ "error": e.to_string() }),
        };
        fields.insert(spec.name.clone(), value);
    }

    let header = record.header();
    let mut out = Map::new();
    out.insert("provider_id".to_owned(), json!(header.provider_id));
    out.insert("event_id".to_owned(), json!(header.event_id));
    out.insert("version".to_owned(), json!(header.version));
    if let Some(name) = layout.event_name() {
        out.insert("event_name".to_owned(), json!(name));
    }
    if let Some(ts) = record.timestamp() {
        out.insert("timestamp".to_owned(), json!(ts.to_string()));
    }
    out.insert("fields".to_owned(), JsonValue::Object(fields));
    if record.has_stack_trace() {
        let stack: Vec<String> = record.stack_trace().map(|a| format!("0x{a:x}")).collect();
        out.insert("stack".to_owned(), json!(stack));
    }
    JsonValue::Object(out)
}

pub fn run(matches: &ArgMatches) -> Result<()> {
    let manifest = matches
        .get_one::<String>("layouts")
        .expect("required argument");
    let file = File::open(manifest).with_context(|| format!("failed to open `{manifest}`"))?;
    let registry = LayoutRegistry::from_manifest_reader(BufReader::new(file))
        .with_context(|| format!("failed to load layouts from `{manifest}`"))?;

    let input = matches.get_one::<String>("input").expect("required argument");
    let records = read_records(input)?;
    let predicate = build_predicate(matches)?;
    let settings = settings_from_matches(matches)?;

    let matching = filter_records(&records, &predicate, &registry, &settings);
    info!("{} of {} record(s) matched", matching.len(), records.len());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for record in matching {
        if matches.get_flag("hexdump") {
            writeln!(
                out,
                "event {} v{} ({} byte(s))",
                record.event_id(),
                record.version(),
                record.body().len()
            )?;
            write!(out, "{}", hexdump(record.body(), 0, HexdumpFormat::Canonical))?;
            continue;
        }

        match registry.resolve_layout(record.event_id(), record.version()) {
            Ok(layout) => {
                let doc = record_to_json(record, layout, &settings);
                writeln!(out, "{}", serde_json::to_string(&doc)?)?;
            }
            Err(e) => warn!("skipping record: {e}"),
        }
    }
    Ok(())
}
