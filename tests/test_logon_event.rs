
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use etwrec::err::{BuildError, LayoutError, ParseError};
use etwrec::{
    EventHeader, FieldLayout, FieldParser, FieldType, FieldValue, Guid, LayoutSource,
    ParserSettings, Pointer, Predicate, RawRecord, RecordBuilder,
};
use fixtures::*;
use pretty_assertions::assert_eq;

#[test]
fn test_parses_every_logon_field() {
    ensure_env_logger_initialized();
    let synth = logon_event();
    let parser = synth.parser();

    assert_eq!(parser.parse::<String>("TargetUserName").unwrap(), "alice");
    assert_eq!(parser.parse::<i16>("KeyLength").unwrap(), 5);
    assert_eq!(parser.parse::<i32>("LogonType").unwrap(), 2);
    assert_eq!(parser.parse::<i64>("LogonId").unwrap(), 1000);
    assert_eq!(synth.record.user_data().len(), 20);
}

#[test]
fn test_offsets_follow_variable_length_string() {
    let synth = logon_event_for("administrator", 2);
    let parser = synth.parser();

    assert_eq!(parser.resolve_offset("TargetUserName").unwrap().offset, 0);
    assert_eq!(parser.resolve_offset("KeyLength").unwrap().offset, 14);
    assert_eq!(parser.resolve_offset("LogonType").unwrap().offset, 16);
    assert_eq!(parser.resolve_offset("LogonId").unwrap().offset, 20);
}

#[test]
fn test_parsed_fields_snapshot() {
    let synth = logon_event();
    let parser = synth.parser();
    let fields: Vec<_> = parser
        .fields()
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    insta::assert_json_snapshot!(fields, @r#"
    [
      {
        "name": "TargetUserName",
        "type": "ansi_string",
        "offset": 0,
        "value": "alice"
      },
      {
        "name": "KeyLength",
        "type": "int16",
        "offset": 6,
        "value": 5
      },
      {
        "name": "LogonType",
        "type": "int32",
        "offset": 8,
        "value": 2
      },
      {
        "name": "LogonId",
        "type": "int64",
        "offset": 12,
        "value": 1000
      }
    ]
    "#);
}

#[test]
fn test_field_equality_is_strictly_typed() {
    let synth = logon_event();
    let layout = synth.layout.as_ref();

    assert!(Predicate::field_eq("LogonType", 2i32).evaluate(&synth.record, layout));
    assert!(!Predicate::field_eq("LogonType", 3i32).evaluate(&synth.record, layout));
    // Same number, different declared width.
    assert!(!Predicate::field_eq("LogonType", 2i64).evaluate(&synth.record, layout));
    assert!(!Predicate::field_eq("NoSuchField", 2i32).evaluate(&synth.record, layout));
}

#[test]
fn test_string_predicates_match_logon_user() {
    let synth = logon_event_for("Administrator", 10);
    let layout = synth.layout.as_ref();

    assert!(Predicate::string_contains("TargetUserName", "min").evaluate(&synth.record, layout));
    assert!(!Predicate::string_contains("TargetUserName", "ADMIN").evaluate(&synth.record, layout));
    assert!(
        Predicate::string_contains("TargetUserName", "ADMIN")
            .ignore_case()
            .evaluate(&synth.record, layout)
    );
    // An integer field never matches a text predicate.
    assert!(!Predicate::string_contains("LogonType", "10").evaluate(&synth.record, layout));
}

#[test]
fn test_default_substitution_and_missing_field() {
    let synth = logon_event();
    let parser = synth.parser();

    assert_eq!(parser.parse_with_default("Missing", 42i32), 42);
    assert_eq!(parser.parse_with_default("LogonType", 42i32), 2);
    // Wrong type also substitutes.
    assert_eq!(parser.parse_with_default("LogonType", 42i64), 42);

    assert_eq!(
        parser.parse::<i32>("Missing"),
        Err(ParseError::FieldNotFound {
            name: "Missing".to_string(),
            event_id: LOGON_EVENT_ID,
            version: LOGON_EVENT_VERSION,
        })
    );
}

#[test]
fn test_type_mismatch_is_reported() {
    let synth = logon_event();
    let err = synth.parser().parse::<i64>("KeyLength").unwrap_err();

    assert_eq!(
        err,
        ParseError::TypeMismatch {
            name: "KeyLength".to_string(),
            declared: FieldType::Int16,
            requested: "int64",
        }
    );
}

#[test]
fn test_incomplete_record_policies() {
    let layout = Arc::new(logon_layout());

    let mut builder = RecordBuilder::for_layout(LSA_PROVIDER, Arc::clone(&layout));
    builder
        .add_ansi_string("TargetUserName", "bob")
        .unwrap()
        .add_value("KeyLength", 0i16)
        .unwrap();

    assert_eq!(
        builder.pack().unwrap_err(),
        BuildError::IncompleteRecord {
            event_id: LOGON_EVENT_ID,
            version: LOGON_EVENT_VERSION,
            missing: vec!["LogonType".to_string(), "LogonId".to_string()],
        }
    );
    assert!(!builder.is_finalized());

    let synth = builder.pack_incomplete().unwrap();
    let parser = synth.parser();
    assert_eq!(parser.parse::<String>("TargetUserName").unwrap(), "bob");
    assert_eq!(parser.parse::<i16>("KeyLength").unwrap(), 0);
    assert!(matches!(
        parser.parse::<i32>("LogonType"),
        Err(ParseError::Truncated { .. })
    ));
    assert!(matches!(
        parser.parse::<i64>("LogonId"),
        Err(ParseError::Truncated { .. })
    ));

    assert_eq!(
        builder.pack_incomplete().unwrap_err(),
        BuildError::AlreadyFinalized
    );
}

#[test]
fn test_missing_unicode_terminator_reads_to_end() {
    let layout = FieldLayout::builder(302, 0)
        .field("TargetUserName", FieldType::UnicodeString)
        .build()
        .unwrap();
    // "bob" without the trailing NUL.
    let body = vec![b'b', 0, b'o', 0, b'b', 0];
    let record = RawRecord::new(EventHeader::new(LSA_PROVIDER, 302, 0), body);

    let lenient = FieldParser::new(&record, &layout);
    assert_eq!(lenient.parse::<String>("TargetUserName").unwrap(), "bob");

    let strict = FieldParser::with_settings(
        &record,
        &layout,
        ParserSettings::new().strict_terminators(true),
    );
    assert!(matches!(
        strict.parse::<String>("TargetUserName"),
        Err(ParseError::Truncated { .. })
    ));
}

#[test]
fn test_stack_trace_is_restartable() {
    let mut builder = RecordBuilder::for_layout(LSA_PROVIDER, Arc::new(logon_layout()));
    builder
        .add_ansi_string("TargetUserName", "alice")
        .unwrap()
        .add_value("KeyLength", 5i16)
        .unwrap()
        .add_value("LogonType", 2i32)
        .unwrap()
        .add_value("LogonId", 1000i64)
        .unwrap()
        .with_stack_trace([0x7ff6_1000_0000, 0x7ff6_1000_0040, 0x7ffd_0000_1234])
        .unwrap();
    let synth = builder.pack().unwrap();

    assert_eq!(synth.record.stack_region().map(<[u8]>::len), Some(24));
    let first: Vec<u64> = synth.record.stack_trace().collect();
    let second: Vec<u64> = etwrec::stack_trace(&synth.record).collect();
    assert_eq!(first, vec![0x7ff6_1000_0000, 0x7ff6_1000_0040, 0x7ffd_0000_1234]);
    assert_eq!(first, second);

    // The stack tail is not part of the user data.
    assert_eq!(synth.parser().parse::<i64>("LogonId").unwrap(), 1000);
}

#[test]
fn test_no_stack_capture_yields_nothing() {
    let synth = logon_event();
    assert_eq!(synth.record.stack_trace().count(), 0);
}

#[test]
fn test_and_short_circuits() {
    let synth = logon_event();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = {
        let calls = Arc::clone(&calls);
        Predicate::from_fn(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            true
        })
    };

    let predicate = Predicate::id_is(999).and(counter.clone());
    assert!(!predicate.evaluate(&synth.record, &synth.layout));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let predicate = Predicate::id_is(LOGON_EVENT_ID).and(counter);
    assert!(predicate.evaluate(&synth.record, &synth.layout));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_evaluation_is_idempotent() {
    let synth = logon_event();
    let predicate = Predicate::field_eq("LogonType", 2i32)
        .and(Predicate::string_contains("TargetUserName", "ali"))
        .or(Predicate::id_is(1).not());

    let first = predicate.evaluate(&synth.record, &synth.layout);
    for _ in 0..3 {
        assert_eq!(predicate.evaluate(&synth.record, &synth.layout), first);
    }
    assert_eq!(synth.parser().parse::<i32>("LogonType").unwrap(), 2);
}

#[test]
fn test_every_truncated_body_is_safe() {
    ensure_env_logger_initialized();
    let synth = logon_event();
    let layout = logon_layout();
    let body = synth.record.user_data().to_vec();
    let predicate = Predicate::field_eq("LogonId", 1000i64)
        .or(Predicate::string_contains("TargetUserName", "a"));

    for len in 0..=body.len() {
        let record = RawRecord::new(synth.record.header().clone(), body[..len].to_vec());
        let parser = FieldParser::new(&record, &layout);

        for result in parser.fields() {
            if let Ok(field) = result {
                assert!(field.offset + field.raw.len() <= len);
            }
        }
        let _ = predicate.evaluate(&record, &layout);

        let logon_id = parser.parse::<i64>("LogonId");
        if len == body.len() {
            assert_eq!(logon_id, Ok(1000));
        } else {
            assert!(logon_id.is_err(), "LogonId parsed out of {len} byte(s)");
        }
    }
}

#[test]
fn test_registry_manifest_lookup() {
    let registry = logon_registry();
    assert_eq!(registry.len(), 2);

    let synth = logon_event();
    let parser = FieldParser::for_record(&synth.record, &registry).unwrap();
    assert_eq!(parser.layout().event_name(), Some("Logon"));
    assert_eq!(parser.parse::<FieldValue>("LogonType").unwrap(), FieldValue::Int32(2));

    let unknown = RawRecord::new(EventHeader::new(LSA_PROVIDER, 301, 5), vec![]);
    assert!(matches!(
        registry.resolve_layout(301, 5),
        Err(LayoutError::LayoutNotFound {
            event_id: 301,
            version: 5,
        })
    ));
    assert!(FieldParser::for_record(&unknown, &registry).is_err());
}

#[test]
fn test_builder_from_manifest_layout() {
    let registry = logon_registry();
    let mut builder = RecordBuilder::from_source(&registry, LSA_PROVIDER, 302, 0).unwrap();
    builder
        .add_unicode_string("TargetUserName", "carol")
        .unwrap()
        .add_value("LogonId", 7i64)
        .unwrap();
    let synth = builder.pack().unwrap();

    assert!(Predicate::field_eq("TargetUserName", "carol").evaluate(&synth.record, &synth.layout));
    assert_eq!(synth.parser().resolve_offset("LogonId").unwrap().offset, 12);
}

#[test]
fn test_every_type_round_trips() {
    let session = Guid::new(0x3D6F_A8D0, 0xFE05, 0x11D0, [0x9D, 0xDA, 0x00, 0xC0, 0x4F, 0xD7, 0xBA, 0x7C]);
    let created: jiff::Timestamp = "2024-05-01T12:30:45.1234567Z".parse().unwrap();

    let mut builder = RecordBuilder::new(LSA_PROVIDER, 4624, 2);
    builder
        .add_value("Level", -3i8)
        .unwrap()
        .add_value("Port", 443u16)
        .unwrap()
        .add_value("Status", 0xC000_006Du32)
        .unwrap()
        .add_value("Ratio", 0.25f64)
        .unwrap()
        .add_bool("Elevated", true)
        .unwrap()
        .add_guid("Session", session)
        .unwrap()
        .add_pointer("Handle", 0xFFFF_8000_1234_5678)
        .unwrap()
        .add_filetime("Created", created)
        .unwrap()
        .add_unicode_string("Workstation", "DESKTOP-ÆØÅ")
        .unwrap()
        .add_counted_string("Domain", "CORP")
        .unwrap()
        .add_bytes("Sid", &[1, 5, 0, 0])
        .unwrap();
    let synth = builder.pack().unwrap();
    let parser = synth.parser();

    assert_eq!(parser.parse::<i8>("Level").unwrap(), -3);
    assert_eq!(parser.parse::<u16>("Port").unwrap(), 443);
    assert_eq!(parser.parse::<u32>("Status").unwrap(), 0xC000_006D);
    assert_eq!(parser.parse::<f64>("Ratio").unwrap().to_bits(), 0.25f64.to_bits());
    assert!(parser.parse::<bool>("Elevated").unwrap());
    assert_eq!(parser.parse::<Guid>("Session").unwrap(), session);
    assert_eq!(
        parser.parse::<Pointer>("Handle").unwrap(),
        Pointer(0xFFFF_8000_1234_5678)
    );
    assert_eq!(parser.parse::<jiff::Timestamp>("Created").unwrap(), created);
    assert_eq!(parser.parse::<String>("Workstation").unwrap(), "DESKTOP-ÆØÅ");
    assert_eq!(parser.parse::<String>("Domain").unwrap(), "CORP");
    assert_eq!(parser.parse::<Vec<u8>>("Sid").unwrap(), vec![1, 5, 0, 0]);
}
