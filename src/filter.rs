//! Boolean predicates evaluated directly against raw records.
//!
//! Leaves that need a field parse it on the spot through a [`FieldParser`]; nothing else of the
//! record is decoded. `And`/`Or` evaluate left to right and stop as soon as the result is known,
//! so cheap header checks should be placed first.

use std::fmt::{self, Debug};
use std::sync::Arc;

use log::trace;

use crate::err::LayoutError;
use crate::etw_record::RawRecord;
use crate::guid::Guid;
use crate::layout::{FieldLayout, LayoutSource};
use crate::parser::{FieldParser, ParserSettings};
use crate::value::FieldValue;

#[cfg(feature = "multithreading")]
use rayon::prelude::*;

/// A user supplied leaf.
pub trait RecordPredicate: Send + Sync {
    fn test(&self, parser: &FieldParser<'_>) -> bool;
}

impl<F> RecordPredicate for F
where
    F: Fn(&FieldParser<'_>) -> bool + Send + Sync,
{
    fn test(&self, parser: &FieldParser<'_>) -> bool {
        self(parser)
    }
}

#[derive(Clone)]
pub struct CustomPredicate(pub Arc<dyn RecordPredicate>);

impl Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("CustomPredicate")
    }
}

/// Header field comparisons. These never touch the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataPredicate {
    EventId(u16),
    Version(u8),
    Opcode(u8),
    Level(u8),
    Task(u16),
    ProcessId(u32),
    ThreadId(u32),
    Keywords(u64),
    /// At least one of the bits of the mask is set.
    KeywordsAny(u64),
    ProviderId(Guid),
    ActivityId(Guid),
}

impl MetadataPredicate {
    pub fn test(&self, record: &RawRecord) -> bool {
        let header = record.header();
        match *self {
            MetadataPredicate::EventId(v) => header.event_id == v,
            MetadataPredicate::Version(v) => header.version == v,
            MetadataPredicate::Opcode(v) => header.opcode == v,
            MetadataPredicate::Level(v) => header.level == v,
            MetadataPredicate::Task(v) => header.task == v,
            MetadataPredicate::ProcessId(v) => header.process_id == v,
            MetadataPredicate::ThreadId(v) => header.thread_id == v,
            MetadataPredicate::Keywords(v) => header.keywords == v,
            MetadataPredicate::KeywordsAny(mask) => header.keywords & mask != 0,
            MetadataPredicate::ProviderId(v) => header.provider_id == v,
            MetadataPredicate::ActivityId(v) => header.activity_id == v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseMode {
    /// Byte for byte.
    #[default]
    Ordinal,
    /// ASCII case folding.
    IgnoreCase,
}

impl TextOp {
    fn apply(self, haystack: &str, needle: &str, case: CaseMode) -> bool {
        match case {
            CaseMode::Ordinal => self.apply_ordinal(haystack, needle),
            CaseMode::IgnoreCase => {
                self.apply_ordinal(&haystack.to_ascii_lowercase(), &needle.to_ascii_lowercase())
            }
        }
    }

    fn apply_ordinal(self, haystack: &str, needle: &str) -> bool {
        match self {
            TextOp::Equals => haystack == needle,
            TextOp::Contains => haystack.contains(needle),
            TextOp::StartsWith => haystack.starts_with(needle),
            TextOp::EndsWith => haystack.ends_with(needle),
        }
    }
}

/// An immutable predicate tree.
///
/// Combinators return new trees that share their children, so a predicate can be cloned and
/// reused across threads.
#[derive(Debug, Clone, Default)]
pub enum Predicate {
    #[default]
    Any,
    MetadataEq(MetadataPredicate),
    FieldEq {
        field: String,
        value: FieldValue,
    },
    Text {
        field: String,
        op: TextOp,
        needle: String,
        case: CaseMode,
    },
    And(Arc<Predicate>, Arc<Predicate>),
    Or(Arc<Predicate>, Arc<Predicate>),
    Not(Arc<Predicate>),
    AllOf(Arc<[Predicate]>),
    AnyOf(Arc<[Predicate]>),
    Custom(CustomPredicate),
}

impl Predicate {
    pub fn any_event() -> Self {
        Predicate::Any
    }

    pub fn id_is(event_id: u16) -> Self {
        Predicate::MetadataEq(MetadataPredicate::EventId(event_id))
    }

    pub fn version_is(version: u8) -> Self {
        Predicate::MetadataEq(MetadataPredicate::Version(version))
    }

    pub fn opcode_is(opcode: u8) -> Self {
        Predicate::MetadataEq(MetadataPredicate::Opcode(opcode))
    }

    pub fn level_is(level: u8) -> Self {
        Predicate::MetadataEq(MetadataPredicate::Level(level))
    }

    pub fn task_is(task: u16) -> Self {
        Predicate::MetadataEq(MetadataPredicate::Task(task))
    }

    pub fn process_id_is(pid: u32) -> Self {
        Predicate::MetadataEq(MetadataPredicate::ProcessId(pid))
    }

    pub fn thread_id_is(tid: u32) -> Self {
        Predicate::MetadataEq(MetadataPredicate::ThreadId(tid))
    }

    pub fn keywords_is(keywords: u64) -> Self {
        Predicate::MetadataEq(MetadataPredicate::Keywords(keywords))
    }

    pub fn keywords_any(mask: u64) -> Self {
        Predicate::MetadataEq(MetadataPredicate::KeywordsAny(mask))
    }

    pub fn provider_is(provider: Guid) -> Self {
        Predicate::MetadataEq(MetadataPredicate::ProviderId(provider))
    }

    pub fn activity_is(activity: Guid) -> Self {
        Predicate::MetadataEq(MetadataPredicate::ActivityId(activity))
    }

    /// Exact type and value equality, see [`FieldValue::matches`].
    pub fn field_eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Predicate::FieldEq {
            field: field.into(),
            value: value.into(),
        }
    }

    fn text(field: impl Into<String>, op: TextOp, needle: impl Into<String>, case: CaseMode) -> Self {
        Predicate::Text {
            field: field.into(),
            op,
            needle: needle.into(),
            case,
        }
    }

    /// Case sensitive substring test on a string field.
    pub fn string_contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::text(field, TextOp::Contains, needle, CaseMode::Ordinal)
    }

    pub fn string_equals(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::text(field, TextOp::Equals, needle, CaseMode::Ordinal)
    }

    pub fn string_starts_with(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::text(field, TextOp::StartsWith, needle, CaseMode::Ordinal)
    }

    pub fn string_ends_with(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::text(field, TextOp::EndsWith, needle, CaseMode::Ordinal)
    }

    /// Switches a text leaf to ASCII case insensitive matching. Other nodes are returned as is.
    pub fn ignore_case(self) -> Self {
        match self {
            Predicate::Text {
                field, op, needle, ..
            } => Predicate::Text {
                field,
                op,
                needle,
                case: CaseMode::IgnoreCase,
            },
            other => other,
        }
    }

    /// True when every predicate is; `all_of([])` is true.
    pub fn all_of(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::AllOf(predicates.into_iter().collect())
    }

    /// True when any predicate is; `any_of([])` is false.
    pub fn any_of(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::AnyOf(predicates.into_iter().collect())
    }

    pub fn custom(predicate: impl RecordPredicate + 'static) -> Self {
        Predicate::Custom(CustomPredicate(Arc::new(predicate)))
    }

    /// A custom leaf from a closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&FieldParser<'_>) -> bool + Send + Sync + 'static,
    {
        Self::custom(f)
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Arc::new(self), Arc::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Arc::new(self), Arc::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Predicate::Not(Arc::new(self))
    }

    pub fn evaluate(&self, record: &RawRecord, layout: &FieldLayout) -> bool {
        self.test(&FieldParser::new(record, layout))
    }

    pub fn evaluate_with(
        &self,
        record: &RawRecord,
        layout: &FieldLayout,
        settings: ParserSettings,
    ) -> bool {
        self.test(&FieldParser::with_settings(record, layout, settings))
    }

    /// Evaluates against a parser that is already bound to a record.
    pub fn test(&self, parser: &FieldParser<'_>) -> bool {
        match self {
            Predicate::Any => true,
            Predicate::MetadataEq(m) => m.test(parser.record()),
            Predicate::FieldEq { field, value } => match parser.parse::<FieldValue>(field) {
                Ok(actual) => actual.matches(value),
                Err(e) => {
                    trace!("`{}` does not match: {}", field, e);
                    false
                }
            },
            Predicate::Text {
                field,
                op,
                needle,
                case,
            } => match parser.parse::<String>(field) {
                Ok(actual) => op.apply(&actual, needle, *case),
                Err(e) => {
                    trace!("`{}` does not match: {}", field, e);
                    false
                }
            },
            Predicate::And(left, right) => left.test(parser) && right.test(parser),
            Predicate::Or(left, right) => left.test(parser) || right.test(parser),
            Predicate::Not(inner) => !inner.test(parser),
            Predicate::AllOf(all) => all.iter().all(|p| p.test(parser)),
            Predicate::AnyOf(any) => any.iter().any(|p| p.test(parser)),
            Predicate::Custom(custom) => custom.0.test(parser),
        }
    }
}

/// `predicate` evaluated against `record` laid out by `layout`.
pub fn evaluate(predicate: &Predicate, record: &RawRecord, layout: &FieldLayout) -> bool {
    predicate.evaluate(record, layout)
}

type EventCallback = Box<dyn Fn(&FieldParser<'_>) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&RawRecord, &LayoutError) + Send + Sync>;

/// Routes matching records to callbacks.
#[derive(Default)]
pub struct EventFilter {
    event_ids: Option<Vec<u16>>,
    predicate: Predicate,
    settings: ParserSettings,
    on_event: Vec<EventCallback>,
    on_error: Vec<ErrorCallback>,
}

impl Debug for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EventFilter")
            .field("event_ids", &self.event_ids)
            .field("predicate", &self.predicate)
            .field("on_event", &self.on_event.len())
            .field("on_error", &self.on_error.len())
            .finish()
    }
}

impl EventFilter {
    pub fn new(predicate: Predicate) -> Self {
        EventFilter {
            predicate,
            ..EventFilter::default()
        }
    }

    /// Only records with one of `event_ids` are considered. Checked before any layout lookup.
    pub fn for_events(event_ids: impl IntoIterator<Item = u16>, predicate: Predicate) -> Self {
        EventFilter {
            event_ids: Some(event_ids.into_iter().collect()),
            predicate,
            ..EventFilter::default()
        }
    }

    pub fn with_settings(mut self, settings: ParserSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn on_event(&mut self, callback: impl Fn(&FieldParser<'_>) + Send + Sync + 'static) {
        self.on_event.push(Box::new(callback));
    }

    pub fn on_error(&mut self, callback: impl Fn(&RawRecord, &LayoutError) + Send + Sync + 'static) {
        self.on_error.push(Box::new(callback));
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Feeds one record through the filter. Returns whether `on_event` callbacks were invoked.
    pub fn dispatch<S: LayoutSource + ?Sized>(&self, record: &RawRecord, source: &S) -> bool {
        if let Some(ids) = &self.event_ids
            && !ids.contains(&record.event_id())
        {
            return false;
        }

        let layout = match source.resolve_layout(record.event_id(), record.version()) {
            Ok(layout) => layout,
            Err(e) => {
                for callback in &self.on_error {
                    callback(record, &e);
                }
                return false;
            }
        };

        let parser = FieldParser::with_settings(record, layout, self.settings.clone());
        if !self.predicate.test(&parser) {
            return false;
        }
        for callback in &self.on_event {
            callback(&parser);
        }
        true
    }
}

fn record_matches<S: LayoutSource + ?Sized>(
    record: &RawRecord,
    predicate: &Predicate,
    source: &S,
    settings: &ParserSettings,
) -> bool {
    match source.resolve_layout(record.event_id(), record.version()) {
        Ok(layout) => predicate.evaluate_with(record, layout, settings.clone()),
        Err(e) => {
            trace!("{}, evaluating header predicates only", e);
            let layout = FieldLayout::empty(record.event_id(), record.version());
            predicate.evaluate_with(record, &layout, settings.clone())
        }
    }
}

/// Records of `records` matching `predicate`, in their original order.
///
/// Records without a layout can still match on header predicates; their field leaves are false.
pub fn filter_records<'r, S: LayoutSource + Sync + ?Sized>(
    records: &'r [RawRecord],
    predicate: &Predicate,
    source: &S,
    settings: &ParserSettings,
) -> Vec<&'r RawRecord> {
    let keep = |record: &&RawRecord| record_matches(record, predicate, source, settings);

    #[cfg(feature = "multithreading")]
    let matched: Vec<&'r RawRecord> = match settings.thread_pool() {
        Some(pool) => pool.install(|| records.par_iter().filter(keep).collect()),
        None => records.par_iter().filter(keep).collect(),
    };
    #[cfg(not(feature = "multithreading"))]
    let matched: Vec<&'r RawRecord> = records.iter().filter(keep).collect();

    matched
}
