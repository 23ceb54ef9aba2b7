//! Reader for JVM heap dumps in the hprof binary format (`JAVA PROFILE
//! 1.0.2`), plus an analysis layer that rebuilds the parent/child hierarchy
//! of kotlinx.coroutines jobs from the dumped object graph.
//!
//! Parsing is zero-copy: records borrow from the input buffer, and large
//! payloads (string bodies, instance fields, array elements) stay undecoded
//! until something asks for them. The buffer must outlive everything parsed
//! from it.

use getset::CopyGetters;
use nom::bytes::complete as bytes;
use nom::number::complete as number;
use std::fmt;
use std::fmt::Formatter;

pub mod coroutines;
pub mod errors;
pub mod forest;
pub mod heap_dump;
pub mod index;
pub mod summary;

mod parsing_iterator;

pub use errors::HprofError;

use errors::{NomLeaf, ParseResult};
use parsing_iterator::{IdSizedParse, ParsingIterator, WithIdSize};

const MAGIC: &[u8] = b"JAVA PROFILE 1.0.2\0";

/// An identifier drawn from the dump's single 64-bit id space.
///
/// Whether an id names a string, a class, an instance or an array is decided
/// by membership in the corresponding map (see [`index::HeapIndex`]), not by
/// bit pattern. Ids narrower than 8 bytes are zero-extended on read.
#[derive(CopyGetters, Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Id {
    #[get_copy = "pub"]
    id: u64,
}

impl Id {
    /// A zero id means "no object" wherever the format allows null.
    pub fn is_null(&self) -> bool {
        self.id == 0
    }

    /// Parses an id slot where zero encodes absence.
    pub(crate) fn parse_opt(input: &[u8], id_size: IdSize) -> ParseResult<'_, Option<Id>> {
        let (input, id) = Id::parse(input, id_size)?;
        Ok((input, if id.is_null() { None } else { Some(id) }))
    }
}

impl From<u64> for Id {
    fn from(id: u64) -> Id {
        Id { id }
    }
}

impl IdSizedParse for Id {
    fn parse(input: &[u8], id_size: IdSize) -> ParseResult<'_, Id> {
        let (input, id) = match id_size {
            IdSize::U8 => number::be_u8(input).or_eof().map(|(i, v)| (i, u64::from(v)))?,
            IdSize::U16 => number::be_u16(input).or_eof().map(|(i, v)| (i, u64::from(v)))?,
            IdSize::U32 => number::be_u32(input).or_eof().map(|(i, v)| (i, u64::from(v)))?,
            IdSize::U64 => number::be_u64(input).or_eof()?,
        };

        Ok((input, Id { id }))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::LowerHex for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.id, f)
    }
}

impl fmt::UpperHex for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self.id, f)
    }
}

/// Width of the identifiers in this dump, read once from the header.
///
/// Every id slot in the record stream occupies exactly this many bytes,
/// except the always-8-byte object slots inside field payloads (see
/// [`heap_dump::FieldType::size_in_bytes`]) and the object array's class
/// slot (see [`heap_dump::ObjectArray`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSize {
    U8,
    U16,
    U32,
    U64,
}

impl IdSize {
    pub fn size_in_bytes(self) -> usize {
        match self {
            IdSize::U8 => 1,
            IdSize::U16 => 2,
            IdSize::U32 => 4,
            IdSize::U64 => 8,
        }
    }

    fn from_header(raw: u32) -> Result<IdSize, HprofError> {
        match raw {
            1 => Ok(IdSize::U8),
            2 => Ok(IdSize::U16),
            4 => Ok(IdSize::U32),
            8 => Ok(IdSize::U64),
            _ => Err(HprofError::UnsupportedIdentifierSize(raw)),
        }
    }
}

/// Serial numbers (class, thread, stack trace) are plain 32-bit scalars, not
/// ids.
pub type Serial = u32;

// https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp

/// A parsed dump: the header plus the raw record stream.
#[derive(CopyGetters)]
pub struct Hprof<'a> {
    #[get_copy = "pub"]
    header: Header,
    records: &'a [u8],
}

impl<'a> Hprof<'a> {
    /// Iterates the top-level record stream from the first record. Every call
    /// starts over, so independent passes can walk the same dump.
    pub fn records(&self) -> Records<'a> {
        Records {
            remaining: self.records,
            id_size: self.header.id_size,
        }
    }
}

/// Parses the magic and dump header, leaving the record stream lazy.
pub fn parse_hprof(input: &[u8]) -> Result<Hprof<'_>, HprofError> {
    let (input, header) = Header::parse(input)?;

    Ok(Hprof {
        header,
        records: input,
    })
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct Header {
    #[get_copy = "pub"]
    id_size: IdSize,
    /// Dump creation time as millis since epoch
    #[get_copy = "pub"]
    timestamp_millis: u64,
}

impl Header {
    fn parse(input: &[u8]) -> ParseResult<'_, Header> {
        // The version string is NUL-terminated. Only 1.0.2 is supported, so
        // the magic is matched as one length-exact prefix instead of scanning
        // for the NUL.
        let input = input.strip_prefix(MAGIC).ok_or(HprofError::WrongFormat)?;

        let (input, id_size_num) = number::be_u32(input).or_eof()?;
        let (input, timestamp_millis) = number::be_u64(input).or_eof()?;

        let id_size = IdSize::from_header(id_size_num)?;

        Ok((
            input,
            Header {
                id_size,
                timestamp_millis,
            },
        ))
    }
}

pub struct Records<'a> {
    remaining: &'a [u8],
    id_size: IdSize,
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<Record<'a>, HprofError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }

        match Record::parse(self.remaining, self.id_size) {
            Ok((input, record)) => {
                self.remaining = input;
                Some(Ok(record))
            }
            Err(e) => {
                // a framing error poisons the rest of the stream
                self.remaining = &[];
                Some(Err(e))
            }
        }
    }
}

/// One framed record: tag, timestamp offset, and the undecoded body.
#[derive(CopyGetters, Copy, Clone)]
pub struct Record<'a> {
    #[get_copy = "pub"]
    tag: RecordTag,
    #[get_copy = "pub"]
    micros_since_header_ts: u32,
    id_size: IdSize,
    body: &'a [u8],
}

impl<'a> Record<'a> {
    pub fn as_utf_8(&self) -> Option<Result<Utf8<'a>, HprofError>> {
        match self.tag {
            RecordTag::Utf8 => Some(Utf8::parse(self.body, self.id_size)),
            _ => None,
        }
    }

    pub fn as_load_class(&self) -> Option<Result<LoadClass, HprofError>> {
        match self.tag {
            RecordTag::LoadClass => Some(LoadClass::parse(self.body, self.id_size)),
            _ => None,
        }
    }

    pub fn as_stack_frame(&self) -> Option<Result<StackFrame, HprofError>> {
        match self.tag {
            RecordTag::StackFrame => Some(StackFrame::parse(self.body, self.id_size)),
            _ => None,
        }
    }

    pub fn as_stack_trace(&self) -> Option<Result<StackTrace<'a>, HprofError>> {
        match self.tag {
            RecordTag::StackTrace => Some(StackTrace::parse(self.body, self.id_size)),
            _ => None,
        }
    }

    pub fn as_heap_dump_segment(&self) -> Option<HeapDumpSegment<'a>> {
        match self.tag {
            RecordTag::HeapDump | RecordTag::HeapDumpSegment => Some(HeapDumpSegment {
                id_size: self.id_size,
                records: self.body,
            }),
            _ => None,
        }
    }

    fn parse(input: &'a [u8], id_size: IdSize) -> ParseResult<'a, Record<'a>> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L76
        let (input, tag_byte) = number::be_u8(input).or_eof()?;
        let tag = RecordTag::from_byte(tag_byte)?;

        let (input, micros) = number::be_u32(input).or_eof()?;
        let (input, len) = number::be_u32(input).or_eof()?;
        let (input, body) = bytes::take(len)(input).or_eof()?;

        Ok((
            input,
            Record {
                tag,
                micros_since_header_ts: micros,
                id_size,
                body,
            },
        ))
    }
}

/// Top-level record kinds. Declared in tag-byte order so the derived `Ord`
/// matches the wire encoding.
#[derive(Debug, Copy, Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum RecordTag {
    Utf8,
    LoadClass,
    UnloadClass,
    StackFrame,
    StackTrace,
    AllocSites,
    HeapSummary,
    StartThread,
    EndThread,
    HeapDump,
    CpuSamples,
    ControlSettings,
    HeapDumpSegment,
    HeapDumpEnd,
}

impl RecordTag {
    fn from_byte(b: u8) -> Result<RecordTag, HprofError> {
        match b {
            0x01 => Ok(RecordTag::Utf8),
            0x02 => Ok(RecordTag::LoadClass),
            0x03 => Ok(RecordTag::UnloadClass),
            0x04 => Ok(RecordTag::StackFrame),
            0x05 => Ok(RecordTag::StackTrace),
            0x06 => Ok(RecordTag::AllocSites),
            0x07 => Ok(RecordTag::HeapSummary),
            0x0A => Ok(RecordTag::StartThread),
            0x0B => Ok(RecordTag::EndThread),
            0x0C => Ok(RecordTag::HeapDump),
            0x0D => Ok(RecordTag::CpuSamples),
            0x0E => Ok(RecordTag::ControlSettings),
            0x1C => Ok(RecordTag::HeapDumpSegment),
            0x2C => Ok(RecordTag::HeapDumpEnd),
            _ => Err(HprofError::InvalidTag(b)),
        }
    }

    pub fn byte(self) -> u8 {
        match self {
            RecordTag::Utf8 => 0x01,
            RecordTag::LoadClass => 0x02,
            RecordTag::UnloadClass => 0x03,
            RecordTag::StackFrame => 0x04,
            RecordTag::StackTrace => 0x05,
            RecordTag::AllocSites => 0x06,
            RecordTag::HeapSummary => 0x07,
            RecordTag::StartThread => 0x0A,
            RecordTag::EndThread => 0x0B,
            RecordTag::HeapDump => 0x0C,
            RecordTag::CpuSamples => 0x0D,
            RecordTag::ControlSettings => 0x0E,
            RecordTag::HeapDumpSegment => 0x1C,
            RecordTag::HeapDumpEnd => 0x2C,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RecordTag::Utf8 => "STRING IN UTF8",
            RecordTag::LoadClass => "LOAD CLASS",
            RecordTag::UnloadClass => "UNLOAD CLASS",
            RecordTag::StackFrame => "STACK FRAME",
            RecordTag::StackTrace => "STACK TRACE",
            RecordTag::AllocSites => "ALLOC SITES",
            RecordTag::HeapSummary => "HEAP SUMMARY",
            RecordTag::StartThread => "START THREAD",
            RecordTag::EndThread => "END THREAD",
            RecordTag::HeapDump => "HEAP DUMP",
            RecordTag::CpuSamples => "CPU SAMPLES",
            RecordTag::ControlSettings => "CONTROL SETTINGS",
            RecordTag::HeapDumpSegment => "HEAP DUMP SEGMENT",
            RecordTag::HeapDumpEnd => "HEAP DUMP END",
        }
    }
}

#[derive(CopyGetters, Copy, Clone)]
pub struct Utf8<'a> {
    #[get_copy = "pub"]
    name_id: Id,
    /// The remainder of the record body, viewed from the file buffer.
    #[get_copy = "pub"]
    text: &'a [u8],
}

impl<'a> Utf8<'a> {
    fn parse(input: &'a [u8], id_size: IdSize) -> Result<Utf8<'a>, HprofError> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L88
        let (text, name_id) = Id::parse(input, id_size)?;

        Ok(Utf8 { name_id, text })
    }

    /// Real dumps contain the occasional record whose bytes are not valid
    /// UTF-8 despite the tag name.
    pub fn text_as_str(&self) -> Result<&'a str, std::str::Utf8Error> {
        std::str::from_utf8(self.text)
    }
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct LoadClass {
    #[get_copy = "pub"]
    class_serial: Serial,
    #[get_copy = "pub"]
    class_obj_id: Id,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    #[get_copy = "pub"]
    class_name_id: Id,
}

impl LoadClass {
    fn parse(input: &[u8], id_size: IdSize) -> Result<LoadClass, HprofError> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L93
        let (input, class_serial) = number::be_u32(input).or_eof()?;
        let (input, class_obj_id) = Id::parse(input, id_size)?;
        let (input, stack_trace_serial) = number::be_u32(input).or_eof()?;
        let (_input, class_name_id) = Id::parse(input, id_size)?;

        Ok(LoadClass {
            class_serial,
            class_obj_id,
            stack_trace_serial,
            class_name_id,
        })
    }
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct StackFrame {
    #[get_copy = "pub"]
    id: Id,
    #[get_copy = "pub"]
    method_name_id: Id,
    #[get_copy = "pub"]
    method_signature_id: Id,
    /// Null when the frame carries no source information.
    #[get_copy = "pub"]
    source_file_name_id: Option<Id>,
    #[get_copy = "pub"]
    class_serial: Serial,
    #[get_copy = "pub"]
    line_num: LineNum,
}

impl StackFrame {
    fn parse(input: &[u8], id_size: IdSize) -> Result<StackFrame, HprofError> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L104
        let (input, id) = Id::parse(input, id_size)?;
        let (input, method_name_id) = Id::parse(input, id_size)?;
        let (input, method_signature_id) = Id::parse(input, id_size)?;
        let (input, source_file_name_id) = Id::parse_opt(input, id_size)?;
        let (input, class_serial) = number::be_u32(input).or_eof()?;
        let (_input, line_num) = LineNum::parse(input)?;

        Ok(StackFrame {
            id,
            method_name_id,
            method_signature_id,
            source_file_name_id,
            class_serial,
            line_num,
        })
    }
}

#[derive(CopyGetters, Clone)]
pub struct StackTrace<'a> {
    id_size: IdSize,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    #[get_copy = "pub"]
    thread_serial: Serial,
    num_frame_ids: u32,
    frame_ids: &'a [u8],
}

impl<'a> StackTrace<'a> {
    fn parse(input: &'a [u8], id_size: IdSize) -> Result<StackTrace<'a>, HprofError> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L116
        let (input, stack_trace_serial) = number::be_u32(input).or_eof()?;
        let (input, thread_serial) = number::be_u32(input).or_eof()?;
        let (input, num_frame_ids) = number::be_u32(input).or_eof()?;
        let (_input, frame_ids) =
            bytes::take(num_frame_ids as usize * id_size.size_in_bytes())(input).or_eof()?;

        Ok(StackTrace {
            id_size,
            stack_trace_serial,
            thread_serial,
            num_frame_ids,
            frame_ids,
        })
    }

    pub fn frame_ids(&self) -> Ids<'a> {
        Ids::new(self.id_size, self.frame_ids, self.num_frame_ids)
    }
}

/// Iterator over a run of raw ids at the dump's identifier width.
pub struct Ids<'a> {
    iter: ParsingIterator<'a, Id, WithIdSize<Id>>,
}

impl<'a> Ids<'a> {
    pub(crate) fn new(id_size: IdSize, input: &'a [u8], count: u32) -> Ids<'a> {
        Ids {
            iter: ParsingIterator::with_id_size(id_size, input, count),
        }
    }
}

impl<'a> Iterator for Ids<'a> {
    type Item = Result<Id, HprofError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

/// Represents either a HPROF_HEAP_DUMP or HPROF_HEAP_DUMP_SEGMENT body.
pub struct HeapDumpSegment<'a> {
    id_size: IdSize,
    records: &'a [u8],
}

impl<'a> HeapDumpSegment<'a> {
    pub fn sub_records(&self) -> SubRecords<'a> {
        SubRecords {
            id_size: self.id_size,
            remaining: self.records,
        }
    }
}

pub struct SubRecords<'a> {
    id_size: IdSize,
    remaining: &'a [u8],
}

impl<'a> Iterator for SubRecords<'a> {
    type Item = Result<heap_dump::SubRecord<'a>, HprofError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }

        match heap_dump::SubRecord::parse(self.remaining, self.id_size) {
            Ok((input, record)) => {
                self.remaining = input;
                Some(Ok(record))
            }
            Err(e) => {
                self.remaining = &[];
                // The record body was sliced to the declared length up front,
                // so running short here means the sub-record stream and the
                // declared length disagree.
                Some(Err(match e {
                    HprofError::OutOfBounds => HprofError::BodySizeMismatch,
                    other => other,
                }))
            }
        }
    }
}

/// Line number of a stack frame; non-positive raw values encode the special
/// cases.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LineNum {
    Normal(u32),
    Unknown,
    CompiledMethod,
    NativeMethod,
}

impl LineNum {
    fn parse(input: &[u8]) -> ParseResult<'_, LineNum> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L111
        let (input, num) = number::be_i32(input).or_eof()?;

        Ok((
            input,
            match num {
                num if num > 0 => LineNum::Normal(num as u32),
                -2 => LineNum::CompiledMethod,
                -3 => LineNum::NativeMethod,
                _ => LineNum::Unknown,
            },
        ))
    }
}

impl fmt::Display for LineNum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LineNum::Normal(n) => write!(f, "{}", n),
            LineNum::Unknown => write!(f, "Unknown"),
            LineNum::CompiledMethod => write!(f, "CompiledMethod"),
            LineNum::NativeMethod => write!(f, "NativeMethod"),
        }
    }
}
