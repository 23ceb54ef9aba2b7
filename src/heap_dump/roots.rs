//! The nine GC root flavors. All have fixed-size bodies (see
//! [`super::SubTag::static_size`]); they are parsed into typed structs so
//! root-set passes don't have to re-derive the layouts.

use crate::errors::{NomLeaf, ParseResult};
use crate::parsing_iterator::IdSizedParse;
use crate::{Id, IdSize, Serial};
use getset::CopyGetters;
use nom::number::complete as number;

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct GcRootUnknown {
    #[get_copy = "pub"]
    obj_id: Id,
}

impl GcRootUnknown {
    pub(crate) fn parse(input: &[u8], id_size: IdSize) -> ParseResult<'_, GcRootUnknown> {
        let (input, obj_id) = Id::parse(input, id_size)?;

        Ok((input, GcRootUnknown { obj_id }))
    }
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct GcRootJniGlobal {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    jni_global_ref_id: Id,
}

impl GcRootJniGlobal {
    pub(crate) fn parse(input: &[u8], id_size: IdSize) -> ParseResult<'_, GcRootJniGlobal> {
        let (input, obj_id) = Id::parse(input, id_size)?;
        let (input, jni_global_ref_id) = Id::parse(input, id_size)?;

        Ok((
            input,
            GcRootJniGlobal {
                obj_id,
                jni_global_ref_id,
            },
        ))
    }
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct GcRootJniLocal {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    thread_serial: Serial,
    /// Index into the thread's stack trace; -1 on the wire when empty.
    #[get_copy = "pub"]
    frame_index: Option<u32>,
}

impl GcRootJniLocal {
    pub(crate) fn parse(input: &[u8], id_size: IdSize) -> ParseResult<'_, GcRootJniLocal> {
        let (input, obj_id) = Id::parse(input, id_size)?;
        let (input, thread_serial) = number::be_u32(input).or_eof()?;
        let (input, frame_index) = parse_frame_index(input)?;

        Ok((
            input,
            GcRootJniLocal {
                obj_id,
                thread_serial,
                frame_index,
            },
        ))
    }
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct GcRootJavaFrame {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    thread_serial: Serial,
    /// Index into the thread's stack trace; -1 on the wire when empty.
    #[get_copy = "pub"]
    frame_index: Option<u32>,
}

impl GcRootJavaFrame {
    pub(crate) fn parse(input: &[u8], id_size: IdSize) -> ParseResult<'_, GcRootJavaFrame> {
        let (input, obj_id) = Id::parse(input, id_size)?;
        let (input, thread_serial) = number::be_u32(input).or_eof()?;
        let (input, frame_index) = parse_frame_index(input)?;

        Ok((
            input,
            GcRootJavaFrame {
                obj_id,
                thread_serial,
                frame_index,
            },
        ))
    }
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct GcRootNativeStack {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    thread_serial: Serial,
}

impl GcRootNativeStack {
    pub(crate) fn parse(input: &[u8], id_size: IdSize) -> ParseResult<'_, GcRootNativeStack> {
        let (input, obj_id) = Id::parse(input, id_size)?;
        let (input, thread_serial) = number::be_u32(input).or_eof()?;

        Ok((
            input,
            GcRootNativeStack {
                obj_id,
                thread_serial,
            },
        ))
    }
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct GcRootStickyClass {
    #[get_copy = "pub"]
    obj_id: Id,
}

impl GcRootStickyClass {
    pub(crate) fn parse(input: &[u8], id_size: IdSize) -> ParseResult<'_, GcRootStickyClass> {
        let (input, obj_id) = Id::parse(input, id_size)?;

        Ok((input, GcRootStickyClass { obj_id }))
    }
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct GcRootThreadBlock {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    thread_serial: Serial,
}

impl GcRootThreadBlock {
    pub(crate) fn parse(input: &[u8], id_size: IdSize) -> ParseResult<'_, GcRootThreadBlock> {
        let (input, obj_id) = Id::parse(input, id_size)?;
        let (input, thread_serial) = number::be_u32(input).or_eof()?;

        Ok((
            input,
            GcRootThreadBlock {
                obj_id,
                thread_serial,
            },
        ))
    }
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct GcRootMonitorUsed {
    #[get_copy = "pub"]
    obj_id: Id,
}

impl GcRootMonitorUsed {
    pub(crate) fn parse(input: &[u8], id_size: IdSize) -> ParseResult<'_, GcRootMonitorUsed> {
        let (input, obj_id) = Id::parse(input, id_size)?;

        Ok((input, GcRootMonitorUsed { obj_id }))
    }
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct GcRootThreadObject {
    /// May be null for a thread newly attached through JNI.
    #[get_copy = "pub"]
    thread_obj_id: Option<Id>,
    #[get_copy = "pub"]
    thread_serial: Serial,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
}

impl GcRootThreadObject {
    pub(crate) fn parse(input: &[u8], id_size: IdSize) -> ParseResult<'_, GcRootThreadObject> {
        let (input, thread_obj_id) = Id::parse_opt(input, id_size)?;
        let (input, thread_serial) = number::be_u32(input).or_eof()?;
        let (input, stack_trace_serial) = number::be_u32(input).or_eof()?;

        Ok((
            input,
            GcRootThreadObject {
                thread_obj_id,
                thread_serial,
                stack_trace_serial,
            },
        ))
    }
}

fn parse_frame_index(input: &[u8]) -> ParseResult<'_, Option<u32>> {
    let (input, raw) = number::be_i32(input).or_eof()?;

    Ok((input, if raw < 0 { None } else { Some(raw as u32) }))
}
