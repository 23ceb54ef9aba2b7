//! Sub-records found inside HEAP_DUMP / HEAP_DUMP_SEGMENT bodies: GC roots,
//! class dumps, instance dumps, and the two array dump kinds.

use crate::errors::{HprofError, NomLeaf, ParseResult};
use crate::IdSize;
use nom::number::complete as number;

mod class;
mod objects;
mod roots;

pub use class::{
    Class, ConstantPoolEntries, ConstantPoolEntry, FieldDescriptor, FieldDescriptors, FieldType,
    FieldValue, StaticFieldEntries, StaticFieldEntry,
};
pub use objects::{Instance, ObjectArray, PrimitiveArray, PrimitiveArrayType};
pub use roots::{
    GcRootJavaFrame, GcRootJniGlobal, GcRootJniLocal, GcRootMonitorUsed, GcRootNativeStack,
    GcRootStickyClass, GcRootThreadBlock, GcRootThreadObject, GcRootUnknown,
};

/// Sub-record kinds. Declared in tag-byte order so the derived `Ord` matches
/// the wire encoding (ROOT UNKNOWN, 0xFF, sorts last).
#[derive(Debug, Copy, Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum SubTag {
    RootJniGlobal,
    RootJniLocal,
    RootJavaFrame,
    RootNativeStack,
    RootStickyClass,
    RootThreadBlock,
    RootMonitorUsed,
    RootThreadObject,
    ClassDump,
    InstanceDump,
    ObjectArrayDump,
    PrimitiveArrayDump,
    RootUnknown,
}

impl SubTag {
    fn from_byte(b: u8) -> Result<SubTag, HprofError> {
        match b {
            0x01 => Ok(SubTag::RootJniGlobal),
            0x02 => Ok(SubTag::RootJniLocal),
            0x03 => Ok(SubTag::RootJavaFrame),
            0x04 => Ok(SubTag::RootNativeStack),
            0x05 => Ok(SubTag::RootStickyClass),
            0x06 => Ok(SubTag::RootThreadBlock),
            0x07 => Ok(SubTag::RootMonitorUsed),
            0x08 => Ok(SubTag::RootThreadObject),
            0x20 => Ok(SubTag::ClassDump),
            0x21 => Ok(SubTag::InstanceDump),
            0x22 => Ok(SubTag::ObjectArrayDump),
            0x23 => Ok(SubTag::PrimitiveArrayDump),
            0xFF => Ok(SubTag::RootUnknown),
            _ => Err(HprofError::InvalidSubTag(b)),
        }
    }

    pub fn byte(self) -> u8 {
        match self {
            SubTag::RootJniGlobal => 0x01,
            SubTag::RootJniLocal => 0x02,
            SubTag::RootJavaFrame => 0x03,
            SubTag::RootNativeStack => 0x04,
            SubTag::RootStickyClass => 0x05,
            SubTag::RootThreadBlock => 0x06,
            SubTag::RootMonitorUsed => 0x07,
            SubTag::RootThreadObject => 0x08,
            SubTag::ClassDump => 0x20,
            SubTag::InstanceDump => 0x21,
            SubTag::ObjectArrayDump => 0x22,
            SubTag::PrimitiveArrayDump => 0x23,
            SubTag::RootUnknown => 0xFF,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SubTag::RootJniGlobal => "ROOT JNI GLOBAL",
            SubTag::RootJniLocal => "ROOT JNI LOCAL",
            SubTag::RootJavaFrame => "ROOT JAVA FRAME",
            SubTag::RootNativeStack => "ROOT NATIVE STACK",
            SubTag::RootStickyClass => "ROOT STICKY CLASS",
            SubTag::RootThreadBlock => "ROOT THREAD BLOCK",
            SubTag::RootMonitorUsed => "ROOT MONITOR USED",
            SubTag::RootThreadObject => "ROOT THREAD OBJECT",
            SubTag::ClassDump => "CLASS DUMP",
            SubTag::InstanceDump => "INSTANCE DUMP",
            SubTag::ObjectArrayDump => "OBJECT ARRAY DUMP",
            SubTag::PrimitiveArrayDump => "PRIMITIVE ARRAY DUMP",
            SubTag::RootUnknown => "ROOT UNKNOWN",
        }
    }

    /// Body size of the fixed-size sub-records at the given identifier width;
    /// `None` for the four dump kinds whose length depends on their contents.
    pub fn static_size(self, id_size: IdSize) -> Option<usize> {
        let w = id_size.size_in_bytes();
        match self {
            SubTag::RootUnknown | SubTag::RootStickyClass | SubTag::RootMonitorUsed => Some(w),
            SubTag::RootJniGlobal => Some(2 * w),
            SubTag::RootJniLocal | SubTag::RootJavaFrame | SubTag::RootThreadObject => Some(w + 8),
            SubTag::RootNativeStack | SubTag::RootThreadBlock => Some(w + 4),
            SubTag::ClassDump
            | SubTag::InstanceDump
            | SubTag::ObjectArrayDump
            | SubTag::PrimitiveArrayDump => None,
        }
    }
}

/// One heap dump sub-record. Passes that only care about a single kind match
/// on their variant and fall through on everything else; the exhaustive enum
/// keeps the coverage check with the compiler.
pub enum SubRecord<'a> {
    GcRootUnknown(GcRootUnknown),
    GcRootJniGlobal(GcRootJniGlobal),
    GcRootJniLocal(GcRootJniLocal),
    GcRootJavaFrame(GcRootJavaFrame),
    GcRootNativeStack(GcRootNativeStack),
    GcRootStickyClass(GcRootStickyClass),
    GcRootThreadBlock(GcRootThreadBlock),
    GcRootMonitorUsed(GcRootMonitorUsed),
    GcRootThreadObject(GcRootThreadObject),
    Class(Class<'a>),
    Instance(Instance<'a>),
    ObjectArray(ObjectArray<'a>),
    PrimitiveArray(PrimitiveArray<'a>),
}

impl<'a> SubRecord<'a> {
    pub fn sub_tag(&self) -> SubTag {
        match self {
            SubRecord::GcRootUnknown(_) => SubTag::RootUnknown,
            SubRecord::GcRootJniGlobal(_) => SubTag::RootJniGlobal,
            SubRecord::GcRootJniLocal(_) => SubTag::RootJniLocal,
            SubRecord::GcRootJavaFrame(_) => SubTag::RootJavaFrame,
            SubRecord::GcRootNativeStack(_) => SubTag::RootNativeStack,
            SubRecord::GcRootStickyClass(_) => SubTag::RootStickyClass,
            SubRecord::GcRootThreadBlock(_) => SubTag::RootThreadBlock,
            SubRecord::GcRootMonitorUsed(_) => SubTag::RootMonitorUsed,
            SubRecord::GcRootThreadObject(_) => SubTag::RootThreadObject,
            SubRecord::Class(_) => SubTag::ClassDump,
            SubRecord::Instance(_) => SubTag::InstanceDump,
            SubRecord::ObjectArray(_) => SubTag::ObjectArrayDump,
            SubRecord::PrimitiveArray(_) => SubTag::PrimitiveArrayDump,
        }
    }

    pub(crate) fn parse(input: &'a [u8], id_size: IdSize) -> ParseResult<'a, SubRecord<'a>> {
        let (input, tag_byte) = number::be_u8(input).or_eof()?;
        let sub_tag = SubTag::from_byte(tag_byte)?;

        match sub_tag {
            SubTag::RootUnknown => GcRootUnknown::parse(input, id_size)
                .map(|(i, r)| (i, SubRecord::GcRootUnknown(r))),
            SubTag::RootJniGlobal => GcRootJniGlobal::parse(input, id_size)
                .map(|(i, r)| (i, SubRecord::GcRootJniGlobal(r))),
            SubTag::RootJniLocal => GcRootJniLocal::parse(input, id_size)
                .map(|(i, r)| (i, SubRecord::GcRootJniLocal(r))),
            SubTag::RootJavaFrame => GcRootJavaFrame::parse(input, id_size)
                .map(|(i, r)| (i, SubRecord::GcRootJavaFrame(r))),
            SubTag::RootNativeStack => GcRootNativeStack::parse(input, id_size)
                .map(|(i, r)| (i, SubRecord::GcRootNativeStack(r))),
            SubTag::RootStickyClass => GcRootStickyClass::parse(input, id_size)
                .map(|(i, r)| (i, SubRecord::GcRootStickyClass(r))),
            SubTag::RootThreadBlock => GcRootThreadBlock::parse(input, id_size)
                .map(|(i, r)| (i, SubRecord::GcRootThreadBlock(r))),
            SubTag::RootMonitorUsed => GcRootMonitorUsed::parse(input, id_size)
                .map(|(i, r)| (i, SubRecord::GcRootMonitorUsed(r))),
            SubTag::RootThreadObject => GcRootThreadObject::parse(input, id_size)
                .map(|(i, r)| (i, SubRecord::GcRootThreadObject(r))),
            SubTag::ClassDump => {
                Class::parse(input, id_size).map(|(i, r)| (i, SubRecord::Class(r)))
            }
            SubTag::InstanceDump => {
                Instance::parse(input, id_size).map(|(i, r)| (i, SubRecord::Instance(r)))
            }
            SubTag::ObjectArrayDump => {
                ObjectArray::parse(input, id_size).map(|(i, r)| (i, SubRecord::ObjectArray(r)))
            }
            SubTag::PrimitiveArrayDump => {
                PrimitiveArray::parse(input, id_size).map(|(i, r)| (i, SubRecord::PrimitiveArray(r)))
            }
        }
    }
}
