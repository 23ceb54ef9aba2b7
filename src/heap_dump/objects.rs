use crate::errors::{HprofError, NomLeaf, ParseResult};
use crate::parsing_iterator::IdSizedParse;
use crate::{Id, IdSize, Ids, Serial};
use getset::CopyGetters;
use nom::bytes::complete as bytes;
use nom::number::complete as number;

/// An INSTANCE_DUMP sub-record.
///
/// The field payload is retained as a raw view; decoding needs the field
/// layouts of the instance's class and all its superclasses, which may
/// appear anywhere in the stream, so it is deferred to the index.
#[derive(CopyGetters, Copy, Clone)]
pub struct Instance<'a> {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    #[get_copy = "pub"]
    class_obj_id: Id,
    #[get_copy = "pub"]
    fields: &'a [u8],
}

impl<'a> Instance<'a> {
    pub(crate) fn parse(input: &'a [u8], id_size: IdSize) -> ParseResult<'a, Instance<'a>> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L262
        let (input, obj_id) = Id::parse(input, id_size)?;
        let (input, stack_trace_serial) = number::be_u32(input).or_eof()?;
        let (input, class_obj_id) = Id::parse(input, id_size)?;
        let (input, fields_size) = number::be_u32(input).or_eof()?;
        let (input, fields) = bytes::take(fields_size)(input).or_eof()?;

        Ok((
            input,
            Instance {
                obj_id,
                stack_trace_serial,
                class_obj_id,
                fields,
            },
        ))
    }
}

/// An OBJECT_ARRAY_DUMP sub-record. The array class id occupies a fixed 8
/// bytes like the object slots in field payloads; the elements are ids at
/// the dump's identifier width, decoded on demand.
#[derive(CopyGetters, Copy, Clone)]
pub struct ObjectArray<'a> {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    #[get_copy = "pub"]
    array_class_obj_id: Id,
    #[get_copy = "pub"]
    num_elements: u32,
    id_size: IdSize,
    #[get_copy = "pub"]
    elements: &'a [u8],
}

impl<'a> ObjectArray<'a> {
    pub(crate) fn parse(input: &'a [u8], id_size: IdSize) -> ParseResult<'a, ObjectArray<'a>> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L271
        let (input, obj_id) = Id::parse(input, id_size)?;
        let (input, stack_trace_serial) = number::be_u32(input).or_eof()?;
        let (input, num_elements) = number::be_u32(input).or_eof()?;
        // the array class slot is always 8 bytes, never the identifier width
        let (input, array_class_raw) = number::be_u64(input).or_eof()?;
        let array_class_obj_id = Id::from(array_class_raw);
        let (input, elements) =
            bytes::take(num_elements as usize * id_size.size_in_bytes())(input).or_eof()?;

        Ok((
            input,
            ObjectArray {
                obj_id,
                stack_trace_serial,
                array_class_obj_id,
                num_elements,
                id_size,
                elements,
            },
        ))
    }

    /// Element ids in array order; zero ids are null references.
    pub fn element_ids(&self) -> Ids<'a> {
        Ids::new(self.id_size, self.elements, self.num_elements)
    }
}

/// A PRIMITIVE_ARRAY_DUMP sub-record. Elements stay as a raw view of
/// `primitive_type.size_in_bytes() * num_elements` bytes.
#[derive(CopyGetters, Copy, Clone)]
pub struct PrimitiveArray<'a> {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    #[get_copy = "pub"]
    primitive_type: PrimitiveArrayType,
    #[get_copy = "pub"]
    num_elements: u32,
    #[get_copy = "pub"]
    elements: &'a [u8],
}

impl<'a> PrimitiveArray<'a> {
    pub(crate) fn parse(input: &'a [u8], id_size: IdSize) -> ParseResult<'a, PrimitiveArray<'a>> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L279
        let (input, obj_id) = Id::parse(input, id_size)?;
        let (input, stack_trace_serial) = number::be_u32(input).or_eof()?;
        let (input, num_elements) = number::be_u32(input).or_eof()?;
        let (input, type_byte) = number::be_u8(input).or_eof()?;
        let primitive_type = PrimitiveArrayType::from_byte(type_byte)?;
        let (input, elements) =
            bytes::take(num_elements as usize * primitive_type.size_in_bytes())(input).or_eof()?;

        Ok((
            input,
            PrimitiveArray {
                obj_id,
                stack_trace_serial,
                primitive_type,
                num_elements,
                elements,
            },
        ))
    }
}

/// Element kinds of primitive arrays: the basic types minus object.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PrimitiveArrayType {
    Boolean,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
}

impl PrimitiveArrayType {
    fn from_byte(b: u8) -> Result<PrimitiveArrayType, HprofError> {
        match b {
            0x04 => Ok(PrimitiveArrayType::Boolean),
            0x05 => Ok(PrimitiveArrayType::Char),
            0x06 => Ok(PrimitiveArrayType::Float),
            0x07 => Ok(PrimitiveArrayType::Double),
            0x08 => Ok(PrimitiveArrayType::Byte),
            0x09 => Ok(PrimitiveArrayType::Short),
            0x0A => Ok(PrimitiveArrayType::Int),
            0x0B => Ok(PrimitiveArrayType::Long),
            _ => Err(HprofError::InvalidBasicType(b)),
        }
    }

    pub fn size_in_bytes(self) -> usize {
        match self {
            PrimitiveArrayType::Boolean => 1,
            PrimitiveArrayType::Char => 2,
            PrimitiveArrayType::Float => 4,
            PrimitiveArrayType::Double => 8,
            PrimitiveArrayType::Byte => 1,
            PrimitiveArrayType::Short => 2,
            PrimitiveArrayType::Int => 4,
            PrimitiveArrayType::Long => 8,
        }
    }

    pub fn java_type_name(self) -> &'static str {
        match self {
            PrimitiveArrayType::Boolean => "boolean",
            PrimitiveArrayType::Char => "char",
            PrimitiveArrayType::Float => "float",
            PrimitiveArrayType::Double => "double",
            PrimitiveArrayType::Byte => "byte",
            PrimitiveArrayType::Short => "short",
            PrimitiveArrayType::Int => "int",
            PrimitiveArrayType::Long => "long",
        }
    }
}
