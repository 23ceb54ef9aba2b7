use crate::errors::{HprofError, NomLeaf, ParseResult};
use crate::parsing_iterator::{IdSizedParse, ParsingIterator, Stateless, StatelessParse, WithIdSize};
use crate::{Id, IdSize, Serial};
use getset::CopyGetters;
use nom::bytes::complete as bytes;
use nom::number::complete as number;

/// The type tag carried by constants, static fields and instance fields.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum FieldType {
    Object,
    Boolean,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
}

impl FieldType {
    fn from_byte(b: u8) -> Result<FieldType, HprofError> {
        match b {
            0x02 => Ok(FieldType::Object),
            0x04 => Ok(FieldType::Boolean),
            0x05 => Ok(FieldType::Char),
            0x06 => Ok(FieldType::Float),
            0x07 => Ok(FieldType::Double),
            0x08 => Ok(FieldType::Byte),
            0x09 => Ok(FieldType::Short),
            0x0A => Ok(FieldType::Int),
            0x0B => Ok(FieldType::Long),
            _ => Err(HprofError::InvalidBasicType(b)),
        }
    }

    fn parse(input: &[u8]) -> ParseResult<'_, FieldType> {
        let (input, type_byte) = number::be_u8(input).or_eof()?;
        let field_type = FieldType::from_byte(type_byte)?;

        Ok((input, field_type))
    }

    /// Encoded width of one value of this type. Object references occupy 8
    /// bytes in field payloads regardless of the dump's identifier width;
    /// only array element runs use the header width.
    pub fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Object => 8,
            FieldType::Boolean => 1,
            FieldType::Char => 2,
            FieldType::Float => 4,
            FieldType::Double => 8,
            FieldType::Byte => 1,
            FieldType::Short => 2,
            FieldType::Int => 4,
            FieldType::Long => 8,
        }
    }

    pub fn java_type_name(self) -> &'static str {
        match self {
            FieldType::Object => "object",
            FieldType::Boolean => "boolean",
            FieldType::Char => "char",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Byte => "byte",
            FieldType::Short => "short",
            FieldType::Int => "int",
            FieldType::Long => "long",
        }
    }

    /// Decodes one value of this type off the front of `input`.
    pub fn parse_value<'a>(self, input: &'a [u8]) -> ParseResult<'a, FieldValue> {
        match self {
            FieldType::Object => {
                let (input, raw) = number::be_u64(input).or_eof()?;
                let id = if raw == 0 { None } else { Some(Id::from(raw)) };
                Ok((input, FieldValue::ObjectId(id)))
            }
            FieldType::Boolean => {
                let (input, b) = number::be_u8(input).or_eof()?;
                Ok((input, FieldValue::Boolean(b != 0)))
            }
            FieldType::Char => {
                let (input, c) = number::be_u16(input).or_eof()?;
                Ok((input, FieldValue::Char(c)))
            }
            FieldType::Float => {
                let (input, f) = number::be_f32(input).or_eof()?;
                Ok((input, FieldValue::Float(f)))
            }
            FieldType::Double => {
                let (input, d) = number::be_f64(input).or_eof()?;
                Ok((input, FieldValue::Double(d)))
            }
            FieldType::Byte => {
                let (input, b) = number::be_i8(input).or_eof()?;
                Ok((input, FieldValue::Byte(b)))
            }
            FieldType::Short => {
                let (input, s) = number::be_i16(input).or_eof()?;
                Ok((input, FieldValue::Short(s)))
            }
            FieldType::Int => {
                let (input, i) = number::be_i32(input).or_eof()?;
                Ok((input, FieldValue::Int(i)))
            }
            FieldType::Long => {
                let (input, l) = number::be_i64(input).or_eof()?;
                Ok((input, FieldValue::Long(l)))
            }
        }
    }
}

/// A decoded field, static or constant value.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum FieldValue {
    /// `None` is a null reference.
    ObjectId(Option<Id>),
    Boolean(bool),
    Char(u16),
    Float(f32),
    Double(f64),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct ConstantPoolEntry {
    #[get_copy = "pub"]
    pool_index: u16,
    #[get_copy = "pub"]
    field_type: FieldType,
    #[get_copy = "pub"]
    value: FieldValue,
}

impl StatelessParse for ConstantPoolEntry {
    fn parse(input: &[u8]) -> ParseResult<'_, ConstantPoolEntry> {
        let (input, pool_index) = number::be_u16(input).or_eof()?;
        let (input, field_type) = FieldType::parse(input)?;
        let (input, value) = field_type.parse_value(input)?;

        Ok((
            input,
            ConstantPoolEntry {
                pool_index,
                field_type,
                value,
            },
        ))
    }
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct StaticFieldEntry {
    #[get_copy = "pub"]
    name_id: Id,
    #[get_copy = "pub"]
    field_type: FieldType,
    #[get_copy = "pub"]
    value: FieldValue,
}

impl IdSizedParse for StaticFieldEntry {
    fn parse(input: &[u8], id_size: IdSize) -> ParseResult<'_, StaticFieldEntry> {
        let (input, name_id) = Id::parse(input, id_size)?;
        let (input, field_type) = FieldType::parse(input)?;
        let (input, value) = field_type.parse_value(input)?;

        Ok((
            input,
            StaticFieldEntry {
                name_id,
                field_type,
                value,
            },
        ))
    }
}

/// Declares one instance field: its name and type, but no value. Values live
/// in each instance's payload, laid out in declaration order.
#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct FieldDescriptor {
    #[get_copy = "pub"]
    name_id: Id,
    #[get_copy = "pub"]
    field_type: FieldType,
}

impl IdSizedParse for FieldDescriptor {
    fn parse(input: &[u8], id_size: IdSize) -> ParseResult<'_, FieldDescriptor> {
        let (input, name_id) = Id::parse(input, id_size)?;
        let (input, field_type) = FieldType::parse(input)?;

        Ok((
            input,
            FieldDescriptor {
                name_id,
                field_type,
            },
        ))
    }
}

/// A CLASS_DUMP sub-record.
///
/// The three trailing sections (constant pool, statics, instance field
/// descriptors) are scanned once at parse time to find their extents, then
/// kept as raw slices and re-parsed on iteration.
#[derive(CopyGetters, Clone)]
pub struct Class<'a> {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    #[get_copy = "pub"]
    super_class_obj_id: Option<Id>,
    #[get_copy = "pub"]
    class_loader_obj_id: Option<Id>,
    #[get_copy = "pub"]
    signers_obj_id: Option<Id>,
    #[get_copy = "pub"]
    protection_domain_obj_id: Option<Id>,
    #[get_copy = "pub"]
    instance_size_bytes: u32,
    id_size: IdSize,
    num_constants: u16,
    constants: &'a [u8],
    num_statics: u16,
    statics: &'a [u8],
    num_fields: u16,
    fields: &'a [u8],
}

impl<'a> Class<'a> {
    pub(crate) fn parse(input: &'a [u8], id_size: IdSize) -> ParseResult<'a, Class<'a>> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L190
        let (input, obj_id) = Id::parse(input, id_size)?;
        let (input, stack_trace_serial) = number::be_u32(input).or_eof()?;
        let (input, super_class_obj_id) = Id::parse_opt(input, id_size)?;
        let (input, class_loader_obj_id) = Id::parse_opt(input, id_size)?;
        let (input, signers_obj_id) = Id::parse_opt(input, id_size)?;
        let (input, protection_domain_obj_id) = Id::parse_opt(input, id_size)?;
        // two reserved id slots
        let (input, _) = bytes::take(id_size.size_in_bytes() * 2)(input).or_eof()?;
        let (input, instance_size_bytes) = number::be_u32(input).or_eof()?;

        let (input, num_constants) = number::be_u16(input).or_eof()?;
        let (input, constants) = measure_constant_pool(input, num_constants)?;
        let (input, num_statics) = number::be_u16(input).or_eof()?;
        let (input, statics) = measure_static_fields(input, num_statics, id_size)?;
        let (input, num_fields) = number::be_u16(input).or_eof()?;
        let (input, fields) =
            bytes::take(num_fields as usize * (id_size.size_in_bytes() + 1))(input).or_eof()?;

        Ok((
            input,
            Class {
                obj_id,
                stack_trace_serial,
                super_class_obj_id,
                class_loader_obj_id,
                signers_obj_id,
                protection_domain_obj_id,
                instance_size_bytes,
                id_size,
                num_constants,
                constants,
                num_statics,
                statics,
                num_fields,
                fields,
            },
        ))
    }

    pub fn constant_pool(&self) -> ConstantPoolEntries<'a> {
        ConstantPoolEntries {
            iter: ParsingIterator::stateless(self.constants, u32::from(self.num_constants)),
        }
    }

    pub fn static_fields(&self) -> StaticFieldEntries<'a> {
        StaticFieldEntries {
            iter: ParsingIterator::with_id_size(
                self.id_size,
                self.statics,
                u32::from(self.num_statics),
            ),
        }
    }

    /// Fields declared by this class only; superclass fields come from the
    /// superclass's own dump record.
    pub fn instance_field_descriptors(&self) -> FieldDescriptors<'a> {
        FieldDescriptors {
            iter: ParsingIterator::with_id_size(
                self.id_size,
                self.fields,
                u32::from(self.num_fields),
            ),
        }
    }
}

/// Walks `n` constant pool entries to find the section's extent without
/// materializing them.
fn measure_constant_pool(input: &[u8], n: u16) -> ParseResult<'_, &[u8]> {
    let mut rest = input;
    for _ in 0..n {
        let (r, _pool_index) = number::be_u16(rest).or_eof()?;
        let (r, field_type) = FieldType::parse(r)?;
        let (r, _value) = bytes::take(field_type.size_in_bytes())(r).or_eof()?;
        rest = r;
    }

    let consumed = input.len() - rest.len();
    Ok((rest, &input[..consumed]))
}

fn measure_static_fields(input: &[u8], n: u16, id_size: IdSize) -> ParseResult<'_, &[u8]> {
    let mut rest = input;
    for _ in 0..n {
        let (r, _name_id) = Id::parse(rest, id_size)?;
        let (r, field_type) = FieldType::parse(r)?;
        let (r, _value) = bytes::take(field_type.size_in_bytes())(r).or_eof()?;
        rest = r;
    }

    let consumed = input.len() - rest.len();
    Ok((rest, &input[..consumed]))
}

pub struct ConstantPoolEntries<'a> {
    iter: ParsingIterator<'a, ConstantPoolEntry, Stateless<ConstantPoolEntry>>,
}

impl<'a> Iterator for ConstantPoolEntries<'a> {
    type Item = Result<ConstantPoolEntry, HprofError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

pub struct StaticFieldEntries<'a> {
    iter: ParsingIterator<'a, StaticFieldEntry, WithIdSize<StaticFieldEntry>>,
}

impl<'a> Iterator for StaticFieldEntries<'a> {
    type Item = Result<StaticFieldEntry, HprofError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

pub struct FieldDescriptors<'a> {
    iter: ParsingIterator<'a, FieldDescriptor, WithIdSize<FieldDescriptor>>,
}

impl<'a> Iterator for FieldDescriptors<'a> {
    type Item = Result<FieldDescriptor, HprofError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}
