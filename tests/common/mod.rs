//! Byte-level builders for synthetic hprof dumps. Everything is written
//! big-endian, exactly as the parser expects to find it on disk.

#![allow(dead_code)]

pub const TAG_UTF8: u8 = 0x01;
pub const TAG_LOAD_CLASS: u8 = 0x02;
pub const TAG_STACK_FRAME: u8 = 0x04;
pub const TAG_STACK_TRACE: u8 = 0x05;
pub const TAG_HEAP_DUMP: u8 = 0x0C;
pub const TAG_HEAP_DUMP_SEGMENT: u8 = 0x1C;

pub const SUB_ROOT_UNKNOWN: u8 = 0xFF;
pub const SUB_CLASS_DUMP: u8 = 0x20;
pub const SUB_INSTANCE_DUMP: u8 = 0x21;
pub const SUB_OBJECT_ARRAY_DUMP: u8 = 0x22;
pub const SUB_PRIMITIVE_ARRAY_DUMP: u8 = 0x23;

pub const TYPE_OBJECT: u8 = 0x02;
pub const TYPE_BOOLEAN: u8 = 0x04;
pub const TYPE_INT: u8 = 0x0A;
pub const TYPE_LONG: u8 = 0x0B;

/// Builds a whole dump: magic, header, then records.
pub struct DumpBuilder {
    id_size: u32,
    bytes: Vec<u8>,
}

impl DumpBuilder {
    pub fn new(id_size: u32) -> DumpBuilder {
        let mut bytes = b"JAVA PROFILE 1.0.2\0".to_vec();
        bytes.extend_from_slice(&id_size.to_be_bytes());
        bytes.extend_from_slice(&0_u64.to_be_bytes());
        DumpBuilder { id_size, bytes }
    }

    pub fn record(mut self, tag: u8, body: &[u8]) -> DumpBuilder {
        self.bytes.push(tag);
        self.bytes.extend_from_slice(&0_u32.to_be_bytes());
        self.bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        self.bytes.extend_from_slice(body);
        self
    }

    pub fn utf8(self, name_id: u64, text: &str) -> DumpBuilder {
        let mut body = id_bytes(name_id, self.id_size);
        body.extend_from_slice(text.as_bytes());
        self.record(TAG_UTF8, &body)
    }

    pub fn load_class(self, serial: u32, class_obj_id: u64, name_id: u64) -> DumpBuilder {
        let mut body = serial.to_be_bytes().to_vec();
        body.extend_from_slice(&id_bytes(class_obj_id, self.id_size));
        body.extend_from_slice(&0_u32.to_be_bytes()); // stack trace serial
        body.extend_from_slice(&id_bytes(name_id, self.id_size));
        self.record(TAG_LOAD_CLASS, &body)
    }

    pub fn stack_frame(
        self,
        frame_id: u64,
        method_name_id: u64,
        signature_id: u64,
        source_file_id: u64,
        class_serial: u32,
        line: i32,
    ) -> DumpBuilder {
        let mut body = id_bytes(frame_id, self.id_size);
        body.extend_from_slice(&id_bytes(method_name_id, self.id_size));
        body.extend_from_slice(&id_bytes(signature_id, self.id_size));
        body.extend_from_slice(&id_bytes(source_file_id, self.id_size));
        body.extend_from_slice(&class_serial.to_be_bytes());
        body.extend_from_slice(&line.to_be_bytes());
        self.record(TAG_STACK_FRAME, &body)
    }

    pub fn stack_trace(self, serial: u32, thread_serial: u32, frame_ids: &[u64]) -> DumpBuilder {
        let mut body = serial.to_be_bytes().to_vec();
        body.extend_from_slice(&thread_serial.to_be_bytes());
        body.extend_from_slice(&(frame_ids.len() as u32).to_be_bytes());
        for &frame_id in frame_ids {
            body.extend_from_slice(&id_bytes(frame_id, self.id_size));
        }
        self.record(TAG_STACK_TRACE, &body)
    }

    pub fn heap_dump(self, sub_records: &[u8]) -> DumpBuilder {
        self.record(TAG_HEAP_DUMP, sub_records)
    }

    pub fn heap_dump_segment(self, sub_records: &[u8]) -> DumpBuilder {
        self.record(TAG_HEAP_DUMP_SEGMENT, sub_records)
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// Builds the body of a HEAP_DUMP / HEAP_DUMP_SEGMENT record.
pub struct SegmentBuilder {
    id_size: u32,
    bytes: Vec<u8>,
}

impl SegmentBuilder {
    pub fn new(id_size: u32) -> SegmentBuilder {
        SegmentBuilder {
            id_size,
            bytes: Vec::new(),
        }
    }

    /// A class with no constants or statics; `fields` are
    /// `(name string id, type byte)` pairs in declaration order.
    pub fn class_dump(
        mut self,
        obj_id: u64,
        super_class_obj_id: u64,
        fields: &[(u64, u8)],
    ) -> SegmentBuilder {
        self.bytes.push(SUB_CLASS_DUMP);
        self.push_id(obj_id);
        self.push_u32(0); // stack trace serial
        self.push_id(super_class_obj_id);
        self.push_id(0); // class loader
        self.push_id(0); // signers
        self.push_id(0); // protection domain
        self.push_id(0); // reserved
        self.push_id(0); // reserved
        self.push_u32(0); // instance size
        self.push_u16(0); // constant pool
        self.push_u16(0); // statics
        self.push_u16(fields.len() as u16);
        for &(name_id, type_byte) in fields {
            self.push_id(name_id);
            self.bytes.push(type_byte);
        }
        self
    }

    pub fn instance(mut self, obj_id: u64, class_obj_id: u64, field_bytes: &[u8]) -> SegmentBuilder {
        self.bytes.push(SUB_INSTANCE_DUMP);
        self.push_id(obj_id);
        self.push_u32(0); // stack trace serial
        self.push_id(class_obj_id);
        self.push_u32(field_bytes.len() as u32);
        self.bytes.extend_from_slice(field_bytes);
        self
    }

    pub fn object_array(
        mut self,
        obj_id: u64,
        array_class_obj_id: u64,
        element_ids: &[u64],
    ) -> SegmentBuilder {
        self.bytes.push(SUB_OBJECT_ARRAY_DUMP);
        self.push_id(obj_id);
        self.push_u32(0); // stack trace serial
        self.push_u32(element_ids.len() as u32);
        // the array class slot is always 8 bytes, independent of the
        // identifier width
        self.bytes.extend_from_slice(&array_class_obj_id.to_be_bytes());
        for &element in element_ids {
            self.push_id(element);
        }
        self
    }

    pub fn primitive_array(
        mut self,
        obj_id: u64,
        element_type: u8,
        num_elements: u32,
        element_bytes: &[u8],
    ) -> SegmentBuilder {
        self.bytes.push(SUB_PRIMITIVE_ARRAY_DUMP);
        self.push_id(obj_id);
        self.push_u32(0); // stack trace serial
        self.push_u32(num_elements);
        self.bytes.push(element_type);
        self.bytes.extend_from_slice(element_bytes);
        self
    }

    pub fn root_unknown(mut self, obj_id: u64) -> SegmentBuilder {
        self.bytes.push(SUB_ROOT_UNKNOWN);
        self.push_id(obj_id);
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> SegmentBuilder {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }

    fn push_id(&mut self, id: u64) {
        let encoded = id_bytes(id, self.id_size);
        self.bytes.extend_from_slice(&encoded);
    }

    fn push_u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    fn push_u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }
}

/// An id truncated to the dump's identifier width, big-endian.
pub fn id_bytes(id: u64, id_size: u32) -> Vec<u8> {
    id.to_be_bytes()[8 - id_size as usize..].to_vec()
}

/// An 8-byte object field value, as laid out in instance payloads.
pub fn object_field(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}
