//! The semantic view of a dump: every record kind materialized into a map
//! keyed by its natural identifier, plus the lookups and traversals the
//! analysis layer runs on (superclass walks, field decoding, id-kind
//! resolution).
//!
//! Each map is built by its own pass over the record stream. hprof does not
//! guarantee record ordering, so passes never assume one kind appears before
//! another, and a duplicate key silently keeps the last occurrence.

use crate::heap_dump::{
    ConstantPoolEntry, FieldDescriptor, FieldValue, Instance, ObjectArray, PrimitiveArray,
    StaticFieldEntry, SubRecord,
};
use crate::{Hprof, HprofError, Id, IdSize, LoadClass, Serial, StackFrame};
use std::collections::HashMap;

/// A CLASS_DUMP materialized out of the stream, with its sections decoded
/// eagerly so layout walks don't re-parse record bytes.
pub struct ClassInfo {
    pub obj_id: Id,
    pub super_class_obj_id: Option<Id>,
    pub class_loader_obj_id: Option<Id>,
    pub signers_obj_id: Option<Id>,
    pub protection_domain_obj_id: Option<Id>,
    pub instance_size_bytes: u32,
    pub constant_pool: Vec<ConstantPoolEntry>,
    pub static_fields: Vec<StaticFieldEntry>,
    /// Declaration order. Together with the superclass chain this decides
    /// the layout of every instance payload of this class.
    pub instance_fields: Vec<FieldDescriptor>,
}

/// A STACK_TRACE with its frame ids materialized.
pub struct StackTraceData {
    pub stack_trace_serial: Serial,
    pub thread_serial: Serial,
    pub frame_ids: Vec<Id>,
}

/// What a raw 64-bit value resolves to, decided by membership in the maps.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HeapId {
    Null,
    Class(Id),
    Object(Id),
    ObjectArray(Id),
    PrimitiveArray(Id),
    Unknown(Id),
}

/// Owns every map built from the dump plus the identifier width. Mutated
/// only while [`HeapIndex::from_hprof`] runs; read-only afterwards.
pub struct HeapIndex<'a> {
    id_size: IdSize,
    strings: HashMap<Id, &'a str>,
    load_classes: HashMap<Id, LoadClass>,
    classes: HashMap<Id, ClassInfo>,
    instance_counts: HashMap<Id, u64>,
    instances: HashMap<Id, Instance<'a>>,
    object_arrays: HashMap<Id, ObjectArray<'a>>,
    primitive_arrays: HashMap<Id, PrimitiveArray<'a>>,
    stack_frames: HashMap<Id, StackFrame>,
    stack_traces: HashMap<Serial, StackTraceData>,
}

impl<'a> HeapIndex<'a> {
    pub fn from_hprof(hprof: &Hprof<'a>) -> Result<HeapIndex<'a>, HprofError> {
        let index = HeapIndex {
            id_size: hprof.header().id_size(),
            strings: utf8_strings_by_id(hprof)?,
            load_classes: load_classes_by_obj_id(hprof)?,
            classes: class_dumps_by_obj_id(hprof)?,
            instance_counts: instance_counts_by_class(hprof)?,
            instances: instances_by_id(hprof)?,
            object_arrays: object_arrays_by_id(hprof)?,
            primitive_arrays: primitive_arrays_by_id(hprof)?,
            stack_frames: stack_frames_by_id(hprof)?,
            stack_traces: stack_traces_by_serial(hprof)?,
        };

        log::debug!(
            "indexed {} strings, {} classes, {} instances, {} object arrays, {} primitive arrays",
            index.strings.len(),
            index.classes.len(),
            index.instances.len(),
            index.object_arrays.len(),
            index.primitive_arrays.len(),
        );

        Ok(index)
    }

    pub fn id_size(&self) -> IdSize {
        self.id_size
    }

    pub fn string(&self, id: Id) -> Result<&'a str, HprofError> {
        self.strings
            .get(&id)
            .copied()
            .ok_or(HprofError::UnknownObject(id))
    }

    pub fn load_class(&self, class_obj_id: Id) -> Result<&LoadClass, HprofError> {
        self.load_classes
            .get(&class_obj_id)
            .ok_or(HprofError::UnknownObject(class_obj_id))
    }

    pub fn load_classes(&self) -> impl Iterator<Item = &LoadClass> {
        self.load_classes.values()
    }

    /// The class's binary name as recorded by its LOAD_CLASS entry, e.g.
    /// `java/lang/String`.
    pub fn class_name(&self, class_obj_id: Id) -> Result<&'a str, HprofError> {
        self.string(self.load_class(class_obj_id)?.class_name_id())
    }

    pub fn class(&self, class_obj_id: Id) -> Result<&ClassInfo, HprofError> {
        self.classes
            .get(&class_obj_id)
            .ok_or(HprofError::UnknownObject(class_obj_id))
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassInfo> {
        self.classes.values()
    }

    pub fn instance(&self, obj_id: Id) -> Result<&Instance<'a>, HprofError> {
        self.instances
            .get(&obj_id)
            .ok_or(HprofError::UnknownObject(obj_id))
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance<'a>> {
        self.instances.values()
    }

    pub fn instance_count(&self, class_obj_id: Id) -> u64 {
        self.instance_counts.get(&class_obj_id).copied().unwrap_or(0)
    }

    pub fn instance_counts(&self) -> impl Iterator<Item = (Id, u64)> + '_ {
        self.instance_counts.iter().map(|(&id, &count)| (id, count))
    }

    pub fn stack_frame(&self, frame_id: Id) -> Result<&StackFrame, HprofError> {
        self.stack_frames
            .get(&frame_id)
            .ok_or(HprofError::UnknownObject(frame_id))
    }

    pub fn stack_traces(&self) -> impl Iterator<Item = &StackTraceData> {
        self.stack_traces.values()
    }

    pub fn is_class_obj(&self, id: Id) -> bool {
        self.classes.contains_key(&id)
    }

    pub fn is_object(&self, id: Id) -> bool {
        self.instances.contains_key(&id)
    }

    pub fn is_object_array(&self, id: Id) -> bool {
        self.object_arrays.contains_key(&id)
    }

    pub fn is_primitive_array(&self, id: Id) -> bool {
        self.primitive_arrays.contains_key(&id)
    }

    /// Resolves a raw id against the four object maps. Callers that need to
    /// branch on the kind match on this instead of probing map by map.
    pub fn resolve(&self, id: Id) -> HeapId {
        if id.is_null() {
            HeapId::Null
        } else if self.is_object(id) {
            HeapId::Object(id)
        } else if self.is_class_obj(id) {
            HeapId::Class(id)
        } else if self.is_object_array(id) {
            HeapId::ObjectArray(id)
        } else if self.is_primitive_array(id) {
            HeapId::PrimitiveArray(id)
        } else {
            HeapId::Unknown(id)
        }
    }

    /// The class itself, then its superclasses up to the hierarchy root.
    /// Yields an error if the chain leaves the class map.
    pub fn superclasses<'i>(&'i self, class_obj_id: Id) -> Superclasses<'i, 'a> {
        Superclasses {
            index: self,
            next: Some(class_obj_id),
        }
    }

    /// Field declarations in payload-layout order: the class's own fields
    /// first, then each superclass's going up.
    pub fn field_descriptors(&self, class_obj_id: Id) -> Result<Vec<FieldDescriptor>, HprofError> {
        let mut descriptors = Vec::new();
        for class in self.superclasses(class_obj_id) {
            descriptors.extend(class?.instance_fields.iter().copied());
        }
        Ok(descriptors)
    }

    /// Decodes an instance's payload against its class's field layout. The
    /// layout must consume the payload exactly.
    pub fn field_values(
        &self,
        obj_id: Id,
    ) -> Result<Vec<(FieldDescriptor, FieldValue)>, HprofError> {
        let instance = self.instance(obj_id)?;

        let mut values = Vec::new();
        let mut input = instance.fields();
        for descriptor in self.field_descriptors(instance.class_obj_id())? {
            let (rest, value) = descriptor.field_type().parse_value(input)?;
            input = rest;
            values.push((descriptor, value));
        }

        if !input.is_empty() {
            return Err(HprofError::BodySizeMismatch);
        }

        Ok(values)
    }

    /// The first field of `obj_id` (in layout order) whose name matches.
    pub fn field_value(&self, obj_id: Id, name: &str) -> Result<FieldValue, HprofError> {
        for (descriptor, value) in self.field_values(obj_id)? {
            if self.string(descriptor.name_id())? == name {
                return Ok(value);
            }
        }

        Err(HprofError::FieldNotFound(name.to_owned()))
    }

    /// Every instance whose class is exactly `class_obj_id` (subclasses have
    /// their own class ids). Sorted so reports are deterministic.
    pub fn instances_of(&self, class_obj_id: Id) -> Vec<Id> {
        let mut ids: Vec<Id> = self
            .instances
            .values()
            .filter(|instance| instance.class_obj_id() == class_obj_id)
            .map(|instance| instance.obj_id())
            .collect();
        ids.sort_unstable();
        ids
    }
}

pub struct Superclasses<'i, 'a> {
    index: &'i HeapIndex<'a>,
    next: Option<Id>,
}

impl<'i, 'a> Iterator for Superclasses<'i, 'a> {
    type Item = Result<&'i ClassInfo, HprofError>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next.take()?;
        let index = self.index;

        match index.classes.get(&id) {
            Some(class) => {
                self.next = class.super_class_obj_id;
                Some(Ok(class))
            }
            None => Some(Err(HprofError::UnknownObject(id))),
        }
    }
}

/// STRING_IN_UTF8 records by string id. Records with invalid UTF-8 get a
/// placeholder rather than failing the pass; nothing the analyzer matches on
/// contains invalid bytes.
pub fn utf8_strings_by_id<'a>(hprof: &Hprof<'a>) -> Result<HashMap<Id, &'a str>, HprofError> {
    let mut strings = HashMap::new();
    for record in hprof.records() {
        if let Some(parsed) = record?.as_utf_8() {
            let utf8 = parsed?;
            strings.insert(
                utf8.name_id(),
                utf8.text_as_str().unwrap_or("(invalid UTF-8)"),
            );
        }
    }
    Ok(strings)
}

/// LOAD_CLASS records by class object id.
pub fn load_classes_by_obj_id(hprof: &Hprof) -> Result<HashMap<Id, LoadClass>, HprofError> {
    let mut load_classes = HashMap::new();
    for record in hprof.records() {
        if let Some(parsed) = record?.as_load_class() {
            let load_class = parsed?;
            load_classes.insert(load_class.class_obj_id(), load_class);
        }
    }
    Ok(load_classes)
}

/// CLASS_DUMP sub-records by class object id, materialized.
pub fn class_dumps_by_obj_id(hprof: &Hprof) -> Result<HashMap<Id, ClassInfo>, HprofError> {
    let mut classes = HashMap::new();
    for record in hprof.records() {
        if let Some(segment) = record?.as_heap_dump_segment() {
            for sub_record in segment.sub_records() {
                if let SubRecord::Class(class) = sub_record? {
                    let info = ClassInfo {
                        obj_id: class.obj_id(),
                        super_class_obj_id: class.super_class_obj_id(),
                        class_loader_obj_id: class.class_loader_obj_id(),
                        signers_obj_id: class.signers_obj_id(),
                        protection_domain_obj_id: class.protection_domain_obj_id(),
                        instance_size_bytes: class.instance_size_bytes(),
                        constant_pool: class.constant_pool().collect::<Result<_, _>>()?,
                        static_fields: class.static_fields().collect::<Result<_, _>>()?,
                        instance_fields: class
                            .instance_field_descriptors()
                            .collect::<Result<_, _>>()?,
                    };
                    classes.insert(info.obj_id, info);
                }
            }
        }
    }
    Ok(classes)
}

/// INSTANCE_DUMP occurrences per class object id.
pub fn instance_counts_by_class(hprof: &Hprof) -> Result<HashMap<Id, u64>, HprofError> {
    let mut counts = HashMap::new();
    for record in hprof.records() {
        if let Some(segment) = record?.as_heap_dump_segment() {
            for sub_record in segment.sub_records() {
                if let SubRecord::Instance(instance) = sub_record? {
                    *counts.entry(instance.class_obj_id()).or_insert(0) += 1;
                }
            }
        }
    }
    Ok(counts)
}

/// INSTANCE_DUMP sub-records by object id. Field payloads stay undecoded
/// views into the buffer.
pub fn instances_by_id<'a>(hprof: &Hprof<'a>) -> Result<HashMap<Id, Instance<'a>>, HprofError> {
    let mut instances = HashMap::new();
    for record in hprof.records() {
        if let Some(segment) = record?.as_heap_dump_segment() {
            for sub_record in segment.sub_records() {
                if let SubRecord::Instance(instance) = sub_record? {
                    instances.insert(instance.obj_id(), instance);
                }
            }
        }
    }
    Ok(instances)
}

/// OBJECT_ARRAY_DUMP sub-records by array object id.
pub fn object_arrays_by_id<'a>(
    hprof: &Hprof<'a>,
) -> Result<HashMap<Id, ObjectArray<'a>>, HprofError> {
    let mut arrays = HashMap::new();
    for record in hprof.records() {
        if let Some(segment) = record?.as_heap_dump_segment() {
            for sub_record in segment.sub_records() {
                if let SubRecord::ObjectArray(array) = sub_record? {
                    arrays.insert(array.obj_id(), array);
                }
            }
        }
    }
    Ok(arrays)
}

/// PRIMITIVE_ARRAY_DUMP sub-records by array object id.
pub fn primitive_arrays_by_id<'a>(
    hprof: &Hprof<'a>,
) -> Result<HashMap<Id, PrimitiveArray<'a>>, HprofError> {
    let mut arrays = HashMap::new();
    for record in hprof.records() {
        if let Some(segment) = record?.as_heap_dump_segment() {
            for sub_record in segment.sub_records() {
                if let SubRecord::PrimitiveArray(array) = sub_record? {
                    arrays.insert(array.obj_id(), array);
                }
            }
        }
    }
    Ok(arrays)
}

/// STACK_FRAME records by frame id.
pub fn stack_frames_by_id(hprof: &Hprof) -> Result<HashMap<Id, StackFrame>, HprofError> {
    let mut frames = HashMap::new();
    for record in hprof.records() {
        if let Some(parsed) = record?.as_stack_frame() {
            let frame = parsed?;
            frames.insert(frame.id(), frame);
        }
    }
    Ok(frames)
}

/// STACK_TRACE records by trace serial, frame ids materialized.
pub fn stack_traces_by_serial(hprof: &Hprof) -> Result<HashMap<Serial, StackTraceData>, HprofError> {
    let mut traces = HashMap::new();
    for record in hprof.records() {
        if let Some(parsed) = record?.as_stack_trace() {
            let trace = parsed?;
            traces.insert(
                trace.stack_trace_serial(),
                StackTraceData {
                    stack_trace_serial: trace.stack_trace_serial(),
                    thread_serial: trace.thread_serial(),
                    frame_ids: trace.frame_ids().collect::<Result<_, _>>()?,
                },
            );
        }
    }
    Ok(traces)
}
