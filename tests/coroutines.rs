mod common;

use common::*;
use coroscope::coroutines::{
    build_forest, coroutine_classes, coroutine_instances, format_coroutine, parent,
    render_hierarchy, state, CoroutineState,
};
use coroscope::index::HeapIndex;
use coroscope::{parse_hprof, HprofError, Id};

// String ids for the class and field names every scenario needs.
const NAME_ABSTRACT_COROUTINE: u64 = 0x01;
const NAME_MY_COROUTINE: u64 = 0x02;
const NAME_NODE_LIST: u64 = 0x03;
const NAME_STATE_FIELD: u64 = 0x04;
const NAME_PARENT_HANDLE_FIELD: u64 = 0x05;
const NAME_CHILD_HANDLE_NODE: u64 = 0x06;
const NAME_JOB_FIELD: u64 = 0x07;

// Class object ids.
const CLASS_ABSTRACT_COROUTINE: u64 = 0x100;
const CLASS_MY_COROUTINE: u64 = 0x200;
const CLASS_NODE_LIST: u64 = 0x300;
const CLASS_CHILD_HANDLE_NODE: u64 = 0x400;

const STATE_NODE_LIST: u64 = 0x1000;

fn base_dump() -> DumpBuilder {
    DumpBuilder::new(8)
        .utf8(NAME_ABSTRACT_COROUTINE, "kotlinx/coroutines/AbstractCoroutine")
        .utf8(NAME_MY_COROUTINE, "MyCoroutine")
        .utf8(NAME_NODE_LIST, "kotlinx/coroutines/NodeList")
        .utf8(NAME_STATE_FIELD, "_state$volatile")
        .utf8(NAME_PARENT_HANDLE_FIELD, "_parentHandle$volatile")
        .utf8(NAME_CHILD_HANDLE_NODE, "kotlinx/coroutines/ChildHandleNode")
        .utf8(NAME_JOB_FIELD, "job")
        .load_class(1, CLASS_ABSTRACT_COROUTINE, NAME_ABSTRACT_COROUTINE)
        .load_class(2, CLASS_MY_COROUTINE, NAME_MY_COROUTINE)
        .load_class(3, CLASS_NODE_LIST, NAME_NODE_LIST)
        .load_class(4, CLASS_CHILD_HANDLE_NODE, NAME_CHILD_HANDLE_NODE)
}

fn base_segment() -> SegmentBuilder {
    SegmentBuilder::new(8)
        .class_dump(
            CLASS_ABSTRACT_COROUTINE,
            0,
            &[
                (NAME_STATE_FIELD, TYPE_OBJECT),
                (NAME_PARENT_HANDLE_FIELD, TYPE_OBJECT),
            ],
        )
        .class_dump(CLASS_MY_COROUTINE, CLASS_ABSTRACT_COROUTINE, &[])
        .class_dump(CLASS_NODE_LIST, 0, &[])
        .class_dump(CLASS_CHILD_HANDLE_NODE, 0, &[(NAME_JOB_FIELD, TYPE_OBJECT)])
        .instance(STATE_NODE_LIST, CLASS_NODE_LIST, &[])
}

/// A coroutine instance payload: `_state$volatile` then
/// `_parentHandle$volatile`, 8 bytes each.
fn coroutine_fields(state_id: u64, parent_handle_id: u64) -> Vec<u8> {
    let mut fields = object_field(state_id).to_vec();
    fields.extend_from_slice(&object_field(parent_handle_id));
    fields
}

#[test]
fn single_active_coroutine_is_one_root_line() {
    let segment = base_segment()
        .instance(0x2000, CLASS_MY_COROUTINE, &coroutine_fields(STATE_NODE_LIST, 0))
        .build();
    let bytes = base_dump().heap_dump(&segment).build();

    let hprof = parse_hprof(&bytes).unwrap();
    let index = HeapIndex::from_hprof(&hprof).unwrap();

    let ids = coroutine_instances(&index).unwrap();
    assert_eq!(vec![Id::from(0x2000)], ids);
    assert_eq!(CoroutineState::Active, state(&index, Id::from(0x2000)).unwrap());
    assert_eq!(None, parent(&index, Id::from(0x2000)).unwrap());

    let forest = build_forest(&index, &ids).unwrap();
    let rendered = render_hierarchy(&index, &forest).unwrap();

    assert_eq!("MyCoroutine@2000, state: ACTIVE\n", rendered);
}

#[test]
fn child_coroutine_is_indented_under_its_parent() {
    let segment = base_segment()
        .instance(0x2000, CLASS_MY_COROUTINE, &coroutine_fields(STATE_NODE_LIST, 0))
        .instance(
            0x2001,
            CLASS_MY_COROUTINE,
            &coroutine_fields(STATE_NODE_LIST, 0x3000),
        )
        .instance(0x3000, CLASS_CHILD_HANDLE_NODE, &object_field(0x2000))
        .build();
    let bytes = base_dump().heap_dump(&segment).build();

    let hprof = parse_hprof(&bytes).unwrap();
    let index = HeapIndex::from_hprof(&hprof).unwrap();

    let ids = coroutine_instances(&index).unwrap();
    assert_eq!(vec![Id::from(0x2000), Id::from(0x2001)], ids);
    assert_eq!(Some(Id::from(0x2000)), parent(&index, Id::from(0x2001)).unwrap());

    let forest = build_forest(&index, &ids).unwrap();
    let rendered = render_hierarchy(&index, &forest).unwrap();

    assert_eq!(
        "MyCoroutine@2000, state: ACTIVE\n  MyCoroutine@2001, state: ACTIVE\n",
        rendered
    );
}

#[test]
fn children_are_created_after_parents_even_when_visited_first() {
    // visit order is sorted by id, so make the child's id the smaller one
    let segment = base_segment()
        .instance(
            0x1f00,
            CLASS_MY_COROUTINE,
            &coroutine_fields(STATE_NODE_LIST, 0x3000),
        )
        .instance(0x2000, CLASS_MY_COROUTINE, &coroutine_fields(STATE_NODE_LIST, 0))
        .instance(0x3000, CLASS_CHILD_HANDLE_NODE, &object_field(0x2000))
        .build();
    let bytes = base_dump().heap_dump(&segment).build();

    let hprof = parse_hprof(&bytes).unwrap();
    let index = HeapIndex::from_hprof(&hprof).unwrap();
    let ids = coroutine_instances(&index).unwrap();
    assert_eq!(vec![Id::from(0x1f00), Id::from(0x2000)], ids);

    let forest = build_forest(&index, &ids).unwrap();

    let roots: Vec<_> = forest.roots().collect();
    assert_eq!(1, roots.len());
    assert_eq!(Id::from(0x2000), *forest.value(roots[0]));
    let children = forest.children(roots[0]);
    assert_eq!(1, children.len());
    assert_eq!(Id::from(0x1f00), *forest.value(children[0]));
}

#[test]
fn parent_cycles_are_detected() {
    // two coroutines whose child handles point at each other
    let segment = base_segment()
        .instance(
            0x2000,
            CLASS_MY_COROUTINE,
            &coroutine_fields(STATE_NODE_LIST, 0x3001),
        )
        .instance(
            0x2001,
            CLASS_MY_COROUTINE,
            &coroutine_fields(STATE_NODE_LIST, 0x3000),
        )
        .instance(0x3000, CLASS_CHILD_HANDLE_NODE, &object_field(0x2000))
        .instance(0x3001, CLASS_CHILD_HANDLE_NODE, &object_field(0x2001))
        .build();
    let bytes = base_dump().heap_dump(&segment).build();

    let hprof = parse_hprof(&bytes).unwrap();
    let index = HeapIndex::from_hprof(&hprof).unwrap();
    let ids = coroutine_instances(&index).unwrap();

    assert!(matches!(
        build_forest(&index, &ids),
        Err(HprofError::ParentCycle(_))
    ));
}

#[test]
fn handle_of_another_class_means_no_parent() {
    // the parent handle points at a NodeList, not a ChildHandleNode
    let segment = base_segment()
        .instance(
            0x2000,
            CLASS_MY_COROUTINE,
            &coroutine_fields(STATE_NODE_LIST, STATE_NODE_LIST),
        )
        .build();
    let bytes = base_dump().heap_dump(&segment).build();

    let hprof = parse_hprof(&bytes).unwrap();
    let index = HeapIndex::from_hprof(&hprof).unwrap();

    assert_eq!(None, parent(&index, Id::from(0x2000)).unwrap());
}

#[test]
fn no_abstract_coroutine_class_means_no_coroutines() {
    let segment = SegmentBuilder::new(8)
        .class_dump(0x100, 0, &[])
        .instance(0x2000, 0x100, &[])
        .build();
    let bytes = DumpBuilder::new(8)
        .utf8(1, "example/Plain")
        .load_class(1, 0x100, 1)
        .heap_dump(&segment)
        .build();

    let hprof = parse_hprof(&bytes).unwrap();
    let index = HeapIndex::from_hprof(&hprof).unwrap();

    assert!(coroutine_classes(&index, true).unwrap().is_empty());
    assert!(coroutine_instances(&index).unwrap().is_empty());

    let forest = build_forest(&index, &[]).unwrap();
    assert_eq!("", render_hierarchy(&index, &forest).unwrap());
}

#[test]
fn internal_classes_can_be_filtered_out() {
    let bytes = base_dump()
        .utf8(0x08, "kotlinx/coroutines/internal/ScopeCoroutine")
        .load_class(5, 0x500, 0x08)
        .heap_dump(
            &base_segment()
                .class_dump(0x500, CLASS_ABSTRACT_COROUTINE, &[])
                .build(),
        )
        .build();

    let hprof = parse_hprof(&bytes).unwrap();
    let index = HeapIndex::from_hprof(&hprof).unwrap();

    let with_internal = coroutine_classes(&index, true).unwrap();
    assert!(with_internal.contains(&Id::from(0x500)));
    assert!(with_internal.contains(&Id::from(CLASS_MY_COROUTINE)));

    let without_internal = coroutine_classes(&index, false).unwrap();
    assert!(!without_internal.contains(&Id::from(0x500)));
    assert!(without_internal.contains(&Id::from(CLASS_MY_COROUTINE)));
}

#[test]
fn state_table_covers_every_class() {
    // string ids / class ids / instance ids for the state classes
    let bytes = base_dump()
        .utf8(0x08, "kotlinx/coroutines/Empty")
        .utf8(0x09, "isActive")
        .utf8(0x0A, "kotlinx/coroutines/JobSupport$Finishing")
        .utf8(0x0B, "_isCompleting$volatile")
        .utf8(0x0C, "kotlinx/coroutines/InactiveNodeList")
        .utf8(0x0D, "kotlinx/coroutines/JobNode")
        .utf8(0x0E, "kotlinx/coroutines/ResumeOnCompletion")
        .utf8(0x0F, "java/lang/Object")
        .load_class(5, 0x500, 0x08)
        .load_class(6, 0x600, 0x0A)
        .load_class(7, 0x700, 0x0C)
        .load_class(8, 0x800, 0x0D)
        .load_class(9, 0x900, 0x0E)
        .load_class(10, 0xA00, 0x0F)
        .heap_dump(
            &base_segment()
                .class_dump(0x500, 0, &[(0x09, TYPE_BOOLEAN)]) // Empty
                .class_dump(0x600, 0, &[(0x0B, TYPE_INT)]) // Finishing
                .class_dump(0x700, 0, &[]) // InactiveNodeList
                .class_dump(0x800, 0, &[]) // JobNode
                .class_dump(0x900, 0x800, &[]) // ResumeOnCompletion extends JobNode
                .class_dump(0xA00, 0, &[]) // java/lang/Object
                // state instances
                .instance(0x1100, 0x500, &[1]) // Empty, active
                .instance(0x1101, 0x500, &[0]) // Empty, inactive
                .instance(0x1102, 0x600, &1_i32.to_be_bytes()) // Finishing, completing
                .instance(0x1103, 0x600, &0_i32.to_be_bytes()) // Finishing, cancelling
                .instance(0x1104, 0x700, &[]) // InactiveNodeList
                .instance(0x1105, 0x900, &[]) // JobNode subclass
                .instance(0x1106, 0xA00, &[]) // plain object
                // one coroutine per state instance
                .instance(0x2000, CLASS_MY_COROUTINE, &coroutine_fields(0x1100, 0))
                .instance(0x2001, CLASS_MY_COROUTINE, &coroutine_fields(0x1101, 0))
                .instance(0x2002, CLASS_MY_COROUTINE, &coroutine_fields(0x1102, 0))
                .instance(0x2003, CLASS_MY_COROUTINE, &coroutine_fields(0x1103, 0))
                .instance(0x2004, CLASS_MY_COROUTINE, &coroutine_fields(0x1104, 0))
                .instance(0x2005, CLASS_MY_COROUTINE, &coroutine_fields(0x1105, 0))
                .instance(0x2006, CLASS_MY_COROUTINE, &coroutine_fields(0x1106, 0))
                .instance(0x2007, CLASS_MY_COROUTINE, &coroutine_fields(STATE_NODE_LIST, 0))
                .build(),
        )
        .build();

    let hprof = parse_hprof(&bytes).unwrap();
    let index = HeapIndex::from_hprof(&hprof).unwrap();

    for (coroutine, expected) in [
        (0x2000_u64, CoroutineState::Active),
        (0x2001, CoroutineState::New),
        (0x2002, CoroutineState::Completing),
        (0x2003, CoroutineState::Cancelling),
        (0x2004, CoroutineState::New),
        (0x2005, CoroutineState::Active),
        (0x2006, CoroutineState::Completed),
        (0x2007, CoroutineState::Active),
    ] {
        assert_eq!(
            expected,
            state(&index, Id::from(coroutine)).unwrap(),
            "coroutine {:#x}",
            coroutine
        );
    }
}

#[test]
fn format_strips_the_package_prefix_only_when_present() {
    let bytes = base_dump()
        .utf8(0x08, "kotlinx/coroutines/StandaloneCoroutine")
        .load_class(5, 0x500, 0x08)
        .heap_dump(
            &base_segment()
                .class_dump(0x500, CLASS_ABSTRACT_COROUTINE, &[])
                .instance(0x2000, 0x500, &coroutine_fields(STATE_NODE_LIST, 0))
                .instance(
                    0x2001,
                    CLASS_MY_COROUTINE,
                    &coroutine_fields(STATE_NODE_LIST, 0),
                )
                .build(),
        )
        .build();

    let hprof = parse_hprof(&bytes).unwrap();
    let index = HeapIndex::from_hprof(&hprof).unwrap();

    assert_eq!(
        "StandaloneCoroutine@2000, state: ACTIVE",
        format_coroutine(&index, Id::from(0x2000)).unwrap()
    );
    assert_eq!(
        "MyCoroutine@2001, state: ACTIVE",
        format_coroutine(&index, Id::from(0x2001)).unwrap()
    );
}

#[test]
fn every_reported_coroutine_extends_abstract_coroutine() {
    let segment = base_segment()
        .instance(0x2000, CLASS_MY_COROUTINE, &coroutine_fields(STATE_NODE_LIST, 0))
        // NodeList instances are on the heap but are not coroutines
        .instance(0x5000, CLASS_NODE_LIST, &[])
        .build();
    let bytes = base_dump().heap_dump(&segment).build();

    let hprof = parse_hprof(&bytes).unwrap();
    let index = HeapIndex::from_hprof(&hprof).unwrap();

    let classes = coroutine_classes(&index, true).unwrap();
    for id in coroutine_instances(&index).unwrap() {
        let class_id = index.instance(id).unwrap().class_obj_id();
        assert!(classes.contains(&class_id));

        let chain: Vec<_> = index
            .superclasses(class_id)
            .map(|c| c.unwrap().obj_id)
            .collect();
        assert!(chain.contains(&Id::from(CLASS_ABSTRACT_COROUTINE)));
    }
}
