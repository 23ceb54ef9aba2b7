//! Reconstructs the kotlinx.coroutines job hierarchy from a dumped heap.
//!
//! Coroutine classes are found by name: every class whose direct superclass
//! is `kotlinx/coroutines/AbstractCoroutine`. Each instance's public state is
//! then inferred from the class of its `_state$volatile` field, and the
//! parent link is followed through the `_parentHandle$volatile` ->
//! `ChildHandleNode.job` chain, the same path the library's own debug
//! machinery walks.

use crate::forest::{Forest, NodeHandle};
use crate::heap_dump::FieldValue;
use crate::index::HeapIndex;
use crate::{HprofError, Id};
use std::collections::{HashMap, HashSet};
use std::fmt;

const ABSTRACT_COROUTINE_CLASS: &str = "kotlinx/coroutines/AbstractCoroutine";
const CHILD_HANDLE_CLASS: &str = "kotlinx/coroutines/ChildHandleNode";
const JOB_NODE_CLASS: &str = "kotlinx/coroutines/JobNode";
const COROUTINES_PACKAGE_PREFIX: &str = "kotlinx/coroutines/";

const STATE_FIELD: &str = "_state$volatile";
const IS_COMPLETING_FIELD: &str = "_isCompleting$volatile";
const PARENT_HANDLE_FIELD: &str = "_parentHandle$volatile";
const IS_ACTIVE_FIELD: &str = "isActive";
const JOB_FIELD: &str = "job";

/// Public job state as kotlinx.coroutines reports it. The display casing
/// matches the incremental-state classes the runtime uses internally.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CoroutineState {
    New,
    Active,
    Completing,
    Cancelling,
    Completed,
}

impl fmt::Display for CoroutineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoroutineState::New => "New",
            CoroutineState::Active => "ACTIVE",
            CoroutineState::Completing => "COMPLETING",
            CoroutineState::Cancelling => "CANCELLING",
            CoroutineState::Completed => "COMPLETED",
        };
        write!(f, "{}", name)
    }
}

/// Class object ids of the coroutine classes: direct subclasses of
/// `AbstractCoroutine`. Returns an empty set when the dump has no
/// kotlinx.coroutines in it at all. `include_internal` keeps classes from
/// the library's `internal` packages in the set.
pub fn coroutine_classes(
    index: &HeapIndex,
    include_internal: bool,
) -> Result<HashSet<Id>, HprofError> {
    let mut abstract_coroutine = None;
    for load_class in index.load_classes() {
        if index.string(load_class.class_name_id())? == ABSTRACT_COROUTINE_CLASS {
            abstract_coroutine = Some(load_class.class_obj_id());
            break;
        }
    }

    let Some(abstract_coroutine) = abstract_coroutine else {
        log::debug!("no {} class in this dump", ABSTRACT_COROUTINE_CLASS);
        return Ok(HashSet::new());
    };

    let mut classes = HashSet::new();
    for class in index.classes() {
        if class.super_class_obj_id == Some(abstract_coroutine) {
            let name = index.class_name(class.obj_id)?;
            if include_internal || !name.contains("internal") {
                classes.insert(class.obj_id);
            }
        }
    }

    Ok(classes)
}

/// Object ids of every coroutine instance, sorted for deterministic output.
pub fn coroutine_instances(index: &HeapIndex) -> Result<Vec<Id>, HprofError> {
    let classes = coroutine_classes(index, true)?;

    let mut ids: Vec<Id> = index
        .instances()
        .filter(|instance| classes.contains(&instance.class_obj_id()))
        .map(|instance| instance.obj_id())
        .collect();
    ids.sort_unstable();

    Ok(ids)
}

/// Infers a coroutine's public state from the class of its incremental-state
/// object:
///
/// ```text
/// state class        public state
/// -----------        ------------
/// InactiveNodeList   New
/// NodeList           ACTIVE
/// Empty              ACTIVE or New, per its isActive flag
/// Finishing          COMPLETING or CANCELLING, per _isCompleting$volatile
/// JobNode subclass   ACTIVE
/// anything else      COMPLETED
/// ```
pub fn state(index: &HeapIndex, coroutine: Id) -> Result<CoroutineState, HprofError> {
    let state_id = match index.field_value(coroutine, STATE_FIELD)? {
        FieldValue::ObjectId(Some(id)) => id,
        _ => return Err(HprofError::UnknownObject(coroutine)),
    };
    let state_instance = index.instance(state_id)?;
    let state_class_name = index.class_name(state_instance.class_obj_id())?;

    match state_class_name {
        "kotlinx/coroutines/InactiveNodeList" => Ok(CoroutineState::New),
        "kotlinx/coroutines/NodeList" => Ok(CoroutineState::Active),
        "kotlinx/coroutines/Empty" => {
            let is_active = matches!(
                index.field_value(state_id, IS_ACTIVE_FIELD)?,
                FieldValue::Boolean(true)
            );
            Ok(if is_active {
                CoroutineState::Active
            } else {
                CoroutineState::New
            })
        }
        "kotlinx/coroutines/JobSupport$Finishing" => {
            let is_completing = matches!(
                index.field_value(state_id, IS_COMPLETING_FIELD)?,
                FieldValue::Int(v) if v != 0
            );
            Ok(if is_completing {
                CoroutineState::Completing
            } else {
                CoroutineState::Cancelling
            })
        }
        _ => {
            // a state object extending JobNode is a single attached
            // completion handler, which only an active job has
            for class in index.superclasses(state_instance.class_obj_id()) {
                if index.class_name(class?.obj_id)? == JOB_NODE_CLASS {
                    return Ok(CoroutineState::Active);
                }
            }
            Ok(CoroutineState::Completed)
        }
    }
}

/// The parent coroutine reached through `_parentHandle$volatile`, or `None`
/// when the handle is missing, is not a `ChildHandleNode`, or its `job` does
/// not resolve to an instance.
pub fn parent(index: &HeapIndex, coroutine: Id) -> Result<Option<Id>, HprofError> {
    let handle_id = match index.field_value(coroutine, PARENT_HANDLE_FIELD)? {
        FieldValue::ObjectId(Some(id)) if index.is_object(id) => id,
        _ => return Ok(None),
    };

    let handle = index.instance(handle_id)?;
    if index.class_name(handle.class_obj_id())? != CHILD_HANDLE_CLASS {
        return Ok(None);
    }

    match index.field_value(handle_id, JOB_FIELD)? {
        FieldValue::ObjectId(Some(id)) if index.is_object(id) => Ok(Some(id)),
        _ => Ok(None),
    }
}

/// Builds the parent/child forest over the given coroutines.
///
/// For each coroutine not yet placed, walks the parent chain upwards until it
/// reaches a parentless coroutine or one already in the forest, then creates
/// the remembered path top-down so every node is created after its parent. A
/// parent chain that revisits an id means the dump is malformed and fails
/// rather than looping.
pub fn build_forest(index: &HeapIndex, coroutines: &[Id]) -> Result<Forest<Id>, HprofError> {
    let mut forest = Forest::new();
    let mut placed: HashMap<Id, NodeHandle> = HashMap::new();

    for &id in coroutines {
        if placed.contains_key(&id) {
            continue;
        }

        let mut path = Vec::new();
        let mut on_path = HashSet::new();
        let mut current = id;
        let mut maybe_parent = parent(index, current)?;

        let anchor = loop {
            match maybe_parent {
                None => {
                    let node = forest.new_root(current);
                    placed.insert(current, node);
                    break node;
                }
                Some(parent_id) => {
                    path.push(current);
                    on_path.insert(current);
                    if on_path.contains(&parent_id) {
                        return Err(HprofError::ParentCycle(parent_id));
                    }
                    current = parent_id;
                    if let Some(&node) = placed.get(&current) {
                        break node;
                    }
                    maybe_parent = parent(index, current)?;
                }
            }
        };

        let mut previous = anchor;
        while let Some(current) = path.pop() {
            let node = forest.new_node(current, previous);
            placed.insert(current, node);
            previous = node;
        }
    }

    Ok(forest)
}

/// One report line: class name without the `kotlinx/coroutines/` prefix, the
/// object id in hex, and the inferred state.
pub fn format_coroutine(index: &HeapIndex, coroutine: Id) -> Result<String, HprofError> {
    let instance = index.instance(coroutine)?;
    let class_name = index.class_name(instance.class_obj_id())?;
    let short_name = class_name
        .strip_prefix(COROUTINES_PACKAGE_PREFIX)
        .unwrap_or(class_name);

    Ok(format!(
        "{}@{:02x}, state: {}",
        short_name,
        coroutine,
        state(index, coroutine)?
    ))
}

/// Renders the forest depth-first, two spaces of indent per level.
pub fn render_hierarchy(index: &HeapIndex, forest: &Forest<Id>) -> Result<String, HprofError> {
    let mut out = String::new();

    for root in forest.roots() {
        let mut to_visit = vec![(0_usize, root)];
        while let Some((depth, node)) = to_visit.pop() {
            out.push_str(&"  ".repeat(depth));
            out.push_str(&format_coroutine(index, *forest.value(node))?);
            out.push('\n');

            // reversed so children pop in insertion order
            for &child in forest.children(node).iter().rev() {
                to_visit.push((depth + 1, child));
            }
        }
    }

    Ok(out)
}
