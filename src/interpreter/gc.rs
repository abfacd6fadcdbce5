use super::types::{FunctionKind, InternalData, ObjectData, Reference, ScopeRef};
use super::Interpreter;
use crate::types::{ObjectHandle, Value};
use std::cell::RefCell;
use std::rc::Rc;

pub(crate) const GC_THRESHOLD: usize = 4096;

fn mark_value(value: &Value, worklist: &mut Vec<u64>) {
    if let Value::Object(handle) = value {
        worklist.push(handle.id);
    }
}

fn mark_scope(scope: &ScopeRef, worklist: &mut Vec<u64>) {
    let mut cursor = Some(scope.clone());
    while let Some(s) = cursor {
        worklist.push(s.object.id);
        cursor = s.parent.clone();
    }
}

impl Interpreter {
    pub(crate) fn allocate_object(&mut self, data: ObjectData) -> ObjectHandle {
        self.gc_alloc_count += 1;
        let cell = Rc::new(RefCell::new(data));
        let id = if let Some(index) = self.free_list.pop() {
            self.objects[index] = Some(cell);
            index as u64
        } else {
            let index = self.objects.len();
            self.objects.push(Some(cell));
            index as u64
        };
        ObjectHandle { id }
    }

    /// Mark-and-sweep over the slot table, run between steps where every
    /// live value is rooted in a frame, a scope, or a bootstrap field.
    pub(crate) fn maybe_gc(&mut self) {
        if self.gc_alloc_count < GC_THRESHOLD {
            return;
        }
        self.gc_alloc_count = 0;

        let mut marks = vec![false; self.objects.len()];
        let mut worklist: Vec<u64> = Vec::new();

        mark_scope(&self.global_scope, &mut worklist);
        mark_value(&self.global_object, &mut worklist);
        mark_value(&self.value, &mut worklist);
        for handle in [
            self.object_proto,
            self.function_proto,
            self.array_proto,
            self.string_proto,
            self.boolean_proto,
            self.number_proto,
            self.date_proto,
            self.regexp_proto,
        ] {
            worklist.push(handle.id);
        }
        for handle in self.error_protos.values() {
            worklist.push(handle.id);
        }
        for handle in &self.to_string_visits {
            worklist.push(handle.id);
        }
        if let Some(slot) = &self.pending_async {
            if let Some(value) = slot.borrow().as_ref() {
                mark_value(value, &mut worklist);
            }
        }
        for state in &self.state_stack {
            mark_scope(&state.scope, &mut worklist);
            mark_value(&state.this_value, &mut worklist);
            mark_value(&state.value, &mut worklist);
            mark_value(&state.left_value, &mut worklist);
            mark_value(&state.func_this, &mut worklist);
            mark_value(&state.switch_value, &mut worklist);
            if let Some(func) = &state.func {
                mark_value(func, &mut worklist);
            }
            if let Some(Reference::Member(base, _)) = &state.ref_value {
                mark_value(base, &mut worklist);
            }
            for value in &state.arguments {
                mark_value(value, &mut worklist);
            }
            for value in state.elements.iter().flatten() {
                mark_value(value, &mut worklist);
            }
            if let Some(obj) = &state.iter_object {
                mark_value(obj, &mut worklist);
            }
            if let Some(cv) = &state.cv {
                mark_value(&cv.value, &mut worklist);
            }
        }

        while let Some(id) = worklist.pop() {
            let index = id as usize;
            match marks.get(index) {
                Some(false) => marks[index] = true,
                _ => continue,
            }
            let Some(slot) = self.objects.get(index).and_then(|s| s.clone()) else {
                continue;
            };
            let od = slot.borrow();
            if let Some(proto) = od.proto {
                worklist.push(proto.id);
            }
            for value in od.properties.values() {
                mark_value(value, &mut worklist);
            }
            for handle in od.getters.values().chain(od.setters.values()) {
                worklist.push(handle.id);
            }
            if let Some(InternalData::Boxed(value)) = &od.data {
                mark_value(value, &mut worklist);
            }
            if let Some(func) = &od.func {
                if let Some(this) = &func.bound_this {
                    mark_value(this, &mut worklist);
                }
                for value in &func.bound_args {
                    mark_value(value, &mut worklist);
                }
                match &func.kind {
                    FunctionKind::Guest { scope, .. } => mark_scope(scope, &mut worklist),
                    FunctionKind::Bound { target } => worklist.push(target.id),
                    _ => {}
                }
            }
        }

        for (index, slot) in self.objects.iter_mut().enumerate() {
            if slot.is_some() && !marks[index] {
                *slot = None;
                self.free_list.push(index);
            }
        }
    }
}
