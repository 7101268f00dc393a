//! heap.rs — l'arène d'objets et le ramasse-miettes à marquage-balayage.
//!
//! Les objets vivent dans `Heap.slots`, indexés par `ObjRef`. Ni le
//! compilateur ni la VM ne possèdent le `Heap` : il leur est passé en
//! `&mut Heap` explicite, ce qui évite le problème classique en Rust d'un
//! type qui aurait besoin à la fois d'un `&self` (pour ses racines) et d'un
//! `&mut Heap` au même moment.
//!
//! Déclenchement du GC : seuil incrémental (`bytes_allocated > next_gc`,
//! puis `next_gc = bytes_allocated * 2` après collecte), pas un cycle
//! générationnel.

use crate::object::{
    LBoundMethod, LClass, LClosure, LFunction, LInstance, LNative, LString, LUpvalue, NativeFn,
    Obj, ObjRef, UpvalueState,
};
use crate::table::Table;
use crate::value::Value;

const INITIAL_NEXT_GC: usize = 1024 * 1024;
const GC_HEAP_GROW_FACTOR: usize = 2;

struct Slot {
    marked: bool,
    obj: Obj,
}

pub struct Heap {
    slots: Vec<Option<Slot>>,
    free: Vec<u32>,
    pub strings: Table,
    pub bytes_allocated: usize,
    pub next_gc: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            strings: Table::new(),
            bytes_allocated: 0,
            next_gc: INITIAL_NEXT_GC,
        }
    }

    pub fn should_collect(&self) -> bool {
        if cfg!(feature = "gc-stress") {
            return true;
        }
        self.bytes_allocated > self.next_gc
    }

    fn insert(&mut self, obj: Obj) -> ObjRef {
        self.bytes_allocated += approx_size(&obj);
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(Slot { marked: false, obj });
            idx
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Some(Slot { marked: false, obj }));
            idx
        }
    }

    fn slot(&self, r: ObjRef) -> &Slot {
        self.slots[r as usize].as_ref().expect("dangling ObjRef")
    }

    fn slot_mut(&mut self, r: ObjRef) -> &mut Slot {
        self.slots[r as usize].as_mut().expect("dangling ObjRef")
    }

    pub fn get(&self, r: ObjRef) -> &Obj {
        &self.slot(r).obj
    }

    pub fn get_mut(&mut self, r: ObjRef) -> &mut Obj {
        &mut self.slot_mut(r).obj
    }

    // --- accesseurs typés -------------------------------------------------

    pub fn as_string(&self, r: ObjRef) -> &str {
        match self.get(r) {
            Obj::String(s) => &s.chars,
            other => unreachable!("expected string, found {}", other.kind_name()),
        }
    }

    pub fn as_string_hash(&self, r: ObjRef) -> u32 {
        match self.get(r) {
            Obj::String(s) => s.hash,
            other => unreachable!("expected string, found {}", other.kind_name()),
        }
    }

    pub fn as_function(&self, r: ObjRef) -> &LFunction {
        match self.get(r) {
            Obj::Function(f) => f,
            other => unreachable!("expected function, found {}", other.kind_name()),
        }
    }

    pub fn as_function_mut(&mut self, r: ObjRef) -> &mut LFunction {
        match self.get_mut(r) {
            Obj::Function(f) => f,
            _ => unreachable!("expected function"),
        }
    }

    pub fn as_closure(&self, r: ObjRef) -> &LClosure {
        match self.get(r) {
            Obj::Closure(c) => c,
            other => unreachable!("expected closure, found {}", other.kind_name()),
        }
    }

    pub fn as_upvalue(&self, r: ObjRef) -> &LUpvalue {
        match self.get(r) {
            Obj::Upvalue(u) => u,
            other => unreachable!("expected upvalue, found {}", other.kind_name()),
        }
    }

    pub fn as_upvalue_mut(&mut self, r: ObjRef) -> &mut LUpvalue {
        match self.get_mut(r) {
            Obj::Upvalue(u) => u,
            _ => unreachable!("expected upvalue"),
        }
    }

    pub fn as_native(&self, r: ObjRef) -> &LNative {
        match self.get(r) {
            Obj::Native(n) => n,
            other => unreachable!("expected native fn, found {}", other.kind_name()),
        }
    }

    pub fn as_class(&self, r: ObjRef) -> &LClass {
        match self.get(r) {
            Obj::Class(c) => c,
            other => unreachable!("expected class, found {}", other.kind_name()),
        }
    }

    pub fn as_class_mut(&mut self, r: ObjRef) -> &mut LClass {
        match self.get_mut(r) {
            Obj::Class(c) => c,
            _ => unreachable!("expected class"),
        }
    }

    pub fn as_instance(&self, r: ObjRef) -> &LInstance {
        match self.get(r) {
            Obj::Instance(i) => i,
            other => unreachable!("expected instance, found {}", other.kind_name()),
        }
    }

    pub fn as_instance_mut(&mut self, r: ObjRef) -> &mut LInstance {
        match self.get_mut(r) {
            Obj::Instance(i) => i,
            _ => unreachable!("expected instance"),
        }
    }

    pub fn as_bound_method(&self, r: ObjRef) -> &LBoundMethod {
        match self.get(r) {
            Obj::BoundMethod(b) => b,
            other => unreachable!("expected bound method, found {}", other.kind_name()),
        }
    }

    // --- allocation ---------------------------------------------------

    /// Interne une chaîne par contenu : renvoie l'`ObjRef` existante si une
    /// chaîne identique est déjà internée, sinon en alloue une nouvelle et
    /// l'ajoute à la table d'internement.
    pub fn intern(&mut self, text: &str) -> ObjRef {
        let hash = fnv1a_hash(text.as_bytes());
        if let Some(existing) = self.strings.find_string(self, text, hash) {
            return existing;
        }
        let r = self.insert(Obj::String(LString { chars: text.to_string(), hash }));
        self.strings.set(r, hash, Value::Nil);
        r
    }

    pub fn alloc_function(&mut self, f: LFunction) -> ObjRef {
        self.insert(Obj::Function(f))
    }

    pub fn alloc_closure(&mut self, c: LClosure) -> ObjRef {
        self.insert(Obj::Closure(c))
    }

    pub fn alloc_open_upvalue(&mut self, stack_index: usize) -> ObjRef {
        self.insert(Obj::Upvalue(LUpvalue { state: UpvalueState::Open(stack_index) }))
    }

    pub fn alloc_native(&mut self, name: ObjRef, func: NativeFn) -> ObjRef {
        self.insert(Obj::Native(LNative { name, func }))
    }

    pub fn alloc_class(&mut self, name: ObjRef) -> ObjRef {
        self.insert(Obj::Class(LClass::new(name)))
    }

    pub fn alloc_instance(&mut self, class: ObjRef) -> ObjRef {
        self.insert(Obj::Instance(LInstance::new(class)))
    }

    pub fn alloc_bound_method(&mut self, receiver: Value, method: ObjRef) -> ObjRef {
        self.insert(Obj::BoundMethod(LBoundMethod { receiver, method }))
    }

    // --- GC -------------------------------------------------------------

    fn is_marked(&self, r: ObjRef) -> bool {
        self.slot(r).marked
    }

    pub fn mark_object(&mut self, r: ObjRef, gray: &mut Vec<ObjRef>) {
        if self.is_marked(r) {
            return;
        }
        self.slot_mut(r).marked = true;
        #[cfg(feature = "gc-log")]
        tracing::trace!(obj = r, kind = self.get(r).kind_name(), "mark");
        gray.push(r);
    }

    pub fn mark_value(&mut self, v: Value, gray: &mut Vec<ObjRef>) {
        if let Value::Obj(r) = v {
            self.mark_object(r, gray);
        }
    }

    /// Lance un cycle complet : marquage des racines (fourni par
    /// l'appelant, qui connaît la VM/le compilateur), propagation,
    /// retrait des chaînes mortes de la table d'internement, puis balayage.
    pub fn collect_garbage(&mut self, mark_roots: impl FnOnce(&mut Self, &mut Vec<ObjRef>)) {
        #[cfg(feature = "gc-log")]
        let before = self.bytes_allocated;
        #[cfg(feature = "gc-log")]
        tracing::trace!("-- gc begin");

        let mut gray = Vec::new();
        mark_roots(self, &mut gray);
        self.trace_references(&mut gray);
        self.remove_white_strings();
        self.sweep();
        self.next_gc = (self.bytes_allocated * GC_HEAP_GROW_FACTOR).max(INITIAL_NEXT_GC);

        #[cfg(feature = "gc-log")]
        tracing::trace!(before, after = self.bytes_allocated, next_gc = self.next_gc, "-- gc end");
    }

    fn trace_references(&mut self, gray: &mut Vec<ObjRef>) {
        while let Some(r) = gray.pop() {
            self.blacken_object(r, gray);
        }
    }

    fn blacken_object(&mut self, r: ObjRef, gray: &mut Vec<ObjRef>) {
        enum Extracted {
            Values(Vec<Value>),
            ValuesAndTable(Vec<Value>, Table),
        }

        let extracted = match self.get(r) {
            Obj::String(_) | Obj::Native(_) => None,
            Obj::Function(f) => {
                let mut vs: Vec<Value> = f.name.map(Value::Obj).into_iter().collect();
                vs.extend(f.chunk.constants().iter().copied());
                Some(Extracted::Values(vs))
            }
            Obj::Closure(c) => {
                let mut vs = vec![Value::Obj(c.function)];
                vs.extend(c.upvalues.iter().map(|u| Value::Obj(*u)));
                Some(Extracted::Values(vs))
            }
            Obj::Upvalue(u) => match u.state {
                UpvalueState::Closed(v) => Some(Extracted::Values(vec![v])),
                UpvalueState::Open(_) => None,
            },
            Obj::Class(cl) => {
                Some(Extracted::ValuesAndTable(vec![Value::Obj(cl.name), cl.initializer], cl.methods.clone()))
            }
            Obj::Instance(inst) => {
                Some(Extracted::ValuesAndTable(vec![Value::Obj(inst.class)], inst.fields.clone()))
            }
            Obj::BoundMethod(bm) => Some(Extracted::Values(vec![bm.receiver, Value::Obj(bm.method)])),
        };

        match extracted {
            None => {}
            Some(Extracted::Values(vs)) => {
                for v in vs {
                    self.mark_value(v, gray);
                }
            }
            Some(Extracted::ValuesAndTable(vs, t)) => {
                for v in vs {
                    self.mark_value(v, gray);
                }
                t.mark(self, gray);
            }
        }
    }

    fn remove_white_strings(&mut self) {
        let slots = &self.slots;
        self.strings.remove_white(|r| slots[r as usize].as_ref().is_some_and(|s| s.marked));
    }

    fn sweep(&mut self) {
        for (idx, slot_opt) in self.slots.iter_mut().enumerate() {
            let Some(slot) = slot_opt else { continue };
            if slot.marked {
                slot.marked = false;
            } else {
                let freed = approx_size(&slot.obj);
                self.bytes_allocated = self.bytes_allocated.saturating_sub(freed);
                *slot_opt = None;
                self.free.push(idx as u32);
            }
        }
    }
}

/// Estimation grossière, utilisée uniquement pour piloter le seuil
/// d'incrément du GC — pas une taille exacte.
fn approx_size(obj: &Obj) -> usize {
    match obj {
        Obj::String(s) => std::mem::size_of::<LString>() + s.chars.len(),
        Obj::Function(f) => std::mem::size_of::<LFunction>() + f.chunk.approx_size(),
        Obj::Closure(c) => std::mem::size_of::<LClosure>() + c.upvalues.len() * 4,
        Obj::Upvalue(_) => std::mem::size_of::<LUpvalue>(),
        Obj::Native(_) => std::mem::size_of::<LNative>(),
        Obj::Class(c) => std::mem::size_of::<LClass>() + c.methods.len() * 24,
        Obj::Instance(i) => std::mem::size_of::<LInstance>() + i.fields.len() * 24,
        Obj::BoundMethod(_) => std::mem::size_of::<LBoundMethod>(),
    }
}

/// FNV-1a 32 bits, comme le fait l'implémentation originale pour hacher les
/// clés de chaîne avant internement.
pub fn fnv1a_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_dedups_identical_content() {
        let mut heap = Heap::new();
        let a = heap.intern("hello");
        let b = heap.intern("hello");
        assert_eq!(a, b);
        let c = heap.intern("world");
        assert_ne!(a, c);
    }

    #[test]
    fn unreferenced_objects_are_swept() {
        let mut heap = Heap::new();
        let dead = heap.intern("transient");
        let _ = dead;
        heap.collect_garbage(|_heap, _gray| {});
        // rien n'a marqué `dead` comme racine : la table d'internement elle-même
        // n'est pas une racine, donc l'entrée doit disparaître.
        assert!(heap.strings.find_string(&heap, "transient", fnv1a_hash(b"transient")).is_none());
    }

    #[test]
    fn marked_roots_survive_collection() {
        let mut heap = Heap::new();
        let kept = heap.intern("kept");
        heap.collect_garbage(|heap, gray| heap.mark_object(kept, gray));
        assert_eq!(heap.as_string(kept), "kept");
    }
}
