//! vm.rs — boucle d'interprétation : call frames, closures/upvalues, classes,
//! méthodes liées, fonctions natives, et la boucle de dispatch des opcodes.
//! `OP_MODULUS`, `OP_CONDITIONAL`, `OP_INHERIT`, `OP_GET_SUPER` et
//! `OP_SUPER_INVOKE` sont tous les cinq implémentés avec la sémantique
//! standard, vérifiée par rapport aux dispositions de pile exactes que
//! `lumen-compiler` produit pour chacun.

use lumen_core::{Heap, LClosure, Obj, ObjRef, Op, Table, UpvalueState, Value};

use crate::natives;

const FRAMES_MAX: usize = 64;

struct CallFrame {
    closure: ObjRef,
    ip: usize,
    slot_base: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

impl InterpretResult {
    /// Code de sortie processus — 0/65/70, repris par `lumen-cli`.
    pub fn exit_code(self) -> i32 {
        match self {
            InterpretResult::Ok => 0,
            InterpretResult::CompileError => 65,
            InterpretResult::RuntimeError => 70,
        }
    }
}

pub struct Vm {
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Table,
    open_upvalues: Vec<ObjRef>,
    init_string: ObjRef,
}

impl Vm {
    pub fn new(heap: &mut Heap) -> Self {
        let init_string = heap.intern("init");
        let mut vm = Vm {
            stack: Vec::new(),
            frames: Vec::new(),
            globals: Table::new(),
            open_upvalues: Vec::new(),
            init_string,
        };
        vm.define_native(heap, "clock", natives::clock_native);
        vm.define_native(heap, "deleteField", natives::delete_field_native);
        vm
    }

    fn define_native(&mut self, heap: &mut Heap, name: &str, func: lumen_core::NativeFn) {
        let name_ref = heap.intern(name);
        let native_ref = heap.alloc_native(name_ref, func);
        let hash = heap.as_string_hash(name_ref);
        self.globals.set(name_ref, hash, Value::Obj(native_ref));
    }

    /// Compile puis exécute `source` sur cette VM. Les globales persistent
    /// d'un appel à l'autre (utile pour la REPL de `lumen-cli`).
    pub fn interpret(&mut self, source: &str, heap: &mut Heap) -> InterpretResult {
        let Some(function_ref) = lumen_compiler::compile(source, heap) else {
            return InterpretResult::CompileError;
        };
        let closure_ref = heap.alloc_closure(LClosure { function: function_ref, upvalues: Vec::new() });
        self.collect_if_needed(heap);
        self.push(Value::Obj(closure_ref));
        if !self.call(heap, closure_ref, 0) {
            return InterpretResult::RuntimeError;
        }
        self.run(heap)
    }

    // --- pile -------------------------------------------------------------

    fn push(&mut self, v: Value) {
        self.stack.push(v);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("pop on an empty VM stack")
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    // --- GC -----------------------------------------------------------

    fn mark_roots(&self, heap: &mut Heap, gray: &mut Vec<ObjRef>) {
        for &v in &self.stack {
            heap.mark_value(v, gray);
        }
        for frame in &self.frames {
            heap.mark_object(frame.closure, gray);
        }
        for &u in &self.open_upvalues {
            heap.mark_object(u, gray);
        }
        self.globals.mark(heap, gray);
        heap.mark_object(self.init_string, gray);
    }

    fn collect_if_needed(&self, heap: &mut Heap) {
        if heap.should_collect() {
            heap.collect_garbage(|heap, gray| self.mark_roots(heap, gray));
        }
    }

    // --- appels -------------------------------------------------------

    fn call(&mut self, heap: &mut Heap, closure_ref: ObjRef, arg_count: u8) -> bool {
        let function_ref = heap.as_closure(closure_ref).function;
        let arity = heap.as_function(function_ref).arity;
        if arg_count != arity {
            self.runtime_error(heap, &format!("Expected {arity} arguments but got {arg_count}."));
            return false;
        }
        if self.frames.len() == FRAMES_MAX {
            self.runtime_error(heap, "Stack overflow.");
            return false;
        }
        let slot_base = self.stack.len() - arg_count as usize - 1;
        self.frames.push(CallFrame { closure: closure_ref, ip: 0, slot_base });
        true
    }

    fn call_value(&mut self, heap: &mut Heap, callee: Value, arg_count: u8) -> bool {
        let Value::Obj(r) = callee else {
            self.runtime_error(heap, "Can only call functions and classes.");
            return false;
        };
        match heap.get(r) {
            Obj::BoundMethod(bm) => {
                let bm = *bm;
                let idx = self.stack.len() - arg_count as usize - 1;
                self.stack[idx] = bm.receiver;
                self.call(heap, bm.method, arg_count)
            }
            Obj::Class(_) => {
                let instance_ref = heap.alloc_instance(r);
                self.collect_if_needed(heap);
                let idx = self.stack.len() - arg_count as usize - 1;
                self.stack[idx] = Value::Obj(instance_ref);
                match heap.as_class(r).initializer {
                    Value::Obj(init_ref) => self.call(heap, init_ref, arg_count),
                    _ => {
                        if arg_count != 0 {
                            self.runtime_error(heap, &format!("Expected 0 arguments but got {arg_count}."));
                            return false;
                        }
                        true
                    }
                }
            }
            Obj::Closure(_) => self.call(heap, r, arg_count),
            Obj::Native(n) => {
                let func = n.func;
                let args_start = self.stack.len() - arg_count as usize;
                let args: Vec<Value> = self.stack[args_start..].to_vec();
                match func(&args, heap) {
                    Ok(result) => {
                        self.stack.truncate(args_start - 1);
                        self.push(result);
                        true
                    }
                    Err(msg) => {
                        self.runtime_error(heap, &msg);
                        false
                    }
                }
            }
            _ => {
                self.runtime_error(heap, "Can only call functions and classes.");
                false
            }
        }
    }

    fn invoke_from_class(&mut self, heap: &mut Heap, class_ref: ObjRef, name_ref: ObjRef, arg_count: u8) -> bool {
        let hash = heap.as_string_hash(name_ref);
        match heap.as_class(class_ref).methods.get(name_ref, hash) {
            Some(Value::Obj(method_ref)) => self.call(heap, method_ref, arg_count),
            _ => {
                self.runtime_error(heap, &format!("Undefined property '{}'.", heap.as_string(name_ref)));
                false
            }
        }
    }

    fn invoke(&mut self, heap: &mut Heap, name_ref: ObjRef, arg_count: u8) -> bool {
        let receiver = self.peek(arg_count as usize);
        let Value::Obj(instance_ref) = receiver else {
            self.runtime_error(heap, "Only instances have methods.");
            return false;
        };
        if !matches!(heap.get(instance_ref), Obj::Instance(_)) {
            self.runtime_error(heap, "Only instances have methods.");
            return false;
        }
        let hash = heap.as_string_hash(name_ref);
        if let Some(value) = heap.as_instance(instance_ref).fields.get(name_ref, hash) {
            let idx = self.stack.len() - arg_count as usize - 1;
            self.stack[idx] = value;
            return self.call_value(heap, value, arg_count);
        }
        let class_ref = heap.as_instance(instance_ref).class;
        self.invoke_from_class(heap, class_ref, name_ref, arg_count)
    }

    fn bind_method(&mut self, heap: &mut Heap, class_ref: ObjRef, name_ref: ObjRef) -> bool {
        let hash = heap.as_string_hash(name_ref);
        match heap.as_class(class_ref).methods.get(name_ref, hash) {
            Some(Value::Obj(method_ref)) => {
                let receiver = self.peek(0);
                let bound_ref = heap.alloc_bound_method(receiver, method_ref);
                self.collect_if_needed(heap);
                self.pop();
                self.push(Value::Obj(bound_ref));
                true
            }
            _ => {
                self.runtime_error(heap, &format!("Undefined property '{}'.", heap.as_string(name_ref)));
                false
            }
        }
    }

    fn define_method(&mut self, heap: &mut Heap, name_ref: ObjRef) {
        let method = self.pop();
        let class_ref = self.peek(0).as_obj().expect("OP_METHOD expects a class below the method closure");
        let hash = heap.as_string_hash(name_ref);
        heap.as_class_mut(class_ref).methods.set(name_ref, hash, method);
        if name_ref == self.init_string {
            heap.as_class_mut(class_ref).initializer = method;
        }
    }

    // --- upvalues -------------------------------------------------------

    /// Recherche linéaire dans une liste non triée plutôt que la liste
    /// chaînée triée par adresse décroissante de l'original — le tri
    /// n'existe que pour rendre `closeUpvalues` un simple préfixe ; ici on
    /// filtre `open_upvalues` directement, donc l'ordre n'a pas d'importance.
    fn capture_upvalue(&mut self, heap: &mut Heap, stack_index: usize) -> ObjRef {
        for &existing in &self.open_upvalues {
            if let UpvalueState::Open(idx) = heap.as_upvalue(existing).state {
                if idx == stack_index {
                    return existing;
                }
            }
        }
        let upvalue_ref = heap.alloc_open_upvalue(stack_index);
        self.collect_if_needed(heap);
        self.open_upvalues.push(upvalue_ref);
        upvalue_ref
    }

    fn close_upvalues(&mut self, heap: &mut Heap, from_index: usize) {
        let stack = &self.stack;
        self.open_upvalues.retain(|&r| match heap.as_upvalue(r).state {
            UpvalueState::Open(idx) if idx >= from_index => {
                let value = stack[idx];
                heap.as_upvalue_mut(r).state = UpvalueState::Closed(value);
                false
            }
            _ => true,
        });
    }

    // --- erreurs ----------------------------------------------------------

    fn runtime_error(&mut self, heap: &Heap, message: &str) {
        eprintln!("{message}");
        for frame in self.frames.iter().rev() {
            let function_ref = heap.as_closure(frame.closure).function;
            let function = heap.as_function(function_ref);
            let line = function.chunk.line_at(frame.ip.saturating_sub(1));
            match function.name {
                Some(n) => eprintln!("[line {line}] in {}()", heap.as_string(n)),
                None => eprintln!("[line {line}] in script"),
            }
        }
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    fn concatenate(&mut self, heap: &mut Heap) {
        let b = self.pop();
        let a = self.pop();
        let a_text = heap.as_string(a.as_obj().expect("operand checked as string")).to_string();
        let b_text = heap.as_string(b.as_obj().expect("operand checked as string")).to_string();
        let result_ref = heap.intern(&format!("{a_text}{b_text}"));
        self.collect_if_needed(heap);
        self.push(Value::Obj(result_ref));
    }

    fn binary_number_op(&mut self, heap: &mut Heap, op: impl Fn(f64, f64) -> Value) -> bool {
        let (Some(b), Some(a)) = (self.peek(0).as_number(), self.peek(1).as_number()) else {
            self.runtime_error(heap, "Operands must be numbers.");
            return false;
        };
        self.pop();
        self.pop();
        self.push(op(a, b));
        true
    }

    // --- lecture du chunk courant -----------------------------------------

    fn current_function(&self, heap: &Heap) -> ObjRef {
        let frame = self.frames.last().expect("run() called with no active frame");
        heap.as_closure(frame.closure).function
    }

    fn constant_value(&self, heap: &Heap, idx: usize) -> Value {
        let function_ref = self.current_function(heap);
        heap.as_function(function_ref).chunk.constants()[idx]
    }

    fn constant_obj(&self, heap: &Heap, idx: usize) -> ObjRef {
        self.constant_value(heap, idx).as_obj().expect("constant slot expected to hold an object")
    }

    #[cfg(feature = "trace-execution")]
    fn trace(&self, heap: &Heap, op: &Op) {
        let parts: Vec<String> = self.stack.iter().map(|v| format!("[ {} ]", v.display(heap))).collect();
        tracing::trace!("{}", parts.join(""));
        let frame = self.frames.last().unwrap();
        let function_ref = heap.as_closure(frame.closure).function;
        let function = heap.as_function(function_ref);
        tracing::trace!("{}", lumen_core::disasm::disassemble_instruction(&function.chunk, heap, frame.ip, op));
    }

    // --- boucle d'interprétation -------------------------------------------

    fn run(&mut self, heap: &mut Heap) -> InterpretResult {
        loop {
            let op = {
                let frame = self.frames.last().expect("run() called with no active frame");
                let function_ref = heap.as_closure(frame.closure).function;
                heap.as_function(function_ref).chunk.ops()[frame.ip].clone()
            };

            #[cfg(feature = "trace-execution")]
            self.trace(heap, &op);

            self.frames.last_mut().unwrap().ip += 1;

            match op {
                Op::Constant(idx) => {
                    let v = self.constant_value(heap, idx as usize);
                    self.push(v);
                }
                Op::ConstantLong(idx) => {
                    let v = self.constant_value(heap, idx as usize);
                    self.push(v);
                }
                Op::Nil => self.push(Value::Nil),
                Op::True => self.push(Value::Bool(true)),
                Op::False => self.push(Value::Bool(false)),
                Op::Pop => {
                    self.pop();
                }
                Op::Dup => {
                    let v = self.peek(0);
                    self.push(v);
                }
                Op::GetLocal(slot) => {
                    let idx = self.frames.last().unwrap().slot_base + slot as usize;
                    self.push(self.stack[idx]);
                }
                Op::SetLocal(slot) => {
                    let idx = self.frames.last().unwrap().slot_base + slot as usize;
                    self.stack[idx] = self.peek(0);
                }
                Op::GetGlobal(idx) => {
                    let name_ref = self.constant_obj(heap, idx as usize);
                    let hash = heap.as_string_hash(name_ref);
                    match self.globals.get(name_ref, hash) {
                        Some(v) => self.push(v),
                        None => {
                            self.runtime_error(heap, &format!("Undefined variable '{}'.", heap.as_string(name_ref)));
                            return InterpretResult::RuntimeError;
                        }
                    }
                }
                Op::DefineGlobal(idx) => {
                    let name_ref = self.constant_obj(heap, idx as usize);
                    let hash = heap.as_string_hash(name_ref);
                    let v = self.pop();
                    self.globals.set(name_ref, hash, v);
                }
                Op::SetGlobal(idx) => {
                    let name_ref = self.constant_obj(heap, idx as usize);
                    let hash = heap.as_string_hash(name_ref);
                    let v = self.peek(0);
                    if self.globals.set(name_ref, hash, v) {
                        self.globals.delete(name_ref, hash);
                        self.runtime_error(heap, &format!("Undefined variable '{}'.", heap.as_string(name_ref)));
                        return InterpretResult::RuntimeError;
                    }
                }
                Op::GetUpvalue(slot) => {
                    let closure_ref = self.frames.last().unwrap().closure;
                    let upvalue_ref = heap.as_closure(closure_ref).upvalues[slot as usize];
                    let v = match heap.as_upvalue(upvalue_ref).state {
                        UpvalueState::Open(idx) => self.stack[idx],
                        UpvalueState::Closed(v) => v,
                    };
                    self.push(v);
                }
                Op::SetUpvalue(slot) => {
                    let closure_ref = self.frames.last().unwrap().closure;
                    let upvalue_ref = heap.as_closure(closure_ref).upvalues[slot as usize];
                    let v = self.peek(0);
                    match heap.as_upvalue(upvalue_ref).state {
                        UpvalueState::Open(idx) => self.stack[idx] = v,
                        UpvalueState::Closed(_) => heap.as_upvalue_mut(upvalue_ref).state = UpvalueState::Closed(v),
                    }
                }
                Op::GetProperty(idx) => {
                    let name_ref = self.constant_obj(heap, idx as usize);
                    let receiver = self.peek(0);
                    let Value::Obj(instance_ref) = receiver else {
                        self.runtime_error(heap, "Only instances have properties.");
                        return InterpretResult::RuntimeError;
                    };
                    if !matches!(heap.get(instance_ref), Obj::Instance(_)) {
                        self.runtime_error(heap, "Only instances have properties.");
                        return InterpretResult::RuntimeError;
                    }
                    let hash = heap.as_string_hash(name_ref);
                    if let Some(v) = heap.as_instance(instance_ref).fields.get(name_ref, hash) {
                        self.pop();
                        self.push(v);
                    } else {
                        let class_ref = heap.as_instance(instance_ref).class;
                        if !self.bind_method(heap, class_ref, name_ref) {
                            return InterpretResult::RuntimeError;
                        }
                    }
                }
                Op::SetProperty(idx) => {
                    let name_ref = self.constant_obj(heap, idx as usize);
                    let receiver = self.peek(1);
                    let Value::Obj(instance_ref) = receiver else {
                        self.runtime_error(heap, "Only instances have fields.");
                        return InterpretResult::RuntimeError;
                    };
                    if !matches!(heap.get(instance_ref), Obj::Instance(_)) {
                        self.runtime_error(heap, "Only instances have fields.");
                        return InterpretResult::RuntimeError;
                    }
                    let hash = heap.as_string_hash(name_ref);
                    let value = self.peek(0);
                    heap.as_instance_mut(instance_ref).fields.set(name_ref, hash, value);
                    self.pop();
                    self.pop();
                    self.push(value);
                }
                // Même logique que la liaison de méthode ordinaire, appliquée
                // à la superclasse désignée au lieu de `instance.class`.
                Op::GetSuper(idx) => {
                    let name_ref = self.constant_obj(heap, idx as usize);
                    let superclass = self.pop();
                    let Value::Obj(super_ref) = superclass else {
                        unreachable!("compiler always pushes a class value before OP_GET_SUPER")
                    };
                    if !self.bind_method(heap, super_ref, name_ref) {
                        return InterpretResult::RuntimeError;
                    }
                }
                Op::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a.equals(&b)));
                }
                Op::Greater => {
                    if !self.binary_number_op(heap, |a, b| Value::Bool(a > b)) {
                        return InterpretResult::RuntimeError;
                    }
                }
                Op::Less => {
                    if !self.binary_number_op(heap, |a, b| Value::Bool(a < b)) {
                        return InterpretResult::RuntimeError;
                    }
                }
                Op::Add => {
                    let b = self.peek(0);
                    let a = self.peek(1);
                    if a.is_string(heap) && b.is_string(heap) {
                        self.concatenate(heap);
                    } else if let (Some(an), Some(bn)) = (a.as_number(), b.as_number()) {
                        self.pop();
                        self.pop();
                        self.push(Value::Number(an + bn));
                    } else {
                        self.runtime_error(heap, "Operands must be two numbers or two strings.");
                        return InterpretResult::RuntimeError;
                    }
                }
                Op::Subtract => {
                    if !self.binary_number_op(heap, |a, b| Value::Number(a - b)) {
                        return InterpretResult::RuntimeError;
                    }
                }
                Op::Multiply => {
                    if !self.binary_number_op(heap, |a, b| Value::Number(a * b)) {
                        return InterpretResult::RuntimeError;
                    }
                }
                Op::Divide => {
                    let (Some(b), Some(a)) = (self.peek(0).as_number(), self.peek(1).as_number()) else {
                        self.runtime_error(heap, "Operands must be numbers.");
                        return InterpretResult::RuntimeError;
                    };
                    if b == 0.0 {
                        self.runtime_error(heap, "Division by zero.");
                        return InterpretResult::RuntimeError;
                    }
                    self.pop();
                    self.pop();
                    self.push(Value::Number(a / b));
                }
                // Opérandes entiers requis ; `%` tronque déjà vers zéro comme `fmod`.
                Op::Modulus => {
                    let (Some(b), Some(a)) = (self.peek(0).as_number(), self.peek(1).as_number()) else {
                        self.runtime_error(heap, "Operands must be numbers.");
                        return InterpretResult::RuntimeError;
                    };
                    if a.fract() != 0.0 || b.fract() != 0.0 {
                        self.runtime_error(heap, "Modulo requires integer operands.");
                        return InterpretResult::RuntimeError;
                    }
                    if b == 0.0 {
                        self.runtime_error(heap, "Modulo by zero.");
                        return InterpretResult::RuntimeError;
                    }
                    self.pop();
                    self.pop();
                    self.push(Value::Number(a % b));
                }
                Op::Not => {
                    let v = self.pop();
                    self.push(Value::Bool(v.is_falsey()));
                }
                Op::Negate => {
                    let Some(n) = self.peek(0).as_number() else {
                        self.runtime_error(heap, "Operand must be a number.");
                        return InterpretResult::RuntimeError;
                    };
                    self.pop();
                    self.push(Value::Number(-n));
                }
                Op::Print => {
                    let v = self.pop();
                    println!("{}", v.display(heap));
                }
                Op::Jump(offset) => {
                    self.frames.last_mut().unwrap().ip += offset as usize;
                }
                Op::JumpIfFalse(offset) => {
                    if self.peek(0).is_falsey() {
                        self.frames.last_mut().unwrap().ip += offset as usize;
                    }
                }
                Op::Loop(offset) => {
                    self.frames.last_mut().unwrap().ip -= offset as usize;
                }
                Op::Call(argc) => {
                    let callee = self.peek(argc as usize);
                    if !self.call_value(heap, callee, argc) {
                        return InterpretResult::RuntimeError;
                    }
                }
                Op::Invoke(name_idx, argc) => {
                    let name_ref = self.constant_obj(heap, name_idx as usize);
                    if !self.invoke(heap, name_ref, argc) {
                        return InterpretResult::RuntimeError;
                    }
                }
                // Même logique que l'invocation ordinaire, superclasse
                // explicite au lieu de `instance.class`.
                Op::SuperInvoke(name_idx, argc) => {
                    let name_ref = self.constant_obj(heap, name_idx as usize);
                    let superclass = self.pop();
                    let Value::Obj(super_ref) = superclass else {
                        unreachable!("compiler always pushes a class value before OP_SUPER_INVOKE")
                    };
                    if !self.invoke_from_class(heap, super_ref, name_ref, argc) {
                        return InterpretResult::RuntimeError;
                    }
                }
                Op::Closure(fn_idx, captures) => {
                    let function_ref = self.constant_value(heap, fn_idx as usize).as_obj().expect("OP_CLOSURE constant is a function");
                    let frame_closure = self.frames.last().unwrap().closure;
                    let frame_base = self.frames.last().unwrap().slot_base;
                    let mut upvalues = Vec::with_capacity(captures.len());
                    for cap in &captures {
                        if cap.is_local {
                            let upvalue_ref = self.capture_upvalue(heap, frame_base + cap.index as usize);
                            upvalues.push(upvalue_ref);
                        } else {
                            upvalues.push(heap.as_closure(frame_closure).upvalues[cap.index as usize]);
                        }
                    }
                    let closure_ref = heap.alloc_closure(LClosure { function: function_ref, upvalues });
                    self.collect_if_needed(heap);
                    self.push(Value::Obj(closure_ref));
                }
                Op::CloseUpvalue => {
                    let top = self.stack.len() - 1;
                    self.close_upvalues(heap, top);
                    self.pop();
                }
                Op::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("OP_RETURN with no active frame");
                    self.close_upvalues(heap, frame.slot_base);
                    if self.frames.is_empty() {
                        self.pop();
                        return InterpretResult::Ok;
                    }
                    self.stack.truncate(frame.slot_base);
                    self.push(result);
                }
                Op::Class(idx) => {
                    let name_ref = self.constant_obj(heap, idx as usize);
                    let class_ref = heap.alloc_class(name_ref);
                    self.collect_if_needed(heap);
                    self.push(Value::Obj(class_ref));
                }
                // [superclass, subclass] sur la pile ; copie des méthodes de
                // la superclasse dans la table de la sous-classe.
                Op::Inherit => {
                    let superclass = self.peek(1);
                    let Value::Obj(super_ref) = superclass else {
                        self.runtime_error(heap, "Superclass must be a class.");
                        return InterpretResult::RuntimeError;
                    };
                    if !matches!(heap.get(super_ref), Obj::Class(_)) {
                        self.runtime_error(heap, "Superclass must be a class.");
                        return InterpretResult::RuntimeError;
                    }
                    let Value::Obj(sub_ref) = self.peek(0) else {
                        unreachable!("compiler always pushes the subclass before OP_INHERIT")
                    };
                    let inherited = heap.as_class(super_ref).methods.clone();
                    inherited.add_all_into(&mut heap.as_class_mut(sub_ref).methods);
                    self.pop();
                }
                Op::Method(idx) => {
                    let name_ref = self.constant_obj(heap, idx as usize);
                    self.define_method(heap, name_ref);
                }
                // [condition, then_value, else_value] -> une seule valeur,
                // sans court-circuit (les deux branches ont déjà été
                // évaluées par le compilateur au moment où cet opcode court).
                Op::Conditional => {
                    let else_value = self.pop();
                    let then_value = self.pop();
                    let condition = self.pop();
                    self.push(if condition.is_falsey() { else_value } else { then_value });
                }
            }
        }
    }
}
