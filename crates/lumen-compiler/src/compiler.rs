//! compiler.rs — compilateur Pratt en une passe : lit les jetons du
//! `Scanner` et émet directement dans le `Chunk` de la fonction en cours,
//! sans AST intermédiaire.
//!
//! Chaque fonction imbriquée (script top-level compris) a son propre
//! [`FunctionScope`] empilé dans `Compiler::functions` plutôt qu'une chaîne
//! récursive de compilateurs liés par pointeur : ça donne un accès facile
//! à toute la pile pour le marquage de racines GC (`mark_roots`).

use ahash::AHashMap;

use lumen_core::{Heap, LFunction, ObjRef, Op, UpvalueCapture, Value};

use crate::scanner::Scanner;
use crate::token::{Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment,
    Conditional,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        use Precedence::{And, Assignment, Call, Comparison, Conditional, Equality, Factor, None, Or, Primary, Term, Unary};
        match self {
            None => Assignment,
            Assignment => Conditional,
            Conditional => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call | Primary => Primary,
        }
    }

    fn of(kind: &TokenKind) -> Precedence {
        use TokenKind as T;
        match kind {
            T::LeftParen | T::Dot => Precedence::Call,
            T::Minus | T::Plus | T::Percent => Precedence::Term,
            T::Slash | T::Star => Precedence::Factor,
            T::BangEqual | T::EqualEqual => Precedence::Equality,
            T::Greater | T::GreaterEqual | T::Less | T::LessEqual => Precedence::Comparison,
            T::And => Precedence::And,
            T::Or => Precedence::Or,
            T::Question => Precedence::Conditional,
            _ => Precedence::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionType {
    Script,
    Function,
    Method,
    Initializer,
}

struct Local {
    name: String,
    depth: i32,
    is_captured: bool,
}

struct UpvalueSlot {
    index: u8,
    is_local: bool,
}

/// État de compilation d'une fonction (script compris). `loop_start`
/// vaut -1 hors de toute boucle; `continue` s'appuie dessus pour
/// refuser de s'exécuter en dehors d'une boucle.
struct FunctionScope {
    function: ObjRef,
    fn_type: FunctionType,
    locals: Vec<Local>,
    upvalues: Vec<UpvalueSlot>,
    scope_depth: i32,
    loop_start: i32,
    loop_scope_depth: i32,
    /// Cache de dédoublonnage des constantes d'identifiant, propre à CETTE
    /// fonction : l'original porte un unique cache global `stringConstants`
    /// qui survit à tout `compile()`, mais chaque fonction imbriquée a son
    /// propre pool de constantes avec des indices indépendants — un cache
    /// global réutiliserait l'indice d'une autre fonction. Un cache par
    /// fonction évite ce bug latent.
    ident_constants: AHashMap<ObjRef, u32>,
}

struct ClassScope {
    has_superclass: bool,
}

pub struct Compiler<'a> {
    scanner: Scanner<'a>,
    current: Token,
    previous: Token,
    had_error: bool,
    panic_mode: bool,
    functions: Vec<FunctionScope>,
    classes: Vec<ClassScope>,
}

impl<'a> Compiler<'a> {
    /// Compile `source` en un `ObjRef` vers la fonction de script top-level,
    /// ou `None` si une erreur de compilation a été signalée (déjà imprimée
    /// sur stderr au format `[line N] Error ...`).
    pub fn compile(source: &'a str, heap: &mut Heap) -> Option<ObjRef> {
        let mut compiler = Compiler {
            scanner: Scanner::new(source),
            current: Token { kind: TokenKind::Eof, line: 0 },
            previous: Token { kind: TokenKind::Eof, line: 0 },
            had_error: false,
            panic_mode: false,
            functions: Vec::new(),
            classes: Vec::new(),
        };
        compiler.push_function(FunctionType::Script, None, heap);
        compiler.advance();
        while !compiler.match_token(&TokenKind::Eof) {
            compiler.declaration(heap);
        }
        compiler.consume(&TokenKind::Eof, "Expect end of expression.");
        let (function, _upvalues) = compiler.pop_function(heap, 0);
        if compiler.had_error {
            None
        } else {
            Some(function)
        }
    }

    /// Marque comme racines GC les fonctions en cours de construction (pas
    /// encore stockées nulle part de reachable) et les noms d'identifiants
    /// déjà internés mais pas encore ajoutés au pool de constantes.
    pub fn mark_roots(&self, heap: &mut Heap, gray: &mut Vec<ObjRef>) {
        for scope in &self.functions {
            heap.mark_object(scope.function, gray);
            for &key in scope.ident_constants.keys() {
                heap.mark_object(key, gray);
            }
        }
    }

    fn collect_if_needed(&self, heap: &mut Heap) {
        if heap.should_collect() {
            heap.collect_garbage(|h, gray| self.mark_roots(h, gray));
        }
    }

    // --- gestion des jetons ------------------------------------------------

    fn advance(&mut self) {
        std::mem::swap(&mut self.previous, &mut self.current);
        loop {
            self.current = self.scanner.scan_token();
            if let TokenKind::Error(msg) = self.current.kind.clone() {
                self.error_at_current(&msg);
                continue;
            }
            break;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind)
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: &TokenKind, message: &str) {
        if self.check(kind) {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn error_at_current(&mut self, message: &str) {
        let line = self.current.line;
        self.error_at(line, message);
    }

    fn error(&mut self, message: &str) {
        let line = self.previous.line;
        self.error_at(line, message);
    }

    fn error_at(&mut self, line: u32, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        eprintln!("[line {line}] Error: {message}");
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while !matches!(self.current.kind, TokenKind::Eof) {
            if matches!(self.previous.kind, TokenKind::Semicolon) {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // --- émission ------------------------------------------------------

    fn emit_op(&mut self, heap: &mut Heap, op: Op) -> usize {
        let line = self.previous.line;
        let function = self.functions.last().unwrap().function;
        heap.as_function_mut(function).chunk.write_op(op, line)
    }

    fn emit_return(&mut self, heap: &mut Heap) {
        if self.functions.last().unwrap().fn_type == FunctionType::Initializer {
            self.emit_op(heap, Op::GetLocal(0));
        } else {
            self.emit_op(heap, Op::Nil);
        }
        self.emit_op(heap, Op::Return);
    }

    fn emit_constant(&mut self, heap: &mut Heap, value: Value) {
        let line = self.previous.line;
        let function = self.functions.last().unwrap().function;
        if let Err(e) = heap.as_function_mut(function).chunk.write_constant(value, line) {
            let msg = e.to_string();
            self.error(&msg);
        }
    }

    fn emit_jump(&mut self, heap: &mut Heap, make: impl FnOnce(u16) -> Op) -> usize {
        let line = self.previous.line;
        let function = self.functions.last().unwrap().function;
        heap.as_function_mut(function).chunk.emit_jump(make, line)
    }

    fn patch_jump(&mut self, heap: &mut Heap, offset: usize) {
        let function = self.functions.last().unwrap().function;
        if let Err(e) = heap.as_function_mut(function).chunk.patch_jump(offset) {
            let msg = e.to_string();
            self.error(&msg);
        }
    }

    fn emit_loop(&mut self, heap: &mut Heap, loop_start: usize) {
        let line = self.previous.line;
        let function = self.functions.last().unwrap().function;
        if let Err(e) = heap.as_function_mut(function).chunk.emit_loop(loop_start, line) {
            let msg = e.to_string();
            self.error(&msg);
        }
    }

    fn current_offset(&self, heap: &Heap) -> usize {
        let function = self.functions.last().unwrap().function;
        heap.as_function(function).chunk.len()
    }

    fn identifier_constant(&mut self, heap: &mut Heap, name: &str) -> u8 {
        let name_ref = heap.intern(name);
        self.collect_if_needed(heap);
        if let Some(&idx) = self.functions.last().unwrap().ident_constants.get(&name_ref) {
            return idx as u8;
        }
        let function = self.functions.last().unwrap().function;
        let added = heap.as_function_mut(function).chunk.add_constant(Value::Obj(name_ref));
        match added {
            Ok(idx) if idx <= u32::from(u8::MAX) => {
                self.functions.last_mut().unwrap().ident_constants.insert(name_ref, idx);
                idx as u8
            }
            Ok(_) => {
                self.error("Too many constants in one chunk.");
                0
            }
            Err(e) => {
                let msg = e.to_string();
                self.error(&msg);
                0
            }
        }
    }

    // --- portées et variables locales --------------------------------

    fn begin_scope(&mut self) {
        self.functions.last_mut().unwrap().scope_depth += 1;
    }

    fn end_scope(&mut self, heap: &mut Heap) {
        let scope = self.functions.last_mut().unwrap();
        scope.scope_depth -= 1;
        let depth = scope.scope_depth;
        let mut closes = Vec::new();
        while let Some(local) = scope.locals.last() {
            if local.depth > depth {
                closes.push(scope.locals.pop().unwrap().is_captured);
            } else {
                break;
            }
        }
        for captured in closes {
            if captured {
                self.emit_op(heap, Op::CloseUpvalue);
            } else {
                self.emit_op(heap, Op::Pop);
            }
        }
    }

    fn declare_variable(&mut self, name: &str) {
        let scope = self.functions.last().unwrap();
        if scope.scope_depth == 0 {
            return;
        }
        let depth = scope.scope_depth;
        let mut redeclared = false;
        for local in scope.locals.iter().rev() {
            if local.depth != -1 && local.depth < depth {
                break;
            }
            if local.name == name {
                redeclared = true;
                break;
            }
        }
        if redeclared {
            self.error("Already a variable with this name in this scope.");
            return;
        }
        self.add_local(name);
    }

    fn add_local(&mut self, name: &str) {
        let scope = self.functions.last_mut().unwrap();
        let too_many = scope.locals.len() >= 256;
        if !too_many {
            scope.locals.push(Local { name: name.to_string(), depth: -1, is_captured: false });
        }
        if too_many {
            self.error("Too many local variables in function.");
        }
    }

    fn mark_initialized(&mut self) {
        let scope = self.functions.last_mut().unwrap();
        if scope.scope_depth == 0 {
            return;
        }
        let depth = scope.scope_depth;
        if let Some(local) = scope.locals.last_mut() {
            local.depth = depth;
        }
    }

    fn resolve_local(&mut self, scope_idx: usize, name: &str) -> Option<u8> {
        let mut found: Option<(u8, bool)> = None;
        {
            let scope = &self.functions[scope_idx];
            for (i, local) in scope.locals.iter().enumerate().rev() {
                if local.name == name {
                    found = Some((i as u8, local.depth == -1));
                    break;
                }
            }
        }
        match found {
            Some((idx, true)) => {
                self.error("Can't read local variable in its own initializer.");
                Some(idx)
            }
            Some((idx, false)) => Some(idx),
            None => None,
        }
    }

    fn resolve_upvalue(&mut self, scope_idx: usize, name: &str) -> Option<u8> {
        if scope_idx == 0 {
            return None;
        }
        let enclosing_idx = scope_idx - 1;
        if let Some(local_idx) = self.resolve_local(enclosing_idx, name) {
            self.functions[enclosing_idx].locals[local_idx as usize].is_captured = true;
            return Some(self.add_upvalue(scope_idx, local_idx, true));
        }
        if let Some(upvalue_idx) = self.resolve_upvalue(enclosing_idx, name) {
            return Some(self.add_upvalue(scope_idx, upvalue_idx, false));
        }
        None
    }

    fn add_upvalue(&mut self, scope_idx: usize, index: u8, is_local: bool) -> u8 {
        let scope = &mut self.functions[scope_idx];
        for (i, up) in scope.upvalues.iter().enumerate() {
            if up.index == index && up.is_local == is_local {
                return i as u8;
            }
        }
        if scope.upvalues.len() >= 256 {
            self.error("Too many closure variables in function.");
            return 0;
        }
        let scope = &mut self.functions[scope_idx];
        scope.upvalues.push(UpvalueSlot { index, is_local });
        (scope.upvalues.len() - 1) as u8
    }

    fn named_variable(&mut self, heap: &mut Heap, name: &str, can_assign: bool) {
        let scope_idx = self.functions.len() - 1;
        let get_op;
        let set_op;
        if let Some(idx) = self.resolve_local(scope_idx, name) {
            get_op = Op::GetLocal(idx);
            set_op = Op::SetLocal(idx);
        } else if let Some(idx) = self.resolve_upvalue(scope_idx, name) {
            get_op = Op::GetUpvalue(idx);
            set_op = Op::SetUpvalue(idx);
        } else {
            let idx = self.identifier_constant(heap, name);
            get_op = Op::GetGlobal(idx);
            set_op = Op::SetGlobal(idx);
        }
        if can_assign && self.match_token(&TokenKind::Equal) {
            self.expression(heap);
            self.emit_op(heap, set_op);
        } else {
            self.emit_op(heap, get_op);
        }
    }

    fn parse_variable(&mut self, heap: &mut Heap, message: &str) -> u8 {
        self.consume(&TokenKind::Identifier(String::new()), message);
        let name = match self.previous.kind.clone() {
            TokenKind::Identifier(s) => s,
            _ => String::new(),
        };
        self.declare_variable(&name);
        if self.functions.last().unwrap().scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(heap, &name)
    }

    fn define_variable(&mut self, heap: &mut Heap, global_idx: u8) {
        if self.functions.last().unwrap().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_op(heap, Op::DefineGlobal(global_idx));
    }

    // --- fonctions / classes --------------------------------------------

    fn push_function(&mut self, fn_type: FunctionType, name: Option<ObjRef>, heap: &mut Heap) {
        let function = heap.alloc_function(LFunction::new(name));
        self.collect_if_needed(heap);
        self.functions.push(FunctionScope {
            function,
            fn_type,
            locals: Vec::new(),
            upvalues: Vec::new(),
            scope_depth: 0,
            loop_start: -1,
            loop_scope_depth: 0,
            ident_constants: AHashMap::new(),
        });
        // Emplacement 0 réservé : `this` pour les méthodes/initialiseurs,
        // case vide et inaccessible sinon (convention de l'original).
        let reserved_name = if matches!(fn_type, FunctionType::Method | FunctionType::Initializer) {
            "this"
        } else {
            ""
        };
        self.functions.last_mut().unwrap().locals.push(Local {
            name: reserved_name.to_string(),
            depth: 0,
            is_captured: false,
        });
    }

    fn pop_function(&mut self, heap: &mut Heap, arity: u8) -> (ObjRef, Vec<UpvalueSlot>) {
        self.emit_return(heap);
        let scope = self.functions.pop().unwrap();
        {
            let f = heap.as_function_mut(scope.function);
            f.arity = arity;
            f.upvalue_count = scope.upvalues.len() as u8;
        }
        #[cfg(feature = "print-code")]
        if !self.had_error {
            let label = heap
                .as_function(scope.function)
                .name
                .map(|n| heap.as_string(n).to_string())
                .unwrap_or_else(|| "<script>".to_string());
            tracing::debug!("{}", lumen_core::disasm::disassemble_chunk(&heap.as_function(scope.function).chunk, heap, &label));
        }
        (scope.function, scope.upvalues)
    }

    fn function(&mut self, heap: &mut Heap, fn_type: FunctionType) {
        let name_ref = match self.previous.kind.clone() {
            TokenKind::Identifier(s) => Some(heap.intern(&s)),
            _ => None,
        };
        self.push_function(fn_type, name_ref, heap);
        self.begin_scope();

        self.consume(&TokenKind::LeftParen, "Expect '(' after function name.");
        let mut arity: u32 = 0;
        if !self.check(&TokenKind::RightParen) {
            loop {
                arity += 1;
                if arity > 255 {
                    self.error("Can't have more than 255 parameters.");
                }
                self.consume(&TokenKind::Identifier(String::new()), "Expect parameter name.");
                let pname = match self.previous.kind.clone() {
                    TokenKind::Identifier(s) => s,
                    _ => String::new(),
                };
                self.declare_variable(&pname);
                self.mark_initialized();
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(&TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block(heap);

        let (function, upvalues) = self.pop_function(heap, arity.min(255) as u8);
        let enclosing = self.functions.last().unwrap().function;
        let const_idx = heap.as_function_mut(enclosing).chunk.add_constant(Value::Obj(function));
        match const_idx {
            Ok(idx) => {
                let caps = upvalues.iter().map(|u| UpvalueCapture { index: u.index, is_local: u.is_local }).collect();
                self.emit_op(heap, Op::Closure(idx, caps));
            }
            Err(e) => {
                let msg = e.to_string();
                self.error(&msg);
            }
        }
    }

    fn method(&mut self, heap: &mut Heap) {
        self.consume(&TokenKind::Identifier(String::new()), "Expect method name.");
        let name = match self.previous.kind.clone() {
            TokenKind::Identifier(s) => s,
            _ => String::new(),
        };
        let name_idx = self.identifier_constant(heap, &name);
        let fn_type = if name == "init" { FunctionType::Initializer } else { FunctionType::Method };
        self.function(heap, fn_type);
        self.emit_op(heap, Op::Method(name_idx));
    }

    fn class_declaration(&mut self, heap: &mut Heap) {
        self.consume(&TokenKind::Identifier(String::new()), "Expect class name.");
        let class_name = match self.previous.kind.clone() {
            TokenKind::Identifier(s) => s,
            _ => String::new(),
        };
        let name_idx = self.identifier_constant(heap, &class_name);
        self.declare_variable(&class_name);
        self.emit_op(heap, Op::Class(name_idx));
        self.define_variable(heap, name_idx);

        self.classes.push(ClassScope { has_superclass: false });

        if self.match_token(&TokenKind::Less) {
            self.consume(&TokenKind::Identifier(String::new()), "Expect superclass name.");
            let super_name = match self.previous.kind.clone() {
                TokenKind::Identifier(s) => s,
                _ => String::new(),
            };
            if super_name == class_name {
                self.error("A class can't inherit from itself.");
            }
            self.variable(heap, false);

            self.begin_scope();
            self.add_local("super");
            self.mark_initialized();

            self.named_variable(heap, &class_name, false);
            self.emit_op(heap, Op::Inherit);
            self.classes.last_mut().unwrap().has_superclass = true;
        }

        self.named_variable(heap, &class_name, false);
        self.consume(&TokenKind::LeftBrace, "Expect '{' before class body.");
        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            self.method(heap);
        }
        self.consume(&TokenKind::RightBrace, "Expect '}' after class body.");
        self.emit_op(heap, Op::Pop);

        if self.classes.last().unwrap().has_superclass {
            self.end_scope(heap);
        }
        self.classes.pop();
    }

    fn fun_declaration(&mut self, heap: &mut Heap) {
        let global = self.parse_variable(heap, "Expect function name.");
        self.mark_initialized();
        self.function(heap, FunctionType::Function);
        self.define_variable(heap, global);
    }

    fn var_declaration(&mut self, heap: &mut Heap) {
        let global = self.parse_variable(heap, "Expect variable name.");
        if self.match_token(&TokenKind::Equal) {
            self.expression(heap);
        } else {
            self.emit_op(heap, Op::Nil);
        }
        self.consume(&TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(heap, global);
    }

    // --- déclarations et instructions -----------------------------------

    fn declaration(&mut self, heap: &mut Heap) {
        if self.match_token(&TokenKind::Class) {
            self.class_declaration(heap);
        } else if self.match_token(&TokenKind::Fun) {
            self.fun_declaration(heap);
        } else if self.match_token(&TokenKind::Var) {
            self.var_declaration(heap);
        } else {
            self.statement(heap);
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn statement(&mut self, heap: &mut Heap) {
        if self.match_token(&TokenKind::Print) {
            self.print_statement(heap);
        } else if self.match_token(&TokenKind::If) {
            self.if_statement(heap);
        } else if self.match_token(&TokenKind::Return) {
            self.return_statement(heap);
        } else if self.match_token(&TokenKind::While) {
            self.while_statement(heap);
        } else if self.match_token(&TokenKind::For) {
            self.for_statement(heap);
        } else if self.match_token(&TokenKind::Continue) {
            self.continue_statement(heap);
        } else if self.match_token(&TokenKind::Switch) {
            self.switch_statement(heap);
        } else if self.match_token(&TokenKind::LeftBrace) {
            self.begin_scope();
            self.block(heap);
            self.end_scope(heap);
        } else {
            self.expression_statement(heap);
        }
    }

    fn block(&mut self, heap: &mut Heap) {
        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            self.declaration(heap);
        }
        self.consume(&TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self, heap: &mut Heap) {
        self.expression(heap);
        self.consume(&TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(heap, Op::Print);
    }

    fn expression_statement(&mut self, heap: &mut Heap) {
        self.expression(heap);
        self.consume(&TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(heap, Op::Pop);
    }

    fn return_statement(&mut self, heap: &mut Heap) {
        if self.functions.last().unwrap().fn_type == FunctionType::Script {
            self.error("Can't return from top-level code.");
        }
        if self.match_token(&TokenKind::Semicolon) {
            self.emit_return(heap);
        } else {
            if self.functions.last().unwrap().fn_type == FunctionType::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression(heap);
            self.consume(&TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit_op(heap, Op::Return);
        }
    }

    fn if_statement(&mut self, heap: &mut Heap) {
        self.consume(&TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression(heap);
        self.consume(&TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(heap, Op::JumpIfFalse);
        self.emit_op(heap, Op::Pop);
        self.statement(heap);

        let else_jump = self.emit_jump(heap, Op::Jump);
        self.patch_jump(heap, then_jump);
        self.emit_op(heap, Op::Pop);

        if self.match_token(&TokenKind::Else) {
            self.statement(heap);
        }
        self.patch_jump(heap, else_jump);
    }

    fn while_statement(&mut self, heap: &mut Heap) {
        let (surrounding_start, surrounding_depth) = {
            let scope = self.functions.last().unwrap();
            (scope.loop_start, scope.loop_scope_depth)
        };
        let loop_start = self.current_offset(heap) as i32;
        {
            let scope = self.functions.last_mut().unwrap();
            scope.loop_start = loop_start;
            scope.loop_scope_depth = scope.scope_depth;
        }

        self.consume(&TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression(heap);
        self.consume(&TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(heap, Op::JumpIfFalse);
        self.emit_op(heap, Op::Pop);
        self.statement(heap);
        self.emit_loop(heap, loop_start as usize);
        self.patch_jump(heap, exit_jump);
        self.emit_op(heap, Op::Pop);

        let scope = self.functions.last_mut().unwrap();
        scope.loop_start = surrounding_start;
        scope.loop_scope_depth = surrounding_depth;
    }

    /// Suit `forStatement` de l'original : `innermost_loop_start` (utilisé
    /// par `continue`) pointe vers la clause d'incrément si elle existe,
    /// sinon vers la condition — distinct du `loop_start` local utilisé par
    /// le saut de fin de corps, qui lui aussi finit par pointer vers
    /// l'incrément une fois celui-ci compilé.
    fn for_statement(&mut self, heap: &mut Heap) {
        self.begin_scope();
        self.consume(&TokenKind::LeftParen, "Expect '(' after 'for'.");
        if self.match_token(&TokenKind::Semicolon) {
            // pas d'initialiseur
        } else if self.match_token(&TokenKind::Var) {
            self.var_declaration(heap);
        } else {
            self.expression_statement(heap);
        }

        let (surrounding_start, surrounding_depth) = {
            let scope = self.functions.last().unwrap();
            (scope.loop_start, scope.loop_scope_depth)
        };

        let mut loop_start = self.current_offset(heap);
        {
            let scope = self.functions.last_mut().unwrap();
            scope.loop_start = loop_start as i32;
            scope.loop_scope_depth = scope.scope_depth;
        }

        let mut exit_jump = None;
        if !self.match_token(&TokenKind::Semicolon) {
            self.expression(heap);
            self.consume(&TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(heap, Op::JumpIfFalse));
            self.emit_op(heap, Op::Pop);
        }

        if !self.check(&TokenKind::RightParen) {
            let body_jump = self.emit_jump(heap, Op::Jump);
            let increment_start = self.current_offset(heap);
            self.expression(heap);
            self.emit_op(heap, Op::Pop);
            self.consume(&TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(heap, loop_start);
            loop_start = increment_start;
            self.functions.last_mut().unwrap().loop_start = increment_start as i32;
            self.patch_jump(heap, body_jump);
        } else {
            self.consume(&TokenKind::RightParen, "Expect ')' after for clauses.");
        }

        self.statement(heap);
        self.emit_loop(heap, loop_start);

        if let Some(exit) = exit_jump {
            self.patch_jump(heap, exit);
            self.emit_op(heap, Op::Pop);
        }

        let scope = self.functions.last_mut().unwrap();
        scope.loop_start = surrounding_start;
        scope.loop_scope_depth = surrounding_depth;
        self.end_scope(heap);
    }

    fn continue_statement(&mut self, heap: &mut Heap) {
        let (loop_start, loop_depth) = {
            let scope = self.functions.last().unwrap();
            (scope.loop_start, scope.loop_scope_depth)
        };
        if loop_start == -1 {
            self.error("Can't use 'continue' outside of a loop.");
        }
        self.consume(&TokenKind::Semicolon, "Expect ';' after 'continue'.");

        let pop_count = {
            let scope = self.functions.last().unwrap();
            scope.locals.iter().rev().take_while(|l| l.depth > loop_depth).count()
        };
        for _ in 0..pop_count {
            self.emit_op(heap, Op::Pop);
        }
        if loop_start != -1 {
            self.emit_loop(heap, loop_start as usize);
        }
    }

    /// Machine à 3 états (avant toute case, avant default, après default),
    /// comme l'original : pas d'opcode `switch` dédié, juste
    /// `Dup`/expression/`Equal`/`JumpIfFalse`/`Pop` réutilisés par `case`.
    /// Contrairement à l'original, la `}` fermante est systématiquement
    /// vérifiée via `consume` (l'original sort silencieusement de la boucle
    /// sur EOF sans erreur si elle manque).
    fn switch_statement(&mut self, heap: &mut Heap) {
        self.consume(&TokenKind::LeftParen, "Expect '(' after 'switch'.");
        self.expression(heap);
        self.consume(&TokenKind::RightParen, "Expect ')' after value.");
        self.consume(&TokenKind::LeftBrace, "Expect '{' before switch cases.");

        let mut state: u8 = 0;
        let mut case_ends: Vec<usize> = Vec::new();
        let mut previous_case_skip: Option<usize> = None;

        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            if self.match_token(&TokenKind::Case) || self.match_token(&TokenKind::Default) {
                let is_case = matches!(self.previous.kind, TokenKind::Case);
                if state == 2 {
                    self.error("Can't have another case or default after the default case.");
                }
                if state == 1 {
                    case_ends.push(self.emit_jump(heap, Op::Jump));
                    if let Some(skip) = previous_case_skip.take() {
                        self.patch_jump(heap, skip);
                    }
                    self.emit_op(heap, Op::Pop);
                }
                if is_case {
                    state = 1;
                    self.emit_op(heap, Op::Dup);
                    self.expression(heap);
                    self.consume(&TokenKind::Colon, "Expect ':' after case value.");
                    self.emit_op(heap, Op::Equal);
                    previous_case_skip = Some(self.emit_jump(heap, Op::JumpIfFalse));
                    self.emit_op(heap, Op::Pop);
                } else {
                    state = 2;
                    self.consume(&TokenKind::Colon, "Expect ':' after default.");
                }
            } else {
                if state == 0 {
                    self.error("Can't have statements before any case.");
                }
                self.statement(heap);
            }
        }
        self.consume(&TokenKind::RightBrace, "Expect '}' after switch cases.");

        if state == 1 {
            if let Some(skip) = previous_case_skip {
                self.patch_jump(heap, skip);
            }
            self.emit_op(heap, Op::Pop);
        }
        for end in case_ends {
            self.patch_jump(heap, end);
        }
        self.emit_op(heap, Op::Pop); // la valeur du switch elle-même
    }

    // --- expressions -----------------------------------------------------

    fn expression(&mut self, heap: &mut Heap) {
        self.parse_precedence(heap, Precedence::Assignment);
    }

    fn parse_precedence(&mut self, heap: &mut Heap, precedence: Precedence) {
        self.advance();
        let can_assign = precedence <= Precedence::Assignment;
        if !self.prefix(heap, can_assign) {
            self.error("Expect expression.");
            return;
        }
        while precedence <= Precedence::of(&self.current.kind) {
            self.advance();
            self.infix(heap, can_assign);
        }
        if can_assign && self.match_token(&TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn prefix(&mut self, heap: &mut Heap, can_assign: bool) -> bool {
        match self.previous.kind.clone() {
            TokenKind::LeftParen => self.grouping(heap),
            TokenKind::Minus | TokenKind::Bang => self.unary(heap),
            TokenKind::Number(_) => self.number(heap),
            TokenKind::String(_) => self.string(heap),
            TokenKind::Identifier(_) => self.variable(heap, can_assign),
            TokenKind::True | TokenKind::False | TokenKind::Nil => self.literal(heap),
            TokenKind::This => self.this_expr(heap),
            TokenKind::Super => self.super_expr(heap),
            _ => return false,
        }
        true
    }

    fn infix(&mut self, heap: &mut Heap, can_assign: bool) {
        match self.previous.kind.clone() {
            TokenKind::Minus
            | TokenKind::Plus
            | TokenKind::Percent
            | TokenKind::Slash
            | TokenKind::Star
            | TokenKind::BangEqual
            | TokenKind::EqualEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual => self.binary(heap),
            TokenKind::And => self.and_(heap),
            TokenKind::Or => self.or_(heap),
            TokenKind::LeftParen => self.call_expr(heap),
            TokenKind::Dot => self.dot(heap, can_assign),
            TokenKind::Question => self.conditional(heap),
            _ => {}
        }
    }

    fn number(&mut self, heap: &mut Heap) {
        if let TokenKind::Number(n) = self.previous.kind {
            self.emit_constant(heap, Value::Number(n));
        }
    }

    fn string(&mut self, heap: &mut Heap) {
        if let TokenKind::String(s) = self.previous.kind.clone() {
            let r = heap.intern(&s);
            self.collect_if_needed(heap);
            self.emit_constant(heap, Value::Obj(r));
        }
    }

    fn literal(&mut self, heap: &mut Heap) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(heap, Op::False),
            TokenKind::Nil => self.emit_op(heap, Op::Nil),
            TokenKind::True => self.emit_op(heap, Op::True),
            _ => unreachable!(),
        };
    }

    fn grouping(&mut self, heap: &mut Heap) {
        self.expression(heap);
        self.consume(&TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self, heap: &mut Heap) {
        let op_kind = self.previous.kind.clone();
        self.parse_precedence(heap, Precedence::Unary);
        match op_kind {
            TokenKind::Minus => self.emit_op(heap, Op::Negate),
            TokenKind::Bang => self.emit_op(heap, Op::Not),
            _ => unreachable!(),
        };
    }

    fn binary(&mut self, heap: &mut Heap) {
        let op_kind = self.previous.kind.clone();
        let prec = Precedence::of(&op_kind);
        self.parse_precedence(heap, prec.next());
        match op_kind {
            TokenKind::Plus => self.emit_op(heap, Op::Add),
            TokenKind::Minus => self.emit_op(heap, Op::Subtract),
            TokenKind::Star => self.emit_op(heap, Op::Multiply),
            TokenKind::Slash => self.emit_op(heap, Op::Divide),
            TokenKind::Percent => self.emit_op(heap, Op::Modulus),
            TokenKind::EqualEqual => self.emit_op(heap, Op::Equal),
            TokenKind::Greater => self.emit_op(heap, Op::Greater),
            TokenKind::Less => self.emit_op(heap, Op::Less),
            TokenKind::BangEqual => {
                self.emit_op(heap, Op::Equal);
                self.emit_op(heap, Op::Not)
            }
            TokenKind::GreaterEqual => {
                self.emit_op(heap, Op::Less);
                self.emit_op(heap, Op::Not)
            }
            TokenKind::LessEqual => {
                self.emit_op(heap, Op::Greater);
                self.emit_op(heap, Op::Not)
            }
            _ => unreachable!(),
        };
    }

    /// Les deux branches de `?:` sont compilées sans saut de garde : pas de
    /// court-circuit, `Op::Conditional` choisit entre les deux au runtime.
    fn conditional(&mut self, heap: &mut Heap) {
        self.parse_precedence(heap, Precedence::Conditional);
        self.consume(&TokenKind::Colon, "Expect ':' after then branch of conditional expression.");
        self.parse_precedence(heap, Precedence::Assignment);
        self.emit_op(heap, Op::Conditional);
    }

    fn and_(&mut self, heap: &mut Heap) {
        let end_jump = self.emit_jump(heap, Op::JumpIfFalse);
        self.emit_op(heap, Op::Pop);
        self.parse_precedence(heap, Precedence::And);
        self.patch_jump(heap, end_jump);
    }

    fn or_(&mut self, heap: &mut Heap) {
        let else_jump = self.emit_jump(heap, Op::JumpIfFalse);
        let end_jump = self.emit_jump(heap, Op::Jump);
        self.patch_jump(heap, else_jump);
        self.emit_op(heap, Op::Pop);
        self.parse_precedence(heap, Precedence::Or);
        self.patch_jump(heap, end_jump);
    }

    fn variable(&mut self, heap: &mut Heap, can_assign: bool) {
        let name = match self.previous.kind.clone() {
            TokenKind::Identifier(s) => s,
            _ => unreachable!(),
        };
        self.named_variable(heap, &name, can_assign);
    }

    fn this_expr(&mut self, heap: &mut Heap) {
        if self.classes.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.named_variable(heap, "this", false);
    }

    fn super_expr(&mut self, heap: &mut Heap) {
        if self.classes.is_empty() {
            self.error("Can't use 'super' outside of a class.");
        } else if !self.classes.last().unwrap().has_superclass {
            self.error("Can't use 'super' in a class with no superclass.");
        }
        self.consume(&TokenKind::Dot, "Expect '.' after 'super'.");
        self.consume(&TokenKind::Identifier(String::new()), "Expect superclass method name.");
        let method_name = match self.previous.kind.clone() {
            TokenKind::Identifier(s) => s,
            _ => String::new(),
        };
        let name_idx = self.identifier_constant(heap, &method_name);

        self.named_variable(heap, "this", false);
        if self.match_token(&TokenKind::LeftParen) {
            let argc = self.argument_list(heap);
            self.named_variable(heap, "super", false);
            self.emit_op(heap, Op::SuperInvoke(name_idx, argc));
        } else {
            self.named_variable(heap, "super", false);
            self.emit_op(heap, Op::GetSuper(name_idx));
        }
    }

    fn argument_list(&mut self, heap: &mut Heap) -> u8 {
        let mut argc: u32 = 0;
        if !self.check(&TokenKind::RightParen) {
            loop {
                self.expression(heap);
                if argc == 255 {
                    self.error("Can't have more than 255 arguments.");
                } else {
                    argc += 1;
                }
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RightParen, "Expect ')' after arguments.");
        argc.min(255) as u8
    }

    fn call_expr(&mut self, heap: &mut Heap) {
        let argc = self.argument_list(heap);
        self.emit_op(heap, Op::Call(argc));
    }

    fn dot(&mut self, heap: &mut Heap, can_assign: bool) {
        self.consume(&TokenKind::Identifier(String::new()), "Expect property name after '.'.");
        let name = match self.previous.kind.clone() {
            TokenKind::Identifier(s) => s,
            _ => String::new(),
        };
        let name_idx = self.identifier_constant(heap, &name);
        if can_assign && self.match_token(&TokenKind::Equal) {
            self.expression(heap);
            self.emit_op(heap, Op::SetProperty(name_idx));
        } else if self.match_token(&TokenKind::LeftParen) {
            let argc = self.argument_list(heap);
            self.emit_op(heap, Op::Invoke(name_idx, argc));
        } else {
            self.emit_op(heap, Op::GetProperty(name_idx));
        }
    }
}
