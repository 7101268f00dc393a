//! object.rs — variantes d'objets alloués sur le tas (`Heap`).
//!
//! Chaque valeur non scalaire (`Value::Obj`) pointe vers l'une de ces
//! variantes via un [`ObjRef`] — un indice dans l'arène du `Heap`, pas un
//! pointeur brut. Voir `heap.rs` pour l'allocateur et le GC.

use crate::chunk::Chunk;
use crate::table::Table;
use crate::value::Value;

/// Poignée opaque vers un objet alloué sur le `Heap`. Deux `ObjRef` égales
/// désignent le même objet ; pour les chaînes internées, identité ⇔ contenu.
pub type ObjRef = u32;

/// Une variante d'objet du tas.
#[derive(Debug)]
pub enum Obj {
    String(LString),
    Function(LFunction),
    Closure(LClosure),
    Upvalue(LUpvalue),
    Native(LNative),
    Class(LClass),
    Instance(LInstance),
    BoundMethod(LBoundMethod),
}

impl Obj {
    /// Nom de variante pour les messages d'erreur / disassembleur.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Obj::String(_) => "string",
            Obj::Function(_) => "function",
            Obj::Closure(_) => "closure",
            Obj::Upvalue(_) => "upvalue",
            Obj::Native(_) => "native fn",
            Obj::Class(_) => "class",
            Obj::Instance(_) => "instance",
            Obj::BoundMethod(_) => "bound method",
        }
    }
}

/// Chaîne immuable, internée par contenu (hash FNV-1a 32 bits précalculé).
#[derive(Debug, Clone)]
pub struct LString {
    pub chars: String,
    pub hash: u32,
}

/// Une fonction compilée : arité, nombre d'upvalues attendues, son propre
/// chunk de bytecode, et un nom optionnel (`None` pour le script top-level).
#[derive(Debug)]
pub struct LFunction {
    pub arity: u8,
    pub upvalue_count: u8,
    pub chunk: Chunk,
    pub name: Option<ObjRef>,
}

impl LFunction {
    pub fn new(name: Option<ObjRef>) -> Self {
        Self { arity: 0, upvalue_count: 0, chunk: Chunk::new(name), name }
    }
}

/// Une fermeture : fonction + upvalues capturées (dans l'ordre de capture).
#[derive(Debug)]
pub struct LClosure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

/// État d'une upvalue : ouverte (pointe encore vers une case de pile VM) ou
/// fermée (possède sa propre valeur, copiée au moment de la fermeture).
#[derive(Debug, Clone, Copy)]
pub enum UpvalueState {
    Open(usize),
    Closed(Value),
}

#[derive(Debug)]
pub struct LUpvalue {
    pub state: UpvalueState,
}

/// Signature d'une fonction native (host). Les erreurs natives empruntent le
/// même canal que les autres erreurs runtime — pas de type d'erreur séparé.
pub type NativeFn = fn(&[Value], &mut crate::heap::Heap) -> Result<Value, String>;

#[derive(Clone, Copy)]
pub struct LNative {
    pub name: ObjRef,
    pub func: NativeFn,
}

impl std::fmt::Debug for LNative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LNative(name={})", self.name)
    }
}

/// Une classe : nom, table des méthodes (nom → `Value::Obj(Closure)`), et
/// un initialiseur mis en cache (`Value::Nil` si la classe n'en définit pas).
#[derive(Debug)]
pub struct LClass {
    pub name: ObjRef,
    pub methods: Table,
    pub initializer: Value,
}

impl LClass {
    pub fn new(name: ObjRef) -> Self {
        Self { name, methods: Table::new(), initializer: Value::Nil }
    }
}

/// Une instance : sa classe et ses champs (table nom → valeur).
#[derive(Debug)]
pub struct LInstance {
    pub class: ObjRef,
    pub fields: Table,
}

impl LInstance {
    pub fn new(class: ObjRef) -> Self {
        Self { class, fields: Table::new() }
    }
}

/// Une méthode pré-liée à son récepteur (`obj.method` sans appel immédiat).
#[derive(Debug, Clone, Copy)]
pub struct LBoundMethod {
    pub receiver: Value,
    pub method: ObjRef,
}
