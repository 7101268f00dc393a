//! lumen-core — modèle de valeurs/objets, format de bytecode, table de
//! hachage réutilisable, et ramasse-miettes du langage Lumen.
//!
//! Ni le compilateur (`lumen-compiler`) ni la VM (`lumen-vm`) ne possèdent
//! le `Heap` : il leur est toujours passé en `&mut Heap` explicite.

pub mod chunk;
pub mod disasm;
pub mod error;
pub mod heap;
pub mod object;
pub mod op;
pub mod table;
pub mod value;

pub use chunk::Chunk;
pub use error::ChunkError;
pub use heap::Heap;
pub use object::{
    LBoundMethod, LClass, LClosure, LFunction, LInstance, LNative, LString, LUpvalue, NativeFn, Obj,
    ObjRef, UpvalueState,
};
pub use op::{Op, UpvalueCapture};
pub use table::Table;
pub use value::Value;
