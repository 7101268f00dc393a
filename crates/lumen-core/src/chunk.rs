//! chunk.rs — unité de bytecode compilé : instructions, table de lignes
//! (compressée par plages), et pool de constantes.
//!
//! `Chunk` garde un `Vec<Op>` structuré plutôt qu'un flux d'octets (voir
//! `op.rs`), mais préserve les propriétés observables de la spécification :
//! au-delà de 256 constantes, `write_constant` bascule sur
//! `Op::ConstantLong`; les sauts au-delà de `u16::MAX` sont un échec de
//! compilation, pas une troncature silencieuse.

use crate::error::ChunkError;
use crate::heap::Heap;
use crate::object::{LFunction, ObjRef};
use crate::op::{Op, UpvalueCapture};
use crate::value::Value;
use serde::{Deserialize, Serialize};

const MAGIC: &[u8; 4] = b"LUMN";
const FORMAT_VERSION: u32 = 1;

/// Table des lignes compressée par plages : `(line, run_length)`. Les
/// instructions d'un même appel à `write_op` consécutif sur la même ligne
/// partagent une entrée au lieu d'une ligne par instruction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LineTable {
    runs: Vec<(u32, u32)>,
}

impl LineTable {
    fn push(&mut self, line: u32) {
        match self.runs.last_mut() {
            Some((last_line, count)) if *last_line == line => *count += 1,
            _ => self.runs.push((line, 1)),
        }
    }

    fn line_at(&self, offset: usize) -> u32 {
        let mut remaining = offset;
        for (line, count) in &self.runs {
            let count = *count as usize;
            if remaining < count {
                return *line;
            }
            remaining -= count;
        }
        self.runs.last().map_or(0, |(line, _)| *line)
    }
}

#[derive(Debug)]
pub struct Chunk {
    pub name: Option<ObjRef>,
    ops: Vec<Op>,
    lines: LineTable,
    constants: Vec<Value>,
}

impl Chunk {
    pub fn new(name: Option<ObjRef>) -> Self {
        Self { name, ops: Vec::new(), lines: LineTable::default(), constants: Vec::new() }
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn line_at(&self, offset: usize) -> u32 {
        self.lines.line_at(offset)
    }

    pub fn approx_size(&self) -> usize {
        self.ops.len() * std::mem::size_of::<Op>() + self.constants.len() * std::mem::size_of::<Value>()
    }

    pub fn write_op(&mut self, op: Op, line: u32) -> usize {
        self.ops.push(op);
        self.lines.push(line);
        self.ops.len() - 1
    }

    /// Ajoute `value` au pool et retourne son indice. Erreur si le pool
    /// dépasse ce que `OP_CONSTANT_LONG` peut adresser (2^24 entrées).
    pub fn add_constant(&mut self, value: Value) -> Result<u32, ChunkError> {
        if self.constants.len() >= (1 << 24) {
            return Err(ChunkError::TooManyConstants);
        }
        self.constants.push(value);
        Ok(self.constants.len() as u32 - 1)
    }

    /// Émet `OP_CONSTANT` si l'indice tient sur un octet, sinon
    /// `OP_CONSTANT_LONG` — la frontière testable à 256 constantes.
    pub fn write_constant(&mut self, value: Value, line: u32) -> Result<usize, ChunkError> {
        let idx = self.add_constant(value)?;
        if let Ok(byte_idx) = u8::try_from(idx) {
            Ok(self.write_op(Op::Constant(byte_idx), line))
        } else {
            Ok(self.write_op(Op::ConstantLong(idx), line))
        }
    }

    pub fn emit_jump(&mut self, make: impl FnOnce(u16) -> Op, line: u32) -> usize {
        self.write_op(make(0), line)
    }

    /// Rétro-patche l'instruction de saut émise à `offset` pour qu'elle
    /// pointe juste après la dernière instruction écrite.
    pub fn patch_jump(&mut self, offset: usize) -> Result<(), ChunkError> {
        let distance = self.ops.len() - offset - 1;
        let distance: u16 = distance.try_into().map_err(|_| ChunkError::JumpTooFar)?;
        match &mut self.ops[offset] {
            Op::Jump(d) | Op::JumpIfFalse(d) => *d = distance,
            other => unreachable!("patch_jump on non-jump op {:?}", other),
        }
        Ok(())
    }

    pub fn emit_loop(&mut self, loop_start: usize, line: u32) -> Result<(), ChunkError> {
        let distance = self.ops.len() - loop_start + 1;
        let distance: u16 = distance.try_into().map_err(|_| ChunkError::LoopBodyTooLarge)?;
        self.write_op(Op::Loop(distance), line);
        Ok(())
    }

    pub fn disassemble(&self, heap: &Heap, name: &str) -> String {
        crate::disasm::disassemble_chunk(self, heap, name)
    }

    pub fn to_bytes(&self, heap: &Heap) -> Result<Vec<u8>, ChunkError> {
        let serialized = SerializedChunk::from_chunk(self, heap);
        let payload = bincode::serialize(&serialized)?;
        let hash = crate::heap::fnv1a_hash(&payload);
        let mut out = Vec::with_capacity(4 + 4 + 4 + payload.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&hash.to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8], heap: &mut Heap) -> Result<Chunk, ChunkError> {
        if bytes.len() < 12 || &bytes[0..4] != MAGIC {
            return Err(ChunkError::BadMagic);
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(ChunkError::VersionMismatch { expected: FORMAT_VERSION, found: version });
        }
        let expected_hash = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let payload = &bytes[12..];
        if crate::heap::fnv1a_hash(payload) != expected_hash {
            return Err(ChunkError::HashMismatch);
        }
        let serialized: SerializedChunk = bincode::deserialize(payload)?;
        Ok(serialized.into_chunk(heap))
    }
}

/// Forme portable d'une constante : possède son contenu (chaîne, sous-chunk
/// de fonction imbriquée) au lieu de pointer dans un `Heap` qui n'existe pas
/// encore côté lecture.
#[derive(Debug, Serialize, Deserialize)]
enum SerializedConst {
    Nil,
    Bool(bool),
    Number(f64),
    Str(String),
    Function { name: Option<String>, arity: u8, upvalue_count: u8, chunk: SerializedChunk },
}

#[derive(Debug, Serialize, Deserialize)]
struct SerializedChunk {
    name: Option<String>,
    ops: Vec<Op>,
    lines: LineTable,
    constants: Vec<SerializedConst>,
}

impl SerializedChunk {
    fn from_chunk(chunk: &Chunk, heap: &Heap) -> Self {
        Self {
            name: chunk.name.map(|r| heap.as_string(r).to_string()),
            ops: chunk.ops.clone(),
            lines: chunk.lines.clone(),
            constants: chunk.constants.iter().map(|v| SerializedConst::from_value(*v, heap)).collect(),
        }
    }

    fn into_chunk(self, heap: &mut Heap) -> Chunk {
        let name = self.name.map(|s| heap.intern(&s));
        let constants = self.constants.into_iter().map(|c| c.into_value(heap)).collect();
        Chunk { name, ops: self.ops, lines: self.lines, constants }
    }
}

impl SerializedConst {
    fn from_value(value: Value, heap: &Heap) -> Self {
        match value {
            Value::Nil => SerializedConst::Nil,
            Value::Bool(b) => SerializedConst::Bool(b),
            Value::Number(n) => SerializedConst::Number(n),
            Value::Obj(r) => match heap.get(r) {
                crate::object::Obj::String(s) => SerializedConst::Str(s.chars.clone()),
                crate::object::Obj::Function(f) => SerializedConst::Function {
                    name: f.name.map(|n| heap.as_string(n).to_string()),
                    arity: f.arity,
                    upvalue_count: f.upvalue_count,
                    chunk: SerializedChunk::from_chunk(&f.chunk, heap),
                },
                other => unreachable!("non-constant object kind in chunk: {}", other.kind_name()),
            },
        }
    }

    fn into_value(self, heap: &mut Heap) -> Value {
        match self {
            SerializedConst::Nil => Value::Nil,
            SerializedConst::Bool(b) => Value::Bool(b),
            SerializedConst::Number(n) => Value::Number(n),
            SerializedConst::Str(s) => Value::Obj(heap.intern(&s)),
            SerializedConst::Function { name, arity, upvalue_count, chunk } => {
                let name_ref = name.map(|s| heap.intern(&s));
                let mut f = LFunction::new(name_ref);
                f.arity = arity;
                f.upvalue_count = upvalue_count;
                f.chunk = chunk.into_chunk(heap);
                Value::Obj(heap.alloc_function(f))
            }
        }
    }
}

// Référencé par `Closure` lors du désassemblage d'upvalues capturées.
pub(crate) fn describe_upvalues(caps: &[UpvalueCapture]) -> String {
    caps.iter()
        .map(|c| format!("{}{}", if c.is_local { "local " } else { "upvalue " }, c.index))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_constant_switches_to_long_form_past_256() {
        let mut chunk = Chunk::new(None);
        for i in 0..256 {
            chunk.write_constant(Value::Number(f64::from(i)), 1).unwrap();
        }
        assert!(matches!(chunk.ops()[0], Op::Constant(_)));
        let op_256 = chunk.write_constant(Value::Number(256.0), 1).unwrap();
        assert!(matches!(chunk.ops()[op_256], Op::ConstantLong(_)));
    }

    #[test]
    fn line_table_runs_collapse_repeats() {
        let mut chunk = Chunk::new(None);
        chunk.write_op(Op::Nil, 1);
        chunk.write_op(Op::Pop, 1);
        chunk.write_op(Op::Nil, 2);
        assert_eq!(chunk.line_at(0), 1);
        assert_eq!(chunk.line_at(1), 1);
        assert_eq!(chunk.line_at(2), 2);
    }

    #[test]
    fn jump_too_far_is_reported() {
        let mut chunk = Chunk::new(None);
        let offset = chunk.emit_jump(Op::Jump, 1);
        for _ in 0..70_000 {
            chunk.write_op(Op::Pop, 1);
        }
        assert!(matches!(chunk.patch_jump(offset), Err(ChunkError::JumpTooFar)));
    }

    #[test]
    fn round_trips_through_bytes() {
        let mut heap = Heap::new();
        let mut chunk = Chunk::new(None);
        let s = heap.intern("hi");
        chunk.write_constant(Value::Obj(s), 1).unwrap();
        chunk.write_op(Op::Print, 1);
        chunk.write_op(Op::Return, 2);
        let bytes = chunk.to_bytes(&heap).unwrap();
        let mut heap2 = Heap::new();
        let restored = Chunk::from_bytes(&bytes, &mut heap2).unwrap();
        assert_eq!(restored.ops().len(), chunk.ops().len());
        assert_eq!(restored.line_at(2), 2);
    }
}
