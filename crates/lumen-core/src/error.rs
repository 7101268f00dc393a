//! error.rs — erreurs de bas niveau exposées par `lumen-core`.
//!
//! Ce ne sont pas des erreurs de compilation/exécution du langage (celles-ci
//! restent un canal diagnostics + `panic_mode`, pas un `Result`, per
//! spec.md §4.4/§7) — seulement les conditions qu'une bibliothèque doit
//! signaler : dépassement de capacité du bytecode, chunk persisté corrompu.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("Too many constants in one chunk.")]
    TooManyConstants,
    #[error("Too much code to jump over.")]
    JumpTooFar,
    #[error("Loop body too large.")]
    LoopBodyTooLarge,
    #[error("not a valid lumen chunk (bad magic)")]
    BadMagic,
    #[error("chunk format version {found} is not supported (expected {expected})")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("chunk data is corrupt (hash mismatch)")]
    HashMismatch,
    #[error("failed to (de)serialize chunk: {0}")]
    Codec(#[from] Box<bincode::ErrorKind>),
}
