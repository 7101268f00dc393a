//! lumen-compiler — scanner + compilateur Pratt en une passe pour le
//! langage Lumen. Aucun AST intermédiaire : `compile` émet directement dans
//! le `Chunk` de la fonction de script top-level, à travers l'arène
//! `Heap` qui lui est passée explicitement.

mod compiler;
mod scanner;
mod token;

use lumen_core::{Heap, ObjRef};

/// Compile `source`. Les erreurs de compilation sont imprimées sur stderr
/// (`[line N] Error ...`, format spec.md §4.4/§7) plutôt que remontées en
/// `Result` : un script avec erreurs de syntaxe n'a pas de valeur à renvoyer,
/// seulement des diagnostics, exactement comme l'implémentation originale.
pub fn compile(source: &str, heap: &mut Heap) -> Option<ObjRef> {
    compiler::Compiler::compile(source, heap)
}

pub use scanner::Scanner;
pub use token::{Token, TokenKind};
