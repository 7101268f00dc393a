//! lumen-cli — point d'entrée processus : pilote un fichier script ou une
//! REPL au-dessus d'un `Heap`/`Vm` partagés, ou désassemble un script sans
//! l'exécuter.
//!
//! Pas de système de projet/manifest : Lumen n'a ni modules ni dépendances
//! externes, donc un simple chemin de script suffit.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use lumen_core::Heap;
use lumen_vm::{InterpretResult, Vm};

/// Code de sortie pour les erreurs CLI (chemin invalide, lecture échouée) —
/// `sysexits.h`'s `EX_IOERR`, distinct du contrat langage 0/65/70 qui reste
/// entièrement porté par `InterpretResult::exit_code`.
const EXIT_IO_ERROR: i32 = 74;

#[derive(Parser, Debug)]
#[command(name = "lumen", version, about = "Lumen bytecode interpreter")]
struct Cli {
    /// Script à exécuter. Absent : démarre une REPL.
    script: Option<PathBuf>,

    /// Désassemble le script au lieu de l'exécuter.
    #[arg(short = 'd', long = "disassemble")]
    disassemble: bool,

    /// Trace chaque instruction exécutée (nécessite le binaire compilé avec
    /// la feature `trace-execution`).
    #[arg(long)]
    trace: bool,

    /// Force une collecte GC à chaque allocation (nécessite la feature
    /// `gc-stress`).
    #[arg(long = "stress-gc")]
    stress_gc: bool,
}

/// Point d'entrée appelé par `main`. Renvoie le code de sortie du processus.
pub fn run() -> i32 {
    run_from_args(std::env::args_os())
}

/// Même chose que [`run`] mais à partir d'une liste d'arguments explicite —
/// `clap::Parser::parse_from` plutôt que `Cli::parse()` pour rester testable
/// sans dépendre de `std::env::args`.
pub fn run_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    if cli.trace && !cfg!(feature = "trace-execution") {
        eprintln!(
            "lumen: --trace requested but this binary was built without the `trace-execution` feature; ignoring."
        );
    }
    if cli.stress_gc && !cfg!(feature = "gc-stress") {
        eprintln!(
            "lumen: --stress-gc requested but this binary was built without the `gc-stress` feature; ignoring."
        );
    }

    match &cli.script {
        Some(path) => match run_file(path, cli.disassemble) {
            Ok(code) => code,
            Err(err) => {
                eprintln!("lumen: {err:#}");
                EXIT_IO_ERROR
            }
        },
        None => run_repl(),
    }
}

fn run_file(path: &Path, disassemble: bool) -> Result<i32> {
    let source = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut heap = Heap::new();

    if disassemble {
        let Some(function_ref) = lumen_compiler::compile(&source, &mut heap) else {
            return Ok(InterpretResult::CompileError.exit_code());
        };
        let function = heap.as_function(function_ref);
        println!("{}", function.chunk.disassemble(&heap, &path.display().to_string()));
        return Ok(InterpretResult::Ok.exit_code());
    }

    let mut vm = Vm::new(&mut heap);
    Ok(vm.interpret(&source, &mut heap).exit_code())
}

/// Boucle REPL : chaque ligne est compilée et exécutée comme son propre
/// script top-level, mais sur le même `Heap`/`Vm`, donc les globales
/// (`var`/`fun`/`class`) survivent d'une ligne à l'autre — comportement du
/// livre, cf. spec.md §6/SPEC_FULL.md §6.
fn run_repl() -> i32 {
    let mut heap = Heap::new();
    let mut vm = Vm::new(&mut heap);
    let stdin = io::stdin();

    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }
        let mut line = String::new();
        match stdin.read_line(&mut line) {
            Ok(0) => break, // EOF (Ctrl+D)
            Ok(_) => {
                let _ = vm.interpret(&line, &mut heap);
            }
            Err(err) => {
                eprintln!("lumen: {err}");
                break;
            }
        }
    }
    InterpretResult::Ok.exit_code()
}
