//! lumen-cli/src/main.rs
//!
//! Point d'entrée du binaire `lumen`. Prépare l'environnement (rapports
//! d'erreurs stylés, tracing) puis délègue toute la logique à
//! `lumen_cli::run()`, qui reste testable en unité (`cargo test -p lumen-cli`).

fn main() {
    if let Err(e) = color_eyre::install() {
        eprintln!("warning: could not install color-eyre: {e}");
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    std::process::exit(lumen_cli::run());
}
