/// Dream CLI
///
/// Loads a compiled world and runs it on the single-threaded proc engine.

use dream_core::cli;

fn main() {
    if let Err(e) = cli::run_cli() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
