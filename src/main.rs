use std::process::ExitCode;

use ascension::cli;

fn main() -> ExitCode {
    cli::run()
}
