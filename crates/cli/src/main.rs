use std::process::ExitCode;

fn main() -> ExitCode {
    mudey_cli::run()
}
