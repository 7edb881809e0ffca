use std::process::ExitCode;

fn main() -> ExitCode {
    mailbrief_cli::run()
}
