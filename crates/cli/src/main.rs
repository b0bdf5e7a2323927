use std::process::ExitCode;

fn main() -> ExitCode {
    kasir_cli::run()
}
