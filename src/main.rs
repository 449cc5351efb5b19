use std::process::ExitCode;

fn main() -> ExitCode {
    zimfiction::cli::main()
}
