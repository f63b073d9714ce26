use std::process::ExitCode;

fn main() -> ExitCode {
    brokerpool::app::startup::startup()
}
