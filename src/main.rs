use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init(); // Log to stderr, e.g. `RUST_LOG=debug fcsfit fit ...`.

    match fcs_fit::app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
