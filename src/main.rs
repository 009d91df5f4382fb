use std::process::ExitCode;

fn main() -> ExitCode {
    match ifrs9_ecl::app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
