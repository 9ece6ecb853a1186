use std::process::ExitCode;

fn main() -> ExitCode {
    match summitd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("summitd: {error}");
            ExitCode::FAILURE
        }
    }
}
