use std::process::ExitCode;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    helpdesk_cli::run()
}
