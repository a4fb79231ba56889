#![forbid(unsafe_code)]

fn main() {
    dgrid_cli::init_tracing();
    if let Err(error) = dgrid_cli::run_from_env() {
        eprintln!("dgrid: {error}");
        std::process::exit(error.exit_code());
    }
}
