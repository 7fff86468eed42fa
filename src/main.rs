use multibeam::core::providers::ProviderResolutionError;

fn main() {
    if let Err(err) = multibeam::cli::main() {
        eprintln!("{err}");
        if let Some(resolution) = err.downcast_ref::<ProviderResolutionError>() {
            eprintln!();
            eprintln!("Quick fixes:");
            for fix in resolution.quick_fixes() {
                eprintln!("  {fix}");
            }
            std::process::exit(resolution.exit_code());
        }
        std::process::exit(1);
    }
}
