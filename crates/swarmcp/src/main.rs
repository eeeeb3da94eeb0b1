fn main() {
    let code = swarmcp_cli::run().unwrap_or_else(|error| {
        eprintln!("error: {error:#}");
        1
    });
    std::process::exit(code);
}
