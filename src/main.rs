fn main() {
    if let Err(err) = energy_explorer::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
