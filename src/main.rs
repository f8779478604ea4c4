fn main() {
    if let Err(err) = lifemap_builder::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
