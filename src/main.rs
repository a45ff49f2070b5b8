fn main() {
    if let Err(err) = db_encoder::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
