fn main() {
    if let Err(err) = student_ingest::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
