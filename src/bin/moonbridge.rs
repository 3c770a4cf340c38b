use moonbridge::frontend;

fn main() {
    match frontend::cli_main() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}
