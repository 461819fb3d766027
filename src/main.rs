fn main() {
    if let Err(err) = calm_rs_visualizer::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
