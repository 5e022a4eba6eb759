fn main() {
    spectro_pipeline::cli::run();
}
