use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = subburnctl::Cli::parse();
    subburnctl::init_logging(cli.verbosity());
    if let Err(err) = subburnctl::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
