use log::warn;

use clap::Parser;
use snafu::ErrorCompat;

mod args;
mod eml;

use crate::eml::config_reader::TallyConfig;

fn empty_config() -> TallyConfig {
    TallyConfig {
        election_id: String::new(),
        data_folder: None,
        total_seats: None,
        output_path: None,
        reference_path: None,
        include_candidates: None,
    }
}

fn main() {
    let args = args::Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let mut config = match &args.config {
        Some(path) => match eml::config_reader::read_config(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Could not read config file {}: {}", path, e);
                std::process::exit(2);
            }
        },
        None => empty_config(),
    };

    // Command line flags win over the config file.
    if let Some(id) = args.election_id {
        config.election_id = id;
    }
    if let Some(dir) = args.data_dir {
        config.data_folder = Some(dir);
    }
    if let Some(seats) = args.seats {
        config.total_seats = Some(seats);
    }
    if let Some(out) = args.out {
        config.output_path = Some(out);
    }
    if args.candidates {
        config.include_candidates = Some(true);
    }
    let reference = args.reference.or_else(|| config.reference_path.clone());

    if config.election_id.trim().is_empty() {
        eprintln!("No election id given. Use --election-id or a config file.");
        std::process::exit(2);
    }

    if let Err(e) = eml::run_tally(config, reference) {
        warn!("Error occured {:?}", e);
        eprintln!("An error occured {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
