use std::path::PathBuf;
use std::time::Duration;

use clap::{Arg, Command};

use hce_tuner::config::{load_opening_fens, TunerConfig};
use hce_tuner::dataset::DatasetBuilder;
use hce_tuner::model::WeightModel;
use hce_tuner::trainer::CoordinateTrainer;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("texel")
        .about("Tune evaluation weights by coordinate descent over self-play results")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .default_value("tuner.json")
                .help("Path to the tuner configuration file"),
        )
        .arg(
            Arg::new("iterations")
                .long("iterations")
                .value_name("N")
                .value_parser(clap::value_parser!(usize))
                .help("Cap the number of descent sweeps (default: run to convergence)"),
        )
        .get_matches();

    let config_path = PathBuf::from(matches.get_one::<String>("config").unwrap());
    let config = TunerConfig::load(&config_path)?;
    config.validate()?;
    let iterations = matches.get_one::<usize>("iterations").copied();

    let openings = load_opening_fens(&config.openings_path)?;
    let read_timeout = Duration::from_millis(config.read_timeout_ms);

    let builder = DatasetBuilder {
        engine_path: config.engine_path.clone(),
        openings,
        num_games: config.selfplay_games,
        pool_size: config.dataset_threads,
        movetime_ms: config.selfplay_movetime_ms,
        read_timeout,
        max_moves: config.max_moves,
    };
    builder.run(&config.dataset_path)?;

    let mut model = match &config.initial_model {
        Some(path) => WeightModel::load(path)?,
        None => WeightModel::new(),
    };

    let trainer = CoordinateTrainer::with_engine(
        config.dataset_path.clone(),
        config.model_dir.clone(),
        config.coordinate_delta,
        config.regression_threads,
        config.engine_path.clone(),
        read_timeout,
    )?;
    trainer.run(&mut model, iterations)?;

    let final_path = config.model_dir.join("model_final.txt");
    model.save(&final_path)?;
    println!("Tuned weights saved to {}", final_path.display());
    Ok(())
}
