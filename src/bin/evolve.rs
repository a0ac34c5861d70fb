use std::path::PathBuf;
use std::time::Duration;

use clap::{Arg, Command};
use rand::rngs::StdRng;
use rand::SeedableRng;

use hce_tuner::config::{load_opening_fens, TunerConfig};
use hce_tuner::engine::SearchLimit;
use hce_tuner::population::Population;
use hce_tuner::tournament::{fitness, summarize, Tournament, UciGamePlayer};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("evolve")
        .about("Evolve engine evaluation weights by tournament selection")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .default_value("tuner.json")
                .help("Path to the tuner configuration file"),
        )
        .arg(
            Arg::new("cycles")
                .long("cycles")
                .value_name("N")
                .value_parser(clap::value_parser!(usize))
                .help("Override the number of training cycles"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("N")
                .value_parser(clap::value_parser!(u64))
                .help("Seed the random number generator for a reproducible run"),
        )
        .get_matches();

    let config_path = PathBuf::from(matches.get_one::<String>("config").unwrap());
    let config = TunerConfig::load(&config_path)?;
    config.validate()?;

    let cycles = matches
        .get_one::<usize>("cycles")
        .copied()
        .unwrap_or(config.training_cycles);

    let mut rng = match matches.get_one::<u64>("seed") {
        Some(seed) => StdRng::seed_from_u64(*seed),
        None => StdRng::from_entropy(),
    };

    let openings = load_opening_fens(&config.openings_path)?;
    println!(
        "Loaded {} openings, population of {}, {} cycles",
        openings.len(),
        config.population_size,
        cycles
    );

    let mut population = Population::new(config.population_size)?;
    population.initialize(
        config.mutation_rate,
        config.mutation_magnitude,
        config.initial_model.as_deref(),
        &config.model_dir,
        &mut rng,
    )?;

    let player = UciGamePlayer {
        engine_path: config.engine_path.clone(),
        limit: SearchLimit::Depth(config.game_depth),
        read_timeout: Duration::from_millis(config.read_timeout_ms),
        max_moves: config.max_moves,
    };
    let tournament = Tournament::new(
        player,
        openings,
        config.panel_size,
        config.tournament_threads,
        config.model_dir.clone(),
    )?;

    for cycle in 0..cycles {
        println!("=== Cycle {}/{} ===", cycle + 1, cycles);
        let records = tournament.run(&population, config.games_per_pairing)?;
        println!("{}", summarize(&records));

        let scores = fitness(&records, population.len());
        population.create_next_generation(
            &scores,
            config.mutation_rate,
            config.mutation_magnitude,
            &mut rng,
        )?;
        population.save_all(&config.model_dir)?;
    }

    println!("Training complete, models saved to {}", config.model_dir.display());
    Ok(())
}
