use std::time::Instant;

use clap::Parser;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use robin_hood_map::DefaultHashBuilder;
use robin_hood_map::HashMap;

/// Fills a map with random keys, reports its layout, then empties it again.
#[derive(Parser, Debug)]
struct Args {
    /// Number of keys to insert, as a power of two.
    #[arg(short = 'l', long = "log2_count", default_value_t = 20)]
    log2_count: u32,

    /// Requested initial capacity; 0 selects the default.
    #[arg(short = 'c', long = "initial_capacity", default_value_t = 0)]
    initial_capacity: usize,

    /// Seed for the key generator.
    #[arg(short = 's', long = "seed", default_value_t = 0x5eed)]
    seed: u64,
}

fn main() {
    let args = Args::parse();
    let count = 1usize << args.log2_count;

    let mut map: HashMap<u64, u64, DefaultHashBuilder> =
        HashMap::with_capacity(args.initial_capacity);
    println!(
        "Inserting {count} keys, starting from {} slots",
        map.capacity()
    );

    let mut rng = SmallRng::seed_from_u64(args.seed);
    let keys: Vec<u64> = (0..count).map(|_| rng.random()).collect();

    let start = Instant::now();
    let mut failures = 0usize;
    for &key in &keys {
        if map.set(key, !key).is_err() {
            failures += 1;
        }
    }
    println!("Inserted {} keys in {:?}", map.len(), start.elapsed());

    map.debug_stats().print();
    map.print_probe_histogram();

    let start = Instant::now();
    let mut missing = 0usize;
    for key in &keys {
        if map.get(key) != Some(&!key) {
            missing += 1;
        }
    }
    println!("Looked up {count} keys in {:?}", start.elapsed());

    let start = Instant::now();
    for key in &keys {
        if map.unset(key).is_err() {
            failures += 1;
        }
    }
    println!(
        "Removed every key in {:?}; {} slots remain",
        start.elapsed(),
        map.capacity()
    );

    println!("Failed operations: {failures}, missing keys: {missing}");
}
