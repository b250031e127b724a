use clap::CommandFactory;
use clap::Parser;
use clap::ValueEnum;
use clap::error::ErrorKind;
use flow_hash::HashTable;
#[cfg(feature = "foldhash")]
use flow_hash::hasher::FoldHash;
use flow_hash::hasher::KeyHasher;
use flow_hash::hasher::Xxh3;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Hasher {
    Xxh3,
    Foldhash,
}

#[derive(Parser, Debug)]
struct Args {
    /// Number of distinct flows to insert
    #[arg(short = 'n', long = "flows", default_value_t = 100_000)]
    flows: usize,

    /// Bytes per flow key
    #[arg(short = 'k', long = "key-size", default_value_t = 13)]
    key_size: usize,

    /// Bytes per value
    #[arg(short = 'v', long = "value-size", default_value_t = 16)]
    value_size: usize,

    /// Presize the table for `flows` records instead of growing into it
    #[arg(long)]
    presize: bool,

    #[arg(long, value_enum, default_value_t = Hasher::Xxh3)]
    hasher: Hasher,

    #[arg(long, default_value_t = 0)]
    seed: u64,
}

/// Number of distinct keys of `key_size` bytes, or `None` if it exceeds
/// `usize`.
fn key_space(key_size: usize) -> Option<usize> {
    256usize.checked_pow(u32::try_from(key_size).ok()?)
}

fn fill<H: KeyHasher>(mut table: HashTable<H>, flows: usize, seed: u64) -> HashTable<H> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut key = vec![0u8; table.key_size()];
    let mut duplicates = 0;

    while table.len() < flows {
        rng.fill(&mut key[..]);
        let (existed, mut record) = table.find_or_create(&key);
        if existed {
            duplicates += 1;
        }
        if let Some(first) = record.value_mut().first_mut() {
            *first = first.wrapping_add(1);
        }
    }

    println!("Inserted {} flows ({} duplicate keys drawn)", table.len(), duplicates);
    table
}

fn run<H: KeyHasher>(args: &Args, flows: usize, hasher: H) {
    let table = if args.presize {
        HashTable::with_capacity_and_hasher(args.key_size, args.value_size, flows, hasher)
    } else {
        HashTable::with_hasher(args.key_size, args.value_size, hasher)
    };
    fill(table, flows, args.seed).stats().print();
}

fn main() {
    let args = Args::parse();

    if args.key_size == 0 {
        Args::command()
            .error(ErrorKind::ValueValidation, "--key-size must be at least 1")
            .exit();
    }

    let flows = match key_space(args.key_size) {
        Some(space) if space < args.flows => {
            println!(
                "Only {} distinct {}-byte keys exist, filling {} flows instead of {}",
                space, args.key_size, space, args.flows
            );
            space
        }
        _ => args.flows,
    };

    println!(
        "Filling table: {} flows, {}-byte keys, {}-byte values, hasher {:?}",
        flows, args.key_size, args.value_size, args.hasher
    );

    match args.hasher {
        Hasher::Xxh3 => run(&args, flows, Xxh3),
        #[cfg(feature = "foldhash")]
        Hasher::Foldhash => run(&args, flows, FoldHash::with_seed(args.seed)),
        #[cfg(not(feature = "foldhash"))]
        Hasher::Foldhash => Args::command()
            .error(
                ErrorKind::InvalidValue,
                "--hasher foldhash requires the `foldhash` feature",
            )
            .exit(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_space_bounds_small_keys() {
        assert_eq!(key_space(1), Some(256));
        assert_eq!(key_space(2), Some(65536));
        assert_eq!(key_space(64), None);
    }

    #[test]
    fn fill_saturates_one_byte_keys() {
        let flows = key_space(1).unwrap().min(1000);
        let table = fill(HashTable::new(1, 2), flows, 3);
        assert_eq!(table.len(), 256);
        assert_eq!(table.stats().records, 256);
    }
}
