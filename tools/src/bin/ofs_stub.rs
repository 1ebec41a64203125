//! ofs-stub: stand-in for the orbital federates simulator.
//!
//! Accepts the real simulator's argument vector
//!   <script> <token>... -d <turns> -s <seed> -o <oAlg> -f <fAlg>
//! and prints one `<start>:<end>` cash line per player named in the tokens.
//! Output depends only on the seed, the turn count and the player count.

use anyhow::{bail, Context, Result};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use std::collections::BTreeSet;
use std::env;

const START_CASH: f64 = 1200.0;

struct StubArgs {
    players: usize,
    turns:   u32,
    seed:    u64,
}

fn parse(args: &[String]) -> Result<StubArgs> {
    let mut players = BTreeSet::new();
    let (mut turns, mut seed) = (24u32, 0u64);

    // args[0] is the program, args[1] the script reference.
    let mut rest = args.iter().skip(2);
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "-d" => turns = next_value(&mut rest, "-d")?,
            "-s" => seed = next_value(&mut rest, "-s")?,
            "-o" | "-f" => {
                rest.next();
            }
            token => {
                let (player, _) = token
                    .split_once('.')
                    .filter(|_| token.contains('@'))
                    .with_context(|| format!("unrecognised argument '{token}'"))?;
                players.insert(player.to_string());
            }
        }
    }

    if players.is_empty() {
        bail!("no federate tokens given");
    }
    Ok(StubArgs { players: players.len(), turns, seed })
}

fn next_value<'a, T: std::str::FromStr>(rest: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<T> {
    rest.next()
        .and_then(|v| v.parse().ok())
        .with_context(|| format!("{flag} needs a numeric value"))
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let stub = parse(&args)?;

    let mut rng = Pcg64Mcg::seed_from_u64(stub.seed);
    for _ in 0..stub.players {
        let delta: f64 = (0..stub.turns).map(|_| rng.gen_range(-40.0f64..60.0)).sum();
        let end = ((START_CASH + delta) * 100.0).round() / 100.0;
        println!("{START_CASH}:{end}");
    }
    Ok(())
}
