//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use clap::App;
use clap::Arg;
use log::info;
use rand::distributions;
use rand::thread_rng;
use rand::Rng;

pub mod gen {
    use super::*;
    use rand::prelude::SliceRandom;
    use rayon::iter::IntoParallelIterator;
    use rayon::iter::ParallelIterator;

    /// Key columns of one generated row: `(id, idx)`
    pub type Key = (String, u32);

    /// Every party gets `shared` in full, plus `unique_size` keys of its own
    pub fn random_keys(parties: usize, unique_size: usize, shared_size: usize) -> Vec<Vec<Key>> {
        let shared = par_random_keys(shared_size);
        let mut rng = rand::thread_rng();
        (0..parties)
            .map(|_| {
                let mut keys = par_random_keys(unique_size);
                keys.extend_from_slice(&shared);
                keys.shuffle(&mut rng);
                keys
            })
            .collect::<Vec<_>>()
    }

    pub fn par_random_keys(size: usize) -> Vec<Key> {
        (0..size)
            .into_par_iter()
            .map(|_| (random_string(16), thread_rng().gen()))
            .collect::<Vec<Key>>()
    }

    /// Dummy random strings for the id column
    ///
    /// Uses ThreadRng which carries the CryptoRng marker.
    fn random_string(size: usize) -> String {
        thread_rng()
            .sample_iter(&distributions::Alphanumeric)
            .take(size)
            .map(char::from)
            .collect()
    }

    pub fn write_keys_to_file(keys: &[Key], cols: usize, path: &str) -> Result<(), csv::Error> {
        use indicatif::ProgressBar;

        let mut wr = csv::WriterBuilder::new()
            .buffer_capacity(1024)
            .from_path(path)?;

        let mut header = vec![String::from("id"), String::from("idx")];
        header.extend((0..cols).map(|c| format!("col_{}", c)));
        wr.write_record(&header)?;

        let progress_bar = ProgressBar::new(keys.len() as u64);
        let mut rng = thread_rng();
        for (i, (id, idx)) in keys.iter().enumerate() {
            let mut buf: Vec<String> = Vec::with_capacity(2 + cols);
            buf.push(id.clone());
            buf.push(idx.to_string());
            for _ in 0..cols {
                buf.push(format!("{}", rng.gen::<u32>()));
            }
            wr.write_record(&buf)?;
            if i % 100 == 0 {
                progress_bar.inc(100);
            }
        }
        progress_bar.finish();
        wr.flush()?;
        Ok(())
    }
}

fn main() {
    env_logger::init();

    let matches = App::new("PSI test data")
        .version("0.1")
        .about("Generates per-party CSV inputs with a shared key subset")
        .arg(
            Arg::with_name("dir")
                .short("d")
                .long("dir")
                .value_name("DIR")
                .help("output dir")
                .takes_value(true)
                .default_value("./"),
        )
        .arg(
            Arg::with_name("size")
                .short("n")
                .long("size")
                .value_name("SIZE")
                .help("rows per party")
                .takes_value(true)
                .default_value("10"),
        )
        .arg(
            Arg::with_name("parties")
                .short("p")
                .long("parties")
                .value_name("PARTIES")
                .help("number of parties")
                .takes_value(true)
                .possible_values(&["2", "3"])
                .default_value("2"),
        )
        .arg(
            Arg::with_name("cols")
                .short("c")
                .long("cols")
                .value_name("COLS")
                .help("extra columns")
                .takes_value(true)
                .default_value("0"),
        )
        .get_matches();

    let size = matches
        .value_of("size")
        .unwrap_or("10")
        .parse::<usize>()
        .expect("size param");
    let parties = matches
        .value_of("parties")
        .unwrap_or("2")
        .parse::<usize>()
        .expect("parties param");
    let cols = matches
        .value_of("cols")
        .unwrap_or("0")
        .parse::<usize>()
        .expect("cols param");
    let dir = matches.value_of("dir").unwrap_or("./");

    let shared = size / 2;
    info!(
        "Generating {} parties of size {}, {} shared keys",
        parties, size, shared
    );
    let data = gen::random_keys(parties, size - shared, shared);

    for (rank, keys) in data.iter().enumerate() {
        let path = format!("{}/input_{}_size_{}_cols_{}.csv", dir, rank, size, cols);
        gen::write_keys_to_file(keys, cols, &path).expect("write input");
        info!("File {} finished", path);
    }

    info!("Bye!");
}
