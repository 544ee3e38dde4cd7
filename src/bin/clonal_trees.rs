use std::process::exit;

use structopt::StructOpt;

use clonal_trees::cli::{run, ClonalTrees};

pub fn main() {
    let opt = ClonalTrees::from_args();

    fern::Dispatch::new()
        .level(log::LevelFilter::Info)
        .chain(std::io::stderr())
        .apply()
        .unwrap();

    exit(match run(opt) {
        Err(e) => {
            println!("Error: {}", e);
            1
        }
        _ => 0,
    })
}
