// Copyright 2024 Oxide Computer Company

use clap::Parser;
use stfrun::Outcome;

fn main() {
    let opts = stfrun::Opts::parse();
    let (log, guard) = stfrun::logger(opts.verbose);
    let outcome = match stfrun::run(&opts, &log) {
        Ok(outcome) => outcome,
        Err(e) => {
            println!("{:#}", e);
            Outcome::Failure
        }
    };
    drop(log);
    drop(guard);
    std::process::exit(outcome.code());
}
