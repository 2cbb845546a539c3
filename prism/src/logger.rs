use std::str::FromStr;

use crate::args::Args;

pub(crate) fn init(args: &Args) {
    let level = log::LevelFilter::from_str(&args.log).unwrap_or_else(|_| {
        eprintln!("Unknown log level '{}', defaulting to info", args.log);
        log::LevelFilter::Info
    });

    logforth::builder()
        .dispatch(|dispatch| {
            dispatch
                .filter(level)
                .append(logforth::append::Stderr::default())
        })
        .apply();
}
