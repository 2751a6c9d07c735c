use anyhow::Result;
use clap::Parser;

use crate::{cmd::Args, init::logger};

pub fn init() -> Result<Args> {
    let args = Args::parse();
    logger::init(args.log_level, args.colored, args.log_file.as_deref())?;
    log::debug!("{:?}", args);
    Ok(args)
}
