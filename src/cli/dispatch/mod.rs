use crate::cli::{actions::Action, config::Config};
use anyhow::Result;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let config = Config::from_matches(matches)?;

    Ok(Action::Server { config })
}
