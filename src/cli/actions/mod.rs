pub mod server;

use crate::cli::config::Config;

#[derive(Debug, Clone)]
pub enum Action {
    Server { config: Config },
}
