use anyhow::Result;

mod cli;
mod host;
mod interpreter;
mod player;
mod profile;
mod runtime;
mod scheduler;
mod session;
mod state;
#[cfg(test)]
mod test_support;

use cli::Command;

fn main() -> Result<()> {
    env_logger::init();

    match cli::parse()? {
        Command::Boot(args) => runtime::boot(args),
        Command::Movie(args) => runtime::movie(args),
        Command::Db(args) => runtime::db(args),
    }
}
