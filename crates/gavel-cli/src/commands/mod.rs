pub mod generate;
pub mod judge;

use crate::cli::{Cli, Command};

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.cmd {
        Command::Generate(args) => generate::run(&args).await,
        Command::Judge(args) => judge::run(&args).await,
    }
}
