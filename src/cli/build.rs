//! The build command

use crate::cli::Cli;
use crate::config::{Config, ConfigManager};
use crate::error::GristResult;
use crate::pipeline::ParserRequest;
use tracing::{debug, info};

/// Build the parser requested on the command line
///
/// The archive path is the only thing written to stdout.
pub async fn execute(cli: &Cli, config: &Config) -> GristResult<()> {
    let request = ParserRequest::parse(&cli.language, &cli.grammar_url)?
        .with_package(cli.package.trim())
        .with_target_dir(cli.target_dir.clone())
        .with_target_archive(cli.target_jar.clone());

    let state = ConfigManager::state_dirs(config, cli.state_dir.clone());
    debug!("Using state directory {}", state.root().display());

    let archive = crate::build(config, &state, &request).await?;

    info!("Built {} parser", request.language);
    println!("{}", archive.display());
    Ok(())
}
