//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Grist - incremental parser builder
///
/// Builds a packaged ANTLR parser for a language from a remote grammar.
/// Every step is cached, so repeating a build only redoes what changed.
#[derive(Parser, Debug)]
#[command(name = "grist")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Name of the parsed language, e.g. Java
    #[arg(value_name = "LANGUAGE")]
    pub language: String,

    /// URL of the .g4 grammar (http, https or file)
    #[arg(value_name = "GRAMMAR_URL")]
    pub grammar_url: String,

    /// Java package of the generated parser (empty for the default package)
    #[arg(short, long, default_value = "parser")]
    pub package: String,

    /// Directory for the compiled class files
    #[arg(long, value_name = "DIR")]
    pub target_dir: Option<PathBuf>,

    /// Output path of the parser archive
    #[arg(long, value_name = "FILE")]
    pub target_jar: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, env = "GRIST_CONFIG")]
    pub config: Option<PathBuf>,

    /// State directory holding the result store, work dirs and downloads
    #[arg(long, value_name = "DIR", env = "GRIST_HOME")]
    pub state_dir: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}
