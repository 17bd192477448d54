use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Default, Parser)]
#[command(version)]
pub struct Cli {
    /// Model slug sent to the completions endpoint.
    #[arg(long, short = 'm')]
    pub model: Option<String>,

    /// Base URL of the OpenAI-compatible API, e.g. https://api.openai.com/v1.
    #[arg(long)]
    pub base_url: Option<String>,

    /// API key. Falls back to config.toml, then $QUILL_API_KEY.
    #[arg(long)]
    pub api_key: Option<String>,

    /// Requested continuation length in characters (20-200).
    #[arg(long)]
    pub length: Option<u16>,

    /// Draft file to edit. Defaults to $QUILL_HOME/draft.md.
    pub draft: Option<PathBuf>,
}
