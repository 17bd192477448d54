use clap::Parser;
use quill_tui::Cli as TuiCli;

/// Quill CLI
///
/// Opens the interactive manuscript editor; options are forwarded to it.
#[derive(Debug, Parser)]
#[clap(
    author,
    version,
    bin_name = "quill",
    override_usage = "quill [OPTIONS] [DRAFT]"
)]
struct QuillCli {
    #[clap(flatten)]
    interactive: TuiCli,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let QuillCli { interactive } = QuillCli::parse();
    quill_tui::run_main(interactive).await
}
