use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "strand")]
#[command(about = "Strand - provider stream adapter and conversation log reducer", long_about = None)]
pub(crate) struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    pub(crate) config: Option<PathBuf>,
    #[arg(long = "log-level", global = true)]
    pub(crate) log_level: Option<String>,
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    #[command(about = "Convert canonical messages to provider wire messages")]
    Convert {
        #[arg(value_name = "MESSAGES")]
        messages: PathBuf,
        #[arg(short = 'p', long)]
        provider: Option<String>,
        #[arg(short = 's', long)]
        system: Option<String>,
    },
    #[command(about = "Convert tool definitions to provider tool schemas")]
    Schema {
        #[arg(value_name = "TOOLS")]
        tools: PathBuf,
    },
    #[command(about = "Normalize a recorded provider stream and assemble tool calls")]
    Normalize {
        #[arg(value_name = "PARTS")]
        parts: PathBuf,
        #[arg(short = 'p', long)]
        provider: Option<String>,
        #[arg(long, default_value = "parts")]
        input: StreamInput,
    },
    #[command(about = "Reduce a conversation log to timeline, usage and tool usage")]
    Reduce {
        #[arg(value_name = "EVENTS")]
        events: PathBuf,
        #[arg(long, default_value_t = false)]
        resumed: bool,
    },
}

/// Shape of the file given to `normalize`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum StreamInput {
    /// One stream part JSON object per line.
    Parts,
    /// Raw OpenAI-compatible chat-completions SSE body.
    OpenaiSse,
    /// Raw Anthropic Messages SSE body.
    AnthropicSse,
}
