use camino::Utf8PathBuf;
use clap::Parser;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineArgs {
    /// Path to the format spec describing the data's layout
    pub spec: Utf8PathBuf,

    /// Path to the binary file to interpret
    pub data: Utf8PathBuf,

    /// Evaluate an expression against the tree instead of dumping it
    /// (may be given several times)
    #[arg(short, long = "eval")]
    pub eval: Vec<String>,

    /// Dump the tree as JSON instead of indented text
    #[arg(long)]
    pub json: bool,

    /// Limit how many elements of each array are dumped (0 for no limit)
    #[arg(long, default_value_t = 64)]
    pub limit: usize,

    /// Increase logging verbosity level (0: warn; 1: info; 2: debug; 3: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
