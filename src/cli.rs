use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "ply-testkube", about = "Testkube executor for Ply tests", version)]
pub struct Cli {
    /// Execution request (JSON) from the Testkube runner.
    #[arg(value_name = "EXECUTION")]
    pub execution: Option<String>,

    /// Further positional arguments are ignored.
    #[arg(hide = true)]
    pub rest: Vec<String>,

    /// Runner data directory; tests run from its `repo` subdirectory.
    #[arg(long = "data-dir", env = "RUNNER_DATADIR")]
    pub data_dir: Option<PathBuf>,

    /// Ply engine install to use instead of the bundled `ply`.
    #[arg(long = "ply-path", env = "PLY_PATH")]
    pub ply_path: Option<PathBuf>,
}

impl Cli {
    pub fn try_parse() -> Result<Self, clap::Error> {
        <Self as Parser>::try_parse()
    }
}
