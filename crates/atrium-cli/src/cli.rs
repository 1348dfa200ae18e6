use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "atrium",
    about = "Atrium: inspect pipeline sessions, projects and workfiles",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the session read from the environment
    Session(SessionArgs),
    /// List projects in the configured database
    Projects(ProjectsArgs),
    /// Resolve project/asset/subset/version/representation names to an id
    Locate(LocateArgs),
    /// Find the latest workfile in a directory, or the name of the first one
    Workfile(WorkfileArgs),
}

#[derive(Args)]
pub struct SessionArgs {
    /// Leave out the context keys (project, asset, task, ...)
    #[arg(long)]
    pub global_only: bool,
}

#[derive(Args)]
pub struct ProjectsArgs {}

#[derive(Args)]
pub struct LocateArgs {
    /// Names from the project down. A version of `latest` or `-1` picks the
    /// latest version.
    #[arg(required = true, num_args = 1..=5)]
    pub components: Vec<String>,
}

#[derive(Args)]
pub struct WorkfileArgs {
    #[arg(long)]
    pub workdir: String,
    /// File name template, e.g. `{asset}_{task}_v{version:0>3}<_{comment}>.{ext}`
    #[arg(long)]
    pub template: String,
    /// Accepted extensions, repeatable
    #[arg(long = "ext", required = true)]
    pub extensions: Vec<String>,
    /// Template data as `key=value`; dotted keys nest
    #[arg(long = "data")]
    pub data: Vec<String>,
    /// Print the full path instead of the file name
    #[arg(long)]
    pub full_path: bool,
}
