use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::loader::{DEFAULT_DELIMITER, DEFAULT_SOURCE_URI};
use crate::model::Term;
use crate::qvalue::Pi0Method;

pub const DEFAULT_Q_THRESHOLD: f64 = 0.01;
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_REPORT_DIR: &str = ".cache/tidyfit";

#[derive(Parser, Debug)]
#[command(
    name = "tidyfit",
    version,
    about = "Tidy per-gene growth-rate regressions with q-value filtering"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Tidy(TidyArgs),
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    #[arg(long, default_value = DEFAULT_SOURCE_URI)]
    pub source: String,

    #[arg(long, default_value_t = DEFAULT_DELIMITER)]
    pub delimiter: char,
}

#[derive(Args, Debug, Clone)]
pub struct TidyArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum TermArg {
    Intercept,
    Slope,
}

impl TermArg {
    pub fn term(self) -> Term {
        match self {
            Self::Intercept => Term::Intercept,
            Self::Slope => Term::Slope,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Pi0MethodArg {
    Smoother,
    Bootstrap,
    Lambda,
    One,
}

impl Pi0MethodArg {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Smoother => "smoother",
            Self::Bootstrap => "bootstrap",
            Self::Lambda => "lambda",
            Self::One => "one",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(long, value_enum, default_value_t = TermArg::Slope)]
    pub term: TermArg,

    #[arg(long, default_value_t = DEFAULT_Q_THRESHOLD)]
    pub q_threshold: f64,

    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    #[arg(long, value_enum, default_value_t = Pi0MethodArg::Smoother)]
    pub pi0_method: Pi0MethodArg,

    #[arg(long, default_value_t = 0.5)]
    pub lambda: f64,

    #[arg(long, default_value = DEFAULT_REPORT_DIR)]
    pub report_dir: PathBuf,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl AnalyzeArgs {
    pub fn pi0_method(&self) -> Pi0Method {
        match self.pi0_method {
            Pi0MethodArg::Smoother => Pi0Method::Smoother,
            Pi0MethodArg::Bootstrap => Pi0Method::Bootstrap,
            Pi0MethodArg::Lambda => Pi0Method::Lambda(self.lambda),
            Pi0MethodArg::One => Pi0Method::One,
        }
    }
}
