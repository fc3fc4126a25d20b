use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use imaged_image::{Color, SampleType};

#[derive(Parser)]
#[command(name = "imaged", about = "Embedded image store and server", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store root directory [default: .]
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,

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
    /// List entries
    List,
    /// Show an entry's metadata
    Get(KeyArgs),
    /// Create a zero-filled entry
    Set(SetArgs),
    /// Remove an entry
    Remove(KeyArgs),
    /// Decode an image file into an entry
    Import(ImportArgs),
    /// Encode an entry to an image file
    Export(ExportArgs),
    /// Remove lock files left behind by dead processes
    ResetLocks,
    /// Delete the store and everything in it
    Destroy,
    /// Serve the store over HTTP(S)
    Serve(ServeArgs),
}

#[derive(Args)]
pub struct KeyArgs {
    pub key: String,
}

#[derive(Args)]
pub struct SetArgs {
    pub key: String,
    pub width: u64,
    pub height: u64,
    /// 1-4, or a color: gray, rgb, cmyk, ycbcr, lab, lch, xyz, yuv, hsl,
    /// hsv, xyy; append `a` for alpha (graya, rgba, laba, ...)
    #[arg(value_parser = parse_color)]
    pub color: Color,
    /// u8, u16, u32, u64, f16, f32 or f64
    #[arg(value_parser = parse_sample_type)]
    pub ty: SampleType,
}

#[derive(Args)]
pub struct ImportArgs {
    pub key: String,
    pub path: PathBuf,
    /// Stored color, as for `set`; defaults to the file's
    #[arg(long, visible_alias = "channels", value_parser = parse_color)]
    pub color: Option<Color>,
    /// Stored sample type; defaults to the file's
    #[arg(long = "type", value_parser = parse_sample_type)]
    pub ty: Option<SampleType>,
}

#[derive(Args)]
pub struct ExportArgs {
    pub key: String,
    /// Output file; the extension picks the format
    pub path: PathBuf,
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    #[arg(long, requires = "key", conflicts_with = "gen")]
    pub cert: Option<PathBuf>,
    #[arg(long, requires = "cert")]
    pub key: Option<PathBuf>,
    /// Generate a self-signed certificate under <root>/tls
    #[arg(long)]
    pub gen: bool,
    /// TOML server configuration; flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub fn parse_color(s: &str) -> Result<Color, String> {
    Color::parse(s).ok_or_else(|| format!("expected 1-4 or a color name such as rgb or lab; got {s:?}"))
}

pub fn parse_sample_type(s: &str) -> Result<SampleType, String> {
    SampleType::parse(s).ok_or_else(|| format!("unknown sample type {s:?}"))
}
