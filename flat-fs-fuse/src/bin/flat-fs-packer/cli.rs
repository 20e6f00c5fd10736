use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
pub struct Cli {
    /// Path of the disk image
    #[arg(long, short, global = true, default_value = "fs.img")]
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a fresh image
    Format {
        /// Image size in 512-byte blocks
        #[arg(long, short, default_value_t = 1000)]
        blocks: usize,

        /// Number of inodes, including the root directory
        #[arg(long, short = 'n', default_value_t = flat_fs::DEFAULT_INODES)]
        inodes: u16,
    },

    /// Copy every regular file of a host directory into the image
    Pack {
        /// Host source directory
        #[arg(long, short)]
        source: PathBuf,
    },

    /// List files with their inode numbers and sizes
    Ls,

    /// Write a file of the image to stdout
    Cat { name: String },

    /// Remove a file from the directory
    Rm { name: String },

    /// Show block and inode usage
    Stat,
}
