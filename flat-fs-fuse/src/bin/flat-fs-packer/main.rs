mod cli;

use std::fs;
use std::io::{self, Write};
use std::sync::Arc;

use block_dev::BlockDevice;
use clap::Parser;
use cli::{Cli, Command};
use flat_fs::{FileSystem, OpenMode, NAME_MAX_LEN};
use flat_fs_fuse::BlockFile;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let (block_file, blocks) = match cli.command {
        Command::Format { blocks, .. } => (BlockFile::create(&cli.image, blocks)?, blocks),
        _ => BlockFile::open(&cli.image)?,
    };
    let block_dev: Arc<dyn BlockDevice> = Arc::new(block_file);
    log::info!("image={:?}, blocks={blocks}", cli.image);

    let fs = FileSystem::mount(block_dev, blocks).map_err(into_io)?;

    match cli.command {
        Command::Format { inodes, .. } => {
            fs.format(inodes).map_err(into_io)?;
            println!("formatted: blocks={blocks}, inodes={inodes}");
        }
        Command::Pack { source } => {
            for host_file in fs::read_dir(&source)? {
                let host_file = host_file?;
                if !host_file.file_type()?.is_file() {
                    continue;
                }
                let name = host_file.file_name().to_string_lossy().into_owned();
                if name.encode_utf16().count() > NAME_MAX_LEN {
                    log::warn!("{name:?} will be truncated to {NAME_MAX_LEN} characters");
                }

                let data = fs::read(host_file.path())?;
                let file = fs.open(&name, OpenMode::Write).map_err(into_io)?;
                let written = fs.write(&file, &data);
                let size = fs.size(&file);
                fs.close(&file).map_err(into_io)?;

                if let Err(err) = written {
                    log::error!("{name:?}: only {size} of {} bytes packed", data.len());
                    fs.sync().map_err(into_io)?;
                    return Err(into_io(err));
                }
                println!("packed: {name:?} ({size} bytes)");
            }
        }
        Command::Ls => {
            for entry in fs.list() {
                println!("{:>5} {:>8} {}", entry.inode_id, entry.size, entry.name);
            }
        }
        Command::Cat { name } => {
            let file = fs.open(&name, OpenMode::Read).map_err(into_io)?;
            let mut data = vec![0; fs.size(&file) as usize];
            let read = fs.read(&file, &mut data);
            fs.close(&file).map_err(into_io)?;
            let read = read.map_err(into_io)?;
            io::stdout().write_all(&data[..read])?;
        }
        Command::Rm { name } => fs.delete(&name).map_err(into_io)?,
        Command::Stat => {
            println!("blocks: {}", fs.total_blocks());
            println!("inodes: {}", fs.total_inodes());
            println!("free blocks: {}", fs.free_blocks());
            println!("files: {}", fs.list().len());
        }
    }

    fs.sync().map_err(into_io)
}

fn into_io(err: flat_fs::Error) -> io::Error {
    io::Error::other(err.to_string())
}
