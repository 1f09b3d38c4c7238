//! Host tool: formats a fresh disk image and optionally seeds it with files
//! copied in from the host file system (grounded on the classic mkfs idea).

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use diskfs_core::{FileDisk, FileSystem, Geometry};

/// Formats a disk image file and optionally copies host files into its root.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path of the disk image to create (truncated if it already exists).
    #[arg(short, long)]
    output: PathBuf,

    /// Total sectors in the image.
    #[arg(long, default_value_t = 512)]
    num_sectors: u32,

    /// Directory entries the root directory can hold.
    #[arg(long, default_value_t = 32)]
    num_dir_entries: usize,

    /// Simultaneously open files the mounted file system will allow.
    #[arg(long, default_value_t = 16)]
    max_open_files: usize,

    /// Host files to copy into the image's root directory, named by their
    /// base name on the new disk.
    #[arg(short, long)]
    files: Vec<PathBuf>,
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let geometry = Geometry::new(args.num_sectors, args.num_dir_entries, args.max_open_files)?;
    let device = FileDisk::create(&args.output, geometry.num_sectors())?;
    let mut fs = FileSystem::format(device, geometry)?;

    for host_path in &args.files {
        let name = host_path
            .file_name()
            .ok_or("input file has no base name")?
            .to_string_lossy()
            .into_owned();
        let contents = fs::read(host_path)?;
        let dest = format!("/{name}");
        fs.create(&dest, contents.len() as u32, false)?;
        let fd = fs.open(&dest)?;
        fs.write(fd, &contents)?;
        fs.close(fd)?;
        log::info!("mkdisk: copied {} -> {dest}", host_path.display());
    }

    println!(
        "formatted {} ({} sectors, {} free)",
        args.output.display(),
        geometry.num_sectors(),
        fs.num_clear()
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("mkdisk: {e}");
            ExitCode::FAILURE
        }
    }
}
