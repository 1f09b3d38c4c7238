//! Interactive shell for poking at a disk image through `diskfs-core`
//! (grounded on a classic teaching OS's userland commands: `ls`, `cat`,
//! `mkdir`, `touch`, `rm`, plus `put`/`get` to move bytes across the host
//! boundary since there is no shared address space here).

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use diskfs_core::{FileDisk, FileSystem, Geometry};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Disk image to mount. Use `mkdisk` to create one first.
    image: PathBuf,

    /// Total sectors in the image; must match what it was formatted with.
    #[arg(long, default_value_t = 512)]
    num_sectors: u32,

    /// Directory entries the root directory was formatted with.
    #[arg(long, default_value_t = 32)]
    num_dir_entries: usize,

    /// Simultaneously open files allowed.
    #[arg(long, default_value_t = 16)]
    max_open_files: usize,
}

fn run_command(fs: &mut FileSystem<FileDisk>, line: &str) -> Result<bool, Box<dyn std::error::Error>> {
    let mut words = line.split_whitespace();
    let Some(cmd) = words.next() else {
        return Ok(true);
    };
    let rest: Vec<&str> = words.collect();

    match cmd {
        "ls" => {
            let dir = rest.first().copied().unwrap_or("/");
            let recursive = rest.contains(&"-r");
            let mut out = Vec::new();
            fs.list(recursive, dir, &mut out)?;
            io::stdout().write_all(&out)?;
        }
        "cat" => {
            let path = rest.first().ok_or("usage: cat <path>")?;
            let fd = fs.open(path)?;
            let mut buf = vec![0u8; 4096];
            loop {
                let n = fs.read(fd, &mut buf)?;
                if n == 0 {
                    break;
                }
                io::stdout().write_all(&buf[..n])?;
            }
            fs.close(fd)?;
        }
        "mkdir" => {
            let path = rest.first().ok_or("usage: mkdir <path>")?;
            fs.create(path, 0, true)?;
        }
        "touch" => {
            let path = rest.first().ok_or("usage: touch <path>")?;
            let size: u32 = rest.get(1).map(|s| s.parse()).transpose()?.unwrap_or(0);
            fs.create(path, size, false)?;
        }
        "rm" => {
            let recursive = rest.contains(&"-r");
            let path = rest
                .iter()
                .copied()
                .find(|a| *a != "-r")
                .ok_or("usage: rm [-r] <path>")?;
            fs.remove(recursive, path)?;
        }
        "put" => {
            let host = rest.first().ok_or("usage: put <host-file> <disk-path>")?;
            let disk_path = rest.get(1).ok_or("usage: put <host-file> <disk-path>")?;
            let data = std::fs::read(host)?;
            fs.create(disk_path, data.len() as u32, false)?;
            let fd = fs.open(disk_path)?;
            fs.write(fd, &data)?;
            fs.close(fd)?;
        }
        "get" => {
            let disk_path = rest.first().ok_or("usage: get <disk-path> <host-file>")?;
            let host = rest.get(1).ok_or("usage: get <disk-path> <host-file>")?;
            let fd = fs.open(disk_path)?;
            let mut data = vec![0u8; 4096];
            let mut out = Vec::new();
            loop {
                let n = fs.read(fd, &mut data)?;
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&data[..n]);
            }
            fs.close(fd)?;
            std::fs::write(host, &out)?;
        }
        "print" => {
            let mut out = Vec::new();
            fs.print(&mut out)?;
            io::stdout().write_all(&out)?;
        }
        "exit" | "quit" => return Ok(false),
        other => eprintln!("unknown command: {other}"),
    }
    Ok(true)
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let geometry = match Geometry::new(args.num_sectors, args.num_dir_entries, args.max_open_files)
    {
        Ok(g) => g,
        Err(e) => {
            eprintln!("diskshell: {e}");
            return ExitCode::FAILURE;
        }
    };
    let device = match FileDisk::open(&args.image, geometry.num_sectors()) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("diskshell: {e}");
            return ExitCode::FAILURE;
        }
    };
    let mut fs = match FileSystem::mount(device, geometry) {
        Ok(fs) => fs,
        Err(e) => {
            eprintln!("diskshell: {e}");
            return ExitCode::FAILURE;
        }
    };

    let stdin = io::stdin();
    print!("> ");
    let _ = io::stdout().flush();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("diskshell: {e}");
                break;
            }
        };
        match run_command(&mut fs, &line) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("diskshell: {e}"),
        }
        print!("> ");
        let _ = io::stdout().flush();
    }
    ExitCode::SUCCESS
}
