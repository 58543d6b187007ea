mod block_file;
mod logger;
mod script;

use block_file::BlockFile;
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use fat_fs::{api, FatFileSystem, FsError};
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::process::exit;
use std::sync::Arc;

#[derive(Debug)]
pub enum ToolError {
    Io(std::io::Error),
    Fs(FsError),
    Script { line: usize, message: String },
    Mismatch { read: String, expected: String },
    ShortWrite { written: usize, requested: usize },
    Usage(String),
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        ToolError::Io(err)
    }
}

impl From<FsError> for ToolError {
    fn from(err: FsError) -> Self {
        ToolError::Fs(err)
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::Io(err) => write!(f, "{}", err),
            ToolError::Fs(err) => write!(f, "{}", err),
            ToolError::Script { line, message } => write!(f, "line {}: {}", line, message),
            ToolError::Mismatch { read, expected } => {
                write!(f, "Read unexpected data! {} read vs given {}", read, expected)
            }
            ToolError::ShortWrite { written, requested } => {
                write!(f, "disk full: wrote {} of {} bytes", written, requested)
            }
            ToolError::Usage(message) => write!(f, "{}", message),
        }
    }
}

fn main() {
    let disk_arg = || {
        Arg::with_name("disk")
            .required(true)
            .index(1)
            .help("Disk image")
    };
    let file_arg = |help: &'static str| Arg::with_name("file").required(true).index(2).help(help);
    let matches = App::new("FAT file system tool")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .global(true)
                .help("Log every file system operation"),
        )
        .subcommand(
            SubCommand::with_name("mkfs")
                .about("Create and format a disk image")
                .arg(disk_arg())
                .arg(
                    Arg::with_name("blocks")
                        .required(true)
                        .index(2)
                        .help("Number of blocks"),
                ),
        )
        .subcommand(SubCommand::with_name("info").about("Show layout").arg(disk_arg()))
        .subcommand(SubCommand::with_name("ls").about("List files").arg(disk_arg()))
        .subcommand(
            SubCommand::with_name("add")
                .about("Copy a host file onto the disk")
                .arg(disk_arg())
                .arg(file_arg("Host file")),
        )
        .subcommand(
            SubCommand::with_name("rm")
                .about("Delete a file")
                .arg(disk_arg())
                .arg(file_arg("File name")),
        )
        .subcommand(
            SubCommand::with_name("cat")
                .about("Print a file")
                .arg(disk_arg())
                .arg(file_arg("File name")),
        )
        .subcommand(
            SubCommand::with_name("stat")
                .about("Print the size of a file")
                .arg(disk_arg())
                .arg(file_arg("File name")),
        )
        .subcommand(
            SubCommand::with_name("script")
                .about("Run a command script")
                .arg(disk_arg())
                .arg(file_arg("Script file")),
        )
        .get_matches();

    if let Err(err) = logger::init(matches.is_present("verbose")) {
        eprintln!("cannot install logger: {}", err);
    }
    if let Err(err) = dispatch(&matches) {
        eprintln!("{}", err);
        exit(1);
    }
}

fn dispatch(matches: &ArgMatches) -> Result<(), ToolError> {
    let (name, sub) = matches.subcommand();
    let Some(sub) = sub else {
        return Ok(());
    };
    // both are required by clap
    let disk = Path::new(sub.value_of("disk").unwrap_or_default());
    let file = sub.value_of("file").unwrap_or_default();
    match name {
        "mkfs" => {
            let blocks = sub.value_of("blocks").unwrap_or_default();
            let blocks = blocks
                .parse()
                .map_err(|_| ToolError::Usage(format!("bad block count {}", blocks)))?;
            mkfs(disk, blocks)
        }
        "info" => with_mounted(disk, || {
            println!("{}", api::info()?);
            Ok(())
        }),
        "ls" => with_mounted(disk, || {
            println!("FS Ls:");
            for file in api::list()? {
                println!("{}", file);
            }
            Ok(())
        }),
        "add" => with_mounted(disk, || add(Path::new(file))),
        "rm" => with_mounted(disk, || {
            api::delete(file)?;
            println!("Removed file '{}'", file);
            Ok(())
        }),
        "cat" => with_mounted(disk, || cat(file)),
        "stat" => with_mounted(disk, || {
            let fd = api::open(file)?;
            let size = api::stat(fd);
            api::close(fd)?;
            println!("Size of file '{}' is {} bytes", file, size?);
            Ok(())
        }),
        "script" => script::run(disk, Path::new(file)),
        _ => Ok(()),
    }
}

fn mkfs(disk: &Path, blocks: u32) -> Result<(), ToolError> {
    let device: Arc<dyn fat_fs::BlockDevice> = Arc::new(BlockFile::create(disk, blocks)?);
    FatFileSystem::format(&device)?;
    device.close().map_err(FsError::from)?;
    println!("Created {} with {} blocks", disk.display(), blocks);
    Ok(())
}

/// Mount `disk`, run `f`, unmount even when `f` fails.
fn with_mounted(
    disk: &Path,
    f: impl FnOnce() -> Result<(), ToolError>,
) -> Result<(), ToolError> {
    api::mount(Arc::new(BlockFile::open(disk)?))?;
    let result = f();
    let unmounted = api::unmount();
    if unmounted.is_err() {
        let _ = api::discard();
    }
    result?;
    unmounted?;
    Ok(())
}

fn add(host_path: &Path) -> Result<(), ToolError> {
    let mut data = Vec::new();
    File::open(host_path)?.read_to_end(&mut data)?;
    let name = host_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or(FsError::NameInvalid)?;
    api::create(name)?;
    let fd = api::open(name)?;
    let written = api::write(fd, &data);
    api::close(fd)?;
    let written = written?;
    if written < data.len() {
        return Err(ToolError::ShortWrite {
            written,
            requested: data.len(),
        });
    }
    println!("Wrote file '{}' ({}/{} bytes)", name, written, data.len());
    Ok(())
}

fn cat(name: &str) -> Result<(), ToolError> {
    let fd = api::open(name)?;
    let data = api::stat(fd).and_then(|size| api::read(fd, size));
    api::close(fd)?;
    let data = data?;
    println!("Size of file '{}' is {} bytes", name, data.len());
    println!("Content of the file:");
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&data)?;
    stdout.write_all(b"\n")?;
    Ok(())
}
