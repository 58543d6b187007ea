use crate::block_file::BlockFile;
use crate::ToolError;
use fat_fs::{api, FileHandle, FsError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where WRITE takes its bytes from and READ its expected bytes.
#[derive(Debug, PartialEq, Eq)]
pub enum Data {
    Inline(String),
    File(PathBuf),
}

impl Data {
    fn load(&self) -> Result<Vec<u8>, ToolError> {
        match self {
            Data::Inline(text) => Ok(text.as_bytes().to_vec()),
            Data::File(path) => Ok(fs::read(path)?),
        }
    }
}

/// One tab separated script line.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Mount,
    Umount,
    Create(String),
    Delete(String),
    Open(String),
    Close,
    Seek(usize),
    Write(Option<Data>),
    Read { len: usize, expected: Option<Data> },
}

fn data(source: Option<&str>, description: Option<&str>) -> Option<Data> {
    match (source, description) {
        (Some("DATA"), Some(text)) => Some(Data::Inline(text.to_string())),
        (Some("FILE"), Some(path)) => Some(Data::File(PathBuf::from(path))),
        _ => None,
    }
}

/// `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<Command>, String> {
    let mut args = line.split('\t');
    let name = args.next().unwrap_or("").trim();
    if name.is_empty() {
        return Ok(None);
    }
    let mut arg = |what: &str| {
        args.next()
            .filter(|arg| !arg.is_empty())
            .ok_or_else(|| format!("{} needs {}", name, what))
    };
    let command = match name {
        "MOUNT" => Command::Mount,
        "UMOUNT" => Command::Umount,
        "CREATE" => Command::Create(arg("a file name")?.to_string()),
        "DELETE" => Command::Delete(arg("a file name")?.to_string()),
        "OPEN" => Command::Open(arg("a file name")?.to_string()),
        "CLOSE" => Command::Close,
        "SEEK" => {
            let offset = arg("an offset")?;
            Command::Seek(offset.parse().map_err(|_| format!("bad offset {}", offset))?)
        }
        "WRITE" => {
            let source = arg("a data source").ok();
            let description = arg("data").ok();
            Command::Write(data(source, description))
        }
        "READ" => {
            let len = arg("a length")?;
            let len = len.parse().map_err(|_| format!("bad read length {}", len))?;
            let source = arg("a data source").ok();
            let description = arg("data").ok();
            Command::Read {
                len,
                expected: data(source, description),
            }
        }
        other => return Err(format!("unknown command {}", other)),
    };
    Ok(Some(command))
}

struct ScriptRunner<'a> {
    disk: &'a Path,
    mounted: bool,
    fd: Option<FileHandle>,
}

impl ScriptRunner<'_> {
    fn fd(&self) -> Result<FileHandle, ToolError> {
        self.fd.ok_or(ToolError::Fs(FsError::BadHandle))
    }

    fn execute(&mut self, command: &Command) -> Result<(), ToolError> {
        match command {
            Command::Mount => {
                api::mount(Arc::new(BlockFile::open(self.disk)?))?;
                self.mounted = true;
                println!("MOUNT successful.");
            }
            Command::Umount => {
                if self.mounted {
                    api::unmount()?;
                }
                self.mounted = false;
                println!("UMOUNT successful.");
            }
            Command::Create(name) => {
                api::create(name)?;
                println!("CREATE successful.");
            }
            Command::Delete(name) => {
                api::delete(name)?;
                println!("DELETE successful.");
            }
            Command::Open(name) => {
                self.fd = Some(api::open(name)?);
                println!("OPEN successful.");
            }
            Command::Close => {
                api::close(self.fd()?)?;
                println!("CLOSE successful.");
            }
            Command::Seek(offset) => {
                api::seek(self.fd()?, *offset)?;
                println!("SEEK successful.");
            }
            Command::Write(source) => {
                let bytes = source.as_ref().ok_or(FsError::NullBuffer)?.load()?;
                let count = api::write(self.fd()?, &bytes)?;
                println!("Wrote {} bytes to file.", count);
            }
            Command::Read { len, expected } => {
                let expected = expected.as_ref().ok_or(FsError::NullBuffer)?.load()?;
                let read = api::read(self.fd()?, *len)?;
                if read != expected {
                    return Err(ToolError::Mismatch {
                        read: String::from_utf8_lossy(&read).into_owned(),
                        expected: String::from_utf8_lossy(&expected).into_owned(),
                    });
                }
                println!(
                    "Read {} bytes from file. Compared {} correct.",
                    read.len(),
                    expected.len()
                );
            }
        }
        Ok(())
    }
}

/// Run every command of `script` against `disk`, stopping at the first
/// failure. The image is unmounted on the way out either way.
pub fn run(disk: &Path, script: &Path) -> Result<(), ToolError> {
    let text = fs::read_to_string(script)?;
    let mut runner = ScriptRunner {
        disk,
        mounted: false,
        fd: None,
    };
    for (i, line) in text.lines().enumerate() {
        let result = parse_line(line)
            .map_err(|message| ToolError::Script {
                line: i + 1,
                message,
            })
            .and_then(|command| match command {
                Some(command) => runner.execute(&command),
                None => Ok(()),
            });
        if let Err(err) = result {
            if runner.mounted {
                let _ = api::unmount();
            }
            return Err(err);
        }
    }
    if runner.mounted {
        api::unmount()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_command() {
        assert_eq!(parse_line("MOUNT"), Ok(Some(Command::Mount)));
        assert_eq!(parse_line(""), Ok(None));
        assert_eq!(
            parse_line("CREATE\tfile.txt"),
            Ok(Some(Command::Create("file.txt".to_string())))
        );
        assert_eq!(parse_line("SEEK\t4090"), Ok(Some(Command::Seek(4090))));
        assert_eq!(
            parse_line("WRITE\tDATA\thello world"),
            Ok(Some(Command::Write(Some(Data::Inline("hello world".to_string())))))
        );
        assert_eq!(
            parse_line("READ\t20\tFILE\tout.bin"),
            Ok(Some(Command::Read {
                len: 20,
                expected: Some(Data::File(PathBuf::from("out.bin"))),
            }))
        );
    }

    #[test]
    fn missing_data_is_kept_for_the_runner() {
        assert_eq!(parse_line("WRITE"), Ok(Some(Command::Write(None))));
        assert_eq!(
            parse_line("READ\t5\tNOPE\tx"),
            Ok(Some(Command::Read {
                len: 5,
                expected: None
            }))
        );
    }

    #[test]
    fn malformed_lines_are_errors() {
        assert!(parse_line("SEEK").is_err());
        assert!(parse_line("SEEK\tten").is_err());
        assert!(parse_line("READ\t-1\tDATA\tx").is_err());
        assert!(parse_line("FORMAT\tdisk").is_err());
    }
}
