/*
 * Copyright 2025 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! `bfs` hosts a block filesystem inside an ordinary file and drives it
//! through an interactive shell.
//!
//! The single positional argument is the path to the disk image. Every
//! command error is printed and the shell keeps running; `exit` or end of
//! input leaves with status `0`.

use bfs::disk::Disk;
use bfs::fs::FileSystem;
use bfs::fs::Stat;
use bfs::prompt::prompt;
use bfs::util::ByteSize;
use bfs::util::LocalTime;
use std::env;
use std::fs;
use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::process::exit;

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
    /// The name of the current program used in command line.
    prog: String,
    /// If true, print command line help.
    help: bool,
    /// The path to the disk image hosting the filesystem.
    disk_path: Option<PathBuf>,
}

fn parse_args() -> Args {
    let mut args: Args = Default::default();
    let mut iter = env::args();
    args.prog = iter.next().unwrap_or("bfs".to_owned());
    for arg in iter {
        match arg.as_str() {
            "-h" | "--help" => args.help = true,
            _ => args.disk_path = Some(PathBuf::from(arg)),
        }
    }
    args
}

/// Prints command usage.
///
/// `prog` is the name of the current program.
fn print_usage(prog: &str) {
    eprintln!("Usage: {prog} <disk>");
    eprintln!("Try '{prog} --help' for more information.");
}

/// Prints command help.
fn print_help(prog: &str) {
    println!();
    println!("Usage:");
    println!(" {prog} <disk>");
    println!();
    println!("Opens the filesystem hosted in the disk image at <disk> and starts an");
    println!("interactive shell on it. The image must be at least 16 blocks (64 KiB)");
    println!("long; a fresh image becomes usable after the `format` command.");
}

/// Prints the list of shell commands.
fn print_commands() {
    println!("Commands:");
    println!("    format");
    println!("    mount");
    println!("    store <file> <host_file>");
    println!("    load <host_file> <file>");
    println!("    touch <file>");
    println!("    mkdir <directory>");
    println!("    cd <directory>");
    println!("    ls [directory]");
    println!("    stat <file>");
    println!("    cat <file>");
    println!("    write <file> <data>");
    println!("    mv <from> <to>");
    println!("    cp <from> <to>");
    println!("    rm <file>");
    println!("    su <uid>");
    println!("    chown <uid> <file>");
    println!("    chmod <mode> <file>");
    println!("    help");
    println!("    exit");
}

/// Splits a command line into the command, its first argument and the
/// remainder of the line.
///
/// The remainder keeps its inner whitespace, so `write` can store data
/// containing spaces.
fn tokenize(line: &str) -> (&str, &str, &str) {
    let line = line.trim_start();
    let (cmd, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim_start();
    let (arg1, arg2) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    (cmd, arg1, arg2.trim_start())
}

/// Parses a uid. Out-of-range values wrap silently.
fn parse_uid(arg: &str) -> Result<u16, Box<dyn std::error::Error>> {
    let uid = arg
        .parse::<i64>()
        .map_err(|_| format!("invalid uid: {arg}"))?;
    Ok(uid as u16)
}

/// Writes the content of the filesystem file `name` to the host file at
/// `path`.
fn store(fs: &mut FileSystem, name: &str, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs.read_file(name)?;
    fs::write(path, data)?;
    Ok(())
}

/// Loads the host file at `path` into the filesystem file `name`.
fn load(fs: &mut FileSystem, path: &str, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(path)?;
    fs.write_file(name, &data)?;
    Ok(())
}

/// Prints one `stat` line for `name`.
fn print_stat(name: &str, stat: &Stat) {
    let size = ByteSize(stat.size as u64).to_string();
    println!(
        "{size:>5} {:04o} {:>5} {} {} {name}",
        stat.mode,
        stat.uid,
        LocalTime(stat.creation_time),
        LocalTime(stat.modification_time),
    );
}

/// Executes one command line. The returned error is printed by the caller.
fn execute(fs: &mut FileSystem, line: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (cmd, arg1, arg2) = tokenize(line);
    match cmd {
        "" => {}
        "format" => fs.format()?,
        "mount" => fs.mount()?,
        "su" => {
            if arg1.is_empty() {
                return Err("Usage: su <uid>".into());
            }
            fs.set_uid(parse_uid(arg1)?);
        }
        "chown" => {
            if arg1.is_empty() || arg2.is_empty() {
                return Err("Usage: chown <uid> <file>".into());
            }
            fs.change_owner(arg2, parse_uid(arg1)?)?;
        }
        "chmod" => {
            if arg1.is_empty() || arg2.is_empty() {
                return Err("Usage: chmod <mode> <file>".into());
            }
            let mode = u16::from_str_radix(arg1, 8).map_err(|_| "the mode should be in octal")?;
            fs.change_mode(arg2, mode)?;
        }
        "cat" => {
            if arg1.is_empty() {
                return Err("Usage: cat <file>".into());
            }
            let data = fs.read_file(arg1)?;
            io::stdout().write_all(&data)?;
            println!();
        }
        "store" => {
            if arg1.is_empty() || arg2.is_empty() {
                return Err("Usage: store <file> <host_file>".into());
            }
            store(fs, arg1, arg2)?;
        }
        "load" => {
            if arg1.is_empty() || arg2.is_empty() {
                return Err("Usage: load <host_file> <file>".into());
            }
            load(fs, arg1, arg2)?;
        }
        "touch" => {
            if arg1.is_empty() {
                return Err("Usage: touch <file>".into());
            }
            if arg1.ends_with('/') {
                return Err("touching a directory is not allowed, use mkdir instead".into());
            }
            fs.create_file(arg1)?;
        }
        "mkdir" => {
            if arg1.is_empty() {
                return Err("Usage: mkdir <directory>".into());
            }
            if arg1.ends_with('/') {
                fs.create_file(arg1)?;
            } else {
                fs.create_file(&format!("{arg1}/"))?;
            }
        }
        "cd" => {
            if arg1.is_empty() {
                return Err("Usage: cd <directory>".into());
            }
            fs.change_directory(arg1)?;
        }
        "ls" => {
            for (name, stat) in fs.list_directory(arg1)? {
                print_stat(&name, &stat);
            }
        }
        "stat" => {
            if arg1.is_empty() {
                return Err("Usage: stat <file>".into());
            }
            print_stat(arg1, &fs.stat_file(arg1)?);
        }
        "rm" => {
            if arg1.is_empty() {
                return Err("Usage: rm <file>".into());
            }
            fs.remove_file(arg1)?;
        }
        "write" => {
            if arg1.is_empty() || arg2.is_empty() {
                return Err("Usage: write <file> <data>".into());
            }
            fs.write_file(arg1, arg2.as_bytes())?;
        }
        "mv" => {
            if arg1.is_empty() || arg2.is_empty() {
                return Err("Usage: mv <from> <to>".into());
            }
            fs.move_file(arg1, arg2)?;
        }
        "cp" => {
            if arg1.is_empty() || arg2.is_empty() {
                return Err("Usage: cp <from> <to>".into());
            }
            fs.copy_file(arg1, arg2)?;
        }
        "help" => print_commands(),
        "exit" => exit(0),
        _ => {
            println!("Unknown command: {}", line.trim());
            println!("Type 'help' to get help.");
        }
    }
    Ok(())
}

fn main() {
    let args = parse_args();
    if args.help {
        print_help(&args.prog);
        exit(0);
    }
    let Some(disk_path) = args.disk_path else {
        print_usage(&args.prog);
        exit(1);
    };

    let disk = Disk::open(&disk_path).unwrap_or_else(|e| {
        eprintln!("{}: {}: {e}", args.prog, disk_path.display());
        exit(1);
    });
    let mut fs = FileSystem::new(disk).unwrap_or_else(|e| {
        eprintln!("{}: {e}", args.prog);
        exit(1);
    });

    println!("Welcome to BFS! Type 'help' to list the available commands.");
    while let Some(line) = prompt("BFS> ") {
        if let Err(e) = execute(&mut fs, &line) {
            println!("{e}");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tokenize_keeps_remainder() {
        assert_eq!(
            tokenize("write /a hello world"),
            ("write", "/a", "hello world")
        );
        assert_eq!(tokenize("ls"), ("ls", "", ""));
        assert_eq!(tokenize("  cd   /d  "), ("cd", "/d", ""));
        assert_eq!(tokenize(""), ("", "", ""));
        assert_eq!(tokenize("cat /a"), ("cat", "/a", ""));
    }

    #[test]
    fn uid_parsing() {
        assert_eq!(parse_uid("0").unwrap(), 0);
        assert_eq!(parse_uid("7").unwrap(), 7);
        // Out-of-range values wrap into the 16-bit space
        assert_eq!(parse_uid("65536").unwrap(), 0);
        assert_eq!(parse_uid("-1").unwrap(), u16::MAX);
        assert!(parse_uid("abc").is_err());
    }
}
