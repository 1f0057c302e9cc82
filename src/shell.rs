//! Line-oriented command interpreter over a space.
//!
//! One command per line; blank lines and lines starting with `#` are
//! skipped. Output goes to the writer passed in, so scripts can be run
//! against stdout or captured in tests.
//!
//! ```text
//! mkdir [-p] PATH        create a directory
//! touch PATH             create an empty file if missing
//! write PATH TEXT        replace a file's content
//! append PATH TEXT       append to a file
//! cat PATH               print a file
//! ln TARGET PATH         create a symbolic link
//! readlink PATH          print a link target
//! ls [PATH]              list a directory
//! rm PATH                remove a file, link or empty directory
//! mv FROM TO             move a node
//! stat PATH              print node metadata as JSON
//! truncate PATH SIZE     set a file's size
//! df                     print block usage
//! ```
//!
//! TEXT runs to the end of the line; `\n`, `\t` and `\\` are unescaped.

use crate::error::{Error, Result};
use crate::vfs::Space;
use std::io::{BufRead, Write};
use tracing::debug;

/// Script interpreter bound to one space.
pub struct Shell {
    space: Space,
}

impl Shell {
    pub fn new(space: Space) -> Self {
        Self { space }
    }

    /// The space commands act on.
    pub fn space(&self) -> &Space {
        &self.space
    }

    /// Run every line of `script`, stopping at the first failure.
    ///
    /// Returns the number of commands executed.
    pub fn run_script<R: BufRead, W: Write>(&mut self, script: R, out: &mut W) -> Result<usize> {
        let mut executed = 0;
        for (index, line) in script.lines().enumerate() {
            let line = line?;
            let wrap = |e: Error| Error::Script {
                line: index + 1,
                source: Box::new(e),
            };
            if self.execute(&line, out).map_err(wrap)? {
                executed += 1;
            }
        }
        Ok(executed)
    }

    /// Run one line. Returns false for blank lines and comments.
    pub fn execute<W: Write>(&mut self, line: &str, out: &mut W) -> Result<bool> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(false);
        }
        debug!(command = line, "executing");

        let (command, rest) = split_word(line);
        match command {
            "mkdir" => {
                let (first, rest) = split_word(rest);
                if first == "-p" {
                    self.space.create_directories(required(rest, "mkdir -p PATH")?)?;
                } else {
                    self.space.create_directory(required(first, "mkdir PATH")?)?;
                }
            }
            "touch" => {
                let path = required(rest, "touch PATH")?;
                if !self.space.exists(path) {
                    self.space.create_file(path)?;
                }
            }
            "write" | "append" => {
                let (path, text) = split_word(rest);
                let path = required(path, "write PATH TEXT")?;
                let data = unescape(text);
                if command == "write" {
                    self.space.write_file(path, data.as_bytes())?;
                } else {
                    self.space.append_file(path, data.as_bytes())?;
                }
            }
            "cat" => {
                let data = self.space.read_file(required(rest, "cat PATH")?)?;
                out.write_all(&data)?;
                if !data.ends_with(b"\n") {
                    writeln!(out)?;
                }
            }
            "ln" => {
                let (target, path) = split_word(rest);
                let target = required(target, "ln TARGET PATH")?;
                self.space.create_link(required(path, "ln TARGET PATH")?, target)?;
            }
            "readlink" => {
                let target = self.space.read_link(required(rest, "readlink PATH")?)?;
                writeln!(out, "{}", target)?;
            }
            "ls" => {
                let path = if rest.is_empty() { "/" } else { rest };
                let entries = self.space.list(path)?;
                if entries.is_empty() {
                    writeln!(out, "(empty)")?;
                }
                for entry in entries {
                    writeln!(out, "{} {:>10}  {}", entry.kind.marker(), entry.size, entry.name)?;
                }
            }
            "rm" => self.space.delete(required(rest, "rm PATH")?)?,
            "mv" => {
                let (from, to) = split_word(rest);
                let from = required(from, "mv FROM TO")?;
                self.space.rename(from, required(to, "mv FROM TO")?)?;
            }
            "stat" => {
                let stat = self.space.stat(required(rest, "stat PATH")?)?;
                writeln!(out, "{}", serde_json::to_string(&stat)?)?;
            }
            "truncate" => {
                let (path, size) = split_word(rest);
                let path = required(path, "truncate PATH SIZE")?;
                let size: u64 = required(size, "truncate PATH SIZE")?
                    .parse()
                    .map_err(|_| Error::InvalidArgument(format!("invalid size: {}", size)))?;
                self.space.set_size(path, size)?;
            }
            "df" => {
                let usage = self.space.usage();
                writeln!(out, "Block size:       {} bytes", usage.block_size)?;
                writeln!(out, "Blocks:           {} used / {} total", usage.used_blocks, usage.total_blocks)?;
                writeln!(out, "Used:             {} bytes", usage.used_bytes())?;
                writeln!(out, "Available:        {} bytes", usage.free_bytes())?;
            }
            other => {
                return Err(Error::InvalidArgument(format!("unknown command: {}", other)));
            }
        }
        Ok(true)
    }
}

/// Split off the first whitespace-delimited word.
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

fn required<'a>(arg: &'a str, usage: &str) -> Result<&'a str> {
    if arg.is_empty() {
        Err(Error::InvalidArgument(format!("usage: {}", usage)))
    } else {
        Ok(arg)
    }
}

fn unescape(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('\\') => result.push('\\'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}
