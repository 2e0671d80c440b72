//! RCS edit script application.
//!
//! Every non-head revision in an RCS file stores the edit script that turns
//! its neighbour's text into its own: `a<line> <count>` appends the following
//! `count` script lines after the given line of the input, `d<line> <count>`
//! deletes `count` lines starting at the given (1-based) line. Line numbers
//! always refer to the input text, and scripts list commands in ascending
//! line order, so a single forward pass suffices.
//!
//! Text is handled as newline-inclusive line slices, which keeps a missing
//! trailing newline on the last line intact through any number of delta
//! applications.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid edit command on script line {line}")]
    BadCommand { line: usize },

    #[error("edit command addresses line {position}, which is out of range")]
    OutOfRange { position: usize },

    #[error("unexpected end of script: wanted {want} more line(s) of appended text")]
    Truncated { want: usize },
}

#[derive(Debug, Clone)]
enum Command {
    Add { after: usize, lines: Vec<Vec<u8>> },
    Delete { first: usize, count: usize },
}

/// A parsed edit script.
#[derive(Debug, Clone)]
pub struct Script(Vec<Command>);

impl Script {
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let lines = split_lines(data);
        let mut commands = Vec::new();

        let mut i = 0;
        while i < lines.len() {
            let line = i + 1;
            let (letter, position, count) =
                parse_command(chomp(&lines[i])).ok_or(Error::BadCommand { line })?;

            match letter {
                b'a' => {
                    let content = lines
                        .get(i + 1..i + 1 + count)
                        .ok_or(Error::Truncated {
                            want: count - (lines.len() - i - 1),
                        })?
                        .to_vec();
                    commands.push(Command::Add {
                        after: position,
                        lines: content,
                    });
                    i += 1 + count;
                }
                b'd' => {
                    if count == 0 {
                        return Err(Error::BadCommand { line });
                    }
                    commands.push(Command::Delete {
                        first: position,
                        count,
                    });
                    i += 1;
                }
                _ => unreachable!(),
            }
        }

        Ok(Self(commands))
    }

    /// Applies the script to `lines`, returning the edited text.
    pub fn apply(&self, lines: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, Error> {
        let mut out = Vec::with_capacity(lines.len());
        // Index of the next input line that has not been copied yet.
        let mut cursor = 0;

        for command in &self.0 {
            match command {
                Command::Add {
                    after,
                    lines: content,
                } => {
                    if *after < cursor || *after > lines.len() {
                        return Err(Error::OutOfRange { position: *after });
                    }
                    out.extend_from_slice(&lines[cursor..*after]);
                    cursor = *after;
                    out.extend(content.iter().cloned());
                }
                Command::Delete { first, count } => {
                    let start = first.checked_sub(1).ok_or(Error::OutOfRange { position: 0 })?;
                    if start < cursor || start + count > lines.len() {
                        return Err(Error::OutOfRange { position: *first });
                    }
                    out.extend_from_slice(&lines[cursor..start]);
                    cursor = start + count;
                }
            }
        }

        out.extend_from_slice(&lines[cursor..]);
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Splits text into lines that keep their trailing newline. The final line
/// may lack one; empty input yields no lines.
pub fn split_lines(data: &[u8]) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    let mut start = 0;

    while start < data.len() {
        let end = data[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| start + p + 1)
            .unwrap_or(data.len());
        lines.push(data[start..end].to_vec());
        start = end;
    }

    lines
}

pub fn join_lines(lines: Vec<Vec<u8>>) -> Vec<u8> {
    lines.concat()
}

fn chomp(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\n").unwrap_or(line)
}

fn parse_command(line: &[u8]) -> Option<(u8, usize, usize)> {
    let (&letter, rest) = line.split_first()?;
    if letter != b'a' && letter != b'd' {
        return None;
    }

    let rest = std::str::from_utf8(rest).ok()?;
    let mut fields = rest.split(' ');
    let position = fields.next()?.parse().ok()?;
    let count = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }

    Some((letter, position, count))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(text: &[u8], script: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(join_lines(
            Script::parse(script)?.apply(split_lines(text))?,
        ))
    }

    #[test]
    fn test_split_and_join() {
        assert!(split_lines(b"").is_empty());
        assert_eq!(split_lines(b"a\nb\n"), vec![b"a\n".to_vec(), b"b\n".to_vec()]);
        assert_eq!(split_lines(b"a\nb"), vec![b"a\n".to_vec(), b"b".to_vec()]);
        assert_eq!(join_lines(split_lines(b"a\nb")), b"a\nb");
    }

    #[test]
    fn test_delete() {
        assert_eq!(
            apply(b"one\ntwo\nthree\nfour\n", b"d2 2\n").unwrap(),
            b"one\nfour\n"
        );
    }

    #[test]
    fn test_add() {
        assert_eq!(
            apply(b"one\nfour\n", b"a1 2\ntwo\nthree\n").unwrap(),
            b"one\ntwo\nthree\nfour\n"
        );

        // Position 0 inserts at the very beginning.
        assert_eq!(apply(b"two\n", b"a0 1\none\n").unwrap(), b"one\ntwo\n");

        // Appending to an empty file.
        assert_eq!(apply(b"", b"a0 1\nonly\n").unwrap(), b"only\n");
    }

    #[test]
    fn test_replace() {
        // A delete and an add at the same position amount to a replacement.
        assert_eq!(
            apply(b"one\nTWO\nthree\n", b"d2 1\na2 1\ntwo\n").unwrap(),
            b"one\ntwo\nthree\n"
        );
    }

    #[test]
    fn test_missing_trailing_newline_survives() {
        assert_eq!(
            apply(b"one\nlast line", b"a1 1\ninserted\n").unwrap(),
            b"one\ninserted\nlast line"
        );
    }

    #[test]
    fn test_empty_script() {
        assert_eq!(apply(b"same\n", b"").unwrap(), b"same\n");
        assert!(Script::parse(b"").unwrap().is_empty());
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            Script::parse(b"x1 1\n").unwrap_err(),
            Error::BadCommand { line: 1 }
        );
        assert_eq!(
            Script::parse(b"a1 2\nonly one line\n").unwrap_err(),
            Error::Truncated { want: 1 }
        );
        assert_eq!(
            apply(b"one\n", b"d5 1\n").unwrap_err(),
            Error::OutOfRange { position: 5 }
        );
    }
}
