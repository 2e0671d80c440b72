//! CVS-compatible RCS keyword expansion.
//!
//! Checked-out file content has `$Keyword$` and `$Keyword: old value $`
//! tokens rewritten to their current values. The expansion here matches what
//! `cvs checkout` produces in the default `-kkv` mode, byte for byte, so an
//! imported tree compares clean against a CVS working copy.

use chrono::{Datelike, NaiveDateTime};

/// The change context a keyword is expanded against.
#[derive(Debug, Clone)]
pub struct Context<'a> {
    /// Full path of the RCS file, used by `Header` and `Source`.
    pub rcs_path: &'a str,
    pub revision: &'a str,
    /// Seconds since the epoch, UTC.
    pub timestamp: i64,
    pub author: &'a str,
    pub state: &'a str,
    /// The revision's log message, inserted by `Log`.
    pub log: &'a str,
    /// Repository-local keyword configured with `tag=` in CVSROOT/options,
    /// expanded like `Id`.
    pub local_id: Option<&'a str>,
}

impl Context<'_> {
    /// Basename of the RCS file, including the ",v" suffix.
    fn rcs_file(&self) -> &str {
        self.rcs_path
            .rsplit('/')
            .next()
            .unwrap_or(self.rcs_path)
    }

    fn date(&self) -> String {
        NaiveDateTime::from_timestamp_opt(self.timestamp, 0)
            .map(|when| when.format("%Y/%m/%d %H:%M:%S").to_string())
            .unwrap_or_default()
    }

    /// OpenBSD's `Mdocdate` format: "April 25 2011", day unpadded.
    fn mdocdate(&self) -> String {
        NaiveDateTime::from_timestamp_opt(self.timestamp, 0)
            .map(|when| format!("{} {} {}", when.format("%B"), when.day(), when.year()))
            .unwrap_or_default()
    }

    fn id_value(&self, path: &str) -> String {
        format!(
            "{} {} {} {} {}",
            path,
            self.revision,
            self.date(),
            self.author,
            self.state
        )
    }
}

/// Whether expansion applies at all: text files (`mode` is not "b") whose
/// RCS expand mode is missing, empty, or `kv`. Everything else is passed
/// through untouched.
pub fn active(expand: Option<&[u8]>, mode: &str) -> bool {
    mode != "b" && matches!(expand, None | Some(b"") | Some(b"kv"))
}

/// Expands all recognised keywords in `data`. Unknown keywords and bare `$`
/// signs are copied verbatim.
pub fn expand(data: &[u8], ctx: &Context) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 128);

    let mut start = 0;
    while start < data.len() {
        let end = data[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|at| start + at + 1)
            .unwrap_or(data.len());
        expand_line(&data[start..end], ctx, &mut out);
        start = end;
    }

    out
}

enum Replacement {
    Value(String),
    Log,
}

fn expand_line(line: &[u8], ctx: &Context, out: &mut Vec<u8>) {
    // Prefix of the line before a $Log$ keyword; the inserted log lines are
    // aligned with it.
    let mut log_prefix = None;

    let mut i = 0;
    while i < line.len() {
        if line[i] != b'$' {
            out.push(line[i]);
            i += 1;
            continue;
        }

        match match_keyword(&line[i..], ctx) {
            Some((consumed, Replacement::Value(value))) => {
                write_keyword(out, keyword_name(&line[i..]), &value);
                i += consumed;
            }
            Some((consumed, Replacement::Log)) => {
                log_prefix = Some(line[..i].to_vec());
                write_keyword(out, b"Log", ctx.rcs_file());
                i += consumed;
            }
            None => {
                out.push(b'$');
                i += 1;
            }
        }
    }

    if let Some(prefix) = log_prefix {
        out.extend_from_slice(&prefix);
        out.extend_from_slice(
            format!(
                "Revision {}  {}  {}\n",
                ctx.revision,
                ctx.date(),
                ctx.author
            )
            .as_bytes(),
        );

        let mut lines: Vec<&str> = ctx.log.split('\n').collect();
        if lines.last() == Some(&"") {
            lines.pop();
        }
        for logline in lines {
            out.extend_from_slice(&prefix);
            out.extend_from_slice(logline.as_bytes());
            out.push(b'\n');
        }
    }
}

/// Matches a keyword token starting at the `$` in `input`. Returns the
/// number of bytes consumed and the replacement, or None when the token is
/// not a recognised keyword.
fn match_keyword(input: &[u8], ctx: &Context) -> Option<(usize, Replacement)> {
    let name = keyword_name(input);
    if name.is_empty() {
        return None;
    }

    let after = &input[1 + name.len()..];
    let consumed = match after.first() {
        Some(b'$') => 1 + name.len() + 1,
        Some(b':') => {
            // The old value runs to the next `$` on the same line.
            let close = after.iter().position(|&b| b == b'$')?;
            if after[..close].contains(&b'\n') {
                return None;
            }
            1 + name.len() + close + 1
        }
        _ => return None,
    };

    let replacement = match name {
        b"Author" => Replacement::Value(ctx.author.into()),
        b"Date" => Replacement::Value(ctx.date()),
        b"Header" => Replacement::Value(ctx.id_value(ctx.rcs_path)),
        b"Id" => Replacement::Value(ctx.id_value(ctx.rcs_file())),
        b"Locker" | b"Name" => Replacement::Value(String::new()),
        b"Log" => Replacement::Log,
        b"Mdocdate" => Replacement::Value(ctx.mdocdate()),
        b"RCSfile" => Replacement::Value(ctx.rcs_file().into()),
        b"Revision" => Replacement::Value(ctx.revision.into()),
        b"Source" => Replacement::Value(ctx.rcs_path.into()),
        b"State" => Replacement::Value(ctx.state.into()),
        _ => match ctx.local_id {
            Some(local_id) if name == local_id.as_bytes() => {
                Replacement::Value(ctx.id_value(ctx.rcs_file()))
            }
            _ => return None,
        },
    };

    Some((consumed, replacement))
}

/// The keyword name following the `$` at the start of `input`.
fn keyword_name(input: &[u8]) -> &[u8] {
    let rest = &input[1..];
    let len = rest
        .iter()
        .take_while(|&&b| b.is_ascii_alphanumeric() || b == b'_')
        .count();
    &rest[..len]
}

fn write_keyword(out: &mut Vec<u8>, name: &[u8], value: &str) {
    out.push(b'$');
    out.extend_from_slice(name);
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(b" $");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context<'static> {
        Context {
            rcs_path: "/cvs/module/file,v",
            revision: "1.1",
            // 2011-04-25T22:30:48Z.
            timestamp: 1303770648,
            author: "uwe",
            state: "Exp",
            log: "Initial revision\n",
            local_id: None,
        }
    }

    fn expand_str(data: &[u8], ctx: &Context) -> String {
        String::from_utf8(expand(data, ctx)).unwrap()
    }

    #[test]
    fn test_active() {
        assert!(active(None, ""));
        assert!(active(Some(b""), ""));
        assert!(active(Some(b"kv"), ""));

        assert!(!active(None, "b"));
        assert!(!active(Some(b"b"), ""));
        assert!(!active(Some(b"o"), ""));
        assert!(!active(Some(b"kvl"), ""));
    }

    #[test]
    fn test_id() {
        assert_eq!(
            expand_str(b"/* $Id$ */\n", &ctx()),
            "/* $Id: file,v 1.1 2011/04/25 22:30:48 uwe Exp $ */\n"
        );

        // Previously expanded values are replaced, not appended to.
        assert_eq!(
            expand_str(b"$Id: file,v 1.0 1999/01/01 00:00:00 who Exp $\n", &ctx()),
            "$Id: file,v 1.1 2011/04/25 22:30:48 uwe Exp $\n"
        );
    }

    #[test]
    fn test_simple_keywords() {
        assert_eq!(expand_str(b"$Author$", &ctx()), "$Author: uwe $");
        assert_eq!(
            expand_str(b"$Date$", &ctx()),
            "$Date: 2011/04/25 22:30:48 $"
        );
        assert_eq!(expand_str(b"$Revision$", &ctx()), "$Revision: 1.1 $");
        assert_eq!(
            expand_str(b"$Source$", &ctx()),
            "$Source: /cvs/module/file,v $"
        );
        assert_eq!(
            expand_str(b"$Header$", &ctx()),
            "$Header: /cvs/module/file,v 1.1 2011/04/25 22:30:48 uwe Exp $"
        );
        assert_eq!(expand_str(b"$RCSfile$", &ctx()), "$RCSfile: file,v $");
        assert_eq!(expand_str(b"$State$", &ctx()), "$State: Exp $");
        assert_eq!(expand_str(b"$Locker$", &ctx()), "$Locker:  $");
        assert_eq!(expand_str(b"$Name$", &ctx()), "$Name:  $");
        assert_eq!(
            expand_str(b"$Mdocdate$", &ctx()),
            "$Mdocdate: April 25 2011 $"
        );
    }

    #[test]
    fn test_unknown_left_alone() {
        assert_eq!(expand_str(b"$Frobnicate$", &ctx()), "$Frobnicate$");
        assert_eq!(expand_str(b"a $ sign", &ctx()), "a $ sign");
        assert_eq!(expand_str(b"$Id", &ctx()), "$Id");
        // An unterminated colon form never closes on this line.
        assert_eq!(expand_str(b"$Id: no close\n", &ctx()), "$Id: no close\n");
    }

    #[test]
    fn test_local_id() {
        let mut context = ctx();
        context.local_id = Some("OpenBSD");

        assert_eq!(
            expand_str(b"$OpenBSD$", &context),
            "$OpenBSD: file,v 1.1 2011/04/25 22:30:48 uwe Exp $"
        );
    }

    #[test]
    fn test_log() {
        assert_eq!(
            expand_str(b" * $Log$\n", &ctx()),
            " * $Log: file,v $\n * Revision 1.1  2011/04/25 22:30:48  uwe\n * Initial revision\n"
        );
    }

    #[test]
    fn test_log_multiline_message() {
        let mut context = ctx();
        context.log = "first line\nsecond line\n";

        assert_eq!(
            expand_str(b"# $Log$\n", &context),
            "# $Log: file,v $\n# Revision 1.1  2011/04/25 22:30:48  uwe\n# first line\n# second line\n"
        );
    }

    #[test]
    fn test_multiple_keywords_on_one_line() {
        assert_eq!(
            expand_str(b"$Revision$ by $Author$\n", &ctx()),
            "$Revision: 1.1 $ by $Author: uwe $\n"
        );
    }
}
