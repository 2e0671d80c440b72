//! Parsing of the marks table a fast-import sink writes via
//! `--export-marks`: one `:<mark> <object id>` line per exported object.

use std::{
    collections::HashMap,
    io::{BufRead, BufReader, Read},
};

use nom::{
    bytes::complete::tag,
    character::complete::{alphanumeric1, digit1, space1},
    combinator::{all_consuming, map_res},
    sequence::{preceded, separated_pair},
    Finish, IResult,
};

use crate::{Error, Mark};

/// Parses a complete marks table into a mark → object id map. Blank lines
/// are ignored; anything else that does not look like a mark line is an
/// error.
pub fn parse<R: Read>(reader: R) -> Result<HashMap<Mark, String>, Error> {
    let mut marks = HashMap::new();

    for (index, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        let (mark, oid) = Finish::finish(mark_line(&line))
            .map_err(|_| Error::MarkParsing {
                line: index + 1,
                content: line.clone(),
            })?
            .1;
        marks.insert(mark, oid.into());
    }

    Ok(marks)
}

fn mark_line(input: &str) -> IResult<&str, (Mark, &str)> {
    all_consuming(separated_pair(
        preceded(tag(":"), map_res(digit1, |raw: &str| raw.parse().map(Mark))),
        space1,
        alphanumeric1,
    ))(input)
}
