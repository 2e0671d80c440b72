use std::convert::TryFrom;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till1, take_while1},
    combinator::{map, map_opt, map_res, value},
    multi::fold_many0,
    sequence::delimited,
    IResult,
};

use crate::Num;

/// RCS identifier characters: any visible character that is not special to
/// the grammar. Digits are allowed, so callers that must not swallow a
/// revision number have to check the first character themselves.
pub(super) fn is_idchar(c: u8) -> bool {
    (b'!'..=b'~').contains(&c) && !matches!(c, b'$' | b',' | b'.' | b':' | b';' | b'@')
}

pub(super) fn numlike(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(|c: u8| c == b'.' || c.is_ascii_digit())(input)
}

pub(super) fn num(input: &[u8]) -> IResult<&[u8], Num> {
    map_res(numlike, Num::try_from)(input)
}

/// An RCS date, `YY.MM.DD.HH.MM.SS` or `YYYY.MM.DD.HH.MM.SS`, converted to
/// seconds since the epoch. Two-digit years are relative to 1900.
pub(super) fn date(input: &[u8]) -> IResult<&[u8], i64> {
    map_opt(numlike, to_timestamp)(input)
}

fn to_timestamp(bytes: &[u8]) -> Option<i64> {
    let parts = std::str::from_utf8(bytes)
        .ok()?
        .split('.')
        .map(|part| part.parse::<u32>().ok())
        .collect::<Option<Vec<u32>>>()?;

    if parts.len() != 6 {
        return None;
    }

    let year = if parts[0] < 100 {
        parts[0] + 1900
    } else {
        parts[0]
    };

    Some(
        chrono::NaiveDate::from_ymd_opt(year as i32, parts[1], parts[2])?
            .and_hms_opt(parts[3], parts[4], parts[5])?
            .timestamp(),
    )
}

pub(super) fn id(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    map(take_while1(is_idchar), Vec::from)(input)
}

/// An `@`-delimited string with `@@` escaping for literal at signs.
pub(super) fn string(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    delimited(
        tag(b"@"),
        fold_many0(
            alt((take_till1(|c| c == b'@'), value(&b"@"[..], tag(b"@@")))),
            Vec::new,
            |mut acc, fragment: &[u8]| {
                acc.extend_from_slice(fragment);
                acc
            },
        ),
        tag(b"@"),
    )(input)
}
