use nom::{
    bytes::complete::tag,
    character::complete::{multispace0, multispace1},
    combinator::{map, opt, value, verify},
    error::{Error as NomError, ErrorKind},
    multi::many0,
    sequence::{delimited, preceded, separated_pair, terminated, tuple},
    IResult,
};

use crate::{Admin, Delta, DeltaText, File, Num};

mod scalar;
use self::scalar::*;

/// Keywords that terminate the section a newphrase may appear in. A
/// newphrase must not swallow them, or the sections after it can no longer
/// be recognised.
const RESERVED: &[&[u8]] = &[
    b"head", b"branch", b"access", b"symbols", b"locks", b"strict", b"comment", b"expand",
    b"date", b"author", b"state", b"branches", b"next", b"desc", b"log", b"text",
];

pub(crate) fn file(input: &[u8]) -> IResult<&[u8], File> {
    map(
        tuple((
            delimited(multispace0, admin, multispace0),
            many0(terminated(delta, multispace0)),
            terminated(desc, multispace0),
            many0(terminated(delta_text, multispace0)),
        )),
        |(admin, deltas, desc, texts)| File {
            admin,
            desc,
            deltas: deltas.into_iter().collect(),
            texts: texts.into_iter().collect(),
        },
    )(input)
}

/// The `;` closing a phrase, with surrounding whitespace.
fn phrase_end(input: &[u8]) -> IResult<&[u8], ()> {
    value((), tuple((multispace0, tag(b";"), multispace0)))(input)
}

fn admin(input: &[u8]) -> IResult<&[u8], Admin> {
    map(
        tuple((
            delimited(tuple((tag(b"head"), multispace0)), opt(num), phrase_end),
            map(
                opt(delimited(
                    tuple((tag(b"branch"), multispace0)),
                    opt(num),
                    phrase_end,
                )),
                Option::flatten,
            ),
            delimited(
                tag(b"access"),
                many0(preceded(multispace1, id)),
                phrase_end,
            ),
            delimited(tag(b"symbols"), many0(symbol_pair), phrase_end),
            delimited(tag(b"locks"), many0(lock_pair), phrase_end),
            map(opt(tuple((tag(b"strict"), phrase_end))), |strict| {
                strict.is_some()
            }),
            opt(delimited(
                tuple((tag(b"comment"), multispace0)),
                opt(string),
                phrase_end,
            )),
            opt(delimited(
                tuple((tag(b"expand"), multispace0)),
                opt(string),
                phrase_end,
            )),
            many0(newphrase),
        )),
        |(head, branch, access, symbols, locks, strict, comment, expand, _)| Admin {
            head,
            branch,
            access,
            symbols,
            locks,
            strict,
            comment: comment.flatten(),
            expand: expand.flatten(),
        },
    )(input)
}

fn symbol_pair(input: &[u8]) -> IResult<&[u8], (Vec<u8>, Num)> {
    separated_pair(
        delimited(multispace0, id, multispace0),
        tag(b":"),
        delimited(multispace0, num, multispace0),
    )(input)
}

fn lock_pair(input: &[u8]) -> IResult<&[u8], (Vec<u8>, Num)> {
    symbol_pair(input)
}

fn delta(input: &[u8]) -> IResult<&[u8], (Num, Delta)> {
    map(
        tuple((
            terminated(num, multispace1),
            delimited(tuple((tag(b"date"), multispace0)), date, phrase_end),
            delimited(tuple((tag(b"author"), multispace0)), id, phrase_end),
            delimited(tuple((tag(b"state"), multispace0)), opt(id), phrase_end),
            delimited(
                tag(b"branches"),
                many0(preceded(multispace1, num)),
                phrase_end,
            ),
            delimited(tuple((tag(b"next"), multispace0)), opt(num), phrase_end),
            many0(newphrase),
        )),
        |(num, date, author, state, branches, next, _)| {
            (
                num,
                Delta {
                    date,
                    author,
                    state: state.unwrap_or_default(),
                    branches,
                    next,
                },
            )
        },
    )(input)
}

fn desc(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    preceded(tuple((tag(b"desc"), multispace0)), string)(input)
}

fn delta_text(input: &[u8]) -> IResult<&[u8], (Num, DeltaText)> {
    map(
        tuple((
            num,
            preceded(multispace1, tag(b"log")),
            preceded(multispace0, string),
            delimited(multispace0, many0(newphrase), multispace0),
            tag(b"text"),
            preceded(multispace0, string),
        )),
        |(num, _, log, _, _, text)| (num, DeltaText { log, text }),
    )(input)
}

/// Skips a `newphrase`: an unknown keyword followed by words up to the next
/// semicolon. RCS and CVS both extend the format this way (`commitid`,
/// `integrity`, ...); tolerating them keeps the parser forward-compatible.
fn newphrase(input: &[u8]) -> IResult<&[u8], ()> {
    let (input, _) = verify(id, |key: &Vec<u8>| {
        !key[0].is_ascii_digit() && !RESERVED.contains(&key.as_slice())
    })(input)?;

    value((), tuple((many0(preceded(multispace0, word)), phrase_end)))(input)
}

fn word(input: &[u8]) -> IResult<&[u8], ()> {
    if input.first() == Some(&b';') {
        return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
    }

    nom::branch::alt((
        value((), string),
        value((), tag(b":")),
        value((), id),
        value((), numlike),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin() {
        let (rest, have) = admin(
            &b"head\t1.4;\naccess;\nsymbols\n\tRELEASE_1:1.1.1.1\n\tvendor:1.1.1;\nlocks; strict;\ncomment\t@ * @;\n\n"[..],
        )
        .unwrap();

        assert_eq!(rest, b"");
        assert_eq!(have.head.unwrap().to_string(), "1.4");
        assert!(have.branch.is_none());
        assert!(have.access.is_empty());
        assert_eq!(have.symbols.len(), 2);
        assert_eq!(have.symbols[0].0, b"RELEASE_1".to_vec());
        assert_eq!(have.symbols[1].1.to_string(), "1.1.1");
        assert!(have.locks.is_empty());
        assert!(have.strict);
        assert_eq!(have.comment.unwrap(), b" * ".to_vec());
        assert!(have.expand.is_none());
    }

    #[test]
    fn test_admin_branch_and_expand() {
        let have = admin(&b"head\t1.1;\nbranch\t1.1.1;\naccess;\nsymbols;\nlocks; strict;\nexpand\t@b@;\n"[..])
            .unwrap()
            .1;

        assert_eq!(have.branch.unwrap().to_string(), "1.1.1");
        assert_eq!(have.expand.unwrap(), b"b".to_vec());
    }

    #[test]
    fn test_admin_empty_head() {
        let have = admin(&b"head;\naccess;\nsymbols;\nlocks;\n"[..]).unwrap().1;
        assert!(have.head.is_none());
        assert!(!have.strict);
    }

    #[test]
    fn test_delta() {
        let (num, have) = delta(
            &b"1.2\ndate\t2021.08.20.17.34.26;\tauthor adam;\tstate Exp;\nbranches\n\t1.2.2.1\n\t1.2.4.1;\nnext\t1.1;\ncommitid\tabcDEF123;\n"[..],
        )
        .unwrap()
        .1;

        assert_eq!(num.to_string(), "1.2");
        assert_eq!(have.author, b"adam".to_vec());
        assert_eq!(have.state, b"Exp".to_vec());
        assert_eq!(
            have.branches
                .iter()
                .map(|b| b.to_string())
                .collect::<Vec<_>>(),
            vec!["1.2.2.1", "1.2.4.1"]
        );
        assert_eq!(have.next.unwrap().to_string(), "1.1");
    }

    #[test]
    fn test_delta_empty_next() {
        let (_, have) = delta(&b"1.1\ndate\t98.01.12.04.05.06;\tauthor uwe;\tstate dead;\nbranches;\nnext\t;\n"[..])
            .unwrap()
            .1;

        assert_eq!(have.state, b"dead".to_vec());
        assert!(have.next.is_none());
        assert!(have.branches.is_empty());
    }

    #[test]
    fn test_desc() {
        assert_eq!(desc(b"desc\n@@").unwrap().1, b"");
        assert_eq!(desc(b"desc @one@@two@").unwrap().1, b"one@two");
    }

    #[test]
    fn test_delta_text() {
        let (num, have) = delta_text(&b"1.1\nlog\n@Initial revision\n@\ntext\n@d5 3\n@"[..])
            .unwrap()
            .1;

        assert_eq!(num.to_string(), "1.1");
        assert_eq!(have.log, b"Initial revision\n".to_vec());
        assert_eq!(have.text, b"d5 3\n".to_vec());

        let (num, have) = delta_text(b"1.2 log @@ text @@").unwrap().1;
        assert_eq!(num.to_string(), "1.2");
        assert!(have.log.is_empty());
        assert!(have.text.is_empty());
    }

    #[test]
    fn test_file() {
        let have = file(include_bytes!("../fixtures/hello.c,v")).unwrap().1;

        assert_eq!(have.admin.head.as_ref().unwrap().to_string(), "1.2");
        assert_eq!(have.deltas.len(), 2);
        assert_eq!(have.texts.len(), 2);
        assert!(have.desc.is_empty());

        let head = have.admin.head.as_ref().unwrap();
        let delta = have.deltas.get(head).unwrap();
        assert_eq!(delta.author, b"uwe".to_vec());
        assert_eq!(delta.next.as_ref().unwrap().to_string(), "1.1");
    }
}
