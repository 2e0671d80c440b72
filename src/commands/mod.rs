//! Subcommand implementations.

pub(crate) mod clone;
pub(crate) mod fetch;
pub(crate) mod init;
pub(crate) mod pull;

use std::{path::PathBuf, time::Duration};

use structopt::StructOpt;

/// Options shared by every command that runs the import pipeline.
#[derive(Debug, StructOpt)]
pub(crate) struct ImportOpt {
    #[structopt(
        long,
        default_value = "60s",
        parse(try_from_str = parse_duration::parse::parse),
        help = "time a changeset must stay unmodified before it is considered complete"
    )]
    pub(crate) quiet_period: Duration,

    #[structopt(
        long,
        value_name = "COUNT",
        help = "stop importing after COUNT new commits"
    )]
    pub(crate) limit: Option<usize>,

    #[structopt(
        long,
        value_name = "FILE",
        parse(from_os_str),
        help = "file mapping CVS logins to full names and e-mail addresses"
    )]
    pub(crate) authors: Option<PathBuf>,

    #[structopt(
        long,
        help = "fail before importing anything if an author has no mapping"
    )]
    pub(crate) stop_on_unknown_author: bool,

    #[structopt(
        long,
        value_name = "DOMAIN",
        help = "e-mail domain for authors without an explicit mapping"
    )]
    pub(crate) domain: Option<String>,

    #[structopt(
        long,
        help = "flush changesets still inside the quiet period instead of holding them for the next pull"
    )]
    pub(crate) no_skip_latest: bool,

    #[structopt(long, help = "record per-file provenance as notes on refs/notes/cvs")]
    pub(crate) notes: bool,

    #[structopt(
        long = "ref",
        default_value = "refs/cvs/HEAD",
        value_name = "REF",
        help = "target ref for imported commits"
    )]
    pub(crate) target_ref: String,
}
