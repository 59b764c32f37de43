use winnow::ascii::digit1;
use winnow::combinator::{alt, opt, rest};
use winnow::prelude::*;
use winnow::token::one_of;
use winnow::PResult;

use crate::{EngineVersion, ReleaseKind};

fn component(input: &mut &str) -> PResult<u16> {
    alt((digit1.try_map(str::parse::<u16>), 'x'.value(0u16))).parse_next(input)
}

fn release(input: &mut &str) -> PResult<(ReleaseKind, u8)> {
    (
        one_of(['a', 'b', 'c', 'f', 'p', 'x']).map(ReleaseKind::from_tag),
        digit1.try_map(str::parse::<u8>),
    )
        .parse_next(input)
}

fn version<'s>(input: &mut &'s str) -> PResult<EngineVersion> {
    let major = component.parse_next(input)?;
    '.'.parse_next(input)?;
    let minor = component.parse_next(input)?;
    '.'.parse_next(input)?;
    let build = component.parse_next(input)?;
    let (kind, number) = opt(release)
        .parse_next(input)?
        .unwrap_or((ReleaseKind::Final, 0));
    let _: &'s str = rest.parse_next(input)?;

    Ok(EngineVersion {
        major,
        minor,
        build,
        kind,
        number,
    })
}

pub(crate) fn engine_version(value: &str) -> Option<EngineVersion> {
    version.parse(value.trim()).ok()
}
