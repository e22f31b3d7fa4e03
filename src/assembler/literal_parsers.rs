use nom::types::CompleteStr;
use nom::{digit, hex_digit};

/// A 16-bit literal, decimal or `0x` hexadecimal. Values that do not fit in
/// a word fail the parse.
named!(pub literal<CompleteStr, u16>,
    alt!(
        map_res!(
            preceded!(tag_no_case!("0x"), hex_digit),
            |s: CompleteStr| u16::from_str_radix(s.0, 16)
        ) |
        map_res!(digit, |s: CompleteStr| s.parse::<u16>())
    )
);
