// Based on rust-minidump (https://github.com/rust-minidump/rust-minidump):
// > Copyright 2015 Ted Mielczarek.
// >
// > Copyright (c) 2015-2023 rust-minidump contributors
// >
// > Permission is hereby granted, free of charge, to any person
// > obtaining a copy of this software and associated documentation
// > files (the "Software"), to deal in the Software without
// > restriction, including without limitation the rights to use, copy,
// > modify, merge, publish, distribute, sublicense, and/or sell
// > copies of the Software, and to permit persons to whom the
// > Software is furnished to do so, subject to the following
// > conditions:
// > The above copyright notice and this permission notice shall be
// > included in all copies or substantial portions of the Software.
// >
// > THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// > IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// > FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// > AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// > LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// > FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// > DEALINGS IN THE SOFTWARE.

//! Parser for the CFI records of Breakpad symbol data.
//!
//! Symbol data is line based. Only `STACK CFI INIT` records and their
//! `STACK CFI` delta records are retained; all other record types
//! (`MODULE`, `INFO`, `FILE`, `INLINE_ORIGIN`, `PUBLIC`, `FUNC` and its
//! line and `INLINE` records, `STACK WIN`) are recognized and skipped.
//!
//! See <https://github.com/google/breakpad/blob/main/docs/symbol_files.md>

use std::mem;
use std::ops::BitOr;
use std::ops::Shl;
use std::str;

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::bytes::complete::take_while;
use nom::character::complete::multispace0;
use nom::character::complete::space1;
use nom::combinator::cut;
use nom::combinator::map;
use nom::combinator::map_res;
use nom::error::convert_error as stringify_error;
use nom::error::ErrorKind;
use nom::error::ParseError;
use nom::error::VerboseError;
use nom::sequence::terminated;
use nom::sequence::tuple;
use nom::Err;
use nom::IResult;

use crate::log;
use crate::types::CfiTable;
use crate::types::DeltaRule;
use crate::types::InitRule;
use crate::Error;
use crate::ErrorExt as _;
use crate::Result;


fn convert_nom_err_to_error(input: &[u8], err: Err<VerboseError<&[u8]>>) -> Error {
    match err {
        Err::Incomplete(_needed) => Error::with_invalid_input(
            "got incomplete input, additional bytes are necessary to parse",
        ),
        Err::Error(err) | Err::Failure(err) => {
            let errors = err
                .errors
                .into_iter()
                .map(|(err, kind)| (String::from_utf8_lossy(err), kind))
                .collect();
            let err = VerboseError { errors };
            Error::with_invalid_input(stringify_error(String::from_utf8_lossy(input), err))
        }
    }
}


/// A single parsed line of symbol data.
#[derive(Debug)]
enum Line {
    Module,
    Info,
    File,
    InlineOrigin,
    Public,
    Function,
    StackWin,
    CfiInit(InitRule),
}

/// Match a hex string, parse it to a u32 or a u64.
fn hex_str<T: Shl<T, Output = T> + BitOr<T, Output = T> + From<u8>>(
    input: &[u8],
) -> IResult<&[u8], T, VerboseError<&[u8]>> {
    // Consume up to max_len digits. For u32 that's 8 digits and for u64
    // that's 16 digits. Two hex digits form one byte.
    let max_len = mem::size_of::<T>() * 2;

    let mut res: T = T::from(0);
    let mut k = 0;
    for v in input.iter().take(max_len) {
        let digit = match (*v as char).to_digit(16) {
            Some(v) => v,
            None => break,
        };
        res = res << T::from(4);
        res = res | T::from(digit as u8);
        k += 1;
    }
    if k == 0 {
        return Err(Err::Error(VerboseError::from_error_kind(
            input,
            ErrorKind::HexDigit,
        )))
    }
    let remaining = &input[k..];
    Ok((remaining, res))
}

/// Match a decimal string, parse it to a u32.
fn decimal_u32(input: &[u8]) -> IResult<&[u8], u32, VerboseError<&[u8]>> {
    const MAX_LEN: usize = 10; // u32::MAX has 10 decimal digits
    let mut res: u64 = 0;
    let mut k = 0;
    for v in input.iter().take(MAX_LEN) {
        let digit = *v as char;
        let digit_value = match digit.to_digit(10) {
            Some(v) => v,
            None => break,
        };
        res = res * 10 + u64::from(digit_value);
        k += 1;
    }
    if k == 0 {
        return Err(Err::Error(VerboseError::from_error_kind(
            input,
            ErrorKind::Digit,
        )))
    }
    let res = u32::try_from(res)
        .map_err(|_| Err::Error(VerboseError::from_error_kind(input, ErrorKind::TooLarge)))?;
    let remaining = &input[k..];
    Ok((remaining, res))
}

/// Accept `\n` with an arbitrary number of preceding `\r` bytes.
///
/// This is different from `line_ending` which doesn't accept `\r` if it
/// isn't followed by `\n`.
fn my_eol(input: &[u8]) -> IResult<&[u8], &[u8], VerboseError<&[u8]>> {
    let (input, _cr) = take_while(|b| b == b'\r')(input)?;
    tag("\n")(input)
}

/// Accept everything except `\r` and `\n`.
///
/// This is different from `not_line_ending` which rejects its input if
/// it's followed by a `\r` which is not immediately followed by a `\n`.
fn not_my_eol(input: &[u8]) -> IResult<&[u8], &[u8], VerboseError<&[u8]>> {
    take_while(|b| b != b'\r' && b != b'\n')(input)
}

/// Matches a record whose contents we do not care about: the given tag,
/// at least one space, and the remainder of the line.
fn skipped_line<'i>(
    record: &'static str,
) -> impl FnMut(&'i [u8]) -> IResult<&'i [u8], (), VerboseError<&'i [u8]>> {
    move |input| {
        let (input, _) = terminated(tag(record), space1)(input)?;
        let (input, _rest) = cut(terminated(not_my_eol, my_eol))(input)?;
        Ok((input, ()))
    }
}

/// Matches line data after a FUNC record.
fn func_line_data(input: &[u8]) -> IResult<&[u8], (), VerboseError<&[u8]>> {
    let (input, (_addr, _size, _line, _file)) = tuple((
        terminated(hex_str::<u64>, space1),
        terminated(hex_str::<u32>, space1),
        terminated(decimal_u32, space1),
        terminated(decimal_u32, my_eol),
    ))(input)?;
    Ok((input, ()))
}

/// Matches a STACK CFI INIT record.
fn stack_cfi_init(input: &[u8]) -> IResult<&[u8], InitRule, VerboseError<&[u8]>> {
    let (input, _) = terminated(tag("STACK CFI INIT"), space1)(input)?;
    let (input, (addr, size, rules)) = cut(tuple((
        terminated(hex_str::<u64>, space1),
        terminated(hex_str::<u32>, space1),
        terminated(map_res(not_my_eol, str::from_utf8), my_eol),
    )))(input)?;

    let init = InitRule {
        addr,
        size,
        rules: rules.to_string(),
    };
    Ok((input, init))
}

/// Matches a STACK CFI delta record.
///
/// The rule text is kept verbatim; it is only parsed when a lookup
/// actually walks past this record.
fn stack_cfi_delta(input: &[u8]) -> IResult<&[u8], DeltaRule, VerboseError<&[u8]>> {
    let (input, _) = terminated(tag("STACK CFI"), space1)(input)?;
    let (input, (addr, rules)) = cut(tuple((
        terminated(hex_str::<u64>, space1),
        terminated(map_res(not_my_eol, str::from_utf8), my_eol),
    )))(input)?;

    let delta = DeltaRule {
        addr,
        rules: rules.to_string(),
    };
    Ok((input, delta))
}

/// Parse any of the line data that can occur at the top level of symbol
/// data.
fn line(input: &[u8]) -> IResult<&[u8], Line, VerboseError<&[u8]>> {
    terminated(
        alt((
            map(skipped_line("INFO"), |()| Line::Info),
            map(skipped_line("FILE"), |()| Line::File),
            map(skipped_line("INLINE_ORIGIN"), |()| Line::InlineOrigin),
            map(skipped_line("PUBLIC"), |()| Line::Public),
            map(skipped_line("FUNC"), |()| Line::Function),
            map(skipped_line("STACK WIN"), |()| Line::StackWin),
            map(stack_cfi_init, Line::CfiInit),
            map(skipped_line("MODULE"), |()| Line::Module),
        )),
        multispace0,
    )(input)
}


/// A streaming parser for the CFI records of Breakpad symbol data.
///
/// Use this by repeatedly calling [`parse_more`][Self::parse_more]
/// until the whole input is consumed. Then call
/// [`finish`][Self::finish].
#[derive(Debug, Default)]
pub(crate) struct CfiParser {
    init_rules: Vec<InitRule>,
    delta_rules: Vec<DeltaRule>,
    lines: u64,
    cur_item: Option<Line>,
}

impl CfiParser {
    /// Create a new [`CfiParser`].
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Parse as much of the input as possible and return how many bytes
    /// of it were used. The *unused* portion of the input must be
    /// resubmitted on subsequent calls to `parse_more` (along with more
    /// data so we can make progress on the parse).
    pub(crate) fn parse_more(&mut self, mut input: &[u8]) -> Result<usize> {
        // We parse the input line-by-line, so trim away any part of the
        // input that comes after the last newline (this is necessary
        // for streaming parsing, as it can otherwise be impossible to
        // tell if a line is truncated.)
        input = if let Some(idx) = input.iter().rposition(|&x| x == b'\n') {
            &input[..idx + 1]
        } else {
            // If there's no newline, then we can't process anything!
            return Ok(0)
        };
        // Remember the (truncated) input so that we can tell how many
        // bytes we've consumed.
        let orig_input = input;

        loop {
            // If there's no more input, then we've consumed all of it
            // (except for the partial line we trimmed away).
            if input.is_empty() {
                return Ok(orig_input.len())
            }

            // First check if we're currently processing sublines of a
            // multi-line item, i.e., `FUNC` or `STACK CFI INIT`. If we
            // are, parse the next line as its subline format.
            //
            // If we encounter an error, this probably means we've
            // reached a new item (which ends this one). To handle this,
            // we can just finish off the current item and resubmit this
            // line to the top-level parser (below). If the line is
            // genuinely corrupt, then the top-level parser will also
            // fail to read it.
            //
            // We `take` and then reconstitute the item for
            // borrowing/move reasons.
            match self.cur_item.take() {
                Some(Line::Function) => match func_subline(input) {
                    Ok((new_input, ())) => {
                        input = new_input;
                        self.cur_item = Some(Line::Function);
                        self.lines += 1;
                        continue
                    }
                    Err(_) => {
                        self.finish_item(Line::Function);
                        continue
                    }
                },
                Some(Line::CfiInit(init)) => match stack_cfi_delta(input) {
                    Ok((new_input, delta)) => {
                        input = new_input;
                        let () = self.delta_rules.push(delta);
                        self.cur_item = Some(Line::CfiInit(init));
                        self.lines += 1;
                        continue
                    }
                    Err(_) => {
                        self.finish_item(Line::CfiInit(init));
                        continue
                    }
                },
                _ => {
                    // We're not parsing sublines, move on to the top
                    // level parser!
                }
            }

            // Parse a top-level item, and first handle the Result.
            let line = match line(input) {
                Ok((new_input, line)) => {
                    // Success! Advance the input.
                    input = new_input;
                    line
                }
                Err(err) => {
                    // The data has a completely corrupt line,
                    // conservatively reject the entire parse.
                    return Err(convert_nom_err_to_error(input, err))
                        .context("failed to parse symbol data")
                }
            };

            // Now store the item (or make it the cur_item if it has
            // potential sublines we need to handle first).
            match line {
                Line::Module => {
                    // We don't use this but it MUST be the first line.
                    if self.lines != 0 {
                        return Err(Error::with_invalid_input(
                            "MODULE line found after the start of the symbol data",
                        ))
                    }
                }
                Line::Info | Line::File | Line::InlineOrigin | Line::Public | Line::StackWin => {}
                item @ Line::Function => {
                    // More sublines to skip.
                    self.cur_item = Some(item);
                }
                item @ Line::CfiInit(..) => {
                    // More sublines to parse.
                    self.cur_item = Some(item);
                }
            }

            // Make note that we've consumed a line of input.
            self.lines += 1;
        }
    }

    /// Finish processing an item (`cur_item`) which had sublines. We
    /// now have all the sublines, so it's complete.
    fn finish_item(&mut self, item: Line) {
        match item {
            Line::Function => {}
            Line::CfiInit(init) => {
                let () = self.init_rules.push(init);
            }
            _ => unreachable!(),
        }
    }

    /// Finish the parse and create the final [`CfiTable`].
    ///
    /// Call this when the parser has consumed all the input.
    pub(crate) fn finish(mut self) -> CfiTable {
        // If there's a pending multiline item, finish it now.
        if let Some(item) = self.cur_item.take() {
            let () = self.finish_item(item);
        }

        // Now sort everything and bundle it up in its final format.
        let mut init_rules = self.init_rules;
        let () = init_rules.sort_by_key(|rule| (rule.addr, rule.size));

        // Delta addresses are unique per module; if the input repeats
        // an address the last record wins. The sort is stable, so equal
        // addresses retain input order here.
        let mut delta_rules = self.delta_rules;
        let () = delta_rules.sort_by_key(|rule| rule.addr);
        let () = delta_rules.dedup_by(|cur, prev| {
            if cur.addr == prev.addr {
                log::warn!(
                    "duplicate STACK CFI record at {:#x}; keeping the last one",
                    cur.addr
                );
                let () = mem::swap(prev, cur);
                true
            } else {
                false
            }
        });

        CfiTable {
            init_rules,
            delta_rules,
        }
    }
}

/// Parses a single line which is following a FUNC line.
///
/// FUNC sublines carry source line data which is of no interest here,
/// so all of them are skipped.
fn func_subline(input: &[u8]) -> IResult<&[u8], (), VerboseError<&[u8]>> {
    // A FUNC record can have three different types of sublines:
    // INLINE_ORIGIN, INLINE, or line records. Check them one by one.
    if input.starts_with(b"INLINE_ORIGIN ") {
        return skipped_line("INLINE_ORIGIN")(input)
    }
    if input.starts_with(b"INLINE ") {
        return skipped_line("INLINE")(input)
    }
    func_line_data(input)
}


impl CfiTable {
    /// Parse a [`CfiTable`] from Breakpad symbol data.
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<CfiTable> {
        let mut parser = CfiParser::new();
        let consumed = parser.parse_more(bytes)?;
        if consumed == 0 {
            return Err(Error::with_invalid_input(
                "empty symbol data (probably something wrong with your debuginfo tooling?)",
            ))
        }
        if consumed != bytes.len() {
            return Err(Error::with_invalid_input(
                "failed to parse symbol data: parser expects more data",
            ))
        }

        let table = parser.finish();
        Ok(table)
    }
}
