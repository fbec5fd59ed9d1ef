//! Register recovery rule sets and their textual grammar.
//!
//! A rule set string is a sequence of whitespace separated tokens. A
//! token ending in `:` names a register (with the colon stripped); the
//! tokens following it, up to the next register token, form that
//! register's recovery expression. For example:
//!
//! ```text
//! .cfa: $rsp 8 + .ra: .cfa -8 + ^
//! ```
//!
//! The expression language itself is opaque to this crate; expressions
//! are stored and returned verbatim for the stack walker to evaluate.

use std::collections::HashMap;

use nom::bytes::complete::take_while1;
use nom::character::complete::multispace0;
use nom::combinator::all_consuming;
use nom::combinator::verify;
use nom::error::convert_error as stringify_error;
use nom::error::VerboseError;
use nom::multi::many1;
use nom::sequence::preceded;
use nom::sequence::terminated;
use nom::Err;
use nom::IResult;

use crate::Error;
use crate::ErrorExt as _;
use crate::Result;


fn convert_nom_err_to_error(input: &str, err: Err<VerboseError<&str>>) -> Error {
    match err {
        Err::Incomplete(_needed) => Error::with_invalid_data(
            "got incomplete input, additional bytes are necessary to parse",
        ),
        Err::Error(err) | Err::Failure(err) => {
            Error::with_invalid_data(stringify_error(input, err))
        }
    }
}


/// Match a single whitespace separated token.
fn token(input: &str) -> IResult<&str, &str, VerboseError<&str>> {
    preceded(multispace0, take_while1(|c: char| !c.is_whitespace()))(input)
}

/// Match a register token: a token ending in `:`, with a non-empty
/// name. Produces the name with the colon stripped.
fn register_name(input: &str) -> IResult<&str, &str, VerboseError<&str>> {
    let (input, tok) = verify(token, |tok: &str| tok.len() > 1 && tok.ends_with(':'))(input)?;
    Ok((input, &tok[..tok.len() - 1]))
}

/// Match a single expression token, i.e., any token that does not start
/// a new rule.
fn expr_token(input: &str) -> IResult<&str, &str, VerboseError<&str>> {
    verify(token, |tok: &str| !tok.ends_with(':'))(input)
}

/// Match a single rule: a register name followed by at least one
/// expression token.
fn rule(input: &str) -> IResult<&str, (&str, String), VerboseError<&str>> {
    let (input, name) = register_name(input)?;
    let (input, tokens) = many1(expr_token)(input)?;
    Ok((input, (name, tokens.join(" "))))
}

/// Match a complete rule set string.
///
/// At least one rule is required and no input may remain: an empty
/// string, an expression token before any register name, and a register
/// without an expression are all rejected.
fn rule_set(input: &str) -> IResult<&str, Vec<(&str, String)>, VerboseError<&str>> {
    all_consuming(terminated(many1(rule), multispace0))(input)
}


/// A set of register recovery rules, mapping register names to the
/// expressions describing how to recover the register's value in the
/// previous stack frame.
///
/// Rule sets accumulate: merging additional rule text overwrites rules
/// for registers already present and adds rules for new ones, but never
/// removes a rule.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RuleSet {
    /// The rules, keyed by register name (e.g., `$rbp`, `x29`, or the
    /// pseudo registers `.cfa` and `.ra`).
    rules: HashMap<String, String>,
}

impl RuleSet {
    /// Create a new, empty `RuleSet`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `rule_text` and merge the resulting rules into this set.
    ///
    /// Rules for registers already present are overwritten; rules for
    /// new registers are added. If `rule_text` is malformed an error is
    /// returned and the set is left unmodified.
    pub fn parse_merge(&mut self, rule_text: &str) -> Result<()> {
        let parsed = match rule_set(rule_text) {
            Ok((_input, parsed)) => parsed,
            Err(err) => {
                return Err(convert_nom_err_to_error(rule_text, err))
                    .context("failed to parse CFI rule set")
            }
        };

        for (name, expr) in parsed {
            let _prev = self.rules.insert(name.to_string(), expr);
        }
        Ok(())
    }

    /// Look up the recovery expression for a register.
    pub fn get(&self, register: &str) -> Option<&str> {
        self.rules.get(register).map(String::as_str)
    }

    /// Iterate over all rules as (register, expression) pairs, in
    /// unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules
            .iter()
            .map(|(name, expr)| (name.as_str(), expr.as_str()))
    }

    /// Retrieve the number of rules in the set.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check whether the set contains no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use crate::ErrorKind;


    /// Check that we can parse a representative rule set.
    #[test]
    fn parse_rule_set() {
        let mut rules = RuleSet::new();
        let () = rules.parse_merge(".cfa: $rsp 8 + .ra: .cfa -8 + ^").unwrap();

        assert_eq!(rules.len(), 2);
        assert_eq!(rules.get(".cfa"), Some("$rsp 8 +"));
        assert_eq!(rules.get(".ra"), Some(".cfa -8 + ^"));
        assert_eq!(rules.get("$rbp"), None);
    }

    /// Check that surrounding and repeated whitespace is tolerated.
    #[test]
    fn parse_rule_set_whitespace() {
        let mut rules = RuleSet::new();
        let () = rules.parse_merge("  x29:   .cfa  -16  + ^  ").unwrap();
        assert_eq!(rules.get("x29"), Some(".cfa -16 + ^"));
    }

    /// Check that merging overwrites existing rules and adds new ones.
    #[test]
    fn merge_overwrites_and_adds() {
        let mut rules = RuleSet::new();
        let () = rules.parse_merge(".cfa: $rsp 8 + $rbx: $rbx").unwrap();
        let () = rules.parse_merge(".cfa: $rsp 16 + .ra: .cfa -8 + ^").unwrap();

        assert_eq!(rules.len(), 3);
        assert_eq!(rules.get(".cfa"), Some("$rsp 16 +"));
        assert_eq!(rules.get("$rbx"), Some("$rbx"));
        assert_eq!(rules.get(".ra"), Some(".cfa -8 + ^"));
    }

    /// Make sure that malformed rule text is rejected and leaves the
    /// set untouched.
    #[test]
    fn reject_malformed_rule_text() {
        let malformed = [
            // Nothing to parse.
            "",
            "   ",
            // An expression token before any register name.
            "8",
            "$rsp 8 + .cfa: $rsp",
            // A register without an expression.
            ".cfa:",
            ".cfa: $rsp 8 + .ra:",
            // An empty register name.
            ": 8",
        ];

        for text in malformed {
            let mut rules = RuleSet::new();
            let () = rules.parse_merge(".ra: .cfa -8 + ^").unwrap();

            let err = rules.parse_merge(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidData, "{text}");
            // The previously merged rule is still intact.
            assert_eq!(rules.len(), 1, "{text}");
            assert_eq!(rules.get(".ra"), Some(".cfa -8 + ^"), "{text}");
        }
    }

    /// Check iteration over a rule set's contents.
    #[test]
    fn iterate_rules() {
        let mut rules = RuleSet::new();
        assert!(rules.is_empty());

        let () = rules.parse_merge(".cfa: $rsp 8 + .ra: lr").unwrap();
        let mut pairs = rules.iter().collect::<Vec<_>>();
        let () = pairs.sort();
        assert_eq!(pairs, vec![(".cfa", "$rsp 8 +"), (".ra", "lr")]);
    }
}
