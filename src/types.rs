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

use crate::util::find_match_or_lower_bound_by_key;
use crate::Addr;


/// An initial set of register recovery rules, valid for a range of
/// instructions (a `STACK CFI INIT` record).
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct InitRule {
    /// The start address of the covered range, relative to the module's
    /// load address.
    ///
    /// This field is declared first so that a derived ordering would
    /// sort by address first. We take advantage of the sort order
    /// during address lookup.
    pub addr: Addr,
    /// The size of the covered range in bytes.
    pub size: u32,
    /// The rule set text in effect at `addr`.
    pub rules: String,
}

/// An incremental patch to the active rule set, taking effect at a
/// single address (a `STACK CFI` record).
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct DeltaRule {
    /// The address at which the patch takes effect, relative to the
    /// module's load address.
    pub addr: Addr,
    /// The rule set text to overlay onto the active rules.
    pub rules: String,
}


/// The CFI records of a single module.
///
/// Built once at module load time and never modified afterwards;
/// lookups are pure reads.
#[derive(Debug, Default)]
pub(crate) struct CfiTable {
    /// Initial rules, sorted by start address. Ranges are expected to
    /// be non-overlapping; that is the loader's responsibility and not
    /// enforced here.
    pub init_rules: Vec<InitRule>,
    /// Delta rules, sorted by address, with unique addresses.
    pub delta_rules: Vec<DeltaRule>,
}

impl CfiTable {
    /// Find the initial rule whose range covers `addr`.
    pub(crate) fn find_init_rule(&self, addr: Addr) -> Option<&InitRule> {
        let idx = find_match_or_lower_bound_by_key(&self.init_rules, addr, |rule| rule.addr)?;
        for rule in &self.init_rules[idx..] {
            if rule.addr > addr {
                break
            }

            let end = rule.addr.checked_add(u64::from(rule.size))?;
            if addr < end {
                return Some(rule)
            }
        }
        None
    }

    /// Iterate over delta rules in ascending address order, starting
    /// with the first rule at an address greater than or equal to
    /// `addr`.
    pub(crate) fn delta_rules_from(&self, addr: Addr) -> impl Iterator<Item = &DeltaRule> {
        let idx = self.delta_rules.partition_point(|rule| rule.addr < addr);
        self.delta_rules[idx..].iter()
    }
}
