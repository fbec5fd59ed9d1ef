//! Per-module CFI frame information lookup.

use crate::log;
use crate::rules::RuleSet;
use crate::types::CfiTable;
use crate::Addr;


/// The CFI data of a single loaded module.
///
/// A `Module` is created by
/// [`CfiResolver::load_module`](crate::CfiResolver::load_module) and
/// owns the parsed CFI records of one object file along with the
/// address at which it is loaded.
#[derive(Debug)]
pub struct Module {
    /// The address at which the module is loaded.
    base_addr: Addr,
    /// The module's CFI records.
    table: CfiTable,
}

impl Module {
    pub(crate) fn new(base_addr: Addr, table: CfiTable) -> Self {
        Self { base_addr, table }
    }

    /// Retrieve the address at which the module is loaded.
    #[inline]
    pub fn base_addr(&self) -> Addr {
        self.base_addr
    }

    /// Find the register recovery rules in effect at `instruction`, an
    /// absolute address inside this module.
    ///
    /// The lookup proceeds in two phases: first the `STACK CFI INIT`
    /// range covering the instruction provides the initial rule set,
    /// then every `STACK CFI` delta of that range with an address less
    /// than or equal to the instruction is merged on top, in ascending
    /// address order.
    ///
    /// Returns `None` if no range covers the instruction or if any of
    /// the walked rule text fails to parse. The two cases are
    /// deliberately indistinguishable here; a caller that cares can
    /// enable the `tracing` feature to see the difference.
    #[cfg_attr(
        feature = "tracing",
        crate::log::instrument(skip_all, fields(instruction = format_args!("{instruction:#x}")))
    )]
    pub fn find_cfi_frame_info(&self, instruction: Addr) -> Option<RuleSet> {
        // CFI records use module relative addresses.
        let addr = instruction.checked_sub(self.base_addr)?;
        let init = self.table.find_init_rule(addr)?;

        let mut rules = RuleSet::new();
        if let Err(err) = rules.parse_merge(&init.rules) {
            log::debug!(
                "failed to parse initial CFI rules at {:#x}: {err}",
                init.addr
            );
            return None
        }

        // Deltas located before the range's start address belong to
        // other ranges and are never replayed, even if the producer
        // emitted them out of place.
        for delta in self.table.delta_rules_from(init.addr) {
            if delta.addr > addr {
                break
            }
            if let Err(err) = rules.parse_merge(&delta.rules) {
                log::debug!("failed to parse CFI delta at {:#x}: {err}", delta.addr);
                return None
            }
        }
        Some(rules)
    }
}
