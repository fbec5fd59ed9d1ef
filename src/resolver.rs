//! The [`CfiResolver`], tying together a collection of loaded modules.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::log;
use crate::module::Module;
use crate::rules::RuleSet;
use crate::types::CfiTable;
use crate::Addr;
use crate::Error;
use crate::ErrorExt as _;
use crate::Result;


/// A stack frame to resolve frame information for.
#[derive(Clone, Debug)]
pub struct StackFrame<'frame> {
    /// The instruction address of the frame.
    ///
    /// For the topmost frame this is the faulting or sampled
    /// instruction; for calling frames it is typically the return
    /// address.
    pub instruction: Addr,
    /// The name of the module containing the instruction, as passed to
    /// [`CfiResolver::load_module`].
    pub module: &'frame str,
}


/// A resolver of CFI frame information across a set of loaded modules.
///
/// Symbol data is loaded per module via
/// [`load_module`][Self::load_module] and queried per stack frame via
/// [`find_cfi_frame_info`][Self::find_cfi_frame_info].
#[derive(Debug)]
pub struct CfiResolver {
    /// The loaded modules, keyed by name.
    modules: HashMap<String, Module>,
    /// Whether the process the stack frames come from is big endian.
    big_endian: bool,
}

impl CfiResolver {
    /// Create a new `CfiResolver` for a process of the given endianness.
    ///
    /// The endianness is not consulted by the resolver itself; it is
    /// carried along for the stack walker evaluating the resolved
    /// rules.
    pub fn new(big_endian: bool) -> Self {
        Self {
            modules: HashMap::new(),
            big_endian,
        }
    }

    /// Whether the process the stack frames come from is big endian.
    #[inline]
    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    /// Load a module's symbol data.
    ///
    /// `sym_data` is the contents of the module's Breakpad symbol file
    /// and `base_addr` the address at which the module is loaded in the
    /// process. Fails if a module of this name is already loaded or if
    /// the symbol data is malformed; in both cases the resolver is left
    /// unchanged.
    #[cfg_attr(
        feature = "tracing",
        crate::log::instrument(skip_all, fields(
            name = name,
            base_addr = format_args!("{base_addr:#x}"),
        ))
    )]
    pub fn load_module(&mut self, name: &str, base_addr: Addr, sym_data: &[u8]) -> Result<()> {
        let entry = match self.modules.entry(name.to_string()) {
            Entry::Occupied(..) => {
                return Err(Error::with_invalid_input(format!(
                    "module {name} is already loaded"
                )))
            }
            Entry::Vacant(vacant) => vacant,
        };

        let table = CfiTable::from_bytes(sym_data)
            .with_context(|| format!("failed to load symbol data for module {name}"))?;
        let module = entry.insert(Module::new(base_addr, table));
        log::debug!(
            "loaded module {name} at {:#x}",
            module.base_addr()
        );
        Ok(())
    }

    /// Unload a module's symbol data, releasing the memory it held.
    ///
    /// Returns whether a module of this name had been loaded.
    pub fn unload_module(&mut self, name: &str) -> bool {
        self.modules.remove(name).is_some()
    }

    /// Check whether a module of the given name is loaded.
    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Retrieve a loaded module by name.
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// Find the register recovery rules in effect at `frame`'s
    /// instruction.
    ///
    /// Returns `None` if the frame's module is not loaded, if no CFI
    /// range covers the instruction, or if the covering rule text is
    /// malformed. See [`Module::find_cfi_frame_info`] for the lookup
    /// semantics.
    pub fn find_cfi_frame_info(&self, frame: &StackFrame<'_>) -> Option<RuleSet> {
        let module = self.modules.get(frame.module)?;
        module.find_cfi_frame_info(frame.instruction)
    }
}
