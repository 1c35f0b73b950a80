//! The VM facade: variable table, section programs, virtual memory.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CompileError;
use crate::hooks::{MidiHooks, SliderHooks};
use crate::interp::{self, SerializeIo};
use crate::memory::{Memory, DEFAULT_MAX_SLOTS};
use crate::parser::{Parser, Program};
use crate::Real;

/// Handle to an interned variable.
pub type VarId = usize;

/// One of the compiled section kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionId {
    Init,
    Slider,
    Block,
    Sample,
    Serialize,
    Gfx,
}

impl SectionId {
    fn slot(self) -> usize {
        match self {
            SectionId::Init => 0,
            SectionId::Slider => 1,
            SectionId::Block => 2,
            SectionId::Sample => 3,
            SectionId::Serialize => 4,
            SectionId::Gfx => 5,
        }
    }
}

/// Creation options for a [`Vm`].
#[derive(Debug, Clone)]
pub struct VmOptions {
    /// Addressable memory slots; 0 selects the default (8 Mi slots).
    pub max_mem: u32,
    /// Slots to pre-fault at init; negative means the whole heap.
    pub prealloc: i64,
}

impl Default for VmOptions {
    fn default() -> Self {
        VmOptions {
            max_mem: 0,
            prealloc: 0,
        }
    }
}

pub(crate) const MAX_SLIDERS: usize = 256;

#[derive(Default)]
pub(crate) struct VarTable {
    pub(crate) values: Vec<Real>,
    pub(crate) names: Vec<String>,
    map: HashMap<String, VarId>,
}

impl VarTable {
    pub(crate) fn intern(&mut self, name: &str) -> VarId {
        let key = name.to_ascii_lowercase();
        if let Some(&id) = self.map.get(&key) {
            return id;
        }
        let id = self.values.len();
        self.values.push(0.0);
        self.names.push(key.clone());
        self.map.insert(key, id);
        id
    }

    pub(crate) fn find(&self, name: &str) -> Option<VarId> {
        self.map.get(&name.to_ascii_lowercase()).copied()
    }
}

/// The evaluator. One `Vm` backs one compiled effect.
pub struct Vm {
    pub(crate) vars: VarTable,
    pub(crate) strings: Vec<String>,
    pub(crate) mem: Memory,
    /// `@init` is a chain so that imported units can prepend their own
    /// fragments; the other sections hold at most one program.
    init_chain: Vec<Arc<Program>>,
    sections: [Option<Arc<Program>>; 6],
    pub(crate) slider_hooks: Option<Arc<dyn SliderHooks>>,
    pub(crate) midi_hooks: Option<Arc<dyn MidiHooks>>,
    pub(crate) slider_vars: Box<[Option<VarId>]>,
    pub(crate) var_to_slider: HashMap<VarId, u32>,
    pub(crate) serialize: Option<SerializeIo>,
    pub(crate) output: String,
    pub(crate) rng: u64,
}

impl Vm {
    pub fn new(options: &VmOptions) -> Self {
        let max_mem = if options.max_mem == 0 {
            DEFAULT_MAX_SLOTS
        } else {
            options.max_mem
        };
        let mut mem = Memory::new(max_mem);
        if options.prealloc < 0 {
            mem.prealloc(mem.max_slots());
        } else if options.prealloc > 0 {
            mem.prealloc(options.prealloc.min(u32::MAX as i64) as u32);
        }
        Vm {
            vars: VarTable::default(),
            strings: Vec::new(),
            mem,
            init_chain: Vec::new(),
            sections: Default::default(),
            slider_hooks: None,
            midi_hooks: None,
            slider_vars: vec![None; MAX_SLIDERS].into_boxed_slice(),
            var_to_slider: HashMap::new(),
            serialize: None,
            output: String::new(),
            rng: 0x2545f4914f6cdd1d,
        }
    }

    /// Compile one section body. `@init` fragments accumulate; other
    /// sections are single-assignment (the latest wins).
    pub fn compile_section(
        &mut self,
        id: SectionId,
        text: &str,
        line_offset: u32,
    ) -> Result<(), CompileError> {
        let program = Arc::new(Parser::parse(
            text,
            line_offset,
            &mut self.vars,
            &mut self.strings,
        )?);
        if id == SectionId::Init {
            self.init_chain.push(program);
        } else {
            self.sections[id.slot()] = Some(program);
        }
        Ok(())
    }

    pub fn has_section(&self, id: SectionId) -> bool {
        if id == SectionId::Init {
            !self.init_chain.is_empty()
        } else {
            self.sections[id.slot()].is_some()
        }
    }

    /// Run a compiled section; a missing section is a no-op.
    pub fn run_section(&mut self, id: SectionId) {
        if id == SectionId::Init {
            let chain: Vec<Arc<Program>> = self.init_chain.clone();
            for program in &chain {
                interp::run(self, program);
            }
        } else if let Some(program) = self.sections[id.slot()].clone() {
            interp::run(self, &program);
        }
    }

    /// Compile and immediately run a loose snippet; used by the
    /// preprocessor. Returns the value of the last statement.
    pub fn eval(&mut self, text: &str, line_offset: u32) -> Result<Real, CompileError> {
        let program = Parser::parse(text, line_offset, &mut self.vars, &mut self.strings)?;
        Ok(interp::run(self, &program))
    }

    pub fn set_slider_hooks(&mut self, hooks: Arc<dyn SliderHooks>) {
        self.slider_hooks = Some(hooks);
    }

    pub fn set_midi_hooks(&mut self, hooks: Arc<dyn MidiHooks>) {
        self.midi_hooks = Some(hooks);
    }

    // ------------------------------------------------------------------
    // variables

    pub fn intern_var(&mut self, name: &str) -> VarId {
        self.vars.intern(name)
    }

    pub fn find_var(&self, name: &str) -> Option<VarId> {
        self.vars.find(name)
    }

    /// Read by name; missing variables read as 0.
    pub fn read_var(&self, name: &str) -> Real {
        self.vars
            .find(name)
            .map(|id| self.vars.values[id])
            .unwrap_or(0.0)
    }

    pub fn read_var_id(&self, id: VarId) -> Real {
        self.vars.values[id]
    }

    pub fn write_var_id(&mut self, id: VarId, value: Real) {
        self.vars.values[id] = value;
    }

    /// Visit every variable; stop when the visitor returns `false`.
    pub fn enum_vars(&self, mut visit: impl FnMut(&str, Real) -> bool) {
        for (name, value) in self.vars.names.iter().zip(&self.vars.values) {
            if !visit(name, *value) {
                break;
            }
        }
    }

    // ------------------------------------------------------------------
    // sliders

    /// Associate slider `index` with its declared variable name.
    pub fn bind_slider(&mut self, index: u32, name: &str) -> VarId {
        let id = self.vars.intern(name);
        self.slider_vars[index as usize] = Some(id);
        self.var_to_slider.insert(id, index);
        id
    }

    pub fn slider_var(&self, index: u32) -> Option<VarId> {
        self.slider_vars[index as usize]
    }

    pub fn slider_value(&self, index: u32) -> Real {
        self.slider_vars[index as usize]
            .map(|id| self.vars.values[id])
            .unwrap_or(0.0)
    }

    pub fn set_slider_value(&mut self, index: u32, value: Real) {
        if let Some(id) = self.slider_vars[index as usize] {
            self.vars.values[id] = value;
        }
    }

    // ------------------------------------------------------------------
    // memory

    pub fn read_vmem(&self, addr: u32, dest: &mut [Real]) {
        for (k, slot) in dest.iter_mut().enumerate() {
            *slot = self.mem.read(addr as f64 + k as f64);
        }
    }

    pub fn read_vmem_single(&self, addr: u32) -> Real {
        self.mem.read(addr as f64)
    }

    /// Memory in use, rounded up to whole blocks.
    pub fn used_mem(&self) -> usize {
        self.mem.used_slots()
    }

    // ------------------------------------------------------------------
    // serialization context

    /// Arm `@serialize` for writing; run the section, then take the blob.
    pub fn begin_serialize_write(&mut self) {
        self.serialize = Some(SerializeIo::write());
    }

    /// Arm `@serialize` for reading back a previously saved blob.
    pub fn begin_serialize_read(&mut self, data: Vec<u8>) {
        self.serialize = Some(SerializeIo::read(data));
    }

    /// Disarm the serialization context; returns the written blob when the
    /// context was a writer.
    pub fn end_serialize(&mut self) -> Option<Vec<u8>> {
        match self.serialize.take() {
            Some(SerializeIo::Write(data)) => Some(data),
            _ => None,
        }
    }

    /// Drain captured `printf` output.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}
