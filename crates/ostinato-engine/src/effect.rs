//! The effect object: sources, compiled VM, sliders, MIDI, processing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use atomic_float::AtomicF64;
use parking_lot::Mutex;
use tracing::debug;

use ostinato_lang::{
    fs as langfs, LoadOptions as ImportOptions, Loader, SectionKind, SourceUnit,
};
use ostinato_preset::{FxState, SliderValue};
use ostinato_vm::{MidiHooks, SectionId, VarId, Vm, VmOptions};

use crate::bus::{SliderBus, SLIDER_GROUPS};
use crate::config::Config;
use crate::curve::SliderCurve;
use crate::error::EngineError;
use crate::midi::{MidiEvent, MidiQueue, DEFAULT_MIDI_CAPACITY};
use crate::slider::{build_table, Slider};
use crate::transport::TimeInfo;
use crate::{MAX_CHANNELS, MAX_TRIGGERS};

const DEFAULT_FRAMERATE: u32 = 30;

/// Options for [`Effect::load_file`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Skip imports; useful to inspect header information cheaply.
    pub ignore_imports: bool,
}

/// Options for [`Effect::compile`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub no_serialize: bool,
    pub no_gfx: bool,
}

/// Latency and undo status published by the audio thread.
#[derive(Debug, Default)]
pub struct RtStatus {
    pdc_delay: AtomicF64,
    pdc_bottom: AtomicU32,
    pdc_top: AtomicU32,
    pdc_midi: AtomicBool,
}

impl RtStatus {
    pub fn pdc_delay(&self) -> f64 {
        self.pdc_delay.load(Ordering::Acquire)
    }

    /// Channel range the latency applies to, end exclusive.
    pub fn pdc_channels(&self) -> (u32, u32) {
        (
            self.pdc_bottom.load(Ordering::Acquire),
            self.pdc_top.load(Ordering::Acquire),
        )
    }

    pub fn pdc_midi(&self) -> bool {
        self.pdc_midi.load(Ordering::Acquire)
    }
}

struct LoadedSource {
    main: SourceUnit,
    imports: Vec<SourceUnit>,
    path: PathBuf,
    bank_path: Option<PathBuf>,
    in_pins: Vec<String>,
    out_pins: Vec<String>,
}

/// Well-known VM variables written by the engine each cycle.
struct BuiltinVars {
    srate: VarId,
    samplesblock: VarId,
    num_ch: VarId,
    tempo: VarId,
    play_state: VarId,
    play_position: VarId,
    beats_position: VarId,
    ts_num: VarId,
    ts_denom: VarId,
    trigger: VarId,
    pdc_delay: VarId,
    pdc_bot_ch: VarId,
    pdc_top_ch: VarId,
    pdc_midi: VarId,
    spl: Vec<VarId>,
}

impl BuiltinVars {
    fn bind(vm: &mut Vm, channels: usize) -> BuiltinVars {
        BuiltinVars {
            srate: vm.intern_var("srate"),
            samplesblock: vm.intern_var("samplesblock"),
            num_ch: vm.intern_var("num_ch"),
            tempo: vm.intern_var("tempo"),
            play_state: vm.intern_var("play_state"),
            play_position: vm.intern_var("play_position"),
            beats_position: vm.intern_var("beats_position"),
            ts_num: vm.intern_var("ts_num"),
            ts_denom: vm.intern_var("ts_denom"),
            trigger: vm.intern_var("trigger"),
            pdc_delay: vm.intern_var("pdc_delay"),
            pdc_bot_ch: vm.intern_var("pdc_bot_ch"),
            pdc_top_ch: vm.intern_var("pdc_top_ch"),
            pdc_midi: vm.intern_var("pdc_midi"),
            spl: (0..channels).map(|ch| vm.intern_var(&format!("spl{ch}"))).collect(),
        }
    }
}

/// Bridges the VM's `midisend`/`midirecv` to the effect queues.
struct MidiBridge {
    input: Arc<Mutex<MidiQueue>>,
    output: Arc<Mutex<MidiQueue>>,
}

impl MidiHooks for MidiBridge {
    fn recv(&self) -> Option<(u32, [u8; 3])> {
        let mut queue = self.input.lock();
        loop {
            let event = queue.receive()?;
            if event.data.len() <= 3 {
                let mut data = [0u8; 3];
                data[..event.data.len()].copy_from_slice(&event.data);
                return Some((event.offset, data));
            }
            // long messages are host-facing only
        }
    }

    fn send(&self, offset: u32, data: [u8; 3]) -> bool {
        let size = if data[0] & 0xf0 == 0xc0 || data[0] & 0xf0 == 0xd0 {
            2
        } else {
            3
        };
        self.output
            .lock()
            .send(MidiEvent::new(0, offset, &data[..size]))
    }
}

trait Frame: Copy {
    fn to_f64(self) -> f64;
    fn from_f64(v: f64) -> Self;
}

impl Frame for f32 {
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> f32 {
        v as f32
    }
}

impl Frame for f64 {
    fn to_f64(self) -> f64 {
        self
    }
    fn from_f64(v: f64) -> f64 {
        v
    }
}

/// A loaded (and possibly compiled) effect instance.
///
/// The instance is owned by one thread at a time; the [`SliderBus`] and
/// [`RtStatus`] handles it publishes are the cross-thread surface.
pub struct Effect {
    config: Arc<Config>,
    source: Option<LoadedSource>,
    vm: Option<Vm>,
    vars: Option<BuiltinVars>,
    sliders: Vec<Slider>,
    bus: Arc<SliderBus>,
    status: Arc<RtStatus>,
    midi_in: Arc<Mutex<MidiQueue>>,
    midi_out: Arc<Mutex<MidiQueue>>,
    time: TimeInfo,
    sample_rate: f64,
    block_size: u32,
    must_init: bool,
    slider_needs_recompute: bool,
    pending_triggers: u32,
    no_serialize: bool,
    config_overrides: HashMap<String, f64>,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl Effect {
    pub fn new(config: Arc<Config>) -> Effect {
        Effect {
            config,
            source: None,
            vm: None,
            vars: None,
            sliders: build_table(&[]),
            bus: Arc::new(SliderBus::new()),
            status: Arc::new(RtStatus::default()),
            midi_in: Arc::new(Mutex::new(MidiQueue::default())),
            midi_out: Arc::new(Mutex::new(MidiQueue::default())),
            time: TimeInfo::default(),
            sample_rate: 44100.0,
            block_size: 128,
            must_init: false,
            slider_needs_recompute: false,
            pending_triggers: 0,
            no_serialize: false,
            config_overrides: HashMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Choose a `config:` item value before loading; defaults apply
    /// otherwise.
    pub fn set_config_override(&mut self, name: &str, value: f64) {
        self.config_overrides
            .insert(name.to_ascii_lowercase(), value);
    }

    // ------------------------------------------------------------------
    // lifecycle

    pub fn load_file(&mut self, path: &Path, options: LoadOptions) -> Result<(), EngineError> {
        self.unload();

        let config = self.config.guess_file_roots(path);
        let mut loader = Loader::new(
            config.import_root().map(Path::to_path_buf),
            &self.config_overrides,
        );
        let program = loader.load(
            path,
            ImportOptions {
                ignore_imports: options.ignore_imports,
            },
        )?;

        let header = &program.main.header;
        let (in_pins, out_pins) = if header.explicit_pins
            || !header.in_pins.is_empty()
            || !header.out_pins.is_empty()
        {
            (header.in_pins.clone(), header.out_pins.clone())
        } else if program.main.toplevel.sample.is_some() {
            (vec![String::new(); 2], vec![String::new(); 2])
        } else {
            (Vec::new(), Vec::new())
        };

        self.sliders = build_table(&header.sliders);
        for slider in &self.sliders {
            if slider.exists() {
                self.bus.set_value(slider.decl.id, slider.decl.def);
            }
        }
        self.reset_visibility();

        let bank_path = find_bank_path(path);
        debug!(path = %path.display(), imports = program.imports.len(), "loaded effect source");

        self.source = Some(LoadedSource {
            main: program.main,
            imports: program.imports,
            path: path.to_path_buf(),
            bank_path,
            in_pins,
            out_pins,
        });
        Ok(())
    }

    pub fn unload(&mut self) {
        self.source = None;
        self.vm = None;
        self.vars = None;
        self.sliders = build_table(&[]);
        self.must_init = false;
        self.slider_needs_recompute = false;
        self.pending_triggers = 0;
        self.errors.clear();
        self.warnings.clear();
        for group in 0..SLIDER_GROUPS as u8 {
            self.bus.set_visibility_word(group, 0);
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.source.is_some()
    }

    pub fn is_compiled(&self) -> bool {
        self.vm.is_some()
    }

    pub fn compile(&mut self, options: CompileOptions) -> Result<(), EngineError> {
        let source = self.source.as_ref().ok_or(EngineError::NotLoaded)?;
        self.vm = None;
        self.vars = None;
        self.errors.clear();

        let header = &source.main.header;
        let mut vm = Vm::new(&VmOptions {
            max_mem: header.options.maxmem,
            prealloc: header.options.prealloc,
        });
        vm.set_slider_hooks(self.bus.clone());
        vm.set_midi_hooks(Arc::new(MidiBridge {
            input: self.midi_in.clone(),
            output: self.midi_out.clone(),
        }));

        // imported units contribute their @init bodies, dependencies first
        let top = &source.main.toplevel;
        let mut jobs = Vec::with_capacity(source.imports.len() + 6);
        for unit in &source.imports {
            jobs.push((unit.path.as_path(), SectionId::Init, unit.toplevel.init.as_ref()));
        }
        jobs.push((source.path.as_path(), SectionId::Init, top.init.as_ref()));
        jobs.push((source.path.as_path(), SectionId::Slider, top.slider.as_ref()));
        jobs.push((source.path.as_path(), SectionId::Block, top.block.as_ref()));
        jobs.push((source.path.as_path(), SectionId::Sample, top.sample.as_ref()));
        if !options.no_serialize {
            jobs.push((source.path.as_path(), SectionId::Serialize, top.serialize.as_ref()));
        }
        if !options.no_gfx {
            jobs.push((source.path.as_path(), SectionId::Gfx, top.gfx.as_ref()));
        }

        for (path, id, section) in jobs {
            let Some(section) = section else { continue };
            if let Err(e) = vm.compile_section(id, &section.text, section.line_offset + 1) {
                let message = format!("{}:{}: {}", path.display(), e.line, e.message);
                self.errors.push(message.clone());
                return Err(EngineError::Compile(message));
            }
        }
        self.no_serialize = options.no_serialize;

        let channels = self.num_channels();
        let vars = BuiltinVars::bind(&mut vm, channels);

        for slider in &mut self.sliders {
            if !slider.exists() {
                continue;
            }
            let id = vm.bind_slider(slider.decl.id, &slider.decl.var);
            slider.var = Some(id);
            vm.set_slider_value(slider.decl.id, self.bus.value(slider.decl.id));
        }

        vm.write_var_id(vars.srate, self.sample_rate);
        vm.write_var_id(vars.samplesblock, self.block_size as f64);
        vm.write_var_id(vars.num_ch, channels as f64);

        self.vm = Some(vm);
        self.vars = Some(vars);
        self.must_init = true;
        self.reset_visibility();
        Ok(())
    }

    /// Run `@init` (imports first) and request a `@slider` pass.
    pub fn init(&mut self) {
        let (Some(vm), Some(vars)) = (self.vm.as_mut(), self.vars.as_ref()) else {
            return;
        };
        vm.write_var_id(vars.srate, self.sample_rate);
        vm.write_var_id(vars.samplesblock, self.block_size as f64);
        vm.run_section(SectionId::Init);
        self.must_init = false;
        self.slider_needs_recompute = true;
        self.mirror_sliders();
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    // ------------------------------------------------------------------
    // introspection

    pub fn name(&self) -> &str {
        self.source
            .as_ref()
            .map(|s| s.main.header.desc.as_str())
            .unwrap_or("")
    }

    pub fn author(&self) -> &str {
        self.source
            .as_ref()
            .map(|s| s.main.header.author.as_str())
            .unwrap_or("")
    }

    pub fn tags(&self) -> &[String] {
        self.source
            .as_ref()
            .map(|s| s.main.header.tags.as_slice())
            .unwrap_or(&[])
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.source.as_ref().map(|s| s.path.as_path())
    }

    pub fn bank_path(&self) -> Option<&Path> {
        self.source.as_ref().and_then(|s| s.bank_path.as_deref())
    }

    pub fn num_inputs(&self) -> u32 {
        self.source.as_ref().map(|s| s.in_pins.len() as u32).unwrap_or(0)
    }

    pub fn num_outputs(&self) -> u32 {
        self.source.as_ref().map(|s| s.out_pins.len() as u32).unwrap_or(0)
    }

    pub fn input_name(&self, index: u32) -> &str {
        self.source
            .as_ref()
            .and_then(|s| s.in_pins.get(index as usize))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn output_name(&self, index: u32) -> &str {
        self.source
            .as_ref()
            .and_then(|s| s.out_pins.get(index as usize))
            .map(String::as_str)
            .unwrap_or("")
    }

    fn num_channels(&self) -> usize {
        let n = self.num_inputs().max(self.num_outputs()) as usize;
        n.min(MAX_CHANNELS)
    }

    pub fn wants_meters(&self) -> bool {
        self.source
            .as_ref()
            .map(|s| !s.main.header.options.no_meter)
            .unwrap_or(true)
    }

    pub fn gfx_dims(&self) -> (u32, u32) {
        self.source
            .as_ref()
            .map(|s| (s.main.toplevel.gfx_w, s.main.toplevel.gfx_h))
            .unwrap_or((0, 0))
    }

    pub fn has_section(&self, kind: SectionKind) -> bool {
        self.source
            .as_ref()
            .map(|s| s.main.toplevel.section(kind).is_some())
            .unwrap_or(false)
    }

    /// UI refresh rate requested through `options:gfx_hz`.
    pub fn requested_framerate(&self) -> u32 {
        self.source
            .as_ref()
            .map(|s| s.main.header.options.gfx_hz)
            .filter(|&hz| hz > 0)
            .unwrap_or(DEFAULT_FRAMERATE)
    }

    // ------------------------------------------------------------------
    // sliders

    pub fn slider_exists(&self, index: u32) -> bool {
        self.slider(index).map(|s| s.exists()).unwrap_or(false)
    }

    fn slider(&self, index: u32) -> Option<&Slider> {
        self.sliders.get(index as usize)
    }

    pub fn slider_name(&self, index: u32) -> &str {
        self.slider(index)
            .filter(|s| s.exists())
            .map(|s| s.decl.desc.as_str())
            .unwrap_or("")
    }

    pub fn slider_curve(&self, index: u32) -> Option<&SliderCurve> {
        self.slider(index).filter(|s| s.exists()).map(|s| &s.curve)
    }

    pub fn slider_is_enum(&self, index: u32) -> bool {
        self.slider(index).map(|s| s.decl.is_enum).unwrap_or(false)
    }

    pub fn slider_enum_names(&self, index: u32) -> &[String] {
        self.slider(index)
            .map(|s| s.decl.enum_names.as_slice())
            .unwrap_or(&[])
    }

    pub fn slider_is_path(&self, index: u32) -> bool {
        self.slider(index).map(|s| !s.decl.path.is_empty()).unwrap_or(false)
    }

    pub fn slider_path(&self, index: u32) -> &str {
        self.slider(index).map(|s| s.decl.path.as_str()).unwrap_or("")
    }

    pub fn slider_is_initially_visible(&self, index: u32) -> bool {
        self.slider(index)
            .map(|s| s.exists() && s.decl.initially_visible)
            .unwrap_or(false)
    }

    pub fn slider_value(&self, index: u32) -> f64 {
        if self.slider_exists(index) {
            self.bus.value(index)
        } else {
            0.0
        }
    }

    /// Write a slider value from the host side. The value reaches the VM
    /// at the next block boundary; `notify` requests a `@slider` pass.
    pub fn set_slider_value(&self, index: u32, value: f64, notify: bool) {
        if !self.slider_exists(index) {
            return;
        }
        self.bus.post_host_write(index, value, notify);
    }

    /// Shared masks/value mirror; the host UI thread reads through this.
    pub fn bus(&self) -> &Arc<SliderBus> {
        &self.bus
    }

    /// Latency status handle.
    pub fn status(&self) -> &Arc<RtStatus> {
        &self.status
    }

    pub fn fetch_slider_changes(&self, group: u8) -> u64 {
        self.bus.fetch_changed(group)
    }

    pub fn fetch_slider_automations(&self, group: u8) -> u64 {
        self.bus.fetch_automate(group)
    }

    pub fn fetch_slider_touches(&self, group: u8) -> u64 {
        self.bus.touches(group)
    }

    pub fn slider_visibility(&self, group: u8) -> u64 {
        self.bus.visibility(group)
    }

    pub fn fetch_want_undopoint(&self) -> bool {
        self.bus.fetch_want_undopoint()
    }

    fn reset_visibility(&self) {
        let mut words = [0u64; SLIDER_GROUPS];
        for slider in &self.sliders {
            if slider.exists() && slider.decl.initially_visible {
                words[(slider.decl.id >> 6) as usize] |= 1u64 << (slider.decl.id & 63);
            }
        }
        for (group, word) in words.iter().enumerate() {
            self.bus.set_visibility_word(group as u8, *word);
        }
    }

    // ------------------------------------------------------------------
    // processing setup

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Takes effect at the next `@init`.
    pub fn set_sample_rate(&mut self, rate: f64) {
        if rate != self.sample_rate {
            self.sample_rate = rate;
            self.must_init = true;
        }
    }

    /// Takes effect at the next `@init`.
    pub fn set_block_size(&mut self, size: u32) {
        if size != self.block_size {
            self.block_size = size;
            self.must_init = true;
        }
    }

    pub fn set_midi_capacity(&mut self, capacity: usize, extensible: bool) {
        let capacity = if capacity == 0 { DEFAULT_MIDI_CAPACITY } else { capacity };
        *self.midi_in.lock() = MidiQueue::new(capacity, extensible);
        *self.midi_out.lock() = MidiQueue::new(capacity, extensible);
    }

    pub fn set_time_info(&mut self, info: &TimeInfo) {
        self.time = *info;
    }

    pub fn send_midi(&self, event: MidiEvent) -> bool {
        self.midi_in.lock().send(event)
    }

    pub fn receive_midi(&self) -> Option<MidiEvent> {
        self.midi_out.lock().receive()
    }

    pub fn receive_midi_from_bus(&self, bus: u32) -> Option<MidiEvent> {
        self.midi_out.lock().receive_from_bus(bus)
    }

    /// Queue a trigger bit for the next block.
    pub fn send_trigger(&mut self, index: u32) -> bool {
        if index >= MAX_TRIGGERS {
            return false;
        }
        self.pending_triggers |= 1 << index;
        true
    }

    // ------------------------------------------------------------------
    // processing

    pub fn process_float(&mut self, ins: &[&[f32]], outs: &mut [&mut [f32]], frames: usize) {
        self.process_frames(ins, outs, frames);
    }

    pub fn process_double(&mut self, ins: &[&[f64]], outs: &mut [&mut [f64]], frames: usize) {
        self.process_frames(ins, outs, frames);
    }

    fn process_frames<T: Frame>(&mut self, ins: &[&[T]], outs: &mut [&mut [T]], frames: usize) {
        let (Some(vm), Some(vars)) = (self.vm.as_mut(), self.vars.as_ref()) else {
            for out in outs.iter_mut() {
                out.iter_mut().for_each(|s| *s = T::from_f64(0.0));
            }
            return;
        };

        // host parameter writes first, so the sections see fresh values
        let mut want_slider = self.slider_needs_recompute;
        for group in 0..SLIDER_GROUPS as u8 {
            let (pending, notify) = self.bus.drain_pending(group);
            let mut bits = pending;
            while bits != 0 {
                let bit = bits.trailing_zeros();
                bits &= bits - 1;
                let index = (group as u32) * 64 + bit;
                vm.set_slider_value(index, self.bus.staged_value(index));
            }
            if notify != 0 {
                want_slider = true;
            }
        }

        vm.write_var_id(vars.tempo, self.time.tempo);
        vm.write_var_id(vars.play_state, self.time.playback_state as u32 as f64);
        vm.write_var_id(vars.play_position, self.time.time_position);
        vm.write_var_id(vars.beats_position, self.time.beat_position);
        vm.write_var_id(vars.ts_num, self.time.time_signature.0 as f64);
        vm.write_var_id(vars.ts_denom, self.time.time_signature.1 as f64);
        vm.write_var_id(vars.trigger, self.pending_triggers as f64);
        self.pending_triggers = 0;

        self.midi_out.lock().clear();

        if self.must_init {
            vm.write_var_id(vars.srate, self.sample_rate);
            vm.write_var_id(vars.samplesblock, self.block_size as f64);
            vm.run_section(SectionId::Init);
            self.must_init = false;
            want_slider = true;
        }
        if want_slider {
            vm.run_section(SectionId::Slider);
            self.slider_needs_recompute = false;
        }

        vm.run_section(SectionId::Block);

        let channels = self
            .source
            .as_ref()
            .map(|s| s.in_pins.len().max(s.out_pins.len()))
            .unwrap_or(0)
            .min(MAX_CHANNELS);
        if vm.has_section(SectionId::Sample) {
            for frame in 0..frames {
                for (ch, &var) in vars.spl.iter().enumerate() {
                    let value = ins
                        .get(ch)
                        .and_then(|c| c.get(frame))
                        .map(|s| s.to_f64())
                        .unwrap_or(0.0);
                    vm.write_var_id(var, value);
                }
                vm.run_section(SectionId::Sample);
                for (ch, out) in outs.iter_mut().enumerate() {
                    if let Some(slot) = out.get_mut(frame) {
                        let value = vars
                            .spl
                            .get(ch)
                            .map(|&var| vm.read_var_id(var))
                            .unwrap_or(0.0);
                        *slot = T::from_f64(value);
                    }
                }
            }
        } else {
            // nothing to run per sample; pass audio through
            for (ch, out) in outs.iter_mut().enumerate() {
                if ch < channels && ch < ins.len() {
                    for frame in 0..frames.min(out.len()).min(ins[ch].len()) {
                        out[frame] = ins[ch][frame];
                    }
                } else {
                    out.iter_mut().for_each(|s| *s = T::from_f64(0.0));
                }
            }
        }

        vm.write_var_id(vars.trigger, 0.0);

        // publish values and latency for the other threads
        for slider in &self.sliders {
            if let Some(var) = slider.var {
                self.bus.set_value(slider.decl.id, vm.read_var_id(var));
            }
        }
        self.status
            .pdc_delay
            .store(vm.read_var_id(vars.pdc_delay), Ordering::Release);
        let bottom = vm.read_var_id(vars.pdc_bot_ch).max(0.0) as u32;
        let top = vm.read_var_id(vars.pdc_top_ch).max(0.0) as u32;
        self.status.pdc_bottom.store(bottom, Ordering::Release);
        self.status.pdc_top.store(top.max(bottom), Ordering::Release);
        self.status
            .pdc_midi
            .store(vm.read_var_id(vars.pdc_midi) != 0.0, Ordering::Release);

        self.midi_in.lock().clear();
    }

    fn mirror_sliders(&mut self) {
        let Some(vm) = self.vm.as_ref() else {
            return;
        };
        for slider in &self.sliders {
            if let Some(var) = slider.var {
                self.bus.set_value(slider.decl.id, vm.read_var_id(var));
            }
        }
    }

    // ------------------------------------------------------------------
    // state

    /// Capture slider values and the `@serialize` blob.
    pub fn save_state(&mut self) -> FxState {
        let sliders = self
            .sliders
            .iter()
            .filter(|s| s.exists())
            .map(|s| SliderValue {
                index: s.decl.id,
                value: self.bus.value(s.decl.id),
            })
            .collect();

        let mut data = Vec::new();
        if !self.no_serialize {
            if let Some(vm) = self.vm.as_mut() {
                if vm.has_section(SectionId::Serialize) {
                    vm.begin_serialize_write();
                    vm.run_section(SectionId::Serialize);
                    data = vm.end_serialize().unwrap_or_default();
                }
            }
        }

        FxState { sliders, data }
    }

    /// Restore slider values, then feed the blob through `@serialize`.
    pub fn load_state(&mut self, state: &FxState) {
        for sv in &state.sliders {
            if self.slider_exists(sv.index) {
                self.bus.set_value(sv.index, sv.value);
                if let Some(vm) = self.vm.as_mut() {
                    vm.set_slider_value(sv.index, sv.value);
                }
            }
        }
        self.load_serialized_state(state);
        self.slider_needs_recompute = true;
    }

    /// Restore only the serialized blob, leaving slider values alone.
    pub fn load_serialized_state(&mut self, state: &FxState) {
        if self.no_serialize {
            return;
        }
        let Some(vm) = self.vm.as_mut() else {
            return;
        };
        if !vm.has_section(SectionId::Serialize) {
            return;
        }
        vm.begin_serialize_read(state.data.clone());
        vm.run_section(SectionId::Serialize);
        vm.end_serialize();
        self.mirror_sliders();
    }

    // ------------------------------------------------------------------
    // VM peek

    pub fn read_var(&self, name: &str) -> f64 {
        self.vm.as_ref().map(|vm| vm.read_var(name)).unwrap_or(0.0)
    }

    pub fn find_var(&self, name: &str) -> Option<VarId> {
        self.vm.as_ref().and_then(|vm| vm.find_var(name))
    }

    pub fn enum_vars(&self, visit: impl FnMut(&str, f64) -> bool) {
        if let Some(vm) = self.vm.as_ref() {
            vm.enum_vars(visit);
        }
    }

    pub fn read_vmem(&self, addr: u32, dest: &mut [f64]) {
        match self.vm.as_ref() {
            Some(vm) => vm.read_vmem(addr, dest),
            None => dest.iter_mut().for_each(|v| *v = 0.0),
        }
    }

    pub fn read_vmem_single(&self, addr: u32) -> f64 {
        self.vm.as_ref().map(|vm| vm.read_vmem_single(addr)).unwrap_or(0.0)
    }

    pub fn used_mem(&self) -> usize {
        self.vm.as_ref().map(|vm| vm.used_mem()).unwrap_or(0)
    }
}

/// Locate the effect's RPL bank: `<source name>.rpl` beside the source,
/// matched case-insensitively.
fn find_bank_path(source: &Path) -> Option<PathBuf> {
    let dir = source.parent()?;
    let name = source.file_name()?.to_string_lossy();
    langfs::case_resolve(dir, &format!("{name}.rpl"))
        .into_path()
        .filter(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effect_with(text: &str) -> (Effect, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("example.jsfx");
        std::fs::write(&path, text).unwrap();

        let mut fx = Effect::new(Arc::new(Config::new()));
        fx.load_file(&path, LoadOptions::default()).unwrap();
        (fx, dir)
    }

    fn compiled_with(text: &str) -> (Effect, tempfile::TempDir) {
        let (mut fx, dir) = effect_with(text);
        fx.compile(CompileOptions::default()).unwrap();
        fx.init();
        (fx, dir)
    }

    fn run_block(fx: &mut Effect, frames: usize) {
        let input = vec![0.0f32; frames];
        let mut output = vec![0.0f32; frames];
        let ins: [&[f32]; 1] = [&input];
        let mut out_ref: [&mut [f32]; 1] = [&mut output];
        fx.process_float(&ins, &mut out_ref, frames);
    }

    #[test]
    fn test_slider_alias_case_insensitive() {
        let (fx, _dir) = compiled_with(
            "desc:example\nout_pin:output\nslider1:fOo=1<1,3,0.1>the slider\n@init\nfoo=2;\n",
        );
        assert_eq!(fx.slider_value(0), 2.0);
    }

    #[test]
    fn test_visibility_mutation_over_one_block() {
        let (mut fx, _dir) = compiled_with(concat!(
            "desc:example\nout_pin:output\n",
            "slider1:0<0,1,0.1>s1\n",
            "slider2:0<0,1,0.1>s2\n",
            "slider3:0<0,1,0.1>s3\n",
            "slider4:0<0,1,0.1>-s4\n",
            "slider5:0<0,1,0.1>-s5\n",
            "slider6:0<0,1,0.1>-s6\n",
            "slider7:0<0,1,0.1>-s7\n",
            "@block\n",
            "slider_show(1,0); slider_show(2,1); slider_show(3,-1);\n",
            "slider_show(4,0); slider_show(5,1); slider_show(6,-1);\n",
        ));

        assert_eq!(fx.slider_visibility(0), 0b0000111);
        run_block(&mut fx, 16);
        assert_eq!(fx.slider_visibility(0), 0b0110010);
    }

    #[test]
    fn test_change_and_automation_fetch() {
        let (mut fx, _dir) = compiled_with(concat!(
            "desc:example\nout_pin:output\n",
            "slider1:0<0,1,0.1>s1\n",
            "slider2:0<0,1,0.1>s2\n",
            "@block\n",
            "sliderchange(slider1); slider_automate(slider2);\n",
        ));

        for _ in 0..3 {
            run_block(&mut fx, 8);
            assert_eq!(fx.fetch_slider_changes(0), 0b011);
            assert_eq!(fx.fetch_slider_automations(0), 0b010);
            // nothing new until the next block runs
            assert_eq!(fx.fetch_slider_changes(0), 0);
            assert_eq!(fx.fetch_slider_automations(0), 0);
        }
    }

    #[test]
    fn test_host_write_reaches_block() {
        let (mut fx, _dir) = compiled_with(
            "desc:example\nout_pin:output\nslider1:0<0,10,1>gain\n@block\nseen = slider1;\n",
        );
        fx.set_slider_value(0, 7.0, false);
        run_block(&mut fx, 4);
        assert_eq!(fx.read_var("seen"), 7.0);
    }

    #[test]
    fn test_notify_triggers_slider_section() {
        let (mut fx, _dir) = compiled_with(concat!(
            "desc:example\nout_pin:output\nslider1:0<0,10,1>gain\n",
            "@slider\nslider_runs += 1;\n@block\nnop = 0;\n",
        ));
        run_block(&mut fx, 4);
        let after_init = fx.read_var("slider_runs");
        assert_eq!(after_init, 1.0);

        // no notify: value lands but @slider does not run again
        fx.set_slider_value(0, 2.0, false);
        run_block(&mut fx, 4);
        assert_eq!(fx.read_var("slider_runs"), after_init);

        fx.set_slider_value(0, 3.0, true);
        run_block(&mut fx, 4);
        assert_eq!(fx.read_var("slider_runs"), after_init + 1.0);
    }

    #[test]
    fn test_sample_section_processes_audio() {
        let (mut fx, _dir) = compiled_with(
            "desc:gain\nin_pin:in\nout_pin:out\nslider1:0.5<0,1,0.01>gain\n@sample\nspl0 = spl0 * slider1;\n",
        );

        let input = [1.0f32, 0.5, -1.0, 0.25];
        let mut output = [0.0f32; 4];
        let ins: [&[f32]; 1] = [&input];
        let mut outs: [&mut [f32]; 1] = [&mut output];
        fx.process_float(&ins, &mut outs, 4);
        assert_eq!(output, [0.5, 0.25, -0.5, 0.125]);
    }

    #[test]
    fn test_process_double_matches_float() {
        let (mut fx, _dir) = compiled_with(
            "desc:gain\nin_pin:in\nout_pin:out\n@sample\nspl0 = spl0 * 2;\n",
        );
        let input = [0.25f64, -0.5];
        let mut output = [0.0f64; 2];
        let ins: [&[f64]; 1] = [&input];
        let mut outs: [&mut [f64]; 1] = [&mut output];
        fx.process_double(&ins, &mut outs, 2);
        assert_eq!(output, [0.5, -1.0]);
    }

    #[test]
    fn test_uncompiled_process_outputs_silence() {
        let (mut fx, _dir) = effect_with("desc:x\nout_pin:output\n@sample\nspl0=0.1;\n");
        let mut output = [1.0f32; 4];
        let mut outs: [&mut [f32]; 1] = [&mut output];
        fx.process_float(&[], &mut outs, 4);
        assert_eq!(output, [0.0; 4]);
    }

    #[test]
    fn test_default_pins_with_sample_section() {
        let (fx, _dir) = effect_with("desc:Example\n@sample\nx = 0;\n");
        assert_eq!(fx.num_inputs(), 2);
        assert_eq!(fx.num_outputs(), 2);
    }

    #[test]
    fn test_default_pins_without_sample_section() {
        let (fx, _dir) = effect_with("desc:Example\n@block\nx = 0;\n");
        assert_eq!(fx.num_inputs(), 0);
        assert_eq!(fx.num_outputs(), 0);
    }

    #[test]
    fn test_state_roundtrip_with_serialize() {
        let (mut fx, _dir) = compiled_with(concat!(
            "desc:example\nout_pin:output\n",
            "@init\nmyvar1=1; myvar2=2; myarray=777;\n",
            "myarray[0]=100; myarray[1]=200; myarray[2]=300;\n",
            "@serialize\nfile_var(0, myvar1); file_var(0, myvar2); file_mem(0, myarray, 3);\n",
            "@sample\nspl0=0.0;\n",
        ));

        let state = fx.save_state();
        assert_eq!(state.data.len(), 5 * 4);
        let decoded: Vec<f32> = state
            .data
            .chunks(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(decoded, vec![1.0, 2.0, 100.0, 200.0, 300.0]);

        // scramble and restore
        let mut modified = state.clone();
        for (i, v) in [2.0f32, 3.0, 200.0, 300.0, 400.0].iter().enumerate() {
            modified.data[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        fx.load_state(&modified);
        let again = fx.save_state();
        assert_eq!(again.data, modified.data);
    }

    #[test]
    fn test_state_slider_capture() {
        let (mut fx, _dir) = compiled_with(concat!(
            "desc:example\nout_pin:output\n",
            "slider1:1<1,3,0.1>s1\nslider2:2<1,3,0.1>s2\nslider4:2<1,3,0.1>s4\nslider256:3<1,3,0.1>s256\n",
            "@sample\nspl0=0.0;\n",
        ));

        let state = fx.save_state();
        assert!(state.data.is_empty());
        let pairs: Vec<(u32, f64)> = state.sliders.iter().map(|s| (s.index, s.value)).collect();
        assert_eq!(pairs, vec![(0, 1.0), (1, 2.0), (3, 2.0), (255, 3.0)]);

        let mut modified = state.clone();
        modified.sliders[0].value = 2.0;
        modified.sliders[1].value = 3.0;
        fx.load_state(&modified);
        assert_eq!(fx.slider_value(0), 2.0);
        assert_eq!(fx.slider_value(1), 3.0);
    }

    #[test]
    fn test_save_load_save_is_stable() {
        let (mut fx, _dir) = compiled_with(concat!(
            "desc:example\nout_pin:output\nslider1:0.25<0,1,0.01>mix\n",
            "@init\nbuf = 64; buf[0] = 42;\n",
            "@serialize\nfile_var(0, buf[0]);\n",
        ));
        let first = fx.save_state();
        fx.load_state(&first);
        let second = fx.save_state();
        assert_eq!(first, second);
    }

    #[test]
    fn test_used_mem_prealloc() {
        let (fx, _dir) = compiled_with(
            "desc:test\noptions:maxmem=134217728\noptions:prealloc=16000000\nout_pin:output\n@init\n",
        );
        assert_eq!(fx.used_mem(), 16_056_320);
    }

    #[test]
    fn test_used_mem_prealloc_star() {
        let (fx, _dir) = compiled_with(
            "desc:test\noptions:maxmem=13421772\noptions:prealloc=*\nout_pin:output\n@init\n",
        );
        assert_eq!(fx.used_mem(), 13_434_880);
    }

    #[test]
    fn test_used_mem_without_prealloc() {
        let (fx, _dir) = compiled_with(
            "desc:test\noptions:maxmem=134217728\nout_pin:output\n@init\n",
        );
        assert_eq!(fx.used_mem(), 0);
    }

    #[test]
    fn test_huge_mem_addressing() {
        let (fx, _dir) = compiled_with(concat!(
            "desc:test\noptions:maxmem=134217728\nout_pin:output\n",
            "@init\n",
            "x1 = x[83886] = 2;\n",
            "x2 = x[8388608] = 3;\n",
            "x3 = x[33554431] = 5;\n",
        ));
        assert_eq!(fx.read_var("x1"), 2.0);
        assert_eq!(fx.read_vmem_single(83_886), 2.0);
        assert_eq!(fx.read_var("x2"), 3.0);
        assert_eq!(fx.read_vmem_single(8_388_608), 3.0);
        assert_eq!(fx.read_var("x3"), 5.0);
        assert_eq!(fx.read_vmem_single(33_554_431), 5.0);
    }

    #[test]
    fn test_gfx_framerate_clamping() {
        for (options, expected) in [
            ("options:gfx_hz=30\n", 30),
            ("options:gfx_hz=60\n", 60),
            ("options:gfx_hz=120\n", 120),
            ("options:gfx_hz=-1\n", 30),
            ("options:gfx_hz=45334954317053419571340971349057134051345\n", 30),
            ("options:gfx_hz=invalid\n", 30),
            ("", 30),
        ] {
            let (fx, _dir) = effect_with(&format!("desc:test\n{options}out_pin:output\n@init\n"));
            assert_eq!(fx.requested_framerate(), expected, "options: {options:?}");
        }
    }

    #[test]
    fn test_meters_and_framerate_options_combined() {
        let (fx, _dir) =
            effect_with("desc:test\noptions:gfx_hz=60 no_meter\nout_pin:output\n@init\n");
        assert_eq!(fx.requested_framerate(), 60);
        assert!(!fx.wants_meters());

        let (fx, _dir) =
            effect_with("desc:test\noptions:gfx_hz=60\noptions:no_meter\nout_pin:output\n@init\n");
        assert_eq!(fx.requested_framerate(), 60);
        assert!(!fx.wants_meters());
    }

    #[test]
    fn test_midi_passthrough_script() {
        let (mut fx, _dir) = compiled_with(concat!(
            "desc:midi\nout_pin:none\nin_pin:none\n",
            "@block\nwhile(midirecv(ofs, m1, m2, m3)) ( midisend(ofs, m1, m2, m3); );\n",
        ));

        assert!(fx.send_midi(MidiEvent::new(0, 3, &[0x90, 60, 100])));
        assert!(fx.send_midi(MidiEvent::new(0, 9, &[0x80, 60, 0])));
        run_block(&mut fx, 16);

        let first = fx.receive_midi().unwrap();
        assert_eq!(first.offset, 3);
        assert_eq!(&first.data[..], &[0x90, 60, 100]);
        let second = fx.receive_midi().unwrap();
        assert_eq!(second.offset, 9);
        assert_eq!(&second.data[..], &[0x80, 60, 0]);
        assert!(fx.receive_midi().is_none());
    }

    #[test]
    fn test_pdc_reporting() {
        let (mut fx, _dir) = compiled_with(concat!(
            "desc:latency\nin_pin:in\nout_pin:out\n",
            "@init\npdc_delay = 256; pdc_bot_ch = 0; pdc_top_ch = 2; pdc_midi = 1;\n",
            "@sample\nspl0 = spl0;\n",
        ));
        run_block(&mut fx, 4);
        assert_eq!(fx.status().pdc_delay(), 256.0);
        assert_eq!(fx.status().pdc_channels(), (0, 2));
        assert!(fx.status().pdc_midi());
    }

    #[test]
    fn test_trigger_visible_for_one_block() {
        let (mut fx, _dir) = compiled_with(
            "desc:trig\nout_pin:output\n@block\nseen_trigger += trigger;\n",
        );
        assert!(fx.send_trigger(2));
        assert!(!fx.send_trigger(10));
        run_block(&mut fx, 4);
        assert_eq!(fx.read_var("seen_trigger"), 4.0);
        run_block(&mut fx, 4);
        assert_eq!(fx.read_var("seen_trigger"), 4.0);
    }

    #[test]
    fn test_bank_path_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("example.jsfx");
        std::fs::write(&path, "desc:x\nout_pin:output\n@sample\nspl0=0.0;\n").unwrap();

        let mut fx = Effect::new(Arc::new(Config::new()));
        fx.load_file(&path, LoadOptions::default()).unwrap();
        assert!(fx.bank_path().is_none());

        std::fs::write(dir.path().join("example.jsfx.RpL"), "").unwrap();
        fx.load_file(&path, LoadOptions::default()).unwrap();
        let bank = fx.bank_path().unwrap().to_path_buf();
        assert!(bank
            .file_name()
            .unwrap()
            .to_string_lossy()
            .eq_ignore_ascii_case("example.jsfx.rpl"));

        fx.unload();
        assert!(fx.bank_path().is_none());
    }

    #[test]
    fn test_import_inits_run_before_main() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("main.jsfx"),
            "desc:main\nout_pin:output\nimport util.jsfx-inc\n@init\ntotal = base + 1;\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("util.jsfx-inc"), "@init\nbase = 41;\n").unwrap();

        let mut fx = Effect::new(Arc::new(Config::new()));
        fx.load_file(&dir.path().join("main.jsfx"), LoadOptions::default())
            .unwrap();
        fx.compile(CompileOptions::default()).unwrap();
        fx.init();
        assert_eq!(fx.read_var("total"), 42.0);
    }

    #[test]
    fn test_compile_error_carries_location() {
        let (mut fx, _dir) = effect_with("desc:bad\nout_pin:output\n@init\nx = 1c;\n");
        let err = fx.compile(CompileOptions::default()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains(":4:"), "got: {message}");
        assert!(!fx.is_compiled());
    }

    #[test]
    fn test_no_serialize_option_skips_blob() {
        let (mut fx, _dir) = effect_with(
            "desc:x\nout_pin:output\n@init\na=1;\n@serialize\nfile_var(0, a);\n",
        );
        fx.compile(CompileOptions {
            no_serialize: true,
            no_gfx: false,
        })
        .unwrap();
        fx.init();
        assert!(fx.save_state().data.is_empty());
    }

    #[test]
    fn test_has_section_and_gfx_dims() {
        let (fx, _dir) = effect_with("desc:x\nout_pin:output\n@gfx 200 100\n@sample\nspl0=0;\n");
        assert!(fx.has_section(SectionKind::Gfx));
        assert!(fx.has_section(SectionKind::Sample));
        assert!(!fx.has_section(SectionKind::Block));
        assert_eq!(fx.gfx_dims(), (200, 100));
    }
}
