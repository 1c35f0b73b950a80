//! The host-facing facade: lifecycle, hot swap, presets, undo.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tracing::{debug, error};

use ostinato_engine::{
    CompileOptions, Config, Effect, LoadOptions, LogLevel, MidiEvent, RtStatus, SliderBus,
    SliderCurve, TimeInfo, SLIDER_GROUPS,
};
use ostinato_preset::{load_bank, Bank, FxState};

use crate::undo::{UndoHistory, DEFAULT_UNDO_DEPTH};
use crate::worker::{RequestSlot, Worker};

/// Host-visible metadata of one slider.
#[derive(Debug, Clone)]
pub struct SliderInfo {
    pub index: u32,
    pub name: String,
    pub curve: SliderCurve,
    pub is_enum: bool,
    pub enum_names: Vec<String>,
    pub path: String,
    pub initially_visible: bool,
}

/// Immutable snapshot of the installed effect, published by atomic
/// pointer after each successful load. The message thread reads this; it
/// never touches the effect itself.
#[derive(Clone)]
pub struct EffectInfo {
    pub path: PathBuf,
    pub name: String,
    pub author: String,
    pub tags: Vec<String>,
    pub in_pins: Vec<String>,
    pub out_pins: Vec<String>,
    pub sliders: Vec<SliderInfo>,
    pub bus: Arc<SliderBus>,
    pub status: Arc<RtStatus>,
}

impl EffectInfo {
    pub fn slider(&self, index: u32) -> Option<&SliderInfo> {
        self.sliders.iter().find(|s| s.index == index)
    }
}

/// State machine of a load that failed while carrying host state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryLoadState {
    #[default]
    Ok,
    /// The load failed but the host state is held; ask the user for a
    /// working source path.
    MustRetry,
    Retrying,
    FailedRetry,
}

struct LoadRequest {
    path: PathBuf,
    initial_state: Option<FxState>,
    is_retry: bool,
    result: Mutex<Option<Result<(), String>>>,
}

struct PresetRequest {
    name: String,
    result: Mutex<Option<bool>>,
}

#[derive(Debug, Clone, Copy)]
enum HistoryStep {
    Undo,
    Redo,
}

#[derive(Default)]
struct RetryLoad {
    state: RetryLoadState,
    held_state: Option<FxState>,
    path: Option<PathBuf>,
}

type GroupMaskFn = Box<dyn Fn(u8, u64) + Send>;
type PlainFn = Box<dyn Fn() + Send>;

struct Shared {
    config: Arc<Config>,
    /// The audio-thread suspender: the lock is held across every process
    /// call and across installs, and nowhere else for long.
    audio: Mutex<Effect>,
    info: ArcSwapOption<EffectInfo>,
    bank: ArcSwapOption<Bank>,
    undo: Mutex<UndoHistory>,
    retry: Mutex<RetryLoad>,
    // worker request state, drained in a fixed order
    slider_notify: [AtomicU64; SLIDER_GROUPS],
    names_invalidated: AtomicBool,
    load: RequestSlot<LoadRequest>,
    preset: RequestSlot<PresetRequest>,
    push_undo: AtomicBool,
    history: RequestSlot<HistoryStep>,
    on_slider_notify: Mutex<Option<GroupMaskFn>>,
    on_names_invalidated: Mutex<Option<PlainFn>>,
}

/// Facade connecting the audio, message and worker threads around one
/// effect slot.
///
/// Loads, preset switches and undo all run on the worker; installs
/// suspend the audio thread at a block boundary; the message thread works
/// off the published [`EffectInfo`].
pub struct EffectHost {
    shared: Arc<Shared>,
    worker: Worker,
}

impl EffectHost {
    pub fn new(config: Arc<Config>) -> EffectHost {
        let shared = Arc::new(Shared {
            config: config.clone(),
            audio: Mutex::new(Effect::new(config)),
            info: ArcSwapOption::empty(),
            bank: ArcSwapOption::empty(),
            undo: Mutex::new(UndoHistory::new(DEFAULT_UNDO_DEPTH)),
            retry: Mutex::new(RetryLoad::default()),
            slider_notify: Default::default(),
            names_invalidated: AtomicBool::new(false),
            load: RequestSlot::default(),
            preset: RequestSlot::default(),
            push_undo: AtomicBool::new(false),
            history: RequestSlot::default(),
            on_slider_notify: Mutex::new(None),
            on_names_invalidated: Mutex::new(None),
        });

        let drained = shared.clone();
        let worker = Worker::spawn("ostinato-worker", move || Shared::drain(&drained));

        EffectHost { shared, worker }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.shared.config
    }

    // ------------------------------------------------------------------
    // lifecycle

    /// Load, compile and install an effect; blocks until the worker
    /// finished. An `initial_state` is applied on success and held for
    /// retry on failure.
    pub fn load(&self, path: &Path, initial_state: Option<FxState>) -> Result<(), String> {
        let request = self.request_load(path, initial_state);
        self.shared.load.wait();
        let result = request
            .result
            .lock()
            .clone()
            .unwrap_or_else(|| Err("load did not run".to_string()));
        result
    }

    /// Fire-and-forget variant of [`EffectHost::load`].
    pub fn load_async(&self, path: &Path, initial_state: Option<FxState>) {
        self.request_load(path, initial_state);
    }

    fn request_load(&self, path: &Path, initial_state: Option<FxState>) -> Arc<LoadRequest> {
        let request = self.shared.load.post(LoadRequest {
            path: path.to_path_buf(),
            initial_state,
            is_retry: false,
            result: Mutex::new(None),
        });
        self.worker.post();
        request
    }

    /// Retry a failed load with a replacement path, reusing the held
    /// state. Only meaningful in [`RetryLoadState::MustRetry`].
    pub fn retry_load(&self, path: &Path) -> Result<(), String> {
        let held = {
            let mut retry = self.shared.retry.lock();
            if retry.state != RetryLoadState::MustRetry {
                return Err("no load to retry".to_string());
            }
            retry.state = RetryLoadState::Retrying;
            retry.held_state.clone()
        };
        let request = self.shared.load.post(LoadRequest {
            path: path.to_path_buf(),
            initial_state: held,
            is_retry: true,
            result: Mutex::new(None),
        });
        self.worker.post();
        self.shared.load.wait();
        let result = request
            .result
            .lock()
            .clone()
            .unwrap_or_else(|| Err("load did not run".to_string()));
        result
    }

    pub fn retry_state(&self) -> RetryLoadState {
        self.shared.retry.lock().state
    }

    /// Drop the installed effect; published info and bank go away too.
    pub fn unload(&self) {
        let mut audio = self.shared.audio.lock();
        audio.unload();
        self.shared.info.store(None);
        self.shared.bank.store(None);
    }

    pub fn is_loaded(&self) -> bool {
        self.shared.info.load().is_some()
    }

    /// The currently installed effect's metadata snapshot.
    pub fn info(&self) -> Option<Arc<EffectInfo>> {
        self.shared.info.load_full()
    }

    // ------------------------------------------------------------------
    // processing (audio thread)

    pub fn set_time_info(&self, info: &TimeInfo) {
        self.shared.audio.lock().set_time_info(info);
    }

    pub fn set_sample_rate(&self, rate: f64) {
        self.shared.audio.lock().set_sample_rate(rate);
    }

    pub fn set_block_size(&self, size: u32) {
        self.shared.audio.lock().set_block_size(size);
    }

    pub fn send_midi(&self, event: MidiEvent) -> bool {
        self.shared.audio.lock().send_midi(event)
    }

    pub fn receive_midi(&self) -> Option<MidiEvent> {
        self.shared.audio.lock().receive_midi()
    }

    pub fn receive_midi_from_bus(&self, bus: u32) -> Option<MidiEvent> {
        self.shared.audio.lock().receive_midi_from_bus(bus)
    }

    pub fn send_trigger(&self, index: u32) -> bool {
        self.shared.audio.lock().send_trigger(index)
    }

    pub fn process_float(&self, ins: &[&[f32]], outs: &mut [&mut [f32]], frames: usize) {
        self.shared.audio.lock().process_float(ins, outs, frames);
    }

    pub fn process_double(&self, ins: &[&[f64]], outs: &mut [&mut [f64]], frames: usize) {
        self.shared.audio.lock().process_double(ins, outs, frames);
    }

    // ------------------------------------------------------------------
    // sliders (message thread)

    pub fn slider_value(&self, index: u32) -> f64 {
        self.info()
            .filter(|info| info.slider(index).is_some())
            .map(|info| info.bus.value(index))
            .unwrap_or(0.0)
    }

    pub fn set_slider_value(&self, index: u32, value: f64, notify: bool) {
        if let Some(info) = self.info() {
            if info.slider(index).is_some() {
                info.bus.post_host_write(index, value, notify);
            }
        }
    }

    pub fn slider_curve(&self, index: u32) -> Option<SliderCurve> {
        self.info()?.slider(index).map(|s| s.curve)
    }

    pub fn fetch_slider_changes(&self, group: u8) -> u64 {
        self.info().map(|i| i.bus.fetch_changed(group)).unwrap_or(0)
    }

    pub fn fetch_slider_automations(&self, group: u8) -> u64 {
        self.info().map(|i| i.bus.fetch_automate(group)).unwrap_or(0)
    }

    pub fn fetch_slider_touches(&self, group: u8) -> u64 {
        self.info().map(|i| i.bus.touches(group)).unwrap_or(0)
    }

    pub fn slider_visibility(&self, group: u8) -> u64 {
        self.info().map(|i| i.bus.visibility(group)).unwrap_or(0)
    }

    pub fn fetch_want_undopoint(&self) -> bool {
        self.info()
            .map(|i| i.bus.fetch_want_undopoint())
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // worker messaging

    /// Queue a "these sliders changed" notification; the worker forwards
    /// it to the registered callback off the audio thread.
    pub fn post_slider_notification(&self, group: u8, mask: u64) {
        self.shared.slider_notify[group as usize].fetch_or(mask, Ordering::AcqRel);
        self.worker.post();
    }

    /// Ask the worker to tell the host that parameter names changed.
    pub fn invalidate_parameter_names(&self) {
        self.shared.names_invalidated.store(true, Ordering::Release);
        self.worker.post();
    }

    pub fn set_slider_notify_callback(&self, callback: impl Fn(u8, u64) + Send + 'static) {
        *self.shared.on_slider_notify.lock() = Some(Box::new(callback));
    }

    pub fn set_names_invalidated_callback(&self, callback: impl Fn() + Send + 'static) {
        *self.shared.on_names_invalidated.lock() = Some(Box::new(callback));
    }

    // ------------------------------------------------------------------
    // state, presets, undo

    pub fn save_state(&self) -> FxState {
        self.shared.audio.lock().save_state()
    }

    pub fn load_state(&self, state: &FxState) {
        self.shared.audio.lock().load_state(state);
    }

    /// The published preset bank, if the loaded effect has one.
    pub fn bank(&self) -> Option<Arc<Bank>> {
        self.shared.bank.load_full()
    }

    /// Publish a replacement bank (banks are immutable values).
    pub fn replace_bank(&self, bank: Bank) {
        self.shared.bank.store(Some(Arc::new(bank)));
    }

    /// Apply a named preset from the current bank on the worker; returns
    /// whether the preset existed.
    pub fn apply_preset(&self, name: &str) -> bool {
        let request = self.shared.preset.post(PresetRequest {
            name: name.to_string(),
            result: Mutex::new(None),
        });
        self.worker.post();
        self.shared.preset.wait();
        let applied = request.result.lock().unwrap_or(false);
        applied
    }

    /// Snapshot the current state into the undo history (worker-side,
    /// deduplicated).
    pub fn push_undo_point(&self) {
        self.shared.push_undo.store(true, Ordering::Release);
        self.worker.post();
    }

    pub fn undo(&self) {
        self.shared.history.post(HistoryStep::Undo);
        self.worker.post();
        self.shared.history.wait();
    }

    pub fn redo(&self) {
        self.shared.history.post(HistoryStep::Redo);
        self.worker.post();
        self.shared.history.wait();
    }

    pub fn has_undo(&self) -> bool {
        self.shared.undo.lock().has_undo()
    }

    pub fn has_redo(&self) -> bool {
        self.shared.undo.lock().has_redo()
    }

    // ------------------------------------------------------------------
    // VM peek

    pub fn read_var(&self, name: &str) -> f64 {
        self.shared.audio.lock().read_var(name)
    }

    pub fn read_vmem(&self, addr: u32, dest: &mut [f64]) {
        self.shared.audio.lock().read_vmem(addr, dest);
    }

    pub fn read_vmem_single(&self, addr: u32) -> f64 {
        self.shared.audio.lock().read_vmem_single(addr)
    }

    pub fn used_mem(&self) -> usize {
        self.shared.audio.lock().used_mem()
    }
}

impl Shared {
    /// One worker wake-up: drain every pending request kind in order.
    fn drain(shared: &Arc<Shared>) {
        // 1. slider notifications for the message thread
        for group in 0..SLIDER_GROUPS {
            let mask = shared.slider_notify[group].swap(0, Ordering::AcqRel);
            if mask != 0 {
                if let Some(callback) = shared.on_slider_notify.lock().as_ref() {
                    callback(group as u8, mask);
                }
            }
        }

        // 2. parameter-name invalidation
        if shared.names_invalidated.swap(false, Ordering::AcqRel) {
            if let Some(callback) = shared.on_names_invalidated.lock().as_ref() {
                callback();
            }
        }

        // 3. load
        if let Some(request) = shared.load.take() {
            let result = Shared::perform_load(shared, &request);
            *request.result.lock() = Some(result);
            shared.load.complete();
        }

        // 4. preset
        if let Some(request) = shared.preset.take() {
            let applied = Shared::perform_preset(shared, &request.name);
            *request.result.lock() = Some(applied);
            shared.preset.complete();
        }

        // 5. undo-point push
        if shared.push_undo.swap(false, Ordering::AcqRel) {
            let state = shared.audio.lock().save_state();
            shared.undo.lock().push(state);
        }

        // 6. undo / redo
        if let Some(step) = shared.history.take() {
            Shared::perform_history(shared, *step);
            shared.history.complete();
        }
    }

    fn perform_load(shared: &Arc<Shared>, request: &LoadRequest) -> Result<(), String> {
        debug!(path = %request.path.display(), retry = request.is_retry, "loading effect");

        let built = Shared::build_effect(shared, request);
        match built {
            Ok((effect, info, bank)) => {
                // install under the audio suspender: the next block sees
                // the new VM, with every slider flagged for refresh
                {
                    let mut audio = shared.audio.lock();
                    *audio = effect;
                    audio.bus().mark_all_changed();
                }
                shared.info.store(Some(Arc::new(info)));
                shared.bank.store(bank.map(Arc::new));

                let mut retry = shared.retry.lock();
                retry.state = RetryLoadState::Ok;
                retry.held_state = None;
                retry.path = None;
                Ok(())
            }
            Err(message) => {
                shared
                    .config
                    .log(LogLevel::Error, &format!("load failed: {message}"));
                error!(path = %request.path.display(), "load failed: {message}");

                let mut retry = shared.retry.lock();
                if request.is_retry {
                    retry.state = RetryLoadState::FailedRetry;
                } else if let Some(state) = &request.initial_state {
                    // hold the host's state so a corrected path can pick
                    // it back up
                    retry.state = RetryLoadState::MustRetry;
                    retry.held_state = Some(state.clone());
                    retry.path = Some(request.path.clone());
                }
                Err(message)
            }
        }
    }

    fn build_effect(
        shared: &Arc<Shared>,
        request: &LoadRequest,
    ) -> Result<(Effect, EffectInfo, Option<Bank>), String> {
        let mut effect = Effect::new(shared.config.clone());
        effect
            .load_file(&request.path, LoadOptions::default())
            .map_err(|e| e.to_string())?;
        effect
            .compile(CompileOptions::default())
            .map_err(|e| e.to_string())?;
        effect.init();
        if let Some(state) = &request.initial_state {
            effect.load_state(state);
        }

        let bank = effect
            .bank_path()
            .and_then(|path| load_bank(path).ok());
        let info = build_info(&effect, &request.path);
        Ok((effect, info, bank))
    }

    fn perform_preset(shared: &Arc<Shared>, name: &str) -> bool {
        let Some(bank) = shared.bank.load_full() else {
            return false;
        };
        let found = bank.preset_exists(name);
        if found == 0 {
            return false;
        }
        let state = bank.presets[found as usize - 1].state.clone();
        shared.audio.lock().load_state(&state);
        true
    }

    fn perform_history(shared: &Arc<Shared>, step: HistoryStep) {
        let state = {
            let mut undo = shared.undo.lock();
            match step {
                HistoryStep::Undo => undo.undo().cloned(),
                HistoryStep::Redo => undo.redo().cloned(),
            }
        };
        let Some(state) = state else {
            return;
        };

        // the blob restores through @serialize; sliders go through the
        // regular host write path so no parameter notifications fire
        let mut audio = shared.audio.lock();
        audio.load_serialized_state(&state);
        for sv in &state.sliders {
            audio.bus().post_host_write(sv.index, sv.value, false);
        }
    }
}

fn build_info(effect: &Effect, path: &Path) -> EffectInfo {
    let mut sliders = Vec::new();
    for index in 0..ostinato_lang::MAX_SLIDERS as u32 {
        if !effect.slider_exists(index) {
            continue;
        }
        sliders.push(SliderInfo {
            index,
            name: effect.slider_name(index).to_string(),
            curve: *effect.slider_curve(index).expect("existing slider has a curve"),
            is_enum: effect.slider_is_enum(index),
            enum_names: effect.slider_enum_names(index).to_vec(),
            path: effect.slider_path(index).to_string(),
            initially_visible: effect.slider_is_initially_visible(index),
        });
    }

    EffectInfo {
        path: path.to_path_buf(),
        name: effect.name().to_string(),
        author: effect.author().to_string(),
        tags: effect.tags().to_vec(),
        in_pins: (0..effect.num_inputs())
            .map(|i| effect.input_name(i).to_string())
            .collect(),
        out_pins: (0..effect.num_outputs())
            .map(|i| effect.output_name(i).to_string())
            .collect(),
        sliders,
        bus: effect.bus().clone(),
        status: effect.status().clone(),
    }
}
