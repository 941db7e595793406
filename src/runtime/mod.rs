//! A typed model of the in-page module runtime.
//!
//! The page keeps three globals: `__moduleRegistry` (registry key to module
//! record), `__acceptHandlers` (module ID to accept callback) and `__state`
//! (module ID to a JSON bag). [`BrowserGlobals`] mirrors them, creating each
//! on first access. [`HmrBroker`] runs the loader and the reload protocol
//! against a [`WasmHost`], with the same ordering the emitted JavaScript
//! follows: dispose before instantiation, accept after the new instance has
//! run, tracked functions released in registration order.

pub mod protocol;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::loader::registry_key;

pub use protocol::HmrMessage;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("instantiate {url}: {message}")]
    Instantiate { url: String, message: String },
}

/// Handle of an interop function object created by a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub target: String,
    pub event: String,
    pub func: FuncHandle,
}

pub type Handler = Box<dyn FnMut(&mut ModuleScope<'_>)>;
pub type CleanupHook = Box<dyn FnMut(&str) -> Result<(), String>>;

/// Everything observable the runtime does, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    Instantiated { key: String },
    Ran { key: String },
    Accepted { module_id: String },
    Disposed { module_id: String },
    Released(FuncHandle),
    ListenerRemoved { target: String, event: String },
    CleanupFailed { module_id: String, message: String },
    LoadFailed { url: String, message: String },
}

pub struct ModuleRecord {
    pub key: String,
    pub module_id: String,
    pub instance: Option<Box<dyn ModuleProgram>>,
    pub listeners: Vec<Listener>,
    pub tracked: Vec<FuncHandle>,
    pub dispose_handler: Option<Handler>,
    /// Set by a manual accept registration.
    pub manual_accept: bool,
}

impl std::fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("key", &self.key)
            .field("module_id", &self.module_id)
            .field("instantiated", &self.instance.is_some())
            .field("listeners", &self.listeners)
            .field("tracked", &self.tracked)
            .field("dispose_handler", &self.dispose_handler.is_some())
            .finish()
    }
}

impl ModuleRecord {
    fn reserved(key: &str, module_id: &str) -> Self {
        Self {
            key: key.to_string(),
            module_id: module_id.to_string(),
            instance: None,
            listeners: Vec::new(),
            tracked: Vec::new(),
            dispose_handler: None,
            manual_accept: false,
        }
    }
}

/// The page's global namespace as seen by modules.
#[derive(Default)]
pub struct BrowserGlobals {
    registry: Option<BTreeMap<String, ModuleRecord>>,
    accept_handlers: Option<HashMap<String, Handler>>,
    state: Option<HashMap<String, Map<String, Value>>>,
    cleanup_hook: Option<CleanupHook>,
    next_func: u64,
    events: Vec<RuntimeEvent>,
}

impl BrowserGlobals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any of the three globals exists yet.
    pub fn initialized(&self) -> bool {
        self.registry.is_some() || self.accept_handlers.is_some() || self.state.is_some()
    }

    pub fn registry(&mut self) -> &mut BTreeMap<String, ModuleRecord> {
        self.registry.get_or_insert_with(BTreeMap::new)
    }

    pub fn accept_handlers(&mut self) -> &mut HashMap<String, Handler> {
        self.accept_handlers.get_or_insert_with(HashMap::new)
    }

    pub fn state(&mut self) -> &mut HashMap<String, Map<String, Value>> {
        self.state.get_or_insert_with(HashMap::new)
    }

    /// Installs the optional `__wasmCleanup` hook.
    pub fn set_cleanup_hook(&mut self, hook: CleanupHook) {
        self.cleanup_hook = Some(hook);
    }

    pub fn events(&self) -> &[RuntimeEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<RuntimeEvent> {
        std::mem::take(&mut self.events)
    }

    fn record(&mut self, event: RuntimeEvent) {
        self.events.push(event);
    }

    fn alloc_func(&mut self) -> FuncHandle {
        self.next_func += 1;
        FuncHandle(self.next_func)
    }

    /// Registry keys of every record owned by `module_id`.
    pub fn keys_for(&mut self, module_id: &str) -> Vec<String> {
        self.registry()
            .values()
            .filter(|r| r.module_id == module_id)
            .map(|r| r.key.clone())
            .collect()
    }

    fn run_cleanup(&mut self, module_id: &str) {
        let Some(hook) = self.cleanup_hook.as_mut() else {
            return;
        };
        if let Err(message) = hook(module_id) {
            tracing::warn!(module_id, %message, "cleanup hook failed");
            self.record(RuntimeEvent::CleanupFailed {
                module_id: module_id.to_string(),
                message,
            });
        }
    }
}

/// What a running module can reach: the helpers emitted into every
/// interop-enabled program.
pub struct ModuleScope<'a> {
    globals: &'a mut BrowserGlobals,
    key: String,
    module_id: String,
}

impl<'a> ModuleScope<'a> {
    pub fn new(globals: &'a mut BrowserGlobals, key: impl Into<String>, module_id: impl Into<String>) -> Self {
        Self {
            globals,
            key: key.into(),
            module_id: module_id.into(),
        }
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    fn own_record(&mut self) -> Option<&mut ModuleRecord> {
        let key = self.key.clone();
        self.globals.registry().get_mut(&key)
    }

    /// `hmrTrack`: remembers an interop function for release on dispose.
    pub fn track(&mut self) -> FuncHandle {
        let func = self.globals.alloc_func();
        if let Some(record) = self.own_record() {
            record.tracked.push(func);
        }
        func
    }

    /// Adds an event listener whose callback is tracked.
    pub fn listen(&mut self, target: &str, event: &str) -> FuncHandle {
        let func = self.track();
        if let Some(record) = self.own_record() {
            record.listeners.push(Listener {
                target: target.to_string(),
                event: event.to_string(),
                func,
            });
        }
        func
    }

    /// `hmrAccept`: marks the module as registered and stores `handler`.
    pub fn accept(&mut self, handler: impl FnMut(&mut ModuleScope<'_>) + 'static) {
        self.track();
        if let Some(record) = self.own_record() {
            record.manual_accept = true;
        }
        let module_id = self.module_id.clone();
        self.globals.accept_handlers().insert(module_id, Box::new(handler));
    }

    pub fn manually_registered(&mut self) -> bool {
        self.own_record().is_some_and(|r| r.manual_accept)
    }

    /// `hmrOnDispose`.
    pub fn on_dispose(&mut self, handler: impl FnMut(&mut ModuleScope<'_>) + 'static) {
        if let Some(record) = self.own_record() {
            record.dispose_handler = Some(Box::new(handler));
        }
    }

    /// `hmrSaveState`.
    pub fn save_state<T: Serialize>(&mut self, key: &str, value: &T) -> serde_json::Result<()> {
        let value = serde_json::to_value(value)?;
        let module_id = self.module_id.clone();
        self.globals
            .state()
            .entry(module_id)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    /// `hmrLoadState`; `None` when nothing was saved or it does not decode
    /// as `T`.
    pub fn load_state<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        let module_id = self.module_id.clone();
        let value = self.globals.state().get(&module_id)?.get(key)?.clone();
        serde_json::from_value(value).ok()
    }
}

/// A module instance: what its entry point does when run.
pub trait ModuleProgram {
    fn run(&mut self, scope: &mut ModuleScope<'_>);
}

/// Instantiates compiled modules, as `WebAssembly.instantiateStreaming`
/// does in the page.
pub trait WasmHost {
    fn instantiate(&mut self, url: &str) -> Result<Box<dyn ModuleProgram>, RuntimeError>;
}

/// The program shape produced for bodies without their own entry: run the
/// statements once. Bodies that touch interop also register the statements
/// as the accept handler unless they registered one themselves, so a
/// reload runs them a second time.
pub struct SynthesizedMain {
    entry: std::rc::Rc<dyn Fn(&mut ModuleScope<'_>)>,
    interop: bool,
}

impl SynthesizedMain {
    pub fn new(entry: impl Fn(&mut ModuleScope<'_>) + 'static) -> Self {
        Self {
            entry: std::rc::Rc::new(entry),
            interop: false,
        }
    }

    pub fn with_interop(entry: impl Fn(&mut ModuleScope<'_>) + 'static) -> Self {
        Self {
            interop: true,
            ..Self::new(entry)
        }
    }
}

impl ModuleProgram for SynthesizedMain {
    fn run(&mut self, scope: &mut ModuleScope<'_>) {
        (self.entry)(scope);
        if self.interop && !scope.manually_registered() {
            let entry = std::rc::Rc::clone(&self.entry);
            scope.accept(move |scope| entry(scope));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { key: String },
    AlreadyLoaded { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HmrAction {
    /// Nothing to do on this page.
    Ignored,
    FullReload,
    Swapped { module_id: String, key: String },
    StylesReplaced { hash: String },
    Reported { message: String },
}

/// Executes the loader and reload protocol against a host.
pub struct HmrBroker<H: WasmHost> {
    host: H,
    globals: BrowserGlobals,
}

impl<H: WasmHost> HmrBroker<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            globals: BrowserGlobals::new(),
        }
    }

    pub fn globals(&self) -> &BrowserGlobals {
        &self.globals
    }

    pub fn globals_mut(&mut self) -> &mut BrowserGlobals {
        &mut self.globals
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// What a loader script does: return early for a known key, otherwise
    /// reserve the record, instantiate and run.
    pub fn load(&mut self, url: &str, module_id: &str) -> Result<LoadOutcome, RuntimeError> {
        let key = registry_key(url);
        if self.globals.registry().contains_key(&key) {
            return Ok(LoadOutcome::AlreadyLoaded { key });
        }
        self.globals
            .registry()
            .insert(key.clone(), ModuleRecord::reserved(&key, module_id));

        let mut program = match self.host.instantiate(url) {
            Ok(program) => program,
            Err(err) => {
                self.globals.registry().remove(&key);
                self.globals.record(RuntimeEvent::LoadFailed {
                    url: url.to_string(),
                    message: err.to_string(),
                });
                tracing::error!(url, %err, "module failed to load");
                return Err(err);
            }
        };
        self.globals.record(RuntimeEvent::Instantiated { key: key.clone() });

        {
            let mut scope = ModuleScope::new(&mut self.globals, key.clone(), module_id);
            program.run(&mut scope);
        }
        self.globals.record(RuntimeEvent::Ran { key: key.clone() });

        if let Some(record) = self.globals.registry().get_mut(&key) {
            record.instance = Some(program);
        }
        Ok(LoadOutcome::Loaded { key })
    }

    /// Disposes every record of `module_id`: user handler, tracked function
    /// release in registration order, listener removal, cleanup hook.
    pub fn dispose(&mut self, module_id: &str) {
        let keys = self.globals.keys_for(module_id);
        self.dispose_records(module_id, keys);
    }

    /// Disposes only the record loaded from `url`; other instances sharing
    /// `module_id` keep running.
    pub fn dispose_instance(&mut self, module_id: &str, url: &str) {
        self.dispose_records(module_id, vec![registry_key(url)]);
    }

    fn dispose_records(&mut self, module_id: &str, keys: Vec<String>) {
        for key in keys {
            let handler = self
                .globals
                .registry()
                .get_mut(&key)
                .and_then(|r| r.dispose_handler.take());
            if let Some(mut handler) = handler {
                let mut scope = ModuleScope::new(&mut self.globals, key.clone(), module_id);
                handler(&mut scope);
            }

            let Some(record) = self.globals.registry().remove(&key) else {
                continue;
            };
            for func in &record.tracked {
                self.globals.record(RuntimeEvent::Released(*func));
            }
            for listener in &record.listeners {
                self.globals.record(RuntimeEvent::ListenerRemoved {
                    target: listener.target.clone(),
                    event: listener.event.clone(),
                });
            }
            self.globals.run_cleanup(module_id);
        }
        self.globals.accept_handlers().remove(module_id);
        self.globals.record(RuntimeEvent::Disposed {
            module_id: module_id.to_string(),
        });
    }

    fn accept(&mut self, module_id: &str, key: &str) {
        let Some(mut handler) = self.globals.accept_handlers().remove(module_id) else {
            return;
        };
        {
            let mut scope = ModuleScope::new(&mut self.globals, key, module_id);
            handler(&mut scope);
        }
        // The handler may have registered a replacement.
        self.globals
            .accept_handlers()
            .entry(module_id.to_string())
            .or_insert(handler);
        self.globals.record(RuntimeEvent::Accepted {
            module_id: module_id.to_string(),
        });
    }

    /// Swaps every instance of `module_id` for the module at `url`.
    pub fn wasm_reload(&mut self, module_id: &str, url: &str) -> Result<String, RuntimeError> {
        self.dispose(module_id);
        self.load_and_accept(module_id, url)
    }

    /// Swaps the instance loaded from `old_url` for the module at `url`.
    pub fn wasm_swap(&mut self, module_id: &str, old_url: &str, url: &str) -> Result<String, RuntimeError> {
        self.dispose_instance(module_id, old_url);
        self.load_and_accept(module_id, url)
    }

    fn load_and_accept(&mut self, module_id: &str, url: &str) -> Result<String, RuntimeError> {
        let key = match self.load(url, module_id)? {
            LoadOutcome::Loaded { key } | LoadOutcome::AlreadyLoaded { key } => key,
        };
        self.accept(module_id, &key);
        Ok(key)
    }

    /// Applies one channel message. Messages are handled one at a time, so
    /// reloads of a module never overlap.
    pub fn handle(&mut self, msg: &HmrMessage) -> HmrAction {
        match msg {
            HmrMessage::Reload => HmrAction::FullReload,
            HmrMessage::WasmReload {
                module_id,
                wasm_url,
                replaces,
                ..
            } => {
                let swapped = match replaces {
                    Some(old_url) => self.wasm_swap(module_id, old_url, wasm_url),
                    None => self.wasm_reload(module_id, wasm_url),
                };
                match swapped {
                    Ok(key) => HmrAction::Swapped {
                        module_id: module_id.clone(),
                        key,
                    },
                    Err(_) => HmrAction::FullReload,
                }
            }
            HmrMessage::ComponentUpdate { .. } => HmrAction::FullReload,
            HmrMessage::StyleUpdate { hash, .. } => HmrAction::StylesReplaced { hash: hash.clone() },
            HmrMessage::Error { message } => {
                tracing::error!(%message, "rebuild failed");
                HmrAction::Reported {
                    message: message.clone(),
                }
            }
        }
    }
}
