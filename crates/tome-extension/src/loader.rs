// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WASM module loader using wasmtime.
//!
//! A module is compiled once at load time and shared. Every export call gets
//! a fresh [`wasmtime::Store`] with its own fuel budget, so a runaway plugin
//! traps instead of hanging the host.
//!
//! Plugins talk to the host through four imports in module `tome`:
//! `log(level, ptr, len)`, `get_input_len() -> i32`, `get_input(ptr)` and
//! `set_output(ptr, len)`. The entry point writes a shape description; the
//! `invoke` export answers source calls.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tome_core::{
    Capability, LoadedModule, ModuleLoader, SourceDescriptor, SourceHandle, TomeError,
};
use tracing::{debug, info, trace, warn};
use wasmtime::{Caller, Config, Engine, ExternType, Linker, Memory, Module, Store};

/// Export called for every source method.
pub const INVOKE_EXPORT: &str = "invoke";

const HOST_MODULE: &str = "tome";

/// Per-call store data.
struct CallState {
    input: String,
    output: Option<String>,
}

/// Shape description written by the entry point.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Shape {
    Single { source: SourceDescriptor },
    Group { sources: Vec<SourceDescriptor> },
}

/// Loads plugin modules from disk into a shared wasmtime engine.
pub struct WasmModuleLoader {
    engine: Engine,
    fuel: u64,
}

impl WasmModuleLoader {
    /// Creates a loader whose calls each get `fuel` units.
    pub fn new(fuel: u64) -> Result<Self, TomeError> {
        let mut config = Config::new();
        config.consume_fuel(true);

        let engine = Engine::new(&config).map_err(|e| {
            TomeError::Internal(format!("failed to create wasmtime engine: {e}"))
        })?;

        info!(fuel, "WASM module loader initialized");
        Ok(Self { engine, fuel })
    }
}

impl ModuleLoader for WasmModuleLoader {
    fn load(&self, path: &Path, entry_point: &str) -> Result<Arc<dyn LoadedModule>, TomeError> {
        let module = Module::from_file(&self.engine, path).map_err(|e| TomeError::ModuleLoad {
            path: path.display().to_string(),
            message: format!("{e:#}"),
        })?;

        match module.get_export(entry_point) {
            Some(ExternType::Func(ty)) if ty.params().len() == 0 && ty.results().len() == 0 => {}
            Some(_) => {
                return Err(TomeError::CapabilityDiscovery {
                    module: path.display().to_string(),
                    message: format!("entry point '{entry_point}' is not a () -> () function"),
                });
            }
            None => {
                return Err(TomeError::CapabilityDiscovery {
                    module: path.display().to_string(),
                    message: format!("entry point '{entry_point}' is not exported"),
                });
            }
        }

        let mut linker = Linker::new(&self.engine);
        define_host_functions(&mut linker)?;

        debug!(path = %path.display(), entry_point, "loaded WASM module");
        Ok(Arc::new(WasmModule {
            inner: Arc::new(ModuleInner {
                engine: self.engine.clone(),
                module,
                linker,
                path: path.to_path_buf(),
                entry_point: entry_point.to_string(),
                fuel: self.fuel,
            }),
        }))
    }
}

struct ModuleInner {
    engine: Engine,
    module: Module,
    linker: Linker<CallState>,
    path: PathBuf,
    entry_point: String,
    fuel: u64,
}

impl ModuleInner {
    /// Call a `() -> ()` export with `input`, returning what it passed to
    /// `set_output`. Blocking.
    fn run_export(&self, export: &str, input: String) -> Result<Option<String>, TomeError> {
        let state = CallState {
            input,
            output: None,
        };
        let mut store = Store::new(&self.engine, state);
        store
            .set_fuel(self.fuel)
            .map_err(|e| TomeError::Internal(format!("failed to set fuel: {e}")))?;

        let run = |store: &mut Store<CallState>| -> Result<(), wasmtime::Error> {
            let instance = self.linker.instantiate(&mut *store, &self.module)?;
            let func = instance.get_typed_func::<(), ()>(&mut *store, export)?;
            func.call(&mut *store, ())
        };

        match run(&mut store) {
            Ok(()) => Ok(store.into_data().output),
            Err(e) => Err(TomeError::Internal(self.describe_failure(export, &e))),
        }
    }

    fn describe_failure(&self, export: &str, e: &wasmtime::Error) -> String {
        let message = format!("{e:#}");
        if message.contains("all fuel consumed") {
            format!("export '{export}' exceeded fuel limit ({} units)", self.fuel)
        } else {
            format!("export '{export}' failed: {message}")
        }
    }
}

struct WasmModule {
    inner: Arc<ModuleInner>,
}

impl LoadedModule for WasmModule {
    fn path(&self) -> &Path {
        &self.inner.path
    }

    fn instantiate(&self) -> Result<Capability, TomeError> {
        let module_name = self.inner.path.display().to_string();
        let discovery = |message: String| TomeError::CapabilityDiscovery {
            module: module_name.clone(),
            message,
        };

        let raw = match self.inner.run_export(&self.inner.entry_point, String::new()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Err(discovery("entry point wrote no shape description".into())),
            Err(e) => return Err(discovery(e.to_string())),
        };
        let shape: Shape = serde_json::from_str(&raw)
            .map_err(|e| discovery(format!("invalid shape description: {e}")))?;

        let handle = |descriptor: SourceDescriptor| -> Arc<dyn SourceHandle> {
            Arc::new(WasmSource {
                inner: Arc::clone(&self.inner),
                descriptor,
            })
        };
        Ok(match shape {
            Shape::Single { source } => Capability::Single(handle(source)),
            Shape::Group { sources } => {
                Capability::Group(sources.into_iter().map(handle).collect())
            }
        })
    }
}

/// One source served by a loaded module.
struct WasmSource {
    inner: Arc<ModuleInner>,
    descriptor: SourceDescriptor,
}

#[async_trait]
impl SourceHandle for WasmSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        method: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, TomeError> {
        let source_id = self.descriptor.id;
        let unavailable = |message: String| TomeError::SourceUnavailable { source_id, message };

        let input = serde_json::json!({
            "source_id": source_id,
            "method": method,
            "args": args,
        })
        .to_string();

        let inner = Arc::clone(&self.inner);
        let output = tokio::task::spawn_blocking(move || inner.run_export(INVOKE_EXPORT, input))
            .await
            .map_err(|e| unavailable(format!("WASM execution task panicked: {e}")))?
            .map_err(|e| unavailable(e.to_string()))?;

        match output {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| unavailable(format!("invalid JSON result: {e}"))),
            None => Ok(serde_json::Value::Null),
        }
    }
}

fn define_host_functions(linker: &mut Linker<CallState>) -> Result<(), TomeError> {
    linker
        .func_wrap(
            HOST_MODULE,
            "log",
            |mut caller: Caller<'_, CallState>, level: i32, ptr: i32, len: i32| {
                let Some(memory) = exported_memory(&mut caller) else {
                    return;
                };
                let Some(msg) = read_string_from_memory(&memory, &caller, ptr, len) else {
                    return;
                };
                match level {
                    0 => trace!(plugin_log = %msg, "plugin log"),
                    1 => debug!(plugin_log = %msg, "plugin log"),
                    3 | 4 => warn!(plugin_log = %msg, level, "plugin log"),
                    _ => info!(plugin_log = %msg, "plugin log"),
                }
            },
        )
        .map_err(linker_err)?;

    linker
        .func_wrap(
            HOST_MODULE,
            "get_input_len",
            |caller: Caller<'_, CallState>| -> i32 {
                i32::try_from(caller.data().input.len()).unwrap_or(i32::MAX)
            },
        )
        .map_err(linker_err)?;

    linker
        .func_wrap(
            HOST_MODULE,
            "get_input",
            |mut caller: Caller<'_, CallState>, ptr: i32| -> Result<(), wasmtime::Error> {
                let memory = exported_memory(&mut caller)
                    .ok_or_else(|| wasmtime::Error::msg("module has no exported memory"))?;
                let input = caller.data().input.clone();
                if write_bytes_to_memory(&memory, &mut caller, ptr, input.as_bytes()) {
                    Ok(())
                } else {
                    Err(wasmtime::Error::msg("input buffer out of bounds"))
                }
            },
        )
        .map_err(linker_err)?;

    linker
        .func_wrap(
            HOST_MODULE,
            "set_output",
            |mut caller: Caller<'_, CallState>, ptr: i32, len: i32| -> Result<(), wasmtime::Error> {
                let memory = exported_memory(&mut caller)
                    .ok_or_else(|| wasmtime::Error::msg("module has no exported memory"))?;
                let output = read_string_from_memory(&memory, &caller, ptr, len)
                    .ok_or_else(|| wasmtime::Error::msg("output is out of bounds or not UTF-8"))?;
                caller.data_mut().output = Some(output);
                Ok(())
            },
        )
        .map_err(linker_err)?;

    Ok(())
}

fn exported_memory(caller: &mut Caller<'_, CallState>) -> Option<Memory> {
    match caller.get_export("memory") {
        Some(wasmtime::Extern::Memory(mem)) => Some(mem),
        _ => None,
    }
}

fn read_string_from_memory(
    memory: &Memory,
    caller: &Caller<'_, CallState>,
    ptr: i32,
    len: i32,
) -> Option<String> {
    let ptr = usize::try_from(ptr).ok()?;
    let len = usize::try_from(len).ok()?;
    let data = memory.data(caller);
    let end = ptr.checked_add(len)?;
    if end > data.len() {
        return None;
    }
    String::from_utf8(data[ptr..end].to_vec()).ok()
}

fn write_bytes_to_memory(
    memory: &Memory,
    caller: &mut Caller<'_, CallState>,
    ptr: i32,
    bytes: &[u8],
) -> bool {
    let Ok(ptr) = usize::try_from(ptr) else {
        return false;
    };
    let data = memory.data_mut(caller);
    match ptr.checked_add(bytes.len()) {
        Some(end) if end <= data.len() => {
            data[ptr..end].copy_from_slice(bytes);
            true
        }
        _ => false,
    }
}

fn linker_err(e: impl std::fmt::Display) -> TomeError {
    TomeError::Internal(format!("failed to define host function: {e}"))
}
