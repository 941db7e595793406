//! HMR helper declarations emitted into every interop-enabled program.
//!
//! The helpers talk to the three browser globals kept by the loader and the
//! HMR client: `__moduleRegistry`, `__acceptHandlers` and `__state`.

use std::fmt::Write;

/// Names a script can call to take part in hot reloading.
pub const HELPER_NAMES: [&str; 5] = [
    "hmrAccept",
    "hmrOnDispose",
    "hmrSaveState",
    "hmrLoadState",
    "hmrTrack",
];

/// Package-level flag flipped by a manual `hmrAccept` call.
pub const MANUAL_FLAG: &str = "__hmrManuallyRegistered";

/// Quotes `s` as an interpreted string literal of the script language.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// The helper block keyed by `module_id`.
///
/// The generated `init` attaches a dispose handler to the registry record the
/// loader reserved for this module. On dispose it runs the user's handler
/// and then releases every tracked interop function in registration order.
pub fn helper_block(module_id: &str) -> String {
    let mut sb = String::new();

    sb.push_str("// HMR helpers (generated)\n");
    let _ = writeln!(sb, "var __hmrModuleID = {}", quote(module_id));
    let _ = writeln!(sb, "var {} = false", MANUAL_FLAG);
    sb.push_str("var __hmrDispose func()\n");
    sb.push_str("var __hmrTracked []js.Func\n\n");

    sb.push_str(
        r#"func __hmrGlobals() (js.Value, js.Value, js.Value) {
	g := js.Global()
	for _, name := range []string{"__moduleRegistry", "__acceptHandlers", "__state"} {
		if g.Get(name).IsUndefined() {
			g.Set(name, g.Get("Object").New())
		}
	}
	return g.Get("__moduleRegistry"), g.Get("__acceptHandlers"), g.Get("__state")
}

func hmrTrack(fn js.Func) js.Func {
	__hmrTracked = append(__hmrTracked, fn)
	return fn
}

func hmrAccept(callback func()) {
	__hmrManuallyRegistered = true
	_, handlers, _ := __hmrGlobals()
	handlers.Set(__hmrModuleID, hmrTrack(js.FuncOf(func(this js.Value, args []js.Value) interface{} {
		callback()
		return nil
	})))
}

func hmrOnDispose(handler func()) {
	__hmrDispose = handler
}

func hmrSaveState(key string, value interface{}) {
	_, _, state := __hmrGlobals()
	bag := state.Get(__hmrModuleID)
	if bag.IsUndefined() {
		bag = js.Global().Get("Object").New()
		state.Set(__hmrModuleID, bag)
	}
	bag.Set(key, js.ValueOf(value))
}

func hmrLoadState(key string) js.Value {
	_, _, state := __hmrGlobals()
	bag := state.Get(__hmrModuleID)
	if bag.IsUndefined() {
		return js.Undefined()
	}
	return bag.Get(key)
}

func init() {
	registry, _, _ := __hmrGlobals()
	dispose := js.FuncOf(func(this js.Value, args []js.Value) interface{} {
		if __hmrDispose != nil {
			__hmrDispose()
		}
		for _, fn := range __hmrTracked {
			fn.Release()
		}
		__hmrTracked = nil
		return nil
	})
	keys := js.Global().Get("Object").Call("keys", registry)
	for i := 0; i < keys.Length(); i++ {
		record := registry.Get(keys.Index(i).String())
		if record.Get("moduleId").String() == __hmrModuleID && record.Get("disposeHandler").IsNull() {
			record.Set("disposeHandler", dispose)
		}
	}
}
"#,
    );

    sb
}
