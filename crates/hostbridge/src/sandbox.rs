//! Snippet execution in throwaway Lua namespaces.
//!
//! Every [`Executor::run`] builds a new environment table holding a copy of
//! the interpreter's standard globals, with each library table copied one
//! level deep. `_G` and the default environment of `load` point at that
//! copy, so assignments made by one snippet are gone by the next and the
//! interpreter's own globals are never written. Output functions (`print`,
//! `io.write`, `io.stdout:write`, `io.stderr:write`, `warn`) are rebound
//! inside that table to per-call buffers; nothing process-wide is swapped
//! out.

use std::{cell::RefCell, io::Write, rc::Rc};

use mlua::{Function, Lua, MultiValue, Table, Value};

use crate::{
    convert::{json_to_lua, lua_to_json},
    result::{ExecutionResult, Failure},
};

/// Global name a [`Capability`] is bound under.
pub const CAPABILITY_NAME: &str = "host";

/// Namespace variable read back as the snippet's value.
pub const RESULT_NAME: &str = "result";

const CHUNK_NAME: &str = "=sandbox";
const TRACEBACK_MARKER: &str = "\nstack traceback:";

/// `load` with the snippet namespace as the default environment. Upvalues
/// keep the namespace reachable only through Lua, so it is collected with
/// the rest of the call.
const LOAD_IN_NAMESPACE: &str = r"
local load, env = ...
return function(chunk, name, mode, ...)
    if select('#', ...) == 0 then
        return load(chunk, name, mode, env)
    end
    return load(chunk, name, mode, ...)
end
";

/// Privileged scripting API handed to snippets.
///
/// Implementations usually hold state that must only be touched from the
/// thread owning the executor.
pub trait Capability {
    fn to_lua(&self, lua: &Lua) -> mlua::Result<Value>;
}

pub struct Executor {
    lua: Lua,
    capability: Option<Box<dyn Capability>>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    /// An executor without a capability; `host` is nil inside snippets.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lua: Lua::new(),
            capability: None,
        }
    }

    #[must_use]
    pub fn with_capability(capability: impl Capability + 'static) -> Self {
        Self {
            lua: Lua::new(),
            capability: Some(Box::new(capability)),
        }
    }

    #[must_use]
    pub const fn has_capability(&self) -> bool {
        self.capability.is_some()
    }

    pub fn run(&self, code: &str) -> ExecutionResult {
        let capture = Capture::new();
        let outcome = self.eval(code, &capture);
        let (output, stderr) = capture.release();

        match outcome {
            Ok((namespace, returned)) => {
                let value = extract_value(&namespace, returned, &output);
                ExecutionResult {
                    value,
                    output,
                    stderr,
                    failure: None,
                }
            }
            Err(err) => {
                let failure = failure_from(&err);
                tracing::debug!(message = %failure.message, "snippet raised");
                ExecutionResult {
                    value: None,
                    output,
                    stderr,
                    failure: Some(failure),
                }
            }
        }
    }

    fn eval(&self, code: &str, capture: &Capture) -> mlua::Result<(Table, Value)> {
        let namespace = self.namespace(capture)?;
        let returned: MultiValue = self
            .lua
            .load(code)
            .set_name(CHUNK_NAME)
            .set_environment(namespace.clone())
            .call(())?;
        Ok((namespace, returned.into_iter().next().unwrap_or(Value::Nil)))
    }

    fn namespace(&self, capture: &Capture) -> mlua::Result<Table> {
        let lua = &self.lua;
        let globals = lua.globals();

        let namespace = lua.create_table()?;
        for pair in globals.pairs::<Value, Value>() {
            let (name, value) = pair?;
            let value = match value {
                Value::Table(library) if library.to_pointer() != globals.to_pointer() => {
                    Value::Table(shallow_copy(lua, &library)?)
                }
                other => other,
            };
            namespace.raw_set(name, value)?;
        }
        namespace.raw_set("_G", namespace.clone())?;

        let load: Function = globals.raw_get("load")?;
        let load: Function = lua
            .load(LOAD_IN_NAMESPACE)
            .set_name("=load")
            .call((load, namespace.clone()))?;
        namespace.raw_set("load", load)?;

        let tostring: Function = globals.raw_get("tostring")?;
        namespace.raw_set("print", print_fn(lua, &tostring, capture.stdout.clone())?)?;
        namespace.raw_set("warn", warn_fn(lua, &tostring, capture.stderr.clone())?)?;
        let io = namespace.raw_get::<Value>("io")?;
        namespace.raw_set("io", io_table(lua, io, &tostring, capture)?)?;
        namespace.raw_set("json", json_table(lua)?)?;

        if let Some(capability) = &self.capability {
            namespace.raw_set(CAPABILITY_NAME, capability.to_lua(lua)?)?;
        }
        Ok(namespace)
    }
}

/// `result` variable, then the chunk's return value, then stdout.
fn extract_value(
    namespace: &Table,
    returned: Value,
    output: &str,
) -> Option<serde_json::Value> {
    let named = namespace
        .raw_get::<Value>(RESULT_NAME)
        .unwrap_or(Value::Nil);
    let explicit = if matches!(named, Value::Nil) {
        returned
    } else {
        named
    };
    if !matches!(explicit, Value::Nil) {
        let type_name = explicit.type_name();
        return Some(lua_to_json(explicit).unwrap_or_else(|err| {
            tracing::debug!(%err, "result is not JSON serialisable");
            serde_json::Value::String(format!("<{type_name}>"))
        }));
    }
    value_from_output(output)
}

fn value_from_output(output: &str) -> Option<serde_json::Value> {
    let stripped = output.trim();
    if stripped.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(stripped) {
        Ok(serde_json::Value::Null) => None,
        Ok(value) => Some(value),
        Err(_) => Some(serde_json::Value::String(stripped.to_owned())),
    }
}

fn failure_from(err: &mlua::Error) -> Failure {
    let root = root_message(err);
    let message = root
        .split(TRACEBACK_MARKER)
        .next()
        .unwrap_or_default()
        .trim_end()
        .to_owned();
    Failure {
        message,
        trace: err.to_string(),
    }
}

fn root_message(err: &mlua::Error) -> String {
    match err {
        mlua::Error::CallbackError { cause, .. } => root_message(cause),
        mlua::Error::SyntaxError { message, .. } | mlua::Error::RuntimeError(message) => {
            message.clone()
        }
        other => other.to_string(),
    }
}

fn shallow_copy(lua: &Lua, table: &Table) -> mlua::Result<Table> {
    let copy = lua.create_table()?;
    for pair in table.pairs::<Value, Value>() {
        let (key, value) = pair?;
        copy.raw_set(key, value)?;
    }
    Ok(copy)
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// A per-call buffer. Once released, writes reach the real process stream.
#[derive(Clone)]
struct Sink {
    buffer: Rc<RefCell<Option<String>>>,
    stream: Stream,
}

impl Sink {
    fn new(stream: Stream) -> Self {
        Self {
            buffer: Rc::new(RefCell::new(Some(String::new()))),
            stream,
        }
    }

    fn write(&self, text: &str) {
        if let Some(buffer) = self.buffer.borrow_mut().as_mut() {
            buffer.push_str(text);
            return;
        }
        let _ = match self.stream {
            Stream::Stdout => std::io::stdout().write_all(text.as_bytes()),
            Stream::Stderr => std::io::stderr().write_all(text.as_bytes()),
        };
    }

    fn take(&self) -> String {
        self.buffer.borrow_mut().take().unwrap_or_default()
    }
}

struct Capture {
    stdout: Sink,
    stderr: Sink,
}

impl Capture {
    fn new() -> Self {
        Self {
            stdout: Sink::new(Stream::Stdout),
            stderr: Sink::new(Stream::Stderr),
        }
    }

    fn release(&self) -> (String, String) {
        (self.stdout.take(), self.stderr.take())
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.release();
    }
}

fn render(
    tostring: &Function,
    args: impl IntoIterator<Item = Value>,
    separator: &str,
) -> mlua::Result<String> {
    let mut rendered = String::new();
    for (index, value) in args.into_iter().enumerate() {
        if index > 0 {
            rendered.push_str(separator);
        }
        let text: mlua::String = tostring.call(value)?;
        rendered.push_str(&text.to_string_lossy());
    }
    Ok(rendered)
}

fn print_fn(lua: &Lua, tostring: &Function, sink: Sink) -> mlua::Result<Function> {
    let tostring = tostring.clone();
    lua.create_function(move |_, args: MultiValue| {
        let mut line = render(&tostring, args, "\t")?;
        line.push('\n');
        sink.write(&line);
        Ok(())
    })
}

fn warn_fn(lua: &Lua, tostring: &Function, sink: Sink) -> mlua::Result<Function> {
    let tostring = tostring.clone();
    lua.create_function(move |_, args: MultiValue| {
        let message = render(&tostring, args, "")?;
        // "@on" / "@off" are control messages, not warnings
        if !message.starts_with('@') {
            sink.write(&format!("Lua warning: {message}\n"));
        }
        Ok(())
    })
}

/// `io.write(...)`, or `file:write(...)` when `method` skips the receiver.
fn write_fn(
    lua: &Lua,
    tostring: &Function,
    sink: Sink,
    method: bool,
) -> mlua::Result<Function> {
    let tostring = tostring.clone();
    lua.create_function(move |_, args: MultiValue| {
        let skip = usize::from(method);
        sink.write(&render(&tostring, args.into_iter().skip(skip), "")?);
        Ok(())
    })
}

/// Rebinds the writers of the namespace's own `io` copy.
fn io_table(
    lua: &Lua,
    io: Value,
    tostring: &Function,
    capture: &Capture,
) -> mlua::Result<Table> {
    let io = match io {
        Value::Table(io) => io,
        _ => lua.create_table()?,
    };
    io.raw_set("write", write_fn(lua, tostring, capture.stdout.clone(), false)?)?;

    let stdout = lua.create_table()?;
    stdout.raw_set("write", write_fn(lua, tostring, capture.stdout.clone(), true)?)?;
    io.raw_set("stdout", stdout)?;

    let stderr = lua.create_table()?;
    stderr.raw_set("write", write_fn(lua, tostring, capture.stderr.clone(), true)?)?;
    io.raw_set("stderr", stderr)?;

    Ok(io)
}

fn json_table(lua: &Lua) -> mlua::Result<Table> {
    let json = lua.create_table()?;
    json.set(
        "encode",
        lua.create_function(|_, value: Value| {
            let value =
                lua_to_json(value).map_err(|err| mlua::Error::RuntimeError(err.to_string()))?;
            serde_json::to_string(&value).map_err(|err| mlua::Error::RuntimeError(err.to_string()))
        })?,
    )?;
    json.set(
        "decode",
        lua.create_function(|lua, text: String| {
            let value: serde_json::Value = serde_json::from_str(&text)
                .map_err(|err| mlua::Error::RuntimeError(format!("invalid JSON: {err}")))?;
            json_to_lua(lua, &value)
        })?,
    )?;
    Ok(json)
}
