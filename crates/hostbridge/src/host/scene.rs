use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use mlua::{Lua, Value};

use crate::sandbox::Capability;

#[derive(Debug, Clone, PartialEq)]
struct Object {
    name: String,
    kind: String,
    location: [f64; 3],
}

#[derive(Debug, Default)]
struct SceneState {
    objects: Vec<Object>,
    counters: BTreeMap<String, usize>,
}

impl SceneState {
    /// `Cube`, `Cube.001`, `Cube.002`, ...
    fn next_name(&mut self, kind: &str) -> String {
        let counter = self.counters.entry(kind.to_owned()).or_default();
        let name = if *counter == 0 {
            kind.to_owned()
        } else {
            format!("{kind}.{counter:03}")
        };
        *counter += 1;
        name
    }
}

/// Demonstration host API: a flat list of named objects.
///
/// The state is deliberately `!Send`; it may only be touched from the
/// thread that owns the executor it is bound into.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    state: Rc<RefCell<SceneState>>,
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.borrow().objects.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.state
            .borrow()
            .objects
            .iter()
            .map(|object| object.name.clone())
            .collect()
    }
}

impl Capability for Scene {
    fn to_lua(&self, lua: &Lua) -> mlua::Result<Value> {
        let api = lua.create_table()?;

        let state = self.state.clone();
        api.set(
            "add_object",
            lua.create_function(
                move |_, (kind, x, y, z): (Option<String>, Option<f64>, Option<f64>, Option<f64>)| {
                    let kind = kind.unwrap_or_else(|| "Cube".to_owned());
                    let mut state = state.borrow_mut();
                    let name = state.next_name(&kind);
                    state.objects.push(Object {
                        name: name.clone(),
                        kind,
                        location: [x.unwrap_or(0.0), y.unwrap_or(0.0), z.unwrap_or(0.0)],
                    });
                    Ok(name)
                },
            )?,
        )?;

        let state = self.state.clone();
        api.set(
            "objects",
            lua.create_function(move |lua, ()| {
                let list = lua.create_table()?;
                for (index, object) in state.borrow().objects.iter().enumerate() {
                    let entry = lua.create_table()?;
                    entry.set("name", object.name.as_str())?;
                    entry.set("kind", object.kind.as_str())?;
                    entry.set("location", object.location.to_vec())?;
                    list.raw_set(index + 1, entry)?;
                }
                Ok(list)
            })?,
        )?;

        let state = self.state.clone();
        api.set(
            "remove_object",
            lua.create_function(move |_, name: String| {
                let mut state = state.borrow_mut();
                let before = state.objects.len();
                state.objects.retain(|object| object.name != name);
                Ok(state.objects.len() != before)
            })?,
        )?;

        let state = self.state.clone();
        api.set(
            "clear",
            lua.create_function(move |_, ()| {
                let mut state = state.borrow_mut();
                let removed = state.objects.len();
                state.objects.clear();
                state.counters.clear();
                Ok(removed)
            })?,
        )?;

        Ok(Value::Table(api))
    }
}
