use mlua::{Lua, Value};

use crate::{Error, Result};

const MAX_DEPTH: usize = 64;

/// Tables with a positive border become arrays, every other table an object.
pub fn lua_to_json(value: Value) -> Result<serde_json::Value> {
    to_json(value, 0)
}

fn to_json(value: Value, depth: usize) -> Result<serde_json::Value> {
    match value {
        Value::Nil => Ok(serde_json::Value::Null),
        Value::Boolean(b) => Ok(serde_json::Value::Bool(b)),
        Value::Integer(i) => Ok(serde_json::Value::Number(i.into())),
        Value::Number(n) => serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .ok_or_else(|| Error::conversion("number", format!("{n} is not finite"))),
        Value::String(s) => Ok(serde_json::Value::String(s.to_str()?.to_string())),
        Value::Table(table) => {
            if depth >= MAX_DEPTH {
                return Err(Error::conversion("table", "nested too deeply"));
            }
            let len = table.raw_len();
            if len > 0 {
                let mut items = Vec::with_capacity(len);
                for index in 1..=len {
                    items.push(to_json(table.raw_get::<Value>(index)?, depth + 1)?);
                }
                Ok(serde_json::Value::Array(items))
            } else {
                let mut map = serde_json::Map::new();
                for pair in table.pairs::<Value, Value>() {
                    let (key, value) = pair?;
                    let key = match key {
                        Value::String(s) => s.to_str()?.to_string(),
                        Value::Integer(i) => i.to_string(),
                        other => {
                            return Err(Error::conversion(other.type_name(), "unsupported key"));
                        }
                    };
                    map.insert(key, to_json(value, depth + 1)?);
                }
                Ok(serde_json::Value::Object(map))
            }
        }
        other => Err(Error::conversion(
            other.type_name(),
            "no JSON representation",
        )),
    }
}

pub fn json_to_lua(lua: &Lua, value: &serde_json::Value) -> mlua::Result<Value> {
    Ok(match value {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map_or_else(|| Value::Number(n.as_f64().unwrap_or(f64::NAN)), Value::Integer),
        serde_json::Value::String(s) => Value::String(lua.create_string(s)?),
        serde_json::Value::Array(items) => {
            let table = lua.create_table()?;
            for (index, item) in items.iter().enumerate() {
                table.raw_set(index + 1, json_to_lua(lua, item)?)?;
            }
            Value::Table(table)
        }
        serde_json::Value::Object(map) => {
            let table = lua.create_table()?;
            for (key, item) in map {
                table.raw_set(key.as_str(), json_to_lua(lua, item)?)?;
            }
            Value::Table(table)
        }
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn eval(lua: &Lua, code: &str) -> Value {
        lua.load(code).eval().unwrap()
    }

    #[test]
    fn sequences_become_arrays() {
        let lua = Lua::new();
        let value = lua_to_json(eval(&lua, "{1, 'two', 3.5, true}")).unwrap();
        assert_eq!(value, json!([1, "two", 3.5, true]));
    }

    #[test]
    fn keyed_tables_become_objects() {
        let lua = Lua::new();
        let value = lua_to_json(eval(&lua, "{name = 'Cube', location = {1, 2, 3}}")).unwrap();
        assert_eq!(value, json!({"name": "Cube", "location": [1, 2, 3]}));
    }

    #[test]
    fn functions_are_rejected() {
        let lua = Lua::new();
        let err = lua_to_json(eval(&lua, "print")).unwrap_err();
        assert!(err.to_string().contains("function"), "{err}");
    }

    #[test]
    fn cyclic_tables_are_rejected() {
        let lua = Lua::new();
        let value = eval(&lua, "local t = {}; t.self = t; return t");
        assert!(lua_to_json(value).is_err());
    }

    #[test]
    fn json_round_trips_through_lua() {
        let lua = Lua::new();
        let original = json!({"objects": [{"name": "Cube", "visible": true}], "count": 1});
        let value = json_to_lua(&lua, &original).unwrap();
        assert_eq!(lua_to_json(value).unwrap(), original);
    }
}
