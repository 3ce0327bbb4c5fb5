use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// Interpreter error raised while building or running a namespace.
    #[error(transparent)]
    Lua(#[from] mlua::Error),

    /// A Lua value has no JSON representation.
    #[error("cannot convert {type_name} to JSON: {reason}")]
    Conversion {
        type_name: &'static str,
        reason: String,
    },
}

impl Error {
    pub(crate) fn conversion(type_name: &'static str, reason: impl Into<String>) -> Self {
        Self::Conversion {
            type_name,
            reason: reason.into(),
        }
    }
}
