//! Single-value data slot.

use crate::var::Var;

/// Data slot holding exactly one payload value.
///
/// Entity inputs and outputs are `Io`s registered in the entity's `ios`
/// bundle. Slots are exclusively owned by their bundle, other code refers to
/// them by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Io {
    data: Var,
}

impl Io {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Io::default()
    }

    /// Creates a slot holding the given payload.
    pub fn with_data<V: Into<Var>>(data: V) -> Self {
        Io { data: data.into() }
    }

    pub fn data(&self) -> &Var {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Var {
        &mut self.data
    }

    pub fn set_data<V: Into<Var>>(&mut self, data: V) {
        self.data = data.into();
    }

    /// Takes the payload out, leaving the slot empty.
    pub fn take(&mut self) -> Var {
        std::mem::take(&mut self.data)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty() {
        let mut io = Io::new();
        assert!(io.is_empty());
        io.set_data(3i64);
        assert_eq!(io.data(), &Var::Int(3));
        assert_eq!(io.take(), Var::Int(3));
        assert!(io.is_empty());
    }
}
