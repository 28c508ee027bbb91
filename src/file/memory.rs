use super::Backend;

/// Owned bytes, used for archive entries and generated classes.
#[derive(Debug)]
pub struct Memory(Vec<u8>);

impl Memory {
    /// Takes ownership of `data`.
    pub fn new(data: Vec<u8>) -> Memory {
        Memory(data)
    }
}

impl Backend for Memory {
    fn data(&self) -> &[u8] {
        &self.0
    }
}
