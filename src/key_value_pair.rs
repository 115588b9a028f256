#[derive(Clone, Eq, PartialEq, Debug)]
pub struct KeyValuePair {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KeyValuePair {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> KeyValuePair {
        KeyValuePair {
            key: key.into(),
            value: value.into(),
        }
    }
}
