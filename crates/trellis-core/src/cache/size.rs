//! ByteSize - キャッシュ値の byte 計上

use std::sync::Arc;

/// Resident size of a value, as charged against the cache budget.
pub trait ByteSize {
    fn byte_size(&self) -> usize;
}

impl ByteSize for str {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl ByteSize for String {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl ByteSize for [u8] {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl ByteSize for Vec<u8> {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

/// Size of the compact JSON encoding.
impl ByteSize for serde_json::Value {
    fn byte_size(&self) -> usize {
        serde_json::to_vec(self).map_or(0, |bytes| bytes.len())
    }
}

impl<T: ByteSize + ?Sized> ByteSize for Arc<T> {
    fn byte_size(&self) -> usize {
        (**self).byte_size()
    }
}

impl<T: ByteSize + ?Sized> ByteSize for Box<T> {
    fn byte_size(&self) -> usize {
        (**self).byte_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sizes_follow_content_length() {
        assert_eq!("abcd".byte_size(), 4);
        assert_eq!(vec![0u8; 40].byte_size(), 40);
        assert_eq!(Arc::new(String::from("xyz")).byte_size(), 3);
        assert_eq!(json!({"a": 1}).byte_size(), r#"{"a":1}"#.len());
    }
}
