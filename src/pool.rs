//! Reusable buffer and message pools
//!
//! The server and client recycle datagram buffers and parsed messages
//! through these pools so steady-state request handling performs no
//! allocations. Items whose retained capacity has grown past
//! [`MAX_RETAINED_CAPACITY`] are dropped instead of returned, keeping a
//! burst of oversized TCP-scale payloads from pinning memory forever.

use parking_lot::Mutex;

use crate::dns::Message;

/// Largest buffer capacity a pool will hold on to, in bytes
///
/// Matches the maximum DNS message size, so every retained buffer can
/// serve any future datagram without growing.
pub const MAX_RETAINED_CAPACITY: usize = 65536;

/// A pool of reusable byte buffers
///
/// Buffers come back empty but with their capacity retained.
#[derive(Debug, Default)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a cleared buffer from the pool, or allocate a fresh one
    pub fn get(&self) -> Vec<u8> {
        match self.free.lock().pop() {
            Some(mut buf) => {
                buf.clear();
                buf
            }
            None => Vec::new(),
        }
    }

    /// Return a buffer to the pool
    ///
    /// Buffers that have grown past [`MAX_RETAINED_CAPACITY`] are
    /// dropped instead.
    pub fn put(&self, buf: Vec<u8>) {
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        self.free.lock().push(buf);
    }

    /// Number of buffers currently held by the pool
    pub fn len(&self) -> usize {
        self.free.lock().len()
    }

    /// Whether the pool currently holds no buffers
    pub fn is_empty(&self) -> bool {
        self.free.lock().is_empty()
    }
}

/// A pool of reusable [`Message`] values
///
/// Messages come back fully reset, with the capacity of their internal
/// buffers retained.
#[derive(Debug, Default)]
pub struct MessagePool {
    free: Mutex<Vec<Message>>,
}

impl MessagePool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reset message from the pool, or allocate a fresh one
    pub fn get(&self) -> Message {
        match self.free.lock().pop() {
            Some(mut msg) => {
                msg.reset();
                msg
            }
            None => Message::new(),
        }
    }

    /// Return a message to the pool
    ///
    /// Messages whose wire buffer has grown past
    /// [`MAX_RETAINED_CAPACITY`] are dropped instead.
    pub fn put(&self, msg: Message) {
        if msg.raw.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        self.free.lock().push(msg);
    }

    /// Number of messages currently held by the pool
    pub fn len(&self) -> usize {
        self.free.lock().len()
    }

    /// Whether the pool currently holds no messages
    pub fn is_empty(&self) -> bool {
        self.free.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{Class, Type};

    #[test]
    fn test_buffer_reuse() {
        let pool = BufferPool::new();
        let mut buf = pool.get();
        buf.extend_from_slice(b"payload");
        let ptr = buf.as_ptr();
        pool.put(buf);
        assert_eq!(pool.len(), 1);

        let buf = pool.get();
        assert!(buf.is_empty());
        assert_eq!(buf.as_ptr(), ptr);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_buffer_capacity_ceiling() {
        let pool = BufferPool::new();
        pool.put(Vec::with_capacity(MAX_RETAINED_CAPACITY + 1));
        assert!(pool.is_empty());
        pool.put(Vec::with_capacity(MAX_RETAINED_CAPACITY));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_message_reuse_resets_state() {
        let pool = MessagePool::new();
        let mut msg = pool.get();
        msg.set_question("hk.phus.lu", Type::A, Class::IN);
        pool.put(msg);

        let msg = pool.get();
        assert!(msg.raw.is_empty());
        assert!(msg.domain().is_empty());
        assert_eq!(msg.header.qdcount, 0);
    }

    #[test]
    fn test_message_capacity_ceiling() {
        let pool = MessagePool::new();
        let mut msg = Message::new();
        msg.raw.reserve(MAX_RETAINED_CAPACITY + 1);
        pool.put(msg);
        assert!(pool.is_empty());
    }
}
