//! The handler registry (§4.7): maps 1-byte function ids to handlers.
//! Registration is exclusive per id (re-registration replaces); lookup is
//! under a reader lock for scalability.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::rpc::status::Status;

/// A synchronous RPC handler: request bytes in, `(status, response bytes)`
/// out. Handlers run on the RPC server's event-loop thread and must not
/// block.
pub type Handler = Box<dyn Fn(&[u8]) -> (Status, Vec<u8>) + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<u8, Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry { handlers: RwLock::new(HashMap::new()) }
    }

    /// Registers `handler` for `function_id`, replacing any existing
    /// registration.
    pub fn register(&self, function_id: u8, handler: Handler) {
        let mut guard = self.handlers.write().expect("handler registry lock poisoned");
        guard.insert(function_id, handler);
    }

    pub fn unregister(&self, function_id: u8) {
        let mut guard = self.handlers.write().expect("handler registry lock poisoned");
        guard.remove(&function_id);
    }

    pub fn dispatch(&self, function_id: u8, request: &[u8]) -> (Status, Vec<u8>) {
        let guard = self.handlers.read().expect("handler registry lock poisoned");
        match guard.get(&function_id) {
            Some(handler) => handler(request),
            None => (Status::FuncNotFound, Vec::new()),
        }
    }

    pub fn is_registered(&self, function_id: u8) -> bool {
        self.handlers.read().expect("handler registry lock poisoned").contains_key(&function_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_after_register_returns_the_handler_result() {
        let registry = HandlerRegistry::new();
        registry.register(0x01, Box::new(|req| (Status::Success, req.to_vec())));
        assert_eq!(registry.dispatch(0x01, b"ping"), (Status::Success, b"ping".to_vec()));
    }

    #[test]
    fn lookup_after_unregister_is_func_not_found() {
        let registry = HandlerRegistry::new();
        registry.register(0x01, Box::new(|_| (Status::Success, Vec::new())));
        registry.unregister(0x01);
        assert_eq!(registry.dispatch(0x01, b"x").0, Status::FuncNotFound);
    }

    #[test]
    fn re_registration_replaces() {
        let registry = HandlerRegistry::new();
        registry.register(0x01, Box::new(|_| (Status::Success, vec![1])));
        registry.register(0x01, Box::new(|_| (Status::Success, vec![2])));
        assert_eq!(registry.dispatch(0x01, b"x").1, vec![2]);
    }
}
