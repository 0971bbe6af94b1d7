use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::{Client, CustomRedisError};

/// Scriptable in-memory stand-in for a Redis server.
///
/// Tests configure per-key return values up front and can inspect the calls
/// that were made afterwards. Unconfigured keys behave like an empty server:
/// `get` misses, writes succeed.
#[derive(Clone, Default)]
pub struct MockRedisClient {
    get_ret: HashMap<String, Result<String, CustomRedisError>>,
    setex_ret: HashMap<String, Result<(), CustomRedisError>>,
    del_ret: HashMap<String, Result<(), CustomRedisError>>,
    calls: Arc<Mutex<Vec<MockRedisCall>>>,
}

impl MockRedisClient {
    pub fn new() -> Self {
        Self::default()
    }

    // Helper method to safely lock the calls mutex
    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<MockRedisCall>> {
        match self.calls.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get_ret(&mut self, key: &str, ret: Result<String, CustomRedisError>) -> Self {
        self.get_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn setex_ret(&mut self, key: &str, ret: Result<(), CustomRedisError>) -> Self {
        self.setex_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn del_ret(&mut self, key: &str, ret: Result<(), CustomRedisError>) -> Self {
        self.del_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn get_calls(&self) -> Vec<MockRedisCall> {
        self.lock_calls().clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockRedisValue {
    None,
    StringWithTTL(String, u64),
}

#[derive(Debug, Clone)]
pub struct MockRedisCall {
    pub op: String,
    pub key: String,
    pub value: MockRedisValue,
}

#[async_trait]
impl Client for MockRedisClient {
    async fn get(&self, k: String) -> Result<String, CustomRedisError> {
        self.lock_calls().push(MockRedisCall {
            op: "get".to_string(),
            key: k.clone(),
            value: MockRedisValue::None,
        });
        match self.get_ret.get(&k) {
            Some(ret) => ret.clone(),
            None => Err(CustomRedisError::NotFound),
        }
    }

    async fn setex(&self, k: String, v: String, seconds: u64) -> Result<(), CustomRedisError> {
        self.lock_calls().push(MockRedisCall {
            op: "setex".to_string(),
            key: k.clone(),
            value: MockRedisValue::StringWithTTL(v, seconds),
        });
        match self.setex_ret.get(&k) {
            Some(ret) => ret.clone(),
            None => Ok(()),
        }
    }

    async fn del(&self, k: String) -> Result<(), CustomRedisError> {
        self.lock_calls().push(MockRedisCall {
            op: "del".to_string(),
            key: k.clone(),
            value: MockRedisValue::None,
        });
        match self.del_ret.get(&k) {
            Some(ret) => ret.clone(),
            None => Ok(()),
        }
    }
}
