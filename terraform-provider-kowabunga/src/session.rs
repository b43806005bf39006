//! Provider session shared by every resource operation

use crate::client::KowabungaClient;
use tokio::sync::{Mutex, MutexGuard};

/// API client plus the process-wide lock serializing all CRUD calls.
///
/// The client is not assumed safe for concurrent use, so every operation holds
/// the guard for its full duration, network round-trips included.
pub struct Session {
    client: KowabungaClient,
    lock: Mutex<()>,
}

impl Session {
    pub fn new(client: KowabungaClient) -> Self {
        Self {
            client,
            lock: Mutex::new(()),
        }
    }

    pub fn client(&self) -> &KowabungaClient {
        &self.client
    }

    /// Wait for exclusive access to the API
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}
