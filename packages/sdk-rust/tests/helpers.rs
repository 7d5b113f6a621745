/// Test helpers for SDK integration tests
///
/// Server and client setup lives in `cambio_test_utils`; these are small
/// assertion aids shared between test files.
use cambio_sdk::{AuthRejection, CambioClient};
use std::sync::{Arc, Mutex};

/// Records every auth rejection reported by a client
#[derive(Clone, Default)]
pub struct RejectionLog {
    seen: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl RejectionLog {
    pub fn attach(client: &CambioClient) -> Self {
        let log = Self::default();
        let seen = Arc::clone(&log.seen);
        client.on_auth_rejected(move |rejection: &AuthRejection| {
            seen.lock().unwrap().push(rejection.path.clone());
        });
        log
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn paths(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}
