use async_trait::async_trait;
use tokio::sync::broadcast;

use super::types::DeviceStates;
use super::types::MysaEvent;
use super::types::SetDeviceState;

#[derive(Debug, thiserror::Error)]
pub enum MysaError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not authenticated; log in first")]
    NotAuthenticated,

    #[error("Authentication rejected: {0}")]
    AuthenticationFailed(String),

    #[error("Unexpected response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },
}

/// Operations the thermostat bridge needs from the Mysa cloud.
///
/// This trait allows mocking the vendor API for testing purposes.
#[async_trait]
pub trait MysaApi: Send + Sync {
    /// Fetch the current state of every device on the account.
    async fn get_device_states(&self) -> Result<DeviceStates, MysaError>;

    /// Request a state change. Does not wait for the device to apply it.
    async fn set_device_state(
        &self,
        device_id: &str,
        change: SetDeviceState,
    ) -> Result<(), MysaError>;

    /// Begin delivering realtime events for a device.
    async fn start_realtime_updates(&self, device_id: &str) -> Result<(), MysaError>;

    /// Stop delivering realtime events for a device.
    async fn stop_realtime_updates(&self, device_id: &str) -> Result<(), MysaError>;

    /// Subscribe to the realtime event stream. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<MysaEvent>;
}

#[cfg(test)]
pub use mock::MockMysaApi;

#[cfg(test)]
mod mock {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::integrations::mysa::DeviceState;

    /// Mock Mysa API for testing
    #[derive(Debug)]
    pub struct MockMysaApi {
        pub states: Mutex<DeviceStates>,
        pub commands: Mutex<Vec<(String, SetDeviceState)>>,
        pub realtime_started: Mutex<Vec<String>>,
        pub realtime_stopped: Mutex<Vec<String>>,
        pub state_fetches: AtomicUsize,
        pub fail_state_fetch: AtomicBool,
        pub fail_realtime_start: AtomicBool,
        events: broadcast::Sender<MysaEvent>,
    }

    impl Default for MockMysaApi {
        fn default() -> Self {
            let (events, _) = broadcast::channel(16);
            Self {
                states: Mutex::new(DeviceStates::default()),
                commands: Mutex::new(Vec::new()),
                realtime_started: Mutex::new(Vec::new()),
                realtime_stopped: Mutex::new(Vec::new()),
                state_fetches: AtomicUsize::new(0),
                fail_state_fetch: AtomicBool::new(false),
                fail_realtime_start: AtomicBool::new(false),
                events,
            }
        }
    }

    impl MockMysaApi {
        pub fn new() -> Self {
            Self::default()
        }

        /// Set the state returned for a device by the next snapshot fetch
        pub fn set_state(&self, device_id: &str, state: DeviceState) {
            self.states
                .lock()
                .unwrap()
                .device_states_obj
                .insert(device_id.to_string(), state);
        }

        /// Emit an event to every current subscriber
        pub fn emit(&self, event: MysaEvent) {
            let _ = self.events.send(event);
        }

        pub fn subscriber_count(&self) -> usize {
            self.events.receiver_count()
        }

        pub fn commands(&self) -> Vec<(String, SetDeviceState)> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MysaApi for MockMysaApi {
        async fn get_device_states(&self) -> Result<DeviceStates, MysaError> {
            self.state_fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_state_fetch.load(Ordering::SeqCst) {
                return Err(MysaError::InvalidResponse {
                    endpoint: "/devices/state".to_string(),
                    message: "mock failure".to_string(),
                });
            }
            Ok(self.states.lock().unwrap().clone())
        }

        async fn set_device_state(
            &self,
            device_id: &str,
            change: SetDeviceState,
        ) -> Result<(), MysaError> {
            self.commands
                .lock()
                .unwrap()
                .push((device_id.to_string(), change));
            Ok(())
        }

        async fn start_realtime_updates(&self, device_id: &str) -> Result<(), MysaError> {
            if self.fail_realtime_start.load(Ordering::SeqCst) {
                return Err(MysaError::NotAuthenticated);
            }
            self.realtime_started
                .lock()
                .unwrap()
                .push(device_id.to_string());
            Ok(())
        }

        async fn stop_realtime_updates(&self, device_id: &str) -> Result<(), MysaError> {
            self.realtime_stopped
                .lock()
                .unwrap()
                .push(device_id.to_string());
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<MysaEvent> {
            self.events.subscribe()
        }
    }
}
